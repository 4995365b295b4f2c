use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use exosim::{Sim, SimConfig};
use fork::{fork, ForkResult, ThisEnv};
use memory::address::{Address, V};
use memory::layout::{PGSIZE, UTEXT};
use memory::page_table::PageFlags;
use syscall::{EnvId, Kernel};

/// First of the writable pages every booted program starts with.
pub const HEAP: Address<V> = UTEXT;

/// A simulated machine plus each env's own `ThisEnv`.
pub struct Machine {
    pub sim: Sim,
    selves: BTreeMap<EnvId, ThisEnv>,
}

impl Machine {
    /// Start a root env owning `pages` zeroed, writable pages from `HEAP`.
    pub fn boot(config: SimConfig, pages: usize) -> Result<Self> {
        let mut sim = Sim::new(config);
        let root = sim.spawn()?;
        for i in 0..pages {
            sim.page_alloc(EnvId::CURRENT, HEAP + i * PGSIZE, PageFlags::user_data())
                .map_err(anyhow::Error::msg)?;
        }
        let thisenv = ThisEnv::resolve(&sim).map_err(anyhow::Error::msg)?;
        let mut selves = BTreeMap::new();
        selves.insert(root, thisenv);
        Ok(Self { sim, selves })
    }

    pub fn current(&self) -> Result<EnvId> {
        self.sim
            .current()
            .ok_or_else(|| anyhow!("no env is running"))
    }

    /// Fork the current env. The child stays unscheduled.
    pub fn fork(&mut self) -> Result<EnvId> {
        let me = self.current()?;
        let mut thisenv = *self
            .selves
            .get(&me)
            .ok_or_else(|| anyhow!("env {me} was never booted"))?;
        let forked = fork(&mut self.sim, &mut thisenv);
        match forked.map_err(anyhow::Error::msg)? {
            ForkResult::Parent(child) => {
                // The child resumes holding our copy.
                self.selves.insert(child, thisenv);
                Ok(child)
            }
            ForkResult::Child => bail!("env {me} returned from fork as a child"),
        }
    }

    /// Schedule `child` and let its pending `fork` return.
    pub fn enter(&mut self, child: EnvId) -> Result<()> {
        self.sim.switch_to(child)?;
        let mut thisenv = *self
            .selves
            .get(&child)
            .ok_or_else(|| anyhow!("env {child} was not forked here"))?;
        let resumed = fork(&mut self.sim, &mut thisenv);
        match resumed.map_err(anyhow::Error::msg)? {
            ForkResult::Child if thisenv.id() == child => {
                self.selves.insert(child, thisenv);
                Ok(())
            }
            other => bail!("env {child} resumed with {other:?} as {}", thisenv.id()),
        }
    }

    pub fn switch(&mut self, env: EnvId) -> Result<()> {
        Ok(self.sim.switch_to(env)?)
    }

    pub fn read(&mut self, env: EnvId, va: Address<V>, len: usize) -> Result<Vec<u8>> {
        self.switch(env)?;
        let mut buf = vec![0; len];
        self.sim.read(va, &mut buf)?;
        Ok(buf)
    }

    pub fn write(&mut self, env: EnvId, va: Address<V>, data: &[u8]) -> Result<()> {
        self.switch(env)?;
        Ok(self.sim.write(va, data)?)
    }
}

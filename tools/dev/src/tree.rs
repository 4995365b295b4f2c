use anyhow::Result;
use clap::Args;
use exosim::SimConfig;
use memory::layout::PGSIZE;
use syscall::Kernel;

use crate::machine::{Machine, HEAP};

#[derive(Args)]
pub struct Tree {
    /// Number of forks in the chain
    #[arg(long, default_value_t = 3)]
    depth: usize,
    /// Pages each env writes after the chain is built
    #[arg(long, default_value_t = 1)]
    writes: usize,
}

impl Tree {
    pub fn run(&self, config: SimConfig) -> Result<()> {
        let mut m = Machine::boot(config, self.writes)?;
        let mut envs = vec![m.current()?];
        for _ in 0..self.depth {
            let child = m.fork()?;
            m.enter(child)?;
            envs.push(child);
        }
        let after_fork = m.sim.stats();
        for (i, &env) in envs.iter().enumerate() {
            for page in 0..self.writes {
                m.write(env, HEAP + page * PGSIZE, &[(i % 255) as u8 + 1])?;
            }
        }
        let after_writes = m.sim.stats();

        println!("env       pages  parent");
        for &env in &envs {
            let pages = m.sim.mapped_pages(env).unwrap_or(0);
            let info = m.sim.env_info(env).map_err(anyhow::Error::msg)?;
            println!("{env}  {pages:>5}  {}", info.parent_id);
        }
        println!("after fork:   {after_fork:?}");
        println!("after writes: {after_writes:?}");
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::fmt;

use memory::address::{Address, V};
use memory::layout::{is_user_page_address, PGSHIFT, PGSIZE};
use memory::page::Frame;
use memory::page_table::{PageFlags, PageTableEntry};
use syscall::{EnvId, EnvInfo, EnvStatus, Exofork, Kernel, SysError, SysResult, Syscall, Upcall};

use crate::config::SimConfig;
use crate::env::{Env, Exit};
use crate::error::SimError;
use crate::frame::FrameTable;

/// Runs after every successful syscall, as the env that made it.
pub type SyscallHook = Box<dyn FnMut(&mut Sim, Syscall)>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Frames handed out so far, page tables included.
    pub frames_allocated: usize,
    pub frames_in_use: usize,
    pub faults_dispatched: usize,
    /// Pages copied by fault handlers through `UserMemory`.
    pub pages_copied: usize,
    pub syscalls: usize,
}

/// A single-CPU exokernel kept entirely in host memory.
///
/// Exactly one env is current at a time; [`Kernel`] calls and the
/// [`read`](Sim::read)/[`write`](Sim::write) accesses act on its behalf.
/// A child made by `exofork` comes to life when it is switched to and calls
/// `exofork` itself, which then returns [`Exofork::Child`]. A child that
/// touches its memory first has left that call behind, and its next
/// `exofork` creates a grandchild.
pub struct Sim {
    config: SimConfig,
    pub(crate) frames: FrameTable,
    pub(crate) envs: Vec<Option<Env>>,
    generations: Vec<u32>,
    exits: BTreeMap<EnvId, Exit>,
    pub(crate) current: Option<usize>,
    pub(crate) faults: usize,
    pub(crate) copies: usize,
    syscalls: usize,
    hook: Option<SyscallHook>,
}

impl fmt::Debug for Sim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sim")
            .field("config", &self.config)
            .field("current", &self.current())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl Sim {
    pub fn new(config: SimConfig) -> Self {
        let config = config.with_max_envs(config.max_envs);
        Self {
            config,
            frames: FrameTable::new(config.max_frames),
            envs: (0..config.max_envs).map(|_| None).collect(),
            generations: vec![0; config.max_envs],
            exits: BTreeMap::new(),
            current: None,
            faults: 0,
            copies: 0,
            syscalls: 0,
            hook: None,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Create a runnable env with an empty address space and no parent.
    /// It becomes current if nothing else is.
    pub fn spawn(&mut self) -> Result<EnvId, SimError> {
        let slot = self
            .alloc_env(EnvId::CURRENT, EnvStatus::Runnable)
            .map_err(|_| SimError::NoFreeEnv)?;
        let id = self.env_id(slot);
        if self.current.is_none() {
            self.switch_to(id)?;
        }
        debug!("spawned env {}", id);
        Ok(id)
    }

    pub fn current(&self) -> Option<EnvId> {
        self.current.map(|slot| self.env_id(slot))
    }

    /// Give the CPU to `id`, which must be runnable.
    ///
    /// A freshly forked child resumes inside `exofork` until it either calls
    /// `exofork` or accesses its memory.
    pub fn switch_to(&mut self, id: EnvId) -> Result<(), SimError> {
        let slot = self.slot_of(id).ok_or(SimError::NoSuchEnv(id))?;
        match self.envs[slot].as_ref().map(|env| env.status) {
            Some(EnvStatus::Runnable | EnvStatus::Running) => {}
            _ => return Err(SimError::NotRunnable(id)),
        }
        if let Some(prev) = self.current.and_then(|s| self.envs[s].as_mut()) {
            if prev.status == EnvStatus::Running {
                prev.status = EnvStatus::Runnable;
            }
        }
        if let Some(env) = self.envs[slot].as_mut() {
            env.status = EnvStatus::Running;
        }
        self.current = Some(slot);
        trace!("switched to env {}", id);
        Ok(())
    }

    /// Tear down `id` and release its memory.
    pub fn destroy(&mut self, id: EnvId) -> Result<(), SimError> {
        let slot = self.slot_of(id).ok_or(SimError::NoSuchEnv(id))?;
        self.kill(slot, Exit::Destroyed);
        Ok(())
    }

    pub(crate) fn kill(&mut self, slot: usize, exit: Exit) -> EnvId {
        let Some(mut env) = self.envs.get_mut(slot).and_then(Option::take) else {
            return EnvId::CURRENT;
        };
        env.space.release(&mut self.frames);
        if exit != Exit::Destroyed {
            warn!("env {} killed: {}", env.id, exit);
        }
        self.exits.insert(env.id, exit);
        if self.current == Some(slot) {
            self.current = None;
        }
        env.id
    }

    pub fn env_status(&self, id: EnvId) -> Option<EnvStatus> {
        self.slot_of(id)
            .and_then(|slot| self.envs[slot].as_ref())
            .map(|env| env.status)
    }

    /// Why `id` is gone, if it is.
    pub fn abort_reason(&self, id: EnvId) -> Option<&Exit> {
        self.exits.get(&id)
    }

    /// Page table entry of `va` in `id`, as the kernel sees it.
    pub fn pte(&self, id: EnvId, va: Address<V>) -> Option<PageTableEntry> {
        self.env_by_id(id).map(|env| env.space.pte(va))
    }

    /// Frame backing `va` in `id`, if mapped.
    pub fn frame_of(&self, id: EnvId, va: Address<V>) -> Option<Frame> {
        self.pte(id, va)
            .filter(PageTableEntry::present)
            .map(|pte| pte.frame())
    }

    pub fn frame_refcount(&self, frame: Frame) -> usize {
        self.frames.refcount(frame)
    }

    pub fn mapped_pages(&self, id: EnvId) -> Option<usize> {
        self.env_by_id(id).map(|env| env.space.mapped_pages())
    }

    /// Read `id`'s memory without permission checks or faults.
    /// Returns `false` if any byte is unmapped.
    pub fn peek(&self, id: EnvId, va: Address<V>, buf: &mut [u8]) -> bool {
        let Some(env) = self.env_by_id(id) else {
            return false;
        };
        let mut done = 0;
        while done < buf.len() {
            let at = va + done;
            let offset = at.offset_in(PGSIZE);
            let n = (PGSIZE - offset).min(buf.len() - done);
            let pte = env.space.pte(at);
            let Some(bytes) = pte
                .present()
                .then(|| self.frames.bytes(pte.frame()))
                .flatten()
            else {
                return false;
            };
            buf[done..done + n].copy_from_slice(&bytes[offset..offset + n]);
            done += n;
        }
        true
    }

    pub fn stats(&self) -> Stats {
        Stats {
            frames_allocated: self.frames.allocated(),
            frames_in_use: self.frames.in_use(),
            faults_dispatched: self.faults,
            pages_copied: self.copies,
            syscalls: self.syscalls,
        }
    }

    pub fn set_syscall_hook(&mut self, hook: impl FnMut(&mut Sim, Syscall) + 'static) {
        self.hook = Some(Box::new(hook));
    }

    /// Has no effect when called from inside the hook itself.
    pub fn clear_syscall_hook(&mut self) {
        self.hook = None;
    }

    fn syscall_done(&mut self, call: Syscall) {
        self.syscalls += 1;
        if self.current_env().is_some_and(|env| env.in_fault_handler) {
            return;
        }
        // Taken out while it runs, so syscalls it makes do not re-enter it.
        if let Some(mut hook) = self.hook.take() {
            hook(self, call);
            if self.hook.is_none() {
                self.hook = Some(hook);
            }
        }
    }

    fn alloc_env(&mut self, parent_id: EnvId, status: EnvStatus) -> SysResult<usize> {
        let slot = self
            .envs
            .iter()
            .position(Option::is_none)
            .ok_or(SysError::NoFreeEnv)?;
        self.generations[slot] += 1;
        let id = EnvId::new(self.generations[slot], slot);
        self.envs[slot] = Some(Env::new(id, parent_id, status));
        Ok(slot)
    }

    fn env_id(&self, slot: usize) -> EnvId {
        self.envs[slot]
            .as_ref()
            .map_or(EnvId::CURRENT, |env| env.id)
    }

    fn slot_of(&self, id: EnvId) -> Option<usize> {
        let slot = id.index();
        match self.envs.get(slot) {
            Some(Some(env)) if env.id == id && !id.is_current() => Some(slot),
            _ => None,
        }
    }

    fn env_by_id(&self, id: EnvId) -> Option<&Env> {
        self.slot_of(id).and_then(|slot| self.envs[slot].as_ref())
    }

    pub(crate) fn current_env(&self) -> Option<&Env> {
        self.current.and_then(|slot| self.envs[slot].as_ref())
    }

    /// Resolve a syscall env argument. With `checkperm`, the env must be the
    /// caller or one of its immediate children.
    fn envid2env(&self, id: EnvId, checkperm: bool) -> SysResult<usize> {
        let current = self.current.ok_or(SysError::BadEnv)?;
        if id.is_current() {
            return Ok(current);
        }
        let slot = self.slot_of(id).ok_or(SysError::BadEnv)?;
        if checkperm {
            let caller = self.env_id(current);
            let env = self.envs[slot].as_ref().ok_or(SysError::BadEnv)?;
            if env.id != caller && env.parent_id != caller {
                return Err(SysError::BadEnv);
            }
        }
        Ok(slot)
    }

    fn insert(&mut self, slot: usize, frame: Frame, va: Address<V>, perm: PageFlags) -> SysResult {
        let env = self
            .envs
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(SysError::BadEnv)?;
        env.space.insert(&mut self.frames, frame, va, perm)
    }
}

fn check_va(va: Address<V>) -> SysResult {
    if is_user_page_address(va) {
        Ok(())
    } else {
        Err(SysError::Inval)
    }
}

fn check_perm(perm: PageFlags) -> SysResult {
    let required = PageFlags::PRESENT | PageFlags::USER;
    if perm.contains(required) && PageFlags::SYSCALL.contains(perm) {
        Ok(())
    } else {
        Err(SysError::Inval)
    }
}

impl Kernel for Sim {
    fn getenvid(&self) -> EnvId {
        self.current().unwrap_or(EnvId::CURRENT)
    }

    fn env_info(&self, env: EnvId) -> SysResult<EnvInfo> {
        let slot = self.envid2env(env, false)?;
        self.envs[slot]
            .as_ref()
            .map(Env::info)
            .ok_or(SysError::BadEnv)
    }

    fn exofork(&mut self) -> SysResult<Exofork> {
        let current = self.current.ok_or(SysError::BadEnv)?;
        let parent = self.envs[current].as_mut().ok_or(SysError::BadEnv)?;
        if parent.fork_return_pending {
            parent.fork_return_pending = false;
            self.syscall_done(Syscall::Exofork);
            return Ok(Exofork::Child);
        }
        let parent_id = parent.id;
        let slot = self.alloc_env(parent_id, EnvStatus::NotRunnable)?;
        let child = self.envs[slot].as_mut().ok_or(SysError::Unspecified)?;
        child.fork_return_pending = true;
        let child_id = child.id;
        debug!("exofork: {} created {}", parent_id, child_id);
        self.syscall_done(Syscall::Exofork);
        Ok(Exofork::Parent(child_id))
    }

    fn page_alloc(&mut self, env: EnvId, va: Address<V>, perm: PageFlags) -> SysResult {
        check_va(va)?;
        check_perm(perm)?;
        let slot = self.envid2env(env, true)?;
        let frame = self.frames.alloc().ok_or(SysError::NoMem)?;
        if let Err(err) = self.insert(slot, frame, va, perm) {
            self.frames.release_unused(frame);
            return Err(err);
        }
        self.syscall_done(Syscall::PageAlloc);
        Ok(())
    }

    fn page_map(
        &mut self,
        src_env: EnvId,
        src_va: Address<V>,
        dst_env: EnvId,
        dst_va: Address<V>,
        perm: PageFlags,
    ) -> SysResult {
        let src = self.envid2env(src_env, true)?;
        let dst = self.envid2env(dst_env, true)?;
        check_va(src_va)?;
        check_va(dst_va)?;
        let pte = self.envs[src]
            .as_ref()
            .map(|env| env.space.pte(src_va))
            .ok_or(SysError::BadEnv)?;
        if !pte.present() {
            return Err(SysError::Inval);
        }
        check_perm(perm)?;
        if perm.contains(PageFlags::WRITABLE) && !pte.writable() {
            return Err(SysError::Inval);
        }
        self.insert(dst, pte.frame(), dst_va, perm)?;
        self.syscall_done(Syscall::PageMap);
        Ok(())
    }

    fn page_unmap(&mut self, env: EnvId, va: Address<V>) -> SysResult {
        let slot = self.envid2env(env, true)?;
        check_va(va)?;
        if let Some(env) = self.envs[slot].as_mut() {
            env.space.remove(&mut self.frames, va);
        }
        self.syscall_done(Syscall::PageUnmap);
        Ok(())
    }

    fn env_set_pgfault_upcall(&mut self, env: EnvId, upcall: Upcall<Self>) -> SysResult {
        let slot = self.envid2env(env, true)?;
        let env = self.envs[slot].as_mut().ok_or(SysError::BadEnv)?;
        env.upcall = Some(upcall);
        self.syscall_done(Syscall::EnvSetPgfaultUpcall);
        Ok(())
    }

    fn env_set_status(&mut self, env: EnvId, status: EnvStatus) -> SysResult {
        if !matches!(status, EnvStatus::Runnable | EnvStatus::NotRunnable) {
            return Err(SysError::Inval);
        }
        let slot = self.envid2env(env, true)?;
        let env = self.envs[slot].as_mut().ok_or(SysError::BadEnv)?;
        env.status = status;
        self.syscall_done(Syscall::EnvSetStatus);
        Ok(())
    }

    fn uvpd(&self, pdx: usize) -> PageTableEntry {
        self.current_env()
            .map_or(PageTableEntry::EMPTY, |env| env.space.pde(pdx))
    }

    fn uvpt(&self, pn: usize) -> PageTableEntry {
        let va = Address::new(pn << PGSHIFT);
        self.current_env()
            .map_or(PageTableEntry::EMPTY, |env| env.space.pte(va))
    }
}

use core::fmt;
use memory::address::{Address, V};
use memory::layout::NPTENTRIES;
use memory::page_table::{PageFlags, PageTableEntry};

use crate::env::{EnvId, EnvInfo, EnvStatus, Exofork};
use crate::error::SysResult;
use crate::trap::Upcall;

#[repr(usize)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Syscall {
    GetEnvId,
    /// Allocate a zeroed page into an env
    PageAlloc,
    /// Share a page between two envs
    PageMap,
    PageUnmap,
    /// Create a blank child env
    Exofork,
    EnvSetStatus,
    EnvSetPgfaultUpcall,
}

impl Syscall {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GetEnvId => "sys_getenvid",
            Self::PageAlloc => "sys_page_alloc",
            Self::PageMap => "sys_page_map",
            Self::PageUnmap => "sys_page_unmap",
            Self::Exofork => "sys_exofork",
            Self::EnvSetStatus => "sys_env_set_status",
            Self::EnvSetPgfaultUpcall => "sys_env_set_pgfault_upcall",
        }
    }
}

impl fmt::Display for Syscall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The primitives a user environment can ask of the kernel.
///
/// `EnvId::CURRENT` names the calling env wherever an env id is expected.
/// Other env ids must name the caller itself or one of its immediate
/// children.
pub trait Kernel: Sized {
    fn getenvid(&self) -> EnvId;

    /// Read-only view of an env's record.
    fn env_info(&self, env: EnvId) -> SysResult<EnvInfo>;

    /// Create a blank, not-runnable child.
    ///
    /// Returns twice: `Exofork::Parent` in the caller, and `Exofork::Child`
    /// in the child once it is first scheduled.
    fn exofork(&mut self) -> SysResult<Exofork>;

    /// Map a fresh zeroed page at `va` in `env`, replacing whatever was there.
    fn page_alloc(&mut self, env: EnvId, va: Address<V>, perm: PageFlags) -> SysResult;

    /// Map the page at `src_va` in `src_env` at `dst_va` in `dst_env`.
    fn page_map(
        &mut self,
        src_env: EnvId,
        src_va: Address<V>,
        dst_env: EnvId,
        dst_va: Address<V>,
        perm: PageFlags,
    ) -> SysResult;

    fn page_unmap(&mut self, env: EnvId, va: Address<V>) -> SysResult;

    fn env_set_pgfault_upcall(&mut self, env: EnvId, upcall: Upcall<Self>) -> SysResult;

    fn env_set_status(&mut self, env: EnvId, status: EnvStatus) -> SysResult;

    /// Page directory entry `pdx` of the calling env.
    fn uvpd(&self, pdx: usize) -> PageTableEntry;

    /// Page table entry for virtual page `pn` of the calling env.
    ///
    /// Only meaningful when the covering directory entry is present.
    fn uvpt(&self, pn: usize) -> PageTableEntry;

    /// Page table entry for virtual page `pn`, or an empty entry if its page
    /// table does not exist.
    fn pte(&self, pn: usize) -> PageTableEntry {
        if self.uvpd(pn / NPTENTRIES).present() {
            self.uvpt(pn)
        } else {
            PageTableEntry::EMPTY
        }
    }
}

/// Direct access to the calling env's own memory.
pub trait UserMemory {
    /// Copy one whole page from `src` to `dst`, both page aligned and mapped in
    /// the calling env.
    fn copy_page(&mut self, dst: Address<V>, src: Address<V>) -> Result<(), crate::Fatal>;
}

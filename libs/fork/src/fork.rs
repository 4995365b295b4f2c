use core::cmp::min;
use core::fmt;
use memory::address::Address;
use memory::layout::{first_page_of, user_pdes, NPTENTRIES, PGSIZE, UTOP};
use syscall::{EnvId, EnvStatus, Exofork, Fatal, Kernel, OrFatal, SysError, Syscall, UserMemory};

use crate::duppage::duppage;
use crate::env::ThisEnv;
use crate::pgfault::{pgfault, set_pgfault_handler};

/// Which side of a successful fork we are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkResult {
    Parent(EnvId),
    Child,
}

impl ForkResult {
    /// Classic return value: the child's id in the parent, 0 in the child.
    pub fn status(&self) -> isize {
        match self {
            Self::Parent(child) => child.0 as isize,
            Self::Child => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkError {
    /// The child could not be created. Nothing was changed.
    Exofork(SysError),
    /// Duplication failed part way; the calling env must not continue.
    Fatal(Fatal),
}

impl ForkError {
    /// Negative status for the recoverable case, `None` if the process has
    /// to abort.
    pub fn status(&self) -> Option<isize> {
        match self {
            Self::Exofork(err) => Some(err.code()),
            Self::Fatal(_) => None,
        }
    }
}

impl From<Fatal> for ForkError {
    fn from(fatal: Fatal) -> Self {
        Self::Fatal(fatal)
    }
}

impl fmt::Display for ForkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exofork(err) => write!(f, "sys_exofork: {err}"),
            Self::Fatal(fatal) => write!(f, "fork: {fatal}"),
        }
    }
}

/// User-level fork with copy-on-write.
///
/// Sets up our fault handler, creates a child, shares every user page with it
/// through [`duppage`], gives it its own fault upcall and makes it runnable.
///
/// In the child, corrects `thisenv` and returns [`ForkResult::Child`].
pub fn fork<K: Kernel + UserMemory>(
    k: &mut K,
    thisenv: &mut ThisEnv,
) -> Result<ForkResult, ForkError> {
    set_pgfault_handler(k, pgfault::<K>)?;
    let child = match k.exofork().map_err(ForkError::Exofork)? {
        Exofork::Child => {
            // The copied `thisenv` still refers to the parent.
            thisenv
                .refresh(&*k)
                .or_fatal(Syscall::GetEnvId, Address::ZERO)?;
            return Ok(ForkResult::Child);
        }
        Exofork::Parent(child) => child,
    };
    debug!("fork: {} -> {}", thisenv.id(), child);
    let user_pages = UTOP.as_usize() / PGSIZE;
    for pdx in 0..user_pdes() {
        if !k.uvpd(pdx).present() {
            continue;
        }
        let first = first_page_of(pdx);
        for pn in first..min(first + NPTENTRIES, user_pages) {
            duppage(k, child, pn)?;
        }
    }
    k.env_set_pgfault_upcall(child, pgfault::<K>)
        .or_fatal(Syscall::EnvSetPgfaultUpcall, Address::ZERO)?;
    k.env_set_status(child, EnvStatus::Runnable)
        .or_fatal(Syscall::EnvSetStatus, Address::ZERO)?;
    Ok(ForkResult::Parent(child))
}

/// Fork sharing the whole address space. Not supported; always fatal.
pub fn sfork<K: Kernel + UserMemory>(
    _k: &mut K,
    _thisenv: &mut ThisEnv,
) -> Result<ForkResult, ForkError> {
    Err(ForkError::Fatal(Fatal::Unsupported("sfork")))
}

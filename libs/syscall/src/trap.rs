use bitflags::bitflags;
use memory::address::{Address, V};

use crate::error::Fatal;

bitflags! {
    /// Page fault error code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FaultError: u32 {
        /// The page was present; the fault is a protection violation.
        const PROTECTION = 0x1;
        /// The faulting access was a write.
        const WRITE = 0x2;
        /// The fault happened in user mode.
        const USER = 0x4;
    }
}

/// What the kernel pushes onto the exception stack before entering the
/// fault upcall.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UTrapframe {
    pub fault_va: Address<V>,
    pub err: FaultError,
    pub eip: usize,
    pub esp: usize,
}

impl UTrapframe {
    pub fn is_write(&self) -> bool {
        self.err.contains(FaultError::WRITE)
    }
}

/// Fault entry point registered with `env_set_pgfault_upcall`.
pub type Upcall<K> = fn(&mut K, &UTrapframe) -> Result<(), Fatal>;

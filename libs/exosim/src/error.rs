use std::fmt;

use memory::address::{Address, V};
use syscall::EnvId;

use crate::env::Exit;

/// Failures of the machine-level controls (`spawn`, `switch_to`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    NoFreeEnv,
    NoSuchEnv(EnvId),
    NotRunnable(EnvId),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFreeEnv => f.write_str("env table full"),
            Self::NoSuchEnv(id) => write!(f, "no env {id}"),
            Self::NotRunnable(id) => write!(f, "env {id} is not runnable"),
        }
    }
}

impl std::error::Error for SimError {}

/// A user-mode memory access that did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    NoCurrentEnv,
    /// The access killed the env.
    Killed(EnvId, Exit),
    /// A present mapping points at a freed frame.
    Unbacked(Address<V>),
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCurrentEnv => f.write_str("no env is running"),
            Self::Killed(id, exit) => write!(f, "env {id} killed: {exit}"),
            Self::Unbacked(va) => write!(f, "{va} maps a free frame"),
        }
    }
}

impl std::error::Error for AccessError {}

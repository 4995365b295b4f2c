use core::fmt;

pub const LOG2NENV: usize = 10;
pub const NENV: usize = 1 << LOG2NENV;
pub const ENVGENSHIFT: usize = 12;

/// Environment id: a generation number above `ENVGENSHIFT` and the env table
/// slot in the low `LOG2NENV` bits.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(pub i32);

unsafe impl bytemuck::Zeroable for EnvId {}

unsafe impl bytemuck::Pod for EnvId {}

impl EnvId {
    /// Shorthand for the calling env in syscalls.
    pub const CURRENT: Self = Self(0);

    pub const fn new(generation: u32, index: usize) -> Self {
        let slot = (index & (NENV - 1)) as i32;
        Self(((generation as i32) << ENVGENSHIFT) | slot)
    }

    /// Env table slot.
    pub const fn index(&self) -> usize {
        self.0 as usize & (NENV - 1)
    }

    pub const fn generation(&self) -> u32 {
        (self.0 >> ENVGENSHIFT) as u32
    }

    pub const fn is_current(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    Free,
    Dying,
    Runnable,
    Running,
    NotRunnable,
}

/// What a process may read about an env.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvInfo {
    pub id: EnvId,
    pub parent_id: EnvId,
    pub status: EnvStatus,
}

/// The two ways `exofork` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exofork {
    /// In the caller, naming the new child.
    Parent(EnvId),
    /// In the child.
    Child,
}

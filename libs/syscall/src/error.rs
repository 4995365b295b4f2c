use core::fmt;
use memory::address::{Address, V};
use memory::page_table::PageFlags;

use crate::syscall::Syscall;
use crate::trap::FaultError;

/// Kernel error codes. Syscalls return them negated.
#[repr(isize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SysError {
    Unspecified = 1,
    BadEnv = 2,
    Inval = 3,
    NoMem = 4,
    NoFreeEnv = 5,
    Fault = 6,
}

pub type SysResult<T = ()> = Result<T, SysError>;

impl SysError {
    pub const fn code(&self) -> isize {
        -(*self as isize)
    }

    pub const fn from_code(code: isize) -> Option<Self> {
        Some(match code {
            -1 => Self::Unspecified,
            -2 => Self::BadEnv,
            -3 => Self::Inval,
            -4 => Self::NoMem,
            -5 => Self::NoFreeEnv,
            -6 => Self::Fault,
            _ => return None,
        })
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified error",
            Self::BadEnv => "bad environment",
            Self::Inval => "invalid parameter",
            Self::NoMem => "out of memory",
            Self::NoFreeEnv => "out of environments",
            Self::Fault => "segmentation fault",
        }
    }
}

impl fmt::Display for SysError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A condition the calling process cannot recover from.
///
/// Carried upward until the env is torn down; nothing retries on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatal {
    /// A kernel primitive failed.
    Syscall {
        call: Syscall,
        va: Address<V>,
        err: SysError,
    },
    /// A page fault that is not a write to a copy-on-write page.
    UnhandledFault {
        va: Address<V>,
        err: FaultError,
        flags: PageFlags,
        eip: usize,
    },
    /// The fault handler itself touched memory it could not access.
    NestedFault { va: Address<V> },
    Unsupported(&'static str),
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syscall { call, va, err } => write!(f, "{call} at {va}: {err}"),
            Self::UnhandledFault { va, err, flags, eip } => {
                write!(f, "fault at {va} ({err:?}, pte {flags:?}), eip {eip:#x}")
            }
            Self::NestedFault { va } => write!(f, "fault inside fault handler at {va}"),
            Self::Unsupported(what) => write!(f, "{what} not implemented"),
        }
    }
}

/// Turns a failed syscall into a [`Fatal`] naming the call and address.
pub trait OrFatal<T> {
    fn or_fatal(self, call: Syscall, va: Address<V>) -> Result<T, Fatal>;
}

impl<T> OrFatal<T> for SysResult<T> {
    #[inline]
    fn or_fatal(self, call: Syscall, va: Address<V>) -> Result<T, Fatal> {
        self.map_err(|err| Fatal::Syscall { call, va, err })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_negative() {
        assert_eq!(SysError::NoMem.code(), -4);
        assert_eq!(SysError::from_code(-5), Some(SysError::NoFreeEnv));
        assert_eq!(SysError::from_code(0), None);
    }

    #[test]
    fn fatal_names_the_call() {
        let r: SysResult = Err(SysError::Inval);
        let fatal = r
            .or_fatal(Syscall::PageMap, Address::new(0x1000))
            .unwrap_err();
        assert_eq!(
            fatal.to_string(),
            "sys_page_map at 0x1000: invalid parameter"
        );
    }
}

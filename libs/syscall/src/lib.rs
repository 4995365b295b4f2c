#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod env;
mod error;
mod log;
mod syscall;
mod trap;

pub use crate::env::*;
pub use crate::error::*;
pub use crate::log::UserLogger;
pub use crate::syscall::*;
pub use crate::trap::*;

//! A host-memory exokernel for running user-level environment code.
//!
//! [`Sim`] implements the syscall [`Kernel`](syscall::Kernel) interface with
//! the same argument checks a real kernel applies, keeps physical frames
//! reference-counted, and delivers page faults to the registered upcall on
//! every user [`read`](Sim::read) and [`write`](Sim::write).

#[macro_use]
extern crate log;

mod access;
mod config;
mod env;
mod error;
mod frame;
mod sim;

pub use config::SimConfig;
pub use env::Exit;
pub use error::{AccessError, SimError};
pub use sim::{Sim, Stats, SyscallHook};

//! Copy-on-write `fork` implemented entirely in user space.
//!
//! The kernel only provides page allocation, page mapping between envs, and
//! fault upcalls. Which pages are shared, which are copied, and when a shared
//! page turns private is decided here:
//!
//! - [`pgfault`] turns a copy-on-write page private on the first write.
//! - [`duppage`] carries one page of the caller into a child.
//! - [`fork`] drives the whole duplication.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

mod duppage;
mod env;
mod fork;
mod pgfault;

pub use crate::duppage::{duppage, PageKind};
pub use crate::env::ThisEnv;
pub use crate::fork::{fork, sfork, ForkError, ForkResult};
pub use crate::pgfault::{pgfault, set_pgfault_handler};

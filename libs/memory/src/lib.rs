#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod address;
pub mod layout;
pub mod page;
pub mod page_table;

//! User address space layout.
//!
//! ```text
//!    UTOP, UXSTACKTOP -> +------------------------------+ 0xeec00000
//!                        |     user exception stack     | PGSIZE
//!                        +------------------------------+ 0xeebff000
//!                        |        empty memory          | PGSIZE
//!           USTACKTOP -> +------------------------------+ 0xeebfe000
//!                        |      normal user stack       |
//!                        +------------------------------+
//!                        :              .               :
//!                        |  program data, heap, text    |
//!               UTEXT -> +------------------------------+ 0x00800000
//!              PFTEMP -> |   fault scratch page         | 0x007ff000
//!                        |                              |
//!               UTEMP -> +------------------------------+ 0x00400000
//!                        |                              |
//!                    0 -> +------------------------------+
//! ```

use crate::address::{Address, V};
use crate::page::{Page, PageSize, Size4K, Size4M};

pub const PGSIZE: usize = Size4K::BYTES;
pub const PGSHIFT: usize = Size4K::LOG_BYTES;
pub const NPTENTRIES: usize = 1024;
pub const NPDENTRIES: usize = 1024;
pub const PTSIZE: usize = Size4M::BYTES;
pub const PDXSHIFT: usize = Size4M::LOG_BYTES;

pub const UTEMP: Address<V> = Address::new(0x0040_0000);
/// Scratch mapping used while materialising a private copy of a faulting page.
pub const PFTEMP: Address<V> = Address::new(UTEMP.as_usize() + PTSIZE - PGSIZE);
pub const UTEXT: Address<V> = Address::new(0x0080_0000);
pub const UTOP: Address<V> = Address::new(0xeec0_0000);
pub const UXSTACKTOP: Address<V> = UTOP;
pub const USTACKTOP: Address<V> = Address::new(UTOP.as_usize() - 2 * PGSIZE);

/// Page directory index of `va`.
pub const fn pdx(va: Address<V>) -> usize {
    (va.as_usize() >> PDXSHIFT) & (NPDENTRIES - 1)
}

/// Page table index of `va`.
pub const fn ptx(va: Address<V>) -> usize {
    (va.as_usize() >> PGSHIFT) & (NPTENTRIES - 1)
}

/// Virtual page number of the first page covered by page directory slot `pdx`.
pub const fn first_page_of(pdx: usize) -> usize {
    pdx * NPTENTRIES
}

/// The single page backing the user exception stack.
pub const fn exception_stack_page() -> Page<Size4K> {
    Page::from_index(UXSTACKTOP.as_usize() / PGSIZE - 1)
}

/// Number of page directory slots below `UTOP`.
pub const fn user_pdes() -> usize {
    UTOP.as_usize().div_ceil(PTSIZE)
}

/// Whether `va` may be named in a page syscall.
pub const fn is_user_page_address(va: Address<V>) -> bool {
    va.as_usize() < UTOP.as_usize() && va.offset_in(PGSIZE) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_page_sits_below_text() {
        assert_eq!(PFTEMP, Address::new(0x007f_f000));
        assert!(PFTEMP < UTEXT);
    }

    #[test]
    fn exception_stack_is_the_last_user_page() {
        let page = exception_stack_page();
        assert_eq!(page.end(), UXSTACKTOP);
        assert_eq!(page.start(), Address::new(0xeebf_f000));
        assert_eq!(pdx(page.start()), 0x3ba);
        assert_eq!(ptx(page.start()), 0x3ff);
    }

    #[test]
    fn user_directory_slots() {
        assert_eq!(user_pdes(), 0x3bb);
        assert_eq!(first_page_of(1), 1024);
        assert!(is_user_page_address(UTEXT));
        assert!(!is_user_page_address(UTOP));
        assert!(!is_user_page_address(UTEXT + 1));
    }
}

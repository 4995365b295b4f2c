mod page_table;

pub use page_table::*;

use crate::address::*;
use crate::page::*;
use bitflags::bitflags;
use core::fmt::Debug;

bitflags! {
    /// Hardware page table entry bits, plus the bits left to user software.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        const PRESENT = 0x001;
        const WRITABLE = 0x002;
        const USER = 0x004;
        const WRITE_THROUGH = 0x008;
        const NO_CACHE = 0x010;
        const ACCESSED = 0x020;
        const DIRTY = 0x040;
        const HUGE = 0x080;
        const GLOBAL = 0x100;
        /// Ignored by the MMU and the kernel, free for user-level use.
        const AVAILABLE = 0xe00;
        /// Copy-on-write marker. One of the `AVAILABLE` bits.
        const COPY_ON_WRITE = 0x800;
    }
}

impl PageFlags {
    /// Bits a user environment may pass to the page syscalls.
    pub const SYSCALL: PageFlags = PageFlags::PRESENT
        .union(PageFlags::WRITABLE)
        .union(PageFlags::USER)
        .union(PageFlags::AVAILABLE);

    pub const fn user_data() -> PageFlags {
        PageFlags::PRESENT
            .union(PageFlags::USER)
            .union(PageFlags::WRITABLE)
    }
    pub const fn user_readonly() -> PageFlags {
        PageFlags::PRESENT.union(PageFlags::USER)
    }
    pub const fn user_cow() -> PageFlags {
        PageFlags::PRESENT
            .union(PageFlags::USER)
            .union(PageFlags::COPY_ON_WRITE)
    }
    /// Flags the kernel installs on a page directory entry backing user pages.
    pub const fn page_table_flags() -> PageFlags {
        PageFlags::PRESENT
            .union(PageFlags::WRITABLE)
            .union(PageFlags::USER)
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTableEntry(pub(crate) u32);

unsafe impl bytemuck::Zeroable for PageTableEntry {}

unsafe impl bytemuck::Pod for PageTableEntry {}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.0 != 0 {
            write!(f, "{:?} {:?}", self.address(), self.flags())
        } else {
            write!(f, "{:#x?}", self.0)
        }
    }
}

impl PageTableEntry {
    const ADDRESS_MASK: u32 = 0xffff_f000;
    const FLAGS_MASK: u32 = !Self::ADDRESS_MASK;

    pub const EMPTY: Self = Self(0);

    pub fn new(frame: Frame, flags: PageFlags) -> Self {
        let a = frame.start().as_usize() as u32 & Self::ADDRESS_MASK;
        Self(a | (flags.bits() & Self::FLAGS_MASK))
    }
    pub fn clear(&mut self) {
        self.0 = 0;
    }
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
    pub fn present(&self) -> bool {
        self.flags().contains(PageFlags::PRESENT)
    }
    pub fn user(&self) -> bool {
        self.flags().contains(PageFlags::USER)
    }
    pub fn writable(&self) -> bool {
        self.flags().contains(PageFlags::WRITABLE)
    }
    pub fn copy_on_write(&self) -> bool {
        self.flags().contains(PageFlags::COPY_ON_WRITE)
    }
    pub fn address(&self) -> Address<P> {
        ((self.0 & Self::ADDRESS_MASK) as usize).into()
    }
    pub fn frame(&self) -> Frame {
        Frame::new(self.address())
    }
    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_retain(self.0 & Self::FLAGS_MASK)
    }
    pub fn update_flags(&mut self, new_flags: PageFlags) {
        self.0 = (self.0 & Self::ADDRESS_MASK) | (new_flags.bits() & Self::FLAGS_MASK);
    }
    pub fn set(&mut self, frame: Frame, flags: PageFlags) {
        *self = Self::new(frame, flags);
    }
}

pub trait TableLevel: Debug + 'static {
    const ID: usize;
    const SHIFT: usize;
}

/// Page directory.
#[derive(Debug)]
pub struct L2;

impl TableLevel for L2 {
    const ID: usize = 2;
    const SHIFT: usize = Size4M::LOG_BYTES;
}

/// Page table.
#[derive(Debug)]
pub struct L1;

impl TableLevel for L1 {
    const ID: usize = 1;
    const SHIFT: usize = Size4K::LOG_BYTES;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cow_bit_is_user_available() {
        assert!(PageFlags::AVAILABLE.contains(PageFlags::COPY_ON_WRITE));
        assert!(PageFlags::SYSCALL.contains(PageFlags::COPY_ON_WRITE));
        assert!(!PageFlags::SYSCALL.contains(PageFlags::DIRTY));
    }

    #[test]
    fn entry_packs_frame_and_flags() {
        let frame = Frame::from_index(0x42);
        let mut pte = PageTableEntry::new(frame, PageFlags::user_cow());
        assert_eq!(pte.frame(), frame);
        assert!(pte.present() && pte.user() && pte.copy_on_write());
        assert!(!pte.writable());
        pte.update_flags(PageFlags::user_data());
        assert_eq!(pte.frame(), frame);
        assert!(pte.writable() && !pte.copy_on_write());
        pte.clear();
        assert!(pte.is_empty() && !pte.present());
    }
}

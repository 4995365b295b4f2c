use super::*;
use crate::address::*;
use crate::layout::NPTENTRIES;
use alloc::boxed::Box;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

#[repr(C, align(4096))]
#[derive(Debug)]
pub struct PageTable<L: TableLevel = L1> {
    pub entries: [PageTableEntry; NPTENTRIES],
    phantom: PhantomData<L>,
}

impl<L: TableLevel> Index<usize> for PageTable<L> {
    type Output = PageTableEntry;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl<L: TableLevel> IndexMut<usize> for PageTable<L> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

impl<L: TableLevel> PageTable<L> {
    const MASK: usize = (NPTENTRIES - 1) << L::SHIFT;

    pub fn new() -> Box<Self> {
        Box::new(Self {
            entries: [PageTableEntry::EMPTY; NPTENTRIES],
            phantom: PhantomData,
        })
    }

    #[inline]
    pub fn is_clear(&self) -> bool {
        self.entries.iter().all(|e| e.is_empty())
    }

    #[inline]
    pub const fn get_index(a: Address<V>) -> usize {
        (a.as_usize() & Self::MASK) >> L::SHIFT
    }

    /// Visit every present entry together with the virtual address it maps,
    /// relative to `base`.
    pub fn walk(&self, base: Address<V>, visitor: &mut impl FnMut(&PageTableEntry, Address<V>)) {
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.present() {
                visitor(entry, base + (i << L::SHIFT));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Frame;

    #[test]
    fn indices_split_the_address() {
        let a = Address::<V>::new(0x0080_3123);
        assert_eq!(PageTable::<L2>::get_index(a), 2);
        assert_eq!(PageTable::<L1>::get_index(a), 3);
    }

    #[test]
    fn walk_skips_absent_entries() {
        let mut table = PageTable::<L1>::new();
        assert!(table.is_clear());
        table[5] = PageTableEntry::new(Frame::from_index(9), PageFlags::user_data());
        let mut seen = alloc::vec::Vec::new();
        let base = Address::new(0x0040_0000);
        table.walk(base, &mut |e, a| seen.push((e.frame(), a)));
        assert_eq!(seen, [(Frame::from_index(9), Address::new(0x0040_5000))]);
    }
}

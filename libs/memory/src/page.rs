//! Abstractions for virtual pages and physical frames.

use super::address::*;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

pub trait PageSize: 'static + Sized {
    const NAME: &'static str;
    const LOG_BYTES: usize;
    const BYTES: usize = 1 << Self::LOG_BYTES;
    const MASK: usize = Self::BYTES - 1;
}

pub struct Size4K;

impl PageSize for Size4K {
    const NAME: &'static str = "4K";
    const LOG_BYTES: usize = 12;
}

/// The region covered by one second-level page table.
pub struct Size4M;

impl PageSize for Size4M {
    const NAME: &'static str = "4M";
    const LOG_BYTES: usize = 22;
}

#[repr(transparent)]
pub struct Page<S: PageSize = Size4K, K: MemoryKind = V>(usize, PhantomData<(S, K)>);

pub type Frame<S = Size4K> = Page<S, P>;

impl<S: PageSize, K: MemoryKind> Page<S, K> {
    pub const LOG_BYTES: usize = S::LOG_BYTES;
    pub const BYTES: usize = 1 << Self::LOG_BYTES;
    pub const MASK: usize = Self::BYTES - 1;

    pub const fn new(a: Address<K>) -> Self {
        debug_assert!(Self::is_aligned(a));
        Self(a.as_usize(), PhantomData)
    }

    pub const fn containing(a: Address<K>) -> Self {
        Self::new(Self::align(a))
    }

    /// The page with page number `index`.
    pub const fn from_index(index: usize) -> Self {
        Self(index << S::LOG_BYTES, PhantomData)
    }

    pub const fn align(a: Address<K>) -> Address<K> {
        Address::new(a.as_usize() & !Self::MASK)
    }

    pub const fn is_aligned(a: Address<K>) -> bool {
        (a.as_usize() & Self::MASK) == 0
    }

    pub const fn start(&self) -> Address<K> {
        Address::new(self.0)
    }

    pub const fn end(&self) -> Address<K> {
        Address::new(self.0 + Self::BYTES)
    }

    /// Page number, i.e. the start address divided by the page size.
    pub const fn index(&self) -> usize {
        self.0 >> S::LOG_BYTES
    }

    pub const fn contains(&self, a: Address<K>) -> bool {
        a.as_usize() >= self.0 && a.as_usize() - self.0 < Self::BYTES
    }
}

impl<S: PageSize, K: MemoryKind> fmt::Debug for Page<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<{:#x} {}>", self.0, S::NAME)
    }
}

impl<S: PageSize, K: MemoryKind> Clone for Page<S, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: PageSize, K: MemoryKind> Copy for Page<S, K> {}

impl<S: PageSize, K: MemoryKind> PartialEq for Page<S, K> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<S: PageSize, K: MemoryKind> Eq for Page<S, K> {}

impl<S: PageSize, K: MemoryKind> PartialOrd for Page<S, K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: PageSize, K: MemoryKind> Ord for Page<S, K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<S: PageSize, K: MemoryKind> Hash for Page<S, K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containing_rounds_down() {
        let page = Page::<Size4K>::containing(Address::new(0x0080_1234));
        assert_eq!(page.start(), Address::new(0x0080_1000));
        assert_eq!(page.end(), Address::new(0x0080_2000));
        assert_eq!(page.index(), 0x801);
        assert!(page.contains(Address::new(0x0080_1fff)));
        assert!(!page.contains(Address::new(0x0080_2000)));
    }

    #[test]
    fn index_round_trip_through_frames() {
        let frame = Frame::<Size4K>::from_index(7);
        assert_eq!(frame.start(), Address::<P>::new(0x7000));
        assert_eq!(Frame::<Size4K>::containing(Address::new(0x7fff)), frame);
    }
}

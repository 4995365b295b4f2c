use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::ops::*;

pub trait MemoryKind: 'static + Sized {}

pub struct Virtual;

pub type V = Virtual;

impl MemoryKind for Virtual {}

pub struct Physical;

pub type P = Physical;

impl MemoryKind for Physical {}

#[repr(transparent)]
pub struct Address<K: MemoryKind = Virtual>(usize, PhantomData<K>);

impl<K: MemoryKind> Address<K> {
    pub const ZERO: Self = Address::new(0usize);

    pub const fn new(v: usize) -> Self {
        Self(v, PhantomData)
    }

    pub const fn align_up(&self, align: usize) -> Self {
        debug_assert!(align.is_power_of_two());
        let mask = align - 1;
        Self::new((self.0 + mask) & !mask)
    }

    pub const fn align_down(&self, align: usize) -> Self {
        debug_assert!(align.is_power_of_two());
        let mask = align - 1;
        Self::new(self.0 & !mask)
    }

    pub const fn is_aligned_to(&self, align: usize) -> bool {
        debug_assert!(align.is_power_of_two());
        (self.0 & (align - 1)) == 0
    }

    pub const fn as_usize(&self) -> usize {
        self.0
    }

    /// Byte offset of this address inside its containing `align`-sized block.
    pub const fn offset_in(&self, align: usize) -> usize {
        debug_assert!(align.is_power_of_two());
        self.0 & (align - 1)
    }
}

impl<K: MemoryKind> Clone for Address<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: MemoryKind> Copy for Address<K> {}

impl<K: MemoryKind> Default for Address<K> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<K: MemoryKind> From<usize> for Address<K> {
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}

impl<K: MemoryKind> From<Address<K>> for usize {
    fn from(value: Address<K>) -> usize {
        value.0
    }
}

impl<K: MemoryKind> Deref for Address<K> {
    type Target = usize;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<K: MemoryKind> PartialEq for Address<K> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K: MemoryKind> Eq for Address<K> {}

impl<K: MemoryKind> PartialOrd for Address<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: MemoryKind> Ord for Address<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<K: MemoryKind> Hash for Address<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl<K: MemoryKind> Add<usize> for Address<K> {
    type Output = Self;
    fn add(self, other: usize) -> Self::Output {
        Self::new(self.0 + other)
    }
}

impl<K: MemoryKind> AddAssign<usize> for Address<K> {
    fn add_assign(&mut self, other: usize) {
        *self = *self + other
    }
}

impl<K: MemoryKind> Sub<Self> for Address<K> {
    type Output = usize;
    fn sub(self, other: Self) -> Self::Output {
        debug_assert!(self.0 >= other.0);
        self.0 - other.0
    }
}

impl<K: MemoryKind> Sub<usize> for Address<K> {
    type Output = Self;
    fn sub(self, other: usize) -> Self::Output {
        Self::new(self.0 - other)
    }
}

impl<K: MemoryKind> SubAssign<usize> for Address<K> {
    fn sub_assign(&mut self, other: usize) {
        *self = *self - other
    }
}

impl<K: MemoryKind> fmt::Debug for Address<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl<K: MemoryKind> fmt::Display for Address<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

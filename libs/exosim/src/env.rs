use std::collections::BTreeMap;
use std::fmt;

use memory::address::{Address, V};
use memory::layout::{pdx, ptx};
use memory::page::Frame;
use memory::page_table::{PageFlags, PageTable, PageTableEntry, L1, L2};
use syscall::{EnvId, EnvInfo, EnvStatus, Fatal, SysError, UTrapframe, Upcall};

use crate::frame::FrameTable;
use crate::Sim;

/// Two-level page table of one env.
///
/// A page table, once created, stays for the life of the env.
pub struct AddressSpace {
    directory: Box<PageTable<L2>>,
    tables: BTreeMap<usize, Box<PageTable<L1>>>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self {
            directory: PageTable::new(),
            tables: BTreeMap::new(),
        }
    }

    pub fn pde(&self, pdx: usize) -> PageTableEntry {
        self.directory.entries.get(pdx).copied().unwrap_or_default()
    }

    pub fn pte(&self, va: Address<V>) -> PageTableEntry {
        self.tables
            .get(&pdx(va))
            .map_or(PageTableEntry::EMPTY, |table| table[ptx(va)])
    }

    /// Entry for `va`, creating its page table if needed.
    fn walk_create(
        &mut self,
        va: Address<V>,
        frames: &mut FrameTable,
    ) -> Result<&mut PageTableEntry, SysError> {
        let index = pdx(va);
        if !self.directory[index].present() {
            let frame = frames.alloc().ok_or(SysError::NoMem)?;
            frames.incref(frame);
            self.directory[index].set(frame, PageFlags::page_table_flags());
            self.tables.insert(index, PageTable::new());
        }
        let table = self.tables.get_mut(&index).ok_or(SysError::Unspecified)?;
        Ok(&mut table[ptx(va)])
    }

    /// Map `frame` at `va`, replacing any previous mapping.
    pub fn insert(
        &mut self,
        frames: &mut FrameTable,
        frame: Frame,
        va: Address<V>,
        perm: PageFlags,
    ) -> Result<(), SysError> {
        let pte = self.walk_create(va, frames)?;
        // Take the new reference first: `frame` may be the one already here.
        frames.incref(frame);
        if pte.present() {
            frames.decref(pte.frame());
        }
        *pte = PageTableEntry::new(frame, perm | PageFlags::PRESENT);
        Ok(())
    }

    pub fn remove(&mut self, frames: &mut FrameTable, va: Address<V>) {
        let Some(table) = self.tables.get_mut(&pdx(va)) else {
            return;
        };
        let pte = &mut table[ptx(va)];
        if pte.present() {
            frames.decref(pte.frame());
        }
        pte.clear();
    }

    /// Drop every mapping and page table.
    pub fn release(&mut self, frames: &mut FrameTable) {
        let mut decref = |entry: &PageTableEntry, _| frames.decref(entry.frame());
        for table in self.tables.values() {
            table.walk(Address::ZERO, &mut decref);
        }
        self.tables.clear();
        self.directory.walk(Address::ZERO, &mut decref);
        self.directory.entries.fill(PageTableEntry::EMPTY);
    }

    /// Number of present user pages.
    pub fn mapped_pages(&self) -> usize {
        self.tables
            .values()
            .map(|table| table.entries.iter().filter(|e| e.present()).count())
            .sum()
    }
}

/// How an env left the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Destroyed on request.
    Destroyed,
    /// Its fault handler gave up.
    Panicked(Fatal),
    /// Faulted with no upcall registered.
    UnhandledFault(UTrapframe),
    /// Faulted without a writable exception stack.
    NoExceptionStack(UTrapframe),
    /// Faulted while its fault handler was running.
    RecursiveFault(UTrapframe),
    /// The handler returned but the access still faults.
    FaultPersisted(UTrapframe),
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destroyed => f.write_str("destroyed"),
            Self::Panicked(fatal) => write!(f, "panic: {fatal}"),
            Self::UnhandledFault(utf) => write!(f, "unhandled fault at {}", utf.fault_va),
            Self::NoExceptionStack(utf) => {
                write!(f, "no exception stack for fault at {}", utf.fault_va)
            }
            Self::RecursiveFault(utf) => write!(f, "recursive fault at {}", utf.fault_va),
            Self::FaultPersisted(utf) => write!(f, "fault at {} not resolved", utf.fault_va),
        }
    }
}

pub struct Env {
    pub id: EnvId,
    pub parent_id: EnvId,
    pub status: EnvStatus,
    pub space: AddressSpace,
    pub upcall: Option<Upcall<Sim>>,
    /// The env resumes inside `exofork` and sees it return `Child`.
    /// Dropped on its first user memory access.
    pub fork_return_pending: bool,
    pub in_fault_handler: bool,
}

impl Env {
    pub fn new(id: EnvId, parent_id: EnvId, status: EnvStatus) -> Self {
        Self {
            id,
            parent_id,
            status,
            space: AddressSpace::new(),
            upcall: None,
            fork_return_pending: false,
            in_fault_handler: false,
        }
    }

    pub fn info(&self) -> EnvInfo {
        EnvInfo {
            id: self.id,
            parent_id: self.parent_id,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinserting_the_same_frame_keeps_it_alive() {
        let mut frames = FrameTable::new(8);
        let mut space = AddressSpace::new();
        let frame = frames.alloc().unwrap();
        let va = Address::new(0x0080_0000);
        space
            .insert(&mut frames, frame, va, PageFlags::user_data())
            .unwrap();
        // One page table frame plus the page itself.
        assert_eq!(frames.in_use(), 2);
        space
            .insert(&mut frames, frame, va, PageFlags::user_cow())
            .unwrap();
        assert_eq!(frames.refcount(frame), 1);
        assert!(space.pte(va).copy_on_write());
        space.remove(&mut frames, va);
        assert_eq!(frames.in_use(), 1);
        assert!(space.pde(pdx(va)).present());
        space.release(&mut frames);
        assert_eq!(frames.in_use(), 0);
    }
}

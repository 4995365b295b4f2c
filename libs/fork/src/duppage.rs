use memory::layout::exception_stack_page;
use memory::page::{Page, Size4K};
use memory::page_table::{PageFlags, PageTableEntry};
use syscall::{EnvId, Fatal, Kernel, OrFatal, Syscall};

/// How one page of the parent is carried into a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// The exception stack. Never shared; the child gets a fresh page.
    ExceptionStack,
    /// Not present or not user accessible. Nothing to carry over.
    Unmapped,
    /// Writable or already copy-on-write. Shared copy-on-write by both sides.
    CopyOnWrite,
    /// Present and read-only. Shared as is.
    ReadOnly,
}

impl PageKind {
    pub fn classify(page: Page<Size4K>, pte: PageTableEntry) -> Self {
        if page == exception_stack_page() {
            Self::ExceptionStack
        } else if !pte.present() || !pte.user() {
            Self::Unmapped
        } else if pte.writable() || pte.copy_on_write() {
            Self::CopyOnWrite
        } else {
            Self::ReadOnly
        }
    }
}

/// Map our virtual page `pn` into `child` at the same address.
pub fn duppage<K: Kernel>(k: &mut K, child: EnvId, pn: usize) -> Result<(), Fatal> {
    let page = Page::<Size4K>::from_index(pn);
    let va = page.start();
    match PageKind::classify(page, k.pte(pn)) {
        PageKind::ExceptionStack => {
            k.page_alloc(child, va, PageFlags::user_data())
                .or_fatal(Syscall::PageAlloc, va)?;
        }
        PageKind::Unmapped => {}
        PageKind::CopyOnWrite => {
            // Child first, then us. We may be writing this very page (our own
            // stack) while forking; a fault between the two calls must copy
            // out of a page the child already maps.
            k.page_map(EnvId::CURRENT, va, child, va, PageFlags::user_cow())
                .or_fatal(Syscall::PageMap, va)?;
            // Re-tag even if it was already COW: the child is a new sharer.
            k.page_map(
                EnvId::CURRENT,
                va,
                EnvId::CURRENT,
                va,
                PageFlags::user_cow(),
            )
            .or_fatal(Syscall::PageMap, va)?;
        }
        PageKind::ReadOnly => {
            k.page_map(EnvId::CURRENT, va, child, va, PageFlags::user_readonly())
                .or_fatal(Syscall::PageMap, va)?;
        }
    }
    Ok(())
}

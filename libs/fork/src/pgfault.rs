use memory::layout::{exception_stack_page, PFTEMP};
use memory::page::{Page, Size4K};
use memory::page_table::PageFlags;
use syscall::{EnvId, Fatal, Kernel, OrFatal, Syscall, UTrapframe, Upcall, UserMemory};

/// Copy-on-write fault handler.
///
/// A write to a page tagged `COPY_ON_WRITE` is resolved by allocating a fresh
/// page at `PFTEMP`, copying the faulting page into it, and moving it over the
/// faulting address writable. Every other fault is fatal.
///
/// Runs on the env's private exception stack, so it never faults on its own
/// stack while that stack could be shared.
pub fn pgfault<K: Kernel + UserMemory>(k: &mut K, utf: &UTrapframe) -> Result<(), Fatal> {
    let page = Page::<Size4K>::containing(utf.fault_va);
    let pte = k.pte(page.index());
    if !utf.is_write() || !pte.copy_on_write() {
        return Err(Fatal::UnhandledFault {
            va: utf.fault_va,
            err: utf.err,
            flags: pte.flags(),
            eip: utf.eip,
        });
    }
    let addr = page.start();
    k.page_alloc(EnvId::CURRENT, PFTEMP, PageFlags::user_data())
        .or_fatal(Syscall::PageAlloc, PFTEMP)?;
    k.copy_page(PFTEMP, addr)?;
    k.page_map(
        EnvId::CURRENT,
        PFTEMP,
        EnvId::CURRENT,
        addr,
        PageFlags::user_data(),
    )
    .or_fatal(Syscall::PageMap, addr)?;
    k.page_unmap(EnvId::CURRENT, PFTEMP)
        .or_fatal(Syscall::PageUnmap, PFTEMP)?;
    trace!("pgfault: private copy of {:?} (eip {:#x})", page, utf.eip);
    Ok(())
}

/// Install `handler` as the calling env's page fault upcall, allocating the
/// exception stack on first use. Safe to call repeatedly.
pub fn set_pgfault_handler<K: Kernel>(k: &mut K, handler: Upcall<K>) -> Result<(), Fatal> {
    let xstack = exception_stack_page();
    if !k.pte(xstack.index()).present() {
        k.page_alloc(EnvId::CURRENT, xstack.start(), PageFlags::user_data())
            .or_fatal(Syscall::PageAlloc, xstack.start())?;
        debug!("exception stack allocated at {:?}", xstack);
    }
    k.env_set_pgfault_upcall(EnvId::CURRENT, handler)
        .or_fatal(Syscall::EnvSetPgfaultUpcall, xstack.start())
}

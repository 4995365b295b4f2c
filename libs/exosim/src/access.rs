//! User-mode memory accesses and page fault delivery.

use bytemuck::Pod;
use memory::address::{Address, V};
use memory::layout::{exception_stack_page, PGSIZE};
use memory::page::Frame;
use memory::page_table::PageTableEntry;
use syscall::{Fatal, FaultError, UTrapframe, UserMemory};

use crate::env::Exit;
use crate::error::AccessError;
use crate::Sim;

/// The frame behind `pte` if a user access of this kind may go through.
fn accessible(pte: PageTableEntry, write: bool) -> Option<Frame> {
    let ok = pte.present() && pte.user() && (!write || pte.writable());
    ok.then(|| pte.frame())
}

fn fault_error(pte: PageTableEntry, write: bool) -> FaultError {
    let mut err = FaultError::USER;
    if write {
        err |= FaultError::WRITE;
    }
    if pte.present() {
        err |= FaultError::PROTECTION;
    }
    err
}

impl Sim {
    /// Load `buf.len()` bytes at `va` as the current env.
    pub fn read(&mut self, va: Address<V>, buf: &mut [u8]) -> Result<(), AccessError> {
        let mut done = 0;
        while done < buf.len() {
            let at = va + done;
            let offset = at.offset_in(PGSIZE);
            let n = (PGSIZE - offset).min(buf.len() - done);
            let frame = self.resolve(at, false)?;
            let bytes = self.frames.bytes(frame).ok_or(AccessError::Unbacked(at))?;
            buf[done..done + n].copy_from_slice(&bytes[offset..offset + n]);
            done += n;
        }
        Ok(())
    }

    /// Store `data` at `va` as the current env, taking write faults as needed.
    pub fn write(&mut self, va: Address<V>, data: &[u8]) -> Result<(), AccessError> {
        let mut done = 0;
        while done < data.len() {
            let at = va + done;
            let offset = at.offset_in(PGSIZE);
            let n = (PGSIZE - offset).min(data.len() - done);
            let frame = self.resolve(at, true)?;
            let bytes = self
                .frames
                .bytes_mut(frame)
                .ok_or(AccessError::Unbacked(at))?;
            bytes[offset..offset + n].copy_from_slice(&data[done..done + n]);
            done += n;
        }
        Ok(())
    }

    pub fn read_value<T: Pod>(&mut self, va: Address<V>) -> Result<T, AccessError> {
        let mut value = T::zeroed();
        self.read(va, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    pub fn write_value<T: Pod>(&mut self, va: Address<V>, value: &T) -> Result<(), AccessError> {
        self.write(va, bytemuck::bytes_of(value))
    }

    /// Translate one user access, delivering at most one fault for it.
    fn resolve(&mut self, va: Address<V>, write: bool) -> Result<Frame, AccessError> {
        let slot = self.current.ok_or(AccessError::NoCurrentEnv)?;
        if let Some(env) = self.envs[slot].as_mut() {
            // Running user code means the env is past its `exofork` return.
            env.fork_return_pending = false;
        }
        let pte = self.user_pte(va)?;
        if let Some(frame) = accessible(pte, write) {
            return Ok(frame);
        }
        let utf = UTrapframe {
            fault_va: va,
            err: fault_error(pte, write),
            eip: 0,
            esp: 0,
        };
        self.dispatch(slot, utf)?;
        let pte = self.user_pte(va)?;
        match accessible(pte, write) {
            Some(frame) => Ok(frame),
            None => {
                let exit = Exit::FaultPersisted(utf);
                Err(AccessError::Killed(self.kill(slot, exit), exit))
            }
        }
    }

    fn user_pte(&self, va: Address<V>) -> Result<PageTableEntry, AccessError> {
        self.current_env()
            .map(|env| env.space.pte(va))
            .ok_or(AccessError::NoCurrentEnv)
    }

    /// Run the current env's fault upcall on its exception stack.
    fn dispatch(&mut self, slot: usize, mut utf: UTrapframe) -> Result<(), AccessError> {
        self.faults += 1;
        let env = self.envs[slot].as_mut().ok_or(AccessError::NoCurrentEnv)?;
        let xstack = exception_stack_page();
        let exit = if env.in_fault_handler {
            Some(Exit::RecursiveFault(utf))
        } else if env.upcall.is_none() {
            Some(Exit::UnhandledFault(utf))
        } else if accessible(env.space.pte(xstack.start()), true).is_none() {
            Some(Exit::NoExceptionStack(utf))
        } else {
            None
        };
        if let Some(exit) = exit {
            return Err(AccessError::Killed(self.kill(slot, exit), exit));
        }
        let Some(upcall) = env.upcall else {
            return Err(AccessError::NoCurrentEnv);
        };
        utf.esp = xstack.end().as_usize();
        env.in_fault_handler = true;
        debug!("env {}: {:?} fault at {}", env.id, utf.err, utf.fault_va);
        let result = upcall(self, &utf);
        if let Some(env) = self.envs[slot].as_mut() {
            env.in_fault_handler = false;
        }
        result.map_err(|fatal| {
            let exit = Exit::Panicked(fatal);
            AccessError::Killed(self.kill(slot, exit), exit)
        })
    }
}

impl UserMemory for Sim {
    fn copy_page(&mut self, dst: Address<V>, src: Address<V>) -> Result<(), Fatal> {
        let env = self.current_env().ok_or(Fatal::NestedFault { va: src })?;
        let from = accessible(env.space.pte(src), false);
        let to = accessible(env.space.pte(dst), true);
        let from = from.ok_or(Fatal::NestedFault { va: src })?;
        let to = to.ok_or(Fatal::NestedFault { va: dst })?;
        let data = *self
            .frames
            .bytes(from)
            .ok_or(Fatal::NestedFault { va: src })?;
        *self
            .frames
            .bytes_mut(to)
            .ok_or(Fatal::NestedFault { va: dst })? = data;
        self.copies += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory::layout::UTEXT;
    use memory::page_table::PageFlags;
    use syscall::{EnvId, Kernel};

    use crate::SimConfig;

    fn demand_zero(k: &mut Sim, utf: &UTrapframe) -> Result<(), Fatal> {
        let va = utf.fault_va.align_down(PGSIZE);
        k.page_alloc(EnvId::CURRENT, va, PageFlags::user_data())
            .map_err(|err| Fatal::Syscall {
                call: syscall::Syscall::PageAlloc,
                va,
                err,
            })
    }

    fn ignore(_: &mut Sim, _: &UTrapframe) -> Result<(), Fatal> {
        Ok(())
    }

    fn sim_with_xstack() -> (Sim, EnvId) {
        let mut sim = Sim::new(SimConfig::default().with_max_frames(32));
        let id = sim.spawn().unwrap();
        sim.page_alloc(
            EnvId::CURRENT,
            exception_stack_page().start(),
            PageFlags::user_data(),
        )
        .unwrap();
        (sim, id)
    }

    #[test]
    fn accesses_span_pages() {
        let (mut sim, _) = sim_with_xstack();
        sim.page_alloc(EnvId::CURRENT, UTEXT, PageFlags::user_data())
            .unwrap();
        sim.page_alloc(EnvId::CURRENT, UTEXT + PGSIZE, PageFlags::user_data())
            .unwrap();
        let at = UTEXT + (PGSIZE - 2);
        sim.write_value(at, &0xdead_beef_u32).unwrap();
        assert_eq!(sim.read_value::<u32>(at).unwrap(), 0xdead_beef);
        assert_eq!(sim.stats().faults_dispatched, 0);
    }

    #[test]
    fn fault_without_upcall_kills() {
        let (mut sim, id) = sim_with_xstack();
        let err = sim.read_value::<u8>(UTEXT).unwrap_err();
        let AccessError::Killed(killed, Exit::UnhandledFault(utf)) = err else {
            panic!("unexpected {err:?}");
        };
        assert_eq!(killed, id);
        assert_eq!(utf.fault_va, UTEXT);
        assert_eq!(utf.err, FaultError::USER);
        assert_eq!(sim.current(), None);
        assert_eq!(sim.stats().frames_in_use, 0);
        assert_eq!(sim.read_value::<u8>(UTEXT), Err(AccessError::NoCurrentEnv));
    }

    #[test]
    fn fault_is_resolved_by_the_upcall() {
        let (mut sim, id) = sim_with_xstack();
        sim.env_set_pgfault_upcall(EnvId::CURRENT, demand_zero)
            .unwrap();
        sim.write(UTEXT + 8, b"abc").unwrap();
        let mut buf = [0; 3];
        assert!(sim.peek(id, UTEXT + 8, &mut buf));
        assert_eq!(&buf, b"abc");
        assert_eq!(sim.stats().faults_dispatched, 1);
    }

    #[test]
    fn fault_needs_an_exception_stack() {
        let mut sim = Sim::default();
        let id = sim.spawn().unwrap();
        sim.env_set_pgfault_upcall(EnvId::CURRENT, demand_zero)
            .unwrap();
        let err = sim.write_value(UTEXT, &1u8).unwrap_err();
        let AccessError::Killed(killed, Exit::NoExceptionStack(_)) = err else {
            panic!("unexpected {err:?}");
        };
        assert_eq!(killed, id);
    }

    #[test]
    fn unresolved_fault_kills() {
        let (mut sim, id) = sim_with_xstack();
        sim.page_alloc(EnvId::CURRENT, UTEXT, PageFlags::user_readonly())
            .unwrap();
        sim.env_set_pgfault_upcall(EnvId::CURRENT, ignore).unwrap();
        assert_eq!(sim.read_value::<u8>(UTEXT), Ok(0));
        let err = sim.write_value(UTEXT, &1u8).unwrap_err();
        let AccessError::Killed(_, Exit::FaultPersisted(utf)) = err else {
            panic!("unexpected {err:?}");
        };
        assert_eq!(
            utf.err,
            FaultError::USER | FaultError::WRITE | FaultError::PROTECTION
        );
        assert_eq!(sim.abort_reason(id), Some(&Exit::FaultPersisted(utf)));
    }

    #[test]
    fn copy_page_needs_both_pages_mapped() {
        let (mut sim, _) = sim_with_xstack();
        sim.page_alloc(EnvId::CURRENT, UTEXT, PageFlags::user_data())
            .unwrap();
        sim.write(UTEXT, b"page").unwrap();
        let dst = UTEXT + PGSIZE;
        let err = sim.copy_page(dst, UTEXT).unwrap_err();
        assert_eq!(err, Fatal::NestedFault { va: dst });
        sim.page_alloc(EnvId::CURRENT, dst, PageFlags::user_data())
            .unwrap();
        sim.copy_page(dst, UTEXT).unwrap();
        assert_eq!(sim.read_value::<[u8; 4]>(dst).unwrap(), *b"page");
        assert_eq!(sim.stats().pages_copied, 1);
    }
}

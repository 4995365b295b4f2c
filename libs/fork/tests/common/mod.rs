#![allow(dead_code)]

use exosim::{Sim, SimConfig};
use fork::{fork, ForkResult, ThisEnv};
use memory::address::{Address, V};
use memory::layout::{PGSIZE, USTACKTOP, UTEXT};
use memory::page_table::PageFlags;
use syscall::{EnvId, Kernel};

/// Read-only, holds `TEXT_BYTES`.
pub const TEXT: Address<V> = UTEXT;
/// Writable, holds `"hello"`.
pub const HEAP: Address<V> = Address::new(UTEXT.as_usize() + 4 * PGSIZE);
/// Writable, all zero.
pub const BSS: Address<V> = Address::new(HEAP.as_usize() + PGSIZE);
pub const STACK: Address<V> = Address::new(USTACKTOP.as_usize() - PGSIZE);

pub const TEXT_BYTES: &[u8] = b"\x55\x89\xe5\xc3";

/// Frames held by a booted env once its fault handler is installed.
pub const BOOT_FRAMES: usize = 7;

/// Start one env with a small program image. Returns the sim, the env and its
/// `ThisEnv`.
pub fn boot(config: SimConfig) -> (Sim, EnvId, ThisEnv) {
    let mut sim = Sim::new(config);
    let root = sim.spawn().unwrap();
    sim.page_alloc(EnvId::CURRENT, TEXT, PageFlags::user_data())
        .unwrap();
    sim.write(TEXT, TEXT_BYTES).unwrap();
    sim.page_map(
        EnvId::CURRENT,
        TEXT,
        EnvId::CURRENT,
        TEXT,
        PageFlags::user_readonly(),
    )
    .unwrap();
    for va in [HEAP, BSS, STACK] {
        sim.page_alloc(EnvId::CURRENT, va, PageFlags::user_data())
            .unwrap();
    }
    sim.write(HEAP, b"hello").unwrap();
    sim.write_value(STACK + (PGSIZE - 4), &0x1234_u32).unwrap();
    let thisenv = ThisEnv::resolve(&sim).unwrap();
    (sim, root, thisenv)
}

/// Fork the current env, then run the child up to the point where its own
/// `fork` call returns. The child is current afterwards.
pub fn fork_and_enter(sim: &mut Sim, thisenv: &mut ThisEnv) -> (EnvId, ThisEnv) {
    let child = match fork(sim, thisenv) {
        Ok(ForkResult::Parent(child)) => child,
        other => panic!("fork in parent returned {other:?}"),
    };
    sim.switch_to(child).unwrap();
    // The child starts with the parent's copy of `thisenv`.
    let mut inherited = *thisenv;
    assert_eq!(fork(sim, &mut inherited), Ok(ForkResult::Child));
    (child, inherited)
}

pub fn peek_page(sim: &Sim, env: EnvId, va: Address<V>) -> Vec<u8> {
    let mut buf = vec![0; PGSIZE];
    assert!(sim.peek(env, va, &mut buf), "{va} not mapped in {env}");
    buf
}

pub fn read_bytes<const N: usize>(sim: &mut Sim, va: Address<V>) -> [u8; N] {
    let mut buf = [0; N];
    sim.read(va, &mut buf).unwrap();
    buf
}

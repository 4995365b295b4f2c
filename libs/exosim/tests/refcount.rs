use std::collections::BTreeMap;

use exosim::{Sim, SimConfig};
use memory::address::{Address, V};
use memory::layout::{PGSIZE, UTEXT};
use memory::page_table::PageFlags;
use proptest::prelude::*;
use syscall::{EnvId, Exofork, Kernel};

const SLOTS: usize = 6;

fn slot(i: usize) -> Address<V> {
    UTEXT + i * PGSIZE
}

/// Env index and slot index.
type At = (usize, usize);

#[derive(Debug, Clone)]
enum Op {
    /// Fresh page, read-only if set.
    Alloc(At, bool),
    /// Share a page, writable if set.
    Map(At, At, bool),
    Unmap(At),
}

fn op() -> impl Strategy<Value = Op> {
    let at = (0..3usize, 0..SLOTS);
    let parts = (0..3u8, at.clone(), at, any::<bool>());
    parts.prop_map(|(kind, a, b, flag)| match kind {
        0 => Op::Alloc(a, flag),
        1 => Op::Map(a, b, flag),
        _ => Op::Unmap(a),
    })
}

/// A root env and two children it may operate on.
fn machine() -> (Sim, [EnvId; 3]) {
    let mut sim = Sim::new(SimConfig::default().with_max_frames(128));
    let root = sim.spawn().unwrap();
    let mut envs = [root; 3];
    for env in &mut envs[1..] {
        let Ok(Exofork::Parent(child)) = sim.exofork() else {
            panic!("root did not fork");
        };
        *env = child;
    }
    (sim, envs)
}

fn apply(sim: &mut Sim, envs: &[EnvId; 3], op: &Op) {
    // Rejected calls are part of the sequence; only their effect is checked.
    let _ = match *op {
        Op::Alloc((env, i), readonly) => {
            let perm = if readonly {
                PageFlags::user_readonly()
            } else {
                PageFlags::user_data()
            };
            sim.page_alloc(envs[env], slot(i), perm)
        }
        Op::Map((src, i), (dst, j), writable) => {
            let perm = if writable {
                PageFlags::user_data()
            } else {
                PageFlags::user_cow()
            };
            sim.page_map(envs[src], slot(i), envs[dst], slot(j), perm)
        }
        Op::Unmap((env, i)) => sim.page_unmap(envs[env], slot(i)),
    };
}

/// Every mapped frame is referenced exactly once per mapping of it.
fn check_refcounts(sim: &Sim, envs: &[EnvId]) -> Result<(), TestCaseError> {
    let mut mappings = BTreeMap::new();
    for &env in envs {
        for i in 0..SLOTS {
            if let Some(frame) = sim.frame_of(env, slot(i)) {
                *mappings.entry(frame).or_insert(0usize) += 1;
            }
        }
    }
    for (frame, count) in mappings {
        prop_assert_eq!(sim.frame_refcount(frame), count, "{:?}", frame);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn refcounts_match_mappings(ops in prop::collection::vec(op(), 1..48)) {
        let (mut sim, envs) = machine();
        for op in &ops {
            apply(&mut sim, &envs, op);
            check_refcounts(&sim, &envs)?;
        }
    }

    #[test]
    fn destroying_everything_frees_every_frame(
        ops in prop::collection::vec(op(), 1..48),
        order in Just(vec![0usize, 1, 2]).prop_shuffle(),
    ) {
        let (mut sim, envs) = machine();
        for op in &ops {
            apply(&mut sim, &envs, op);
        }
        let mut live = envs.to_vec();
        for i in order {
            sim.destroy(envs[i]).unwrap();
            live.retain(|&env| env != envs[i]);
            check_refcounts(&sim, &live)?;
        }
        prop_assert_eq!(sim.stats().frames_in_use, 0);
    }
}

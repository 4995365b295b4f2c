mod common;

use std::collections::BTreeMap;

use common::*;
use exosim::SimConfig;
use memory::address::{Address, V};
use memory::layout::PGSIZE;
use proptest::prelude::*;
use syscall::EnvId;

const PAGES: [Address<V>; 3] = [HEAP, BSS, STACK];

#[derive(Debug, Clone)]
struct Write {
    env: usize,
    page: usize,
    offset: usize,
    byte: u8,
}

fn write() -> impl Strategy<Value = Write> {
    let parts = (0..8usize, 0..PAGES.len(), 0..PGSIZE, 1..=u8::MAX);
    parts.prop_map(|(env, page, offset, byte)| Write {
        env,
        page,
        offset,
        byte,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Build a fork chain, let random envs write, and check every env sees
    /// exactly its own writes on top of what it inherited.
    #[test]
    fn each_env_sees_only_its_own_writes(
        depth in 1..5usize,
        before in prop::collection::vec(write(), 0..6),
        after in prop::collection::vec(write(), 1..24),
    ) {
        let (mut sim, root, mut thisenv) = boot(SimConfig::default());
        let mut envs = vec![root];
        let mut model: BTreeMap<EnvId, Vec<Vec<u8>>> = BTreeMap::new();
        let pages = PAGES.iter().map(|&va| peek_page(&sim, root, va)).collect();
        model.insert(root, pages);

        for level in 0..depth {
            // Writes by the newest env between forks are inherited.
            let current = envs[level];
            for w in before.iter().filter(|w| w.env % depth == level) {
                sim.write(PAGES[w.page] + w.offset, &[w.byte]).unwrap();
                model.get_mut(&current).unwrap()[w.page][w.offset] = w.byte;
            }
            let (child, inherited) = fork_and_enter(&mut sim, &mut thisenv);
            thisenv = inherited;
            let snapshot = model[&current].clone();
            model.insert(child, snapshot);
            envs.push(child);
        }

        for w in &after {
            let env = envs[w.env % envs.len()];
            sim.switch_to(env).unwrap();
            sim.write(PAGES[w.page] + w.offset, &[w.byte]).unwrap();
            model.get_mut(&env).unwrap()[w.page][w.offset] = w.byte;
        }

        for env in &envs {
            for (i, &va) in PAGES.iter().enumerate() {
                prop_assert_eq!(&peek_page(&sim, *env, va), &model[env][i]);
            }
        }
    }

    /// Pages nobody wrote after the fork stay shared by every env.
    #[test]
    fn untouched_pages_stay_shared(depth in 1..5usize, page in 0..PAGES.len()) {
        let (mut sim, root, mut thisenv) = boot(SimConfig::default());
        let mut envs = vec![root];
        for _ in 0..depth {
            let (child, inherited) = fork_and_enter(&mut sim, &mut thisenv);
            thisenv = inherited;
            envs.push(child);
        }
        let va = PAGES[page];
        let frame = sim.frame_of(root, va).unwrap();
        for env in &envs {
            prop_assert_eq!(sim.frame_of(*env, va), Some(frame));
        }
        prop_assert_eq!(sim.frame_refcount(frame), envs.len());
        prop_assert_eq!(sim.stats().pages_copied, 0);
    }
}

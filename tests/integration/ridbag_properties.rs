#![allow(missing_docs)]

use std::sync::Arc;

use proptest::prelude::*;
use ridbag::{
    primitives::cluster::MemClusterStore,
    storage::{EncodeMode, RelaxPolicy, RidBag, RidBagOptions},
    types::{Identifiable, Rid},
};

#[derive(Clone, Debug)]
enum Op {
    Add(i64),
    Remove(i64),
    AddMany(i64, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0i64..80).prop_map(Op::Add),
        3 => (0i64..80).prop_map(Op::Remove),
        1 => ((0i64..80), 1usize..300).prop_map(|(k, n)| Op::AddMany(k, n)),
    ]
}

fn link(position: i64) -> Identifiable {
    Identifiable::Link(Rid::new(2, position))
}

fn sorted_positions(bag: &mut RidBag) -> Vec<i64> {
    let mut positions: Vec<i64> = bag
        .to_vec()
        .expect("entries load")
        .into_iter()
        .filter_map(|e| e.rid())
        .map(|rid| rid.position)
        .collect();
    positions.sort_unstable();
    positions
}

fn run(ops: &[Op], lookup: bool, policy: RelaxPolicy) {
    let store = Arc::new(MemClusterStore::new(112));
    let options = RidBagOptions::new(store.clone())
        .lookup_table(lookup)
        .relax_policy(policy);
    let mut bag = RidBag::new(options.clone());
    let mut model: Vec<i64> = Vec::new();

    for op in ops {
        match op {
            Op::Add(k) => {
                bag.add(link(*k)).expect("add");
                model.push(*k);
            }
            Op::AddMany(k, n) => {
                for i in 0..*n as i64 {
                    bag.add(link(k + i)).expect("add");
                    model.push(k + i);
                }
            }
            Op::Remove(k) => {
                let expected = model.iter().position(|m| m == k);
                let removed = bag.remove(&link(*k)).expect("remove");
                assert_eq!(removed, expected.is_some());
                if let Some(at) = expected {
                    model.swap_remove(at);
                }
            }
        }
        assert_eq!(bag.len(), model.len());
        bag.check_invariants().expect("invariants");
    }

    model.sort_unstable();
    assert_eq!(sorted_positions(&mut bag), model);
    for k in 0..80 {
        assert_eq!(bag.contains(&link(k)).expect("contains"), model.contains(&k));
    }

    let meta = bag.serialize_to_store().expect("serialize");
    let (mut restored, used) =
        RidBag::deserialize(options.clone(), &meta, EncodeMode::Metadata).expect("decode");
    assert_eq!(used, meta.len());
    assert_eq!(sorted_positions(&mut restored), model);

    let full = bag.serialize(EncodeMode::Full).expect("serialize full");
    let fresh = RidBagOptions::new(Arc::new(MemClusterStore::default())).lookup_table(lookup);
    let (mut copy, _) = RidBag::deserialize(fresh, &full, EncodeMode::Full).expect("decode full");
    assert_eq!(sorted_positions(&mut copy), model);
    copy.check_invariants().expect("copy invariants");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn bag_matches_multiset_model(ops in prop::collection::vec(op(), 1..120), lookup in any::<bool>()) {
        run(&ops, lookup, RelaxPolicy::Soft);
    }

    #[test]
    fn hard_relax_matches_multiset_model(ops in prop::collection::vec(op(), 1..80)) {
        run(&ops, true, RelaxPolicy::Hard);
    }
}

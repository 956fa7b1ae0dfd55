#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use ridbag::{
    primitives::cluster::MemClusterStore,
    storage::{CounterMetrics, RelaxPolicy, RidBag, RidBagOptions, MAX_NODE_SIZE},
    types::{Identifiable, Result, Rid},
};

fn link(i: i64) -> Identifiable {
    Identifiable::Link(Rid::new(9, i))
}

fn small_bag(page_size: u32) -> (Arc<MemClusterStore>, Arc<CounterMetrics>, RidBagOptions) {
    let store = Arc::new(MemClusterStore::new(page_size));
    let metrics = Arc::new(CounterMetrics::default());
    let options = RidBagOptions::new(store.clone()).metrics(metrics.clone());
    (store, metrics, options)
}

fn sorted_rids(bag: &mut RidBag) -> Result<Vec<Rid>> {
    let mut rids: Vec<Rid> = bag
        .to_vec()?
        .into_iter()
        .map(|e| e.rid().expect("links always have an identity"))
        .collect();
    rids.sort();
    Ok(rids)
}

#[test]
fn every_entry_stays_reachable_while_growing() -> Result<()> {
    let (_store, _metrics, options) = small_bag(128);
    let mut bag = RidBag::new(options);
    let mut expected = Vec::new();
    for i in 0..2_000 {
        let value = link(i % 700);
        bag.add(value.clone())?;
        expected.push(value.rid().unwrap());
    }
    expected.sort();
    assert_eq!(bag.len(), 2_000);
    assert_eq!(sorted_rids(&mut bag)?, expected);
    for i in 0..700 {
        assert!(bag.contains(&link(i))?, "entry {i} should be found");
    }
    assert!(!bag.contains(&link(700))?);
    bag.check_invariants()?;
    Ok(())
}

#[test]
fn exactly_six_hundred_inserts_run_one_consolidation() -> Result<()> {
    let (_store, metrics, options) = small_bag(96);
    let mut bag = RidBag::new(options);
    for i in 0..MAX_NODE_SIZE as i64 {
        bag.add(link(i))?;
    }
    assert_eq!(metrics.snapshot().mega_merges, 1);

    let stats = bag.chain_stats();
    assert_eq!(stats.max_size_full_nodes, 1);
    assert!(
        stats.chain_nodes - stats.max_size_full_nodes <= 1,
        "only the tail may remain besides the consolidated node: {stats:?}"
    );
    assert!(stats.free_nodes > 0, "merged nodes are kept for reuse");
    bag.check_invariants()?;
    Ok(())
}

#[test]
fn consolidation_repeats_every_six_hundred_inserts() -> Result<()> {
    let (_store, metrics, options) = small_bag(96);
    let mut bag = RidBag::new(options);
    for i in 0..3 * MAX_NODE_SIZE as i64 {
        bag.add(link(i))?;
    }
    assert_eq!(metrics.snapshot().mega_merges, 3);
    let stats = bag.chain_stats();
    assert_eq!(stats.max_size_full_nodes, 3);
    assert_eq!(bag.len(), 3 * MAX_NODE_SIZE);
    bag.check_invariants()?;
    Ok(())
}

#[test]
fn recycled_nodes_avoid_new_allocations() -> Result<()> {
    let (store, metrics, options) = small_bag(96);
    let mut bag = RidBag::new(options);
    for i in 0..300 {
        bag.add(link(i))?;
    }
    for i in 0..300 {
        assert!(bag.remove(&link(i))?);
    }
    assert!(bag.is_empty());
    let freed = bag.chain_stats().free_nodes;
    assert!(freed > 0);

    let positions = store.allocated_positions();
    let allocated = metrics.snapshot().nodes_allocated;
    for i in 0..100 {
        bag.add(link(i))?;
    }
    let snap = metrics.snapshot();
    assert!(snap.nodes_recycled > 0);
    assert!(bag.chain_stats().free_nodes < freed);
    assert!(store.allocated_positions() - positions <= (snap.nodes_allocated - allocated) as usize);
    bag.check_invariants()?;
    Ok(())
}

#[test]
fn hard_policy_keeps_no_free_nodes_after_consolidation() -> Result<()> {
    let (soft_store, _metrics, soft_options) = small_bag(96);
    let (hard_store, hard_metrics, hard_options) = small_bag(96);
    let mut soft = RidBag::new(soft_options);
    let mut hard = RidBag::new(hard_options.relax_policy(RelaxPolicy::Hard));
    for i in 0..MAX_NODE_SIZE as i64 {
        soft.add(link(i))?;
        hard.add(link(i))?;
    }
    assert!(soft.chain_stats().free_nodes > 0);
    assert_eq!(hard.chain_stats().free_nodes, 0);
    assert!(hard_metrics.snapshot().nodes_released > 0);
    assert!(hard_store.allocated_positions() < soft_store.allocated_positions());
    assert_eq!(sorted_rids(&mut soft)?, sorted_rids(&mut hard)?);
    hard.check_invariants()?;
    Ok(())
}

#[test]
fn seeded_workload_matches_model() -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed_ba6);
    for lookup in [false, true] {
        let (_store, _metrics, options) = small_bag(80);
        let mut bag = RidBag::new(options.lookup_table(lookup));
        let mut model: BTreeMap<i64, usize> = BTreeMap::new();
        for step in 0..3_000 {
            let key = rng.gen_range(0..200);
            if rng.gen_bool(0.65) {
                bag.add(link(key))?;
                *model.entry(key).or_default() += 1;
            } else {
                let expected = model.get(&key).copied().unwrap_or(0) > 0;
                assert_eq!(bag.remove(&link(key))?, expected, "step {step}");
                if expected {
                    let count = model.entry(key).or_default();
                    *count -= 1;
                    if *count == 0 {
                        model.remove(&key);
                    }
                }
            }
            assert_eq!(bag.len(), model.values().sum::<usize>());
            if step % 250 == 0 {
                bag.check_invariants()?;
            }
        }
        let mut expected: Vec<Rid> = model
            .iter()
            .flat_map(|(k, n)| std::iter::repeat(Rid::new(9, *k)).take(*n))
            .collect();
        expected.sort();
        assert_eq!(sorted_rids(&mut bag)?, expected);
        bag.check_invariants()?;
    }
    Ok(())
}

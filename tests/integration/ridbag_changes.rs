#![allow(missing_docs)]

use std::sync::Arc;

use ridbag::{
    primitives::cluster::MemClusterStore,
    storage::{ChangeEvent, ChangeKind, ChangeListener, ChangeLog, RidBag, RidBagOptions},
    types::{Identifiable, Result, Rid, RidBagError},
};

fn link(position: i64) -> Identifiable {
    Identifiable::Link(Rid::new(12, position))
}

fn bag() -> RidBag {
    RidBag::new(RidBagOptions::new(Arc::new(MemClusterStore::default())))
}

fn sorted(mut entries: Vec<Identifiable>) -> Vec<Rid> {
    let mut rids: Vec<Rid> = entries.drain(..).filter_map(|e| e.rid()).collect();
    rids.sort();
    rids
}

#[test]
fn events_arrive_in_mutation_order() -> Result<()> {
    let mut bag = bag();
    let log = Arc::new(ChangeLog::default());
    bag.add_change_listener(log.clone());

    bag.add(link(1))?;
    bag.add(link(2))?;
    assert!(bag.remove(&link(1))?);

    let events = log.events();
    let summary: Vec<(ChangeKind, Option<Rid>)> =
        events.iter().map(|e| (e.kind, e.key.rid())).collect();
    assert_eq!(
        summary,
        vec![
            (ChangeKind::Add, Some(Rid::new(12, 1))),
            (ChangeKind::Add, Some(Rid::new(12, 2))),
            (ChangeKind::Remove, Some(Rid::new(12, 1))),
        ]
    );
    assert_eq!(events[0].new_value, Some(link(1)));
    assert!(events[0].old_value.is_none());
    assert_eq!(events[2].old_value, Some(link(1)));
    assert!(events[2].new_value.is_none());
    Ok(())
}

#[test]
fn missing_entries_and_null_links_emit_nothing() -> Result<()> {
    let mut bag = bag();
    let log = Arc::new(ChangeLog::default());
    bag.add_change_listener(log.clone());

    assert!(!bag.remove(&link(44))?);
    let rejected = bag.add(Identifiable::Link(Rid::NULL));
    assert!(matches!(rejected, Err(RidBagError::InvalidArgument(_))));
    assert!(bag.is_empty());
    assert!(log.is_empty());
    Ok(())
}

#[test]
fn removed_listener_stops_receiving() -> Result<()> {
    let mut bag = bag();
    let kept = Arc::new(ChangeLog::default());
    let dropped = Arc::new(ChangeLog::default());
    bag.add_change_listener(kept.clone());
    let handle: Arc<dyn ChangeListener> = dropped.clone();
    bag.add_change_listener(handle.clone());
    assert_eq!(bag.change_listeners().len(), 2);

    bag.add(link(1))?;
    assert!(bag.remove_change_listener(&handle));
    assert!(!bag.remove_change_listener(&handle));
    bag.add(link(2))?;

    assert_eq!(kept.len(), 2);
    assert_eq!(dropped.len(), 1);
    assert_eq!(bag.change_listeners().len(), 1);
    Ok(())
}

#[test]
fn rollback_restores_the_previous_contents() -> Result<()> {
    let mut bag = bag();
    bag.add_all([link(1), link(2), link(3)])?;
    let log = Arc::new(ChangeLog::default());
    bag.add_change_listener(log.clone());

    bag.add(link(4))?;
    bag.remove(&link(1))?;
    assert_eq!(log.len(), 2);

    let mut original = bag.return_original_state(&log.take())?;
    assert_eq!(sorted(original.to_vec()?), sorted(vec![link(1), link(2), link(3)]));
    assert!(original.change_listeners().is_empty());
    assert!(original.owner().is_none());
    // the live bag is left as it was
    assert_eq!(sorted(bag.to_vec()?), sorted(vec![link(2), link(3), link(4)]));
    Ok(())
}

#[test]
fn rollback_keeps_duplicates() -> Result<()> {
    let mut bag = bag();
    bag.add_all([link(5), link(5)])?;
    let log = Arc::new(ChangeLog::default());
    bag.add_change_listener(log.clone());
    bag.remove(&link(5))?;
    bag.remove(&link(5))?;
    bag.add(link(5))?;

    let mut original = bag.return_original_state(&log.events())?;
    assert_eq!(original.len(), 2);
    assert_eq!(sorted(original.to_vec()?), vec![Rid::new(12, 5); 2]);
    Ok(())
}

#[test]
fn rollback_rejects_updates() -> Result<()> {
    let mut bag = bag();
    bag.add(link(1))?;
    let update = ChangeEvent {
        kind: ChangeKind::Update,
        key: link(1),
        new_value: Some(link(2)),
        old_value: Some(link(1)),
    };
    let outcome = bag.return_original_state(&[ChangeEvent::add(link(1)), update]);
    assert!(matches!(outcome, Err(RidBagError::InvalidArgument(_))));
    Ok(())
}

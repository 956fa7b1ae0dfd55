#![allow(missing_docs)]

use std::sync::Arc;

use ridbag::{
    primitives::{bytes::var, cluster::MemClusterStore},
    storage::{EncodeMode, RidBag, RidBagOptions},
    types::{Identifiable, Result, Rid, RidBagError},
};

fn link(i: i64) -> Identifiable {
    Identifiable::Link(Rid::new(4, i))
}

fn populated(store: &Arc<MemClusterStore>, entries: i64, removals: i64) -> Result<RidBag> {
    let mut bag = RidBag::new(RidBagOptions::new(store.clone()));
    for i in 0..entries {
        bag.add(link(i))?;
    }
    for i in (0..removals).map(|i| i * 3) {
        bag.remove(&link(i))?;
    }
    Ok(bag)
}

fn metadata_tuples(bag: &RidBag) -> (Vec<i64>, Vec<i64>) {
    let stats = bag.chain_stats();
    (
        stats.chain_positions.iter().map(|p| p.0).collect(),
        stats.free_positions.iter().map(|p| p.0).collect(),
    )
}

fn encode(values: &[i64]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        var::encode_i64(*v, &mut out);
    }
    out
}

#[test]
fn metadata_roundtrip_reads_payloads_lazily() -> Result<()> {
    let store = Arc::new(MemClusterStore::new(128));
    let mut bag = populated(&store, 900, 120)?;
    let bytes = bag.serialize_to_store()?;
    assert_eq!(bytes.len(), bag.serialized_size());

    let (mut decoded, used) =
        RidBag::deserialize(RidBagOptions::new(store.clone()), &bytes, EncodeMode::Metadata)?;
    assert_eq!(used, bytes.len());
    assert_eq!(decoded.len(), bag.len());
    assert_eq!(metadata_tuples(&decoded), metadata_tuples(&bag));
    assert_eq!(decoded.chain_stats(), bag.chain_stats());
    assert_eq!(decoded.to_vec()?, bag.to_vec()?);
    decoded.check_invariants()?;
    Ok(())
}

#[test]
fn full_encoding_is_self_contained() -> Result<()> {
    let store = Arc::new(MemClusterStore::new(128));
    let mut bag = populated(&store, 700, 50)?;
    let bytes = bag.serialize(EncodeMode::Full)?;

    let elsewhere = Arc::new(MemClusterStore::default());
    let (mut decoded, used) =
        RidBag::deserialize(RidBagOptions::new(elsewhere), &bytes, EncodeMode::Full)?;
    assert_eq!(used, bytes.len());
    assert_eq!(decoded.to_vec()?, bag.to_vec()?);
    assert_eq!(decoded.serialize(EncodeMode::Full)?, bytes);
    Ok(())
}

#[test]
fn decoded_bag_keeps_growing() -> Result<()> {
    let store = Arc::new(MemClusterStore::new(128));
    let mut bag = populated(&store, 250, 10)?;
    let bytes = bag.serialize_to_store()?;
    let (mut decoded, _) =
        RidBag::deserialize(RidBagOptions::new(store.clone()), &bytes, EncodeMode::Metadata)?;
    for i in 1_000..1_400 {
        decoded.add(link(i))?;
    }
    assert_eq!(decoded.len(), bag.len() + 400);
    assert!(decoded.contains(&link(1_399))?);
    assert!(decoded.contains(&link(1))?);
    decoded.check_invariants()?;
    Ok(())
}

#[test]
fn empty_bag_roundtrips() -> Result<()> {
    let store = Arc::new(MemClusterStore::default());
    let mut bag = RidBag::new(RidBagOptions::new(store.clone()));
    let bytes = bag.serialize(EncodeMode::Metadata)?;
    assert_eq!(bytes, encode(&[0, -1, 0, 0]));
    let (decoded, used) =
        RidBag::deserialize(RidBagOptions::new(store), &bytes, EncodeMode::Metadata)?;
    assert_eq!(used, 4);
    assert!(decoded.is_empty());
    Ok(())
}

#[test]
fn trailing_bytes_are_left_for_the_caller() -> Result<()> {
    let store = Arc::new(MemClusterStore::default());
    let mut bag = populated(&store, 10, 0)?;
    let mut bytes = bag.serialize_to_store()?;
    let len = bytes.len();
    bytes.extend_from_slice(&[0xaa, 0xbb]);
    let (decoded, used) =
        RidBag::deserialize(RidBagOptions::new(store), &bytes, EncodeMode::Metadata)?;
    assert_eq!(used, len);
    assert_eq!(decoded.len(), 10);
    Ok(())
}

#[test]
fn every_truncation_is_rejected() -> Result<()> {
    let store = Arc::new(MemClusterStore::new(128));
    let mut bag = populated(&store, 120, 5)?;
    for mode in [EncodeMode::Metadata, EncodeMode::Full] {
        let bytes = bag.serialize(mode)?;
        for cut in 0..bytes.len() {
            let outcome =
                RidBag::deserialize(RidBagOptions::new(store.clone()), &bytes[..cut], mode);
            assert!(
                matches!(outcome, Err(RidBagError::Corruption(_))),
                "prefix of {cut} bytes decoded in {mode:?}"
            );
        }
    }
    Ok(())
}

#[test]
fn malformed_layouts_are_corruption() {
    let store = Arc::new(MemClusterStore::default());
    let decode = |bytes: Vec<u8>| {
        RidBag::deserialize(
            RidBagOptions::new(store.clone()),
            &bytes,
            EncodeMode::Metadata,
        )
        .map(|(bag, _)| bag.len())
    };

    let dangling_active = encode(&[0, 5, 0, 0]);
    assert!(matches!(
        decode(dangling_active),
        Err(RidBagError::Corruption("active node not in chain"))
    ));

    let mut tail_in_free = encode(&[0, -1, 1]);
    tail_in_free.push(2);
    tail_in_free.extend(encode(&[3, 0, 1, 0]));
    assert!(matches!(
        decode(tail_in_free),
        Err(RidBagError::Corruption("tail node in free section"))
    ));

    let mut wrong_size = encode(&[3, -1, 0, 1]);
    wrong_size.push(2);
    wrong_size.extend(encode(&[0, 2, 2]));
    assert!(matches!(
        decode(wrong_size),
        Err(RidBagError::Corruption("size does not match node counts"))
    ));

    let mut unknown_kind = encode(&[0, -1, 0, 1]);
    unknown_kind.push(7);
    unknown_kind.extend(encode(&[0, 0, 1]));
    assert!(matches!(
        decode(unknown_kind),
        Err(RidBagError::Corruption("unknown node kind"))
    ));

    let huge_count = encode(&[0, -1, 1_000_000]);
    assert!(matches!(
        decode(huge_count),
        Err(RidBagError::Corruption("node count exceeds input"))
    ));

    let mut oversized = encode(&[0, -1, 0, 1]);
    oversized.push(1);
    oversized.extend(encode(&[0, 0, 601]));
    assert!(matches!(
        decode(oversized),
        Err(RidBagError::Corruption("array node capacity out of range"))
    ));
}

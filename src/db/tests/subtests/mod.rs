// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::db::{
    PiecePayloadStore, SettingsStore, SettingsStoreExt, WalkerStateStore, setting_keys,
};
use crate::test_utils::test_cid;
use crate::walker::{WalkPosition, WalkerState};
use pretty_assertions::assert_eq;

pub fn settings<DB>(db: &DB)
where
    DB: SettingsStore,
{
    let key = "Cthulhu";
    assert!(db.read_bin(key).unwrap().is_none());
    assert!(db.read_obj::<i32>(key).unwrap().is_none());

    db.write_obj(key, &42).unwrap();
    assert_eq!(db.read_bin(key).unwrap().as_deref(), Some(b"42".as_slice()));
    assert_eq!(db.read_obj::<i32>(key).unwrap(), Some(42));

    // ensure that we are able to overwrite the value.
    db.write_obj(key, &1337).unwrap();
    assert_eq!(db.read_obj::<i32>(key).unwrap(), Some(1337));
    assert!(db.read_obj::<String>(key).is_err());
}

pub fn walker_state<DB>(db: &DB)
where
    DB: SettingsStore,
{
    assert_eq!(db.get_walker_state("peer").unwrap(), None);

    let walking = WalkerState {
        position: WalkPosition::Walking {
            head: test_cid("head"),
            tail: test_cid("tail"),
        },
        last_head: Some(test_cid("last")),
        status: "Walking".into(),
        entries_not_retrievable: 3,
        ads_missing_piece_cid: 1,
    };
    db.set_walker_state("peer", &walking).unwrap();
    assert_eq!(db.get_walker_state("peer").unwrap(), Some(walking.clone()));
    assert!(
        db.read_bin(&setting_keys::walker_state("peer"))
            .unwrap()
            .is_some()
    );

    let idle = WalkerState {
        position: WalkPosition::Idle,
        last_head: Some(test_cid("head")),
        ..walking
    };
    db.set_walker_state("peer", &idle).unwrap();
    assert_eq!(db.get_walker_state("peer").unwrap(), Some(idle));
    assert_eq!(db.get_walker_state("other").unwrap(), None);

    db.write_bin(&setting_keys::walker_state("broken"), b"{\"head\":\"x\"")
        .unwrap();
    assert!(db.get_walker_state("broken").is_err());
}

pub fn piece_payloads<DB>(db: &DB)
where
    DB: PiecePayloadStore,
{
    let piece = test_cid("piece");
    assert!(db.get_piece_payload_blocks("peer", &piece).unwrap().is_empty());

    db.add_piece_payload_blocks("peer", &piece, &[test_cid("b"), test_cid("a")])
        .unwrap();
    // duplicates collapse
    db.add_piece_payload_blocks("peer", &piece, &[test_cid("a")])
        .unwrap();
    db.add_piece_payload_blocks("peer", &test_cid("other piece"), &[test_cid("c")])
        .unwrap();
    db.add_piece_payload_blocks("other peer", &piece, &[test_cid("d")])
        .unwrap();

    let mut expected = vec![test_cid("a"), test_cid("b")];
    expected.sort_by_key(|cid| cid.to_string());
    assert_eq!(db.get_piece_payload_blocks("peer", &piece).unwrap(), expected);
    assert_eq!(
        db.get_piece_payload_blocks("other peer", &piece).unwrap(),
        vec![test_cid("d")]
    );
}

pub fn pieces_indexed<DB>(db: &DB)
where
    DB: PiecePayloadStore,
{
    assert_eq!(db.count_pieces_indexed("peer").unwrap(), 0);
    for (piece, payload) in [("p1", "a"), ("p1", "b"), ("p2", "c"), ("p3", "d")] {
        db.add_piece_payload_blocks("peer", &test_cid(piece), &[test_cid(payload)])
            .unwrap();
    }
    db.add_piece_payload_blocks("peer2", &test_cid("p4"), &[test_cid("e")])
        .unwrap();
    assert_eq!(db.count_pieces_indexed("peer").unwrap(), 3);
    assert_eq!(db.count_pieces_indexed("peer2").unwrap(), 1);
}

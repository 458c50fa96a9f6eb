// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeSet;

use super::{PiecePayloadStore, SettingsStore, count_distinct_pieces, piece_payload_keys};
use ahash::HashMap;
use cid::Cid;
use itertools::Itertools;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct MemoryDB {
    settings_db: RwLock<HashMap<String, Vec<u8>>>,
    piece_payload_db: RwLock<BTreeSet<String>>,
}

impl SettingsStore for MemoryDB {
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.settings_db.read().get(key).cloned())
    }

    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.settings_db
            .write()
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }
}

impl MemoryDB {
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.piece_payload_db
            .read()
            .range(prefix.to_owned()..)
            .take_while(|key| key.starts_with(prefix))
            .map(|key| key[prefix.len()..].to_owned())
            .collect_vec()
    }
}

impl PiecePayloadStore for MemoryDB {
    fn add_piece_payload_blocks(
        &self,
        provider_id: &str,
        piece_cid: &Cid,
        payload_cids: &[Cid],
    ) -> anyhow::Result<()> {
        let mut db = self.piece_payload_db.write();
        for payload_cid in payload_cids {
            db.insert(piece_payload_keys::entry(provider_id, piece_cid, payload_cid));
        }
        Ok(())
    }

    fn get_piece_payload_blocks(
        &self,
        provider_id: &str,
        piece_cid: &Cid,
    ) -> anyhow::Result<Vec<Cid>> {
        self.keys_with_prefix(&piece_payload_keys::piece_prefix(provider_id, piece_cid))
            .iter()
            .map(|payload| payload.parse::<Cid>().map_err(anyhow::Error::from))
            .collect()
    }

    fn count_pieces_indexed(&self, provider_id: &str) -> anyhow::Result<u64> {
        let suffixes = self.keys_with_prefix(&piece_payload_keys::provider_prefix(provider_id));
        Ok(count_distinct_pieces(suffixes.iter().map(String::as_str)))
    }
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod memory;
pub mod parity_db;

pub use memory::MemoryDB;
pub use parity_db::ParityDb;

use anyhow::Context as _;
use cid::Cid;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::walker::WalkerState;

pub mod setting_keys {
    /// Prefix of the per-provider walker state records.
    pub const WALKER_STATE_PREFIX: &str = "walker-state:";

    pub fn walker_state(provider_id: &str) -> String {
        format!("{WALKER_STATE_PREFIX}{provider_id}")
    }
}

/// Interface used to store and retrieve settings from the database.
pub trait SettingsStore {
    /// Reads binary field from the Settings store. This should be used for
    /// non-serializable data. For serializable data, use [`SettingsStoreExt::read_obj`].
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Writes binary field to the Settings store. This should be used for
    /// non-serializable data. For serializable data, use [`SettingsStoreExt::write_obj`].
    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
}

/// Extension trait for the [`SettingsStore`] trait. It is implemented for all types that implement
/// [`SettingsStore`].
/// It provides methods for writing and reading any serializable object from the store.
pub trait SettingsStoreExt {
    fn read_obj<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<V>>;
    fn write_obj<V: Serialize>(&self, key: &str, value: &V) -> anyhow::Result<()>;
}

impl<T: ?Sized + SettingsStore> SettingsStoreExt for T {
    fn read_obj<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<V>> {
        match self.read_bin(key)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).with_context(|| format!("malformed {key}"))?,
            )),
            None => Ok(None),
        }
    }

    fn write_obj<V: Serialize>(&self, key: &str, value: &V) -> anyhow::Result<()> {
        self.write_bin(key, &serde_json::to_vec(value)?)
    }
}

/// Durable per-provider walker cursor.
pub trait WalkerStateStore {
    fn get_walker_state(&self, provider_id: &str) -> anyhow::Result<Option<WalkerState>>;
    fn set_walker_state(&self, provider_id: &str, state: &WalkerState) -> anyhow::Result<()>;
}

impl<T: ?Sized + SettingsStore> WalkerStateStore for T {
    fn get_walker_state(&self, provider_id: &str) -> anyhow::Result<Option<WalkerState>> {
        self.read_obj(&setting_keys::walker_state(provider_id))
    }

    fn set_walker_state(&self, provider_id: &str, state: &WalkerState) -> anyhow::Result<()> {
        self.write_obj(&setting_keys::walker_state(provider_id), state)
    }
}

/// `(provider, piece) -> {payload}` index. Writes have set-union semantics and nothing is ever
/// removed.
pub trait PiecePayloadStore {
    fn add_piece_payload_blocks(
        &self,
        provider_id: &str,
        piece_cid: &Cid,
        payload_cids: &[Cid],
    ) -> anyhow::Result<()>;

    /// Payload CIDs recorded for the pair, sorted by their string form.
    fn get_piece_payload_blocks(
        &self,
        provider_id: &str,
        piece_cid: &Cid,
    ) -> anyhow::Result<Vec<Cid>>;

    /// Number of distinct pieces with at least one payload recorded for the provider.
    fn count_pieces_indexed(&self, provider_id: &str) -> anyhow::Result<u64>;
}

/// Everything the walkers and the query API need from a backend.
pub trait IndexerStore: WalkerStateStore + PiecePayloadStore + Send + Sync + 'static {}

impl<T> IndexerStore for T where T: WalkerStateStore + PiecePayloadStore + Send + Sync + 'static {}

/// Piece-payload entries are stored as ordered keys `<provider>/<piece>/<payload>`, so that all
/// payloads of a pair, or all pieces of a provider, are a single prefix scan away.
mod piece_payload_keys {
    use cid::Cid;

    pub fn entry(provider_id: &str, piece_cid: &Cid, payload_cid: &Cid) -> String {
        format!("{provider_id}/{piece_cid}/{payload_cid}")
    }

    pub fn piece_prefix(provider_id: &str, piece_cid: &Cid) -> String {
        format!("{provider_id}/{piece_cid}/")
    }

    pub fn provider_prefix(provider_id: &str) -> String {
        format!("{provider_id}/")
    }

    /// `<piece>/<payload>` with the provider prefix already stripped.
    pub fn split(rest: &str) -> Option<(&str, &str)> {
        rest.split_once('/')
    }
}

/// Counts distinct pieces among the `<piece>/<payload>` suffixes of sorted keys.
fn count_distinct_pieces<'a>(suffixes: impl IntoIterator<Item = &'a str>) -> u64 {
    let mut count = 0;
    let mut last_piece = None;
    for (piece, _) in suffixes.into_iter().filter_map(piece_payload_keys::split) {
        if last_piece != Some(piece) {
            count += 1;
            last_piece = Some(piece);
        }
    }
    count
}

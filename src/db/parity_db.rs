// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::{Path, PathBuf};

use super::{PiecePayloadStore, SettingsStore, count_distinct_pieces, piece_payload_keys};

use anyhow::{Context as _, anyhow};
use cid::Cid;
use parity_db::{CompressionType, Db, Options};
use strum::{Display, EnumIter, IntoEnumIterator};

const DIR_NAME: &str = "paritydb";

pub fn db_root(data_dir: &Path) -> PathBuf {
    data_dir.join(DIR_NAME)
}

/// Columns of the indexer database.
#[derive(Copy, Clone, Debug, Display, PartialEq, EnumIter)]
#[repr(u8)]
enum DbColumn {
    /// Walker state records and other settings, keyed by name.
    Settings,
    /// Ordered `<provider>/<piece>/<payload>` keys; the value is the payload CID.
    PiecePayload,
}

impl DbColumn {
    fn create_column_options(compression: CompressionType) -> Vec<parity_db::ColumnOptions> {
        DbColumn::iter()
            .map(|col| match col {
                DbColumn::Settings => parity_db::ColumnOptions {
                    // explicitly disable preimage for settings column
                    // otherwise we are not able to overwrite entries
                    preimage: false,
                    // This is needed for key retrieval.
                    btree_index: true,
                    compression,
                    ..Default::default()
                },
                DbColumn::PiecePayload => parity_db::ColumnOptions {
                    preimage: false,
                    // This is needed for prefix scans.
                    btree_index: true,
                    compression: CompressionType::NoCompression,
                    ..Default::default()
                },
            })
            .collect()
    }
}

pub struct ParityDb {
    db: parity_db::Db,
}

impl ParityDb {
    fn to_options(path: PathBuf) -> Options {
        Options {
            path,
            sync_wal: true,
            sync_data: true,
            stats: false,
            salt: None,
            columns: DbColumn::create_column_options(CompressionType::Lz4),
            compression_threshold: [(0, 128)].into_iter().collect(),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let opts = Self::to_options(path.into());
        Ok(Self {
            db: Db::open_or_create(&opts)
                .with_context(|| format!("cannot open database at {}", opts.path.display()))?,
        })
    }

    fn read_from_column<K>(&self, key: K, column: DbColumn) -> anyhow::Result<Option<Vec<u8>>>
    where
        K: AsRef<[u8]>,
    {
        self.db
            .get(column as u8, key.as_ref())
            .map_err(|e| anyhow!("error from column {column}: {e}"))
    }

    fn write_to_column<K, V>(&self, key: K, value: V, column: DbColumn) -> anyhow::Result<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let tx = [(column as u8, key.as_ref(), Some(value.as_ref().to_vec()))];
        self.db
            .commit(tx)
            .map_err(|e| anyhow!("error writing to column {column}: {e}"))
    }

    /// Keys of the `PiecePayload` column starting with `prefix`, with the prefix stripped.
    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let column = DbColumn::PiecePayload;
        let mut iter = self
            .db
            .iter(column as u8)
            .map_err(|e| anyhow!("error iterating column {column}: {e}"))?;
        iter.seek(prefix.as_bytes())?;
        let mut keys = vec![];
        while let Some((key, _)) = iter.next()? {
            let key = String::from_utf8(key)?;
            match key.strip_prefix(prefix) {
                Some(rest) => keys.push(rest.to_owned()),
                None => break,
            }
        }
        Ok(keys)
    }
}

impl SettingsStore for ParityDb {
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.read_from_column(key.as_bytes(), DbColumn::Settings)
    }

    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.write_to_column(key.as_bytes(), value, DbColumn::Settings)
    }
}

impl PiecePayloadStore for ParityDb {
    fn add_piece_payload_blocks(
        &self,
        provider_id: &str,
        piece_cid: &Cid,
        payload_cids: &[Cid],
    ) -> anyhow::Result<()> {
        let column = DbColumn::PiecePayload;
        let tx = payload_cids
            .iter()
            .map(|payload_cid| {
                (
                    column as u8,
                    piece_payload_keys::entry(provider_id, piece_cid, payload_cid).into_bytes(),
                    Some(payload_cid.to_bytes()),
                )
            })
            .collect::<Vec<_>>();
        self.db
            .commit(tx)
            .map_err(|e| anyhow!("error writing to column {column}: {e}"))
    }

    fn get_piece_payload_blocks(
        &self,
        provider_id: &str,
        piece_cid: &Cid,
    ) -> anyhow::Result<Vec<Cid>> {
        self.keys_with_prefix(&piece_payload_keys::piece_prefix(provider_id, piece_cid))?
            .iter()
            .map(|payload| payload.parse::<Cid>().map_err(anyhow::Error::from))
            .collect()
    }

    fn count_pieces_indexed(&self, provider_id: &str) -> anyhow::Result<u64> {
        let suffixes = self.keys_with_prefix(&piece_payload_keys::provider_prefix(provider_id))?;
        Ok(count_distinct_pieces(suffixes.iter().map(String::as_str)))
    }
}

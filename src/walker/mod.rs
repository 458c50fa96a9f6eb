// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Resumable walker over a provider's advertisement chain.
//!
//! ```text
//! lastAdCID --> [ ] -\
//!                ↓    |
//!               ...   | announced after the current walk started
//!                ↓    |
//!               [ ] -/
//!                ↓
//!      head --> [ ] -\
//!                ↓    |
//!               ...   | visited in this walk
//!                ↓    |
//!               [ ] -/
//!                ↓
//!      tail --> [ ] -\
//!                ↓    |
//!               ...   | not visited yet
//!                ↓    |
//!               [ ] -/
//!                ↓
//!  lastHead --> [ ] -\
//!                ↓    |
//!               ...   | visited in previous walks
//!                ↓    |
//!               [ ] -/
//!                ↓
//!              (null)
//! ```

pub mod backoff;
pub mod chain;
pub mod step;

use cid::Cid;
use serde::{Deserialize, Serialize};

pub use backoff::next_delay;
pub use chain::walk_chain;
pub use step::walk_one_step;

/// Where the walker is in the provider's chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WalkPosition {
    /// No walk in progress.
    #[default]
    Idle,
    /// `head` started the current walk, `tail` is the next advertisement to fetch.
    Walking { head: Cid, tail: Cid },
}

/// Per-provider cursor, persisted after every step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WalkerStateRecord", into = "WalkerStateRecord")]
pub struct WalkerState {
    pub position: WalkPosition,
    /// `head` of the most recently completed walk. Everything from here to the chain's origin
    /// has been processed.
    pub last_head: Option<Cid>,
    /// Diagnostic description of the last transition.
    pub status: String,
    pub entries_not_retrievable: u64,
    pub ads_missing_piece_cid: u64,
}

impl WalkerState {
    pub fn head(&self) -> Option<Cid> {
        match self.position {
            WalkPosition::Walking { head, .. } => Some(head),
            WalkPosition::Idle => None,
        }
    }

    pub fn tail(&self) -> Option<Cid> {
        match self.position {
            WalkPosition::Walking { tail, .. } => Some(tail),
            WalkPosition::Idle => None,
        }
    }

    /// The advertisement the latest walk started from, as reported by the ingestion status.
    pub fn last_head_walked_from(&self) -> Option<Cid> {
        self.last_head.or_else(|| self.head())
    }
}

/// Stored layout of [`WalkerState`], flat and with CIDs as strings.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalkerStateRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    head: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_head: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    entries_not_retrievable: u64,
    #[serde(rename = "adsMissingPieceCID", default)]
    ads_missing_piece_cid: u64,
}

impl TryFrom<WalkerStateRecord> for WalkerState {
    type Error = anyhow::Error;

    fn try_from(record: WalkerStateRecord) -> Result<Self, Self::Error> {
        let parse = |cid: Option<String>| cid.map(|cid| cid.parse::<Cid>()).transpose();
        let position = match (parse(record.head)?, parse(record.tail)?) {
            (Some(head), Some(tail)) => WalkPosition::Walking { head, tail },
            (None, None) => WalkPosition::Idle,
            (head, tail) => {
                anyhow::bail!("walker state has head {head:?} but tail {tail:?}")
            }
        };
        Ok(Self {
            position,
            last_head: parse(record.last_head)?,
            status: record.status,
            entries_not_retrievable: record.entries_not_retrievable,
            ads_missing_piece_cid: record.ads_missing_piece_cid,
        })
    }
}

impl From<WalkerState> for WalkerStateRecord {
    fn from(state: WalkerState) -> Self {
        Self {
            head: state.head().map(|cid| cid.to_string()),
            tail: state.tail().map(|cid| cid.to_string()),
            last_head: state.last_head.map(|cid| cid.to_string()),
            status: state.status,
            entries_not_retrievable: state.entries_not_retrievable,
            ads_missing_piece_cid: state.ads_missing_piece_cid,
        }
    }
}

/// A `(piece, payload)` pair sampled from one advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub piece_cid: Cid,
    pub payload_cid: Cid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum StepOutcome {
    /// More advertisements remain in the current walk.
    InProgress,
    /// Nothing left to do until the provider publishes new advertisements.
    Finished,
    /// The step could not fetch or decode the advertisement; the tail did not move.
    Failed,
}

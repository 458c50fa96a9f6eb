// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use smart_default::SmartDefault;

use super::client::Client;
use crate::ipni::{
    DEFAULT_FETCH_TIMEOUT,
    providers::{DEFAULT_PROVIDERS_URL, DEFAULT_SYNC_INTERVAL},
};

pub const DEFAULT_MIN_STEP_INTERVAL: Duration = Duration::from_millis(100);

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, SmartDefault)]
#[serde(default)]
pub struct IndexerConfig {
    /// IPNI provider directory, e.g. `https://cid.contact/providers`
    #[default(DEFAULT_PROVIDERS_URL.to_string())]
    pub providers_url: String,
    /// Seconds between the starts of two provider directory syncs
    #[serde_as(as = "DurationSeconds<u64>")]
    #[default(DEFAULT_SYNC_INTERVAL)]
    pub sync_interval: Duration,
    /// Milliseconds between the starts of two steps of a provider's walk
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[default(DEFAULT_MIN_STEP_INTERVAL)]
    pub min_step_interval: Duration,
    /// Seconds before a request to a provider is abandoned
    #[serde_as(as = "DurationSeconds<u64>")]
    #[default(DEFAULT_FETCH_TIMEOUT)]
    pub fetch_timeout: Duration,
    /// Provider IDs that are never walked
    pub deny_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub client: Client,
    pub indexer: IndexerConfig,
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_PORT: u16 = 3000;

/// Storage backend of the indexer.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DbEngine {
    #[default]
    Parity,
    /// Nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Client {
    pub data_dir: PathBuf,
    pub db: DbEngine,
    /// Serve `/sample` and `/ingestion-status`
    pub enable_api: bool,
    /// API bind, e.g. 127.0.0.1:3000
    pub api_address: SocketAddr,
    /// Serve `/metrics` next to the API
    pub enable_metrics: bool,
}

impl Default for Client {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("io", "ChainSafe", "piece-indexer")
            .map(|dir| dir.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("piece-indexer-data"));
        Self {
            data_dir,
            db: DbEngine::default(),
            enable_api: true,
            api_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_API_PORT),
            enable_metrics: true,
        }
    }
}

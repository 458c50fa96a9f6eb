// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod client;
mod config;

use std::path::{Path, PathBuf};

use clap::Args;

pub use self::{client::*, config::*};
use crate::cli_shared::read_config;
use crate::utils::misc::LoggingColor;

/// Environment variable pointing at the configuration file.
pub const CONFIG_ENV: &str = "PIECE_INDEXER_CONFIG";

/// CLI options
#[derive(Default, Debug, Args)]
pub struct CliOpts {
    /// A TOML file containing relevant configurations
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory of the indexer database
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Keep all state in memory. Progress is lost on exit
    #[arg(long)]
    pub memory_db: bool,
    /// Enable or disable colored logging in `stdout`
    #[arg(long, default_value = "auto")]
    pub color: LoggingColor,
    /// Write hourly rotated log files to this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
    /// Print the resolved configuration as TOML and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl CliOpts {
    pub fn to_config(&self) -> anyhow::Result<(Option<ConfigPath>, Config)> {
        let (path, mut cfg) = read_config(self.config.as_deref())?;

        if let Some(data_dir) = &self.data_dir {
            cfg.client.data_dir.clone_from(data_dir);
        }
        if self.memory_db {
            cfg.client.db = DbEngine::Memory;
        }

        Ok((path, cfg))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPath {
    Cli(PathBuf),
    Env(PathBuf),
}

impl ConfigPath {
    pub fn as_path(&self) -> &Path {
        match self {
            ConfigPath::Cli(path) | ConfigPath::Env(path) => path,
        }
    }
}

/// `--config` wins over [`CONFIG_ENV`]. Without either, the built-in defaults are used.
pub fn find_config_path(config: Option<&Path>) -> Option<ConfigPath> {
    if let Some(s) = config {
        return Some(ConfigPath::Cli(s.to_path_buf()));
    }
    std::env::var_os(CONFIG_ENV).map(|path| ConfigPath::Env(PathBuf::from(path)))
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod cli;
pub mod logger;

use crate::cli_shared::cli::{Config, ConfigPath, find_config_path};
use crate::utils::io::read_toml;
use anyhow::Context as _;
use std::path::Path;

pub fn read_config(config_path_opt: Option<&Path>) -> anyhow::Result<(Option<ConfigPath>, Config)> {
    let (path, config) = match find_config_path(config_path_opt) {
        Some(path) => {
            // Read from config file
            let toml = std::fs::read_to_string(path.as_path())
                .with_context(|| format!("cannot read {}", path.as_path().display()))?;
            // Parse and return the configuration file
            (Some(path), read_toml(&toml)?)
        }
        None => (None, Config::default()),
    };
    Ok((path, config))
}

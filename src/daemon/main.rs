// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cli_shared::cli::{CliOpts, ConfigPath};
use crate::cli_shared::logger;
use anyhow::Context;
use clap::Parser;
use std::ffi::OsString;
use std::time::Duration;
use tokio::runtime::Builder as RuntimeBuilder;
use tracing::info;

/// CLI structure generated when interacting with the indexer binary
#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[clap(flatten)]
    pub opts: CliOpts,
}

pub fn main<ArgT>(args: impl IntoIterator<Item = ArgT>) -> anyhow::Result<()>
where
    ArgT: Into<OsString> + Clone,
{
    // Capture Cli inputs
    let Cli { opts } = Cli::parse_from(args);

    let (path, cfg) = opts.to_config().context("Error parsing config")?;

    if opts.dry_run {
        print!("{}", toml::to_string_pretty(&cfg)?);
        return Ok(());
    }

    logger::setup_logger(&opts);

    match &path {
        Some(ConfigPath::Cli(path)) => info!("Config loaded: {}", path.display()),
        Some(ConfigPath::Env(path)) => {
            info!("PIECE_INDEXER_CONFIG loaded: {}", path.display())
        }
        None => info!("Using default config"),
    }

    let rt = RuntimeBuilder::new_multi_thread().enable_all().build()?;
    let ret = rt.block_on(super::start_interruptable(cfg));
    info!("Shutting down tokio...");
    rt.shutdown_timeout(Duration::from_secs_f32(0.5));
    info!("piece-indexer finished shutdown");
    ret
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod api;
mod cli_shared;
mod daemon;
mod db;
mod ipni;
mod metrics;
#[cfg(test)]
mod test_utils;
mod utils;
mod walker;

pub use daemon::main::main as piece_indexer_main;

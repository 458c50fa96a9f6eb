// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod main;
pub mod orchestrator;

use std::sync::Arc;

use anyhow::Context as _;
use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::cli_shared::cli::{Config, DbEngine};
use crate::db::{IndexerStore, MemoryDB, ParityDb, parity_db::db_root};
use crate::ipni::{ProviderClient, ProviderSync, provider_info_channel};
use orchestrator::Orchestrator;

/// Runs the indexer until a keyboard interrupt or `SIGTERM`.
pub async fn start_interruptable(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let mut terminate = signal(SignalKind::terminate())?;
    let shutdown = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = ctrl_c() => info!("Keyboard interrupt."),
                _ = terminate.recv() => info!("Received SIGTERM."),
                _ = cancel.cancelled() => return,
            }
            cancel.cancel();
        })
    };

    let result = match config.client.db {
        DbEngine::Parity => {
            let path = db_root(&config.client.data_dir);
            info!("Opening the database at {}", path.display());
            let db = ParityDb::open(path)?;
            start(Arc::new(db), &config, cancel.clone()).await
        }
        DbEngine::Memory => {
            warn!("Using an in-memory database, progress is lost on exit");
            start(Arc::new(MemoryDB::default()), &config, cancel.clone()).await
        }
    };
    cancel.cancel();
    shutdown.await?;
    result
}

/// Starts provider discovery, the walker orchestrator and the query API on top of `db` and waits
/// until all of them stop.
pub async fn start<DB: IndexerStore>(
    db: Arc<DB>,
    config: &Config,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let providers_url = Url::parse(&config.indexer.providers_url)
        .with_context(|| format!("invalid providers URL {}", config.indexer.providers_url))?;
    let client = ProviderClient::new(config.indexer.fetch_timeout);
    let (publisher, providers) = provider_info_channel();

    let mut services: JoinSet<anyhow::Result<()>> = JoinSet::new();

    if config.client.enable_api {
        let listener = TcpListener::bind(config.client.api_address)
            .await
            .with_context(|| format!("cannot bind the API to {}", config.client.api_address))?;
        info!("API listening on {}", listener.local_addr()?);
        let app = crate::api::router(db.clone(), config.client.enable_metrics);
        let api_cancel = cancel.clone();
        services.spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(api_cancel.cancelled_owned())
                .await
                .context("API server failed")
        });
    }

    let sync = ProviderSync::new(
        client.clone(),
        providers_url,
        config.indexer.sync_interval,
    );
    let sync_cancel = cancel.clone();
    services.spawn(async move {
        sync.run(publisher, sync_cancel).await;
        Ok(())
    });

    let orchestrator = Orchestrator::new(db, client, providers, &config.indexer, cancel.clone());
    services.spawn(async move {
        orchestrator.run().await;
        Ok(())
    });

    while let Some(joined) = services.join_next().await {
        if let Err(e) = joined.map_err(anyhow::Error::from).and_then(|result| result) {
            cancel.cancel();
            return Err(e);
        }
    }
    info!("All services stopped");
    Ok(())
}

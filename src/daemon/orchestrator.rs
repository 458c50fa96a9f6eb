// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{sync::Arc, time::Duration};

use ahash::HashSet;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cli_shared::cli::IndexerConfig;
use crate::db::IndexerStore;
use crate::ipni::{ProviderClient, ProviderInfoMap, ProviderInfoTable};
use crate::metrics;
use crate::walker::walk_chain;

/// Providers whose chain is being walked right now.
#[derive(Debug, Clone, Default)]
pub struct ActiveWalkers(Arc<Mutex<HashSet<String>>>);

impl ActiveWalkers {
    #[cfg(test)]
    pub fn is_active(&self, provider_id: &str) -> bool {
        self.0.lock().contains(provider_id)
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks `provider_id` as active unless it already is. The provider stays active until the
    /// returned handle is dropped.
    pub fn try_activate(&self, provider_id: &str) -> Option<ActiveWalker> {
        let mut active = self.0.lock();
        if !active.insert(provider_id.to_owned()) {
            return None;
        }
        metrics::ACTIVE_WALKERS.set(active.len() as i64);
        Some(ActiveWalker {
            walkers: self.clone(),
            provider_id: provider_id.to_owned(),
        })
    }
}

/// Membership of one provider in [`ActiveWalkers`].
#[derive(Debug)]
pub struct ActiveWalker {
    walkers: ActiveWalkers,
    provider_id: String,
}

impl Drop for ActiveWalker {
    fn drop(&mut self) {
        let mut active = self.walkers.0.lock();
        active.remove(&self.provider_id);
        metrics::ACTIVE_WALKERS.set(active.len() as i64);
    }
}

/// Starts at most one chain walker per provider whenever the provider directory changes.
pub struct Orchestrator<DB> {
    db: Arc<DB>,
    client: ProviderClient,
    providers: ProviderInfoTable,
    active: ActiveWalkers,
    deny_list: HashSet<String>,
    min_step_interval: Duration,
    cancel: CancellationToken,
}

impl<DB: IndexerStore> Orchestrator<DB> {
    pub fn new(
        db: Arc<DB>,
        client: ProviderClient,
        providers: ProviderInfoTable,
        config: &IndexerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            client,
            providers,
            active: ActiveWalkers::default(),
            deny_list: config.deny_list.iter().cloned().collect(),
            min_step_interval: config.min_step_interval,
            cancel,
        }
    }

    #[cfg(test)]
    pub fn active_walkers(&self) -> &ActiveWalkers {
        &self.active
    }

    fn is_denied(&self, provider_id: &str) -> bool {
        self.deny_list.contains(provider_id)
    }

    /// Spawns a walker into `tasks` for every provider that is neither denied nor already being
    /// walked. Returns the number of walkers started.
    pub fn launch_walkers(&self, providers: &ProviderInfoMap, tasks: &mut JoinSet<()>) -> usize {
        let mut launched = 0;
        for provider_id in providers.keys() {
            if self.is_denied(provider_id) {
                debug!(provider_id = %provider_id, "Skipping provider on the deny list");
                continue;
            }
            let Some(active) = self.active.try_activate(provider_id) else {
                continue;
            };
            let db = self.db.clone();
            let client = self.client.clone();
            let providers = self.providers.clone();
            let cancel = self.cancel.clone();
            let min_step_interval = self.min_step_interval;
            let provider_id = provider_id.clone();
            tasks.spawn(async move {
                let _active = active;
                if let Err(e) = walk_chain(
                    &*db,
                    &client,
                    &provider_id,
                    &providers,
                    min_step_interval,
                    &cancel,
                )
                .await
                {
                    error!(provider_id = %provider_id, "Walker stopped: {e:#}");
                }
            });
            launched += 1;
        }
        launched
    }

    /// Launches walkers after every provider sync until cancelled, then waits for the running
    /// walkers to stop.
    pub async fn run(mut self) {
        let mut tasks = JoinSet::new();
        'sync: loop {
            let snapshot = self.providers.snapshot();
            let launched = self.launch_walkers(&snapshot, &mut tasks);
            info!(
                "Started {launched} walker(s), {} provider(s) being walked",
                self.active.len()
            );
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break 'sync,
                    changed = self.providers.changed() => {
                        if changed {
                            continue 'sync;
                        }
                        break 'sync;
                    }
                    Some(joined) = tasks.join_next() => {
                        if let Err(e) = joined {
                            error!("Walker task failed: {e}");
                        }
                    }
                }
            }
        }
        info!("Waiting for {} walker(s) to stop", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Walker task failed: {e}");
            }
        }
    }
}

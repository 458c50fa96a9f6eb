// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::{Duration, Instant};

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{StepOutcome, next_delay, walk_one_step};
use crate::db::{PiecePayloadStore, WalkerStateStore};
use crate::ipni::{ProviderClient, ProviderInfoTable};
use crate::metrics::{self, OutcomeLabel};

/// Steps through the chain of `provider_id` until the walk finishes or `cancel` fires.
///
/// Every step reads the provider's latest info from `providers`, so a head announced mid-walk is
/// picked up by the next walk. Steps start at least `min_step_interval` apart; failed steps back
/// off exponentially.
pub async fn walk_chain<DB>(
    db: &DB,
    client: &ProviderClient,
    provider_id: &str,
    providers: &ProviderInfoTable,
    min_step_interval: Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<()>
where
    DB: WalkerStateStore + PiecePayloadStore + ?Sized,
{
    let mut step_interval = min_step_interval;
    let mut walker_state = None;
    while !cancel.is_cancelled() {
        let started = Instant::now();
        let provider_info = providers
            .latest(provider_id)
            .with_context(|| format!("Unknown provider ID {provider_id}"))?;

        let succeeded =
            match walk_one_step(db, client, provider_id, &provider_info, walker_state.take()).await
            {
                Ok(step) => {
                    debug!(provider_id, "{}: {:?}", step.outcome, step.walker_state);
                    metrics::WALKER_STEPS
                        .get_or_create(&OutcomeLabel::new(step.outcome.into()))
                        .inc();
                    walker_state = step.walker_state;
                    match step.outcome {
                        StepOutcome::Finished => {
                            info!(provider_id, "Finished walking the advertisement chain");
                            return Ok(());
                        }
                        StepOutcome::InProgress => true,
                        StepOutcome::Failed => false,
                    }
                }
                // The cached state is dropped, the next step reloads it from the store.
                Err(e) => {
                    metrics::WALKER_STEPS
                        .get_or_create(&metrics::STEP_ERROR)
                        .inc();
                    error!(
                        provider_id,
                        provider_address = %provider_info.provider_address,
                        "Error indexing provider: {e:#}"
                    );
                    false
                }
            };

        step_interval = next_delay(step_interval, succeeded, min_step_interval);
        let delay = step_interval.saturating_sub(started.elapsed());
        if !delay.is_zero() {
            debug!(provider_id, "Waiting for {delay:?} before the next step");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
    debug!(provider_id, "Walk cancelled");
    Ok(())
}

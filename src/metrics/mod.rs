// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use axum::{http::StatusCode, response::IntoResponse};
use parking_lot::{RwLock, RwLockWriteGuard};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
};
use std::sync::LazyLock;
use tracing::warn;

static DEFAULT_REGISTRY: LazyLock<RwLock<prometheus_client::registry::Registry>> =
    LazyLock::new(Default::default);

pub fn default_registry<'a>() -> RwLockWriteGuard<'a, prometheus_client::registry::Registry> {
    DEFAULT_REGISTRY.write()
}

pub static WALKER_STEPS: LazyLock<Family<OutcomeLabel, Counter>> = LazyLock::new(|| {
    let metric = Family::default();
    default_registry().register(
        "ipni_walker_steps",
        "Number of advertisement chain steps by outcome",
        metric.clone(),
    );
    metric
});

pub static IPNI_SYNC: LazyLock<Family<SyncLabel, Counter>> = LazyLock::new(|| {
    let metric = Family::default();
    default_registry().register(
        "ipni_sync",
        "Number of provider directory sync cycles by result",
        metric.clone(),
    );
    metric
});

pub static PROVIDERS_KNOWN: LazyLock<Gauge> = LazyLock::new(|| {
    let metric = Gauge::default();
    default_registry().register(
        "ipni_providers_known",
        "Number of providers in the latest directory",
        metric.clone(),
    );
    metric
});

pub static ACTIVE_WALKERS: LazyLock<Gauge> = LazyLock::new(|| {
    let metric = Gauge::default();
    default_registry().register(
        "ipni_active_walkers",
        "Number of providers whose chain is being walked",
        metric.clone(),
    );
    metric
});

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabel {
    outcome: &'static str,
}

impl OutcomeLabel {
    pub const fn new(outcome: &'static str) -> Self {
        Self { outcome }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SyncLabel {
    result: &'static str,
}

pub const SYNC_OK: SyncLabel = SyncLabel { result: "ok" };
pub const SYNC_ERROR: SyncLabel = SyncLabel { result: "error" };

/// Walker steps that errored before producing an outcome, e.g. on storage failures.
pub const STEP_ERROR: OutcomeLabel = OutcomeLabel::new("error");

/// Renders every registered metric in the OpenMetrics text format.
pub fn encode_metrics() -> String {
    let mut metrics = String::new();
    if let Err(e) =
        prometheus_client::encoding::text::encode_registry(&mut metrics, &DEFAULT_REGISTRY.read())
    {
        warn!("failed to encode the default metrics registry: {e}");
    };
    if let Err(e) = prometheus_client::encoding::text::encode_eof(&mut metrics) {
        warn!("failed to encode metrics eof {e}");
    };
    metrics
}

pub async fn collect_prometheus_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        encode_metrics(),
    )
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Read-only HTTP API over the piece index and the walker states.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use cid::Cid;
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tracing::error;

use crate::db::IndexerStore;
use crate::metrics::collect_prometheus_metrics;

const CACHE_SAMPLE: &str = "public, max-age=86400, immutable";
const CACHE_SHORT: &str = "public, max-age=60";

pub const PROVIDER_OR_PIECE_NOT_FOUND: &str = "PROVIDER_OR_PIECE_NOT_FOUND";
pub const UNKNOWN_PROVIDER: &str = "Unknown provider ID";

/// Store failures are answered with `500`.
struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API request failed: {:#}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum SampleResponse {
    Samples { samples: Vec<String> },
    Error { error: &'static str },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestionStatus {
    provider_id: String,
    ingestion_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_head_walked_from: Option<Option<String>>,
    #[serde(rename = "adsMissingPieceCID", skip_serializing_if = "Option::is_none")]
    ads_missing_piece_cid: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries_not_retrievable: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pieces_indexed: Option<u64>,
}

pub fn router<DB: IndexerStore>(db: Arc<DB>, enable_metrics: bool) -> Router {
    let mut router = Router::new()
        .route("/sample/{provider_id}/{piece_cid}", get(sample::<DB>))
        .route(
            "/ingestion-status/{provider_id}",
            get(ingestion_status::<DB>),
        );
    if enable_metrics {
        router = router.route("/metrics", get(collect_prometheus_metrics));
    }
    router
        .fallback(not_found)
        .layer(CompressionLayer::new())
        .with_state(db)
}

async fn sample<DB: IndexerStore>(
    State(db): State<Arc<DB>>,
    Path((provider_id, piece_cid)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let payloads = match piece_cid.parse::<Cid>() {
        Ok(piece_cid) => db.get_piece_payload_blocks(&provider_id, &piece_cid)?,
        Err(_) => vec![],
    };
    let response = match payloads.first() {
        Some(payload) => (
            [(header::CACHE_CONTROL, CACHE_SAMPLE)],
            Json(SampleResponse::Samples {
                samples: vec![payload.to_string()],
            }),
        ),
        None => (
            [(header::CACHE_CONTROL, CACHE_SHORT)],
            Json(SampleResponse::Error {
                error: PROVIDER_OR_PIECE_NOT_FOUND,
            }),
        ),
    };
    Ok(response.into_response())
}

async fn ingestion_status<DB: IndexerStore>(
    State(db): State<Arc<DB>>,
    Path(provider_id): Path<String>,
) -> Result<Response, AppError> {
    let body = match db.get_walker_state(&provider_id)? {
        Some(state) => IngestionStatus {
            pieces_indexed: Some(db.count_pieces_indexed(&provider_id)?),
            provider_id,
            ingestion_status: state.status.clone(),
            last_head_walked_from: Some(state.last_head_walked_from().map(|cid| cid.to_string())),
            ads_missing_piece_cid: Some(state.ads_missing_piece_cid),
            entries_not_retrievable: Some(state.entries_not_retrievable),
        },
        None => IngestionStatus {
            provider_id,
            ingestion_status: UNKNOWN_PROVIDER.into(),
            last_head_walked_from: None,
            ads_missing_piece_cid: None,
            entries_not_retrievable: None,
            pieces_indexed: None,
        },
    };
    Ok(([(header::CACHE_CONTROL, CACHE_SHORT)], Json(body)).into_response())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

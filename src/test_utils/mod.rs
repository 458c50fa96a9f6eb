// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Fixtures shared by unit tests: deterministic CIDs and an in-process IPNI publisher.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use ahash::HashMap;
use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use cid::{Cid, multihash::Multihash};
use multihash_codetable::{Code, MultihashDigest as _};
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::ipni::{
    Advertisement, Bytes, EMPTY_ENTRIES_CID, EntryChunk, Link, RAW_CODEC,
    metadata::{
        GraphsyncFilecoinV1, TRANSPORT_GRAPHSYNC_FILECOINV1, TRANSPORT_IPFS_GATEWAY_HTTP,
        encode_metadata,
    },
};

const DAG_JSON: u64 = 0x0129;

pub fn test_multihash(seed: &str) -> Multihash<64> {
    Code::Sha2_256.digest(seed.as_bytes())
}

/// A deterministic CID derived from `seed`.
pub fn test_cid(seed: &str) -> Cid {
    Cid::new_v1(DAG_JSON, test_multihash(seed))
}

pub fn arbitrary_cid(g: &mut quickcheck::Gen) -> Cid {
    let seed = <u64 as quickcheck::Arbitrary>::arbitrary(g);
    Cid::new_v1(RAW_CODEC, test_multihash(&seed.to_string()))
}

/// An address nothing listens on.
/// An identity multihash with a `len`-byte digest.
pub fn identity_multihash_bytes(len: u8) -> Vec<u8> {
    assert!(len < 0x80, "single-byte varint length");
    let mut bytes = vec![0x00, len];
    bytes.extend(std::iter::repeat_n(0xab, usize::from(len)));
    bytes
}

pub fn unused_local_address() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Builder for advertisements served by [`MockIpniServer`].
#[derive(Debug, Clone)]
pub struct TestAdvertisement {
    pub cid: Cid,
    pub previous: Option<Cid>,
    pub piece_cid: Option<Cid>,
    pub payload: Option<Multihash<64>>,
}

impl TestAdvertisement {
    pub fn new(seed: &str) -> Self {
        Self {
            cid: test_cid(seed),
            previous: None,
            piece_cid: None,
            payload: None,
        }
    }

    pub fn with_previous(mut self, previous: Cid) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Announces the payload over graphsync with a deal for `piece_cid`.
    pub fn with_piece(mut self, piece_cid: Cid) -> Self {
        self.piece_cid = Some(piece_cid);
        self
    }

    pub fn with_payload(mut self, payload: Multihash<64>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn payload_cid(&self) -> Option<Cid> {
        self.payload.map(|mh| Cid::new_v1(RAW_CODEC, mh))
    }

    pub fn entries_cid(&self) -> String {
        match self.payload {
            Some(_) => test_cid(&format!("{}-entries", self.cid)).to_string(),
            None => EMPTY_ENTRIES_CID.to_string(),
        }
    }

    pub fn metadata(&self) -> Vec<u8> {
        match self.piece_cid {
            Some(piece_cid) => encode_metadata(
                TRANSPORT_GRAPHSYNC_FILECOINV1,
                Some(&GraphsyncFilecoinV1 {
                    piece_cid,
                    verified_deal: false,
                    fast_retrieval: true,
                }),
            ),
            None => encode_metadata(TRANSPORT_IPFS_GATEWAY_HTTP, None),
        }
        .unwrap()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(Advertisement {
            previous_id: self.previous.map(|cid| Link {
                cid: cid.to_string(),
            }),
            entries: Some(Link {
                cid: self.entries_cid(),
            }),
            metadata: Some(Bytes::from_slice(&self.metadata())),
            is_rm: false,
        })
        .unwrap()
    }

    pub fn entries_json(&self) -> Option<serde_json::Value> {
        self.payload.map(|mh| {
            serde_json::to_value(EntryChunk {
                entries: vec![
                    Bytes::from_slice(&mh.to_bytes()),
                    Bytes::from_slice(&test_multihash("second entry").to_bytes()),
                ],
                next: None,
            })
            .unwrap()
        })
    }
}

#[derive(Debug, Clone)]
struct MockResponse {
    status: StatusCode,
    body: String,
}

#[derive(Debug, Default)]
struct MockState {
    documents: HashMap<String, MockResponse>,
    delays: HashMap<String, Duration>,
    requests: HashMap<String, usize>,
    providers: Option<MockResponse>,
}

type SharedState = Arc<Mutex<MockState>>;

/// An index provider publisher (`/ipni/v1/ad/{cid}`) and provider directory (`/providers`)
/// listening on a random local port. Unknown CIDs are answered with `404`.
pub struct MockIpniServer {
    address: SocketAddr,
    state: SharedState,
}

impl MockIpniServer {
    pub async fn start() -> Self {
        let state = SharedState::default();
        let app = Router::new()
            .route("/ipni/v1/ad/{cid}", get(serve_document))
            .route("/providers", get(serve_providers))
            .with_state(state.clone());
        // A port number of 0 will request that the OS assigns a port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        Self { address, state }
    }

    /// Base URL without a trailing slash, e.g. `http://127.0.0.1:1234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    pub fn publish(&self, ad: &TestAdvertisement) {
        self.serve_json(ad.cid.to_string(), &ad.to_json());
        if let Some(entries) = ad.entries_json() {
            self.serve_json(ad.entries_cid(), &entries);
        }
    }

    pub fn serve_json(&self, cid: impl Into<String>, body: &serde_json::Value) {
        self.serve_raw(cid, 200, &body.to_string());
    }

    /// Serves an entries chunk made of the given binary entries.
    pub fn serve_entries(&self, cid: impl Into<String>, entries: &[Vec<u8>]) {
        let chunk = EntryChunk {
            entries: entries.iter().map(|entry| Bytes::from_slice(entry)).collect(),
            next: None,
        };
        self.serve_json(cid, &serde_json::to_value(chunk).unwrap());
    }

    pub fn serve_status(&self, cid: impl Into<String>, status: u16, message: &str) {
        self.serve_raw(cid, status, message);
    }

    pub fn serve_raw(&self, cid: impl Into<String>, status: u16, body: &str) {
        self.state.lock().documents.insert(
            cid.into(),
            MockResponse {
                status: StatusCode::from_u16(status).unwrap(),
                body: body.to_string(),
            },
        );
    }

    pub fn set_delay(&self, cid: impl Into<String>, delay: Duration) {
        self.state.lock().delays.insert(cid.into(), delay);
    }

    pub fn set_providers(&self, status: u16, body: &str) {
        self.state.lock().providers = Some(MockResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        });
    }

    pub fn request_count(&self, cid: &str) -> usize {
        self.state.lock().requests.get(cid).copied().unwrap_or_default()
    }
}

async fn serve_document(State(state): State<SharedState>, Path(cid): Path<String>) -> Response {
    let (document, delay) = {
        let mut state = state.lock();
        *state.requests.entry(cid.clone()).or_default() += 1;
        (
            state.documents.get(&cid).cloned(),
            state.delays.get(&cid).copied(),
        )
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    respond(document)
}

async fn serve_providers(State(state): State<SharedState>) -> Response {
    let providers = state.lock().providers.clone();
    respond(providers)
}

fn respond(response: Option<MockResponse>) -> Response {
    match response {
        Some(MockResponse { status, body }) => (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

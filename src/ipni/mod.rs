// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Types and helpers for talking to InterPlanetary Network Indexer (IPNI) endpoints.
//!
//! Index providers publish a backward-linked chain of advertisements. Each advertisement
//! points to the previous one (`PreviousID`), to a chunk of content multihashes (`Entries`)
//! and carries transport-specific metadata describing how the content can be retrieved.
//! See <https://github.com/ipni/specs/blob/main/IPNI.md>.

pub mod client;
pub mod metadata;
pub mod providers;

use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use cid::Cid;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

pub use client::{AdvertisedPayload, DEFAULT_FETCH_TIMEOUT, FetchError, ProviderClient};
pub use providers::{ProviderInfoMap, ProviderInfoTable, ProviderSync, provider_info_channel};

/// Well-known CID of an empty entries chunk. Advertisements linking to it (or not linking to any
/// entries at all) do not announce any payload, e.g. removal records.
/// See <https://github.com/ipni/go-libipni/blob/489479457101ffe3cbe80682570b63c12ba2546d/ingest/schema/schema.go#L65-L71>
pub const EMPTY_ENTRIES_CID: &str = "bafkreehdwdcefgh4dqkjv67uzcmw7oje";

/// Multicodec code of the `raw` codec, used for payload block CIDs rebuilt from entry multihashes.
pub const RAW_CODEC: u64 = 0x55;

/// DAG-JSON encodes bytes as padding-less base64, but some providers include the padding anyway.
const DAG_JSON_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// IPNI's current view of one provider, as announced by the provider directory.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Base URL of the provider's HTTP publisher, or the raw multiaddr when it cannot be expressed
    /// as an HTTP(S) URL.
    pub provider_address: String,
    /// Head of the provider's advertisement chain.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "lastAdvertisementCID")]
    pub last_advertisement_cid: Cid,
}

impl ProviderInfo {
    /// Returns `true` when the publisher address can be walked with plain HTTP(S) requests.
    pub fn is_http(&self) -> bool {
        is_http_address(&self.provider_address)
    }
}

pub fn is_http_address(address: &str) -> bool {
    address.starts_with("http://") || address.starts_with("https://")
}

/// A DAG-JSON link: `{ "/": "<cid>" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "/")]
    pub cid: String,
}

impl Link {
    pub fn to_cid(&self) -> Result<Cid, cid::Error> {
        self.cid.parse()
    }
}

/// A DAG-JSON bytes value: `{ "/": { "bytes": "<base64>" } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bytes {
    #[serde(rename = "/")]
    inner: BytesInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BytesInner {
    bytes: String,
}

impl Bytes {
    #[cfg(test)]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            inner: BytesInner {
                bytes: base64::prelude::BASE64_STANDARD_NO_PAD.encode(bytes),
            },
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        DAG_JSON_BASE64.decode(&self.inner.bytes)
    }
}

/// The subset of an IPNI advertisement this crate consumes. Signatures, context IDs and the
/// provider's own address list are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Advertisement {
    #[serde(rename = "PreviousID", default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Bytes>,
    #[serde(default)]
    pub is_rm: bool,
}

impl Advertisement {
    /// Returns the entries link unless the advertisement does not announce any payload.
    pub fn entries_link(&self) -> Option<&Link> {
        self.entries
            .as_ref()
            .filter(|link| !link.cid.is_empty() && link.cid != EMPTY_ENTRIES_CID)
    }
}

/// One chunk of advertised multihashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntryChunk {
    #[serde(default)]
    pub entries: Vec<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Link>,
}

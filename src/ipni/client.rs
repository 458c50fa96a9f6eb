// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Duration;

use cid::{Cid, multihash::Multihash};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::{Advertisement, EntryChunk, RAW_CODEC, metadata::parse_metadata};
use crate::utils::net::global_http_client;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Digest capacity of the CIDs the index stores.
const MAX_DIGEST_SIZE: usize = 64;

/// Upper bound on the server-provided error message kept in [`FetchError::HttpStatus`].
const SERVER_MESSAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request to {url} failed: {}", status_reason(*status, message))]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },
    #[error("HTTP request to {url} failed: {cause}")]
    Network { url: String, cause: String },
    #[error("HTTP request to {url} failed: operation timed out")]
    Timeout { url: String },
    #[error("Cannot decode {url}: {cause}")]
    Decode { url: String, cause: String },
}

fn status_reason(status: u16, message: &str) -> String {
    if message.is_empty() {
        status.to_string()
    } else {
        format!("{status} {message}")
    }
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Human-readable classification persisted into the walker status.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    fn from_reqwest(url: &Url, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if err.is_decode() {
            FetchError::Decode {
                url,
                cause: root_cause(&err),
            }
        } else {
            let cause = root_cause(&err);
            FetchError::Network {
                url,
                cause: if cause.is_empty() {
                    "fetch failed".into()
                } else {
                    cause
                },
            }
        }
    }
}

/// The message of the innermost error in the `source` chain, e.g. `Connection refused` rather
/// than `error sending request`.
fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

fn truncate_message(body: &str) -> String {
    let trimmed = body.trim_end();
    match trimmed.char_indices().nth(SERVER_MESSAGE_LIMIT) {
        Some((end, _)) => trimmed[..end].to_string(),
        None => trimmed.to_string(),
    }
}

/// What a single advertisement contributes to the piece index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertisedEntries {
    /// The advertisement does not announce any payload (removal records, empty entry chunks).
    None,
    /// The first entry of the advertisement, rebuilt as a `raw` CID.
    Sampled {
        piece_cid: Option<Cid>,
        payload_cid: Cid,
    },
    /// The first entry is a multihash whose digest does not fit a CID, so nothing is sampled.
    Unsampled { piece_cid: Option<Cid> },
    /// The provider answered `404` for the entries chunk.
    NotRetrievable { piece_cid: Option<Cid> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedPayload {
    pub previous_advertisement_cid: Option<Cid>,
    pub entries: AdvertisedEntries,
}

impl AdvertisedPayload {
    pub fn piece_cid(&self) -> Option<Cid> {
        match &self.entries {
            AdvertisedEntries::None => None,
            AdvertisedEntries::Sampled { piece_cid, .. }
            | AdvertisedEntries::Unsampled { piece_cid }
            | AdvertisedEntries::NotRetrievable { piece_cid } => *piece_cid,
        }
    }

    pub fn payload_cid(&self) -> Option<Cid> {
        match &self.entries {
            AdvertisedEntries::Sampled { payload_cid, .. } => Some(*payload_cid),
            _ => None,
        }
    }

    pub fn entries_fetch_error(&self) -> bool {
        matches!(self.entries, AdvertisedEntries::NotRetrievable { .. })
    }

    pub fn has_entries(&self) -> bool {
        !matches!(self.entries, AdvertisedEntries::None)
    }
}

/// HTTP client for index provider publishers and the IPNI provider directory.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl Default for ProviderClient {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl ProviderClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: global_http_client(),
            timeout,
        }
    }

    /// `GET <url>` bounded by the client timeout, decoding the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        debug!("Fetching {url}");
        let response = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = response.status();
        debug!("Response from {url} -> {status}");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                debug!("Cannot read the error body from {url}: {e}");
                String::new()
            });
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                message: truncate_message(&body),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            cause: e.to_string(),
        })
    }

    /// Fetches the content-addressed IPNI document `cid` from the publisher at `provider_address`.
    pub async fn fetch_cid<T: DeserializeOwned>(
        &self,
        provider_address: &str,
        cid: &str,
    ) -> Result<T, FetchError> {
        let url = advertisement_url(provider_address, cid)?;
        self.get_json(&url).await
    }

    /// Fetches advertisement `ad_cid` and samples the first multihash of its entries.
    pub async fn fetch_advertised_payload(
        &self,
        provider_address: &str,
        ad_cid: &Cid,
    ) -> Result<AdvertisedPayload, FetchError> {
        let ad_url = advertisement_url(provider_address, &ad_cid.to_string())?;
        let advertisement: Advertisement = self.get_json(&ad_url).await?;
        let decode_error = |cause: String| FetchError::Decode {
            url: ad_url.to_string(),
            cause,
        };

        let previous_advertisement_cid = advertisement
            .previous_id
            .as_ref()
            .map(|link| link.to_cid())
            .transpose()
            .map_err(|e| decode_error(format!("invalid PreviousID: {e}")))?;

        let Some(entries_link) = advertisement.entries_link() else {
            debug!(
                "advertisement {ad_cid} has no entries: {:?}",
                advertisement.entries
            );
            return Ok(AdvertisedPayload {
                previous_advertisement_cid,
                entries: AdvertisedEntries::None,
            });
        };

        let piece_cid = match &advertisement.metadata {
            Some(metadata) => {
                let bytes = metadata
                    .decode()
                    .map_err(|e| decode_error(format!("invalid metadata encoding: {e}")))?;
                parse_metadata(&bytes)
                    .map_err(|e| decode_error(e.to_string()))?
                    .piece_cid()
            }
            None => None,
        };

        let chunk: EntryChunk = match self.fetch_cid(provider_address, &entries_link.cid).await {
            Ok(chunk) => chunk,
            Err(e) if e.is_not_found() => {
                // Providers routinely drop old entries; retrying will not help.
                debug!(
                    "Cannot fetch ad {ad_cid} entries {}: {e}",
                    entries_link.cid
                );
                return Ok(AdvertisedPayload {
                    previous_advertisement_cid,
                    entries: AdvertisedEntries::NotRetrievable { piece_cid },
                });
            }
            Err(e) => return Err(e),
        };

        let Some(first) = chunk.entries.first() else {
            debug!("entries chunk {} of ad {ad_cid} is empty", entries_link.cid);
            return Ok(AdvertisedPayload {
                previous_advertisement_cid,
                entries: AdvertisedEntries::None,
            });
        };
        let entries_url = advertisement_url(provider_address, &entries_link.cid)?;
        let entry_error = |cause: String| FetchError::Decode {
            url: entries_url.to_string(),
            cause,
        };
        let bytes = first
            .decode()
            .map_err(|e| entry_error(format!("invalid entry encoding: {e}")))?;
        let entries = match entry_multihash(&bytes)
            .map_err(|e| entry_error(format!("invalid entry multihash: {e}")))?
        {
            Some(multihash) => AdvertisedEntries::Sampled {
                piece_cid,
                payload_cid: Cid::new_v1(RAW_CODEC, multihash),
            },
            None => {
                debug!("first entry of ad {ad_cid} has an oversized digest, skipping the sample");
                AdvertisedEntries::Unsampled { piece_cid }
            }
        };

        Ok(AdvertisedPayload {
            previous_advertisement_cid,
            entries,
        })
    }
}

/// Reads a binary multihash. Digests longer than [`MAX_DIGEST_SIZE`] are valid multihashes but
/// cannot be carried by a [`Cid`] and yield `None`.
fn entry_multihash(bytes: &[u8]) -> anyhow::Result<Option<Multihash<MAX_DIGEST_SIZE>>> {
    let (_code, rest) = unsigned_varint::decode::u64(bytes)?;
    let (size, digest) = unsigned_varint::decode::u64(rest)?;
    anyhow::ensure!(
        digest.len() as u64 >= size,
        "digest is {} bytes, expected {size}",
        digest.len()
    );
    if size > MAX_DIGEST_SIZE as u64 {
        return Ok(None);
    }
    Ok(Some(Multihash::from_bytes(bytes)?))
}

/// `http://host:port` + `bafy...` -> `http://host:port/ipni/v1/ad/bafy...`
pub fn advertisement_url(provider_address: &str, cid: &str) -> Result<Url, FetchError> {
    let path = format!("/ipni/v1/ad/{cid}");
    Url::parse(provider_address)
        .and_then(|base| base.join(&path))
        .map_err(|e| FetchError::Network {
            url: format!("{provider_address}{path}"),
            cause: format!("invalid URL: {e}"),
        })
}

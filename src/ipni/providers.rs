// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Periodic download of the IPNI provider directory.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use ahash::HashMap;
use multiaddr::{Multiaddr, Protocol};
use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

use super::{FetchError, Link, ProviderClient, ProviderInfo};
use crate::metrics;

pub const DEFAULT_PROVIDERS_URL: &str = "https://cid.contact/providers";
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Provider ID (the publisher's peer ID) to the latest known provider info.
pub type ProviderInfoMap = HashMap<String, ProviderInfo>;

/// One record of `GET /providers`. `AddrInfo`, `ExtendedProviders` and friends are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProviderRecord {
    #[serde(default)]
    publisher: Option<AddrInfo>,
    #[serde(default)]
    last_advertisement: Option<Link>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddrInfo {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    addrs: Option<Vec<String>>,
}

impl ProviderRecord {
    fn into_provider_info(self) -> Option<(String, ProviderInfo)> {
        let publisher = self.publisher?;
        let Some(address) = publisher.addrs.as_ref().and_then(|addrs| addrs.first()) else {
            debug!("Provider {} does not advertise any address", publisher.id);
            return None;
        };
        let last_advertisement_cid = match self.last_advertisement?.to_cid() {
            Ok(cid) => cid,
            Err(e) => {
                debug!("Provider {} has an invalid head: {e}", publisher.id);
                return None;
            }
        };
        let provider_address = match address.parse::<Multiaddr>() {
            Ok(multiaddr) => match multiaddr_to_http_url(&multiaddr) {
                Some(url) => url.to_string(),
                None => {
                    debug!(
                        "Cannot convert address to HTTP(s) URL (provider: {}): {address}",
                        publisher.id
                    );
                    address.clone()
                }
            },
            Err(e) => {
                debug!("Invalid multiaddr {address} (provider: {}): {e}", publisher.id);
                address.clone()
            }
        };
        Some((
            publisher.id,
            ProviderInfo {
                provider_address,
                last_advertisement_cid,
            },
        ))
    }
}

/// `"/dns/example.com/tcp/8080/http" -> "http://example.com:8080/"`
///
/// `/tls/http` is treated as `https`, a trailing `/p2p/<peer id>` is ignored. Returns [`None`]
/// for addresses that cannot be reached over plain HTTP(S), e.g. libp2p transports.
pub fn multiaddr_to_http_url(m: &Multiaddr) -> Option<Url> {
    let mut components = m.iter().peekable();
    let host = match components.next()? {
        Protocol::Dns(it) | Protocol::Dns4(it) | Protocol::Dns6(it) | Protocol::Dnsaddr(it) => {
            it.to_string()
        }
        Protocol::Ip4(it) => it.to_string(),
        Protocol::Ip6(it) => format!("[{it}]"),
        _ => return None,
    };
    let port = components
        .next_if(|it| matches!(it, Protocol::Tcp(_)))
        .and_then(|it| match it {
            Protocol::Tcp(port) => Some(port),
            _ => None,
        });
    let tls = components
        .next_if(|it| matches!(it, Protocol::Tls))
        .is_some();
    let scheme = match (components.next()?, tls) {
        (Protocol::Http, false) => "http",
        (Protocol::Http, true) | (Protocol::Https, false) => "https",
        _ => return None,
    };
    if !components.all(|it| matches!(it, Protocol::P2p(_))) {
        return None;
    }
    let parse_me = match port {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    };
    parse_me.parse().ok()
}

/// Downloads the provider directory and converts it to a [`ProviderInfoMap`].
pub async fn get_providers_with_metadata(
    client: &ProviderClient,
    providers_url: &Url,
) -> Result<ProviderInfoMap, FetchError> {
    let records: Vec<ProviderRecord> = client.get_json(providers_url).await?;
    Ok(records
        .into_iter()
        .filter_map(ProviderRecord::into_provider_info)
        .collect())
}

/// Read side of the latest provider directory. Every walker holds a clone.
#[derive(Debug, Clone)]
pub struct ProviderInfoTable {
    rx: watch::Receiver<Arc<ProviderInfoMap>>,
}

/// Write side of the latest provider directory, owned by the discovery sync.
#[derive(Debug)]
pub struct ProviderInfoPublisher {
    tx: watch::Sender<Arc<ProviderInfoMap>>,
}

pub fn provider_info_channel() -> (ProviderInfoPublisher, ProviderInfoTable) {
    let (tx, rx) = watch::channel(Arc::new(ProviderInfoMap::default()));
    (ProviderInfoPublisher { tx }, ProviderInfoTable { rx })
}

impl ProviderInfoTable {
    pub fn latest(&self, provider_id: &str) -> Option<ProviderInfo> {
        self.rx.borrow().get(provider_id).cloned()
    }

    /// The most recent complete directory, marking it as seen.
    pub fn snapshot(&mut self) -> Arc<ProviderInfoMap> {
        self.rx.borrow_and_update().clone()
    }

    /// Waits for the next sync cycle. Returns `false` once the publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl ProviderInfoPublisher {
    /// Replaces the directory. Providers missing from `providers` keep their last known info.
    pub fn publish(&self, providers: ProviderInfoMap) {
        let merged = {
            let current = self.tx.borrow();
            let mut merged = ProviderInfoMap::clone(&current);
            merged.extend(providers);
            merged
        };
        metrics::PROVIDERS_KNOWN.set(merged.len() as i64);
        self.tx.send_replace(Arc::new(merged));
    }
}

/// Keeps the [`ProviderInfoTable`] fresh by polling the IPNI provider directory.
#[derive(Debug, Clone)]
pub struct ProviderSync {
    client: ProviderClient,
    providers_url: Url,
    sync_interval: Duration,
}

impl ProviderSync {
    pub fn new(client: ProviderClient, providers_url: Url, sync_interval: Duration) -> Self {
        Self {
            client,
            providers_url,
            sync_interval,
        }
    }

    pub async fn sync_once(&self) -> Result<ProviderInfoMap, FetchError> {
        get_providers_with_metadata(&self.client, &self.providers_url).await
    }

    /// Runs sync cycles until `cancel` fires. A failed cycle keeps the previous directory.
    pub async fn run(self, publisher: ProviderInfoPublisher, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            let started = Instant::now();
            info!("Syncing from IPNI");
            match self.sync_once().await {
                Ok(providers) => {
                    info!(
                        "Found {} providers, {} support(s) HTTP(s)",
                        providers.len(),
                        providers.values().filter(|info| info.is_http()).count()
                    );
                    metrics::IPNI_SYNC.get_or_create(&metrics::SYNC_OK).inc();
                    publisher.publish(providers);
                }
                Err(e) => {
                    metrics::IPNI_SYNC.get_or_create(&metrics::SYNC_ERROR).inc();
                    error!("Cannot sync from IPNI: {e}");
                }
            }
            let delay = self.sync_interval.saturating_sub(started.elapsed());
            if !delay.is_zero() {
                debug!("Waiting for {delay:?} before the next sync from IPNI");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        info!("IPNI sync stopped");
    }
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Decoding of the `Metadata` blob attached to IPNI advertisements.
//!
//! The blob starts with an unsigned varint multicodec identifying the retrieval transport,
//! followed by a transport-specific payload. Only `transport-graphsync-filecoinv1` carries
//! deal information (as DAG-CBOR), which is where the piece CID comes from.
//! See <https://github.com/ipni/specs/blob/main/IPNI.md#metadata>

use std::fmt;

use cid::Cid;
use serde::{Deserialize, Serialize};

pub const TRANSPORT_BITSWAP: u64 = 0x0900;
pub const TRANSPORT_GRAPHSYNC_FILECOINV1: u64 = 0x0910;
pub const TRANSPORT_IPFS_GATEWAY_HTTP: u64 = 0x0920;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("invalid transport code: {0}")]
    TransportCode(#[from] unsigned_varint::decode::Error),
    #[error("cannot decode graphsync deal metadata: {0}")]
    Deal(#[from] serde_ipld_dagcbor::DecodeError<std::convert::Infallible>),
}

/// Retrieval transport announced by an advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Bitswap,
    Graphsync,
    Http,
    Unknown(u64),
}

impl Protocol {
    pub fn from_code(code: u64) -> Self {
        match code {
            TRANSPORT_BITSWAP => Protocol::Bitswap,
            TRANSPORT_GRAPHSYNC_FILECOINV1 => Protocol::Graphsync,
            TRANSPORT_IPFS_GATEWAY_HTTP => Protocol::Http,
            other => Protocol::Unknown(other),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Bitswap => f.write_str("bitswap"),
            Protocol::Graphsync => f.write_str("graphsync"),
            Protocol::Http => f.write_str("http"),
            Protocol::Unknown(code) => write!(f, "0x{code:x}"),
        }
    }
}

/// Deal descriptor of `transport-graphsync-filecoinv1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GraphsyncFilecoinV1 {
    #[serde(rename = "PieceCID")]
    pub piece_cid: Cid,
    #[serde(default)]
    pub verified_deal: bool,
    #[serde(default)]
    pub fast_retrieval: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub protocol: Protocol,
    pub deal: Option<GraphsyncFilecoinV1>,
}

impl Metadata {
    pub fn piece_cid(&self) -> Option<Cid> {
        self.deal.as_ref().map(|deal| deal.piece_cid)
    }
}

pub fn parse_metadata(bytes: &[u8]) -> Result<Metadata, MetadataError> {
    let (code, payload) = unsigned_varint::decode::u64(bytes)?;
    let protocol = Protocol::from_code(code);
    let deal = match protocol {
        Protocol::Graphsync => Some(serde_ipld_dagcbor::from_slice(payload)?),
        _ => None,
    };
    Ok(Metadata { protocol, deal })
}

#[cfg(test)]
/// Encodes metadata the way index providers do. The inverse of [`parse_metadata`].
pub fn encode_metadata(
    protocol_code: u64,
    deal: Option<&GraphsyncFilecoinV1>,
) -> anyhow::Result<Vec<u8>> {
    let mut buf = unsigned_varint::encode::u64_buffer();
    let mut bytes = unsigned_varint::encode::u64(protocol_code, &mut buf).to_vec();
    if let Some(deal) = deal {
        bytes.extend(serde_ipld_dagcbor::to_vec(deal)?);
    }
    Ok(bytes)
}

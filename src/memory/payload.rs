//! Tagged payloads and their storage encoding
//!
//! A [`Payload`] is serialised to JSON. Encodings larger than the compression
//! threshold are LZ4-compressed (size-prepended frame). Every encoding carries
//! a BLAKE3 checksum of the stored bytes, verified on decode.

use crate::analysis::{AnomalyResult, CorrelationResult, Pattern};
use crate::errors::StorageError;
use crate::forecast::{Prediction, RiskMetrics, TrendIndicator};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Patterns(Vec<Pattern>),
    Anomalies(Vec<AnomalyResult>),
    Forecast(Vec<Prediction>),
    Risk(RiskMetrics),
    Trend(TrendIndicator),
    Correlation(CorrelationResult),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Patterns,
    Anomalies,
    Forecast,
    Risk,
    Trend,
    Correlation,
    Raw,
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Patterns(_) => PayloadKind::Patterns,
            Payload::Anomalies(_) => PayloadKind::Anomalies,
            Payload::Forecast(_) => PayloadKind::Forecast,
            Payload::Risk(_) => PayloadKind::Risk,
            Payload::Trend(_) => PayloadKind::Trend,
            Payload::Correlation(_) => PayloadKind::Correlation,
            Payload::Raw(_) => PayloadKind::Raw,
        }
    }
}

/// Bytes ready for the persistent tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub bytes: Vec<u8>,
    pub compressed: bool,
    /// BLAKE3 hex digest of `bytes`
    pub checksum: String,
    /// Serialized size before compression
    pub original_size: usize,
}

pub fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn encode(payload: &Payload, compression_threshold: usize) -> Result<EncodedPayload, StorageError> {
    let json = serde_json::to_vec(payload)?;
    let original_size = json.len();

    let (bytes, compressed) = if original_size > compression_threshold {
        (lz4_flex::compress_prepend_size(&json), true)
    } else {
        (json, false)
    };

    Ok(EncodedPayload {
        checksum: checksum(&bytes),
        bytes,
        compressed,
        original_size,
    })
}

/// Verify and decode stored bytes. `key` only labels errors.
pub fn decode(
    key: &str,
    bytes: &[u8],
    compressed: bool,
    expected_checksum: &str,
) -> Result<Payload, StorageError> {
    if checksum(bytes) != expected_checksum {
        return Err(StorageError::ChecksumMismatch {
            key: key.to_string(),
        });
    }

    let payload = if compressed {
        let json = lz4_flex::decompress_size_prepended(bytes).map_err(|e| {
            StorageError::Decompression {
                reason: e.to_string(),
            }
        })?;
        serde_json::from_slice(&json)?
    } else {
        serde_json::from_slice(bytes)?
    };
    Ok(payload)
}

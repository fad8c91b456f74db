//! Entry codec: serialization plus size-aware compression.
//!
//! Values are serialized with `serde_json`. Payloads strictly larger than the
//! threshold are compressed, and the compressed form is kept only when it is
//! strictly smaller than the plain one. A compressor failure also leaves the
//! payload plain.
//!
//! # Payload Format
//!
//! Compressed payloads have a 4-byte header:
//! - Byte 0: Magic byte (0xC0)
//! - Byte 1: Algorithm (0x01 = LZ4, 0x02 = Zstd)
//! - Byte 2: Zstd level, 1-22 (0 for LZ4)
//! - Byte 3: Reserved
//!
//! Uncompressed payloads are the bare serialized bytes. The `compressed` flag
//! stored next to the payload says which form is present.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CompressionAlgorithm;
use crate::error::{CacheError, Result};

/// Magic byte for compressed data
const COMPRESSION_MAGIC: u8 = 0xC0;

/// Algorithm identifier bytes
const ALG_LZ4: u8 = 0x01;
const ALG_ZSTD: u8 = 0x02;

const HEADER_LEN: usize = 4;

/// Output of [`EntryCodec::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub compressed: bool,
}

/// Turns values into stored bytes and back.
#[derive(Debug, Clone, Copy)]
pub struct EntryCodec {
    algorithm: CompressionAlgorithm,
    threshold: usize,
}

impl EntryCodec {
    pub fn new(algorithm: CompressionAlgorithm, threshold: usize) -> Self {
        Self {
            algorithm,
            threshold,
        }
    }

    pub fn encode<V: Serialize + ?Sized>(&self, value: &V) -> Result<Encoded> {
        let serialized =
            serde_json::to_vec(value).map_err(|e| CacheError::Encoding(e.to_string()))?;

        if serialized.len() <= self.threshold {
            return Ok(Encoded {
                bytes: serialized,
                compressed: false,
            });
        }

        let compressed = match self.algorithm {
            CompressionAlgorithm::None => None,
            CompressionAlgorithm::Lz4 => Some(compress_lz4(&serialized)),
            CompressionAlgorithm::Zstd { level } => match compress_zstd(&serialized, level) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Storing entry uncompressed: {}", e);
                    None
                }
            },
        };

        match compressed {
            Some(bytes) if bytes.len() < serialized.len() => {
                debug!(
                    "Compressed {} bytes -> {} bytes ({:.1}%)",
                    serialized.len(),
                    bytes.len(),
                    bytes.len() as f64 / serialized.len() as f64 * 100.0
                );
                Ok(Encoded {
                    bytes,
                    compressed: true,
                })
            }
            _ => Ok(Encoded {
                bytes: serialized,
                compressed: false,
            }),
        }
    }

    pub fn decode<V: DeserializeOwned>(&self, bytes: &[u8], compressed: bool) -> Result<V> {
        let plain;
        let data = if compressed {
            plain = decompress(bytes)?;
            plain.as_slice()
        } else {
            bytes
        };

        serde_json::from_slice(data).map_err(|e| CacheError::Decoding(e.to_string()))
    }
}

fn compress_lz4(data: &[u8]) -> Vec<u8> {
    let compressed = lz4_flex::compress_prepend_size(data);
    let mut output = Vec::with_capacity(HEADER_LEN + compressed.len());
    output.extend_from_slice(&[COMPRESSION_MAGIC, ALG_LZ4, 0, 0]);
    output.extend_from_slice(&compressed);
    output
}

fn compress_zstd(data: &[u8], level: i32) -> Result<Vec<u8>> {
    let level = level.clamp(1, 22);
    let compressed = zstd::encode_all(data, level)
        .map_err(|e| CacheError::Compression(format!("Zstd compression failed: {}", e)))?;
    let mut output = Vec::with_capacity(HEADER_LEN + compressed.len());
    output.extend_from_slice(&[COMPRESSION_MAGIC, ALG_ZSTD, level as u8, 0]);
    output.extend_from_slice(&compressed);
    Ok(output)
}

/// Decompress, detecting the algorithm from the header.
fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < HEADER_LEN || data[0] != COMPRESSION_MAGIC {
        return Err(CacheError::Compression(
            "Missing compression header".to_string(),
        ));
    }

    let body = &data[HEADER_LEN..];
    match data[1] {
        ALG_LZ4 => lz4_flex::decompress_size_prepended(body)
            .map_err(|e| CacheError::Compression(format!("LZ4 decompression failed: {}", e))),
        ALG_ZSTD => zstd::decode_all(body)
            .map_err(|e| CacheError::Compression(format!("Zstd decompression failed: {}", e))),
        unknown => Err(CacheError::Compression(format!(
            "Unknown compression algorithm: 0x{:02x}",
            unknown
        ))),
    }
}

//! Value Codec Module
//!
//! Encodes values into the bytes stored in memcached.
//!
//! Layout:
//! - non-negative integers: ASCII decimal, so server-side incr/decr work
//! - `j` + JSON
//! - `z` + zlib(JSON), used once JSON reaches the compression threshold

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{CacheError, Result};

const JSON_MARKER: u8 = b'j';
const ZLIB_MARKER: u8 = b'z';

/// memcached's default item size limit.
const MAX_ITEM_SIZE: u64 = 1024 * 1024;

/// Largest decompressed value accepted, well above any real zlib ratio on JSON.
const MAX_DECOMPRESSED_LEN: u64 = MAX_ITEM_SIZE * 32;

// == Value Codec ==
#[derive(Debug, Clone)]
pub struct ValueCodec {
    /// 0 disables compression
    min_compress_len: usize,
    level: Compression,
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::new(0, -1)
    }
}

impl ValueCodec {
    /// `level` of -1 picks the zlib default.
    pub fn new(min_compress_len: usize, level: i32) -> Self {
        let level = match u32::try_from(level) {
            Ok(level) => Compression::new(level.min(9)),
            Err(_) => Compression::default(),
        };
        Self {
            min_compress_len,
            level,
        }
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let value = serde_json::to_value(value)?;

        if let Some(n) = value.as_u64() {
            return Ok(n.to_string().into_bytes());
        }

        let json = serde_json::to_vec(&value)?;

        if self.min_compress_len > 0 && json.len() >= self.min_compress_len {
            let compressed = self.compress(&json)?;
            // Only worth it when it actually shrinks
            if compressed.len() < json.len() {
                let mut out = Vec::with_capacity(compressed.len() + 1);
                out.push(ZLIB_MARKER);
                out.extend_from_slice(&compressed);
                return Ok(out);
            }
        }

        let mut out = Vec::with_capacity(json.len() + 1);
        out.push(JSON_MARKER);
        out.extend_from_slice(&json);
        Ok(out)
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match bytes.first() {
            Some(b'0'..=b'9') => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                let n: u64 = text
                    .trim_end_matches(' ')
                    .parse()
                    .map_err(|_| CacheError::Serialization(format!("bad integer {:?}", text)))?;
                Ok(serde_json::from_value(Value::from(n))?)
            }
            Some(&JSON_MARKER) => Ok(serde_json::from_slice(&bytes[1..])?),
            Some(&ZLIB_MARKER) => {
                let mut json = Vec::new();
                ZlibDecoder::new(&bytes[1..])
                    .take(MAX_DECOMPRESSED_LEN + 1)
                    .read_to_end(&mut json)
                    .map_err(|e| CacheError::Serialization(format!("zlib: {}", e)))?;
                if json.len() as u64 > MAX_DECOMPRESSED_LEN {
                    return Err(CacheError::Serialization(format!(
                        "decompressed value exceeds {} bytes",
                        MAX_DECOMPRESSED_LEN
                    )));
                }
                Ok(serde_json::from_slice(&json)?)
            }
            Some(other) => Err(CacheError::Serialization(format!(
                "unrecognized value marker 0x{:02x}",
                other
            ))),
            None => Err(CacheError::Serialization("empty value".to_string())),
        }
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let zlib_err = |e: std::io::Error| CacheError::Serialization(format!("zlib: {}", e));

        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(data).map_err(zlib_err)?;
        encoder.finish().map_err(zlib_err)
    }
}

use std::io::{Read, Write};

use anyhow::{Context, Result};
use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use http::{HeaderMap, header};

use crate::entry::CachedEntry;

/// Decides how a captured response body is stored: bodies that already
/// carry a content coding are kept untouched, bodies at or above the
/// configured minimum are gzip-compressed, shorter bodies are stored raw.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    min_length: usize,
}

impl Compressor {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// Build the cache entry for a successful response. `Content-Encoding`
    /// and `Content-Length` are lifted out of the stored headers; the
    /// entry's tag and length are authoritative on the way back out.
    pub fn for_storage(&self, headers: &HeaderMap, body: Bytes) -> Result<CachedEntry> {
        let mut stored_headers = headers.clone();
        stored_headers.remove(header::CONTENT_LENGTH);
        let existing = stored_headers
            .remove(header::CONTENT_ENCODING)
            .and_then(|value| value.to_str().map(|s| s.trim().to_string()).ok())
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("identity"));

        // Never double-compress a body the downstream already encoded.
        if let Some(encoding) = existing {
            return Ok(CachedEntry::new(stored_headers, body, Some(encoding)));
        }

        if body.len() < self.min_length {
            return Ok(CachedEntry::new(stored_headers, body, None));
        }

        let compressed = gzip(&body)?;
        Ok(CachedEntry::new(
            stored_headers,
            compressed,
            Some(GZIP.to_string()),
        ))
    }
}

pub const GZIP: &str = "gzip";

pub fn gzip(body: &[u8]) -> Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder
        .write_all(body)
        .context("compressing response body")?;
    let compressed = encoder.finish().context("finishing gzip stream")?;
    Ok(Bytes::from(compressed))
}

pub fn gunzip(body: &[u8]) -> Result<Bytes> {
    let mut decoder = GzDecoder::new(body);
    let mut decompressed = Vec::with_capacity(body.len() * 2);
    decoder
        .read_to_end(&mut decompressed)
        .context("decompressing cached body")?;
    Ok(Bytes::from(decompressed))
}

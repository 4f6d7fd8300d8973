use bytes::Bytes;
use http::HeaderMap;

/// An immutable cached response. Created once per successful population and
/// replaced wholesale on re-population; the stored headers never include
/// `Content-Length` or `Content-Encoding` (the length lives in
/// `content_length` and the coding in `content_encoding`).
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub headers: HeaderMap,
    pub body: Bytes,
    pub content_encoding: Option<String>,
    pub content_length: u64,
}

impl CachedEntry {
    pub fn new(headers: HeaderMap, body: Bytes, content_encoding: Option<String>) -> Self {
        let content_length = body.len() as u64;
        Self {
            headers,
            body,
            content_encoding,
            content_length,
        }
    }
}

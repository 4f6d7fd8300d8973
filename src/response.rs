use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// A captured downstream response, and the coordinator's own output type.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn ok(headers: HeaderMap, body: Bytes) -> Self {
        Self::new(StatusCode::OK, headers, body)
    }

    /// The bodiless backpressure rejection.
    pub fn too_many_requests() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            HeaderMap::new(),
            Bytes::new(),
        )
    }
}

use http::StatusCode;
use thiserror::Error;

/// Backpressure rejections surfaced by the coordinator. Both render as 429;
/// they are distinguished only for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("lock pool exhausted before a population slot became available")]
    PoolExhausted,
    #[error("timed out waiting for an in-flight population to finish")]
    WaiterTimeout,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        StatusCode::TOO_MANY_REQUESTS
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Rejection::PoolExhausted => "pool_exhausted",
            Rejection::WaiterTimeout => "waiter_timeout",
        }
    }
}

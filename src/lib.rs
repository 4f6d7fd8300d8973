pub mod compress;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod key;
pub mod metrics;
pub mod pool;
pub mod request;
pub mod response;
pub mod settings;
pub mod store;

pub use coordinator::{CacheCoordinator, Handler};
pub use entry::CachedEntry;
pub use error::Rejection;
pub use request::CacheRequest;
pub use response::Response;
pub use settings::Settings;
pub use store::{CacheStore, MemoryStore};

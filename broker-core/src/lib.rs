//! broker-core: Shared infrastructure for the PAM responder and the provider backends.
pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod observability;
pub mod pam;

pub use async_trait;
pub use bytes;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;

//! provider-service: the backend half of the broker.
//!
//! Answers `getAccountInfo`, `pamHandler` and friends for one domain, using a
//! provider picked from the registry at start-up.
pub mod config;
pub mod dispatcher;
pub mod job;
pub mod monitor;
pub mod provider;
pub mod server;
pub mod startup;

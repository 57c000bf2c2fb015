//! pam-service: the PAM responder.
//!
//! Clients talk to it over a Unix socket; it answers from the identity cache or
//! forwards to the provider backend that owns the user's domain.
pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod names;
pub mod response;
pub mod services;
pub mod startup;

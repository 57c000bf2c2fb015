//! Client socket handlers for pam-service.

pub mod client;

pub use client::*;

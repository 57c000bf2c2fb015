//! Inter-process bus used between the PAM responder and the provider backends.
//!
//! This module provides:
//! - Typed method calls and returns for the data-provider and monitor interfaces
//! - A length-delimited JSON frame codec
//! - Symmetric connections with pending-call correlation and single-shot replies
//! - Reconnect backoff for links that come up after the caller

pub mod codec;
pub mod connection;
pub mod error;
pub mod message;
pub mod retry;

pub use codec::BusCodec;
pub use connection::{bind_socket, connect_unix, BusConnection, MethodHandler, PendingCall, ReplyHandle};
pub use error::BusError;
pub use message::{
    AccountInfoArgs, DpErrorMajor, DpReply, Frame, IdentityReply, Method, MethodCall,
    MethodReturn, OnlineReply, PamHandlerArgs, PamHandlerReply, ServiceIdentityReply,
};
pub use retry::{connect_with_retry, is_retryable, retry_bus_op, RetryConfig};

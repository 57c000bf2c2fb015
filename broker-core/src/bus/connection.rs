//! Symmetric bus connection.
//!
//! Either side may issue calls and answer calls on the same stream. Outbound
//! calls are correlated with their reply by serial; inbound calls are handed to
//! a [`MethodHandler`] together with a [`ReplyHandle`] that must be consumed
//! exactly once.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use super::codec::BusCodec;
use super::error::{BusError, ERROR_NO_REPLY};
use super::message::{Frame, MethodCall, MethodReturn};

#[derive(Debug)]
enum Reply {
    Return(MethodReturn),
    Error { name: String, message: String },
}

/// Receives inbound calls on a connection.
#[async_trait]
pub trait MethodHandler: Send + Sync + 'static {
    async fn handle(&self, call: MethodCall, reply: ReplyHandle);
}

struct Inner {
    name: String,
    outgoing: mpsc::UnboundedSender<Frame>,
    pending: DashMap<u64, oneshot::Sender<Reply>>,
    next_serial: AtomicU64,
    closed: watch::Sender<bool>,
}

impl Inner {
    fn complete(&self, serial: u64, reply: Reply) {
        match self.pending.remove(&serial) {
            Some((_, waiter)) => {
                let _ = waiter.send(reply);
            }
            None => debug!(
                connection = %self.name,
                serial,
                "Dropping reply for unknown or expired call"
            ),
        }
    }
}

#[derive(Clone)]
pub struct BusConnection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BusConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusConnection")
            .field("name", &self.inner.name)
            .field("pending", &self.inner.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl BusConnection {
    /// Take over `stream` and start the reader and writer tasks.
    pub fn spawn<S>(name: impl Into<String>, stream: S, handler: Arc<dyn MethodHandler>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (outgoing, mut rx) = mpsc::unbounded_channel::<Frame>();
        let (closed, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            name: name.into(),
            outgoing,
            pending: DashMap::new(),
            next_serial: AtomicU64::new(1),
            closed,
        });

        let (mut sink, mut source) = Framed::new(stream, BusCodec::default()).split();

        let writer_name = inner.name.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    warn!(connection = %writer_name, error = %e, "Bus write failed");
                    break;
                }
            }
        });

        let reader = inner.clone();
        tokio::spawn(async move {
            while let Some(item) = source.next().await {
                match item {
                    Ok(Frame::Call {
                        serial,
                        method,
                        args,
                    }) => {
                        let reply = ReplyHandle::new(serial, method.clone(), reader.outgoing.clone());
                        match MethodCall::from_parts(&method, args) {
                            Ok(call) => handler.handle(call, reply).await,
                            Err(e) => {
                                warn!(connection = %reader.name, method = %method, error = %e, "Rejecting call");
                                reply.error(e.error_name(), e.to_string());
                            }
                        }
                    }
                    Ok(Frame::Return { reply_serial, body }) => {
                        reader.complete(reply_serial, Reply::Return(body));
                    }
                    Ok(Frame::Error {
                        reply_serial,
                        name,
                        message,
                    }) => {
                        reader.complete(reply_serial, Reply::Error { name, message });
                    }
                    Err(e) => {
                        warn!(connection = %reader.name, error = %e, "Bus read failed");
                        break;
                    }
                }
            }

            debug!(connection = %reader.name, "Bus connection closed");
            reader.closed.send_replace(true);
            // Waiters observe the dropped senders as a disconnect.
            reader.pending.clear();
        });

        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once the peer has gone away.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Send a call. The reply is collected through the returned [`PendingCall`].
    pub fn call(&self, call: MethodCall, timeout: Duration) -> Result<PendingCall, BusError> {
        if self.is_closed() {
            return Err(BusError::Disconnected);
        }

        let (method, args) = call.into_parts()?;
        let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(serial, tx);
        // The reader marks the connection closed before clearing `pending`.
        if self.is_closed() {
            self.inner.pending.remove(&serial);
            return Err(BusError::Disconnected);
        }

        let frame = Frame::Call {
            serial,
            method: method.to_string(),
            args,
        };
        if self.inner.outgoing.send(frame).is_err() {
            self.inner.pending.remove(&serial);
            return Err(BusError::Send(format!(
                "writer for {} has shut down",
                self.inner.name
            )));
        }

        Ok(PendingCall {
            serial,
            method,
            rx,
            timeout,
            inner: self.inner.clone(),
        })
    }
}

/// Connect to a bus socket and start serving `handler` on it.
pub async fn connect_unix(
    path: impl AsRef<Path>,
    name: impl Into<String>,
    handler: Arc<dyn MethodHandler>,
) -> Result<BusConnection, BusError> {
    let stream = UnixStream::connect(path.as_ref()).await?;
    Ok(BusConnection::spawn(name, stream, handler))
}

/// Bind `path`, replacing a socket file left behind by an earlier run.
pub fn bind_socket(path: &Path) -> std::io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed stale socket {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    UnixListener::bind(path)
}

/// An outstanding call. Dropping it before the reply arrives leaves the serial
/// registered until the connection closes; [`PendingCall::wait`] cleans up on
/// timeout.
pub struct PendingCall {
    serial: u64,
    method: &'static str,
    rx: oneshot::Receiver<Reply>,
    timeout: Duration,
    inner: Arc<Inner>,
}

impl PendingCall {
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Wait for the reply or the timeout, whichever comes first.
    pub async fn wait(self) -> Result<MethodReturn, BusError> {
        let PendingCall {
            serial,
            method,
            rx,
            timeout,
            inner,
        } = self;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Reply::Return(body))) => Ok(body),
            Ok(Ok(Reply::Error { name, message })) => Err(BusError::Remote { name, message }),
            Ok(Err(_)) => Err(BusError::Disconnected),
            Err(_) => {
                inner.pending.remove(&serial);
                warn!(connection = %inner.name, method, serial, "Bus call timed out");
                Err(BusError::Timeout(timeout))
            }
        }
    }

    /// Run `notify` with the outcome once the call finishes.
    pub fn set_notify<F>(self, notify: F)
    where
        F: FnOnce(Result<MethodReturn, BusError>) + Send + 'static,
    {
        tokio::spawn(async move {
            let outcome = self.wait().await;
            notify(outcome);
        });
    }
}

/// The right to answer one inbound call.
///
/// `send` and `error` consume the handle. A handle dropped without either
/// answers the caller with a `NoReply` error so no call is left hanging.
pub struct ReplyHandle {
    serial: u64,
    method: String,
    outgoing: Option<mpsc::UnboundedSender<Frame>>,
}

impl std::fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("serial", &self.serial)
            .field("method", &self.method)
            .field("answered", &self.outgoing.is_none())
            .finish()
    }
}

impl ReplyHandle {
    fn new(serial: u64, method: String, outgoing: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            serial,
            method,
            outgoing: Some(outgoing),
        }
    }

    /// A handle whose reply frame is delivered to the returned receiver
    /// instead of a connection.
    pub fn detached(
        serial: u64,
        method: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(serial, method.into(), tx), rx)
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn send(mut self, body: MethodReturn) {
        let frame = Frame::Return {
            reply_serial: self.serial,
            body,
        };
        self.emit(frame);
    }

    pub fn error(mut self, name: &str, message: impl Into<String>) {
        let frame = Frame::Error {
            reply_serial: self.serial,
            name: name.to_string(),
            message: message.into(),
        };
        self.emit(frame);
    }

    fn emit(&mut self, frame: Frame) {
        if let Some(outgoing) = self.outgoing.take() {
            if outgoing.send(frame).is_err() {
                debug!(
                    serial = self.serial,
                    method = %self.method,
                    "Connection closed before the reply could be sent"
                );
            }
        }
    }
}

impl Drop for ReplyHandle {
    fn drop(&mut self) {
        if self.outgoing.is_some() {
            warn!(
                serial = self.serial,
                method = %self.method,
                "Call dropped without a reply"
            );
            let frame = Frame::Error {
                reply_serial: self.serial,
                name: ERROR_NO_REPLY.to_string(),
                message: format!("{} finished without replying", self.method),
            };
            self.emit(frame);
        }
    }
}

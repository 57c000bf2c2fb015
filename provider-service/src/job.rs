//! Deferred work for inbound bus calls.
//!
//! A handler answers cheap calls inline and files the rest as a [`BackendJob`]
//! on its own task. The job owns the call's [`ReplyHandle`], so it completes
//! exactly once even when the work panics or is dropped.

use broker_core::bus::{MethodReturn, ReplyHandle};
use broker_core::observability::metrics::record_provider_job;
use std::future::Future;
use tracing::{debug, Instrument};

pub struct BackendJob {
    method: &'static str,
    reply: ReplyHandle,
}

impl BackendJob {
    pub fn new(method: &'static str, reply: ReplyHandle) -> Self {
        Self { method, reply }
    }

    /// Send the result and record the outcome.
    pub fn complete(self, outcome: &'static str, body: MethodReturn) {
        record_provider_job(self.method, outcome);
        debug!(method = self.method, serial = self.reply.serial(), outcome, "Job complete");
        self.reply.send(body);
    }

    /// Run `work` on a fresh task and complete with its result.
    pub fn file<F>(self, work: F)
    where
        F: Future<Output = (&'static str, MethodReturn)> + Send + 'static,
    {
        let span = tracing::debug_span!("backend_job", method = self.method, serial = self.reply.serial());
        tokio::spawn(
            async move {
                let (outcome, body) = work.await;
                self.complete(outcome, body);
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::bus::error::ERROR_NO_REPLY;
    use broker_core::bus::Frame;

    #[tokio::test]
    async fn test_filed_job_replies_once() {
        let (reply, mut rx) = ReplyHandle::detached(7, "ping");
        BackendJob::new("ping", reply).file(async { ("ok", MethodReturn::Pong) });

        match rx.recv().await.unwrap() {
            Frame::Return { reply_serial, body } => {
                assert_eq!(reply_serial, 7);
                assert_eq!(body, MethodReturn::Pong);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_panicking_job_still_replies() {
        let (reply, mut rx) = ReplyHandle::detached(8, "ping");
        let explode = true;
        BackendJob::new("ping", reply).file(async move {
            if explode {
                panic!("provider blew up");
            }
            ("ok", MethodReturn::Pong)
        });

        match rx.recv().await.unwrap() {
            Frame::Error { reply_serial, name, .. } => {
                assert_eq!(reply_serial, 8);
                assert_eq!(name, ERROR_NO_REPLY);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }
}

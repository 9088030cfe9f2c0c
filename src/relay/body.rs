//! Response body for a committed relay.
//!
//! Headers have already been sent by the time this stream is polled, so an
//! upstream failure can only terminate the body. Dropping the body before it
//! finishes (client went away) cancels the upstream read.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::RelayPhase;
use crate::provider::ByteStream;

pub struct RelayBody {
    label: String,
    head: Option<Bytes>,
    inner: ByteStream,
    remaining: Option<u64>,
    sent: u64,
    cancel: CancellationToken,
    phase: RelayPhase,
}

impl RelayBody {
    /// `head` is a chunk already pulled from `inner` during pre-flight.
    /// `budget` caps the bytes forwarded; `None` forwards until upstream EOF.
    pub fn new(
        label: impl Into<String>,
        head: Option<Bytes>,
        inner: ByteStream,
        budget: Option<u64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            label: label.into(),
            head,
            inner,
            remaining: budget,
            sent: 0,
            cancel,
            phase: RelayPhase::Streaming,
        }
    }

    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }

    fn finish(&mut self, phase: RelayPhase) {
        self.phase = phase;
        // Release the upstream read now rather than when the body is dropped.
        self.inner = Box::pin(stream::empty());
        self.cancel.cancel();
    }

    /// Apply the byte budget; returns the slice to forward.
    fn admit(&mut self, mut chunk: Bytes) -> Bytes {
        if let Some(remaining) = self.remaining {
            if chunk.len() as u64 >= remaining {
                chunk.truncate(remaining as usize);
                self.remaining = Some(0);
            } else {
                self.remaining = Some(remaining - chunk.len() as u64);
            }
        }
        self.sent += chunk.len() as u64;
        chunk
    }
}

impl Stream for RelayBody {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.phase != RelayPhase::Streaming {
                return Poll::Ready(None);
            }

            if this.remaining == Some(0) {
                tracing::debug!(asset = %this.label, bytes = this.sent, "Relay completed");
                this.finish(RelayPhase::Completed);
                return Poll::Ready(None);
            }

            let next = match this.head.take() {
                Some(chunk) => Some(Ok(chunk)),
                None => match this.inner.poll_next_unpin(cx) {
                    Poll::Ready(next) => next,
                    Poll::Pending => return Poll::Pending,
                },
            };

            match next {
                Some(Ok(chunk)) => {
                    let chunk = this.admit(chunk);
                    if !chunk.is_empty() {
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(
                        asset = %this.label,
                        bytes = this.sent,
                        error = %err,
                        "Upstream failed mid-stream, terminating response"
                    );
                    this.finish(RelayPhase::Failed);
                    return Poll::Ready(Some(Err(io::Error::other(err))));
                }
                None => {
                    if let Some(missing) = this.remaining.filter(|r| *r > 0) {
                        tracing::warn!(
                            asset = %this.label,
                            bytes = this.sent,
                            missing,
                            "Upstream ended before the requested range was complete"
                        );
                    } else {
                        tracing::debug!(asset = %this.label, bytes = this.sent, "Relay completed");
                    }
                    this.finish(RelayPhase::Completed);
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if self.phase == RelayPhase::Streaming {
            self.phase = RelayPhase::Aborted;
            self.cancel.cancel();
            tracing::debug!(
                asset = %self.label,
                bytes = self.sent,
                "Client disconnected, upstream read cancelled"
            );
        }
    }
}

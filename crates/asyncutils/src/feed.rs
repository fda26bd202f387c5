//! Bounded feeds.
//!
//! A [`Feed`] is the consumer half and a [`Producer`] the worker half. The
//! buffer is the only backpressure mechanism: once it holds `capacity` items
//! the producer suspends in [`Producer::send`] until the consumer catches up.
//!
//! There is no "done" item. The feed ends when the producer is dropped (or
//! explicitly [closed](Producer::close)), which can only happen once.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default number of pending items a feed buffers before the producer blocks.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Create a feed with its own cancellation token.
pub fn bounded<T>(capacity: usize) -> (Producer<T>, Feed<T>) {
    bounded_with_token(capacity, CancellationToken::new())
}

/// Create a feed that is cancelled whenever `token` is.
///
/// Pass a [child token](CancellationToken::child_token) if the feed should be
/// cancellable on its own without affecting the parent.
///
/// A capacity of zero is treated as one.
pub fn bounded_with_token<T>(capacity: usize, token: CancellationToken) -> (Producer<T>, Feed<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let producer = Producer { tx, token: token.clone() };
    let feed = Feed { rx, token };
    (producer, feed)
}

/// Worker half of a feed.
pub struct Producer<T> {
    tx: mpsc::Sender<T>,
    token: CancellationToken,
}

impl<T> Producer<T> {
    /// Send an item, waiting for buffer space if the feed is full.
    ///
    /// Returns `false` if the feed was cancelled or the consumer has gone
    /// away; the worker should stop producing when that happens.
    pub async fn send(&self, item: T) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    /// Whether the consumer asked for the work to stop (or disappeared).
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once the feed is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Close the feed. Equivalent to dropping the producer.
    pub fn close(self) {}
}

/// Consumer half of a feed.
///
/// Implements [`Stream`], so the usual [`StreamExt`](futures::StreamExt) and
/// [`TryStreamExt`](futures::TryStreamExt) combinators work on it. Dropping a
/// feed cancels it, so an abandoned feed never leaves its worker blocked.
pub struct Feed<T> {
    rx: mpsc::Receiver<T>,
    token: CancellationToken,
}

impl<T> Feed<T> {
    /// Receive the next item, or `None` once the producer has closed the feed
    /// and the buffer is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Ask the worker to stop. Items already buffered can still be received.
    pub fn cancel(&mut self) {
        self.token.cancel();
        self.rx.close();
    }

    /// Token that cancels this feed, for use from elsewhere (signal handlers
    /// and the like).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of buffered items waiting to be received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl<T> Stream for Feed<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> Drop for Feed<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

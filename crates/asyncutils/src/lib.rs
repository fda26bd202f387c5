//! Async plumbing shared by the scanner and the storage drivers.
//!
//! Every long-running piece of work (a filesystem traversal, a search query)
//! runs in its own task and talks to its caller through a [`Feed`]: a bounded,
//! closable, cancellable single-producer/single-consumer queue.

pub mod feed;

pub use crate::feed::{DEFAULT_CAPACITY, Feed, Producer, bounded, bounded_with_token};
pub use tokio_util::sync::CancellationToken;

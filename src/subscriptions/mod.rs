//! Live comment notifications.
//!
//! Readers subscribe to a post key and receive each comment created on
//! that post while they are registered:
//! - One buffered comment per subscriber; a full buffer drops the new one
//! - Publishing never blocks the writer
//! - A subscription ends only when its cancellation signal fires
//!
//! Delivery is at-most-once with no replay.
//!
//! # Example
//!
//! ```ignore
//! let broker = CommentBroker::new();
//! let (handle, signal) = cancellation();
//! let stream = broker.subscribe("42", signal)?;
//!
//! for comment in stream.iter() {
//!     println!("new comment: {}", comment.content);
//! }
//!
//! // elsewhere, when the client disconnects
//! handle.cancel();
//! ```

mod manager;
mod types;

pub use manager::{CommentBroker, PublishReport};
pub use types::{cancellation, CancelHandle, CancelSignal, CommentStream, SubscriptionId};

//! Comment broker for fanning out new comments to live subscribers.

use crate::error::Result;
use crate::types::Comment;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

use super::types::{CancelSignal, CommentStream, SubscriptionId};

/// Buffered, not-yet-delivered comments per subscriber.
const SUBSCRIBER_BUFFER: usize = 1;

/// Stack for a waiter thread. It only blocks on a channel and then takes
/// the registry lock.
pub(crate) const WAITER_STACK_SIZE: usize = 64 * 1024;

/// Internal subscription state.
struct Subscriber {
    id: SubscriptionId,
    sender: Sender<Comment>,
}

/// Outcome of a single publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the comment.
    pub delivered: usize,
    /// Subscribers whose buffer was still full (or whose stream was dropped).
    pub dropped: usize,
}

struct BrokerInner {
    /// Live subscribers by post key, in subscription order.
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl BrokerInner {
    /// Remove one subscriber and close its channel. Returns false if it was
    /// already gone.
    fn release(&self, post_key: &str, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let Some(list) = subs.get_mut(post_key) else {
            return false;
        };
        let Some(pos) = list.iter().position(|s| s.id == id) else {
            return false;
        };

        // Dropping the sender closes the stream while the lock is held.
        drop(list.remove(pos));
        if list.is_empty() {
            subs.remove(post_key);
        }
        debug!(post_key, subscription = id.0, "subscriber released");
        true
    }
}

/// Registry of per-post subscribers.
///
/// One mutex guards the whole registry, so subscribe, release and publish
/// are totally ordered for any post key and a publish can never send on a
/// channel that is being closed. Cloning shares the same registry.
///
/// Every live subscription costs one parked OS thread with a
/// `WAITER_STACK_SIZE` (64 KiB) stack until its signal fires. Fan-out is
/// otherwise unbounded, so the thread limit of the process is the
/// practical cap on concurrent subscribers.
#[derive(Clone)]
pub struct CommentBroker {
    inner: Arc<BrokerInner>,
}

impl CommentBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register interest in new comments on `post_key`.
    ///
    /// Returns immediately. A waiter thread (64 KiB stack) blocks on
    /// `cancel` and releases the subscription once it fires; the stream
    /// then disconnects. Fails with `Io` if the thread cannot be spawned,
    /// in which case nothing stays registered.
    pub fn subscribe(&self, post_key: impl Into<String>, cancel: CancelSignal) -> Result<CommentStream> {
        let post_key = post_key.into();
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(SUBSCRIBER_BUFFER);

        self.inner
            .subscribers
            .lock()
            .entry(post_key.clone())
            .or_default()
            .push(Subscriber { id, sender });

        let inner = Arc::clone(&self.inner);
        let waiter_key = post_key.clone();
        let spawned = thread::Builder::new()
            .name(format!("comment-sub-{}", id.0))
            .stack_size(WAITER_STACK_SIZE)
            .spawn(move || {
                cancel.wait();
                inner.release(&waiter_key, id);
            });

        if let Err(e) = spawned {
            self.inner.release(&post_key, id);
            return Err(e.into());
        }

        debug!(post_key = %post_key, subscription = id.0, "subscriber registered");
        Ok(CommentStream {
            id,
            post_key,
            receiver,
        })
    }

    /// Release a subscription directly, without waiting for its signal.
    ///
    /// Returns false if it was not registered (already released).
    pub fn unsubscribe(&self, post_key: &str, id: SubscriptionId) -> bool {
        self.inner.release(post_key, id)
    }

    /// Offer `comment` to every subscriber of `post_key` without blocking.
    ///
    /// A subscriber whose single buffer slot is still occupied misses this
    /// comment. Unknown keys are a no-op.
    pub fn publish(&self, post_key: &str, comment: &Comment) -> PublishReport {
        let mut report = PublishReport::default();

        let subs = self.inner.subscribers.lock();
        let Some(list) = subs.get(post_key) else {
            return report;
        };

        for sub in list {
            match sub.sender.try_send(comment.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(post_key, subscription = sub.id.0, "slow subscriber, comment dropped");
                    report.dropped += 1;
                }
                Err(TrySendError::Disconnected(_)) => report.dropped += 1,
            }
        }
        drop(subs);

        debug!(
            post_key,
            comment_id = %comment.id,
            delivered = report.delivered,
            dropped = report.dropped,
            "comment published"
        );
        report
    }

    /// Number of live subscribers for `post_key`.
    pub fn subscriber_count(&self, post_key: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .get(post_key)
            .map_or(0, |list| list.len())
    }

    /// Post keys with at least one live subscriber.
    pub fn active_posts(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.subscribers.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for CommentBroker {
    fn default() -> Self {
        Self::new()
    }
}

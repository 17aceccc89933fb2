//! Subscription types for live comment notifications.

use crate::types::Comment;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Create a linked cancellation pair.
///
/// The signal fires when [`CancelHandle::cancel`] is called, or when every
/// clone of the handle has been dropped (the caller went away).
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    // Nothing is ever sent; disconnection is the signal.
    let (sender, receiver) = bounded::<()>(0);
    let handle = CancelHandle {
        sender: Arc::new(Mutex::new(Some(sender))),
    };
    (handle, CancelSignal { receiver })
}

/// Caller side of a cancellation pair.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    sender: Arc<Mutex<Option<Sender<()>>>>,
}

impl CancelHandle {
    /// Fire the signal. Calling this more than once is a no-op.
    pub fn cancel(&self) {
        self.sender.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Waiting side of a cancellation pair.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    receiver: Receiver<()>,
}

impl CancelSignal {
    /// Block until the signal fires.
    pub fn wait(&self) {
        // recv only returns once the sender side is gone.
        while self.receiver.recv().is_ok() {}
    }

    /// Block until the signal fires or `timeout` elapses. Returns true if fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.receiver.recv_timeout(timeout),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        )
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.receiver.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        )
    }
}

/// Receive side of a comment subscription.
///
/// Ends (reports disconnection) once the subscription has been released
/// and any buffered comment has been drained.
pub struct CommentStream {
    pub id: SubscriptionId,
    /// Post key the stream is registered under.
    pub post_key: String,
    /// Channel to receive comments.
    pub receiver: Receiver<Comment>,
}

impl CommentStream {
    /// Receive the next comment (blocking).
    pub fn recv(&self) -> Result<Comment, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a comment (non-blocking).
    pub fn try_recv(&self) -> Result<Comment, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Comment, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Blocking iterator that ends when the subscription is released.
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, Comment> {
        self.receiver.iter()
    }
}

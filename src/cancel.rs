//! Caller-driven cancellation.

use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable cancellation signal.
///
/// Attach it to a client with [`Client::with_cancel_token`](crate::Client::with_cancel_token).
/// Once [`cancel`](Self::cancel) is called, in-flight requests are dropped,
/// pending backoff and remaining pages are skipped, and the call returns
/// [`Error::Canceled`](crate::Error::Canceled).
///
/// # Examples
///
/// ```
/// use linode_rest::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// assert!(!token.is_canceled());
///
/// handle.cancel();
/// assert!(token.is_canceled());
/// ```
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Creates a token that has not been canceled.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_canceled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes when the token is canceled.
    pub async fn canceled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns once canceled.
        let _ = receiver.wait_for(|canceled| *canceled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

use std::time::Duration;

use tokio::{
    sync::watch,
    time::Instant,
};

use crate::core::error::RpcError;

/// Per-call state threaded through every operation of the runtime.
///
/// A context carries an optional deadline and an optional cancellation
/// signal. Contexts are cheap to clone; all clones observe the same
/// cancellation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Context {
    /// A context with no deadline and no cancellation.
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a copy of this context with the given deadline.
    ///
    /// If the context already has an earlier deadline, the earlier one wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            cancel_rx: self.cancel_rx.clone(),
        }
    }

    /// Returns a copy of this context with a deadline the given duration from
    /// now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a copy of this context that can be cancelled through the
    /// returned [`Canceller`].
    pub fn cancellable(&self) -> (Self, Canceller) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let context = Self {
            deadline: self.deadline,
            cancel_rx: Some(cancel_rx),
        };
        (context, Canceller { cancel_tx })
    }

    /// The deadline of the call, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        match &self.cancel_rx {
            Some(cancel_rx) => *cancel_rx.borrow(),
            None => false,
        }
    }

    /// Waits for the context to be cancelled.
    ///
    /// Pends forever when the context is not cancellable, so this is only
    /// useful as a [`tokio::select!`] arm alongside the actual work.
    pub async fn done(&self) {
        match &self.cancel_rx {
            Some(cancel_rx) => {
                let mut cancel_rx = cancel_rx.clone();
                if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
                    // The canceller is gone, so cancellation can never fire.
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// The error describing why this context can no longer be waited on.
    pub fn error(&self) -> RpcError {
        if self.is_cancelled() {
            RpcError::cancelled("context cancelled")
        } else {
            RpcError::deadline_exceeded("context deadline exceeded")
        }
    }
}

/// Cancels the contexts cloned from the one returned by
/// [`Context::cancellable`].
#[derive(Debug)]
pub struct Canceller {
    cancel_tx: watch::Sender<bool>,
}

impl Canceller {
    /// Cancels the associated context.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }
}

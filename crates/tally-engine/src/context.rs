//! # Request Context
//!
//! Deadline and cancellation for one engine call.
//!
//! ## Where They Bite
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  begin ─► hold (may wait) ─► read ─► check ─► write ─► │gate│ ─► commit │
//! │  └──────────────── ctx.run(...) ──────────────────────┘  │              │
//! │     raced against deadline and cancel                    │              │
//! │                                               ensure_live()             │
//! │                                                                         │
//! │  Deadline or cancel before the gate: scope dropped, nothing written.    │
//! │  After the gate the commit runs to completion.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Cancellation
// =============================================================================

/// Fires cancellation for every [`CancelSignal`] created with it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle is dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                pending::<()>().await;
            }
        }
    }
}

/// Creates a connected handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

// =============================================================================
// Context
// =============================================================================

/// Per-call limits. The default context has neither a deadline nor a
/// cancel signal; the engine then applies its configured default deadline.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: Option<CancelSignal>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fills in a deadline when the caller gave none.
    pub(crate) fn or_default_deadline(&self, default: Option<Duration>) -> Self {
        let mut ctx = self.clone();
        if ctx.deadline.is_none() {
            ctx.deadline = default.map(|d| Instant::now() + d);
        }
        ctx
    }

    /// Fails if the request was cancelled or its deadline has passed.
    pub fn ensure_live(&self) -> EngineResult<()> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(EngineError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(EngineError::Timeout);
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the deadline passes, or the request
    /// is cancelled. On the latter two `fut` is dropped unfinished.
    pub async fn run<F, T>(&self, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        self.ensure_live()?;

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => pending::<()>().await,
            }
        };
        let cancelled = async {
            match &self.cancel {
                Some(signal) => signal.cancelled().await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(EngineError::Cancelled),
            _ = deadline => Err(EngineError::Timeout),
            result = fut => result,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_without_limits() {
        let ctx = RequestContext::new();
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_deadline_interrupts() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(20));
        let result: EngineResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(EngineError::Timeout)));
        assert!(matches!(ctx.ensure_live(), Err(EngineError::Timeout)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts() {
        let (handle, signal) = cancel_pair();
        let ctx = RequestContext::new().with_cancel(signal);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let result: EngineResult<()> = ctx.run(pending()).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (handle, signal) = cancel_pair();
        handle.cancel();
        let ctx = RequestContext::new().with_cancel(signal);

        let result = ctx.run(async { Ok(1) }).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (handle, signal) = cancel_pair();
        drop(handle);
        let ctx = RequestContext::new()
            .with_cancel(signal)
            .with_timeout(Duration::from_millis(20));

        let result: EngineResult<()> = ctx.run(pending()).await;
        assert!(matches!(result, Err(EngineError::Timeout)));
    }

    #[test]
    fn test_default_deadline_only_fills_gaps() {
        let explicit = Instant::now() + Duration::from_secs(60);
        let ctx = RequestContext::new().with_deadline(explicit);
        assert_eq!(
            ctx.or_default_deadline(Some(Duration::from_millis(1))).deadline(),
            Some(explicit)
        );

        assert!(RequestContext::new().or_default_deadline(None).deadline().is_none());
        assert!(RequestContext::new()
            .or_default_deadline(Some(Duration::from_secs(1)))
            .deadline()
            .is_some());
    }
}

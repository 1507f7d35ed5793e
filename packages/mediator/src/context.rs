//! Per-invocation context handed to notification handlers.
//!
//! Cancellation is advisory. A publisher never aborts a running handler; it
//! only fires the token in the context so the handler can give up on its own
//! waits, either by polling [`HandlerContext::is_cancelled`], awaiting
//! [`HandlerContext::cancelled`], or registering a cleanup with
//! [`HandlerContext::on_cancel`].

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::strategy::PublishStrategy;

type Cleanup = Box<dyn FnOnce() + Send>;

enum HookState {
    /// Handler running, no cancellation yet.
    Armed(Vec<Cleanup>),
    /// Cancellation seen while the handler was running.
    Fired,
    /// Handler settled; later cleanups are dropped.
    Finished,
}

/// Cleanups registered by one invocation.
struct CancelHooks {
    state: Mutex<HookState>,
}

impl CancelHooks {
    fn lock(&self) -> MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn run_cleanup(cleanup: Cleanup) {
    if let Err(panic_info) = catch_unwind(AssertUnwindSafe(cleanup)) {
        let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = panic_info.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        error!(panic = %panic_msg, "cancel cleanup panicked");
    }
}

/// Context passed to every notification handler invocation.
///
/// Cheap to clone. Clones observe the same cancellation.
///
/// # Example
///
/// ```ignore
/// async fn handle(&self, event: &OrderPlaced, ctx: HandlerContext) -> Result<()> {
///     let upload = self.storage.begin_upload(event.order_id);
///     ctx.on_cancel(move || upload.abort());
///
///     tokio::select! {
///         _ = ctx.cancelled() => Ok(()),
///         res = self.mailer.send_receipt(event.order_id) => res,
///     }
/// }
/// ```
#[derive(Clone)]
pub struct HandlerContext {
    cancel: CancellationToken,
    hooks: Arc<CancelHooks>,
    strategy: PublishStrategy,
}

impl HandlerContext {
    /// Create a context for one handler invocation.
    ///
    /// Returns the context and the invocation handle the publisher uses to
    /// fire cleanups. Dropping the handle marks the invocation finished.
    pub(crate) fn new(cancel: CancellationToken, strategy: PublishStrategy) -> (Self, Invocation) {
        let hooks = Arc::new(CancelHooks {
            state: Mutex::new(HookState::Armed(Vec::new())),
        });
        (
            Self {
                cancel,
                hooks: hooks.clone(),
                strategy,
            },
            Invocation { hooks },
        )
    }

    /// Returns true once cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when cancellation is signalled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// A child token, cancelled together with this context.
    pub fn token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// The strategy this invocation runs under.
    pub fn strategy(&self) -> PublishStrategy {
        self.strategy
    }

    /// Register a cleanup that runs once if cancellation is signalled while
    /// the handler is still running.
    ///
    /// Cleanups run in registration order on the invocation's own task,
    /// before the handler is polled again. A cleanup registered after
    /// cancellation was already seen runs immediately; one registered after
    /// the handler finished never runs.
    pub fn on_cancel<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.hooks.lock();
        match &mut *state {
            HookState::Armed(cleanups) => cleanups.push(Box::new(cleanup)),
            HookState::Fired => {
                drop(state);
                run_cleanup(Box::new(cleanup));
            }
            HookState::Finished => {}
        }
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// Publisher-side handle for one running invocation.
pub(crate) struct Invocation {
    hooks: Arc<CancelHooks>,
}

impl Invocation {
    /// Run the registered cleanups. Only the first call has any effect.
    pub(crate) fn fire(&self) {
        let cleanups = {
            let mut state = self.hooks.lock();
            match std::mem::replace(&mut *state, HookState::Fired) {
                HookState::Armed(cleanups) => cleanups,
                other => {
                    *state = other;
                    return;
                }
            }
        };
        for cleanup in cleanups {
            run_cleanup(cleanup);
        }
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        *self.hooks.lock() = HookState::Finished;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let make = {
            let fired = fired.clone();
            move || {
                let fired = fired.clone();
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }) as Box<dyn FnOnce() + Send>
            }
        };
        (fired, make)
    }

    #[test]
    fn test_fire_runs_cleanups_once() {
        let (ctx, invocation) =
            HandlerContext::new(CancellationToken::new(), PublishStrategy::ParallelWhenAll);
        let (fired, cleanup) = counter();
        ctx.on_cancel(cleanup());
        ctx.on_cancel(cleanup());

        invocation.fire();
        invocation.fire();

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cleanup_after_fire_runs_immediately() {
        let (ctx, invocation) =
            HandlerContext::new(CancellationToken::new(), PublishStrategy::SyncStopOnException);
        let (fired, cleanup) = counter();

        invocation.fire();
        ctx.on_cancel(cleanup());

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleanup_skipped_after_finish() {
        let (ctx, invocation) =
            HandlerContext::new(CancellationToken::new(), PublishStrategy::SyncStopOnException);
        let (fired, cleanup) = counter();
        ctx.on_cancel(cleanup());

        drop(invocation);
        ctx.on_cancel(cleanup());

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_cleanup_does_not_stop_the_rest() {
        let (ctx, invocation) =
            HandlerContext::new(CancellationToken::new(), PublishStrategy::ParallelNoWait);
        let (fired, cleanup) = counter();
        ctx.on_cancel(|| panic!("cleanup exploded"));
        ctx.on_cancel(cleanup());

        invocation.fire();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_child_token_follows_context() {
        let token = CancellationToken::new();
        let (ctx, _invocation) = HandlerContext::new(token.clone(), PublishStrategy::Async);
        let child = ctx.token();

        assert!(!child.is_cancelled());
        token.cancel();
        ctx.cancelled().await;
        assert!(child.is_cancelled());
        assert_eq!(ctx.strategy(), PublishStrategy::Async);
    }
}

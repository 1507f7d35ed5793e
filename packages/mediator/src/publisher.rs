//! Notification publisher: fans one notification out to its handlers.
//!
//! A publisher is bound to one strategy and shared by every mediator that
//! uses it. It owns the cancellation token handed to running handlers and
//! counts in-flight work so that `stop` can drain it.
//!
//! # Stop/drain
//!
//! ```text
//! publish ──admit──► cycle.inflight += 1 ──► handlers ──► cycle.inflight -= 1
//!                         ▲
//! stop ── started=false ──┘ (no new admissions)
//!      ── cancel token  ──► running handlers observe ctx.cancelled()
//!      ── wait_zero     ──► returns once the stopped cycle's work has settled
//! ```
//!
//! Each start opens a new cycle with its own token and counter. A `stop`
//! waits only for the cycle it closed, so a restart during the drain does
//! not extend it. Detached work (`ParallelNoWait`, the losers of
//! `ParallelWhenAny`) holds a guard on its cycle's counter.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{join_all, select_all};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::HandlerContext;
use crate::core::Notification;
use crate::error::{AggregateError, MediatorError};
use crate::handler::NotificationHandler;
use crate::inflight::InflightCounter;
use crate::strategy::PublishStrategy;

/// Handlers resolved for one publish call, in registration order.
pub type Handlers<N> = Vec<Arc<dyn NotificationHandler<N>>>;

struct PublisherState {
    started: bool,
    cancel: CancellationToken,
    inflight: Arc<InflightCounter>,
}

/// Token and counter one publish call runs under.
struct Cycle {
    cancel: CancellationToken,
    inflight: Arc<InflightCounter>,
}

impl Cycle {
    /// Spawn a task that holds an in-flight guard until it settles.
    fn spawn_tracked<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.inflight.begin();
        tokio::spawn(async move {
            let _guard = guard;
            future.await
        })
    }
}

/// Publishes notifications under a single strategy.
pub struct Publisher {
    strategy: PublishStrategy,
    state: Mutex<PublisherState>,
}

impl Publisher {
    /// Create a started publisher.
    ///
    /// `Async` is normalized to `ParallelWhenAll`.
    pub fn new(strategy: PublishStrategy) -> Self {
        Self {
            strategy: strategy.canonical(),
            state: Mutex::new(PublisherState {
                started: true,
                cancel: CancellationToken::new(),
                inflight: Arc::new(InflightCounter::new()),
            }),
        }
    }

    /// The strategy this publisher runs.
    pub fn strategy(&self) -> PublishStrategy {
        self.strategy
    }

    /// Returns true unless stopped.
    pub fn is_started(&self) -> bool {
        self.lock_state().started
    }

    /// Number of operations admitted in the current cycle that have not
    /// settled yet.
    pub fn inflight(&self) -> usize {
        self.lock_state().inflight.active()
    }

    fn lock_state(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(strategy = %self.strategy, "publisher state mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Re-arm a stopped publisher with a fresh cancellation token and
    /// in-flight counter.
    ///
    /// No-op when already started.
    pub fn start(&self) {
        let mut state = self.lock_state();
        if state.started {
            return;
        }
        state.started = true;
        state.cancel = CancellationToken::new();
        state.inflight = Arc::new(InflightCounter::new());
        info!(strategy = %self.strategy, "publisher started");
    }

    /// Stop accepting work, signal cancellation to running handlers, and
    /// wait until everything admitted before the stop has settled.
    pub async fn stop(&self) {
        let (cancel, inflight) = {
            let mut state = self.lock_state();
            state.started = false;
            (state.cancel.clone(), state.inflight.clone())
        };

        info!(
            strategy = %self.strategy,
            inflight = inflight.active(),
            "stopping publisher"
        );
        cancel.cancel();
        inflight.wait_zero().await;
        info!(strategy = %self.strategy, "publisher stopped");
    }

    /// Fan `notification` out to `handlers`.
    ///
    /// A stopped publisher drops the notification and returns `Ok(())`.
    pub async fn publish<N: Notification>(
        &self,
        notification: N,
        handlers: Handlers<N>,
    ) -> Result<(), MediatorError> {
        // Admission and the stop flag share the lock, so stop() cannot miss
        // an operation admitted before it.
        let (cycle, _admitted) = {
            let state = self.lock_state();
            if !state.started {
                warn!(
                    strategy = %self.strategy,
                    notification = std::any::type_name::<N>(),
                    "publish on stopped publisher ignored"
                );
                return Ok(());
            }
            let cycle = Cycle {
                cancel: state.cancel.child_token(),
                inflight: state.inflight.clone(),
            };
            let admitted = cycle.inflight.begin();
            (cycle, admitted)
        };

        if handlers.is_empty() {
            return Ok(());
        }

        debug!(
            strategy = %self.strategy,
            notification = std::any::type_name::<N>(),
            handlers = handlers.len(),
            "publishing notification"
        );

        let notification = Arc::new(notification);
        match self.strategy {
            PublishStrategy::SyncContinueOnException => {
                self.sync_continue(notification, handlers, cycle).await
            }
            PublishStrategy::SyncStopOnException => {
                self.sync_stop(notification, handlers, cycle).await
            }
            PublishStrategy::ParallelNoWait => {
                self.no_wait(notification, handlers, cycle);
                Ok(())
            }
            PublishStrategy::Async | PublishStrategy::ParallelWhenAll => {
                self.when_all(notification, handlers, cycle).await
            }
            PublishStrategy::ParallelWhenAny => {
                self.when_any(notification, handlers, cycle).await
            }
        }
    }

    async fn sync_continue<N: Notification>(
        &self,
        notification: Arc<N>,
        handlers: Handlers<N>,
        cycle: Cycle,
    ) -> Result<(), MediatorError> {
        let mut failures = Vec::new();
        for (index, handler) in handlers.into_iter().enumerate() {
            let result =
                invoke(handler, notification.clone(), cycle.cancel.clone(), self.strategy).await;
            if let Err(e) = result {
                debug!(handler = index, error = %e, "notification handler failed, continuing");
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MediatorError::AggregateFailure(AggregateError::new(failures)))
        }
    }

    async fn sync_stop<N: Notification>(
        &self,
        notification: Arc<N>,
        handlers: Handlers<N>,
        cycle: Cycle,
    ) -> Result<(), MediatorError> {
        for (index, handler) in handlers.into_iter().enumerate() {
            let result =
                invoke(handler, notification.clone(), cycle.cancel.clone(), self.strategy).await;
            if let Err(source) = result {
                debug!(handler = index, error = %source, "notification handler failed, stopping");
                return Err(MediatorError::HandlerFailure { source });
            }
        }
        Ok(())
    }

    fn no_wait<N: Notification>(&self, notification: Arc<N>, handlers: Handlers<N>, cycle: Cycle) {
        let strategy = self.strategy;
        for (index, handler) in handlers.into_iter().enumerate() {
            let notification = notification.clone();
            let cancel = cycle.cancel.clone();
            cycle.spawn_tracked(async move {
                if let Err(e) = invoke(handler, notification, cancel, strategy).await {
                    warn!(handler = index, error = %e, "detached notification handler failed");
                }
            });
        }
    }

    async fn when_all<N: Notification>(
        &self,
        notification: Arc<N>,
        handlers: Handlers<N>,
        cycle: Cycle,
    ) -> Result<(), MediatorError> {
        let tasks = self.spawn_all(notification, handlers, &cycle);

        // join_all keeps input order, so failures come out in registration order
        let failures: Vec<anyhow::Error> = join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| flatten(joined).err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MediatorError::AggregateFailure(AggregateError::new(failures)))
        }
    }

    async fn when_any<N: Notification>(
        &self,
        notification: Arc<N>,
        handlers: Handlers<N>,
        cycle: Cycle,
    ) -> Result<(), MediatorError> {
        let tasks = self.spawn_all(notification, handlers, &cycle);
        let (first, index, rest) = select_all(tasks).await;

        // Remaining handlers keep running detached but are told to give up
        cycle.cancel.cancel();
        debug!(handler = index, remaining = rest.len(), "first notification handler settled");
        drop(rest);

        flatten(first).map_err(|source| MediatorError::HandlerFailure { source })
    }

    fn spawn_all<N: Notification>(
        &self,
        notification: Arc<N>,
        handlers: Handlers<N>,
        cycle: &Cycle,
    ) -> Vec<JoinHandle<anyhow::Result<()>>> {
        let strategy = self.strategy;
        handlers
            .into_iter()
            .map(|handler| {
                let notification = notification.clone();
                let cancel = cycle.cancel.clone();
                cycle.spawn_tracked(invoke(handler, notification, cancel, strategy))
            })
            .collect()
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Publisher")
            .field("strategy", &self.strategy)
            .field("started", &state.started)
            .field("inflight", &state.inflight.active())
            .finish()
    }
}

/// Run one handler with a fresh context, turning a panic into a failure.
///
/// Cleanups registered through `on_cancel` run here, on the invocation's
/// task, as soon as the token fires while the handler is still pending.
async fn invoke<N: Notification>(
    handler: Arc<dyn NotificationHandler<N>>,
    notification: Arc<N>,
    cancel: CancellationToken,
    strategy: PublishStrategy,
) -> anyhow::Result<()> {
    let (ctx, invocation) = HandlerContext::new(cancel.clone(), strategy);

    // AssertUnwindSafe is required because handler futures are not UnwindSafe
    let handling = AssertUnwindSafe(handler.handle(&notification, ctx)).catch_unwind();
    tokio::pin!(handling);

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            invocation.fire();
            handling.await
        }
        outcome = &mut handling => outcome,
    };
    // Cleanups registered from here on are dropped
    drop(invocation);

    match outcome {
        Ok(result) => result,
        Err(panic_info) => {
            let panic_msg = extract_panic_message(&panic_info);
            error!(
                notification = std::any::type_name::<N>(),
                panic = %panic_msg,
                "notification handler panicked"
            );
            Err(anyhow::anyhow!("notification handler panicked: {}", panic_msg))
        }
    }
}

/// Collapse a task's join result into the handler's result.
fn flatten(joined: Result<anyhow::Result<()>, tokio::task::JoinError>) -> anyhow::Result<()> {
    joined.unwrap_or_else(|e| Err(anyhow::anyhow!("notification handler task failed: {}", e)))
}

/// Extract a human-readable message from a panic payload.
fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

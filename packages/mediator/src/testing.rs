//! Test helpers for exercising publish strategies.
//!
//! Enabled in unit tests and behind the `testing` feature for downstream
//! crates.
//!
//! ```ignore
//! use mediator::testing::{DelayedPush, Ping, Recorder};
//!
//! let recorder = Recorder::new();
//! let handlers = setup_handlers::<Ping, _>(&mediator, [
//!     DelayedPush::push(150, 1, &recorder),
//!     DelayedPush::push(50, 3, &recorder),
//! ])?;
//! mediator.publish_with(Ping, PublishStrategy::ParallelWhenAll).await?;
//! assert_eq!(recorder.values(), vec![3, 1]);
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::context::HandlerContext;
use crate::core::Notification;
use crate::error::MediatorError;
use crate::handler::NotificationHandler;
use crate::mediator::Mediator;

/// A notification with no payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ping;

impl Notification for Ping {}

/// Shared, ordered record of values pushed by handlers.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    values: Arc<Mutex<Vec<i32>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: i32) {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(value);
    }

    /// Values pushed so far, in push order.
    pub fn values(&self) -> Vec<i32> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Push(i32, Recorder),
    Fail(&'static str),
}

/// Handler that waits, then pushes a value or fails.
///
/// By default the wait is abandoned when the publisher signals cancellation,
/// in which case nothing is pushed.
#[derive(Debug, Clone)]
pub struct DelayedPush {
    delay: Duration,
    outcome: Outcome,
    honor_cancel: bool,
}

impl DelayedPush {
    /// Wait `delay_ms`, then push `value` to `recorder`.
    pub fn push(delay_ms: u64, value: i32, recorder: &Recorder) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::from_millis(delay_ms),
            outcome: Outcome::Push(value, recorder.clone()),
            honor_cancel: true,
        })
    }

    /// Wait `delay_ms`, then fail with `message`.
    pub fn fail(delay_ms: u64, message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::from_millis(delay_ms),
            outcome: Outcome::Fail(message),
            honor_cancel: true,
        })
    }

    /// Same handler, but it sleeps through cancellation.
    pub fn uninterruptible(self: Arc<Self>) -> Arc<Self> {
        let mut handler = Arc::unwrap_or_clone(self);
        handler.honor_cancel = false;
        Arc::new(handler)
    }
}

#[async_trait]
impl<N: Notification> NotificationHandler<N> for DelayedPush {
    async fn handle(&self, _notification: &N, ctx: HandlerContext) -> anyhow::Result<()> {
        if self.honor_cancel {
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.delay) => {}
            }
        } else {
            tokio::time::sleep(self.delay).await;
        }

        match &self.outcome {
            Outcome::Push(value, recorder) => {
                recorder.push(*value);
                Ok(())
            }
            Outcome::Fail(message) => Err(anyhow::anyhow!("{}", message)),
        }
    }
}

/// Register `handlers` for `N` on `mediator`, in order.
///
/// Returns the handlers so tests can unregister them later.
pub fn setup_handlers<N, I>(
    mediator: &Mediator,
    handlers: I,
) -> Result<Vec<Arc<DelayedPush>>, MediatorError>
where
    N: Notification,
    I: IntoIterator<Item = Arc<DelayedPush>>,
{
    let handlers: Vec<_> = handlers.into_iter().collect();
    for handler in &handlers {
        mediator.handle_notification::<N, _>(handler.clone())?;
    }
    Ok(handlers)
}

//! Handler traits and their type-erased registry entries.
//!
//! Handlers are registered as `Arc<H>`. The allocation is the handler's
//! identity: removing a handler means handing back a clone of the same
//! `Arc`. Two separately allocated handlers are never equal, even if they
//! behave the same.
//!
//! # Example
//!
//! ```ignore
//! use mediator::{handler_fn, HandlerContext, NotificationHandler};
//!
//! struct SendWelcomeEmail;
//!
//! #[async_trait::async_trait]
//! impl NotificationHandler<UserCreated> for SendWelcomeEmail {
//!     async fn handle(&self, event: &UserCreated, ctx: HandlerContext) -> anyhow::Result<()> {
//!         // ...
//!         Ok(())
//!     }
//! }
//!
//! let welcome = Arc::new(SendWelcomeEmail);
//! mediator.handle_notification::<UserCreated, _>(welcome.clone())?;
//!
//! // Closures work too
//! let get_user = handler_fn(|req: GetUser| async move { anyhow::Ok(lookup(req.user_id)) });
//! mediator.handle_request::<GetUser, _>(get_user)?;
//! ```

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::context::HandlerContext;
use crate::core::{HandlerTarget, Notification, Request};
use crate::error::MediatorError;
use crate::identity::TypeIdentity;

/// Answers one request type.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    /// Produce the response for `request`.
    async fn handle(&self, request: R) -> Result<R::Response>;
}

/// Reacts to one notification type.
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync + 'static {
    /// React to `notification`.
    ///
    /// `ctx` carries the publisher's cancellation signal.
    async fn handle(&self, notification: &N, ctx: HandlerContext) -> Result<()>;
}

/// Adapter turning a closure into a handler.
///
/// - `Fn(R) -> impl Future<Output = Result<R::Response>>` is a [`RequestHandler`]
/// - `Fn(N, HandlerContext) -> impl Future<Output = Result<()>>` is a
///   [`NotificationHandler`] for `Clone` notifications
pub struct FnHandler<F> {
    f: F,
}

/// Wrap a closure as a shareable handler.
pub fn handler_fn<F>(f: F) -> Arc<FnHandler<F>> {
    Arc::new(FnHandler { f })
}

#[async_trait]
impl<R, F, Fut> RequestHandler<R> for FnHandler<F>
where
    R: Request,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R::Response>> + Send + 'static,
{
    async fn handle(&self, request: R) -> Result<R::Response> {
        (self.f)(request).await
    }
}

#[async_trait]
impl<N, F, Fut> NotificationHandler<N> for FnHandler<F>
where
    N: Notification + Clone,
    F: Fn(N, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, notification: &N, ctx: HandlerContext) -> Result<()> {
        (self.f)(notification.clone(), ctx).await
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("f", &type_name::<F>())
            .finish()
    }
}

/// Reference identity of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerKey(usize);

impl HandlerKey {
    /// Key of the allocation behind `handler`.
    pub fn of<H: ?Sized>(handler: &Arc<H>) -> Self {
        HandlerKey(Arc::as_ptr(handler) as *const () as usize)
    }
}

/// A type-erased handler together with the target it was built for.
///
/// Holds an `Arc<dyn RequestHandler<R>>` or `Arc<dyn NotificationHandler<N>>`
/// behind `dyn Any`; the typed accessors recover it.
#[derive(Clone)]
pub struct HandlerEntry {
    target: HandlerTarget,
    key: HandlerKey,
    handler: Arc<dyn Any + Send + Sync>,
}

impl HandlerEntry {
    /// Erase a request handler.
    pub fn request<R, H>(handler: Arc<H>) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        let key = HandlerKey::of(&handler);
        let handler: Arc<dyn RequestHandler<R>> = handler;
        Self {
            target: HandlerTarget::request::<R>(),
            key,
            handler: Arc::new(handler),
        }
    }

    /// Erase a notification handler.
    pub fn notification<N, H>(handler: Arc<H>) -> Self
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        let key = HandlerKey::of(&handler);
        let handler: Arc<dyn NotificationHandler<N>> = handler;
        Self {
            target: HandlerTarget::notification::<N>(),
            key,
            handler: Arc::new(handler),
        }
    }

    /// The target this handler was built for.
    pub fn target(&self) -> HandlerTarget {
        self.target
    }

    /// Identity of the handled type.
    pub fn identity(&self) -> TypeIdentity {
        self.target.identity()
    }

    /// Reference identity of the handler.
    pub fn key(&self) -> HandlerKey {
        self.key
    }

    /// Recover the typed request handler.
    pub fn request_handler<R: Request>(&self) -> Result<Arc<dyn RequestHandler<R>>, MediatorError> {
        self.handler
            .downcast_ref::<Arc<dyn RequestHandler<R>>>()
            .cloned()
            .ok_or(MediatorError::HandlerTypeMismatch {
                expected: type_name::<R>(),
            })
    }

    /// Recover the typed notification handler.
    pub fn notification_handler<N: Notification>(
        &self,
    ) -> Result<Arc<dyn NotificationHandler<N>>, MediatorError> {
        self.handler
            .downcast_ref::<Arc<dyn NotificationHandler<N>>>()
            .cloned()
            .ok_or(MediatorError::HandlerTypeMismatch {
                expected: type_name::<N>(),
            })
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("target", &self.target)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// A handler paired with the target it should be registered against.
///
/// Used for construction-time handler lists and for the generic
/// `Mediator::handle` / `Mediator::unhandle`. The pairing is checked at
/// registration: a mismatch is an `InvalidHandlerTarget` error.
#[derive(Debug, Clone)]
pub struct HandlerDefinition {
    /// What the handler is registered for.
    pub target: HandlerTarget,
    /// The erased handler.
    pub entry: HandlerEntry,
}

impl HandlerDefinition {
    /// Pair an arbitrary target with a handler.
    pub fn new(target: HandlerTarget, entry: HandlerEntry) -> Self {
        Self { target, entry }
    }

    /// Definition for a request handler.
    pub fn request<R, H>(handler: Arc<H>) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        Self::new(HandlerTarget::request::<R>(), HandlerEntry::request::<R, H>(handler))
    }

    /// Definition for a notification handler.
    pub fn notification<N, H>(handler: Arc<H>) -> Self
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        Self::new(
            HandlerTarget::notification::<N>(),
            HandlerEntry::notification::<N, H>(handler),
        )
    }

    /// Check that the handler was built for the declared target.
    pub fn validate(&self) -> Result<(), MediatorError> {
        if self.target != self.entry.target() {
            return Err(MediatorError::InvalidHandlerTarget {
                type_name: self.target.type_name(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Double(i32);
    impl Request for Double {
        type Response = i32;
    }

    #[derive(Debug, Clone)]
    struct Tick;
    impl Notification for Tick {}

    struct DoubleHandler;

    #[async_trait]
    impl RequestHandler<Double> for DoubleHandler {
        async fn handle(&self, request: Double) -> Result<i32> {
            Ok(request.0 * 2)
        }
    }

    #[tokio::test]
    async fn test_entry_recovers_request_handler() {
        let entry = HandlerEntry::request::<Double, _>(Arc::new(DoubleHandler));
        let handler = entry.request_handler::<Double>().unwrap();
        assert_eq!(handler.handle(Double(21)).await.unwrap(), 42);
        assert!(entry.target().is_request());
    }

    #[test]
    fn test_entry_rejects_wrong_type() {
        let entry = HandlerEntry::request::<Double, _>(Arc::new(DoubleHandler));
        let err = entry.notification_handler::<Tick>().err().unwrap();
        assert!(matches!(err, MediatorError::HandlerTypeMismatch { .. }));
    }

    #[test]
    fn test_key_is_reference_identity() {
        let first = Arc::new(DoubleHandler);
        let second = Arc::new(DoubleHandler);
        let erased: Arc<dyn RequestHandler<Double>> = first.clone();

        assert_eq!(HandlerKey::of(&first), HandlerKey::of(&first.clone()));
        assert_eq!(HandlerKey::of(&first), HandlerKey::of(&erased));
        assert_ne!(HandlerKey::of(&first), HandlerKey::of(&second));
    }

    #[tokio::test]
    async fn test_closure_handlers() {
        let double = handler_fn(|req: Double| async move { anyhow::Ok(req.0 * 2) });
        let entry = HandlerEntry::request::<Double, _>(double);
        let handler = entry.request_handler::<Double>().unwrap();
        assert_eq!(handler.handle(Double(4)).await.unwrap(), 8);

        let tick = handler_fn(|_: Tick, _ctx: HandlerContext| async { anyhow::Ok(()) });
        let entry = HandlerEntry::notification::<Tick, _>(tick);
        assert!(entry.notification_handler::<Tick>().is_ok());
    }

    #[test]
    fn test_definition_validation() {
        let valid = HandlerDefinition::request::<Double, _>(Arc::new(DoubleHandler));
        assert!(valid.validate().is_ok());

        let mismatched = HandlerDefinition::new(
            HandlerTarget::notification::<Tick>(),
            HandlerEntry::request::<Double, _>(Arc::new(DoubleHandler)),
        );
        assert!(matches!(
            mismatched.validate(),
            Err(MediatorError::InvalidHandlerTarget { .. })
        ));
    }
}

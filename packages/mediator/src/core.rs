//! Core traits for the mediator.
//!
//! # Overview
//!
//! The mediator routes two kinds of messages:
//! - [`Request`] = a query with exactly one handler and one response
//! - [`Notification`] = a fact fanned out to zero or more handlers
//!
//! Handlers are registered against a [`HandlerTarget`], the closed descriptor
//! saying which kind of message a type is. The target is produced explicitly
//! at registration time; the mediator never inspects a value to guess.

use std::fmt;

use crate::identity::TypeIdentity;

/// A single-answer query.
///
/// At most one handler is registered for each request type.
///
/// # Example
///
/// ```ignore
/// use mediator::Request;
///
/// struct GetUser {
///     user_id: u64,
/// }
///
/// impl Request for GetUser {
///     type Response = Option<User>;
/// }
/// ```
pub trait Request: Send + 'static {
    /// The value the handler answers with.
    type Response: Send + 'static;

    /// Identity of this request type in the global registry.
    fn identity() -> TypeIdentity
    where
        Self: Sized,
    {
        TypeIdentity::of::<Self>()
    }
}

/// A fire-and-forget event.
///
/// Any number of handlers may be registered; they run in registration order
/// under the sync strategies and concurrently under the parallel ones.
///
/// # Example
///
/// ```ignore
/// use mediator::Notification;
///
/// #[derive(Debug, Clone)]
/// struct UserCreated {
///     user_id: u64,
/// }
///
/// impl Notification for UserCreated {}
/// ```
pub trait Notification: Send + Sync + 'static {
    /// Identity of this notification type in the global registry.
    fn identity() -> TypeIdentity
    where
        Self: Sized,
    {
        TypeIdentity::of::<Self>()
    }
}

/// What a handler is being registered for.
///
/// This is the only place the request/notification distinction is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerTarget {
    /// A request type; at most one handler.
    Request(TypeIdentity),
    /// A notification type; an ordered list of handlers.
    Notification(TypeIdentity),
}

impl HandlerTarget {
    /// Target for the request type `R`.
    pub fn request<R: Request>() -> Self {
        HandlerTarget::Request(R::identity())
    }

    /// Target for the notification type `N`.
    pub fn notification<N: Notification>() -> Self {
        HandlerTarget::Notification(N::identity())
    }

    /// The identity of the targeted type.
    pub fn identity(&self) -> TypeIdentity {
        match self {
            HandlerTarget::Request(identity) | HandlerTarget::Notification(identity) => *identity,
        }
    }

    /// The type name of the targeted type.
    pub fn type_name(&self) -> &'static str {
        self.identity().name()
    }

    /// Returns true for request targets.
    pub fn is_request(&self) -> bool {
        matches!(self, HandlerTarget::Request(_))
    }

    /// Returns true for notification targets.
    pub fn is_notification(&self) -> bool {
        matches!(self, HandlerTarget::Notification(_))
    }
}

impl fmt::Display for HandlerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerTarget::Request(identity) => write!(f, "request {}", identity),
            HandlerTarget::Notification(identity) => write!(f, "notification {}", identity),
        }
    }
}

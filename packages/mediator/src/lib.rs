//! # Mediator
//!
//! An in-process mediator. Callers send a typed **request** and get exactly
//! one response from its single handler, or publish a typed **notification**
//! that fans out to every registered handler under a publish strategy.
//! Callers never see handler implementations; handlers are found by the
//! message's type.
//!
//! ## Architecture
//!
//! ```text
//! handle() / unhandle()
//!     │
//!     ├─► RequestHandlerStore       (one handler per request type)
//!     └─► NotificationHandlerStore  (ordered list per notification type)
//!
//! send(request)
//!     └─► RequestHandlerStore.get() ─► handler.handle(request) ─► response
//!
//! publish(notification)
//!     │
//!     ├─► NotificationHandlerStore.get_many()   (snapshot)
//!     │
//!     └─► PublisherFactory.create(strategy)
//!             │
//!             ▼
//!         Publisher ──┬─► SyncContinueOnException
//!                     ├─► SyncStopOnException
//!                     ├─► ParallelNoWait
//!                     ├─► ParallelWhenAll (= Async)
//!                     └─► ParallelWhenAny
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One request handler** - a second registration for a request type fails
//! 2. **Snapshots** - handlers added or removed during a publish do not affect it
//! 3. **Advisory cancellation** - stopping a publisher signals handlers, never aborts them
//! 4. **Drain** - `stop()` returns once all work admitted before it has settled
//!
//! ## Example
//!
//! ```ignore
//! use mediator::{handler_fn, HandlerContext, Mediator, Notification, PublishStrategy, Request};
//! use std::sync::Arc;
//!
//! struct GetUser { user_id: u64 }
//! impl Request for GetUser {
//!     type Response = User;
//! }
//!
//! #[derive(Clone)]
//! struct UserCreated { user_id: u64 }
//! impl Notification for UserCreated {}
//!
//! let mediator = Mediator::new();
//!
//! mediator.handle_request::<GetUser, _>(handler_fn(|req: GetUser| async move {
//!     anyhow::Ok(load_user(req.user_id).await?)
//! }))?;
//!
//! mediator.handle_notification::<UserCreated, _>(handler_fn(
//!     |event: UserCreated, ctx: HandlerContext| async move {
//!         tokio::select! {
//!             _ = ctx.cancelled() => Ok(()),
//!             res = send_welcome_email(event.user_id) => res,
//!         }
//!     },
//! ))?;
//!
//! let user = mediator.send(GetUser { user_id: 7 }).await?;
//! mediator.publish_with(UserCreated { user_id: user.id }, PublishStrategy::ParallelWhenAll).await?;
//!
//! mediator.stop().await;
//! ```
//!
//! ## What This Is Not
//!
//! No cross-process messaging, no persistence, no retries. Ordering is only
//! what the chosen strategy gives within one process.

// Core modules
mod context;
mod core;
mod error;
mod factory;
mod handler;
mod identity;
mod inflight;
mod mediator;
mod notification_store;
mod publisher;
mod request_store;
mod strategy;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export core traits
pub use crate::core::{HandlerTarget, Notification, Request};

// Re-export identity types
pub use identity::{TypeIdentity, TypeRegistry};

// Re-export handler types
pub use handler::{
    handler_fn, FnHandler, HandlerDefinition, HandlerEntry, HandlerKey, NotificationHandler,
    RequestHandler,
};

// Re-export context
pub use context::HandlerContext;

// Re-export error types
pub use crate::error::{AggregateError, MediatorError};

// Re-export store types
pub use notification_store::{HandlerSnapshot, NotificationHandlerStore};
pub use request_store::RequestHandlerStore;

// Re-export publisher types
pub use factory::PublisherFactory;
pub use publisher::{Handlers, Publisher};
pub use strategy::{ParseStrategyError, PublishStrategy};

// Re-export mediator types (primary entry point)
pub use mediator::{Mediator, MediatorConfig, MediatorState};

// Re-export commonly used external types
pub use async_trait::async_trait;

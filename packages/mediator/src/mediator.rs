//! The mediator façade: registration, `send` and `publish`.
//!
//! # Example
//!
//! ```ignore
//! use mediator::{handler_fn, HandlerContext, Mediator, PublishStrategy};
//!
//! let mediator = Mediator::new();
//!
//! mediator.handle_request::<GetUser, _>(handler_fn(|req: GetUser| async move {
//!     anyhow::Ok(User { id: req.user_id })
//! }))?;
//! let user = mediator.send(GetUser { user_id }).await?;
//!
//! mediator.handle_notification::<UserCreated, _>(Arc::new(SendWelcomeEmail))?;
//! mediator.publish(UserCreated { user_id }).await?;
//! mediator.publish_with(UserCreated { user_id }, PublishStrategy::ParallelNoWait).await?;
//!
//! mediator.stop().await;
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::core::{HandlerTarget, Notification, Request};
use crate::error::MediatorError;
use crate::factory::PublisherFactory;
use crate::handler::{HandlerDefinition, NotificationHandler, RequestHandler};
use crate::notification_store::NotificationHandlerStore;
use crate::publisher::Publisher;
use crate::request_store::RequestHandlerStore;
use crate::strategy::PublishStrategy;

/// Lifecycle of a [`Mediator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediatorState {
    /// Built, nothing dispatched yet.
    Constructed,
    /// Dispatching.
    Running,
    /// Default publisher stopped and drained.
    Stopped,
}

/// Construction-time settings for a [`Mediator`].
#[derive(Default)]
pub struct MediatorConfig {
    /// Strategy used by [`Mediator::publish`].
    pub default_strategy: PublishStrategy,
    /// Handlers registered at construction, in order.
    pub initial_handlers: Vec<HandlerDefinition>,
    /// Publisher source. `None` uses [`PublisherFactory::shared`].
    pub publishers: Option<Arc<PublisherFactory>>,
}

impl MediatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_strategy(mut self, strategy: PublishStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Register `definition` at construction.
    pub fn with_handler(mut self, definition: HandlerDefinition) -> Self {
        self.initial_handlers.push(definition);
        self
    }

    pub fn with_request_handler<R, H>(self, handler: Arc<H>) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        self.with_handler(HandlerDefinition::request::<R, H>(handler))
    }

    pub fn with_notification_handler<N, H>(self, handler: Arc<H>) -> Self
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        self.with_handler(HandlerDefinition::notification::<N, H>(handler))
    }

    /// Use `factory` instead of the shared one.
    pub fn with_publishers(mut self, factory: Arc<PublisherFactory>) -> Self {
        self.publishers = Some(factory);
        self
    }
}

impl std::fmt::Debug for MediatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediatorConfig")
            .field("default_strategy", &self.default_strategy)
            .field("initial_handlers", &self.initial_handlers.len())
            .field("shared_publishers", &self.publishers.is_none())
            .finish()
    }
}

/// Routes requests to their single handler and notifications to theirs.
///
/// Registration takes `&self`, so a mediator can be shared behind an `Arc`
/// and handlers added or removed while it dispatches.
pub struct Mediator {
    requests: RequestHandlerStore,
    notifications: NotificationHandlerStore,
    publishers: Arc<PublisherFactory>,
    default_strategy: PublishStrategy,
    state: Mutex<MediatorState>,
}

impl Mediator {
    /// A mediator with the `Async` default strategy and shared publishers.
    pub fn new() -> Self {
        Self::with_parts(PublishStrategy::default(), PublisherFactory::shared())
    }

    fn with_parts(default_strategy: PublishStrategy, publishers: Arc<PublisherFactory>) -> Self {
        Self {
            requests: RequestHandlerStore::new(),
            notifications: NotificationHandlerStore::new(),
            publishers,
            default_strategy,
            state: Mutex::new(MediatorState::Constructed),
        }
    }

    /// Build a mediator and register `config.initial_handlers` in order.
    ///
    /// Fails on the first handler that cannot be registered.
    pub fn from_config(config: MediatorConfig) -> Result<Self, MediatorError> {
        let publishers = config.publishers.unwrap_or_else(PublisherFactory::shared);
        let mediator = Self::with_parts(config.default_strategy, publishers);
        for definition in config.initial_handlers {
            mediator.handle(definition)?;
        }
        Ok(mediator)
    }

    /// Strategy used by [`Mediator::publish`].
    pub fn default_strategy(&self) -> PublishStrategy {
        self.default_strategy
    }

    /// Current lifecycle state.
    ///
    /// Once past `Constructed` this follows the default publisher, which
    /// other mediators sharing it may stop or restart.
    pub fn state(&self) -> MediatorState {
        let stored = *self.lock_state();
        if stored == MediatorState::Constructed {
            return stored;
        }
        if self.publishers.create(self.default_strategy).is_started() {
            MediatorState::Running
        } else {
            MediatorState::Stopped
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, MediatorState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("mediator state mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn mark_running(&self) {
        let mut state = self.lock_state();
        if *state == MediatorState::Constructed {
            *state = MediatorState::Running;
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a handler against the target it declares.
    pub fn handle(&self, definition: HandlerDefinition) -> Result<(), MediatorError> {
        definition.validate()?;
        match definition.target {
            HandlerTarget::Request(_) => self.requests.add_entry(definition.entry),
            HandlerTarget::Notification(_) => self.notifications.add_entry(definition.entry),
        }
    }

    /// Register the handler for request `R`.
    ///
    /// Fails with `DuplicateHandler` if `R` already has one.
    pub fn handle_request<R, H>(&self, handler: Arc<H>) -> Result<(), MediatorError>
    where
        R: Request,
        H: RequestHandler<R>,
    {
        self.requests.add::<R, H>(handler)
    }

    /// Add a handler for notification `N`.
    pub fn handle_notification<N, H>(&self, handler: Arc<H>) -> Result<(), MediatorError>
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        self.notifications.add::<N, H>(handler)
    }

    /// Unregister a handler previously registered with [`Mediator::handle`].
    pub fn unhandle(&self, definition: &HandlerDefinition) -> Result<(), MediatorError> {
        definition.validate()?;
        match definition.target {
            HandlerTarget::Request(_) => self.requests.remove_entry(&definition.entry),
            HandlerTarget::Notification(_) => self.notifications.remove_entry(&definition.entry),
        }
    }

    /// Unregister `handler` for request `R`.
    pub fn unhandle_request<R, H>(&self, handler: &Arc<H>) -> Result<(), MediatorError>
    where
        R: Request,
        H: ?Sized,
    {
        self.requests.remove::<R, H>(handler)
    }

    /// Remove the first registration of `handler` for notification `N`.
    pub fn unhandle_notification<N, H>(&self, handler: &Arc<H>) -> Result<(), MediatorError>
    where
        N: Notification,
        H: ?Sized,
    {
        self.notifications.remove::<N, H>(handler)
    }

    /// Returns true if request `R` has a handler.
    pub fn has_request_handler<R: Request>(&self) -> bool {
        self.requests.contains::<R>()
    }

    /// Number of handlers registered for notification `N`.
    pub fn notification_handler_count<N: Notification>(&self) -> usize {
        self.notifications.count::<N>()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Send `request` to its handler and return the response.
    ///
    /// Returns `MediatorError::HandlerNotFound` (inside the `anyhow::Error`)
    /// if nothing handles `R`. The handler's own error is returned unchanged.
    pub async fn send<R: Request>(&self, request: R) -> anyhow::Result<R::Response> {
        self.mark_running();
        let handler = self.requests.get::<R>()?;
        debug!(request = std::any::type_name::<R>(), "sending request");
        handler.handle(request).await
    }

    /// Publish `notification` with the default strategy.
    pub async fn publish<N: Notification>(&self, notification: N) -> Result<(), MediatorError> {
        self.publish_with(notification, self.default_strategy).await
    }

    /// Publish `notification` with `strategy`.
    ///
    /// Handlers registered or removed after this call starts do not affect it.
    pub async fn publish_with<N: Notification>(
        &self,
        notification: N,
        strategy: PublishStrategy,
    ) -> Result<(), MediatorError> {
        self.mark_running();
        let handlers = self.notifications.get_many::<N>();
        self.publishers
            .create(strategy)
            .publish(notification, handlers)
            .await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// The publisher serving `strategy`.
    pub fn publisher(&self, strategy: PublishStrategy) -> Arc<Publisher> {
        self.publishers.create(strategy)
    }

    /// Enter `Running`, re-arming the default publisher if it was stopped.
    pub fn start(&self) {
        let mut state = self.lock_state();
        self.publishers.create(self.default_strategy).start();
        *state = MediatorState::Running;
        info!(strategy = %self.default_strategy, "mediator started");
    }

    /// Stop the default publisher and wait for its work to drain.
    ///
    /// Other mediators sharing the publisher are stopped with it.
    pub async fn stop(&self) {
        *self.lock_state() = MediatorState::Stopped;
        info!(strategy = %self.default_strategy, "stopping mediator");
        self.publishers.create(self.default_strategy).stop().await;
    }
}

impl Default for Mediator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("default_strategy", &self.default_strategy)
            .field("state", &self.state())
            .field("requests", &self.requests)
            .field("notifications", &self.notifications)
            .finish()
    }
}

//! Request handler store: at most one handler per request type.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::core::Request;
use crate::error::MediatorError;
use crate::handler::{HandlerEntry, HandlerKey, RequestHandler};
use crate::identity::TypeIdentity;

/// Maps each request identity to its single handler.
///
/// The store only resolves handlers. The caller invokes them and receives
/// the handler's result unmodified.
#[derive(Default)]
pub struct RequestHandlerStore {
    handlers: DashMap<TypeIdentity, HandlerEntry>,
}

impl RequestHandlerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `R`.
    ///
    /// Fails with `DuplicateHandler` if `R` already has one.
    pub fn add<R, H>(&self, handler: Arc<H>) -> Result<(), MediatorError>
    where
        R: Request,
        H: RequestHandler<R>,
    {
        self.add_entry(HandlerEntry::request::<R, H>(handler))
    }

    /// Register an erased request handler.
    pub fn add_entry(&self, entry: HandlerEntry) -> Result<(), MediatorError> {
        let target = entry.target();
        if !target.is_request() {
            return Err(MediatorError::InvalidHandlerTarget {
                type_name: target.type_name(),
            });
        }

        // Check-and-insert under the shard lock
        match self.handlers.entry(target.identity()) {
            Entry::Occupied(_) => Err(MediatorError::DuplicateHandler {
                type_name: target.type_name(),
            }),
            Entry::Vacant(vacant) => {
                debug!(request = %target.identity(), "request handler registered");
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Resolve the handler for `R`.
    pub fn get<R: Request>(&self) -> Result<Arc<dyn RequestHandler<R>>, MediatorError> {
        let entry = self
            .handlers
            .get(&R::identity())
            .map(|entry| entry.clone())
            .ok_or_else(MediatorError::not_found::<R>)?;
        entry.request_handler::<R>()
    }

    /// Unregister `handler` for `R`.
    ///
    /// Fails with `HandlerNotFound` unless `handler` is the registered one.
    pub fn remove<R, H>(&self, handler: &Arc<H>) -> Result<(), MediatorError>
    where
        R: Request,
        H: ?Sized,
    {
        self.remove_key(R::identity(), HandlerKey::of(handler))
    }

    /// Unregister an erased request handler.
    pub fn remove_entry(&self, entry: &HandlerEntry) -> Result<(), MediatorError> {
        self.remove_key(entry.identity(), entry.key())
    }

    fn remove_key(&self, identity: TypeIdentity, key: HandlerKey) -> Result<(), MediatorError> {
        match self.handlers.remove_if(&identity, |_, entry| entry.key() == key) {
            Some(_) => {
                debug!(request = %identity, "request handler removed");
                Ok(())
            }
            None => Err(MediatorError::HandlerNotFound {
                type_name: identity.name(),
            }),
        }
    }

    /// Returns true if `R` has a handler.
    pub fn contains<R: Request>(&self) -> bool {
        self.handlers.contains_key(&R::identity())
    }

    /// Number of registered request handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no request handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for RequestHandlerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandlerStore")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

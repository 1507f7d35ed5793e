//! Notification handler store: an ordered handler list per notification type.
//!
//! Lists are copy-on-write. Every mutation publishes a new list, so a
//! snapshot handed to an in-flight publish never changes underneath it.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::core::{HandlerTarget, Notification};
use crate::error::MediatorError;
use crate::handler::{HandlerEntry, HandlerKey, NotificationHandler};
use crate::identity::TypeIdentity;

/// Snapshot of the handlers registered for one notification type.
pub type HandlerSnapshot = Arc<Vec<HandlerEntry>>;

/// Maps each notification identity to its handlers, in registration order.
#[derive(Default)]
pub struct NotificationHandlerStore {
    handlers: DashMap<TypeIdentity, HandlerSnapshot>,
}

impl NotificationHandlerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `N`.
    ///
    /// The same handler may be added more than once; each registration is
    /// invoked.
    pub fn add<N, H>(&self, handler: Arc<H>) -> Result<(), MediatorError>
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        self.add_entry(HandlerEntry::notification::<N, H>(handler))
    }

    /// Append an erased notification handler.
    pub fn add_entry(&self, entry: HandlerEntry) -> Result<(), MediatorError> {
        let target = entry.target();
        if !target.is_notification() {
            return Err(MediatorError::InvalidHandlerTarget {
                type_name: target.type_name(),
            });
        }

        let mut list = self.handlers.entry(target.identity()).or_default();
        Arc::make_mut(&mut *list).push(entry);
        debug!(
            notification = %target.identity(),
            handlers = list.len(),
            "notification handler registered"
        );
        Ok(())
    }

    /// Typed snapshot of the handlers for `N`.
    ///
    /// Never fails: an unregistered notification yields an empty list.
    pub fn get_many<N: Notification>(&self) -> Vec<Arc<dyn NotificationHandler<N>>> {
        self.snapshot(N::identity())
            .iter()
            .filter_map(|entry| match entry.notification_handler::<N>() {
                Ok(handler) => Some(handler),
                Err(e) => {
                    warn!(error = %e, "skipping notification handler registered for another type");
                    None
                }
            })
            .collect()
    }

    /// Erased snapshot for a target; empty for request targets.
    pub fn get_many_for(&self, target: &HandlerTarget) -> HandlerSnapshot {
        match target {
            HandlerTarget::Notification(identity) => self.snapshot(*identity),
            HandlerTarget::Request(_) => HandlerSnapshot::default(),
        }
    }

    fn snapshot(&self, identity: TypeIdentity) -> HandlerSnapshot {
        self.handlers
            .get(&identity)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Remove the first registration of `handler` for `N`.
    ///
    /// Fails with `HandlerNotFound` if `handler` is not registered for `N`.
    pub fn remove<N, H>(&self, handler: &Arc<H>) -> Result<(), MediatorError>
    where
        N: Notification,
        H: ?Sized,
    {
        self.remove_key(N::identity(), HandlerKey::of(handler))
    }

    /// Remove the first registration of an erased notification handler.
    pub fn remove_entry(&self, entry: &HandlerEntry) -> Result<(), MediatorError> {
        self.remove_key(entry.identity(), entry.key())
    }

    fn remove_key(&self, identity: TypeIdentity, key: HandlerKey) -> Result<(), MediatorError> {
        let not_found = || MediatorError::HandlerNotFound {
            type_name: identity.name(),
        };

        let emptied = {
            let mut list = self.handlers.get_mut(&identity).ok_or_else(not_found)?;
            let position = list
                .iter()
                .position(|entry| entry.key() == key)
                .ok_or_else(not_found)?;
            Arc::make_mut(&mut *list).remove(position);
            list.is_empty()
        };

        // Shard lock released above; dropping the key needs it again
        if emptied {
            self.handlers.remove_if(&identity, |_, list| list.is_empty());
        }

        debug!(notification = %identity, "notification handler removed");
        Ok(())
    }

    /// Number of handlers registered for `N`.
    pub fn count<N: Notification>(&self) -> usize {
        self.snapshot(N::identity()).len()
    }

    /// Returns true if no notification type has handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for NotificationHandlerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHandlerStore")
            .field("notification_types", &self.handlers.len())
            .finish()
    }
}

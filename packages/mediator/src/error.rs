//! Structured error types for the mediator.
//!
//! `MediatorError` provides pattern-matchable errors instead of generic
//! `anyhow::Error`. Handlers themselves return `anyhow::Result`; their
//! failures are wrapped only where a publish strategy has to say something
//! about them (aggregate or single propagated failure).
//!
//! # Error Example
//!
//! ```ignore
//! use mediator::{MediatorError, PublishStrategy};
//!
//! match mediator.publish_with(OrderPlaced { id }, PublishStrategy::ParallelWhenAll).await {
//!     Ok(()) => {}
//!     Err(MediatorError::AggregateFailure(failures)) => {
//!         for failure in failures.iter() {
//!             eprintln!("handler failed: {failure:#}");
//!         }
//!     }
//!     Err(other) => eprintln!("publish failed: {other}"),
//! }
//! ```
//!
//! `send` returns `anyhow::Result` so the handler's error reaches the caller
//! untouched. Mediator failures inside it can still be recovered:
//!
//! ```ignore
//! if let Err(e) = mediator.send(GetUser { user_id }).await {
//!     if let Some(MediatorError::HandlerNotFound { type_name }) = e.downcast_ref() {
//!         eprintln!("nothing handles {type_name}");
//!     }
//! }
//! ```

use std::fmt;

use thiserror::Error;

/// Ordered collection of handler failures.
///
/// Failures are kept in the order they were observed: occurrence order for
/// the sync strategies, registration order for the parallel ones.
#[derive(Debug, Default)]
pub struct AggregateError {
    failures: Vec<anyhow::Error>,
}

impl AggregateError {
    /// Wrap a list of failures.
    pub fn new(failures: Vec<anyhow::Error>) -> Self {
        Self { failures }
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if nothing failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Iterate over the failures in order.
    pub fn iter(&self) -> impl Iterator<Item = &anyhow::Error> {
        self.failures.iter()
    }

    /// Take ownership of the failures.
    pub fn into_inner(self) -> Vec<anyhow::Error> {
        self.failures
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} handler(s) failed", self.failures.len())?;
        for (index, failure) in self.failures.iter().enumerate() {
            write!(f, "; [{}] {}", index, failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl IntoIterator for AggregateError {
    type Item = anyhow::Error;
    type IntoIter = std::vec::IntoIter<anyhow::Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.into_iter()
    }
}

/// Structured error type for mediator operations.
#[derive(Debug, Error)]
pub enum MediatorError {
    /// The handler cannot be registered against the given target, e.g. a
    /// notification handler paired with a request target.
    #[error("invalid handler target {type_name}: not a matching request or notification")]
    InvalidHandlerTarget {
        /// Human-readable name of the targeted type.
        type_name: &'static str,
    },

    /// A request type already has a handler.
    #[error("handler for request {type_name} already exists")]
    DuplicateHandler {
        /// Human-readable name of the request type.
        type_name: &'static str,
    },

    /// No handler registered, or the registered handler is not the one
    /// being removed.
    #[error("no handler found for {type_name}")]
    HandlerNotFound {
        /// Human-readable name of the request or notification type.
        type_name: &'static str,
    },

    /// One or more notification handlers failed.
    #[error("notification handlers failed: {0}")]
    AggregateFailure(AggregateError),

    /// A single notification handler failure, propagated as-is.
    #[error("notification handler failed: {source}")]
    HandlerFailure {
        /// The handler's error.
        #[source]
        source: anyhow::Error,
    },

    /// A type-erased handler was resolved for the wrong message type
    /// (internal error).
    #[error("handler type mismatch: expected {expected}")]
    HandlerTypeMismatch {
        /// Expected message type name.
        expected: &'static str,
    },
}

impl MediatorError {
    /// Build a `HandlerNotFound` for `T`.
    pub(crate) fn not_found<T: ?Sized>() -> Self {
        MediatorError::HandlerNotFound {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Returns the underlying handler failures, if this error carries any.
    pub fn handler_failures(&self) -> Vec<&anyhow::Error> {
        match self {
            MediatorError::AggregateFailure(aggregate) => aggregate.iter().collect(),
            MediatorError::HandlerFailure { source } => vec![source],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_handler_display() {
        let err = MediatorError::DuplicateHandler {
            type_name: "GetUser",
        };
        assert!(err.to_string().contains("already exists"));
        assert!(err.to_string().contains("GetUser"));
    }

    #[test]
    fn test_handler_not_found_display() {
        let err = MediatorError::not_found::<String>();
        assert!(err.to_string().contains("no handler found"));
        assert!(err.to_string().contains("String"));
    }

    #[test]
    fn test_aggregate_preserves_order() {
        let err = MediatorError::AggregateFailure(AggregateError::new(vec![
            anyhow::anyhow!("first"),
            anyhow::anyhow!("second"),
        ]));

        let display = err.to_string();
        assert!(display.contains("2 handler(s) failed"));
        let first = display.find("first").unwrap();
        let second = display.find("second").unwrap();
        assert!(first < second);

        let failures: Vec<String> = err
            .handler_failures()
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(failures, vec!["first", "second"]);
    }

    #[test]
    fn test_handler_failure_keeps_source() {
        let err = MediatorError::HandlerFailure {
            source: anyhow::anyhow!("boom"),
        };
        assert!(err.to_string().contains("boom"));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.handler_failures().len(), 1);
    }

    #[test]
    fn test_error_is_pattern_matchable() {
        let err = MediatorError::InvalidHandlerTarget {
            type_name: "Orphan",
        };

        match &err {
            MediatorError::InvalidHandlerTarget { type_name } => {
                assert_eq!(*type_name, "Orphan");
            }
            _ => panic!("Expected InvalidHandlerTarget"),
        }
        assert!(err.handler_failures().is_empty());
    }

    #[test]
    fn test_error_can_be_downcast_from_anyhow() {
        let err: anyhow::Error = MediatorError::HandlerNotFound {
            type_name: "GetUser",
        }
        .into();

        match err.downcast_ref::<MediatorError>() {
            Some(MediatorError::HandlerNotFound { type_name }) => {
                assert_eq!(*type_name, "GetUser");
            }
            _ => panic!("Expected HandlerNotFound"),
        }
    }

    #[test]
    fn test_aggregate_into_iter() {
        let aggregate = AggregateError::new(vec![anyhow::anyhow!("only")]);
        assert_eq!(aggregate.len(), 1);
        assert!(!aggregate.is_empty());
        let failures: Vec<_> = aggregate.into_iter().collect();
        assert_eq!(failures[0].to_string(), "only");
    }
}

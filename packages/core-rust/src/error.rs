//! Dispatch and construction errors.

use std::fmt;

use crate::request::Category;

/// Errors returned by `validate` and `dispatch`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No registered handler matched the request.
    #[error("Cannot find a matching handler for {request_type} {}", crate::request::category_label(*.category))]
    HandlerNotFound {
        request_type: &'static str,
        category: Option<Category>,
    },
    /// The resolved handler set violated the active cardinality predicate.
    #[error("The pipeline validator failed")]
    ValidationFailed,
    /// Error produced by a caller-supplied validation failure factory.
    #[error(transparent)]
    Rejected(anyhow::Error),
    /// Failure raised by a handler or a middleware.
    #[error(transparent)]
    Execution(anyhow::Error),
    /// One or more handlers of a fan-out dispatch failed.
    #[error(transparent)]
    EventHandlers(EventFailures),
    /// A reply did not hold the expected type.
    #[error("reply does not hold the expected {expected} value")]
    TypeMismatch { expected: &'static str },
}

impl DispatchError {
    /// Whether this is a selection-phase error (not found, ambiguous, rejected).
    #[must_use]
    pub fn is_selection(&self) -> bool {
        matches!(
            self,
            Self::HandlerNotFound { .. } | Self::ValidationFailed | Self::Rejected(_)
        )
    }
}

/// Every failure of one fan-out dispatch, collected after all handlers ran.
#[derive(Debug)]
pub struct EventFailures {
    request_type: &'static str,
    invoked: usize,
    failures: Vec<HandlerFailure>,
}

impl EventFailures {
    pub(crate) fn new(
        request_type: &'static str,
        invoked: usize,
        failures: Vec<HandlerFailure>,
    ) -> Self {
        Self {
            request_type,
            invoked,
            failures,
        }
    }

    /// Simple type name of the dispatched request.
    #[must_use]
    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// Number of handlers that were invoked, failed or not.
    #[must_use]
    pub fn invoked(&self) -> usize {
        self.invoked
    }

    /// Failed handlers, in resolution order.
    #[must_use]
    pub fn failures(&self) -> &[HandlerFailure] {
        &self.failures
    }

    /// Take ownership of the failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<HandlerFailure> {
        self.failures
    }
}

impl fmt::Display for EventFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} handlers failed for {}",
            self.failures.len(),
            self.invoked,
            self.request_type
        )?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.handler, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for EventFailures {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|failure| &failure.error as &(dyn std::error::Error + 'static))
    }
}

/// One handler's failure inside a fan-out dispatch.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Name of the failed handler.
    pub handler: &'static str,
    /// What the handler or its middleware returned.
    pub error: DispatchError,
}

/// Errors raised while building a pipeline or bus.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No handler supplier was given.
    #[error("{pipeline}: no handler supplier configured")]
    MissingHandlers { pipeline: String },
    /// A handler entry was registered under another category than the bus.
    #[error("{pipeline}: handler {handler} is registered as {found}, expected {expected}")]
    CategoryMismatch {
        pipeline: String,
        handler: &'static str,
        expected: Category,
        found: &'static str,
    },
    /// An option this pipeline or bus does not accept.
    #[error("{pipeline}: {option} is not supported here")]
    Unsupported {
        pipeline: String,
        option: &'static str,
    },
}

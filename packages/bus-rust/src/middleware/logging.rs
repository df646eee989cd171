//! Tracing middleware for handler invocations.
//!
//! Opens an `info` span per invocation and records its duration and outcome
//! once the rest of the chain returns.

use std::time::Instant;

use switchyard_core::{category_label, Dispatch, DispatchError, Middleware, Next, Reply};
use tracing::info_span;

// ---------------------------------------------------------------------------
// TracingMiddleware
// ---------------------------------------------------------------------------

/// Middleware that instruments every handler invocation with a `tracing` span.
#[derive(Debug, Clone)]
pub struct TracingMiddleware {
    order: i32,
}

impl TracingMiddleware {
    /// Outermost position, so the span covers every other middleware.
    #[must_use]
    pub fn new() -> Self {
        Self::with_order(i32::MIN)
    }

    /// Place the span at a custom chain position.
    #[must_use]
    pub fn with_order(order: i32) -> Self {
        Self { order }
    }
}

impl Default for TracingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for TracingMiddleware {
    fn order(&self) -> i32 {
        self.order
    }

    fn invoke(&self, dispatch: &Dispatch<'_>, next: Next<'_>) -> Result<Reply, DispatchError> {
        let span = info_span!(
            "handler",
            pipeline = dispatch.pipeline(),
            category = category_label(dispatch.category()),
            request = dispatch.request_type(),
            handler = dispatch.handler(),
            dispatch_id = %dispatch.dispatch_id(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let _entered = span.enter();

        let start = Instant::now();
        let result = next.run(dispatch);

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        let outcome = outcome_label(&result);
        span.record("duration_ms", duration_ms);
        span.record("outcome", outcome);

        match &result {
            Ok(_) => tracing::info!(duration_ms, outcome, "dispatch complete"),
            Err(error) => tracing::warn!(duration_ms, outcome, error = %error, "dispatch failed"),
        }

        result
    }
}

pub(crate) fn outcome_label(result: &Result<Reply, DispatchError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(error) if error.is_selection() => "rejected",
        Err(_) => "error",
    }
}

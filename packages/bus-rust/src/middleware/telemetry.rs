//! Metrics middleware backed by the `metrics` facade.
//!
//! Records, per invocation:
//!
//! - `{prefix}_dispatch_total` counter, labelled by pipeline, category, request,
//!   handler and outcome.
//! - `{prefix}_dispatch_duration_seconds` histogram, labelled by pipeline and request.
//!
//! Without an installed recorder both are no-ops.

use std::time::Instant;

use switchyard_core::{category_label, Dispatch, DispatchError, Middleware, Next, Reply};

use super::logging::outcome_label;

/// Middleware that reports invocation counts and latencies.
#[derive(Debug, Clone)]
pub struct MetricsMiddleware {
    order: i32,
    total: String,
    duration: String,
}

impl MetricsMiddleware {
    /// Metrics named after `prefix`, placed just inside [`TracingMiddleware`](super::TracingMiddleware).
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            order: i32::MIN + 1,
            total: format!("{prefix}_dispatch_total"),
            duration: format!("{prefix}_dispatch_duration_seconds"),
        }
    }

    /// Move the middleware to another chain position.
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Name of the invocation counter.
    #[must_use]
    pub fn counter_name(&self) -> &str {
        &self.total
    }

    /// Name of the duration histogram.
    #[must_use]
    pub fn histogram_name(&self) -> &str {
        &self.duration
    }
}

impl Default for MetricsMiddleware {
    fn default() -> Self {
        Self::new("switchyard")
    }
}

impl Middleware for MetricsMiddleware {
    fn order(&self) -> i32 {
        self.order
    }

    fn invoke(&self, dispatch: &Dispatch<'_>, next: Next<'_>) -> Result<Reply, DispatchError> {
        let start = Instant::now();
        let result = next.run(dispatch);
        let elapsed = start.elapsed().as_secs_f64();

        metrics::counter!(
            self.total.clone(),
            "pipeline" => dispatch.pipeline().to_string(),
            "category" => category_label(dispatch.category()),
            "request" => dispatch.request_type(),
            "handler" => dispatch.handler(),
            "outcome" => outcome_label(&result)
        )
        .increment(1);
        metrics::histogram!(
            self.duration.clone(),
            "pipeline" => dispatch.pipeline().to_string(),
            "request" => dispatch.request_type()
        )
        .record(elapsed);

        result
    }
}

//! Ready-made middleware for the buses.

mod logging;
mod telemetry;

pub use logging::TracingMiddleware;
pub use telemetry::MetricsMiddleware;

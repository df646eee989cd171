//! Bus construction options and mediator-level configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use switchyard_core::pipeline::{DefaultExpectation, HandlerSupplier, MiddlewareSupplier};
use switchyard_core::{Category, HandlerEntry, Middleware, PipelineConfig};

use crate::event::EventBus;

// ---------------------------------------------------------------------------
// BusConfig
// ---------------------------------------------------------------------------

/// Named construction options for one bus.
///
/// `handlers` is required; the bus constructor reports a missing supplier as
/// `ConfigError::MissingHandlers`. `event_bus` is only accepted by
/// [`CommandBus`](crate::CommandBus).
#[derive(Default)]
pub struct BusConfig {
    /// Label for log fields and error messages. Defaults to the bus category.
    pub name: Option<String>,
    /// Required; the bus constructor fails without it.
    pub handlers: Option<HandlerSupplier>,
    /// Optional; the bus runs without middleware when unset.
    pub middlewares: Option<MiddlewareSupplier>,
    /// Only accepted by `CommandBus`.
    pub event_bus: Option<EventBus>,
}

impl BusConfig {
    /// Empty config; set at least the handler supplier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the bus name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the handler supplier. It is called once, when the bus is built.
    #[must_use]
    pub fn handlers<F, I>(mut self, supplier: F) -> Self
    where
        F: FnOnce() -> I + 'static,
        I: IntoIterator<Item = HandlerEntry>,
    {
        self.handlers = Some(Box::new(move || supplier().into_iter().collect()));
        self
    }

    /// Set the middleware supplier. It is called once, when the bus is built.
    #[must_use]
    pub fn middlewares<F, I>(mut self, supplier: F) -> Self
    where
        F: FnOnce() -> I + 'static,
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        self.middlewares = Some(Box::new(move || supplier().into_iter().collect()));
        self
    }

    /// Event bus that receives the events commands declare.
    #[must_use]
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Split into the core pipeline config and the event bus option.
    pub(crate) fn into_parts(
        self,
        category: Category,
        expectation: Option<DefaultExpectation>,
    ) -> (PipelineConfig, Option<EventBus>) {
        let Self {
            name,
            handlers,
            middlewares,
            event_bus,
        } = self;
        let config = PipelineConfig {
            name: name.unwrap_or_else(|| category.as_str().to_string()),
            category: Some(category),
            handlers,
            middlewares,
            expectation,
        };
        (config, event_bus)
    }
}

impl fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConfig")
            .field("name", &self.name)
            .field("handlers", &self.handlers.is_some())
            .field("middlewares", &self.middlewares.is_some())
            .field("event_bus", &self.event_bus.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MediatorConfig
// ---------------------------------------------------------------------------

/// Configuration for [`Mediator::build`](crate::Mediator::build).
///
/// Missing fields take their default when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Prefix of every bus name, e.g. `"orders"` gives `"orders.command"`.
    pub name: String,
    /// Wrap every bus with [`TracingMiddleware`](crate::middleware::TracingMiddleware).
    pub tracing: bool,
    /// Wrap every bus with [`MetricsMiddleware`](crate::middleware::MetricsMiddleware).
    pub metrics: bool,
    /// Prefix of the metric names recorded by `MetricsMiddleware`.
    pub metrics_prefix: String,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            name: "mediator".to_string(),
            tracing: true,
            metrics: false,
            metrics_prefix: "switchyard".to_string(),
        }
    }
}

impl MediatorConfig {
    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input or mistyped fields.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Bus name for a category, e.g. `"mediator.query"`.
    #[must_use]
    pub fn bus_name(&self, category: Category) -> String {
        format!("{}.{}", self.name, category)
    }
}

//! Handler registry and the mediator that wires the three buses together.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use switchyard_core::{
    Category, Command, ConfigError, DispatchError, Event, Handler, HandlerEntry, Middleware,
    Query,
};
use tracing::info;

use crate::command::CommandBus;
use crate::config::{BusConfig, MediatorConfig};
use crate::event::EventBus;
use crate::middleware::{MetricsMiddleware, TracingMiddleware};
use crate::query::QueryBus;

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Slot {
    handlers: Vec<HandlerEntry>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// Collects handlers and middleware per category before the buses are built.
///
/// Registration order is preserved and becomes resolution order (handlers)
/// or the tie-break between equal [`Middleware::order`] values (middleware).
#[derive(Default)]
pub struct HandlerRegistry {
    slots: Mutex<HashMap<Category, Slot>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command handler.
    pub fn register_command<H>(&self, handler: H)
    where
        H: Handler + 'static,
        H::Request: Command,
    {
        self.push(Category::Command, HandlerEntry::command(handler));
    }

    /// Register a query handler.
    pub fn register_query<H>(&self, handler: H)
    where
        H: Handler + 'static,
        H::Request: Query,
    {
        self.push(Category::Query, HandlerEntry::query(handler));
    }

    /// Register an event handler.
    pub fn register_event<H>(&self, handler: H)
    where
        H: Handler + 'static,
        H::Request: Event,
    {
        self.push(Category::Event, HandlerEntry::event(handler));
    }

    /// Add middleware to the bus of one category.
    pub fn add_middleware(&self, category: Category, middleware: Arc<dyn Middleware>) {
        self.slots
            .lock()
            .entry(category)
            .or_default()
            .middleware
            .push(middleware);
    }

    /// Add the same middleware instance to every bus.
    pub fn add_shared_middleware(&self, middleware: &Arc<dyn Middleware>) {
        let mut slots = self.slots.lock();
        for category in [Category::Command, Category::Query, Category::Event] {
            slots
                .entry(category)
                .or_default()
                .middleware
                .push(Arc::clone(middleware));
        }
    }

    /// Number of handlers registered under `category`.
    #[must_use]
    pub fn handler_count(&self, category: Category) -> usize {
        self.slots
            .lock()
            .get(&category)
            .map_or(0, |slot| slot.handlers.len())
    }

    fn push(&self, category: Category, entry: HandlerEntry) {
        self.slots
            .lock()
            .entry(category)
            .or_default()
            .handlers
            .push(entry);
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let mut map = f.debug_map();
        for (category, slot) in slots.iter() {
            map.entry(
                category,
                &format_args!(
                    "{} handlers, {} middleware",
                    slot.handlers.len(),
                    slot.middleware.len()
                ),
            );
        }
        map.finish()
    }
}

// ---------------------------------------------------------------------------
// Mediator
// ---------------------------------------------------------------------------

/// The three buses built from one registry: a [`CommandBus`] publishing to
/// its [`EventBus`], plus a [`QueryBus`].
#[derive(Debug)]
pub struct Mediator {
    commands: CommandBus,
    queries: QueryBus,
}

impl Mediator {
    /// Build every bus from `registry`.
    ///
    /// Each bus is named `"{config.name}.{category}"`. Depending on `config`,
    /// [`TracingMiddleware`] and [`MetricsMiddleware`] are added ahead of the
    /// registered middleware.
    ///
    /// # Errors
    ///
    /// Propagates the [`ConfigError`] of the first bus that fails to build.
    pub fn build(registry: HandlerRegistry, config: &MediatorConfig) -> Result<Self, ConfigError> {
        let mut slots = registry.slots.into_inner();
        let mut take = |category: Category| {
            bus_config(slots.remove(&category).unwrap_or_default(), category, config)
        };

        let events = EventBus::new(take(Category::Event))?;
        let commands = CommandBus::new(take(Category::Command).event_bus(events))?;
        let queries = QueryBus::new(take(Category::Query))?;

        info!(
            mediator = %config.name,
            commands = commands.pipeline().handlers().len(),
            queries = queries.pipeline().handlers().len(),
            events = commands.event_bus().pipeline().handlers().len(),
            tracing = config.tracing,
            metrics = config.metrics,
            "mediator built"
        );

        Ok(Self { commands, queries })
    }

    /// The command bus.
    #[must_use]
    pub fn commands(&self) -> &CommandBus {
        &self.commands
    }

    /// The query bus.
    #[must_use]
    pub fn queries(&self) -> &QueryBus {
        &self.queries
    }

    /// The event bus the command bus publishes to.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        self.commands.event_bus()
    }

    /// Execute a command and publish its events.
    ///
    /// # Errors
    ///
    /// As for [`CommandBus::execute`].
    pub fn send<C: Command>(&self, command: C) -> Result<C::Output, DispatchError> {
        self.commands.execute(command)
    }

    /// Execute a query.
    ///
    /// # Errors
    ///
    /// As for [`QueryBus::execute`].
    pub fn ask<Q: Query>(&self, query: Q) -> Result<Q::Output, DispatchError> {
        self.queries.execute(query)
    }

    /// Publish an event to every subscriber.
    ///
    /// # Errors
    ///
    /// As for [`EventBus::publish`].
    pub fn publish<E: Event>(&self, event: E) -> Result<(), DispatchError> {
        self.events().publish(event)
    }
}

fn bus_config(slot: Slot, category: Category, config: &MediatorConfig) -> BusConfig {
    let Slot {
        handlers,
        middleware,
    } = slot;

    let mut stack: Vec<Arc<dyn Middleware>> = Vec::with_capacity(middleware.len() + 2);
    if config.tracing {
        stack.push(Arc::new(TracingMiddleware::new()));
    }
    if config.metrics {
        stack.push(Arc::new(MetricsMiddleware::new(&config.metrics_prefix)));
    }
    stack.extend(middleware);

    BusConfig::new()
        .named(config.bus_name(category))
        .handlers(move || handlers)
        .middlewares(move || stack)
}

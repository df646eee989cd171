//! `Switchyard` buses: command, query and event buses built on the core pipeline,
//! plus the mediator that wires them together.

pub mod command;
pub mod config;
pub mod event;
pub mod middleware;
pub mod query;
pub mod registry;

pub use command::{CommandBus, CommandOutcome, CommandSubmission, PublicationFailure};
pub use config::{BusConfig, MediatorConfig};
pub use event::{EventBus, EventSubmission};
pub use middleware::{MetricsMiddleware, TracingMiddleware};
pub use query::QueryBus;
pub use registry::{HandlerRegistry, Mediator};

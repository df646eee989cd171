//! Request model: the capability tags that distinguish commands, queries, and events.

use std::fmt;

use crate::pipeline::Pipeline;
use crate::DispatchError;

/// A value that can be submitted to a pipeline.
///
/// The associated `Output` is what a handler produces for this request.
/// Requests are moved into a submission and lent to handlers and middleware,
/// so they never need to be `Clone`.
pub trait Request: Send + Sync + 'static {
    /// Value produced by the handler.
    type Output: Send + 'static;
}

/// A request expressing an intent to change state. Expects exactly one handler.
pub trait Command: Request {
    /// Events that the completed command has produced, derived from its output.
    ///
    /// Published on the command bus's event bus after the command handler
    /// returns. The default produces none.
    fn events(&self, _output: &Self::Output) -> Vec<EventEnvelope> {
        Vec::new()
    }
}

/// A request expressing a read. Expects exactly one handler.
pub trait Query: Request {}

/// A fact that already happened. Zero or more handlers may react.
pub trait Event: Request {}

/// Request category, used for selection-failure messages and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Exactly one handler, may publish events.
    Command,
    /// Exactly one handler, returns a result.
    Query,
    /// Any number of handlers.
    Event,
}

impl Category {
    /// Lowercase label, e.g. `"command"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Query => "query",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label used when a pipeline has no category, e.g. `"Cannot find a matching handler for Ping request"`.
#[must_use]
pub fn category_label(category: Option<Category>) -> &'static str {
    category.map_or("request", Category::as_str)
}

/// Simple (unqualified) type name of `T`, e.g. `PlaceOrder` for `shop::orders::PlaceOrder`.
///
/// Only a leading type path is shortened. Generic arguments keep their
/// qualified form, and types that do not start with a path (tuples, arrays,
/// slices, references) are returned exactly as [`std::any::type_name`] spells them.
#[must_use]
pub fn simple_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base_end = full
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .unwrap_or(full.len());
    match full[..base_end].rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

// ---------------------------------------------------------------------------
// EventEnvelope
// ---------------------------------------------------------------------------

/// A type-erased event waiting to be published.
///
/// Returned from [`Command::events`] so a command can declare events of
/// several different types.
pub struct EventEnvelope {
    event_type: &'static str,
    inner: Box<dyn PublishEvent>,
}

impl EventEnvelope {
    /// Wrap an event for later publication.
    #[must_use]
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            event_type: simple_type_name::<E>(),
            inner: Box::new(Pending(event)),
        }
    }

    /// Simple type name of the wrapped event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// Dispatch the wrapped event to every matching handler of `pipeline`.
    ///
    /// The event's handler outputs are discarded.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's dispatch error, typically
    /// [`DispatchError::EventHandlers`] when one or more handlers failed.
    pub fn publish(self, pipeline: &Pipeline) -> Result<(), DispatchError> {
        self.inner.publish(pipeline)
    }
}

impl fmt::Debug for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvelope")
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

trait PublishEvent: Send {
    fn publish(self: Box<Self>, pipeline: &Pipeline) -> Result<(), DispatchError>;
}

struct Pending<E>(E);

impl<E: Event> PublishEvent for Pending<E> {
    fn publish(self: Box<Self>, pipeline: &Pipeline) -> Result<(), DispatchError> {
        pipeline.submit(self.0).dispatch_all().map(|_| ())
    }
}

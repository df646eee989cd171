//! Handler abstraction and its type-erased registry entry.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::middleware::Reply;
use crate::request::{simple_type_name, Category, Command, Event, Query, Request};
use crate::DispatchError;

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// Business logic bound to one request type.
///
/// Handlers are registered once and shared by every dispatch, so they hold
/// no per-request state. Any state they do keep must be internally
/// synchronized.
pub trait Handler: Send + Sync {
    /// The request type this handler serves.
    type Request: Request;

    /// Name used in logs and error reports.
    fn name(&self) -> &'static str
    where
        Self: Sized,
    {
        simple_type_name::<Self>()
    }

    /// Runtime selection predicate. Matches every request unless overridden.
    fn matches(&self, _request: &Self::Request) -> bool {
        true
    }

    /// Handle the request.
    ///
    /// # Errors
    ///
    /// Whatever the handler fails with. The pipeline wraps it in
    /// `DispatchError::Execution`.
    fn handle(
        &self,
        request: &Self::Request,
    ) -> anyhow::Result<<Self::Request as Request>::Output>;
}

impl<H: Handler> Handler for Arc<H> {
    type Request = H::Request;

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn matches(&self, request: &Self::Request) -> bool {
        (**self).matches(request)
    }

    fn handle(
        &self,
        request: &Self::Request,
    ) -> anyhow::Result<<Self::Request as Request>::Output> {
        (**self).handle(request)
    }
}

// ---------------------------------------------------------------------------
// HandlerEntry
// ---------------------------------------------------------------------------

/// A handler erased to a common type so entries for different requests can
/// live in one snapshot.
///
/// Entries are built with [`HandlerEntry::command`], [`HandlerEntry::query`]
/// or [`HandlerEntry::event`], which record the category the bus checks at
/// construction, or with [`HandlerEntry::new`] for a category-less pipeline.
#[derive(Clone)]
pub struct HandlerEntry {
    request_type_id: TypeId,
    request_type: &'static str,
    handler_name: &'static str,
    category: Option<Category>,
    handler: Arc<dyn ErasedHandler>,
}

impl HandlerEntry {
    /// Entry without a category, accepted by any plain [`Pipeline`](crate::Pipeline).
    #[must_use]
    pub fn new<H>(handler: H) -> Self
    where
        H: Handler + 'static,
    {
        Self::build(handler, None)
    }

    /// Entry for a command handler.
    #[must_use]
    pub fn command<H>(handler: H) -> Self
    where
        H: Handler + 'static,
        H::Request: Command,
    {
        Self::build(handler, Some(Category::Command))
    }

    /// Entry for a query handler.
    #[must_use]
    pub fn query<H>(handler: H) -> Self
    where
        H: Handler + 'static,
        H::Request: Query,
    {
        Self::build(handler, Some(Category::Query))
    }

    /// Entry for an event handler.
    #[must_use]
    pub fn event<H>(handler: H) -> Self
    where
        H: Handler + 'static,
        H::Request: Event,
    {
        Self::build(handler, Some(Category::Event))
    }

    fn build<H>(handler: H, category: Option<Category>) -> Self
    where
        H: Handler + 'static,
    {
        Self {
            request_type_id: TypeId::of::<H::Request>(),
            request_type: simple_type_name::<H::Request>(),
            handler_name: handler.name(),
            category,
            handler: Arc::new(Typed(handler)),
        }
    }

    /// Simple type name of the handler, e.g. `"PlaceOrderHandler"`.
    #[must_use]
    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    /// Simple type name of the request this entry serves.
    #[must_use]
    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// Category the entry was registered under, if any.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        self.category
    }

    /// Whether this entry serves requests of type `R`.
    #[must_use]
    pub fn serves<R: Request>(&self) -> bool {
        self.request_type_id == TypeId::of::<R>()
    }

    pub(crate) fn matches<R: Request>(&self, request: &R) -> bool {
        self.serves::<R>() && self.handler.matches(request)
    }

    pub(crate) fn invoke(&self, request: &dyn Any) -> Result<Reply, DispatchError> {
        self.handler.handle(request)
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("handler", &self.handler_name)
            .field("request", &self.request_type)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Type erasure
// ---------------------------------------------------------------------------

trait ErasedHandler: Send + Sync {
    fn matches(&self, request: &dyn Any) -> bool;
    fn handle(&self, request: &dyn Any) -> Result<Reply, DispatchError>;
}

struct Typed<H>(H);

impl<H: Handler> ErasedHandler for Typed<H> {
    fn matches(&self, request: &dyn Any) -> bool {
        request
            .downcast_ref::<H::Request>()
            .is_some_and(|request| self.0.matches(request))
    }

    fn handle(&self, request: &dyn Any) -> Result<Reply, DispatchError> {
        let Some(request) = request.downcast_ref::<H::Request>() else {
            return Err(DispatchError::TypeMismatch {
                expected: simple_type_name::<H::Request>(),
            });
        };
        self.0
            .handle(request)
            .map(Reply::new)
            .map_err(DispatchError::Execution)
    }
}

//! Middleware abstraction and chain composition.
//!
//! A [`MiddlewareChain`] is built once from a snapshot of middleware and
//! wraps every handler invocation:
//!
//! ```text
//! order 1 -> order 2 -> ... -> terminal (handler.handle)
//! ```
//!
//! Each middleware gets a [`Next`] for the rest of the chain and may run
//! logic before it, after it, or skip it entirely.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::request::{simple_type_name, Category};
use crate::DispatchError;

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// Type-erased handler output travelling back up the chain.
pub struct Reply(Box<dyn Any + Send>);

impl Reply {
    /// Wrap a value. Middleware that replaces a reply must use the request's
    /// output type, or the caller sees [`DispatchError::TypeMismatch`].
    #[must_use]
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Borrow the value if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether the value is a `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Take the value out if it is a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::TypeMismatch`] if the reply holds another type.
    pub fn into_inner<T: 'static>(self) -> Result<T, DispatchError> {
        self.0
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| DispatchError::TypeMismatch {
                expected: simple_type_name::<T>(),
            })
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reply").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Context of one handler invocation, lent to every middleware in the chain.
#[derive(Clone, Copy)]
pub struct Dispatch<'a> {
    request: &'a (dyn Any + Send + Sync),
    request_type: &'static str,
    category: Option<Category>,
    handler: &'static str,
    dispatch_id: Uuid,
    pipeline: &'a str,
}

impl<'a> Dispatch<'a> {
    pub(crate) fn new(
        request: &'a (dyn Any + Send + Sync),
        request_type: &'static str,
        category: Option<Category>,
        handler: &'static str,
        dispatch_id: Uuid,
        pipeline: &'a str,
    ) -> Self {
        Self {
            request,
            request_type,
            category,
            handler,
            dispatch_id,
            pipeline,
        }
    }

    /// The request, if it is an `R`.
    #[must_use]
    pub fn request<R: 'static>(&self) -> Option<&'a R> {
        self.request.downcast_ref::<R>()
    }

    /// Simple type name of the request.
    #[must_use]
    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// Category of the pipeline running this dispatch.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        self.category
    }

    /// Name of the handler this invocation ends in.
    #[must_use]
    pub fn handler(&self) -> &'static str {
        self.handler
    }

    /// Identifier shared by every invocation of one submission.
    #[must_use]
    pub fn dispatch_id(&self) -> Uuid {
        self.dispatch_id
    }

    /// Label of the pipeline, e.g. `"command"`.
    #[must_use]
    pub fn pipeline(&self) -> &'a str {
        self.pipeline
    }

    pub(crate) fn erased_request(&self) -> &'a (dyn Any + Send + Sync) {
        self.request
    }
}

impl fmt::Debug for Dispatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("request_type", &self.request_type)
            .field("category", &self.category)
            .field("handler", &self.handler)
            .field("dispatch_id", &self.dispatch_id)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Middleware trait
// ---------------------------------------------------------------------------

/// Cross-cutting wrapper around handler invocation.
///
/// Middleware is shared by every dispatch on a bus, concurrently, so it is
/// either stateless or internally synchronized.
pub trait Middleware: Send + Sync {
    /// Relative position in the chain; lower runs first (outermost).
    fn order(&self) -> i32 {
        0
    }

    /// Wrap the rest of the chain.
    ///
    /// # Errors
    ///
    /// Whatever `next` returns, or a failure of the middleware's own logic
    /// (conventionally [`DispatchError::Execution`]).
    fn invoke(&self, dispatch: &Dispatch<'_>, next: Next<'_>) -> Result<Reply, DispatchError>;
}

/// Terminal step of a chain: the actual handler invocation.
pub type Terminal<'a> = dyn Fn(&Dispatch<'_>) -> Result<Reply, DispatchError> + 'a;

/// The remainder of a middleware chain, including its terminal step.
///
/// `Next` is `Copy`: a middleware may run it more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    terminal: &'a Terminal<'a>,
}

impl Next<'_> {
    /// Run the rest of the chain.
    ///
    /// # Errors
    ///
    /// Propagates the error of the next middleware or of the handler.
    pub fn run(self, dispatch: &Dispatch<'_>) -> Result<Reply, DispatchError> {
        match self.rest.split_first() {
            Some((head, rest)) => head.invoke(
                dispatch,
                Next {
                    rest,
                    terminal: self.terminal,
                },
            ),
            None => (self.terminal)(dispatch),
        }
    }

    /// Number of middleware still ahead in the chain.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.rest.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// MiddlewareChain
// ---------------------------------------------------------------------------

/// An ordered, immutable middleware snapshot.
#[derive(Clone)]
pub struct MiddlewareChain {
    layers: Arc<[Arc<dyn Middleware>]>,
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MiddlewareChain {
    /// Build a chain, ordered by ascending [`Middleware::order`].
    ///
    /// The sort is stable: middleware with equal order keep the order they
    /// were supplied in.
    #[must_use]
    pub fn new<I>(middleware: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        let mut layers: Vec<Arc<dyn Middleware>> = middleware.into_iter().collect();
        layers.sort_by_key(|layer| layer.order());
        Self {
            layers: layers.into(),
        }
    }

    /// Number of middleware in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the chain has no middleware.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Run `terminal` wrapped by every middleware in the chain.
    ///
    /// # Errors
    ///
    /// Propagates whatever the outermost middleware returns.
    pub fn run(
        &self,
        dispatch: &Dispatch<'_>,
        terminal: &Terminal<'_>,
    ) -> Result<Reply, DispatchError> {
        Next {
            rest: &self.layers,
            terminal,
        }
        .run(dispatch)
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.layers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

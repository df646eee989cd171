//! The generic dispatch pipeline shared by every bus.
//!
//! A [`Pipeline`] is built once from a [`PipelineConfig`]; each call to
//! [`Pipeline::submit`] creates a [`Submission`] that moves linearly through
//!
//! ```text
//! submit -> [validate] -> dispatch | dispatch_all
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::{ConfigError, EventFailures, HandlerFailure};
use crate::handler::HandlerEntry;
use crate::middleware::{Dispatch, Middleware, MiddlewareChain, Terminal};
use crate::request::{category_label, simple_type_name, Category, Request};
use crate::resolve::{resolve, HandlerSet};
use crate::validation::{only_one, FailureAction, ValidationResult};
use crate::DispatchError;

/// Lazily evaluated source of handler entries.
pub type HandlerSupplier = Box<dyn FnOnce() -> Vec<HandlerEntry>>;

/// Lazily evaluated source of middleware.
pub type MiddlewareSupplier = Box<dyn FnOnce() -> Vec<Arc<dyn Middleware>>>;

/// Cardinality predicate applied when a submission is dispatched without an
/// explicit `validate`.
pub type DefaultExpectation = fn(&HandlerSet<'_>) -> bool;

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Everything a pipeline is built from.
///
/// Suppliers are evaluated exactly once, in [`Pipeline::new`].
pub struct PipelineConfig {
    /// Label used in log fields and error messages.
    pub name: String,
    /// Category every handler entry must be registered under. `None` accepts
    /// any entry.
    pub category: Option<Category>,
    /// Required; [`Pipeline::new`] fails without it.
    pub handlers: Option<HandlerSupplier>,
    /// Optional; no middleware when unset.
    pub middlewares: Option<MiddlewareSupplier>,
    /// Default cardinality predicate. `None` accepts any number of handlers.
    pub expectation: Option<DefaultExpectation>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "pipeline".to_string(),
            category: None,
            handlers: None,
            middlewares: None,
            expectation: Some(only_one),
        }
    }
}

impl PipelineConfig {
    /// Config with the defaults: name `"pipeline"`, no category, `only_one`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label used in log fields and error messages.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Require every handler entry to be registered under `category`.
    #[must_use]
    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Set the handler supplier.
    #[must_use]
    pub fn handlers<F, I>(mut self, supplier: F) -> Self
    where
        F: FnOnce() -> I + 'static,
        I: IntoIterator<Item = HandlerEntry>,
    {
        self.handlers = Some(Box::new(move || supplier().into_iter().collect()));
        self
    }

    /// Set the middleware supplier. Order within the supplied sequence is the
    /// tie-break for middleware with equal [`Middleware::order`].
    #[must_use]
    pub fn middlewares<F, I>(mut self, supplier: F) -> Self
    where
        F: FnOnce() -> I + 'static,
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        self.middlewares = Some(Box::new(move || supplier().into_iter().collect()));
        self
    }

    /// Replace the default cardinality predicate. `None` accepts any number of handlers.
    #[must_use]
    pub fn expect(mut self, expectation: Option<DefaultExpectation>) -> Self {
        self.expectation = expectation;
        self
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("handlers", &self.handlers.is_some())
            .field("middlewares", &self.middlewares.is_some())
            .field("expectation", &self.expectation.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Immutable dispatch engine: a handler snapshot, a middleware chain, and a
/// default cardinality predicate.
///
/// `Pipeline` is `Send + Sync` and may be dispatched from many threads at
/// once. It never locks around handler or middleware calls.
pub struct Pipeline {
    name: String,
    category: Option<Category>,
    handlers: Vec<HandlerEntry>,
    chain: MiddlewareChain,
    expectation: Option<DefaultExpectation>,
}

impl Pipeline {
    /// Evaluate the suppliers and build the pipeline.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingHandlers`] if no handler supplier was set.
    /// - [`ConfigError::CategoryMismatch`] if the config has a category and an
    ///   entry was registered under a different one (or none).
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        let PipelineConfig {
            name,
            category,
            handlers,
            middlewares,
            expectation,
        } = config;

        let Some(handlers) = handlers else {
            return Err(ConfigError::MissingHandlers { pipeline: name });
        };
        let handlers = handlers();

        if let Some(expected) = category {
            if let Some(entry) = handlers.iter().find(|entry| entry.category() != Some(expected)) {
                return Err(ConfigError::CategoryMismatch {
                    pipeline: name,
                    handler: entry.handler_name(),
                    expected,
                    found: category_label(entry.category()),
                });
            }
        }

        let chain = MiddlewareChain::new(middlewares.map(|supply| supply()).unwrap_or_default());

        debug!(
            pipeline = %name,
            handlers = handlers.len(),
            middlewares = chain.len(),
            "pipeline built"
        );

        Ok(Self {
            name,
            category,
            handlers,
            chain,
            expectation,
        })
    }

    /// Pipeline with the given handlers, no middleware and the `only_one` default.
    ///
    /// # Errors
    ///
    /// Never fails for a category-less pipeline; the `Result` mirrors [`Pipeline::new`].
    pub fn with_handlers<I>(handlers: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = HandlerEntry> + 'static,
    {
        Self::new(PipelineConfig::new().handlers(move || handlers))
    }

    /// Label given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category every handler entry was checked against, if any.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        self.category
    }

    /// The registered handler snapshot, in registration order.
    #[must_use]
    pub fn handlers(&self) -> &[HandlerEntry] {
        &self.handlers
    }

    /// The ordered middleware chain.
    #[must_use]
    pub fn middleware(&self) -> &MiddlewareChain {
        &self.chain
    }

    /// Resolve the handlers matching `request` against this pipeline's snapshot.
    #[must_use]
    pub fn resolve<R: Request>(&self, request: &R) -> HandlerSet<'_> {
        resolve(&self.handlers, request)
    }

    /// Bind a request. Nothing is resolved or invoked yet.
    #[must_use]
    pub fn submit<R: Request>(&self, request: R) -> Submission<'_, R> {
        Submission {
            pipeline: self,
            request,
            dispatch_id: Uuid::new_v4(),
            resolved: None,
            verdict: None,
        }
    }

    /// Apply the explicit verdict, or the default predicate if there is none.
    fn check(&self, handlers: &HandlerSet<'_>, verdict: Option<bool>) -> Result<(), DispatchError> {
        match verdict {
            Some(true) => Ok(()),
            Some(false) => {
                debug!(request = handlers.request_type(), "validation policy rejected handler set");
                Err(DispatchError::ValidationFailed)
            }
            None => match self.expectation {
                Some(expected) if !expected(handlers) => {
                    if handlers.is_empty() {
                        Err(self.not_found(handlers.request_type()))
                    } else {
                        debug!(
                            request = handlers.request_type(),
                            handlers = ?handlers.handler_names(),
                            "default expectation rejected handler set"
                        );
                        Err(DispatchError::ValidationFailed)
                    }
                }
                _ => Ok(()),
            },
        }
    }

    fn not_found(&self, request_type: &'static str) -> DispatchError {
        debug!(pipeline = %self.name, request = request_type, "no matching handler");
        DispatchError::HandlerNotFound {
            request_type,
            category: self.category,
        }
    }

    /// Run one handler wrapped by the middleware chain.
    fn invoke<R: Request>(
        &self,
        entry: &HandlerEntry,
        request: &R,
        dispatch_id: Uuid,
    ) -> Result<R::Output, DispatchError> {
        let dispatch = Dispatch::new(
            request,
            simple_type_name::<R>(),
            self.category,
            entry.handler_name(),
            dispatch_id,
            &self.name,
        );
        let terminal: &Terminal<'_> = &|dispatch| entry.invoke(dispatch.erased_request());
        self.chain.run(&dispatch, terminal)?.into_inner::<R::Output>()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("handlers", &self.handlers)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// One submitted request on its way through a pipeline.
///
/// Consumed by [`dispatch`](Self::dispatch) or
/// [`dispatch_all`](Self::dispatch_all).
pub struct Submission<'p, R: Request> {
    pipeline: &'p Pipeline,
    request: R,
    dispatch_id: Uuid,
    resolved: Option<HandlerSet<'p>>,
    verdict: Option<bool>,
}

impl<'p, R: Request> Submission<'p, R> {
    /// The submitted request.
    #[must_use]
    pub fn request(&self) -> &R {
        &self.request
    }

    /// Identifier shared by every handler invocation of this submission.
    #[must_use]
    pub fn dispatch_id(&self) -> Uuid {
        self.dispatch_id
    }

    /// Run a validation policy against the handlers matching this request.
    ///
    /// The resolved set is kept and reused by the dispatch. A silent failure
    /// is remembered and raised as [`DispatchError::ValidationFailed`] on
    /// dispatch.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Rejected`] carrying the policy's own error when it
    /// chose to raise.
    pub fn validate<F>(mut self, policy: F) -> Result<Self, DispatchError>
    where
        F: FnOnce(&HandlerSet<'p>) -> ValidationResult,
    {
        let handlers = match self.resolved.take() {
            Some(handlers) => handlers,
            None => self.pipeline.resolve(&self.request),
        };
        let passed = match policy(&handlers) {
            ValidationResult::Passed => true,
            ValidationResult::Failed(FailureAction::Silent) => false,
            ValidationResult::Failed(FailureAction::Raise(error)) => {
                debug!(
                    pipeline = %self.pipeline.name,
                    request = handlers.request_type(),
                    error = %error,
                    "validation policy raised"
                );
                return Err(DispatchError::Rejected(error));
            }
        };
        self.verdict = Some(self.verdict.unwrap_or(true) && passed);
        self.resolved = Some(handlers);
        Ok(self)
    }

    /// Invoke the single selected handler and return its output.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandlerNotFound`] when nothing matched.
    /// - [`DispatchError::ValidationFailed`] when the handler set failed the
    ///   active predicate.
    /// - Any error raised by the middleware chain or the handler.
    pub fn dispatch(self) -> Result<R::Output, DispatchError> {
        self.dispatch_retaining().1
    }

    /// Like [`dispatch`](Self::dispatch), also handing the request back.
    pub fn dispatch_retaining(self) -> (R, Result<R::Output, DispatchError>) {
        let Self {
            pipeline,
            request,
            dispatch_id,
            resolved,
            verdict,
        } = self;
        let span = dispatch_span::<R>(pipeline, dispatch_id);
        let _entered = span.enter();

        let handlers = resolved.unwrap_or_else(|| pipeline.resolve(&request));
        let result = pipeline.check(&handlers, verdict).and_then(|()| {
            let Some(entry) = handlers.first() else {
                return Err(pipeline.not_found(handlers.request_type()));
            };
            pipeline.invoke(entry, &request, dispatch_id)
        });
        (request, result)
    }

    /// Invoke every selected handler, in resolution order, each wrapped by
    /// the middleware chain independently.
    ///
    /// A failing handler never stops the others.
    ///
    /// # Errors
    ///
    /// - Selection errors as for [`dispatch`](Self::dispatch).
    /// - [`DispatchError::EventHandlers`] listing every failed handler, after
    ///   all handlers have run.
    pub fn dispatch_all(self) -> Result<Vec<R::Output>, DispatchError> {
        let Self {
            pipeline,
            request,
            dispatch_id,
            resolved,
            verdict,
        } = self;
        let span = dispatch_span::<R>(pipeline, dispatch_id);
        let _entered = span.enter();

        let handlers = resolved.unwrap_or_else(|| pipeline.resolve(&request));
        pipeline.check(&handlers, verdict)?;

        let mut outputs = Vec::with_capacity(handlers.len());
        let mut failures = Vec::new();
        for entry in handlers.iter() {
            match pipeline.invoke(entry, &request, dispatch_id) {
                Ok(output) => outputs.push(output),
                Err(error) => {
                    tracing::warn!(
                        pipeline = %pipeline.name,
                        handler = entry.handler_name(),
                        error = %error,
                        "handler failed"
                    );
                    failures.push(HandlerFailure {
                        handler: entry.handler_name(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(outputs)
        } else {
            Err(DispatchError::EventHandlers(EventFailures::new(
                handlers.request_type(),
                handlers.len(),
                failures,
            )))
        }
    }
}

impl<R: Request + fmt::Debug> fmt::Debug for Submission<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("pipeline", &self.pipeline.name)
            .field("request", &self.request)
            .field("dispatch_id", &self.dispatch_id)
            .field("validated", &self.verdict)
            .finish_non_exhaustive()
    }
}

fn dispatch_span<R: Request>(pipeline: &Pipeline, dispatch_id: Uuid) -> tracing::Span {
    tracing::debug_span!(
        "dispatch",
        pipeline = %pipeline.name,
        request = simple_type_name::<R>(),
        category = category_label(pipeline.category),
        dispatch_id = %dispatch_id,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

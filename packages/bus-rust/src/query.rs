//! Query bus: exactly one handler per query, result returned.

use switchyard_core::validation::only_one;
use switchyard_core::{Category, ConfigError, DispatchError, Pipeline, Query, Submission};

use crate::config::BusConfig;

/// Dispatches queries to their single matching handler.
#[derive(Debug)]
pub struct QueryBus {
    pipeline: Pipeline,
}

impl QueryBus {
    /// Build a query bus. The default expectation is exactly one handler.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingHandlers`] without a handler supplier.
    /// - [`ConfigError::CategoryMismatch`] for a non-query handler entry.
    /// - [`ConfigError::Unsupported`] if an event bus was configured.
    pub fn new(config: BusConfig) -> Result<Self, ConfigError> {
        let (config, events) = config.into_parts(Category::Query, Some(only_one));
        if events.is_some() {
            return Err(ConfigError::Unsupported {
                pipeline: config.name,
                option: "event_bus",
            });
        }
        Ok(Self {
            pipeline: Pipeline::new(config)?,
        })
    }

    /// The underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Bind a query. Nothing is resolved or invoked yet.
    #[must_use]
    pub fn submit<Q: Query>(&self, query: Q) -> Submission<'_, Q> {
        self.pipeline.submit(query)
    }

    /// Submit and dispatch `query` with the default expectation.
    ///
    /// # Errors
    ///
    /// As for [`Submission::dispatch`].
    pub fn execute<Q: Query>(&self, query: Q) -> Result<Q::Output, DispatchError> {
        self.submit(query).dispatch()
    }
}

//! Command bus: exactly one handler per command, then the command's events
//! are published on the attached event bus.

use switchyard_core::validation::only_one;
use switchyard_core::{
    Category, Command, ConfigError, DispatchError, HandlerSet, Pipeline, Submission,
    ValidationResult,
};
use tracing::{debug, error};

use crate::config::BusConfig;
use crate::event::EventBus;

// ---------------------------------------------------------------------------
// CommandBus
// ---------------------------------------------------------------------------

/// Dispatches commands and publishes the events they declare.
#[derive(Debug)]
pub struct CommandBus {
    pipeline: Pipeline,
    events: EventBus,
}

impl CommandBus {
    /// Build a command bus. The default expectation is exactly one handler.
    ///
    /// Without a configured event bus, an empty one is attached and declared
    /// events are dropped.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingHandlers`] without a handler supplier.
    /// - [`ConfigError::CategoryMismatch`] for a non-command handler entry.
    pub fn new(config: BusConfig) -> Result<Self, ConfigError> {
        let (config, events) = config.into_parts(Category::Command, Some(only_one));
        let events = match events {
            Some(events) => events,
            None => EventBus::new(
                BusConfig::new()
                    .named(format!("{}.events", config.name))
                    .handlers(Vec::<switchyard_core::HandlerEntry>::new),
            )?,
        };
        Ok(Self {
            pipeline: Pipeline::new(config)?,
            events,
        })
    }

    /// The underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Event bus receiving the events of completed commands.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Bind a command. Nothing is resolved or invoked yet.
    #[must_use]
    pub fn submit<C: Command>(&self, command: C) -> CommandSubmission<'_, C> {
        CommandSubmission {
            bus: self,
            inner: self.pipeline.submit(command),
        }
    }

    /// Submit and dispatch `command` with the default expectation.
    ///
    /// # Errors
    ///
    /// As for [`CommandSubmission::dispatch`].
    pub fn execute<C: Command>(&self, command: C) -> Result<C::Output, DispatchError> {
        self.submit(command).dispatch()
    }
}

// ---------------------------------------------------------------------------
// CommandSubmission
// ---------------------------------------------------------------------------

/// A submitted command.
#[derive(Debug)]
pub struct CommandSubmission<'b, C: Command> {
    bus: &'b CommandBus,
    inner: Submission<'b, C>,
}

impl<'b, C: Command> CommandSubmission<'b, C> {
    /// Apply a validation policy.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Rejected`] when the policy raised.
    pub fn validate<F>(self, policy: F) -> Result<Self, DispatchError>
    where
        F: FnOnce(&HandlerSet<'b>) -> ValidationResult,
    {
        Ok(Self {
            bus: self.bus,
            inner: self.inner.validate(policy)?,
        })
    }

    /// Invoke the command handler, then publish the command's events.
    ///
    /// A failed publication is logged and does not affect the returned output.
    ///
    /// # Errors
    ///
    /// Selection errors and handler failures, as for [`Submission::dispatch`].
    /// No event is published when the command failed.
    pub fn dispatch(self) -> Result<C::Output, DispatchError> {
        let outcome = self.dispatch_reporting()?;
        for failure in &outcome.failures {
            error!(
                event = failure.event,
                error = %failure.error,
                "event publication failed"
            );
        }
        Ok(outcome.output)
    }

    /// Like [`dispatch`](Self::dispatch), returning publication failures
    /// instead of logging them.
    ///
    /// # Errors
    ///
    /// As for [`dispatch`](Self::dispatch).
    pub fn dispatch_reporting(self) -> Result<CommandOutcome<C::Output>, DispatchError> {
        let Self { bus, inner } = self;
        let (command, result) = inner.dispatch_retaining();
        let output = result?;

        let events = command.events(&output);
        let mut published = 0;
        let mut failures = Vec::new();
        for envelope in events {
            let event = envelope.event_type();
            match bus.events.publish_envelope(envelope) {
                Ok(()) => published += 1,
                Err(error) => failures.push(PublicationFailure { event, error }),
            }
        }
        debug!(
            pipeline = bus.pipeline.name(),
            published,
            failed = failures.len(),
            "command events published"
        );

        Ok(CommandOutcome {
            output,
            published,
            failures,
        })
    }
}

// ---------------------------------------------------------------------------
// CommandOutcome
// ---------------------------------------------------------------------------

/// Output of a command together with the fate of its events.
#[derive(Debug)]
pub struct CommandOutcome<T> {
    /// The command handler's output.
    pub output: T,
    /// Events published without error.
    pub published: usize,
    /// Events whose publication failed, in declaration order.
    pub failures: Vec<PublicationFailure>,
}

impl<T> CommandOutcome<T> {
    /// Whether every declared event was published.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One event whose publication failed.
#[derive(Debug)]
pub struct PublicationFailure {
    /// Simple type name of the event.
    pub event: &'static str,
    /// Why the event bus rejected or failed the event.
    pub error: DispatchError,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use switchyard_core::{Event, EventEnvelope, Handler, HandlerEntry, Request};

    use super::*;

    // -- requests --

    #[derive(Debug)]
    struct PlaceOrder {
        sku: &'static str,
        quantity: u32,
    }

    impl Request for PlaceOrder {
        type Output = u64;
    }

    impl Command for PlaceOrder {
        fn events(&self, order_id: &u64) -> Vec<EventEnvelope> {
            vec![
                EventEnvelope::new(OrderPlaced {
                    order_id: *order_id,
                    quantity: self.quantity,
                }),
                EventEnvelope::new(StockReserved { sku: self.sku }),
            ]
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct OrderPlaced {
        order_id: u64,
        quantity: u32,
    }

    impl Request for OrderPlaced {
        type Output = ();
    }

    impl Event for OrderPlaced {}

    #[derive(Debug, Clone, PartialEq)]
    struct StockReserved {
        sku: &'static str,
    }

    impl Request for StockReserved {
        type Output = ();
    }

    impl Event for StockReserved {}

    // -- handlers --

    struct PlaceOrderHandler;

    impl Handler for PlaceOrderHandler {
        type Request = PlaceOrder;

        fn handle(&self, command: &PlaceOrder) -> anyhow::Result<u64> {
            if command.quantity == 0 {
                anyhow::bail!("quantity must be positive");
            }
            Ok(1000 + u64::from(command.quantity))
        }
    }

    #[derive(Default)]
    struct OrderLog {
        placed: Mutex<Vec<OrderPlaced>>,
    }

    impl Handler for OrderLog {
        type Request = OrderPlaced;

        fn handle(&self, event: &OrderPlaced) -> anyhow::Result<()> {
            self.placed.lock().push(event.clone());
            Ok(())
        }
    }

    struct ReservationFails;

    impl Handler for ReservationFails {
        type Request = StockReserved;

        fn handle(&self, event: &StockReserved) -> anyhow::Result<()> {
            anyhow::bail!("no stock for {}", event.sku)
        }
    }

    fn event_bus(entries: Vec<HandlerEntry>) -> EventBus {
        EventBus::new(BusConfig::new().handlers(move || entries)).unwrap()
    }

    fn command_bus(events: EventBus) -> CommandBus {
        CommandBus::new(
            BusConfig::new()
                .handlers(|| [HandlerEntry::command(PlaceOrderHandler)])
                .event_bus(events),
        )
        .unwrap()
    }

    #[test]
    fn returns_output_and_publishes_declared_events() {
        let log = Arc::new(OrderLog::default());
        let bus = command_bus(event_bus(vec![HandlerEntry::event(log.clone())]));

        let order_id = bus
            .execute(PlaceOrder {
                sku: "apple",
                quantity: 2,
            })
            .unwrap();

        assert_eq!(order_id, 1002);
        assert_eq!(
            *log.placed.lock(),
            vec![OrderPlaced {
                order_id: 1002,
                quantity: 2
            }]
        );
    }

    #[test]
    fn failed_event_is_reported_without_losing_output() {
        let log = Arc::new(OrderLog::default());
        let bus = command_bus(event_bus(vec![
            HandlerEntry::event(log.clone()),
            HandlerEntry::event(ReservationFails),
        ]));

        let outcome = bus
            .submit(PlaceOrder {
                sku: "pear",
                quantity: 1,
            })
            .dispatch_reporting()
            .unwrap();

        assert_eq!(outcome.output, 1001);
        assert_eq!(outcome.published, 1);
        assert!(!outcome.is_clean());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].event, "StockReserved");
        assert_eq!(
            outcome.failures[0].error.to_string(),
            "1 of 1 handlers failed for StockReserved; ReservationFails: no stock for pear"
        );
        assert_eq!(log.placed.lock().len(), 1);
    }

    #[test]
    fn failed_command_publishes_nothing() {
        let log = Arc::new(OrderLog::default());
        let bus = command_bus(event_bus(vec![HandlerEntry::event(log.clone())]));

        let err = bus
            .execute(PlaceOrder {
                sku: "apple",
                quantity: 0,
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "quantity must be positive");
        assert!(log.placed.lock().is_empty());
    }

    #[test]
    fn without_event_bus_events_are_dropped() {
        let bus = CommandBus::new(
            BusConfig::new().handlers(|| [HandlerEntry::command(PlaceOrderHandler)]),
        )
        .unwrap();
        assert_eq!(bus.event_bus().pipeline().name(), "command.events");

        let outcome = bus
            .submit(PlaceOrder {
                sku: "apple",
                quantity: 3,
            })
            .dispatch_reporting()
            .unwrap();
        assert_eq!(outcome.output, 1003);
        assert_eq!(outcome.published, 2);
        assert!(outcome.is_clean());
    }

    #[test]
    fn not_found_names_the_command() {
        let bus = CommandBus::new(BusConfig::new().handlers(Vec::<HandlerEntry>::new)).unwrap();
        let err = bus
            .execute(PlaceOrder {
                sku: "apple",
                quantity: 1,
            })
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot find a matching handler for PlaceOrder command"
        );
    }

    #[test]
    fn silent_validation_failure_blocks_dispatch() {
        let log = Arc::new(OrderLog::default());
        let bus = command_bus(event_bus(vec![HandlerEntry::event(log.clone())]));

        let err = bus
            .submit(PlaceOrder {
                sku: "apple",
                quantity: 1,
            })
            .validate(|handlers| {
                switchyard_core::GenericValidation::of(handlers)
                    .expected(switchyard_core::validation::exactly(2))
                    .is_valid()
            })
            .unwrap()
            .dispatch()
            .unwrap_err();

        assert!(matches!(err, DispatchError::ValidationFailed));
        assert!(log.placed.lock().is_empty());
    }

    #[test]
    fn rejects_event_handlers() {
        let err = CommandBus::new(
            BusConfig::new().handlers(|| [HandlerEntry::event(OrderLog::default())]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::CategoryMismatch {
                expected: Category::Command,
                found: "event",
                ..
            }
        ));
    }
}

//! Event bus: zero or more handlers per event, all invoked.

use switchyard_core::{
    Category, ConfigError, DispatchError, Event, EventEnvelope, HandlerSet, Pipeline,
    Submission, ValidationResult,
};

use crate::config::BusConfig;

/// Publishes events to every matching handler.
///
/// Zero matching handlers is a no-op. A failing handler never prevents the
/// remaining handlers from running; every failure is reported together in
/// [`DispatchError::EventHandlers`] once all of them have run.
#[derive(Debug)]
pub struct EventBus {
    pipeline: Pipeline,
}

impl EventBus {
    /// Build an event bus.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingHandlers`] without a handler supplier.
    /// - [`ConfigError::CategoryMismatch`] for a non-event handler entry.
    /// - [`ConfigError::Unsupported`] if an event bus was nested in the config.
    pub fn new(config: BusConfig) -> Result<Self, ConfigError> {
        let (config, nested) = config.into_parts(Category::Event, None);
        if nested.is_some() {
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

    /// Bind an event. Nothing is resolved or invoked yet.
    #[must_use]
    pub fn submit<E: Event>(&self, event: E) -> EventSubmission<'_, E> {
        EventSubmission {
            inner: self.pipeline.submit(event),
        }
    }

    /// Submit and dispatch `event` with no explicit validation.
    ///
    /// # Errors
    ///
    /// [`DispatchError::EventHandlers`] if any handler failed.
    pub fn publish<E: Event>(&self, event: E) -> Result<(), DispatchError> {
        self.submit(event).dispatch()
    }

    /// Publish a type-erased event, such as one declared by a command.
    ///
    /// # Errors
    ///
    /// [`DispatchError::EventHandlers`] if any handler failed.
    pub fn publish_envelope(&self, envelope: EventEnvelope) -> Result<(), DispatchError> {
        envelope.publish(&self.pipeline)
    }
}

/// A submitted event.
#[derive(Debug)]
pub struct EventSubmission<'b, E: Event> {
    inner: Submission<'b, E>,
}

impl<'b, E: Event> EventSubmission<'b, E> {
    /// Apply a validation policy, e.g. to require at least one subscriber.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Rejected`] when the policy raised.
    pub fn validate<F>(self, policy: F) -> Result<Self, DispatchError>
    where
        F: FnOnce(&HandlerSet<'b>) -> ValidationResult,
    {
        Ok(Self {
            inner: self.inner.validate(policy)?,
        })
    }

    /// Invoke every matching handler, discarding their outputs.
    ///
    /// # Errors
    ///
    /// [`DispatchError::ValidationFailed`] after a failed silent validation,
    /// or [`DispatchError::EventHandlers`] if any handler failed.
    pub fn dispatch(self) -> Result<(), DispatchError> {
        self.inner.dispatch_all().map(|_| ())
    }

    /// Invoke every matching handler and return their outputs in resolution order.
    ///
    /// # Errors
    ///
    /// As for [`dispatch`](Self::dispatch).
    pub fn dispatch_collect(self) -> Result<Vec<E::Output>, DispatchError> {
        self.inner.dispatch_all()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use proptest::prelude::*;
    use switchyard_core::validation::not_empty;
    use switchyard_core::{GenericValidation, Handler, HandlerEntry, Request};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct OrderPlaced {
        order_id: u64,
    }

    impl Request for OrderPlaced {
        type Output = &'static str;
    }

    impl Event for OrderPlaced {}

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<OrderPlaced>>,
    }

    impl Handler for Recorder {
        type Request = OrderPlaced;

        fn handle(&self, event: &OrderPlaced) -> anyhow::Result<&'static str> {
            self.seen.lock().push(event.clone());
            Ok("recorded")
        }
    }

    struct Broken;

    impl Handler for Broken {
        type Request = OrderPlaced;

        fn handle(&self, _: &OrderPlaced) -> anyhow::Result<&'static str> {
            anyhow::bail!("mailer offline")
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("nobody listens to {0}")]
    struct NoSubscribers(&'static str);

    fn bus(entries: Vec<HandlerEntry>) -> EventBus {
        EventBus::new(BusConfig::new().handlers(move || entries)).unwrap()
    }

    #[test]
    fn no_subscribers_is_a_no_op() {
        let bus = bus(Vec::new());
        bus.publish(OrderPlaced { order_id: 1 }).unwrap();
    }

    #[test]
    fn every_subscriber_is_invoked() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let bus = bus(vec![
            HandlerEntry::event(first.clone()),
            HandlerEntry::event(second.clone()),
        ]);

        let outputs = bus
            .submit(OrderPlaced { order_id: 7 })
            .dispatch_collect()
            .unwrap();

        assert_eq!(outputs, vec!["recorded", "recorded"]);
        assert_eq!(*first.seen.lock(), vec![OrderPlaced { order_id: 7 }]);
        assert_eq!(*second.seen.lock(), vec![OrderPlaced { order_id: 7 }]);
    }

    #[test]
    fn failing_subscriber_does_not_starve_the_others() {
        let survivor = Arc::new(Recorder::default());
        let bus = bus(vec![
            HandlerEntry::event(Broken),
            HandlerEntry::event(survivor.clone()),
        ]);

        let err = bus.publish(OrderPlaced { order_id: 3 }).unwrap_err();

        assert_eq!(*survivor.seen.lock(), vec![OrderPlaced { order_id: 3 }]);
        let DispatchError::EventHandlers(failures) = &err else {
            panic!("expected EventHandlers, got {err:?}");
        };
        assert_eq!(failures.failures().len(), 1);
        assert_eq!(failures.failures()[0].handler, "Broken");
        assert_eq!(
            err.to_string(),
            "1 of 2 handlers failed for OrderPlaced; Broken: mailer offline"
        );
    }

    #[test]
    fn explicit_validation_can_require_a_subscriber() {
        let bus = bus(Vec::new());
        let err = bus
            .submit(OrderPlaced { order_id: 1 })
            .validate(|handlers| {
                GenericValidation::of(handlers)
                    .expected(not_empty)
                    .or_raise(|h| NoSubscribers(h.request_type()))
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "nobody listens to OrderPlaced");
    }

    #[test]
    fn envelopes_reach_typed_subscribers() {
        let recorder = Arc::new(Recorder::default());
        let bus = bus(vec![HandlerEntry::event(recorder.clone())]);

        let envelope = EventEnvelope::new(OrderPlaced { order_id: 11 });
        assert_eq!(envelope.event_type(), "OrderPlaced");
        bus.publish_envelope(envelope).unwrap();

        assert_eq!(*recorder.seen.lock(), vec![OrderPlaced { order_id: 11 }]);
    }

    #[test]
    fn nested_event_bus_is_rejected() {
        let inner = bus(Vec::new());
        let err = EventBus::new(
            BusConfig::new()
                .handlers(Vec::<HandlerEntry>::new)
                .event_bus(inner),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Unsupported { option: "event_bus", .. }));
    }

    proptest! {
        #[test]
        fn every_subscriber_runs_whatever_fails(failing in proptest::collection::vec(any::<bool>(), 0..8)) {
            let recorders: Vec<Arc<Recorder>> =
                failing.iter().map(|_| Arc::new(Recorder::default())).collect();
            let entries: Vec<HandlerEntry> = failing
                .iter()
                .zip(&recorders)
                .flat_map(|(fails, recorder)| {
                    let mut pair = vec![HandlerEntry::event(recorder.clone())];
                    if *fails {
                        pair.push(HandlerEntry::event(Broken));
                    }
                    pair
                })
                .collect();
            let invoked = entries.len();
            let bus = bus(entries);

            let result = bus.publish(OrderPlaced { order_id: 9 });

            for recorder in &recorders {
                prop_assert_eq!(recorder.seen.lock().len(), 1);
            }
            let expected_failures = failing.iter().filter(|fails| **fails).count();
            match result {
                Ok(()) => prop_assert_eq!(expected_failures, 0),
                Err(DispatchError::EventHandlers(failures)) => {
                    prop_assert_eq!(failures.failures().len(), expected_failures);
                    prop_assert_eq!(failures.invoked(), invoked);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
    }
}

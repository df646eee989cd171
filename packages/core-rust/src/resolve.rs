//! Handler resolution: filter a registered snapshot down to the handlers that
//! match one request instance.

use crate::handler::HandlerEntry;
use crate::request::{simple_type_name, Request};

/// The handlers that matched one request, in registration order.
#[derive(Debug, Clone)]
pub struct HandlerSet<'a> {
    request_type: &'static str,
    entries: Vec<&'a HandlerEntry>,
}

impl<'a> HandlerSet<'a> {
    /// Simple type name of the request this set was resolved for.
    #[must_use]
    pub fn request_type(&self) -> &'static str {
        self.request_type
    }

    /// Number of matching handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First matching handler, the one a single-handler dispatch invokes.
    #[must_use]
    pub fn first(&self) -> Option<&'a HandlerEntry> {
        self.entries.first().copied()
    }

    /// Matching entries, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &'a HandlerEntry> + '_ {
        self.entries.iter().copied()
    }

    /// Names of the matched handlers, e.g. for an ambiguity report.
    #[must_use]
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.handler_name()).collect()
    }
}

/// Keep the entries that serve `R` and whose `matches` accepts `request`.
///
/// Pure: no entry is mutated and the result depends only on the snapshot and
/// the request.
pub fn resolve<'a, R: Request>(entries: &'a [HandlerEntry], request: &R) -> HandlerSet<'a> {
    let matched: Vec<&HandlerEntry> = entries
        .iter()
        .filter(|entry| entry.matches(request))
        .collect();
    let request_type = simple_type_name::<R>();
    tracing::trace!(
        request = request_type,
        registered = entries.len(),
        matched = matched.len(),
        "resolved handlers"
    );
    HandlerSet {
        request_type,
        entries: matched,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::handler::Handler;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(String);

    impl Request for Ping {
        type Output = String;
    }

    struct Pong;

    impl Request for Pong {
        type Output = ();
    }

    /// Matches pings whose message equals `word`, counting `matches` calls.
    struct WordHandler {
        word: &'static str,
        checks: AtomicUsize,
    }

    impl WordHandler {
        fn new(word: &'static str) -> Arc<Self> {
            Arc::new(Self {
                word,
                checks: AtomicUsize::new(0),
            })
        }
    }

    impl Handler for WordHandler {
        type Request = Ping;

        fn matches(&self, request: &Ping) -> bool {
            self.checks.fetch_add(1, Ordering::Relaxed);
            request.0 == self.word
        }

        fn handle(&self, request: &Ping) -> anyhow::Result<String> {
            Ok(request.0.clone())
        }
    }

    struct Everyone;

    impl Handler for Everyone {
        type Request = Ping;

        fn handle(&self, _: &Ping) -> anyhow::Result<String> {
            Ok("everyone".to_string())
        }
    }

    struct PongHandler;

    impl Handler for PongHandler {
        type Request = Pong;

        fn handle(&self, _: &Pong) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn keeps_only_matching_handlers_in_registration_order() {
        let entries = vec![
            HandlerEntry::new(Everyone),
            HandlerEntry::new(WordHandler::new("bye")),
            HandlerEntry::new(PongHandler),
            HandlerEntry::new(WordHandler::new("hi")),
        ];

        let set = resolve(&entries, &Ping("hi".to_string()));
        assert_eq!(set.request_type(), "Ping");
        assert_eq!(set.handler_names(), vec!["Everyone", "WordHandler"]);
        assert_eq!(set.first().map(HandlerEntry::handler_name), Some("Everyone"));
    }

    #[test]
    fn other_request_types_are_never_asked() {
        let hi = WordHandler::new("hi");
        let entries = vec![HandlerEntry::new(hi.clone()), HandlerEntry::new(PongHandler)];

        let set = resolve(&entries, &Pong);
        assert_eq!(set.handler_names(), vec!["PongHandler"]);
        assert_eq!(hi.checks.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn empty_snapshot_resolves_to_empty_set() {
        let set = resolve::<Ping>(&[], &Ping("hi".to_string()));
        assert!(set.is_empty());
        assert!(set.first().is_none());
    }

    proptest! {
        /// Resolution is a pure filter: it keeps exactly the matching words, in order.
        #[test]
        fn resolution_is_an_ordered_filter(
            words in proptest::collection::vec(prop_oneof![Just("hi"), Just("bye"), Just("yo")], 0..10),
            sent in prop_oneof![Just("hi"), Just("bye"), Just("yo")],
        ) {
            let entries: Vec<HandlerEntry> = words
                .iter()
                .map(|&word| HandlerEntry::new(WordHandler::new(word)))
                .collect();
            let request = Ping(sent.to_string());

            let first = resolve(&entries, &request);
            let second = resolve(&entries, &request);
            let expected = words.iter().filter(|word| **word == sent).count();

            prop_assert_eq!(first.len(), expected);
            prop_assert_eq!(first.handler_names(), second.handler_names());
            for (a, b) in first.iter().zip(second.iter()) {
                prop_assert!(std::ptr::eq(a, b));
            }
        }
    }
}

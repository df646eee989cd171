//! Handler-selection validation: cardinality predicates and failure policies.
//!
//! ```rust,ignore
//! pipeline
//!     .submit(Ping("hi".into()))
//!     .validate(|handlers| {
//!         GenericValidation::of(handlers)
//!             .expected(not_empty)
//!             .or_raise(|_| NoPingHandler)
//!     })?
//!     .dispatch()?;
//! ```

use crate::resolve::HandlerSet;

/// Outcome of a validation policy.
#[derive(Debug)]
pub enum ValidationResult {
    /// The handler set satisfied the predicate.
    Passed,
    /// The handler set violated the predicate.
    Failed(FailureAction),
}

impl ValidationResult {
    /// Whether the policy passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// What a failed validation does.
#[derive(Debug)]
pub enum FailureAction {
    /// Mark the submission invalid; dispatching it raises `ValidationFailed`.
    Silent,
    /// Fail the submission with this error immediately.
    Raise(anyhow::Error),
}

// ---------------------------------------------------------------------------
// Fluent validation
// ---------------------------------------------------------------------------

/// Entry point of a validation policy over a resolved handler set.
#[derive(Debug, Clone, Copy)]
pub struct GenericValidation<'s, 'h> {
    handlers: &'s HandlerSet<'h>,
}

impl<'s, 'h> GenericValidation<'s, 'h> {
    /// Start a policy over `handlers`.
    #[must_use]
    pub fn of(handlers: &'s HandlerSet<'h>) -> Self {
        Self { handlers }
    }

    /// Evaluate a cardinality predicate against the handler set.
    #[must_use]
    pub fn expected<P>(self, predicate: P) -> Expectation<'s, 'h>
    where
        P: FnOnce(&HandlerSet<'h>) -> bool,
    {
        Expectation {
            handlers: self.handlers,
            satisfied: predicate(self.handlers),
        }
    }
}

/// An evaluated predicate, waiting for its failure policy.
#[derive(Debug, Clone, Copy)]
pub struct Expectation<'s, 'h> {
    handlers: &'s HandlerSet<'h>,
    satisfied: bool,
}

impl<'h> Expectation<'_, 'h> {
    /// Silent policy: report the outcome and let dispatch decide.
    #[must_use]
    pub fn is_valid(self) -> ValidationResult {
        if self.satisfied {
            ValidationResult::Passed
        } else {
            ValidationResult::Failed(FailureAction::Silent)
        }
    }

    /// Custom-raise policy: on failure, build the error the caller will see.
    ///
    /// The factory only runs when the predicate failed.
    #[must_use]
    pub fn or_raise<E, F>(self, factory: F) -> ValidationResult
    where
        F: FnOnce(&HandlerSet<'h>) -> E,
        E: Into<anyhow::Error>,
    {
        if self.satisfied {
            ValidationResult::Passed
        } else {
            ValidationResult::Failed(FailureAction::Raise(factory(self.handlers).into()))
        }
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Exactly one handler matched.
#[must_use]
pub fn only_one(handlers: &HandlerSet<'_>) -> bool {
    handlers.len() == 1
}

/// At least one handler matched.
#[must_use]
pub fn not_empty(handlers: &HandlerSet<'_>) -> bool {
    !handlers.is_empty()
}

/// Exactly `count` handlers matched.
#[must_use]
pub fn exactly(count: usize) -> impl Fn(&HandlerSet<'_>) -> bool + Copy {
    move |handlers: &HandlerSet<'_>| handlers.len() == count
}

/// At least `count` handlers matched.
#[must_use]
pub fn at_least(count: usize) -> impl Fn(&HandlerSet<'_>) -> bool + Copy {
    move |handlers: &HandlerSet<'_>| handlers.len() >= count
}

/// At most `count` handlers matched.
#[must_use]
pub fn at_most(count: usize) -> impl Fn(&HandlerSet<'_>) -> bool + Copy {
    move |handlers: &HandlerSet<'_>| handlers.len() <= count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Handler, HandlerEntry};
    use crate::request::Request;
    use crate::resolve::resolve;

    struct Ping;

    impl Request for Ping {
        type Output = &'static str;
    }

    struct Pong1;

    impl Handler for Pong1 {
        type Request = Ping;

        fn handle(&self, _: &Ping) -> anyhow::Result<&'static str> {
            Ok("Pong 1")
        }
    }

    struct Pong2;

    impl Handler for Pong2 {
        type Request = Ping;

        fn handle(&self, _: &Ping) -> anyhow::Result<&'static str> {
            Ok("Pong 2")
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("Validator exception")]
    struct ValidatorError;

    fn entries(count: usize) -> Vec<HandlerEntry> {
        [HandlerEntry::new(Pong1), HandlerEntry::new(Pong2)]
            .into_iter()
            .take(count)
            .collect()
    }

    #[test]
    fn builtin_predicates() {
        for (count, one, some) in [(0, false, false), (1, true, true), (2, false, true)] {
            let snapshot = entries(count);
            let set = resolve(&snapshot, &Ping);
            assert_eq!(only_one(&set), one, "only_one with {count}");
            assert_eq!(not_empty(&set), some, "not_empty with {count}");
            assert!(exactly(count)(&set));
            assert!(at_least(count)(&set));
            assert!(at_most(count)(&set));
            assert!(!at_least(count + 1)(&set));
        }
    }

    #[test]
    fn silent_policy_reports_outcome() {
        let snapshot = entries(2);
        let set = resolve(&snapshot, &Ping);

        assert!(GenericValidation::of(&set).expected(not_empty).is_valid().is_valid());
        let result = GenericValidation::of(&set).expected(only_one).is_valid();
        assert!(matches!(result, ValidationResult::Failed(FailureAction::Silent)));
    }

    #[test]
    fn raise_policy_builds_error_only_on_failure() {
        let snapshot = entries(2);
        let set = resolve(&snapshot, &Ping);

        let mut called = false;
        let passed = GenericValidation::of(&set)
            .expected(at_least(1))
            .or_raise(|_| {
                called = true;
                ValidatorError
            });
        assert!(passed.is_valid());
        assert!(!called);

        let failed = GenericValidation::of(&set)
            .expected(only_one)
            .or_raise(|_| ValidatorError);
        let ValidationResult::Failed(FailureAction::Raise(err)) = failed else {
            panic!("expected a raised error, got {failed:?}");
        };
        assert!(err.downcast_ref::<ValidatorError>().is_some());
        assert_eq!(err.to_string(), "Validator exception");
    }

    #[test]
    fn custom_predicate_sees_handler_names() {
        let snapshot = entries(2);
        let set = resolve(&snapshot, &Ping);

        let result = GenericValidation::of(&set)
            .expected(|handlers| handlers.handler_names().contains(&"Pong2"))
            .is_valid();
        assert!(result.is_valid());
    }
}

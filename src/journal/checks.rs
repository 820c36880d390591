//! Metadata constraint checking.
//!
//! Predicates are registered per tag key and evaluated against every value
//! of that tag witnessed on admitted transactions and postings. Assertion
//! failures are fatal to the containing transaction; check failures are
//! surfaced as diagnostics and processing continues.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::JournalError;

use super::registry::Diagnostic;
use super::transaction::{Posting, Transaction};

/// The item a tag value was attached to, if any. Declarations carry none.
#[derive(Clone, Copy)]
pub enum ScopeItem<'a> {
    Transaction(&'a Transaction),
    Posting {
        xact: &'a Transaction,
        post: &'a Posting,
    },
}

/// Evaluation scope handed to a predicate: the owning item plus the tag
/// key and value under test.
pub struct ValueScope<'a> {
    pub item: Option<ScopeItem<'a>>,
    pub key: &'a str,
    pub value: &'a str,
}

/// Boundary to the expression evaluator: one registered predicate.
pub trait TagPredicate: Send + Sync {
    fn eval(&self, scope: &ValueScope<'_>) -> bool;

    /// Source text of the predicate, used in errors and diagnostics.
    fn text(&self) -> &str;
}

/// Predicate backed by a plain closure.
pub struct FnPredicate<F> {
    text: String,
    func: F,
}

impl<F> FnPredicate<F>
where
    F: Fn(&ValueScope<'_>) -> bool + Send + Sync,
{
    pub fn new(text: impl Into<String>, func: F) -> Self {
        Self {
            text: text.into(),
            func,
        }
    }
}

impl<F> TagPredicate for FnPredicate<F>
where
    F: Fn(&ValueScope<'_>) -> bool + Send + Sync,
{
    fn eval(&self, scope: &ValueScope<'_>) -> bool {
        (self.func)(scope)
    }

    fn text(&self) -> &str {
        &self.text
    }
}

/// Whether a failed predicate aborts admission or only warns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Assertion,
    Check,
}

#[derive(Clone)]
pub struct TagCheck {
    pub kind: CheckKind,
    pub predicate: Arc<dyn TagPredicate>,
}

impl fmt::Debug for TagCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagCheck")
            .field("kind", &self.kind)
            .field("predicate", &self.predicate.text())
            .finish()
    }
}

/// Registered constraints, multiple per tag key.
#[derive(Debug, Clone, Default)]
pub struct TagChecks {
    checks: HashMap<String, Vec<TagCheck>>,
}

impl TagChecks {
    pub fn register(
        &mut self,
        key: impl Into<String>,
        predicate: Arc<dyn TagPredicate>,
        kind: CheckKind,
    ) {
        self.checks
            .entry(key.into())
            .or_default()
            .push(TagCheck { kind, predicate });
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Evaluates every constraint registered for `key` against `value`.
    ///
    /// Check failures warn and continue; the first Assertion failure
    /// aborts with [`JournalError::MetadataAssertionFailed`].
    pub fn run(
        &self,
        key: &str,
        value: &str,
        item: Option<ScopeItem<'_>>,
        location: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), JournalError> {
        let Some(checks) = self.checks.get(key) else {
            return Ok(());
        };
        for check in checks {
            let scope = ValueScope { item, key, value };
            if check.predicate.eval(&scope) {
                continue;
            }
            match check.kind {
                CheckKind::Assertion => {
                    return Err(JournalError::MetadataAssertionFailed {
                        key: key.to_string(),
                        value: value.to_string(),
                        predicate: check.predicate.text().to_string(),
                    });
                }
                CheckKind::Check => {
                    let message = format!(
                        "metadata check failed for ({}: {}): {}",
                        key,
                        value,
                        check.predicate.text()
                    );
                    tracing::warn!(location, "{message}");
                    diagnostics.push(Diagnostic::new(location, message));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predicate(text: &str, pass: bool) -> Arc<dyn TagPredicate> {
        Arc::new(FnPredicate::new(text, move |_| pass))
    }

    #[test]
    fn unregistered_keys_pass() {
        let checks = TagChecks::default();
        let mut diags = Vec::new();
        checks
            .run("Receipt", "yes", None, "input:1", &mut diags)
            .unwrap();
        assert!(diags.is_empty());
    }

    #[test]
    fn assertion_failure_is_fatal() {
        let mut checks = TagChecks::default();
        checks.register("Receipt", predicate("value == 'yes'", false), CheckKind::Assertion);

        let mut diags = Vec::new();
        let result = checks.run("Receipt", "no", None, "input:1", &mut diags);
        assert!(matches!(
            result,
            Err(JournalError::MetadataAssertionFailed { .. })
        ));
    }

    #[test]
    fn check_failures_warn_and_continue() {
        let mut checks = TagChecks::default();
        checks.register("Receipt", predicate("first", false), CheckKind::Check);
        checks.register("Receipt", predicate("second", false), CheckKind::Check);

        let mut diags = Vec::new();
        checks
            .run("Receipt", "no", None, "input:4", &mut diags)
            .unwrap();
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn predicates_see_key_and_value() {
        let mut checks = TagChecks::default();
        checks.register(
            "Amount",
            Arc::new(FnPredicate::new("value parses", |scope: &ValueScope<'_>| {
                scope.value.parse::<f64>().is_ok()
            })),
            CheckKind::Assertion,
        );

        let mut diags = Vec::new();
        checks
            .run("Amount", "12.5", None, "input:1", &mut diags)
            .unwrap();
        assert!(checks
            .run("Amount", "not-a-number", None, "input:2", &mut diags)
            .is_err());
    }
}

//! Progressive-trust classification of journal entities.
//!
//! Accounts, payees, commodities, and metadata tags share one decision
//! rule: entities declared explicitly, or first seen in already-reviewed
//! data, are learned silently; anything else is handled according to the
//! configured enforcement level. An explicit declaration under force-strict
//! mode permanently locks the entity kind into declaration-only learning.

use serde::{Deserialize, Serialize};

use crate::errors::JournalError;

use super::transaction::{ClearingState, Posting, Transaction};

/// The classes of entity the registry tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Account,
    Payee,
    Commodity,
    Tag,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Payee => "payee",
            EntityKind::Commodity => "commodity",
            EntityKind::Tag => "metadata tag",
        }
    }

    fn index(self) -> usize {
        match self {
            EntityKind::Account => 0,
            EntityKind::Payee => 1,
            EntityKind::Commodity => 2,
            EntityKind::Tag => 3,
        }
    }
}

/// How unknown-entity events are handled once trust cannot be inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Enforcement {
    #[default]
    Permissive,
    Warning,
    Error,
}

/// Where an entity was witnessed.
///
/// Declarations carry no item; usages carry the transaction (and posting)
/// they appeared on, so the policy can read the clearing state and the
/// redirection table can read the payee.
#[derive(Debug, Clone, Copy)]
pub enum EntityContext<'a> {
    Declaration,
    Transaction(&'a Transaction),
    Posting {
        xact: &'a Transaction,
        post: &'a Posting,
    },
}

impl EntityContext<'_> {
    pub fn clearing(&self) -> Option<ClearingState> {
        match self {
            EntityContext::Declaration => None,
            EntityContext::Transaction(xact) => Some(xact.state),
            EntityContext::Posting { post, .. } => Some(post.state),
        }
    }

    pub fn payee(&self) -> Option<&str> {
        match self {
            EntityContext::Declaration => None,
            EntityContext::Transaction(xact) => Some(&xact.payee),
            EntityContext::Posting { xact, .. } => Some(&xact.payee),
        }
    }

    pub fn is_declaration(&self) -> bool {
        matches!(self, EntityContext::Declaration)
    }
}

/// A non-fatal finding surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub location: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Shared policy state: enforcement level, force-strict mode, and the
/// per-kind lock flags.
#[derive(Debug, Clone, Default)]
pub struct TrustPolicy {
    pub enforcement: Enforcement,
    pub force_strict: bool,
    locked: [bool; 4],
}

impl TrustPolicy {
    pub fn new(enforcement: Enforcement, force_strict: bool) -> Self {
        Self {
            enforcement,
            force_strict,
            locked: [false; 4],
        }
    }

    /// True once `kind` only accepts explicitly declared entities.
    pub fn is_locked(&self, kind: EntityKind) -> bool {
        self.locked[kind.index()]
    }

    /// One-way transition; locked kinds never unlock.
    pub fn lock(&mut self, kind: EntityKind) {
        self.locked[kind.index()] = true;
    }

    /// Applies the trust decision table to one witnessed entity.
    ///
    /// Returns whether the entity should now be marked known. Warning-level
    /// outcomes are appended to `diagnostics`; under `Enforcement::Error`
    /// an unknown entity fails with [`JournalError::PolicyViolation`].
    pub fn witness(
        &mut self,
        kind: EntityKind,
        name: &str,
        already_known: bool,
        context: &EntityContext<'_>,
        location: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<bool, JournalError> {
        if already_known {
            return Ok(false);
        }

        if context.is_declaration() {
            if self.force_strict {
                self.lock(kind);
            }
            return Ok(true);
        }

        if !self.is_locked(kind) && context.clearing() != Some(ClearingState::Uncleared) {
            // Already-reviewed data is trusted wholesale.
            return Ok(true);
        }

        match self.enforcement {
            Enforcement::Warning => {
                let message = format!("unknown {} '{}'", kind.label(), name);
                tracing::warn!(location, "{message}");
                diagnostics.push(Diagnostic::new(location, message));
                Ok(false)
            }
            Enforcement::Error => Err(JournalError::PolicyViolation {
                kind: kind.label(),
                name: name.to_string(),
            }),
            Enforcement::Permissive => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn xact(state: ClearingState) -> Transaction {
        Transaction::new(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(), "Cafe").with_state(state)
    }

    #[test]
    fn known_entities_are_ignored() {
        let mut policy = TrustPolicy::new(Enforcement::Error, false);
        let mut diags = Vec::new();
        let seen = xact(ClearingState::Uncleared);
        let marked = policy
            .witness(
                EntityKind::Account,
                "Assets:Cash",
                true,
                &EntityContext::Transaction(&seen),
                "input:1",
                &mut diags,
            )
            .unwrap();
        assert!(!marked);
        assert!(diags.is_empty());
    }

    #[test]
    fn declaration_learns_and_locks_under_force_strict() {
        let mut policy = TrustPolicy::new(Enforcement::Error, true);
        let mut diags = Vec::new();
        let marked = policy
            .witness(
                EntityKind::Commodity,
                "USD",
                false,
                &EntityContext::Declaration,
                "input:1",
                &mut diags,
            )
            .unwrap();
        assert!(marked);
        assert!(policy.is_locked(EntityKind::Commodity));
        assert!(!policy.is_locked(EntityKind::Account));
    }

    #[test]
    fn reviewed_usage_learns_when_unlocked() {
        let mut policy = TrustPolicy::new(Enforcement::Error, false);
        let mut diags = Vec::new();
        let seen = xact(ClearingState::Cleared);
        let marked = policy
            .witness(
                EntityKind::Tag,
                "Receipt",
                false,
                &EntityContext::Transaction(&seen),
                "input:3",
                &mut diags,
            )
            .unwrap();
        assert!(marked);
    }

    #[test]
    fn locked_kind_rejects_even_cleared_usage() {
        let mut policy = TrustPolicy::new(Enforcement::Error, false);
        policy.lock(EntityKind::Tag);
        let mut diags = Vec::new();
        let seen = xact(ClearingState::Cleared);
        let result = policy.witness(
            EntityKind::Tag,
            "Receipt",
            false,
            &EntityContext::Transaction(&seen),
            "input:3",
            &mut diags,
        );
        assert!(matches!(
            result,
            Err(JournalError::PolicyViolation { kind: "metadata tag", .. })
        ));
    }

    #[test]
    fn warning_level_collects_diagnostics() {
        let mut policy = TrustPolicy::new(Enforcement::Warning, false);
        let mut diags = Vec::new();
        let seen = xact(ClearingState::Uncleared);
        let marked = policy
            .witness(
                EntityKind::Account,
                "Expenses:Bogus",
                false,
                &EntityContext::Transaction(&seen),
                "input:7",
                &mut diags,
            )
            .unwrap();
        assert!(!marked);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("Expenses:Bogus"));
        assert_eq!(diags[0].location, "input:7");
    }

    #[test]
    fn permissive_level_stays_silent() {
        let mut policy = TrustPolicy::new(Enforcement::Permissive, false);
        let mut diags = Vec::new();
        let seen = xact(ClearingState::Uncleared);
        let marked = policy
            .witness(
                EntityKind::Account,
                "Expenses:Bogus",
                false,
                &EntityContext::Transaction(&seen),
                "input:7",
                &mut diags,
            )
            .unwrap();
        assert!(!marked);
        assert!(diags.is_empty());
    }

    #[test]
    fn locks_never_clear() {
        let mut policy = TrustPolicy::new(Enforcement::Permissive, true);
        let mut diags = Vec::new();
        policy
            .witness(
                EntityKind::Account,
                "Assets:Cash",
                false,
                &EntityContext::Declaration,
                "input:1",
                &mut diags,
            )
            .unwrap();
        assert!(policy.is_locked(EntityKind::Account));

        // Later declarations and usages leave the lock in place.
        let seen = xact(ClearingState::Cleared);
        let _ = policy.witness(
            EntityKind::Account,
            "Assets:Bank",
            false,
            &EntityContext::Transaction(&seen),
            "input:2",
            &mut diags,
        );
        assert!(policy.is_locked(EntityKind::Account));
    }
}

//! Alias and redirection tables.
//!
//! Three pattern-driven lookups consulted during registration: declared
//! account aliases, payee remapping rules, and the fallback accounts used
//! when a posting names the unresolvable sentinel account.

use regex::Regex;

use super::account::AccountId;

/// Declared alias name to concrete account mapping.
#[derive(Debug, Clone, Default)]
pub struct AccountAliases {
    entries: Vec<(String, AccountId)>,
}

impl AccountAliases {
    pub fn insert(&mut self, alias: impl Into<String>, account: AccountId) {
        let alias = alias.into();
        match self.entries.iter_mut().find(|(name, _)| *name == alias) {
            Some(entry) => entry.1 = account,
            None => self.entries.push((alias, account)),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<AccountId> {
        self.entries
            .iter()
            .find(|(alias, _)| alias == name)
            .map(|(_, account)| *account)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Payee-driven rewrite rules, applied first match wins.
#[derive(Debug, Clone, Default)]
pub struct PayeeRules {
    /// Rewrites a raw payee name to a canonical one.
    mappings: Vec<(Regex, String)>,
    /// Redirects postings against the unresolvable sentinel account to a
    /// concrete account, keyed by the transaction's payee.
    fallbacks: Vec<(Regex, AccountId)>,
}

impl PayeeRules {
    pub fn add_mapping(&mut self, pattern: Regex, canonical: impl Into<String>) {
        self.mappings.push((pattern, canonical.into()));
    }

    pub fn add_fallback(&mut self, pattern: Regex, account: AccountId) {
        self.fallbacks.push((pattern, account));
    }

    /// Canonical payee name for `name`, or the input when no rule matches.
    pub fn remap<'a>(&'a self, name: &'a str) -> &'a str {
        self.mappings
            .iter()
            .find(|(pattern, _)| pattern.is_match(name))
            .map(|(_, canonical)| canonical.as_str())
            .unwrap_or(name)
    }

    /// Fallback account for an unresolvable posting under `payee`.
    pub fn fallback_for(&self, payee: &str) -> Option<AccountId> {
        self.fallbacks
            .iter()
            .find(|(pattern, _)| pattern.is_match(payee))
            .map(|(_, account)| *account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::account::AccountTree;

    #[test]
    fn aliases_resolve_and_update() {
        let mut tree = AccountTree::new();
        let cash = tree.find_or_create(tree.master(), "Assets:Cash");
        let bank = tree.find_or_create(tree.master(), "Assets:Bank");

        let mut aliases = AccountAliases::default();
        aliases.insert("petty", cash);
        assert_eq!(aliases.resolve("petty"), Some(cash));
        assert_eq!(aliases.resolve("other"), None);

        aliases.insert("petty", bank);
        assert_eq!(aliases.resolve("petty"), Some(bank));
    }

    #[test]
    fn first_matching_payee_rule_wins() {
        let mut rules = PayeeRules::default();
        rules.add_mapping(Regex::new("(?i)starbucks").unwrap(), "Starbucks");
        rules.add_mapping(Regex::new("(?i)star").unwrap(), "Star Market");

        assert_eq!(rules.remap("STARBUCKS #1234"), "Starbucks");
        assert_eq!(rules.remap("Starshine Deli"), "Star Market");
        assert_eq!(rules.remap("Corner Shop"), "Corner Shop");
    }

    #[test]
    fn fallback_lookup_matches_payee() {
        let mut tree = AccountTree::new();
        let groceries = tree.find_or_create(tree.master(), "Expenses:Groceries");

        let mut rules = PayeeRules::default();
        rules.add_fallback(Regex::new("(?i)grocer").unwrap(), groceries);

        assert_eq!(rules.fallback_for("City Grocer"), Some(groceries));
        assert_eq!(rules.fallback_for("Gas Station"), None);
    }
}

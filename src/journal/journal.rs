//! The journal aggregate: entity registration, transaction admission,
//! loading, and consistency.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use crate::config::JournalOptions;
use crate::errors::JournalError;

use super::account::{AccountId, AccountTree};
use super::auto::{AutoXact, PeriodXact};
use super::checks::{CheckKind, ScopeItem, TagChecks, TagPredicate};
use super::registry::{Diagnostic, EntityContext, EntityKind, TrustPolicy};
use super::rules::{AccountAliases, PayeeRules};
use super::transaction::Transaction;

/// Leaf name of the sentinel account used for postings the parser could
/// not resolve to a real account.
pub const UNKNOWN_ACCOUNT: &str = "Unknown";

/// Boundary to the expression evaluator's ambient scope. Loading requires
/// one; it is threaded explicitly rather than looked up globally.
pub trait EvalScope {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Boundary to the textual parser. A parse pass drives the journal's
/// registration and admission operations for every discovery event.
pub trait SourceParser {
    fn parse(
        &mut self,
        journal: &mut Journal,
        input: &mut dyn BufRead,
        master: AccountId,
        scope: &dyn EvalScope,
        label: &str,
    ) -> Result<usize, JournalError>;
}

/// A file that contributed at least one admitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub path: PathBuf,
}

/// Why a candidate transaction was turned away without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Finalization failed; the transaction does not balance.
    Unbalanced,
    /// Another admitted transaction already carries the same dedup key.
    Duplicate,
}

/// Outcome of [`Journal::admit`]. Rejected transactions are handed back
/// with their journal back-reference cleared.
#[derive(Debug)]
pub enum Admission {
    Admitted(Uuid),
    Rejected(Box<Transaction>, RejectReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

/// Aggregate root owning the account tree, admitted transactions, rule
/// sets, and every registry table.
pub struct Journal {
    pub id: Uuid,
    accounts: AccountTree,
    xacts: Vec<Transaction>,
    auto_xacts: Vec<AutoXact>,
    period_xacts: Vec<PeriodXact>,
    aliases: AccountAliases,
    payee_rules: PayeeRules,
    tag_checks: TagChecks,
    known_tags: HashSet<String>,
    /// Maintained for parity with the other entity kinds; payee trust
    /// checking itself is not performed.
    known_payees: HashSet<String>,
    known_commodities: HashSet<String>,
    checksum_map: HashMap<String, Uuid>,
    policy: TrustPolicy,
    dedup_tag: String,
    sources: Vec<SourceInfo>,
    diagnostics: Vec<Diagnostic>,
}

impl Journal {
    pub fn new() -> Self {
        Self::with_options(JournalOptions::default())
    }

    pub fn with_options(options: JournalOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            accounts: AccountTree::new(),
            xacts: Vec::new(),
            auto_xacts: Vec::new(),
            period_xacts: Vec::new(),
            aliases: AccountAliases::default(),
            payee_rules: PayeeRules::default(),
            tag_checks: TagChecks::default(),
            known_tags: HashSet::new(),
            known_payees: HashSet::new(),
            known_commodities: HashSet::new(),
            checksum_map: HashMap::new(),
            policy: TrustPolicy::new(options.enforcement, options.force_strict),
            dedup_tag: options.dedup_tag,
            sources: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    // --- accessors -------------------------------------------------------

    pub fn master(&self) -> AccountId {
        self.accounts.master()
    }

    pub fn accounts(&self) -> &AccountTree {
        &self.accounts
    }

    /// Mutable tree access for evaluation passes that cache derived data.
    pub fn accounts_mut(&mut self) -> &mut AccountTree {
        &mut self.accounts
    }

    pub fn xacts(&self) -> &[Transaction] {
        &self.xacts
    }

    pub fn xact(&self, id: Uuid) -> Option<&Transaction> {
        self.xacts.iter().find(|xact| xact.id == id)
    }

    pub fn xact_mut(&mut self, id: Uuid) -> Option<&mut Transaction> {
        self.xacts.iter_mut().find(|xact| xact.id == id)
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut TrustPolicy {
        &mut self.policy
    }

    pub fn sources(&self) -> &[SourceInfo] {
        &self.sources
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    // --- account operations ---------------------------------------------

    pub fn add_account(&mut self, path: &str) -> AccountId {
        let master = self.accounts.master();
        self.accounts.find_or_create(master, path)
    }

    pub fn remove_account(&mut self, id: AccountId) -> bool {
        self.accounts.remove(id)
    }

    pub fn find_account(&self, path: &str) -> Option<AccountId> {
        self.accounts.find(self.accounts.master(), path)
    }

    pub fn find_account_matching(&self, pattern: &Regex) -> Option<AccountId> {
        self.accounts.find_matching(pattern)
    }

    pub fn add_alias(&mut self, alias: impl Into<String>, account: AccountId) {
        self.aliases.insert(alias, account);
    }

    pub fn add_payee_mapping(&mut self, pattern: Regex, canonical: impl Into<String>) {
        self.payee_rules.add_mapping(pattern, canonical);
    }

    pub fn add_account_fallback(&mut self, payee_pattern: Regex, account: AccountId) {
        self.payee_rules.add_fallback(payee_pattern, account);
    }

    pub fn register_tag_check(
        &mut self,
        key: impl Into<String>,
        predicate: Arc<dyn TagPredicate>,
        kind: CheckKind,
    ) {
        self.tag_checks.register(key, predicate, kind);
    }

    // --- registration ----------------------------------------------------

    /// Resolves an account name through aliases and the fallback table,
    /// then classifies the final account under the trust policy.
    pub fn register_account(
        &mut self,
        name: &str,
        context: &EntityContext<'_>,
        location: &str,
        master: Option<AccountId>,
    ) -> Result<AccountId, JournalError> {
        let base = master.unwrap_or_else(|| self.accounts.master());
        let mut account = match self.aliases.resolve(name) {
            Some(aliased) => aliased,
            None => self.accounts.find_or_create(base, name),
        };

        // Redirection runs before the policy, so trust is judged on the
        // fallback account rather than the name that failed to resolve.
        if self.accounts.name(account) == UNKNOWN_ACCOUNT {
            if let Some(payee) = context.payee() {
                if let Some(fallback) = self.payee_rules.fallback_for(payee) {
                    account = fallback;
                }
            }
        }

        let fullname = self.accounts.fullname(account);
        let known = self.accounts.is_known(account);
        let mark = self.policy.witness(
            EntityKind::Account,
            &fullname,
            known,
            context,
            location,
            &mut self.diagnostics,
        )?;
        if mark {
            self.accounts.mark_known(account);
        }
        Ok(account)
    }

    /// Remaps a payee name through the registered pattern rules. Payee
    /// trust checking is deliberately not performed.
    pub fn register_payee(&mut self, name: &str) -> String {
        self.payee_rules.remap(name).to_string()
    }

    /// Declares a payee up front, locking the payee kind under
    /// force-strict mode like any other declaration.
    pub fn declare_payee(&mut self, name: impl Into<String>) {
        if self.policy.force_strict {
            self.policy.lock(EntityKind::Payee);
        }
        self.known_payees.insert(name.into());
    }

    pub fn register_commodity(
        &mut self,
        symbol: &str,
        context: &EntityContext<'_>,
        location: &str,
    ) -> Result<(), JournalError> {
        let known = self.known_commodities.contains(symbol);
        let mark = self.policy.witness(
            EntityKind::Commodity,
            symbol,
            known,
            context,
            location,
            &mut self.diagnostics,
        )?;
        if mark {
            self.known_commodities.insert(symbol.to_string());
        }
        Ok(())
    }

    pub fn register_metadata(
        &mut self,
        key: &str,
        value: Option<&str>,
        context: &EntityContext<'_>,
        location: &str,
    ) -> Result<(), JournalError> {
        let known = self.known_tags.contains(key);
        let mark = self.policy.witness(
            EntityKind::Tag,
            key,
            known,
            context,
            location,
            &mut self.diagnostics,
        )?;
        if mark {
            self.known_tags.insert(key.to_string());
        }

        if let Some(value) = value {
            let item = match context {
                EntityContext::Declaration => None,
                EntityContext::Transaction(xact) => Some(ScopeItem::Transaction(xact)),
                EntityContext::Posting { xact, post } => {
                    Some(ScopeItem::Posting { xact, post })
                }
            };
            self.tag_checks
                .run(key, value, item, location, &mut self.diagnostics)?;
        }
        Ok(())
    }

    pub fn is_known_commodity(&self, symbol: &str) -> bool {
        self.known_commodities.contains(symbol)
    }

    pub fn is_known_tag(&self, key: &str) -> bool {
        self.known_tags.contains(key)
    }

    pub fn is_known_payee(&self, name: &str) -> bool {
        self.known_payees.contains(name)
    }

    // --- admission -------------------------------------------------------

    pub fn add_auto_xact(&mut self, rule: AutoXact) {
        self.auto_xacts.push(rule);
    }

    pub fn add_period_xact(&mut self, template: PeriodXact) {
        self.period_xacts.push(template);
    }

    /// Admits a candidate transaction: finalize, extend through automatic
    /// rules, check metadata, deduplicate, append.
    ///
    /// Metadata policy violations and assertion failures are errors and
    /// the transaction is discarded. Imbalance and duplication reject the
    /// transaction and hand it back, detached, for the caller to inspect.
    pub fn admit(&mut self, mut xact: Transaction) -> Result<Admission, JournalError> {
        xact.journal = Some(self.id);

        if !xact.finalize() {
            xact.journal = None;
            return Ok(Admission::Rejected(Box::new(xact), RejectReason::Unbalanced));
        }

        self.extend_xact(&mut xact);

        self.check_all_metadata(&xact)?;

        // Registry learning and check warnings from the steps above stand
        // even when the transaction itself turns out to be a duplicate.
        if let Some(value) = xact.get_tag(&self.dedup_tag) {
            let key = value.to_string();
            if self.checksum_map.contains_key(&key) {
                xact.journal = None;
                return Ok(Admission::Rejected(Box::new(xact), RejectReason::Duplicate));
            }
            self.checksum_map.insert(key, xact.id);
        }

        let id = xact.id;
        self.xacts.push(xact);
        Ok(Admission::Admitted(id))
    }

    /// Applies every automatic rule, in registration order.
    pub fn extend_xact(&mut self, xact: &mut Transaction) {
        for rule in &mut self.auto_xacts {
            rule.extend(xact, &self.accounts);
        }
    }

    fn check_all_metadata(&mut self, xact: &Transaction) -> Result<(), JournalError> {
        for (key, value) in &xact.metadata {
            self.register_metadata(key, value.as_deref(), &EntityContext::Transaction(xact), "")?;
        }
        for post in &xact.postings {
            for (key, value) in &post.metadata {
                self.register_metadata(
                    key,
                    value.as_deref(),
                    &EntityContext::Posting { xact, post },
                    "",
                )?;
            }
        }
        Ok(())
    }

    /// Removes an admitted transaction, detaching its back-reference and
    /// releasing its dedup key.
    pub fn remove_xact(&mut self, id: Uuid) -> Option<Transaction> {
        let index = self.xacts.iter().position(|xact| xact.id == id)?;
        let mut xact = self.xacts.remove(index);
        xact.journal = None;
        self.checksum_map.retain(|_, owner| *owner != id);
        Some(xact)
    }

    // --- derived state & validity ---------------------------------------

    /// True when any non-ephemeral transaction, rule, template, or account
    /// carries cached computation results.
    pub fn has_xdata(&self) -> bool {
        self.xacts
            .iter()
            .any(|xact| !xact.ephemeral && xact.has_xdata())
            || self
                .auto_xacts
                .iter()
                .any(|rule| !rule.ephemeral && rule.has_xdata())
            || self
                .period_xacts
                .iter()
                .any(|template| !template.ephemeral && template.has_xdata())
            || self.accounts.has_any_xdata()
    }

    /// Discards cached computation results everywhere except on ephemeral
    /// items. Runs after every load or evaluation pass.
    pub fn clear_xdata(&mut self) {
        for xact in &mut self.xacts {
            if !xact.ephemeral {
                xact.clear_xdata();
            }
        }
        for rule in &mut self.auto_xacts {
            if !rule.ephemeral {
                rule.clear_xdata();
            }
        }
        for template in &mut self.period_xacts {
            if !template.ephemeral {
                template.clear_xdata();
            }
        }
        self.accounts.clear_xdata();
    }

    /// Post-load consistency check over the account tree and every
    /// admitted transaction.
    pub fn valid(&self) -> bool {
        if !self.accounts.valid() {
            debug!("journal: account tree not valid");
            return false;
        }
        for xact in &self.xacts {
            if !xact.valid() {
                debug!(xact = %xact.id, "journal: transaction not valid");
                return false;
            }
        }
        true
    }

    // --- loading ---------------------------------------------------------

    /// Parses `input` into this journal, returning the number of admitted
    /// transactions. Derived state is invalidated whether the pass
    /// succeeds or unwinds.
    pub fn read(
        &mut self,
        parser: &mut dyn SourceParser,
        input: &mut dyn BufRead,
        label: &str,
        master: Option<AccountId>,
        scope: Option<&dyn EvalScope>,
    ) -> Result<usize, JournalError> {
        let base = master.unwrap_or_else(|| self.accounts.master());
        let result = match scope {
            Some(scope) => parser.parse(self, input, base, scope, label),
            None => Err(JournalError::NoDefaultScope(label.to_string())),
        };
        // Balance assertions and expression evaluation during the pass may
        // have populated caches, even on the failure path.
        self.clear_xdata();
        result
    }

    /// Convenience form over [`Journal::read`]: opens `path`, and records
    /// it as a source when at least one transaction was admitted.
    pub fn read_file(
        &mut self,
        parser: &mut dyn SourceParser,
        path: &Path,
        master: Option<AccountId>,
        scope: Option<&dyn EvalScope>,
    ) -> Result<usize, JournalError> {
        if !path.exists() {
            return Err(JournalError::SourceNotFound(path.to_path_buf()));
        }
        let mut reader = BufReader::new(File::open(path)?);
        let label = path.display().to_string();
        let count = self.read(parser, &mut reader, &label, master, scope)?;
        if count > 0 {
            self.sources.push(SourceInfo {
                path: path.to_path_buf(),
            });
        }
        Ok(count)
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

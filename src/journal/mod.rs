//! Journal domain: accounts, transactions, trust policy, constraint
//! checks, and the aggregate that admits transactions.

pub mod account;
pub mod amount;
pub mod auto;
pub mod checks;
pub mod interval;
#[allow(clippy::module_inception)]
pub mod journal;
pub mod registry;
pub mod rules;
pub mod transaction;

pub use account::{AccountId, AccountTree, AccountXData, ACCOUNT_SEPARATOR};
pub use amount::{Amount, Balance, BALANCE_EPSILON};
pub use auto::{AmountSpec, AutoPosting, AutoXact, PeriodXact, RuleXData};
pub use checks::{CheckKind, FnPredicate, ScopeItem, TagChecks, TagPredicate, ValueScope};
pub use interval::{TimeInterval, TimeUnit};
pub use journal::{
    Admission, EvalScope, Journal, RejectReason, SourceInfo, SourceParser, UNKNOWN_ACCOUNT,
};
pub use registry::{Diagnostic, Enforcement, EntityContext, EntityKind, TrustPolicy};
pub use rules::{AccountAliases, PayeeRules};
pub use transaction::{ClearingState, Metadata, Posting, PostingXData, Transaction};

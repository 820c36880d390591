//! Automatic posting rules and periodic transaction templates.

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::{AccountId, AccountTree};
use super::amount::Amount;
use super::interval::TimeInterval;
use super::transaction::{Posting, Transaction};

/// Cached application bookkeeping for a rule, cleared with other derived
/// state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleXData {
    pub applications: usize,
}

/// Amount of a rule-generated posting: fixed, or scaled from the matched
/// posting's amount.
#[derive(Debug, Clone)]
pub enum AmountSpec {
    Fixed(Amount),
    Multiplier(f64),
}

/// One posting template inside an automatic rule.
#[derive(Debug, Clone)]
pub struct AutoPosting {
    pub account: AccountId,
    pub amount: AmountSpec,
}

/// Appends supplemental postings to transactions whose postings hit an
/// account matching the rule's query.
#[derive(Debug)]
pub struct AutoXact {
    pub id: Uuid,
    pub query: Regex,
    pub postings: Vec<AutoPosting>,
    pub ephemeral: bool,
    pub xdata: Option<RuleXData>,
}

impl AutoXact {
    pub fn new(query: Regex, postings: Vec<AutoPosting>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query,
            postings,
            ephemeral: false,
            xdata: None,
        }
    }

    /// Extends `xact` in place with one generated posting per template for
    /// every matching posting. Only postings present before this rule ran
    /// are considered.
    pub fn extend(&mut self, xact: &mut Transaction, accounts: &AccountTree) {
        let mut additions = Vec::new();
        for post in &xact.postings {
            if !self.query.is_match(&accounts.fullname(post.account)) {
                continue;
            }
            for template in &self.postings {
                let amount = match &template.amount {
                    AmountSpec::Fixed(amount) => Some(amount.clone()),
                    AmountSpec::Multiplier(factor) => {
                        post.amount.as_ref().map(|amount| amount.scaled(*factor))
                    }
                };
                let Some(amount) = amount else { continue };
                let mut generated = Posting::new(template.account, amount);
                generated.state = post.state;
                generated.generated = true;
                additions.push(generated);
            }
        }
        if !additions.is_empty() {
            self.xdata.get_or_insert_with(RuleXData::default).applications += 1;
            xact.postings.extend(additions);
        }
    }

    pub fn has_xdata(&self) -> bool {
        self.xdata.is_some()
    }

    pub fn clear_xdata(&mut self) {
        self.xdata = None;
    }
}

/// Template for transactions generated on a recurring cadence. The journal
/// owns these; occurrence generation lives with the reporting layer.
#[derive(Debug, Clone)]
pub struct PeriodXact {
    pub id: Uuid,
    pub interval: TimeInterval,
    pub payee: String,
    pub postings: Vec<Posting>,
    pub ephemeral: bool,
    pub xdata: Option<RuleXData>,
}

impl PeriodXact {
    pub fn new(interval: TimeInterval, payee: impl Into<String>, postings: Vec<Posting>) -> Self {
        Self {
            id: Uuid::new_v4(),
            interval,
            payee: payee.into(),
            postings,
            ephemeral: false,
            xdata: None,
        }
    }

    pub fn has_xdata(&self) -> bool {
        self.xdata.is_some()
    }

    pub fn clear_xdata(&mut self) {
        self.xdata = None;
    }
}

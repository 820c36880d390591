//! Transactions and their postings.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;
use super::amount::{Amount, Balance};

/// Review status of a transaction or posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClearingState {
    #[default]
    Uncleared,
    Pending,
    Cleared,
}

/// Tag key to optional value pairs attached to transactions and postings.
pub type Metadata = BTreeMap<String, Option<String>>;

/// Cached per-posting computation results from evaluation passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostingXData {
    pub value: f64,
}

/// A single line of a transaction, tied to one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub account: AccountId,
    /// `None` means the amount was elided and is resolved during finalize.
    pub amount: Option<Amount>,
    pub state: ClearingState,
    #[serde(default)]
    pub metadata: Metadata,
    /// Set on postings appended by automatic rules.
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub xdata: Option<PostingXData>,
}

impl Posting {
    pub fn new(account: AccountId, amount: Amount) -> Self {
        Self {
            account,
            amount: Some(amount),
            state: ClearingState::default(),
            metadata: Metadata::new(),
            generated: false,
            xdata: None,
        }
    }

    /// Posting whose amount is left for finalize to resolve.
    pub fn elided(account: AccountId) -> Self {
        Self {
            account,
            amount: None,
            state: ClearingState::default(),
            metadata: Metadata::new(),
            generated: false,
            xdata: None,
        }
    }

    pub fn with_state(mut self, state: ClearingState) -> Self {
        self.state = state;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A finalized group of postings admitted into (at most) one journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub date: NaiveDate,
    pub payee: String,
    pub state: ClearingState,
    #[serde(default)]
    pub metadata: Metadata,
    pub postings: Vec<Posting>,
    /// Id of the owning journal; set exactly while the transaction sits in
    /// that journal's transaction list.
    #[serde(default)]
    pub journal: Option<Uuid>,
    /// Ephemeral transactions keep their cached state across invalidation.
    #[serde(default)]
    pub ephemeral: bool,
}

impl Transaction {
    pub fn new(date: NaiveDate, payee: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            payee: payee.into(),
            state: ClearingState::default(),
            metadata: Metadata::new(),
            postings: Vec::new(),
            journal: None,
            ephemeral: false,
        }
    }

    pub fn with_state(mut self, state: ClearingState) -> Self {
        self.state = state;
        self
    }

    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Value of a metadata tag, when present with a value.
    pub fn get_tag(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|value| value.as_deref())
    }

    /// Balances the transaction. Elided postings absorb the per-commodity
    /// residual; more than one elided posting, or a residual with nowhere
    /// to go, leaves the transaction unresolved.
    ///
    /// Returns true when every posting ends up with an amount and the
    /// transaction nets to zero in every commodity.
    pub fn finalize(&mut self) -> bool {
        if self.postings.is_empty() {
            return false;
        }

        let elided: Vec<usize> = self
            .postings
            .iter()
            .enumerate()
            .filter(|(_, post)| post.amount.is_none())
            .map(|(index, _)| index)
            .collect();
        if elided.len() > 1 {
            return false;
        }

        let mut balance = Balance::default();
        for amount in self.postings.iter().filter_map(|post| post.amount.as_ref()) {
            balance.add(amount);
        }
        let residuals = balance.residuals();

        match elided.first() {
            Some(&index) => {
                if residuals.is_empty() {
                    return false;
                }
                self.postings[index].amount = Some(residuals[0].negated());
                // Further unbalanced commodities each get their own copy of
                // the elided posting.
                for residual in &residuals[1..] {
                    let mut extra = self.postings[index].clone();
                    extra.amount = Some(residual.negated());
                    self.postings.push(extra);
                }
                true
            }
            None => residuals.is_empty(),
        }
    }

    /// True when the transaction is resolved and balanced. Postings
    /// appended by automatic rules are supplemental and stay out of the
    /// balance check.
    pub fn valid(&self) -> bool {
        if self.postings.is_empty() {
            return false;
        }
        let mut balance = Balance::default();
        for post in &self.postings {
            match &post.amount {
                Some(amount) => {
                    if !post.generated {
                        balance.add(amount);
                    }
                }
                None => return false,
            }
        }
        balance.is_zero()
    }

    pub fn has_xdata(&self) -> bool {
        self.postings.iter().any(|post| post.xdata.is_some())
    }

    pub fn clear_xdata(&mut self) {
        for post in &mut self.postings {
            post.xdata = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn cash() -> AccountId {
        let mut tree = super::super::account::AccountTree::new();
        tree.find_or_create(tree.master(), "Assets:Cash")
    }

    #[test]
    fn finalize_fills_elided_posting() {
        let account = cash();
        let mut xact = Transaction::new(date(), "Grocer")
            .with_posting(Posting::new(account, Amount::new("USD", 42.0)))
            .with_posting(Posting::elided(account));

        assert!(xact.finalize());
        assert_eq!(xact.postings[1].amount.as_ref().unwrap().quantity, -42.0);
        assert!(xact.valid());
    }

    #[test]
    fn finalize_splits_residuals_across_commodities() {
        let account = cash();
        let mut xact = Transaction::new(date(), "Exchange")
            .with_posting(Posting::new(account, Amount::new("USD", 10.0)))
            .with_posting(Posting::new(account, Amount::new("EUR", 9.0)))
            .with_posting(Posting::elided(account));

        assert!(xact.finalize());
        assert_eq!(xact.postings.len(), 4);
        assert!(xact.valid());
    }

    #[test]
    fn finalize_rejects_two_elided_postings() {
        let account = cash();
        let mut xact = Transaction::new(date(), "Broken")
            .with_posting(Posting::new(account, Amount::new("USD", 5.0)))
            .with_posting(Posting::elided(account))
            .with_posting(Posting::elided(account));

        assert!(!xact.finalize());
    }

    #[test]
    fn finalize_rejects_elided_posting_with_no_residual() {
        let account = cash();
        let mut xact = Transaction::new(date(), "Settled")
            .with_posting(Posting::new(account, Amount::new("USD", 5.0)))
            .with_posting(Posting::new(account, Amount::new("USD", -5.0)))
            .with_posting(Posting::elided(account));

        // Nothing left over for the elided posting to absorb.
        assert!(!xact.finalize());
    }

    #[test]
    fn generated_postings_stay_out_of_the_balance_check() {
        let account = cash();
        let mut xact = Transaction::new(date(), "Budgeted")
            .with_posting(Posting::new(account, Amount::new("USD", 20.0)))
            .with_posting(Posting::new(account, Amount::new("USD", -20.0)));
        let mut supplemental = Posting::new(account, Amount::new("USD", -20.0));
        supplemental.generated = true;
        xact.postings.push(supplemental);

        assert!(xact.valid());
    }

    #[test]
    fn finalize_rejects_unbalanced_without_elision() {
        let account = cash();
        let mut xact = Transaction::new(date(), "Unbalanced")
            .with_posting(Posting::new(account, Amount::new("USD", 5.0)))
            .with_posting(Posting::new(account, Amount::new("USD", -4.0)));

        assert!(!xact.finalize());
        assert!(!xact.valid());
    }

    #[test]
    fn finalize_rejects_empty_transaction() {
        let mut xact = Transaction::new(date(), "Empty");
        assert!(!xact.finalize());
    }

    #[test]
    fn xdata_clears_across_postings() {
        let account = cash();
        let mut xact = Transaction::new(date(), "Cache")
            .with_posting(Posting::new(account, Amount::new("USD", 1.0)))
            .with_posting(Posting::new(account, Amount::new("USD", -1.0)));
        xact.postings[0].xdata = Some(PostingXData { value: 1.0 });

        assert!(xact.has_xdata());
        xact.clear_xdata();
        assert!(!xact.has_xdata());
    }
}

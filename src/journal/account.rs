//! Arena-backed account hierarchy.
//!
//! Accounts are tree nodes owned by the arena and addressed by stable
//! [`AccountId`] handles, so postings can reference accounts without
//! coupling their lifetimes to the tree structure.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator between account path segments, as in `Expenses:Food:Dining`.
pub const ACCOUNT_SEPARATOR: char = ':';

/// Maximum tree depth accepted by structural validation.
const MAX_ACCOUNT_DEPTH: usize = 256;

/// Stable handle to an account node.
///
/// Handles are minted by one [`AccountTree`] and are only meaningful
/// against that tree; resolving a handle through any other tree is out
/// of contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(u32);

/// Cached per-account computation results from evaluation passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountXData {
    pub balance: f64,
    pub post_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountNode {
    name: String,
    parent: Option<AccountId>,
    children: BTreeMap<String, AccountId>,
    known: bool,
    xdata: Option<AccountXData>,
}

impl AccountNode {
    fn new(name: impl Into<String>, parent: Option<AccountId>) -> Self {
        Self {
            name: name.into(),
            parent,
            children: BTreeMap::new(),
            known: false,
            xdata: None,
        }
    }
}

/// Hierarchical account namespace rooted at a nameless master account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTree {
    nodes: Vec<AccountNode>,
    master: AccountId,
}

impl AccountTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![AccountNode::new("", None)],
            master: AccountId(0),
        }
    }

    /// The root of the hierarchy; every named account lives below it.
    pub fn master(&self) -> AccountId {
        self.master
    }

    pub fn name(&self, id: AccountId) -> &str {
        &self.node(id).name
    }

    pub fn parent(&self, id: AccountId) -> Option<AccountId> {
        self.node(id).parent
    }

    /// Full path of the account, ancestor names joined by `:`.
    pub fn fullname(&self, id: AccountId) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current);
            if !node.name.is_empty() {
                segments.push(node.name.as_str());
            }
            cursor = node.parent;
        }
        segments.reverse();
        let separator = ACCOUNT_SEPARATOR.to_string();
        segments.join(separator.as_str())
    }

    /// Adds a single child account under `parent`, reusing an existing
    /// child of the same name.
    pub fn add_account(&mut self, parent: AccountId, name: &str) -> AccountId {
        if let Some(&existing) = self.node(parent).children.get(name) {
            return existing;
        }
        let id = AccountId(self.nodes.len() as u32);
        self.nodes.push(AccountNode::new(name, Some(parent)));
        self.node_mut(parent).children.insert(name.to_string(), id);
        id
    }

    /// Resolves a `:`-separated path below `base`, creating intermediate
    /// and leaf accounts as needed.
    pub fn find_or_create(&mut self, base: AccountId, path: &str) -> AccountId {
        let mut cursor = base;
        for segment in path.split(ACCOUNT_SEPARATOR).filter(|s| !s.is_empty()) {
            cursor = self.add_account(cursor, segment);
        }
        cursor
    }

    /// Resolves a `:`-separated path below `base` without creating anything.
    pub fn find(&self, base: AccountId, path: &str) -> Option<AccountId> {
        let mut cursor = base;
        for segment in path.split(ACCOUNT_SEPARATOR).filter(|s| !s.is_empty()) {
            cursor = *self.node(cursor).children.get(segment)?;
        }
        Some(cursor)
    }

    /// First account (preorder) whose full path matches `pattern`.
    pub fn find_matching(&self, pattern: &Regex) -> Option<AccountId> {
        self.preorder(self.master)
            .into_iter()
            .find(|&id| pattern.is_match(&self.fullname(id)))
    }

    /// Unlinks `id` from its parent; the subtree becomes unreachable but
    /// existing handles into it stay valid.
    pub fn remove(&mut self, id: AccountId) -> bool {
        let Some(parent) = self.node(id).parent else {
            return false;
        };
        let name = self.node(id).name.clone();
        self.node_mut(parent).children.remove(&name);
        self.node_mut(id).parent = None;
        true
    }

    pub fn is_known(&self, id: AccountId) -> bool {
        self.node(id).known
    }

    pub fn mark_known(&mut self, id: AccountId) {
        self.node_mut(id).known = true;
    }

    pub fn has_xdata(&self, id: AccountId) -> bool {
        self.node(id).xdata.is_some()
    }

    /// Cached computation slot for the account, created on first use.
    pub fn xdata_mut(&mut self, id: AccountId) -> &mut AccountXData {
        self.node_mut(id).xdata.get_or_insert_with(AccountXData::default)
    }

    /// True when any node in the tree carries cached computation results.
    pub fn has_any_xdata(&self) -> bool {
        self.nodes.iter().any(|node| node.xdata.is_some())
    }

    pub fn clear_xdata(&mut self) {
        for node in &mut self.nodes {
            node.xdata = None;
        }
    }

    /// Structural validation: parent/child links must agree and the tree
    /// must stay within the depth bound.
    pub fn valid(&self) -> bool {
        self.valid_from(self.master, 0)
    }

    fn valid_from(&self, id: AccountId, depth: usize) -> bool {
        if depth > MAX_ACCOUNT_DEPTH {
            tracing::debug!("account tree deeper than {MAX_ACCOUNT_DEPTH}");
            return false;
        }
        for (name, &child) in &self.node(id).children {
            let node = self.node(child);
            if node.parent != Some(id) || &node.name != name {
                tracing::debug!("account '{}' has inconsistent links", self.fullname(child));
                return false;
            }
            if !self.valid_from(child, depth + 1) {
                return false;
            }
        }
        true
    }

    fn preorder(&self, id: AccountId) -> Vec<AccountId> {
        let mut out = vec![id];
        for &child in self.node(id).children.values() {
            out.extend(self.preorder(child));
        }
        out
    }

    fn node(&self, id: AccountId) -> &AccountNode {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: AccountId) -> &mut AccountNode {
        &mut self.nodes[id.0 as usize]
    }
}

impl Default for AccountTree {
    fn default() -> Self {
        Self::new()
    }
}

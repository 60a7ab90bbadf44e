// src/state.rs
//! # Monitor State
//!
//! The mutable heart of the relay: which accounts are tracked, which
//! post ids have already been relayed, and which accounts have finished
//! their silent first pass. Persistence snapshots come out of here and
//! loaded documents go back in.

use std::collections::{HashMap, HashSet, VecDeque};

use once_cell::sync::Lazy;
use regex::Regex;

/// Retained relayed-id history. Older ids age out of the persisted
/// snapshot; the upstream feeds only serve recent posts, so an id this
/// old can no longer reappear.
pub const SEEN_IDS_LIMIT: usize = 1000;

static HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,15}$").unwrap());

/// A handle is valid when it matches the platform's username shape:
/// 1..=15 word characters, no leading @.
pub fn is_valid_handle(handle: &str) -> bool {
    HANDLE_RE.is_match(handle)
}

#[derive(Debug, Default)]
pub struct MonitorState {
    tracked: Vec<String>,
    seen: HashSet<String>,
    seen_order: VecDeque<String>,
    bootstrapped: HashMap<String, bool>,
    /// Cycles-with-new-posts counter driving the adaptive check delay.
    activity: u32,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state from persisted documents at startup.
    pub fn from_parts(
        accounts: Vec<String>,
        seen_ids: Vec<String>,
        bootstrapped: HashMap<String, bool>,
    ) -> Self {
        let mut state = Self::default();
        for account in accounts {
            state.add_account(&account);
        }
        for id in seen_ids {
            state.record_seen(&id);
        }
        state.bootstrapped = bootstrapped;
        state
    }

    // ------------------------------------------------------------------
    // tracked accounts
    // ------------------------------------------------------------------

    /// Adds a handle (normalized to lowercase). Returns false when the
    /// handle is already tracked.
    pub fn add_account(&mut self, handle: &str) -> bool {
        let handle = handle.to_lowercase();
        if self.tracked.contains(&handle) {
            return false;
        }
        self.tracked.push(handle);
        true
    }

    /// Removes a handle and its bootstrap marker. Seen ids are left in
    /// place so re-adding the account does not replay old posts still
    /// in the upstream window.
    pub fn remove_account(&mut self, handle: &str) -> bool {
        let handle = handle.to_lowercase();
        let before = self.tracked.len();
        self.tracked.retain(|h| h != &handle);
        let removed = self.tracked.len() < before;
        if removed {
            self.bootstrapped.remove(&handle);
        }
        removed
    }

    pub fn is_tracked(&self, handle: &str) -> bool {
        let handle = handle.to_lowercase();
        self.tracked.iter().any(|h| h == &handle)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    // ------------------------------------------------------------------
    // bootstrap markers
    // ------------------------------------------------------------------

    pub fn is_bootstrapped(&self, handle: &str) -> bool {
        self.bootstrapped
            .get(&handle.to_lowercase())
            .copied()
            .unwrap_or(false)
    }

    pub fn mark_bootstrapped(&mut self, handle: &str) {
        self.bootstrapped.insert(handle.to_lowercase(), true);
    }

    // ------------------------------------------------------------------
    // seen ids
    // ------------------------------------------------------------------

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Records a relayed (or silently indexed) post id. Idempotent.
    pub fn record_seen(&mut self, id: &str) {
        if self.seen.insert(id.to_string()) {
            self.seen_order.push_back(id.to_string());
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    // ------------------------------------------------------------------
    // activity
    // ------------------------------------------------------------------

    pub fn activity(&self) -> u32 {
        self.activity
    }

    pub fn bump_activity(&mut self) {
        self.activity = self.activity.saturating_add(1);
    }

    pub fn decay_activity(&mut self) {
        self.activity = self.activity.saturating_sub(1);
    }

    // ------------------------------------------------------------------
    // persistence snapshots
    // ------------------------------------------------------------------

    pub fn accounts_snapshot(&self) -> Vec<String> {
        self.tracked.clone()
    }

    /// Most recent `SEEN_IDS_LIMIT` ids, oldest first.
    pub fn seen_snapshot(&self) -> Vec<String> {
        let skip = self.seen_order.len().saturating_sub(SEEN_IDS_LIMIT);
        self.seen_order.iter().skip(skip).cloned().collect()
    }

    pub fn bootstrap_snapshot(&self) -> HashMap<String, bool> {
        self.bootstrapped.clone()
    }
}

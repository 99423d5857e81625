//! Sent-state tracking
//!
//! Three categories (files, data sources, skills) each carry three sets:
//! what the user has selected, what has already reached the remote thread,
//! and what is queued for re-delivery. The next delta is
//! `(selected - sent) ∪ pending`. Sent state only changes after a send
//! succeeds, so a failed send recomputes the same delta on retry.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of shareable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Files,
    DataSources,
    Skills,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Files, Category::DataSources, Category::Skills];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Files => "file",
            Category::DataSources => "data source",
            Category::Skills => "skill",
        })
    }
}

/// `(selected - sent) ∪ pending`, selection order first, then the remaining
/// pending ids in sorted order.
pub fn compute_delta(
    selected: &[String],
    sent: &BTreeSet<String>,
    pending: &BTreeSet<String>,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in selected {
        if (!sent.contains(id) || pending.contains(id)) && !out.contains(id) {
            out.push(id.clone());
        }
    }
    for id in pending {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

/// `sent ∪ to_send`
pub fn commit(sent: &BTreeSet<String>, to_send: &[String]) -> BTreeSet<String> {
    let mut next = sent.clone();
    next.extend(to_send.iter().cloned());
    next
}

/// `pending − delivered`
pub fn clear_delivered(pending: &BTreeSet<String>, delivered: &[String]) -> BTreeSet<String> {
    let mut next = pending.clone();
    for id in delivered {
        next.remove(id);
    }
    next
}

/// `pending ∪ {id}`
pub fn queue_refresh(pending: &BTreeSet<String>, id: &str) -> BTreeSet<String> {
    let mut next = pending.clone();
    next.insert(id.to_string());
    next
}

/// Items to deliver on the next send, per category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub files: Vec<String>,
    pub data_sources: Vec<String>,
    pub skills: Vec<String>,
}

impl Delta {
    pub fn get(&self, category: Category) -> &[String] {
        match category {
            Category::Files => &self.files,
            Category::DataSources => &self.data_sources,
            Category::Skills => &self.skills,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.data_sources.is_empty() && self.skills.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len() + self.data_sources.len() + self.skills.len()
    }
}

/// Per-conversation record of delivered and queued items.
///
/// Field names match the persisted conversation record, which flattens this struct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentState {
    pub sent_files: BTreeSet<String>,
    pub sent_data_sources: BTreeSet<String>,
    pub sent_skills: BTreeSet<String>,
    pub pending_refresh_files: BTreeSet<String>,
    pub pending_refresh_data_sources: BTreeSet<String>,
    pub pending_refresh_skills: BTreeSet<String>,
}

impl SentState {
    pub fn sent(&self, category: Category) -> &BTreeSet<String> {
        match category {
            Category::Files => &self.sent_files,
            Category::DataSources => &self.sent_data_sources,
            Category::Skills => &self.sent_skills,
        }
    }

    pub fn pending(&self, category: Category) -> &BTreeSet<String> {
        match category {
            Category::Files => &self.pending_refresh_files,
            Category::DataSources => &self.pending_refresh_data_sources,
            Category::Skills => &self.pending_refresh_skills,
        }
    }

    fn sent_mut(&mut self, category: Category) -> &mut BTreeSet<String> {
        match category {
            Category::Files => &mut self.sent_files,
            Category::DataSources => &mut self.sent_data_sources,
            Category::Skills => &mut self.sent_skills,
        }
    }

    fn pending_mut(&mut self, category: Category) -> &mut BTreeSet<String> {
        match category {
            Category::Files => &mut self.pending_refresh_files,
            Category::DataSources => &mut self.pending_refresh_data_sources,
            Category::Skills => &mut self.pending_refresh_skills,
        }
    }

    /// Mark `delivered` as sent and drop those ids from the pending sets.
    ///
    /// Pending ids that were not delivered stay queued.
    pub fn commit(&mut self, delivered: &Delta) {
        for category in Category::ALL {
            let items = delivered.get(category);
            let sent = commit(self.sent(category), items);
            let pending = clear_delivered(self.pending(category), items);
            *self.sent_mut(category) = sent;
            *self.pending_mut(category) = pending;
        }
    }

    /// Queue `id` without validation; see [`SentStateTracker::queue_refresh`]
    pub fn queue(&mut self, category: Category, id: &str) {
        let next = queue_refresh(self.pending(category), id);
        *self.pending_mut(category) = next;
    }

    pub fn has_pending(&self) -> bool {
        Category::ALL.iter().any(|c| !self.pending(*c).is_empty())
    }
}

/// Ambient sources: small, always rendered in full, not tracked per item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ambient {
    Config,
    Session,
    Git,
}

impl std::str::FromStr for Ambient {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "config" => Ok(Ambient::Config),
            "session" => Ok(Ambient::Session),
            "git" => Ok(Ambient::Git),
            other => Err(format!("unknown ambient source '{}'", other)),
        }
    }
}

/// What the user has ticked for sharing. Session-level: it survives
/// switching conversations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    files: Vec<String>,
    data_sources: Vec<String>,
    skills: Vec<String>,
    pub config: bool,
    pub session: bool,
    pub git: bool,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            data_sources: Vec::new(),
            skills: Vec::new(),
            config: true,
            session: true,
            git: false,
        }
    }
}

impl Selection {
    pub fn items(&self, category: Category) -> &[String] {
        match category {
            Category::Files => &self.files,
            Category::DataSources => &self.data_sources,
            Category::Skills => &self.skills,
        }
    }

    fn items_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::Files => &mut self.files,
            Category::DataSources => &mut self.data_sources,
            Category::Skills => &mut self.skills,
        }
    }

    /// Add an item, keeping first-selection order. Returns false if already selected.
    pub fn select(&mut self, category: Category, id: impl Into<String>) -> bool {
        let id = id.into();
        let items = self.items_mut(category);
        if items.contains(&id) {
            return false;
        }
        items.push(id);
        true
    }

    pub fn deselect(&mut self, category: Category, id: &str) -> bool {
        let items = self.items_mut(category);
        let before = items.len();
        items.retain(|i| i != id);
        items.len() != before
    }

    pub fn is_selected(&self, category: Category, id: &str) -> bool {
        self.items(category).iter().any(|i| i == id)
    }

    pub fn set_ambient(&mut self, which: Ambient, on: bool) {
        match which {
            Ambient::Config => self.config = on,
            Ambient::Session => self.session = on,
            Ambient::Git => self.git = on,
        }
    }

    pub fn has_ambient(&self) -> bool {
        self.config || self.session || self.git
    }
}

/// How an item relates to the current conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Not yet delivered
    New,
    /// Delivered and unchanged
    Sent,
    /// Delivered but queued for re-delivery
    PendingRefresh,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemStatus::New => "new",
            ItemStatus::Sent => "sent",
            ItemStatus::PendingRefresh => "pending",
        })
    }
}

/// Session selection plus the active conversation's sent state
#[derive(Debug, Clone, Default)]
pub struct SentStateTracker {
    pub selection: Selection,
    active: SentState,
    token_estimate: u64,
}

impl SentStateTracker {
    pub fn new(selection: Selection) -> Self {
        Self {
            selection,
            ..Self::default()
        }
    }

    pub fn active(&self) -> &SentState {
        &self.active
    }

    pub fn token_estimate(&self) -> u64 {
        self.token_estimate
    }

    /// Replace the active state, as when switching conversations
    pub fn restore(&mut self, state: SentState, token_estimate: u64) {
        self.active = state;
        self.token_estimate = token_estimate;
    }

    /// Forget the active state, as when no conversation is current
    pub fn clear(&mut self) {
        self.restore(SentState::default(), 0);
    }

    pub fn compute_delta(&self) -> Delta {
        let delta_for = |category| {
            compute_delta(
                self.selection.items(category),
                self.active.sent(category),
                self.active.pending(category),
            )
        };
        Delta {
            files: delta_for(Category::Files),
            data_sources: delta_for(Category::DataSources),
            skills: delta_for(Category::Skills),
        }
    }

    /// Check a refresh request against `selected ∪ sent`
    pub fn validate_refresh(&self, category: Category, id: &str) -> Result<()> {
        if self.selection.is_selected(category, id) || self.active.sent(category).contains(id) {
            Ok(())
        } else {
            Err(Error::InvalidRefresh {
                category,
                id: id.to_string(),
            })
        }
    }

    /// Queue a refresh on the active state. Idempotent.
    pub fn queue_refresh(&mut self, category: Category, id: &str) -> Result<()> {
        self.validate_refresh(category, id)?;
        self.active.queue(category, id);
        Ok(())
    }

    pub fn status_of(&self, category: Category, id: &str) -> ItemStatus {
        if self.active.pending(category).contains(id) {
            ItemStatus::PendingRefresh
        } else if self.active.sent(category).contains(id) {
            ItemStatus::Sent
        } else {
            ItemStatus::New
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_delta_new_and_pending() {
        let delta = compute_delta(&list(&["c", "a", "b"]), &set(&["a"]), &set(&["z", "a"]));
        // selection order first, then leftover pending sorted
        assert_eq!(delta, list(&["c", "a", "b", "z"]));
    }

    #[test]
    fn test_delta_is_idempotent() {
        let selected = list(&["x", "y", "w"]);
        let sent = set(&["y"]);
        let pending = set(&["q"]);
        assert_eq!(
            compute_delta(&selected, &sent, &pending),
            compute_delta(&selected, &sent, &pending)
        );
    }

    #[test]
    fn test_commit_is_monotone() {
        let sent = set(&["a", "b"]);
        let to_send = list(&["b", "c"]);
        let next = commit(&sent, &to_send);
        assert!(next.is_superset(&sent));
        assert!(to_send.iter().all(|id| next.contains(id)));
    }

    #[test]
    fn test_no_double_send() {
        let selected = list(&["a", "b"]);
        let sent = commit(&BTreeSet::new(), &compute_delta(&selected, &BTreeSet::new(), &BTreeSet::new()));
        let sent_so_far: Vec<String> = sent.iter().cloned().collect();
        assert!(compute_delta(&sent_so_far, &sent, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_queue_refresh_is_idempotent() {
        let once = queue_refresh(&BTreeSet::new(), "a");
        let twice = queue_refresh(&once, "a");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_refresh_scenario() {
        let mut tracker = SentStateTracker::default();
        tracker.selection.select(Category::Files, "A");
        let delta = tracker.compute_delta();
        assert_eq!(delta.files, list(&["A"]));

        let mut state = tracker.active().clone();
        state.commit(&delta);
        tracker.restore(state, 10);
        assert!(tracker.compute_delta().is_empty());
        assert_eq!(tracker.status_of(Category::Files, "A"), ItemStatus::Sent);

        tracker.queue_refresh(Category::Files, "A").unwrap();
        assert_eq!(tracker.compute_delta().files, list(&["A"]));
        assert_eq!(
            tracker.status_of(Category::Files, "A"),
            ItemStatus::PendingRefresh
        );
    }

    #[test]
    fn test_refresh_of_deselected_but_sent_item() {
        let mut tracker = SentStateTracker::default();
        let mut state = SentState::default();
        state.sent_data_sources.insert("sales".into());
        tracker.restore(state, 0);

        tracker.queue_refresh(Category::DataSources, "sales").unwrap();
        assert_eq!(tracker.compute_delta().data_sources, list(&["sales"]));
    }

    #[test]
    fn test_refresh_rejects_unknown_item() {
        let mut tracker = SentStateTracker::default();
        let err = tracker.queue_refresh(Category::Skills, "ghost").unwrap_err();
        assert!(matches!(err, Error::InvalidRefresh { category: Category::Skills, .. }));
        assert!(!tracker.active().has_pending());
    }

    #[test]
    fn test_commit_clears_only_delivered_pending() {
        let mut state = SentState::default();
        state.queue(Category::Files, "a");
        state.queue(Category::Files, "b");
        state.queue(Category::Skills, "s");
        state.commit(&Delta {
            files: list(&["a"]),
            skills: list(&["s"]),
            ..Default::default()
        });
        assert!(state.sent_files.contains("a"));
        assert_eq!(state.pending_refresh_files, set(&["b"]));
        assert!(state.pending_refresh_skills.is_empty());
    }

    #[test]
    fn test_clear_delivered() {
        assert_eq!(clear_delivered(&set(&["a", "b"]), &list(&["b", "c"])), set(&["a"]));
        assert!(clear_delivered(&BTreeSet::new(), &list(&["a"])).is_empty());
    }

    #[test]
    fn test_restore_and_clear() {
        let mut tracker = SentStateTracker::default();
        let mut state = SentState::default();
        state.sent_skills.insert("review".into());
        tracker.restore(state, 42);
        assert_eq!(tracker.token_estimate(), 42);
        assert_eq!(tracker.status_of(Category::Skills, "review"), ItemStatus::Sent);

        tracker.clear();
        assert_eq!(tracker.token_estimate(), 0);
        assert_eq!(tracker.status_of(Category::Skills, "review"), ItemStatus::New);
    }

    #[test]
    fn test_selection_keeps_order_and_dedupes() {
        let mut selection = Selection::default();
        assert!(selection.select(Category::Files, "b"));
        assert!(selection.select(Category::Files, "a"));
        assert!(!selection.select(Category::Files, "b"));
        assert_eq!(selection.items(Category::Files), &list(&["b", "a"])[..]);
        assert!(selection.deselect(Category::Files, "b"));
        assert!(!selection.deselect(Category::Files, "b"));
    }

    #[test]
    fn test_ambient_parse_and_toggle() {
        let mut selection = Selection::default();
        assert!(selection.has_ambient());
        selection.set_ambient("config".parse().unwrap(), false);
        selection.set_ambient(Ambient::Session, false);
        assert!(!selection.has_ambient());
        assert!("vcs".parse::<Ambient>().is_err());
    }
}

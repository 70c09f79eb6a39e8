//! Stage entity store: the authoritative local copy of every stage.
//!
//! DESIGN
//! ======
//! Stages live in an `Arc<HashMap<StageId, Arc<Stage>>>`. Every mutation is
//! copy-on-write: the map is cloned only if a reader still holds a snapshot,
//! and an update replaces exactly one `Arc<Stage>` entry, so sibling entries
//! stay pointer-identical. Readers always see a fully formed snapshot.
//!
//! RECONCILIATION
//! ==============
//! Push updates are idempotent field sets, not deltas. While a full refresh
//! is in flight, updates are applied *and* journaled; when the snapshot
//! lands the journal is replayed on top, so a push that raced the fetch is
//! not lost. Outside a refresh the last write wins. Duplicate deliveries
//! with unchanged values are no-ops and do not bump the revision.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::net::types::{CurrentAction, SessionStatus, SessionSummary, Stage, StageId, StageStatus};

/// Session lifecycle transition carried by push events and bulk actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionTransition {
    Live,
    Paused,
    Ended,
}

impl SessionTransition {
    #[must_use]
    pub fn action(self) -> CurrentAction {
        match self {
            Self::Live => CurrentAction::SessionLiveListening,
            Self::Paused => CurrentAction::SessionLiveListeningPaused,
            Self::Ended => CurrentAction::SessionEnd,
        }
    }
}

/// A field-level update targeting one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageUpdate {
    Status { stage: StageId, status: StageStatus },
    Session { stage: StageId, session_id: String, transition: SessionTransition },
    AutoAv { stage: StageId, enabled: bool },
}

impl StageUpdate {
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Status { stage, .. } | Self::Session { stage, .. } | Self::AutoAv { stage, .. } => stage,
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Immutable view of the stage index at one instant. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct StageSnapshot {
    stages: Arc<HashMap<StageId, Arc<Stage>>>,
    order: Arc<Vec<StageId>>,
    sessions: Arc<HashMap<StageId, Arc<Vec<SessionSummary>>>>,
}

impl StageSnapshot {
    /// Build a snapshot directly from a stage list (fetch order preserved).
    #[must_use]
    pub fn from_stages(stages: Vec<Stage>) -> Self {
        let (stages, order) = index_stages(stages);
        Self { stages: Arc::new(stages), order: Arc::new(order), sessions: Arc::default() }
    }

    #[must_use]
    pub fn get(&self, stage_id: &str) -> Option<&Arc<Stage>> {
        self.stages.get(stage_id)
    }

    /// Stages in fetch order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Stage>> {
        self.order.iter().filter_map(|id| self.stages.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sessions known for a stage: the lazily loaded list if present,
    /// otherwise whatever the stage list embedded.
    #[must_use]
    pub fn sessions_for<'a>(&'a self, stage: &'a Stage) -> &'a [SessionSummary] {
        self.sessions
            .get(&stage.id)
            .map_or(stage.sessions.as_slice(), |s| s.as_slice())
    }
}

fn index_stages(stages: Vec<Stage>) -> (HashMap<StageId, Arc<Stage>>, Vec<StageId>) {
    let mut map = HashMap::with_capacity(stages.len());
    let mut order = Vec::with_capacity(stages.len());
    for stage in stages {
        if !map.contains_key(&stage.id) {
            order.push(stage.id.clone());
        }
        map.insert(stage.id.clone(), Arc::new(stage));
    }
    (map, order)
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Clone, Debug, Default)]
pub struct StageStore {
    snapshot: StageSnapshot,
    sessions_loading: Arc<HashSet<StageId>>,
    session_errors: Arc<HashMap<StageId, String>>,
    /// Updates seen since the in-flight refresh started.
    refresh_journal: Option<Vec<StageUpdate>>,
    error: Option<String>,
    rev: u64,
}

impl StageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Later mutations never alter a returned snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StageSnapshot {
        self.snapshot.clone()
    }

    #[must_use]
    pub fn get(&self, stage_id: &str) -> Option<&Arc<Stage>> {
        self.snapshot.get(stage_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Stage>> {
        self.snapshot.iter()
    }

    #[must_use]
    pub fn rev(&self) -> u64 {
        self.rev
    }

    /// True while a full stage fetch is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.refresh_journal.is_some()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    // -------------------------------------------------------------------------
    // Full refresh
    // -------------------------------------------------------------------------

    /// Mark a full fetch as started. Returns `false` if one is already in flight.
    pub fn begin_refresh(&mut self) -> bool {
        if self.refresh_journal.is_some() {
            return false;
        }
        self.refresh_journal = Some(Vec::new());
        self.rev += 1;
        true
    }

    /// Atomically swap the whole stage index for a fresh fetch result.
    ///
    /// Updates journaled since `begin_refresh` are replayed on the new index.
    /// Session caches for stages that disappeared are dropped. Returns the
    /// ids that are no longer present.
    pub fn replace_all(&mut self, stages: Vec<Stage>) -> Vec<StageId> {
        let (map, order) = index_stages(stages);
        let removed: Vec<StageId> = self
            .snapshot
            .order
            .iter()
            .filter(|id| !map.contains_key(*id))
            .cloned()
            .collect();

        let sessions: HashMap<StageId, Arc<Vec<SessionSummary>>> = self
            .snapshot
            .sessions
            .iter()
            .filter(|(id, _)| map.contains_key(*id))
            .map(|(id, s)| (id.clone(), Arc::clone(s)))
            .collect();

        self.snapshot = StageSnapshot { stages: Arc::new(map), order: Arc::new(order), sessions: Arc::new(sessions) };
        if !removed.is_empty() {
            let loading = Arc::make_mut(&mut self.sessions_loading);
            let errors = Arc::make_mut(&mut self.session_errors);
            for id in &removed {
                loading.remove(id);
                errors.remove(id);
            }
        }
        self.error = None;
        self.rev += 1;

        if let Some(journal) = self.refresh_journal.take() {
            for update in &journal {
                self.apply_unjournaled(update);
            }
        }
        removed
    }

    /// Record a failed full fetch. The previous index stays untouched.
    pub fn fail_refresh(&mut self, message: String) {
        self.refresh_journal = None;
        self.error = Some(message);
        self.rev += 1;
    }

    // -------------------------------------------------------------------------
    // Partial updates
    // -------------------------------------------------------------------------

    /// Apply one field-level update. Returns `true` if anything changed.
    ///
    /// Updates for unknown stages are ignored: the stage may have been
    /// removed by a concurrent full refresh.
    pub fn apply(&mut self, update: &StageUpdate) -> bool {
        if let Some(journal) = self.refresh_journal.as_mut() {
            journal.push(update.clone());
        }
        self.apply_unjournaled(update)
    }

    fn apply_unjournaled(&mut self, update: &StageUpdate) -> bool {
        match update {
            StageUpdate::Status { stage, status } => self.update_status(stage, *status),
            StageUpdate::Session { stage, session_id, transition } => {
                self.update_session(stage, session_id, *transition)
            }
            StageUpdate::AutoAv { stage, enabled } => self.update_auto_av(stage, *enabled),
        }
    }

    /// Set a stage's status; `is_online` follows the status.
    pub fn update_status(&mut self, stage_id: &str, status: StageStatus) -> bool {
        self.modify(stage_id, |stage| {
            if stage.status == status && stage.is_online == status.is_online() {
                return false;
            }
            stage.status = status;
            stage.is_online = status.is_online();
            true
        })
    }

    /// Bind `session_id` to the stage and set the listening action.
    ///
    /// An `Ended` transition also marks the session `UNDER_REVIEW` in any
    /// loaded session list for that stage.
    pub fn update_session(&mut self, stage_id: &str, session_id: &str, transition: SessionTransition) -> bool {
        let action = transition.action();
        let mut changed = self.modify(stage_id, |stage| {
            let mut touched = false;
            if stage.current_session_id.as_deref() != Some(session_id) {
                stage.current_session_id = Some(session_id.to_owned());
                touched = true;
            }
            if stage.current_action != Some(action) {
                stage.current_action = Some(action);
                touched = true;
            }
            if transition == SessionTransition::Ended {
                touched |= mark_under_review(&mut stage.sessions, session_id);
            }
            touched
        });
        if transition == SessionTransition::Ended && self.snapshot.stages.contains_key(stage_id) {
            changed |= self.mark_cached_under_review(stage_id, session_id);
        }
        changed
    }

    pub fn update_auto_av(&mut self, stage_id: &str, enabled: bool) -> bool {
        self.modify(stage_id, |stage| {
            if stage.auto_av == enabled {
                return false;
            }
            stage.auto_av = enabled;
            true
        })
    }

    /// Copy-on-write edit of exactly one stage. `edit` returns whether it
    /// changed anything; unchanged edits are discarded.
    fn modify(&mut self, stage_id: &str, edit: impl FnOnce(&mut Stage) -> bool) -> bool {
        let Some(current) = self.snapshot.stages.get(stage_id) else {
            debug!(stage = %stage_id, "stage store: update for unknown stage ignored");
            return false;
        };
        let mut next = Stage::clone(current);
        if !edit(&mut next) {
            return false;
        }
        next.last_updated_at = Some(now_ms());
        Arc::make_mut(&mut self.snapshot.stages).insert(stage_id.to_owned(), Arc::new(next));
        self.rev += 1;
        true
    }

    fn mark_cached_under_review(&mut self, stage_id: &str, session_id: &str) -> bool {
        let Some(cached) = self.snapshot.sessions.get(stage_id) else {
            return false;
        };
        let mut next = Vec::clone(cached);
        if !mark_under_review(&mut next, session_id) {
            return false;
        }
        Arc::make_mut(&mut self.snapshot.sessions).insert(stage_id.to_owned(), Arc::new(next));
        self.rev += 1;
        true
    }

    // -------------------------------------------------------------------------
    // Lazy session lists
    // -------------------------------------------------------------------------

    /// Claim the session fetch for a stage.
    ///
    /// Returns `false` (caller must not fetch) if the stage is unknown, a
    /// fetch is already in flight, or the list is already cached.
    pub fn begin_session_fetch(&mut self, stage_id: &str) -> bool {
        if !self.snapshot.stages.contains_key(stage_id)
            || self.sessions_loading.contains(stage_id)
            || self.snapshot.sessions.contains_key(stage_id)
        {
            return false;
        }
        Arc::make_mut(&mut self.sessions_loading).insert(stage_id.to_owned());
        if self.session_errors.contains_key(stage_id) {
            Arc::make_mut(&mut self.session_errors).remove(stage_id);
        }
        self.rev += 1;
        true
    }

    /// Store the outcome of a session fetch claimed by `begin_session_fetch`.
    ///
    /// Results for stages removed by a refresh in the meantime are dropped.
    pub fn complete_session_fetch(&mut self, stage_id: &str, result: Result<Vec<SessionSummary>, String>) {
        let was_loading = Arc::make_mut(&mut self.sessions_loading).remove(stage_id);
        if !was_loading || !self.snapshot.stages.contains_key(stage_id) {
            debug!(stage = %stage_id, "stage store: dropping unclaimed session result");
            return;
        }
        match result {
            Ok(sessions) => {
                Arc::make_mut(&mut self.snapshot.sessions).insert(stage_id.to_owned(), Arc::new(sessions));
            }
            Err(message) => {
                Arc::make_mut(&mut self.session_errors).insert(stage_id.to_owned(), message);
            }
        }
        self.rev += 1;
    }

    /// Forget the cached session list (and error) for one stage.
    pub fn clear_sessions(&mut self, stage_id: &str) -> bool {
        let had_cache = self.snapshot.sessions.contains_key(stage_id);
        let had_error = self.session_errors.contains_key(stage_id);
        if !had_cache && !had_error {
            return false;
        }
        if had_cache {
            Arc::make_mut(&mut self.snapshot.sessions).remove(stage_id);
        }
        if had_error {
            Arc::make_mut(&mut self.session_errors).remove(stage_id);
        }
        self.rev += 1;
        true
    }

    #[must_use]
    pub fn cached_sessions(&self, stage_id: &str) -> Option<&Arc<Vec<SessionSummary>>> {
        self.snapshot.sessions.get(stage_id)
    }

    #[must_use]
    pub fn is_loading_sessions(&self, stage_id: &str) -> bool {
        self.sessions_loading.contains(stage_id)
    }

    #[must_use]
    pub fn session_error(&self, stage_id: &str) -> Option<&str> {
        self.session_errors.get(stage_id).map(String::as_str)
    }
}

fn mark_under_review(sessions: &mut [SessionSummary], session_id: &str) -> bool {
    match sessions.iter_mut().find(|s| s.id == session_id) {
        Some(session) if session.status != SessionStatus::UnderReview => {
            session.status = SessionStatus::UnderReview;
            true
        }
        _ => false,
    }
}

fn now_ms() -> i64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(duration.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "stages_test.rs"]
mod stages_test;

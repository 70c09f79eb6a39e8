//! Console read model: every store plus the two channel routers.
//!
//! DESIGN
//! ======
//! `Console` is a plain owned value. The runtime owns exactly one and applies
//! every event to it in arrival order, so no store needs a lock. Operations
//! that can invalidate the selection (snapshot swap, push update, filter
//! change) prune it before returning; the selection never outlives one
//! operation in an invalid state.
//!
//! NOTIFICATION
//! ============
//! Each store keeps a revision counter. `view_if_changed` composes a fresh
//! [`ConsoleView`] only when the combined revision key moved, which is the
//! equality guard for change notification.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ConsoleError;
use crate::net::backoff::RetryPolicy;
use crate::net::connection::ChannelKind;
use crate::net::router::{ConnectionStatus, EventRouter, StageEvent};
use crate::net::types::{CurrentAction, SessionSummary, Stage, StageId, StageStatus};
use crate::state::selection::{SelectAllState, SelectionPolicy, SelectionStore};
use crate::state::stages::{StageStore, StageUpdate};
use crate::state::transcript::TranscriptState;
use crate::util::bulk_actions::{BulkAction, BulkTarget, compute_targets};
use crate::util::stage_controls::StageControls;
use crate::util::stage_filter::{StageFilter, filter_stages, has_any_location, location_set};

// =============================================================================
// VIEW
// =============================================================================

/// One rendered stage row.
#[derive(Clone, Debug, PartialEq)]
pub struct StageRow {
    pub id: StageId,
    pub name: String,
    pub location: Option<String>,
    pub status: StageStatus,
    pub is_online: bool,
    pub auto_av: bool,
    pub current_session_id: Option<String>,
    pub current_action: Option<CurrentAction>,
    pub last_updated_at: Option<i64>,
    pub selected: bool,
    pub selectable: bool,
    pub controls: StageControls,
    pub sessions: Vec<SessionSummary>,
    pub sessions_loading: bool,
    pub session_error: Option<String>,
    pub action_error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelView {
    pub status: ConnectionStatus,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranscriptView {
    pub stage: Option<StageId>,
    pub channel: ChannelView,
    pub text: String,
    pub lines: usize,
}

/// Everything a console frontend renders, composed from one consistent state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConsoleView {
    pub rows: Vec<StageRow>,
    pub total_stages: usize,
    pub select_all: SelectAllState,
    pub selected: Vec<StageId>,
    pub search: String,
    pub locations: Vec<String>,
    pub show_location_column: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub protocol_error: Option<String>,
    pub admin: ChannelView,
    pub transcript: TranscriptView,
}

impl ConsoleView {
    #[must_use]
    pub fn row(&self, stage_id: &str) -> Option<&StageRow> {
        self.rows.iter().find(|row| row.id == stage_id)
    }
}

type ViewKey = [u64; 6];

// =============================================================================
// CONSOLE
// =============================================================================

pub struct Console {
    stages: StageStore,
    selection: SelectionStore,
    transcript: TranscriptState,
    admin: EventRouter,
    transcript_router: EventRouter,
    protocol_error: Option<String>,
    action_errors: BTreeMap<StageId, String>,
    rev: u64,
    published: Option<ViewKey>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(SelectionPolicy::default(), RetryPolicy::default())
    }
}

impl Console {
    #[must_use]
    pub fn new(policy: SelectionPolicy, retry: RetryPolicy) -> Self {
        Self {
            stages: StageStore::new(),
            selection: SelectionStore::new(policy),
            transcript: TranscriptState::default(),
            admin: EventRouter::new(ChannelKind::Admin, retry),
            transcript_router: EventRouter::new(ChannelKind::Transcript, retry),
            protocol_error: None,
            action_errors: BTreeMap::new(),
            rev: 0,
            published: None,
        }
    }

    #[must_use]
    pub fn stages(&self) -> &StageStore {
        &self.stages
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    #[must_use]
    pub fn transcript(&self) -> &TranscriptState {
        &self.transcript
    }

    #[must_use]
    pub fn router(&self, kind: ChannelKind) -> &EventRouter {
        match kind {
            ChannelKind::Admin => &self.admin,
            ChannelKind::Transcript => &self.transcript_router,
        }
    }

    pub fn router_mut(&mut self, kind: ChannelKind) -> &mut EventRouter {
        match kind {
            ChannelKind::Admin => &mut self.admin,
            ChannelKind::Transcript => &mut self.transcript_router,
        }
    }

    #[must_use]
    pub fn protocol_error(&self) -> Option<&str> {
        self.protocol_error.as_deref()
    }

    #[must_use]
    pub fn action_error(&self, stage_id: &str) -> Option<&str> {
        self.action_errors.get(stage_id).map(String::as_str)
    }

    // -------------------------------------------------------------------------
    // Full refresh
    // -------------------------------------------------------------------------

    pub fn begin_refresh(&mut self) -> bool {
        self.stages.begin_refresh()
    }

    /// Swap in a fresh stage list and drop selections that no longer apply.
    pub fn replace_stages(&mut self, stages: Vec<Stage>) -> Vec<StageId> {
        let removed = self.stages.replace_all(stages);
        for id in &removed {
            self.action_errors.remove(id);
        }
        info!(stages = self.stages.snapshot().len(), removed = removed.len(), "console: stage list replaced");
        self.prune_selection();
        removed
    }

    pub fn fail_refresh(&mut self, err: &ConsoleError) {
        warn!(error = %err, "console: stage fetch failed");
        self.stages.fail_refresh(err.to_string());
    }

    // -------------------------------------------------------------------------
    // Push events
    // -------------------------------------------------------------------------

    /// Decode and apply one inbound frame. Returns `true` if state changed.
    ///
    /// Malformed frames are recorded as the console's protocol error; the
    /// channel keeps running.
    pub fn on_frame(&mut self, kind: ChannelKind, text: &str) -> bool {
        match self.router_mut(kind).on_frame(text) {
            Ok(event) => {
                let cleared = self.protocol_error.take().is_some();
                if cleared {
                    self.rev += 1;
                }
                event.is_some_and(|event| self.apply_event(event)) || cleared
            }
            Err(err) => {
                warn!(channel = %kind, error = %err, "console: dropping malformed frame");
                self.protocol_error = Some(err.to_string());
                self.rev += 1;
                true
            }
        }
    }

    /// Route a decoded event to its one handler.
    pub fn apply_event(&mut self, event: StageEvent) -> bool {
        match event {
            StageEvent::Update(update) => self.apply_update(&update),
            StageEvent::Transcript { stage, line } => self.transcript.apply(&stage, line),
        }
    }

    fn apply_update(&mut self, update: &StageUpdate) -> bool {
        if !self.stages.apply(update) {
            debug!(stage = %update.stage(), "console: update changed nothing");
            return false;
        }
        self.prune_selection();
        true
    }

    // -------------------------------------------------------------------------
    // Selection and filters
    // -------------------------------------------------------------------------

    /// Stages passing the current filter, in fetch order.
    #[must_use]
    pub fn visible_stages(&self) -> Vec<Arc<Stage>> {
        filter_stages(&self.stages.snapshot(), self.selection.filter())
    }

    /// Flip one row. Rows hidden by the filter can be unchecked, not checked.
    pub fn toggle(&mut self, stage_id: &str) -> bool {
        let snapshot = self.stages.snapshot();
        let Some(stage) = snapshot.get(stage_id) else {
            return false;
        };
        if !self.selection.is_selected(stage_id) && !self.selection.filter().matches(stage, &snapshot) {
            return false;
        }
        self.selection.toggle(stage)
    }

    pub fn toggle_all(&mut self) -> bool {
        let visible = self.visible_stages();
        self.selection.toggle_all(&visible)
    }

    pub fn set_search(&mut self, search: &str) -> bool {
        let filter = StageFilter { search: search.to_owned(), ..self.selection.filter().clone() };
        self.set_filters(filter)
    }

    pub fn set_locations<I>(&mut self, locations: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        let filter = StageFilter { locations: locations.into_iter().collect(), ..self.selection.filter().clone() };
        self.set_filters(filter)
    }

    /// Replace the whole filter and prune rows it hides from the selection.
    pub fn set_filters(&mut self, filter: StageFilter) -> bool {
        if !self.selection.set_filters(filter) {
            return false;
        }
        self.prune_selection();
        true
    }

    pub fn clear_selection(&mut self) -> bool {
        self.selection.clear()
    }

    fn prune_selection(&mut self) {
        let visible = self.visible_stages();
        let removed = self.selection.prune_invalid(&visible);
        if !removed.is_empty() {
            debug!(?removed, "console: pruned selection");
        }
    }

    // -------------------------------------------------------------------------
    // Bulk actions
    // -------------------------------------------------------------------------

    /// Resolve the current selection to command targets for `action`.
    #[must_use]
    pub fn bulk_targets(&self, action: BulkAction) -> Vec<BulkTarget> {
        let snapshot = self.stages.snapshot();
        compute_targets(self.selection.selected().iter().map(String::as_str), action, &snapshot)
    }

    /// Record the outcome of one bulk command.
    ///
    /// Success applies the matching session transition locally without
    /// waiting for the push echo; failure is kept per stage.
    pub fn apply_bulk_result(&mut self, action: BulkAction, target: &BulkTarget, result: Result<(), ConsoleError>) {
        match result {
            Ok(()) => {
                self.action_errors.remove(&target.stage);
                let update = StageUpdate::Session {
                    stage: target.stage.clone(),
                    session_id: target.session_id.clone(),
                    transition: action.transition(),
                };
                self.apply_update(&update);
            }
            Err(err) => {
                warn!(stage = %target.stage, %action, error = %err, "console: bulk action failed");
                self.action_errors.insert(target.stage.clone(), err.to_string());
            }
        }
        self.rev += 1;
    }

    /// Record the outcome of an AutoAV toggle for one stage.
    pub fn apply_auto_av_result(&mut self, stage_id: &str, enabled: bool, result: Result<(), ConsoleError>) {
        match result {
            Ok(()) => {
                self.action_errors.remove(stage_id);
                self.apply_update(&StageUpdate::AutoAv { stage: stage_id.to_owned(), enabled });
            }
            Err(err) => {
                warn!(stage = %stage_id, enabled, error = %err, "console: autoAV toggle failed");
                self.action_errors.insert(stage_id.to_owned(), err.to_string());
            }
        }
        self.rev += 1;
    }

    // -------------------------------------------------------------------------
    // Session lists
    // -------------------------------------------------------------------------

    pub fn begin_session_fetch(&mut self, stage_id: &str) -> bool {
        self.stages.begin_session_fetch(stage_id)
    }

    pub fn complete_session_fetch(&mut self, stage_id: &str, result: Result<Vec<SessionSummary>, ConsoleError>) {
        let result = result.map_err(|err| {
            warn!(stage = %stage_id, error = %err, "console: session fetch failed");
            format!("failed to load sessions for stage {stage_id}: {err}")
        });
        self.stages.complete_session_fetch(stage_id, result);
        self.prune_selection();
    }

    pub fn clear_sessions(&mut self, stage_id: &str) -> bool {
        self.stages.clear_sessions(stage_id)
    }

    // -------------------------------------------------------------------------
    // Transcript
    // -------------------------------------------------------------------------

    pub fn set_transcript_stage(&mut self, stage: Option<StageId>) -> bool {
        self.transcript.set_stage(stage)
    }

    // -------------------------------------------------------------------------
    // View
    // -------------------------------------------------------------------------

    fn view_key(&self) -> ViewKey {
        [
            self.stages.rev(),
            self.selection.rev(),
            self.transcript.rev(),
            self.admin.rev(),
            self.transcript_router.rev(),
            self.rev,
        ]
    }

    /// Compose the full view from the current state.
    #[must_use]
    pub fn view(&self) -> ConsoleView {
        let snapshot = self.stages.snapshot();
        let visible = filter_stages(&snapshot, self.selection.filter());
        let policy = self.selection.policy();

        let rows = visible
            .iter()
            .map(|stage| StageRow {
                id: stage.id.clone(),
                name: stage.name.clone(),
                location: stage.location.clone(),
                status: stage.status,
                is_online: stage.is_online,
                auto_av: stage.auto_av,
                current_session_id: stage.current_session_id.clone(),
                current_action: stage.current_action,
                last_updated_at: stage.last_updated_at,
                selected: self.selection.is_selected(&stage.id),
                selectable: policy.is_selectable(stage),
                controls: StageControls::for_stage(stage),
                sessions: snapshot.sessions_for(stage).to_vec(),
                sessions_loading: self.stages.is_loading_sessions(&stage.id),
                session_error: self.stages.session_error(&stage.id).map(str::to_owned),
                action_error: self.action_errors.get(&stage.id).cloned(),
            })
            .collect();

        ConsoleView {
            rows,
            total_stages: snapshot.len(),
            select_all: self.selection.tri_state(&visible),
            selected: self.selection.selected().iter().cloned().collect(),
            search: self.selection.filter().search.clone(),
            locations: location_set(&snapshot).into_iter().collect(),
            show_location_column: has_any_location(&snapshot),
            loading: self.stages.is_loading(),
            error: self.stages.error().map(str::to_owned),
            protocol_error: self.protocol_error.clone(),
            admin: channel_view(&self.admin),
            transcript: TranscriptView {
                stage: self.transcript.stage().map(str::to_owned),
                channel: channel_view(&self.transcript_router),
                text: self.transcript.text(),
                lines: self.transcript.lines().len(),
            },
        }
    }

    /// A fresh view if anything changed since the last one handed out.
    pub fn view_if_changed(&mut self) -> Option<ConsoleView> {
        let key = self.view_key();
        if self.published == Some(key) {
            return None;
        }
        self.published = Some(key);
        Some(self.view())
    }
}

fn channel_view(router: &EventRouter) -> ChannelView {
    ChannelView { status: router.status(), error: router.last_error().map(str::to_owned) }
}

#[cfg(test)]
#[path = "console_test.rs"]
mod console_test;

//! Selection and filter state for bulk actions.
//!
//! SYSTEM CONTEXT
//! ==============
//! The selection is always a subset of the currently visible (filtered)
//! stages that are eligible for selection. "Select all" works against the
//! visible set only; rows that become ineligible (offline, session unbound,
//! handed to AutoAV) are dropped on the next prune pass.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::net::types::{Stage, StageId};
use crate::util::stage_filter::StageFilter;

/// Which rows may be checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Online with a bound session.
    Monitoring,
    /// Online with a bound session and not under AutoAV control.
    #[default]
    BulkAction,
}

impl SelectionPolicy {
    #[must_use]
    pub fn is_selectable(self, stage: &Stage) -> bool {
        let base = stage.is_online && stage.current_session_id.is_some();
        match self {
            Self::Monitoring => base,
            Self::BulkAction => base && !stage.auto_av,
        }
    }
}

/// Tri-state of the "select all" checkbox.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectAllState {
    pub all_selected: bool,
    pub indeterminate: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SelectionStore {
    policy: SelectionPolicy,
    filter: StageFilter,
    selected: BTreeSet<StageId>,
    rev: u64,
}

impl SelectionStore {
    #[must_use]
    pub fn new(policy: SelectionPolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    #[must_use]
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    #[must_use]
    pub fn filter(&self) -> &StageFilter {
        &self.filter
    }

    #[must_use]
    pub fn selected(&self) -> &BTreeSet<StageId> {
        &self.selected
    }

    #[must_use]
    pub fn is_selected(&self, stage_id: &str) -> bool {
        self.selected.contains(stage_id)
    }

    #[must_use]
    pub fn rev(&self) -> u64 {
        self.rev
    }

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------

    /// Replace search text and locations in one step. Blank locations are
    /// dropped. Returns `true` if the filter changed; callers prune afterwards.
    pub fn set_filters(&mut self, mut filter: StageFilter) -> bool {
        filter.locations.retain(|l| !l.trim().is_empty());
        if self.filter == filter {
            return false;
        }
        self.filter = filter;
        self.rev += 1;
        true
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Flip one row. Ineligible rows can be unchecked but never checked.
    pub fn toggle(&mut self, stage: &Stage) -> bool {
        if self.selected.remove(&stage.id) {
            self.rev += 1;
            return true;
        }
        if !self.policy.is_selectable(stage) {
            return false;
        }
        self.selected.insert(stage.id.clone());
        self.rev += 1;
        true
    }

    /// "Select all" against the visible rows only.
    ///
    /// If every selectable visible row is already checked they are all
    /// unchecked; otherwise every selectable visible row is checked.
    pub fn toggle_all(&mut self, visible: &[Arc<Stage>]) -> bool {
        let selectable: Vec<&StageId> = visible
            .iter()
            .filter(|s| self.policy.is_selectable(s))
            .map(|s| &s.id)
            .collect();
        if selectable.is_empty() {
            return false;
        }
        let all_checked = selectable.iter().all(|id| self.selected.contains(*id));
        for id in selectable {
            if all_checked {
                self.selected.remove(id);
            } else {
                self.selected.insert(id.clone());
            }
        }
        self.rev += 1;
        true
    }

    #[must_use]
    pub fn tri_state(&self, visible: &[Arc<Stage>]) -> SelectAllState {
        let visible_count = visible.len();
        let mut selectable_count = 0_usize;
        let mut selected_count = 0_usize;
        for stage in visible {
            if self.policy.is_selectable(stage) {
                selectable_count += 1;
                if self.selected.contains(&stage.id) {
                    selected_count += 1;
                }
            }
        }

        let every_selectable_checked = selectable_count > 0 && selected_count == selectable_count;
        let all_selected = every_selectable_checked && selectable_count == visible_count;
        let partial = selected_count > 0 && selected_count < selectable_count;
        let excludes_rows = every_selectable_checked && selectable_count < visible_count;
        SelectAllState { all_selected, indeterminate: partial || excludes_rows }
    }

    /// Drop every selected id that is not visible or no longer selectable.
    /// Returns the removed ids.
    pub fn prune_invalid(&mut self, visible: &[Arc<Stage>]) -> Vec<StageId> {
        let keep: BTreeSet<&str> = visible
            .iter()
            .filter(|s| self.policy.is_selectable(s))
            .map(|s| s.id.as_str())
            .collect();
        let removed: Vec<StageId> = self
            .selected
            .iter()
            .filter(|id| !keep.contains(id.as_str()))
            .cloned()
            .collect();
        if removed.is_empty() {
            return removed;
        }
        for id in &removed {
            self.selected.remove(id);
        }
        self.rev += 1;
        removed
    }

    pub fn clear(&mut self) -> bool {
        if self.selected.is_empty() {
            return false;
        }
        self.selected.clear();
        self.rev += 1;
        true
    }
}

#[cfg(test)]
#[path = "selection_test.rs"]
mod selection_test;

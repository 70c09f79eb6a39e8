//! Bulk action validation: which selected stages a start/pause/end applies to.
//!
//! `compute_targets` is pure: it reads a snapshot and returns the list of
//! `(stage, session)` pairs the command should be sent for, nothing else.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::net::types::{CurrentAction, Stage, StageId};
use crate::state::stages::{SessionTransition, StageSnapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BulkAction {
    Start,
    Pause,
    End,
}

impl BulkAction {
    pub const ALL: [Self; 3] = [Self::Start, Self::Pause, Self::End];

    /// Local transition applied once the server accepted the command.
    #[must_use]
    pub fn transition(self) -> SessionTransition {
        match self {
            Self::Start => SessionTransition::Live,
            Self::Pause => SessionTransition::Paused,
            Self::End => SessionTransition::Ended,
        }
    }

    /// Transition guard on the stage's current listening action.
    #[must_use]
    pub fn allows(self, current: Option<CurrentAction>) -> bool {
        match self {
            Self::Start => !matches!(
                current,
                Some(CurrentAction::SessionLiveListening | CurrentAction::SessionEnd)
            ),
            Self::Pause => current == Some(CurrentAction::SessionLiveListening),
            Self::End => matches!(
                current,
                Some(CurrentAction::SessionLiveListening | CurrentAction::SessionLiveListeningPaused)
            ),
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Pause => f.write_str("pause"),
            Self::End => f.write_str("end"),
        }
    }
}

impl FromStr for BulkAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "resume" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "end" | "stop" => Ok(Self::End),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// One resolved command target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkTarget {
    pub stage: StageId,
    pub session_id: String,
}

/// Online, bound to a session, and not under AutoAV control.
#[must_use]
pub fn is_actionable(stage: &Stage) -> bool {
    stage.is_online && stage.current_session_id.is_some() && !stage.auto_av
}

/// Whether `action` may be sent to `stage` right now.
#[must_use]
pub fn action_allowed(stage: &Stage, action: BulkAction) -> bool {
    is_actionable(stage) && action.allows(stage.current_action)
}

/// Resolve `stage_ids` to command targets for `action`.
///
/// Unknown ids, ineligible stages and repeated ids are skipped. Output keeps
/// the input order.
#[must_use]
pub fn compute_targets<'a, I>(stage_ids: I, action: BulkAction, snapshot: &StageSnapshot) -> Vec<BulkTarget>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    stage_ids
        .into_iter()
        .filter(|id| seen.insert(*id))
        .filter_map(|id| snapshot.get(id))
        .filter(|stage| action_allowed(stage, action))
        .filter_map(|stage| {
            let session_id = stage.current_session_id.as_ref()?;
            Some(BulkTarget { stage: stage.id.clone(), session_id: session_id.clone() })
        })
        .collect()
}

#[cfg(test)]
#[path = "bulk_actions_test.rs"]
mod bulk_actions_test;

//! Per-stage start/pause/resume/stop affordances.
//!
//! This table is the only place that decides which single-stage controls are
//! enabled; the view model and the CLI both read it.

use crate::net::types::{CurrentAction, Stage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlIcon {
    Start,
    Pause,
    Resume,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageControls {
    pub primary_icon: ControlIcon,
    pub primary_enabled: bool,
    pub stop_enabled: bool,
}

impl StageControls {
    const DISABLED: Self = Self { primary_icon: ControlIcon::Start, primary_enabled: false, stop_enabled: false };

    #[must_use]
    pub fn for_stage(stage: &Stage) -> Self {
        Self::derive(stage.is_online, stage.current_session_id.is_some(), stage.current_action)
    }

    /// `(online, has_session, current_action)` → controls.
    #[must_use]
    pub fn derive(online: bool, has_session: bool, current: Option<CurrentAction>) -> Self {
        if !online || !has_session {
            return Self::DISABLED;
        }
        match current {
            Some(CurrentAction::SessionLiveListening) => {
                Self { primary_icon: ControlIcon::Pause, primary_enabled: true, stop_enabled: true }
            }
            Some(CurrentAction::SessionLiveListeningPaused) => {
                Self { primary_icon: ControlIcon::Resume, primary_enabled: true, stop_enabled: true }
            }
            Some(CurrentAction::SessionEnd) => Self::DISABLED,
            None => Self { primary_icon: ControlIcon::Start, primary_enabled: true, stop_enabled: false },
        }
    }
}

#[cfg(test)]
#[path = "stage_controls_test.rs"]
mod stage_controls_test;

//! Live transcript buffer for the one stage the operator is watching.
//!
//! Lines are keyed by their server timestamp: re-delivery of a line that was
//! already applied (replay after reconnect, duplicate push) is a no-op.

use std::collections::HashSet;

use crate::net::types::{StageId, TranscriptTimestamp};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptLine {
    pub session_id: String,
    pub text: String,
    pub timestamp: TranscriptTimestamp,
}

#[derive(Clone, Debug, Default)]
pub struct TranscriptState {
    stage: Option<StageId>,
    lines: Vec<TranscriptLine>,
    seen: HashSet<TranscriptTimestamp>,
    rev: u64,
}

impl TranscriptState {
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    #[must_use]
    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    #[must_use]
    pub fn rev(&self) -> u64 {
        self.rev
    }

    /// Full transcript text, one line per payload.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Switch the watched stage. Clears the buffer when the stage changes.
    pub fn set_stage(&mut self, stage: Option<StageId>) -> bool {
        if self.stage == stage {
            return false;
        }
        self.stage = stage;
        self.lines.clear();
        self.seen.clear();
        self.rev += 1;
        true
    }

    /// Append a line for `stage`. Lines for other stages and already-seen
    /// timestamps are ignored.
    pub fn apply(&mut self, stage: &str, line: TranscriptLine) -> bool {
        if self.stage.as_deref() != Some(stage) {
            return false;
        }
        if !self.seen.insert(line.timestamp.clone()) {
            return false;
        }
        self.lines.push(line);
        self.rev += 1;
        true
    }
}

#[cfg(test)]
#[path = "transcript_test.rs"]
mod transcript_test;

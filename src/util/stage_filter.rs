//! Derived stage views: search/location filtering and the location set.
//!
//! Every function here is a pure read over a [`StageSnapshot`]; none of them
//! mutate the snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::net::types::Stage;
use crate::state::stages::StageSnapshot;

/// Search text plus location filter as set by the operator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageFilter {
    pub search: String,
    pub locations: BTreeSet<String>,
}

impl StageFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty() && self.locations.is_empty()
    }

    /// Case-insensitive substring match against the stage name, its location
    /// and its session titles, combined with location set membership.
    #[must_use]
    pub fn matches(&self, stage: &Stage, snapshot: &StageSnapshot) -> bool {
        self.matches_locations(stage, snapshot) && self.matches_search(stage, snapshot)
    }

    fn matches_search(&self, stage: &Stage, snapshot: &StageSnapshot) -> bool {
        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hit = |text: &str| text.to_lowercase().contains(&needle);
        hit(&stage.name)
            || stage.location.as_deref().is_some_and(hit)
            || snapshot.sessions_for(stage).iter().any(|s| hit(&s.title))
    }

    fn matches_locations(&self, stage: &Stage, snapshot: &StageSnapshot) -> bool {
        if self.locations.is_empty() {
            return true;
        }
        stage_locations(stage, snapshot).any(|loc| self.locations.contains(loc))
    }
}

/// Stages that pass `filter`, in fetch order.
#[must_use]
pub fn filter_stages(snapshot: &StageSnapshot, filter: &StageFilter) -> Vec<Arc<Stage>> {
    if filter.is_empty() {
        return snapshot.iter().cloned().collect();
    }
    snapshot
        .iter()
        .filter(|stage| filter.matches(stage, snapshot))
        .cloned()
        .collect()
}

/// Every distinct location across stages and their sessions, sorted.
#[must_use]
pub fn location_set(snapshot: &StageSnapshot) -> BTreeSet<String> {
    snapshot
        .iter()
        .flat_map(|stage| stage_locations(stage, snapshot))
        .map(str::to_owned)
        .collect()
}

/// Whether any stage has a location; drives the conditional location column.
#[must_use]
pub fn has_any_location(snapshot: &StageSnapshot) -> bool {
    snapshot
        .iter()
        .any(|stage| stage_locations(stage, snapshot).next().is_some())
}

fn stage_locations<'a>(stage: &'a Stage, snapshot: &'a StageSnapshot) -> impl Iterator<Item = &'a str> {
    stage
        .location
        .as_deref()
        .into_iter()
        .chain(snapshot.sessions_for(stage).iter().filter_map(|s| s.location.as_deref()))
        .filter(|loc| !loc.trim().is_empty())
}

#[cfg(test)]
#[path = "stage_filter_test.rs"]
mod stage_filter_test;

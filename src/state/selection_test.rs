use super::*;
use crate::net::types::StageStatus;

fn stage(id: &str, online: bool, session: Option<&str>, auto_av: bool) -> Arc<Stage> {
    Arc::new(Stage {
        id: id.to_owned(),
        is_online: online,
        status: if online { StageStatus::Online } else { StageStatus::Offline },
        current_session_id: session.map(str::to_owned),
        auto_av,
        ..Stage::default()
    })
}

fn selected(store: &SelectionStore) -> Vec<&str> {
    store.selected().iter().map(String::as_str).collect()
}

// =============================================================
// Eligibility
// =============================================================

#[test]
fn policies_differ_only_on_auto_av() {
    let auto = stage("A", true, Some("s1"), true);
    assert!(SelectionPolicy::Monitoring.is_selectable(&auto));
    assert!(!SelectionPolicy::BulkAction.is_selectable(&auto));

    for policy in [SelectionPolicy::Monitoring, SelectionPolicy::BulkAction] {
        assert!(!policy.is_selectable(&stage("B", false, Some("s1"), false)));
        assert!(!policy.is_selectable(&stage("C", true, None, false)));
        assert!(policy.is_selectable(&stage("D", true, Some("s1"), false)));
    }
}

#[test]
fn toggle_refuses_ineligible_rows() {
    let mut store = SelectionStore::default();
    assert!(!store.toggle(&stage("B", false, None, false)));
    assert!(store.selected().is_empty());
}

#[test]
fn toggle_flips_eligible_row() {
    let mut store = SelectionStore::default();
    let a = stage("A", true, Some("s1"), false);
    assert!(store.toggle(&a));
    assert!(store.is_selected("A"));
    assert!(store.toggle(&a));
    assert!(!store.is_selected("A"));
}

// =============================================================
// Select all
// =============================================================

#[test]
fn toggle_all_selects_only_eligible_visible_rows() {
    let mut store = SelectionStore::default();
    let visible = vec![stage("A", true, Some("s1"), false), stage("B", false, None, false)];
    assert!(store.toggle_all(&visible));
    assert_eq!(selected(&store), vec!["A"]);
}

#[test]
fn toggle_all_twice_clears_the_visible_selection() {
    let mut store = SelectionStore::default();
    let visible = vec![stage("A", true, Some("s1"), false), stage("C", true, Some("s3"), false)];
    store.toggle_all(&visible);
    store.toggle_all(&visible);
    assert!(store.selected().is_empty());
}

#[test]
fn toggle_all_with_partial_selection_selects_the_rest() {
    let mut store = SelectionStore::default();
    let visible = vec![stage("A", true, Some("s1"), false), stage("C", true, Some("s3"), false)];
    store.toggle(&visible[0]);
    store.toggle_all(&visible);
    assert_eq!(selected(&store), vec!["A", "C"]);
}

#[test]
fn toggle_all_with_nothing_selectable_is_a_no_op() {
    let mut store = SelectionStore::default();
    let rev = store.rev();
    assert!(!store.toggle_all(&[stage("B", false, None, false)]));
    assert_eq!(store.rev(), rev);
}

// =============================================================
// Tri-state
// =============================================================

#[test]
fn tri_state_none_selected() {
    let store = SelectionStore::default();
    let visible = vec![stage("A", true, Some("s1"), false)];
    assert_eq!(store.tri_state(&visible), SelectAllState { all_selected: false, indeterminate: false });
}

#[test]
fn tri_state_all_rows_selectable_and_selected() {
    let mut store = SelectionStore::default();
    let visible = vec![stage("A", true, Some("s1"), false), stage("C", true, Some("s3"), false)];
    store.toggle_all(&visible);
    assert_eq!(store.tri_state(&visible), SelectAllState { all_selected: true, indeterminate: false });
}

#[test]
fn tri_state_partial_selection_is_indeterminate() {
    let mut store = SelectionStore::default();
    let visible = vec![stage("A", true, Some("s1"), false), stage("C", true, Some("s3"), false)];
    store.toggle(&visible[0]);
    assert_eq!(store.tri_state(&visible), SelectAllState { all_selected: false, indeterminate: true });
}

#[test]
fn tri_state_full_selectable_subset_with_ineligible_rows_is_indeterminate() {
    let mut store = SelectionStore::default();
    let visible = vec![stage("A", true, Some("s1"), false), stage("B", false, None, false)];
    store.toggle_all(&visible);
    assert_eq!(store.tri_state(&visible), SelectAllState { all_selected: false, indeterminate: true });
}

#[test]
fn tri_state_empty_view() {
    let store = SelectionStore::default();
    assert_eq!(store.tri_state(&[]), SelectAllState::default());
}

// =============================================================
// Pruning and filters
// =============================================================

#[test]
fn prune_drops_rows_that_went_offline() {
    let mut store = SelectionStore::default();
    store.toggle(&stage("A", true, Some("s1"), false));

    let removed = store.prune_invalid(&[stage("A", false, Some("s1"), false)]);
    assert_eq!(removed, vec!["A".to_owned()]);
    assert!(store.selected().is_empty());
}

#[test]
fn prune_drops_rows_no_longer_visible() {
    let mut store = SelectionStore::default();
    store.toggle(&stage("A", true, Some("s1"), false));
    store.toggle(&stage("C", true, Some("s3"), false));

    let removed = store.prune_invalid(&[stage("C", true, Some("s3"), false)]);
    assert_eq!(removed, vec!["A".to_owned()]);
    assert_eq!(selected(&store), vec!["C"]);
}

#[test]
fn prune_drops_rows_handed_to_auto_av() {
    let mut store = SelectionStore::default();
    store.toggle(&stage("A", true, Some("s1"), false));
    store.prune_invalid(&[stage("A", true, Some("s1"), true)]);
    assert!(store.selected().is_empty());
}

#[test]
fn prune_with_nothing_to_remove_keeps_rev() {
    let mut store = SelectionStore::default();
    let a = stage("A", true, Some("s1"), false);
    store.toggle(&a);
    let rev = store.rev();
    assert!(store.prune_invalid(&[a]).is_empty());
    assert_eq!(store.rev(), rev);
}

#[test]
fn set_filters_reports_changes_and_drops_blank_locations() {
    let mut store = SelectionStore::default();
    let hall = StageFilter { search: "hall".to_owned(), ..StageFilter::default() };
    assert!(store.set_filters(hall.clone()));
    assert!(!store.set_filters(hall));

    let north = StageFilter {
        search: "hall".to_owned(),
        locations: ["North".to_owned(), " ".to_owned()].into_iter().collect(),
    };
    assert!(store.set_filters(north));
    assert_eq!(store.filter().locations.len(), 1);
    let rev = store.rev();
    assert!(!store.set_filters(StageFilter {
        search: "hall".to_owned(),
        locations: ["North".to_owned()].into_iter().collect(),
    }));
    assert_eq!(store.rev(), rev);

    assert!(store.set_filters(StageFilter::default()));
    assert!(store.filter().is_empty());
}

#[test]
fn clear_empties_selection() {
    let mut store = SelectionStore::new(SelectionPolicy::Monitoring);
    store.toggle(&stage("A", true, Some("s1"), true));
    assert!(store.clear());
    assert!(!store.clear());
}

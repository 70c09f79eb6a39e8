use super::*;

fn line(text: &str, ts: i64) -> TranscriptLine {
    TranscriptLine { session_id: "s1".to_owned(), text: text.to_owned(), timestamp: TranscriptTimestamp::Millis(ts) }
}

#[test]
fn same_timestamp_twice_appends_once() {
    let mut state = TranscriptState::default();
    state.set_stage(Some("A".to_owned()));

    assert!(state.apply("A", line("hello", 1)));
    assert!(!state.apply("A", line("hello", 1)));
    assert_eq!(state.lines().len(), 1);
    assert_eq!(state.text(), "hello");
}

#[test]
fn lines_accumulate_in_arrival_order() {
    let mut state = TranscriptState::default();
    state.set_stage(Some("A".to_owned()));
    state.apply("A", line("one", 1));
    state.apply("A", line("two", 2));
    assert_eq!(state.text(), "one\ntwo");
}

#[test]
fn lines_for_other_stages_are_ignored() {
    let mut state = TranscriptState::default();
    state.set_stage(Some("A".to_owned()));
    assert!(!state.apply("B", line("stray", 1)));
    assert!(state.lines().is_empty());
}

#[test]
fn nothing_is_buffered_without_a_stage() {
    let mut state = TranscriptState::default();
    assert!(!state.apply("A", line("x", 1)));
}

#[test]
fn switching_stage_clears_buffer_and_dedup_set() {
    let mut state = TranscriptState::default();
    state.set_stage(Some("A".to_owned()));
    state.apply("A", line("a", 1));

    assert!(state.set_stage(Some("B".to_owned())));
    assert!(state.lines().is_empty());
    assert!(state.apply("B", line("b", 1)));
    assert!(!state.set_stage(Some("B".to_owned())));
}

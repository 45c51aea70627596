use cookline_types::{BranchName, BranchState, EVERYONE_SEGMENT, GameId, RunId, SegmentId};

// ── BranchName ───────────────────────────────────────────────────

#[test]
fn plain_branch_is_published() {
    let b = BranchName::parse("1.4").unwrap();
    assert_eq!(b.state(), BranchState::Published);
    assert_eq!(b.base(), "1.4");
}

#[test]
fn working_suffix_detected() {
    let b = BranchName::parse("1.4_working").unwrap();
    assert_eq!(b.state(), BranchState::Working);
    assert_eq!(b.base(), "1.4");
}

#[test]
fn reference_suffix_detected() {
    let b = BranchName::parse("release_reference").unwrap();
    assert_eq!(b.state(), BranchState::Reference);
    assert_eq!(b.base(), "release");
}

#[test]
fn with_state_swaps_suffix() {
    let b = BranchName::parse("1.4_working").unwrap();
    assert_eq!(b.with_state(BranchState::Reference).as_str(), "1.4_reference");
    assert_eq!(b.with_state(BranchState::Published).as_str(), "1.4");
}

#[test]
fn empty_branch_rejected() {
    assert!(BranchName::parse("   ").is_err());
}

#[test]
fn branch_from_str() {
    let b: BranchName = "dev".parse().unwrap();
    assert_eq!(b.to_string(), "dev");
}

// ── GameId / SegmentId ───────────────────────────────────────────

#[test]
fn game_id_display() {
    assert_eq!(GameId::new("g-1").to_string(), "g-1");
}

#[test]
fn everyone_segment() {
    let s = SegmentId::everyone();
    assert!(s.is_everyone());
    assert_eq!(s.as_str(), EVERYONE_SEGMENT);
    assert!(!SegmentId::new("whales").is_everyone());
}

#[test]
fn segment_serializes_transparently() {
    let json = serde_json::to_string(&SegmentId::new("whales")).unwrap();
    assert_eq!(json, "\"whales\"");
}

// ── RunId ────────────────────────────────────────────────────────

#[test]
fn run_ids_are_unique_and_roundtrip() {
    let a = RunId::new();
    let b = RunId::new();
    assert_ne!(a, b);
    assert_eq!(RunId::parse(&a.to_string()).unwrap(), a);
}

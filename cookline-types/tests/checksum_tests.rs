use cookline_types::{BranchName, ChecksumRecord, GameId, canonical_checksum, utf16_checksum};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

fn record(pairs: &[(&str, u64)]) -> ChecksumRecord {
    let game = GameId::new("g1");
    let branch = BranchName::parse("1.0").unwrap();
    pairs
        .iter()
        .fold(ChecksumRecord::new(&game, &branch), |r, (name, sum)| {
            r.with_checksum(*name, *sum)
        })
}

#[test]
fn key_format() {
    let r = record(&[]);
    assert_eq!(r.key, "g1:1.0");
}

#[test]
fn split_key_roundtrip() {
    let (game, branch) = ChecksumRecord::split_key("g1:1.0_working").unwrap();
    assert_eq!(game.as_str(), "g1");
    assert_eq!(branch.as_str(), "1.0_working");
}

#[test]
fn split_key_rejects_missing_separator() {
    assert!(ChecksumRecord::split_key("g1-1.0").is_err());
    assert!(ChecksumRecord::split_key(":1.0").is_err());
}

#[test]
fn changed_collections_reports_diffs_and_presence() {
    let previous = record(&[("offers", 10), ("entities", 20), ("flows", 5)]);
    let current = record(&[("offers", 10), ("entities", 21), ("events", 3)]);
    assert_eq!(
        current.changed_collections(&previous),
        vec!["entities".to_string(), "events".to_string(), "flows".to_string()]
    );
}

#[test]
fn identical_records_have_no_changes() {
    let a = record(&[("offers", 10)]);
    assert!(a.changed_collections(&a.clone()).is_empty());
}

#[test]
fn canonical_form_is_compact() {
    let v = json!({"z": "x", "a": null});
    assert_eq!(canonical_checksum(&v), utf16_checksum(r#"{"a":null,"z":"x"}"#));
}

proptest! {
    #[test]
    fn checksum_is_additive(a in "[ -~]{0,64}", b in "[ -~]{0,64}") {
        let joined = format!("{a}{b}");
        prop_assert_eq!(utf16_checksum(&joined), utf16_checksum(&a) + utf16_checksum(&b));
    }
}

use chrono::Weekday;
use cookline_model::{
    AbTest, ArtifactKind, BalanceModel, Collection, DayRule, EntityNode, FunctionLink, Offer,
    RecurrenceMode, ScheduledEvent, decode,
};
use pretty_assertions::assert_eq;
use serde_json::json;

// ── EntityNode ───────────────────────────────────────────────────

#[test]
fn entity_node_accepts_serialized_config_strings() {
    let doc = json!({
        "nodeID": "sword",
        "name": "Sword",
        "parentCategory": "weapons",
        "mainConfigs": r#"[{"sid":"c1","valueID":"dmg","type":"number"}]"#,
        "inheritedConfigs": ""
    });
    let node: EntityNode = decode(&doc).unwrap();
    assert_eq!(node.parent(), Some("weapons"));
    assert_eq!(node.main_configs.len(), 1);
    assert_eq!(node.main_configs[0].value_id, "dmg");
    assert!(node.inherited_configs.is_empty());
}

#[test]
fn entity_node_accepts_config_arrays() {
    let doc = json!({
        "nodeID": "e",
        "inheritedConfigs": [{"nodeID": "a", "configs": [{"sid": "c1"}]}]
    });
    let node: EntityNode = decode(&doc).unwrap();
    assert_eq!(node.inherited_configs[0].node_id, "a");
    assert_eq!(node.parent(), None);
}

#[test]
fn root_detection_is_case_insensitive() {
    assert!(EntityNode::new("Root", None).is_root());
    assert!(EntityNode::new("root", None).is_root());
    assert!(!EntityNode::new("roots", None).is_root());
}

#[test]
fn empty_parent_is_absent() {
    let node = EntityNode::new("x", Some(""));
    assert_eq!(node.parent(), None);
}

// ── BalanceModel ─────────────────────────────────────────────────

fn model() -> BalanceModel {
    decode(&json!({
        "variables": [{"variableID": "v1", "variableName": "base"}],
        "segments": [
            {"segmentID": "everyone", "overrides": [{"variableID": "v1", "value": 10}]},
            {"segmentID": "whales", "overrides": [{"variableID": "v1", "value": 99}]},
            {"segmentID": "fresh", "overrides": []}
        ],
        "functions": [{"functionID": "f1", "name": "price", "code": "return base;"}],
        "links": [
            {"valueSID": "p", "nodeID": "e", "inheritedFromNodeID": "a",
             "linkedFunctionID": "f1", "outputPath": "result", "valueType": "number (derived)"},
            {"valueSID": "p", "nodeID": "e", "inheritedFromNodeID": null,
             "linkedFunctionID": "f2", "outputPath": "result", "valueType": "number (derived)"}
        ]
    }))
    .unwrap()
}

#[test]
fn variable_value_uses_segment_override() {
    assert_eq!(model().variable_value("v1", "whales"), Some(&json!(99)));
}

#[test]
fn variable_value_falls_back_to_everyone() {
    assert_eq!(model().variable_value("v1", "fresh"), Some(&json!(10)));
    assert_eq!(model().variable_value("v1", "unknown"), Some(&json!(10)));
}

#[test]
fn variable_value_missing_everywhere() {
    assert_eq!(model().variable_value("nope", "whales"), None);
}

#[test]
fn link_for_prefers_authoritative() {
    let m = model();
    let link: &FunctionLink = m.link_for("e", "p").unwrap();
    assert_eq!(link.linked_function_id, "f2");
    assert!(link.is_authoritative());
    assert!(m.link_for("e", "other").is_none());
}

#[test]
fn segment_ids_sorted_with_everyone() {
    assert_eq!(model().segment_ids(), vec!["everyone", "fresh", "whales"]);
    assert_eq!(BalanceModel::default().segment_ids(), vec!["everyone"]);
}

// ── Offers / AB tests ────────────────────────────────────────────

#[test]
fn offer_keeps_unknown_fields() {
    let offer: Offer = decode(&json!({
        "offerID": "o1",
        "name": "Starter",
        "pricing": {"targetCurrency": "entity", "isDerivedAmount": true, "nodeID": "gems"},
        "badge": "hot"
    }))
    .unwrap();
    assert!(offer.pricing.needs_derived_amount());
    assert_eq!(offer.extra.get("badge"), Some(&json!("hot")));
    let back = serde_json::to_value(&offer).unwrap();
    assert_eq!(back["badge"], json!("hot"));
}

#[test]
fn variant_ids_expose_canonical_offer() {
    let offer: Offer = decode(&json!({"offerID": "o1|ab7"})).unwrap();
    assert!(offer.is_variant());
    assert_eq!(offer.canonical_id(), "o1");
}

#[test]
fn ab_test_liveness() {
    let mut test: AbTest = decode(&json!({
        "id": "ab1",
        "startDate": "2026-01-01T00:00:00Z"
    }))
    .unwrap();
    assert!(test.is_live());
    test.paused = true;
    assert!(!test.is_live());
    test.paused = false;
    test.start_date = None;
    assert!(!test.is_live());
}

// ── Events ───────────────────────────────────────────────────────

#[test]
fn event_decodes_recurrence_rules() {
    let event: ScheduledEvent = decode(&json!({
        "id": "ev1",
        "startDate": "2026-03-02T10:00:00Z",
        "durationSecs": 3600,
        "recurring": {
            "mode": "months",
            "everyN": 2,
            "dayRule": {"mode": "nthWeekday", "nth": 2, "weekday": "Tue"}
        },
        "segments": {"allow": [], "deny": ["cheaters"]}
    }))
    .unwrap();
    assert_eq!(event.recurring.mode, RecurrenceMode::Months);
    assert_eq!(event.recurring.every_n, 2);
    assert_eq!(
        event.recurring.day_rule,
        Some(DayRule::NthWeekday { nth: 2, weekday: Weekday::Tue })
    );
    assert!(event.segments.admits("everyone"));
    assert!(!event.segments.admits("cheaters"));
}

#[test]
fn event_defaults_to_single_occurrence() {
    let event: ScheduledEvent = decode(&json!({
        "id": "ev2",
        "startDate": "2026-03-02T10:00:00Z"
    }))
    .unwrap();
    assert_eq!(event.recurring.mode, RecurrenceMode::None);
    assert_eq!(event.recurring.every_n, 1);
    assert!(event.is_active());
}

// ── Kinds ────────────────────────────────────────────────────────

#[test]
fn collection_and_kind_names_roundtrip() {
    for c in Collection::ALL {
        assert_eq!(Collection::parse(c.as_str()), Some(c));
    }
    for k in ArtifactKind::ALL {
        assert_eq!(ArtifactKind::parse(k.as_str()), Some(k));
    }
}

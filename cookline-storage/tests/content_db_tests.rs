use cookline_model::{ArtifactKind, BalanceModelPart, Collection, DerivedType, FunctionLink};
use cookline_storage::{
    BalanceModelReader, ChecksumStore, ContentCache, ContentDb, ContentStore, FunctionLinkWriter,
    NodeReader,
};
use cookline_types::{BranchName, ChecksumRecord, GameId, SegmentId};
use pretty_assertions::assert_eq;
use serde_json::json;

fn game() -> GameId {
    GameId::new("g1")
}

fn branch(name: &str) -> BranchName {
    BranchName::parse(name).unwrap()
}

fn make_link(node: &str, inherited_from: Option<&str>) -> FunctionLink {
    FunctionLink {
        value_sid: "p".into(),
        node_id: node.into(),
        inherited_from_node_id: inherited_from.map(Into::into),
        linked_function_id: "f1".into(),
        output_path: "result".into(),
        value_type: DerivedType::Number,
    }
}

// ── Raw content ─────────────────────────────────────────────────

#[test]
fn find_returns_docs_in_insert_order_with_scope_fields() {
    let db = ContentDb::open_in_memory().unwrap();
    let main = branch("main_working");
    db.insert_items(
        Collection::Offers,
        &game(),
        &main,
        &[json!({"offerID": "b"}), json!({"offerID": "a"})],
    )
    .unwrap();

    let docs = db.find_items(Collection::Offers, &game(), &main).unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["offerID"], json!("b"));
    assert_eq!(docs[1]["offerID"], json!("a"));
    assert_eq!(docs[0]["branch"], json!("main_working"));
    assert_eq!(docs[0]["gameID"], json!("g1"));
    assert!(docs[0]["_id"].is_i64());
}

#[test]
fn find_is_scoped_by_collection_game_and_branch() {
    let db = ContentDb::open_in_memory().unwrap();
    let main = branch("main");
    db.insert_items(Collection::Offers, &game(), &main, &[json!({"offerID": "o"})])
        .unwrap();
    db.insert_items(Collection::Events, &game(), &main, &[json!({"id": "e"})])
        .unwrap();
    db.insert_items(Collection::Offers, &GameId::new("g2"), &main, &[json!({"offerID": "x"})])
        .unwrap();

    assert_eq!(db.find_items(Collection::Offers, &game(), &main).unwrap().len(), 1);
    assert!(db.find_items(Collection::Offers, &game(), &branch("other")).unwrap().is_empty());
}

#[test]
fn insert_drops_incoming_internal_fields() {
    let db = ContentDb::open_in_memory().unwrap();
    let target = branch("v2_reference");
    db.insert_items(
        Collection::Flows,
        &game(),
        &target,
        &[json!({"_id": 99, "__v": 3, "branch": "main", "id": "f"})],
    )
    .unwrap();

    let docs = db.find_items(Collection::Flows, &game(), &target).unwrap();
    assert_eq!(docs[0]["branch"], json!("v2_reference"));
    assert!(docs[0].get("__v").is_none());
    assert_ne!(docs[0]["_id"], json!(99));
}

#[test]
fn insert_rejects_non_objects() {
    let db = ContentDb::open_in_memory().unwrap();
    let err = db
        .insert_items(Collection::Offers, &game(), &branch("main"), &[json!(5)])
        .unwrap_err();
    assert!(err.to_string().contains("JSON objects"));
    assert!(db.find_items(Collection::Offers, &game(), &branch("main")).unwrap().is_empty());
}

#[test]
fn clear_removes_one_branch() {
    let db = ContentDb::open_in_memory().unwrap();
    db.insert_items(Collection::Offers, &game(), &branch("a"), &[json!({"offerID": "1"})])
        .unwrap();
    db.insert_items(Collection::Offers, &game(), &branch("b"), &[json!({"offerID": "2"})])
        .unwrap();
    assert_eq!(db.clear_items(Collection::Offers, &game(), &branch("a")).unwrap(), 1);
    assert_eq!(db.find_items(Collection::Offers, &game(), &branch("b")).unwrap().len(), 1);
}

// ── Typed reads ─────────────────────────────────────────────────

#[tokio::test]
async fn balance_model_loads_requested_parts_only() {
    let db = ContentDb::open_in_memory().unwrap();
    let main = branch("main");
    db.insert_items(
        Collection::BalanceVariables,
        &game(),
        &main,
        &[json!({"variableID": "v1", "variableName": "base"})],
    )
    .unwrap();
    db.insert_items(
        Collection::BalanceFunctions,
        &game(),
        &main,
        &[json!({"functionID": "f1", "name": "f", "code": "return 1;"})],
    )
    .unwrap();

    let model = db
        .get_balance_model(&game(), &main, &[BalanceModelPart::Variables])
        .await
        .unwrap();
    assert_eq!(model.variables.len(), 1);
    assert!(model.functions.is_empty());

    let full = db
        .get_balance_model(&game(), &main, &BalanceModelPart::ALL)
        .await
        .unwrap();
    assert_eq!(full.function("f1").map(|f| f.code.as_str()), Some("return 1;"));
}

#[tokio::test]
async fn planning_nodes_decode_from_documents() {
    let db = ContentDb::open_in_memory().unwrap();
    let main = branch("main");
    db.insert_many(
        Collection::PlanningNodes,
        &game(),
        &main,
        vec![
            json!({"nodeID": "Root"}),
            json!({"nodeID": "A", "parentCategory": "Root", "isCategory": true,
                   "mainConfigs": "[{\"sid\":\"c1\"}]"}),
        ],
    )
    .await
    .unwrap();

    let nodes = db.planning_nodes(&game(), &main).await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes[0].is_root());
    assert_eq!(nodes[1].main_configs[0].sid, "c1");
}

#[tokio::test]
async fn replacing_links_discards_previous_set() {
    let db = ContentDb::open_in_memory().unwrap();
    let main = branch("main");
    db.replace_function_links(&game(), &main, vec![make_link("A", None), make_link("E", Some("A"))])
        .await
        .unwrap();
    db.replace_function_links(&game(), &main, vec![make_link("B", None)])
        .await
        .unwrap();

    let model = db
        .get_balance_model(&game(), &main, &[BalanceModelPart::Links])
        .await
        .unwrap();
    assert_eq!(model.links, vec![make_link("B", None)]);
}

// ── Cooked content ──────────────────────────────────────────────

#[tokio::test]
async fn insert_data_replaces_same_kind_and_segment() {
    let db = ContentDb::open_in_memory().unwrap();
    let main = branch("main");
    let everyone = SegmentId::everyone();
    db.insert_data(ArtifactKind::Offers, json!([1]), &game(), &main, &everyone)
        .await
        .unwrap();
    db.insert_data(ArtifactKind::Offers, json!([2]), &game(), &main, &everyone)
        .await
        .unwrap();
    db.insert_data(ArtifactKind::Events, json!([]), &game(), &main, &everyone)
        .await
        .unwrap();

    assert_eq!(
        db.cooked_config(&game(), &main, ArtifactKind::Offers, &everyone).unwrap(),
        Some(json!([2]))
    );
    let all = db.cooked_artifacts(&game(), &main).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].kind, ArtifactKind::Events);
}

#[test]
fn cooked_config_absent() {
    let db = ContentDb::open_in_memory().unwrap();
    let got = db
        .cooked_config(&game(), &branch("main"), ArtifactKind::Flows, &SegmentId::everyone())
        .unwrap();
    assert_eq!(got, None);
}

// ── Checksums ───────────────────────────────────────────────────

#[tokio::test]
async fn checksum_upsert_overwrites() {
    let db = ContentDb::open_in_memory().unwrap();
    let main = branch("main");
    let first = ChecksumRecord::new(&game(), &main).with_checksum("offers", 10);
    let second = ChecksumRecord::new(&game(), &main).with_checksum("offers", 11);

    db.upsert(&first).await.unwrap();
    db.upsert(&second).await.unwrap();

    let stored = db.get("g1:main").await.unwrap().unwrap();
    assert_eq!(stored, second);
    assert_eq!(db.get("g1:other").await.unwrap(), None);
}

// ── On-disk ─────────────────────────────────────────────────────

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("content.duckdb");
    {
        let db = ContentDb::open(&path).unwrap();
        db.insert_items(Collection::Localization, &game(), &branch("main"), &[json!({"sid": "s"})])
            .unwrap();
    }
    let db = ContentDb::open(&path).unwrap();
    let docs = db
        .find_items(Collection::Localization, &game(), &branch("main"))
        .unwrap();
    assert_eq!(docs.len(), 1);
}

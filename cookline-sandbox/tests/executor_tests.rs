use chrono::{TimeZone, Utc};
use cookline_model::{
    BalanceFunction, BalanceModel, BalanceSegment, BalanceVariable, DerivedType, FunctionLink,
    VariableOverride,
};
use cookline_sandbox::{
    FaultKind, FormulaExecutor, FormulaRequest, ResourceLimits, SandboxError,
};
use cookline_types::SegmentId;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

// ── Helpers ──────────────────────────────────────────────────────

fn function(code: &str) -> BalanceFunction {
    BalanceFunction {
        function_id: "fn-1".into(),
        name: "priceCurve".into(),
        code: code.into(),
    }
}

fn link(output_path: &str, value_type: DerivedType) -> FunctionLink {
    FunctionLink {
        value_sid: "c1".into(),
        node_id: "cat-a".into(),
        inherited_from_node_id: None,
        linked_function_id: "fn-1".into(),
        output_path: output_path.into(),
        value_type,
    }
}

fn model() -> BalanceModel {
    BalanceModel {
        variables: vec![
            BalanceVariable {
                variable_id: "v1".into(),
                variable_name: "baseGold".into(),
                value_type: "number".into(),
            },
            BalanceVariable {
                variable_id: "v2".into(),
                variable_name: "multiplier".into(),
                value_type: "number".into(),
            },
        ],
        segments: vec![
            BalanceSegment {
                segment_id: "everyone".into(),
                overrides: vec![
                    VariableOverride { variable_id: "v1".into(), value: json!(100) },
                    VariableOverride { variable_id: "v2".into(), value: json!(2) },
                ],
            },
            BalanceSegment {
                segment_id: "whales".into(),
                overrides: vec![VariableOverride { variable_id: "v2".into(), value: json!(5) }],
            },
        ],
        ..Default::default()
    }
}

fn request(code: &str, output_path: &str, value_type: DerivedType) -> FormulaRequest {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    FormulaRequest::new(
        &function(code),
        &link(output_path, value_type),
        &model(),
        &SegmentId::everyone(),
        now,
    )
    .unwrap()
}

async fn evaluate(code: &str, output_path: &str, value_type: DerivedType) -> Result<Value, SandboxError> {
    FormulaExecutor::new(ResourceLimits::formula_default())
        .evaluate(&request(code, output_path, value_type))
        .await
}

// ── Extraction and validation ────────────────────────────────────

#[tokio::test]
async fn indexed_output_path_selects_element() {
    let value = evaluate("return [10, 20, 30];", "result[1]", DerivedType::Number).await.unwrap();
    assert_eq!(value, json!(20));
}

#[tokio::test]
async fn dotted_output_path_selects_field() {
    let value = evaluate(
        "return { tiers: [{ price: 5 }, { price: 9 }] };",
        "result.tiers[1].price",
        DerivedType::PriceAmount,
    )
    .await
    .unwrap();
    assert_eq!(value, json!(9));
}

#[tokio::test]
async fn missing_path_yields_null_and_fails_type_check() {
    let err = evaluate("return [1];", "result[5]", DerivedType::Number).await.unwrap_err();
    assert_eq!(
        err,
        SandboxError::TypeMismatch {
            expected: "number (derived)".into(),
            actual: "null".into(),
        }
    );
}

#[tokio::test]
async fn non_integer_price_amount_is_a_type_mismatch() {
    let err = evaluate("return 4.5;", "result", DerivedType::PriceAmount).await.unwrap_err();
    assert_eq!(
        err,
        SandboxError::TypeMismatch {
            expected: "priceAmount (derived)".into(),
            actual: "number".into(),
        }
    );
}

#[tokio::test]
async fn string_and_boolean_results() {
    assert_eq!(
        evaluate("return 'gold_' + 3;", "result", DerivedType::String).await.unwrap(),
        json!("gold_3")
    );
    assert_eq!(
        evaluate("return [1, 2].includes(2);", "result", DerivedType::Boolean).await.unwrap(),
        json!(true)
    );
}

// ── Variable injection ───────────────────────────────────────────

#[tokio::test]
async fn variables_resolve_for_segment_with_fallback() {
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let req = FormulaRequest::new(
        &function("return baseGold * multiplier;"),
        &link("result", DerivedType::Number),
        &model(),
        &SegmentId::new("whales"),
        now,
    )
    .unwrap();
    assert_eq!(
        req.variables,
        vec![("baseGold".to_string(), json!(100)), ("multiplier".to_string(), json!(5))]
    );
    let value = FormulaExecutor::new(ResourceLimits::formula_default())
        .evaluate(&req)
        .await
        .unwrap();
    assert_eq!(value, json!(500));
}

#[test]
fn missing_variable_value_is_a_validation_error() {
    let mut model = model();
    model.variables.push(BalanceVariable {
        variable_id: "v3".into(),
        variable_name: "orphan".into(),
        value_type: "number".into(),
    });
    let err = FormulaRequest::new(
        &function("return 1;"),
        &link("result", DerivedType::Number),
        &model,
        &SegmentId::everyone(),
        Utc::now(),
    )
    .unwrap_err();
    assert!(matches!(&err, SandboxError::Validation(msg) if msg.contains("orphan")), "{err:?}");
}

#[test]
fn empty_output_path_is_a_validation_error() {
    let err = FormulaRequest::new(
        &function("return 1;"),
        &link("  ", DerivedType::Number),
        &model(),
        &SegmentId::everyone(),
        Utc::now(),
    )
    .unwrap_err();
    assert!(matches!(err, SandboxError::Validation(_)));
}

#[tokio::test]
async fn clock_is_frozen_to_request_time() {
    let value = evaluate("return Date.now();", "result", DerivedType::Number).await.unwrap();
    let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap().timestamp_millis();
    assert_eq!(value, json!(expected));
}

// ── Rejection and faults ─────────────────────────────────────────

#[tokio::test]
async fn denied_source_is_rejected() {
    let err = evaluate(r#"const fs = require("fs"); return 1;"#, "result", DerivedType::Number)
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Rejected { .. }), "{err:?}");
}

#[tokio::test]
async fn source_without_return_is_rejected() {
    let err = evaluate("const x = 1;", "result", DerivedType::Number).await.unwrap_err();
    assert!(matches!(err, SandboxError::Rejected { .. }), "{err:?}");
}

#[tokio::test]
async fn infinite_loop_is_stopped() {
    let err = evaluate("while (true) {} return 1;", "result", DerivedType::Number)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            SandboxError::Fault { kind: FaultKind::FuelExhausted { .. } | FaultKind::Timeout { .. } }
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn wall_clock_deadline_is_enforced() {
    let limits = ResourceLimits {
        fuel_per_call: u64::MAX,
        timeout_ms: 50,
        ..ResourceLimits::formula_default()
    };
    let err = FormulaExecutor::new(limits)
        .evaluate(&request("let i = 0; while (true) { i++; } return i;", "result", DerivedType::Number))
        .await
        .unwrap_err();
    assert_eq!(err, SandboxError::fault(FaultKind::Timeout { timeout_ms: 50 }));
}

#[tokio::test]
async fn memory_blowup_trips_the_limit() {
    let limits = ResourceLimits {
        max_memory_bytes: 1024 * 1024,
        timeout_ms: 5_000,
        ..ResourceLimits::formula_default()
    };
    let err = FormulaExecutor::new(limits)
        .evaluate(&request(
            "const a = []; while (true) { a.push([1, 2, 3]); } return a;",
            "result",
            DerivedType::Number,
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SandboxError::fault(FaultKind::MemoryLimit { limit_bytes: 1024 * 1024 })
    );
}

#[tokio::test]
async fn oversized_result_is_refused() {
    let limits = ResourceLimits {
        max_result_bytes: 64,
        ..ResourceLimits::formula_default()
    };
    let err = FormulaExecutor::new(limits)
        .evaluate(&request(
            "const out = []; for (let i = 0; i < 100; i++) out.push(i); return out;",
            "result[0]",
            DerivedType::Number,
        ))
        .await
        .unwrap_err();
    assert!(
        matches!(err, SandboxError::Fault { kind: FaultKind::ResultTooLarge { limit: 64, .. } }),
        "{err:?}"
    );
}

#[tokio::test]
async fn runtime_exception_is_a_fault() {
    let err = evaluate("const o = null; return o.price;", "result", DerivedType::Number)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, SandboxError::Fault { kind: FaultKind::Runtime(msg) } if msg.contains("TypeError")),
        "{err:?}"
    );
}

#[tokio::test]
async fn sandboxes_share_nothing_between_calls() {
    let executor = FormulaExecutor::new(ResourceLimits::formula_default());
    let first = request("var leaked = 41; return leaked + 1;", "result", DerivedType::Number);
    let second = request("return typeof leaked === 'undefined' ? 0 : 1;", "result", DerivedType::Number);
    assert_eq!(executor.evaluate(&first).await.unwrap(), json!(42));
    assert_eq!(executor.evaluate(&second).await.unwrap(), json!(0));
}

#[tokio::test]
async fn concurrent_evaluations_all_complete() {
    let limits = ResourceLimits {
        max_concurrent: 2,
        ..ResourceLimits::formula_default()
    };
    let executor = FormulaExecutor::new(limits);
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8 {
        let executor = executor.clone();
        let req = request(&format!("return {i} * multiplier;"), "result", DerivedType::Number);
        tasks.spawn(async move { executor.evaluate(&req).await });
    }
    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.unwrap().unwrap());
    }
    results.sort_by_key(|v| v.as_i64());
    assert_eq!(results, (0..8).map(|i| json!(i * 2)).collect::<Vec<_>>());
}

#[tokio::test]
async fn growing_strings_trip_the_memory_limit() {
    let limits = ResourceLimits {
        timeout_ms: 10_000,
        ..ResourceLimits::formula_default()
    };
    let source = "
        let s = 'x';
        while (s.length < 2 * 1024 * 1024) s = s + s;
        const keep = [];
        for (let i = 0; i < 40; i++) {
            for (let j = 0; j < 5000; j++) {}
            keep.push(s + i);
        }
        return keep.length;
    ";
    let err = FormulaExecutor::new(limits)
        .evaluate(&request(source, "result", DerivedType::Number))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SandboxError::fault(FaultKind::MemoryLimit { limit_bytes: 8 * 1024 * 1024 })
    );
}

#[tokio::test]
async fn cyclic_return_value_is_a_runtime_fault() {
    let err = evaluate("const a = []; a.push(a, a); return a;", "result", DerivedType::Number)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, SandboxError::Fault { kind: FaultKind::Runtime(msg) } if msg.contains("circular")),
        "{err:?}"
    );
}

#[tokio::test]
async fn runaway_formulas_release_their_permits() {
    let limits = ResourceLimits {
        max_concurrent: 2,
        fuel_per_call: u64::MAX,
        timeout_ms: 50,
        ..ResourceLimits::formula_default()
    };
    let executor = FormulaExecutor::new(limits.clone());
    let runaways = [
        "let i = 0; while (true) { i++; } return i;",
        "const a = []; a.push(a, a); return a;",
        "let a = []; for (let i = 0; i < 40; i++) a = [a, a]; return a;",
    ];

    let mut tasks = tokio::task::JoinSet::new();
    for source in runaways.iter().cycle().take(limits.max_concurrent + 1) {
        let executor = executor.clone();
        let req = request(source, "result", DerivedType::Number);
        tasks.spawn(async move { executor.evaluate(&req).await });
    }
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap();
        assert!(matches!(outcome, Err(SandboxError::Fault { .. })), "{outcome:?}");
    }

    let normal = request("return baseGold * multiplier;", "result", DerivedType::Number);
    let value = tokio::time::timeout(std::time::Duration::from_secs(5), executor.evaluate(&normal))
        .await
        .expect("a permit is free again")
        .unwrap();
    assert_eq!(value, json!(200));
}

//! Property-based tests for the formula sandbox.
//!
//! - Any source containing a denied capability is rejected before execution.
//! - Indexing past the end of a returned array yields `null`, never an error.

use cookline_sandbox::{check_source, extract_output, ResourceLimits, SandboxError};
use proptest::prelude::*;
use serde_json::{json, Value};

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn filler_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9+*; ]{0,40}").unwrap()
}

fn denied_snippet_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        r#"require("fs")"#,
        "process.env.HOME",
        r#"eval("1 + 1")"#,
        "globalThis.x",
        "setTimeout(f, 10)",
        "this.value",
        "obj.__proto__",
        "x.constructor",
        "fetch(url)",
        r#"new Function("return 1")"#,
        "Reflect.ownKeys(o)",
        "await next",
        "import('os')",
    ])
}

// =============================================================================
// DENY-LIST PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn denied_capabilities_are_always_rejected(
        prefix in filler_strategy(),
        snippet in denied_snippet_strategy(),
        suffix in filler_strategy(),
    ) {
        let source = format!("{prefix}\n{snippet};\n{suffix}\nreturn 1;");
        let result = check_source(&source, &ResourceLimits::formula_default());
        prop_assert!(
            matches!(result, Err(SandboxError::Rejected { .. })),
            "expected rejection for {source:?}, got {result:?}"
        );
    }

    #[test]
    fn oversized_sources_are_rejected(extra in 1usize..200) {
        let limits = ResourceLimits { max_source_len: 100, ..ResourceLimits::formula_default() };
        let source = format!("return {};", "1+".repeat(50 + extra) + "1");
        let result = check_source(&source, &limits);
        prop_assert!(matches!(result, Err(SandboxError::Rejected { .. })), "{result:?}");
    }
}

// =============================================================================
// OUTPUT PATH PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn indexing_past_a_short_array_is_null(
        items in prop::collection::vec(any::<i32>(), 0..8),
        overshoot in 0usize..16,
    ) {
        let index = items.len() + overshoot;
        let value = json!(items);
        let extracted = extract_output(&value, &format!("result[{index}]")).unwrap();
        prop_assert_eq!(extracted, Value::Null);
    }

    #[test]
    fn indexing_inside_an_array_returns_the_element(
        items in prop::collection::vec(any::<i32>(), 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let index = pick.index(items.len());
        let value = json!(items);
        let extracted = extract_output(&value, &format!("result[{index}]")).unwrap();
        prop_assert_eq!(extracted, json!(items[index]));
    }
}

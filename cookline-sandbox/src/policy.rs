//! Static checks run on formula source before anything executes.
//!
//! A formula is refused when it references capabilities outside the pure
//! evaluation surface (modules, processes, the network, timers, dynamic
//! code, prototype chains), is too long, or never returns.

use crate::error::{SandboxError, SandboxResult};
use crate::limits::ResourceLimits;
use regex_lite::Regex;
use std::sync::LazyLock;

/// One deny-list rule: a short description and the pattern that trips it.
struct DenyRule {
    what: &'static str,
    pattern: Regex,
}

const DENY_PATTERNS: &[(&str, &str)] = &[
    ("module loading", r"\brequire\s*\("),
    ("module loading", r"\bimport\b"),
    ("module loading", r"\bmodule\s*\."),
    ("process access", r"\bprocess\b"),
    ("process access", r"child_process"),
    ("filesystem access", r"\bfs\s*\."),
    ("filesystem access", r#"['"]fs['"]"#),
    ("dynamic code", r"\beval\s*\("),
    ("dynamic code", r"\bFunction\s*\("),
    ("dynamic code", r"\bnew\s+Function\b"),
    ("constructor access", r"\bconstructor\b"),
    ("prototype manipulation", r"__proto__"),
    ("prototype manipulation", r"\bprototype\b"),
    ("prototype manipulation", r"\b(defineProperty|setPrototypeOf|getPrototypeOf)\b"),
    ("timers", r"\b(setTimeout|setInterval|setImmediate|queueMicrotask)\b"),
    ("ambient globals", r"\b(globalThis|global|window)\b"),
    ("network access", r"\b(fetch|XMLHttpRequest|WebSocket)\b"),
    ("reflection", r"\b(Reflect|Proxy)\b"),
    ("receiver access", r"\bthis\b"),
    ("async execution", r"\b(async|await|Promise)\b"),
    ("raw memory", r"\b(Buffer|SharedArrayBuffer|Atomics|WebAssembly)\b"),
    ("host runtime", r"\b(Deno|Bun)\b"),
];

static DENY_LIST: LazyLock<Vec<DenyRule>> = LazyLock::new(|| {
    DENY_PATTERNS
        .iter()
        .filter_map(|(what, pattern)| {
            Regex::new(pattern).ok().map(|pattern| DenyRule { what, pattern })
        })
        .collect()
});

static RETURN_STMT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\breturn\b").ok());

/// Checks `source` against the deny-list, the length cap and the
/// explicit-return requirement.
pub fn check_source(source: &str, limits: &ResourceLimits) -> SandboxResult<()> {
    let len = source.chars().count();
    if len > limits.max_source_len {
        return Err(SandboxError::rejected(format!(
            "source is {len} characters, limit is {}",
            limits.max_source_len
        )));
    }

    if let Some(rule) = DENY_LIST.iter().find(|rule| rule.pattern.is_match(source)) {
        let matched = rule
            .pattern
            .find(source)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        return Err(SandboxError::rejected(format!(
            "{} is not allowed (`{matched}`)",
            rule.what
        )));
    }

    let has_return = RETURN_STMT
        .as_ref()
        .map(|re| re.is_match(source))
        .unwrap_or(false);
    if !has_return {
        return Err(SandboxError::rejected("formula has no return statement"));
    }
    Ok(())
}

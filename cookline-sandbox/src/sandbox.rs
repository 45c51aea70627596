//! A single-use sandbox instance.

use crate::interp::Interpreter;
use crate::limits::ResourceLimits;
use crate::parser::parse_program;
use crate::error::SandboxResult;
use crate::value::Value;
use std::time::Instant;
use tracing::debug;

/// One formula evaluation. The only scope a formula sees is the injected
/// variables; everything it allocates is released when the sandbox drops,
/// whether the run succeeded or not.
pub struct FormulaSandbox {
    interp: Interpreter,
    label: String,
    started: Instant,
}

impl FormulaSandbox {
    pub fn new(label: impl Into<String>, limits: &ResourceLimits, now_ms: f64) -> Self {
        let label = label.into();
        debug!(function = %label, "Creating formula sandbox");
        Self {
            interp: Interpreter::new(limits, now_ms),
            label,
            started: Instant::now(),
        }
    }

    /// Parses and runs `code` with `variables` bound as mutable locals,
    /// returning the JSON form of the formula's return value.
    pub fn run(
        &mut self,
        code: &str,
        variables: &[(String, serde_json::Value)],
    ) -> SandboxResult<serde_json::Value> {
        let program = parse_program(code)?;
        let env = self.interp.root_scope();
        for (name, json) in variables {
            let value = Value::from_json(json);
            self.interp.adopt(&value)?;
            env.declare(name, value, true);
        }
        self.interp.run_to_json(&program, &env)
    }

    pub fn fuel_consumed(&self) -> u64 {
        self.interp.fuel_consumed()
    }

    pub fn peak_memory_bytes(&self) -> usize {
        self.interp.limiter().peak_memory_bytes()
    }
}

impl Drop for FormulaSandbox {
    fn drop(&mut self) {
        debug!(
            function = %self.label,
            fuel_consumed = self.fuel_consumed(),
            peak_memory_bytes = self.peak_memory_bytes(),
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "Tearing down formula sandbox"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn injected_variables_are_visible() {
        let mut sandbox = FormulaSandbox::new("test", &ResourceLimits::formula_default(), 0.0);
        let vars = vec![
            ("base".to_string(), json!(10)),
            ("tiers".to_string(), json!([1, 2, 3])),
        ];
        let out = sandbox.run("return base * tiers.length;", &vars).unwrap();
        assert_eq!(out, json!(30));
        assert!(sandbox.fuel_consumed() > 0);
    }

    #[test]
    fn undeclared_globals_are_unreachable() {
        let mut sandbox = FormulaSandbox::new("test", &ResourceLimits::formula_default(), 0.0);
        let err = sandbox.run("return console;", &[]).unwrap_err();
        assert!(err.to_string().contains("ReferenceError: console is not defined"));
    }
}

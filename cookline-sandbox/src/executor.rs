//! Formula executor: static checks, bounded execution, output extraction and
//! type validation for one `(function link, segment)` pair.

use crate::error::{FaultKind, SandboxError, SandboxResult};
use crate::limits::ResourceLimits;
use crate::output_path::extract_output;
use crate::policy::check_source;
use crate::sandbox::FormulaSandbox;
use chrono::{DateTime, Utc};
use cookline_model::{BalanceFunction, BalanceModel, DerivedType, FunctionLink};
use cookline_types::SegmentId;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Slack on top of the in-interpreter deadline before the outer timeout
/// gives up on the blocking task.
const TIMEOUT_GRACE_MS: u64 = 200;

/// Everything one evaluation needs, owned so it can cross into a blocking task.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaRequest {
    pub function_id: String,
    pub function_name: String,
    pub code: String,
    pub output_path: String,
    pub value_type: DerivedType,
    pub segment_id: SegmentId,
    /// Injected locals, sorted by name.
    pub variables: Vec<(String, Value)>,
    pub now: DateTime<Utc>,
}

impl FormulaRequest {
    /// Builds a request for `link`, resolving every balance variable for
    /// `segment` (falling back to `everyone`).
    pub fn new(
        function: &BalanceFunction,
        link: &FunctionLink,
        model: &BalanceModel,
        segment: &SegmentId,
        now: DateTime<Utc>,
    ) -> SandboxResult<Self> {
        if link.output_path.trim().is_empty() {
            return Err(SandboxError::Validation(format!(
                "function link for `{}` on node `{}` has no output path",
                link.value_sid, link.node_id
            )));
        }

        let mut variables = Vec::with_capacity(model.variables.len());
        for variable in &model.variables {
            if !is_identifier(&variable.variable_name) {
                return Err(SandboxError::Validation(format!(
                    "variable name `{}` is not a valid identifier",
                    variable.variable_name
                )));
            }
            let value = model
                .variable_value(&variable.variable_id, segment.as_str())
                .ok_or_else(|| {
                    SandboxError::Validation(format!(
                        "variable `{}` has no value for segment `{segment}` or `everyone`",
                        variable.variable_name
                    ))
                })?;
            variables.push((variable.variable_name.clone(), value.clone()));
        }
        variables.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(Self {
            function_id: function.function_id.clone(),
            function_name: function.name.clone(),
            code: function.code.clone(),
            output_path: link.output_path.clone(),
            value_type: link.value_type,
            segment_id: segment.clone(),
            variables,
            now,
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Runs formulas in fresh sandboxes, at most `max_concurrent` at a time.
///
/// Holds no state between calls beyond the limits and the concurrency gate.
#[derive(Clone)]
pub struct FormulaExecutor {
    limits: ResourceLimits,
    semaphore: Arc<Semaphore>,
}

impl FormulaExecutor {
    pub fn new(limits: ResourceLimits) -> Self {
        let permits = limits.max_concurrent.max(1);
        Self {
            limits,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Evaluates the formula and returns the scalar its output path selects.
    pub async fn evaluate(&self, request: &FormulaRequest) -> SandboxResult<Value> {
        if let Err(err) = check_source(&request.code, &self.limits) {
            warn!(function = %request.function_name, error = %err, "Formula rejected");
            return Err(err);
        }

        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SandboxError::runtime("formula executor is shut down"))?;

        let limits = self.limits.clone();
        let label = request.function_name.clone();
        let code = request.code.clone();
        let variables = request.variables.clone();
        let now_ms = request.now.timestamp_millis() as f64;
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut sandbox = FormulaSandbox::new(label, &limits, now_ms);
            sandbox.run(&code, &variables)
        });

        let outer = Duration::from_millis(self.limits.timeout_ms + TIMEOUT_GRACE_MS);
        let result = match tokio::time::timeout(outer, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                warn!(function = %request.function_name, "Sandbox task panicked: {}", join_err);
                return Err(SandboxError::runtime(format!("sandbox task failed: {join_err}")));
            }
            Err(_) => {
                warn!(function = %request.function_name, "Sandbox missed its deadline");
                return Err(SandboxError::fault(FaultKind::Timeout {
                    timeout_ms: self.limits.timeout_ms,
                }));
            }
        };

        let size = serde_json::to_vec(&result)
            .map_err(|e| SandboxError::runtime(e.to_string()))?
            .len();
        if size > self.limits.max_result_bytes {
            return Err(SandboxError::fault(FaultKind::ResultTooLarge {
                size,
                limit: self.limits.max_result_bytes,
            }));
        }

        let extracted = extract_output(&result, &request.output_path)?;
        request
            .value_type
            .validate(&extracted)
            .map_err(|(expected, actual)| SandboxError::TypeMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            })?;

        debug!(
            function = %request.function_name,
            segment = %request.segment_id,
            output_path = %request.output_path,
            "Formula evaluated"
        );
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("baseGold"));
        assert!(is_identifier("_x$1"));
        assert!(!is_identifier("1st"));
        assert!(!is_identifier("gold amount"));
        assert!(!is_identifier(""));
    }
}

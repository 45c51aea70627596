//! Output-path extraction: selects one value out of a formula result.
//!
//! Grammar: dot-separated segments, each a name followed by any number of
//! `[index]` suffixes, e.g. `result`, `result.tiers[2].price`, `result[1]`.
//! A leading `result` names the returned value; a path that starts with any
//! other name is read relative to it. Missing paths resolve to `null`.

use crate::error::{SandboxError, SandboxResult};
use serde_json::Value;

const ROOT: &str = "result";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Field(String),
    Index(usize),
}

fn parse_path(path: &str) -> SandboxResult<Vec<Step>> {
    let path = path.trim();
    if path.is_empty() {
        return Err(SandboxError::Validation("output path is empty".into()));
    }

    let mut steps = Vec::new();
    for (position, segment) in path.split('.').enumerate() {
        let (name, mut rest) = match segment.find('[') {
            Some(open) => segment.split_at(open),
            None => (segment, ""),
        };
        let name = name.trim();
        if name.is_empty() && !(position == 0 && !rest.is_empty()) {
            return Err(SandboxError::Validation(format!(
                "malformed output path `{path}`: empty segment"
            )));
        }
        if !(position == 0 && name == ROOT) && !name.is_empty() {
            steps.push(Step::Field(name.to_string()));
        }

        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(|| {
                SandboxError::Validation(format!("malformed output path `{path}`: unclosed `[`"))
            })?;
            let inner = rest[1..close].trim();
            let index = inner.parse::<usize>().map_err(|_| {
                SandboxError::Validation(format!(
                    "malformed output path `{path}`: `{inner}` is not a non-negative index"
                ))
            })?;
            steps.push(Step::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(SandboxError::Validation(format!(
                    "malformed output path `{path}`: unexpected `{rest}`"
                )));
            }
        }
    }
    Ok(steps)
}

/// Applies `path` to `value`. Only a malformed path is an error.
pub fn extract_output(value: &Value, path: &str) -> SandboxResult<Value> {
    let steps = parse_path(path)?;
    Ok(walk(value, &steps))
}

fn walk(value: &Value, steps: &[Step]) -> Value {
    let mut current = value;
    for (position, step) in steps.iter().enumerate() {
        let next = match (step, current) {
            (Step::Field(name), Value::Object(map)) => map.get(name),
            (Step::Field(name), Value::Array(items)) if name == "length" => {
                return walk(&Value::from(items.len()), &steps[position + 1..]);
            }
            (Step::Field(name), Value::String(s)) if name == "length" => {
                return walk(&Value::from(s.encode_utf16().count()), &steps[position + 1..]);
            }
            (Step::Index(i), Value::Array(items)) => items.get(*i),
            (Step::Index(i), Value::Object(map)) => map.get(&i.to_string()),
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_result_and_indexed_root() {
        assert_eq!(parse_path("result").unwrap(), vec![]);
        assert_eq!(parse_path(" result[1] ").unwrap(), vec![Step::Index(1)]);
        assert_eq!(parse_path("[0]").unwrap(), vec![Step::Index(0)]);
    }

    #[test]
    fn relative_paths_skip_the_root() {
        assert_eq!(
            parse_path("tiers[2][0].price").unwrap(),
            vec![
                Step::Field("tiers".into()),
                Step::Index(2),
                Step::Index(0),
                Step::Field("price".into())
            ]
        );
    }

    #[test]
    fn length_is_a_step_like_any_other() {
        let result = serde_json::json!({"items": [1, 2, 3], "name": "gold"});
        assert_eq!(extract_output(&result, "result.items.length").unwrap(), serde_json::json!(3));
        assert_eq!(extract_output(&result, "name.length").unwrap(), serde_json::json!(4));
        assert_eq!(extract_output(&result, "result.items.length.x").unwrap(), Value::Null);
        assert_eq!(extract_output(&result, "items.length[0]").unwrap(), Value::Null);
    }

    #[test]
    fn malformed_paths() {
        for bad in ["", "  ", "result[", "result[-1]", "result[x]", "result..a", "result[1]x"] {
            assert!(parse_path(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}

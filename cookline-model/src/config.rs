use cookline_types::EVERYONE_SEGMENT;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One segment's value for a config entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentValue {
    #[serde(rename = "segmentID")]
    pub segment_id: String,
    #[serde(default)]
    pub value: Value,
}

impl SegmentValue {
    pub fn new(segment_id: impl Into<String>, value: Value) -> Self {
        Self {
            segment_id: segment_id.into(),
            value,
        }
    }
}

/// A node in a configuration tree.
///
/// Leaves carry `segments`; containers (maps, lists) carry child `values`.
/// The `everyone` segment entry is the fallback for segments without an
/// entry of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigValue {
    #[serde(default)]
    pub sid: String,
    #[serde(rename = "valueID", default)]
    pub value_id: String,
    #[serde(rename = "type", default)]
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<SegmentValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ConfigValue>,
}

impl ConfigValue {
    pub fn leaf(sid: &str, value_id: &str, value_type: &str, everyone: Value) -> Self {
        Self {
            sid: sid.into(),
            value_id: value_id.into(),
            value_type: value_type.into(),
            segments: vec![SegmentValue::new(EVERYONE_SEGMENT, everyone)],
            values: Vec::new(),
        }
    }

    pub fn group(sid: &str, value_id: &str, values: Vec<ConfigValue>) -> Self {
        Self {
            sid: sid.into(),
            value_id: value_id.into(),
            value_type: "map".into(),
            segments: Vec::new(),
            values,
        }
    }

    /// Key used for duplicate detection and cooked output: the value id,
    /// falling back to the sid for anonymous groups.
    pub fn key(&self) -> &str {
        if self.value_id.is_empty() {
            &self.sid
        } else {
            &self.value_id
        }
    }

    /// Whether this value is computed by a formula at cook time.
    pub fn is_derived(&self) -> bool {
        is_derived_type(&self.value_type)
    }

    /// Returns the value for `segment_id`, falling back to `everyone`.
    pub fn value_for(&self, segment_id: &str) -> Option<&Value> {
        self.segments
            .iter()
            .find(|s| s.segment_id == segment_id)
            .or_else(|| self.segments.iter().find(|s| s.segment_id == EVERYONE_SEGMENT))
            .map(|s| &s.value)
    }

    /// Sets the value for one segment, replacing an existing entry.
    pub fn set_segment(&mut self, segment_id: &str, value: Value) {
        match self.segments.iter_mut().find(|s| s.segment_id == segment_id) {
            Some(entry) => entry.value = value,
            None => self.segments.push(SegmentValue::new(segment_id, value)),
        }
    }

    /// Depth-first search for a value by sid (self included).
    pub fn find_by_sid(&self, sid: &str) -> Option<&ConfigValue> {
        if self.sid == sid {
            return Some(self);
        }
        self.values.iter().find_map(|v| v.find_by_sid(sid))
    }

    /// Visits every value in the subtree, parents before children.
    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut ConfigValue)) {
        visit(self);
        for child in &mut self.values {
            child.walk_mut(visit);
        }
    }

    /// Collapses the tree into plain JSON for one segment: containers become
    /// objects keyed by [`ConfigValue::key`], leaves become their segment value.
    pub fn to_segment_json(&self, segment_id: &str) -> Value {
        if self.values.is_empty() && !self.segments.is_empty() {
            return self.value_for(segment_id).cloned().unwrap_or(Value::Null);
        }
        let mut map = serde_json::Map::new();
        for child in &self.values {
            map.insert(child.key().to_string(), child.to_segment_json(segment_id));
        }
        Value::Object(map)
    }
}

/// Returns `true` when a declared config type is computed by a formula.
pub fn is_derived_type(value_type: &str) -> bool {
    value_type.trim_end().ends_with("(derived)")
}

/// Declared result type of a derived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivedType {
    #[serde(rename = "string (derived)")]
    String,
    #[serde(rename = "number (derived)")]
    Number,
    #[serde(rename = "boolean (derived)")]
    Boolean,
    /// A number that must also be an integer.
    #[serde(rename = "priceAmount (derived)")]
    PriceAmount,
}

impl DerivedType {
    /// Parses a declared type string such as `number (derived)`.
    pub fn parse(declared: &str) -> Option<Self> {
        match declared.trim() {
            "string (derived)" => Some(Self::String),
            "number (derived)" => Some(Self::Number),
            "boolean (derived)" => Some(Self::Boolean),
            "priceAmount (derived)" => Some(Self::PriceAmount),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string (derived)",
            Self::Number => "number (derived)",
            Self::Boolean => "boolean (derived)",
            Self::PriceAmount => "priceAmount (derived)",
        }
    }

    /// Whether `value` satisfies this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::PriceAmount => value
                .as_f64()
                .map(|n| n.is_finite() && n.fract() == 0.0)
                .unwrap_or(false),
        }
    }

    /// Checks `value` against this type, returning `(expected, actual)` on mismatch.
    pub fn validate(&self, value: &Value) -> Result<(), (&'static str, &'static str)> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err((self.as_str(), Self::describe(value)))
        }
    }

    /// Runtime type name of a JSON value, distinguishing non-integer numbers.
    pub fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() || n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
                {
                    "integer"
                } else {
                    "number"
                }
            }
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

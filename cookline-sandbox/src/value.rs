//! Runtime values and scopes for the interpreter.

use crate::ast::FunctionDef;
use crate::error::{FaultKind, SandboxError, SandboxResult};
use crate::limits::TrackingLimiter;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Instant;

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<BTreeMap<String, Value>>>;

/// Built-in namespaces reachable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Math,
    Json,
    Date,
    Array,
    Number,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    MathAbs,
    MathCeil,
    MathFloor,
    MathRound,
    MathTrunc,
    MathSign,
    MathMin,
    MathMax,
    MathPow,
    MathSqrt,
    MathLog,
    MathExp,
    JsonParse,
    JsonStringify,
    DateNow,
    ArrayIsArray,
    NumberIsInteger,
    NumberIsFinite,
    ToNumber,
    ToString,
    ToBoolean,
    ParseInt,
    ParseFloat,
    IsNaN,
    IsFinite,
}

pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: Env,
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Closure>),
    Native(Native),
    Namespace(Namespace),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(items) => write!(f, "[Array({})]", items.borrow().len()),
            Value::Object(map) => write!(f, "[Object({})]", map.borrow().len()),
            Value::Function(_) => f.write_str("[Function]"),
            Value::Native(n) => write!(f, "[Native {n:?}]"),
            Value::Namespace(ns) => write!(f, "[{ns:?}]"),
        }
    }
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: BTreeMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Namespace(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// Numeric conversion following the usual loose-typing rules.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Array(items) => array_to_number(items, &mut Vec::new()),
            _ => f64::NAN,
        }
    }

    /// `"null"` or `"undefined"`, for error messages about nullish receivers.
    pub fn nullish_name(&self) -> &'static str {
        if matches!(self, Value::Null) { "null" } else { "undefined" }
    }

    /// String conversion as used by `+`, `String(..)` and property keys.
    pub fn to_js_string(&self, limiter: &TrackingLimiter) -> SandboxResult<String> {
        let mut out = String::new();
        self.write_js_string(&mut out, limiter)?;
        Ok(out)
    }

    /// Appends the string form of `self` to `out`. `out` never grows past
    /// the bytes `limiter` has left; a cyclic array element renders empty.
    pub fn write_js_string(&self, out: &mut String, limiter: &TrackingLimiter) -> SandboxResult<()> {
        JsStringWriter {
            out,
            limiter,
            ancestors: Vec::new(),
        }
        .write(self)
    }

    /// `===` semantics: reference identity for arrays, objects and functions.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Namespace(a), Value::Namespace(b)) => a == b,
            _ => false,
        }
    }

    /// `==` semantics.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::Str(_))
            | (Value::Str(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }

    /// Approximate heap footprint charged against the memory ceiling.
    pub fn footprint(&self) -> usize {
        match self {
            Value::Str(s) => 16 + s.len(),
            Value::Array(items) => 16 + 16 * items.borrow().len(),
            Value::Object(map) => 32 + 48 * map.borrow().len(),
            _ => 16,
        }
    }

    /// Converts a JSON value into a runtime value.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts to JSON. Integral numbers become integers; non-finite
    /// numbers, `undefined` and functions become `null`. Cycles are a
    /// `TypeError`; size, nesting and time are charged to `budget`.
    pub fn to_json(&self, budget: &mut JsonBudget) -> SandboxResult<serde_json::Value> {
        Ok(match self {
            Value::Undefined
            | Value::Null
            | Value::Function(_)
            | Value::Native(_)
            | Value::Namespace(_) => {
                budget.spend(4)?;
                serde_json::Value::Null
            }
            Value::Bool(b) => {
                budget.spend(5)?;
                serde_json::Value::Bool(*b)
            }
            Value::Number(n) => {
                budget.spend(8)?;
                number_to_json(*n)
            }
            Value::Str(s) => {
                budget.spend(s.len() + 2)?;
                serde_json::Value::String(s.to_string())
            }
            Value::Array(items) => {
                budget.enter(Rc::as_ptr(items) as *const ())?;
                let elements = items.borrow();
                budget.spend(2 + elements.len())?;
                let mut out = Vec::with_capacity(elements.len());
                for element in elements.iter() {
                    out.push(element.to_json(budget)?);
                }
                budget.leave();
                serde_json::Value::Array(out)
            }
            Value::Object(map) => {
                budget.enter(Rc::as_ptr(map) as *const ())?;
                budget.spend(2)?;
                let entries = map.borrow();
                let mut out = serde_json::Map::new();
                for (key, value) in entries.iter() {
                    if matches!(value, Value::Undefined | Value::Function(_) | Value::Native(_)) {
                        continue;
                    }
                    budget.spend(key.len() + 4)?;
                    out.insert(key.clone(), value.to_json(budget)?);
                }
                budget.leave();
                serde_json::Value::Object(out)
            }
        })
    }
}

/// Array and object nesting allowed in string and JSON conversion.
pub const MAX_NESTING: usize = 64;

const JSON_DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// In-memory size of one `serde_json::Value` node, roughly.
const JSON_NODE_BYTES: usize = 48;

type ArrayPtr = *const RefCell<Vec<Value>>;

fn array_to_number(items: &ArrayRef, ancestors: &mut Vec<ArrayPtr>) -> f64 {
    let ptr = Rc::as_ptr(items);
    if ancestors.contains(&ptr) {
        return 0.0;
    }
    if ancestors.len() >= MAX_NESTING {
        return f64::NAN;
    }
    let elements = items.borrow();
    match elements.as_slice() {
        [] | [Value::Undefined | Value::Null] => 0.0,
        [Value::Number(n)] => *n,
        [Value::Str(s)] => string_to_number(s),
        [Value::Array(inner)] => {
            ancestors.push(ptr);
            array_to_number(inner, ancestors)
        }
        _ => f64::NAN,
    }
}

struct JsStringWriter<'a> {
    out: &'a mut String,
    limiter: &'a TrackingLimiter,
    ancestors: Vec<ArrayPtr>,
}

impl JsStringWriter<'_> {
    fn push(&mut self, text: &str) -> SandboxResult<()> {
        if self.out.len().saturating_add(text.len()) > self.limiter.remaining_bytes() {
            return Err(self.limiter.limit_error());
        }
        self.out.push_str(text);
        Ok(())
    }

    fn write(&mut self, value: &Value) -> SandboxResult<()> {
        match value {
            Value::Undefined => self.push("undefined"),
            Value::Null => self.push("null"),
            Value::Bool(b) => self.push(if *b { "true" } else { "false" }),
            Value::Number(n) => self.push(&format_number(*n)),
            Value::Str(s) => self.push(s),
            Value::Object(_) | Value::Namespace(_) => self.push("[object Object]"),
            Value::Function(_) | Value::Native(_) => self.push("function () { [native code] }"),
            Value::Array(items) => self.write_array(items, ","),
        }
    }

    fn write_array(&mut self, items: &ArrayRef, separator: &str) -> SandboxResult<()> {
        let ptr = Rc::as_ptr(items);
        if self.ancestors.contains(&ptr) {
            return Ok(());
        }
        if self.ancestors.len() >= MAX_NESTING {
            return Err(SandboxError::runtime(
                "RangeError: array nesting too deep to convert to string",
            ));
        }
        self.ancestors.push(ptr);
        let elements = items.borrow();
        for (i, element) in elements.iter().enumerate() {
            if i > 0 {
                self.push(separator)?;
            }
            if !element.is_nullish() {
                self.write(element)?;
            }
        }
        self.ancestors.pop();
        Ok(())
    }
}

/// Appends `items` joined by `separator`, bounded and cycle-safe like
/// [`Value::write_js_string`].
pub fn write_joined(
    items: &ArrayRef,
    separator: &str,
    out: &mut String,
    limiter: &TrackingLimiter,
) -> SandboxResult<()> {
    JsStringWriter {
        out,
        limiter,
        ancestors: Vec::new(),
    }
    .write_array(items, separator)
}

/// How a JSON conversion reports running out of room.
#[derive(Debug, Clone, Copy)]
enum JsonOverflow {
    Result,
    Memory { limit_bytes: usize },
}

/// Bounds one JSON conversion: approximate serialized size, nesting, and
/// the evaluation deadline.
#[derive(Debug)]
pub struct JsonBudget {
    max_bytes: usize,
    used: usize,
    /// Extra bytes charged per node, for the tree built before serializing.
    node_cost: usize,
    overflow: JsonOverflow,
    deadline: Instant,
    timeout_ms: u64,
    nodes: u64,
    ancestors: Vec<*const ()>,
}

impl JsonBudget {
    /// Budget for a formula's return value.
    pub fn for_result(max_bytes: usize, deadline: Instant, timeout_ms: u64) -> Self {
        Self::new(max_bytes, 0, JsonOverflow::Result, deadline, timeout_ms)
    }

    /// Budget for `JSON.stringify`: whatever the memory ceiling has left.
    pub fn for_memory(limiter: &TrackingLimiter, deadline: Instant, timeout_ms: u64) -> Self {
        let overflow = JsonOverflow::Memory {
            limit_bytes: limiter.max_memory_bytes(),
        };
        Self::new(limiter.remaining_bytes(), JSON_NODE_BYTES, overflow, deadline, timeout_ms)
    }

    fn new(
        max_bytes: usize,
        node_cost: usize,
        overflow: JsonOverflow,
        deadline: Instant,
        timeout_ms: u64,
    ) -> Self {
        Self {
            max_bytes,
            used: 0,
            node_cost,
            overflow,
            deadline,
            timeout_ms,
            nodes: 0,
            ancestors: Vec::new(),
        }
    }

    fn spend(&mut self, bytes: usize) -> SandboxResult<()> {
        self.used = self.used.saturating_add(bytes + self.node_cost);
        if self.used > self.max_bytes {
            return Err(SandboxError::fault(match self.overflow {
                JsonOverflow::Result => FaultKind::ResultTooLarge {
                    size: self.used,
                    limit: self.max_bytes,
                },
                JsonOverflow::Memory { limit_bytes } => FaultKind::MemoryLimit { limit_bytes },
            }));
        }
        self.nodes += 1;
        if self.nodes % JSON_DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline {
            return Err(SandboxError::fault(FaultKind::Timeout {
                timeout_ms: self.timeout_ms,
            }));
        }
        Ok(())
    }

    fn enter(&mut self, container: *const ()) -> SandboxResult<()> {
        if self.ancestors.contains(&container) {
            return Err(SandboxError::runtime(
                "TypeError: Converting circular structure to JSON",
            ));
        }
        if self.ancestors.len() >= MAX_NESTING {
            return Err(SandboxError::runtime(
                "RangeError: value nesting too deep to convert to JSON",
            ));
        }
        self.ancestors.push(container);
        Ok(())
    }

    fn leave(&mut self) {
        self.ancestors.pop();
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Formats a number the way string conversion does: integers without a
/// fraction, `NaN`, `Infinity`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n == 0.0 {
        "0".into()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{n}")
    }
}

// ── Scopes ───────────────────────────────────────────────────────

struct Binding {
    value: Value,
    mutable: bool,
}

/// A lexical scope. Function scopes also receive `var` declarations.
pub struct Scope {
    vars: RefCell<HashMap<String, Binding>>,
    parent: Option<Env>,
    is_function: bool,
}

pub type Env = Rc<Scope>;

impl Scope {
    pub fn root() -> Env {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent: None,
            is_function: true,
        })
    }

    pub fn child(parent: &Env, is_function: bool) -> Env {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
            is_function,
        })
    }

    /// Visits every value bound directly in this scope.
    pub fn for_each_value(&self, mut visit: impl FnMut(&Value)) {
        if let Ok(vars) = self.vars.try_borrow() {
            vars.values().for_each(|binding| visit(&binding.value));
        }
    }

    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.vars
            .borrow_mut()
            .insert(name.to_string(), Binding { value, mutable });
    }

    /// Declares in the nearest function scope.
    pub fn declare_var(self: &Rc<Self>, name: &str, value: Value) {
        let mut scope = Rc::clone(self);
        while !scope.is_function {
            match &scope.parent {
                Some(parent) => scope = Rc::clone(parent),
                None => break,
            }
        }
        scope.declare(name, value, true);
    }

    /// Drops every binding, breaking closure reference cycles.
    pub fn clear(&self) {
        self.vars.borrow_mut().clear();
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.vars.borrow().get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    pub fn assign(&self, name: &str, value: Value) -> SandboxResult<()> {
        if let Some(binding) = self.vars.borrow_mut().get_mut(name) {
            if !binding.mutable {
                return Err(SandboxError::runtime(format!(
                    "TypeError: assignment to constant variable `{name}`"
                )));
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(SandboxError::runtime(format!(
                "ReferenceError: {name} is not defined"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(20.0), "20");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    fn budget() -> JsonBudget {
        JsonBudget::for_result(1024 * 1024, Instant::now() + std::time::Duration::from_secs(5), 5_000)
    }

    fn limiter() -> TrackingLimiter {
        TrackingLimiter::new(1024 * 1024)
    }

    #[test]
    fn json_conversion_keeps_integers() {
        let v = Value::from_json(&json!({"a": [1, 2.5, null], "b": "x"}));
        assert_eq!(v.to_json(&mut budget()).unwrap(), json!({"a": [1, 2.5, null], "b": "x"}));
        assert_eq!(Value::Number(f64::NAN).to_json(&mut budget()).unwrap(), json!(null));
    }

    #[test]
    fn shared_children_are_not_cycles() {
        let shared = Value::array(vec![Value::Number(1.0)]);
        let outer = Value::array(vec![shared.clone(), shared]);
        assert_eq!(outer.to_json(&mut budget()).unwrap(), json!([[1], [1]]));
    }

    #[test]
    fn cyclic_json_is_a_type_error() {
        let items: ArrayRef = Rc::new(RefCell::new(Vec::new()));
        items.borrow_mut().push(Value::Array(Rc::clone(&items)));
        let err = Value::Array(Rc::clone(&items)).to_json(&mut budget()).unwrap_err();
        assert!(err.to_string().contains("circular structure"), "{err}");
        items.borrow_mut().clear();
    }

    #[test]
    fn json_size_is_bounded_while_converting() {
        let big = Value::array((0..1000).map(|i| Value::Number(f64::from(i))).collect());
        let mut small = JsonBudget::for_result(100, Instant::now() + std::time::Duration::from_secs(5), 5_000);
        let err = big.to_json(&mut small).unwrap_err();
        assert!(
            matches!(err, SandboxError::Fault { kind: FaultKind::ResultTooLarge { limit: 100, .. } }),
            "{err:?}"
        );
    }

    #[test]
    fn cyclic_array_renders_empty_in_strings() {
        let items: ArrayRef = Rc::new(RefCell::new(vec![Value::Number(1.0)]));
        items.borrow_mut().push(Value::Array(Rc::clone(&items)));
        let cyclic = Value::Array(Rc::clone(&items));
        assert_eq!(cyclic.to_js_string(&limiter()).unwrap(), "1,");
        assert!(cyclic.to_number().is_nan());
        items.borrow_mut().clear();

        let alone: ArrayRef = Rc::new(RefCell::new(Vec::new()));
        alone.borrow_mut().push(Value::Array(Rc::clone(&alone)));
        assert_eq!(Value::Array(Rc::clone(&alone)).to_number(), 0.0);
        alone.borrow_mut().clear();
    }

    #[test]
    fn string_conversion_respects_remaining_memory() {
        let limiter = TrackingLimiter::new(10);
        let err = Value::str("more than ten bytes").to_js_string(&limiter).unwrap_err();
        assert_eq!(err, limiter.limit_error());
    }

    #[test]
    fn single_element_arrays_convert_to_numbers() {
        assert_eq!(Value::array(vec![]).to_number(), 0.0);
        assert_eq!(Value::array(vec![Value::str(" 7 ")]).to_number(), 7.0);
        assert_eq!(Value::array(vec![Value::array(vec![Value::Number(5.0)])]).to_number(), 5.0);
        assert!(Value::array(vec![Value::Number(1.0), Value::Number(2.0)]).to_number().is_nan());
    }

    #[test]
    fn loose_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::Number(1.0).loose_equals(&Value::str("1")));
        assert!(Value::Bool(true).loose_equals(&Value::Number(1.0)));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
    }

    #[test]
    fn const_bindings_reject_assignment() {
        let env = Scope::root();
        env.declare("x", Value::Number(1.0), false);
        assert!(env.assign("x", Value::Number(2.0)).is_err());
        assert!(env.assign("missing", Value::Null).is_err());
    }
}

//! The built-in surface: `Math`, `JSON`, `Date.now`, conversions and the
//! array, string and number methods. Nothing else is reachable.

use crate::error::{SandboxError, SandboxResult};
use crate::interp::Interpreter;
use crate::value::{format_number, ArrayRef, Namespace, Native, Value};
use std::rc::Rc;

pub(crate) fn namespace_member(ns: Namespace, name: &str) -> Value {
    let native = match (ns, name) {
        (Namespace::Math, "PI") => return Value::Number(std::f64::consts::PI),
        (Namespace::Math, "E") => return Value::Number(std::f64::consts::E),
        (Namespace::Math, "abs") => Native::MathAbs,
        (Namespace::Math, "ceil") => Native::MathCeil,
        (Namespace::Math, "floor") => Native::MathFloor,
        (Namespace::Math, "round") => Native::MathRound,
        (Namespace::Math, "trunc") => Native::MathTrunc,
        (Namespace::Math, "sign") => Native::MathSign,
        (Namespace::Math, "min") => Native::MathMin,
        (Namespace::Math, "max") => Native::MathMax,
        (Namespace::Math, "pow") => Native::MathPow,
        (Namespace::Math, "sqrt") => Native::MathSqrt,
        (Namespace::Math, "log") => Native::MathLog,
        (Namespace::Math, "exp") => Native::MathExp,
        (Namespace::Json, "parse") => Native::JsonParse,
        (Namespace::Json, "stringify") => Native::JsonStringify,
        (Namespace::Date, "now") => Native::DateNow,
        (Namespace::Array, "isArray") => Native::ArrayIsArray,
        (Namespace::Number, "isInteger") => Native::NumberIsInteger,
        (Namespace::Number, "isFinite") => Native::NumberIsFinite,
        (Namespace::Number, "parseFloat") => Native::ParseFloat,
        (Namespace::Number, "parseInt") => Native::ParseInt,
        (Namespace::Number, "MAX_SAFE_INTEGER") => return Value::Number(9_007_199_254_740_991.0),
        _ => return Value::Undefined,
    };
    Value::Native(native)
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn num(args: &[Value], i: usize) -> f64 {
    args.get(i).map(Value::to_number).unwrap_or(f64::NAN)
}

/// Resolves a relative `slice` bound against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

impl Interpreter {
    pub(crate) fn call_native(&mut self, native: Native, args: Vec<Value>) -> SandboxResult<Value> {
        let math = |f: fn(f64) -> f64| -> SandboxResult<Value> { Ok(Value::Number(f(num(&args, 0)))) };
        match native {
            Native::MathAbs => math(f64::abs),
            Native::MathCeil => math(f64::ceil),
            Native::MathFloor => math(f64::floor),
            Native::MathRound => math(|x| (x + 0.5).floor()),
            Native::MathTrunc => math(f64::trunc),
            Native::MathSign => math(|x| if x.is_nan() || x == 0.0 { x } else { x.signum() }),
            Native::MathSqrt => math(f64::sqrt),
            Native::MathLog => math(f64::ln),
            Native::MathExp => math(f64::exp),
            Native::MathPow => Ok(Value::Number(num(&args, 0).powf(num(&args, 1)))),
            Native::MathMin | Native::MathMax => {
                let is_min = native == Native::MathMin;
                let mut acc = if is_min { f64::INFINITY } else { f64::NEG_INFINITY };
                for value in &args {
                    let n = value.to_number();
                    if n.is_nan() {
                        return Ok(Value::Number(f64::NAN));
                    }
                    acc = if is_min { acc.min(n) } else { acc.max(n) };
                }
                Ok(Value::Number(acc))
            }
            Native::JsonParse => {
                let text = self.js_string(&arg(&args, 0))?;
                let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    SandboxError::runtime(format!("SyntaxError: JSON.parse: {e}"))
                })?;
                let value = Value::from_json(&json);
                self.adopt(&value)?;
                Ok(value)
            }
            Native::JsonStringify => match arg(&args, 0) {
                Value::Undefined | Value::Function(_) | Value::Native(_) => Ok(Value::Undefined),
                value => {
                    let json = value.to_json(&mut self.stringify_budget())?;
                    let text = serde_json::to_string(&json).map_err(|e| {
                        SandboxError::runtime(format!("TypeError: JSON.stringify: {e}"))
                    })?;
                    self.alloc_str(&text)
                }
            },
            Native::DateNow => Ok(Value::Number(self.now_ms())),
            Native::ArrayIsArray => Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_)))),
            Native::NumberIsInteger => Ok(Value::Bool(matches!(
                arg(&args, 0),
                Value::Number(n) if n.is_finite() && n.fract() == 0.0
            ))),
            Native::NumberIsFinite => Ok(Value::Bool(matches!(
                arg(&args, 0),
                Value::Number(n) if n.is_finite()
            ))),
            Native::ToNumber => Ok(Value::Number(match args.first() {
                Some(value) => value.to_number(),
                None => 0.0,
            })),
            Native::ToString => match args.first() {
                Some(value) => {
                    let text = self.js_string(value)?;
                    self.alloc_str(&text)
                }
                None => Ok(Value::str("")),
            },
            Native::ToBoolean => Ok(Value::Bool(arg(&args, 0).truthy())),
            Native::ParseInt => {
                let radix = match arg(&args, 1) {
                    Value::Undefined => 0,
                    other => other.to_number() as u32,
                };
                let text = self.js_string(&arg(&args, 0))?;
                Ok(Value::Number(parse_int(&text, radix)))
            }
            Native::ParseFloat => {
                let text = self.js_string(&arg(&args, 0))?;
                Ok(Value::Number(parse_float(&text)))
            }
            Native::IsNaN => Ok(Value::Bool(num(&args, 0).is_nan())),
            Native::IsFinite => Ok(Value::Bool(num(&args, 0).is_finite())),
        }
    }

    pub(crate) fn array_method(
        &mut self,
        items: &ArrayRef,
        name: &str,
        args: Vec<Value>,
    ) -> SandboxResult<Value> {
        match name {
            "push" => {
                self.charge(16 * args.len())?;
                let mut items = items.borrow_mut();
                items.extend(args);
                return Ok(Value::Number(items.len() as f64));
            }
            "slice" => {
                let snapshot = items.borrow();
                let len = snapshot.len();
                let start = relative_index(&arg(&args, 0), len, 0);
                let end = relative_index(&arg(&args, 1), len, len);
                let slice = snapshot.get(start..end.max(start)).unwrap_or_default().to_vec();
                drop(snapshot);
                return self.alloc_array(slice);
            }
            "concat" => {
                let added: usize = args
                    .iter()
                    .map(|v| match v {
                        Value::Array(other) => other.borrow().len(),
                        _ => 1,
                    })
                    .sum();
                self.charge(16 * (items.borrow().len() + added))?;
                let mut out = items.borrow().clone();
                for value in args {
                    match value {
                        Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                }
                return self.alloc_array(out);
            }
            "indexOf" => {
                let needle = arg(&args, 0);
                let position = items.borrow().iter().position(|v| v.strict_equals(&needle));
                return Ok(Value::Number(position.map(|p| p as f64).unwrap_or(-1.0)));
            }
            "includes" => {
                let needle = arg(&args, 0);
                let found = items.borrow().iter().any(|v| same_value_zero(v, &needle));
                return Ok(Value::Bool(found));
            }
            "join" => {
                let separator = match arg(&args, 0) {
                    Value::Undefined => ",".to_string(),
                    other => self.js_string(&other)?,
                };
                let joined = self.join_js_string(items, &separator)?;
                self.charge(16 + joined.len())?;
                return Ok(Value::Str(Rc::from(joined)));
            }
            _ => {}
        }

        // Callback methods iterate over a snapshot.
        let callback = arg(&args, 0);
        if !matches!(name, "map" | "filter" | "reduce" | "some" | "every" | "find" | "forEach") {
            return Err(SandboxError::runtime(format!(
                "TypeError: array.{name} is not a function"
            )));
        }
        if !matches!(callback, Value::Function(_) | Value::Native(_)) {
            return Err(SandboxError::runtime(format!(
                "TypeError: {} is not a function",
                callback.type_of()
            )));
        }
        let snapshot: Vec<Value> = items.borrow().clone();
        let receiver = Value::Array(Rc::clone(items));
        let invoke = |interp: &mut Self, item: &Value, index: usize| {
            interp.call_value(
                &callback,
                vec![item.clone(), Value::Number(index as f64), receiver.clone()],
            )
        };

        match name {
            "map" => {
                let mut out = Vec::with_capacity(snapshot.len());
                for (i, item) in snapshot.iter().enumerate() {
                    out.push(invoke(self, item, i)?);
                }
                self.alloc_array(out)
            }
            "filter" => {
                let mut out = Vec::new();
                for (i, item) in snapshot.iter().enumerate() {
                    if invoke(self, item, i)?.truthy() {
                        out.push(item.clone());
                    }
                }
                self.alloc_array(out)
            }
            "some" => {
                for (i, item) in snapshot.iter().enumerate() {
                    if invoke(self, item, i)?.truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            "every" => {
                for (i, item) in snapshot.iter().enumerate() {
                    if !invoke(self, item, i)?.truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            "find" => {
                for (i, item) in snapshot.iter().enumerate() {
                    if invoke(self, item, i)?.truthy() {
                        return Ok(item.clone());
                    }
                }
                Ok(Value::Undefined)
            }
            "forEach" => {
                for (i, item) in snapshot.iter().enumerate() {
                    invoke(self, item, i)?;
                }
                Ok(Value::Undefined)
            }
            _ => {
                let mut iter = snapshot.iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first.clone(),
                        None => {
                            return Err(SandboxError::runtime(
                                "TypeError: Reduce of empty array with no initial value",
                            ));
                        }
                    },
                };
                for (i, item) in iter {
                    acc = self.call_value(
                        &callback,
                        vec![acc, item.clone(), Value::Number(i as f64), receiver.clone()],
                    )?;
                }
                Ok(acc)
            }
        }
    }

    pub(crate) fn string_method(
        &mut self,
        s: &Rc<str>,
        name: &str,
        args: Vec<Value>,
    ) -> SandboxResult<Value> {
        match name {
            "toUpperCase" => self.alloc_str(&s.to_uppercase()),
            "toLowerCase" => self.alloc_str(&s.to_lowercase()),
            "trim" => self.alloc_str(s.trim()),
            "includes" | "startsWith" | "endsWith" | "indexOf" => {
                let needle = self.js_string(&arg(&args, 0))?;
                let needle = needle.as_str();
                Ok(match name {
                    "includes" => Value::Bool(s.contains(needle)),
                    "startsWith" => Value::Bool(s.starts_with(needle)),
                    "endsWith" => Value::Bool(s.ends_with(needle)),
                    _ => Value::Number(
                        s.find(needle)
                            .map(|byte| s[..byte].chars().count() as f64)
                            .unwrap_or(-1.0),
                    ),
                })
            }
            "slice" => {
                let chars: Vec<char> = s.chars().collect();
                let start = relative_index(&arg(&args, 0), chars.len(), 0);
                let end = relative_index(&arg(&args, 1), chars.len(), chars.len());
                let out: String = chars.get(start..end.max(start)).unwrap_or_default().iter().collect();
                self.alloc_str(&out)
            }
            "split" => {
                let parts: Vec<Value> = match arg(&args, 0) {
                    Value::Undefined => vec![Value::Str(Rc::clone(s))],
                    separator => {
                        let separator = self.js_string(&separator)?;
                        if separator.is_empty() {
                            self.charge(48 * s.chars().count())?;
                            s.chars().map(|c| Value::str(c.encode_utf8(&mut [0; 4]))).collect()
                        } else {
                            let count = s.matches(separator.as_str()).count() + 1;
                            self.charge(32 * count + s.len())?;
                            s.split(separator.as_str()).map(Value::str).collect()
                        }
                    }
                };
                self.alloc_array(parts)
            }
            _ => Err(SandboxError::runtime(format!(
                "TypeError: string.{name} is not a function"
            ))),
        }
    }

    pub(crate) fn number_method(&mut self, n: f64, name: &str, args: Vec<Value>) -> SandboxResult<Value> {
        match name {
            "toFixed" => {
                let digits = match arg(&args, 0) {
                    Value::Undefined => 0.0,
                    other => other.to_number(),
                };
                if !(0.0..=100.0).contains(&digits) {
                    return Err(SandboxError::runtime(
                        "RangeError: toFixed() digits argument must be between 0 and 100",
                    ));
                }
                if !n.is_finite() {
                    return self.alloc_str(&format_number(n));
                }
                self.alloc_str(&format!("{:.*}", digits as usize, n))
            }
            "toString" => self.alloc_str(&format_number(n)),
            _ => Err(SandboxError::runtime(format!(
                "TypeError: number.{name} is not a function"
            ))),
        }
    }
}

/// `parseInt`: optional sign, optional `0x` prefix, then the longest run of
/// digits valid in `radix`.
fn parse_int(text: &str, radix: u32) -> f64 {
    let mut s = text.trim_start();
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    let mut radix = radix;
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut result: Option<f64> = None;
    for c in s.chars() {
        match c.to_digit(radix) {
            Some(d) => result = Some(result.unwrap_or(0.0) * f64::from(radix) + f64::from(d)),
            None => break,
        }
    }
    result.map(|r| sign * r).unwrap_or(f64::NAN)
}

/// `parseFloat`: the longest prefix that reads as a decimal literal.
fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    let unsigned = s.trim_start_matches(['+', '-']);
    if unsigned.starts_with("Infinity") {
        return if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    s[..end].parse().unwrap_or(f64::NAN)
}

//! Tree-walking interpreter with fuel, memory and deadline accounting.
//!
//! Every statement and expression evaluation burns one unit of fuel; the
//! wall clock is sampled every few hundred steps. Arrays, objects and
//! scopes are registered in a heap table so the interpreter can measure
//! live memory (including every string they reach) and, on drop, break any
//! reference cycles a formula built.

use crate::ast::{BinaryOp, DeclKind, Expr, FunctionBody, LogicalOp, Stmt, UnaryOp};
use crate::error::{FaultKind, SandboxError, SandboxResult};
use crate::limits::{ResourceLimits, TrackingLimiter};
use crate::value::{ArrayRef, Closure, Env, JsonBudget, Namespace, Native, ObjectRef, Scope, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

const MAX_CALL_DEPTH: usize = 32;
const DEADLINE_CHECK_INTERVAL: u64 = 256;
const SWEEP_FLOOR: usize = 4096;

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    limiter: TrackingLimiter,
    fuel_budget: u64,
    fuel: u64,
    deadline: Instant,
    timeout_ms: u64,
    max_result_bytes: usize,
    now_ms: f64,
    call_depth: usize,
    scopes: Vec<Weak<Scope>>,
    arrays: Vec<Weak<RefCell<Vec<Value>>>>,
    objects: Vec<Weak<RefCell<BTreeMap<String, Value>>>>,
    next_sweep: usize,
}

impl Interpreter {
    /// Creates an interpreter whose deadline starts now. `now_ms` is the
    /// frozen value of `Date.now()`.
    pub fn new(limits: &ResourceLimits, now_ms: f64) -> Self {
        Self {
            limiter: TrackingLimiter::new(limits.max_memory_bytes),
            fuel_budget: limits.fuel_per_call,
            fuel: limits.fuel_per_call,
            deadline: Instant::now() + Duration::from_millis(limits.timeout_ms),
            timeout_ms: limits.timeout_ms,
            max_result_bytes: limits.max_result_bytes,
            now_ms,
            call_depth: 0,
            scopes: Vec::new(),
            arrays: Vec::new(),
            objects: Vec::new(),
            next_sweep: SWEEP_FLOOR,
        }
    }

    pub fn fuel_consumed(&self) -> u64 {
        self.fuel_budget - self.fuel
    }

    pub fn limiter(&self) -> &TrackingLimiter {
        &self.limiter
    }

    pub(crate) fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// A fresh top-level scope, tracked for teardown.
    pub fn root_scope(&mut self) -> Env {
        let scope = Scope::root();
        self.scopes.push(Rc::downgrade(&scope));
        scope
    }

    /// Runs a formula body and converts its return value to JSON.
    /// A body that falls off the end returns `undefined`, i.e. `null`.
    pub fn run_to_json(&mut self, program: &[Stmt], env: &Env) -> SandboxResult<serde_json::Value> {
        self.hoist(program, env);
        for stmt in program {
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                Flow::Return(value) => {
                    let mut budget = JsonBudget::for_result(self.max_result_bytes, self.deadline, self.timeout_ms);
                    return value.to_json(&mut budget);
                }
                Flow::Break | Flow::Continue => {
                    return Err(SandboxError::runtime("SyntaxError: illegal break or continue"));
                }
            }
        }
        Ok(serde_json::Value::Null)
    }

    // ── Accounting ───────────────────────────────────────────────

    fn tick(&mut self) -> SandboxResult<()> {
        if self.fuel == 0 {
            return Err(SandboxError::fault(FaultKind::FuelExhausted {
                budget: self.fuel_budget,
            }));
        }
        self.fuel -= 1;
        if self.fuel % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline {
            return Err(SandboxError::fault(FaultKind::Timeout {
                timeout_ms: self.timeout_ms,
            }));
        }
        Ok(())
    }

    fn new_scope(&mut self, parent: &Env, is_function: bool) -> Env {
        let scope = Scope::child(parent, is_function);
        self.scopes.push(Rc::downgrade(&scope));
        self.maybe_sweep();
        scope
    }

    pub(crate) fn alloc_array(&mut self, items: Vec<Value>) -> SandboxResult<Value> {
        self.limiter.charge(16 + 16 * items.len())?;
        let array: ArrayRef = Rc::new(RefCell::new(items));
        self.arrays.push(Rc::downgrade(&array));
        self.maybe_sweep();
        Ok(Value::Array(array))
    }

    pub(crate) fn alloc_object(&mut self, entries: BTreeMap<String, Value>) -> SandboxResult<Value> {
        self.limiter.charge(32 + 48 * entries.len())?;
        let object: ObjectRef = Rc::new(RefCell::new(entries));
        self.objects.push(Rc::downgrade(&object));
        self.maybe_sweep();
        Ok(Value::Object(object))
    }

    pub(crate) fn alloc_str(&mut self, s: &str) -> SandboxResult<Value> {
        self.limiter.charge(16 + s.len())?;
        Ok(Value::str(s))
    }

    /// String conversion bounded by the memory left under the ceiling.
    pub(crate) fn js_string(&self, value: &Value) -> SandboxResult<String> {
        value.to_js_string(&self.limiter)
    }

    /// Appends `value` to a string under construction, bounded like
    /// [`Interpreter::js_string`].
    pub(crate) fn write_js_string(&self, out: &mut String, value: &Value) -> SandboxResult<()> {
        value.write_js_string(out, &self.limiter)
    }

    /// `array.join(separator)`, bounded like [`Interpreter::js_string`].
    pub(crate) fn join_js_string(&self, items: &ArrayRef, separator: &str) -> SandboxResult<String> {
        let mut out = String::new();
        crate::value::write_joined(items, separator, &mut out, &self.limiter)?;
        Ok(out)
    }

    /// JSON budget for `JSON.stringify`.
    pub(crate) fn stringify_budget(&self) -> JsonBudget {
        JsonBudget::for_memory(&self.limiter, self.deadline, self.timeout_ms)
    }

    pub(crate) fn charge(&mut self, bytes: usize) -> SandboxResult<()> {
        self.limiter.charge(bytes)
    }

    /// Registers and charges containers created outside the allocator
    /// (parsed JSON, injected variables).
    pub(crate) fn adopt(&mut self, value: &Value) -> SandboxResult<()> {
        match value {
            Value::Array(items) => {
                self.limiter.charge(value.footprint())?;
                self.arrays.push(Rc::downgrade(items));
                let children: Vec<Value> = items.borrow().clone();
                for child in &children {
                    self.adopt(child)?;
                }
            }
            Value::Object(map) => {
                self.limiter.charge(value.footprint())?;
                self.objects.push(Rc::downgrade(map));
                let children: Vec<Value> = map.borrow().values().cloned().collect();
                for child in &children {
                    self.adopt(child)?;
                }
            }
            Value::Str(s) => self.limiter.charge(16 + s.len())?,
            _ => {}
        }
        self.maybe_sweep();
        Ok(())
    }

    /// Drops dead heap entries and re-measures live memory: containers,
    /// object keys, and every string a container or scope holds.
    fn maybe_sweep(&mut self) {
        if self.scopes.len() + self.arrays.len() + self.objects.len() < self.next_sweep {
            return;
        }
        self.scopes.retain(|s| s.strong_count() > 0);
        self.arrays.retain(|a| a.strong_count() > 0);
        self.objects.retain(|o| o.strong_count() > 0);

        let mut strings = StringTally::default();
        let mut containers = 0usize;
        for array in self.arrays.iter().filter_map(Weak::upgrade) {
            match array.try_borrow() {
                Ok(items) => {
                    containers += 16 + 16 * items.len();
                    items.iter().for_each(|v| strings.add(v));
                }
                Err(_) => containers += 16,
            }
        }
        for object in self.objects.iter().filter_map(Weak::upgrade) {
            match object.try_borrow() {
                Ok(map) => {
                    containers += 32 + 48 * map.len();
                    for (key, value) in map.iter() {
                        containers += key.len();
                        strings.add(value);
                    }
                }
                Err(_) => containers += 32,
            }
        }
        for scope in self.scopes.iter().filter_map(Weak::upgrade) {
            scope.for_each_value(|v| strings.add(v));
        }
        self.limiter.reset_to(containers + strings.bytes);

        let live = self.scopes.len() + self.arrays.len() + self.objects.len();
        self.next_sweep = SWEEP_FLOOR.max(live * 2);
    }

    // ── Statements ───────────────────────────────────────────────

    fn hoist(&mut self, body: &[Stmt], env: &Env) {
        for stmt in body {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    let closure = Closure {
                        def: Rc::clone(def),
                        env: Rc::clone(env),
                    };
                    env.declare(name, Value::Function(Rc::new(closure)), true);
                }
            }
        }
    }

    fn exec_block(&mut self, body: &[Stmt], env: &Env) -> SandboxResult<Flow> {
        let scope = self.new_scope(env, false);
        self.hoist(body, &scope);
        for stmt in body {
            let flow = self.exec(stmt, &scope)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> SandboxResult<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Decl { kind, declarators } => {
                for (name, init) in declarators {
                    let value = match init {
                        Some(expr) => self.eval(expr, env)?,
                        None => Value::Undefined,
                    };
                    match kind {
                        DeclKind::Var => env.declare_var(name, value),
                        DeclKind::Let => env.declare(name, value, true),
                        DeclKind::Const => env.declare(name, value, false),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => self.exec_block(body, env),
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.exec(then, env)
                } else if let Some(otherwise) = otherwise {
                    self.exec(otherwise, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let scope = self.new_scope(env, false);
                if let Some(init) = init {
                    self.exec(init, &scope)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.eval(test, &scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec(body, &scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &scope)?;
                    }
                    self.tick()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::ForOf {
                kind,
                name,
                iterable,
                body,
            } => {
                let items: Vec<Value> = match self.eval(iterable, env)? {
                    Value::Array(items) => items.borrow().clone(),
                    Value::Str(s) => {
                        self.charge(48 * s.chars().count())?;
                        s.chars().map(|c| Value::str(c.encode_utf8(&mut [0; 4]))).collect()
                    }
                    other => {
                        return Err(SandboxError::runtime(format!(
                            "TypeError: {} is not iterable",
                            other.type_of()
                        )));
                    }
                };
                for item in items {
                    let scope = self.new_scope(env, false);
                    scope.declare(name, item, *kind != DeclKind::Const);
                    match self.exec(body, &scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::While { test, body } => {
                while self.eval(test, env)?.truthy() {
                    match self.exec(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.tick()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
        }
    }

    // ── Expressions ──────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr, env: &Env) -> SandboxResult<Value> {
        self.tick()?;
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name) => lookup(name, env),
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, env))
                    .collect::<SandboxResult<Vec<_>>>()?;
                self.alloc_array(values)
            }
            Expr::Object(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let value = self.eval(value, env)?;
                    map.insert(key.clone(), value);
                }
                self.alloc_object(map)
            }
            Expr::Unary { op, operand } => {
                if let (UnaryOp::TypeOf, Expr::Ident(name)) = (op, operand.as_ref()) {
                    let kind = lookup(name, env).map(|v| v.type_of()).unwrap_or("undefined");
                    return Ok(Value::str(kind));
                }
                let value = self.eval(operand, env)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::TypeOf => Value::str(value.type_of()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Member { object, property } => {
                let object = self.eval(object, env)?;
                get_property(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                get_index(&object, &index, &self.limiter)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, env),
            Expr::Function(def) => Ok(Value::Function(Rc::new(Closure {
                def: Rc::clone(def),
                env: Rc::clone(env),
            }))),
            Expr::Assign { target, op, value } => {
                let value = match op {
                    None => self.eval(value, env)?,
                    Some(op) => {
                        let current = self.eval(target, env)?;
                        let rhs = self.eval(value, env)?;
                        self.binary(*op, &current, &rhs)?
                    }
                };
                self.assign_to(target, value.clone(), env)?;
                Ok(value)
            }
            Expr::Update {
                target,
                delta,
                prefix,
            } => {
                let old = self.eval(target, env)?.to_number();
                let new = old + delta;
                self.assign_to(target, Value::Number(new), env)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
        }
    }

    fn assign_to(&mut self, target: &Expr, value: Value, env: &Env) -> SandboxResult<()> {
        match target {
            Expr::Ident(name) => env.assign(name, value),
            Expr::Member { object, property } => {
                let object = self.eval(object, env)?;
                self.set_property(&object, property, value)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                if let (Value::Array(items), Some(i)) = (&object, array_index(&index)) {
                    let len = items.borrow().len();
                    if i >= len {
                        self.charge(16 * (i + 1 - len))?;
                        items.borrow_mut().resize(i + 1, Value::Undefined);
                    }
                    items.borrow_mut()[i] = value;
                    return Ok(());
                }
                let key = self.js_string(&index)?;
                self.set_property(&object, &key, value)
            }
            _ => Err(SandboxError::runtime(
                "SyntaxError: invalid assignment target",
            )),
        }
    }

    fn set_property(&mut self, object: &Value, property: &str, value: Value) -> SandboxResult<()> {
        match object {
            Value::Object(map) => {
                if !map.borrow().contains_key(property) {
                    self.charge(48 + property.len())?;
                }
                map.borrow_mut().insert(property.to_string(), value);
                Ok(())
            }
            Value::Array(items) if property == "length" => {
                let new_len = value.to_number();
                if new_len < 0.0 || new_len.fract() != 0.0 {
                    return Err(SandboxError::runtime("RangeError: invalid array length"));
                }
                let new_len = new_len as usize;
                let len = items.borrow().len();
                if new_len > len {
                    self.charge(16 * (new_len - len))?;
                }
                items.borrow_mut().resize(new_len, Value::Undefined);
                Ok(())
            }
            Value::Undefined | Value::Null => Err(SandboxError::runtime(format!(
                "TypeError: cannot set properties of {} (setting '{property}')",
                object.nullish_name()
            ))),
            other => Err(SandboxError::runtime(format!(
                "TypeError: cannot create property '{property}' on {}",
                other.type_of()
            ))),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], env: &Env) -> SandboxResult<Value> {
        let method = match callee {
            Expr::Member { object, property } => {
                Some((self.eval(object, env)?, property.clone()))
            }
            Expr::Index { object, index } => {
                let receiver = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                let key = self.js_string(&key)?;
                Some((receiver, key))
            }
            _ => None,
        };
        match method {
            Some((receiver, name)) => {
                let args = self.eval_args(args, env)?;
                self.call_method(&receiver, &name, args)
            }
            None => {
                let function = self.eval(callee, env)?;
                let args = self.eval_args(args, env)?;
                self.call_value(&function, args)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> SandboxResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, env)).collect()
    }

    fn call_method(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> SandboxResult<Value> {
        match receiver {
            Value::Array(items) => self.array_method(items, name, args),
            Value::Str(s) => self.string_method(s, name, args),
            Value::Number(n) => self.number_method(*n, name, args),
            Value::Undefined | Value::Null => Err(SandboxError::runtime(format!(
                "TypeError: cannot read properties of {} (reading '{name}')",
                receiver.nullish_name()
            ))),
            _ => {
                let function = get_property(receiver, name)?;
                if matches!(function, Value::Undefined) {
                    return Err(SandboxError::runtime(format!(
                        "TypeError: {name} is not a function"
                    )));
                }
                self.call_value(&function, args)
            }
        }
    }

    pub(crate) fn call_value(&mut self, function: &Value, args: Vec<Value>) -> SandboxResult<Value> {
        match function {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Native(native) => self.call_native(*native, args),
            Value::Namespace(Namespace::Number) => self.call_native(Native::ToNumber, args),
            other => Err(SandboxError::runtime(format!(
                "TypeError: {} is not a function",
                other.type_of()
            ))),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> SandboxResult<Value> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(SandboxError::runtime(
                "RangeError: maximum call stack size exceeded",
            ));
        }
        self.call_depth += 1;
        let result = self.call_body(closure, args);
        self.call_depth -= 1;
        result
    }

    fn call_body(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> SandboxResult<Value> {
        let scope = self.new_scope(&closure.env, true);
        let mut args = args.into_iter();
        for param in &closure.def.params {
            scope.declare(param, args.next().unwrap_or(Value::Undefined), true);
        }
        match &closure.def.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => {
                self.hoist(body, &scope);
                for stmt in body {
                    match self.exec(stmt, &scope)? {
                        Flow::Normal => {}
                        Flow::Return(value) => return Ok(value),
                        Flow::Break | Flow::Continue => {
                            return Err(SandboxError::runtime(
                                "SyntaxError: illegal break or continue",
                            ));
                        }
                    }
                }
                Ok(Value::Undefined)
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> SandboxResult<Value> {
        let numeric = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
        Ok(match op {
            BinaryOp::Add => {
                let stringy = |v: &Value| {
                    matches!(v, Value::Str(_) | Value::Array(_) | Value::Object(_))
                };
                if stringy(left) || stringy(right) {
                    let mut joined = String::new();
                    self.write_js_string(&mut joined, left)?;
                    self.write_js_string(&mut joined, right)?;
                    self.charge(16 + joined.len())?;
                    return Ok(Value::Str(Rc::from(joined)));
                }
                numeric(|a, b| a + b)
            }
            BinaryOp::Sub => numeric(|a, b| a - b),
            BinaryOp::Mul => numeric(|a, b| a * b),
            BinaryOp::Div => numeric(|a, b| a / b),
            BinaryOp::Rem => numeric(|a, b| a % b),
            BinaryOp::Pow => numeric(f64::powf),
            BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
            BinaryOp::Ne => Value::Bool(!left.loose_equals(right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinaryOp::StrictNe => Value::Bool(!left.strict_equals(right)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = match (left, right) {
                    (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                    _ => left.to_number().partial_cmp(&right.to_number()),
                };
                let result = match ordering {
                    None => false,
                    Some(ord) => match op {
                        BinaryOp::Lt => ord.is_lt(),
                        BinaryOp::Le => ord.is_le(),
                        BinaryOp::Gt => ord.is_gt(),
                        _ => ord.is_ge(),
                    },
                };
                Value::Bool(result)
            }
        })
    }
}

/// Live string bytes; a string shared by several holders counts once.
#[derive(Default)]
struct StringTally {
    seen: HashSet<*const u8>,
    bytes: usize,
}

impl StringTally {
    fn add(&mut self, value: &Value) {
        if let Value::Str(s) = value {
            if self.seen.insert(s.as_ptr()) {
                self.bytes += 16 + s.len();
            }
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        for scope in self.scopes.iter().filter_map(Weak::upgrade) {
            scope.clear();
        }
        for array in self.arrays.iter().filter_map(Weak::upgrade) {
            if let Ok(mut items) = array.try_borrow_mut() {
                items.clear();
            }
        }
        for object in self.objects.iter().filter_map(Weak::upgrade) {
            if let Ok(mut map) = object.try_borrow_mut() {
                map.clear();
            }
        }
    }
}

/// Integral, non-negative numeric index.
pub(crate) fn array_index(index: &Value) -> Option<usize> {
    match index {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n < 4_294_967_295.0 => Some(*n as usize),
        _ => None,
    }
}

fn lookup(name: &str, env: &Env) -> SandboxResult<Value> {
    if let Some(value) = env.lookup(name) {
        return Ok(value);
    }
    global(name).ok_or_else(|| SandboxError::runtime(format!("ReferenceError: {name} is not defined")))
}

/// The fixed global surface.
fn global(name: &str) -> Option<Value> {
    Some(match name {
        "Math" => Value::Namespace(Namespace::Math),
        "JSON" => Value::Namespace(Namespace::Json),
        "Date" => Value::Namespace(Namespace::Date),
        "Array" => Value::Namespace(Namespace::Array),
        "Number" => Value::Namespace(Namespace::Number),
        "String" => Value::Native(Native::ToString),
        "Boolean" => Value::Native(Native::ToBoolean),
        "parseInt" => Value::Native(Native::ParseInt),
        "parseFloat" => Value::Native(Native::ParseFloat),
        "isNaN" => Value::Native(Native::IsNaN),
        "isFinite" => Value::Native(Native::IsFinite),
        "NaN" => Value::Number(f64::NAN),
        "Infinity" => Value::Number(f64::INFINITY),
        _ => return None,
    })
}

fn get_property(object: &Value, property: &str) -> SandboxResult<Value> {
    Ok(match object {
        Value::Undefined | Value::Null => {
            return Err(SandboxError::runtime(format!(
                "TypeError: cannot read properties of {} (reading '{property}')",
                object.nullish_name()
            )));
        }
        Value::Array(items) if property == "length" => Value::Number(items.borrow().len() as f64),
        Value::Array(items) => match property.parse::<usize>() {
            Ok(i) => items.borrow().get(i).cloned().unwrap_or(Value::Undefined),
            Err(_) => Value::Undefined,
        },
        Value::Str(s) if property == "length" => Value::Number(s.encode_utf16().count() as f64),
        Value::Object(map) => map.borrow().get(property).cloned().unwrap_or(Value::Undefined),
        Value::Namespace(ns) => crate::builtins::namespace_member(*ns, property),
        _ => Value::Undefined,
    })
}

fn get_index(object: &Value, index: &Value, limiter: &TrackingLimiter) -> SandboxResult<Value> {
    match (object, array_index(index)) {
        (Value::Array(items), Some(i)) => Ok(items.borrow().get(i).cloned().unwrap_or(Value::Undefined)),
        (Value::Str(s), Some(i)) => Ok(s
            .chars()
            .nth(i)
            .map(|c| Value::str(c.encode_utf8(&mut [0; 4])))
            .unwrap_or(Value::Undefined)),
        _ => get_property(object, &index.to_js_string(limiter)?),
    }
}

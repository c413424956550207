//! Tree-walking evaluator.
//!
//! The interpreter owns no host capabilities. Every evaluation step is
//! metered by the [`Budget`], and names that would reach the host in a
//! full Ruby (process control, reflection, I/O, `eval`) are rejected with
//! [`EvalError::Security`] before anything is dispatched.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::ast::{Block, Body, Call, Expr, InterpPart, MethodDef, Rescue, Target};
use super::budget::Budget;
use super::builtins;
use super::error::{rescues, EvalError, EvalResult};
use super::value::{self, builtin_class, ContainerScope, HashTable, Value};
use crate::config::Limits;

/// Accounted size of one value slot in an array or hash.
pub const SLOT: usize = mem::size_of::<Value>();

/// Accounted fixed cost of creating a string, array or hash.
const OBJECT_OVERHEAD: usize = 40;

/// Method names that reach host capabilities.
pub const FORBIDDEN_METHODS: &[&str] = &[
    "system",
    "exec",
    "spawn",
    "fork",
    "exit",
    "exit!",
    "abort",
    "at_exit",
    "trap",
    "syscall",
    "eval",
    "instance_eval",
    "instance_exec",
    "class_eval",
    "module_eval",
    "require",
    "require_relative",
    "load",
    "autoload",
    "open",
    "gets",
    "readline",
    "readlines",
    "binding",
    "caller",
    "set_trace_func",
    "send",
    "__send__",
    "public_send",
    "instance_variable_set",
    "instance_variable_get",
    "instance_variables",
    "global_variables",
    "define_method",
    "method",
    "methods",
    "singleton_class",
    "const_get",
    "const_set",
    "sleep",
    "srand",
];

/// Constants that name host-facing classes and modules.
pub const FORBIDDEN_CONSTANTS: &[&str] = &[
    "File",
    "FileUtils",
    "IO",
    "Dir",
    "ENV",
    "ARGV",
    "ARGF",
    "STDIN",
    "STDOUT",
    "STDERR",
    "DATA",
    "Process",
    "Kernel",
    "ObjectSpace",
    "GC",
    "Signal",
    "Thread",
    "Fiber",
    "Ractor",
    "Mutex",
    "Socket",
    "BasicSocket",
    "TCPSocket",
    "UDPSocket",
    "RubyVM",
    "Binding",
    "Method",
    "Proc",
    "TOPLEVEL_BINDING",
];

pub(crate) fn check_method(name: &str) -> EvalResult<()> {
    if FORBIDDEN_METHODS.contains(&name) {
        return Err(EvalError::Security(format!("method `{name}'")));
    }
    Ok(())
}

fn check_constant(name: &str) -> EvalResult<()> {
    if FORBIDDEN_CONSTANTS.contains(&name) {
        return Err(EvalError::Security(format!("constant {name}")));
    }
    Ok(())
}

fn host_state(sigil: &str, name: &str) -> EvalError {
    EvalError::Security(format!("variable {sigil}{name}"))
}

pub type Exec<T> = Result<T, Flow>;

/// Non-local exits travelling up the evaluator.
#[derive(Debug)]
pub enum Flow {
    Error(EvalError),
    /// `break`, tagged with the loop or block call it leaves.
    Break(Value, u64),
    Next(Value),
    /// `return`, tagged with the method frame it leaves.
    Return(Value, u64),
}

impl From<EvalError> for Flow {
    fn from(err: EvalError) -> Self {
        Self::Error(err)
    }
}

/// Local variable scope. Blocks chain to the scope they were written in;
/// methods start from an empty scope.
#[derive(Default)]
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    fn child(parent: &Rc<Self>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::default(),
            parent: Some(Rc::clone(parent)),
        })
    }

    fn get(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.vars.borrow().get(name) {
                return Some(value.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Assign to the innermost scope that already binds `name`, or define
    /// it here.
    fn set(&self, name: &str, value: Value) {
        let mut scope = self;
        loop {
            if let Some(slot) = scope.vars.borrow_mut().get_mut(name) {
                *slot = value;
                return;
            }
            match scope.parent.as_deref() {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        self.define(name, value);
    }

    fn define(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }
}

pub type BlockRef = Rc<BlockCtx>;

type NativeBlock = dyn Fn(&mut Interpreter, Vec<Value>) -> Exec<Value>;

/// A block attached to a call.
pub enum BlockCtx {
    Script {
        block: Rc<Block>,
        scope: Rc<Scope>,
        /// Frame whose `return` and `yield` the block body uses.
        home: u64,
        home_block: Option<BlockRef>,
        break_tag: u64,
    },
    /// Builtin adapter, e.g. the block `with_index` passes along.
    Native(Box<NativeBlock>),
}

struct Frame {
    id: u64,
    block: Option<BlockRef>,
    /// Target of `break` / `next` at this point, if any.
    loop_tag: Option<u64>,
}

enum Place {
    Local(String),
    Index(Value, Vec<Value>),
    Attr(Value, String),
    Const(String),
}

/// Evaluates fragments against one shared top-level scope.
pub struct Interpreter {
    budget: Budget,
    root: Rc<Scope>,
    methods: HashMap<String, Rc<MethodDef>>,
    constants: HashMap<String, Value>,
    frame: Frame,
    next_tag: u64,
    _containers: ContainerScope,
}

impl Interpreter {
    pub fn new(limits: &Limits, cancel: Arc<AtomicBool>) -> Self {
        Self {
            budget: Budget::new(limits, cancel),
            root: Rc::default(),
            methods: HashMap::new(),
            constants: HashMap::new(),
            frame: Frame {
                id: 0,
                block: None,
                loop_tag: None,
            },
            next_tag: 1,
            _containers: ContainerScope::enter(),
        }
    }

    /// Run one fragment in the top-level scope and return its last value.
    pub fn run(&mut self, body: &Body) -> EvalResult<Value> {
        let root = Rc::clone(&self.root);
        match self.eval_body(body, &root) {
            Ok(value) => Ok(value),
            Err(Flow::Error(err)) => Err(err),
            Err(Flow::Break(..)) => Err(EvalError::LocalJump("break")),
            Err(Flow::Next(_)) => Err(EvalError::LocalJump("next")),
            Err(Flow::Return(..)) => Err(EvalError::LocalJump("return")),
        }
    }

    pub const fn steps(&self) -> u64 {
        self.budget.steps()
    }

    // ---- services for builtins -------------------------------------------

    pub(crate) fn budget(&mut self) -> &mut Budget {
        &mut self.budget
    }

    pub(crate) fn new_str(&mut self, s: String) -> EvalResult<Value> {
        self.budget.charge(s.len() + OBJECT_OVERHEAD)?;
        Ok(Value::str(s))
    }

    pub(crate) fn new_array(&mut self, items: Vec<Value>) -> EvalResult<Value> {
        self.budget.charge_items(items.len(), SLOT)?;
        self.budget.charge(OBJECT_OVERHEAD)?;
        Ok(Value::array(items))
    }

    pub(crate) fn new_hash(&mut self, table: HashTable) -> EvalResult<Value> {
        self.budget.charge_items(table.len(), 2 * SLOT)?;
        self.budget.charge(OBJECT_OVERHEAD)?;
        Ok(Value::hash(table))
    }

    /// Fail before allocating `count` items of `size` bytes that would not
    /// fit in the remaining memory budget.
    pub(crate) fn ensure_fits(&self, count: usize, size: usize) -> EvalResult<()> {
        self.budget.check_fits(count, size)
    }

    pub(crate) fn equal(&mut self, a: &Value, b: &Value) -> EvalResult<bool> {
        value::equal(a, b, &mut self.budget)
    }

    pub(crate) fn eql(&mut self, a: &Value, b: &Value) -> EvalResult<bool> {
        value::eql(a, b, &mut self.budget)
    }

    pub(crate) fn compare(&mut self, a: &Value, b: &Value) -> EvalResult<Ordering> {
        value::compare_strict(a, b, &mut self.budget)
    }

    pub(crate) fn try_compare(&mut self, a: &Value, b: &Value) -> EvalResult<Option<Ordering>> {
        value::compare(a, b, &mut self.budget)
    }

    pub(crate) fn inspect(&mut self, v: &Value) -> EvalResult<String> {
        value::inspect(v, &mut self.budget)
    }

    pub(crate) fn to_s(&mut self, v: &Value) -> EvalResult<String> {
        value::to_s(v, &mut self.budget)
    }

    pub(crate) fn native_block(
        f: impl Fn(&mut Self, Vec<Value>) -> Exec<Value> + 'static,
    ) -> BlockRef {
        Rc::new(BlockCtx::Native(Box::new(f)))
    }

    pub(crate) const fn block_given(&self) -> bool {
        self.frame.block.is_some()
    }

    pub(crate) fn has_function(&self, name: &str) -> bool {
        self.methods.contains_key(name) || builtins::is_function(name)
    }

    /// Invoke a block with positional arguments.
    pub(crate) fn call_block(&mut self, block: &BlockRef, args: Vec<Value>) -> Exec<Value> {
        self.budget.tick()?;
        match &**block {
            BlockCtx::Native(f) => f(self, args),
            BlockCtx::Script {
                block,
                scope,
                home,
                home_block,
                break_tag,
            } => {
                self.budget.enter_call()?;
                let local = Scope::child(scope);
                bind_block_params(&local, &block.params, args);
                let outer = mem::replace(
                    &mut self.frame,
                    Frame {
                        id: *home,
                        block: home_block.clone(),
                        loop_tag: Some(*break_tag),
                    },
                );
                let result = self.eval_body(&block.body, &local);
                self.frame = outer;
                self.budget.leave_call();
                match result {
                    Err(Flow::Next(value)) => Ok(value),
                    other => other,
                }
            }
        }
    }

    pub(crate) fn call_block1(&mut self, block: &BlockRef, arg: Value) -> Exec<Value> {
        self.call_block(block, vec![arg])
    }

    /// Call `name` on `receiver`.
    pub(crate) fn call_method(
        &mut self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
        block: Option<&BlockRef>,
    ) -> Exec<Value> {
        check_method(name)?;
        if matches!(receiver, Value::Main) {
            return self.call_function(name, args, block);
        }
        builtins::call(self, receiver, name, args, block)
    }

    /// Call a receiver-less method: user definitions first, then builtins.
    pub(crate) fn call_function(
        &mut self,
        name: &str,
        args: Vec<Value>,
        block: Option<&BlockRef>,
    ) -> Exec<Value> {
        check_method(name)?;
        if let Some(def) = self.methods.get(name).cloned() {
            return self.invoke(&def, args, block.cloned());
        }
        builtins::call_function(self, name, args, block)
    }

    // ---- evaluation --------------------------------------------------------

    fn fresh_tag(&mut self) -> u64 {
        self.next_tag += 1;
        self.next_tag
    }

    fn eval_body(&mut self, body: &Body, scope: &Rc<Scope>) -> Exec<Value> {
        let mut last = Value::Nil;
        for expr in body {
            last = self.eval(expr, scope)?;
        }
        Ok(last)
    }

    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Exec<Value> {
        self.budget.tick()?;
        self.budget.enter_nesting()?;
        let result = self.eval_expr(expr, scope);
        self.budget.leave_nesting();
        result
    }

    fn eval_args(&mut self, args: &[Expr], scope: &Rc<Scope>) -> Exec<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, scope)).collect()
    }

    #[allow(clippy::too_many_lines)]
    fn eval_expr(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Exec<Value> {
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::True => Ok(Value::Bool(true)),
            Expr::False => Ok(Value::Bool(false)),
            Expr::SelfRef => Ok(Value::Main),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(self.new_str(s.clone())?),
            Expr::Sym(s) => Ok(Value::sym(s)),
            Expr::Interp(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        InterpPart::Lit(s) => out.push_str(s),
                        InterpPart::Code(body) => {
                            let value = self.eval_body(body, scope)?;
                            out.push_str(&self.to_s(&value)?);
                        }
                    }
                }
                Ok(self.new_str(out)?)
            }
            Expr::Array(items) => {
                let items = self.eval_args(items, scope)?;
                Ok(self.new_array(items)?)
            }
            Expr::Hash(pairs) => {
                let mut table = HashTable::default();
                for (key, value) in pairs {
                    let key = self.eval(key, scope)?;
                    let value = self.eval(value, scope)?;
                    table.insert(key, value)?;
                }
                Ok(self.new_hash(table)?)
            }
            Expr::Range {
                start,
                end,
                exclusive,
            } => {
                let start = self.eval(start, scope)?;
                let end = self.eval(end, scope)?;
                Ok(Value::range(start, end, *exclusive)?)
            }
            Expr::Ident(name) => match scope.get(name) {
                Some(value) => Ok(value),
                None => self.call_function(name, Vec::new(), None),
            },
            Expr::Const(path) => Ok(self.lookup_const(path)?),
            Expr::Ivar(name) => Err(host_state("@", name).into()),
            Expr::Gvar(name) => Err(host_state("$", name).into()),
            Expr::Backtick(_) => Err(EvalError::Security("shell command".into()).into()),
            Expr::Assign { target, value } => {
                let place = self.resolve(target, scope)?;
                let value = self.eval(value, scope)?;
                self.write(place, value.clone(), scope)?;
                Ok(value)
            }
            Expr::OpAssign { target, op, value } => self.eval_op_assign(target, op, value, scope),
            Expr::MultiAssign { targets, value } => {
                let places = targets
                    .iter()
                    .map(|t| self.resolve(t, scope))
                    .collect::<Exec<Vec<_>>>()?;
                let value = self.eval(value, scope)?;
                let values = match &value {
                    Value::Array(items) => items.snapshot(),
                    other => vec![other.clone()],
                };
                for (i, place) in places.into_iter().enumerate() {
                    let item = values.get(i).cloned().unwrap_or_default();
                    self.write(place, item, scope)?;
                }
                Ok(value)
            }
            Expr::And(left, right) => {
                let left = self.eval(left, scope)?;
                if left.truthy() {
                    self.eval(right, scope)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left, scope)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner, scope)?.truthy())),
            Expr::Call(call) => self.eval_call(call, scope),
            Expr::Yield(args) => {
                let block = self
                    .frame
                    .block
                    .clone()
                    .ok_or(EvalError::LocalJump("yield (no block given)"))?;
                let args = self.eval_args(args, scope)?;
                self.call_block(&block, args)
            }
            Expr::Defined(inner) => self.eval_defined(inner, scope),
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, scope)?.truthy() {
                    self.eval_body(then, scope)
                } else {
                    self.eval_body(otherwise, scope)
                }
            }
            Expr::While { cond, body, negate } => {
                let tag = self.fresh_tag();
                let saved = self.frame.loop_tag.replace(tag);
                let result = self.run_loop(cond, body, *negate, tag, scope);
                self.frame.loop_tag = saved;
                result
            }
            Expr::Case {
                subject,
                arms,
                otherwise,
            } => {
                let subject = match subject {
                    Some(subject) => Some(self.eval(subject, scope)?),
                    None => None,
                };
                for (patterns, body) in arms {
                    for pattern in patterns {
                        let pattern = self.eval(pattern, scope)?;
                        let hit = match &subject {
                            Some(subject) => self
                                .call_method(pattern, "===", vec![subject.clone()], None)?
                                .truthy(),
                            None => pattern.truthy(),
                        };
                        if hit {
                            return self.eval_body(body, scope);
                        }
                    }
                }
                match otherwise {
                    Some(body) => self.eval_body(body, scope),
                    None => Ok(Value::Nil),
                }
            }
            Expr::Begin {
                body,
                rescues,
                otherwise,
                ensure,
            } => self.eval_begin(body, rescues, otherwise.as_ref(), ensure.as_ref(), scope),
            Expr::Def(def) => {
                self.methods.insert(def.name.clone(), Rc::clone(def));
                Ok(Value::sym(&def.name))
            }
            Expr::Return(value) => {
                let value = self.eval_opt(value.as_deref(), scope)?;
                Err(Flow::Return(value, self.frame.id))
            }
            Expr::Break(value) => {
                let value = self.eval_opt(value.as_deref(), scope)?;
                match self.frame.loop_tag {
                    Some(tag) => Err(Flow::Break(value, tag)),
                    None => Err(EvalError::LocalJump("break").into()),
                }
            }
            Expr::Next(value) => {
                let value = self.eval_opt(value.as_deref(), scope)?;
                match self.frame.loop_tag {
                    Some(_) => Err(Flow::Next(value)),
                    None => Err(EvalError::LocalJump("next").into()),
                }
            }
            Expr::Seq(body) => self.eval_body(body, scope),
        }
    }

    fn eval_opt(&mut self, expr: Option<&Expr>, scope: &Rc<Scope>) -> Exec<Value> {
        match expr {
            Some(expr) => self.eval(expr, scope),
            None => Ok(Value::Nil),
        }
    }

    fn run_loop(
        &mut self,
        cond: &Expr,
        body: &Body,
        negate: bool,
        tag: u64,
        scope: &Rc<Scope>,
    ) -> Exec<Value> {
        loop {
            if self.eval(cond, scope)?.truthy() == negate {
                return Ok(Value::Nil);
            }
            match self.eval_body(body, scope) {
                Ok(_) | Err(Flow::Next(_)) => {}
                Err(Flow::Break(value, t)) if t == tag => return Ok(value),
                Err(other) => return Err(other),
            }
        }
    }

    fn eval_call(&mut self, call: &Call, scope: &Rc<Scope>) -> Exec<Value> {
        check_method(&call.method)?;
        let receiver = match &call.receiver {
            Some(expr) => Some(self.eval(expr, scope)?),
            None => None,
        };
        if call.safe_nav && matches!(receiver, Some(Value::Nil)) {
            return Ok(Value::Nil);
        }
        let args = self.eval_args(&call.args, scope)?;

        let Some(block) = &call.block else {
            return match receiver {
                Some(receiver) => self.call_method(receiver, &call.method, args, None),
                None => self.call_function(&call.method, args, None),
            };
        };
        let tag = self.fresh_tag();
        let ctx = Rc::new(BlockCtx::Script {
            block: Rc::clone(block),
            scope: Rc::clone(scope),
            home: self.frame.id,
            home_block: self.frame.block.clone(),
            break_tag: tag,
        });
        let result = match receiver {
            Some(receiver) => self.call_method(receiver, &call.method, args, Some(&ctx)),
            None => self.call_function(&call.method, args, Some(&ctx)),
        };
        match result {
            Err(Flow::Break(value, t)) if t == tag => Ok(value),
            other => other,
        }
    }

    fn invoke(&mut self, def: &Rc<MethodDef>, args: Vec<Value>, block: Option<BlockRef>) -> Exec<Value> {
        let total = def.params.len();
        let required = def.params.iter().filter(|p| p.default.is_none()).count();
        if args.len() < required || args.len() > total {
            let expected = if required == total {
                required.to_string()
            } else {
                format!("{required}..{total}")
            };
            return Err(EvalError::wrong_arity(args.len(), &expected).into());
        }

        self.budget.enter_call()?;
        let id = self.fresh_tag();
        let outer = mem::replace(
            &mut self.frame,
            Frame {
                id,
                block,
                loop_tag: None,
            },
        );
        let scope: Rc<Scope> = Rc::default();
        let result = self.bind_and_run(def, args, &scope);
        self.frame = outer;
        self.budget.leave_call();
        match result {
            Err(Flow::Return(value, t)) if t == id => Ok(value),
            other => other,
        }
    }

    fn bind_and_run(&mut self, def: &MethodDef, args: Vec<Value>, scope: &Rc<Scope>) -> Exec<Value> {
        let mut args = args.into_iter();
        for param in &def.params {
            let value = match (args.next(), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval(default, scope)?,
                (None, None) => Value::Nil,
            };
            scope.define(&param.name, value);
        }
        self.eval_body(&def.body, scope)
    }

    fn eval_begin(
        &mut self,
        body: &Body,
        rescues: &[Rescue],
        otherwise: Option<&Body>,
        ensure: Option<&Body>,
        scope: &Rc<Scope>,
    ) -> Exec<Value> {
        let outcome = match self.eval_body(body, scope) {
            Err(Flow::Error(err)) if err.is_rescuable() => {
                match rescues.iter().find(|r| handles(r, &err)) {
                    Some(rescue) => {
                        if let Some(name) = &rescue.binding {
                            let exception = Value::exception(err.class_name(), err.message());
                            scope.set(name, exception);
                        }
                        self.eval_body(&rescue.body, scope)
                    }
                    None => Err(Flow::Error(err)),
                }
            }
            Ok(value) => match otherwise {
                Some(body) => self.eval_body(body, scope),
                None => Ok(value),
            },
            other => other,
        };

        // Ceilings and violations end the evaluation without running
        // `ensure`, so no clause can turn them into a normal result.
        if matches!(&outcome, Err(Flow::Error(err)) if !err.is_rescuable()) {
            return outcome;
        }
        match ensure {
            Some(body) => {
                self.eval_body(body, scope)?;
                outcome
            }
            None => outcome,
        }
    }

    fn eval_op_assign(&mut self, target: &Target, op: &str, value: &Expr, scope: &Rc<Scope>) -> Exec<Value> {
        let place = self.resolve(target, scope)?;
        let current = self.read(&place, scope)?;
        let updated = match op {
            "||" if current.truthy() => return Ok(current),
            "&&" if !current.truthy() => return Ok(current),
            "||" | "&&" => self.eval(value, scope)?,
            op => {
                let rhs = self.eval(value, scope)?;
                self.call_method(current, op, vec![rhs], None)?
            }
        };
        self.write(place, updated.clone(), scope)?;
        Ok(updated)
    }

    fn resolve(&mut self, target: &Target, scope: &Rc<Scope>) -> Exec<Place> {
        Ok(match target {
            Target::Local(name) => Place::Local(name.clone()),
            Target::Index { receiver, args } => {
                let receiver = self.eval(receiver, scope)?;
                Place::Index(receiver, self.eval_args(args, scope)?)
            }
            Target::Attr { receiver, name } => {
                check_method(name)?;
                Place::Attr(self.eval(receiver, scope)?, name.clone())
            }
            Target::Ivar(name) => return Err(host_state("@", name).into()),
            Target::Gvar(name) => return Err(host_state("$", name).into()),
            Target::Const(name) => {
                check_constant(name)?;
                Place::Const(name.clone())
            }
        })
    }

    fn read(&mut self, place: &Place, scope: &Rc<Scope>) -> Exec<Value> {
        match place {
            Place::Local(name) => Ok(scope.get(name).unwrap_or_default()),
            Place::Index(receiver, args) => self.call_method(receiver.clone(), "[]", args.clone(), None),
            Place::Attr(receiver, name) => self.call_method(receiver.clone(), name, Vec::new(), None),
            Place::Const(name) => Ok(self.lookup_const(std::slice::from_ref(name))?),
        }
    }

    fn write(&mut self, place: Place, value: Value, scope: &Rc<Scope>) -> Exec<()> {
        match place {
            Place::Local(name) => scope.set(&name, value),
            Place::Index(receiver, mut args) => {
                args.push(value);
                self.call_method(receiver, "[]=", args, None)?;
            }
            Place::Attr(receiver, name) => {
                self.call_method(receiver, &format!("{name}="), vec![value], None)?;
            }
            Place::Const(name) => {
                self.constants.insert(name, value);
            }
        }
        Ok(())
    }

    fn lookup_const(&self, path: &[String]) -> EvalResult<Value> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| EvalError::Constant(String::new()))?;
        check_constant(first)?;
        let mut current = if let Some(value) = self.constants.get(first) {
            value.clone()
        } else if let Some(class) = builtin_class(first) {
            Value::Class(class)
        } else {
            return Err(EvalError::Constant(first.clone()));
        };
        for name in rest {
            check_constant(name)?;
            current = builtins::class_constant(&current, name)?;
        }
        Ok(current)
    }

    fn eval_defined(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Exec<Value> {
        let kind = match expr {
            Expr::Ident(name) if scope.has(name) => Some("local-variable"),
            Expr::Ident(name) => self.has_function(name).then_some("method"),
            Expr::Call(call) => {
                check_method(&call.method)?;
                match &call.receiver {
                    None => self.has_function(&call.method).then_some("method"),
                    Some(receiver) => match self.eval(receiver, scope) {
                        Ok(receiver) => builtins::responds_to(&receiver, &call.method).then_some("method"),
                        Err(Flow::Error(err)) if err.is_rescuable() => None,
                        Err(other) => return Err(other),
                    },
                }
            }
            Expr::Const(path) => match self.lookup_const(path) {
                Ok(_) => Some("constant"),
                Err(err) if err.is_rescuable() => None,
                Err(err) => return Err(err.into()),
            },
            Expr::Ivar(name) => return Err(host_state("@", name).into()),
            Expr::Gvar(name) => return Err(host_state("$", name).into()),
            Expr::SelfRef => Some("self"),
            Expr::Yield(_) => self.block_given().then_some("yield"),
            Expr::Assign { .. } | Expr::OpAssign { .. } | Expr::MultiAssign { .. } => Some("assignment"),
            _ => Some("expression"),
        };
        match kind {
            Some(kind) => Ok(self.new_str(kind.to_string())?),
            None => Ok(Value::Nil),
        }
    }
}

fn handles(rescue: &Rescue, err: &EvalError) -> bool {
    let class = err.class_name();
    if rescue.classes.is_empty() {
        return rescues(class, "StandardError");
    }
    rescue.classes.iter().any(|wanted| rescues(class, wanted))
}

/// A block with several parameters destructures a single array argument.
fn bind_block_params(scope: &Scope, params: &[String], args: Vec<Value>) {
    let splat = match args.as_slice() {
        [Value::Array(items)] if params.len() > 1 => Some(items.snapshot()),
        _ => None,
    };
    let args = splat.unwrap_or(args);
    for (i, name) in params.iter().enumerate() {
        scope.define(name, args.get(i).cloned().unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::testing::{run, run_with, show};

    #[test]
    fn arithmetic_and_locals() {
        assert_eq!(show("a = 2\nb = 3\na * b + 1"), "7");
        assert_eq!(show("x = 10; x -= 4; x"), "6");
        assert_eq!(show("-7 / 2"), "-4");
        assert_eq!(show("-7 % 3"), "2");
        assert_eq!(show("2 ** 10"), "1024");
        assert_eq!(show("-2 ** 2"), "-4");
    }

    #[test]
    fn strings_are_shared_references() {
        assert_eq!(show("a = 'x'\nb = a\nb << 'y'\na"), "\"xy\"");
    }

    #[test]
    fn multiple_assignment_swaps() {
        assert_eq!(show("a, b = 1, 2\na, b = b, a\n[a, b]"), "[2, 1]");
    }

    #[test]
    fn blocks_close_over_scope() {
        assert_eq!(show("total = 0\n[1, 2, 3].each { |x| total += x }\ntotal"), "6");
    }

    #[test]
    fn block_params_shadow_outer_names() {
        assert_eq!(show("x = 10\n[1].each { |x| x }\nx"), "10");
    }

    #[test]
    fn methods_have_their_own_scope() {
        let err = run("secret = 1\ndef peek\n  secret\nend\npeek").unwrap_err();
        assert!(matches!(err, EvalError::Name(_)));
    }

    #[test]
    fn recursion_and_return() {
        let src = "def fact(n)\n  return 1 if n <= 1\n  n * fact(n - 1)\nend\nfact(10)";
        assert_eq!(show(src), "3628800");
    }

    #[test]
    fn yield_and_block_given() {
        let src = "def twice\n  return 0 unless block_given?\n  yield(1) + yield(2)\nend\n[twice, twice { |x| x * 10 }]";
        assert_eq!(show(src), "[0, 30]");
    }

    #[test]
    fn break_leaves_the_call_with_a_value() {
        assert_eq!(show("[1, 2, 3, 4].each { |x| break x * 100 if x == 3 }"), "300");
        assert_eq!(show("i = 0\nwhile true\n  i += 1\n  break if i > 4\nend\ni"), "5");
    }

    #[test]
    fn next_skips_an_iteration() {
        assert_eq!(show("[1, 2, 3].map { |x| next 0 if x == 2; x }"), "[1, 0, 3]");
    }

    #[test]
    fn return_from_block_leaves_the_method() {
        let src = "def first_even(xs)\n  xs.each { |x| return x if x.even? }\n  nil\nend\nfirst_even([1, 3, 4, 5])";
        assert_eq!(show(src), "4");
    }

    #[test]
    fn break_from_yielded_block_is_not_caught_by_the_method_loop() {
        let src = "def forever\n  while true\n    yield\n  end\n  :unreachable\nend\nforever { break :out }";
        assert_eq!(show(src), ":out");
    }

    #[test]
    fn top_level_jumps_fail() {
        assert_eq!(run("break"), Err(EvalError::LocalJump("break")));
        assert_eq!(run("return 1"), Err(EvalError::LocalJump("return")));
    }

    #[test]
    fn rescue_catches_runtime_errors() {
        assert_eq!(show("begin\n  1 / 0\nrescue ZeroDivisionError => e\n  e.message\nend"), "\"divided by 0\"");
        assert_eq!(show("x = (Integer('zz') rescue -1)\nx"), "-1");
    }

    #[test]
    fn rescue_does_not_catch_security_violations() {
        let err = run("begin\n  system('ls')\nrescue Exception\n  :caught\nend").unwrap_err();
        assert!(matches!(err, EvalError::Security(_)));
    }

    #[test]
    fn ensure_does_not_run_after_a_ceiling() {
        let limits = Limits {
            max_steps: 10_000,
            ..Limits::default()
        };
        let src = "def f\n  begin\n    loop { }\n  ensure\n    return true\n  end\nend\nf";
        assert_eq!(run_with(&limits, src), Err(EvalError::StepLimit(10_000)));
    }

    #[test]
    fn ensure_runs_on_normal_exit() {
        assert_eq!(show("log = []\nbegin\n  log << 1\nensure\n  log << 2\nend\nlog"), "[1, 2]");
    }

    #[test]
    fn host_state_is_off_limits() {
        assert!(matches!(run("@goal = 'true'"), Err(EvalError::Security(_))));
        assert!(matches!(run("$stdout"), Err(EvalError::Security(_))));
        assert!(matches!(run("ENV['HOME']"), Err(EvalError::Security(_))));
        assert!(matches!(run("`ls`"), Err(EvalError::Security(_))));
        assert!(matches!(run("1.send(:+, 2)"), Err(EvalError::Security(_))));
        assert!(matches!(run("File.read('/etc/passwd')"), Err(EvalError::Security(_))));
    }

    #[test]
    fn case_when_uses_case_equality() {
        let src = "def kind(x)\n  case x\n  when Integer then :int\n  when 'a'..'m' then :early\n  when String, Symbol then :text\n  else :other\n  end\nend\n[kind(1), kind('b'), kind('z'), kind(:s), kind(nil)]";
        assert_eq!(show(src), "[:int, :early, :text, :text, :other]");
    }

    #[test]
    fn op_assign_on_index_and_or_assign() {
        assert_eq!(show("h = {}\nh[:a] ||= []\nh[:a] << 1\nh[:n] = 1\nh[:n] += 2\nh"), "{a: [1], n: 3}");
    }

    #[test]
    fn infinite_loop_hits_the_step_ceiling() {
        let limits = Limits {
            max_steps: 50_000,
            ..Limits::default()
        };
        assert_eq!(run_with(&limits, "loop { }"), Err(EvalError::StepLimit(50_000)));
    }

    #[test]
    fn runaway_recursion_hits_the_depth_ceiling() {
        let err = run("def down(n)\n  down(n + 1)\nend\ndown(0)").unwrap_err();
        assert!(matches!(err, EvalError::DepthLimit(_)));
    }

    #[test]
    fn unbounded_allocation_hits_the_memory_ceiling() {
        let limits = Limits {
            max_memory_bytes: 1 << 20,
            ..Limits::default()
        };
        let err = run_with(&limits, "s = 'x'\nloop { s += s }").unwrap_err();
        assert!(matches!(err, EvalError::MemoryLimit(_)));
    }

    #[test]
    fn defined_reports_kinds() {
        assert_eq!(show("a = 1\n[defined?(a), defined?(zzz), defined?(puts), defined?(String)]"),
            "[\"local-variable\", nil, \"method\", \"constant\"]");
    }
}

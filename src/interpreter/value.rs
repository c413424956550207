//! Runtime values of the exercise script language.
//!
//! Strings, arrays and hashes are shared mutable references, so `<<` on one
//! binding is observed through every other binding of the same object.
//! Traversals that follow references (equality, ordering, inspection, hash
//! keys) are bounded by [`MAX_VALUE_DEPTH`] and metered against the
//! evaluation [`Budget`].

use std::cell::{Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::mem;
use std::rc::{Rc, Weak};

use super::budget::Budget;
use super::error::{exception_ancestors, EvalError, EvalResult};

/// Deepest nesting followed by structural traversals.
pub const MAX_VALUE_DEPTH: usize = 256;

/// Largest number of nodes a hash key may contain.
const MAX_KEY_NODES: usize = 65_536;

/// Constants that name builtin classes and modules.
pub const BUILTIN_CLASSES: &[&str] = &[
    "Object",
    "BasicObject",
    "Integer",
    "Float",
    "Numeric",
    "String",
    "Symbol",
    "Array",
    "Hash",
    "Range",
    "NilClass",
    "TrueClass",
    "FalseClass",
    "Comparable",
    "Enumerable",
    "Enumerator",
    "Math",
    "Class",
    "Module",
    "Exception",
    "ScriptError",
    "StandardError",
    "RuntimeError",
    "ArgumentError",
    "TypeError",
    "NameError",
    "NoMethodError",
    "ZeroDivisionError",
    "IndexError",
    "KeyError",
    "RangeError",
    "StopIteration",
    "FrozenError",
    "FloatDomainError",
    "NotImplementedError",
    "LocalJumpError",
];

pub fn builtin_class(name: &str) -> Option<&'static str> {
    BUILTIN_CLASSES.iter().copied().find(|c| *c == name)
}

pub type StrRef = Rc<RefCell<String>>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(StrRef),
    Sym(Rc<str>),
    Array(ArrayRef),
    Hash(HashRef),
    Range(Rc<RangeValue>),
    Exception(Rc<ExceptionValue>),
    Enumerator(Rc<EnumeratorValue>),
    Class(&'static str),
    /// The top-level `self`.
    Main,
}

#[derive(Debug)]
pub struct RangeValue {
    pub start: Value,
    pub end: Value,
    pub exclusive: bool,
}

#[derive(Debug)]
pub struct ExceptionValue {
    pub class: String,
    pub message: String,
}

/// A block-taking method called without a block, e.g. `arr.each_with_index`.
///
/// The receiver is never itself an enumerator.
#[derive(Debug)]
pub struct EnumeratorValue {
    pub receiver: Value,
    pub method: String,
    pub args: Vec<Value>,
}

// ---- shared containers --------------------------------------------------

#[derive(Clone, Default)]
pub struct ArrayRef(Rc<RefCell<Vec<Value>>>);

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> Self {
        let rc = Rc::new(RefCell::new(items));
        track(Tracked::Array(Rc::downgrade(&rc)));
        Self(rc)
    }

    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, Vec<Value>>> {
        self.0.try_borrow_mut().ok()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    /// Copy of the current elements, safe to hold across block calls.
    pub fn snapshot(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl Drop for ArrayRef {
    fn drop(&mut self) {
        if Rc::strong_count(&self.0) != 1 {
            return;
        }
        let Ok(mut items) = self.0.try_borrow_mut() else {
            return;
        };
        if items.iter().any(Value::has_children) {
            let pending = mem::take(&mut *items);
            drop(items);
            release(pending);
        }
    }
}

#[derive(Clone, Default)]
pub struct HashRef(Rc<RefCell<HashTable>>);

impl HashRef {
    pub fn new(table: HashTable) -> Self {
        let rc = Rc::new(RefCell::new(table));
        track(Tracked::Hash(Rc::downgrade(&rc)));
        Self(rc)
    }

    pub fn borrow(&self) -> Ref<'_, HashTable> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, HashTable> {
        self.0.borrow_mut()
    }

    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, HashTable>> {
        self.0.try_borrow_mut().ok()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl Drop for HashRef {
    fn drop(&mut self) {
        if Rc::strong_count(&self.0) != 1 {
            return;
        }
        let Ok(mut table) = self.0.try_borrow_mut() else {
            return;
        };
        if !table.is_empty() || table.default.has_children() {
            let mut pending = Vec::new();
            table.drain_into(&mut pending);
            drop(table);
            release(pending);
        }
    }
}

/// Drop a set of values without recursing through nested containers.
fn release(mut pending: Vec<Value>) {
    while let Some(value) = pending.pop() {
        value.detach_children(&mut pending);
    }
}

// ---- container tracking -------------------------------------------------

enum Tracked {
    Array(Weak<RefCell<Vec<Value>>>),
    Hash(Weak<RefCell<HashTable>>),
}

impl Tracked {
    fn is_live(&self) -> bool {
        match self {
            Self::Array(w) => w.strong_count() > 0,
            Self::Hash(w) => w.strong_count() > 0,
        }
    }
}

#[derive(Default)]
struct Registry {
    items: Vec<Tracked>,
    compact_at: usize,
}

thread_local! {
    static REGISTRY: RefCell<Option<Registry>> = const { RefCell::new(None) };
}

fn track(container: Tracked) {
    REGISTRY.with(|registry| {
        if let Some(registry) = registry.borrow_mut().as_mut() {
            if registry.items.len() >= registry.compact_at {
                registry.items.retain(Tracked::is_live);
                registry.compact_at = (registry.items.len() * 2).max(1024);
            }
            registry.items.push(container);
        }
    });
}

/// Records every array and hash created on this thread while alive, and
/// empties the ones still reachable when dropped.
///
/// Reference cycles (`a << a`) are otherwise never freed; clearing the
/// containers at the end of an evaluation reclaims them.
pub struct ContainerScope {
    previous: Option<Registry>,
}

impl ContainerScope {
    pub fn enter() -> Self {
        let previous = REGISTRY.with(|registry| registry.borrow_mut().replace(Registry::default()));
        Self { previous }
    }
}

impl Drop for ContainerScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let Some(registry) = REGISTRY.with(|registry| mem::replace(&mut *registry.borrow_mut(), previous)) else {
            return;
        };
        let mut pending = Vec::new();
        for container in registry.items {
            match container {
                Tracked::Array(weak) => {
                    if let Some(rc) = weak.upgrade() {
                        if let Ok(mut items) = rc.try_borrow_mut() {
                            pending.append(&mut items);
                        }
                    }
                }
                Tracked::Hash(weak) => {
                    if let Some(rc) = weak.upgrade() {
                        if let Ok(mut table) = rc.try_borrow_mut() {
                            table.drain_into(&mut pending);
                        }
                    }
                }
            }
        }
        release(pending);
    }
}

// ---- hash table ---------------------------------------------------------

/// Structural identity of a value used as a hash key (`eql?` semantics:
/// `1` and `1.0` are different keys).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Nil,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
    Sym(Rc<str>),
    List(Vec<HashKey>),
    Range(Box<HashKey>, Box<HashKey>, bool),
    Class(&'static str),
}

impl HashKey {
    pub fn of(value: &Value) -> EvalResult<Self> {
        let mut nodes = 0;
        Self::build(value, 0, &mut nodes)
    }

    fn build(value: &Value, depth: usize, nodes: &mut usize) -> EvalResult<Self> {
        *nodes += 1;
        if depth > MAX_VALUE_DEPTH || *nodes > MAX_KEY_NODES {
            return Err(EvalError::argument("hash key is too large"));
        }
        Ok(match value {
            Value::Nil => Self::Nil,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(n) => Self::Int(*n),
            Value::Float(f) => Self::Float(if *f == 0.0 { 0 } else { f.to_bits() }),
            Value::Str(s) => Self::Str(s.borrow().clone()),
            Value::Sym(s) => Self::Sym(Rc::clone(s)),
            Value::Array(items) => Self::List(
                items
                    .borrow()
                    .iter()
                    .map(|item| Self::build(item, depth + 1, nodes))
                    .collect::<EvalResult<_>>()?,
            ),
            Value::Range(r) => Self::Range(
                Box::new(Self::build(&r.start, depth + 1, nodes)?),
                Box::new(Self::build(&r.end, depth + 1, nodes)?),
                r.exclusive,
            ),
            Value::Class(name) => Self::Class(*name),
            other => {
                return Err(EvalError::type_error(format!(
                    "{} cannot be used as a hash key",
                    other.class_name()
                )))
            }
        })
    }
}

/// Insertion-ordered hash with a default value for missing keys.
#[derive(Default)]
pub struct HashTable {
    entries: Vec<(Value, Value)>,
    index: HashMap<HashKey, usize>,
    pub default: Value,
}

impl HashTable {
    pub fn with_default(default: Value) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    pub fn from_pairs(pairs: Vec<(Value, Value)>) -> EvalResult<Self> {
        let mut table = Self::default();
        for (key, value) in pairs {
            table.insert(key, value)?;
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn get(&self, key: &Value) -> EvalResult<Option<Value>> {
        let key = HashKey::of(key)?;
        Ok(self.index.get(&key).map(|&i| self.entries[i].1.clone()))
    }

    pub fn contains_key(&self, key: &Value) -> EvalResult<bool> {
        Ok(self.index.contains_key(&HashKey::of(key)?))
    }

    /// Insert or overwrite. String keys are copied so later mutation of the
    /// original string cannot corrupt the table.
    pub fn insert(&mut self, key: Value, value: Value) -> EvalResult<()> {
        let hash_key = HashKey::of(&key)?;
        if let Some(&i) = self.index.get(&hash_key) {
            self.entries[i].1 = value;
            return Ok(());
        }
        let key = match key {
            Value::Str(s) => Value::str(s.borrow().clone()),
            other => other,
        };
        self.index.insert(hash_key, self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> EvalResult<Option<Value>> {
        let Some(i) = self.index.remove(&HashKey::of(key)?) else {
            return Ok(None);
        };
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Ok(Some(value))
    }

    pub fn clear(&mut self) {
        let mut pending = Vec::new();
        self.drain_entries(&mut pending);
        release(pending);
    }

    fn drain_entries(&mut self, out: &mut Vec<Value>) {
        for (key, value) in self.entries.drain(..) {
            out.push(key);
            out.push(value);
        }
        self.index.clear();
    }

    pub(crate) fn drain_into(&mut self, out: &mut Vec<Value>) {
        self.drain_entries(out);
        out.push(mem::take(&mut self.default));
    }
}

// ---- value helpers ------------------------------------------------------

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(Rc::new(RefCell::new(s.into())))
    }

    pub fn sym(s: &str) -> Self {
        Self::Sym(Rc::from(s))
    }

    pub fn array(items: Vec<Self>) -> Self {
        Self::Array(ArrayRef::new(items))
    }

    pub fn hash(table: HashTable) -> Self {
        Self::Hash(HashRef::new(table))
    }

    pub fn exception(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exception(Rc::new(ExceptionValue {
            class: class.into(),
            message: message.into(),
        }))
    }

    /// Build a range; endpoints must be numbers, strings or `nil`.
    pub fn range(start: Self, end: Self, exclusive: bool) -> EvalResult<Self> {
        let ok = |v: &Self| matches!(v, Self::Int(_) | Self::Float(_) | Self::Str(_) | Self::Nil);
        if !ok(&start) || !ok(&end) || matches!((&start, &end), (Self::Nil, Self::Nil)) {
            return Err(EvalError::argument("bad value for range"));
        }
        Ok(Self::Range(Rc::new(RangeValue {
            start,
            end,
            exclusive,
        })))
    }

    pub const fn truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    const fn has_children(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Hash(_) | Self::Enumerator(_))
    }

    /// Move out the contents of a uniquely owned container into `out`.
    fn detach_children(self, out: &mut Vec<Self>) {
        match self {
            Self::Array(items) if Rc::strong_count(&items.0) == 1 => {
                if let Some(mut items) = items.try_borrow_mut() {
                    out.append(&mut items);
                }
            }
            Self::Hash(table) if Rc::strong_count(&table.0) == 1 => {
                if let Some(mut table) = table.try_borrow_mut() {
                    table.drain_into(out);
                }
            }
            Self::Enumerator(mut e) => {
                if let Some(e) = Rc::get_mut(&mut e) {
                    out.push(mem::take(&mut e.receiver));
                    out.append(&mut e.args);
                }
            }
            _ => {}
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Nil => "NilClass",
            Self::Bool(true) => "TrueClass",
            Self::Bool(false) => "FalseClass",
            Self::Int(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Str(_) => "String",
            Self::Sym(_) => "Symbol",
            Self::Array(_) => "Array",
            Self::Hash(_) => "Hash",
            Self::Range(_) => "Range",
            Self::Exception(e) => builtin_class(&e.class).unwrap_or("StandardError"),
            Self::Enumerator(_) => "Enumerator",
            Self::Class(name) if *name == "Math" || *name == "Comparable" || *name == "Enumerable" => {
                "Module"
            }
            Self::Class(_) => "Class",
            Self::Main => "Object",
        }
    }

    /// Classes and modules this value is an instance of, most specific first.
    pub fn ancestors(&self) -> Vec<&'static str> {
        let mut chain: Vec<&'static str> = match self {
            Self::Int(_) => vec!["Integer", "Numeric", "Comparable"],
            Self::Float(_) => vec!["Float", "Numeric", "Comparable"],
            Self::Str(_) => vec!["String", "Comparable"],
            Self::Sym(_) => vec!["Symbol", "Comparable"],
            Self::Array(_) => vec!["Array", "Enumerable"],
            Self::Hash(_) => vec!["Hash", "Enumerable"],
            Self::Range(_) => vec!["Range", "Enumerable"],
            Self::Enumerator(_) => vec!["Enumerator", "Enumerable"],
            Self::Exception(e) => exception_ancestors(&e.class)
                .iter()
                .copied()
                .collect(),
            Self::Class(_) => vec![self.class_name(), "Module"],
            other => vec![other.class_name()],
        };
        chain.dedup();
        chain.extend(["Object", "BasicObject"]);
        chain
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Nil => "nil".into(),
            Self::Bool(b) => b.to_string(),
            Self::Main => "main:Object".into(),
            Self::Class(name) => format!("{name}:{}", self.class_name()),
            other => format!("an instance of {}", other.class_name()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Str(s) => write!(f, "{:?}", s.borrow()),
            Self::Sym(s) => write!(f, ":{s}"),
            Self::Array(a) => write!(f, "<Array len={}>", a.len()),
            Self::Hash(h) => write!(f, "<Hash len={}>", h.borrow().len()),
            Self::Range(r) => write!(
                f,
                "{:?}{}{:?}",
                r.start,
                if r.exclusive { "..." } else { ".." },
                r.end
            ),
            Self::Exception(e) => write!(f, "#<{}: {}>", e.class, e.message),
            Self::Enumerator(e) => write!(f, "<Enumerator {}>", e.method),
            Self::Class(name) => f.write_str(name),
            Self::Main => f.write_str("main"),
        }
    }
}

// ---- structural operations ----------------------------------------------

/// `==`: numeric values compare across Integer and Float.
pub fn equal(a: &Value, b: &Value, budget: &mut Budget) -> EvalResult<bool> {
    equal_at(a, b, false, 0, budget)
}

/// `eql?`: like `==` but `1` and `1.0` differ.
pub fn eql(a: &Value, b: &Value, budget: &mut Budget) -> EvalResult<bool> {
    equal_at(a, b, true, 0, budget)
}

fn equal_at(a: &Value, b: &Value, strict: bool, depth: usize, budget: &mut Budget) -> EvalResult<bool> {
    if depth > MAX_VALUE_DEPTH {
        return Err(EvalError::DepthLimit(MAX_VALUE_DEPTH));
    }
    budget.tick()?;
    Ok(match (a, b) {
        (Value::Nil, Value::Nil) | (Value::Main, Value::Main) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        #[allow(clippy::float_cmp)]
        (Value::Float(x), Value::Float(y)) => x == y,
        #[allow(clippy::float_cmp)]
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
            !strict && *x as f64 == *y
        }
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || *x.borrow() == *y.borrow(),
        (Value::Sym(x), Value::Sym(y)) => x == y,
        (Value::Class(x), Value::Class(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            if x.ptr_eq(y) {
                return Ok(true);
            }
            let (xs, ys) = (x.borrow(), y.borrow());
            if xs.len() != ys.len() {
                return Ok(false);
            }
            for (p, q) in xs.iter().zip(ys.iter()) {
                if !equal_at(p, q, strict, depth + 1, budget)? {
                    return Ok(false);
                }
            }
            true
        }
        (Value::Hash(x), Value::Hash(y)) => {
            if x.ptr_eq(y) {
                return Ok(true);
            }
            let (xs, ys) = (x.borrow(), y.borrow());
            if xs.len() != ys.len() {
                return Ok(false);
            }
            for (key, value) in xs.entries() {
                match ys.get(key)? {
                    Some(other) if equal_at(value, &other, strict, depth + 1, budget)? => {}
                    _ => return Ok(false),
                }
            }
            true
        }
        (Value::Range(x), Value::Range(y)) => {
            x.exclusive == y.exclusive
                && equal_at(&x.start, &y.start, strict, depth + 1, budget)?
                && equal_at(&x.end, &y.end, strict, depth + 1, budget)?
        }
        (Value::Exception(x), Value::Exception(y)) => Rc::ptr_eq(x, y),
        (Value::Enumerator(x), Value::Enumerator(y)) => Rc::ptr_eq(x, y),
        _ => false,
    })
}

/// `<=>`; `None` when the values are not comparable.
pub fn compare(a: &Value, b: &Value, budget: &mut Budget) -> EvalResult<Option<Ordering>> {
    compare_at(a, b, 0, budget)
}

fn compare_at(a: &Value, b: &Value, depth: usize, budget: &mut Budget) -> EvalResult<Option<Ordering>> {
    if depth > MAX_VALUE_DEPTH {
        return Err(EvalError::DepthLimit(MAX_VALUE_DEPTH));
    }
    budget.tick()?;
    Ok(match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_f64().zip(b.as_f64()).and_then(|(x, y)| x.partial_cmp(&y))
        }
        (Value::Str(x), Value::Str(y)) => Some(x.borrow().as_str().cmp(y.borrow().as_str())),
        (Value::Sym(x), Value::Sym(y)) => Some(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            let (xs, ys) = (x.snapshot(), y.snapshot());
            for (p, q) in xs.iter().zip(ys.iter()) {
                match compare_at(p, q, depth + 1, budget)? {
                    Some(Ordering::Equal) => {}
                    other => return Ok(other),
                }
            }
            Some(xs.len().cmp(&ys.len()))
        }
        _ if equal_at(a, b, false, depth, budget)? => Some(Ordering::Equal),
        _ => None,
    })
}

/// Like [`compare`] but a failed comparison is an `ArgumentError`.
pub fn compare_strict(a: &Value, b: &Value, budget: &mut Budget) -> EvalResult<Ordering> {
    compare(a, b, budget)?.ok_or_else(|| {
        EvalError::argument(format!(
            "comparison of {} with {} failed",
            a.class_name(),
            b.class_name()
        ))
    })
}

/// `inspect` representation.
pub fn inspect(value: &Value, budget: &mut Budget) -> EvalResult<String> {
    let mut writer = Inspector {
        out: String::new(),
        limit: usize::try_from(budget.remaining_memory()).unwrap_or(usize::MAX),
        stack: Vec::new(),
        budget,
    };
    writer.value(value)?;
    let out = writer.out;
    budget.charge(out.len())?;
    Ok(out)
}

/// `to_s` representation.
pub fn to_s(value: &Value, budget: &mut Budget) -> EvalResult<String> {
    Ok(match value {
        Value::Nil => String::new(),
        Value::Str(s) => s.borrow().clone(),
        Value::Sym(s) => s.to_string(),
        Value::Exception(e) => e.message.clone(),
        Value::Main => "main".into(),
        other => inspect(other, budget)?,
    })
}

struct Inspector<'a> {
    out: String,
    limit: usize,
    stack: Vec<usize>,
    budget: &'a mut Budget,
}

impl Inspector<'_> {
    fn step(&mut self) -> EvalResult<()> {
        self.budget.tick()?;
        if self.out.len() > self.limit {
            return Err(EvalError::MemoryLimit(self.budget.remaining_memory()));
        }
        if self.stack.len() > MAX_VALUE_DEPTH {
            return Err(EvalError::DepthLimit(MAX_VALUE_DEPTH));
        }
        Ok(())
    }

    fn value(&mut self, value: &Value) -> EvalResult<()> {
        self.step()?;
        match value {
            Value::Nil => self.out.push_str("nil"),
            Value::Bool(b) => {
                let _ = write!(self.out, "{b}");
            }
            Value::Int(n) => {
                let _ = write!(self.out, "{n}");
            }
            Value::Float(f) => self.out.push_str(&format_float(*f)),
            Value::Str(s) => push_quoted(&mut self.out, &s.borrow()),
            Value::Sym(s) => {
                self.out.push(':');
                push_symbol_name(&mut self.out, s);
            }
            Value::Array(items) => {
                let addr = items.addr();
                if self.stack.contains(&addr) {
                    self.out.push_str("[...]");
                    return Ok(());
                }
                self.stack.push(addr);
                self.out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.value(item)?;
                }
                self.out.push(']');
                self.stack.pop();
            }
            Value::Hash(table) => {
                let addr = table.addr();
                if self.stack.contains(&addr) {
                    self.out.push_str("{...}");
                    return Ok(());
                }
                self.stack.push(addr);
                self.out.push('{');
                for (i, (key, item)) in table.borrow().entries().iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    if let Value::Sym(name) = key {
                        if is_plain_symbol(name) {
                            self.out.push_str(name);
                        } else {
                            push_quoted(&mut self.out, name);
                        }
                        self.out.push_str(": ");
                    } else {
                        self.value(key)?;
                        self.out.push_str(" => ");
                    }
                    self.value(item)?;
                }
                self.out.push('}');
                self.stack.pop();
            }
            Value::Range(r) => {
                if !r.start.is_nil() {
                    self.value(&r.start)?;
                }
                self.out.push_str(if r.exclusive { "..." } else { ".." });
                if !r.end.is_nil() {
                    self.value(&r.end)?;
                }
            }
            Value::Exception(e) => {
                let _ = write!(self.out, "#<{}: {}>", e.class, e.message);
            }
            Value::Enumerator(e) => {
                self.out.push_str("#<Enumerator: ");
                self.value(&e.receiver)?;
                let _ = write!(self.out, ":{}>", e.method);
            }
            Value::Class(name) => self.out.push_str(name),
            Value::Main => self.out.push_str("main"),
        }
        Ok(())
    }
}

/// Float formatting: shortest round-trip digits, always with a fractional
/// part, exponent form outside `1e-4 ..< 1e16`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{f:e}");
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let mantissa = if mantissa.contains('.') {
            mantissa.to_string()
        } else {
            format!("{mantissa}.0")
        };
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }
    let mut s = format!("{f}");
    if !s.contains('.') {
        s.push_str(".0");
    }
    s
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x1b' => out.push_str("\\e"),
            '#' if matches!(chars.peek(), Some('{' | '$' | '@')) => out.push_str("\\#"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Whether `:name` needs no quoting.
fn is_plain_symbol(name: &str) -> bool {
    const OPERATORS: &[&str] = &[
        "+", "-", "*", "/", "%", "**", "==", "!=", "<", "<=", ">", ">=", "<=>", "===", "[]", "[]=",
        "<<", ">>", "!", "&", "|", "^", "~", "-@", "+@",
    ];
    if OPERATORS.contains(&name) {
        return true;
    }
    let body = name
        .strip_suffix(&['?', '!', '='][..])
        .unwrap_or(name);
    let mut chars = body.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

fn push_symbol_name(out: &mut String, name: &str) {
    if is_plain_symbol(name) {
        out.push_str(name);
    } else {
        push_quoted(out, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;

    fn budget() -> Budget {
        Budget::new(&Limits::default(), std::sync::Arc::default())
    }

    fn show(value: &Value) -> String {
        inspect(value, &mut budget()).unwrap()
    }

    #[test]
    fn only_nil_and_false_are_falsy() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Int(0).truthy());
        assert!(Value::str("").truthy());
        assert!(Value::array(vec![]).truthy());
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_float(-0.0), "-0.0");
        assert_eq!(format_float(1e20), "1.0e+20");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(1e15), "1000000000000000.0");
        assert_eq!(format_float(f64::INFINITY), "Infinity");
    }

    #[test]
    fn inspect_nested_values() {
        let mut table = HashTable::default();
        table.insert(Value::sym("a"), Value::Int(1)).unwrap();
        table.insert(Value::str("b"), Value::Nil).unwrap();
        let value = Value::array(vec![
            Value::str("x\"y\n"),
            Value::Float(2.5),
            Value::hash(table),
            Value::sym("ok?"),
        ]);
        assert_eq!(
            show(&value),
            r#"["x\"y\n", 2.5, {a: 1, "b" => nil}, :ok?]"#
        );
    }

    #[test]
    fn inspect_detects_cycles() {
        let array = ArrayRef::new(vec![Value::Int(1)]);
        array.borrow_mut().push(Value::Array(array.clone()));
        assert_eq!(show(&Value::Array(array.clone())), "[1, [...]]");
        array.borrow_mut().clear();
    }

    #[test]
    fn numeric_equality_crosses_types_but_eql_does_not() {
        let mut b = budget();
        assert!(equal(&Value::Int(1), &Value::Float(1.0), &mut b).unwrap());
        assert!(!eql(&Value::Int(1), &Value::Float(1.0), &mut b).unwrap());
    }

    #[test]
    fn structural_equality() {
        let mut b = budget();
        let left = Value::array(vec![Value::Int(1), Value::array(vec![Value::str("a")])]);
        let right = Value::array(vec![Value::Int(1), Value::array(vec![Value::str("a")])]);
        assert!(equal(&left, &right, &mut b).unwrap());
        let other = Value::array(vec![Value::Int(1)]);
        assert!(!equal(&left, &other, &mut b).unwrap());
    }

    #[test]
    fn array_ordering_is_lexicographic() {
        let mut b = budget();
        let x = Value::array(vec![Value::Int(1), Value::Int(2)]);
        let y = Value::array(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(compare(&x, &y, &mut b).unwrap(), Some(Ordering::Less));
        assert_eq!(compare(&x, &Value::Nil, &mut b).unwrap(), None);
    }

    #[test]
    fn hash_table_preserves_insertion_order_and_copies_string_keys() {
        let mut table = HashTable::default();
        let key = Value::str("k");
        table.insert(Value::Int(2), Value::Int(20)).unwrap();
        table.insert(key.clone(), Value::Int(10)).unwrap();
        if let Value::Str(s) = &key {
            s.borrow_mut().push('!');
        }
        assert_eq!(table.keys().len(), 2);
        assert!(table.contains_key(&Value::str("k")).unwrap());
        assert!(table.get(&Value::Float(2.0)).unwrap().is_none());
        table.remove(&Value::Int(2)).unwrap();
        assert!(matches!(table.get(&Value::str("k")).unwrap(), Some(Value::Int(10))));
    }

    #[test]
    fn deeply_nested_arrays_drop_without_recursion() {
        let mut value = Value::Nil;
        for _ in 0..200_000 {
            value = Value::array(vec![value]);
        }
        drop(value);
    }

    #[test]
    fn container_scope_breaks_cycles() {
        let weak = {
            let _scope = ContainerScope::enter();
            let array = ArrayRef::new(vec![Value::Int(1)]);
            array.borrow_mut().push(Value::Array(array.clone()));
            Rc::downgrade(&array.0)
        };
        assert_eq!(weak.strong_count(), 0);
    }

    #[test]
    fn ranges_reject_non_scalar_endpoints() {
        assert!(Value::range(Value::Int(1), Value::Int(3), false).is_ok());
        assert!(Value::range(Value::array(vec![]), Value::Int(3), false).is_err());
    }
}

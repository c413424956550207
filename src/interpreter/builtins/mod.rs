//! Builtin methods, dispatched on the receiver's type.
//!
//! Each receiver module exposes a `call` that returns `Ok(None)` for names
//! it does not implement, so dispatch can fall through to the shared
//! enumerable methods and then to the methods every object has.

mod array;
mod enumerable;
mod hash;
mod kernel;
mod numeric;
mod object;
mod range;
mod string;

use std::cell::RefCell;
use std::rc::Rc;

use super::error::{EvalError, EvalResult};
use super::eval::{BlockRef, Exec, Interpreter};
use super::value::{EnumeratorValue, Value};

/// Call `name` on a receiver other than the top-level object.
pub(crate) fn call(
    interp: &mut Interpreter,
    receiver: Value,
    name: &str,
    args: Vec<Value>,
    block: Option<&BlockRef>,
) -> Exec<Value> {
    let handled = match &receiver {
        Value::Int(_) | Value::Float(_) => numeric::call(interp, &receiver, name, &args, block)?,
        Value::Str(s) => string::call(interp, s, name, &args, block)?,
        Value::Sym(s) => string::call_symbol(interp, s, name, &args)?,
        Value::Array(a) => array::call(interp, a, name, &args, block)?,
        Value::Hash(h) => hash::call(interp, h, name, &args, block)?,
        Value::Range(r) => range::call(interp, r, name, &args, block)?,
        Value::Enumerator(e) => enumerator(interp, e, name, &args, block)?,
        Value::Class(class) => kernel::call_class(interp, class, name, &args, block)?,
        Value::Exception(_) | Value::Nil | Value::Bool(_) | Value::Main => None,
    };
    if let Some(value) = handled {
        return Ok(value);
    }
    if is_enumerable(&receiver) && enumerable::METHODS.contains(&name) {
        if block.is_none() && enumerable::BLOCK_METHODS.contains(&name) {
            return make_enumerator(interp, &receiver, name, &args);
        }
        let items = items(interp, &receiver)?;
        if let Some(value) = enumerable::call(interp, items, name, &args, block)? {
            return Ok(value);
        }
    }
    if let Some(value) = object::call(interp, &receiver, name, &args, block)? {
        return Ok(value);
    }
    Err(EvalError::no_method(name, receiver.describe()).into())
}

/// Call a receiver-less builtin such as `puts` or `Integer`.
pub(crate) fn call_function(
    interp: &mut Interpreter,
    name: &str,
    args: Vec<Value>,
    block: Option<&BlockRef>,
) -> Exec<Value> {
    if let Some(value) = kernel::call(interp, name, &args, block)? {
        return Ok(value);
    }
    if let Some(value) = object::call(interp, &Value::Main, name, &args, block)? {
        return Ok(value);
    }
    if args.is_empty() && block.is_none() {
        return Err(EvalError::Name(name.to_string()).into());
    }
    Err(EvalError::no_method(name, Value::Main.describe()).into())
}

/// Whether `name` is a receiver-less builtin.
pub(crate) fn is_function(name: &str) -> bool {
    kernel::FUNCTIONS.contains(&name)
}

/// Whether `value` has a builtin method `name`.
pub(crate) fn responds_to(value: &Value, name: &str) -> bool {
    let own: &[&str] = match value {
        Value::Int(_) => numeric::INT_METHODS,
        Value::Float(_) => numeric::FLOAT_METHODS,
        Value::Str(_) => string::METHODS,
        Value::Sym(_) => string::SYMBOL_METHODS,
        Value::Array(_) => array::METHODS,
        Value::Hash(_) => hash::METHODS,
        Value::Range(_) => range::METHODS,
        Value::Enumerator(_) => ENUMERATOR_METHODS,
        Value::Class(_) => kernel::CLASS_METHODS,
        Value::Exception(_) => object::EXCEPTION_METHODS,
        Value::Nil => object::NIL_METHODS,
        Value::Bool(_) => object::BOOL_METHODS,
        Value::Main => kernel::FUNCTIONS,
    };
    own.contains(&name)
        || object::METHODS.contains(&name)
        || (is_enumerable(value) && enumerable::METHODS.contains(&name))
}

/// Resolve `current::name`, e.g. `Math::PI` or `Float::INFINITY`.
pub(crate) fn class_constant(current: &Value, name: &str) -> EvalResult<Value> {
    let value = match (current, name) {
        (Value::Class("Math"), "PI") => Value::Float(std::f64::consts::PI),
        (Value::Class("Math"), "E") => Value::Float(std::f64::consts::E),
        (Value::Class("Float"), "INFINITY") => Value::Float(f64::INFINITY),
        (Value::Class("Float"), "NAN") => Value::Float(f64::NAN),
        (Value::Class("Float"), "EPSILON") => Value::Float(f64::EPSILON),
        (Value::Class("Float"), "MAX") => Value::Float(f64::MAX),
        (Value::Class("Float"), "MIN") => Value::Float(f64::MIN_POSITIVE),
        (Value::Class(class), _) => return Err(EvalError::Constant(format!("{class}::{name}"))),
        (other, _) => {
            return Err(EvalError::type_error(format!(
                "{} is not a class/module",
                other.describe()
            )))
        }
    };
    Ok(value)
}

const ENUMERATOR_METHODS: &[&str] = &[
    "each",
    "with_index",
    "each_with_index",
    "with_object",
    "size",
    "next",
    "rewind",
];

const fn is_enumerable(value: &Value) -> bool {
    matches!(
        value,
        Value::Array(_) | Value::Hash(_) | Value::Range(_) | Value::Enumerator(_)
    )
}

// ---- argument helpers ----------------------------------------------------

pub(super) fn arity(args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("{min}+")
        } else {
            format!("{min}..{max}")
        };
        return Err(EvalError::wrong_arity(args.len(), &expected));
    }
    Ok(())
}

fn conversion(value: &Value, into: &str) -> EvalError {
    match value {
        Value::Nil => EvalError::type_error(format!("no implicit conversion from nil to {}", into.to_lowercase())),
        other => EvalError::type_error(format!(
            "no implicit conversion of {} into {into}",
            other.class_name()
        )),
    }
}

pub(super) fn int(value: &Value) -> EvalResult<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(f) if f.is_finite() => numeric::float_to_int(*f),
        other => Err(conversion(other, "Integer")),
    }
}

/// A non-negative count or size argument.
pub(super) fn count(value: &Value) -> EvalResult<usize> {
    let n = int(value)?;
    usize::try_from(n).map_err(|_| EvalError::argument(format!("negative argument ({n})")))
}

pub(super) fn float(value: &Value) -> EvalResult<f64> {
    value.as_f64().ok_or_else(|| conversion(value, "Float"))
}

pub(super) fn string(value: &Value) -> EvalResult<String> {
    match value {
        Value::Str(s) => Ok(s.borrow().clone()),
        other => Err(conversion(other, "String")),
    }
}

pub(super) fn opt<'a>(args: &'a [Value], index: usize) -> Option<&'a Value> {
    args.get(index)
}

/// The block a method cannot run without.
pub(super) fn need_block<'a>(block: Option<&'a BlockRef>) -> EvalResult<&'a BlockRef> {
    block.ok_or(EvalError::LocalJump("no block given (yield)"))
}

/// Resolve a possibly negative index against `len`.
pub(super) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    if index < 0 {
        None
    } else {
        usize::try_from(index).ok()
    }
}

/// Resolve `start, length` or a range against `len` into a slice window.
pub(super) fn window(args: &[Value], len: usize) -> EvalResult<Option<(usize, usize)>> {
    let (start, length) = match args {
        [Value::Range(r)] => {
            let start = if r.start.is_nil() { 0 } else { int(&r.start)? };
            let Some(start) = normalize_index(start, len) else {
                return Ok(None);
            };
            let end = if r.end.is_nil() { -1 } else { int(&r.end)? };
            let end = if end < 0 { end + len as i64 } else { end };
            let end = if r.exclusive { end - 1 } else { end };
            let length = (end - start as i64 + 1).max(0);
            (start, length)
        }
        [start, length] => {
            let Some(start) = normalize_index(int(start)?, len) else {
                return Ok(None);
            };
            let length = int(length)?;
            if length < 0 {
                return Ok(None);
            }
            (start, length)
        }
        _ => return Err(EvalError::argument("wrong index arguments")),
    };
    if start > len {
        return Ok(None);
    }
    let length = usize::try_from(length).unwrap_or(usize::MAX).min(len - start);
    Ok(Some((start, length)))
}

/// Fold block arguments into the single value a block yielded.
pub(super) fn pack(mut args: Vec<Value>) -> Value {
    match args.len() {
        0 => Value::Nil,
        1 => args.pop().unwrap_or_default(),
        _ => Value::array(args),
    }
}

// ---- enumerators -----------------------------------------------------------

/// Capture a block-taking call made without a block.
pub(super) fn make_enumerator(
    interp: &mut Interpreter,
    receiver: &Value,
    method: &str,
    args: &[Value],
) -> Exec<Value> {
    let receiver = match receiver {
        Value::Enumerator(e) => {
            let items = materialize(interp, e)?;
            interp.new_array(items)?
        }
        other => other.clone(),
    };
    interp.budget().charge(super::eval::SLOT * (args.len() + 2))?;
    Ok(Value::Enumerator(Rc::new(EnumeratorValue {
        receiver,
        method: method.to_string(),
        args: args.to_vec(),
    })))
}

/// Everything the enumerator would yield, in order.
pub(super) fn materialize(interp: &mut Interpreter, e: &EnumeratorValue) -> Exec<Vec<Value>> {
    let sink = Rc::new(RefCell::new(Vec::new()));
    let collect = {
        let sink = Rc::clone(&sink);
        Interpreter::native_block(move |interp, args| {
            interp.budget().charge(super::eval::SLOT)?;
            sink.borrow_mut().push(pack(args));
            Ok(Value::Nil)
        })
    };
    interp.call_method(e.receiver.clone(), &e.method, e.args.clone(), Some(&collect))?;
    let items = sink.take();
    Ok(items)
}

/// The elements an enumerable receiver iterates over.
pub(super) fn items(interp: &mut Interpreter, receiver: &Value) -> Exec<Vec<Value>> {
    Ok(match receiver {
        Value::Array(a) => a.snapshot(),
        Value::Hash(h) => {
            let entries = h.borrow().entries().to_vec();
            interp.budget().charge_items(entries.len(), 2 * super::eval::SLOT)?;
            entries
                .into_iter()
                .map(|(k, v)| Value::array(vec![k, v]))
                .collect()
        }
        Value::Range(r) => range::to_vec(interp, r)?,
        Value::Enumerator(e) => materialize(interp, e)?,
        other => vec![other.clone()],
    })
}

fn enumerator(
    interp: &mut Interpreter,
    e: &Rc<EnumeratorValue>,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    let value = match name {
        "each" => match block {
            Some(block) => interp.call_method(e.receiver.clone(), &e.method, e.args.clone(), Some(block))?,
            None => Value::Enumerator(Rc::clone(e)),
        },
        "with_index" | "each_with_index" => {
            arity(args, 0, usize::from(name == "with_index"))?;
            let offset = match opt(args, 0) {
                Some(v) if !v.is_nil() => int(v)?,
                _ => 0,
            };
            let Some(block) = block else {
                let items = materialize(interp, e)?;
                let pairs = index_pairs(interp, items, offset)?;
                let receiver = interp.new_array(pairs)?;
                return Ok(Some(make_enumerator(interp, &receiver, "each", &[])?));
            };
            let user = Rc::clone(block);
            let counter = RefCell::new(offset);
            let indexed = Interpreter::native_block(move |interp, args| {
                let index = counter.replace_with(|i| i.saturating_add(1));
                interp.call_block(&user, vec![pack(args), Value::Int(index)])
            });
            interp.call_method(e.receiver.clone(), &e.method, e.args.clone(), Some(&indexed))?
        }
        "with_object" | "each_with_object" => {
            arity(args, 1, 1)?;
            let memo = args[0].clone();
            let block = need_block(block)?;
            let user = Rc::clone(block);
            let object = memo.clone();
            let threaded = Interpreter::native_block(move |interp, args| {
                interp.call_block(&user, vec![pack(args), object.clone()])
            });
            interp.call_method(e.receiver.clone(), &e.method, e.args.clone(), Some(&threaded))?;
            memo
        }
        "size" => {
            let items = materialize(interp, e)?;
            Value::Int(items.len() as i64)
        }
        "next" | "peek" => {
            let items = materialize(interp, e)?;
            items.into_iter().next().ok_or_else(|| EvalError::Raised {
                class: "StopIteration".into(),
                message: "iteration reached an end".into(),
            })?
        }
        "rewind" => Value::Enumerator(Rc::clone(e)),
        "inspect" | "to_s" => {
            let receiver = interp.inspect(&e.receiver)?;
            interp.new_str(format!("#<Enumerator: {receiver}:{}>", e.method))?
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn index_pairs(interp: &mut Interpreter, items: Vec<Value>, offset: i64) -> Exec<Vec<Value>> {
    interp.budget().charge_items(items.len(), 2 * super::eval::SLOT)?;
    Ok(items
        .into_iter()
        .zip(offset..)
        .map(|(item, i)| Value::array(vec![item, Value::Int(i)]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_normalization() {
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(normalize_index(5, 3), Some(5));
    }

    #[test]
    fn windows() {
        let range = Value::range(Value::Int(1), Value::Int(-1), false).unwrap();
        assert_eq!(window(&[range], 4).unwrap(), Some((1, 3)));
        assert_eq!(window(&[Value::Int(2), Value::Int(10)], 4).unwrap(), Some((2, 2)));
        assert_eq!(window(&[Value::Int(4), Value::Int(1)], 4).unwrap(), Some((4, 0)));
        assert_eq!(window(&[Value::Int(5), Value::Int(1)], 4).unwrap(), None);
    }

    #[test]
    fn float_arguments_outside_the_integer_range_overflow() {
        assert_eq!(int(&Value::Float(2.9)), Ok(2));
        assert_eq!(int(&Value::Float(-2.9)), Ok(-2));
        assert_eq!(int(&Value::Float(1e30)), Err(EvalError::overflow()));
        assert_eq!(int(&Value::Float(-1e30)), Err(EvalError::overflow()));
    }

    #[test]
    fn arity_messages() {
        let err = arity(&[], 1, 2).unwrap_err();
        assert_eq!(err.to_string(), "wrong number of arguments (given 0, expected 1..2)");
    }
}

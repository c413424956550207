//! Methods every value has, plus `nil`, booleans and exceptions.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{arity, need_block, responds_to};
use crate::interpreter::error::EvalError;
use crate::interpreter::eval::{BlockRef, Exec, Interpreter};
use crate::interpreter::value::{HashKey, HashTable, Value};

pub(super) const METHODS: &[&str] = &[
    "==",
    "!=",
    "!",
    "equal?",
    "eql?",
    "===",
    "<=>",
    "nil?",
    "is_a?",
    "kind_of?",
    "instance_of?",
    "class",
    "to_s",
    "inspect",
    "frozen?",
    "freeze",
    "dup",
    "clone",
    "hash",
    "respond_to?",
    "tap",
    "then",
    "yield_self",
    "itself",
    "between?",
    "clamp",
];

pub(super) const NIL_METHODS: &[&str] = &["to_a", "to_i", "to_f", "to_h", "&", "|"];

pub(super) const BOOL_METHODS: &[&str] = &["&", "|", "^"];

pub(super) const EXCEPTION_METHODS: &[&str] = &["message", "full_message", "backtrace"];

pub(super) fn call(
    interp: &mut Interpreter,
    recv: &Value,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    if let Some(value) = own_method(interp, recv, name, args)? {
        return Ok(Some(value));
    }
    let value = match name {
        "==" | "!=" | "equal?" | "eql?" | "===" => {
            arity(args, 1, 1)?;
            let same = match name {
                "equal?" => identical(recv, &args[0]),
                "eql?" => interp.eql(recv, &args[0])?,
                _ => interp.equal(recv, &args[0])?,
            };
            Value::Bool(if name == "!=" { !same } else { same })
        }
        "!" => Value::Bool(!recv.truthy()),
        "<=>" => {
            arity(args, 1, 1)?;
            match interp.try_compare(recv, &args[0])? {
                Some(ordering) => Value::Int(ordering as i64),
                None => Value::Nil,
            }
        }
        "nil?" => Value::Bool(recv.is_nil()),
        "is_a?" | "kind_of?" | "instance_of?" => {
            arity(args, 1, 1)?;
            let Value::Class(class) = &args[0] else {
                return Err(EvalError::type_error("class or module required").into());
            };
            let hit = if name == "instance_of?" {
                recv.class_name() == *class
            } else {
                recv.ancestors().contains(class)
            };
            Value::Bool(hit)
        }
        "class" => Value::Class(recv.class_name()),
        "to_s" => {
            let s = interp.to_s(recv)?;
            interp.new_str(s)?
        }
        "inspect" => {
            let s = interp.inspect(recv)?;
            interp.new_str(s)?
        }
        "frozen?" => Value::Bool(!matches!(
            recv,
            Value::Str(_) | Value::Array(_) | Value::Hash(_) | Value::Main
        )),
        "freeze" | "itself" => recv.clone(),
        "dup" | "clone" => duplicate(interp, recv)?,
        "hash" => {
            let mut hasher = DefaultHasher::new();
            HashKey::of(recv)?.hash(&mut hasher);
            #[allow(clippy::cast_possible_wrap)]
            Value::Int(hasher.finish() as i64)
        }
        "respond_to?" => {
            arity(args, 1, 2)?;
            let method = match &args[0] {
                Value::Sym(s) => s.to_string(),
                Value::Str(s) => s.borrow().clone(),
                other => {
                    return Err(EvalError::type_error(format!(
                        "{} is not a symbol nor a string",
                        interp.inspect(other)?
                    ))
                    .into())
                }
            };
            let known = match recv {
                Value::Main => interp.has_function(&method),
                other => responds_to(other, &method),
            };
            Value::Bool(known)
        }
        "tap" => {
            interp.call_block1(need_block(block)?, recv.clone())?;
            recv.clone()
        }
        "then" | "yield_self" => interp.call_block1(need_block(block)?, recv.clone())?,
        "between?" => {
            arity(args, 2, 2)?;
            let low = interp.compare(recv, &args[0])?;
            let high = interp.compare(recv, &args[1])?;
            Value::Bool(low != Ordering::Less && high != Ordering::Greater)
        }
        "clamp" => {
            let (low, high) = match args {
                [Value::Range(r)] => (r.start.clone(), r.end.clone()),
                [low, high] => (low.clone(), high.clone()),
                _ => return Err(EvalError::wrong_arity(args.len(), "1..2").into()),
            };
            if !low.is_nil() && !high.is_nil() && interp.compare(&low, &high)? == Ordering::Greater {
                return Err(EvalError::argument("min argument must be less than or equal to max argument").into());
            }
            if !low.is_nil() && interp.compare(recv, &low)? == Ordering::Less {
                low
            } else if !high.is_nil() && interp.compare(recv, &high)? == Ordering::Greater {
                high
            } else {
                recv.clone()
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn own_method(interp: &mut Interpreter, recv: &Value, name: &str, args: &[Value]) -> Exec<Option<Value>> {
    let value = match (recv, name) {
        (Value::Nil, "to_a") => interp.new_array(Vec::new())?,
        (Value::Nil, "to_i") => Value::Int(0),
        (Value::Nil, "to_f") => Value::Float(0.0),
        (Value::Nil, "to_h") => interp.new_hash(HashTable::default())?,
        (Value::Nil | Value::Bool(_), "&") => {
            arity(args, 1, 1)?;
            Value::Bool(recv.truthy() && args[0].truthy())
        }
        (Value::Nil | Value::Bool(_), "|") => {
            arity(args, 1, 1)?;
            Value::Bool(recv.truthy() || args[0].truthy())
        }
        (Value::Bool(b), "^") => {
            arity(args, 1, 1)?;
            Value::Bool(*b != args[0].truthy())
        }
        (Value::Exception(e), "message") => interp.new_str(e.message.clone())?,
        (Value::Exception(e), "full_message") => interp.new_str(format!("{} ({})", e.message, e.class))?,
        (Value::Exception(_), "backtrace") => Value::Nil,
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Identity: same object for references, same value otherwise.
fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => std::rc::Rc::ptr_eq(x, y),
        (Value::Array(x), Value::Array(y)) => x.ptr_eq(y),
        (Value::Hash(x), Value::Hash(y)) => x.ptr_eq(y),
        (Value::Nil, Value::Nil) | (Value::Main, Value::Main) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Sym(x), Value::Sym(y)) => x == y,
        (Value::Class(x), Value::Class(y)) => x == y,
        (Value::Range(x), Value::Range(y)) => std::rc::Rc::ptr_eq(x, y),
        (Value::Exception(x), Value::Exception(y)) => std::rc::Rc::ptr_eq(x, y),
        (Value::Enumerator(x), Value::Enumerator(y)) => std::rc::Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Shallow copy of a string, array or hash.
pub(super) fn duplicate(interp: &mut Interpreter, value: &Value) -> Exec<Value> {
    Ok(match value {
        Value::Str(s) => {
            let copy = s.borrow().clone();
            interp.new_str(copy)?
        }
        Value::Array(items) => {
            let items = items.snapshot();
            interp.new_array(items)?
        }
        Value::Hash(table) => {
            let (pairs, default) = {
                let table = table.borrow();
                (table.entries().to_vec(), table.default.clone())
            };
            let mut copy = HashTable::from_pairs(pairs)?;
            copy.default = default;
            interp.new_hash(copy)?
        }
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_of_references() {
        let a = Value::str("x");
        let b = Value::str("x");
        assert!(identical(&a, &a.clone()));
        assert!(!identical(&a, &b));
        assert!(identical(&Value::Int(3), &Value::Int(3)));
    }
}

//! Hash methods. Blocks receive each entry as a `[key, value]` pair, which
//! a two-parameter block destructures.

use super::{arity, make_enumerator, need_block};
use crate::interpreter::error::{EvalError, EvalResult};
use crate::interpreter::eval::{BlockRef, Exec, Interpreter, SLOT};
use crate::interpreter::value::{HashRef, HashTable, Value};

pub(super) const METHODS: &[&str] = &[
    "[]", "[]=", "store", "fetch", "dig", "key?", "has_key?", "include?", "member?", "value?",
    "has_value?", "key", "keys", "values", "values_at", "fetch_values", "length", "size",
    "empty?", "each", "each_pair", "each_key", "each_value", "select", "filter", "reject",
    "select!", "filter!", "reject!", "keep_if", "delete_if", "delete", "merge", "merge!",
    "update", "to_h", "to_hash", "invert", "transform_values", "transform_values!",
    "transform_keys", "transform_keys!", "slice", "except", "compact", "default", "default=",
    "clear", "replace", "sort_by", "min_by", "max_by", "sum", "count", "any?", "all?", "find",
];

/// Methods that hand back an enumerator when called without a block.
const BLOCK_METHODS: &[&str] = &[
    "each", "each_pair", "each_key", "each_value", "select", "filter", "reject", "select!",
    "filter!", "reject!", "keep_if", "delete_if", "transform_values", "transform_values!",
];

#[allow(clippy::too_many_lines)]
pub(super) fn call(
    interp: &mut Interpreter,
    h: &HashRef,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    if block.is_none() && BLOCK_METHODS.contains(&name) {
        let receiver = Value::Hash(h.clone());
        return Ok(Some(make_enumerator(interp, &receiver, name, args)?));
    }
    let this = || Value::Hash(h.clone());
    let value = match name {
        "[]" => {
            arity(args, 1, 1)?;
            let table = h.borrow();
            table.get(&args[0])?.unwrap_or_else(|| table.default.clone())
        }
        "[]=" | "store" => {
            arity(args, 2, 2)?;
            let key = frozen_key(interp, &args[0])?;
            let fresh = !h.borrow().contains_key(&key)?;
            if fresh {
                interp.budget().charge(2 * SLOT)?;
            }
            h.borrow_mut().insert(key, args[1].clone())?;
            args[1].clone()
        }
        "fetch" => {
            arity(args, 1, 2)?;
            let found = h.borrow().get(&args[0])?;
            match (found, block, args.get(1)) {
                (Some(value), _, _) => value,
                (None, Some(block), _) => interp.call_block1(block, args[0].clone())?,
                (None, None, Some(default)) => default.clone(),
                (None, None, None) => {
                    let key = interp.inspect(&args[0])?;
                    return Err(EvalError::Key(format!("key not found: {key}")).into());
                }
            }
        }
        "dig" => {
            arity(args, 1, usize::MAX)?;
            let mut current = this();
            for key in args {
                if current.is_nil() {
                    break;
                }
                current = interp.call_method(current, "[]", vec![key.clone()], None)?;
            }
            current
        }
        "key?" | "has_key?" | "include?" | "member?" => {
            arity(args, 1, 1)?;
            Value::Bool(h.borrow().contains_key(&args[0])?)
        }
        "value?" | "has_value?" | "key" => {
            arity(args, 1, 1)?;
            let mut found = None;
            for (key, value) in entries(h) {
                if interp.equal(&value, &args[0])? {
                    found = Some(key);
                    break;
                }
            }
            if name == "key" {
                found.unwrap_or_default()
            } else {
                Value::Bool(found.is_some())
            }
        }
        "keys" => {
            let keys = h.borrow().keys();
            interp.new_array(keys)?
        }
        "values" => {
            let values = h.borrow().values();
            interp.new_array(values)?
        }
        "values_at" | "fetch_values" => {
            let mut picked = Vec::with_capacity(args.len());
            for key in args {
                let value = if name == "fetch_values" {
                    interp.call_method(this(), "fetch", vec![key.clone()], block)?
                } else {
                    interp.call_method(this(), "[]", vec![key.clone()], None)?
                };
                picked.push(value);
            }
            interp.new_array(picked)?
        }
        "length" | "size" => Value::Int(h.borrow().len() as i64),
        "count" if args.is_empty() && block.is_none() => Value::Int(h.borrow().len() as i64),
        "empty?" => Value::Bool(h.borrow().is_empty()),
        "each" | "each_pair" => {
            let block = need_block(block)?;
            for (key, value) in entries(h) {
                let pair = interp.new_array(vec![key, value])?;
                interp.call_block1(block, pair)?;
            }
            this()
        }
        "each_key" | "each_value" => {
            let block = need_block(block)?;
            for (key, value) in entries(h) {
                interp.call_block1(block, if name == "each_key" { key } else { value })?;
            }
            this()
        }
        "select" | "filter" | "reject" => {
            let block = need_block(block)?;
            let kept = kept_entries(interp, h, block, name != "reject")?;
            let table = with_default_of(h, kept)?;
            interp.new_hash(table)?
        }
        "select!" | "filter!" | "keep_if" | "reject!" | "delete_if" => {
            let block = need_block(block)?;
            let keep = !matches!(name, "reject!" | "delete_if");
            let before = h.borrow().len();
            let kept = kept_entries(interp, h, block, keep)?;
            let changed = kept.len() != before;
            let table = with_default_of(h, kept)?;
            *h.borrow_mut() = table;
            if changed || matches!(name, "keep_if" | "delete_if") {
                this()
            } else {
                Value::Nil
            }
        }
        "delete" => {
            arity(args, 1, 1)?;
            let removed = h.borrow_mut().remove(&args[0])?;
            match (removed, block) {
                (Some(value), _) => value,
                (None, Some(block)) => interp.call_block1(block, args[0].clone())?,
                (None, None) => Value::Nil,
            }
        }
        "merge" | "merge!" | "update" => {
            let target = if name == "merge" {
                let copy = with_default_of(h, entries(h))?;
                interp.budget().charge_items(copy.len(), 2 * SLOT)?;
                HashRef::new(copy)
            } else {
                h.clone()
            };
            for other in args {
                let Value::Hash(other) = other else {
                    return Err(EvalError::type_error(format!(
                        "no implicit conversion of {} into Hash",
                        other.class_name()
                    ))
                    .into());
                };
                for (key, value) in entries(other) {
                    let existing = target.borrow().get(&key)?;
                    let value = match (existing, block) {
                        (Some(old), Some(block)) => interp.call_block(block, vec![key.clone(), old, value])?,
                        _ => value,
                    };
                    interp.budget().charge(2 * SLOT)?;
                    target.borrow_mut().insert(key, value)?;
                }
            }
            Value::Hash(target)
        }
        "to_h" | "to_hash" if block.is_none() => this(),
        "invert" => {
            let mut table = HashTable::default();
            for (key, value) in entries(h) {
                table.insert(value, key)?;
            }
            interp.new_hash(table)?
        }
        "transform_values" | "transform_values!" | "transform_keys" | "transform_keys!" => {
            let keys_changed = name.starts_with("transform_keys");
            let mut table = HashTable::default();
            for (key, value) in entries(h) {
                let (key, value) = match (keys_changed, block, args.first()) {
                    (true, _, Some(Value::Hash(mapping))) => {
                        let mapped = mapping.borrow().get(&key)?;
                        (mapped.unwrap_or(key), value)
                    }
                    (true, Some(block), _) => (interp.call_block1(block, key)?, value),
                    (true, None, _) => {
                        let receiver = this();
                        return Ok(Some(make_enumerator(interp, &receiver, name, args)?));
                    }
                    (false, Some(block), _) => {
                        let value = interp.call_block1(block, value)?;
                        (key, value)
                    }
                    (false, None, _) => (key, value),
                };
                table.insert(key, value)?;
            }
            if name.ends_with('!') {
                interp.budget().charge_items(table.len(), 2 * SLOT)?;
                table.default = h.borrow().default.clone();
                *h.borrow_mut() = table;
                this()
            } else {
                interp.new_hash(table)?
            }
        }
        "slice" | "except" => {
            let mut table = HashTable::default();
            if name == "slice" {
                for key in args {
                    if let Some(value) = h.borrow().get(key)? {
                        table.insert(key.clone(), value)?;
                    }
                }
            } else {
                for (key, value) in entries(h) {
                    let mut excluded = false;
                    for wanted in args {
                        excluded |= interp.eql(&key, wanted)?;
                    }
                    if !excluded {
                        table.insert(key, value)?;
                    }
                }
            }
            interp.new_hash(table)?
        }
        "compact" => {
            let kept: Vec<(Value, Value)> = entries(h).into_iter().filter(|(_, v)| !v.is_nil()).collect();
            let table = HashTable::from_pairs(kept)?;
            interp.new_hash(table)?
        }
        "default" => h.borrow().default.clone(),
        "default=" => {
            arity(args, 1, 1)?;
            h.borrow_mut().default = args[0].clone();
            args[0].clone()
        }
        "clear" => {
            h.borrow_mut().clear();
            this()
        }
        "replace" => {
            arity(args, 1, 1)?;
            let Value::Hash(other) = &args[0] else {
                return Err(EvalError::type_error("no implicit conversion into Hash").into());
            };
            let table = with_default_of(other, entries(other))?;
            interp.budget().charge_items(table.len(), 2 * SLOT)?;
            *h.borrow_mut() = table;
            this()
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn entries(h: &HashRef) -> Vec<(Value, Value)> {
    h.borrow().entries().to_vec()
}

fn kept_entries(interp: &mut Interpreter, h: &HashRef, block: &BlockRef, keep: bool) -> Exec<Vec<(Value, Value)>> {
    let mut kept = Vec::new();
    for (key, value) in entries(h) {
        let pair = interp.new_array(vec![key.clone(), value.clone()])?;
        if interp.call_block1(block, pair)?.truthy() == keep {
            kept.push((key, value));
        }
    }
    Ok(kept)
}

fn with_default_of(h: &HashRef, pairs: Vec<(Value, Value)>) -> EvalResult<HashTable> {
    let mut table = HashTable::from_pairs(pairs)?;
    table.default = h.borrow().default.clone();
    Ok(table)
}

/// String keys are copied on insertion so later mutation of the caller's
/// string does not disturb the table.
fn frozen_key(interp: &mut Interpreter, key: &Value) -> EvalResult<Value> {
    match key {
        Value::Str(s) => {
            let copy = s.borrow().clone();
            interp.new_str(copy)
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::testing::{run, show};

    #[test]
    fn lookup_and_defaults() {
        assert_eq!(show("h = { a: 1 }; [h[:a], h[:b], h.fetch(:b, 0), h.fetch(:b) { |k| k }]"), "[1, nil, 0, :b]");
        assert_eq!(show("h = Hash.new(0); 'abca'.each_char { |c| h[c] += 1 }; h"), "{\"a\" => 2, \"b\" => 1, \"c\" => 1}");
        assert_eq!(show("{ a: { b: [10, 20] } }.dig(:a, :b, 1)"), "20");
        assert!(run("{}.fetch(:missing)").is_err());
    }

    #[test]
    fn iteration_destructures_pairs() {
        assert_eq!(show("s = 0; { a: 1, b: 2 }.each { |k, v| s += v }; s"), "3");
        assert_eq!(show("{ a: 1, b: 2 }.map { |k, v| \"#{k}=#{v}\" }"), "[\"a=1\", \"b=2\"]");
        assert_eq!(show("{ a: 1, b: 2 }.each_with_object([]) { |pair, acc| acc << pair[0] }"), "[:a, :b]");
        assert_eq!(show("{ a: 3, b: 1 }.min_by { |_, v| v }"), "[:b, 1]");
        assert_eq!(show("{ a: 3, b: 1 }.sort_by { |k, v| v }.to_h"), "{b: 1, a: 3}");
        assert_eq!(show("{ a: 1, b: 2 }.sum { |k, v| v }"), "3");
    }

    #[test]
    fn filtering_returns_hashes() {
        assert_eq!(show("{ a: 1, b: 2, c: 3 }.select { |k, v| v.odd? }"), "{a: 1, c: 3}");
        assert_eq!(show("{ a: 1, b: 2 }.reject { |k, v| v > 1 }"), "{a: 1}");
        assert_eq!(show("{ a: 1, b: nil }.compact"), "{a: 1}");
        assert_eq!(show("{ a: 1, b: 2 }.slice(:b)"), "{b: 2}");
        assert_eq!(show("{ a: 1, b: 2 }.except(:b)"), "{a: 1}");
        assert_eq!(show("{ a: 1, b: 2 }.find { |k, v| v == 2 }"), "[:b, 2]");
    }

    #[test]
    fn merging() {
        assert_eq!(show("{ a: 1 }.merge({ a: 2, b: 3 })"), "{a: 2, b: 3}");
        assert_eq!(show("{ a: 1 }.merge({ a: 2 }) { |k, old, new| old + new }"), "{a: 3}");
        assert_eq!(show("h = { a: 1 }; h.merge!(b: 2); h"), "{a: 1, b: 2}");
        assert_eq!(show("h = { a: 1 }; h.merge(b: 2); h"), "{a: 1}");
    }

    #[test]
    fn transforming() {
        assert_eq!(show("{ a: 1 }.transform_values { |v| v * 10 }"), "{a: 10}");
        assert_eq!(show("{ a: 1 }.transform_keys(&:to_s)"), "{\"a\" => 1}");
        assert_eq!(show("{ a: 1, b: 2 }.invert"), "{1 => :a, 2 => :b}");
        assert_eq!(show("{ a: 1, b: 2 }.key(2)"), ":b");
        assert_eq!(show("h = { a: 1 }; h.delete(:a); h.empty?"), "true");
    }

    #[test]
    fn string_keys_are_copied() {
        assert_eq!(show("k = 'x'; h = {}; h[k] = 1; k << 'y'; h"), "{\"x\" => 1}");
    }
}

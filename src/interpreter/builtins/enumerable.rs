//! Methods shared by everything that iterates: arrays, hashes (as
//! `[key, value]` pairs), ranges and enumerators.
//!
//! Each method receives the receiver's elements already collected, so one
//! implementation serves every receiver type.

use std::cmp::Ordering;
use std::rc::Rc;

use super::{arity, count, need_block};
use crate::interpreter::error::EvalError;
use crate::interpreter::eval::{BlockRef, Exec, Interpreter, SLOT};
use crate::interpreter::value::{HashTable, Value};

pub(super) const METHODS: &[&str] = &[
    "each", "each_entry", "each_with_index", "each_with_object", "reverse_each", "map",
    "collect", "flat_map", "collect_concat", "select", "filter", "find_all", "filter_map",
    "reject", "find", "detect", "find_index", "reduce", "inject", "sum", "count", "min", "max",
    "minmax", "min_by", "max_by", "sort", "sort_by", "group_by", "partition", "tally", "any?",
    "all?", "none?", "one?", "include?", "member?", "first", "take", "drop", "take_while",
    "drop_while", "each_slice", "each_cons", "zip", "to_a", "entries", "to_h", "uniq",
    "chunk_while", "slice_when",
];

/// Methods that return an enumerator when called without a block.
pub(super) const BLOCK_METHODS: &[&str] = &[
    "each", "each_entry", "each_with_index", "reverse_each", "map", "collect", "flat_map",
    "collect_concat", "select", "filter", "find_all", "filter_map", "reject", "find", "detect",
    "min_by", "max_by", "sort_by", "group_by", "partition", "each_slice", "each_cons",
    "take_while", "drop_while", "chunk_while", "slice_when",
];

#[allow(clippy::too_many_lines)]
pub(super) fn call(
    interp: &mut Interpreter,
    items: Vec<Value>,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    let value = match name {
        "each" | "each_entry" => {
            let block = need_block(block)?;
            for item in &items {
                interp.call_block1(block, item.clone())?;
            }
            interp.new_array(items)?
        }
        "reverse_each" => {
            let block = need_block(block)?;
            for item in items.iter().rev() {
                interp.call_block1(block, item.clone())?;
            }
            interp.new_array(items)?
        }
        "each_with_index" => {
            let block = need_block(block)?;
            for (i, item) in items.iter().enumerate() {
                interp.call_block(block, vec![item.clone(), Value::Int(i as i64)])?;
            }
            interp.new_array(items)?
        }
        "each_with_object" => {
            arity(args, 1, 1)?;
            let block = need_block(block)?;
            for item in items {
                interp.call_block(block, vec![item, args[0].clone()])?;
            }
            args[0].clone()
        }
        "map" | "collect" => {
            let block = need_block(block)?;
            let mapped = map(interp, items, block)?;
            interp.new_array(mapped)?
        }
        "flat_map" | "collect_concat" => {
            let block = need_block(block)?;
            let mut out = Vec::new();
            for value in map(interp, items, block)? {
                match value {
                    Value::Array(inner) => out.extend(inner.snapshot()),
                    other => out.push(other),
                }
            }
            interp.new_array(out)?
        }
        "select" | "filter" | "find_all" | "reject" => {
            let block = need_block(block)?;
            let keep = name != "reject";
            let kept = filter(interp, items, block, keep)?;
            interp.new_array(kept)?
        }
        "filter_map" => {
            let block = need_block(block)?;
            let kept: Vec<Value> = map(interp, items, block)?.into_iter().filter(Value::truthy).collect();
            interp.new_array(kept)?
        }
        "find" | "detect" => {
            let block = need_block(block)?;
            for item in items {
                if interp.call_block1(block, item.clone())?.truthy() {
                    return Ok(Some(item));
                }
            }
            Value::Nil
        }
        "find_index" => {
            arity(args, 0, 1)?;
            for (i, item) in items.into_iter().enumerate() {
                let hit = match (args.first(), block) {
                    (Some(wanted), _) => interp.equal(&item, wanted)?,
                    (None, Some(block)) => interp.call_block1(block, item)?.truthy(),
                    (None, None) => return Err(EvalError::LocalJump("no block given (yield)").into()),
                };
                if hit {
                    return Ok(Some(Value::Int(i as i64)));
                }
            }
            Value::Nil
        }
        "reduce" | "inject" => reduce(interp, items, args, block)?,
        "sum" => {
            arity(args, 0, 1)?;
            let mut total = args.first().cloned().unwrap_or(Value::Int(0));
            for item in items {
                let item = match block {
                    Some(block) => interp.call_block1(block, item)?,
                    None => item,
                };
                total = interp.call_method(total, "+", vec![item], None)?;
            }
            total
        }
        "count" => {
            arity(args, 0, 1)?;
            let mut n = 0;
            for item in items {
                let hit = match (args.first(), block) {
                    (Some(wanted), _) => interp.equal(&item, wanted)?,
                    (None, Some(block)) => interp.call_block1(block, item)?.truthy(),
                    (None, None) => true,
                };
                n += i64::from(hit);
            }
            Value::Int(n)
        }
        "min" | "max" => {
            arity(args, 0, 1)?;
            let want = if name == "min" { Ordering::Less } else { Ordering::Greater };
            let sorted_by = |interp: &mut Interpreter, a: &Value, b: &Value| -> Exec<Ordering> {
                let ordering = compare_with(interp, block, a, b)?;
                Ok(if want == Ordering::Less { ordering } else { ordering.reverse() })
            };
            match args.first() {
                Some(n) => {
                    let n = count(n)?;
                    let mut sorted = sort_values(interp, items, &mut |interp, a, b| sorted_by(interp, a, b))?;
                    sorted.truncate(n);
                    interp.new_array(sorted)?
                }
                None => extreme(interp, items, &mut |interp, a, b| sorted_by(interp, a, b))?,
            }
        }
        "minmax" => {
            let min = extreme(interp, items.clone(), &mut |interp, a, b| compare_with(interp, block, a, b))?;
            let max = extreme(interp, items, &mut |interp, a, b| {
                compare_with(interp, block, a, b).map(Ordering::reverse)
            })?;
            interp.new_array(vec![min, max])?
        }
        "min_by" | "max_by" | "sort_by" => {
            let block = need_block(block)?;
            let keys = map(interp, items.clone(), block)?;
            let keyed: Vec<Value> = keys
                .into_iter()
                .zip(items)
                .map(|(key, item)| Value::array(vec![key, item]))
                .collect();
            let reverse = name == "max_by";
            let mut by_key = |interp: &mut Interpreter, a: &Value, b: &Value| -> Exec<Ordering> {
                let ordering = interp.compare(&pair_part(a, 0), &pair_part(b, 0))?;
                Ok(if reverse { ordering.reverse() } else { ordering })
            };
            if name == "sort_by" {
                let sorted = sort_values(interp, keyed, &mut by_key)?;
                let values = sorted.iter().map(|p| pair_part(p, 1)).collect();
                interp.new_array(values)?
            } else {
                pair_part(&extreme(interp, keyed, &mut by_key)?, 1)
            }
        }
        "sort" => {
            let sorted = sort_values(interp, items, &mut |interp, a, b| compare_with(interp, block, a, b))?;
            interp.new_array(sorted)?
        }
        "group_by" | "partition" => {
            let block = need_block(block)?;
            if name == "partition" {
                let (mut yes, mut no) = (Vec::new(), Vec::new());
                for item in items {
                    if interp.call_block1(block, item.clone())?.truthy() {
                        yes.push(item);
                    } else {
                        no.push(item);
                    }
                }
                let (yes, no) = (interp.new_array(yes)?, interp.new_array(no)?);
                interp.new_array(vec![yes, no])?
            } else {
                let mut groups = HashTable::default();
                for item in items {
                    let key = interp.call_block1(block, item.clone())?;
                    push_group(interp, &mut groups, key, item)?;
                }
                interp.new_hash(groups)?
            }
        }
        "tally" => {
            let mut counts = HashTable::default();
            for item in items {
                let n = match counts.get(&item)? {
                    Some(Value::Int(n)) => n + 1,
                    _ => 1,
                };
                counts.insert(item, Value::Int(n))?;
            }
            interp.new_hash(counts)?
        }
        "any?" | "all?" | "none?" | "one?" => {
            arity(args, 0, 1)?;
            let (mut hits, mut missed) = (0usize, false);
            for item in items {
                let hit = match (args.first(), block) {
                    (Some(pattern), _) => interp.call_method(pattern.clone(), "===", vec![item], None)?.truthy(),
                    (None, Some(block)) => interp.call_block1(block, item)?.truthy(),
                    (None, None) => item.truthy(),
                };
                hits += usize::from(hit);
                missed |= !hit;
                let settled = match name {
                    "all?" => missed,
                    "one?" => hits > 1,
                    _ => hit,
                };
                if settled {
                    break;
                }
            }
            Value::Bool(match name {
                "any?" => hits > 0,
                "none?" => hits == 0,
                "one?" => hits == 1,
                _ => !missed,
            })
        }
        "include?" | "member?" => {
            arity(args, 1, 1)?;
            let mut found = false;
            for item in &items {
                if interp.equal(item, &args[0])? {
                    found = true;
                    break;
                }
            }
            Value::Bool(found)
        }
        "first" => {
            arity(args, 0, 1)?;
            match args.first() {
                None => items.into_iter().next().unwrap_or_default(),
                Some(n) => {
                    let n = count(n)?;
                    interp.new_array(items.into_iter().take(n).collect())?
                }
            }
        }
        "take" | "drop" => {
            arity(args, 1, 1)?;
            let n = count(&args[0])?;
            let kept = if name == "take" {
                items.into_iter().take(n).collect()
            } else {
                items.into_iter().skip(n).collect()
            };
            interp.new_array(kept)?
        }
        "take_while" | "drop_while" => {
            let block = need_block(block)?;
            let mut split = items.len();
            for (i, item) in items.iter().enumerate() {
                if !interp.call_block1(block, item.clone())?.truthy() {
                    split = i;
                    break;
                }
            }
            let mut items = items;
            let rest = items.split_off(split);
            interp.new_array(if name == "take_while" { items } else { rest })?
        }
        "each_slice" | "each_cons" => {
            arity(args, 1, 1)?;
            let size = count(&args[0])?;
            if size == 0 {
                return Err(EvalError::argument(format!("invalid size {size}")).into());
            }
            let groups: Vec<Vec<Value>> = if name == "each_slice" {
                items.chunks(size).map(<[Value]>::to_vec).collect()
            } else {
                items.windows(size).map(<[Value]>::to_vec).collect()
            };
            let block = need_block(block)?;
            for group in groups {
                let group = interp.new_array(group)?;
                interp.call_block1(block, group)?;
            }
            if name == "each_slice" {
                Value::Nil
            } else {
                interp.new_array(items)?
            }
        }
        "zip" => {
            let others = args
                .iter()
                .map(|other| super::items(interp, other))
                .collect::<Exec<Vec<_>>>()?;
            let mut rows = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let mut row = vec![item];
                row.extend(others.iter().map(|other| other.get(i).cloned().unwrap_or_default()));
                rows.push(interp.new_array(row)?);
            }
            match block {
                Some(block) => {
                    for row in rows {
                        interp.call_block1(block, row)?;
                    }
                    Value::Nil
                }
                None => interp.new_array(rows)?,
            }
        }
        "to_a" | "entries" => interp.new_array(items)?,
        "to_h" => {
            let mut table = HashTable::default();
            for (i, item) in items.into_iter().enumerate() {
                let pair = match block {
                    Some(block) => interp.call_block1(block, item)?,
                    None => item,
                };
                let Value::Array(pair) = &pair else {
                    return Err(EvalError::type_error(format!(
                        "wrong element type {} at {i} (expected array)",
                        pair.class_name()
                    ))
                    .into());
                };
                let pair = pair.snapshot();
                let [key, value] = <[Value; 2]>::try_from(pair).map_err(|pair| {
                    EvalError::argument(format!("wrong array length at {i} (expected 2, was {})", pair.len()))
                })?;
                table.insert(key, value)?;
            }
            interp.new_hash(table)?
        }
        "uniq" => {
            let kept = uniq(interp, items, block)?;
            interp.new_array(kept)?
        }
        "chunk_while" | "slice_when" => {
            let block = need_block(block)?;
            let mut groups: Vec<Vec<Value>> = Vec::new();
            let mut current: Vec<Value> = Vec::new();
            for item in items {
                if let Some(prev) = current.last() {
                    let joined = interp.call_block(block, vec![prev.clone(), item.clone()])?.truthy();
                    let split = if name == "chunk_while" { !joined } else { joined };
                    if split {
                        groups.push(std::mem::take(&mut current));
                    }
                }
                current.push(item);
            }
            if !current.is_empty() {
                groups.push(current);
            }
            let groups = groups
                .into_iter()
                .map(|group| interp.new_array(group))
                .collect::<Result<Vec<_>, _>>()?;
            interp.new_array(groups)?
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

pub(super) fn map(interp: &mut Interpreter, items: Vec<Value>, block: &BlockRef) -> Exec<Vec<Value>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(interp.call_block1(block, item)?);
    }
    Ok(out)
}

pub(super) fn filter(interp: &mut Interpreter, items: Vec<Value>, block: &BlockRef, keep: bool) -> Exec<Vec<Value>> {
    let mut out = Vec::new();
    for item in items {
        if interp.call_block1(block, item.clone())?.truthy() == keep {
            out.push(item);
        }
    }
    Ok(out)
}

pub(super) fn uniq(interp: &mut Interpreter, items: Vec<Value>, block: Option<&BlockRef>) -> Exec<Vec<Value>> {
    let mut seen = HashTable::default();
    let mut out = Vec::new();
    for item in items {
        let key = match block {
            Some(block) => interp.call_block1(block, item.clone())?,
            None => item.clone(),
        };
        if !seen.contains_key(&key)? {
            seen.insert(key, Value::Nil)?;
            out.push(item);
        }
    }
    Ok(out)
}

enum Fold<'a> {
    Send(Rc<str>),
    Yield(&'a BlockRef),
}

fn reduce(interp: &mut Interpreter, items: Vec<Value>, args: &[Value], block: Option<&BlockRef>) -> Exec<Value> {
    arity(args, 0, 2)?;
    let (init, fold) = match (args, block) {
        ([init, Value::Sym(op)], _) => (Some(init.clone()), Fold::Send(Rc::clone(op))),
        ([Value::Sym(op)], None) => (None, Fold::Send(Rc::clone(op))),
        ([init], Some(block)) => (Some(init.clone()), Fold::Yield(block)),
        ([], Some(block)) => (None, Fold::Yield(block)),
        _ => return Err(EvalError::LocalJump("no block given (yield)").into()),
    };
    let mut items = items.into_iter();
    let Some(mut acc) = init.or_else(|| items.next()) else {
        return Ok(Value::Nil);
    };
    for item in items {
        acc = match &fold {
            Fold::Send(op) => interp.call_method(acc, op, vec![item], None)?,
            Fold::Yield(block) => interp.call_block(block, vec![acc, item])?,
        };
    }
    Ok(acc)
}

/// `<=>` through the block when one is given, natural order otherwise.
pub(super) fn compare_with(
    interp: &mut Interpreter,
    block: Option<&BlockRef>,
    a: &Value,
    b: &Value,
) -> Exec<Ordering> {
    let Some(block) = block else {
        return Ok(interp.compare(a, b)?);
    };
    match interp.call_block(block, vec![a.clone(), b.clone()])? {
        Value::Int(n) => Ok(n.cmp(&0)),
        Value::Float(f) if f < 0.0 => Ok(Ordering::Less),
        Value::Float(f) if f > 0.0 => Ok(Ordering::Greater),
        Value::Float(_) => Ok(Ordering::Equal),
        other => Err(EvalError::argument(format!(
            "comparison of {} with {} failed",
            a.class_name(),
            if other.is_nil() { "nil".into() } else { other.class_name().to_string() }
        ))
        .into()),
    }
}

type Comparator<'a> = dyn FnMut(&mut Interpreter, &Value, &Value) -> Exec<Ordering> + 'a;

/// Stable merge sort whose comparator may fail or be inconsistent.
pub(super) fn sort_values(interp: &mut Interpreter, items: Vec<Value>, cmp: &mut Comparator<'_>) -> Exec<Vec<Value>> {
    let n = items.len();
    interp.ensure_fits(n, SLOT)?;
    let mut src = items;
    let mut width = 1;
    while width < n {
        let mut dst = Vec::with_capacity(n);
        let mut start = 0;
        while start < n {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                if cmp(interp, &src[j], &src[i])? == Ordering::Less {
                    dst.push(src[j].clone());
                    j += 1;
                } else {
                    dst.push(src[i].clone());
                    i += 1;
                }
            }
            dst.extend_from_slice(&src[i..mid]);
            dst.extend_from_slice(&src[j..end]);
            start = end;
        }
        src = dst;
        width *= 2;
    }
    Ok(src)
}

/// The element that sorts first under `cmp`, or `nil` when empty.
fn extreme(interp: &mut Interpreter, items: Vec<Value>, cmp: &mut Comparator<'_>) -> Exec<Value> {
    let mut items = items.into_iter();
    let Some(mut best) = items.next() else {
        return Ok(Value::Nil);
    };
    for item in items {
        if cmp(interp, &item, &best)? == Ordering::Less {
            best = item;
        }
    }
    Ok(best)
}

fn pair_part(pair: &Value, index: usize) -> Value {
    match pair {
        Value::Array(items) => items.get(index).unwrap_or_default(),
        _ => Value::Nil,
    }
}

fn push_group(interp: &mut Interpreter, groups: &mut HashTable, key: Value, item: Value) -> Exec<()> {
    match groups.get(&key)? {
        Some(Value::Array(group)) => {
            interp.budget().charge(SLOT)?;
            group.borrow_mut().push(item);
        }
        _ => {
            let group = interp.new_array(vec![item])?;
            groups.insert(key, group)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::interpreter::testing::{run, show};

    #[test]
    fn mapping_and_filtering() {
        assert_eq!(show("[1, 2, 3].map { |x| x * 2 }"), "[2, 4, 6]");
        assert_eq!(show("(1..6).select(&:even?)"), "[2, 4, 6]");
        assert_eq!(show("[1, 2, 3, 4].reject(&:odd?)"), "[2, 4]");
        assert_eq!(show("[1, nil, 2].filter_map { |x| x && x * 10 }"), "[10, 20]");
        assert_eq!(show("[[1, 2], [3]].flat_map { |x| x }"), "[1, 2, 3]");
    }

    #[test]
    fn folding() {
        assert_eq!(show("[1, 2, 3].reduce(:+)"), "6");
        assert_eq!(show("[1, 2, 3].inject(10) { |acc, x| acc + x }"), "16");
        assert_eq!(show("[].reduce(:+)"), "nil");
        assert_eq!(show("[0.5, 1.5].sum"), "2.0");
        assert_eq!(show("['a', 'b'].sum('')"), "\"ab\"");
        assert_eq!(show("[1, 2, 3].sum { |x| x * x }"), "14");
    }

    #[test]
    fn ordering() {
        assert_eq!(show("[3, 1, 2].sort"), "[1, 2, 3]");
        assert_eq!(show("[3, 1, 2].sort { |a, b| b <=> a }"), "[3, 2, 1]");
        assert_eq!(show("%w[ccc a bb].sort_by(&:length)"), "[\"a\", \"bb\", \"ccc\"]");
        assert_eq!(show("%w[ccc a bb].min_by(&:length)"), "\"a\"");
        assert_eq!(show("%w[ccc a bb].max_by(&:length)"), "\"ccc\"");
        assert_eq!(show("[5, 3, 9].min(2)"), "[3, 5]");
        assert_eq!(show("[5, 3, 9].minmax"), "[3, 9]");
        assert_eq!(show("[].max"), "nil");
        assert!(run("[1, 'a'].sort").is_err());
    }

    #[test]
    fn inconsistent_comparators_do_not_panic() {
        assert!(run("(1..50).to_a.sort { rand(3) - 1 }.length").is_ok());
    }

    #[test]
    fn predicates() {
        assert_eq!(show("[[1, 2].any?(&:even?), [2, 4].all?(&:even?), [1, 3].none?(&:even?), [1, 2].one?(&:even?)]"),
            "[true, true, true, true]");
        assert_eq!(show("[[].all?, [nil].any?, [1, 'a'].any?(String)]"), "[true, false, true]");
        assert_eq!(show("[1, 2, 3].all? { |x| x < 3 }"), "false");
    }

    #[test]
    fn grouping() {
        assert_eq!(show("(1..6).group_by { |x| x % 3 }"), "{1 => [1, 4], 2 => [2, 5], 0 => [3, 6]}");
        assert_eq!(show("(1..5).partition(&:odd?)"), "[[1, 3, 5], [2, 4]]");
        assert_eq!(show("%w[a b a].tally"), "{\"a\" => 2, \"b\" => 1}");
        assert_eq!(show("(1..7).each_slice(3).to_a"), "[[1, 2, 3], [4, 5, 6], [7]]");
        assert_eq!(show("[1, 2, 4, 5].chunk_while { |a, b| b == a + 1 }"), "[[1, 2], [4, 5]]");
    }

    #[test]
    fn enumerators_chain() {
        assert_eq!(show("%w[a b].each_with_index.map { |s, i| s * (i + 1) }"), "[\"a\", \"bb\"]");
        assert_eq!(show("%w[a b].map.with_index(1) { |s, i| \"#{i}#{s}\" }"), "[\"1a\", \"2b\"]");
        assert_eq!(show("[1, 2].each_with_object([]) { |x, acc| acc << x * 3 }"), "[3, 6]");
        assert_eq!(show("[1, 2].zip([3, 4], [5])"), "[[1, 3, 5], [2, 4, nil]]");
        assert_eq!(show("[[1, 2], [3, 4]].to_h"), "{1 => 2, 3 => 4}");
    }
}

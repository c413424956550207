//! Array methods. Anything not handled here falls through to the shared
//! enumerable methods.

use super::enumerable::{compare_with, filter, map, sort_values, uniq};
use super::kernel::below;
use super::{arity, count, int, make_enumerator, need_block, normalize_index, opt, window};
use crate::interpreter::error::{EvalError, EvalResult};
use crate::interpreter::eval::{BlockRef, Exec, Interpreter, SLOT};
use crate::interpreter::value::{ArrayRef, HashTable, Value, MAX_VALUE_DEPTH};

pub(super) const METHODS: &[&str] = &[
    "length", "size", "empty?", "last", "push", "append", "<<", "pop", "shift", "unshift",
    "prepend", "insert", "concat", "[]", "slice", "[]=", "at", "fetch", "dig", "values_at",
    "index", "find_index", "rindex", "each", "each_index", "cycle", "reverse", "reverse!",
    "rotate", "rotate!", "sort!", "sort_by!", "map!", "collect!", "select!", "filter!",
    "keep_if", "reject!", "delete_if", "uniq!", "compact", "compact!", "flatten", "flatten!",
    "shuffle", "shuffle!", "sample", "join", "delete", "delete_at", "clear", "replace", "fill",
    "+", "-", "*", "&", "|", "difference", "union", "intersection", "intersect?", "product",
    "combination", "permutation", "transpose", "to_a", "to_ary",
];

/// Methods that hand back an enumerator when called without a block.
const BLOCK_METHODS: &[&str] = &[
    "each", "each_index", "map!", "collect!", "select!", "filter!", "keep_if", "reject!",
    "delete_if", "sort_by!", "combination", "permutation",
];

#[allow(clippy::too_many_lines)]
pub(super) fn call(
    interp: &mut Interpreter,
    a: &ArrayRef,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    if block.is_none() && BLOCK_METHODS.contains(&name) {
        let receiver = Value::Array(a.clone());
        return Ok(Some(make_enumerator(interp, &receiver, name, args)?));
    }
    let this = || Value::Array(a.clone());
    let value = match name {
        "length" | "size" => Value::Int(a.len() as i64),
        "empty?" => Value::Bool(a.len() == 0),
        "to_a" | "to_ary" => this(),
        "last" => {
            arity(args, 0, 1)?;
            match args.first() {
                None => a.borrow().last().cloned().unwrap_or_default(),
                Some(n) => {
                    let n = count(n)?;
                    let tail = {
                        let items = a.borrow();
                        items[items.len().saturating_sub(n)..].to_vec()
                    };
                    interp.new_array(tail)?
                }
            }
        }
        "push" | "append" | "<<" => {
            if name == "<<" {
                arity(args, 1, 1)?;
            }
            interp.budget().charge_items(args.len(), SLOT)?;
            a.borrow_mut().extend_from_slice(args);
            this()
        }
        "unshift" | "prepend" => {
            interp.budget().charge_items(args.len(), SLOT)?;
            a.borrow_mut().splice(0..0, args.iter().cloned());
            this()
        }
        "insert" => {
            arity(args, 1, usize::MAX)?;
            let raw = int(&args[0])?;
            let len = a.len();
            let at = if raw < 0 {
                normalize_index(raw + 1, len).ok_or_else(|| {
                    EvalError::Index(format!("index {raw} too small for array; minimum: -{}", len + 1))
                })?
            } else {
                usize::try_from(raw).unwrap_or(usize::MAX)
            };
            let values = &args[1..];
            pad_to(interp, a, at)?;
            interp.budget().charge_items(values.len(), SLOT)?;
            a.borrow_mut().splice(at..at, values.iter().cloned());
            this()
        }
        "concat" => {
            let mut extra = Vec::new();
            for other in args {
                extra.extend(array_arg(other)?.snapshot());
            }
            interp.budget().charge_items(extra.len(), SLOT)?;
            a.borrow_mut().extend(extra);
            this()
        }
        "pop" | "shift" => {
            arity(args, 0, 1)?;
            let mut items = a.borrow_mut();
            match args.first() {
                None if name == "pop" => items.pop().unwrap_or_default(),
                None if items.is_empty() => Value::Nil,
                None => items.remove(0),
                Some(n) => {
                    let n = count(n)?.min(items.len());
                    let taken: Vec<Value> = if name == "pop" {
                        let at = items.len() - n;
                        items.split_off(at)
                    } else {
                        items.drain(..n).collect()
                    };
                    drop(items);
                    interp.new_array(taken)?
                }
            }
        }
        "[]" | "slice" => {
            arity(args, 1, 2)?;
            match args {
                [index] if !matches!(index, Value::Range(_)) => {
                    let i = normalize_index(int(index)?, a.len());
                    i.and_then(|i| a.get(i)).unwrap_or_default()
                }
                _ => match window(args, a.len())? {
                    Some((start, len)) => {
                        let part = a.borrow()[start..start + len].to_vec();
                        interp.new_array(part)?
                    }
                    None => Value::Nil,
                },
            }
        }
        "at" => {
            arity(args, 1, 1)?;
            let i = normalize_index(int(&args[0])?, a.len());
            i.and_then(|i| a.get(i)).unwrap_or_default()
        }
        "[]=" => {
            arity(args, 2, 3)?;
            let (selector, value) = args.split_at(args.len() - 1);
            assign(interp, a, selector, value[0].clone())?;
            value[0].clone()
        }
        "fetch" => {
            arity(args, 1, 2)?;
            let raw = int(&args[0])?;
            let len = a.len();
            match normalize_index(raw, len).and_then(|i| a.get(i)) {
                Some(item) => item,
                None => match (block, opt(args, 1)) {
                    (Some(block), _) => interp.call_block1(block, args[0].clone())?,
                    (None, Some(default)) => default.clone(),
                    (None, None) => {
                        return Err(EvalError::Index(format!(
                            "index {raw} outside of array bounds: {}...{len}",
                            -(len as i64)
                        ))
                        .into())
                    }
                },
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
        "values_at" => {
            let len = a.len();
            let mut picked = Vec::with_capacity(args.len());
            for index in args {
                let i = normalize_index(int(index)?, len);
                picked.push(i.and_then(|i| a.get(i)).unwrap_or_default());
            }
            interp.new_array(picked)?
        }
        "index" | "find_index" | "rindex" => {
            arity(args, 0, 1)?;
            let mut items = a.snapshot().into_iter().enumerate().collect::<Vec<_>>();
            if name == "rindex" {
                items.reverse();
            }
            let mut found = Value::Nil;
            for (i, item) in items {
                let hit = match (args.first(), block) {
                    (Some(wanted), _) => interp.equal(&item, wanted)?,
                    (None, Some(block)) => interp.call_block1(block, item)?.truthy(),
                    (None, None) => return Ok(Some(make_enumerator(interp, &this(), name, args)?)),
                };
                if hit {
                    found = Value::Int(i as i64);
                    break;
                }
            }
            found
        }
        "each" => {
            let block = need_block(block)?;
            let mut i = 0;
            while let Some(item) = a.get(i) {
                interp.call_block1(block, item)?;
                i += 1;
            }
            this()
        }
        "each_index" => {
            let block = need_block(block)?;
            let mut i = 0;
            while i < a.len() {
                interp.call_block1(block, Value::Int(i as i64))?;
                i += 1;
            }
            this()
        }
        "cycle" => {
            arity(args, 0, 1)?;
            let block = need_block(block)?;
            let rounds = match opt(args, 0) {
                Some(n) if !n.is_nil() => Some(int(n)?),
                _ => None,
            };
            let mut round = 0;
            while rounds.map_or(true, |n| round < n) && a.len() > 0 {
                for item in a.snapshot() {
                    interp.call_block1(block, item)?;
                }
                round += 1;
            }
            Value::Nil
        }
        "reverse" => {
            let mut items = a.snapshot();
            items.reverse();
            interp.new_array(items)?
        }
        "reverse!" => {
            a.borrow_mut().reverse();
            this()
        }
        "rotate" | "rotate!" => {
            arity(args, 0, 1)?;
            let by = opt(args, 0).map(int).transpose()?.unwrap_or(1);
            let mut items = a.snapshot();
            if !items.is_empty() {
                let len = items.len() as i64;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                items.rotate_left(by.rem_euclid(len) as usize);
            }
            replace_or_new(interp, a, name, items)?
        }
        "sort!" => {
            let sorted = sort_values(interp, a.snapshot(), &mut |interp, x, y| compare_with(interp, block, x, y))?;
            replace(interp, a, sorted)?
        }
        "sort_by!" => {
            let sorted = interp.call_method(this(), "sort_by", Vec::new(), block)?;
            let Value::Array(sorted) = sorted else {
                return Ok(Some(this()));
            };
            replace(interp, a, sorted.snapshot())?
        }
        "map!" | "collect!" => {
            let block = need_block(block)?;
            let mapped = map(interp, a.snapshot(), block)?;
            replace(interp, a, mapped)?
        }
        "select!" | "filter!" | "keep_if" | "reject!" | "delete_if" => {
            let block = need_block(block)?;
            let keep = !matches!(name, "reject!" | "delete_if");
            let before = a.len();
            let kept = filter(interp, a.snapshot(), block, keep)?;
            let changed = kept.len() != before;
            replace(interp, a, kept)?;
            if changed || matches!(name, "keep_if" | "delete_if") {
                this()
            } else {
                Value::Nil
            }
        }
        "uniq!" => {
            let before = a.len();
            let kept = uniq(interp, a.snapshot(), block)?;
            let changed = kept.len() != before;
            replace(interp, a, kept)?;
            if changed { this() } else { Value::Nil }
        }
        "compact" | "compact!" => {
            let before = a.len();
            let kept: Vec<Value> = a.snapshot().into_iter().filter(|v| !v.is_nil()).collect();
            if name == "compact" {
                interp.new_array(kept)?
            } else if kept.len() == before {
                Value::Nil
            } else {
                replace(interp, a, kept)?
            }
        }
        "flatten" | "flatten!" => {
            arity(args, 0, 1)?;
            let depth = match opt(args, 0) {
                Some(d) if !d.is_nil() => int(d)?,
                _ => -1,
            };
            let mut out = Vec::new();
            let mut path = vec![a.addr()];
            flatten_into(interp, &a.snapshot(), depth, &mut path, &mut out)?;
            replace_or_new(interp, a, name, out)?
        }
        "shuffle" | "shuffle!" => {
            let mut items = a.snapshot();
            for i in (1..items.len()).rev() {
                #[allow(clippy::cast_possible_truncation)]
                let j = below(i as u64 + 1) as usize;
                items.swap(i, j);
            }
            replace_or_new(interp, a, name, items)?
        }
        "sample" => {
            arity(args, 0, 1)?;
            let len = a.len();
            match args.first() {
                None if len == 0 => Value::Nil,
                #[allow(clippy::cast_possible_truncation)]
                None => a.get(below(len as u64) as usize).unwrap_or_default(),
                Some(n) => {
                    let n = count(n)?.min(len);
                    let mut items = a.snapshot();
                    for i in 0..n {
                        #[allow(clippy::cast_possible_truncation)]
                        let j = i + below((len - i) as u64) as usize;
                        items.swap(i, j);
                    }
                    items.truncate(n);
                    interp.new_array(items)?
                }
            }
        }
        "join" => {
            arity(args, 0, 1)?;
            let sep = match opt(args, 0) {
                Some(Value::Str(s)) => s.borrow().clone(),
                Some(Value::Nil) | None => String::new(),
                Some(other) => {
                    return Err(EvalError::type_error(format!(
                        "no implicit conversion of {} into String",
                        other.class_name()
                    ))
                    .into())
                }
            };
            let mut out = String::new();
            let mut path = vec![a.addr()];
            join_into(interp, &a.snapshot(), &sep, &mut path, &mut out)?;
            interp.new_str(out)?
        }
        "delete" => {
            arity(args, 1, 1)?;
            let mut kept = Vec::new();
            let mut found = None;
            for item in a.snapshot() {
                if interp.equal(&item, &args[0])? {
                    found = Some(item);
                } else {
                    kept.push(item);
                }
            }
            match found {
                Some(item) => {
                    *a.borrow_mut() = kept;
                    item
                }
                None => match block {
                    Some(block) => interp.call_block1(block, args[0].clone())?,
                    None => Value::Nil,
                },
            }
        }
        "delete_at" => {
            arity(args, 1, 1)?;
            let len = a.len();
            match normalize_index(int(&args[0])?, len).filter(|i| *i < len) {
                Some(i) => a.borrow_mut().remove(i),
                None => Value::Nil,
            }
        }
        "clear" => {
            a.borrow_mut().clear();
            this()
        }
        "replace" => {
            arity(args, 1, 1)?;
            let items = array_arg(&args[0])?.snapshot();
            replace(interp, a, items)?
        }
        "fill" => {
            let len = a.len();
            match block {
                Some(block) => {
                    arity(args, 0, 0)?;
                    for i in 0..len {
                        let value = interp.call_block1(block, Value::Int(i as i64))?;
                        if let Some(slot) = a.borrow_mut().get_mut(i) {
                            *slot = value;
                        }
                    }
                }
                None => {
                    arity(args, 1, 3)?;
                    let start = match opt(args, 1) {
                        Some(s) if !s.is_nil() => normalize_index(int(s)?, len).unwrap_or(0),
                        _ => 0,
                    };
                    let end = match opt(args, 2) {
                        Some(n) => start.saturating_add(count(n)?),
                        None => len.max(start),
                    };
                    pad_to(interp, a, end)?;
                    for slot in &mut a.borrow_mut()[start..end] {
                        *slot = args[0].clone();
                    }
                }
            }
            this()
        }
        "+" => {
            arity(args, 1, 1)?;
            let mut items = a.snapshot();
            items.extend(array_arg(&args[0])?.snapshot());
            interp.new_array(items)?
        }
        "*" => {
            arity(args, 1, 1)?;
            match &args[0] {
                Value::Str(_) => interp.call_method(this(), "join", args.to_vec(), None)?,
                times => {
                    let times = count(times)?;
                    let items = a.snapshot();
                    interp.ensure_fits(items.len().saturating_mul(times), SLOT)?;
                    let repeated: Vec<Value> = (0..times).flat_map(|_| items.iter().cloned()).collect();
                    interp.new_array(repeated)?
                }
            }
        }
        "-" | "difference" => {
            let mut excluded = HashTable::default();
            for other in args {
                for item in array_arg(other)?.snapshot() {
                    excluded.insert(item, Value::Nil)?;
                }
            }
            let mut kept = Vec::new();
            for item in a.snapshot() {
                if !excluded.contains_key(&item)? {
                    kept.push(item);
                }
            }
            interp.new_array(kept)?
        }
        "&" | "intersection" | "intersect?" => {
            let mut kept = uniq(interp, a.snapshot(), None)?;
            for other in args {
                let mut present = HashTable::default();
                for item in array_arg(other)?.snapshot() {
                    present.insert(item, Value::Nil)?;
                }
                let mut next = Vec::new();
                for item in kept {
                    if present.contains_key(&item)? {
                        next.push(item);
                    }
                }
                kept = next;
            }
            if name == "intersect?" {
                Value::Bool(!kept.is_empty())
            } else {
                interp.new_array(kept)?
            }
        }
        "|" | "union" => {
            let mut all = a.snapshot();
            for other in args {
                all.extend(array_arg(other)?.snapshot());
            }
            let kept = uniq(interp, all, None)?;
            interp.new_array(kept)?
        }
        "product" => {
            let mut rows: Vec<Vec<Value>> = a.snapshot().into_iter().map(|x| vec![x]).collect();
            for other in args {
                let other = array_arg(other)?.snapshot();
                interp.ensure_fits(rows.len().saturating_mul(other.len()), SLOT)?;
                rows = rows
                    .into_iter()
                    .flat_map(|row| {
                        other.iter().map(move |item| {
                            let mut row = row.clone();
                            row.push(item.clone());
                            row
                        })
                    })
                    .collect();
            }
            let rows = rows
                .into_iter()
                .map(|row| interp.new_array(row))
                .collect::<EvalResult<Vec<_>>>()?;
            interp.new_array(rows)?
        }
        "combination" | "permutation" => {
            arity(args, 0, 1)?;
            let block = need_block(block)?;
            let items = a.snapshot();
            let size = match opt(args, 0) {
                Some(n) => int(n)?,
                None if name == "permutation" => items.len() as i64,
                None => return Err(EvalError::wrong_arity(0, "1").into()),
            };
            if let Ok(size) = usize::try_from(size) {
                if size <= items.len() {
                    let ordered = name == "permutation";
                    choose(interp, &items, size, ordered, block)?;
                }
            }
            this()
        }
        "transpose" => {
            let rows = a
                .snapshot()
                .iter()
                .map(|row| array_arg(row).map(|r| r.snapshot()))
                .collect::<EvalResult<Vec<_>>>()?;
            let width = rows.first().map_or(0, Vec::len);
            if let Some(bad) = rows.iter().find(|row| row.len() != width) {
                return Err(EvalError::Index(format!(
                    "element size differs ({} should be {width})",
                    bad.len()
                ))
                .into());
            }
            let mut columns = Vec::with_capacity(width);
            for column in 0..width {
                let cells = rows.iter().map(|row| row[column].clone()).collect();
                columns.push(interp.new_array(cells)?);
            }
            interp.new_array(columns)?
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn array_arg(value: &Value) -> EvalResult<ArrayRef> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        other => Err(EvalError::type_error(format!(
            "no implicit conversion of {} into Array",
            other.class_name()
        ))),
    }
}

fn replace(interp: &mut Interpreter, a: &ArrayRef, items: Vec<Value>) -> EvalResult<Value> {
    interp.budget().charge_items(items.len(), SLOT)?;
    *a.borrow_mut() = items;
    Ok(Value::Array(a.clone()))
}

/// `name!` rewrites the receiver, `name` builds a new array.
fn replace_or_new(interp: &mut Interpreter, a: &ArrayRef, name: &str, items: Vec<Value>) -> EvalResult<Value> {
    if name.ends_with('!') {
        replace(interp, a, items)
    } else {
        interp.new_array(items)
    }
}

/// Grow the array with `nil` until it has at least `len` elements.
fn pad_to(interp: &mut Interpreter, a: &ArrayRef, len: usize) -> EvalResult<()> {
    let missing = len.saturating_sub(a.len());
    if missing > 0 {
        interp.ensure_fits(missing, SLOT)?;
        interp.budget().charge_items(missing, SLOT)?;
        a.borrow_mut().resize(len, Value::Nil);
    }
    Ok(())
}

fn assign(interp: &mut Interpreter, a: &ArrayRef, selector: &[Value], value: Value) -> EvalResult<()> {
    let len = a.len();
    if let [index] = selector {
        if !matches!(index, Value::Range(_)) {
            let raw = int(index)?;
            let i = normalize_index(raw, len).ok_or_else(|| {
                EvalError::Index(format!("index {raw} too small for array; minimum: -{len}"))
            })?;
            pad_to(interp, a, i + 1)?;
            a.borrow_mut()[i] = value;
            return Ok(());
        }
    }
    let (start, length) = match selector {
        [start, length] => {
            let raw = int(start)?;
            let start = normalize_index(raw, len)
                .ok_or_else(|| EvalError::Index(format!("index {raw} too small for array; minimum: -{len}")))?;
            let length = usize::try_from(int(length)?)
                .map_err(|_| EvalError::Index(format!("negative length ({})", int(length).unwrap_or(0))))?;
            (start, length)
        }
        _ => match window(selector, len)? {
            Some(found) => found,
            None => return Err(EvalError::Range("index out of range".into())),
        },
    };
    pad_to(interp, a, start)?;
    let replacement = match &value {
        Value::Array(items) => items.snapshot(),
        other => vec![other.clone()],
    };
    interp.budget().charge_items(replacement.len(), SLOT)?;
    let mut items = a.borrow_mut();
    let end = start.saturating_add(length).min(items.len());
    items.splice(start..end, replacement);
    Ok(())
}

fn flatten_into(
    interp: &mut Interpreter,
    items: &[Value],
    depth: i64,
    path: &mut Vec<usize>,
    out: &mut Vec<Value>,
) -> EvalResult<()> {
    if path.len() > MAX_VALUE_DEPTH {
        return Err(EvalError::DepthLimit(MAX_VALUE_DEPTH));
    }
    for item in items {
        interp.budget().tick()?;
        match item {
            Value::Array(inner) if depth != 0 => {
                if path.contains(&inner.addr()) {
                    return Err(EvalError::argument("tried to flatten recursive array"));
                }
                let nested = inner.snapshot();
                interp.budget().charge_items(nested.len(), SLOT)?;
                path.push(inner.addr());
                flatten_into(interp, &nested, depth - 1, path, out)?;
                path.pop();
            }
            other => {
                interp.budget().charge(SLOT)?;
                out.push(other.clone());
            }
        }
    }
    Ok(())
}

fn join_into(
    interp: &mut Interpreter,
    items: &[Value],
    sep: &str,
    path: &mut Vec<usize>,
    out: &mut String,
) -> EvalResult<()> {
    if path.len() > MAX_VALUE_DEPTH {
        return Err(EvalError::DepthLimit(MAX_VALUE_DEPTH));
    }
    for (i, item) in items.iter().enumerate() {
        interp.budget().tick()?;
        if i > 0 {
            interp.budget().charge(sep.len())?;
            out.push_str(sep);
        }
        match item {
            Value::Array(inner) => {
                if path.contains(&inner.addr()) {
                    return Err(EvalError::argument("recursive array join"));
                }
                let nested = inner.snapshot();
                interp.budget().charge_items(nested.len(), SLOT)?;
                path.push(inner.addr());
                join_into(interp, &nested, sep, path, out)?;
                path.pop();
            }
            other => {
                let text = interp.to_s(other)?;
                interp.budget().charge(text.len())?;
                out.push_str(&text);
            }
        }
    }
    Ok(())
}

/// Yield every `size`-element combination (or permutation) of `items`.
fn choose(
    interp: &mut Interpreter,
    items: &[Value],
    size: usize,
    ordered: bool,
    block: &BlockRef,
) -> Exec<()> {
    let n = items.len();
    let mut picked: Vec<usize> = Vec::with_capacity(size);
    let mut next = 0;
    loop {
        if picked.len() == size {
            let chosen: Vec<Value> = picked.iter().map(|&i| items[i].clone()).collect();
            let chosen = interp.new_array(chosen)?;
            interp.call_block1(block, chosen)?;
        } else {
            let candidate = (next..n).find(|i| !ordered || !picked.contains(i));
            if let Some(i) = candidate {
                picked.push(i);
                next = if ordered { 0 } else { i + 1 };
                continue;
            }
        }
        // Backtrack to the next unexplored choice.
        loop {
            let Some(last) = picked.pop() else {
                return Ok(());
            };
            let candidate = (last + 1..n).find(|i| !ordered || !picked.contains(i));
            if let Some(i) = candidate {
                picked.push(i);
                next = if ordered { 0 } else { i + 1 };
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use crate::config::Limits;
    use crate::interpreter::error::EvalError;
    use crate::interpreter::testing::{run, run_with, show};

    /// Run `src` and fail instead of hanging when it never finishes.
    fn finishes(limits: &Limits, src: &str) -> Result<String, EvalError> {
        let (tx, rx) = mpsc::channel();
        let (limits, src) = (limits.clone(), src.to_string());
        std::thread::spawn(move || tx.send(run_with(&limits, &src)));
        rx.recv_timeout(Duration::from_secs(10))
            .unwrap_or_else(|_| panic!("script still running after 10s"))
    }

    const SHARED: &str = "a = ['']\n60.times { a = [a, a] }\n";

    #[test]
    fn walks_over_shared_subarrays_are_metered() {
        let limits = Limits {
            max_steps: 10_000,
            max_memory_bytes: u64::MAX,
            ..Limits::default()
        };
        for walk in ["a.join", "a.join('-')", "a.flatten", "a.flatten(30)"] {
            let result = finishes(&limits, &format!("{SHARED}{walk}"));
            assert_eq!(result, Err(EvalError::StepLimit(10_000)), "{walk}");
        }
    }

    #[test]
    fn walks_over_shared_subarrays_stop_at_the_deadline() {
        let limits = Limits {
            timeout_ms: 100,
            max_steps: u64::MAX,
            ..Limits::default()
        };
        for walk in ["a.join", "a.flatten"] {
            let result = finishes(&limits, &format!("{SHARED}{walk}"));
            assert!(
                matches!(result, Err(EvalError::Cancelled | EvalError::MemoryLimit(_))),
                "{walk}: {result:?}"
            );
        }
    }

    #[test]
    fn stack_and_queue_operations() {
        assert_eq!(show("a = [1, 2]; a << 3; a.push(4, 5); a"), "[1, 2, 3, 4, 5]");
        assert_eq!(show("a = [1, 2, 3]; [a.pop, a.shift, a]"), "[3, 1, [2]]");
        assert_eq!(show("a = [3]; a.unshift(1, 2); a"), "[1, 2, 3]");
        assert_eq!(show("a = [1, 2, 3, 4]; [a.pop(2), a]"), "[[3, 4], [1, 2]]");
        assert_eq!(show("a = [1, 4]; a.insert(1, 2, 3); a"), "[1, 2, 3, 4]");
        assert_eq!(show("a = [1, 2]; a.insert(-2, :x); a"), "[1, :x, 2]");
    }

    #[test]
    fn indexing() {
        assert_eq!(show("a = [1, 2, 3, 4]; [a[0], a[-1], a[9], a[1, 2], a[1..-1], a[1...-1]]"),
            "[1, 4, nil, [2, 3], [2, 3, 4], [2, 3]]");
        assert_eq!(show("a = [1]; a[3] = 4; a"), "[1, nil, nil, 4]");
        assert_eq!(show("a = [1, 2, 3]; a[0, 2] = [9]; a"), "[9, 3]");
        assert_eq!(show("a = [1, 2, 3]; a[1..2] = 0; a"), "[1, 0]");
        assert_eq!(show("[[1, [2, 3]]].dig(0, 1, 0)"), "2");
        assert_eq!(show("[1, 2].fetch(5, :none)"), ":none");
        assert!(run("[1, 2].fetch(5)").is_err());
        assert!(run("a = [1]; a[-3] = 0").is_err());
    }

    #[test]
    fn set_operations() {
        assert_eq!(show("[1, 2, 2, 3] - [2]"), "[1, 3]");
        assert_eq!(show("[1, 1, 2, 3] & [3, 1]"), "[1, 3]");
        assert_eq!(show("[1, 2] | [2, 3]"), "[1, 2, 3]");
        assert_eq!(show("[1, 2] + [3]"), "[1, 2, 3]");
        assert_eq!(show("[0] * 3"), "[0, 0, 0]");
        assert_eq!(show("[1, 2] * ', '"), "\"1, 2\"");
        assert_eq!(show("[1.0, 1].uniq"), "[1.0, 1]");
    }

    #[test]
    fn in_place_mutation() {
        assert_eq!(show("a = [3, 1, 2]; a.sort!; a"), "[1, 2, 3]");
        assert_eq!(show("a = [1, 2, 3]; a.map! { |x| x * x }; a"), "[1, 4, 9]");
        assert_eq!(show("a = [1, 2, 3]; a.select!(&:odd?); a"), "[1, 3]");
        assert_eq!(show("[1, 3].select!(&:odd?)"), "nil");
        assert_eq!(show("a = [1, 2, 3]; a.delete_if(&:even?); a"), "[1, 3]");
        assert_eq!(show("a = [1, nil, 1]; a.compact!; a.uniq!; a"), "[1]");
        assert_eq!(show("a = [1, 2, 1]; [a.delete(1), a]"), "[1, [2]]");
        assert_eq!(show("a = [1, 2, 3]; [a.delete_at(-1), a]"), "[3, [1, 2]]");
        assert_eq!(show("Array.new(3).fill(7)"), "[7, 7, 7]");
    }

    #[test]
    fn reshaping() {
        assert_eq!(show("[1, [2, [3, [4]]]].flatten"), "[1, 2, 3, 4]");
        assert_eq!(show("[1, [2, [3, [4]]]].flatten(1)"), "[1, 2, [3, [4]]]");
        assert_eq!(show("[[1, 2], [3, 4]].transpose"), "[[1, 3], [2, 4]]");
        assert_eq!(show("[1, 2, 3].rotate"), "[2, 3, 1]");
        assert_eq!(show("[1, 2, 3].rotate(-1)"), "[3, 1, 2]");
        assert_eq!(show("[1, 2].product([3, 4])"), "[[1, 3], [1, 4], [2, 3], [2, 4]]");
        assert_eq!(show("[1, 2, 3].combination(2).to_a"), "[[1, 2], [1, 3], [2, 3]]");
        assert_eq!(show("[1, 2, 3].permutation(2).to_a.length"), "6");
        assert_eq!(show("[1, [2, [3]]].join('-')"), "\"1-2-3\"");
        assert!(run("a = [1]; a << a; a.flatten").is_err());
    }

    #[test]
    fn iteration_sees_appended_elements() {
        assert_eq!(show("a = [1, 2]; n = 0; a.each { |x| n += 1; a << 3 if x == 1 }; n"), "3");
        assert_eq!(show("[5, 6].each_index.to_a"), "[0, 1]");
        assert_eq!(show("[1, 2, 3].index { |x| x > 1 }"), "1");
        assert_eq!(show("[1, 2, 1].rindex(1)"), "2");
    }

    #[test]
    fn sampling_stays_within_the_array() {
        assert_eq!(show("a = (1..10).to_a; a.shuffle.sort == a"), "true");
        assert_eq!(show("[7, 8, 9].include?([7, 8, 9].sample)"), "true");
        assert_eq!(show("[1, 2, 3].sample(2).length"), "2");
        assert_eq!(show("[].sample"), "nil");
    }

    #[test]
    fn repeating_past_the_memory_ceiling_fails() {
        assert!(run("[0] * 1_000_000_000_000").is_err());
    }
}

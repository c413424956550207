//! Range methods.
//!
//! Integer ranges iterate lazily, so `each`, `step`, `first(n)` and `find`
//! work on endless ranges. Everything that needs the whole sequence goes
//! through [`to_vec`], which refuses ranges it cannot enumerate.

use std::cmp::Ordering;
use std::rc::Rc;

use super::numeric::float_steps;
use super::string::succ;
use super::{arity, count, float, make_enumerator};
use crate::interpreter::error::{EvalError, EvalResult};
use crate::interpreter::eval::{BlockRef, Exec, Interpreter, SLOT};
use crate::interpreter::value::{RangeValue, Value};

pub(super) const METHODS: &[&str] = &[
    "begin", "end", "first", "last", "min", "max", "size", "count", "sum", "each", "step", "%",
    "reverse_each", "find", "detect", "include?", "member?", "cover?", "===", "exclude_end?",
    "to_a", "to_ary", "entries",
];

#[allow(clippy::too_many_lines)]
pub(super) fn call(
    interp: &mut Interpreter,
    r: &Rc<RangeValue>,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    let this = || Value::Range(Rc::clone(r));
    let ints = int_bounds(r);
    let value = match name {
        "begin" => r.start.clone(),
        "end" => r.end.clone(),
        "exclude_end?" => Value::Bool(r.exclusive),
        "first" => {
            arity(args, 0, 1)?;
            match (args.first(), ints) {
                (None, _) => r.start.clone(),
                (Some(n), Some((start, last))) => {
                    let n = count(n)?;
                    let len = span(start, last).min(n);
                    interp.ensure_fits(len, SLOT)?;
                    let items = (0..len).map(|i| Value::Int(start + i as i64)).collect();
                    interp.new_array(items)?
                }
                (Some(n), None) => {
                    let n = count(n)?;
                    let items: Vec<Value> = to_vec(interp, r)?.into_iter().take(n).collect();
                    interp.new_array(items)?
                }
            }
        }
        "last" => {
            arity(args, 0, 1)?;
            match args.first() {
                None => r.end.clone(),
                Some(n) => {
                    let n = count(n)?;
                    let mut items = to_vec(interp, r)?;
                    let tail = items.split_off(items.len().saturating_sub(n));
                    interp.new_array(tail)?
                }
            }
        }
        "min" | "max" if args.is_empty() && block.is_none() => extreme(interp, r, name == "min")?,
        "size" | "count" if args.is_empty() && block.is_none() => match ints {
            Some((_, None)) => Value::Float(f64::INFINITY),
            Some((start, last)) => {
                if matches!(r.end, Value::Float(f) if f >= i64::MAX as f64) {
                    return Err(EvalError::overflow().into());
                }
                Value::Int(i64::try_from(span(start, last)).map_err(|_| EvalError::overflow())?)
            }
            None if name == "size" => match &r.start {
                Value::Float(_) | Value::Nil => {
                    return Err(EvalError::type_error(format!("can't iterate from {}", r.start.class_name())).into())
                }
                _ => Value::Nil,
            },
            None => Value::Int(to_vec(interp, r)?.len() as i64),
        },
        "sum" if block.is_none() => match ints {
            Some((start, Some(last))) => {
                arity(args, 0, 1)?;
                let total = arithmetic_sum(start, last)?;
                match args.first() {
                    None => Value::Int(total),
                    Some(init) => interp.call_method(init.clone(), "+", vec![Value::Int(total)], None)?,
                }
            }
            _ => return Ok(None),
        },
        "each" => {
            let Some(block) = block else {
                return Ok(Some(make_enumerator(interp, &this(), name, args)?));
            };
            match ints {
                Some((start, last)) => {
                    for i in IntSteps::new(start, last, 1) {
                        interp.call_block1(block, Value::Int(i))?;
                    }
                }
                None => {
                    for item in to_vec(interp, r)? {
                        interp.call_block1(block, item)?;
                    }
                }
            }
            this()
        }
        "reverse_each" => {
            let Some(block) = block else {
                return Ok(Some(make_enumerator(interp, &this(), name, args)?));
            };
            for item in to_vec(interp, r)?.into_iter().rev() {
                interp.call_block1(block, item)?;
            }
            this()
        }
        "step" | "%" => {
            arity(args, 1, 1)?;
            let Some(block) = block else {
                return Ok(Some(make_enumerator(interp, &this(), "step", args)?));
            };
            match (ints, &args[0]) {
                (Some((start, last)), Value::Int(by)) => {
                    if *by <= 0 {
                        let message = if *by == 0 { "step can't be 0" } else { "step can't be negative" };
                        return Err(EvalError::argument(message).into());
                    }
                    for i in IntSteps::new(start, last, *by) {
                        interp.call_block1(block, Value::Int(i))?;
                    }
                }
                (_, by) => {
                    let (from, by) = (float(&r.start)?, float(by)?);
                    if by <= 0.0 {
                        return Err(EvalError::argument("step can't be 0 or negative").into());
                    }
                    let to = if r.end.is_nil() { f64::INFINITY } else { float(&r.end)? };
                    if to.is_infinite() {
                        return Err(EvalError::argument("cannot step over an endless float range").into());
                    }
                    for x in float_steps(from, to, by) {
                        if r.exclusive && x >= to {
                            break;
                        }
                        interp.call_block1(block, Value::Float(x))?;
                    }
                }
            }
            this()
        }
        "find" | "detect" => {
            let (Some(block), Some((start, last))) = (block, ints) else {
                return Ok(None);
            };
            let mut found = Value::Nil;
            for i in IntSteps::new(start, last, 1) {
                if interp.call_block1(block, Value::Int(i))?.truthy() {
                    found = Value::Int(i);
                    break;
                }
            }
            found
        }
        "include?" | "member?" | "cover?" | "===" => {
            arity(args, 1, 1)?;
            Value::Bool(covers(interp, r, &args[0])?)
        }
        "to_a" | "to_ary" | "entries" => {
            let items = to_vec(interp, r)?;
            interp.new_array(items)?
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Every element of the range, in order.
pub(super) fn to_vec(interp: &mut Interpreter, r: &Rc<RangeValue>) -> Exec<Vec<Value>> {
    if let Some((start, last)) = int_bounds(r) {
        if last.is_none() {
            return Err(EvalError::Range("cannot convert endless range to an array".into()).into());
        }
        let len = span(start, last);
        interp.ensure_fits(len, SLOT)?;
        interp.budget().charge_items(len, SLOT)?;
        return Ok(IntSteps::new(start, last, 1).map(Value::Int).collect());
    }
    match (&r.start, &r.end) {
        (Value::Str(from), Value::Str(to)) => {
            let (from, to) = (from.borrow().clone(), to.borrow().clone());
            string_sequence(interp, from, &to, r.exclusive)
        }
        (Value::Str(_), Value::Nil) => {
            Err(EvalError::Range("cannot convert endless range to an array".into()).into())
        }
        (start, _) => Err(EvalError::type_error(format!("can't iterate from {}", start.class_name())).into()),
    }
}

/// First and last integer of an integer range. A `None` last means the
/// range never ends.
fn int_bounds(r: &RangeValue) -> Option<(i64, Option<i64>)> {
    let Value::Int(start) = r.start else {
        return None;
    };
    let last = match r.end {
        Value::Nil => None,
        Value::Int(end) if r.exclusive => match end.checked_sub(1) {
            Some(last) => Some(last),
            // `x...i64::MIN` is empty whatever `x` is.
            None => return Some((0, Some(-1))),
        },
        Value::Int(end) => Some(end),
        Value::Float(f) if f == f64::INFINITY => None,
        Value::Float(f) => {
            let floor = f.floor();
            let floor = if r.exclusive && floor == f { floor - 1.0 } else { floor };
            #[allow(clippy::cast_possible_truncation)]
            Some(floor as i64)
        }
        _ => return None,
    };
    Some((start, last))
}

/// Number of integers in `start..=last`.
fn span(start: i64, last: Option<i64>) -> usize {
    match last {
        None => usize::MAX,
        Some(last) if last < start => 0,
        Some(last) => usize::try_from(i128::from(last) - i128::from(start) + 1).unwrap_or(usize::MAX),
    }
}

/// `start, start + by, ...` up to `last`, without overflowing.
struct IntSteps {
    next: Option<i64>,
    last: Option<i64>,
    by: i64,
}

impl IntSteps {
    fn new(start: i64, last: Option<i64>, by: i64) -> Self {
        Self {
            next: Some(start),
            last,
            by,
        }
    }
}

impl Iterator for IntSteps {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let current = self.next?;
        if self.last.is_some_and(|last| current > last) {
            self.next = None;
            return None;
        }
        self.next = current.checked_add(self.by);
        Some(current)
    }
}

fn arithmetic_sum(start: i64, last: i64) -> EvalResult<i64> {
    if last < start {
        return Ok(0);
    }
    let n = i128::from(last) - i128::from(start) + 1;
    let total = (i128::from(start) + i128::from(last)) * n / 2;
    i64::try_from(total).map_err(|_| EvalError::overflow())
}

fn extreme(interp: &mut Interpreter, r: &RangeValue, min: bool) -> Exec<Value> {
    if let Some((start, last)) = int_bounds(r) {
        return Ok(match (min, last) {
            (_, Some(last)) if last < start => Value::Nil,
            (true, _) => Value::Int(start),
            (false, Some(last)) => Value::Int(last),
            (false, None) => return Err(EvalError::Range("cannot get the maximum of endless range".into()).into()),
        });
    }
    if r.start.is_nil() || r.end.is_nil() {
        let which = if min { "minimum" } else { "maximum" };
        let kind = if r.start.is_nil() { "beginless" } else { "endless" };
        return Err(EvalError::Range(format!("cannot get the {which} of {kind} range")).into());
    }
    let ordering = interp.compare(&r.start, &r.end)?;
    if ordering == Ordering::Greater || (ordering == Ordering::Equal && r.exclusive) {
        return Ok(Value::Nil);
    }
    if min {
        return Ok(r.start.clone());
    }
    if r.exclusive {
        return Err(EvalError::type_error("cannot exclude non Integer end value").into());
    }
    Ok(r.end.clone())
}

/// Whether `value` lies between the endpoints.
fn covers(interp: &mut Interpreter, r: &RangeValue, value: &Value) -> EvalResult<bool> {
    if !r.start.is_nil() && interp.try_compare(&r.start, value)?.map_or(true, |o| o == Ordering::Greater) {
        return Ok(false);
    }
    if r.end.is_nil() {
        return Ok(true);
    }
    Ok(match interp.try_compare(value, &r.end)? {
        Some(Ordering::Less) => true,
        Some(Ordering::Equal) => !r.exclusive,
        _ => false,
    })
}

/// `"a".."e"`: successive strings until the end is reached or passed in
/// length.
fn string_sequence(interp: &mut Interpreter, from: String, to: &str, exclusive: bool) -> Exec<Vec<Value>> {
    let max_len = to.chars().count();
    let mut current = from;
    let mut out = Vec::new();
    let len = current.chars().count();
    if len > max_len || (len == max_len && current.as_str() > to) {
        return Ok(out);
    }
    loop {
        if current == to {
            if !exclusive {
                out.push(interp.new_str(current)?);
            }
            break;
        }
        if current.chars().count() > max_len || current.is_empty() {
            break;
        }
        interp.budget().tick()?;
        let next = succ(&current);
        out.push(interp.new_str(current)?);
        current = next;
    }
    interp.budget().charge_items(out.len(), SLOT)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::testing::{run, show};

    #[test]
    fn bounds_of_integer_ranges() {
        let range = |start, end, exclusive| RangeValue { start, end, exclusive };
        assert_eq!(int_bounds(&range(Value::Int(1), Value::Int(5), true)), Some((1, Some(4))));
        assert_eq!(int_bounds(&range(Value::Int(1), Value::Float(3.5), false)), Some((1, Some(3))));
        assert_eq!(int_bounds(&range(Value::Int(1), Value::Float(3.0), true)), Some((1, Some(2))));
        assert_eq!(int_bounds(&range(Value::Int(1), Value::Nil, false)), Some((1, None)));
        assert_eq!(int_bounds(&range(Value::Float(1.0), Value::Int(3), false)), None);
        assert_eq!(span(5, Some(4)), 0);
    }

    #[test]
    fn overflow_safe_stepping() {
        let steps: Vec<i64> = IntSteps::new(i64::MAX - 1, Some(i64::MAX), 1).collect();
        assert_eq!(steps, vec![i64::MAX - 1, i64::MAX]);
        assert_eq!(arithmetic_sum(1, 100), Ok(5050));
        assert!(arithmetic_sum(0, i64::MAX).is_err());
    }

    #[test]
    fn iteration() {
        assert_eq!(show("(1..4).to_a"), "[1, 2, 3, 4]");
        assert_eq!(show("(1...4).map { |x| x * x }"), "[1, 4, 9]");
        assert_eq!(show("('a'..'e').to_a.join"), "\"abcde\"");
        assert_eq!(show("('y'..'ab').to_a"), "[\"y\", \"z\", \"aa\", \"ab\"]");
        assert_eq!(show("(1..10).step(3).to_a"), "[1, 4, 7, 10]");
        assert_eq!(show("(0.0..1.0).step(0.5).to_a"), "[0.0, 0.5, 1.0]");
        assert_eq!(show("(1..Float::INFINITY).first(3)"), "[1, 2, 3]");
        assert_eq!(show("(1..Float::INFINITY).find { |x| x * x > 50 }"), "8");
        assert_eq!(show("(1..3).reverse_each.to_a"), "[3, 2, 1]");
        assert!(run("(1.0..2.0).to_a").is_err());
        assert!(run("Range.new(1, nil).to_a").is_err());
    }

    #[test]
    fn aggregates_use_closed_forms() {
        assert_eq!(show("(1..1_000_000_000).sum"), "500000000500000000");
        assert_eq!(show("(1..10).sum(5)"), "60");
        assert_eq!(show("(1..1_000_000_000).size"), "1000000000");
        assert_eq!(show("[(1...10).max, (3..1).min, (1.5..2.5).max]"), "[9, nil, 2.5]");
        assert_eq!(show("(1..4).sum { |x| x * 2 }"), "20");
    }

    #[test]
    fn sizes_past_the_integer_range_overflow() {
        assert_eq!(show("(1..9223372036854775807).size"), "9223372036854775807");
        assert_eq!(show("(-9223372036854775807..-1).count"), "9223372036854775807");
        for src in [
            "(-9223372036854775808..9223372036854775807).size",
            "(0..9223372036854775807).size",
            "(-1..9223372036854775807).count",
            "(1..1e30).size",
        ] {
            assert!(matches!(run(src), Err(EvalError::Range(_))), "{src}");
        }
    }

    #[test]
    fn membership() {
        assert_eq!(show("[(1..5).include?(5), (1...5).include?(5), (1..5) === 2.5]"), "[true, false, true]");
        assert_eq!(show("('a'..'z').cover?('m')"), "true");
        assert_eq!(show("(1..5).include?('a')"), "false");
        assert_eq!(show("case 7 when 1..5 then :low when 6..10 then :high end"), ":high");
    }
}

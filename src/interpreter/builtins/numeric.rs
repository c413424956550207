//! Integer and Float methods.
//!
//! Integers are 64-bit; any result that does not fit raises a `RangeError`
//! instead of wrapping.

use std::cmp::Ordering;

use super::{arity, float, int, make_enumerator, opt};
use crate::interpreter::error::{EvalError, EvalResult};
use crate::interpreter::eval::{BlockRef, Exec, Interpreter};
use crate::interpreter::value::{format_float, Value};

pub(super) const INT_METHODS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "-@", "+@", "~", "&", "|", "^", "<<", ">>", "<", "<=", ">",
    ">=", "<=>", "==", "div", "modulo", "remainder", "fdiv", "divmod", "pow", "times", "upto",
    "downto", "step", "even?", "odd?", "zero?", "positive?", "negative?", "nonzero?", "abs",
    "magnitude", "succ", "next", "pred", "to_i", "to_int", "to_f", "to_s", "chr", "ord", "gcd",
    "lcm", "digits", "bit_length", "integer?", "finite?", "infinite?", "nan?", "floor", "ceil",
    "round", "truncate", "size",
];

pub(super) const FLOAT_METHODS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "-@", "+@", "<", "<=", ">", ">=", "<=>", "==", "div",
    "modulo", "fdiv", "divmod", "step", "zero?", "positive?", "negative?", "nonzero?", "abs",
    "magnitude", "to_i", "to_int", "to_f", "to_s", "floor", "ceil", "round", "truncate", "nan?",
    "infinite?", "finite?", "integer?",
];

pub(super) fn call(
    interp: &mut Interpreter,
    recv: &Value,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    if let Some(value) = operator(recv, name, args)? {
        return Ok(Some(value));
    }
    match recv {
        Value::Int(n) => int_method(interp, *n, name, args, block),
        Value::Float(f) => float_method(interp, *f, name, args, block),
        _ => Ok(None),
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(Self::Int(*n)),
            Value::Float(f) => Some(Self::Float(*f)),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn to_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(f) => f,
        }
    }
}

fn coerce_error(recv: &Value, other: &Value) -> EvalError {
    let what = match other {
        Value::Nil => "nil".to_string(),
        other => other.class_name().to_string(),
    };
    EvalError::type_error(format!("{what} can't be coerced into {}", recv.class_name()))
}

/// Binary and unary operators shared by Integer and Float.
fn operator(recv: &Value, name: &str, args: &[Value]) -> EvalResult<Option<Value>> {
    let Some(a) = Num::of(recv) else {
        return Ok(None);
    };
    match name {
        "-@" => {
            return Ok(Some(match a {
                Num::Int(n) => Value::Int(n.checked_neg().ok_or_else(EvalError::overflow)?),
                Num::Float(f) => Value::Float(-f),
            }))
        }
        "+@" => return Ok(Some(recv.clone())),
        "+" | "-" | "*" | "/" | "%" | "modulo" | "**" | "div" | "fdiv" | "divmod" | "<" | "<="
        | ">" | ">=" | "<=>" | "==" => {}
        _ => return Ok(None),
    }
    arity(args, 1, 1)?;
    let Some(b) = Num::of(&args[0]) else {
        return Ok(Some(match name {
            "==" => Value::Bool(false),
            "<=>" => Value::Nil,
            "<" | "<=" | ">" | ">=" => {
                return Err(EvalError::argument(format!(
                    "comparison of {} with {} failed",
                    recv.class_name(),
                    describe_operand(&args[0])
                )))
            }
            _ => return Err(coerce_error(recv, &args[0])),
        }));
    };
    let value = match name {
        "<" | "<=" | ">" | ">=" | "<=>" | "==" => compare_op(a, b, name),
        "fdiv" => Value::Float(a.to_f64() / b.to_f64()),
        "divmod" => {
            let (q, r) = divmod(a, b)?;
            Value::array(vec![q, r])
        }
        "div" => match divmod(a, b)? {
            (Value::Float(q), _) => Value::Int(float_to_int(q)?),
            (q, _) => q,
        },
        _ => match (a, b) {
            (Num::Int(x), Num::Int(y)) => int_arith(x, y, name)?,
            _ => float_arith(a.to_f64(), b.to_f64(), name),
        },
    };
    Ok(Some(value))
}

fn describe_operand(value: &Value) -> String {
    match value {
        Value::Nil => "nil".into(),
        Value::Bool(b) => b.to_string(),
        other => other.class_name().into(),
    }
}

fn compare_op(a: Num, b: Num, name: &str) -> Value {
    let ordering = match (a, b) {
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
        _ => a.to_f64().partial_cmp(&b.to_f64()),
    };
    match (name, ordering) {
        ("<=>", Some(o)) => Value::Int(o as i64),
        ("<=>", None) => Value::Nil,
        ("==", o) => Value::Bool(o == Some(Ordering::Equal)),
        ("<", o) => Value::Bool(o == Some(Ordering::Less)),
        ("<=", o) => Value::Bool(matches!(o, Some(Ordering::Less | Ordering::Equal))),
        (">", o) => Value::Bool(o == Some(Ordering::Greater)),
        (_, o) => Value::Bool(matches!(o, Some(Ordering::Greater | Ordering::Equal))),
    }
}

pub(super) fn floor_div(x: i64, y: i64) -> EvalResult<i64> {
    if y == 0 {
        return Err(EvalError::ZeroDivision);
    }
    let q = x.checked_div(y).ok_or_else(EvalError::overflow)?;
    Ok(if x % y != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q })
}

pub(super) fn floor_mod(x: i64, y: i64) -> EvalResult<i64> {
    if y == 0 {
        return Err(EvalError::ZeroDivision);
    }
    let r = x.checked_rem(y).unwrap_or(0);
    Ok(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r })
}

fn float_mod(x: f64, y: f64) -> f64 {
    let r = x % y;
    if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
        r + y
    } else {
        r
    }
}

fn divmod(a: Num, b: Num) -> EvalResult<(Value, Value)> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Ok((Value::Int(floor_div(x, y)?), Value::Int(floor_mod(x, y)?))),
        _ => {
            let (x, y) = (a.to_f64(), b.to_f64());
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            Ok((Value::Float((x / y).floor()), Value::Float(float_mod(x, y))))
        }
    }
}

fn int_arith(x: i64, y: i64, name: &str) -> EvalResult<Value> {
    let result = match name {
        "+" => x.checked_add(y),
        "-" => x.checked_sub(y),
        "*" => x.checked_mul(y),
        "/" => Some(floor_div(x, y)?),
        "%" | "modulo" => Some(floor_mod(x, y)?),
        _ => return int_pow(x, y),
    };
    result.map(Value::Int).ok_or_else(EvalError::overflow)
}

fn int_pow(base: i64, exp: i64) -> EvalResult<Value> {
    if exp < 0 {
        #[allow(clippy::cast_precision_loss)]
        return Ok(Value::Float((base as f64).powf(exp as f64)));
    }
    let result = match base {
        0 | 1 => Some(if exp == 0 { 1 } else { base }),
        -1 => Some(if exp % 2 == 0 { 1 } else { -1 }),
        _ => u32::try_from(exp).ok().and_then(|e| base.checked_pow(e)),
    };
    result.map(Value::Int).ok_or_else(EvalError::overflow)
}

fn float_arith(x: f64, y: f64, name: &str) -> Value {
    Value::Float(match name {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => x / y,
        "%" | "modulo" => float_mod(x, y),
        _ => x.powf(y),
    })
}

/// Convert a float to an integer, rejecting NaN, infinities and values
/// outside the 64-bit range.
pub(super) fn float_to_int(f: f64) -> EvalResult<i64> {
    if f.is_nan() || f.is_infinite() {
        return Err(EvalError::Raised {
            class: "FloatDomainError".into(),
            message: format_float(f),
        });
    }
    #[allow(clippy::cast_precision_loss)]
    let limit = i64::MAX as f64;
    if f.trunc() >= limit || f.trunc() < -limit {
        return Err(EvalError::overflow());
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(f.trunc() as i64)
}

fn pow10(digits: i64) -> Option<i64> {
    u32::try_from(digits).ok().and_then(|d| 10_i64.checked_pow(d))
}

/// `Integer#round/floor/ceil` with a negative digit count.
fn int_round(n: i64, digits: i64, mode: &str) -> EvalResult<i64> {
    if digits >= 0 {
        return Ok(n);
    }
    let Some(factor) = pow10(-digits) else {
        return Ok(0);
    };
    let rounded = match mode {
        "floor" => floor_div(n, factor)?.checked_mul(factor),
        "ceil" => floor_div(n, factor)?
            .checked_add(i64::from(floor_mod(n, factor)? != 0))
            .and_then(|q| q.checked_mul(factor)),
        "truncate" => Some(n / factor * factor),
        _ => {
            let rem = n % factor;
            let base = n - rem;
            if rem.unsigned_abs() * 2 >= factor.unsigned_abs() {
                base.checked_add(if n < 0 { -factor } else { factor })
            } else {
                Some(base)
            }
        }
    };
    rounded.ok_or_else(EvalError::overflow)
}

fn float_round(f: f64, digits: i64, mode: &str) -> EvalResult<Value> {
    let apply = |x: f64| match mode {
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "truncate" => x.trunc(),
        _ => x.round(),
    };
    if digits > 0 {
        if digits >= 16 || !f.is_finite() {
            return Ok(Value::Float(f));
        }
        #[allow(clippy::cast_possible_truncation)]
        let factor = 10_f64.powi(digits as i32);
        return Ok(Value::Float(apply(f * factor) / factor));
    }
    let whole = float_to_int(apply(f))?;
    if digits == 0 {
        return Ok(Value::Int(whole));
    }
    #[allow(clippy::cast_possible_truncation)]
    let factor = 10_f64.powi((-digits).min(300) as i32);
    Ok(Value::Int(float_to_int(apply(f / factor) * factor)?))
}

fn gcd(a: i64, b: i64) -> EvalResult<i64> {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    i64::try_from(a).map_err(|_| EvalError::overflow())
}

fn int_method(
    interp: &mut Interpreter,
    n: i64,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    let recv = Value::Int(n);
    let value = match name {
        "times" => {
            let Some(block) = block else {
                return make_enumerator(interp, &recv, name, args).map(Some);
            };
            for i in 0..n {
                interp.call_block1(block, Value::Int(i))?;
            }
            recv
        }
        "upto" | "downto" => {
            arity(args, 1, 1)?;
            let Some(block) = block else {
                return make_enumerator(interp, &recv, name, args).map(Some);
            };
            let limit = int(&args[0])?;
            if name == "upto" {
                for i in n..=limit {
                    interp.call_block1(block, Value::Int(i))?;
                }
            } else {
                for i in (limit..=n).rev() {
                    interp.call_block1(block, Value::Int(i))?;
                }
            }
            recv
        }
        "step" => return step(interp, &recv, args, block).map(Some),
        "&" | "|" | "^" | "<<" | ">>" => {
            arity(args, 1, 1)?;
            let Value::Int(m) = args[0] else {
                return Err(coerce_error(&recv, &args[0]).into());
            };
            Value::Int(match name {
                "&" => n & m,
                "|" => n | m,
                "^" => n ^ m,
                "<<" => shift_left(n, m)?,
                _ => shift_left(n, m.checked_neg().unwrap_or(i64::MAX))?,
            })
        }
        "~" => Value::Int(!n),
        "remainder" => {
            arity(args, 1, 1)?;
            match &args[0] {
                Value::Int(0) => return Err(EvalError::ZeroDivision.into()),
                Value::Int(m) => Value::Int(n.checked_rem(*m).unwrap_or(0)),
                other => Value::Float(Num::Int(n).to_f64() % float(other)?),
            }
        }
        "pow" => {
            arity(args, 1, 2)?;
            match opt(args, 1) {
                None => return operator(&recv, "**", args).map_err(Into::into),
                Some(modulus) => {
                    let (exp, modulus) = (int(&args[0])?, int(modulus)?);
                    if exp < 0 {
                        return Err(EvalError::Range("exponent must be non-negative".into()).into());
                    }
                    Value::Int(mod_pow(n, exp, modulus)?)
                }
            }
        }
        "even?" => Value::Bool(n % 2 == 0),
        "odd?" => Value::Bool(n % 2 != 0),
        "zero?" => Value::Bool(n == 0),
        "positive?" => Value::Bool(n > 0),
        "negative?" => Value::Bool(n < 0),
        "nonzero?" => {
            if n == 0 {
                Value::Nil
            } else {
                recv
            }
        }
        "abs" | "magnitude" => Value::Int(n.checked_abs().ok_or_else(EvalError::overflow)?),
        "succ" | "next" => Value::Int(n.checked_add(1).ok_or_else(EvalError::overflow)?),
        "pred" => Value::Int(n.checked_sub(1).ok_or_else(EvalError::overflow)?),
        "to_i" | "to_int" | "ord" => recv,
        #[allow(clippy::cast_precision_loss)]
        "to_f" => Value::Float(n as f64),
        "to_s" | "inspect" => {
            arity(args, 0, 1)?;
            let base = opt(args, 0).map(int).transpose()?.unwrap_or(10);
            let digits = to_radix(n, base)?;
            interp.new_str(digits)?
        }
        "chr" => {
            let byte = u8::try_from(n).map_err(|_| EvalError::Range(format!("{n} out of char range")))?;
            interp.new_str(char::from(byte).to_string())?
        }
        "gcd" | "lcm" => {
            arity(args, 1, 1)?;
            let m = int(&args[0])?;
            let g = gcd(n, m)?;
            if name == "gcd" {
                Value::Int(g)
            } else if g == 0 {
                Value::Int(0)
            } else {
                Value::Int((n / g).checked_mul(m).ok_or_else(EvalError::overflow)?.abs())
            }
        }
        "digits" => {
            arity(args, 0, 1)?;
            let base = opt(args, 0).map(int).transpose()?.unwrap_or(10);
            if n < 0 {
                return Err(EvalError::argument("out of domain").into());
            }
            if base < 2 {
                return Err(EvalError::argument(format!("invalid radix {base}")).into());
            }
            let mut digits = Vec::new();
            let mut rest = n;
            loop {
                digits.push(Value::Int(rest % base));
                rest /= base;
                if rest == 0 {
                    break;
                }
            }
            interp.new_array(digits)?
        }
        "bit_length" => Value::Int(i64::from(64 - if n < 0 { (!n).leading_zeros() } else { n.leading_zeros() })),
        "integer?" | "finite?" => Value::Bool(true),
        "nan?" => Value::Bool(false),
        "infinite?" => Value::Nil,
        "floor" | "ceil" | "round" | "truncate" => {
            arity(args, 0, 1)?;
            let digits = opt(args, 0).map(int).transpose()?.unwrap_or(0);
            Value::Int(int_round(n, digits, name)?)
        }
        "size" => Value::Int(8),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn shift_left(n: i64, by: i64) -> EvalResult<i64> {
    if by < 0 {
        let by = by.unsigned_abs();
        return Ok(if by >= 64 {
            if n < 0 {
                -1
            } else {
                0
            }
        } else {
            n >> by
        });
    }
    if n == 0 {
        return Ok(0);
    }
    let shifted = u32::try_from(by)
        .ok()
        .filter(|b| *b < 63)
        .map(|b| n << b)
        .filter(|r| r >> by == n);
    shifted.ok_or_else(EvalError::overflow)
}

fn mod_pow(base: i64, exp: i64, modulus: i64) -> EvalResult<i64> {
    if modulus == 0 {
        return Err(EvalError::ZeroDivision);
    }
    let m = i128::from(modulus);
    let mut result: i128 = 1;
    let mut b = i128::from(base).rem_euclid(m);
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result = (result * b).rem_euclid(m);
        }
        b = (b * b).rem_euclid(m);
        e >>= 1;
    }
    // Ruby gives the result the sign of the modulus.
    let result = if modulus < 0 && result != 0 { result + m } else { result };
    i64::try_from(result).map_err(|_| EvalError::overflow())
}

fn to_radix(n: i64, base: i64) -> EvalResult<String> {
    if !(2..=36).contains(&base) {
        return Err(EvalError::argument(format!("invalid radix {base}")));
    }
    let mut magnitude = n.unsigned_abs();
    if magnitude == 0 {
        return Ok("0".into());
    }
    let base = base.unsigned_abs();
    let mut digits = Vec::new();
    while magnitude > 0 {
        let d = u32::try_from(magnitude % base).unwrap_or(0);
        digits.push(char::from_digit(d, 36).unwrap_or('?'));
        magnitude /= base;
    }
    if n < 0 {
        digits.push('-');
    }
    Ok(digits.into_iter().rev().collect())
}

fn float_method(
    interp: &mut Interpreter,
    f: f64,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    let value = match name {
        "floor" | "ceil" | "round" | "truncate" => {
            arity(args, 0, 2)?;
            let digits = match opt(args, 0) {
                Some(Value::Hash(_)) | None => 0,
                Some(d) => int(d)?,
            };
            float_round(f, digits, name)?
        }
        "to_i" | "to_int" => Value::Int(float_to_int(f)?),
        "to_f" => Value::Float(f),
        "to_s" | "inspect" => interp.new_str(format_float(f))?,
        "abs" | "magnitude" => Value::Float(f.abs()),
        "nan?" => Value::Bool(f.is_nan()),
        "infinite?" => match f {
            f if f == f64::INFINITY => Value::Int(1),
            f if f == f64::NEG_INFINITY => Value::Int(-1),
            _ => Value::Nil,
        },
        "finite?" => Value::Bool(f.is_finite()),
        "integer?" => Value::Bool(false),
        "zero?" => Value::Bool(f == 0.0),
        "positive?" => Value::Bool(f > 0.0),
        "negative?" => Value::Bool(f < 0.0),
        "nonzero?" => {
            if f == 0.0 {
                Value::Nil
            } else {
                Value::Float(f)
            }
        }
        "step" => return step(interp, &Value::Float(f), args, block).map(Some),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// `start.step(limit, by)`, integer when every operand is an integer.
fn step(interp: &mut Interpreter, start: &Value, args: &[Value], block: Option<&BlockRef>) -> Exec<Value> {
    arity(args, 1, 2)?;
    let Some(block) = block else {
        return make_enumerator(interp, start, "step", args);
    };
    let by = args.get(1).cloned().unwrap_or(Value::Int(1));
    match (start, &args[0], &by) {
        (Value::Int(from), Value::Int(to), Value::Int(by)) => {
            let (from, to, by) = (*from, *to, *by);
            if by == 0 {
                return Err(EvalError::argument("step can't be 0").into());
            }
            let mut i = from;
            while (by > 0 && i <= to) || (by < 0 && i >= to) {
                interp.call_block1(block, Value::Int(i))?;
                match i.checked_add(by) {
                    Some(next) => i = next,
                    None => break,
                }
            }
        }
        (from, to, by) => {
            let (from, to, by) = (float(from)?, float(to)?, float(by)?);
            if by == 0.0 {
                return Err(EvalError::argument("step can't be 0").into());
            }
            for x in float_steps(from, to, by) {
                interp.call_block1(block, Value::Float(x))?;
            }
        }
    }
    Ok(start.clone())
}

/// Points of a float progression, computed by multiplication so error does
/// not accumulate.
pub(super) fn float_steps(from: f64, to: f64, by: f64) -> impl Iterator<Item = f64> {
    let n = ((to - from) / by + 1e-9).floor();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = if n.is_finite() && n >= 0.0 { n as u64 + 1 } else { 0 };
    #[allow(clippy::cast_precision_loss)]
    (0..count).map(move |i| from + i as f64 * by)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::testing::{run, show};

    #[test]
    fn floored_division() {
        assert_eq!(floor_div(7, 2), Ok(3));
        assert_eq!(floor_div(-7, 2), Ok(-4));
        assert_eq!(floor_mod(-7, 3), Ok(2));
        assert_eq!(floor_mod(7, -3), Ok(-2));
        assert_eq!(floor_div(1, 0), Err(EvalError::ZeroDivision));
        assert!(floor_div(i64::MIN, -1).is_err());
    }

    #[test]
    fn rounding_with_digits() {
        assert_eq!(int_round(1250, -2, "round"), Ok(1300));
        assert_eq!(int_round(-1250, -2, "round"), Ok(-1300));
        assert_eq!(int_round(1249, -2, "round"), Ok(1200));
        assert_eq!(int_round(-1201, -2, "floor"), Ok(-1300));
        assert_eq!(int_round(1201, -2, "ceil"), Ok(1300));
        assert!(matches!(float_round(2.5, 0, "round"), Ok(Value::Int(3))));
        assert!(matches!(float_round(-2.5, 0, "round"), Ok(Value::Int(-3))));
        assert!(matches!(float_round(1234.5, -2, "round"), Ok(Value::Int(1200))));
    }

    #[test]
    fn radix_rendering() {
        assert_eq!(to_radix(255, 16).unwrap(), "ff");
        assert_eq!(to_radix(-5, 2).unwrap(), "-101");
        assert!(to_radix(5, 1).is_err());
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(matches!(run("9223372036854775807 + 1"), Err(EvalError::Range(_))));
        assert!(matches!(run("2 ** 64"), Err(EvalError::Range(_))));
        assert!(matches!(run("1 << 63"), Err(EvalError::Range(_))));
    }

    #[test]
    fn mixed_arithmetic() {
        assert_eq!(show("1 + 2.5"), "3.5");
        assert_eq!(show("7.fdiv(2)"), "3.5");
        assert_eq!(show("7.divmod(-2)"), "[-4, -1]");
        assert_eq!(show("2 ** -1"), "0.5");
        assert_eq!(show("10.0 / 0"), "Infinity");
        assert_eq!(show("3.7.round"), "4");
        assert_eq!(show("3.14159.round(2)"), "3.14");
        assert_eq!(show("-3.7.truncate"), "-3");
        assert_eq!(show("1 == 1.0"), "true");
        assert_eq!(show("3.pow(4, 5)"), "1");
    }

    #[test]
    fn wrong_operand_types() {
        assert!(matches!(run("1.5 * 'a'"), Err(EvalError::Type(_))));
        assert!(matches!(run("1 + nil"), Err(EvalError::Type(_))));
        assert!(matches!(run("1 < 'a'"), Err(EvalError::Argument(_))));
        assert_eq!(show("1 == 'a'"), "false");
    }

    #[test]
    fn iteration() {
        assert_eq!(show("a = []\n3.times { |i| a << i }\na"), "[0, 1, 2]");
        assert_eq!(show("a = []\n1.upto(3) { |i| a << i }\n5.downto(4) { |i| a << i }\na"), "[1, 2, 3, 5, 4]");
        assert_eq!(show("a = []\n1.step(10, 4) { |i| a << i }\na"), "[1, 5, 9]");
        assert_eq!(show("a = []\n1.0.step(2.0, 0.5) { |x| a << x }\na"), "[1.0, 1.5, 2.0]");
        assert_eq!(show("4.times.map { |i| i * i }"), "[0, 1, 4, 9]");
    }

    #[test]
    fn integer_helpers() {
        assert_eq!(show("[12.gcd(18), 4.lcm(6), 1234.digits, 65.chr, 255.to_s(2)]"),
            "[6, 12, [4, 3, 2, 1], \"A\", \"11111111\"]");
        assert_eq!(show("[5.between?(1, 10), 15.clamp(1, 10), -1.abs]"), "[true, 10, 1]");
    }

    #[test]
    fn float_domain_errors() {
        let err = run("(0.0 / 0).to_i").unwrap_err();
        assert_eq!(err.class_name(), "FloatDomainError");
    }
}

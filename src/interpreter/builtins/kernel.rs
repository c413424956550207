//! Receiver-less functions and class-level methods (`Math.sqrt`,
//! `Array.new`, `ArgumentError.new`, ...).

use std::fmt::Write as _;

use super::{arity, count, float, int, items, need_block, string};
use crate::interpreter::error::{exception_ancestors, EvalError, EvalResult};
use crate::interpreter::eval::{BlockRef, Exec, Interpreter, SLOT};
use crate::interpreter::value::{self, HashTable, Value};

pub(super) const FUNCTIONS: &[&str] = &[
    "puts",
    "print",
    "p",
    "pp",
    "printf",
    "rand",
    "Integer",
    "Float",
    "String",
    "Array",
    "raise",
    "fail",
    "loop",
    "block_given?",
    "format",
    "sprintf",
];

pub(super) const CLASS_METHODS: &[&str] = &[
    "name",
    "new",
    "exception",
    "sqrt",
    "cbrt",
    "sin",
    "cos",
    "tan",
    "asin",
    "acos",
    "atan",
    "atan2",
    "sinh",
    "cosh",
    "tanh",
    "exp",
    "log",
    "log2",
    "log10",
    "hypot",
];

pub(super) fn call(
    interp: &mut Interpreter,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    let value = match name {
        // Output has nowhere to go; the arguments are still evaluated.
        "puts" | "print" | "printf" => {
            interp.budget().tick_n(args.len() as u64)?;
            Value::Nil
        }
        "p" | "pp" => match args {
            [] => Value::Nil,
            [one] => one.clone(),
            many => interp.new_array(many.to_vec())?,
        },
        "rand" => {
            arity(args, 0, 1)?;
            rand(args.first().unwrap_or(&Value::Nil))?
        }
        "Integer" => {
            arity(args, 1, 3)?;
            let quiet = exception_disabled(args);
            match to_integer(&args[0], args.get(1).filter(|a| !matches!(a, Value::Hash(_)))) {
                Ok(n) => Value::Int(n),
                Err(_) if quiet => Value::Nil,
                Err(err) => return Err(err.into()),
            }
        }
        "Float" => {
            arity(args, 1, 2)?;
            let quiet = exception_disabled(args);
            match to_float(&args[0]) {
                Ok(f) => Value::Float(f),
                Err(_) if quiet => Value::Nil,
                Err(err) => return Err(err.into()),
            }
        }
        "String" => {
            arity(args, 1, 1)?;
            let s = interp.to_s(&args[0])?;
            interp.new_str(s)?
        }
        "Array" => {
            arity(args, 1, 1)?;
            match &args[0] {
                Value::Nil => interp.new_array(Vec::new())?,
                Value::Array(_) => args[0].clone(),
                other @ (Value::Hash(_) | Value::Range(_) | Value::Enumerator(_)) => {
                    let items = items(interp, other)?;
                    interp.new_array(items)?
                }
                other => interp.new_array(vec![other.clone()])?,
            }
        }
        "raise" | "fail" => return Err(raise(interp, args)?.into()),
        "loop" => {
            let block = need_block(block)?;
            loop {
                match interp.call_block(block, Vec::new()) {
                    Ok(_) => {}
                    Err(crate::interpreter::eval::Flow::Error(EvalError::Raised { class, .. }))
                        if class == "StopIteration" =>
                    {
                        break Value::Nil;
                    }
                    Err(flow) => return Err(flow),
                }
            }
        }
        "block_given?" => Value::Bool(interp.block_given()),
        "format" | "sprintf" => {
            arity(args, 1, usize::MAX)?;
            let spec = string(&args[0])?;
            let out = format(interp, &spec, &args[1..])?;
            interp.new_str(out)?
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// `Integer("x", exception: false)` style trailing options.
fn exception_disabled(args: &[Value]) -> bool {
    let Some(Value::Hash(options)) = args.last() else {
        return false;
    };
    matches!(
        options.borrow().get(&Value::sym("exception")),
        Ok(Some(Value::Bool(false)))
    )
}

fn rand(limit: &Value) -> EvalResult<Value> {
    let unit = rand::random::<f64>();
    Ok(match limit {
        Value::Nil | Value::Int(0) => Value::Float(unit),
        Value::Int(n) if *n < 0 => return Err(EvalError::argument(format!("invalid argument - {n}"))),
        #[allow(clippy::cast_possible_wrap)]
        Value::Int(n) => Value::Int(below(n.unsigned_abs()) as i64),
        Value::Float(f) => Value::Float(unit * f),
        Value::Range(r) => match (&r.start, &r.end) {
            (Value::Int(lo), Value::Int(hi)) => {
                let hi = if r.exclusive { hi - 1 } else { *hi };
                if hi < *lo {
                    return Ok(Value::Nil);
                }
                let span = hi.abs_diff(*lo).saturating_add(1);
                Value::Int(lo.wrapping_add_unsigned(below(span)))
            }
            (lo, hi) => {
                let (lo, hi) = (float(lo)?, float(hi)?);
                Value::Float(lo + unit * (hi - lo))
            }
        },
        other => return Err(EvalError::argument(format!("invalid argument - {}", other.describe()))),
    })
}

pub(super) fn below(n: u64) -> u64 {
    rand::random::<u64>() % n
}

/// Integer square root, exact for the whole `i64` range.
fn isqrt(n: i64) -> i64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let mut root = (n as f64).sqrt() as i64;
    while root.checked_mul(root).map_or(true, |sq| sq > n) {
        root -= 1;
    }
    while (root + 1).checked_mul(root + 1).is_some_and(|sq| sq <= n) {
        root += 1;
    }
    root
}

/// Strict string-to-integer conversion used by `Integer()`.
pub(super) fn to_integer(value: &Value, base: Option<&Value>) -> EvalResult<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(f) if f.is_nan() || f.is_infinite() => Err(EvalError::Raised {
            class: "FloatDomainError".into(),
            message: value::format_float(*f),
        }),
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(f) => {
            if f.abs() >= 9.2e18 {
                return Err(EvalError::overflow());
            }
            Ok(f.trunc() as i64)
        }
        Value::Str(s) => {
            let text = s.borrow();
            let base = match base {
                Some(b) => u32::try_from(int(b)?).map_err(|_| EvalError::argument("invalid radix"))?,
                None => 10,
            };
            parse_integer(&text, base)
                .ok_or_else(|| EvalError::argument(format!("invalid value for Integer(): {:?}", *text)))
        }
        Value::Nil => Err(EvalError::type_error("can't convert nil into Integer")),
        other => Err(EvalError::type_error(format!(
            "can't convert {} into Integer",
            other.class_name()
        ))),
    }
}

fn parse_integer(text: &str, base: u32) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, digits) = match lower.get(..2) {
        Some("0x") if base == 10 || base == 16 => (16, &digits[2..]),
        Some("0b") if base == 10 || base == 2 => (2, &digits[2..]),
        Some("0o") if base == 10 || base == 8 => (8, &digits[2..]),
        _ if base == 10 && digits.len() > 1 && digits.starts_with('0') => (8, &digits[1..]),
        _ => (base, digits),
    };
    if !(2..=36).contains(&radix)
        || digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return None;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let magnitude = i128::from_str_radix(&cleaned, radix).ok()?;
    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed).ok()
}

/// Strict string-to-float conversion used by `Float()`.
pub(super) fn to_float(value: &Value) -> EvalResult<f64> {
    match value {
        #[allow(clippy::cast_precision_loss)]
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        Value::Str(s) => {
            let text = s.borrow();
            let trimmed = text.trim();
            let valid = !trimmed.is_empty()
                && trimmed
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '.' | '_' | 'e' | 'E' | '+' | '-'))
                && !trimmed.starts_with('.')
                && !trimmed.ends_with('.');
            let parsed = valid
                .then(|| trimmed.replace('_', "").parse::<f64>().ok())
                .flatten();
            parsed.ok_or_else(|| EvalError::argument(format!("invalid value for Float(): {:?}", *text)))
        }
        Value::Nil => Err(EvalError::type_error("can't convert nil into Float")),
        other => Err(EvalError::type_error(format!(
            "can't convert {} into Float",
            other.class_name()
        ))),
    }
}

fn is_exception_class(class: &str) -> bool {
    matches!(class, "Exception" | "ScriptError") || exception_ancestors(class).len() > 1
}

/// Build the error `raise` throws.
fn raise(interp: &mut Interpreter, args: &[Value]) -> EvalResult<EvalError> {
    arity(args, 0, 2)?;
    let (class, message) = match args {
        [] => ("RuntimeError".to_string(), "unhandled exception".to_string()),
        [Value::Str(s)] => ("RuntimeError".to_string(), s.borrow().clone()),
        [Value::Class(class)] if is_exception_class(class) => ((*class).to_string(), (*class).to_string()),
        [Value::Class(class), message] if is_exception_class(class) => {
            ((*class).to_string(), interp.to_s(message)?)
        }
        [Value::Exception(e)] => (e.class.clone(), e.message.clone()),
        [Value::Exception(e), message] => (e.class.clone(), interp.to_s(message)?),
        _ => return Ok(EvalError::type_error("exception class/object expected")),
    };
    Ok(EvalError::Raised { class, message })
}

pub(super) fn call_class(
    interp: &mut Interpreter,
    class: &'static str,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    let value = match (class, name) {
        (_, "name" | "to_s" | "inspect") => interp.new_str(class.to_string())?,
        (_, "===") => {
            arity(args, 1, 1)?;
            Value::Bool(args[0].ancestors().contains(&class))
        }
        ("Math", _) => return math(name, args).map_err(Into::into),
        ("Integer", "sqrt") => {
            arity(args, 1, 1)?;
            let n = int(&args[0])?;
            if n < 0 {
                return Err(domain_error("isqrt").into());
            }
            Value::Int(isqrt(n))
        }
        ("Array", "new") => {
            arity(args, 0, 2)?;
            let size = args.first().map(count).transpose()?.unwrap_or(0);
            interp.ensure_fits(size, SLOT)?;
            let items = match block {
                Some(block) => {
                    let mut items = Vec::with_capacity(size);
                    for i in 0..size {
                        items.push(interp.call_block1(block, Value::Int(i as i64))?);
                    }
                    items
                }
                None => vec![args.get(1).cloned().unwrap_or_default(); size],
            };
            interp.new_array(items)?
        }
        ("Hash", "new") => {
            arity(args, 0, 1)?;
            if block.is_some() {
                return Err(EvalError::Raised {
                    class: "NotImplementedError".into(),
                    message: "Hash.new with a default block is not supported".into(),
                }
                .into());
            }
            let default = args.first().cloned().unwrap_or_default();
            interp.new_hash(HashTable::with_default(default))?
        }
        ("String", "new") => {
            arity(args, 0, 1)?;
            let s = args.first().map(string).transpose()?.unwrap_or_default();
            interp.new_str(s)?
        }
        ("Range", "new") => {
            arity(args, 2, 3)?;
            let exclusive = args.get(2).is_some_and(Value::truthy);
            Value::range(args[0].clone(), args[1].clone(), exclusive)?
        }
        (class, "new" | "exception") if is_exception_class(class) => {
            arity(args, 0, 1)?;
            let message = match args.first() {
                Some(message) => interp.to_s(message)?,
                None => class.to_string(),
            };
            Value::exception(class, message)
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn domain_error(function: &str) -> EvalError {
    EvalError::argument(format!("Numerical argument is out of domain - \"{function}\""))
}

fn math(name: &str, args: &[Value]) -> EvalResult<Option<Value>> {
    let unary = |f: fn(f64) -> f64| -> EvalResult<Value> {
        arity(args, 1, 1)?;
        Ok(Value::Float(f(float(&args[0])?)))
    };
    let checked = |f: fn(f64) -> f64, valid: fn(f64) -> bool| -> EvalResult<Value> {
        arity(args, 1, 1)?;
        let x = float(&args[0])?;
        if !valid(x) {
            return Err(domain_error(name));
        }
        Ok(Value::Float(f(x)))
    };
    let value = match name {
        "sqrt" => checked(f64::sqrt, |x| x >= 0.0 || x.is_nan())?,
        "cbrt" => unary(f64::cbrt)?,
        "sin" => unary(f64::sin)?,
        "cos" => unary(f64::cos)?,
        "tan" => unary(f64::tan)?,
        "asin" => checked(f64::asin, |x| (-1.0..=1.0).contains(&x))?,
        "acos" => checked(f64::acos, |x| (-1.0..=1.0).contains(&x))?,
        "atan" => unary(f64::atan)?,
        "sinh" => unary(f64::sinh)?,
        "cosh" => unary(f64::cosh)?,
        "tanh" => unary(f64::tanh)?,
        "exp" => unary(f64::exp)?,
        "log2" => checked(f64::log2, |x| x >= 0.0)?,
        "log10" => checked(f64::log10, |x| x >= 0.0)?,
        "log" => {
            arity(args, 1, 2)?;
            let x = float(&args[0])?;
            if x < 0.0 {
                return Err(domain_error("log"));
            }
            match args.get(1) {
                Some(base) => Value::Float(x.ln() / float(base)?.ln()),
                None => Value::Float(x.ln()),
            }
        }
        "atan2" | "hypot" => {
            arity(args, 2, 2)?;
            let (a, b) = (float(&args[0])?, float(&args[1])?);
            Value::Float(if name == "atan2" { a.atan2(b) } else { a.hypot(b) })
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// `format` / `sprintf` / `String#%`.
pub(super) fn format(interp: &mut Interpreter, spec: &str, args: &[Value]) -> Exec<String> {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = spec.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut left = false;
        let mut zero = false;
        let mut plus = false;
        let mut space = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left = true,
                '0' => zero = true,
                '+' => plus = true,
                ' ' => space = true,
                '#' => {}
                _ => break,
            }
            chars.next();
        }
        let mut width = 0usize;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width.saturating_mul(10).saturating_add(d as usize);
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p.saturating_mul(10).saturating_add(d as usize);
                chars.next();
            }
            precision = Some(p);
        }
        let Some(conversion) = chars.next() else {
            return Err(EvalError::argument("incomplete format specifier; use %% (double %) instead").into());
        };
        if conversion == '%' {
            out.push('%');
            continue;
        }
        let arg = args
            .next()
            .ok_or_else(|| EvalError::argument("too few arguments"))?;
        interp.ensure_fits(width.max(precision.unwrap_or(0)), 1)?;
        let (body, numeric) = match conversion {
            'd' | 'i' | 'u' => (to_integer(arg, None)?.to_string(), true),
            'f' => (format!("{:.*}", precision.unwrap_or(6), to_float(arg)?), true),
            'e' | 'E' => {
                let s = exponent(to_float(arg)?, precision.unwrap_or(6));
                (if conversion == 'E' { s.to_uppercase() } else { s }, true)
            }
            'g' | 'G' => (value::format_float(to_float(arg)?), true),
            'x' => (radix(to_integer(arg, None)?, 16), true),
            'X' => (radix(to_integer(arg, None)?, 16).to_uppercase(), true),
            'o' => (radix(to_integer(arg, None)?, 8), true),
            'b' | 'B' => (radix(to_integer(arg, None)?, 2), true),
            'c' => {
                let c = match arg {
                    Value::Int(n) => u32::try_from(*n).ok().and_then(char::from_u32).map(String::from),
                    other => Some(interp.to_s(other)?.chars().take(1).collect()),
                };
                (c.ok_or_else(|| EvalError::Range("invalid character".into()))?, false)
            }
            's' => {
                let s = interp.to_s(arg)?;
                (truncate(s, precision), false)
            }
            'p' => {
                let s = interp.inspect(arg)?;
                (truncate(s, precision), false)
            }
            other => {
                return Err(EvalError::argument(format!("malformed format string - %{other}")).into());
            }
        };
        let body = if numeric && !body.starts_with('-') && (plus || space) {
            format!("{}{body}", if plus { '+' } else { ' ' })
        } else {
            body
        };
        let len = body.chars().count();
        if len >= width {
            out.push_str(&body);
        } else if left {
            let _ = write!(out, "{body:<width$}");
        } else if zero && numeric {
            let (sign, digits) = match body.chars().next() {
                Some(c @ ('-' | '+' | ' ')) => (Some(c), &body[1..]),
                _ => (None, body.as_str()),
            };
            out.extend(sign);
            out.push_str(&"0".repeat(width - len));
            out.push_str(digits);
        } else {
            let _ = write!(out, "{body:>width$}");
        }
    }
    Ok(out)
}

fn truncate(s: String, precision: Option<usize>) -> String {
    match precision {
        Some(p) => s.chars().take(p).collect(),
        None => s,
    }
}

fn radix(n: i64, base: u32) -> String {
    let magnitude = n.unsigned_abs();
    let digits = match base {
        16 => format!("{magnitude:x}"),
        8 => format!("{magnitude:o}"),
        _ => format!("{magnitude:b}"),
    };
    if n < 0 {
        format!("-{digits}")
    } else {
        digits
    }
}

/// `1.5e3` rendered as `1.500000e+03`.
fn exponent(x: f64, precision: usize) -> String {
    let raw = format!("{x:.precision$e}");
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = exp.strip_prefix('-').map_or(("+", exp), |d| ("-", d));
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_parsing_is_strict() {
        assert_eq!(parse_integer("42", 10), Some(42));
        assert_eq!(parse_integer(" -1_000 ", 10), Some(-1000));
        assert_eq!(parse_integer("0x1f", 10), Some(31));
        assert_eq!(parse_integer("0b101", 10), Some(5));
        assert_eq!(parse_integer("017", 10), Some(15));
        assert_eq!(parse_integer("ff", 16), Some(255));
        assert_eq!(parse_integer("12abc", 10), None);
        assert_eq!(parse_integer("", 10), None);
        assert_eq!(parse_integer("1__0", 10), None);
        assert_eq!(parse_integer("99999999999999999999", 10), None);
    }

    #[test]
    fn float_parsing_is_strict() {
        assert_eq!(to_float(&Value::str("1.5")), Ok(1.5));
        assert_eq!(to_float(&Value::str("2e3")), Ok(2000.0));
        assert!(to_float(&Value::str("abc")).is_err());
        assert!(to_float(&Value::str("inf")).is_err());
        assert!(to_float(&Value::str("1.")).is_err());
    }

    #[test]
    fn integer_square_root() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(24), 4);
        assert_eq!(isqrt(25), 5);
        assert_eq!(isqrt(i64::MAX), 3_037_000_499);
    }

    #[test]
    fn exponent_format() {
        assert_eq!(exponent(1500.0, 2), "1.50e+03");
        assert_eq!(exponent(0.00015, 1), "1.5e-04");
    }

    #[test]
    fn rand_stays_in_range() {
        for _ in 0..100 {
            let Value::Int(n) = rand(&Value::Int(6)).unwrap() else {
                panic!("expected an integer");
            };
            assert!((0..6).contains(&n));
            let range = Value::range(Value::Int(-2), Value::Int(2), false).unwrap();
            let Value::Int(n) = rand(&range).unwrap() else {
                panic!("expected an integer");
            };
            assert!((-2..=2).contains(&n));
        }
    }
}

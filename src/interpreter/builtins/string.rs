//! String and Symbol methods.
//!
//! Indexing counts characters, not bytes. Patterns for `sub`, `gsub`,
//! `split` and friends are plain strings; regular expressions do not exist
//! in the language.

use std::cmp::Ordering;
use std::rc::Rc;

use super::kernel::format;
use super::{arity, count, int, make_enumerator, normalize_index, opt, string, window};
use crate::interpreter::error::{EvalError, EvalResult};
use crate::interpreter::eval::{BlockRef, Exec, Interpreter, SLOT};
use crate::interpreter::value::{StrRef, Value};

pub(super) const METHODS: &[&str] = &[
    "length", "size", "bytesize", "empty?", "upcase", "downcase", "capitalize", "swapcase",
    "reverse", "strip", "lstrip", "rstrip", "chomp", "chop", "squeeze", "succ", "next",
    "upcase!", "downcase!", "capitalize!", "swapcase!", "reverse!", "strip!", "lstrip!",
    "rstrip!", "chomp!", "chop!", "squeeze!", "sub!", "gsub!", "chars", "bytes", "lines",
    "split", "each_char", "each_line", "scan", "include?", "start_with?", "end_with?", "index",
    "rindex", "count", "delete", "to_i", "to_f", "to_s", "to_str", "to_sym", "intern", "+", "*",
    "%", "<<", "concat", "prepend", "insert", "replace", "<=>", "<", "<=", ">", ">=", "[]",
    "slice", "[]=", "center", "ljust", "rjust", "sub", "gsub", "tr", "ord", "chr", "casecmp",
    "casecmp?", "partition", "rpartition", "=~", "match", "match?",
];

pub(super) const SYMBOL_METHODS: &[&str] = &[
    "to_s", "id2name", "name", "to_sym", "length", "size", "upcase", "downcase", "capitalize",
    "swapcase", "succ", "<=>", "<", "<=", ">", ">=", "[]", "start_with?", "end_with?", "empty?",
];

pub(super) fn call(
    interp: &mut Interpreter,
    s: &StrRef,
    name: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    if let Some(text) = transform(&s.borrow(), name, args)? {
        return Ok(Some(interp.new_str(text)?));
    }
    if let Some(base) = name.strip_suffix('!') {
        if let Some(value) = bang(interp, s, base, args, block)? {
            return Ok(Some(value));
        }
    }
    let value = match name {
        "length" | "size" => Value::Int(s.borrow().chars().count() as i64),
        "bytesize" => Value::Int(s.borrow().len() as i64),
        "empty?" => Value::Bool(s.borrow().is_empty()),
        "to_s" | "to_str" => Value::Str(Rc::clone(s)),
        "to_sym" | "intern" => Value::sym(&s.borrow()),
        "to_i" => {
            arity(args, 0, 1)?;
            let base = opt(args, 0).map(int).transpose()?.unwrap_or(10);
            let base = u32::try_from(base)
                .ok()
                .filter(|b| (2..=36).contains(b))
                .ok_or_else(|| EvalError::argument(format!("invalid radix {base}")))?;
            Value::Int(leading_integer(&s.borrow(), base)?)
        }
        "to_f" => Value::Float(leading_float(&s.borrow())),
        "ord" => {
            let first = s.borrow().chars().next();
            let c = first.ok_or_else(|| EvalError::argument("empty string"))?;
            Value::Int(i64::from(u32::from(c)))
        }
        "chr" => {
            let first: String = s.borrow().chars().take(1).collect();
            interp.new_str(first)?
        }
        "chars" => {
            let chars: Vec<Value> = s.borrow().chars().map(|c| Value::str(c.to_string())).collect();
            charge_parts(interp, &chars)?;
            interp.new_array(chars)?
        }
        "bytes" => {
            let bytes: Vec<Value> = s.borrow().bytes().map(|b| Value::Int(i64::from(b))).collect();
            interp.new_array(bytes)?
        }
        "lines" => {
            let lines = lines(&s.borrow());
            charge_parts(interp, &lines)?;
            interp.new_array(lines)?
        }
        "each_char" | "each_line" => {
            let Some(block) = block else {
                return make_enumerator(interp, &Value::Str(Rc::clone(s)), name, args).map(Some);
            };
            let parts = if name == "each_char" {
                s.borrow().chars().map(|c| Value::str(c.to_string())).collect()
            } else {
                lines(&s.borrow())
            };
            for part in parts {
                interp.call_block1(block, part)?;
            }
            Value::Str(Rc::clone(s))
        }
        "split" => {
            arity(args, 0, 2)?;
            let sep = match opt(args, 0) {
                None | Some(Value::Nil) => None,
                Some(sep) => Some(pattern(sep)?),
            };
            let limit = opt(args, 1).map(int).transpose()?.unwrap_or(0);
            let parts = split(&s.borrow(), sep.as_deref(), limit);
            charge_parts(interp, &parts)?;
            interp.new_array(parts)?
        }
        "scan" => {
            arity(args, 1, 1)?;
            let needle = pattern(&args[0])?;
            let found = if needle.is_empty() {
                Vec::new()
            } else {
                let text = s.borrow();
                text.matches(needle.as_str()).map(Value::str).collect::<Vec<_>>()
            };
            charge_parts(interp, &found)?;
            match block {
                Some(block) => {
                    for item in found {
                        interp.call_block1(block, item)?;
                    }
                    Value::Str(Rc::clone(s))
                }
                None => interp.new_array(found)?,
            }
        }
        "include?" => {
            arity(args, 1, 1)?;
            let needle = string(&args[0])?;
            Value::Bool(s.borrow().contains(needle.as_str()))
        }
        "start_with?" | "end_with?" => {
            let text = s.borrow();
            let mut hit = false;
            for arg in args {
                let affix = string(arg)?;
                hit |= if name == "start_with?" {
                    text.starts_with(affix.as_str())
                } else {
                    text.ends_with(affix.as_str())
                };
            }
            Value::Bool(hit)
        }
        "index" | "rindex" => {
            arity(args, 1, 2)?;
            let needle = pattern(&args[0])?;
            let chars: Vec<char> = s.borrow().chars().collect();
            let start = opt(args, 1).map(int).transpose()?;
            match find_chars(&chars, &needle, start, name == "rindex") {
                Some(i) => Value::Int(i as i64),
                None => Value::Nil,
            }
        }
        "count" => {
            arity(args, 1, usize::MAX)?;
            let sets = sets(args)?;
            let n = s.borrow().chars().filter(|c| sets.iter().all(|set| set.contains(*c))).count();
            Value::Int(n as i64)
        }
        "+" => {
            arity(args, 1, 1)?;
            let other = string(&args[0])?;
            let joined = format!("{}{other}", s.borrow());
            interp.new_str(joined)?
        }
        "*" => {
            arity(args, 1, 1)?;
            let times = count(&args[0])?;
            let len = s.borrow().len();
            interp.ensure_fits(len, times)?;
            let repeated = s.borrow().repeat(times);
            interp.new_str(repeated)?
        }
        "%" => {
            arity(args, 1, 1)?;
            let values = match &args[0] {
                Value::Array(items) => items.snapshot(),
                other => vec![other.clone()],
            };
            let spec = s.borrow().clone();
            let out = format(interp, &spec, &values)?;
            interp.new_str(out)?
        }
        "<<" | "concat" => {
            for arg in args {
                let piece = match arg {
                    Value::Int(n) => u32::try_from(*n)
                        .ok()
                        .and_then(char::from_u32)
                        .map(String::from)
                        .ok_or_else(|| EvalError::Range(format!("{n} out of char range")))?,
                    other => string(other)?,
                };
                interp.budget().charge(piece.len())?;
                s.borrow_mut().push_str(&piece);
            }
            Value::Str(Rc::clone(s))
        }
        "prepend" => {
            arity(args, 1, 1)?;
            let piece = string(&args[0])?;
            interp.budget().charge(piece.len())?;
            s.borrow_mut().insert_str(0, &piece);
            Value::Str(Rc::clone(s))
        }
        "insert" => {
            arity(args, 2, 2)?;
            let piece = string(&args[1])?;
            let index = int(&args[0])?;
            let len = s.borrow().chars().count();
            let at = if index < 0 { normalize_index(index + 1, len + 1) } else { normalize_index(index, len + 1) };
            let at = at
                .filter(|i| *i <= len)
                .ok_or_else(|| EvalError::Index(format!("index {index} out of string")))?;
            interp.budget().charge(piece.len())?;
            let byte = byte_offset(&s.borrow(), at);
            s.borrow_mut().insert_str(byte, &piece);
            Value::Str(Rc::clone(s))
        }
        "replace" => {
            arity(args, 1, 1)?;
            let text = string(&args[0])?;
            interp.budget().charge(text.len())?;
            *s.borrow_mut() = text;
            Value::Str(Rc::clone(s))
        }
        "<=>" | "<" | "<=" | ">" | ">=" => {
            arity(args, 1, 1)?;
            let Value::Str(other) = &args[0] else {
                if name == "<=>" {
                    return Ok(Some(Value::Nil));
                }
                return Err(EvalError::argument(format!(
                    "comparison of String with {} failed",
                    args[0].class_name()
                ))
                .into());
            };
            let ordering = s.borrow().as_str().cmp(other.borrow().as_str());
            comparison(name, ordering)
        }
        "casecmp" | "casecmp?" => {
            arity(args, 1, 1)?;
            let Value::Str(other) = &args[0] else {
                return Ok(Some(Value::Nil));
            };
            let a = s.borrow().to_lowercase();
            let b = other.borrow().to_lowercase();
            if name == "casecmp?" {
                Value::Bool(a == b)
            } else {
                Value::Int(a.cmp(&b) as i64)
            }
        }
        "[]" | "slice" => {
            arity(args, 1, 2)?;
            match slice(&s.borrow(), args)? {
                Some(text) => interp.new_str(text)?,
                None => Value::Nil,
            }
        }
        "[]=" => {
            arity(args, 2, 3)?;
            let (selector, value) = args.split_at(args.len() - 1);
            let replacement = string(&value[0])?;
            interp.budget().charge(replacement.len())?;
            let updated = assign_slice(&s.borrow(), selector, &replacement)?;
            *s.borrow_mut() = updated;
            value[0].clone()
        }
        "center" | "ljust" | "rjust" => {
            arity(args, 1, 2)?;
            let width = count(&args[0])?;
            let pad = opt(args, 1).map(string).transpose()?.unwrap_or_else(|| " ".into());
            if pad.is_empty() {
                return Err(EvalError::argument("zero width padding").into());
            }
            interp.ensure_fits(width, 4)?;
            let padded = justify(&s.borrow(), width, &pad, name);
            interp.new_str(padded)?
        }
        "sub" | "gsub" => {
            let text = s.borrow().clone();
            let replaced = substitute(interp, &text, args, block, name == "gsub")?;
            interp.new_str(replaced)?
        }
        "partition" | "rpartition" => {
            arity(args, 1, 1)?;
            let sep = pattern(&args[0])?;
            let text = s.borrow().clone();
            let found = if name == "partition" { text.find(sep.as_str()) } else { text.rfind(sep.as_str()) };
            let parts = match found {
                Some(i) => [&text[..i], sep.as_str(), &text[i + sep.len()..]],
                None if name == "partition" => [text.as_str(), "", ""],
                None => ["", "", text.as_str()],
            };
            let parts: Vec<Value> = parts.iter().map(|p| Value::str(*p)).collect();
            charge_parts(interp, &parts)?;
            interp.new_array(parts)?
        }
        "=~" | "match" | "match?" => {
            return Err(EvalError::Raised {
                class: "NotImplementedError".into(),
                message: "regular expressions are not supported".into(),
            }
            .into())
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Methods that build a new string from the receiver alone.
fn transform(text: &str, name: &str, args: &[Value]) -> EvalResult<Option<String>> {
    let out = match name {
        "upcase" => text.to_uppercase(),
        "downcase" => text.to_lowercase(),
        "capitalize" => capitalize(text),
        "swapcase" => text
            .chars()
            .flat_map(|c| -> Vec<char> {
                if c.is_uppercase() {
                    c.to_lowercase().collect()
                } else {
                    c.to_uppercase().collect()
                }
            })
            .collect(),
        "reverse" => text.chars().rev().collect(),
        "strip" => text.trim_matches(is_space).to_string(),
        "lstrip" => text.trim_start_matches(is_space).to_string(),
        "rstrip" => text.trim_end_matches(is_space).to_string(),
        "chomp" => {
            arity(args, 0, 1)?;
            match opt(args, 0) {
                Some(suffix) => {
                    let suffix = string(suffix)?;
                    text.strip_suffix(suffix.as_str()).unwrap_or(text).to_string()
                }
                None => chomp(text).to_string(),
            }
        }
        "chop" => {
            if text.ends_with("\r\n") {
                text[..text.len() - 2].to_string()
            } else {
                let mut chars = text.chars();
                chars.next_back();
                chars.as_str().to_string()
            }
        }
        "squeeze" => {
            let sets = sets(args)?;
            let mut out = String::with_capacity(text.len());
            let mut last = None;
            for c in text.chars() {
                if last == Some(c) && sets.iter().all(|set| set.contains(c)) {
                    continue;
                }
                out.push(c);
                last = Some(c);
            }
            out
        }
        "delete" => {
            arity(args, 1, usize::MAX)?;
            let sets = sets(args)?;
            text.chars().filter(|c| !sets.iter().all(|set| set.contains(*c))).collect()
        }
        "tr" => {
            arity(args, 2, 2)?;
            translate(text, &string(&args[0])?, &string(&args[1])?)
        }
        "succ" | "next" => succ(text),
        _ => return Ok(None),
    };
    Ok(Some(out))
}

/// In-place variants: return `nil` when nothing changed.
fn bang(
    interp: &mut Interpreter,
    s: &StrRef,
    base: &str,
    args: &[Value],
    block: Option<&BlockRef>,
) -> Exec<Option<Value>> {
    let current = s.borrow().clone();
    let updated = match base {
        "sub" | "gsub" => substitute(interp, &current, args, block, base == "gsub")?,
        _ => match transform(&current, base, args)? {
            Some(updated) => updated,
            None => return Ok(None),
        },
    };
    if updated == current {
        return Ok(Some(Value::Nil));
    }
    interp.budget().charge(updated.len())?;
    *s.borrow_mut() = updated;
    Ok(Some(Value::Str(Rc::clone(s))))
}

pub(super) fn call_symbol(interp: &mut Interpreter, s: &Rc<str>, name: &str, args: &[Value]) -> Exec<Option<Value>> {
    let value = match name {
        "to_s" | "id2name" | "name" => interp.new_str(s.to_string())?,
        "to_sym" => Value::Sym(Rc::clone(s)),
        "length" | "size" => Value::Int(s.chars().count() as i64),
        "empty?" => Value::Bool(s.is_empty()),
        "upcase" | "downcase" | "capitalize" | "swapcase" | "succ" => match transform(s, name, args)? {
            Some(text) => Value::sym(&text),
            None => return Ok(None),
        },
        "start_with?" | "end_with?" => {
            let text = Value::str(s.to_string());
            return interp.call_method(text, name, args.to_vec(), None).map(Some);
        }
        "[]" => match slice(s, args)? {
            Some(text) => interp.new_str(text)?,
            None => Value::Nil,
        },
        "<=>" | "<" | "<=" | ">" | ">=" => {
            arity(args, 1, 1)?;
            let Value::Sym(other) = &args[0] else {
                if name == "<=>" {
                    return Ok(Some(Value::Nil));
                }
                return Err(EvalError::argument(format!(
                    "comparison of Symbol with {} failed",
                    args[0].class_name()
                ))
                .into());
            };
            comparison(name, s.cmp(other))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn comparison(name: &str, ordering: Ordering) -> Value {
    match name {
        "<=>" => Value::Int(ordering as i64),
        "<" => Value::Bool(ordering == Ordering::Less),
        "<=" => Value::Bool(ordering != Ordering::Greater),
        ">" => Value::Bool(ordering == Ordering::Greater),
        _ => Value::Bool(ordering != Ordering::Less),
    }
}

fn charge_parts(interp: &mut Interpreter, parts: &[Value]) -> EvalResult<()> {
    let bytes: usize = parts
        .iter()
        .map(|p| match p {
            Value::Str(s) => s.borrow().len() + SLOT,
            _ => SLOT,
        })
        .sum();
    interp.budget().charge(bytes)
}

/// A plain-string pattern argument.
fn pattern(value: &Value) -> EvalResult<String> {
    match value {
        Value::Str(s) => Ok(s.borrow().clone()),
        other => Err(EvalError::type_error(format!(
            "wrong argument type {} (expected String)",
            other.class_name()
        ))),
    }
}

const fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c' | '\0')
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}

fn chomp(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .or_else(|| text.strip_suffix('\r'))
        .unwrap_or(text)
}

fn lines(text: &str) -> Vec<Value> {
    text.split_inclusive('\n').map(Value::str).collect()
}

fn split(text: &str, sep: Option<&str>, limit: i64) -> Vec<Value> {
    let max = usize::try_from(limit).ok().filter(|n| *n > 0);
    let mut parts: Vec<String> = match (sep, max) {
        (None | Some(" "), None) => text.split_whitespace().map(String::from).collect(),
        (None | Some(" "), Some(n)) => {
            let mut parts = Vec::new();
            let mut rest = text.trim_start_matches(is_space);
            while !rest.is_empty() {
                if parts.len() + 1 == n {
                    parts.push(rest.to_string());
                    break;
                }
                let end = rest.find(is_space).unwrap_or(rest.len());
                parts.push(rest[..end].to_string());
                rest = rest[end..].trim_start_matches(is_space);
            }
            parts
        }
        (Some(""), None) => text.chars().map(String::from).collect(),
        (Some(""), Some(n)) => {
            let mut parts: Vec<String> = text.chars().take(n - 1).map(String::from).collect();
            let consumed: usize = parts.iter().map(String::len).sum();
            if consumed < text.len() {
                parts.push(text[consumed..].to_string());
            }
            parts
        }
        (Some(sep), None) => text.split(sep).map(String::from).collect(),
        (Some(sep), Some(n)) => text.splitn(n, sep).map(String::from).collect(),
    };
    if limit == 0 {
        while parts.last().is_some_and(String::is_empty) {
            parts.pop();
        }
    }
    parts.into_iter().map(Value::str).collect()
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices().nth(char_index).map_or(text.len(), |(i, _)| i)
}

fn find_chars(chars: &[char], needle: &str, start: Option<i64>, reverse: bool) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    let len = chars.len();
    let start = match start {
        Some(start) => normalize_index(start, len)?,
        None if reverse => len,
        None => 0,
    };
    if start > len {
        return None;
    }
    let fits = |i: usize| i + needle.len() <= len && chars[i..i + needle.len()] == needle[..];
    if reverse {
        (0..=start.min(len)).rev().find(|&i| fits(i))
    } else {
        (start..=len).find(|&i| fits(i))
    }
}

fn slice(text: &str, args: &[Value]) -> EvalResult<Option<String>> {
    if let [Value::Str(needle)] = args {
        let needle = needle.borrow();
        return Ok(text.contains(needle.as_str()).then(|| needle.clone()));
    }
    let chars: Vec<char> = text.chars().collect();
    if let [index] = args {
        if !matches!(index, Value::Range(_)) {
            let i = normalize_index(int(index)?, chars.len());
            return Ok(i.and_then(|i| chars.get(i)).map(|c| c.to_string()));
        }
    }
    Ok(window(args, chars.len())?.map(|(start, len)| chars[start..start + len].iter().collect()))
}

fn assign_slice(text: &str, selector: &[Value], replacement: &str) -> EvalResult<String> {
    let chars: Vec<char> = text.chars().collect();
    let (start, len) = match selector {
        [Value::Str(needle)] => {
            let needle = needle.borrow();
            let at = text
                .find(needle.as_str())
                .ok_or_else(|| EvalError::Index("string not matched".into()))?;
            let mut out = text.to_string();
            out.replace_range(at..at + needle.len(), replacement);
            return Ok(out);
        }
        [index] if !matches!(index, Value::Range(_)) => {
            let raw = int(index)?;
            let i = normalize_index(raw, chars.len())
                .filter(|i| *i < chars.len())
                .ok_or_else(|| EvalError::Index(format!("index {raw} out of string")))?;
            (i, 1)
        }
        _ => window(selector, chars.len())?
            .ok_or_else(|| EvalError::Range("index out of range".into()))?,
    };
    let mut out: String = chars[..start].iter().collect();
    out.push_str(replacement);
    out.extend(&chars[start + len..]);
    Ok(out)
}

fn justify(text: &str, width: usize, pad: &str, mode: &str) -> String {
    let len = text.chars().count();
    if width <= len {
        return text.to_string();
    }
    let total = width - len;
    let fill = |n: usize| pad.chars().cycle().take(n).collect::<String>();
    match mode {
        "ljust" => format!("{text}{}", fill(total)),
        "rjust" => format!("{}{text}", fill(total)),
        _ => {
            let left = total / 2;
            format!("{}{text}{}", fill(left), fill(total - left))
        }
    }
}

fn substitute(
    interp: &mut Interpreter,
    text: &str,
    args: &[Value],
    block: Option<&BlockRef>,
    global: bool,
) -> Exec<String> {
    arity(args, 1, 2)?;
    let needle = pattern(&args[0])?;
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (at, matched) in text.match_indices(needle.as_str()) {
        out.push_str(&text[last..at]);
        let replacement = match (args.get(1), block) {
            (Some(Value::Hash(table)), _) => {
                let found = table.borrow().get(&Value::str(matched))?;
                match found {
                    Some(value) => interp.to_s(&value)?,
                    None => String::new(),
                }
            }
            (Some(replacement), _) => string(replacement)?,
            (None, Some(block)) => {
                let value = interp.call_block1(block, Value::str(matched))?;
                interp.to_s(&value)?
            }
            (None, None) => return Err(EvalError::wrong_arity(1, "2").into()),
        };
        interp.budget().charge(replacement.len())?;
        out.push_str(&replacement);
        last = at + matched.len();
        if !global {
            break;
        }
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// A `count`/`delete`/`squeeze` character set such as `"a-z"` or `"^aeiou"`.
struct CharSet {
    negated: bool,
    chars: Vec<char>,
    ranges: Vec<(char, char)>,
}

impl CharSet {
    fn parse(spec: &str) -> Self {
        let mut chars: Vec<char> = spec.chars().collect();
        let negated = chars.len() > 1 && chars[0] == '^';
        if negated {
            chars.remove(0);
        }
        let mut set = Self {
            negated,
            chars: Vec::new(),
            ranges: Vec::new(),
        };
        let mut i = 0;
        while i < chars.len() {
            if i + 2 < chars.len() && chars[i + 1] == '-' {
                set.ranges.push((chars[i], chars[i + 2]));
                i += 3;
            } else {
                set.chars.push(chars[i]);
                i += 1;
            }
        }
        set
    }

    fn contains(&self, c: char) -> bool {
        let hit = self.chars.contains(&c) || self.ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&c));
        hit != self.negated
    }

    /// Every character the set names, in order (negation ignored).
    fn expand(&self) -> Vec<char> {
        let mut out = self.chars.clone();
        for (lo, hi) in &self.ranges {
            out.extend(*lo..=*hi);
        }
        out
    }
}

fn sets(args: &[Value]) -> EvalResult<Vec<CharSet>> {
    args.iter().map(|arg| Ok(CharSet::parse(&string(arg)?))).collect()
}

fn translate(text: &str, from: &str, to: &str) -> String {
    let from = CharSet::parse(from);
    let to: Vec<char> = CharSet::parse(to).expand();
    if from.negated {
        let Some(&last) = to.last() else {
            return text.chars().filter(|c| !from.contains(*c)).collect();
        };
        return text.chars().map(|c| if from.contains(c) { last } else { c }).collect();
    }
    let sources = from.expand();
    text.chars()
        .filter_map(|c| match sources.iter().position(|s| *s == c) {
            Some(_) if to.is_empty() => None,
            Some(i) => Some(*to.get(i).or(to.last()).unwrap_or(&c)),
            None => Some(c),
        })
        .collect()
}

/// Leading integer, as `String#to_i` reads it: junk after the digits is
/// ignored and no digits at all means zero.
fn leading_integer(text: &str, base: u32) -> EvalResult<i64> {
    let trimmed = text.trim_start_matches(is_space);
    let (negative, rest) = match trimmed.chars().next() {
        Some('-') => (true, &trimmed[1..]),
        Some('+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let mut value: i64 = 0;
    let mut prev_underscore = true;
    for c in rest.chars() {
        if c == '_' && !prev_underscore {
            prev_underscore = true;
            continue;
        }
        let Some(d) = c.to_digit(base) else {
            break;
        };
        prev_underscore = false;
        value = value
            .checked_mul(i64::from(base))
            .and_then(|v| v.checked_add(i64::from(d)))
            .ok_or_else(EvalError::overflow)?;
    }
    Ok(if negative { -value } else { value })
}

/// Leading float, as `String#to_f` reads it.
fn leading_float(text: &str) -> f64 {
    let trimmed = text.trim_start_matches(is_space);
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    let digits = |from: usize| {
        let mut i = from;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || (bytes[i] == b'_' && i > from)) {
            i += 1;
        }
        i
    };
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits(end);
    if int_end == end {
        return 0.0;
    }
    end = int_end;
    if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
        end = digits(end + 1);
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp_end = digits(end + 1 + sign);
        if exp_end > end + 1 + sign {
            end = exp_end;
        }
    }
    trimmed[..end].replace('_', "").parse().unwrap_or(0.0)
}

/// `String#succ`: increment the rightmost alphanumeric, carrying leftwards.
pub(super) fn succ(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let Some(mut i) = chars.iter().rposition(char::is_ascii_alphanumeric) else {
        if let Some(last) = chars.last_mut() {
            *last = char::from_u32(u32::from(*last) + 1).unwrap_or(*last);
        }
        return chars.into_iter().collect();
    };
    loop {
        let c = chars[i];
        let (next, carry) = match c {
            'z' => ('a', true),
            'Z' => ('A', true),
            '9' => ('0', true),
            c => (char::from_u32(u32::from(c) + 1).unwrap_or(c), false),
        };
        chars[i] = next;
        if !carry {
            break;
        }
        match chars[..i].iter().rposition(char::is_ascii_alphanumeric) {
            Some(j) => i = j,
            None => {
                let first = match c {
                    'z' => 'a',
                    'Z' => 'A',
                    _ => '1',
                };
                chars.insert(i, first);
                break;
            }
        }
    }
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::testing::{run, show};

    #[test]
    fn successor() {
        assert_eq!(succ("a"), "b");
        assert_eq!(succ("az"), "ba");
        assert_eq!(succ("zz"), "aaa");
        assert_eq!(succ("a9"), "b0");
        assert_eq!(succ("Zz"), "AAa");
        assert_eq!(succ("1.9"), "2.0");
        assert_eq!(succ(""), "");
    }

    #[test]
    fn leading_numbers() {
        assert_eq!(leading_integer("  42abc", 10), Ok(42));
        assert_eq!(leading_integer("-1_000", 10), Ok(-1000));
        assert_eq!(leading_integer("abc", 10), Ok(0));
        assert_eq!(leading_integer("ff", 16), Ok(255));
        assert!((leading_float("3.5kg") - 3.5).abs() < f64::EPSILON);
        assert!((leading_float("1e3") - 1000.0).abs() < f64::EPSILON);
        assert!(leading_float("x").abs() < f64::EPSILON);
    }

    #[test]
    fn splitting() {
        let parts = |text: &str, sep: Option<&str>, limit: i64| -> Vec<String> {
            split(text, sep, limit)
                .into_iter()
                .map(|v| match v {
                    Value::Str(s) => s.borrow().clone(),
                    _ => unreachable!(),
                })
                .collect()
        };
        assert_eq!(parts("  a b  c ", None, 0), ["a", "b", "c"]);
        assert_eq!(parts("a,b,,", Some(","), 0), ["a", "b"]);
        assert_eq!(parts("a,b,,", Some(","), -1), ["a", "b", "", ""]);
        assert_eq!(parts("a,b,c", Some(","), 2), ["a", "b,c"]);
        assert_eq!(parts("abc", Some(""), 0), ["a", "b", "c"]);
    }

    #[test]
    fn character_sets() {
        assert_eq!(show("'hello world'.count('lo')"), "5");
        assert_eq!(show("'hello'.count('a-y', '^l')"), "3");
        assert_eq!(show("'hello'.delete('l')"), "\"heo\"");
        assert_eq!(show("'aaabbb'.squeeze"), "\"ab\"");
        assert_eq!(show("'hello'.tr('el', 'ip')"), "\"hippo\"");
        assert_eq!(show("'hello'.tr('a-y', 'b-z')"), "\"ifmmp\"");
    }

    #[test]
    fn case_and_whitespace() {
        assert_eq!(show("'hELLo'.capitalize"), "\"Hello\"");
        assert_eq!(show("'Hello'.swapcase"), "\"hELLO\"");
        assert_eq!(show("'  hi  '.strip"), "\"hi\"");
        assert_eq!(show("\"line\\n\".chomp"), "\"line\"");
        assert_eq!(show("s = 'abc'\n[s.upcase!, s.upcase!, s]"), "[\"ABC\", nil, \"ABC\"]");
    }

    #[test]
    fn indexing() {
        assert_eq!(show("s = 'hello'\n[s[0], s[-1], s[1, 3], s[1..-1], s[10], s['ell']]"),
            "[\"h\", \"o\", \"ell\", \"ello\", nil, \"ell\"]");
        assert_eq!(show("s = 'hello'\ns[0] = 'J'\ns"), "\"Jello\"");
        assert_eq!(show("'hello'.index('l')"), "2");
        assert_eq!(show("'hello'.rindex('l')"), "3");
    }

    #[test]
    fn substitution() {
        assert_eq!(show("'a-b-c'.sub('-', '+')"), "\"a+b-c\"");
        assert_eq!(show("'a-b-c'.gsub('-', '+')"), "\"a+b+c\"");
        assert_eq!(show("'cat'.gsub('a') { |m| m.upcase }"), "\"cAt\"");
        assert_eq!(show("'cat'.gsub('c', 'c' => 'b')"), "\"bat\"");
    }

    #[test]
    fn building() {
        assert_eq!(show("'ab' * 3"), "\"ababab\"");
        assert_eq!(show("'x'.center(5, '*')"), "\"**x**\"");
        assert_eq!(show("'%05.1f|%-4s|%x' % [3.14159, 'ab', 255]"), "\"003.1|ab  |ff\"");
        assert_eq!(show("'a,b'.split(',').map(&:upcase).join('-')"), "\"A-B\"");
        assert_eq!(show("'hello world'.partition(' ')"), "[\"hello\", \" \", \"world\"]");
    }

    #[test]
    fn type_errors() {
        assert!(matches!(run("'a' + 1"), Err(EvalError::Type(_))));
        assert!(matches!(run("'a' < 1"), Err(EvalError::Argument(_))));
    }

    #[test]
    fn symbols() {
        assert_eq!(show("[:abc.length, :abc.upcase, :a <=> :b, :abc.to_s]"), "[3, :ABC, -1, \"abc\"]");
    }
}

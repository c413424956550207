//! Recursive-descent parser for exercise scripts.
//!
//! Like Ruby, the parser decides between "local variable" and "method call"
//! for a bare identifier by whether the name has been assigned earlier. The
//! set of known locals is threaded through consecutive fragments, so a goal
//! sees the variables its context and candidate introduced.

use std::collections::HashSet;
use std::mem;
use std::rc::Rc;

use super::ast::{Block, Body, Call, Expr, InterpPart, MethodDef, Param, Rescue, Target};
use super::error::{EvalError, EvalResult};
use super::lexer::{tokenize, Kw, Punct, StrPiece, Tok, Token};

/// Maximum syntactic nesting depth.
pub const MAX_PARSE_DEPTH: usize = 256;

/// Parse one fragment.
///
/// `locals` holds the local variable names visible when the fragment starts
/// and receives the names it introduces.
pub fn parse(src: &str, locals: &mut HashSet<String>) -> EvalResult<Body> {
    parse_at(src, 1, 0, locals)
}

fn parse_at(
    src: &str,
    line: usize,
    depth: usize,
    locals: &mut HashSet<String>,
) -> EvalResult<Body> {
    let tokens = tokenize(src, line)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth,
        no_do: false,
        locals: mem::take(locals),
    };
    let result = parser.program();
    *locals = parser.locals;
    result
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Set while parsing `while` conditions and command arguments, where a
    /// `do` belongs to the enclosing construct.
    no_do: bool,
    locals: HashSet<String>,
}

impl Parser {
    // ---- token helpers -------------------------------------------------

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_token(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_next(&self) -> &Tok {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, p: Punct) -> bool {
        matches!(self.peek(), Tok::P(q) if *q == p)
    }

    fn at_kw(&self, kw: Kw) -> bool {
        matches!(self.peek(), Tok::Kw(k) if *k == kw)
    }

    fn eat(&mut self, p: Punct) -> bool {
        if self.at(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        if self.at_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: Punct, what: &str) -> EvalResult<()> {
        if self.eat(p) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_kw(&mut self, kw: Kw) -> EvalResult<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{}'", kw.as_str())))
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Tok::Newline) {
            self.advance();
        }
    }

    fn error(&self, message: impl Into<String>) -> EvalError {
        EvalError::syntax(self.line(), message)
    }

    fn unexpected(&self, expected: &str) -> EvalError {
        let found = match self.peek() {
            Tok::Eof => "end-of-input".to_string(),
            Tok::Newline => "end-of-line".to_string(),
            other => format!("{other:?}"),
        };
        self.error(format!("unexpected {found}, expecting {expected}"))
    }

    fn enter(&mut self) -> EvalResult<()> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Run `f` with `no_do` temporarily set to `value`.
    fn with_no_do<T>(&mut self, value: bool, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = mem::replace(&mut self.no_do, value);
        let result = f(self);
        self.no_do = saved;
        result
    }

    // ---- statements ----------------------------------------------------

    fn program(&mut self) -> EvalResult<Body> {
        let body = self.statements()?;
        if !matches!(self.peek(), Tok::Eof) {
            return Err(self.unexpected("end-of-input"));
        }
        Ok(body)
    }

    fn at_body_end(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Eof
                | Tok::P(Punct::RBrace | Punct::RParen)
                | Tok::Kw(Kw::End | Kw::Else | Kw::Elsif | Kw::When | Kw::Rescue | Kw::Ensure | Kw::In)
        )
    }

    fn statements(&mut self) -> EvalResult<Body> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_body_end() {
                return Ok(body);
            }
            body.push(self.statement()?);
            if !matches!(self.peek(), Tok::Newline) && !self.at_body_end() {
                return Err(self.unexpected("end-of-line"));
            }
        }
    }

    fn statement(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let mut expr = self.expression_statement()?;
        loop {
            if self.eat_kw(Kw::If) {
                let cond = self.expression_statement()?;
                expr = Expr::If {
                    cond: Box::new(cond),
                    then: vec![expr],
                    otherwise: Vec::new(),
                };
            } else if self.eat_kw(Kw::Unless) {
                let cond = self.expression_statement()?;
                expr = Expr::If {
                    cond: Box::new(cond),
                    then: Vec::new(),
                    otherwise: vec![expr],
                };
            } else if self.at_kw(Kw::While) || self.at_kw(Kw::Until) {
                let negate = self.at_kw(Kw::Until);
                self.advance();
                let cond = self.expression_statement()?;
                expr = Expr::While {
                    cond: Box::new(cond),
                    body: vec![expr],
                    negate,
                };
            } else if self.eat_kw(Kw::Rescue) {
                let fallback = self.expression_statement()?;
                expr = Expr::Begin {
                    body: vec![expr],
                    rescues: vec![Rescue {
                        classes: Vec::new(),
                        binding: None,
                        body: vec![fallback],
                    }],
                    otherwise: None,
                    ensure: None,
                };
            } else {
                break;
            }
        }
        self.leave();
        Ok(expr)
    }

    /// `and` / `or` chains (lowest precedence).
    fn expression_statement(&mut self) -> EvalResult<Expr> {
        let mut left = self.not_expr()?;
        loop {
            if self.eat_kw(Kw::And) {
                self.skip_newlines();
                let right = self.not_expr()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else if self.eat_kw(Kw::Or) {
                self.skip_newlines();
                let right = self.not_expr()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn not_expr(&mut self) -> EvalResult<Expr> {
        if self.eat_kw(Kw::Not) {
            self.enter()?;
            let inner = self.not_expr()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.assignment()
    }

    fn assignment(&mut self) -> EvalResult<Expr> {
        self.assignment_with(true)
    }

    /// Assignment, or a plain expression. With `multiple` unset a trailing
    /// comma is left for the caller, as in the right-hand side `a, b = b, a`.
    fn assignment_with(&mut self, multiple: bool) -> EvalResult<Expr> {
        let lhs = self.ternary()?;
        match self.peek().clone() {
            Tok::P(Punct::Comma) if multiple => {
                // `a, b = b, a`
                let mut targets = vec![self.target(lhs)?];
                while self.eat(Punct::Comma) {
                    let next = self.ternary()?;
                    targets.push(self.target(next)?);
                }
                self.expect(Punct::Assign, "'=' for multiple assignment")?;
                self.skip_newlines();
                for target in &targets {
                    self.declare(target);
                }
                let value = self.assignment_value()?;
                Ok(Expr::MultiAssign {
                    targets,
                    value: Box::new(value),
                })
            }
            Tok::P(Punct::Assign) => {
                self.advance();
                self.skip_newlines();
                let target = self.target(lhs)?;
                self.declare(&target);
                let value = self.assignment_value()?;
                Ok(Expr::Assign {
                    target,
                    value: Box::new(value),
                })
            }
            Tok::P(Punct::OpAssign(op)) => {
                self.advance();
                self.skip_newlines();
                let target = self.target(lhs)?;
                self.declare(&target);
                let value = self.assignment_value()?;
                Ok(Expr::OpAssign {
                    target,
                    op,
                    value: Box::new(value),
                })
            }
            _ => Ok(lhs),
        }
    }

    /// Right-hand side of an assignment; `a = 1, 2` builds an array.
    fn assignment_value(&mut self) -> EvalResult<Expr> {
        let first = if self.at_kw(Kw::Not) {
            self.not_expr()?
        } else {
            self.assignment_with(false)?
        };
        if !self.at(Punct::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(Punct::Comma) {
            self.skip_newlines();
            items.push(self.ternary()?);
        }
        Ok(Expr::Array(items))
    }

    fn target(&self, expr: Expr) -> EvalResult<Target> {
        Ok(match expr {
            Expr::Ident(name) => Target::Local(name),
            Expr::Ivar(name) => Target::Ivar(name),
            Expr::Gvar(name) => Target::Gvar(name),
            Expr::Const(mut path) if path.len() == 1 => Target::Const(path.remove(0)),
            Expr::Call(call) => match *call {
                Call {
                    receiver: Some(receiver),
                    method,
                    args,
                    block: None,
                    ..
                } if method == "[]" => Target::Index {
                    receiver: Box::new(receiver),
                    args,
                },
                Call {
                    receiver: Some(receiver),
                    method,
                    args,
                    block: None,
                    ..
                } if args.is_empty() && is_identifier(&method) => Target::Attr {
                    receiver: Box::new(receiver),
                    name: method,
                },
                Call {
                    receiver: None,
                    method,
                    args,
                    block: None,
                    ..
                } if args.is_empty() && is_identifier(&method) => Target::Local(method),
                _ => return Err(self.error("cannot assign to a method call")),
            },
            _ => return Err(self.error("cannot assign to this expression")),
        })
    }

    fn declare(&mut self, target: &Target) {
        if let Target::Local(name) = target {
            self.locals.insert(name.clone());
        }
    }

    // ---- operators -----------------------------------------------------

    fn ternary(&mut self) -> EvalResult<Expr> {
        let cond = self.range()?;
        if !self.eat(Punct::Question) {
            return Ok(cond);
        }
        self.enter()?;
        self.skip_newlines();
        let then = self.ternary()?;
        self.skip_newlines();
        self.ternary_colon()?;
        self.skip_newlines();
        let otherwise = self.ternary()?;
        self.leave();
        Ok(Expr::If {
            cond: Box::new(cond),
            then: vec![then],
            otherwise: vec![otherwise],
        })
    }

    fn ternary_colon(&mut self) -> EvalResult<()> {
        match self.peek().clone() {
            Tok::P(Punct::Colon) => {
                self.advance();
                Ok(())
            }
            // `a ? b :c` lexes the else-branch as a symbol
            Tok::Sym(name) if is_identifier(&name) => {
                let tok = if name.chars().next().is_some_and(char::is_uppercase) {
                    Tok::Const(name)
                } else {
                    Tok::Ident(name)
                };
                self.tokens[self.pos].tok = tok;
                Ok(())
            }
            _ => Err(self.unexpected("':' in ternary")),
        }
    }

    fn range(&mut self) -> EvalResult<Expr> {
        let start = self.oror()?;
        let exclusive = if self.eat(Punct::DotDot) {
            false
        } else if self.eat(Punct::DotDotDot) {
            true
        } else {
            return Ok(start);
        };
        let end = self.oror()?;
        Ok(Expr::Range {
            start: Box::new(start),
            end: Box::new(end),
            exclusive,
        })
    }

    fn oror(&mut self) -> EvalResult<Expr> {
        let mut left = self.andand()?;
        while self.eat(Punct::OrOr) {
            self.skip_newlines();
            let right = self.andand()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn andand(&mut self) -> EvalResult<Expr> {
        let mut left = self.equality()?;
        while self.eat(Punct::AndAnd) {
            self.skip_newlines();
            let right = self.equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> EvalResult<Expr> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Tok::P(Punct::EqEq) => "==",
                Tok::P(Punct::NotEq) => "!=",
                Tok::P(Punct::CaseEq) => "===",
                Tok::P(Punct::Cmp) => "<=>",
                Tok::P(Punct::Match | Punct::NotMatch) => {
                    return Err(self.error("regular expressions are not supported"));
                }
                _ => return Ok(left),
            };
            self.advance();
            self.skip_newlines();
            let right = self.comparison()?;
            left = if op == "!=" {
                Expr::Not(Box::new(Expr::call(Some(left), "==", vec![right])))
            } else {
                Expr::call(Some(left), op, vec![right])
            };
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(Punct, &'static str)],
        next: fn(&mut Self) -> EvalResult<Expr>,
    ) -> EvalResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (punct, name) in ops {
                if self.at(*punct) {
                    self.advance();
                    self.skip_newlines();
                    let right = next(self)?;
                    left = Expr::call(Some(left), *name, vec![right]);
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn comparison(&mut self) -> EvalResult<Expr> {
        self.binary_level(
            &[
                (Punct::Le, "<="),
                (Punct::Ge, ">="),
                (Punct::Lt, "<"),
                (Punct::Gt, ">"),
            ],
            Self::bitor,
        )
    }

    fn bitor(&mut self) -> EvalResult<Expr> {
        self.binary_level(&[(Punct::Pipe, "|"), (Punct::Caret, "^")], Self::bitand)
    }

    fn bitand(&mut self) -> EvalResult<Expr> {
        self.binary_level(&[(Punct::Amp, "&")], Self::shift)
    }

    fn shift(&mut self) -> EvalResult<Expr> {
        self.binary_level(&[(Punct::Shl, "<<"), (Punct::Shr, ">>")], Self::additive)
    }

    fn additive(&mut self) -> EvalResult<Expr> {
        self.binary_level(&[(Punct::Plus, "+"), (Punct::Minus, "-")], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> EvalResult<Expr> {
        self.binary_level(
            &[
                (Punct::Star, "*"),
                (Punct::Slash, "/"),
                (Punct::Percent, "%"),
            ],
            Self::unary_minus,
        )
    }

    fn unary_minus(&mut self) -> EvalResult<Expr> {
        if self.eat(Punct::Minus) {
            self.enter()?;
            let operand = self.unary_minus()?;
            self.leave();
            return Ok(Expr::call(Some(operand), "-@", Vec::new()));
        }
        self.pow()
    }

    fn pow(&mut self) -> EvalResult<Expr> {
        // `-2 ** 2` is `-(2 ** 2)`
        let negative_literal = match self.peek() {
            Tok::Int(n) if *n < 0 => n.checked_neg().map(Expr::Int),
            Tok::Float(f) if *f < 0.0 => Some(Expr::Float(-f)),
            _ => None,
        };
        if let Some(magnitude) = negative_literal {
            if matches!(self.peek_next(), Tok::P(Punct::Pow)) {
                self.advance();
                self.advance();
                self.enter()?;
                let exponent = self.unary_minus()?;
                self.leave();
                let power = Expr::call(Some(magnitude), "**", vec![exponent]);
                return Ok(Expr::call(Some(power), "-@", Vec::new()));
            }
        }

        let base = self.unary()?;
        if self.eat(Punct::Pow) {
            self.skip_newlines();
            self.enter()?;
            let exponent = self.unary_minus()?;
            self.leave();
            return Ok(Expr::call(Some(base), "**", vec![exponent]));
        }
        Ok(base)
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let result = if self.eat(Punct::Bang) {
            self.unary().map(|e| Expr::Not(Box::new(e)))
        } else if self.eat(Punct::Tilde) {
            self.unary().map(|e| Expr::call(Some(e), "~", Vec::new()))
        } else if self.eat(Punct::Plus) {
            self.unary()
        } else if self.eat(Punct::Amp) {
            Err(self.error("block arguments are only allowed in argument lists"))
        } else {
            self.postfix()
        };
        self.leave();
        result
    }

    // ---- calls ---------------------------------------------------------

    fn postfix(&mut self) -> EvalResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.at(Punct::Dot) || self.at(Punct::SafeNav) {
                let safe_nav = self.at(Punct::SafeNav);
                self.advance();
                self.skip_newlines();
                let name = self.method_name()?;
                expr = self.call_rest(Some(expr), name, safe_nav)?;
            } else if self.at(Punct::ColonColon) {
                self.advance();
                match self.advance().tok {
                    Tok::Const(name) if !self.at(Punct::LParen) => match &mut expr {
                        Expr::Const(path) => path.push(name),
                        _ => return Err(self.error("constant lookup on a non-constant")),
                    },
                    Tok::Const(name) | Tok::Ident(name) => {
                        expr = self.call_rest(Some(expr), name, false)?;
                    }
                    _ => return Err(self.unexpected("constant name after '::'")),
                }
            } else if self.at(Punct::LBracket) && (!self.peek_token().spaced || self.is_local(&expr)) {
                self.advance();
                let args = self.with_no_do(false, |p| p.list_until(Punct::RBracket))?;
                expr = Expr::call(Some(expr), "[]", args);
            } else {
                return Ok(expr);
            }
        }
    }

    /// `x [0]` indexes a local but passes an array to a method.
    fn is_local(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Ident(name) if self.locals.contains(name))
    }

    fn method_name(&mut self) -> EvalResult<String> {
        let token = self.advance();
        match token.tok {
            Tok::Ident(name) | Tok::Const(name) => Ok(name),
            Tok::Kw(kw) => Ok(kw.as_str().to_string()),
            Tok::P(Punct::LParen) => {
                // `callable.(args)`
                Err(self.error("implicit `call' is not supported"))
            }
            _ => Err(EvalError::syntax(token.line, "expected method name")),
        }
    }

    /// Arguments and block following a method name.
    fn call_rest(&mut self, receiver: Option<Expr>, method: String, safe_nav: bool) -> EvalResult<Expr> {
        let mut args = Vec::new();
        let mut block = None;
        if self.at(Punct::LParen) && !self.peek_token().spaced {
            self.advance();
            let (list, block_pass) = self.with_no_do(false, |p| p.arguments(Punct::RParen))?;
            args = list;
            block = block_pass;
        } else if self.command_arg_follows() {
            let (list, block_pass) = self.with_no_do(true, Self::command_arguments)?;
            args = list;
            block = block_pass;
        }
        if block.is_none() {
            block = self.block()?;
        }
        // Setter-style `recv.attr = value` is parsed by `assignment`
        Ok(Expr::Call(Box::new(Call {
            receiver,
            method,
            args,
            block,
            safe_nav,
        })))
    }

    /// Whether the current token starts an argument of a parenthesis-free
    /// call such as `puts x` or `arr.push 1`.
    fn command_arg_follows(&self) -> bool {
        let token = self.peek_token();
        if !token.spaced {
            return false;
        }
        let next_glued = !self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].spaced;
        match &token.tok {
            Tok::Int(_)
            | Tok::Float(_)
            | Tok::Str(_)
            | Tok::Interp(_)
            | Tok::Sym(_)
            | Tok::Words(_)
            | Tok::Backtick(_)
            | Tok::Ident(_)
            | Tok::Const(_)
            | Tok::Label(_)
            | Tok::Ivar(_)
            | Tok::Gvar(_)
            | Tok::Kw(Kw::Nil | Kw::True | Kw::False | Kw::SelfKw | Kw::Not | Kw::Defined) => true,
            Tok::P(Punct::LBracket | Punct::Bang | Punct::Minus | Punct::Amp | Punct::ColonColon) => {
                next_glued
            }
            _ => false,
        }
    }

    fn command_arguments(&mut self) -> EvalResult<(Vec<Expr>, Option<Rc<Block>>)> {
        let mut args = Vec::new();
        let mut pairs = Vec::new();
        loop {
            if let Some(block) = self.block_pass()? {
                return Ok((finish_args(args, pairs), Some(block)));
            }
            self.argument(&mut args, &mut pairs)?;
            if !self.eat(Punct::Comma) {
                return Ok((finish_args(args, pairs), None));
            }
            self.skip_newlines();
        }
    }

    /// Parenthesized argument list; the opening token is consumed.
    fn arguments(&mut self, close: Punct) -> EvalResult<(Vec<Expr>, Option<Rc<Block>>)> {
        let mut args = Vec::new();
        let mut pairs = Vec::new();
        let mut block = None;
        loop {
            self.skip_newlines();
            if self.eat(close) {
                break;
            }
            if let Some(pass) = self.block_pass()? {
                block = Some(pass);
                self.skip_newlines();
                self.expect(close, "')' after block argument")?;
                break;
            }
            self.argument(&mut args, &mut pairs)?;
            self.skip_newlines();
            if !self.eat(Punct::Comma) {
                self.expect(close, "',' or ')'")?;
                break;
            }
        }
        Ok((finish_args(args, pairs), block))
    }

    /// One argument; `key: value` and `key => value` pairs are gathered into
    /// a trailing hash.
    fn argument(&mut self, args: &mut Vec<Expr>, pairs: &mut Vec<(Expr, Expr)>) -> EvalResult<()> {
        if let Tok::Label(name) = self.peek().clone() {
            self.advance();
            self.skip_newlines();
            let value = self.ternary()?;
            pairs.push((Expr::Sym(name), value));
            return Ok(());
        }
        if self.at(Punct::Star) {
            return Err(self.error("splat arguments are not supported"));
        }
        let value = self.ternary()?;
        if self.eat(Punct::Arrow) {
            self.skip_newlines();
            let mapped = self.ternary()?;
            pairs.push((value, mapped));
        } else if pairs.is_empty() {
            args.push(value);
        } else {
            return Err(self.error("positional argument after keyword argument"));
        }
        Ok(())
    }

    /// `&:name` block argument, desugared to `{ |x| x.name }`.
    fn block_pass(&mut self) -> EvalResult<Option<Rc<Block>>> {
        if !self.at(Punct::Amp) {
            return Ok(None);
        }
        self.advance();
        match self.advance().tok {
            Tok::Sym(name) => {
                let param = "it".to_string();
                Ok(Some(Rc::new(Block {
                    params: vec![param.clone()],
                    body: vec![Expr::call(Some(Expr::Ident(param)), name, Vec::new())],
                })))
            }
            _ => Err(self.error("only symbols can be passed as block arguments")),
        }
    }

    /// Comma-separated expressions up to `close`.
    fn list_until(&mut self, close: Punct) -> EvalResult<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(close) {
                return Ok(items);
            }
            if self.at(Punct::Star) {
                return Err(self.error("splat is not supported"));
            }
            items.push(self.ternary()?);
            self.skip_newlines();
            if !self.eat(Punct::Comma) {
                self.skip_newlines();
                self.expect(close, "',' or closing bracket")?;
                return Ok(items);
            }
        }
    }

    fn block(&mut self) -> EvalResult<Option<Rc<Block>>> {
        let close_kw = if self.at(Punct::LBrace) {
            false
        } else if self.at_kw(Kw::Do) && !self.no_do {
            true
        } else {
            return Ok(None);
        };
        self.advance();
        self.enter()?;
        let params = self.block_params()?;
        let body = self.with_no_do(false, Self::statements)?;
        if close_kw {
            self.expect_kw(Kw::End)?;
        } else {
            self.skip_newlines();
            self.expect(Punct::RBrace, "'}'")?;
        }
        self.leave();
        Ok(Some(Rc::new(Block { params, body })))
    }

    fn block_params(&mut self) -> EvalResult<Vec<String>> {
        self.skip_newlines();
        if self.eat(Punct::OrOr) {
            return Ok(Vec::new());
        }
        if !self.eat(Punct::Pipe) {
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        loop {
            match self.advance().tok {
                Tok::Ident(name) => {
                    self.locals.insert(name.clone());
                    params.push(name);
                }
                Tok::P(Punct::Pipe) if params.is_empty() => return Ok(params),
                Tok::P(Punct::LParen) => {
                    return Err(self.error("destructuring block parameters are not supported"));
                }
                _ => return Err(self.error("invalid block parameter")),
            }
            if self.eat(Punct::Pipe) {
                return Ok(params);
            }
            self.expect(Punct::Comma, "',' or '|'")?;
        }
    }

    // ---- primaries -----------------------------------------------------

    fn primary(&mut self) -> EvalResult<Expr> {
        let token = self.advance();
        let line = token.line;
        Ok(match token.tok {
            Tok::Int(n) => Expr::Int(n),
            Tok::Float(f) => Expr::Float(f),
            Tok::Str(s) => Expr::Str(s),
            Tok::Interp(pieces) => self.interpolation(pieces)?,
            Tok::Sym(s) => Expr::Sym(s),
            Tok::Words(words) => Expr::Array(words.into_iter().map(Expr::Str).collect()),
            Tok::Backtick(cmd) => Expr::Backtick(cmd),
            Tok::Ident(name) => self.identifier(name)?,
            Tok::Const(name) => {
                if self.at(Punct::LParen) && !self.peek_token().spaced {
                    // Conversion functions such as `Integer("3")`
                    self.call_rest(None, name, false)?
                } else {
                    Expr::Const(vec![name])
                }
            }
            Tok::Ivar(name) => Expr::Ivar(name),
            Tok::Gvar(name) => Expr::Gvar(name),
            Tok::Kw(Kw::Nil) => Expr::Nil,
            Tok::Kw(Kw::True) => Expr::True,
            Tok::Kw(Kw::False) => Expr::False,
            Tok::Kw(Kw::SelfKw) => Expr::SelfRef,
            Tok::Kw(Kw::If) => self.if_rest()?,
            Tok::Kw(Kw::Unless) => self.unless_rest()?,
            Tok::Kw(kw @ (Kw::While | Kw::Until)) => self.while_rest(kw == Kw::Until)?,
            Tok::Kw(Kw::Case) => self.case_rest()?,
            Tok::Kw(Kw::Def) => self.def_rest()?,
            Tok::Kw(Kw::Begin) => self.begin_rest()?,
            Tok::Kw(Kw::For) => self.for_rest()?,
            Tok::Kw(Kw::Not) => {
                let inner = self.expression_statement()?;
                Expr::Not(Box::new(inner))
            }
            Tok::Kw(kw @ (Kw::Return | Kw::Break | Kw::Next)) => {
                let value = self.jump_value()?.map(Box::new);
                match kw {
                    Kw::Return => Expr::Return(value),
                    Kw::Break => Expr::Break(value),
                    _ => Expr::Next(value),
                }
            }
            Tok::Kw(Kw::Yield) => self.yield_rest()?,
            Tok::Kw(Kw::Defined) => {
                let parens = self.eat(Punct::LParen);
                let inner = self.with_no_do(false, Self::expression_statement)?;
                if parens {
                    self.expect(Punct::RParen, "')'")?;
                }
                Expr::Defined(Box::new(inner))
            }
            Tok::Kw(Kw::Class | Kw::Module) => {
                return Err(EvalError::syntax(line, "class and module definitions are not supported"));
            }
            Tok::P(Punct::LParen) => {
                let body = self.with_no_do(false, Self::statements)?;
                self.skip_newlines();
                self.expect(Punct::RParen, "')'")?;
                match body.len() {
                    0 => Expr::Nil,
                    1 => body.into_iter().next().unwrap_or(Expr::Nil),
                    _ => Expr::Seq(body),
                }
            }
            Tok::P(Punct::LBracket) => {
                Expr::Array(self.with_no_do(false, |p| p.list_until(Punct::RBracket))?)
            }
            Tok::P(Punct::LBrace) => self.with_no_do(false, Self::hash_rest)?,
            Tok::P(Punct::ColonColon) => match self.advance().tok {
                Tok::Const(name) => Expr::Const(vec![name]),
                _ => return Err(EvalError::syntax(line, "expected constant after '::'")),
            },
            Tok::P(Punct::Lambda) => {
                return Err(EvalError::syntax(line, "lambdas are not supported"));
            }
            Tok::Eof => return Err(EvalError::syntax(line, "unexpected end-of-input")),
            Tok::Newline => return Err(EvalError::syntax(line, "unexpected end-of-line")),
            other => return Err(EvalError::syntax(line, format!("unexpected {other:?}"))),
        })
    }

    fn identifier(&mut self, name: String) -> EvalResult<Expr> {
        let paren_call = self.at(Punct::LParen) && !self.peek_token().spaced;
        if self.locals.contains(&name) && !paren_call {
            return Ok(Expr::Ident(name));
        }
        if paren_call
            || self.command_arg_follows()
            || self.at(Punct::LBrace)
            || (self.at_kw(Kw::Do) && !self.no_do)
        {
            return self.call_rest(None, name, false);
        }
        Ok(Expr::Ident(name))
    }

    fn interpolation(&mut self, pieces: Vec<StrPiece>) -> EvalResult<Expr> {
        let mut parts = Vec::with_capacity(pieces.len());
        for piece in pieces {
            match piece {
                StrPiece::Lit(s) => parts.push(InterpPart::Lit(s)),
                StrPiece::Code(code, line) => {
                    let body = parse_at(&code, line, self.depth + 1, &mut self.locals)?;
                    parts.push(InterpPart::Code(body));
                }
            }
        }
        Ok(Expr::Interp(parts))
    }

    fn hash_rest(&mut self) -> EvalResult<Expr> {
        let mut pairs = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(Punct::RBrace) {
                return Ok(Expr::Hash(pairs));
            }
            let key = if let Tok::Label(name) = self.peek().clone() {
                self.advance();
                Expr::Sym(name)
            } else {
                let key = self.ternary()?;
                self.skip_newlines();
                self.expect(Punct::Arrow, "'=>' in hash literal")?;
                key
            };
            self.skip_newlines();
            let value = self.ternary()?;
            pairs.push((key, value));
            self.skip_newlines();
            if !self.eat(Punct::Comma) {
                self.skip_newlines();
                self.expect(Punct::RBrace, "',' or '}'")?;
                return Ok(Expr::Hash(pairs));
            }
        }
    }

    fn condition(&mut self) -> EvalResult<Expr> {
        self.with_no_do(true, Self::expression_statement)
    }

    fn if_rest(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let cond = self.condition()?;
        self.eat_kw(Kw::Then);
        let then = self.statements()?;
        let otherwise = if self.eat_kw(Kw::Elsif) {
            vec![self.if_rest()?]
        } else if self.eat_kw(Kw::Else) {
            let body = self.statements()?;
            self.expect_kw(Kw::End)?;
            body
        } else {
            self.expect_kw(Kw::End)?;
            Vec::new()
        };
        self.leave();
        Ok(Expr::If {
            cond: Box::new(cond),
            then,
            otherwise,
        })
    }

    fn unless_rest(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let cond = self.condition()?;
        self.eat_kw(Kw::Then);
        let body = self.statements()?;
        let otherwise = if self.eat_kw(Kw::Else) {
            self.statements()?
        } else {
            Vec::new()
        };
        self.expect_kw(Kw::End)?;
        self.leave();
        Ok(Expr::If {
            cond: Box::new(cond),
            then: otherwise,
            otherwise: body,
        })
    }

    fn while_rest(&mut self, negate: bool) -> EvalResult<Expr> {
        self.enter()?;
        let cond = self.condition()?;
        self.eat_kw(Kw::Do);
        let body = self.statements()?;
        self.expect_kw(Kw::End)?;
        self.leave();
        Ok(Expr::While {
            cond: Box::new(cond),
            body,
            negate,
        })
    }

    fn for_rest(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let var = match self.advance().tok {
            Tok::Ident(name) => name,
            _ => return Err(self.error("expected loop variable after `for'")),
        };
        self.locals.insert(var.clone());
        self.expect_kw(Kw::In)?;
        let iterable = self.condition()?;
        self.eat_kw(Kw::Do);
        let body = self.statements()?;
        self.expect_kw(Kw::End)?;
        self.leave();
        Ok(Expr::Call(Box::new(Call {
            receiver: Some(iterable),
            method: "each".into(),
            args: Vec::new(),
            block: Some(Rc::new(Block {
                params: vec![var],
                body,
            })),
            safe_nav: false,
        })))
    }

    fn case_rest(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let subject = if matches!(self.peek(), Tok::Newline) {
            None
        } else {
            Some(Box::new(self.expression_statement()?))
        };
        self.skip_newlines();
        let mut arms = Vec::new();
        while self.eat_kw(Kw::When) {
            let mut patterns = vec![self.ternary()?];
            while self.eat(Punct::Comma) {
                self.skip_newlines();
                patterns.push(self.ternary()?);
            }
            self.eat_kw(Kw::Then);
            let body = self.statements()?;
            arms.push((patterns, body));
        }
        if self.at_kw(Kw::In) {
            return Err(self.error("pattern matching is not supported"));
        }
        if arms.is_empty() {
            return Err(self.unexpected("`when'"));
        }
        let otherwise = if self.eat_kw(Kw::Else) {
            Some(self.statements()?)
        } else {
            None
        };
        self.expect_kw(Kw::End)?;
        self.leave();
        Ok(Expr::Case {
            subject,
            arms,
            otherwise,
        })
    }

    fn def_rest(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let name = match self.advance().tok {
            Tok::Ident(name) | Tok::Const(name) => name,
            Tok::Kw(Kw::SelfKw) => {
                return Err(self.error("singleton methods are not supported"));
            }
            Tok::Kw(kw) => kw.as_str().to_string(),
            _ => return Err(self.error("expected method name after `def'")),
        };
        if self.at(Punct::Assign) {
            return Err(self.error("setter and endless methods are not supported"));
        }

        let outer_locals = mem::take(&mut self.locals);
        let result = self.def_signature_and_body(name);
        self.locals = outer_locals;
        self.leave();
        result
    }

    fn def_signature_and_body(&mut self, name: String) -> EvalResult<Expr> {
        let mut params = Vec::new();
        let parens = self.eat(Punct::LParen);
        if parens || matches!(self.peek(), Tok::Ident(_)) {
            loop {
                if parens && self.eat(Punct::RParen) {
                    break;
                }
                let param = match self.advance().tok {
                    Tok::Ident(param) => param,
                    Tok::P(Punct::Star | Punct::Amp | Punct::Pow) | Tok::Label(_) => {
                        return Err(self.error("only positional parameters are supported"));
                    }
                    _ => return Err(self.error("invalid method parameter")),
                };
                let default = if self.eat(Punct::Assign) {
                    Some(self.ternary()?)
                } else {
                    None
                };
                self.locals.insert(param.clone());
                params.push(Param {
                    name: param,
                    default,
                });
                if self.eat(Punct::Comma) {
                    continue;
                }
                if parens {
                    self.expect(Punct::RParen, "')' after parameters")?;
                }
                break;
            }
        }

        let body = self.protected_body()?;
        self.expect_kw(Kw::End)?;
        Ok(Expr::Def(Rc::new(MethodDef { name, params, body })))
    }

    fn begin_rest(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let body = self.protected_body()?;
        self.expect_kw(Kw::End)?;
        self.leave();
        Ok(match <[Expr; 1]>::try_from(body) {
            Ok([single]) => single,
            Err(body) => Expr::Seq(body),
        })
    }

    /// Statements optionally followed by `rescue` / `else` / `ensure`
    /// clauses, stopping before the closing `end`.
    fn protected_body(&mut self) -> EvalResult<Body> {
        let body = self.statements()?;
        let mut rescues = Vec::new();
        while self.eat_kw(Kw::Rescue) {
            let mut classes = Vec::new();
            while let Tok::Const(name) = self.peek().clone() {
                self.advance();
                classes.push(name);
                if !self.eat(Punct::Comma) {
                    break;
                }
            }
            let binding = if self.eat(Punct::Arrow) {
                match self.advance().tok {
                    Tok::Ident(name) => {
                        self.locals.insert(name.clone());
                        Some(name)
                    }
                    _ => return Err(self.error("expected variable name after '=>'")),
                }
            } else {
                None
            };
            self.eat_kw(Kw::Then);
            let body = self.statements()?;
            rescues.push(Rescue {
                classes,
                binding,
                body,
            });
        }
        let otherwise = if !rescues.is_empty() && self.eat_kw(Kw::Else) {
            Some(self.statements()?)
        } else {
            None
        };
        let ensure = if self.eat_kw(Kw::Ensure) {
            Some(self.statements()?)
        } else {
            None
        };
        if rescues.is_empty() && ensure.is_none() {
            return Ok(body);
        }
        Ok(vec![Expr::Begin {
            body,
            rescues,
            otherwise,
            ensure,
        }])
    }

    fn jump_value(&mut self) -> EvalResult<Option<Expr>> {
        let ends = matches!(
            self.peek(),
            Tok::Newline
                | Tok::Eof
                | Tok::P(Punct::RBrace | Punct::RParen | Punct::RBracket | Punct::Colon)
                | Tok::Kw(
                    Kw::End
                        | Kw::If
                        | Kw::Unless
                        | Kw::While
                        | Kw::Until
                        | Kw::And
                        | Kw::Or
                        | Kw::Else
                        | Kw::Elsif
                        | Kw::When
                        | Kw::Rescue
                        | Kw::Ensure
                        | Kw::Then
                )
        );
        if ends {
            return Ok(None);
        }
        let first = self.ternary()?;
        if !self.at(Punct::Comma) {
            return Ok(Some(first));
        }
        let mut items = vec![first];
        while self.eat(Punct::Comma) {
            self.skip_newlines();
            items.push(self.ternary()?);
        }
        Ok(Some(Expr::Array(items)))
    }

    fn yield_rest(&mut self) -> EvalResult<Expr> {
        if self.at(Punct::LParen) && !self.peek_token().spaced {
            self.advance();
            let (args, block) = self.with_no_do(false, |p| p.arguments(Punct::RParen))?;
            if block.is_some() {
                return Err(self.error("yield cannot take a block"));
            }
            return Ok(Expr::Yield(args));
        }
        if self.command_arg_follows() {
            let (args, _) = self.with_no_do(true, Self::command_arguments)?;
            return Ok(Expr::Yield(args));
        }
        Ok(Expr::Yield(Vec::new()))
    }
}

fn finish_args(mut args: Vec<Expr>, pairs: Vec<(Expr, Expr)>) -> Vec<Expr> {
    if !pairs.is_empty() {
        args.push(Expr::Hash(pairs));
    }
    args
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Expr {
        let mut locals = HashSet::new();
        let mut body = parse(src, &mut locals).unwrap();
        assert_eq!(body.len(), 1, "expected one statement in {src:?}");
        body.remove(0)
    }

    fn parse_err(src: &str) -> EvalError {
        parse(src, &mut HashSet::new()).unwrap_err()
    }

    #[test]
    fn assignment_declares_local() {
        let mut locals = HashSet::new();
        let body = parse("a = 1; b = 2", &mut locals).unwrap();
        assert_eq!(body.len(), 2);
        assert!(locals.contains("a"));
        assert!(locals.contains("b"));
    }

    #[test]
    fn binary_operators_become_method_calls() {
        assert_eq!(
            parse_one("c == a + b"),
            Expr::call(
                Some(Expr::Ident("c".into())),
                "==",
                vec![Expr::call(
                    Some(Expr::Ident("a".into())),
                    "+",
                    vec![Expr::Ident("b".into())]
                )]
            )
        );
    }

    #[test]
    fn precedence() {
        let expr = parse_one("1 + 2 * 3 ** 2");
        let Expr::Call(call) = expr else {
            panic!("expected call");
        };
        assert_eq!(call.method, "+");
        let Expr::Call(rhs) = &call.args[0] else {
            panic!("expected call");
        };
        assert_eq!(rhs.method, "*");
    }

    #[test]
    fn negative_literal_power() {
        let Expr::Call(call) = parse_one("-2 ** 2") else {
            panic!("expected call");
        };
        assert_eq!(call.method, "-@");
    }

    #[test]
    fn multiple_assignment() {
        let expr = parse_one("a, b = b, a");
        let Expr::MultiAssign { targets, value } = expr else {
            panic!("expected multiple assignment");
        };
        assert_eq!(targets.len(), 2);
        assert!(matches!(*value, Expr::Array(ref items) if items.len() == 2));
    }

    #[test]
    fn multiple_assignment_of_fresh_names() {
        let mut locals = HashSet::new();
        let body = parse("a, b = 1, 2", &mut locals).unwrap();
        let [Expr::MultiAssign { targets, value }] = body.as_slice() else {
            panic!("expected multiple assignment");
        };
        assert!(matches!(targets.as_slice(), [Target::Local(a), Target::Local(b)] if a == "a" && b == "b"));
        assert!(matches!(**value, Expr::Array(ref items) if items.len() == 2));
        assert!(locals.contains("a") && locals.contains("b"));

        let Expr::MultiAssign { value, .. } = parse_one("a, b = [1, 2]") else {
            panic!("expected multiple assignment");
        };
        assert!(matches!(*value, Expr::Array(ref items) if items.len() == 2));
    }

    #[test]
    fn command_call_versus_local() {
        let mut locals = HashSet::new();
        let body = parse("puts [1]\na = [1]\na [0]", &mut locals).unwrap();
        let Expr::Call(puts) = &body[0] else {
            panic!("expected call");
        };
        assert_eq!(puts.method, "puts");
        assert_eq!(puts.args.len(), 1);
        let Expr::Call(index) = &body[2] else {
            panic!("expected index call");
        };
        assert_eq!(index.method, "[]");
    }

    #[test]
    fn locals_carry_across_fragments() {
        let mut locals = HashSet::new();
        parse("a = 1", &mut locals).unwrap();
        let body = parse("a [0]", &mut locals).unwrap();
        assert!(matches!(&body[0], Expr::Call(c) if c.method == "[]"));
    }

    #[test]
    fn blocks() {
        let Expr::Call(call) = parse_one("[1, 2].map { |x| x * 2 }") else {
            panic!("expected call");
        };
        let block = call.block.as_ref().unwrap();
        assert_eq!(block.params, vec!["x".to_string()]);

        let Expr::Call(call) = parse_one("3.times do |i|\n  i\nend") else {
            panic!("expected call");
        };
        assert!(call.block.is_some());
    }

    #[test]
    fn symbol_block_pass() {
        let Expr::Call(call) = parse_one("words.map(&:upcase)") else {
            panic!("expected call");
        };
        assert!(call.block.is_some());
        assert!(call.args.is_empty());
    }

    #[test]
    fn while_do_is_not_a_block() {
        let expr = parse_one("while x.positive? do\n x -= 1\nend");
        assert!(matches!(expr, Expr::While { .. }));
    }

    #[test]
    fn modifiers() {
        assert!(matches!(parse_one("a = 1 if b"), Expr::If { .. }));
        assert!(matches!(parse_one("a += 1 while a < 3"), Expr::While { .. }));
    }

    #[test]
    fn hash_literals() {
        let Expr::Hash(pairs) = parse_one("{ :a => 1, b: 2 }") else {
            panic!("expected hash");
        };
        assert_eq!(pairs[0].0, Expr::Sym("a".into()));
        assert_eq!(pairs[1].0, Expr::Sym("b".into()));
    }

    #[test]
    fn ternary_with_symbol_looking_branch() {
        let mut locals = HashSet::from(["x".to_string(), "b".to_string(), "c".to_string()]);
        let body = parse("x ? b :c", &mut locals).unwrap();
        assert!(matches!(body[0], Expr::If { .. }));
    }

    #[test]
    fn def_has_its_own_locals() {
        let mut locals = HashSet::new();
        parse("def double(x)\n  x * 2\nend", &mut locals).unwrap();
        assert!(!locals.contains("x"));
    }

    #[test]
    fn begin_rescue() {
        let expr = parse_one("begin\n  1 / 0\nrescue ZeroDivisionError => e\n  0\nend");
        let Expr::Begin { rescues, .. } = expr else {
            panic!("expected begin");
        };
        assert_eq!(rescues[0].classes, vec!["ZeroDivisionError".to_string()]);
        assert_eq!(rescues[0].binding.as_deref(), Some("e"));
    }

    #[test]
    fn interpolation_parses_code() {
        let Expr::Interp(parts) = parse_one("\"sum: #{1 + 2}\"") else {
            panic!("expected interpolation");
        };
        assert!(matches!(parts[1], InterpPart::Code(_)));
    }

    #[test]
    fn dangling_operator_is_a_syntax_error() {
        assert!(matches!(parse_err("true ||"), EvalError::Syntax { .. }));
        assert!(matches!(parse_err("if x"), EvalError::Syntax { .. }));
        assert!(matches!(parse_err("a = (1"), EvalError::Syntax { .. }));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        // Interpreter threads get a large stack; parse on one too.
        let errors = std::thread::Builder::new()
            .stack_size(crate::interpreter::STACK_SIZE)
            .spawn(|| {
                [
                    format!("{}1{}", "(".repeat(2000), ")".repeat(2000)),
                    format!("{}x", "!".repeat(5000)),
                    format!("x = {}1{}", "[".repeat(2000), "]".repeat(2000)),
                ]
                .map(|src| parse_err(&src))
            })
            .unwrap()
            .join()
            .unwrap();
        for err in errors {
            assert!(matches!(err, EvalError::Syntax { .. }), "{err}");
        }
    }

    #[test]
    fn unsupported_constructs() {
        assert!(parse("class Foo; end", &mut HashSet::new()).is_err());
        assert!(parse("f = ->(x) { x }", &mut HashSet::new()).is_err());
    }
}

//! Syntax tree for exercise scripts.

use std::rc::Rc;

pub type Body = Vec<Expr>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    True,
    False,
    SelfRef,
    Int(i64),
    Float(f64),
    Str(String),
    Interp(Vec<InterpPart>),
    Sym(String),
    Array(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        exclusive: bool,
    },

    /// Bare identifier: a local variable or a zero-argument method call.
    Ident(String),
    /// `A` or `A::B`.
    Const(Vec<String>),
    Ivar(String),
    Gvar(String),
    Backtick(String),

    Assign {
        target: Target,
        value: Box<Expr>,
    },
    /// `target op= value`; `||=` and `&&=` short-circuit.
    OpAssign {
        target: Target,
        op: &'static str,
        value: Box<Expr>,
    },
    MultiAssign {
        targets: Vec<Target>,
        value: Box<Expr>,
    },

    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),

    Call(Box<Call>),
    Yield(Vec<Expr>),
    Defined(Box<Expr>),

    If {
        cond: Box<Expr>,
        then: Body,
        otherwise: Body,
    },
    While {
        cond: Box<Expr>,
        body: Body,
        /// `until` loops run while the condition is falsy.
        negate: bool,
    },
    Case {
        subject: Option<Box<Expr>>,
        arms: Vec<(Vec<Expr>, Body)>,
        otherwise: Option<Body>,
    },
    Begin {
        body: Body,
        rescues: Vec<Rescue>,
        otherwise: Option<Body>,
        ensure: Option<Body>,
    },
    Def(Rc<MethodDef>),
    Return(Option<Box<Expr>>),
    Break(Option<Box<Expr>>),
    Next(Option<Box<Expr>>),
    Seq(Body),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub receiver: Option<Expr>,
    pub method: String,
    pub args: Vec<Expr>,
    pub block: Option<Rc<Block>>,
    /// `recv&.method`
    pub safe_nav: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpPart {
    Lit(String),
    Code(Body),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Local(String),
    Index { receiver: Box<Expr>, args: Vec<Expr> },
    Attr { receiver: Box<Expr>, name: String },
    Ivar(String),
    Gvar(String),
    Const(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub params: Vec<String>,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rescue {
    /// Exception class names; empty means `StandardError`.
    pub classes: Vec<String>,
    pub binding: Option<String>,
    pub body: Body,
}

impl Expr {
    pub fn call(receiver: Option<Self>, method: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Call(Box::new(Call {
            receiver,
            method: method.into(),
            args,
            block: None,
            safe_nav: false,
        }))
    }
}

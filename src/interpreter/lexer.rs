//! Tokenizer for exercise scripts.

use super::error::{EvalError, EvalResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float(f64),
    /// String without interpolation.
    Str(String),
    /// Double-quoted string containing `#{...}`.
    Interp(Vec<StrPiece>),
    Sym(String),
    /// `%w[...]`
    Words(Vec<String>),
    Backtick(String),
    Ident(String),
    Const(String),
    /// `name:` inside hash literals and argument lists.
    Label(String),
    Ivar(String),
    Gvar(String),
    Kw(Kw),
    P(Punct),
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrPiece {
    Lit(String),
    /// Raw source of an interpolated expression and the line it starts on.
    Code(String, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kw {
    Nil,
    True,
    False,
    SelfKw,
    And,
    Or,
    Not,
    If,
    Elsif,
    Else,
    Unless,
    While,
    Until,
    End,
    Do,
    Def,
    Return,
    Break,
    Next,
    Case,
    When,
    Then,
    Begin,
    Rescue,
    Ensure,
    Yield,
    For,
    In,
    Class,
    Module,
    Defined,
}

impl Kw {
    fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "nil" => Self::Nil,
            "true" => Self::True,
            "false" => Self::False,
            "self" => Self::SelfKw,
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "if" => Self::If,
            "elsif" => Self::Elsif,
            "else" => Self::Else,
            "unless" => Self::Unless,
            "while" => Self::While,
            "until" => Self::Until,
            "end" => Self::End,
            "do" => Self::Do,
            "def" => Self::Def,
            "return" => Self::Return,
            "break" => Self::Break,
            "next" => Self::Next,
            "case" => Self::Case,
            "when" => Self::When,
            "then" => Self::Then,
            "begin" => Self::Begin,
            "rescue" => Self::Rescue,
            "ensure" => Self::Ensure,
            "yield" => Self::Yield,
            "for" => Self::For,
            "in" => Self::In,
            "class" => Self::Class,
            "module" => Self::Module,
            "defined?" => Self::Defined,
            _ => return None,
        })
    }

    /// Source spelling, used when a keyword appears as a method name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::True => "true",
            Self::False => "false",
            Self::SelfKw => "self",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::If => "if",
            Self::Elsif => "elsif",
            Self::Else => "else",
            Self::Unless => "unless",
            Self::While => "while",
            Self::Until => "until",
            Self::End => "end",
            Self::Do => "do",
            Self::Def => "def",
            Self::Return => "return",
            Self::Break => "break",
            Self::Next => "next",
            Self::Case => "case",
            Self::When => "when",
            Self::Then => "then",
            Self::Begin => "begin",
            Self::Rescue => "rescue",
            Self::Ensure => "ensure",
            Self::Yield => "yield",
            Self::For => "for",
            Self::In => "in",
            Self::Class => "class",
            Self::Module => "module",
            Self::Defined => "defined?",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    SafeNav,
    ColonColon,
    Colon,
    Question,
    Pipe,
    Arrow,
    Lambda,
    Assign,
    /// Compound assignment such as `+=`; holds the operator spelling.
    OpAssign(&'static str),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    EqEq,
    CaseEq,
    NotEq,
    Match,
    NotMatch,
    Lt,
    Le,
    Gt,
    Ge,
    Cmp,
    AndAnd,
    OrOr,
    Bang,
    Tilde,
    Amp,
    Caret,
    Shl,
    Shr,
    DotDot,
    DotDotDot,
}

impl Punct {
    /// Tokens after which a line break does not end the statement.
    const fn continues_line(self) -> bool {
        !matches!(self, Self::RParen | Self::RBracket | Self::RBrace)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    /// Whitespace directly precedes this token.
    pub spaced: bool,
}

/// Split `src` into tokens. The result always ends with [`Tok::Eof`].
pub fn tokenize(src: &str, first_line: usize) -> EvalResult<Vec<Token>> {
    Lexer::new(src, first_line).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    /// Open brackets; line breaks directly inside `(` and `[` are
    /// insignificant, inside `{` they separate block statements.
    brackets: Vec<Punct>,
}

impl Lexer {
    fn new(src: &str, first_line: usize) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: first_line,
            tokens: Vec::new(),
            brackets: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> EvalError {
        EvalError::syntax(self.line, message)
    }

    fn push(&mut self, tok: Tok, spaced: bool, line: usize) {
        self.tokens.push(Token { tok, line, spaced });
    }

    /// Whether the previous token ends an operand, which decides between
    /// binary and unary readings of `-`, `[`, `:` and friends.
    fn after_value(&self) -> bool {
        match self.tokens.last().map(|t| &t.tok) {
            Some(
                Tok::Int(_)
                | Tok::Float(_)
                | Tok::Str(_)
                | Tok::Interp(_)
                | Tok::Sym(_)
                | Tok::Words(_)
                | Tok::Backtick(_)
                | Tok::Ident(_)
                | Tok::Const(_)
                | Tok::Ivar(_)
                | Tok::Gvar(_)
                | Tok::Kw(Kw::Nil | Kw::True | Kw::False | Kw::SelfKw | Kw::End)
                | Tok::P(Punct::RParen | Punct::RBracket | Punct::RBrace),
            ) => true,
            _ => false,
        }
    }

    fn newline(&mut self, line: usize) {
        if matches!(self.brackets.last(), Some(Punct::LParen | Punct::LBracket)) {
            return;
        }
        match self.tokens.last().map(|t| &t.tok) {
            None | Some(Tok::Newline) => {}
            Some(Tok::P(p)) if p.continues_line() => {}
            Some(Tok::Kw(Kw::And | Kw::Or | Kw::Not)) => {}
            _ => self.push(Tok::Newline, false, line),
        }
    }

    fn run(mut self) -> EvalResult<Vec<Token>> {
        let mut spaced = true;
        while let Some(c) = self.peek() {
            let line = self.line;
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                    spaced = true;
                    continue;
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                    spaced = true;
                    continue;
                }
                '\n' => {
                    self.bump();
                    self.newline(line);
                    spaced = true;
                    continue;
                }
                ';' => {
                    self.bump();
                    if !matches!(self.tokens.last().map(|t| &t.tok), None | Some(Tok::Newline)) {
                        self.push(Tok::Newline, false, line);
                    }
                    spaced = true;
                    continue;
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                    continue;
                }
                '=' if self.at_line_start() && self.rest_starts_with("=begin") => {
                    self.skip_block_comment()?;
                    spaced = true;
                    continue;
                }
                _ => {}
            }

            if c.is_ascii_digit() {
                let tok = self.number(false)?;
                self.push(tok, spaced, line);
            } else if c == '-'
                && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                && !self.after_value()
            {
                self.bump();
                let tok = self.number(true)?;
                self.push(tok, spaced, line);
            } else if c == '_' || c.is_alphabetic() {
                self.word(spaced, line);
            } else if c == '"' {
                self.bump();
                let tok = self.double_quoted('"')?;
                self.push(tok, spaced, line);
            } else if c == '\'' {
                self.bump();
                let s = self.single_quoted('\'')?;
                self.push(Tok::Str(s), spaced, line);
            } else if c == '`' {
                self.bump();
                let s = self.single_quoted('`')?;
                self.push(Tok::Backtick(s), spaced, line);
            } else if c == '@' || c == '$' {
                self.bump();
                if c == '@' && self.peek() == Some('@') {
                    self.bump();
                }
                let name = self.take_while(|c| c == '_' || c.is_alphanumeric());
                if name.is_empty() && c == '$' {
                    // Special globals like `$0` or `$:`
                    let special = self
                        .bump()
                        .ok_or_else(|| self.error("unexpected end of input after `$`"))?;
                    self.push(Tok::Gvar(special.to_string()), spaced, line);
                } else if name.is_empty() {
                    return Err(self.error("`@' without identifiers is not allowed"));
                } else if c == '@' {
                    self.push(Tok::Ivar(name), spaced, line);
                } else {
                    self.push(Tok::Gvar(name), spaced, line);
                }
            } else if c == ':' && self.symbol_follows() {
                self.bump();
                let tok = if self.peek() == Some('"') {
                    self.bump();
                    match self.double_quoted('"')? {
                        Tok::Str(s) => Tok::Sym(s),
                        _ => return Err(self.error("interpolated symbols are not supported")),
                    }
                } else if self.peek().is_some_and(|c| c == '_' || c.is_alphabetic()) {
                    let mut name = self.take_while(|c| c == '_' || c.is_alphanumeric());
                    if let Some(suffix @ ('?' | '!')) = self.peek() {
                        if self.peek_at(1) != Some('=') {
                            self.bump();
                            name.push(suffix);
                        }
                    }
                    Tok::Sym(name)
                } else {
                    Tok::Sym(self.operator_symbol())
                };
                self.push(tok, spaced, line);
            } else if c == '%' && self.peek_at(1) == Some('w') && self.percent_literal_follows() {
                self.bump();
                self.bump();
                let words = self.word_list()?;
                self.push(Tok::Words(words), spaced, line);
            } else {
                let p = self.punct()?;
                match p {
                    Punct::LParen | Punct::LBracket | Punct::LBrace => self.brackets.push(p),
                    Punct::RParen | Punct::RBracket | Punct::RBrace => {
                        self.brackets.pop();
                    }
                    Punct::Dot | Punct::SafeNav => {
                        // Leading-dot method chains continue the previous line
                        while matches!(self.tokens.last().map(|t| &t.tok), Some(Tok::Newline)) {
                            self.tokens.pop();
                        }
                    }
                    _ => {}
                }
                self.push(Tok::P(p), spaced, line);
            }
            spaced = false;
        }
        let line = self.line;
        self.push(Tok::Eof, true, line);
        Ok(self.tokens)
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.chars.get(self.pos - 1) == Some(&'\n')
    }

    fn rest_starts_with(&self, prefix: &str) -> bool {
        prefix
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn skip_block_comment(&mut self) -> EvalResult<()> {
        let start = self.line;
        loop {
            // Skip the current line
            while let Some(c) = self.bump() {
                if c == '\n' {
                    break;
                }
            }
            if self.peek().is_none() {
                return Err(EvalError::syntax(start, "embedded document meets end of file"));
            }
            if self.rest_starts_with("=end") {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                return Ok(());
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn number(&mut self, negative: bool) -> EvalResult<Tok> {
        let mut digits = String::new();
        if negative {
            digits.push('-');
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if c == '_' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                // digit separator
            } else if c == '.'
                && !is_float
                && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
            {
                is_float = true;
                digits.push(c);
            } else if (c == 'e' || c == 'E')
                && (self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some('+' | '-'))
                        && self.peek_at(2).is_some_and(|d| d.is_ascii_digit())))
            {
                is_float = true;
                digits.push(c);
                self.bump();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    digits.push(sign);
                    self.bump();
                }
                continue;
            } else {
                break;
            }
            self.bump();
        }
        if self.peek().is_some_and(|c| c == '_' || c.is_alphabetic()) {
            return Err(self.error(format!("trailing `{}' in number", self.peek().unwrap_or('_'))));
        }
        if is_float {
            digits
                .parse()
                .map(Tok::Float)
                .map_err(|_| self.error(format!("invalid float literal {digits}")))
        } else {
            digits
                .parse()
                .map(Tok::Int)
                .map_err(|_| self.error(format!("integer literal {digits} is out of range")))
        }
    }

    fn word(&mut self, spaced: bool, line: usize) {
        let mut name = self.take_while(|c| c == '_' || c.is_alphanumeric());
        // Method names may end in `?` or `!`, but not when that is `!=`.
        if let Some(suffix @ ('?' | '!')) = self.peek() {
            if self.peek_at(1) != Some('=') {
                self.bump();
                name.push(suffix);
            }
        }

        let after_dot = matches!(
            self.tokens.last().map(|t| &t.tok),
            Some(Tok::P(Punct::Dot | Punct::SafeNav))
        );

        // `key: value` labels, but not `A::B` or `a ? b : c` with tight colons
        if self.peek() == Some(':')
            && self.peek_at(1) != Some(':')
            && !after_dot
            && !name.ends_with('?')
            && !name.ends_with('!')
            && !self.inside_ternary()
        {
            self.bump();
            self.push(Tok::Label(name), spaced, line);
            return;
        }

        let tok = if after_dot {
            Tok::Ident(name)
        } else if let Some(kw) = Kw::from_word(&name) {
            Tok::Kw(kw)
        } else if name.chars().next().is_some_and(char::is_uppercase) {
            Tok::Const(name)
        } else {
            Tok::Ident(name)
        };
        self.push(tok, spaced, line);
    }

    /// Whether an unmatched `?` is pending on the current line, meaning a
    /// following `name:` is the ternary's else-separator rather than a label.
    fn inside_ternary(&self) -> bool {
        let mut open = 0i32;
        for token in self.tokens.iter().rev() {
            match &token.tok {
                Tok::Newline => break,
                Tok::P(Punct::Question) => open += 1,
                Tok::P(Punct::Colon) => open -= 1,
                _ => {}
            }
        }
        open > 0
    }

    fn symbol_follows(&self) -> bool {
        let Some(next) = self.peek_at(1) else {
            return false;
        };
        if next == ':' {
            return false;
        }
        // A colon glued to an operand is a separator (`a ? b:c`)
        let glued = self.pos > 0 && !self.chars[self.pos - 1].is_whitespace();
        if self.after_value() && glued {
            return false;
        }
        next == '"'
            || next == '_'
            || next.is_alphabetic()
            || matches!(next, '+' | '-' | '*' | '/' | '<' | '>' | '=' | '[' | '!' | '%')
    }

    fn operator_symbol(&mut self) -> String {
        const OPERATORS: [&str; 16] = [
            "[]=", "<=>", "===", "==", "<=", ">=", "<<", ">>", "**", "[]", "+", "-", "*", "/",
            "<", ">",
        ];
        for op in OPERATORS {
            if self.rest_starts_with(op) {
                for _ in 0..op.chars().count() {
                    self.bump();
                }
                return op.to_string();
            }
        }
        self.bump().map(String::from).unwrap_or_default()
    }

    fn percent_literal_follows(&self) -> bool {
        !self.after_value() && matches!(self.peek_at(2), Some('[' | '(' | '{' | '<' | '|' | '!'))
    }

    fn word_list(&mut self) -> EvalResult<Vec<String>> {
        let open = self.bump().ok_or_else(|| self.error("unterminated list"))?;
        let close = match open {
            '[' => ']',
            '(' => ')',
            '{' => '}',
            '<' => '>',
            other => other,
        };
        let mut words = Vec::new();
        let mut current = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.error("unterminated list meets end of file"))?;
            if c == close {
                break;
            }
            if c.is_whitespace() {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            } else {
                current.push(c);
            }
        }
        if !current.is_empty() {
            words.push(current);
        }
        Ok(words)
    }

    fn single_quoted(&mut self, quote: char) -> EvalResult<String> {
        let start = self.line;
        let mut out = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| EvalError::syntax(start, "unterminated string meets end of file"))?;
            if c == quote {
                return Ok(out);
            }
            if c == '\\' {
                match self.peek() {
                    Some(next) if next == quote || next == '\\' => {
                        out.push(next);
                        self.bump();
                    }
                    _ => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
    }

    fn double_quoted(&mut self, quote: char) -> EvalResult<Tok> {
        let start = self.line;
        let mut pieces = Vec::new();
        let mut current = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| EvalError::syntax(start, "unterminated string meets end of file"))?;
            if c == quote {
                break;
            }
            match c {
                '\\' => {
                    let esc = self
                        .bump()
                        .ok_or_else(|| EvalError::syntax(start, "unterminated string"))?;
                    match esc {
                        'n' => current.push('\n'),
                        't' => current.push('\t'),
                        'r' => current.push('\r'),
                        '0' => current.push('\0'),
                        's' => current.push(' '),
                        'e' => current.push('\u{1b}'),
                        'a' => current.push('\u{7}'),
                        'b' => current.push('\u{8}'),
                        '\n' => {}
                        other => current.push(other),
                    }
                }
                '#' if self.peek() == Some('{') => {
                    self.bump();
                    let line = self.line;
                    let code = self.interpolation()?;
                    if !current.is_empty() {
                        pieces.push(StrPiece::Lit(std::mem::take(&mut current)));
                    }
                    pieces.push(StrPiece::Code(code, line));
                }
                other => current.push(other),
            }
        }
        if pieces.is_empty() {
            return Ok(Tok::Str(current));
        }
        if !current.is_empty() {
            pieces.push(StrPiece::Lit(current));
        }
        Ok(Tok::Interp(pieces))
    }

    /// Collect the raw source of `#{...}` up to its matching brace.
    fn interpolation(&mut self) -> EvalResult<String> {
        let start = self.line;
        let mut depth = 1usize;
        let mut code = String::new();
        let mut quote: Option<char> = None;
        loop {
            let c = self
                .bump()
                .ok_or_else(|| EvalError::syntax(start, "unterminated interpolation"))?;
            if let Some(q) = quote {
                if c == '\\' {
                    code.push(c);
                    if let Some(next) = self.bump() {
                        code.push(next);
                    }
                    continue;
                }
                if c == q {
                    quote = None;
                }
            } else {
                match c {
                    '"' | '\'' => quote = Some(c),
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Ok(code);
                        }
                    }
                    _ => {}
                }
            }
            code.push(c);
        }
    }

    fn punct(&mut self) -> EvalResult<Punct> {
        const TABLE: &[(&str, Punct)] = &[
            ("**=", Punct::OpAssign("**")),
            ("||=", Punct::OpAssign("||")),
            ("&&=", Punct::OpAssign("&&")),
            ("<<=", Punct::OpAssign("<<")),
            (">>=", Punct::OpAssign(">>")),
            ("...", Punct::DotDotDot),
            ("<=>", Punct::Cmp),
            ("===", Punct::CaseEq),
            ("+=", Punct::OpAssign("+")),
            ("-=", Punct::OpAssign("-")),
            ("*=", Punct::OpAssign("*")),
            ("/=", Punct::OpAssign("/")),
            ("%=", Punct::OpAssign("%")),
            ("|=", Punct::OpAssign("|")),
            ("&=", Punct::OpAssign("&")),
            ("^=", Punct::OpAssign("^")),
            ("**", Punct::Pow),
            ("==", Punct::EqEq),
            ("!=", Punct::NotEq),
            ("=~", Punct::Match),
            ("!~", Punct::NotMatch),
            ("<=", Punct::Le),
            (">=", Punct::Ge),
            ("<<", Punct::Shl),
            (">>", Punct::Shr),
            ("&&", Punct::AndAnd),
            ("||", Punct::OrOr),
            ("&.", Punct::SafeNav),
            ("::", Punct::ColonColon),
            ("=>", Punct::Arrow),
            ("->", Punct::Lambda),
            ("..", Punct::DotDot),
            ("(", Punct::LParen),
            (")", Punct::RParen),
            ("[", Punct::LBracket),
            ("]", Punct::RBracket),
            ("{", Punct::LBrace),
            ("}", Punct::RBrace),
            (",", Punct::Comma),
            (".", Punct::Dot),
            (":", Punct::Colon),
            ("?", Punct::Question),
            ("|", Punct::Pipe),
            ("=", Punct::Assign),
            ("+", Punct::Plus),
            ("-", Punct::Minus),
            ("*", Punct::Star),
            ("/", Punct::Slash),
            ("%", Punct::Percent),
        ];
        const TAIL: &[(&str, Punct)] = &[
            ("<", Punct::Lt),
            (">", Punct::Gt),
            ("!", Punct::Bang),
            ("~", Punct::Tilde),
            ("&", Punct::Amp),
            ("^", Punct::Caret),
        ];

        // Heredocs are not supported, so `<<` is always the operator.
        for (text, punct) in TABLE.iter().chain(TAIL) {
            if self.rest_starts_with(text) {
                for _ in 0..text.len() {
                    self.bump();
                }
                return Ok(*punct);
            }
        }
        let c = self.peek().unwrap_or('?');
        Err(self.error(format!("unexpected character `{c}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Tok> {
        tokenize(src, 1)
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn statements_and_separators() {
        assert_eq!(
            kinds("a = 1; b = 2"),
            vec![
                Tok::Ident("a".into()),
                Tok::P(Punct::Assign),
                Tok::Int(1),
                Tok::Newline,
                Tok::Ident("b".into()),
                Tok::P(Punct::Assign),
                Tok::Int(2),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn operator_at_line_end_continues() {
        let toks = kinds("a = 1 +\n  2");
        assert!(!toks.contains(&Tok::Newline));
    }

    #[test]
    fn leading_dot_continues() {
        let toks = kinds("[1, 2]\n  .map { |x| x }");
        assert!(!toks.contains(&Tok::Newline));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let toks = kinds("[\n1,\n2\n]");
        assert!(!toks.contains(&Tok::Newline));
    }

    #[test]
    fn predicate_and_bang_methods() {
        assert_eq!(
            kinds("a.empty?")[2],
            Tok::Ident("empty?".into()),
        );
        assert_eq!(kinds("s.upcase!")[2], Tok::Ident("upcase!".into()));
        assert_eq!(kinds("a != b")[1], Tok::P(Punct::NotEq));
    }

    #[test]
    fn symbols_and_labels() {
        assert_eq!(kinds(":contents")[0], Tok::Sym("contents".into()));
        assert_eq!(kinds("{ a: 1 }")[1], Tok::Label("a".into()));
        assert_eq!(kinds("{ :a => 1 }")[1], Tok::Sym("a".into()));
        assert_eq!(kinds("Math::PI")[1], Tok::P(Punct::ColonColon));
    }

    #[test]
    fn ternary_colons_are_not_symbols() {
        let toks = kinds("x ? a : b");
        assert!(toks.contains(&Tok::P(Punct::Colon)));
        let toks = kinds("x ? 1 : 2");
        assert!(toks.contains(&Tok::P(Punct::Colon)));
    }

    #[test]
    fn negative_literals() {
        assert_eq!(kinds("x = -1")[2], Tok::Int(-1));
        assert_eq!(kinds("a - 1")[1], Tok::P(Punct::Minus));
        assert_eq!(kinds("a-1")[1], Tok::P(Punct::Minus));
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("1_000")[0], Tok::Int(1000));
        assert_eq!(kinds("1.5")[0], Tok::Float(1.5));
        assert_eq!(kinds("2e3")[0], Tok::Float(2000.0));
        assert_eq!(kinds("1..5")[1], Tok::P(Punct::DotDot));
        assert_eq!(kinds("3.times")[1], Tok::P(Punct::Dot));
        assert!(tokenize("99999999999999999999", 1).is_err());
    }

    #[test]
    fn strings() {
        assert_eq!(kinds("'it\\'s'")[0], Tok::Str("it's".into()));
        assert_eq!(kinds("'a\\nb'")[0], Tok::Str("a\\nb".into()));
        assert_eq!(kinds("\"a\\nb\"")[0], Tok::Str("a\nb".into()));
        assert_eq!(
            kinds("\"x#{1 + 2}y\"")[0],
            Tok::Interp(vec![
                StrPiece::Lit("x".into()),
                StrPiece::Code("1 + 2".into(), 1),
                StrPiece::Lit("y".into()),
            ])
        );
        assert!(tokenize("'open", 1).is_err());
    }

    #[test]
    fn word_lists() {
        assert_eq!(
            kinds("%w[a b c]")[0],
            Tok::Words(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn instance_and_global_variables() {
        assert_eq!(kinds("@goal")[0], Tok::Ivar("goal".into()));
        assert_eq!(kinds("$SAFE")[0], Tok::Gvar("SAFE".into()));
    }

    #[test]
    fn comments() {
        assert_eq!(kinds("a # note\n# more"), vec![Tok::Ident("a".into()), Tok::Newline, Tok::Eof]);
        assert_eq!(kinds("=begin\nignored\n=end\nb")[0], Tok::Ident("b".into()));
    }
}

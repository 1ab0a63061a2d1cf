use crate::eval::{ExprError, ExprResult};

/// Row variable used when an expression has no `name =>` prefix.
pub const DEFAULT_ROW_VARIABLE: &str = "d";

/// Namespace that function calls are written under (`op.lower(d.name)`).
pub const FUNCTION_NAMESPACE: &str = "op";

/// Deepest expression tree the parser builds. Chains of `&&`/`||` are flat and do not count
/// against it.
pub const MAX_NESTING_DEPTH: usize = 128;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    /// An integer literal too large for `f64` to hold exactly.
    BigInt(i128),
    Text(String),
    Boolean(bool),
    Null,
    /// A column of the current row: `d.name` or `d["any name"]`.
    Column(String),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a && b && ...` or `a || b || ...`, with at least two operands.
    Logical {
        op: LogicalOp,
        operands: Vec<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    /// `==` and `===` (both strict).
    Equals,
    /// `!=` and `!==` (both strict).
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
}

/// Short-circuiting operators. Like JavaScript, they yield an operand rather than a boolean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Infix {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn too_deep() -> ExprError {
    ExprError::Parse(format!(
        "expression nested too deeply (limit {MAX_NESTING_DEPTH})"
    ))
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Identifier(String),
    Number(f64),
    BigInt(i128),
    String(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    AndAnd,
    OrOr,
    Arrow,
    Eof,
}

#[derive(Clone)]
struct Lexer<'a> {
    input: &'a str,
    chars: std::str::Chars<'a>,
    peeked: Option<char>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        let mut chars = input.chars();
        let peeked = chars.next();
        Self {
            input,
            chars,
            peeked,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let current = self.peeked.take();
        self.peeked = self.chars.next();
        current
    }

    fn peek(&self) -> Option<char> {
        self.peeked
    }

    fn peek_second(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn consume_while<F>(&mut self, mut predicate: F) -> String
    where
        F: FnMut(char) -> bool,
    {
        let mut buf = String::new();
        while let Some(ch) = self.peek() {
            if !predicate(ch) {
                break;
            }
            buf.push(ch);
            self.bump();
        }
        buf
    }

    fn skip_whitespace(&mut self) {
        self.consume_while(|c| c.is_whitespace());
    }

    /// Consume `ch` if it is next.
    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn single(&mut self, token: Token) -> ExprResult<Token> {
        self.bump();
        Ok(token)
    }

    fn next_token(&mut self) -> ExprResult<Token> {
        self.skip_whitespace();
        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };

        match ch {
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            ',' => self.single(Token::Comma),
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '%' => self.single(Token::Percent),
            '.' if !self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                self.single(Token::Dot)
            }
            '=' => {
                self.bump();
                if self.eat('>') {
                    return Ok(Token::Arrow);
                }
                if !self.eat('=') {
                    return Err(ExprError::Parse(format!(
                        "assignment is not allowed in {:?}; use == to compare",
                        self.input
                    )));
                }
                self.eat('=');
                Ok(Token::Equals)
            }
            '!' => {
                self.bump();
                if self.eat('=') {
                    self.eat('=');
                    Ok(Token::NotEquals)
                } else {
                    Ok(Token::Bang)
                }
            }
            '<' => {
                self.bump();
                if self.eat('=') {
                    Ok(Token::LessEquals)
                } else {
                    Ok(Token::Less)
                }
            }
            '>' => {
                self.bump();
                if self.eat('=') {
                    Ok(Token::GreaterEquals)
                } else {
                    Ok(Token::Greater)
                }
            }
            '&' | '|' => {
                self.bump();
                if self.eat(ch) {
                    Ok(if ch == '&' { Token::AndAnd } else { Token::OrOr })
                } else {
                    Err(ExprError::Parse(format!(
                        "unexpected character {ch:?} in {:?}",
                        self.input
                    )))
                }
            }
            '"' | '\'' => self.string(ch),
            c if c.is_ascii_digit() || c == '.' => self.number(),
            c if is_ident_start(c) => Ok(Token::Identifier(self.consume_while(is_ident_part))),
            other => Err(ExprError::Parse(format!(
                "unexpected character {other:?} in {:?}",
                self.input
            ))),
        }
    }

    fn string(&mut self, quote: char) -> ExprResult<Token> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ExprError::Parse("unterminated string".into())),
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    None => return Err(ExprError::Parse("unterminated string".into())),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some(other) => out.push(other),
                },
                Some(c) => out.push(c),
            }
        }
        Ok(Token::String(out))
    }

    fn number(&mut self) -> ExprResult<Token> {
        let mut num_str = self.consume_while(|c| c.is_ascii_digit() || c == '.');
        if matches!(self.peek(), Some('e' | 'E')) {
            num_str.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                num_str.push(sign);
                self.bump();
            }
            let exp_digits = self.consume_while(|c| c.is_ascii_digit());
            if exp_digits.is_empty() {
                return Err(ExprError::Parse(format!(
                    "invalid number {num_str:?} (expected exponent digits)"
                )));
            }
            num_str.push_str(&exp_digits);
        }
        if num_str.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(int) = num_str.parse::<i128>() {
                if int > 1 << 53 {
                    return Ok(Token::BigInt(int));
                }
            }
        }
        let num: f64 = num_str
            .parse()
            .map_err(|_| ExprError::Parse(format!("invalid number {num_str:?}")))?;
        Ok(Token::Number(num))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Token,
    row_variable: String,
    depth: usize,
}

/// A parsed subtree and the height of its tree.
type Parsed = (Expr, usize);

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> ExprResult<Self> {
        let mut lexer = Lexer::new(input);
        let lookahead = lexer.next_token()?;
        Ok(Self {
            lexer,
            lookahead,
            row_variable: DEFAULT_ROW_VARIABLE.to_owned(),
            depth: 0,
        })
    }

    fn bump(&mut self) -> ExprResult<Token> {
        let current = std::mem::replace(&mut self.lookahead, Token::Eof);
        self.lookahead = self.lexer.next_token()?;
        Ok(current)
    }

    /// The token after the lookahead, without consuming anything.
    fn peek_second(&self) -> ExprResult<Token> {
        self.lexer.clone().next_token()
    }

    fn expect(&mut self, token: Token) -> ExprResult<()> {
        if self.lookahead == token {
            self.bump()?;
            Ok(())
        } else {
            Err(ExprError::Parse(format!(
                "expected {token:?}, found {:?}",
                self.lookahead
            )))
        }
    }

    fn parse(&mut self) -> ExprResult<Expr> {
        // Optional arrow-function header: `row => ...`.
        if let Token::Identifier(name) = &self.lookahead {
            let name = name.clone();
            if self.peek_second()? == Token::Arrow {
                self.bump()?;
                self.bump()?;
                self.row_variable = name;
            }
        }

        let (expr, _) = self.parse_expr(0)?;
        if self.lookahead != Token::Eof {
            return Err(ExprError::Parse(format!(
                "unexpected token {:?}",
                self.lookahead
            )));
        }
        Ok(expr)
    }

    fn parse_expr(&mut self, min_prec: u8) -> ExprResult<Parsed> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(too_deep());
        }
        self.depth += 1;
        let parsed = self.parse_infix(min_prec);
        self.depth -= 1;
        parsed
    }

    fn parse_infix(&mut self, min_prec: u8) -> ExprResult<Parsed> {
        let (mut left, mut height) = self.parse_prefix()?;
        while let Some((infix, prec)) = self.infix_binding_power() {
            if prec < min_prec {
                break;
            }
            self.bump()?;
            let (right, right_height) = self.parse_expr(prec + 1)?;
            match infix {
                Infix::Logical(op) => {
                    left = match left {
                        Expr::Logical {
                            op: left_op,
                            mut operands,
                        } if left_op == op => {
                            operands.push(right);
                            height = height.max(right_height + 1);
                            Expr::Logical { op, operands }
                        }
                        other => {
                            height = height.max(right_height) + 1;
                            Expr::Logical {
                                op,
                                operands: vec![other, right],
                            }
                        }
                    };
                }
                Infix::Binary(op) => {
                    left = Expr::BinaryOp {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    height = height.max(right_height) + 1;
                }
            }
            if height > MAX_NESTING_DEPTH {
                return Err(too_deep());
            }
        }
        Ok((left, height))
    }

    fn parse_prefix(&mut self) -> ExprResult<Parsed> {
        match &self.lookahead {
            Token::Minus | Token::Bang => {
                let op = if self.bump()? == Token::Minus {
                    UnaryOp::Negate
                } else {
                    UnaryOp::Not
                };
                let (expr, height) = self.parse_expr(7)?;
                Ok((
                    Expr::UnaryOp {
                        op,
                        expr: Box::new(expr),
                    },
                    height + 1,
                ))
            }
            Token::Plus => {
                // Unary plus is numeric coercion, which `- -x` already expresses.
                self.bump()?;
                let (expr, height) = self.parse_expr(7)?;
                Ok((
                    Expr::UnaryOp {
                        op: UnaryOp::Negate,
                        expr: Box::new(Expr::UnaryOp {
                            op: UnaryOp::Negate,
                            expr: Box::new(expr),
                        }),
                    },
                    height + 2,
                ))
            }
            Token::Number(n) => {
                let n = *n;
                self.bump()?;
                Ok((Expr::Number(n), 1))
            }
            Token::BigInt(n) => {
                let n = *n;
                self.bump()?;
                Ok((Expr::BigInt(n), 1))
            }
            Token::String(s) => {
                let s = s.clone();
                self.bump()?;
                Ok((Expr::Text(s), 1))
            }
            Token::Identifier(_) => self.parse_ident_like(),
            Token::LParen => {
                self.bump()?;
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Eof => Err(ExprError::Parse("unexpected end of expression".into())),
            other => Err(ExprError::Parse(format!(
                "unexpected token in expression: {other:?}"
            ))),
        }
    }

    fn parse_ident_like(&mut self) -> ExprResult<Parsed> {
        let ident = match self.bump()? {
            Token::Identifier(ident) => ident,
            other => {
                debug_assert!(false, "parse_ident_like called with lookahead={other:?}");
                return Err(ExprError::Parse("expected identifier".into()));
            }
        };

        match ident.as_str() {
            "true" => return Ok((Expr::Boolean(true), 1)),
            "false" => return Ok((Expr::Boolean(false), 1)),
            "null" | "undefined" => return Ok((Expr::Null, 1)),
            "NaN" => return Ok((Expr::Number(f64::NAN), 1)),
            "Infinity" => return Ok((Expr::Number(f64::INFINITY), 1)),
            _ => {}
        }

        if ident == self.row_variable {
            return match self.bump()? {
                Token::Dot => match self.bump()? {
                    Token::Identifier(column) => Ok((Expr::Column(column), 1)),
                    other => Err(ExprError::Parse(format!(
                        "expected column name after {ident}., found {other:?}"
                    ))),
                },
                Token::LBracket => {
                    let column = match self.bump()? {
                        Token::String(column) => column,
                        other => {
                            return Err(ExprError::Parse(format!(
                                "expected quoted column name in {ident}[...], found {other:?}"
                            )))
                        }
                    };
                    self.expect(Token::RBracket)?;
                    Ok((Expr::Column(column), 1))
                }
                other => Err(ExprError::Parse(format!(
                    "expected {ident}.column or {ident}[\"column\"], found {other:?}"
                ))),
            };
        }

        if ident == FUNCTION_NAMESPACE && self.lookahead == Token::Dot {
            self.bump()?;
            let name = match self.bump()? {
                Token::Identifier(name) => name,
                other => {
                    return Err(ExprError::Parse(format!(
                        "expected function name after {FUNCTION_NAMESPACE}., found {other:?}"
                    )))
                }
            };
            self.expect(Token::LParen)?;
            let mut args = Vec::new();
            let mut height = 1;
            if self.lookahead != Token::RParen {
                loop {
                    let (arg, arg_height) = self.parse_expr(0)?;
                    args.push(arg);
                    height = height.max(arg_height + 1);
                    if self.lookahead == Token::Comma {
                        self.bump()?;
                        continue;
                    }
                    break;
                }
            }
            self.expect(Token::RParen)?;
            if height > MAX_NESTING_DEPTH {
                return Err(too_deep());
            }
            return Ok((Expr::Call { name, args }, height));
        }

        Err(ExprError::Parse(format!("unknown identifier {ident:?}")))
    }

    fn infix_binding_power(&self) -> Option<(Infix, u8)> {
        use Infix::{Binary, Logical};
        Some(match self.lookahead {
            Token::OrOr => (Logical(LogicalOp::Or), 1),
            Token::AndAnd => (Logical(LogicalOp::And), 2),
            Token::Equals => (Binary(BinaryOp::Equals), 3),
            Token::NotEquals => (Binary(BinaryOp::NotEquals), 3),
            Token::Less => (Binary(BinaryOp::Less), 4),
            Token::LessEquals => (Binary(BinaryOp::LessEquals), 4),
            Token::Greater => (Binary(BinaryOp::Greater), 4),
            Token::GreaterEquals => (Binary(BinaryOp::GreaterEquals), 4),
            Token::Plus => (Binary(BinaryOp::Add), 5),
            Token::Minus => (Binary(BinaryOp::Subtract), 5),
            Token::Star => (Binary(BinaryOp::Multiply), 6),
            Token::Slash => (Binary(BinaryOp::Divide), 6),
            Token::Percent => (Binary(BinaryOp::Remainder), 6),
            _ => return None,
        })
    }
}

/// Parse a filter expression, with or without a `row =>` header.
pub fn parse(input: &str) -> ExprResult<Expr> {
    Parser::new(input)?.parse()
}

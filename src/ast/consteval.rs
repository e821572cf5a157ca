//! Evaluation of enumerator initializers.
//!
//! Covers integer and character literals, references to earlier
//! enumerators, parentheses, and the integer operators. Anything else
//! (casts, `sizeof`, function calls) yields `None`.

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Ident(String),
    Op(&'static str),
    Open,
    Close,
}

const OPERATORS: &[&str] = &[
    "<<", ">>", "+", "-", "*", "/", "%", "&", "|", "^", "~", "!",
];

/// Evaluate `expr`, resolving identifiers through `lookup`.
///
/// Identifiers reach `lookup` as written, qualifiers included
/// (`Color::Red`, `::Mode::Solo`).
pub fn evaluate(expr: &str, lookup: &dyn Fn(&str) -> Option<i64>) -> Option<i64> {
    let tokens = tokenize(expr)?;
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        lookup,
    };
    let value = parser.expression(0)?;
    if parser.pos == parser.tokens.len() {
        Some(value)
    } else {
        None
    }
}

/// Parse an integer literal with optional prefix, digit separators, and suffix.
pub fn parse_int_literal(text: &str) -> Option<i64> {
    let cleaned: String = text.chars().filter(|&c| c != '\'').collect();
    let lower = cleaned.to_ascii_lowercase();
    let body = lower.trim_end_matches(['u', 'l', 'z']);

    let (digits, radix) = if let Some(hex) = body.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(bin) = body.strip_prefix("0b") {
        (bin, 2)
    } else if body.len() > 1 && body.starts_with('0') {
        (&body[1..], 8)
    } else {
        (body, 10)
    };

    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, radix).ok().map(|v| v as i64)
}

fn parse_char_literal(body: &str) -> Option<i64> {
    let mut chars = body.chars();
    let value = match chars.next()? {
        '\\' => match chars.next()? {
            'n' => '\n' as i64,
            't' => '\t' as i64,
            'r' => '\r' as i64,
            '0' => 0,
            '\\' => '\\' as i64,
            '\'' => '\'' as i64,
            '"' => '"' as i64,
            'x' => {
                let hex: String = chars.by_ref().collect();
                return i64::from_str_radix(&hex, 16).ok();
            }
            _ => return None,
        },
        c => c as i64,
    };
    if chars.next().is_some() {
        return None;
    }
    Some(value)
}

fn tokenize(expr: &str) -> Option<Vec<Token>> {
    let bytes = expr.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'\'') {
                i += 1;
            }
            tokens.push(Token::Int(parse_int_literal(&expr[start..i])?));
        } else if c == '\'' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end] != b'\'' {
                if bytes[end] == b'\\' {
                    end += 1;
                }
                end += 1;
            }
            if end >= bytes.len() {
                return None;
            }
            tokens.push(Token::Int(parse_char_literal(&expr[start..end])?));
            i = end + 1;
        } else if c.is_ascii_alphabetic() || c == '_' || c == ':' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b':')
            {
                i += 1;
            }
            tokens.push(Token::Ident(expr[start..i].to_string()));
        } else {
            let rest = &expr[i..];
            let op = OPERATORS.iter().find(|op| rest.starts_with(**op))?;
            tokens.push(Token::Op(op));
            i += op.len();
        }
    }

    Some(tokens)
}

struct ExprParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    lookup: &'a dyn Fn(&str) -> Option<i64>,
}

fn binding_power(op: &str) -> Option<u8> {
    match op {
        "|" => Some(1),
        "^" => Some(2),
        "&" => Some(3),
        "<<" | ">>" => Some(4),
        "+" | "-" => Some(5),
        "*" | "/" | "%" => Some(6),
        _ => None,
    }
}

impl ExprParser<'_> {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expression(&mut self, min_power: u8) -> Option<i64> {
        let mut lhs = self.unary()?;

        while let Some(Token::Op(op)) = self.tokens.get(self.pos).cloned() {
            let power = match binding_power(op) {
                Some(p) if p > min_power => p,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.expression(power)?;
            lhs = apply(op, lhs, rhs)?;
        }

        Some(lhs)
    }

    fn unary(&mut self) -> Option<i64> {
        match self.next()? {
            Token::Int(v) => Some(v),
            Token::Ident(name) => (self.lookup)(&name),
            Token::Open => {
                let value = self.expression(0)?;
                match self.next()? {
                    Token::Close => Some(value),
                    _ => None,
                }
            }
            Token::Op("-") => self.unary()?.checked_neg(),
            Token::Op("+") => self.unary(),
            Token::Op("~") => Some(!self.unary()?),
            Token::Op("!") => Some((self.unary()? == 0) as i64),
            _ => None,
        }
    }
}

fn apply(op: &str, lhs: i64, rhs: i64) -> Option<i64> {
    match op {
        "+" => lhs.checked_add(rhs),
        "-" => lhs.checked_sub(rhs),
        "*" => lhs.checked_mul(rhs),
        "/" => lhs.checked_div(rhs),
        "%" => lhs.checked_rem(rhs),
        "<<" => u32::try_from(rhs).ok().and_then(|r| lhs.checked_shl(r)),
        ">>" => u32::try_from(rhs).ok().and_then(|r| lhs.checked_shr(r)),
        "&" => Some(lhs & rhs),
        "|" => Some(lhs | rhs),
        "^" => Some(lhs ^ rhs),
        _ => None,
    }
}

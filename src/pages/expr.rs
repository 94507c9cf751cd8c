//! Evaluator for the obfuscated key expressions found in chapter pages.
//!
//! Only a closed grammar is accepted:
//!
//! ```text
//! expr    := unary ('+' unary)*
//! unary   := ('+' | '!') unary | postfix
//! postfix := primary ('[' expr ']' | '.' 'length')*
//! primary := NUMBER | STRING | '[' (expr (',' expr)*)? ']' | '(' expr ')'
//! ```
//!
//! Values coerce the way browser script does, because the obfuscation relies on
//! it: `+[]` is `0`, `[]+[]` is `""`, `!![]` is `true`, `[+[]]+[+[]]` is `"00"`.
//! Anything else is rejected with [`ResolveError::UnsupportedExpression`].

use crate::error::ResolveError;

const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Value>),
}

impl Value {
    /// String conversion as done by `+` concatenation and `String(x)`.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Undefined => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Bool(b) => if *b { 1.0 } else { 0.0 },
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_js_string()),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !(*n == 0.0 || n.is_nan()),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) => true,
        }
    }

    /// Arrays collapse to their string form; everything else is already primitive.
    fn to_primitive(&self) -> Value {
        match self {
            Value::Array(_) => Value::Str(self.to_js_string()),
            other => other.clone(),
        }
    }

    /// The value as a list of strings, if it is an array of strings.
    pub fn into_string_list(self) -> Option<Vec<String>> {
        match self {
            Value::Array(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::Str(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        // shortest round-trip digits, zero padded for large integers
        format!("{}", n)
    } else {
        let s = format!("{:e}", n);
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    // Rust also accepts "inf"/"nan" spellings, which must stay NaN here.
    if !t.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Bang,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Dot,
}

fn unsupported(msg: impl Into<String>) -> ResolveError {
    ResolveError::UnsupportedExpression(msg.into())
}

fn tokenize(src: &str) -> Result<Vec<Token>, ResolveError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => { tokens.push(Token::Plus); i += 1; }
            '!' => { tokens.push(Token::Bang); i += 1; }
            '[' => { tokens.push(Token::LBracket); i += 1; }
            ']' => { tokens.push(Token::RBracket); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            ',' => { tokens.push(Token::Comma); i += 1; }
            '.' if !chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| unsupported(format!("bad number literal `{}`", literal)))?;
                tokens.push(Token::Number(n));
            }
            '"' | '\'' => {
                let (s, next) = read_string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(unsupported(format!("unexpected character `{}`", other))),
        }
    }
    Ok(tokens)
}

/// Reads a quoted literal starting at `start`; returns the value and the index after the closing quote.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ResolveError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }
        let esc = *chars.get(i + 1).ok_or_else(|| unsupported("unterminated escape"))?;
        i += 2;
        match esc {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            '0' => out.push('\0'),
            'x' | 'u' => {
                let width = if esc == 'x' { 2 } else { 4 };
                let hex: String = chars.get(i..i + width).ok_or_else(|| unsupported("short escape"))?.iter().collect();
                let code = u32::from_str_radix(&hex, 16).map_err(|_| unsupported(format!("bad escape `{}`", hex)))?;
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                i += width;
            }
            other => out.push(other),
        }
    }
    Err(unsupported("unterminated string literal"))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> { self.tokens.get(self.pos) }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<(), ResolveError> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(unsupported(format!("expected {:?}, found {:?}", want, t))),
            None => Err(unsupported(format!("expected {:?}, found end of input", want))),
        }
    }

    fn enter(&mut self) -> Result<(), ResolveError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(unsupported("expression nested too deeply"));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Value, ResolveError> {
        self.enter()?;
        let mut acc = self.unary()?;
        while self.peek() == Some(&Token::Plus) {
            self.pos += 1;
            let rhs = self.unary()?;
            acc = add(&acc, &rhs);
        }
        self.depth -= 1;
        Ok(acc)
    }

    fn unary(&mut self) -> Result<Value, ResolveError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.enter()?;
                let v = self.unary()?;
                self.depth -= 1;
                Ok(Value::Number(v.to_number()))
            }
            Some(Token::Bang) => {
                self.pos += 1;
                self.enter()?;
                let v = self.unary()?;
                self.depth -= 1;
                Ok(Value::Bool(!v.truthy()))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Value, ResolveError> {
        let mut value = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let key = self.expr()?;
                    self.expect(Token::RBracket)?;
                    value = property(&value, &key.to_js_string())?;
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(name)) if name == "length" => value = property(&value, "length")?,
                        Some(t) => return Err(unsupported(format!("property access {:?}", t))),
                        None => return Err(unsupported("dangling `.`")),
                    }
                }
                _ => return Ok(value),
            }
        }
    }

    fn primary(&mut self) -> Result<Value, ResolveError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Value::Number(n)),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::LParen) => {
                let v = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(v)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                loop {
                    items.push(self.expr()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => return Ok(Value::Array(items)),
                        Some(t) => return Err(unsupported(format!("unexpected {:?} in array literal", t))),
                        None => return Err(unsupported("unterminated array literal")),
                    }
                }
            }
            Some(Token::Ident(name)) => Err(unsupported(format!("identifier `{}`", name))),
            Some(t) => Err(unsupported(format!("unexpected {:?}", t))),
            None => Err(unsupported("unexpected end of input")),
        }
    }
}

fn add(lhs: &Value, rhs: &Value) -> Value {
    let (l, r) = (lhs.to_primitive(), rhs.to_primitive());
    if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
        Value::Str(l.to_js_string() + &r.to_js_string())
    } else {
        Value::Number(l.to_number() + r.to_number())
    }
}

fn property(base: &Value, key: &str) -> Result<Value, ResolveError> {
    let index = key.parse::<usize>().ok().filter(|i| i.to_string() == key);
    match base {
        Value::Undefined => Err(unsupported(format!("cannot read `{}` of undefined", key))),
        Value::Str(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            if key == "length" {
                return Ok(Value::Number(units.len() as f64));
            }
            Ok(match index.and_then(|i| units.get(i)) {
                Some(unit) => Value::Str(String::from_utf16_lossy(&[*unit])),
                None => Value::Undefined,
            })
        }
        Value::Array(items) => {
            if key == "length" {
                return Ok(Value::Number(items.len() as f64));
            }
            Ok(index.and_then(|i| items.get(i)).cloned().unwrap_or(Value::Undefined))
        }
        Value::Bool(_) | Value::Number(_) => Ok(Value::Undefined),
    }
}

/// Evaluates `src` under the restricted grammar.
pub fn evaluate(src: &str) -> Result<Value, ResolveError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(unsupported("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let value = parser.expr()?;
    if let Some(t) = parser.peek() {
        return Err(unsupported(format!("trailing {:?}", t)));
    }
    Ok(value)
}

/// Parses an array-of-strings literal: JSON first, then the restricted grammar
/// (which also accepts single quotes).
pub fn parse_string_array(src: &str) -> Result<Vec<String>, ResolveError> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(src) {
        return Ok(list);
    }
    evaluate(src)?
        .into_string_list()
        .ok_or_else(|| unsupported("expected an array of strings"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_str(src: &str) -> String {
        evaluate(src).unwrap().to_js_string()
    }

    #[test]
    fn empty_array_coercions() {
        assert_eq!(evaluate("+[]").unwrap(), Value::Number(0.0));
        assert_eq!(evaluate("[]+[]").unwrap(), Value::Str(String::new()));
        assert_eq!(evaluate("[+[]]+[+[]]").unwrap(), Value::Str("00".into()));
        assert_eq!(evaluate("!![]").unwrap(), Value::Bool(true));
        assert_eq!(evaluate("+!![]").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn numeric_addition_and_concatenation() {
        assert_eq!(evaluate("!![]+!![]+!![]").unwrap(), Value::Number(3.0));
        assert_eq!(eval_str("+!![]+[+!![]]"), "11");
        assert_eq!(eval_str("(!![]+!![])+[]+(+[])"), "20");
        assert_eq!(eval_str("1+2+'3'"), "33");
        assert_eq!(eval_str("'3'+1+2"), "312");
        assert_eq!(eval_str("0.5+0.25"), "0.75");
    }

    #[test]
    fn indexing_and_length() {
        assert_eq!(eval_str("(![]+[])[+[]]"), "f");
        assert_eq!(eval_str("(!![]+[])[+!![]]"), "r");
        assert_eq!(evaluate("([]+[]).length").unwrap(), Value::Number(0.0));
        assert_eq!(evaluate("['a','b','c']['length']").unwrap(), Value::Number(3.0));
        assert_eq!(evaluate("[1,2][5]").unwrap(), Value::Undefined);
        assert_eq!(eval_str("([][[]]+[])[+!![]]"), "n");
    }

    #[test]
    fn number_formatting_matches_script() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(2f64.powi(60)), "1152921504606847000");
        assert_eq!(number_to_string(123456789012.0), "123456789012");
        assert_eq!(eval_str("+'abc'"), "NaN");
        assert_eq!(eval_str("+'inf'"), "NaN");
        assert_eq!(eval_str("+' 12 '"), "12");
    }

    #[test]
    fn undefined_and_nested_arrays_stringify() {
        assert_eq!(eval_str("[[1,2],[3]]+[]"), "1,2,3");
        assert_eq!(eval_str("[[][+[]]]+[]"), "");
        assert_eq!(eval_str("[][+[]]+[]"), "undefined");
    }

    #[test]
    fn rejects_anything_outside_grammar() {
        for src in ["alert(1)", "a+1", "1-1", "x=1", "[].constructor", "{}", "`x`", "1;2", ""] {
            let err = evaluate(src).unwrap_err();
            assert!(matches!(err, ResolveError::UnsupportedExpression(_)), "{src} -> {err:?}");
        }
    }

    #[test]
    fn rejects_deep_nesting() {
        let src = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(evaluate(&src), Err(ResolveError::UnsupportedExpression(_))));
        let src = format!("{}[]", "+".repeat(10_000));
        assert!(matches!(evaluate(&src), Err(ResolveError::UnsupportedExpression(_))));
    }

    #[test]
    fn deterministic() {
        let src = "(+!![]+[])+(!![]+!![]+[])+[+[]]";
        assert_eq!(evaluate(src).unwrap(), evaluate(src).unwrap());
        assert_eq!(eval_str(src), "120");
    }

    #[test]
    fn string_escapes() {
        assert_eq!(eval_str(r#""a\"bA\x42\/""#), "a\"bAB/");
        assert!(evaluate("'open").is_err());
    }

    #[test]
    fn string_arrays() {
        assert_eq!(parse_string_array(r#"["a","b"]"#).unwrap(), vec!["a", "b"]);
        assert!(parse_string_array("['a' , 'b',]").is_err());
        assert_eq!(parse_string_array("['a' , 'b']").unwrap(), vec!["a", "b"]);
        assert_eq!(parse_string_array("[]").unwrap(), Vec::<String>::new());
        assert!(parse_string_array("[1,2]").is_err());
    }
}

//! Turns free-text model replies into answer lists.
//!
//! Models are asked for a Python-style list of strings, and mostly comply.
//! [`parse_response`] accepts that literal syntax directly, falls back to the
//! first bracketed list embedded in surrounding prose, and degrades to the
//! `[""]` sentinel (nothing predicted) when neither works. It never fails.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::LazyLock;

use regex::Regex;

/// Reply contains a list whose elements are double-quoted strings.
static QUOTED_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[".*"]"#).expect("static pattern"));

/// Greedy single-line bracketed span.
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*]").expect("static pattern"));

/// The "nothing predicted" answer list.
#[must_use]
pub fn no_answer() -> Vec<String> {
    vec![String::new()]
}

/// Parse a model reply into an ordered list of answers.
///
/// Returns `[""]` when the reply holds no usable list.
#[must_use]
pub fn parse_response(raw: &str) -> Vec<String> {
    let cleaned = raw.replace("...", "");
    let text = cleaned.strip_prefix(' ').unwrap_or(&cleaned);

    let literal = parse_literal(text).or_else(|| {
        if !QUOTED_LIST.is_match(text) {
            return None;
        }
        BRACKETED
            .find(text)
            .and_then(|m| parse_literal(m.as_str()))
    });

    match literal.map(into_answers) {
        Some(answers) if !answers.is_empty() => answers,
        _ => no_answer(),
    }
}

/// A Python literal value, as far as answer lists need one.
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Number(String),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
}

impl Literal {
    fn is_sequence(&self) -> bool {
        matches!(self, Self::List(_) | Self::Tuple(_))
    }

    fn is_falsy(&self) -> bool {
        match self {
            Self::Str(s) => s.is_empty(),
            Self::Number(n) => n
                .trim_start_matches(['-', '+'])
                .chars()
                .all(|c| matches!(c, '0' | '.')),
            Self::Bool(b) => !b,
            Self::None => true,
            Self::List(items) | Self::Tuple(items) => items.is_empty(),
        }
    }

    fn into_text(self) -> String {
        match self {
            Self::Str(s) | Self::Number(s) => s,
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::None | Self::List(_) | Self::Tuple(_) => String::new(),
        }
    }
}

/// Flatten a literal into answers. A sequence made only of sequences
/// selects its last sequence; a mixed sequence keeps every item, with
/// nested items inlined. A bare scalar becomes a one-element list.
fn into_answers(value: Literal) -> Vec<String> {
    if value.is_falsy() {
        return Vec::new();
    }
    match value {
        Literal::List(items) | Literal::Tuple(items) => {
            if items.iter().all(Literal::is_sequence) {
                return items.into_iter().last().map(into_answers).unwrap_or_default();
            }
            let mut answers = Vec::with_capacity(items.len());
            for item in items {
                inline(item, &mut answers);
            }
            answers
        }
        scalar => vec![scalar.into_text()],
    }
}

fn inline(item: Literal, answers: &mut Vec<String>) {
    match item {
        Literal::List(nested) | Literal::Tuple(nested) => {
            for item in nested {
                inline(item, answers);
            }
        }
        scalar => answers.push(scalar.into_text()),
    }
}

/// Parse `text` as a single literal expression, or a bare comma-separated
/// tuple of them. Trailing garbage fails the parse.
fn parse_literal(text: &str) -> Option<Literal> {
    let mut parser = LiteralParser {
        chars: text.chars().peekable(),
    };

    let first = parser.value()?;
    parser.skip_ws();
    if parser.chars.peek().is_none() {
        return Some(first);
    }

    let mut items = vec![first];
    while parser.eat(',') {
        parser.skip_ws();
        if parser.chars.peek().is_none() {
            break;
        }
        items.push(parser.value()?);
        parser.skip_ws();
    }
    parser.chars.peek().is_none().then_some(Literal::Tuple(items))
}

struct LiteralParser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl LiteralParser<'_> {
    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.chars.peek() == Some(&expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Option<Literal> {
        self.skip_ws();
        match *self.chars.peek()? {
            '[' => {
                self.chars.next();
                self.sequence(']').map(Literal::List)
            }
            '(' => {
                self.chars.next();
                self.parenthesized()
            }
            quote @ ('"' | '\'') => {
                self.chars.next();
                self.string(quote).map(Literal::Str)
            }
            c if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            c if c.is_alphabetic() => self.keyword(),
            _ => None,
        }
    }

    /// Items up to `close`, trailing comma allowed.
    fn sequence(&mut self, close: char) -> Option<Vec<Literal>> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Some(items);
            }
            items.push(self.value()?);
            if !self.eat(',') {
                return self.eat(close).then_some(items);
            }
        }
    }

    /// `(x)` is `x`; `()`, `(x,)` and `(x, y)` are tuples.
    fn parenthesized(&mut self) -> Option<Literal> {
        if self.eat(')') {
            return Some(Literal::Tuple(Vec::new()));
        }
        let first = self.value()?;
        if self.eat(')') {
            return Some(first);
        }
        if !self.eat(',') {
            return None;
        }
        let mut rest = self.sequence(')')?;
        rest.insert(0, first);
        Some(Literal::Tuple(rest))
    }

    fn string(&mut self, quote: char) -> Option<String> {
        let mut out = String::new();
        loop {
            match self.chars.next()? {
                c if c == quote => return Some(out),
                '\n' => return None,
                '\\' => self.escape(&mut out)?,
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Option<()> {
        match self.chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\n' => {}
            'x' => out.push(self.hex_char(2)?),
            'u' => out.push(self.hex_char(4)?),
            'U' => out.push(self.hex_char(8)?),
            c @ ('\\' | '\'' | '"') => out.push(c),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Some(())
    }

    fn hex_char(&mut self, digits: usize) -> Option<char> {
        let hex: String = (0..digits).map_while(|_| self.chars.next()).collect();
        if hex.len() != digits {
            return None;
        }
        u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
    }

    fn number(&mut self) -> Option<Literal> {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_') {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        let normalized = text.replace('_', "");
        let valid = normalized.parse::<i64>().is_ok()
            || normalized.parse::<f64>().is_ok_and(f64::is_finite);
        valid.then_some(Literal::Number(normalized))
    }

    fn keyword(&mut self) -> Option<Literal> {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        match word.as_str() {
            "True" => Some(Literal::Bool(true)),
            "False" => Some(Literal::Bool(false)),
            "None" => Some(Literal::None),
            _ => None,
        }
    }
}

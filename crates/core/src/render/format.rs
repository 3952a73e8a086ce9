//! Percent-style format strings: `%s`, `%(name)s`, `%-10.3f`, `%%`.
//!
//! Named keys may themselves contain parentheses as long as they are
//! balanced, so `%(prop:x:-%(prop:y)s)s` has the key `prop:x:-%(prop:y)s`.

use std::collections::BTreeMap;

use serde_json::Value;

use super::error::FormatError;
use super::value::{to_display_string, to_repr_string, type_name};

/// A parsed format string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatString {
    pieces: Vec<Piece>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    key: Option<String>,
    left_align: bool,
    zero_pad: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: Conversion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Str,
    Repr,
    Int,
    Float,
}

impl FormatString {
    /// Parses `input`.
    ///
    /// # Errors
    ///
    /// Returns `FormatError` for a trailing `%`, an unbalanced key, an
    /// unknown conversion character, or a mix of named and positional
    /// placeholders.
    pub fn parse(input: &str) -> Result<Self, FormatError> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = input.chars().peekable();
        let mut named = false;
        let mut positional = false;

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            match chars.peek() {
                None => return Err(FormatError::Incomplete),
                Some('%') => {
                    chars.next();
                    literal.push('%');
                    continue;
                }
                Some(_) => {}
            }

            let key = if chars.peek() == Some(&'(') {
                chars.next();
                let mut depth = 1usize;
                let mut key = String::new();
                loop {
                    match chars.next() {
                        None => return Err(FormatError::IncompleteKey),
                        Some('(') => {
                            depth += 1;
                            key.push('(');
                        }
                        Some(')') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            key.push(')');
                        }
                        Some(other) => key.push(other),
                    }
                }
                Some(key)
            } else {
                None
            };

            let mut left_align = false;
            let mut zero_pad = false;
            while let Some(&flag) = chars.peek() {
                match flag {
                    '-' => left_align = true,
                    '0' => zero_pad = true,
                    _ => break,
                }
                chars.next();
            }

            let width = take_number(&mut chars);
            let precision = if chars.peek() == Some(&'.') {
                chars.next();
                Some(take_number(&mut chars).unwrap_or(0))
            } else {
                None
            };

            let conversion = match chars.next() {
                Some('s') => Conversion::Str,
                Some('r') => Conversion::Repr,
                Some('d') | Some('i') => Conversion::Int,
                Some('f') => Conversion::Float,
                Some(other) => return Err(FormatError::UnsupportedCharacter(other)),
                None => return Err(FormatError::Incomplete),
            };

            if key.is_some() {
                named = true;
            } else {
                positional = true;
            }
            if named && positional {
                return Err(FormatError::MixedPlaceholders);
            }

            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(Piece::Placeholder(Placeholder {
                key,
                left_align,
                zero_pad,
                width,
                precision,
                conversion,
            }));
        }

        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Ok(Self { pieces })
    }

    /// Named keys in order of appearance. Repeated keys appear repeatedly.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.placeholders()
            .filter_map(|placeholder| placeholder.key.as_deref())
    }

    /// Number of positional placeholders.
    pub fn positional_count(&self) -> usize {
        self.placeholders()
            .filter(|placeholder| placeholder.key.is_none())
            .count()
    }

    /// Formats against a mapping of named values.
    pub fn format_named(&self, values: &BTreeMap<String, Value>) -> Result<String, FormatError> {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Placeholder(placeholder) => {
                    let key = placeholder
                        .key
                        .as_deref()
                        .ok_or(FormatError::RequiresPositional)?;
                    let value = values
                        .get(key)
                        .ok_or_else(|| FormatError::MissingKey(key.to_string()))?;
                    out.push_str(&placeholder.apply(value)?);
                }
            }
        }
        Ok(out)
    }

    /// Formats against positional values; the count must match exactly.
    pub fn format_positional(&self, values: &[Value]) -> Result<String, FormatError> {
        let mut out = String::new();
        let mut remaining = values.iter();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Placeholder(placeholder) => {
                    if placeholder.key.is_some() {
                        return Err(FormatError::RequiresMapping);
                    }
                    let value = remaining.next().ok_or(FormatError::NotEnoughArguments)?;
                    out.push_str(&placeholder.apply(value)?);
                }
            }
        }
        if remaining.next().is_some() {
            return Err(FormatError::TooManyArguments);
        }
        Ok(out)
    }

    fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.pieces.iter().filter_map(|piece| match piece {
            Piece::Placeholder(placeholder) => Some(placeholder),
            Piece::Literal(_) => None,
        })
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut number: Option<usize> = None;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        chars.next();
        number = Some(number.unwrap_or(0).saturating_mul(10).saturating_add(digit as usize));
    }
    number
}

impl Placeholder {
    fn apply(&self, value: &Value) -> Result<String, FormatError> {
        let (body, numeric) = match self.conversion {
            Conversion::Str => (truncate(to_display_string(value), self.precision), false),
            Conversion::Repr => (truncate(to_repr_string(value), self.precision), false),
            Conversion::Int => {
                let n = as_integer(value)?;
                let digits = n.unsigned_abs().to_string();
                let digits = match self.precision {
                    Some(p) if digits.len() < p => format!("{}{digits}", "0".repeat(p - digits.len())),
                    _ => digits,
                };
                let sign = if n < 0 { "-" } else { "" };
                (format!("{sign}{digits}"), true)
            }
            Conversion::Float => {
                let f = as_float(value)?;
                (format!("{:.*}", self.precision.unwrap_or(6), f), true)
            }
        };
        Ok(self.pad(body, numeric))
    }

    fn pad(&self, body: String, numeric: bool) -> String {
        let width = self.width.unwrap_or(0);
        let len = body.chars().count();
        if len >= width {
            return body;
        }
        let fill = width - len;
        if self.left_align {
            format!("{body}{}", " ".repeat(fill))
        } else if self.zero_pad && numeric {
            match body.strip_prefix('-') {
                Some(rest) => format!("-{}{rest}", "0".repeat(fill)),
                None => format!("{}{body}", "0".repeat(fill)),
            }
        } else {
            format!("{}{body}", " ".repeat(fill))
        }
    }
}

fn truncate(text: String, precision: Option<usize>) -> String {
    match precision {
        Some(p) => text.chars().take(p).collect(),
        None => text,
    }
}

fn as_integer(value: &Value) -> Result<i128, FormatError> {
    match value {
        Value::Bool(b) => Ok(i128::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i128::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(i128::from(u))
            } else {
                Ok(n.as_f64().map_or(0, |f| f.trunc() as i128))
            }
        }
        other => Err(FormatError::NotANumber {
            conversion: 'd',
            found: type_name(other),
        }),
    }
}

fn as_float(value: &Value) -> Result<f64, FormatError> {
    match value {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        other => Err(FormatError::NotANumber {
            conversion: 'f',
            found: type_name(other),
        }),
    }
}

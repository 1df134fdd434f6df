//! Scalar literals and the operators that bind them to keys.

use std::fmt;

use serde::Serialize;

/// A typed scalar.
///
/// Quoted strings keep their contents verbatim (escapes included) and are
/// re-quoted on output; anything the lexicon does not recognise as a number
/// or a boolean stays an unquoted string, byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Quoted(String),
    Unquoted(String),
}

impl Value {
    /// Classify an unquoted token.
    ///
    /// Precedence is real, integer, boolean, then bare string, so `10` is
    /// never an identifier and `yes`/`no` never stay bare words. Integers
    /// too large for `i64` are kept as bare strings rather than truncated.
    pub fn classify(token: &str) -> Value {
        match numeric_shape(token) {
            Some(NumericShape::Real) => {
                if let Ok(n) = token.parse::<f64>() {
                    return Value::Real(n);
                }
            }
            Some(NumericShape::Integer) => {
                if let Ok(n) = token.parse::<i64>() {
                    return Value::Integer(n);
                }
            }
            None => {}
        }
        if token.eq_ignore_ascii_case("yes") {
            return Value::Boolean(true);
        }
        if token.eq_ignore_ascii_case("no") {
            return Value::Boolean(false);
        }
        Value::Unquoted(token.to_string())
    }

    /// Short lowercase name of the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Boolean(_) => "boolean",
            Value::Quoted(_) => "quoted",
            Value::Unquoted(_) => "unquoted",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Real(n) => {
                // Display never uses an exponent; only the decimal point may be missing.
                let text = n.to_string();
                if text.contains('.') {
                    f.write_str(&text)
                } else {
                    write!(f, "{}.0", text)
                }
            }
            Value::Boolean(true) => f.write_str("yes"),
            Value::Boolean(false) => f.write_str("no"),
            Value::Quoted(s) => write!(f, "\"{}\"", s),
            Value::Unquoted(s) => f.write_str(s),
        }
    }
}

enum NumericShape {
    Integer,
    Real,
}

/// `[+-]?\d+` is an integer, `[+-]?\d+\.\d*` is a real; anything else is neither.
fn numeric_shape(token: &str) -> Option<NumericShape> {
    let digits = token
        .strip_prefix(|c: char| c == '+' || c == '-')
        .unwrap_or(token);
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (digits, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match frac_part {
        None => Some(NumericShape::Integer),
        Some(frac) if frac.bytes().all(|b| b.is_ascii_digit()) => Some(NumericShape::Real),
        Some(_) => None,
    }
}

/// The token between a key and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Assign => "=",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
        }
    }

    /// Comparison operators turn an assignment into a query.
    pub fn is_comparison(self) -> bool {
        !matches!(self, Operator::Assign)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if a character may appear in an unquoted string.
pub fn is_bare_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.' | ':' | '?' | '@' | '[' | ']')
}

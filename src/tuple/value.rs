use std::fmt::Display;

/// A single immutable field value.
///
/// The enum is closed: every variant owns its data and nothing can be
/// mutated through a `Value` once constructed, so a tuple built from these
/// is transitively immutable. Matching compares dynamic types, which the
/// variants encode: an `I32(5)` never equals an `I64(5)`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Boolean(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Arbitrary-precision decimal kept in a normalised textual form; equal
    /// numbers compare equal through their normalised text. Build one with
    /// [`Value::decimal`].
    Decimal(String),
    Char(char),
    Str(String),
    Uri(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// An enumeration constant, identified by its type and variant names.
    Enum { type_name: String, variant: String },
    /// A finite container recursively composed of immutable values.
    List(Vec<Value>),
}

impl Value {
    /// Builds a `Decimal` from its textual form, normalising the sign, a
    /// redundant integer part, and trailing fractional zeros so that equal
    /// numbers share one representation.
    pub fn decimal(text: &str) -> Self {
        Value::Decimal(normalise_decimal(text))
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Boolean(val) => *val,
            _ => unreachable!(),
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Value::I8(val) => *val as i64,
            Value::I16(val) => *val as i64,
            Value::I32(val) => *val as i64,
            Value::I64(val) => *val,
            _ => unreachable!(),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::F32(val) => *val as f64,
            Value::F64(val) => *val,
            _ => unreachable!(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::Str(val) | Value::Uri(val) | Value::Decimal(val) => val,
            _ => unreachable!(),
        }
    }

    pub fn as_list(&self) -> &[Value] {
        match self {
            Value::List(val) => val,
            _ => unreachable!(),
        }
    }
}

/// Strips a leading '+', superfluous leading zeros, and trailing fractional
/// zeros; `".5"` becomes `"0.5"`, `"-0"` becomes `"0"`.
fn normalise_decimal(text: &str) -> String {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part.trim_end_matches('0')),
        None => (digits, ""),
    };
    let int_part = int_part.trim_start_matches('0');
    let int_part = if int_part.is_empty() { "0" } else { int_part };

    let mut out = String::new();
    if negative && !(int_part == "0" && frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(int_part);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(val) => Display::fmt(val, f),
            Value::I8(val) => Display::fmt(val, f),
            Value::I16(val) => Display::fmt(val, f),
            Value::I32(val) => Display::fmt(val, f),
            Value::I64(val) => Display::fmt(val, f),
            Value::F32(val) => Display::fmt(val, f),
            Value::F64(val) => Display::fmt(val, f),
            Value::Decimal(val) => Display::fmt(val, f),
            Value::Char(val) => Display::fmt(val, f),
            Value::Str(val) => Display::fmt(val, f),
            Value::Uri(val) => Display::fmt(val, f),
            Value::Timestamp(val) => write!(f, "@{}", val),
            Value::Enum { type_name, variant } => write!(f, "{}::{}", type_name, variant),
            Value::List(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    Display::fmt(value, f)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Value;

    #[test]
    fn equality_is_type_aware() {
        assert_eq!(Value::I32(5), Value::I32(5));
        assert_ne!(Value::I32(5), Value::I64(5));
        assert_ne!(Value::Str("5".to_owned()), Value::Uri("5".to_owned()));
        assert_ne!(Value::F32(1.0), Value::F64(1.0));
    }

    #[test]
    fn decimal_normalisation() {
        assert_eq!(Value::decimal("1.50"), Value::decimal("01.5"));
        assert_eq!(Value::decimal("+2"), Value::decimal("2.000"));
        assert_eq!(Value::decimal("-0"), Value::decimal("0.0"));
        assert_eq!(Value::decimal(".5"), Value::decimal("0.50"));
        assert_ne!(Value::decimal("1.5"), Value::decimal("1.51"));
        assert_eq!(Value::decimal("-3.10"), Value::Decimal("-3.1".to_owned()));
    }

    #[test]
    fn lists_compare_recursively() {
        let left = Value::List(vec![Value::I64(1), Value::Str("a".to_owned())]);
        let right = Value::List(vec![Value::I64(1), Value::Str("a".to_owned())]);
        assert_eq!(left, right);
        assert_ne!(left, Value::List(vec![Value::I64(1)]));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Value::I64(42).to_string(), "42");
        let value = Value::Enum {
            type_name: "Suit".to_owned(),
            variant: "Spades".to_owned(),
        };
        assert_eq!(value.to_string(), "Suit::Spades");
        let list = Value::List(vec![Value::Boolean(true), Value::Char('x')]);
        assert_eq!(list.to_string(), "[true, x]");
    }
}

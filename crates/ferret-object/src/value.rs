//! The runtime value representation.
//!
//! Values here are a plain tagged enum rather than a packed word. The cache
//! engine only needs cheap clones, honest type tags and identity semantics
//! that match the object model; it never stores values in machine registers.

use std::fmt;
use std::sync::Arc;

use num_bigint::BigInt;

use crate::atom::{Atom, JsSymbol};
use crate::object::ObjectRef;

// ==================== ValueTag ====================

/// Discriminant of a [`Value`], used as a one-byte guard immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueTag {
    /// `undefined`
    Undefined = 0,
    /// `null`
    Null = 1,
    /// `true` / `false`
    Boolean = 2,
    /// 32-bit integer
    Int32 = 3,
    /// 64-bit float
    Double = 4,
    /// Interned string
    String = 5,
    /// Unique symbol
    Symbol = 6,
    /// Arbitrary-precision integer
    BigInt = 7,
    /// Object reference
    Object = 8,
}

impl ValueTag {
    /// Decode a tag from its byte encoding.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Undefined),
            1 => Some(Self::Null),
            2 => Some(Self::Boolean),
            3 => Some(Self::Int32),
            4 => Some(Self::Double),
            5 => Some(Self::String),
            6 => Some(Self::Symbol),
            7 => Some(Self::BigInt),
            8 => Some(Self::Object),
            _ => None,
        }
    }
}

// ==================== Value ====================

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    /// The `undefined` value.
    Undefined,
    /// The `null` value.
    Null,
    /// A boolean.
    Boolean(bool),
    /// An integer that fits in 32 bits. `Int32` and `Double` are distinct
    /// tags; numeric equality across them goes through [`Value::as_number`].
    Int32(i32),
    /// A double-precision float.
    Double(f64),
    /// An interned string.
    String(Atom),
    /// A symbol.
    Symbol(JsSymbol),
    /// A big integer.
    BigInt(Arc<BigInt>),
    /// An object reference. Equality is reference identity.
    Object(ObjectRef),
}

impl Value {
    /// Wrap an `i32`.
    #[inline]
    pub fn int32(value: i32) -> Self {
        Value::Int32(value)
    }

    /// Wrap an `f64`, canonicalizing integral values into `Int32` when they
    /// fit exactly (negative zero stays a double).
    pub fn number(value: f64) -> Self {
        if value.fract() == 0.0
            && value >= i32::MIN as f64
            && value <= i32::MAX as f64
            && !(value == 0.0 && value.is_sign_negative())
        {
            Value::Int32(value as i32)
        } else {
            Value::Double(value)
        }
    }

    /// The value's tag.
    pub fn tag(&self) -> ValueTag {
        match self {
            Value::Undefined => ValueTag::Undefined,
            Value::Null => ValueTag::Null,
            Value::Boolean(_) => ValueTag::Boolean,
            Value::Int32(_) => ValueTag::Int32,
            Value::Double(_) => ValueTag::Double,
            Value::String(_) => ValueTag::String,
            Value::Symbol(_) => ValueTag::Symbol,
            Value::BigInt(_) => ValueTag::BigInt,
            Value::Object(_) => ValueTag::Object,
        }
    }

    /// True for `Object`.
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// True for `Undefined` or `Null`.
    #[inline]
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// True for `Int32` or `Double`.
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Double(_))
    }

    /// The object payload, if any.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// The string payload, if any.
    pub fn as_string(&self) -> Option<&Atom> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of `Int32` and `Double` values.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(f64::from(*i)),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// The int32 payload, if the value carries that exact tag.
    pub fn as_int32(&self) -> Option<i32> {
        match self {
            Value::Int32(i) => Some(*i),
            _ => None,
        }
    }

    /// Same-value-ish equality used by guards and tests: identity for
    /// objects, symbols and strings, numeric equality across `Int32` and
    /// `Double` (NaN equals NaN so caches can compare stored results).
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => {
                    if a.is_nan() && b.is_nan() {
                        true
                    } else {
                        a == b && a.is_sign_negative() == b.is_sign_negative()
                    }
                }
                _ => false,
            },
        }
    }

    /// `ToBoolean` for the tags this model supports.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Int32(i) => *i != 0,
            Value::Double(d) => *d != 0.0 && !d.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Symbol(_) | Value::Object(_) => true,
            Value::BigInt(b) => **b != BigInt::from(0),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{:?}", s.as_str()),
            Value::Symbol(s) => write!(f, "Symbol#{}", s.id()),
            Value::BigInt(b) => write!(f, "{b}n"),
            Value::Object(o) => write!(f, "[object @{:p}]", Arc::as_ptr(o)),
        }
    }
}

// ==================== Coercions ====================

/// String-to-number conversion used by coercion guards and the generic
/// compare/arith paths. Follows the numeric-literal subset this model
/// supports: optional sign, decimal digits, fraction, exponent. Whitespace
/// is trimmed; the empty string is zero; anything else is NaN.
pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// String-to-int32 conversion: succeeds only when the string is a canonical
/// base-10 int32, so guards on this path fail rather than silently round.
pub fn string_to_int32(text: &str) -> Option<i32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let stripped = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if stripped != "0" && stripped.starts_with('0') {
        return None;
    }
    trimmed.parse::<i32>().ok()
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomTable;

    #[test]
    fn test_number_canonicalization() {
        assert!(matches!(Value::number(3.0), Value::Int32(3)));
        assert!(matches!(Value::number(3.5), Value::Double(_)));
        assert!(matches!(Value::number(-0.0), Value::Double(_)));
        assert!(matches!(Value::number(1e100), Value::Double(_)));
    }

    #[test]
    fn test_same_value_across_numeric_tags() {
        assert!(Value::Int32(7).same_value(&Value::Double(7.0)));
        assert!(!Value::Int32(7).same_value(&Value::Double(7.5)));
        assert!(Value::Double(f64::NAN).same_value(&Value::Double(f64::NAN)));
        assert!(!Value::Double(0.0).same_value(&Value::Double(-0.0)));
    }

    #[test]
    fn test_tag_round_trip() {
        for tag in [
            ValueTag::Undefined,
            ValueTag::Null,
            ValueTag::Boolean,
            ValueTag::Int32,
            ValueTag::Double,
            ValueTag::String,
            ValueTag::Symbol,
            ValueTag::BigInt,
            ValueTag::Object,
        ] {
            assert_eq!(ValueTag::from_byte(tag as u8), Some(tag));
        }
        assert_eq!(ValueTag::from_byte(200), None);
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("  42  "), 42.0);
        assert_eq!(string_to_number("-1.5e2"), -150.0);
        assert!(string_to_number("pelican").is_nan());
    }

    #[test]
    fn test_string_to_int32() {
        assert_eq!(string_to_int32("42"), Some(42));
        assert_eq!(string_to_int32("-7"), Some(-7));
        assert_eq!(string_to_int32("042"), None);
        assert_eq!(string_to_int32("4.5"), None);
        assert_eq!(string_to_int32("2147483648"), None);
    }

    #[test]
    fn test_to_boolean() {
        let table = AtomTable::new();
        assert!(!Value::Undefined.to_boolean());
        assert!(!Value::Int32(0).to_boolean());
        assert!(!Value::Double(f64::NAN).to_boolean());
        assert!(!Value::String(table.intern("")).to_boolean());
        assert!(Value::String(table.intern("x")).to_boolean());
        assert!(Value::Int32(-1).to_boolean());
    }
}

//! One-byte immediates: call flags and operator selectors.

// ==================== Call flags ====================

/// How a call site's stack maps onto callee, `this` and arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArgFormat {
    /// `callee(this, arg0..argN)` laid out directly.
    Standard = 1,
    /// Last argument is a packed array to spread.
    Spread = 2,
    /// `fun.call(thisArg, args..)`: the real callee is the `this` slot.
    FunCall = 3,
    /// `fun.apply(thisArg, argsArray)` with a packed-array argument.
    FunApplyArray = 4,
}

impl ArgFormat {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Self::Standard),
            2 => Some(Self::Spread),
            3 => Some(Self::FunCall),
            4 => Some(Self::FunApplyArray),
            _ => None,
        }
    }
}

/// Call-shape flags encoded into one byte alongside call ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFlags {
    /// Argument layout.
    pub format: ArgFormat,
    /// `new` call.
    pub constructing: bool,
    /// Callee belongs to the caller's realm.
    pub same_realm: bool,
}

impl CallFlags {
    const FORMAT_MASK: u8 = 0b0000_1111;
    const CONSTRUCTING: u8 = 1 << 4;
    const SAME_REALM: u8 = 1 << 5;

    /// Plain same-realm call.
    pub const fn standard() -> Self {
        Self { format: ArgFormat::Standard, constructing: false, same_realm: true }
    }

    /// Encode to the instruction byte.
    pub fn to_byte(self) -> u8 {
        let mut byte = self.format as u8;
        if self.constructing {
            byte |= Self::CONSTRUCTING;
        }
        if self.same_realm {
            byte |= Self::SAME_REALM;
        }
        byte
    }

    /// Decode from the instruction byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let format = ArgFormat::from_bits(byte & Self::FORMAT_MASK)?;
        Some(Self {
            format,
            constructing: byte & Self::CONSTRUCTING != 0,
            same_realm: byte & Self::SAME_REALM != 0,
        })
    }
}

// ==================== Operator selectors ====================

/// Comparison operator immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompareOp {
    /// `<`
    Lt = 0,
    /// `<=`
    Le = 1,
    /// `>`
    Gt = 2,
    /// `>=`
    Ge = 3,
    /// `==`
    Eq = 4,
    /// `!=`
    Ne = 5,
    /// `===`
    StrictEq = 6,
    /// `!==`
    StrictNe = 7,
}

impl CompareOp {
    /// Decode from the instruction byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Lt),
            1 => Some(Self::Le),
            2 => Some(Self::Gt),
            3 => Some(Self::Ge),
            4 => Some(Self::Eq),
            5 => Some(Self::Ne),
            6 => Some(Self::StrictEq),
            7 => Some(Self::StrictNe),
            _ => None,
        }
    }

    /// True for `==`, `!=`, `===`, `!==`.
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::StrictEq | Self::StrictNe)
    }

    /// True for `===` and `!==`.
    pub fn is_strict(self) -> bool {
        matches!(self, Self::StrictEq | Self::StrictNe)
    }

    /// True for the negated operators `!=` and `!==`.
    pub fn is_negated(self) -> bool {
        matches!(self, Self::Ne | Self::StrictNe)
    }

    /// Apply to a total ordering, as computed for strings and big
    /// integers.
    pub fn apply_to_ordering(self, ord: std::cmp::Ordering) -> bool {
        match self {
            Self::Lt => ord.is_lt(),
            Self::Le => ord.is_le(),
            Self::Gt => ord.is_gt(),
            Self::Ge => ord.is_ge(),
            Self::Eq | Self::StrictEq => ord.is_eq(),
            Self::Ne | Self::StrictNe => ord.is_ne(),
        }
    }

    /// Apply to an already-computed ordering/equality on numbers.
    pub fn apply_to_f64(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq | Self::StrictEq => lhs == rhs,
            Self::Ne | Self::StrictNe => lhs != rhs,
        }
    }
}

/// Unary arithmetic operator immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnaryArithOp {
    /// `+x` (to-number)
    Pos = 0,
    /// `-x`
    Neg = 1,
    /// `++x` / `x++`
    Inc = 2,
    /// `--x` / `x--`
    Dec = 3,
    /// `~x`
    BitNot = 4,
}

impl UnaryArithOp {
    /// Decode from the instruction byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Pos),
            1 => Some(Self::Neg),
            2 => Some(Self::Inc),
            3 => Some(Self::Dec),
            4 => Some(Self::BitNot),
            _ => None,
        }
    }
}

/// Binary arithmetic operator immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinaryArithOp {
    /// `+`
    Add = 0,
    /// `-`
    Sub = 1,
    /// `*`
    Mul = 2,
    /// `/`
    Div = 3,
    /// `%`
    Mod = 4,
    /// `&`
    BitAnd = 5,
    /// `|`
    BitOr = 6,
    /// `^`
    BitXor = 7,
    /// `<<`
    Lsh = 8,
    /// `>>`
    Rsh = 9,
}

impl BinaryArithOp {
    /// Decode from the instruction byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Add),
            1 => Some(Self::Sub),
            2 => Some(Self::Mul),
            3 => Some(Self::Div),
            4 => Some(Self::Mod),
            5 => Some(Self::BitAnd),
            6 => Some(Self::BitOr),
            7 => Some(Self::BitXor),
            8 => Some(Self::Lsh),
            9 => Some(Self::Rsh),
            _ => None,
        }
    }

    /// True for the bitwise group, whose results are always int32.
    pub fn is_bitwise(self) -> bool {
        matches!(self, Self::BitAnd | Self::BitOr | Self::BitXor | Self::Lsh | Self::Rsh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_flags_round_trip() {
        for format in [ArgFormat::Standard, ArgFormat::Spread, ArgFormat::FunCall, ArgFormat::FunApplyArray] {
            for constructing in [false, true] {
                for same_realm in [false, true] {
                    let flags = CallFlags { format, constructing, same_realm };
                    assert_eq!(CallFlags::from_byte(flags.to_byte()), Some(flags));
                }
            }
        }
        assert_eq!(CallFlags::from_byte(0), None);
    }

    #[test]
    fn test_compare_op_properties() {
        assert!(CompareOp::StrictEq.is_strict());
        assert!(!CompareOp::Eq.is_strict());
        assert!(CompareOp::Ne.is_negated());
        assert!(CompareOp::Lt.apply_to_f64(1.0, 2.0));
        assert!(!CompareOp::Ge.apply_to_f64(1.0, 2.0));
        // NaN compares false under everything but Ne.
        assert!(CompareOp::Ne.apply_to_f64(f64::NAN, f64::NAN));
        assert!(!CompareOp::Eq.apply_to_f64(f64::NAN, f64::NAN));
    }
}

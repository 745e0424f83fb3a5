//! Typed operand ids.
//!
//! Every value flowing through a cache IR stream is named by a small
//! integer id. The id types here exist purely at the type level: a
//! [`ObjOperandId`] is a proof that an earlier guard established "this
//! operand holds an object". Narrowing guards hand back the same numeric
//! id wrapped in the narrower type; the original id stays valid.

use std::fmt;

/// Runtime tag of an operand id, recorded by the writer for verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperandKind {
    /// Unnarrowed value.
    Val = 0,
    /// Object reference.
    Obj = 1,
    /// 32-bit integer.
    Int32 = 2,
    /// Double (or int32 viewed as a double).
    Number = 3,
    /// Interned string.
    String = 4,
    /// Symbol.
    Symbol = 5,
    /// Boolean.
    Boolean = 6,
    /// Big integer.
    BigInt = 7,
    /// Pointer-sized integer index.
    IntPtr = 8,
}

mod sealed {
    pub trait Sealed {}
}

/// Common surface of the typed id newtypes.
pub trait OperandId: Copy + sealed::Sealed {
    /// The kind this id type witnesses.
    const KIND: OperandKind;

    /// Wrap a raw id.
    fn from_raw(id: u16) -> Self;

    /// The raw id.
    fn raw(self) -> u16;
}

macro_rules! define_operand_id {
    ($(#[doc = $doc:expr] $name:ident => $kind:ident),+ $(,)?) => {
        $(
            #[doc = $doc]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            #[repr(transparent)]
            pub struct $name(u16);

            impl $name {
                /// Wrap a raw id.
                #[inline]
                pub const fn new(id: u16) -> Self {
                    Self(id)
                }

                /// The raw id.
                #[inline]
                pub const fn id(self) -> u16 {
                    self.0
                }
            }

            impl sealed::Sealed for $name {}

            impl OperandId for $name {
                const KIND: OperandKind = OperandKind::$kind;

                #[inline]
                fn from_raw(id: u16) -> Self {
                    Self(id)
                }

                #[inline]
                fn raw(self) -> u16 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}{}", stringify!($name), self.0)
                }
            }
        )+
    };
}

define_operand_id! {
    #[doc = "Id of an unnarrowed value operand."]
    ValOperandId => Val,
    #[doc = "Id of an operand known to hold an object."]
    ObjOperandId => Obj,
    #[doc = "Id of an operand known to hold an int32."]
    Int32OperandId => Int32,
    #[doc = "Id of an operand known to hold a number (int32 or double)."]
    NumberOperandId => Number,
    #[doc = "Id of an operand known to hold a string."]
    StringOperandId => String,
    #[doc = "Id of an operand known to hold a symbol."]
    SymbolOperandId => Symbol,
    #[doc = "Id of an operand known to hold a boolean."]
    BooleanOperandId => Boolean,
    #[doc = "Id of an operand known to hold a big integer."]
    BigIntOperandId => BigInt,
    #[doc = "Id of an operand known to hold a pointer-sized index."]
    IntPtrOperandId => IntPtr,
}

/// A kind-erased operand id for generic paths (verification, diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypedOperandId {
    kind: OperandKind,
    id: u16,
}

impl TypedOperandId {
    /// Pair a raw id with its kind.
    pub const fn new(kind: OperandKind, id: u16) -> Self {
        Self { kind, id }
    }

    /// The operand kind.
    #[inline]
    pub const fn kind(self) -> OperandKind {
        self.kind
    }

    /// The raw id.
    #[inline]
    pub const fn id(self) -> u16 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_transparent() {
        let val = ValOperandId::new(3);
        assert_eq!(val.id(), 3);
        assert_eq!(ValOperandId::KIND, OperandKind::Val);

        // Narrowing keeps the numeric id.
        let obj = ObjOperandId::new(val.id());
        assert_eq!(obj.id(), val.id());
        assert_eq!(ObjOperandId::KIND, OperandKind::Obj);
    }

    #[test]
    fn test_display() {
        assert_eq!(Int32OperandId::new(7).to_string(), "Int32OperandId7");
    }
}

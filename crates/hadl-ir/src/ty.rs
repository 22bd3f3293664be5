//! Value types, constants, and the built-in operation table.
//!
//! The type lattice is deliberately small: `Bool` plus sized `Bits`,
//! `UInt`, and `SInt` up to 128 bits wide. Constants carry their bit
//! pattern in a `u128` masked to the type width, so equality on the raw
//! bits is equality of values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value type of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Single truth value.
    Bool,
    /// Raw bit vector of the given width.
    Bits(u32),
    /// Unsigned integer of the given width.
    UInt(u32),
    /// Two's-complement signed integer of the given width.
    SInt(u32),
}

impl Type {
    /// Width of this type in bits. `Bool` is one bit wide.
    pub fn bit_width(self) -> u32 {
        match self {
            Type::Bool => 1,
            Type::Bits(w) | Type::UInt(w) | Type::SInt(w) => w,
        }
    }

    pub fn is_bool(self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Type::SInt(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "Bool"),
            Type::Bits(w) => write!(f, "Bits<{}>", w),
            Type::UInt(w) => write!(f, "UInt<{}>", w),
            Type::SInt(w) => write!(f, "SInt<{}>", w),
        }
    }
}

/// Most concrete common type of two expression types, if any.
///
/// Equal types merge to themselves. Distinct types of equal width merge to
/// the raw bit vector of that width, except that one-bit vectors merge to
/// `Bool`. Types of different widths do not merge.
pub fn merge_types(a: Type, b: Type) -> Option<Type> {
    if a == b {
        return Some(a);
    }
    let w = a.bit_width();
    if w != b.bit_width() {
        return None;
    }
    if a.is_bool() || b.is_bool() {
        // Only Bits(1) can reach here with a matching width.
        return Some(Type::Bool);
    }
    Some(Type::Bits(w))
}

/// Bit mask covering `width` low bits.
fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// A typed constant value.
///
/// The bit pattern is always masked to the type width, so derived equality
/// and hashing compare values, not construction histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constant {
    bits: u128,
    ty: Type,
}

impl Constant {
    /// Build a constant from a raw bit pattern, masking to the type width.
    ///
    /// # Panics
    /// Panics when the type width is zero or above 128 bits.
    pub fn new(bits: u128, ty: Type) -> Self {
        let w = ty.bit_width();
        assert!(
            w >= 1 && w <= 128,
            "constant width {} out of the supported 1..=128 range",
            w
        );
        Constant {
            bits: bits & mask(w),
            ty,
        }
    }

    pub fn bool(value: bool) -> Self {
        Constant {
            bits: value as u128,
            ty: Type::Bool,
        }
    }

    pub fn zero(ty: Type) -> Self {
        Constant::new(0, ty)
    }

    /// All-ones pattern for the type width (`true` for `Bool`).
    pub fn ones(ty: Type) -> Self {
        Constant::new(u128::MAX, ty)
    }

    pub fn ty(self) -> Type {
        self.ty
    }

    /// Masked bit pattern.
    pub fn bits(self) -> u128 {
        self.bits
    }

    /// Value as a signed integer, sign-extending for signed types.
    pub fn as_i128(self) -> i128 {
        let w = self.ty.bit_width();
        if self.ty.is_signed() && w < 128 && (self.bits >> (w - 1)) & 1 == 1 {
            (self.bits | !mask(w)) as i128
        } else {
            self.bits as i128
        }
    }

    pub fn is_zero(self) -> bool {
        self.bits == 0
    }

    /// True when every bit of the type width is set.
    pub fn is_ones(self) -> bool {
        self.bits == mask(self.ty.bit_width())
    }

    pub fn is_true(self) -> bool {
        self.ty.is_bool() && self.bits == 1
    }

    /// Reinterpret this constant at another type, truncating or
    /// zero/sign-extending according to the source signedness.
    pub fn convert(self, to: Type) -> Constant {
        if self.ty.is_signed() {
            Constant::new(self.as_i128() as u128, to)
        } else {
            Constant::new(self.bits, to)
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ty.is_bool() {
            write!(f, "{}", self.bits == 1)
        } else if self.ty.is_signed() {
            write!(f, "{}", self.as_i128())
        } else {
            write!(f, "{}", self.bits)
        }
    }
}

/// Built-in operations usable in a `BuiltInCall` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltInOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Not,
    Neg,
    Shl,
    Shr,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

impl BuiltInOp {
    /// Number of operands the operation takes.
    pub fn arity(self) -> usize {
        match self {
            BuiltInOp::Not | BuiltInOp::Neg => 1,
            _ => 2,
        }
    }

    /// Operand order does not matter.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BuiltInOp::Add
                | BuiltInOp::Mul
                | BuiltInOp::And
                | BuiltInOp::Or
                | BuiltInOp::Xor
                | BuiltInOp::Eq
                | BuiltInOp::Neq
        )
    }

    /// Result is `Bool` regardless of operand types.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BuiltInOp::Eq
                | BuiltInOp::Neq
                | BuiltInOp::Lt
                | BuiltInOp::Leq
                | BuiltInOp::Gt
                | BuiltInOp::Geq
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltInOp::Add => "add",
            BuiltInOp::Sub => "sub",
            BuiltInOp::Mul => "mul",
            BuiltInOp::Div => "div",
            BuiltInOp::Rem => "rem",
            BuiltInOp::And => "and",
            BuiltInOp::Or => "or",
            BuiltInOp::Xor => "xor",
            BuiltInOp::Not => "not",
            BuiltInOp::Neg => "neg",
            BuiltInOp::Shl => "shl",
            BuiltInOp::Shr => "shr",
            BuiltInOp::Eq => "eq",
            BuiltInOp::Neq => "neq",
            BuiltInOp::Lt => "lt",
            BuiltInOp::Leq => "leq",
            BuiltInOp::Gt => "gt",
            BuiltInOp::Geq => "geq",
        }
    }

    /// Evaluate the operation over constant operands.
    ///
    /// `result_ty` is the type of the call node; comparisons ignore it and
    /// produce `Bool`. Returns `None` for arity mismatches and division or
    /// remainder by zero.
    pub fn eval(self, args: &[Constant], result_ty: Type) -> Option<Constant> {
        if args.len() != self.arity() {
            return None;
        }
        let a = args[0];
        if self.arity() == 1 {
            return match self {
                BuiltInOp::Not => Some(Constant::new(!a.bits(), result_ty)),
                BuiltInOp::Neg => Some(Constant::new(a.bits().wrapping_neg(), result_ty)),
                _ => None,
            };
        }
        let b = args[1];
        let signed = a.ty().is_signed();
        let out = |bits: u128| Some(Constant::new(bits, result_ty));
        let cmp = |v: bool| Some(Constant::bool(v));
        match self {
            BuiltInOp::Add => out(a.bits().wrapping_add(b.bits())),
            BuiltInOp::Sub => out(a.bits().wrapping_sub(b.bits())),
            BuiltInOp::Mul => out(a.bits().wrapping_mul(b.bits())),
            BuiltInOp::Div => {
                if b.is_zero() {
                    None
                } else if signed {
                    out(a.as_i128().wrapping_div(b.as_i128()) as u128)
                } else {
                    out(a.bits() / b.bits())
                }
            }
            BuiltInOp::Rem => {
                if b.is_zero() {
                    None
                } else if signed {
                    out(a.as_i128().wrapping_rem(b.as_i128()) as u128)
                } else {
                    out(a.bits() % b.bits())
                }
            }
            BuiltInOp::And => out(a.bits() & b.bits()),
            BuiltInOp::Or => out(a.bits() | b.bits()),
            BuiltInOp::Xor => out(a.bits() ^ b.bits()),
            BuiltInOp::Shl => {
                let sh = b.bits().min(128) as u32;
                if sh >= 128 {
                    out(0)
                } else {
                    out(a.bits() << sh)
                }
            }
            BuiltInOp::Shr => {
                let sh = b.bits().min(127) as u32;
                if signed {
                    out((a.as_i128() >> sh) as u128)
                } else {
                    out(a.bits() >> sh)
                }
            }
            BuiltInOp::Eq => cmp(a.bits() == b.bits()),
            BuiltInOp::Neq => cmp(a.bits() != b.bits()),
            BuiltInOp::Lt if signed => cmp(a.as_i128() < b.as_i128()),
            BuiltInOp::Lt => cmp(a.bits() < b.bits()),
            BuiltInOp::Leq if signed => cmp(a.as_i128() <= b.as_i128()),
            BuiltInOp::Leq => cmp(a.bits() <= b.bits()),
            BuiltInOp::Gt if signed => cmp(a.as_i128() > b.as_i128()),
            BuiltInOp::Gt => cmp(a.bits() > b.bits()),
            BuiltInOp::Geq if signed => cmp(a.as_i128() >= b.as_i128()),
            BuiltInOp::Geq => cmp(a.bits() >= b.bits()),
            BuiltInOp::Not | BuiltInOp::Neg => None,
        }
    }
}

impl fmt::Display for BuiltInOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//! The 128-bit packed record format ("atom") and the predicate micro-operations
//! evaluated directly against it.
//!
//! An atom packs a document-depth, a field name, a type tag, an inline-length
//! hint, and a 64-bit value into two 64-bit lanes. The low lane identifies
//! *what* a value is; the high lane carries the value itself. Every predicate
//! in this crate is built from a tie on the low lane plus a comparison on the
//! high lane.

use crate::error::{EngineError, Result};

/// Byte width of one packed atom on the wire and in bin arenas.
pub const ATOM_BYTES: u32 = 16;

const NAME_SHIFT: u32 = 32;
const TYPE_SHIFT: u32 = 55;
const VLEN_SHIFT: u32 = 60;

const NAME_MASK: u64 = (1 << 23) - 1;
const TYPE_MASK: u64 = (1 << 5) - 1;
const VLEN_MASK: u64 = (1 << 4) - 1;

/// The reserved name of the implicit identifier field.
pub const ID_NAME: u32 = 1;

/// BSON-derived type tags carried in bits 55..59 of the low lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    Floatnum = 1,
    Utf8String = 2,
    EmbeddedDoc = 3,
    ArrayDoc = 4,
    BinaryData = 5,
    ObjectId = 7,
    Bool = 8,
    Int32 = 16,
    Int64 = 18,
    MaxKey = 19,
    MinKey = 20,
}

impl TypeTag {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Floatnum,
            2 => Self::Utf8String,
            3 => Self::EmbeddedDoc,
            4 => Self::ArrayDoc,
            5 => Self::BinaryData,
            7 => Self::ObjectId,
            8 => Self::Bool,
            16 => Self::Int32,
            18 => Self::Int64,
            19 => Self::MaxKey,
            20 => Self::MinKey,
            _ => return None,
        })
    }

    /// True for types whose atoms are followed by nested document atoms up to
    /// a matching depth-closing atom.
    pub fn has_inner_doc(self) -> bool {
        matches!(self, Self::EmbeddedDoc | Self::ArrayDoc)
    }
}

/// A single 128-bit packed atom, as two 64-bit lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Atom {
    pub low: u64,
    pub high: u64,
}

impl Atom {
    pub fn new(docdepth: i32, name: u32, type_tag: TypeTag, vlen: u8, value: u64) -> Self {
        debug_assert!(name <= NAME_MASK as u32);
        debug_assert!(vlen as u64 <= VLEN_MASK);
        let low = (docdepth as u32 as u64)
            | ((name as u64 & NAME_MASK) << NAME_SHIFT)
            | (((type_tag as u64) & TYPE_MASK) << TYPE_SHIFT)
            | ((vlen as u64 & VLEN_MASK) << VLEN_SHIFT);
        Self { low, high: value }
    }

    /// The end-of-element sentinel: an atom whose low lane is entirely zero.
    pub fn invalid() -> Self {
        Self { low: 0, high: 0 }
    }

    pub fn is_invalid(&self) -> bool {
        self.low == 0
    }

    pub fn docdepth(&self) -> i32 {
        self.low as u32 as i32
    }

    pub fn name(&self) -> u32 {
        ((self.low >> NAME_SHIFT) & NAME_MASK) as u32
    }

    pub fn type_tag(&self) -> Option<TypeTag> {
        TypeTag::from_u8(((self.low >> TYPE_SHIFT) & TYPE_MASK) as u8)
    }

    pub fn vlen(&self) -> u8 {
        ((self.low >> VLEN_SHIFT) & VLEN_MASK) as u8
    }

    pub fn value(&self) -> u64 {
        self.high
    }

    pub fn as_f64(&self) -> f64 {
        f64::from_bits(self.high)
    }

    pub fn from_f64(docdepth: i32, name: u32, value: f64) -> Self {
        Self::new(docdepth, name, TypeTag::Floatnum, 8, value.to_bits())
    }

    /// Clears the name field, leaving depth/type/vlen untouched.
    pub fn remove_name(self) -> Self {
        Self {
            low: self.low & !(NAME_MASK << NAME_SHIFT),
            high: self.high,
        }
    }

    /// Clears the document-depth field. Used on query filter atoms so depth
    /// plays no role in the "do-not-touch" tie.
    pub fn remove_doc(self) -> Self {
        Self {
            low: self.low & !0xFFFF_FFFFu64,
            high: self.high,
        }
    }

    pub fn to_le_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.low.to_le_bytes());
        out[8..].copy_from_slice(&self.high.to_le_bytes());
        out
    }

    pub fn from_le_bytes(bytes: &[u8; 16]) -> Self {
        let low = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        let high = u64::from_le_bytes(bytes[8..].try_into().unwrap());
        Self { low, high }
    }
}

/// Comparison predicate operators (wire values from the LFT operator table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Operator {
    Eq = 1,
    Gt = 2,
    Gte = 3,
    Lt = 5,
    Lte = 6,
    Ne = 7,
}

impl TryFrom<u32> for Operator {
    type Error = EngineError;

    fn try_from(v: u32) -> Result<Self> {
        Ok(match v {
            1 => Self::Eq,
            2 => Self::Gt,
            3 => Self::Gte,
            5 => Self::Lt,
            6 => Self::Lte,
            7 => Self::Ne,
            other => {
                return Err(EngineError::MalformedQuery(format!(
                    "unsupported comparison operator {other}"
                )))
            }
        })
    }
}

/// Evaluates a comparison predicate: the low lanes of `filter` and `actual`
/// must tie exactly, and the high lanes are compared per `op` — as IEEE-754
/// doubles when `actual` is `Floatnum`, otherwise as signed 64-bit integers.
pub fn evaluate(op: Operator, filter: Atom, actual: Atom) -> bool {
    if actual.low != filter.low {
        return false;
    }
    if actual.type_tag() == Some(TypeTag::Floatnum) {
        let a = actual.as_f64();
        let f = filter.as_f64();
        match op {
            Operator::Eq => a == f,
            Operator::Ne => a != f,
            Operator::Gt => a > f,
            Operator::Gte => a >= f,
            Operator::Lt => a < f,
            Operator::Lte => a <= f,
        }
    } else {
        let a = actual.high as i64;
        let f = filter.high as i64;
        match op {
            Operator::Eq => a == f,
            Operator::Ne => a != f,
            Operator::Gt => a > f,
            Operator::Gte => a >= f,
            Operator::Lt => a < f,
            Operator::Lte => a <= f,
        }
    }
}

/// Associative accumulator operators used by aggregate leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AccOp {
    Sum = 28,
    Count = 32,
    Min = 33,
    Max = 34,
}

impl TryFrom<u32> for AccOp {
    type Error = EngineError;

    fn try_from(v: u32) -> Result<Self> {
        Ok(match v {
            28 => Self::Sum,
            32 => Self::Count,
            33 => Self::Min,
            34 => Self::Max,
            other => {
                return Err(EngineError::MalformedQuery(format!(
                    "unsupported accumulator operator {other}"
                )))
            }
        })
    }
}

impl AccOp {
    /// Folds `value` into `acc` per this operator's semantics.
    pub fn merge(self, acc: f64, value: f64) -> f64 {
        match self {
            Self::Sum => acc + value,
            Self::Count => acc + 1.0,
            Self::Min => acc.min(value),
            Self::Max => acc.max(value),
        }
    }

    /// The accumulator's seed value before any input has been folded in.
    pub fn identity(self) -> f64 {
        match self {
            Self::Sum | Self::Count => 0.0,
            Self::Min => f64::INFINITY,
            Self::Max => f64::NEG_INFINITY,
        }
    }
}

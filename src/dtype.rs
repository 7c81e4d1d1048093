// src/dtype.rs

//! Element types a [`Matrix`](crate::Matrix) can hold, and what each of them
//! is allowed to do.

use serde::{Deserialize, Serialize};

/// Closed set of element types.
///
/// The facade branches on this once, in the validator; everything past
/// validation is generic over a concrete scalar type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
    /// complex with `f32` components
    C32,
    /// complex with `f64` components
    C64,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// opaque host values
    Object,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Family {
    RealFloat,
    ComplexFloat,
    Integer,
    Opaque,
}

impl DType {
    const fn family(self) -> Family {
        match self {
            Self::F32 | Self::F64 => Family::RealFloat,
            Self::C32 | Self::C64 => Family::ComplexFloat,
            Self::I32 | Self::I64 => Family::Integer,
            Self::Object => Family::Opaque,
        }
    }

    /// Capability table: decompositions are defined over floating point
    /// elements only.
    pub const fn is_decomposable(self) -> bool {
        matches!(self.family(), Family::RealFloat | Family::ComplexFloat)
    }

    #[inline]
    pub const fn is_complex(self) -> bool {
        matches!(self.family(), Family::ComplexFloat)
    }

    const fn is_double(self) -> bool {
        matches!(self, Self::F64 | Self::C64)
    }

    /// Common decomposable type for two operands.
    ///
    /// Precision widens to double if either side is double; the result is
    /// complex if either side is complex. Returns `None` when either side is
    /// not decomposable.
    pub const fn promote(self, other: Self) -> Option<Self> {
        if !self.is_decomposable() || !other.is_decomposable() {
            return None;
        }
        let double = self.is_double() || other.is_double();
        let complex = self.is_complex() || other.is_complex();
        Some(match (complex, double) {
            (false, false) => Self::F32,
            (false, true) => Self::F64,
            (true, false) => Self::C32,
            (true, true) => Self::C64,
        })
    }
}

// src/error.rs

//! Error kinds raised by the decomposition facade.

use crate::dtype::DType;
use crate::matrix::StorageKind;
use std::fmt;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LinalgError>;

/// The caller-facing operations. Carried by every error so a failure names
/// the call that produced it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Solve,
    Invert,
    Posv,
    Potrf,
    Getrf,
    LuSolve,
    Geev,
    Gesvd,
    Gesdd,
}

impl Operation {
    /// Name of the operation as exposed to callers.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Solve => "solve",
            Self::Invert => "invert",
            Self::Posv => "posv",
            Self::Potrf => "potrf",
            Self::Getrf => "getrf",
            Self::LuSolve => "lu_solve",
            Self::Geev => "geev",
            Self::Gesvd => "gesvd",
            Self::Gesdd => "gesdd",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors returned by the facade.
///
/// `Shape`, `StorageType` and `DataType` are validation errors and are always
/// raised before the kernel is touched, so the operands are unchanged when one
/// of them is returned. `KernelFailure` and `KernelContract` come from the
/// kernel call itself; after either, the target of an in-place operation is in
/// an unspecified state.
#[derive(Error, Debug)]
pub enum LinalgError {
    /// A required shape relation does not hold.
    #[error("{op}: shape error: {detail}")]
    Shape { op: Operation, detail: String },

    /// The operand is not stored densely.
    #[error("{op}: requires dense storage, got {storage:?}")]
    StorageType { op: Operation, storage: StorageKind },

    /// The element type cannot be decomposed (integer or opaque), or two
    /// operands have no common decomposable type.
    #[error("{op}: unsupported element type {dtype:?}")]
    DataType { op: Operation, dtype: DType },

    /// The kernel reported a non-zero `info` status.
    ///
    /// Negative values flag an illegal argument; positive values are
    /// routine-specific (singular pivot, leading minor not positive definite,
    /// failure to converge).
    #[error("{op}: kernel routine {routine} failed with info = {info}")]
    KernelFailure {
        op: Operation,
        routine: &'static str,
        info: i32,
    },

    /// Buffers handed to the kernel, or its output, break the routine's contract.
    #[error("{op}: kernel routine {routine} broke its output contract: {detail}")]
    KernelContract {
        op: Operation,
        routine: &'static str,
        detail: String,
    },

    /// Saving or loading a factorization failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl LinalgError {
    pub(crate) fn shape(op: Operation, detail: impl Into<String>) -> Self {
        Self::Shape {
            op,
            detail: detail.into(),
        }
    }

    /// The operation that raised this error, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Shape { op, .. }
            | Self::StorageType { op, .. }
            | Self::DataType { op, .. }
            | Self::KernelFailure { op, .. }
            | Self::KernelContract { op, .. } => Some(*op),
            Self::Persistence(_) => None,
        }
    }

    /// True for the errors raised before any kernel call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Shape { .. } | Self::StorageType { .. } | Self::DataType { .. }
        )
    }
}

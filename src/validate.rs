// src/validate.rs

//! Pre-kernel checks. Nothing here has side effects; every check runs before
//! any buffer is copied or handed to the kernel.

use crate::dtype::DType;
use crate::error::{LinalgError, Operation, Result};
use crate::matrix::Matrix;

/// Shape requirements per operation.
#[derive(Copy, Clone, Debug)]
struct Requirements {
    square: bool,
    rhs: bool,
}

const fn requirements(op: Operation) -> Requirements {
    match op {
        Operation::Solve | Operation::Posv | Operation::LuSolve => Requirements {
            square: true,
            rhs: true,
        },
        Operation::Invert | Operation::Potrf | Operation::Geev => Requirements {
            square: true,
            rhs: false,
        },
        Operation::Getrf | Operation::Gesvd | Operation::Gesdd => Requirements {
            square: false,
            rhs: false,
        },
    }
}

/// Both dimensions must be at least one.
pub fn check_non_empty(op: Operation, (rows, cols): (usize, usize)) -> Result<()> {
    if rows == 0 || cols == 0 {
        return Err(LinalgError::shape(
            op,
            format!("matrix must have at least one row and column, got {}x{}", rows, cols),
        ));
    }
    Ok(())
}

pub fn check_square(op: Operation, (rows, cols): (usize, usize)) -> Result<()> {
    check_non_empty(op, (rows, cols))?;
    if rows != cols {
        return Err(LinalgError::shape(
            op,
            format!("matrix must be square, got {}x{}", rows, cols),
        ));
    }
    Ok(())
}

/// `b` must have as many rows as `a` and at least one column.
pub fn check_rhs(op: Operation, a: (usize, usize), b: (usize, usize)) -> Result<()> {
    check_non_empty(op, b)?;
    if a.0 != b.0 {
        return Err(LinalgError::shape(
            op,
            format!(
                "right-hand side has {} rows but the coefficient matrix has {}",
                b.0, a.0
            ),
        ));
    }
    Ok(())
}

/// Shape checks for a typed operand pair. `b` is ignored by operations
/// without a right-hand side.
pub fn check_shapes(op: Operation, a: (usize, usize), b: Option<(usize, usize)>) -> Result<()> {
    let req = requirements(op);
    if req.square {
        check_square(op, a)?;
    } else {
        check_non_empty(op, a)?;
    }
    if req.rhs {
        match b {
            Some(b) => check_rhs(op, a, b)?,
            None => {
                return Err(LinalgError::shape(op, "a right-hand side is required"));
            }
        }
    }
    Ok(())
}

fn check_storage(op: Operation, m: &Matrix) -> Result<()> {
    if !m.is_dense() {
        return Err(LinalgError::StorageType {
            op,
            storage: m.storage(),
        });
    }
    Ok(())
}

fn check_dtype(op: Operation, m: &Matrix) -> Result<()> {
    let dtype = m.dtype();
    if !dtype.is_decomposable() {
        return Err(LinalgError::DataType { op, dtype });
    }
    Ok(())
}

/// Full check of one or two host matrices for `op`.
///
/// Returns the element type the operation will run in: the operand's own
/// type, or the promoted common type of both operands.
pub fn validate(op: Operation, a: &Matrix, b: Option<&Matrix>) -> Result<DType> {
    check_storage(op, a)?;
    check_dtype(op, a)?;
    if let Some(b) = b {
        check_storage(op, b)?;
        check_dtype(op, b)?;
    }
    check_shapes(op, a.shape(), b.map(Matrix::shape))?;
    let dtype = match b {
        Some(b) => a.dtype().promote(b.dtype()).ok_or(LinalgError::DataType {
            op,
            dtype: b.dtype(),
        })?,
        None => a.dtype(),
    };
    Ok(dtype)
}

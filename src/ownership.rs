// src/ownership.rs

//! Copies handed to the kernel by non-mutating operations.
//!
//! The kernel overwrites whatever buffer it is given. Operations that promise
//! to leave their operands alone go through [`working_copy`] first; in-place
//! operations skip it and pass the caller's buffer straight through.

use crate::matrix::Layout;
use ndarray::{Array2, ArrayView2};

/// Deep copy of `a` with its own storage, in the requested memory order.
pub fn independent_copy<T: Clone>(a: ArrayView2<'_, T>, layout: Layout) -> Array2<T> {
    match layout {
        Layout::RowMajor => a.as_standard_layout().into_owned(),
        // Standard layout of the transpose is column-major order of `a`.
        Layout::ColumnMajor => a.t().as_standard_layout().into_owned().reversed_axes(),
    }
}

/// Column-major copy of `a`, the kernel's native order.
#[inline]
pub fn working_copy<T: Clone>(a: ArrayView2<'_, T>) -> Array2<T> {
    independent_copy(a, Layout::ColumnMajor)
}

// src/config.rs

//! Tunables for the matrix-level facade.

use crate::linalg_backends::{SvdVectors, Uplo};
use crate::matrix::Layout;
use serde::{Deserialize, Serialize};

/// Settings that shape how [`DenseLinalg`](crate::DenseLinalg) runs each
/// operation. None of them change the mathematical result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinalgConfig {
    /// Memory order of the owned work copies made for non-mutating
    /// operations. Column-major buffers reach the kernel without a further
    /// copy; row-major ones are transposed into scratch space per call.
    pub work_layout: Layout,

    /// Vector sets computed by `gesvd` and `gesdd`.
    pub svd_vectors: SvdVectors,

    /// Triangle of the coefficient matrix read by `posv`.
    pub cholesky_triangle: Uplo,
}

impl Default for LinalgConfig {
    fn default() -> Self {
        LinalgConfig {
            work_layout: Layout::ColumnMajor,
            svd_vectors: SvdVectors::All,
            cholesky_triangle: Uplo::Upper,
        }
    }
}

impl LinalgConfig {
    pub fn with_work_layout(mut self, layout: Layout) -> Self {
        self.work_layout = layout;
        self
    }

    pub fn with_svd_vectors(mut self, vectors: SvdVectors) -> Self {
        self.svd_vectors = vectors;
        self
    }

    pub fn with_cholesky_triangle(mut self, uplo: Uplo) -> Self {
        self.cholesky_triangle = uplo;
        self
    }
}

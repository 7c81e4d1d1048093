// src/facade.rs

//! Matrix-level entry points.
//!
//! [`DenseLinalg`] takes host [`Matrix`] values, runs the full validation
//! (storage, element type, shape) before anything is copied or handed to the
//! kernel, promotes mixed operand types to a common decomposable type, and
//! dispatches to the typed orchestrators. Results come back as `Matrix`
//! values again; eigenvalues and singular values as single-column matrices.

use crate::config::LinalgConfig;
use crate::dtype::DType;
use crate::eigen::{self, EigenValues, EigenVectors, Eigenpairs, EigenvectorRequest};
use crate::error::{LinalgError, Operation, Result};
use crate::factorize::{self, LuFactors};
use crate::linalg_backends::{BackendLu, KernelBoundary, KernelScalar, LapackBackend, PivotVector, Uplo};
use crate::matrix::{Elements, Matrix};
use crate::svd::{self, Svd};
use crate::validate::validate;
use log::debug;
use ndarray::{Array1, Array2, Axis};
use num_complex::Complex;

/// Runs `$body` with `$a` bound to the typed buffer of a decomposable
/// element type. Other element types are a `DataType` error for `$op`.
macro_rules! dispatch {
    ($elements:expr, $op:expr, $a:ident => $body:expr) => {
        match $elements {
            Elements::F32($a) => $body,
            Elements::F64($a) => $body,
            Elements::C32($a) => $body,
            Elements::C64($a) => $body,
            other => Err(LinalgError::DataType {
                op: $op,
                dtype: other.dtype(),
            }),
        }
    };
}

/// Two-operand form of [`dispatch!`]; both operands must already share one type.
macro_rules! dispatch_pair {
    ($lhs:expr, $rhs:expr, $op:expr, ($a:ident, $b:ident) => $body:expr) => {
        match ($lhs, $rhs) {
            (Elements::F32($a), Elements::F32($b)) => $body,
            (Elements::F64($a), Elements::F64($b)) => $body,
            (Elements::C32($a), Elements::C32($b)) => $body,
            (Elements::C64($a), Elements::C64($b)) => $body,
            (a, b) => Err(LinalgError::DataType {
                op: $op,
                dtype: if a.dtype().is_decomposable() { b.dtype() } else { a.dtype() },
            }),
        }
    };
}

/// Dense decompositions over host matrices.
///
/// `K` is the kernel the typed orchestrators call; the default calls the
/// linked LAPACK library.
#[derive(Debug, Clone, Default)]
pub struct DenseLinalg<K = LapackBackend> {
    kernel: K,
    config: LinalgConfig,
}

impl DenseLinalg<LapackBackend> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: KernelBoundary> DenseLinalg<K> {
    /// Facade over a custom kernel with the default configuration.
    pub fn with_kernel(kernel: K) -> Self {
        Self {
            kernel,
            config: LinalgConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LinalgConfig) -> Self {
        self.config = config;
        self
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn config(&self) -> &LinalgConfig {
        &self.config
    }

    /// Owned copy of `m` as `dtype`, in the configured work layout.
    fn work_copy(&self, op: Operation, m: &Matrix, dtype: DType) -> Result<Matrix> {
        if m.dtype() == dtype {
            return Ok(m.to_layout(self.config.work_layout));
        }
        debug!("{}: promoting {:?} operand to {:?}", op, m.dtype(), dtype);
        m.cast(dtype)
            .map(|promoted| promoted.to_layout(self.config.work_layout))
            .ok_or(LinalgError::DataType { op, dtype: m.dtype() })
    }

    /// Solves `A·X = B` through LU. Neither operand is modified.
    pub fn solve(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        let op = Operation::Solve;
        let dtype = validate(op, a, Some(b))?;
        let mut lu = self.work_copy(op, a, dtype)?;
        let mut x = self.work_copy(op, b, dtype)?;
        dispatch_pair!(lu.elements_mut(), x.elements_mut(), op, (lu, x) => {
            factorize::solve_in_place(&self.kernel, lu, x).map(|_| ())
        })?;
        Ok(x)
    }

    /// Replaces `a` with its inverse. On a kernel failure `a` is left in an
    /// unspecified state; on a validation failure it is untouched.
    pub fn invert_in_place(&self, a: &mut Matrix) -> Result<()> {
        let op = Operation::Invert;
        validate(op, a, None)?;
        dispatch!(a.elements_mut(), op, a => factorize::invert_in_place(&self.kernel, a))
    }

    /// Inverse of `a` as a new matrix.
    pub fn invert(&self, a: &Matrix) -> Result<Matrix> {
        let op = Operation::Invert;
        let dtype = validate(op, a, None)?;
        let mut inverse = self.work_copy(op, a, dtype)?;
        self.invert_in_place(&mut inverse)?;
        Ok(inverse)
    }

    /// Solves `A·X = B` for symmetric/Hermitian positive definite `A`
    /// through Cholesky, reading the configured triangle of `A`.
    pub fn posv(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        let op = Operation::Posv;
        let dtype = validate(op, a, Some(b))?;
        let uplo = self.config.cholesky_triangle;
        let mut factor = self.work_copy(op, a, dtype)?;
        let mut x = self.work_copy(op, b, dtype)?;
        dispatch_pair!(factor.elements_mut(), x.elements_mut(), op, (factor, x) => {
            factorize::posv_in_place(&self.kernel, factor, x, uplo)
        })?;
        Ok(x)
    }

    /// Cholesky factor of the `uplo` triangle, written over that triangle of `a`.
    pub fn potrf_in_place(&self, a: &mut Matrix, uplo: Uplo) -> Result<()> {
        let op = Operation::Potrf;
        validate(op, a, None)?;
        dispatch!(a.elements_mut(), op, a => factorize::potrf_in_place(&self.kernel, a, uplo))
    }

    /// Cholesky factorization of a copy of `a`.
    pub fn potrf(&self, a: &Matrix, uplo: Uplo) -> Result<Matrix> {
        let op = Operation::Potrf;
        let dtype = validate(op, a, None)?;
        let mut factor = self.work_copy(op, a, dtype)?;
        self.potrf_in_place(&mut factor, uplo)?;
        Ok(factor)
    }

    /// LU-factorizes `a` in place and returns the row interchanges.
    pub fn getrf_in_place(&self, a: &mut Matrix) -> Result<PivotVector> {
        let op = Operation::Getrf;
        validate(op, a, None)?;
        dispatch!(a.elements_mut(), op, a => factorize::getrf_in_place(&self.kernel, a))
    }

    /// LU factorization of a copy of `a`, ready for [`lu_solve`](Self::lu_solve).
    pub fn getrf(&self, a: &Matrix) -> Result<LuFactors<Matrix>> {
        let op = Operation::Getrf;
        let dtype = validate(op, a, None)?;
        let mut factors = self.work_copy(op, a, dtype)?;
        let pivots = self.getrf_in_place(&mut factors)?;
        Ok(LuFactors { factors, pivots })
    }

    /// Solves `A·X = B` against a factorization from [`getrf`](Self::getrf).
    pub fn lu_solve(&self, lu: &LuFactors<Matrix>, b: &Matrix) -> Result<Matrix> {
        let op = Operation::LuSolve;
        let dtype = validate(op, &lu.factors, Some(b))?;
        let factors = if lu.factors.dtype() == dtype {
            lu.factors.clone()
        } else {
            self.work_copy(op, &lu.factors, dtype)?
        };
        let mut x = self.work_copy(op, b, dtype)?;
        match (factors.into_elements(), x.elements_mut()) {
            (Elements::F32(f), Elements::F32(x)) => self.lu_solve_typed(f, &lu.pivots, x),
            (Elements::F64(f), Elements::F64(x)) => self.lu_solve_typed(f, &lu.pivots, x),
            (Elements::C32(f), Elements::C32(x)) => self.lu_solve_typed(f, &lu.pivots, x),
            (Elements::C64(f), Elements::C64(x)) => self.lu_solve_typed(f, &lu.pivots, x),
            (f, _) => Err(LinalgError::DataType { op, dtype: f.dtype() }),
        }?;
        Ok(x)
    }

    fn lu_solve_typed<F>(&self, factors: Array2<F>, pivots: &PivotVector, x: &mut Array2<F>) -> Result<()>
    where
        F: KernelScalar,
        K: BackendLu<F>,
    {
        let lu = LuFactors {
            factors,
            pivots: pivots.clone(),
        };
        factorize::lu_solve_in_place(&self.kernel, &lu, x)
    }

    /// Eigenvalues (as an `n×1` column) and the requested eigenvectors of
    /// square `a`. `a` is not modified.
    ///
    /// For real input the values and vectors stay real-typed unless the
    /// spectrum contains a complex-conjugate pair.
    pub fn geev(&self, a: &Matrix, request: EigenvectorRequest) -> Result<Eigenpairs<Matrix, Matrix>> {
        let op = Operation::Geev;
        let dtype = validate(op, a, None)?;
        let mut work = self.work_copy(op, a, dtype)?;
        dispatch!(work.elements_mut(), op, w => {
            eigen::geev_in_place(&self.kernel, w, request)
                .map(|pairs| pairs.map(values_column, vectors_matrix))
        })
    }

    /// Eigenvalues of square `a` as an `n×1` column.
    pub fn eigvals(&self, a: &Matrix) -> Result<Matrix> {
        let (values, _, _) = self.geev(a, EigenvectorRequest::None)?.into_parts();
        Ok(values)
    }

    /// SVD through the standard driver. Singular values come back as a
    /// `min(m, n)×1` column of the real type matching `a`.
    pub fn gesvd(&self, a: &Matrix) -> Result<Svd<Matrix, Matrix>> {
        let op = Operation::Gesvd;
        let dtype = validate(op, a, None)?;
        let vectors = self.config.svd_vectors;
        let mut work = self.work_copy(op, a, dtype)?;
        dispatch!(work.elements_mut(), op, w => {
            svd::gesvd_in_place(&self.kernel, w, vectors).map(svd_matrices)
        })
    }

    /// SVD through the divide-and-conquer driver, same result contract as
    /// [`gesvd`](Self::gesvd).
    pub fn gesdd(&self, a: &Matrix) -> Result<Svd<Matrix, Matrix>> {
        let op = Operation::Gesdd;
        let dtype = validate(op, a, None)?;
        let vectors = self.config.svd_vectors;
        let mut work = self.work_copy(op, a, dtype)?;
        dispatch!(work.elements_mut(), op, w => {
            svd::gesdd_in_place(&self.kernel, w, vectors).map(svd_matrices)
        })
    }
}

fn column<T>(v: Array1<T>) -> Array2<T> {
    v.insert_axis(Axis(1))
}

fn values_column<R>(values: EigenValues<R>) -> Matrix
where
    Array2<R>: Into<Matrix>,
    Array2<Complex<R>>: Into<Matrix>,
{
    match values {
        EigenValues::Real(v) => column(v).into(),
        EigenValues::Complex(v) => column(v).into(),
    }
}

fn vectors_matrix<R>(vectors: EigenVectors<R>) -> Matrix
where
    Array2<R>: Into<Matrix>,
    Array2<Complex<R>>: Into<Matrix>,
{
    match vectors {
        EigenVectors::Real(v) => v.into(),
        EigenVectors::Complex(v) => v.into(),
    }
}

fn svd_matrices<F, R>(svd: Svd<Array2<F>, Array1<R>>) -> Svd<Matrix, Matrix>
where
    Array2<F>: Into<Matrix>,
    Array2<R>: Into<Matrix>,
{
    Svd {
        u: svd.u.into(),
        singular_values: column(svd.singular_values).into(),
        vt: svd.vt.into(),
    }
}

// src/factorize.rs

//! LU and Cholesky orchestrators.
//!
//! Non-mutating operations take `ArrayView2` operands and work on
//! [`working_copy`] buffers, so the caller's data cannot be touched. The
//! `*_in_place` variants take the caller's buffer by `&mut` and let the kernel
//! overwrite it; the copying variants are thin wrappers around them.

use crate::error::{LinalgError, Operation, Result};
use crate::linalg_backends::{BackendCholesky, BackendLu, KernelScalar, PivotVector, Uplo};
use crate::ownership::working_copy;
use crate::validate::{check_shapes, check_square};
use log::debug;
use ndarray::{Array2, ArrayView2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Raw LU factorization as returned by `getrf`: unit-lower `L` and upper `U`
/// packed into one matrix, plus the row interchanges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LuFactors<M> {
    pub factors: M,
    pub pivots: PivotVector,
}

impl<M: Serialize + DeserializeOwned> LuFactors<M> {
    /// Writes the factorization to `path` with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| {
            LinalgError::Persistence(format!("failed to create {:?}: {}", path.as_ref(), e))
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| LinalgError::Persistence(format!("failed to encode LU factors: {}", e)))?;
        Ok(())
    }

    /// Reads a factorization written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            LinalgError::Persistence(format!("failed to open {:?}: {}", path.as_ref(), e))
        })?;
        let mut reader = BufReader::new(file);
        bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
            .map_err(|e| LinalgError::Persistence(format!("failed to decode LU factors: {}", e)))
    }
}

/// Solves `A·X = B`, overwriting `a` with its LU factors and `b` with `X`.
/// Returns the pivots of the factorization left in `a`.
pub fn solve_in_place<F, K>(kernel: &K, a: &mut Array2<F>, b: &mut Array2<F>) -> Result<PivotVector>
where
    F: KernelScalar,
    K: BackendLu<F> + ?Sized,
{
    let op = Operation::Solve;
    check_shapes(op, a.dim(), Some(b.dim()))?;
    debug!("{}: {:?} system, {} right-hand side(s), {:?}", op, a.dim(), b.ncols(), F::DTYPE);
    let pivots = kernel.getrf(a).map_err(|e| e.during(op))?;
    kernel.getrs(a, &pivots, b).map_err(|e| e.during(op))?;
    Ok(pivots)
}

/// Solves `A·X = B` through LU with partial pivoting. Neither operand is modified.
pub fn solve<F, K>(kernel: &K, a: ArrayView2<'_, F>, b: ArrayView2<'_, F>) -> Result<Array2<F>>
where
    F: KernelScalar,
    K: BackendLu<F> + ?Sized,
{
    check_shapes(Operation::Solve, a.dim(), Some(b.dim()))?;
    let mut lu = working_copy(a);
    let mut x = working_copy(b);
    solve_in_place(kernel, &mut lu, &mut x)?;
    Ok(x)
}

/// Replaces `a` with its inverse: LU in place, then the inverse from the factors.
pub fn invert_in_place<F, K>(kernel: &K, a: &mut Array2<F>) -> Result<()>
where
    F: KernelScalar,
    K: BackendLu<F> + ?Sized,
{
    let op = Operation::Invert;
    check_square(op, a.dim())?;
    debug!("{}: {:?} in place, {:?}", op, a.dim(), F::DTYPE);
    let pivots = kernel.getrf(a).map_err(|e| e.during(op))?;
    kernel.getri(a, &pivots).map_err(|e| e.during(op))
}

/// Inverse of `a` as a new matrix.
pub fn invert<F, K>(kernel: &K, a: ArrayView2<'_, F>) -> Result<Array2<F>>
where
    F: KernelScalar,
    K: BackendLu<F> + ?Sized,
{
    check_square(Operation::Invert, a.dim())?;
    let mut inverse = working_copy(a);
    invert_in_place(kernel, &mut inverse)?;
    Ok(inverse)
}

/// LU-factorizes `a` in place and returns the pivots. `a` may be rectangular.
pub fn getrf_in_place<F, K>(kernel: &K, a: &mut Array2<F>) -> Result<PivotVector>
where
    F: KernelScalar,
    K: BackendLu<F> + ?Sized,
{
    let op = Operation::Getrf;
    check_shapes(op, a.dim(), None)?;
    debug!("{}: {:?} in place, {:?}", op, a.dim(), F::DTYPE);
    kernel.getrf(a).map_err(|e| e.during(op))
}

/// LU factorization of a copy of `a`.
pub fn getrf<F, K>(kernel: &K, a: ArrayView2<'_, F>) -> Result<LuFactors<Array2<F>>>
where
    F: KernelScalar,
    K: BackendLu<F> + ?Sized,
{
    check_shapes(Operation::Getrf, a.dim(), None)?;
    let mut factors = working_copy(a);
    let pivots = getrf_in_place(kernel, &mut factors)?;
    Ok(LuFactors { factors, pivots })
}

/// Overwrites `b` with the solution of `A·X = B`, given the factorization of `A`.
pub fn lu_solve_in_place<F, K>(kernel: &K, lu: &LuFactors<Array2<F>>, b: &mut Array2<F>) -> Result<()>
where
    F: KernelScalar,
    K: BackendLu<F> + ?Sized,
{
    let op = Operation::LuSolve;
    check_shapes(op, lu.factors.dim(), Some(b.dim()))?;
    let order = lu.factors.nrows();
    if lu.pivots.len() != order {
        return Err(LinalgError::shape(
            op,
            format!("pivot vector has {} entries, factors have order {}", lu.pivots.len(), order),
        ));
    }
    // Pivots may come from a file or a caller; the kernel would follow them blindly.
    if let Some((index, p)) = lu.pivots.out_of_range(order) {
        return Err(LinalgError::KernelContract {
            op,
            routine: "getrs",
            detail: format!("pivot {} at position {} is outside 1..={}", p, index, order),
        });
    }
    debug!("{}: order {}, {} right-hand side(s), {:?}", op, lu.factors.nrows(), b.ncols(), F::DTYPE);
    kernel
        .getrs(&lu.factors, &lu.pivots, b)
        .map_err(|e| e.during(op))
}

/// Solves `A·X = B` from a factorization previously returned by [`getrf`].
pub fn lu_solve<F, K>(kernel: &K, lu: &LuFactors<Array2<F>>, b: ArrayView2<'_, F>) -> Result<Array2<F>>
where
    F: KernelScalar,
    K: BackendLu<F> + ?Sized,
{
    check_shapes(Operation::LuSolve, lu.factors.dim(), Some(b.dim()))?;
    let mut x = working_copy(b);
    lu_solve_in_place(kernel, lu, &mut x)?;
    Ok(x)
}

/// Cholesky-factorizes the `uplo` triangle of `a` in place. The opposite
/// triangle is left as the kernel leaves it (unreferenced, unchanged).
pub fn potrf_in_place<F, K>(kernel: &K, a: &mut Array2<F>, uplo: Uplo) -> Result<()>
where
    F: KernelScalar,
    K: BackendCholesky<F> + ?Sized,
{
    let op = Operation::Potrf;
    check_square(op, a.dim())?;
    debug!("{}: {:?} {:?} triangle in place, {:?}", op, a.dim(), uplo, F::DTYPE);
    kernel.potrf(a, uplo).map_err(|e| e.during(op))
}

/// Cholesky factorization of a copy of `a`.
pub fn potrf<F, K>(kernel: &K, a: ArrayView2<'_, F>, uplo: Uplo) -> Result<Array2<F>>
where
    F: KernelScalar,
    K: BackendCholesky<F> + ?Sized,
{
    check_square(Operation::Potrf, a.dim())?;
    let mut factor = working_copy(a);
    potrf_in_place(kernel, &mut factor, uplo)?;
    Ok(factor)
}

/// Solves `A·X = B` for symmetric/Hermitian positive definite `A`, overwriting
/// the `uplo` triangle of `a` with the Cholesky factor and `b` with `X`.
pub fn posv_in_place<F, K>(kernel: &K, a: &mut Array2<F>, b: &mut Array2<F>, uplo: Uplo) -> Result<()>
where
    F: KernelScalar,
    K: BackendCholesky<F> + ?Sized,
{
    let op = Operation::Posv;
    check_shapes(op, a.dim(), Some(b.dim()))?;
    debug!("{}: {:?} system, {} right-hand side(s), {:?} triangle, {:?}", op, a.dim(), b.ncols(), uplo, F::DTYPE);
    kernel.potrf(a, uplo).map_err(|e| e.during(op))?;
    kernel.potrs(a, uplo, b).map_err(|e| e.during(op))
}

/// Solves `A·X = B` for symmetric/Hermitian positive definite `A` through
/// Cholesky. Only the `uplo` triangle of `A` is read. Neither operand is
/// modified.
pub fn posv<F, K>(kernel: &K, a: ArrayView2<'_, F>, b: ArrayView2<'_, F>, uplo: Uplo) -> Result<Array2<F>>
where
    F: KernelScalar,
    K: BackendCholesky<F> + ?Sized,
{
    check_shapes(Operation::Posv, a.dim(), Some(b.dim()))?;
    let mut factor = working_copy(a);
    let mut x = working_copy(b);
    posv_in_place(kernel, &mut factor, &mut x, uplo)?;
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg_backends::LapackBackend;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, ShapeBuilder};
    use ndarray_linalg::c64;

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>, tol: f64) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = tol);
        }
    }

    #[test]
    fn solve_recovers_known_solution() {
        let a = array![[4.0_f64, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]];
        let x_true = array![[1.0_f64], [-2.0], [3.0]];
        let b = a.dot(&x_true);
        let x = solve(&LapackBackend, a.view(), b.view()).unwrap();
        assert_close(&x, &x_true, 1e-12);
    }

    #[test]
    fn solve_leaves_operands_untouched() {
        let a = array![[2.0_f64, 1.0], [1.0, 3.0]];
        let b = array![[1.0_f64, 0.0], [0.0, 1.0]];
        let (a0, b0) = (a.clone(), b.clone());
        let _ = solve(&LapackBackend, a.view(), b.view()).unwrap();
        assert_eq!(a, a0);
        assert_eq!(b, b0);
    }

    #[test]
    fn solve_in_place_leaves_factors_and_solution() {
        let mut a = array![[1.0_f64, 2.0], [3.0, 4.0]];
        let mut b = array![[5.0_f64], [6.0]];
        let pivots = solve_in_place(&LapackBackend, &mut a, &mut b).unwrap();
        assert_eq!(pivots.as_lapack(), &[2, 2]);
        assert_close(&b, &array![[-4.0], [4.5]], 1e-12);
        assert_abs_diff_eq!(a[[0, 0]], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn invert_in_place_mutates_target() {
        let mut a = array![[4.0_f64, 7.0], [2.0, 6.0]];
        invert_in_place(&LapackBackend, &mut a).unwrap();
        let expected = array![[0.6_f64, -0.7], [-0.2, 0.4]];
        assert_close(&a, &expected, 1e-12);
    }

    #[test]
    fn invert_of_singular_matrix_is_kernel_failure() {
        let a = array![[1.0_f64, 2.0], [2.0, 4.0]];
        let err = invert(&LapackBackend, a.view()).unwrap_err();
        assert!(matches!(
            err,
            LinalgError::KernelFailure { op: Operation::Invert, routine: "dgetrf", .. }
        ));
    }

    #[test]
    fn rectangular_getrf_returns_min_dim_pivots() {
        let a = array![[1.0_f64, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let lu = getrf(&LapackBackend, a.view()).unwrap();
        assert_eq!(lu.pivots.len(), 2);
        assert_eq!(lu.factors.dim(), (2, 3));
    }

    #[test]
    fn lu_solve_reuses_factorization() {
        let a = array![[3.0_f64, 1.0], [1.0, 2.0]];
        let lu = getrf(&LapackBackend, a.view()).unwrap();
        for rhs in [array![[9.0_f64], [8.0]], array![[1.0_f64], [0.0]]] {
            let direct = solve(&LapackBackend, a.view(), rhs.view()).unwrap();
            let reused = lu_solve(&LapackBackend, &lu, rhs.view()).unwrap();
            assert_close(&direct, &reused, 1e-12);
        }
    }

    #[test]
    fn lu_factors_survive_save_and_load() {
        let a = array![[2.0_f64, 1.0, 1.0], [4.0, -6.0, 0.0], [-2.0, 7.0, 2.0]];
        let lu = getrf(&LapackBackend, a.view()).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        lu.save(file.path()).unwrap();
        let loaded = LuFactors::<Array2<f64>>::load(file.path()).unwrap();
        assert_eq!(loaded, lu);
    }

    #[test]
    fn potrf_upper_factor_reconstructs_input() {
        let a = array![[4.0_f64, 2.0], [2.0, 3.0]];
        let mut r = potrf(&LapackBackend, a.view(), Uplo::Upper).unwrap();
        r[[1, 0]] = 0.0;
        assert_close(&r.t().dot(&r), &a, 1e-12);
    }

    #[test]
    fn potrf_of_indefinite_matrix_fails() {
        let mut a = array![[1.0_f64, 2.0], [2.0, 1.0]];
        let err = potrf_in_place(&LapackBackend, &mut a, Uplo::Lower).unwrap_err();
        assert!(matches!(err, LinalgError::KernelFailure { op: Operation::Potrf, info: 2, .. }));
    }

    #[test]
    fn posv_solves_hermitian_system() {
        let a = array![
            [c64::new(4.0, 0.0), c64::new(1.0, 1.0)],
            [c64::new(1.0, -1.0), c64::new(3.0, 0.0)]
        ];
        let x_true = array![[c64::new(1.0, 2.0)], [c64::new(-1.0, 0.5)]];
        let b = a.dot(&x_true);
        let x = posv(&LapackBackend, a.view(), b.view(), Uplo::Lower).unwrap();
        for (got, want) in x.iter().zip(x_true.iter()) {
            assert_abs_diff_eq!(got.re, want.re, epsilon = 1e-12);
            assert_abs_diff_eq!(got.im, want.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn column_major_target_keeps_its_layout() {
        let mut a = Array2::<f64>::zeros((2, 2).f());
        a.assign(&array![[2.0, 0.0], [0.0, 4.0]]);
        invert_in_place(&LapackBackend, &mut a).unwrap();
        assert!(a.t().is_standard_layout());
        assert_close(&a, &array![[0.5, 0.0], [0.0, 0.25]], 1e-15);
    }
}

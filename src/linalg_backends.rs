// src/linalg_backends.rs

//! The kernel boundary: a fixed set of dense LAPACK routines behind traits.
//!
//! Each trait covers one family of routines (`?getrf`/`?getri`/`?getrs`,
//! `?potrf`/`?potrs`, `?geev`, `?gesvd`/`?gesdd`). Implementations do
//! nothing but marshal `ndarray` buffers into the routine's parameter
//! contract (column-major data, leading dimensions, job characters, work
//! arrays) and report the routine's `info` status. All interpretation of the
//! output happens in the orchestrators.

use crate::dtype::DType;
use crate::error::{LinalgError, Operation};
use crate::ownership;
use log::{trace, warn};
use ndarray::{Array1, Array2, LinalgScalar, ShapeBuilder};
use ndarray_linalg::{c32, c64};
use num_complex::Complex;
use num_traits::{Float, Zero};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::Debug;
use thiserror::Error;

// --- Mode flags ---

/// Which triangle of a symmetric/Hermitian matrix is referenced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Uplo {
    Upper,
    Lower,
}

impl Uplo {
    fn as_lapack(self) -> u8 {
        match self {
            Self::Upper => b'U',
            Self::Lower => b'L',
        }
    }
}

/// How many singular vectors to compute.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvdVectors {
    /// `U` is `m×m`, `Vᵗ` is `n×n`
    All,
    /// `U` is `m×k`, `Vᵗ` is `k×n` with `k = min(m, n)`
    Thin,
}

impl SvdVectors {
    fn as_lapack(self) -> u8 {
        match self {
            Self::All => b'A',
            Self::Thin => b'S',
        }
    }

    /// `(U shape, Vᵗ shape)` for an `m×n` input.
    pub fn shapes(self, m: usize, n: usize) -> ((usize, usize), (usize, usize)) {
        let k = m.min(n);
        match self {
            Self::All => ((m, m), (n, n)),
            Self::Thin => ((m, k), (k, n)),
        }
    }
}

/// Which eigenvector sets `?geev` computes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EigenJobs {
    pub left: bool,
    pub right: bool,
}

// --- Pivots ---

/// Row interchanges recorded by partial-pivoting LU, in the kernel's 1-based
/// convention: row `i` was swapped with row `pivots[i] - 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotVector(Vec<i32>);

impl PivotVector {
    pub fn from_lapack(ipiv: Vec<i32>) -> Self {
        Self(ipiv)
    }

    pub fn as_lapack(&self) -> &[i32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First entry outside `1..=order`, as `(index, value)`.
    pub fn out_of_range(&self, order: usize) -> Option<(usize, i32)> {
        self.0
            .iter()
            .enumerate()
            .find(|&(_, &p)| Self::to_row(p).map_or(true, |row| row >= order))
            .map(|(index, &p)| (index, p))
    }

    /// Interchanges as 0-based `(row, swapped_with)` pairs, in application order.
    /// Entries below 1 are skipped.
    pub fn row_swaps(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(row, &p)| Self::to_row(p).map(|other| (row, other)))
    }

    fn to_row(p: i32) -> Option<usize> {
        p.checked_sub(1).and_then(|q| usize::try_from(q).ok())
    }

    /// Permutation `perm` such that row `i` of `P·A` is row `perm[i]` of `A`.
    pub fn permutation(&self, rows: usize) -> Vec<usize> {
        let mut perm: Vec<usize> = (0..rows).collect();
        for (row, other) in self.row_swaps() {
            if row < rows && other < rows {
                perm.swap(row, other);
            }
        }
        perm
    }
}

// --- Kernel status ---

/// Failure reported across the kernel boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// The routine returned a non-zero `info`.
    #[error("{routine} returned info = {info}")]
    Status { routine: &'static str, info: i32 },
    /// Buffers handed to the routine, or returned by it, do not match its
    /// parameter contract.
    #[error("{routine}: {detail}")]
    Contract { routine: &'static str, detail: String },
}

pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// Attributes this failure to a caller-facing operation.
    pub(crate) fn during(self, op: Operation) -> LinalgError {
        warn!("{}: kernel call failed: {}", op, self);
        match self {
            Self::Status { routine, info } => LinalgError::KernelFailure { op, routine, info },
            Self::Contract { routine, detail } => {
                LinalgError::KernelContract { op, routine, detail }
            }
        }
    }
}

fn check_info(routine: &'static str, info: i32) -> KernelResult<()> {
    trace!("{} finished with info = {}", routine, info);
    if info == 0 {
        Ok(())
    } else {
        Err(KernelError::Status { routine, info })
    }
}

fn ensure(ok: bool, routine: &'static str, detail: impl FnOnce() -> String) -> KernelResult<()> {
    if ok {
        Ok(())
    } else {
        Err(KernelError::Contract {
            routine,
            detail: detail(),
        })
    }
}

fn to_i32(value: usize, routine: &'static str) -> KernelResult<i32> {
    i32::try_from(value).map_err(|_| KernelError::Contract {
        routine,
        detail: format!("dimension {} does not fit the kernel's integer type", value),
    })
}

fn lead_dim(rows: usize, routine: &'static str) -> KernelResult<i32> {
    to_i32(rows.max(1), routine)
}

// --- Raw eigen output ---

/// Output buffers of `?geev`, exactly as the routine fills them.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEigen<R> {
    /// Real routines (`sgeev`, `dgeev`): eigenvalues split into real and
    /// imaginary parts. A complex-conjugate pair occupies two adjacent slots
    /// `j, j+1`, and the matching eigenvector columns hold the real part
    /// (column `j`) and the imaginary part (column `j+1`) of the first member.
    Packed {
        re: Array1<R>,
        im: Array1<R>,
        left: Option<Array2<R>>,
        right: Option<Array2<R>>,
    },
    /// Complex routines (`cgeev`, `zgeev`): final complex values and vectors.
    Complex {
        values: Array1<Complex<R>>,
        left: Option<Array2<Complex<R>>>,
        right: Option<Array2<Complex<R>>>,
    },
}

// --- Scalar types the kernel accepts ---

/// Element types with LAPACK entry points.
///
/// The `unsafe` methods are thin wrappers over the raw routines. Callers must
/// pass slices at least as long as the dimensions and leading dimensions
/// imply; [`LapackBackend`] checks this before every call.
pub trait KernelScalar: LinalgScalar + Send + Sync + Debug + 'static {
    /// Real type of the components (and of singular values).
    type Real: RealScalar;

    const DTYPE: DType;

    /// Zeroed `?geev` output buffers for an `n×n` input.
    fn eigen_buffers(n: usize, jobs: EigenJobs) -> RawEigen<Self::Real>;

    unsafe fn getrf(m: i32, n: i32, a: &mut [Self], lda: i32, ipiv: &mut [i32]) -> KernelResult<()>;

    unsafe fn getri(n: i32, a: &mut [Self], lda: i32, ipiv: &[i32]) -> KernelResult<()>;

    #[allow(clippy::too_many_arguments)]
    unsafe fn getrs(
        n: i32,
        nrhs: i32,
        a: &[Self],
        lda: i32,
        ipiv: &[i32],
        b: &mut [Self],
        ldb: i32,
    ) -> KernelResult<()>;

    unsafe fn potrf(uplo: u8, n: i32, a: &mut [Self], lda: i32) -> KernelResult<()>;

    #[allow(clippy::too_many_arguments)]
    unsafe fn potrs(
        uplo: u8,
        n: i32,
        nrhs: i32,
        a: &[Self],
        lda: i32,
        b: &mut [Self],
        ldb: i32,
    ) -> KernelResult<()>;

    unsafe fn geev(n: i32, a: &mut [Self], lda: i32, out: &mut RawEigen<Self::Real>) -> KernelResult<()>;

    #[allow(clippy::too_many_arguments)]
    unsafe fn gesvd(
        job: u8,
        m: i32,
        n: i32,
        a: &mut [Self],
        lda: i32,
        s: &mut [Self::Real],
        u: &mut [Self],
        ldu: i32,
        vt: &mut [Self],
        ldvt: i32,
    ) -> KernelResult<()>;

    #[allow(clippy::too_many_arguments)]
    unsafe fn gesdd(
        job: u8,
        m: i32,
        n: i32,
        a: &mut [Self],
        lda: i32,
        s: &mut [Self::Real],
        u: &mut [Self],
        ldu: i32,
        vt: &mut [Self],
        ldvt: i32,
    ) -> KernelResult<()>;
}

/// Real kernel scalars (`f32`, `f64`).
pub trait RealScalar: KernelScalar<Real = Self> + Float {}

impl RealScalar for f32 {}
impl RealScalar for f64 {}

fn vector_slice_mut<'a, T>(v: &'a mut Array1<T>, routine: &'static str) -> KernelResult<&'a mut [T]> {
    v.as_slice_mut().ok_or_else(|| KernelError::Contract {
        routine,
        detail: "output vector is not contiguous".to_string(),
    })
}

fn fortran_slice_mut<'a, T>(a: &'a mut Array2<T>, routine: &'static str) -> KernelResult<&'a mut [T]> {
    ensure(a.t().is_standard_layout(), routine, || {
        format!("buffer {:?} is not column-major", a.dim())
    })?;
    a.as_slice_memory_order_mut().ok_or_else(|| KernelError::Contract {
        routine,
        detail: "buffer is not contiguous".to_string(),
    })
}

macro_rules! impl_real_kernel_scalar {
    ($ty:ty, $dtype:expr, $getrf:ident, $getri:ident, $getrs:ident, $potrf:ident, $potrs:ident, $geev:ident, $gesvd:ident, $gesdd:ident) => {
        impl KernelScalar for $ty {
            type Real = $ty;

            const DTYPE: DType = $dtype;

            fn eigen_buffers(n: usize, jobs: EigenJobs) -> RawEigen<$ty> {
                RawEigen::Packed {
                    re: Array1::zeros(n),
                    im: Array1::zeros(n),
                    left: jobs.left.then(|| Array2::zeros((n, n).f())),
                    right: jobs.right.then(|| Array2::zeros((n, n).f())),
                }
            }

            unsafe fn getrf(m: i32, n: i32, a: &mut [$ty], lda: i32, ipiv: &mut [i32]) -> KernelResult<()> {
                let mut info = 0;
                lapack::$getrf(m, n, a, lda, ipiv, &mut info);
                check_info(stringify!($getrf), info)
            }

            unsafe fn getri(n: i32, a: &mut [$ty], lda: i32, ipiv: &[i32]) -> KernelResult<()> {
                let mut info = 0;
                let mut query = [<$ty>::zero()];
                lapack::$getri(n, a, lda, ipiv, &mut query, -1, &mut info);
                check_info(stringify!($getri), info)?;
                let lwork = (query[0] as i32).max(1);
                let mut work = vec![<$ty>::zero(); lwork as usize];
                lapack::$getri(n, a, lda, ipiv, &mut work, lwork, &mut info);
                check_info(stringify!($getri), info)
            }

            unsafe fn getrs(n: i32, nrhs: i32, a: &[$ty], lda: i32, ipiv: &[i32], b: &mut [$ty], ldb: i32) -> KernelResult<()> {
                let mut info = 0;
                lapack::$getrs(b'N', n, nrhs, a, lda, ipiv, b, ldb, &mut info);
                check_info(stringify!($getrs), info)
            }

            unsafe fn potrf(uplo: u8, n: i32, a: &mut [$ty], lda: i32) -> KernelResult<()> {
                let mut info = 0;
                lapack::$potrf(uplo, n, a, lda, &mut info);
                check_info(stringify!($potrf), info)
            }

            unsafe fn potrs(uplo: u8, n: i32, nrhs: i32, a: &[$ty], lda: i32, b: &mut [$ty], ldb: i32) -> KernelResult<()> {
                let mut info = 0;
                lapack::$potrs(uplo, n, nrhs, a, lda, b, ldb, &mut info);
                check_info(stringify!($potrs), info)
            }

            unsafe fn geev(n: i32, a: &mut [$ty], lda: i32, out: &mut RawEigen<$ty>) -> KernelResult<()> {
                let routine = stringify!($geev);
                let RawEigen::Packed { re, im, left, right } = out else {
                    return Err(KernelError::Contract {
                        routine,
                        detail: "real input needs split real/imaginary eigenvalue buffers".to_string(),
                    });
                };
                let jobvl = if left.is_some() { b'V' } else { b'N' };
                let jobvr = if right.is_some() { b'V' } else { b'N' };
                let mut no_left = [<$ty>::zero()];
                let mut no_right = [<$ty>::zero()];
                let (vl, ldvl) = match left.as_mut() {
                    Some(v) => (fortran_slice_mut(v, routine)?, lda),
                    None => (&mut no_left[..], 1),
                };
                let (vr, ldvr) = match right.as_mut() {
                    Some(v) => (fortran_slice_mut(v, routine)?, lda),
                    None => (&mut no_right[..], 1),
                };
                let wr = vector_slice_mut(re, routine)?;
                let wi = vector_slice_mut(im, routine)?;

                let mut info = 0;
                let mut query = [<$ty>::zero()];
                lapack::$geev(jobvl, jobvr, n, a, lda, wr, wi, vl, ldvl, vr, ldvr, &mut query, -1, &mut info);
                check_info(routine, info)?;
                let lwork = (query[0] as i32).max(1);
                let mut work = vec![<$ty>::zero(); lwork as usize];
                lapack::$geev(jobvl, jobvr, n, a, lda, wr, wi, vl, ldvl, vr, ldvr, &mut work, lwork, &mut info);
                check_info(routine, info)
            }

            unsafe fn gesvd(job: u8, m: i32, n: i32, a: &mut [$ty], lda: i32, s: &mut [$ty], u: &mut [$ty], ldu: i32, vt: &mut [$ty], ldvt: i32) -> KernelResult<()> {
                let routine = stringify!($gesvd);
                let mut info = 0;
                let mut query = [<$ty>::zero()];
                lapack::$gesvd(job, job, m, n, a, lda, s, u, ldu, vt, ldvt, &mut query, -1, &mut info);
                check_info(routine, info)?;
                let lwork = (query[0] as i32).max(1);
                let mut work = vec![<$ty>::zero(); lwork as usize];
                lapack::$gesvd(job, job, m, n, a, lda, s, u, ldu, vt, ldvt, &mut work, lwork, &mut info);
                check_info(routine, info)
            }

            unsafe fn gesdd(job: u8, m: i32, n: i32, a: &mut [$ty], lda: i32, s: &mut [$ty], u: &mut [$ty], ldu: i32, vt: &mut [$ty], ldvt: i32) -> KernelResult<()> {
                let routine = stringify!($gesdd);
                let k = m.min(n).max(1) as usize;
                let mut iwork = vec![0_i32; 8 * k];
                let mut info = 0;
                let mut query = [<$ty>::zero()];
                lapack::$gesdd(job, m, n, a, lda, s, u, ldu, vt, ldvt, &mut query, -1, &mut iwork, &mut info);
                check_info(routine, info)?;
                let lwork = (query[0] as i32).max(1);
                let mut work = vec![<$ty>::zero(); lwork as usize];
                lapack::$gesdd(job, m, n, a, lda, s, u, ldu, vt, ldvt, &mut work, lwork, &mut iwork, &mut info);
                check_info(routine, info)
            }
        }
    };
}

macro_rules! impl_complex_kernel_scalar {
    ($ty:ty, $real:ty, $dtype:expr, $getrf:ident, $getri:ident, $getrs:ident, $potrf:ident, $potrs:ident, $geev:ident, $gesvd:ident, $gesdd:ident) => {
        impl KernelScalar for $ty {
            type Real = $real;

            const DTYPE: DType = $dtype;

            fn eigen_buffers(n: usize, jobs: EigenJobs) -> RawEigen<$real> {
                RawEigen::Complex {
                    values: Array1::zeros(n),
                    left: jobs.left.then(|| Array2::zeros((n, n).f())),
                    right: jobs.right.then(|| Array2::zeros((n, n).f())),
                }
            }

            unsafe fn getrf(m: i32, n: i32, a: &mut [$ty], lda: i32, ipiv: &mut [i32]) -> KernelResult<()> {
                let mut info = 0;
                lapack::$getrf(m, n, a, lda, ipiv, &mut info);
                check_info(stringify!($getrf), info)
            }

            unsafe fn getri(n: i32, a: &mut [$ty], lda: i32, ipiv: &[i32]) -> KernelResult<()> {
                let mut info = 0;
                let mut query = [<$ty>::zero()];
                lapack::$getri(n, a, lda, ipiv, &mut query, -1, &mut info);
                check_info(stringify!($getri), info)?;
                let lwork = (query[0].re as i32).max(1);
                let mut work = vec![<$ty>::zero(); lwork as usize];
                lapack::$getri(n, a, lda, ipiv, &mut work, lwork, &mut info);
                check_info(stringify!($getri), info)
            }

            unsafe fn getrs(n: i32, nrhs: i32, a: &[$ty], lda: i32, ipiv: &[i32], b: &mut [$ty], ldb: i32) -> KernelResult<()> {
                let mut info = 0;
                lapack::$getrs(b'N', n, nrhs, a, lda, ipiv, b, ldb, &mut info);
                check_info(stringify!($getrs), info)
            }

            unsafe fn potrf(uplo: u8, n: i32, a: &mut [$ty], lda: i32) -> KernelResult<()> {
                let mut info = 0;
                lapack::$potrf(uplo, n, a, lda, &mut info);
                check_info(stringify!($potrf), info)
            }

            unsafe fn potrs(uplo: u8, n: i32, nrhs: i32, a: &[$ty], lda: i32, b: &mut [$ty], ldb: i32) -> KernelResult<()> {
                let mut info = 0;
                lapack::$potrs(uplo, n, nrhs, a, lda, b, ldb, &mut info);
                check_info(stringify!($potrs), info)
            }

            unsafe fn geev(n: i32, a: &mut [$ty], lda: i32, out: &mut RawEigen<$real>) -> KernelResult<()> {
                let routine = stringify!($geev);
                let RawEigen::Complex { values, left, right } = out else {
                    return Err(KernelError::Contract {
                        routine,
                        detail: "complex input needs a complex eigenvalue buffer".to_string(),
                    });
                };
                let jobvl = if left.is_some() { b'V' } else { b'N' };
                let jobvr = if right.is_some() { b'V' } else { b'N' };
                let mut no_left = [<$ty>::zero()];
                let mut no_right = [<$ty>::zero()];
                let (vl, ldvl) = match left.as_mut() {
                    Some(v) => (fortran_slice_mut(v, routine)?, lda),
                    None => (&mut no_left[..], 1),
                };
                let (vr, ldvr) = match right.as_mut() {
                    Some(v) => (fortran_slice_mut(v, routine)?, lda),
                    None => (&mut no_right[..], 1),
                };
                let w = vector_slice_mut(values, routine)?;
                let mut rwork = vec![<$real>::zero(); 2 * (n.max(1) as usize)];

                let mut info = 0;
                let mut query = [<$ty>::zero()];
                lapack::$geev(jobvl, jobvr, n, a, lda, w, vl, ldvl, vr, ldvr, &mut query, -1, &mut rwork, &mut info);
                check_info(routine, info)?;
                let lwork = (query[0].re as i32).max(1);
                let mut work = vec![<$ty>::zero(); lwork as usize];
                lapack::$geev(jobvl, jobvr, n, a, lda, w, vl, ldvl, vr, ldvr, &mut work, lwork, &mut rwork, &mut info);
                check_info(routine, info)
            }

            unsafe fn gesvd(job: u8, m: i32, n: i32, a: &mut [$ty], lda: i32, s: &mut [$real], u: &mut [$ty], ldu: i32, vt: &mut [$ty], ldvt: i32) -> KernelResult<()> {
                let routine = stringify!($gesvd);
                let k = m.min(n).max(1) as usize;
                let mut rwork = vec![<$real>::zero(); 5 * k];
                let mut info = 0;
                let mut query = [<$ty>::zero()];
                lapack::$gesvd(job, job, m, n, a, lda, s, u, ldu, vt, ldvt, &mut query, -1, &mut rwork, &mut info);
                check_info(routine, info)?;
                let lwork = (query[0].re as i32).max(1);
                let mut work = vec![<$ty>::zero(); lwork as usize];
                lapack::$gesvd(job, job, m, n, a, lda, s, u, ldu, vt, ldvt, &mut work, lwork, &mut rwork, &mut info);
                check_info(routine, info)
            }

            unsafe fn gesdd(job: u8, m: i32, n: i32, a: &mut [$ty], lda: i32, s: &mut [$real], u: &mut [$ty], ldu: i32, vt: &mut [$ty], ldvt: i32) -> KernelResult<()> {
                let routine = stringify!($gesdd);
                let k = m.min(n).max(1) as usize;
                let big = m.max(n).max(1) as usize;
                let lrwork = (5 * k * k + 5 * k).max(2 * big * k + 2 * k * k + k);
                let mut rwork = vec![<$real>::zero(); lrwork];
                let mut iwork = vec![0_i32; 8 * k];
                let mut info = 0;
                let mut query = [<$ty>::zero()];
                lapack::$gesdd(job, m, n, a, lda, s, u, ldu, vt, ldvt, &mut query, -1, &mut rwork, &mut iwork, &mut info);
                check_info(routine, info)?;
                let lwork = (query[0].re as i32).max(1);
                let mut work = vec![<$ty>::zero(); lwork as usize];
                lapack::$gesdd(job, m, n, a, lda, s, u, ldu, vt, ldvt, &mut work, lwork, &mut rwork, &mut iwork, &mut info);
                check_info(routine, info)
            }
        }
    };
}

impl_real_kernel_scalar!(f32, DType::F32, sgetrf, sgetri, sgetrs, spotrf, spotrs, sgeev, sgesvd, sgesdd);
impl_real_kernel_scalar!(f64, DType::F64, dgetrf, dgetri, dgetrs, dpotrf, dpotrs, dgeev, dgesvd, dgesdd);
impl_complex_kernel_scalar!(c32, f32, DType::C32, cgetrf, cgetri, cgetrs, cpotrf, cpotrs, cgeev, cgesvd, cgesdd);
impl_complex_kernel_scalar!(c64, f64, DType::C64, zgetrf, zgetri, zgetrs, zpotrf, zpotrs, zgeev, zgesvd, zgesdd);

// --- Trait Definitions ---

/// LU family: factorization, inversion from the factors, back-substitution.
pub trait BackendLu<F: KernelScalar> {
    /// Factorizes `a` in place into `P·A = L·U`.
    fn getrf(&self, a: &mut Array2<F>) -> KernelResult<PivotVector>;
    /// Overwrites the LU factors in `a` with the inverse of the original matrix.
    fn getri(&self, a: &mut Array2<F>, pivots: &PivotVector) -> KernelResult<()>;
    /// Overwrites `b` with the solution of `A·X = B` given the factors of `A`.
    fn getrs(&self, lu: &Array2<F>, pivots: &PivotVector, b: &mut Array2<F>) -> KernelResult<()>;
}

/// Cholesky family.
pub trait BackendCholesky<F: KernelScalar> {
    /// Factorizes the `uplo` triangle of `a` in place. The other triangle is
    /// not referenced.
    fn potrf(&self, a: &mut Array2<F>, uplo: Uplo) -> KernelResult<()>;
    /// Overwrites `b` with the solution of `A·X = B` given the Cholesky factor.
    fn potrs(&self, factor: &Array2<F>, uplo: Uplo, b: &mut Array2<F>) -> KernelResult<()>;
}

/// General (non-symmetric) eigendecomposition.
pub trait BackendEig<F: KernelScalar> {
    /// Fills `out`, whose eigenvector slots are present exactly for the sets
    /// that should be computed. Destroys `a`.
    fn geev(&self, a: &mut Array2<F>, out: &mut RawEigen<F::Real>) -> KernelResult<()>;
}

/// Singular value decomposition, standard and divide-and-conquer drivers.
pub trait BackendSvd<F: KernelScalar> {
    fn gesvd(
        &self,
        a: &mut Array2<F>,
        vectors: SvdVectors,
        s: &mut Array1<F::Real>,
        u: &mut Array2<F>,
        vt: &mut Array2<F>,
    ) -> KernelResult<()>;

    fn gesdd(
        &self,
        a: &mut Array2<F>,
        vectors: SvdVectors,
        s: &mut Array1<F::Real>,
        u: &mut Array2<F>,
        vt: &mut Array2<F>,
    ) -> KernelResult<()>;
}

/// Every routine the orchestrators need for one scalar type.
pub trait DenseKernel<F: KernelScalar>:
    BackendLu<F> + BackendCholesky<F> + BackendEig<F> + BackendSvd<F>
{
}

impl<F, K> DenseKernel<F> for K
where
    F: KernelScalar,
    K: BackendLu<F> + BackendCholesky<F> + BackendEig<F> + BackendSvd<F>,
{
}

/// A kernel covering all four decomposable element types.
pub trait KernelBoundary:
    DenseKernel<f32> + DenseKernel<f64> + DenseKernel<c32> + DenseKernel<c64>
{
}

impl<K> KernelBoundary for K where
    K: DenseKernel<f32> + DenseKernel<f64> + DenseKernel<c32> + DenseKernel<c64>
{
}

// --- LapackBackend Implementation ---

/// Calls the LAPACK library linked through the `backend_*` features.
#[derive(Debug, Default, Copy, Clone)]
pub struct LapackBackend;

/// Runs `call` on a column-major view of `a`'s data.
///
/// A column-major buffer is handed over as is, so the routine mutates the
/// caller's storage directly. Anything else goes through a column-major
/// scratch copy that is written back afterwards, keeping `a`'s layout.
fn with_fortran_data<F, T>(
    a: &mut Array2<F>,
    routine: &'static str,
    call: impl FnOnce(&mut [F], i32) -> KernelResult<T>,
) -> KernelResult<T>
where
    F: KernelScalar,
{
    let lda = lead_dim(a.nrows(), routine)?;
    if a.t().is_standard_layout() {
        return call(fortran_slice_mut(a, routine)?, lda);
    }
    trace!("{}: marshaling {:?} buffer through a column-major copy", routine, a.dim());
    let mut scratch = ownership::working_copy(a.view());
    let outcome = call(fortran_slice_mut(&mut scratch, routine)?, lda);
    a.assign(&scratch);
    outcome
}

/// Column-major data of a read-only operand.
fn fortran_data<F: Clone>(a: &Array2<F>) -> Cow<'_, [F]> {
    match a.as_slice_memory_order() {
        Some(slice) if a.t().is_standard_layout() => Cow::Borrowed(slice),
        _ => Cow::Owned(a.t().iter().cloned().collect()),
    }
}

fn ensure_square<F>(a: &Array2<F>, routine: &'static str) -> KernelResult<usize> {
    let (m, n) = a.dim();
    ensure(m == n, routine, || format!("expected a square buffer, got {}x{}", m, n))?;
    Ok(n)
}

// ?laswp trusts every pivot; one outside 1..=n swaps rows past the buffer.
fn ensure_pivots(pivots: &PivotVector, n: usize, routine: &'static str) -> KernelResult<()> {
    ensure(pivots.len() == n, routine, || {
        format!("pivot vector has {} entries, matrix has order {}", pivots.len(), n)
    })?;
    match pivots.out_of_range(n) {
        Some((index, p)) => Err(KernelError::Contract {
            routine,
            detail: format!("pivot {} at position {} is outside 1..={}", p, index, n),
        }),
        None => Ok(()),
    }
}

fn ensure_rhs<F>(n: usize, b: &Array2<F>, routine: &'static str) -> KernelResult<()> {
    ensure(b.nrows() == n, routine, || {
        format!("right-hand side has {} rows, factor has order {}", b.nrows(), n)
    })
}

impl<F: KernelScalar> BackendLu<F> for LapackBackend {
    fn getrf(&self, a: &mut Array2<F>) -> KernelResult<PivotVector> {
        let routine = "getrf";
        let (m, n) = a.dim();
        let (mi, ni) = (to_i32(m, routine)?, to_i32(n, routine)?);
        let mut ipiv = vec![0_i32; m.min(n)];
        with_fortran_data(a, routine, |data, lda| unsafe {
            F::getrf(mi, ni, data, lda, &mut ipiv)
        })?;
        Ok(PivotVector::from_lapack(ipiv))
    }

    fn getri(&self, a: &mut Array2<F>, pivots: &PivotVector) -> KernelResult<()> {
        let routine = "getri";
        let n = ensure_square(a, routine)?;
        ensure_pivots(pivots, n, routine)?;
        let ni = to_i32(n, routine)?;
        with_fortran_data(a, routine, |data, lda| unsafe {
            F::getri(ni, data, lda, pivots.as_lapack())
        })
    }

    fn getrs(&self, lu: &Array2<F>, pivots: &PivotVector, b: &mut Array2<F>) -> KernelResult<()> {
        let routine = "getrs";
        let n = ensure_square(lu, routine)?;
        ensure_pivots(pivots, n, routine)?;
        ensure_rhs(n, b, routine)?;
        let ni = to_i32(n, routine)?;
        let nrhs = to_i32(b.ncols(), routine)?;
        let lda = lead_dim(n, routine)?;
        let factors = fortran_data(lu);
        with_fortran_data(b, routine, |data, ldb| unsafe {
            F::getrs(ni, nrhs, &factors, lda, pivots.as_lapack(), data, ldb)
        })
    }
}

impl<F: KernelScalar> BackendCholesky<F> for LapackBackend {
    fn potrf(&self, a: &mut Array2<F>, uplo: Uplo) -> KernelResult<()> {
        let routine = "potrf";
        let n = to_i32(ensure_square(a, routine)?, routine)?;
        with_fortran_data(a, routine, |data, lda| unsafe {
            F::potrf(uplo.as_lapack(), n, data, lda)
        })
    }

    fn potrs(&self, factor: &Array2<F>, uplo: Uplo, b: &mut Array2<F>) -> KernelResult<()> {
        let routine = "potrs";
        let n = ensure_square(factor, routine)?;
        ensure_rhs(n, b, routine)?;
        let ni = to_i32(n, routine)?;
        let nrhs = to_i32(b.ncols(), routine)?;
        let lda = lead_dim(n, routine)?;
        let data_a = fortran_data(factor);
        with_fortran_data(b, routine, |data, ldb| unsafe {
            F::potrs(uplo.as_lapack(), ni, nrhs, &data_a, lda, data, ldb)
        })
    }
}

impl<F: KernelScalar> BackendEig<F> for LapackBackend {
    fn geev(&self, a: &mut Array2<F>, out: &mut RawEigen<F::Real>) -> KernelResult<()> {
        let routine = "geev";
        let n = ensure_square(a, routine)?;
        let buffers_fit = match out {
            RawEigen::Packed { re, im, left, right } => {
                re.len() == n
                    && im.len() == n
                    && left.as_ref().map_or(true, |v| v.dim() == (n, n))
                    && right.as_ref().map_or(true, |v| v.dim() == (n, n))
            }
            RawEigen::Complex { values, left, right } => {
                values.len() == n
                    && left.as_ref().map_or(true, |v| v.dim() == (n, n))
                    && right.as_ref().map_or(true, |v| v.dim() == (n, n))
            }
        };
        ensure(buffers_fit, routine, || {
            format!("output buffers do not match a {}x{} input", n, n)
        })?;
        let ni = to_i32(n, routine)?;
        with_fortran_data(a, routine, |data, lda| unsafe { F::geev(ni, data, lda, out) })
    }
}

fn ensure_svd_buffers<F: KernelScalar>(
    routine: &'static str,
    (m, n): (usize, usize),
    vectors: SvdVectors,
    s: &Array1<F::Real>,
    u: &Array2<F>,
    vt: &Array2<F>,
) -> KernelResult<()> {
    let (u_shape, vt_shape) = vectors.shapes(m, n);
    ensure(
        s.len() == m.min(n) && u.dim() == u_shape && vt.dim() == vt_shape,
        routine,
        || {
            format!(
                "buffers s: {}, u: {:?}, vt: {:?} do not fit a {}x{} input with {:?} vectors",
                s.len(),
                u.dim(),
                vt.dim(),
                m,
                n,
                vectors
            )
        },
    )
}

impl<F: KernelScalar> BackendSvd<F> for LapackBackend {
    fn gesvd(
        &self,
        a: &mut Array2<F>,
        vectors: SvdVectors,
        s: &mut Array1<F::Real>,
        u: &mut Array2<F>,
        vt: &mut Array2<F>,
    ) -> KernelResult<()> {
        let routine = "gesvd";
        ensure_svd_buffers(routine, a.dim(), vectors, s, u, vt)?;
        let (m, n) = (to_i32(a.nrows(), routine)?, to_i32(a.ncols(), routine)?);
        let ldu = lead_dim(u.nrows(), routine)?;
        let ldvt = lead_dim(vt.nrows(), routine)?;
        let s = vector_slice_mut(s, routine)?;
        let u = fortran_slice_mut(u, routine)?;
        let vt = fortran_slice_mut(vt, routine)?;
        with_fortran_data(a, routine, |data, lda| unsafe {
            F::gesvd(vectors.as_lapack(), m, n, data, lda, s, u, ldu, vt, ldvt)
        })
    }

    fn gesdd(
        &self,
        a: &mut Array2<F>,
        vectors: SvdVectors,
        s: &mut Array1<F::Real>,
        u: &mut Array2<F>,
        vt: &mut Array2<F>,
    ) -> KernelResult<()> {
        let routine = "gesdd";
        ensure_svd_buffers(routine, a.dim(), vectors, s, u, vt)?;
        let (m, n) = (to_i32(a.nrows(), routine)?, to_i32(a.ncols(), routine)?);
        let ldu = lead_dim(u.nrows(), routine)?;
        let ldvt = lead_dim(vt.nrows(), routine)?;
        let s = vector_slice_mut(s, routine)?;
        let u = fortran_slice_mut(u, routine)?;
        let vt = fortran_slice_mut(vt, routine)?;
        with_fortran_data(a, routine, |data, lda| unsafe {
            F::gesdd(vectors.as_lapack(), m, n, data, lda, s, u, ldu, vt, ldvt)
        })
    }
}

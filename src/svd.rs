// src/svd.rs

//! Singular value decomposition through `?gesvd` and `?gesdd`.
//!
//! Both drivers share one result contract: `U`, the singular values and
//! `Vᵗ`, bound exactly as the kernel fills them. Singular values are
//! non-negative and come in the kernel's (descending) order.

use crate::error::{Operation, Result};
use crate::linalg_backends::{BackendSvd, KernelResult, KernelScalar, SvdVectors};
use crate::ownership::working_copy;
use crate::validate::check_shapes;
use log::debug;
use ndarray::{Array1, Array2, ArrayView2, ShapeBuilder};
use serde::{Deserialize, Serialize};

/// `A = U·diag(Σ)·Vᵗ`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Svd<M, V> {
    pub u: M,
    pub singular_values: V,
    pub vt: M,
}

impl<M, V> Svd<M, V> {
    /// `(U, Σ, Vᵗ)`
    pub fn into_parts(self) -> (M, V, M) {
        (self.u, self.singular_values, self.vt)
    }
}

/// Typed decomposition returned by [`gesvd`] and [`gesdd`].
pub type TypedSvd<F> = Svd<Array2<F>, Array1<<F as KernelScalar>::Real>>;

type Driver<F, K> = fn(
    &K,
    &mut Array2<F>,
    SvdVectors,
    &mut Array1<<F as KernelScalar>::Real>,
    &mut Array2<F>,
    &mut Array2<F>,
) -> KernelResult<()>;

fn decompose<F, K>(
    op: Operation,
    driver: Driver<F, K>,
    kernel: &K,
    a: &mut Array2<F>,
    vectors: SvdVectors,
) -> Result<TypedSvd<F>>
where
    F: KernelScalar,
    K: ?Sized,
{
    check_shapes(op, a.dim(), None)?;
    let (m, n) = a.dim();
    debug!("{}: {}x{}, {:?} vectors, {:?}", op, m, n, vectors, F::DTYPE);
    let (u_shape, vt_shape) = vectors.shapes(m, n);
    let mut s = Array1::zeros(m.min(n));
    let mut u = Array2::zeros(u_shape.f());
    let mut vt = Array2::zeros(vt_shape.f());
    driver(kernel, a, vectors, &mut s, &mut u, &mut vt).map_err(|e| e.during(op))?;
    Ok(Svd {
        u,
        singular_values: s,
        vt,
    })
}

/// SVD of `a` with the standard driver, using `a` as scratch space.
pub fn gesvd_in_place<F, K>(kernel: &K, a: &mut Array2<F>, vectors: SvdVectors) -> Result<TypedSvd<F>>
where
    F: KernelScalar,
    K: BackendSvd<F> + ?Sized,
{
    decompose(Operation::Gesvd, <K as BackendSvd<F>>::gesvd, kernel, a, vectors)
}

/// SVD of `a` with the standard driver. `a` is not modified.
pub fn gesvd<F, K>(kernel: &K, a: ArrayView2<'_, F>, vectors: SvdVectors) -> Result<TypedSvd<F>>
where
    F: KernelScalar,
    K: BackendSvd<F> + ?Sized,
{
    check_shapes(Operation::Gesvd, a.dim(), None)?;
    gesvd_in_place(kernel, &mut working_copy(a), vectors)
}

/// SVD of `a` with the divide-and-conquer driver, using `a` as scratch space.
pub fn gesdd_in_place<F, K>(kernel: &K, a: &mut Array2<F>, vectors: SvdVectors) -> Result<TypedSvd<F>>
where
    F: KernelScalar,
    K: BackendSvd<F> + ?Sized,
{
    decompose(Operation::Gesdd, <K as BackendSvd<F>>::gesdd, kernel, a, vectors)
}

/// SVD of `a` with the divide-and-conquer driver. `a` is not modified.
pub fn gesdd<F, K>(kernel: &K, a: ArrayView2<'_, F>, vectors: SvdVectors) -> Result<TypedSvd<F>>
where
    F: KernelScalar,
    K: BackendSvd<F> + ?Sized,
{
    check_shapes(Operation::Gesdd, a.dim(), None)?;
    gesdd_in_place(kernel, &mut working_copy(a), vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinalgError;
    use crate::linalg_backends::LapackBackend;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use ndarray_linalg::{c64, SVD};

    fn reconstruct(svd: &TypedSvd<f64>) -> Array2<f64> {
        let k = svd.singular_values.len();
        let u = svd.u.slice(ndarray::s![.., ..k]);
        let vt = svd.vt.slice(ndarray::s![..k, ..]);
        let scaled = &u * &svd.singular_values.view().insert_axis(ndarray::Axis(0));
        scaled.dot(&vt)
    }

    #[test]
    fn full_vectors_have_square_factors() {
        let a = array![[3.0_f64, 1.0, 1.0], [-1.0, 3.0, 1.0]];
        let svd = gesvd(&LapackBackend, a.view(), SvdVectors::All).unwrap();
        assert_eq!(svd.u.dim(), (2, 2));
        assert_eq!(svd.vt.dim(), (3, 3));
        assert_eq!(svd.singular_values.len(), 2);
        // Known singular values of this matrix: sqrt(12) and sqrt(10).
        assert_abs_diff_eq!(svd.singular_values[0], 12.0_f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(svd.singular_values[1], 10.0_f64.sqrt(), epsilon = 1e-12);
        let back = reconstruct(&svd);
        for (x, y) in back.iter().zip(a.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn thin_vectors_are_truncated() {
        let a = Array2::from_shape_fn((5, 3), |(i, j)| (i * 3 + j) as f64 + if i == j { 2.0 } else { 0.0 });
        let svd = gesdd(&LapackBackend, a.view(), SvdVectors::Thin).unwrap();
        assert_eq!(svd.u.dim(), (5, 3));
        assert_eq!(svd.vt.dim(), (3, 3));
        let back = reconstruct(&svd);
        for (x, y) in back.iter().zip(a.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-10);
        }
    }

    #[test]
    fn drivers_agree_with_each_other_and_the_reference() {
        let a = array![[2.0_f64, -1.0, 0.5, 4.0], [0.0, 1.5, -2.0, 1.0], [3.0, 0.25, 1.0, -1.0]];
        let standard = gesvd(&LapackBackend, a.view(), SvdVectors::All).unwrap();
        let divide = gesdd(&LapackBackend, a.view(), SvdVectors::All).unwrap();
        let (_, reference, _) = a.svd(false, false).unwrap();
        for ((x, y), z) in standard
            .singular_values
            .iter()
            .zip(divide.singular_values.iter())
            .zip(reference.iter())
        {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
            assert_abs_diff_eq!(*x, *z, epsilon = 1e-12);
        }
        assert!(standard.singular_values.iter().all(|&s| s >= 0.0));
    }

    #[test]
    fn complex_input_yields_real_singular_values() {
        let a = array![
            [c64::new(1.0, 1.0), c64::new(0.0, 0.0)],
            [c64::new(0.0, 0.0), c64::new(0.0, -2.0)]
        ];
        let svd = gesvd(&LapackBackend, a.view(), SvdVectors::All).unwrap();
        assert_abs_diff_eq!(svd.singular_values[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(svd.singular_values[1], 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn input_is_not_modified() {
        let a = array![[1.0_f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let before = a.clone();
        let _ = gesdd(&LapackBackend, a.view(), SvdVectors::All).unwrap();
        assert_eq!(a, before);
    }

    #[test]
    fn empty_input_is_a_shape_error() {
        let a = Array2::<f64>::zeros((0, 3));
        let err = gesvd(&LapackBackend, a.view(), SvdVectors::All).unwrap_err();
        assert!(matches!(err, LinalgError::Shape { op: Operation::Gesvd, .. }));
    }
}

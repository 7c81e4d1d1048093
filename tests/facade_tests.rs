// tests/facade_tests.rs

use dense_decomp::linalg_backends::{
    BackendCholesky, BackendEig, BackendLu, BackendSvd, KernelResult, KernelScalar, RawEigen,
};
use dense_decomp::{
    DType, DenseLinalg, EigenvectorRequest, LapackBackend, LinalgConfig, LinalgError, LuFactors,
    Matrix, Operation, PivotVector, StorageKind, SvdVectors, Uplo,
};
use float_cmp::assert_approx_eq;
use ndarray::{array, Array1, Array2};
use ndarray_linalg::{c64, Inverse, Solve};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cell::Cell;

/// Wraps the LAPACK kernel and counts every routine call that reaches it.
#[derive(Default)]
struct CountingKernel {
    inner: LapackBackend,
    calls: Cell<usize>,
}

impl CountingKernel {
    fn hit(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

impl<F: KernelScalar> BackendLu<F> for CountingKernel {
    fn getrf(&self, a: &mut Array2<F>) -> KernelResult<PivotVector> {
        self.hit();
        BackendLu::<F>::getrf(&self.inner, a)
    }

    fn getri(&self, a: &mut Array2<F>, pivots: &PivotVector) -> KernelResult<()> {
        self.hit();
        BackendLu::<F>::getri(&self.inner, a, pivots)
    }

    fn getrs(&self, lu: &Array2<F>, pivots: &PivotVector, b: &mut Array2<F>) -> KernelResult<()> {
        self.hit();
        BackendLu::<F>::getrs(&self.inner, lu, pivots, b)
    }
}

impl<F: KernelScalar> BackendCholesky<F> for CountingKernel {
    fn potrf(&self, a: &mut Array2<F>, uplo: Uplo) -> KernelResult<()> {
        self.hit();
        BackendCholesky::<F>::potrf(&self.inner, a, uplo)
    }

    fn potrs(&self, factor: &Array2<F>, uplo: Uplo, b: &mut Array2<F>) -> KernelResult<()> {
        self.hit();
        BackendCholesky::<F>::potrs(&self.inner, factor, uplo, b)
    }
}

impl<F: KernelScalar> BackendEig<F> for CountingKernel {
    fn geev(&self, a: &mut Array2<F>, out: &mut RawEigen<F::Real>) -> KernelResult<()> {
        self.hit();
        BackendEig::<F>::geev(&self.inner, a, out)
    }
}

impl<F: KernelScalar> BackendSvd<F> for CountingKernel {
    fn gesvd(
        &self,
        a: &mut Array2<F>,
        vectors: SvdVectors,
        s: &mut Array1<F::Real>,
        u: &mut Array2<F>,
        vt: &mut Array2<F>,
    ) -> KernelResult<()> {
        self.hit();
        BackendSvd::<F>::gesvd(&self.inner, a, vectors, s, u, vt)
    }

    fn gesdd(
        &self,
        a: &mut Array2<F>,
        vectors: SvdVectors,
        s: &mut Array1<F::Real>,
        u: &mut Array2<F>,
        vt: &mut Array2<F>,
    ) -> KernelResult<()> {
        self.hit();
        BackendSvd::<F>::gesdd(&self.inner, a, vectors, s, u, vt)
    }
}

fn random_f64(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::random_using((rows, cols), Uniform::new(-1.0, 1.0), &mut rng)
}

/// Well-conditioned random matrix: random entries plus a dominant diagonal.
fn random_invertible(n: usize, seed: u64) -> Array2<f64> {
    random_f64(n, n, seed) + Array2::<f64>::eye(n) * (n as f64)
}

fn random_c64(n: usize, seed: u64) -> Array2<c64> {
    let re = random_invertible(n, seed);
    let im = random_f64(n, n, seed + 1000);
    ndarray::Zip::from(&re)
        .and(&im)
        .map_collect(|&r, &i| c64::new(r, i))
}

fn assert_all_close(a: &Array2<f64>, b: &Array2<f64>, eps: f64) {
    assert_eq!(a.dim(), b.dim());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_approx_eq!(f64, *x, *y, epsilon = eps);
    }
}

#[test]
fn validation_failures_never_reach_the_kernel() {
    let linalg = DenseLinalg::with_kernel(CountingKernel::default());

    let mut wide = Matrix::from(Array2::<f64>::zeros((2, 3)));
    assert!(matches!(
        linalg.invert_in_place(&mut wide),
        Err(LinalgError::Shape { op: Operation::Invert, .. })
    ));
    assert!(matches!(
        linalg.geev(&wide, EigenvectorRequest::Both),
        Err(LinalgError::Shape { op: Operation::Geev, .. })
    ));
    let mut wide_copy = wide.clone();
    assert!(matches!(
        linalg.potrf_in_place(&mut wide_copy, Uplo::Upper),
        Err(LinalgError::Shape { .. })
    ));

    let a = Matrix::from(Array2::<f64>::eye(3));
    let short_rhs = Matrix::from(Array2::<f64>::zeros((2, 1)));
    assert!(matches!(linalg.solve(&a, &short_rhs), Err(LinalgError::Shape { .. })));
    assert!(matches!(linalg.posv(&a, &short_rhs), Err(LinalgError::Shape { .. })));

    let sparse = a.clone().with_storage(StorageKind::Yale);
    assert!(matches!(linalg.gesvd(&sparse), Err(LinalgError::StorageType { .. })));
    assert!(matches!(linalg.gesdd(&sparse), Err(LinalgError::StorageType { .. })));

    let ints = Matrix::from(array![[2_i32, 1], [1, 2]]);
    assert!(matches!(linalg.getrf(&ints), Err(LinalgError::DataType { dtype: DType::I32, .. })));
    assert!(matches!(linalg.invert(&ints), Err(LinalgError::DataType { .. })));

    let empty = Matrix::from(Array2::<f64>::zeros((0, 0)));
    assert!(matches!(linalg.eigvals(&empty), Err(LinalgError::Shape { .. })));

    assert_eq!(linalg.kernel().calls.get(), 0);
    assert_eq!(wide.as_f64().unwrap(), &Array2::<f64>::zeros((2, 3)));

    // A valid call does reach it: LU then inverse from the factors.
    let mut square = Matrix::from(random_invertible(3, 1));
    linalg.invert_in_place(&mut square).unwrap();
    assert_eq!(linalg.kernel().calls.get(), 2);
}

#[test]
fn double_inversion_round_trips() {
    let linalg = DenseLinalg::new();
    for seed in 0..4 {
        let a = random_invertible(6, seed);
        let mut m = Matrix::from(a.clone());
        linalg.invert_in_place(&mut m).unwrap();
        linalg.invert_in_place(&mut m).unwrap();
        assert_all_close(m.as_f64().unwrap(), &a, 1e-10);
    }
}

#[test]
fn inversion_matches_reference_implementation() {
    let linalg = DenseLinalg::new();
    let a = random_invertible(5, 42);
    let ours = linalg.invert(&Matrix::from(a.clone())).unwrap();
    let reference = a.inv().unwrap();
    assert_all_close(ours.as_f64().unwrap(), &reference, 1e-12);
}

#[test]
fn complex_inversion_round_trips() {
    let linalg = DenseLinalg::new();
    let a = random_c64(4, 7);
    let inverse = linalg.invert(&Matrix::from(a.clone())).unwrap();
    let product = a.dot(inverse.as_c64().unwrap());
    for ((i, j), z) in product.indexed_iter() {
        let expected = if i == j { 1.0 } else { 0.0 };
        assert_approx_eq!(f64, z.re, expected, epsilon = 1e-10);
        assert_approx_eq!(f64, z.im, 0.0, epsilon = 1e-10);
    }
}

#[test]
fn solution_satisfies_the_system_and_operands_survive() {
    let linalg = DenseLinalg::new();
    let a = random_invertible(7, 3);
    let b = random_f64(7, 3, 4);
    let (ma, mb) = (Matrix::from(a.clone()), Matrix::from(b.clone()));
    let x = linalg.solve(&ma, &mb).unwrap();
    assert_all_close(&a.dot(x.as_f64().unwrap()), &b, 1e-10);
    assert_eq!(ma.as_f64().unwrap(), &a);
    assert_eq!(mb.as_f64().unwrap(), &b);

    let column = b.column(0).to_owned();
    let reference = a.solve(&column).unwrap();
    for (x, y) in x.as_f64().unwrap().column(0).iter().zip(reference.iter()) {
        assert_approx_eq!(f64, *x, *y, epsilon = 1e-12);
    }
}

#[test]
fn single_precision_solve() {
    let linalg = DenseLinalg::new();
    let a = random_invertible(4, 9).mapv(|x| x as f32);
    let b = random_f64(4, 1, 10).mapv(|x| x as f32);
    let x = linalg.solve(&Matrix::from(a.clone()), &Matrix::from(b.clone())).unwrap();
    assert_eq!(x.dtype(), DType::F32);
    let ax = a.dot(x.as_f32().unwrap());
    for (lhs, rhs) in ax.iter().zip(b.iter()) {
        assert_approx_eq!(f32, *lhs, *rhs, epsilon = 1e-4);
    }
}

#[test]
fn cholesky_solve_with_either_triangle() {
    let m = random_f64(5, 5, 21);
    let spd = m.dot(&m.t()) + Array2::<f64>::eye(5) * 5.0;
    let b = random_f64(5, 2, 22);
    for uplo in [Uplo::Upper, Uplo::Lower] {
        let linalg = DenseLinalg::new()
            .with_config(LinalgConfig::default().with_cholesky_triangle(uplo));
        let x = linalg.posv(&Matrix::from(spd.clone()), &Matrix::from(b.clone())).unwrap();
        assert_all_close(&spd.dot(x.as_f64().unwrap()), &b, 1e-10);
    }
}

#[test]
fn cholesky_factor_reconstructs_the_matrix() {
    let linalg = DenseLinalg::new();
    let m = random_f64(4, 4, 31);
    let spd = m.t().dot(&m) + Array2::<f64>::eye(4);
    let factor = linalg.potrf(&Matrix::from(spd.clone()), Uplo::Lower).unwrap();
    let mut l = factor.as_f64().unwrap().clone();
    for i in 0..4 {
        for j in (i + 1)..4 {
            l[[i, j]] = 0.0;
        }
    }
    assert_all_close(&l.dot(&l.t()), &spd, 1e-12);
}

#[test]
fn not_positive_definite_is_a_kernel_failure() {
    let linalg = DenseLinalg::new();
    let mut a = Matrix::from(array![[1.0_f64, 0.0], [0.0, -1.0]]);
    let err = linalg.potrf_in_place(&mut a, Uplo::Upper).unwrap_err();
    assert!(matches!(
        err,
        LinalgError::KernelFailure { op: Operation::Potrf, routine: "dpotrf", info: 2 }
    ));
}

#[test]
fn svd_drivers_agree_and_reconstruct() {
    let a = random_f64(6, 4, 55);
    let thin = LinalgConfig::default().with_svd_vectors(SvdVectors::Thin);
    for config in [LinalgConfig::default(), thin] {
        let linalg = DenseLinalg::new().with_config(config);
        let m = Matrix::from(a.clone());
        let standard = linalg.gesvd(&m).unwrap();
        let divide = linalg.gesdd(&m).unwrap();
        let s1 = standard.singular_values.as_f64().unwrap();
        let s2 = divide.singular_values.as_f64().unwrap();
        assert_eq!(s1.dim(), (4, 1));
        assert_all_close(s1, s2, 1e-12);

        for svd in [&standard, &divide] {
            let u = svd.u.as_f64().unwrap();
            let vt = svd.vt.as_f64().unwrap();
            let s = svd.singular_values.as_f64().unwrap().column(0).to_owned();
            let k = s.len();
            let us = &u.slice(ndarray::s![.., ..k]) * &s.view().insert_axis(ndarray::Axis(0));
            let back = us.dot(&vt.slice(ndarray::s![..k, ..]));
            assert_all_close(&back, &a, 1e-12);
        }
    }
}

#[test]
fn real_eigenvectors_of_conjugate_pairs_are_conjugate_columns() {
    let linalg = DenseLinalg::new();
    for seed in [5_u64, 6, 8] {
        let a = random_f64(8, 8, seed);
        let pairs = linalg.geev(&Matrix::from(a.clone()), EigenvectorRequest::Right).unwrap();
        let values = pairs.values();
        if values.dtype() == DType::F64 {
            continue;
        }
        let values = values.as_c64().unwrap().column(0).to_owned();
        let vectors = pairs.right().unwrap().as_c64().unwrap().clone();
        let mut j = 0;
        while j < values.len() {
            if values[j].im != 0.0 {
                assert_eq!(values[j + 1], values[j].conj());
                for r in 0..8 {
                    assert_eq!(vectors[[r, j + 1]], vectors[[r, j]].conj());
                }
                j += 2;
            } else {
                j += 1;
            }
        }
        let a_c = a.mapv(|x| c64::new(x, 0.0));
        for (j, lambda) in values.iter().enumerate() {
            let v = vectors.column(j);
            for (lhs, rhs) in a_c.dot(&v).iter().zip(v.iter()) {
                assert_approx_eq!(f64, lhs.re, (lambda * rhs).re, epsilon = 1e-9);
                assert_approx_eq!(f64, lhs.im, (lambda * rhs).im, epsilon = 1e-9);
            }
        }
    }
}

#[test]
fn saved_factorization_solves_later() {
    let linalg = DenseLinalg::new();
    let a = random_invertible(5, 77);
    let b = random_f64(5, 2, 78);
    let lu = linalg.getrf(&Matrix::from(a.clone())).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lu.bin");
    lu.save(&path).unwrap();
    let loaded = LuFactors::<Matrix>::load(&path).unwrap();
    assert_eq!(loaded.pivots, lu.pivots);

    let x = linalg.lu_solve(&loaded, &Matrix::from(b.clone())).unwrap();
    assert_all_close(&a.dot(x.as_f64().unwrap()), &b, 1e-10);
}

#[test]
fn corrupted_pivots_in_a_saved_factorization_are_refused() {
    let linalg = DenseLinalg::with_kernel(CountingKernel::default());
    let mut lu = linalg.getrf(&Matrix::from(random_invertible(2, 91))).unwrap();
    let calls = linalg.kernel().calls.get();
    lu.pivots = PivotVector::from_lapack(vec![50_000_000, 2]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lu.bin");
    lu.save(&path).unwrap();
    let loaded = LuFactors::<Matrix>::load(&path).unwrap();

    let b = Matrix::from(array![[1.0_f64], [1.0]]);
    let err = linalg.lu_solve(&loaded, &b).unwrap_err();
    assert!(matches!(
        err,
        LinalgError::KernelContract { op: Operation::LuSolve, routine: "getrs", .. }
    ));

    lu.pivots = PivotVector::from_lapack(vec![0, 2]);
    assert!(matches!(
        linalg.lu_solve(&lu, &b),
        Err(LinalgError::KernelContract { .. })
    ));
    assert_eq!(linalg.kernel().calls.get(), calls);
}

#[test]
fn loading_garbage_is_a_persistence_error() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), [0xff_u8; 3]).unwrap();
    let err = LuFactors::<Matrix>::load(file.path()).unwrap_err();
    assert!(matches!(err, LinalgError::Persistence(_)));
}

#[test]
fn pivots_describe_the_row_permutation() {
    let linalg = DenseLinalg::new();
    let a = array![[0.0_f64, 1.0, 2.0], [1.0, 0.0, 3.0], [4.0, -3.0, 8.0]];
    let mut m = Matrix::from(a.clone());
    let pivots = linalg.getrf_in_place(&mut m).unwrap();
    let lu = m.as_f64().unwrap();

    let n = 3;
    let mut l = Array2::<f64>::eye(n);
    let mut u = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            if j < i {
                l[[i, j]] = lu[[i, j]];
            } else {
                u[[i, j]] = lu[[i, j]];
            }
        }
    }
    let perm = pivots.permutation(n);
    let pa = Array2::from_shape_fn((n, n), |(i, j)| a[[perm[i], j]]);
    assert_all_close(&l.dot(&u), &pa, 1e-12);
}

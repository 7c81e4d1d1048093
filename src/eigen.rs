// src/eigen.rs

//! General eigendecomposition (`?geev`) and conjugate-pair reconstruction.
//!
//! Complex routines hand back final values and vectors. Real routines split
//! every eigenvalue into a real and an imaginary part, and store the
//! eigenvectors of a complex-conjugate pair `(λ, conj(λ))` as two real columns
//! `[Re v, Im v]`. [`reconstruct`] turns that packed form into complex values
//! and vectors. When no eigenvalue has an imaginary part, the real-typed output
//! is returned unchanged.

use crate::error::{Operation, Result};
use crate::linalg_backends::{BackendEig, EigenJobs, KernelError, KernelResult, KernelScalar, RawEigen, RealScalar};
use crate::ownership::working_copy;
use crate::validate::check_square;
use log::{debug, trace};
use ndarray::{s, Array1, Array2, ArrayView2, Zip};
use num_complex::Complex;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Which eigenvector sets to compute alongside the eigenvalues.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EigenvectorRequest {
    /// Eigenvalues only.
    None,
    Left,
    #[default]
    Right,
    Both,
}

impl EigenvectorRequest {
    pub fn jobs(self) -> EigenJobs {
        match self {
            Self::None => EigenJobs::default(),
            Self::Left => EigenJobs { left: true, right: false },
            Self::Right => EigenJobs { left: false, right: true },
            Self::Both => EigenJobs { left: true, right: true },
        }
    }
}

/// Eigenvalues, real-typed when the spectrum has no complex member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EigenValues<R> {
    Real(Array1<R>),
    Complex(Array1<Complex<R>>),
}

impl<R: RealScalar> EigenValues<R> {
    pub fn len(&self) -> usize {
        match self {
            Self::Real(v) => v.len(),
            Self::Complex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Self::Real(_))
    }

    /// The values as complex numbers. Real-typed values get a zero imaginary part.
    pub fn to_complex(&self) -> Array1<Complex<R>> {
        match self {
            Self::Real(v) => v.mapv(|x| Complex::new(x, R::zero())),
            Self::Complex(v) => v.clone(),
        }
    }
}

/// Eigenvector matrix, one eigenvector per column, aligned with the values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EigenVectors<R> {
    Real(Array2<R>),
    Complex(Array2<Complex<R>>),
}

impl<R: RealScalar> EigenVectors<R> {
    pub fn is_real(&self) -> bool {
        matches!(self, Self::Real(_))
    }

    pub fn to_complex(&self) -> Array2<Complex<R>> {
        match self {
            Self::Real(v) => v.mapv(|x| Complex::new(x, R::zero())),
            Self::Complex(v) => v.clone(),
        }
    }
}

/// Eigenvalues packaged with exactly the eigenvector sets that were requested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Eigenpairs<V, M> {
    Values { values: V },
    Left { values: V, left: M },
    Right { values: V, right: M },
    Both { values: V, left: M, right: M },
}

impl<V, M> Eigenpairs<V, M> {
    /// Binds kernel outputs to the shape matching `request`.
    fn package(
        request: EigenvectorRequest,
        values: V,
        left: Option<M>,
        right: Option<M>,
    ) -> KernelResult<Self> {
        match (request, left, right) {
            (EigenvectorRequest::None, _, _) => Ok(Self::Values { values }),
            (EigenvectorRequest::Left, Some(left), _) => Ok(Self::Left { values, left }),
            (EigenvectorRequest::Right, _, Some(right)) => Ok(Self::Right { values, right }),
            (EigenvectorRequest::Both, Some(left), Some(right)) => Ok(Self::Both {
                values,
                left,
                right,
            }),
            (request, _, _) => Err(KernelError::Contract {
                routine: "geev",
                detail: format!("eigenvectors for {:?} were not returned", request),
            }),
        }
    }

    pub fn values(&self) -> &V {
        match self {
            Self::Values { values }
            | Self::Left { values, .. }
            | Self::Right { values, .. }
            | Self::Both { values, .. } => values,
        }
    }

    pub fn left(&self) -> Option<&M> {
        match self {
            Self::Left { left, .. } | Self::Both { left, .. } => Some(left),
            _ => None,
        }
    }

    pub fn right(&self) -> Option<&M> {
        match self {
            Self::Right { right, .. } | Self::Both { right, .. } => Some(right),
            _ => None,
        }
    }

    /// `(values, left, right)`
    pub fn into_parts(self) -> (V, Option<M>, Option<M>) {
        match self {
            Self::Values { values } => (values, None, None),
            Self::Left { values, left } => (values, Some(left), None),
            Self::Right { values, right } => (values, None, Some(right)),
            Self::Both {
                values,
                left,
                right,
            } => (values, Some(left), Some(right)),
        }
    }

    /// Converts the values and every eigenvector matrix, keeping the variant.
    pub fn map<V2, M2>(self, fv: impl FnOnce(V) -> V2, mut fm: impl FnMut(M) -> M2) -> Eigenpairs<V2, M2> {
        match self {
            Self::Values { values } => Eigenpairs::Values { values: fv(values) },
            Self::Left { values, left } => Eigenpairs::Left {
                values: fv(values),
                left: fm(left),
            },
            Self::Right { values, right } => Eigenpairs::Right {
                values: fv(values),
                right: fm(right),
            },
            Self::Both {
                values,
                left,
                right,
            } => Eigenpairs::Both {
                values: fv(values),
                left: fm(left),
                right: fm(right),
            },
        }
    }
}

impl<R: RealScalar, M> Eigenpairs<EigenValues<R>, M> {
    pub fn values_complex(&self) -> Array1<Complex<R>> {
        self.values().to_complex()
    }
}

/// Result of the typed [`geev`].
pub type TypedEigenpairs<R> = Eigenpairs<EigenValues<R>, EigenVectors<R>>;

/// Eigenvalues and the requested eigenvectors of square `a`, using `a` as the
/// kernel's scratch space. `a` holds unspecified values afterwards.
///
/// Eigenvalues come in the order the kernel produces them; nothing is sorted.
pub fn geev_in_place<F, K>(kernel: &K, a: &mut Array2<F>, request: EigenvectorRequest) -> Result<TypedEigenpairs<F::Real>>
where
    F: KernelScalar,
    K: BackendEig<F> + ?Sized,
{
    let op = Operation::Geev;
    check_square(op, a.dim())?;
    debug!("{}: {:?}, {:?} eigenvectors, {:?}", op, a.dim(), request, F::DTYPE);
    let mut raw = F::eigen_buffers(a.nrows(), request.jobs());
    kernel.geev(a, &mut raw).map_err(|e| e.during(op))?;
    let (values, left, right) = reconstruct(raw).map_err(|e| e.during(op))?;
    Eigenpairs::package(request, values, left, right).map_err(|e| e.during(op))
}

/// Eigenvalues and the requested eigenvectors of square `a`. `a` is not modified.
pub fn geev<F, K>(kernel: &K, a: ArrayView2<'_, F>, request: EigenvectorRequest) -> Result<TypedEigenpairs<F::Real>>
where
    F: KernelScalar,
    K: BackendEig<F> + ?Sized,
{
    check_square(Operation::Geev, a.dim())?;
    geev_in_place(kernel, &mut working_copy(a), request)
}

/// Eigenvalues of square `a` without eigenvectors.
pub fn eigvals<F, K>(kernel: &K, a: ArrayView2<'_, F>) -> Result<EigenValues<F::Real>>
where
    F: KernelScalar,
    K: BackendEig<F> + ?Sized,
{
    let (values, _, _) = geev(kernel, a, EigenvectorRequest::None)?.into_parts();
    Ok(values)
}

/// `(values, left, right)` as rebuilt from raw kernel output.
pub type Reconstructed<R> = (EigenValues<R>, Option<EigenVectors<R>>, Option<EigenVectors<R>>);

/// Turns raw `?geev` output into values and vectors.
///
/// Fails if the flagged (non-zero imaginary part) eigenvalues cannot be split
/// into adjacent pairs. Nothing partially reconstructed is returned then.
pub fn reconstruct<R: RealScalar>(raw: RawEigen<R>) -> KernelResult<Reconstructed<R>> {
    match raw {
        RawEigen::Complex {
            values,
            left,
            right,
        } => Ok((
            EigenValues::Complex(values),
            left.map(EigenVectors::Complex),
            right.map(EigenVectors::Complex),
        )),
        RawEigen::Packed { re, im, left, right } => {
            let starts = conjugate_pair_starts(&im)?;
            if starts.is_empty() {
                return Ok((
                    EigenValues::Real(re),
                    left.map(EigenVectors::Real),
                    right.map(EigenVectors::Real),
                ));
            }
            trace!("geev: {} conjugate pair(s) starting at {:?}", starts.len(), starts);
            let values = Zip::from(&re)
                .and(&im)
                .map_collect(|&r, &i| Complex::new(r, i));
            let unpack = |v: Array2<R>| EigenVectors::Complex(unpack_pairs(v, &starts));
            Ok((EigenValues::Complex(values), left.map(unpack), right.map(unpack)))
        }
    }
}

/// First index of every conjugate pair in a packed imaginary-part vector.
fn conjugate_pair_starts<R: RealScalar>(im: &Array1<R>) -> KernelResult<Vec<usize>> {
    let flagged: Vec<usize> = im
        .iter()
        .enumerate()
        .filter(|(_, x)| !x.is_zero())
        .map(|(i, _)| i)
        .collect();
    if flagged.len() % 2 != 0 {
        return Err(KernelError::Contract {
            routine: "geev",
            detail: format!(
                "{} eigenvalues have an imaginary part, which cannot form conjugate pairs",
                flagged.len()
            ),
        });
    }
    flagged
        .chunks_exact(2)
        .map(|pair| {
            if pair[1] == pair[0] + 1 {
                Ok(pair[0])
            } else {
                Err(KernelError::Contract {
                    routine: "geev",
                    detail: format!(
                        "conjugate pair members at {} and {} are not adjacent",
                        pair[0], pair[1]
                    ),
                })
            }
        })
        .collect()
}

/// Upcasts packed real eigenvectors and rebuilds each conjugate pair:
/// `col[i] = col[i] + col[i+1]·i`, then `col[i+1] = conj(col[i])`.
fn unpack_pairs<R: RealScalar>(packed: Array2<R>, starts: &[usize]) -> Array2<Complex<R>> {
    let mut vectors = packed.mapv(|x| Complex::new(x, R::zero()));
    let i = Complex::<R>::i();
    for &j in starts {
        let (mut first, mut second) = vectors.multi_slice_mut((s![.., j], s![.., j + 1]));
        Zip::from(&mut first).and(&mut second).for_each(|re, im| {
            let v = *re + *im * i;
            *re = v;
            *im = v.conj();
        });
    }
    vectors
}

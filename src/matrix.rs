// src/matrix.rs

//! The host matrix container the facade operates on.
//!
//! A [`Matrix`] owns a typed two-dimensional `ndarray` buffer and records how
//! the host stores it. The decomposition code only ever asks a matrix for its
//! shape, storage kind, element type and (after validation) its typed buffer.

use crate::dtype::DType;
use crate::ownership;
use ndarray::{Array2, ArrayBase, Data, Ix2};
use ndarray_linalg::{c32, c64};
use serde::{Deserialize, Serialize};

/// How the host stores a matrix. Only `Dense` can be decomposed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    Dense,
    /// compressed (Yale) sparse storage
    Yale,
    /// list-of-lists sparse storage
    List,
}

/// Memory order of a two-dimensional buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    RowMajor,
    ColumnMajor,
}

impl Layout {
    /// Memory order of `a`, or `None` if it is not contiguous in either order.
    ///
    /// A single column or a single row is contiguous in both orders; it is
    /// reported as `ColumnMajor` and `RowMajor` respectively (a `1×1` buffer
    /// as `RowMajor`).
    pub fn of<S: Data>(a: &ArrayBase<S, Ix2>) -> Option<Self> {
        match (a.is_standard_layout(), a.t().is_standard_layout()) {
            (true, true) if a.ncols() == 1 && a.nrows() > 1 => Some(Self::ColumnMajor),
            (true, _) => Some(Self::RowMajor),
            (false, true) => Some(Self::ColumnMajor),
            (false, false) => None,
        }
    }
}

/// An opaque host value. Such elements can be stored and moved around but
/// never decomposed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opaque(pub String);

/// Typed element buffer of a [`Matrix`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Elements {
    F32(Array2<f32>),
    F64(Array2<f64>),
    C32(Array2<c32>),
    C64(Array2<c64>),
    I32(Array2<i32>),
    I64(Array2<i64>),
    Object(Array2<Opaque>),
}

/// A Rust type stored by one of the [`Elements`] variants.
pub trait Element: Clone {
    fn buffer(elements: &Elements) -> Option<&Array2<Self>>;
    fn buffer_mut(elements: &mut Elements) -> Option<&mut Array2<Self>>;
}

macro_rules! impl_elements_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<Array2<$ty>> for Elements {
                fn from(a: Array2<$ty>) -> Self {
                    Elements::$variant(a)
                }
            }

            impl From<Array2<$ty>> for Matrix {
                fn from(a: Array2<$ty>) -> Self {
                    Matrix::new(Elements::$variant(a))
                }
            }

            impl Element for $ty {
                fn buffer(elements: &Elements) -> Option<&Array2<Self>> {
                    match elements {
                        Elements::$variant(a) => Some(a),
                        _ => None,
                    }
                }

                fn buffer_mut(elements: &mut Elements) -> Option<&mut Array2<Self>> {
                    match elements {
                        Elements::$variant(a) => Some(a),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_elements_from!(
    F32 => f32,
    F64 => f64,
    C32 => c32,
    C64 => c64,
    I32 => i32,
    I64 => i64,
    Object => Opaque,
);

/// Runs `$body` with `$a` bound to the typed buffer, whatever its element type.
macro_rules! with_elements {
    ($elements:expr, $a:ident => $body:expr) => {
        match $elements {
            Elements::F32($a) => $body,
            Elements::F64($a) => $body,
            Elements::C32($a) => $body,
            Elements::C64($a) => $body,
            Elements::I32($a) => $body,
            Elements::I64($a) => $body,
            Elements::Object($a) => $body,
        }
    };
}

impl Elements {
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::C32(_) => DType::C32,
            Self::C64(_) => DType::C64,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::Object(_) => DType::Object,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        with_elements!(self, a => a.dim())
    }

    fn layout(&self) -> Option<Layout> {
        with_elements!(self, a => Layout::of(a))
    }

    fn to_layout(&self, layout: Layout) -> Self {
        with_elements!(self, a => ownership::independent_copy(a.view(), layout).into())
    }

    fn zeros_like(&self) -> Self {
        match self {
            Self::F32(a) => Self::F32(Array2::zeros(a.raw_dim())),
            Self::F64(a) => Self::F64(Array2::zeros(a.raw_dim())),
            Self::C32(a) => Self::C32(Array2::zeros(a.raw_dim())),
            Self::C64(a) => Self::C64(Array2::zeros(a.raw_dim())),
            Self::I32(a) => Self::I32(Array2::zeros(a.raw_dim())),
            Self::I64(a) => Self::I64(Array2::zeros(a.raw_dim())),
            Self::Object(a) => Self::Object(Array2::from_elem(a.raw_dim(), Opaque::default())),
        }
    }

    /// Every numeric element widened to `c64`. `None` for opaque elements.
    fn widened(&self) -> Option<Array2<c64>> {
        Some(match self {
            Self::F32(a) => a.mapv(|x| c64::new(f64::from(x), 0.0)),
            Self::F64(a) => a.mapv(|x| c64::new(x, 0.0)),
            Self::C32(a) => a.mapv(|z| c64::new(f64::from(z.re), f64::from(z.im))),
            Self::C64(a) => a.clone(),
            Self::I32(a) => a.mapv(|x| c64::new(f64::from(x), 0.0)),
            Self::I64(a) => a.mapv(|x| c64::new(x as f64, 0.0)),
            Self::Object(_) => return None,
        })
    }
}

/// A two-dimensional matrix as handed over by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    elements: Elements,
    storage: StorageKind,
}

impl Matrix {
    /// Wraps `elements` as a dense matrix.
    pub fn new(elements: Elements) -> Self {
        Self {
            elements,
            storage: StorageKind::Dense,
        }
    }

    /// Marks the storage kind the host uses for this matrix.
    pub fn with_storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    pub fn is_dense(&self) -> bool {
        self.storage == StorageKind::Dense
    }

    pub fn dtype(&self) -> DType {
        self.elements.dtype()
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.elements.dim()
    }

    pub fn rows(&self) -> usize {
        self.shape().0
    }

    pub fn cols(&self) -> usize {
        self.shape().1
    }

    pub fn is_square(&self) -> bool {
        let (rows, cols) = self.shape();
        rows == cols
    }

    /// Memory order of the underlying buffer, `None` if it is strided.
    pub fn layout(&self) -> Option<Layout> {
        self.elements.layout()
    }

    /// Independent copy with its buffer in the given memory order.
    pub fn to_layout(&self, layout: Layout) -> Self {
        Self {
            elements: self.elements.to_layout(layout),
            storage: self.storage,
        }
    }

    /// Same shape, element type and storage, zero-filled.
    pub fn structural_clone(&self) -> Self {
        Self {
            elements: self.elements.zeros_like(),
            storage: self.storage,
        }
    }

    /// Element at `(row, col)`. `None` if out of bounds or if the matrix
    /// does not hold `T`.
    pub fn get<T: Element>(&self, row: usize, col: usize) -> Option<&T> {
        T::buffer(&self.elements)?.get((row, col))
    }

    /// Overwrites the element at `(row, col)` and returns the old value.
    /// `None`, with the matrix unchanged, if out of bounds or if the matrix
    /// does not hold `T`.
    pub fn set<T: Element>(&mut self, row: usize, col: usize, value: T) -> Option<T> {
        let slot = T::buffer_mut(&mut self.elements)?.get_mut((row, col))?;
        Some(std::mem::replace(slot, value))
    }

    pub fn elements(&self) -> &Elements {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut Elements {
        &mut self.elements
    }

    pub fn into_elements(self) -> Elements {
        self.elements
    }

    /// Converts to another element type.
    ///
    /// Returns `None` when the conversion would drop information the target
    /// cannot hold at all: complex to real, anything to or from opaque, and
    /// anything to integer.
    pub fn cast(&self, dtype: DType) -> Option<Self> {
        if dtype == self.dtype() {
            return Some(self.clone());
        }
        if self.dtype().is_complex() && !dtype.is_complex() {
            return None;
        }
        let wide = self.elements.widened()?;
        let elements = match dtype {
            DType::F32 => Elements::F32(wide.mapv(|z| z.re as f32)),
            DType::F64 => Elements::F64(wide.mapv(|z| z.re)),
            DType::C32 => Elements::C32(wide.mapv(|z| c32::new(z.re as f32, z.im as f32))),
            DType::C64 => Elements::C64(wide),
            DType::I32 | DType::I64 | DType::Object => return None,
        };
        Some(Self {
            elements,
            storage: self.storage,
        })
    }
}

macro_rules! impl_typed_access {
    ($($variant:ident => $ty:ty, $as_ref:ident, $as_mut:ident);* $(;)?) => {
        impl Matrix {
            $(
                pub fn $as_ref(&self) -> Option<&Array2<$ty>> {
                    match &self.elements {
                        Elements::$variant(a) => Some(a),
                        _ => None,
                    }
                }

                pub fn $as_mut(&mut self) -> Option<&mut Array2<$ty>> {
                    match &mut self.elements {
                        Elements::$variant(a) => Some(a),
                        _ => None,
                    }
                }
            )*
        }
    };
}

impl_typed_access!(
    F32 => f32, as_f32, as_f32_mut;
    F64 => f64, as_f64, as_f64_mut;
    C32 => c32, as_c32, as_c32_mut;
    C64 => c64, as_c64, as_c64_mut;
    I32 => i32, as_i32, as_i32_mut;
    I64 => i64, as_i64, as_i64_mut;
);

// src/lib.rs
// Dense matrix decompositions over LAPACK

#![doc = include_str!("../README.md")]

pub mod config;
pub mod dtype;
pub mod eigen;
pub mod error;
pub mod facade;
pub mod factorize;
pub mod linalg_backends;
pub mod matrix;
pub mod ownership;
pub mod svd;
pub mod validate;


pub use config::LinalgConfig;
pub use dtype::DType;
pub use eigen::{EigenValues, EigenVectors, Eigenpairs, EigenvectorRequest};
pub use error::{LinalgError, Operation, Result};
pub use facade::DenseLinalg;
pub use factorize::LuFactors;
pub use linalg_backends::{KernelBoundary, LapackBackend, PivotVector, SvdVectors, Uplo};
pub use matrix::{Element, Elements, Layout, Matrix, StorageKind};
pub use svd::Svd;

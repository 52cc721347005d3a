// Randomized low-rank approximation (randomized PCA / SVD)

#![doc = include_str!("../README.md")]

pub mod error;
pub mod linalg_backends;
mod operators;
pub mod randpca;
pub mod validation;

pub use error::{InvalidMatrixReason, RandPcaError};
pub use randpca::{
    configure_and_run, EffectiveParams, Factorization, RandPcaConfig, RandomizedPca, SvdBranch,
};

// src/validation.rs

use ndarray::parallel::prelude::*;
use ndarray::{ArrayView2, Axis};

use crate::error::InvalidMatrixReason;

/// Checks an input matrix before any numerical work.
///
/// Rejects empty matrices and non-finite entries. When `reject_negative` is set,
/// any entry below zero is rejected as well. Rows are scanned in parallel, and the
/// reported entry is the first offending one in row-major order.
pub fn validate_matrix(
    matrix: ArrayView2<f64>,
    reject_negative: bool,
) -> Result<(), InvalidMatrixReason> {
    let (rows, cols) = matrix.dim();
    if rows == 0 || cols == 0 {
        return Err(InvalidMatrixReason::Empty { rows, cols });
    }

    let offending = matrix
        .axis_iter(Axis(0))
        .into_par_iter()
        .enumerate()
        .find_map_first(|(row, values)| {
            values.iter().enumerate().find_map(|(col, &value)| {
                if !value.is_finite() {
                    Some(InvalidMatrixReason::NonFinite { row, col, value })
                } else if reject_negative && value < 0.0 {
                    Some(InvalidMatrixReason::Negative { row, col, value })
                } else {
                    None
                }
            })
        });

    match offending {
        Some(reason) => Err(reason),
        None => Ok(()),
    }
}

// src/operators.rs

use ndarray::{Array2, ArrayView2, Axis};

/// The matrix the sketch is taken of: either `A` itself or the centered
/// `A - c * 1_m 1_n^T`.
///
/// The centered form is never materialized inside the power iterations; every
/// product is expanded as `A X - c 1_m (1_n^T X)` or `W A - c (W 1_m) 1_n^T`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum InputOperator<'a> {
    Raw(ArrayView2<'a, f64>),
    Centered {
        matrix: ArrayView2<'a, f64>,
        offset: f64,
    },
}

impl<'a> InputOperator<'a> {
    pub(crate) fn new(matrix: ArrayView2<'a, f64>, centering_offset: Option<f64>) -> Self {
        match centering_offset {
            None => InputOperator::Raw(matrix),
            Some(offset) => InputOperator::Centered { matrix, offset },
        }
    }

    fn matrix(&self) -> ArrayView2<'a, f64> {
        match *self {
            InputOperator::Raw(matrix) => matrix,
            InputOperator::Centered { matrix, .. } => matrix,
        }
    }

    pub(crate) fn dim(&self) -> (usize, usize) {
        self.matrix().dim()
    }

    /// `Op * x` for an `n x l` block `x`, giving `m x l`.
    pub(crate) fn apply(&self, x: ArrayView2<f64>) -> Array2<f64> {
        match *self {
            InputOperator::Raw(matrix) => matrix.dot(&x),
            InputOperator::Centered { matrix, offset } => {
                let mut product = matrix.dot(&x);
                // c * 1_m (1_n^T x): every row loses c times the column sums of x
                let column_sums = x.sum_axis(Axis(0)) * offset;
                product -= &column_sums;
                product
            }
        }
    }

    /// `w * Op` for an `l x m` block `w`, giving `l x n`.
    pub(crate) fn left_multiply(&self, w: ArrayView2<f64>) -> Array2<f64> {
        match *self {
            InputOperator::Raw(matrix) => w.dot(&matrix),
            InputOperator::Centered { matrix, offset } => {
                let mut product = w.dot(&matrix);
                // c (w 1_m) 1_n^T: every column loses c times the row sums of w
                let row_sums = (w.sum_axis(Axis(1)) * offset).insert_axis(Axis(1));
                product -= &row_sums;
                product
            }
        }
    }

    /// `Op^T * y` for an `m x l` block `y`, computed as `(y^T Op)^T`.
    pub(crate) fn apply_adjoint(&self, y: ArrayView2<f64>) -> Array2<f64> {
        self.left_multiply(y.t()).reversed_axes()
    }

    /// Dense copy of the operator, used only where the full SVD is taken directly.
    pub(crate) fn materialize(&self) -> Array2<f64> {
        match *self {
            InputOperator::Raw(matrix) => matrix.to_owned(),
            InputOperator::Centered { matrix, offset } => matrix.mapv(|value| value - offset),
        }
    }
}

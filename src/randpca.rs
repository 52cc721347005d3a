// Randomized PCA (Halko, Martinsson & Tropp, "Finding structure with randomness", 2009)

use log::{debug, info, trace, warn};
use ndarray::{s, Array1, Array2, ArrayView2};
use ndarray_rand::RandomExt;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::RandPcaError;
use crate::linalg_backends::{DenseBackend, NdarrayLinAlgBackend};
use crate::operators::InputOperator;
use crate::validation::validate_matrix;

/// Ratio between a matrix dimension and the block size below which randomization
/// stops paying off and the economy SVD is taken directly.
const DIRECT_SVD_RATIO: f64 = 1.25;

/// Power iterations used when a negative count is requested.
const DEFAULT_POWER_ITERATIONS: usize = 2;

/// Extra sketch columns beyond the rank when no block size is given (or it is too small).
const DEFAULT_OVERSAMPLING: usize = 2;

/// Requested parameters of a randomized PCA fit.
///
/// Out-of-range values are not errors: [`RandPcaConfig::resolve`] clamps them
/// to the nearest valid value for a given matrix shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandPcaConfig {
    /// Rank of the approximation. Valid range: `1..=min(m, n)`.
    pub k: usize,
    /// When `false`, the matrix is centered by `c = sum(A) / m` before approximation.
    pub raw: bool,
    /// Number of normalized power iterations. Negative values fall back to 2.
    pub its: i64,
    /// Block size (sketch width). `None` means `k + 2`; values below `k` also give `k + 2`.
    pub l: Option<usize>,
    /// Seed for the random test matrix. `None` draws a seed from the thread RNG.
    pub seed: Option<u64>,
    /// Reject matrices holding any negative entry.
    pub reject_negative: bool,
    /// The caller's matrix originated from a sparse store. Input here is always
    /// dense, so this only affects diagnostics.
    pub sparse_input: bool,
}

impl Default for RandPcaConfig {
    fn default() -> Self {
        Self {
            k: 6,
            raw: false,
            its: DEFAULT_POWER_ITERATIONS as i64,
            l: None,
            seed: None,
            reject_negative: true,
            sparse_input: false,
        }
    }
}

impl RandPcaConfig {
    pub fn with_rank(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_power_iterations(mut self, its: i64) -> Self {
        self.its = its;
        self
    }

    pub fn with_block_size(mut self, l: usize) -> Self {
        self.l = Some(l);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_reject_negative(mut self, reject_negative: bool) -> Self {
        self.reject_negative = reject_negative;
        self
    }

    pub fn with_sparse_input(mut self, sparse_input: bool) -> Self {
        self.sparse_input = sparse_input;
        self
    }

    /// Clamps the requested parameters for an `m x n` matrix.
    ///
    /// * `k > min(m, n)` becomes `min(m, n)`, and `k = 0` becomes 1.
    /// * `its < 0` becomes 2.
    /// * `l < k` (or no `l`) becomes `k + 2`.
    ///
    /// Each correction is reported at `info` level.
    pub fn resolve(&self, m: usize, n: usize) -> EffectiveParams {
        let max_rank = m.min(n).max(1);
        let k = if self.k > max_rank {
            info!(
                "The input 'k' ({}) is greater than the smallest dimension of 'A' ({}), using {} instead.",
                self.k, max_rank, max_rank
            );
            max_rank
        } else if self.k == 0 {
            info!("The input 'k' is 0, using 1 instead.");
            1
        } else {
            self.k
        };

        let its = if self.its < 0 {
            info!(
                "The input 'its' ({}) is less than 0, using {} instead.",
                self.its, DEFAULT_POWER_ITERATIONS
            );
            DEFAULT_POWER_ITERATIONS
        } else {
            self.its as usize
        };

        let l = match self.l {
            None => k + DEFAULT_OVERSAMPLING,
            Some(l) if l < k => {
                info!(
                    "The input 'l' ({}) is less than 'k' ({}), using {} instead.",
                    l,
                    k,
                    k + DEFAULT_OVERSAMPLING
                );
                k + DEFAULT_OVERSAMPLING
            }
            Some(l) => l,
        };

        EffectiveParams { k, its, l, raw: self.raw }
    }
}

/// Parameters actually used by a fit, after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveParams {
    pub k: usize,
    pub its: usize,
    pub l: usize,
    pub raw: bool,
}

/// The numerical path a fit takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SvdBranch {
    /// Block size is large relative to the matrix: economy SVD of the whole (possibly centered) matrix.
    Direct,
    /// `m >= n`, uncentered: sketch the column space of `A`.
    TallRaw,
    /// `m < n`, uncentered: sketch the row space of `A`.
    WideRaw,
    /// `m >= n`, centered.
    TallCentered,
    /// `m < n`, centered.
    WideCentered,
}

impl SvdBranch {
    /// Picks the path for an `m x n` matrix with block size `l`.
    pub fn select(m: usize, n: usize, l: usize, raw: bool) -> Self {
        let block = l as f64;
        if block >= m as f64 / DIRECT_SVD_RATIO || block >= n as f64 / DIRECT_SVD_RATIO {
            return SvdBranch::Direct;
        }
        match (m >= n, raw) {
            (true, true) => SvdBranch::TallRaw,
            (false, true) => SvdBranch::WideRaw,
            (true, false) => SvdBranch::TallCentered,
            (false, false) => SvdBranch::WideCentered,
        }
    }

    pub fn is_randomized(self) -> bool {
        !matches!(self, SvdBranch::Direct)
    }

    fn is_tall(self) -> bool {
        matches!(self, SvdBranch::TallRaw | SvdBranch::TallCentered)
    }
}

/// Truncated factors `A ≈ U diag(S) V^T` (or `A - c ≈ U diag(S) V^T` when centered).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factorization {
    /// Left singular vectors, `m x k`.
    pub u: Array2<f64>,
    /// Singular values, length `k`, non-increasing.
    pub s: Array1<f64>,
    /// Right singular vectors, `n x k`.
    pub v: Array2<f64>,
    /// The scalar `c` subtracted from every entry, if the matrix was centered.
    pub centering_offset: Option<f64>,
}

impl Factorization {
    /// Rebuilds the approximation of the original matrix, adding the centering
    /// offset back when one was applied.
    pub fn reconstruct(&self) -> Array2<f64> {
        // U diag(S): scale column j of U by S[j]
        let scaled_u = &self.u * &self.s;
        let mut approximation = scaled_u.dot(&self.v.t());
        if let Some(offset) = self.centering_offset {
            approximation += offset;
        }
        approximation
    }

    /// `||A - reconstruct()||_F / ||A||_F`.
    ///
    /// Falls back to the absolute Frobenius error when `A` is all zeros.
    /// Returns `None` if `a` does not have shape `(u.nrows(), v.nrows())`.
    pub fn relative_error(&self, a: ArrayView2<f64>) -> Option<f64> {
        if a.dim() != (self.u.nrows(), self.v.nrows()) {
            return None;
        }
        let approximation = self.reconstruct();
        let residual_norm = (&a - &approximation)
            .iter()
            .map(|value| value * value)
            .sum::<f64>()
            .sqrt();
        let reference_norm = a.iter().map(|value| value * value).sum::<f64>().sqrt();
        if reference_norm > 0.0 {
            Some(residual_norm / reference_norm)
        } else {
            Some(residual_norm)
        }
    }

    /// Variance captured per component, `S^2 / (m - 1)`. NaN when `m = 1`.
    pub fn explained_variance(&self) -> Array1<f64> {
        let m = self.u.nrows();
        if m > 1 {
            self.s.mapv(|s_val| s_val.powi(2) / (m - 1) as f64)
        } else {
            Array1::from_elem(self.s.len(), f64::NAN)
        }
    }
}

/// Randomized low-rank approximation of a dense non-negative matrix.
///
/// Built only through [`RandomizedPca::fit`], which validates the input, runs the
/// factorization once and keeps the truncated factors. Every accessor afterwards
/// returns the same values; nothing is recomputed or re-randomized.
#[derive(Debug, Clone)]
pub struct RandomizedPca {
    input: Array2<f64>,
    config: RandPcaConfig,
    params: EffectiveParams,
    branch: SvdBranch,
    factors: Factorization,
}

impl RandomizedPca {
    /// Fits a rank-`k` approximation of `a` with the ndarray-linalg backend.
    ///
    /// `a` is copied; the caller keeps its matrix.
    ///
    /// # Errors
    /// * [`RandPcaError::InvalidMatrix`] if `a` is empty, holds a NaN/infinite value,
    ///   or (with `reject_negative`) a negative value. Nothing is computed in that case.
    /// * [`RandPcaError::Backend`] if a QR or SVD call of the backend fails.
    /// * [`RandPcaError::RandomSource`] if no seed was given and the thread RNG fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use rand_pca::{RandPcaConfig, RandomizedPca};
    ///
    /// let a = array![[1.0, 2.0, 3.0], [2.0, 3.0, 4.0], [3.0, 4.0, 5.5]];
    /// let config = RandPcaConfig::default().with_rank(2).with_raw(true).with_seed(7);
    /// let pca = RandomizedPca::fit(a.view(), config).unwrap();
    /// let (u, s, v) = pca.get_outputs();
    /// assert_eq!((u.dim(), s.len(), v.dim()), ((3, 2), 2, (3, 2)));
    /// ```
    pub fn fit(a: ArrayView2<f64>, config: RandPcaConfig) -> Result<Self, RandPcaError> {
        Self::fit_with_backend(a, config, &NdarrayLinAlgBackend)
    }

    /// Same as [`RandomizedPca::fit`] with an explicit dense backend.
    pub fn fit_with_backend<B: DenseBackend>(
        a: ArrayView2<f64>,
        config: RandPcaConfig,
        backend: &B,
    ) -> Result<Self, RandPcaError> {
        let fit_start_time = Instant::now();

        // --- 1. Input Validation ---
        validate_matrix(a, config.reject_negative)?;
        let input = a.to_owned();
        let (m, n) = input.dim();

        // --- 2. Parameter Resolution and Branch Selection ---
        let params = config.resolve(m, n);
        let branch = SvdBranch::select(m, n, params.l, params.raw);
        debug!(
            "Randomized PCA on {}x{} matrix: k={}, l={}, its={}, raw={}, branch={:?}",
            m, n, params.k, params.l, params.its, params.raw, branch
        );
        if config.sparse_input {
            debug!("Input flagged as sparse; factorizing its dense copy.");
        }

        // --- 3. Centering ---
        let centering_offset = if params.raw {
            None
        } else {
            let offset = input.sum() / m as f64;
            debug!("Centering offset c = sum(A) / m = {}", offset);
            Some(offset)
        };

        // --- 4. Factorization ---
        let operator = InputOperator::new(input.view(), centering_offset);
        let (u_full, s_full, v_full) = if branch.is_randomized() {
            let mut rng = match config.seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_rng(rand::thread_rng())?,
            };
            if branch.is_tall() {
                tall_factors(&operator, &params, &mut rng, backend)?
            } else {
                wide_factors(&operator, &params, &mut rng, backend)?
            }
        } else {
            direct_factors(&operator, backend)?
        };

        // --- 5. Truncation to rank k ---
        let k = params.k;
        let factors = Factorization {
            u: u_full.slice(s![.., ..k]).to_owned(),
            s: s_full.slice(s![..k]).to_owned(),
            v: v_full.slice(s![.., ..k]).to_owned(),
            centering_offset,
        };

        if factors
            .u
            .iter()
            .chain(factors.s.iter())
            .chain(factors.v.iter())
            .any(|value| !value.is_finite())
        {
            warn!(
                "Randomized PCA produced non-finite factors ({:?} branch); the sketch is likely rank deficient.",
                branch
            );
        }
        info!(
            "Computed rank-{} randomized PCA of {}x{} matrix ({:?}) in {:?}",
            k,
            m,
            n,
            branch,
            fit_start_time.elapsed()
        );

        Ok(Self {
            input,
            config,
            params,
            branch,
            factors,
        })
    }

    /// Copies of the truncated factors `(U, S, V)`.
    pub fn get_outputs(&self) -> (Array2<f64>, Array1<f64>, Array2<f64>) {
        (
            self.factors.u.clone(),
            self.factors.s.clone(),
            self.factors.v.clone(),
        )
    }

    /// Moves the factors out of the approximator.
    pub fn into_factorization(self) -> Factorization {
        self.factors
    }

    pub fn factorization(&self) -> &Factorization {
        &self.factors
    }

    pub fn u(&self) -> &Array2<f64> {
        &self.factors.u
    }

    pub fn s(&self) -> &Array1<f64> {
        &self.factors.s
    }

    pub fn v(&self) -> &Array2<f64> {
        &self.factors.v
    }

    /// The copy of the input matrix taken at fit time.
    pub fn input(&self) -> &Array2<f64> {
        &self.input
    }

    pub fn config(&self) -> &RandPcaConfig {
        &self.config
    }

    /// Parameters after clamping.
    pub fn params(&self) -> EffectiveParams {
        self.params
    }

    pub fn branch(&self) -> SvdBranch {
        self.branch
    }

    /// `Some(sum(A) / m)` when the input was centered.
    pub fn centering_offset(&self) -> Option<f64> {
        self.factors.centering_offset
    }
}

/// Positional form of [`RandomizedPca::fit`]: seeds from the thread RNG and
/// rejects negative entries.
pub fn configure_and_run(
    a: ArrayView2<f64>,
    k: usize,
    raw: bool,
    its: i64,
    l: usize,
) -> Result<RandomizedPca, RandPcaError> {
    let config = RandPcaConfig {
        k,
        raw,
        its,
        l: Some(l),
        ..RandPcaConfig::default()
    };
    RandomizedPca::fit(a, config)
}

type RawFactors = (Array2<f64>, Array1<f64>, Array2<f64>);

/// Test matrix with entries `2u - 1`, `u ~ U[0, 1)`.
fn random_test_matrix<R: Rng>(shape: (usize, usize), rng: &mut R) -> Array2<f64> {
    Array2::random_using(shape, Uniform::new(0.0, 1.0), rng).mapv_into(|u| 2.0 * u - 1.0)
}

fn direct_factors<B: DenseBackend>(
    operator: &InputOperator,
    backend: &B,
) -> Result<RawFactors, RandPcaError> {
    let dense = operator.materialize();
    let svd = backend
        .svd_econ(dense.view())
        .map_err(RandPcaError::backend("direct economy SVD"))?;
    Ok((svd.u, svd.s, svd.vt.reversed_axes()))
}

/// Re-normalizes a sketch block: QR on the final half-step, LU otherwise.
fn renormalize<B: DenseBackend>(
    block: Array2<f64>,
    use_qr: bool,
    backend: &B,
) -> Result<Array2<f64>, RandPcaError> {
    if use_qr {
        backend
            .qr_q_factor(&block)
            .map_err(RandPcaError::backend("QR re-orthonormalization"))
    } else {
        backend
            .lu_permuted_lower(&block)
            .map_err(RandPcaError::backend("LU re-normalization"))
    }
}

/// `m >= n`: sketch the range of the operator, then SVD `Q^T Op`.
fn tall_factors<B: DenseBackend, R: Rng>(
    operator: &InputOperator,
    params: &EffectiveParams,
    rng: &mut R,
    backend: &B,
) -> Result<RawFactors, RandPcaError> {
    let (_, n) = operator.dim();
    let its = params.its;

    // Q = Op * Omega, Omega is n x l
    let omega = random_test_matrix((n, params.l), rng);
    let mut q = renormalize(operator.apply(omega.view()), its == 0, backend)?;

    for round in 0..its {
        q = renormalize(operator.apply_adjoint(q.view()), false, backend)?;
        let is_last_round = round + 1 == its;
        q = renormalize(operator.apply(q.view()), is_last_round, backend)?;
        trace!("Power iteration {}/{} done (tall sketch {:?})", round + 1, its, q.dim());
    }

    // Q^T Op = R S V^T  =>  Op ≈ (Q R) S V^T
    let projected = operator.left_multiply(q.t());
    let svd = backend
        .svd_econ(projected.view())
        .map_err(RandPcaError::backend("SVD of projected sketch"))?;
    Ok((q.dot(&svd.u), svd.s, svd.vt.reversed_axes()))
}

/// `m < n`: sketch the range of the adjoint, then SVD `Op Q`.
fn wide_factors<B: DenseBackend, R: Rng>(
    operator: &InputOperator,
    params: &EffectiveParams,
    rng: &mut R,
    backend: &B,
) -> Result<RawFactors, RandPcaError> {
    let (m, _) = operator.dim();
    let its = params.its;

    // Q = (Omega * Op)^T, Omega is l x m
    let omega = random_test_matrix((params.l, m), rng);
    let initial = operator.left_multiply(omega.view()).reversed_axes();
    let mut q = renormalize(initial, its == 0, backend)?;

    for round in 0..its {
        q = renormalize(operator.apply(q.view()), false, backend)?;
        let is_last_round = round + 1 == its;
        q = renormalize(operator.apply_adjoint(q.view()), is_last_round, backend)?;
        trace!("Power iteration {}/{} done (wide sketch {:?})", round + 1, its, q.dim());
    }

    // Op Q = U S R^T  =>  Op ≈ U S (Q R)^T
    let projected = operator.apply(q.view());
    let svd = backend
        .svd_econ(projected.view())
        .map_err(RandPcaError::backend("SVD of projected sketch"))?;
    Ok((svd.u, svd.s, q.dot(&svd.vt.t())))
}

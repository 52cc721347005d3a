// In tests/randpca_tests.rs

use ndarray::{array, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_pca::{
    configure_and_run, InvalidMatrixReason, RandPcaConfig, RandPcaError, RandomizedPca, SvdBranch,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn low_rank_matrix(m: usize, n: usize, rank: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let left = Array2::random_using((m, rank), Uniform::new(0.0, 1.0), &mut rng);
    let right = Array2::random_using((rank, n), Uniform::new(0.0, 1.0), &mut rng);
    left.dot(&right)
}

#[test]
fn test_configure_and_run_positional_contract() {
    init_logging();
    let a = array![
        [1.0, 2.0, 3.0],
        [2.0, 3.0, 4.0],
        [3.0, 4.0, 5.0],
        [4.0, 5.0, 6.0],
        [5.0, 6.0, 8.0]
    ];
    let pca = configure_and_run(a.view(), 2, true, 2, 4).expect("valid input should fit");
    let (u, s, v) = pca.get_outputs();

    assert_eq!(u.dim(), (5, 2));
    assert_eq!(s.len(), 2);
    assert_eq!(v.dim(), (3, 2));
    assert!(s[0] >= s[1] && s[1] >= 0.0);

    let factors = pca.into_factorization();
    let relative_error = factors.relative_error(a.view()).unwrap();
    assert!(relative_error < 0.1, "relative error {} too large", relative_error);
}

#[test]
fn test_configure_and_run_clamps_instead_of_failing() {
    let a = low_rank_matrix(10, 10, 2, 1);
    let pca = configure_and_run(a.view(), 1000, true, -1, 0).unwrap();
    let params = pca.params();
    assert_eq!(params.k, 10);
    assert_eq!(params.its, 2);
    assert_eq!(params.l, 12);
    assert_eq!(pca.branch(), SvdBranch::Direct);
}

#[test]
fn test_invalid_matrices_surface_as_errors() {
    let with_nan = array![[1.0, f64::NAN], [2.0, 3.0]];
    let error = configure_and_run(with_nan.view(), 1, true, 2, 3).unwrap_err();
    assert!(matches!(
        error,
        RandPcaError::InvalidMatrix(InvalidMatrixReason::NonFinite { row: 0, col: 1, .. })
    ));
    assert!(error.to_string().starts_with("invalid input matrix"));

    let empty = Array2::<f64>::zeros((0, 0));
    let error = configure_and_run(empty.view(), 1, true, 2, 3).unwrap_err();
    assert_eq!(
        error.invalid_matrix_reason(),
        Some(&InvalidMatrixReason::Empty { rows: 0, cols: 0 })
    );
}

#[test]
fn test_tall_and_wide_low_rank_recovery() {
    init_logging();
    for (m, n, raw, expected) in [
        (120, 40, true, SvdBranch::TallRaw),
        (40, 120, true, SvdBranch::WideRaw),
        (120, 40, false, SvdBranch::TallCentered),
        (40, 120, false, SvdBranch::WideCentered),
    ] {
        let a = low_rank_matrix(m, n, 4, 2);
        // Centering adds at most one to the rank.
        let k = if raw { 4 } else { 5 };
        let config = RandPcaConfig::default()
            .with_rank(k)
            .with_raw(raw)
            .with_block_size(k + 4)
            .with_seed(11);
        let pca = RandomizedPca::fit(a.view(), config).unwrap();
        assert_eq!(pca.branch(), expected);

        let relative_error = pca.factorization().relative_error(a.view()).unwrap();
        assert!(
            relative_error < 1e-8,
            "{:?}: relative error {}",
            expected,
            relative_error
        );
    }
}

#[test]
fn test_outputs_are_owned_copies() {
    let a = low_rank_matrix(50, 20, 3, 5);
    let pca = RandomizedPca::fit(a.view(), RandPcaConfig::default().with_rank(3).with_seed(3)).unwrap();

    let (mut u, _, _) = pca.get_outputs();
    u.fill(0.0);
    let (u_again, _, _) = pca.get_outputs();
    assert!(u_again.iter().any(|value| *value != 0.0));
    assert_eq!(&u_again, pca.u());
}

#[test]
fn test_config_serde_round_trip() {
    let config = RandPcaConfig::default()
        .with_rank(4)
        .with_block_size(9)
        .with_power_iterations(3)
        .with_seed(99)
        .with_reject_negative(false);
    let json = serde_json::to_string(&config).unwrap();
    let restored: RandPcaConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, config);
}

#[test]
fn test_factorization_serde_round_trip() {
    let a = low_rank_matrix(30, 12, 2, 8);
    let factors = RandomizedPca::fit(a.view(), RandPcaConfig::default().with_rank(2).with_seed(4))
        .unwrap()
        .into_factorization();
    let json = serde_json::to_string(&factors).unwrap();
    let restored: rand_pca::Factorization = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.u.dim(), factors.u.dim());
    assert_eq!(restored.centering_offset.is_some(), factors.centering_offset.is_some());
    let drift = (&restored.reconstruct() - &factors.reconstruct())
        .iter()
        .fold(0.0_f64, |acc, value| acc.max(value.abs()));
    assert!(drift < 1e-9);
}

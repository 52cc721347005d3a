use ndarray::Array2;
use rand_pca::{RandPcaConfig, RandomizedPca};

fn main() {
    env_logger::init();

    // 200 x 50 matrix with non-negative entries
    let data = Array2::from_shape_fn((200, 50), |(i, j)| {
        let (i, j) = (i as f64, j as f64);
        1.0 + (i * 0.1).sin().abs() * j + (i % 7.0) * (j * 0.3).cos().abs() + 0.5 * (i + j).sqrt()
    });

    let config = RandPcaConfig::default().with_rank(3).with_raw(true).with_seed(1);
    let pca = RandomizedPca::fit(data.view(), config).expect("Randomized PCA fit failed");

    println!("Branch: {:?}", pca.branch());
    println!("Effective parameters: {:?}", pca.params());
    println!("Singular values: {:?}", pca.s());
    println!(
        "Relative reconstruction error: {:.3e}",
        pca.factorization()
            .relative_error(data.view())
            .expect("factors match the input shape")
    );
}

use linfa::prelude::*;
use linfa_l0em::{L0Em, LambdaPath};
use linfa_l0em_datasets::generate::{sparse_coefficients, sparse_regression};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

fn main() {
    // 200 candidate features, only the first four influence the response
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let coefficients = sparse_coefficients(200, &[1., 2., 3., 4.]);
    let (train, valid) =
        sparse_regression(120, &coefficients, 0.1, &mut rng).split_with_ratio(0.75);

    let path = LambdaPath::params()
        .lambda_min(1e-4)
        .n_lambdas(50)
        .fit(&train)
        .unwrap();

    println!(
        "searched [{:.2e}, {:.2e}] with {} fits",
        path.lambda_min(),
        path.lambda_max(),
        path.n_evaluations()
    );
    for (n_selected, lambda) in path.sparsity_levels() {
        println!("{:>4} features from lambda {:.4e}", n_selected, lambda);
    }

    // refit the four feature model and validate it
    if let Some(lambda) = path.lambda_for_level(4) {
        let model = L0Em::params().lambda(lambda).fit(&train).unwrap();
        println!("selected:  {:?}", model.selected());

        let y_est = model.predict(&valid);
        let mse = (&y_est - valid.targets()).mapv(|v| v * v).mean().unwrap();
        println!("validation mse: {}", mse);
    }
}

//! Utility functions for randomly generating sparse regression problems

use linfa::Dataset;
use ndarray::{s, Array, Array1, Array2, ArrayBase, Data, Ix1};
use ndarray_rand::{rand::Rng, rand_distr::StandardNormal, RandomExt};

/// Coefficient vector of length `n_features` whose leading entries are `support` and all
/// remaining entries zero.
///
/// # Panics
///
/// If `support` has more entries than `n_features`.
pub fn sparse_coefficients(n_features: usize, support: &[f64]) -> Array1<f64> {
    assert!(
        support.len() <= n_features,
        "support of {} entries does not fit into {} features",
        support.len(),
        n_features
    );

    let mut coefficients = Array1::zeros(n_features);
    coefficients
        .slice_mut(s![..support.len()])
        .assign(&Array1::from(support.to_vec()));
    coefficients
}

/// Generate a linear regression problem with standard normal features
///
/// The records have shape `(n_samples, coefficients.len())` with i.i.d. standard normal
/// entries. The targets are `X coefficients + noise`, where the noise is normal with standard
/// deviation `noise_std`.
pub fn sparse_regression(
    n_samples: usize,
    coefficients: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    noise_std: f64,
    rng: &mut impl Rng,
) -> Dataset<f64, f64, Ix1> {
    let records: Array2<f64> =
        Array::random_using((n_samples, coefficients.len()), StandardNormal, rng);
    let noise: Array1<f64> = Array::random_using(n_samples, StandardNormal, rng);
    let targets = records.dot(coefficients) + noise * noise_std;

    Dataset::new(records, targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn coefficients_have_leading_support() {
        let coefficients = sparse_coefficients(5, &[1., -2.]);
        assert_eq!(coefficients, array![1., -2., 0., 0., 0.]);
    }

    #[test]
    #[should_panic]
    fn support_must_fit() {
        sparse_coefficients(1, &[1., 2.]);
    }

    #[test]
    fn noiseless_targets_are_linear() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let coefficients = sparse_coefficients(6, &[0.5, 1.5]);
        let dataset = sparse_regression(12, &coefficients, 0.0, &mut rng);

        assert_eq!(dataset.records().dim(), (12, 6));
        assert_abs_diff_eq!(
            &dataset.records().dot(&coefficients),
            dataset.targets(),
            epsilon = 1e-12
        );
    }
}

use linfa::dataset::{AsSingleTargets, DatasetBase};
use linfa::traits::{Fit, PredictInplace};
use linfa::Float;
use linfa_linalg::cholesky::CholeskyInplace;
use linfa_linalg::triangular::{SolveTriangularInplace, UPLO};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, CowArray, Data, Ix2};

use crate::error::{L0EmError, Result};
use crate::hyperparams::L0EmValidParams;
use crate::L0Em;

impl<F, D, T> Fit<ArrayBase<D, Ix2>, T, L0EmError> for L0EmValidParams<F>
where
    F: Float,
    D: Data<Elem = F>,
    T: AsSingleTargets<Elem = F>,
{
    type Object = L0Em<F>;

    /// Fit an L0EM model given a feature matrix `x` and a target variable `y`.
    ///
    /// The feature matrix `x` must have shape `(n_samples, n_features)`, more features than
    /// samples are fine.
    ///
    /// The target variable `y` must have shape `(n_samples)`
    ///
    /// Returns a fitted `L0Em` object which contains the sparse coefficients and can be used
    /// to `predict` values of the target variable for new feature values.
    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, T>) -> Result<Self::Object> {
        let x = dataset.records().view();
        let y = dataset.as_single_targets();
        check_shapes(x, y.view())?;

        if self.with_intercept() {
            let x_mean = x.mean_axis(Axis(0)).ok_or(L0EmError::NotEnoughSamples)?;
            let y_mean = y.mean().ok_or(L0EmError::NotEnoughSamples)?;
            let x_centered = &x - &x_mean.view().insert_axis(Axis(0));
            let y_centered = &y - y_mean;

            let fit = l0em(x_centered.view(), y_centered.view(), self)?;
            let intercept = y_mean - x_mean.dot(&fit.hyperplane);
            Ok(fit.into_model(self.lambda(), intercept))
        } else {
            let fit = l0em(x, y.view(), self)?;
            Ok(fit.into_model(self.lambda(), F::zero()))
        }
    }
}

impl<F: Float, D: Data<Elem = F>> PredictInplace<ArrayBase<D, Ix2>, Array1<F>> for L0Em<F> {
    /// Given an input matrix `X`, with shape `(n_samples, n_features)`,
    /// `predict` returns the target variable according to the sparse
    /// coefficients learned from the training data.
    fn predict_inplace<'a>(&'a self, x: &'a ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );
        assert_eq!(
            x.ncols(),
            self.hyperplane.len(),
            "Number of data features must match the number of features the model was trained with."
        );

        *y = x.dot(&self.hyperplane) + self.intercept;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

/// View the fitted coefficients and convergence diagnostics of an L0EM model
impl<F: Float> L0Em<F> {
    /// Get the fitted coefficients, every entry is either zero or at least `epsilon` in magnitude
    pub fn hyperplane(&self) -> &Array1<F> {
        &self.hyperplane
    }

    /// Get the fitted intercept, 0. if no intercept was fitted
    pub fn intercept(&self) -> F {
        self.intercept
    }

    /// Get the regularization strength the model was fitted with
    pub fn lambda(&self) -> F {
        self.lambda
    }

    /// Get the number of EM iterations performed after the ridge initialization
    pub fn n_steps(&self) -> u32 {
        self.n_steps
    }

    /// Whether the change of the coefficients fell below the threshold before the iteration
    /// limit was reached
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Number of selected (non-zero) coefficients
    pub fn n_selected(&self) -> usize {
        count_nonzero(self.hyperplane.view())
    }

    /// Indices of the selected (non-zero) coefficients in ascending order
    pub fn selected(&self) -> Vec<usize> {
        self.hyperplane
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != F::zero())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Result of a single run of the EM iterations
#[derive(Debug, Clone)]
pub(crate) struct L0EmFit<F> {
    pub(crate) hyperplane: Array1<F>,
    pub(crate) n_steps: u32,
    pub(crate) converged: bool,
}

impl<F: Float> L0EmFit<F> {
    fn into_model(self, lambda: F, intercept: F) -> L0Em<F> {
        L0Em {
            hyperplane: self.hyperplane,
            intercept,
            lambda,
            n_steps: self.n_steps,
            converged: self.converged,
        }
    }
}

pub(crate) fn check_shapes<F: Float>(x: ArrayView2<F>, y: ArrayView1<F>) -> Result<()> {
    let (n_samples, n_features) = x.dim();
    if n_samples == 0 {
        Err(L0EmError::NotEnoughSamples)
    } else if n_features == 0 {
        Err(L0EmError::NotEnoughFeatures)
    } else if y.len() != n_samples {
        Err(L0EmError::MismatchedShapes {
            samples: n_samples,
            targets: y.len(),
        })
    } else {
        Ok(())
    }
}

pub(crate) fn count_nonzero<F: Float>(theta: ArrayView1<F>) -> usize {
    theta.iter().filter(|v| **v != F::zero()).count()
}

/// Generalized EM for L0-penalized least squares
///
/// The initial estimate is the ridge solution `X^T (X X^T + lambda I)^-1 y`. Each iteration then
/// reweights the features with the squares of the current estimate `eta` and solves
/// ```ignore
/// theta = W X^T (X W X^T + lambda I)^-1 y,    W = diag(eta^2)
/// ```
/// until the Euclidean change of `theta` drops below `delta_threshold`. Coefficients smaller
/// than `epsilon` in magnitude are zeroed at the end, whether or not the iteration converged.
///
/// References
/// * ["The L0-regularized EM algorithm", Liu and Li](https://arxiv.org/abs/1505.03463)
pub(crate) fn l0em<F: Float>(
    x: ArrayView2<F>,
    y: ArrayView1<F>,
    params: &L0EmValidParams<F>,
) -> Result<L0EmFit<F>> {
    let lambda = params.lambda();
    let n_features = x.ncols();

    let mut theta = reweighted_ridge(x, y, Array1::ones(n_features).view(), lambda)?;
    if params.nonnegative() {
        clamp_negative(&mut theta);
    }

    let mut n_steps = 0;
    let mut converged = false;
    while n_steps < params.max_iterations() {
        // with this parametrization the expectation step is the identity on theta
        let eta = theta;
        let weights = eta.mapv(|v| v * v);

        theta = reweighted_ridge(x, y, weights.view(), lambda)?;
        if params.nonnegative() {
            clamp_negative(&mut theta);
        }
        n_steps += 1;

        let delta = l2_dist(theta.view(), eta.view());
        log::trace!("l0em step {} at lambda {}: delta {}", n_steps, lambda, delta);
        if delta < params.delta_threshold() {
            converged = true;
            break;
        }
    }

    let epsilon = params.epsilon();
    theta.mapv_inplace(|v| if num_traits::Float::abs(v) < epsilon { F::zero() } else { v });

    if converged {
        log::debug!(
            "l0em converged after {} steps at lambda {}, {} features selected",
            n_steps,
            lambda,
            count_nonzero(theta.view())
        );
    } else {
        log::debug!(
            "l0em stopped after {} steps at lambda {} without converging, {} features selected",
            n_steps,
            lambda,
            count_nonzero(theta.view())
        );
    }

    Ok(L0EmFit {
        hyperplane: theta,
        n_steps,
        converged,
    })
}

/// Solve the dual form of the weighted ridge problem
/// ```ignore
/// theta = W X^T (X W X^T + lambda I)^-1 y,    W = diag(weights)
/// ```
///
/// The system is `n_samples x n_samples`, features with zero weight do not contribute and are
/// left out of the gram product.
pub(crate) fn reweighted_ridge<F: Float>(
    x: ArrayView2<F>,
    y: ArrayView1<F>,
    weights: ArrayView1<F>,
    lambda: F,
) -> Result<Array1<F>> {
    let n_features = x.ncols();
    let active = weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w != F::zero())
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    let mut theta = Array1::zeros(n_features);
    if active.is_empty() {
        return Ok(theta);
    }

    let (x_active, w_active): (CowArray<F, Ix2>, CowArray<F, _>) = if active.len() == n_features
    {
        (x.into(), weights.into())
    } else {
        (
            x.select(Axis(1), &active).into(),
            weights.select(Axis(0), &active).into(),
        )
    };

    let x_weighted = &x_active * &w_active.view().insert_axis(Axis(0));
    let mut gram = x_weighted.dot(&x_active.t());
    gram.diag_mut().mapv_inplace(|v| v + lambda);

    let dual = solve_spd(gram, y.to_owned(), lambda)?;
    let theta_active = x_weighted.t().dot(&dual);

    if theta_active.iter().any(|v| !v.is_finite()) {
        return Err(ill_conditioned(lambda));
    }
    for (&i, &v) in active.iter().zip(theta_active.iter()) {
        theta[i] = v;
    }

    Ok(theta)
}

/// Solve `a z = b` for a symmetric positive definite `a` with a Cholesky factorization
///
/// Fails if the factorization breaks down or the squared pivots span more than the machine
/// precision, in which case the solution would be dominated by rounding errors.
fn solve_spd<F: Float>(mut a: Array2<F>, b: Array1<F>, lambda: F) -> Result<Array1<F>> {
    a.cholesky_inplace().map_err(|_| ill_conditioned(lambda))?;

    let pivots = a.diag().mapv(|v| v * v);
    let largest = pivots.fold(F::zero(), |m, &v| m.max(v));
    let smallest = pivots.fold(F::infinity(), |m, &v| m.min(v));
    if !(smallest > largest * F::epsilon()) {
        return Err(ill_conditioned(lambda));
    }

    let mut b = b.insert_axis(Axis(1));
    a.solve_triangular_inplace(&mut b, UPLO::Lower)
        .map_err(|_| ill_conditioned(lambda))?;
    a.t()
        .solve_triangular_inplace(&mut b, UPLO::Upper)
        .map_err(|_| ill_conditioned(lambda))?;

    Ok(b.remove_axis(Axis(1)))
}

fn ill_conditioned<F: Float>(lambda: F) -> L0EmError {
    L0EmError::IllConditioned {
        lambda: lambda.to_f32().unwrap_or(f32::NAN),
    }
}

fn clamp_negative<F: Float>(theta: &mut Array1<F>) {
    theta.mapv_inplace(|v| v.max(F::zero()));
}

fn l2_dist<F: Float>(a: ArrayView1<F>, b: ArrayView1<F>) -> F {
    a.iter()
        .zip(b.iter())
        .map(|(&a, &b)| (a - b) * (a - b))
        .fold(F::zero(), |acc, v| acc + v)
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::{l0em, reweighted_ridge};
    use crate::{L0Em, L0EmError, L0EmParams, L0EmValidParams};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, s, Array, Array1, Array2};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::StandardNormal;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    use linfa::{
        traits::{Fit, Predict},
        Dataset, ParamGuard,
    };

    #[test]
    fn autotraits() {
        fn has_autotraits<T: Send + Sync + Sized + Unpin>() {}
        has_autotraits::<L0Em<f64>>();
        has_autotraits::<L0EmParams<f64>>();
        has_autotraits::<L0EmValidParams<f64>>();
        has_autotraits::<L0EmError>();
    }

    fn random_problem(
        n_samples: usize,
        n_features: usize,
        seed: u64,
    ) -> (Array2<f64>, Array1<f64>, Array1<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let x = Array::random_using((n_samples, n_features), StandardNormal, &mut rng);
        let mut w = Array1::zeros(n_features);
        w.slice_mut(s![..3]).assign(&array![2.0, -3.0, 1.5]);
        let noise: Array1<f64> =
            Array::random_using(n_samples, StandardNormal, &mut rng) * 0.05;
        let y = x.dot(&w) + noise;
        (x, y, w)
    }

    #[test]
    fn ridge_start_matches_primal_solution() {
        // with unit weights and more samples than features the dual and primal forms agree
        let x = array![[1.0, 2.0], [3.0, -1.0], [0.5, 0.5], [-2.0, 1.0]];
        let y = array![1.0, 2.0, 0.5, -1.0];
        let lambda = 0.7;

        let dual = reweighted_ridge(x.view(), y.view(), Array1::ones(2).view(), lambda).unwrap();

        // (X^T X + lambda I) theta = X^T y
        let mut gram = x.t().dot(&x);
        gram[[0, 0]] += lambda;
        gram[[1, 1]] += lambda;
        let residual = gram.dot(&dual) - x.t().dot(&y);
        assert_abs_diff_eq!(residual, Array1::<f64>::zeros(2), epsilon = 1e-10);
    }

    #[test]
    fn zero_weights_are_skipped() {
        let (x, y, _) = random_problem(10, 20, 3);
        let mut weights = Array1::ones(20);
        weights.slice_mut(s![5..]).fill(0.0);

        let theta = reweighted_ridge(x.view(), y.view(), weights.view(), 0.5).unwrap();
        let reduced = reweighted_ridge(
            x.slice(s![.., ..5]),
            y.view(),
            Array1::ones(5).view(),
            0.5,
        )
        .unwrap();

        assert_abs_diff_eq!(theta.slice(s![..5]), reduced, epsilon = 1e-10);
        assert!(theta.slice(s![5..]).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn all_zero_weights_give_zero_coefficients() {
        let (x, y, _) = random_problem(5, 8, 4);
        let theta = reweighted_ridge(x.view(), y.view(), Array1::zeros(8).view(), 0.0).unwrap();
        assert_eq!(theta, Array1::<f64>::zeros(8));
    }

    #[test]
    fn singular_system_is_reported() {
        // two identical rows make X X^T singular without any ridge term
        let x = array![[1.0, 2.0, 3.0], [1.0, 2.0, 3.0]];
        let y = array![1.0, 1.0];
        let res = reweighted_ridge(x.view(), y.view(), Array1::ones(3).view(), 0.0);
        assert!(matches!(res, Err(L0EmError::IllConditioned { .. })));

        let res = L0Em::params().lambda(0.0).fit(&Dataset::new(x, y));
        assert!(matches!(res, Err(L0EmError::IllConditioned { .. })));
    }

    #[test]
    fn coefficients_are_zero_or_above_epsilon() {
        let (x, y, _) = random_problem(30, 60, 5);
        for &lambda in &[1e-3, 0.1, 1.0, 10.0] {
            let params = L0EmParams::new().lambda(lambda).epsilon(1e-2).check().unwrap();
            let fit = l0em(x.view(), y.view(), &params).unwrap();
            assert_eq!(fit.hyperplane.len(), 60);
            assert!(fit
                .hyperplane
                .iter()
                .all(|v| *v == 0.0 || v.abs() >= 1e-2));
        }
    }

    #[test]
    fn cleanup_applies_without_convergence() {
        let (x, y, _) = random_problem(20, 40, 6);
        let model = L0Em::params()
            .lambda(1.0)
            .max_iterations(1)
            .delta_threshold(1e-12)
            .epsilon(0.5)
            .fit(&Dataset::new(x, y))
            .unwrap();

        assert!(!model.converged());
        assert_eq!(model.n_steps(), 1);
        assert!(model
            .hyperplane()
            .iter()
            .all(|v| *v == 0.0 || v.abs() >= 0.5));
    }

    #[test]
    fn zero_iterations_return_ridge_start() {
        let (x, y, _) = random_problem(10, 15, 7);
        let model = L0Em::params()
            .lambda(0.3)
            .max_iterations(0)
            .epsilon(0.0)
            .fit(&Dataset::new(x.clone(), y.clone()))
            .unwrap();
        let ridge = reweighted_ridge(x.view(), y.view(), Array1::ones(15).view(), 0.3).unwrap();

        assert_eq!(model.n_steps(), 0);
        assert_abs_diff_eq!(model.hyperplane(), &ridge, epsilon = 1e-12);
    }

    #[test]
    fn recovers_sparse_support() {
        let (x, y, w) = random_problem(40, 80, 8);
        let model = L0Em::params()
            .lambda(1.0)
            .fit(&Dataset::new(x, y))
            .unwrap();

        assert!(model.converged());
        let selected = model.selected();
        assert!(selected.starts_with(&[0, 1, 2]), "selected {:?}", selected);
        assert!(selected.len() <= 4, "selected {:?}", selected);
        assert_abs_diff_eq!(
            model.hyperplane().slice(s![..3]),
            w.slice(s![..3]),
            epsilon = 0.1
        );
    }

    #[test]
    fn deterministic() {
        let (x, y, _) = random_problem(25, 50, 9);
        let params = L0EmParams::new().lambda(0.5).check().unwrap();
        let a = l0em(x.view(), y.view(), &params).unwrap();
        let b = l0em(x.view(), y.view(), &params).unwrap();
        assert_eq!(a.hyperplane, b.hyperplane);
        assert_eq!(a.n_steps, b.n_steps);
    }

    #[test]
    fn nonnegative_coefficients() {
        let (x, y, _) = random_problem(30, 50, 10);
        let model = L0Em::params()
            .lambda(0.5)
            .nonnegative(true)
            .fit(&Dataset::new(x, y))
            .unwrap();

        assert!(model.hyperplane().iter().all(|v| *v >= 0.0));
        // the negative true coefficient cannot be selected
        assert_eq!(model.hyperplane()[1], 0.0);
    }

    #[test]
    fn intercept_is_recovered() {
        let (x, y, _) = random_problem(40, 60, 11);
        let y = y + 5.0;
        let dataset = Dataset::new(x, y);

        let model = L0Em::params()
            .lambda(1.0)
            .with_intercept(true)
            .fit(&dataset)
            .unwrap();

        assert_abs_diff_eq!(model.intercept(), 5.0, epsilon = 0.1);
        assert!(model.selected().starts_with(&[0, 1, 2]));

        let pred = model.predict(dataset.records());
        let mse = (&pred - dataset.targets()).mapv(|v| v * v).mean().unwrap();
        assert!(mse < 0.05, "mse {}", mse);
    }

    #[test]
    fn degenerate_inputs() {
        let res = L0Em::params().fit(&Dataset::new(
            Array2::<f64>::zeros((0, 3)),
            Array1::<f64>::zeros(0),
        ));
        assert!(matches!(res, Err(L0EmError::NotEnoughSamples)));

        let res = L0Em::params().fit(&Dataset::new(
            Array2::<f64>::zeros((3, 0)),
            Array1::<f64>::zeros(3),
        ));
        assert!(matches!(res, Err(L0EmError::NotEnoughFeatures)));
    }

    #[test]
    fn invalid_params_are_forwarded() {
        let (x, y, _) = random_problem(5, 5, 12);
        let res = L0Em::params().lambda(-1.0).fit(&Dataset::new(x, y));
        assert!(matches!(res, Err(L0EmError::InvalidLambda(_))));
    }
}

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use linfa::{Float, ParamGuard};

use crate::error::{L0EmError, Result};

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
/// A verified hyper-parameter set ready for the estimation of an L0EM regression model
///
/// See [`L0EmParams`](crate::L0EmParams) for more information.
pub struct L0EmValidParams<F> {
    pub(crate) lambda: F,
    pub(crate) epsilon: F,
    pub(crate) delta_threshold: F,
    pub(crate) max_iterations: u32,
    pub(crate) nonnegative: bool,
    pub(crate) with_intercept: bool,
}

impl<F: Float> L0EmValidParams<F> {
    pub fn lambda(&self) -> F {
        self.lambda
    }

    pub fn epsilon(&self) -> F {
        self.epsilon
    }

    pub fn delta_threshold(&self) -> F {
        self.delta_threshold
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn nonnegative(&self) -> bool {
        self.nonnegative
    }

    pub fn with_intercept(&self) -> bool {
        self.with_intercept
    }

    /// Copy of this parameter set with a different regularization strength.
    ///
    /// The copy is not re-verified, so `lambda` has to be non-negative and finite.
    pub(crate) fn with_lambda(&self, lambda: F) -> Self {
        Self {
            lambda,
            ..self.clone()
        }
    }
}

impl<F: Float> Default for L0EmValidParams<F> {
    fn default() -> Self {
        L0EmParams::new().0
    }
}

/// A hyper-parameter set for L0EM
///
/// Approximately minimizes the L0-penalized least squares objective
/// ```ignore
/// ||y - X theta||^2_2 + lambda * ||theta||_0
/// ```
/// with the generalized EM relaxation, which amounts to a sequence of reweighted ridge
/// regressions solved in their dual (`n_samples x n_samples`) form.
///
/// The parameter set can be verified into a
/// [`L0EmValidParams`](crate::L0EmValidParams) by calling
/// [ParamGuard::check](Self::check). It is also possible to directly fit a model with
/// [Fit::fit](linfa::traits::Fit::fit) which implicitely verifies the parameter set prior to the
/// model estimation and forwards any error.
///
/// # Parameters
/// | Name | Default | Purpose | Range |
/// | :--- | :--- | :---| :--- |
/// | [lambda](Self::lambda) | `1.0` | Penalty per selected coefficient | `[0, inf)` |
/// | [epsilon](Self::epsilon) | `1e-4` | Coefficients with smaller magnitude are set to zero | `[0, inf)` |
/// | [delta_threshold](Self::delta_threshold) | `1e-3` | Euclidean change of the coefficients below which the iteration stops | `(0, inf)` |
/// | [max_iterations](Self::max_iterations) | `100` | Maximum number of EM iterations | `[0, inf)` |
/// | [nonnegative](Self::nonnegative) | `false` | Clamp coefficients to be non-negative | `false`, `true` |
/// | [with_intercept](Self::with_intercept) | `false` | Center the data and fit an intercept | `false`, `true` |
///
/// # Errors
///
/// Returns [`InvalidLambda`](L0EmError::InvalidLambda) if lambda is negative or not finite.
///
/// Returns [`InvalidEpsilon`](L0EmError::InvalidEpsilon) if epsilon is negative or not finite.
///
/// Returns [`InvalidDeltaThreshold`](L0EmError::InvalidDeltaThreshold) if the convergence
/// threshold is not positive.
///
/// # Example
///
/// ```rust
/// use linfa_l0em::{L0EmParams, L0EmError};
/// use linfa::prelude::*;
/// use ndarray::array;
///
/// let ds = Dataset::new(array![[1.0, 0.0, 0.5], [0.0, 1.0, 0.5]], array![3.0, 2.0]);
///
/// // create a new parameter set with lambda equals `1e-2`
/// let unchecked_params = L0EmParams::new()
///     .lambda(1e-2);
///
/// // fit model with unchecked parameter set
/// let model = unchecked_params.fit(&ds)?;
///
/// // transform into a verified parameter set
/// let checked_params = unchecked_params.check()?;
///
/// // Regenerate model with the verified parameters, this only returns
/// // errors originating from the fitting process
/// let model = checked_params.fit(&ds)?;
/// # Ok::<(), L0EmError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct L0EmParams<F>(pub(crate) L0EmValidParams<F>);

impl<F: Float> Default for L0EmParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Configure and fit an L0EM model
impl<F: Float> L0EmParams<F> {
    /// Create default L0EM hyper parameters
    ///
    /// No intercept is fitted by default, call `.with_intercept(true)` to center the data
    /// first.
    pub fn new() -> L0EmParams<F> {
        Self(L0EmValidParams {
            lambda: F::one(),
            epsilon: F::cast(1e-4),
            delta_threshold: F::cast(1e-3),
            max_iterations: 100,
            nonnegative: false,
            with_intercept: false,
        })
    }

    /// Set the regularization strength, the price paid for every non-zero coefficient.
    ///
    /// Defaults to `1.0` if not set
    pub fn lambda(mut self, lambda: F) -> Self {
        self.0.lambda = lambda;
        self
    }

    /// Set the smallest coefficient magnitude which survives the final cleanup step.
    ///
    /// Defaults to `1e-4` if not set
    pub fn epsilon(mut self, epsilon: F) -> Self {
        self.0.epsilon = epsilon;
        self
    }

    /// Set the convergence threshold on the Euclidean norm of the change of the coefficients
    /// between two iterations.
    ///
    /// Defaults to `1e-3` if not set
    pub fn delta_threshold(mut self, delta_threshold: F) -> Self {
        self.0.delta_threshold = delta_threshold;
        self
    }

    /// Set the maximum number of EM iterations after the ridge initialization.
    ///
    /// Defaults to `100` if not set
    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.0.max_iterations = max_iterations;
        self
    }

    /// Restrict the coefficients to be non-negative.
    ///
    /// Defaults to `false` if not set
    pub fn nonnegative(mut self, nonnegative: bool) -> Self {
        self.0.nonnegative = nonnegative;
        self
    }

    /// Configure the model to fit an intercept.
    ///
    /// Defaults to `false` if not set
    pub fn with_intercept(mut self, with_intercept: bool) -> Self {
        self.0.with_intercept = with_intercept;
        self
    }
}

impl<F: Float> ParamGuard for L0EmParams<F> {
    type Checked = L0EmValidParams<F>;
    type Error = L0EmError;

    /// Validate the hyper parameters
    fn check_ref(&self) -> Result<&Self::Checked> {
        if !self.0.lambda.is_finite() || self.0.lambda < F::zero() {
            Err(L0EmError::InvalidLambda(
                self.0.lambda.to_f32().unwrap_or(f32::NAN),
            ))
        } else if !self.0.epsilon.is_finite() || self.0.epsilon < F::zero() {
            Err(L0EmError::InvalidEpsilon(
                self.0.epsilon.to_f32().unwrap_or(f32::NAN),
            ))
        } else if !self.0.delta_threshold.is_finite() || self.0.delta_threshold <= F::zero() {
            Err(L0EmError::InvalidDeltaThreshold(
                self.0.delta_threshold.to_f32().unwrap_or(f32::NAN),
            ))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
/// A verified hyper-parameter set ready for a lambda path search
///
/// See [`L0EmPathParams`](crate::L0EmPathParams) for more information.
pub struct L0EmPathValidParams<F> {
    pub(crate) lambda_min: F,
    pub(crate) n_lambdas: usize,
    pub(crate) step_divisor: F,
    pub(crate) log_space: bool,
    pub(crate) solver: L0EmValidParams<F>,
}

impl<F: Float> L0EmPathValidParams<F> {
    pub fn lambda_min(&self) -> F {
        self.lambda_min
    }

    pub fn n_lambdas(&self) -> usize {
        self.n_lambdas
    }

    pub fn step_divisor(&self) -> F {
        self.step_divisor
    }

    pub fn log_space(&self) -> bool {
        self.log_space
    }

    pub fn solver(&self) -> &L0EmValidParams<F> {
        &self.solver
    }
}

/// A hyper-parameter set for the adaptive lambda path search
///
/// The search bisects `[lambda_min, lambda_max]`, where `lambda_max` comes from
/// [`max_lambda`](crate::max_lambda), and only subdivides intervals across which more than one
/// feature enters or leaves the model. The number of regressor calls is bounded by
/// `n_lambdas` (plus the at most three probes of the last interval examined).
///
/// # Parameters
/// | Name | Default | Purpose | Range |
/// | :--- | :--- | :---| :--- |
/// | [lambda_min](Self::lambda_min) | `1e-7` | Lower end of the searched range, raise it for `f32` | `[0, inf)`, `(0, inf)` in log space |
/// | [n_lambdas](Self::n_lambdas) | `100` | Budget of regressor calls | `[2, inf)` |
/// | [step_divisor](Self::step_divisor) | `10.0` | Divides the nominal log step into the smallest interval width | `(0, inf)` |
/// | [log_space](Self::log_space) | `true` | Bisect geometrically instead of arithmetically | `false`, `true` |
/// | [solver](Self::solver) | `L0EmParams::new()` | Solver configuration, its lambda is ignored | |
///
/// # Example
///
/// ```rust
/// use linfa_l0em::{LambdaPath, L0EmError};
/// use linfa::prelude::*;
/// use ndarray::array;
///
/// let ds = Dataset::new(
///     array![[1.0, 0.0, 0.2], [0.0, 1.0, 0.3], [0.5, 0.5, 1.0]],
///     array![3.0, 2.0, 1.0],
/// );
///
/// let path = LambdaPath::params()
///     .lambda_min(1e-3)
///     .n_lambdas(20)
///     .fit(&ds)?;
///
/// for (n_selected, lambda) in path.sparsity_levels() {
///     println!("{} features first seen at lambda {}", n_selected, lambda);
/// }
/// # Ok::<(), L0EmError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct L0EmPathParams<F>(pub(crate) L0EmPathValidParams<F>);

impl<F: Float> Default for L0EmPathParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> L0EmPathParams<F> {
    /// Create default path search hyper parameters
    pub fn new() -> L0EmPathParams<F> {
        Self(L0EmPathValidParams {
            lambda_min: F::cast(1e-7),
            n_lambdas: 100,
            step_divisor: F::cast(10.0),
            log_space: true,
            solver: L0EmValidParams::default(),
        })
    }

    /// Set the lower end of the searched lambda range.
    ///
    /// The ridge system solved at `lambda_min` has `lambda_min` as its smallest eigenvalue
    /// bound, so the default of `1e-7` is meant for `f64`. With `f32` the first fit usually
    /// fails with [`IllConditioned`](L0EmError::IllConditioned), pick something like `1e-3`
    /// relative to the scale of `X X^T` instead.
    ///
    /// Defaults to `1e-7` if not set
    pub fn lambda_min(mut self, lambda_min: F) -> Self {
        self.0.lambda_min = lambda_min;
        self
    }

    /// Set the budget of regressor calls, also the number of points of the nominal log grid.
    ///
    /// Defaults to `100` if not set
    pub fn n_lambdas(mut self, n_lambdas: usize) -> Self {
        self.0.n_lambdas = n_lambdas;
        self
    }

    /// Set the divisor applied to the nominal log step to obtain the smallest interval width
    /// which is still subdivided.
    ///
    /// Defaults to `10.0` if not set
    pub fn step_divisor(mut self, step_divisor: F) -> Self {
        self.0.step_divisor = step_divisor;
        self
    }

    /// Bisect intervals at their geometric instead of their arithmetic midpoint.
    ///
    /// Defaults to `true` if not set
    pub fn log_space(mut self, log_space: bool) -> Self {
        self.0.log_space = log_space;
        self
    }

    /// Set the solver configuration used at every probed lambda.
    ///
    /// The lambda of the given parameter set is ignored.
    pub fn solver(mut self, solver: L0EmValidParams<F>) -> Self {
        self.0.solver = solver;
        self
    }
}

impl<F: Float> ParamGuard for L0EmPathParams<F> {
    type Checked = L0EmPathValidParams<F>;
    type Error = L0EmError;

    /// Validate the hyper parameters
    fn check_ref(&self) -> Result<&Self::Checked> {
        let lambda_min = self.0.lambda_min;
        if !lambda_min.is_finite()
            || lambda_min < F::zero()
            || (self.0.log_space && lambda_min <= F::zero())
        {
            Err(L0EmError::InvalidLambdaMin(
                lambda_min.to_f32().unwrap_or(f32::NAN),
            ))
        } else if self.0.n_lambdas < 2 {
            Err(L0EmError::InvalidNLambdas(self.0.n_lambdas))
        } else if !self.0.step_divisor.is_finite() || self.0.step_divisor <= F::zero() {
            Err(L0EmError::InvalidStepDivisor(
                self.0.step_divisor.to_f32().unwrap_or(f32::NAN),
            ))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        let params = L0EmParams::<f64>::new().check().unwrap();
        assert_eq!(params.max_iterations(), 100);
        assert!(!params.nonnegative());
        assert!(!params.with_intercept());

        let path = L0EmPathParams::<f64>::new().check().unwrap();
        assert_eq!(path.n_lambdas(), 100);
        assert!(path.log_space());
        assert_eq!(path.solver(), &L0EmValidParams::default());
    }

    #[test]
    fn invalid_solver_params() {
        let res = L0EmParams::<f64>::new().lambda(-1.0).check();
        assert!(matches!(res, Err(L0EmError::InvalidLambda(_))));

        let res = L0EmParams::<f64>::new().lambda(f64::INFINITY).check();
        assert!(matches!(res, Err(L0EmError::InvalidLambda(_))));

        let res = L0EmParams::<f64>::new().epsilon(-1e-3).check();
        assert!(matches!(res, Err(L0EmError::InvalidEpsilon(_))));

        let res = L0EmParams::<f64>::new().delta_threshold(0.0).check();
        assert!(matches!(res, Err(L0EmError::InvalidDeltaThreshold(_))));

        // lambda = 0 degenerates to the minimum norm least squares start and is legal
        assert!(L0EmParams::<f64>::new().lambda(0.0).check().is_ok());
    }

    #[test]
    fn invalid_path_params() {
        let res = L0EmPathParams::<f64>::new().lambda_min(0.0).check();
        assert!(matches!(res, Err(L0EmError::InvalidLambdaMin(_))));

        // zero is fine once we bisect linearly
        let res = L0EmPathParams::<f64>::new()
            .lambda_min(0.0)
            .log_space(false)
            .check();
        assert!(res.is_ok());

        let res = L0EmPathParams::<f64>::new().n_lambdas(1).check();
        assert!(matches!(res, Err(L0EmError::InvalidNLambdas(1))));

        let res = L0EmPathParams::<f64>::new().step_divisor(0.0).check();
        assert!(matches!(res, Err(L0EmError::InvalidStepDivisor(_))));
    }
}

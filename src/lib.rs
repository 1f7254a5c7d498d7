//! # L0-penalized regression via expectation-maximization a.k.a. L0EM
//!
//! `linfa-l0em` fits sparse linear models by approximately minimizing
//! ```ignore
//! ||y - X theta||^2_2 + lambda * ||theta||_0
//! ```
//! The non-convex penalty is handled with a generalized EM scheme: starting from a ridge
//! estimate, every iteration solves a ridge regression reweighted by the squares of the
//! current coefficients. Coefficients which are not supported by the data shrink towards zero
//! and are dropped once they fall below a small threshold. Each iteration solves an
//! `n_samples x n_samples` system, so problems with many more features than samples are cheap.
//!
//! Choosing `lambda` picks the sparsity level. Instead of scanning a fixed grid,
//! [`LambdaPath`] bisects the range `[lambda_min, lambda_max]` adaptively and records, for
//! every number of selected features it encounters, the first lambda producing it. The upper
//! end of the range is estimated with [`max_lambda`]. Any estimator implementing
//! [`SparseRegressor`] can drive the search.
//!
//! ## Example
//!
//! ```rust
//! use linfa::prelude::*;
//! use linfa_l0em::{L0Em, LambdaPath, L0EmError};
//! use ndarray::array;
//!
//! let ds = Dataset::new(
//!     array![[1.0, 0.1, 0.0], [0.0, 1.0, 0.2], [0.3, 0.0, 1.0], [1.0, 1.0, 0.0]],
//!     array![2.0, 0.1, 0.6, 2.1],
//! );
//!
//! let model = L0Em::params().lambda(0.1).fit(&ds)?;
//! println!("selected features {:?}", model.selected());
//!
//! let path = LambdaPath::params().lambda_min(1e-4).n_lambdas(30).fit(&ds)?;
//! if let Some(theta) = path.coefficients_for_level(1) {
//!     println!("best single feature model {}", theta);
//! }
//! # Ok::<(), L0EmError>(())
//! ```
//!
//! ## References
//!
//! * ["The L0-regularized EM algorithm", Liu and Li](https://arxiv.org/abs/1505.03463)

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use linfa::Float;
use ndarray::Array1;

pub use error::{L0EmError, Result};
pub use hyperparams::{L0EmParams, L0EmPathParams, L0EmPathValidParams, L0EmValidParams};
pub use max_lambda::max_lambda;
pub use path::{CoefficientCache, LambdaPath, SparseRegressor, SparsityIndex};

mod algorithm;
mod error;
mod hyperparams;
mod max_lambda;
mod path;

/// A fitted L0EM model
///
/// Holds the sparse coefficients, the intercept and the diagnostics of the EM iterations.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone)]
pub struct L0Em<F> {
    hyperplane: Array1<F>,
    intercept: F,
    lambda: F,
    n_steps: u32,
    converged: bool,
}

impl<F: Float> L0Em<F> {
    /// Create default L0EM hyper parameters
    ///
    /// By default no intercept is fitted, call `.with_intercept(true)` before calling `.fit()`
    /// to center the data first.
    pub fn params() -> L0EmParams<F> {
        L0EmParams::new()
    }
}

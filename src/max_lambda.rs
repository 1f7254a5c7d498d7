//! Heuristic upper end of the lambda range
use linfa::Float;
use ndarray::{ArrayBase, Axis, Data, Ix1, Ix2};

use crate::algorithm::check_shapes;
use crate::error::Result;

/// Estimate the regularization strength above which no feature is selected
///
/// For every feature column `x_j` a univariate argument gives the candidate
/// ```ignore
/// lambda_j = (x_j^T y)^2 / (4 * x_j^T x_j)
/// ```
/// above which `x_j` alone would no longer enter the model. The estimate is the largest
/// candidate over all columns. Columns which are identically zero have no candidate.
///
/// This is an approximation, not a bound: correlated features can keep variables selected
/// above the estimate, or drop all of them well below it. The estimate is zero when `y` is
/// orthogonal to every column.
///
/// # Errors
///
/// Returns [`NotEnoughSamples`](crate::L0EmError::NotEnoughSamples) or
/// [`NotEnoughFeatures`](crate::L0EmError::NotEnoughFeatures) for empty input and
/// [`MismatchedShapes`](crate::L0EmError::MismatchedShapes) if `y` does not have one entry per
/// row of `x`.
///
/// # Example
///
/// ```rust
/// use linfa_l0em::max_lambda;
/// use ndarray::array;
///
/// let x = array![[1.0, 0.0], [0.0, 2.0]];
/// let y = array![2.0, 1.0];
///
/// // column 0: 2^2 / 4 = 1, column 1: 2^2 / 16 = 0.25
/// assert_eq!(max_lambda(&x, &y)?, 1.0);
/// # Ok::<(), linfa_l0em::L0EmError>(())
/// ```
pub fn max_lambda<F, D1, D2>(x: &ArrayBase<D1, Ix2>, y: &ArrayBase<D2, Ix1>) -> Result<F>
where
    F: Float,
    D1: Data<Elem = F>,
    D2: Data<Elem = F>,
{
    check_shapes(x.view(), y.view())?;

    let four = F::cast(4.0);
    let covariances = x.t().dot(y);
    let norms = x.map_axis(Axis(0), |col| col.dot(&col));

    let lambda_max = covariances
        .iter()
        .zip(norms.iter())
        .filter(|(_, norm)| **norm > F::zero())
        .fold(F::zero(), |acc, (&cov, &norm)| acc.max(cov * cov / (four * norm)));

    Ok(lambda_max)
}

//! Errors raised while fitting an L0EM model or searching a lambda path
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use thiserror::Error;

/// Simplified `Result` using [`L0EmError`](crate::L0EmError) as error type
pub type Result<T> = std::result::Result<T, L0EmError>;

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Error, Debug, Clone)]
pub enum L0EmError {
    #[error("lambda should be non-negative and finite, but is {0}")]
    InvalidLambda(f32),
    #[error("epsilon should be non-negative and finite, but is {0}")]
    InvalidEpsilon(f32),
    #[error("delta threshold should be positive and finite, but is {0}")]
    InvalidDeltaThreshold(f32),
    #[error("minimum lambda should be non-negative and finite (and positive in log space), but is {0}")]
    InvalidLambdaMin(f32),
    #[error("number of lambdas must be at least 2, but is {0}")]
    InvalidNLambdas(usize),
    #[error("step divisor should be positive and finite, but is {0}")]
    InvalidStepDivisor(f32),
    /// The input has no observations
    #[error("at least one sample needed")]
    NotEnoughSamples,
    /// The input has no feature columns
    #[error("at least one feature needed")]
    NotEnoughFeatures,
    #[error("records have {samples} rows but targets have {targets} entries")]
    MismatchedShapes { samples: usize, targets: usize },
    /// The search range is empty, usually because the response is orthogonal to every feature
    #[error("minimum lambda {lambda_min} is not below the estimated maximum lambda {lambda_max}")]
    InvalidLambdaRange { lambda_min: f32, lambda_max: f32 },
    /// The ridge system `X W X^T + lambda I` could not be solved reliably
    #[error("the regularized gram matrix is singular or ill-conditioned at lambda {lambda}")]
    IllConditioned { lambda: f32 },
    #[error("lambda {0} cannot be used as a cache key")]
    InvalidKey(f32),
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
}

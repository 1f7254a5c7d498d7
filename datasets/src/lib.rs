//! `linfa-l0em-datasets` generates synthetic problems for testing and demonstrating sparse
//! regression in the [`linfa`](https://crates.io/crates/linfa) ecosystem.
//!
//! ## Using the generators
//!
//! Enable the `generate` feature:
//! ```ignore
//! linfa-l0em-datasets = { version = "0.7.1", features = ["generate"] }
//! ```
//! and then use it in your example or tests as
//! ```ignore
//! let mut rng = Xoshiro256Plus::seed_from_u64(42);
//! let coefficients = generate::sparse_coefficients(1000, &[1., 2., 3., 4.]);
//! let dataset = generate::sparse_regression(100, &coefficients, 0.1, &mut rng);
//! ```

#[cfg(feature = "generate")]
pub mod generate;

//! Adaptive lambda path search
//!
//! Instead of fitting on a fixed grid of regularization strengths, the search bisects the
//! range `[lambda_min, lambda_max]` and only subdivides intervals across which the number of
//! selected features changes by more than one. Evaluations end up concentrated where many
//! sparsity levels are packed into a narrow range of lambdas.
use std::collections::BTreeMap;

use linfa::dataset::{AsSingleTargets, DatasetBase};
use linfa::traits::Fit;
use linfa::{Float, ParamGuard};
use ndarray::{Array1, ArrayBase, ArrayView1, ArrayView2, Data, Ix2};
use noisy_float::{checkers::FiniteChecker, NoisyFloat};

use crate::algorithm::{check_shapes, count_nonzero};
use crate::error::{L0EmError, Result};
use crate::hyperparams::{L0EmParams, L0EmPathParams, L0EmPathValidParams, L0EmValidParams};
use crate::max_lambda::max_lambda;

/// A sparse regression procedure which can be plugged into the lambda path search
///
/// `regress` receives the feature matrix, the targets and a regularization strength and
/// returns one coefficient per feature. Exact zeros count as unselected features.
pub trait SparseRegressor<F: Float> {
    type Error;

    fn regress(
        &self,
        x: ArrayView2<F>,
        y: ArrayView1<F>,
        lambda: F,
    ) -> std::result::Result<Array1<F>, Self::Error>;
}

impl<F: Float> SparseRegressor<F> for L0EmValidParams<F> {
    type Error = L0EmError;

    /// Fit L0EM at `lambda` with the remaining settings of this parameter set
    fn regress(&self, x: ArrayView2<F>, y: ArrayView1<F>, lambda: F) -> Result<Array1<F>> {
        if !lambda.is_finite() || lambda < F::zero() {
            return Err(L0EmError::InvalidLambda(
                lambda.to_f32().unwrap_or(f32::NAN),
            ));
        }

        let model = self
            .with_lambda(lambda)
            .fit(&DatasetBase::new(x, y))?;
        Ok(model.hyperplane)
    }
}

impl<F: Float> SparseRegressor<F> for L0EmParams<F> {
    type Error = L0EmError;

    fn regress(&self, x: ArrayView2<F>, y: ArrayView1<F>, lambda: F) -> Result<Array1<F>> {
        self.check_ref()?.regress(x, y, lambda)
    }
}

type LambdaKey<F> = NoisyFloat<F, FiniteChecker>;

/// Coefficients of every lambda evaluated during a path search
///
/// Lambdas are used as exact keys, each lambda is evaluated at most once and entries are
/// never replaced.
#[derive(Debug, Clone)]
pub struct CoefficientCache<F: Float> {
    entries: BTreeMap<LambdaKey<F>, Array1<F>>,
    visit_order: Vec<F>,
}

impl<F: Float> Default for CoefficientCache<F> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            visit_order: Vec::new(),
        }
    }
}

impl<F: Float> CoefficientCache<F> {
    /// Coefficients stored for exactly this lambda
    pub fn get(&self, lambda: F) -> Option<&Array1<F>> {
        LambdaKey::try_new(lambda).and_then(|key| self.entries.get(&key))
    }

    pub fn contains(&self, lambda: F) -> bool {
        self.get(lambda).is_some()
    }

    /// Number of evaluated lambdas, which equals the number of regressor calls
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(lambda, coefficients)` in ascending order of lambda
    pub fn iter(&self) -> impl Iterator<Item = (F, &Array1<F>)> + '_ {
        self.entries.iter().map(|(key, theta)| (key.raw(), theta))
    }

    /// Evaluated lambdas in the order the search visited them
    pub fn visit_order(&self) -> &[F] {
        &self.visit_order
    }

    fn insert(&mut self, lambda: F, theta: Array1<F>) -> Result<()> {
        let key = LambdaKey::try_new(lambda)
            .ok_or_else(|| L0EmError::InvalidKey(lambda.to_f32().unwrap_or(f32::NAN)))?;
        if self.entries.insert(key, theta).is_none() {
            self.visit_order.push(lambda);
        }
        Ok(())
    }
}

/// First lambda at which each number of selected features was observed
///
/// Levels are only ever added with [`insert_if_absent`](Self::insert_if_absent), a level
/// discovered once keeps its lambda for the rest of the search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparsityIndex<F> {
    levels: BTreeMap<usize, F>,
}

impl<F: Float> SparsityIndex<F> {
    /// Record `lambda` for `n_selected` unless the level is already known
    ///
    /// Returns `true` if the level was new.
    pub fn insert_if_absent(&mut self, n_selected: usize, lambda: F) -> bool {
        match self.levels.entry(n_selected) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(lambda);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, n_selected: usize) -> Option<F> {
        self.levels.get(&n_selected).copied()
    }

    pub fn contains(&self, n_selected: usize) -> bool {
        self.levels.contains_key(&n_selected)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Iterate over `(n_selected, lambda)` in ascending order of `n_selected`
    pub fn iter(&self) -> impl Iterator<Item = (usize, F)> + '_ {
        self.levels.iter().map(|(&k, &lambda)| (k, lambda))
    }
}

/// Result of an adaptive lambda path search
///
/// Holds the coefficients of every evaluated lambda and, for every number of selected
/// features seen during the search, the first lambda that produced it.
#[derive(Debug, Clone)]
pub struct LambdaPath<F: Float> {
    lambda_min: F,
    lambda_max: F,
    cache: CoefficientCache<F>,
    index: SparsityIndex<F>,
    budget_exhausted: bool,
}

impl<F: Float> LambdaPath<F> {
    /// Create default path search hyper parameters
    pub fn params() -> L0EmPathParams<F> {
        L0EmPathParams::new()
    }

    pub fn lambda_min(&self) -> F {
        self.lambda_min
    }

    /// Upper end of the searched range, see [`max_lambda`](crate::max_lambda)
    pub fn lambda_max(&self) -> F {
        self.lambda_max
    }

    /// Coefficients fitted at exactly `lambda`, if it was evaluated
    pub fn coefficients(&self, lambda: F) -> Option<&Array1<F>> {
        self.cache.get(lambda)
    }

    /// Iterate over all evaluated `(lambda, coefficients)` pairs in ascending order of lambda
    pub fn iter(&self) -> impl Iterator<Item = (F, &Array1<F>)> + '_ {
        self.cache.iter()
    }

    pub fn visit_order(&self) -> &[F] {
        self.cache.visit_order()
    }

    /// Number of regressor calls made by the search
    pub fn n_evaluations(&self) -> usize {
        self.cache.len()
    }

    /// Iterate over `(n_selected, first lambda)` in ascending order of `n_selected`
    pub fn sparsity_levels(&self) -> impl Iterator<Item = (usize, F)> + '_ {
        self.index.iter()
    }

    /// First lambda at which exactly `n_selected` features were selected
    pub fn lambda_for_level(&self, n_selected: usize) -> Option<F> {
        self.index.get(n_selected)
    }

    /// Representative coefficients with exactly `n_selected` non-zero entries
    pub fn coefficients_for_level(&self, n_selected: usize) -> Option<&Array1<F>> {
        self.lambda_for_level(n_selected)
            .and_then(|lambda| self.cache.get(lambda))
    }

    pub fn cache(&self) -> &CoefficientCache<F> {
        &self.cache
    }

    pub fn sparsity_index(&self) -> &SparsityIndex<F> {
        &self.index
    }

    /// Whether the search stopped because it ran out of regressor calls, in which case
    /// some transitions may not be localized
    pub fn budget_exhausted(&self) -> bool {
        self.budget_exhausted
    }
}

impl<F, D, T> Fit<ArrayBase<D, Ix2>, T, L0EmError> for L0EmPathValidParams<F>
where
    F: Float,
    D: Data<Elem = F>,
    T: AsSingleTargets<Elem = F>,
{
    type Object = LambdaPath<F>;

    /// Search the lambda path with the L0EM solver configured in this parameter set
    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, T>) -> Result<Self::Object> {
        self.search_with(dataset, self.solver())
    }
}

impl<F: Float> L0EmPathValidParams<F> {
    /// Search the lambda path with an arbitrary sparse regressor
    ///
    /// The input is validated and `lambda_max` estimated before the regressor is called for
    /// the first time.
    pub fn search_with<D, T, R>(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, T>,
        regressor: &R,
    ) -> std::result::Result<LambdaPath<F>, R::Error>
    where
        D: Data<Elem = F>,
        T: AsSingleTargets<Elem = F>,
        R: SparseRegressor<F>,
        R::Error: From<L0EmError>,
    {
        let x = dataset.records().view();
        let y = dataset.as_single_targets();
        check_shapes(x, y.view())?;

        let lambda_min = self.lambda_min();
        let lambda_max = max_lambda(&x, &y)?;
        if !(lambda_min < lambda_max) {
            return Err(L0EmError::InvalidLambdaRange {
                lambda_min: lambda_min.to_f32().unwrap_or(f32::NAN),
                lambda_max: lambda_max.to_f32().unwrap_or(f32::NAN),
            }
            .into());
        }

        let n_steps = F::cast(self.n_lambdas() - 1);
        let log_increment = ((lambda_max + F::one()).ln() - (lambda_min + F::one()).ln()) / n_steps;
        let min_gap = log_increment / self.step_divisor();

        let mut explorer = Explorer {
            x,
            y: y.view(),
            regressor,
            cache: CoefficientCache::default(),
            index: SparsityIndex::default(),
        };
        let budget_exhausted = explorer.bisect(
            lambda_min,
            lambda_max,
            min_gap,
            self.n_lambdas(),
            self.log_space(),
        )?;

        Ok(LambdaPath {
            lambda_min,
            lambda_max,
            cache: explorer.cache,
            index: explorer.index,
            budget_exhausted,
        })
    }
}

struct Explorer<'a, F: Float, R> {
    x: ArrayView2<'a, F>,
    y: ArrayView1<'a, F>,
    regressor: &'a R,
    cache: CoefficientCache<F>,
    index: SparsityIndex<F>,
}

impl<'a, F, R> Explorer<'a, F, R>
where
    F: Float,
    R: SparseRegressor<F>,
    R::Error: From<L0EmError>,
{
    /// Number of selected features at `lambda`, calling the regressor only for new lambdas
    fn probe(&mut self, lambda: F) -> std::result::Result<usize, R::Error> {
        let n_selected = match self.cache.get(lambda) {
            Some(theta) => count_nonzero(theta.view()),
            None => {
                let theta = self.regressor.regress(self.x, self.y, lambda)?;
                let n_selected = count_nonzero(theta.view());
                self.cache.insert(lambda, theta)?;
                log::debug!("lambda {} selects {} features", lambda, n_selected);
                n_selected
            }
        };
        self.index.insert_if_absent(n_selected, lambda);

        Ok(n_selected)
    }

    /// Recursive bisection of `[lo, hi]`, run as a depth-first worklist
    ///
    /// An interval is only examined while the number of regressor calls does not exceed
    /// `budget` and it is wider than `min_gap`. Both ends are probed (`lo` first), and if
    /// more than one feature leaves the model across the interval the midpoint is probed and
    /// the halves which still skip a level are queued, the lower half first.
    ///
    /// Returns whether pending intervals were dropped because the budget ran out.
    fn bisect(
        &mut self,
        lo: F,
        hi: F,
        min_gap: F,
        budget: usize,
        log_space: bool,
    ) -> std::result::Result<bool, R::Error> {
        let mut pending = vec![(lo, hi)];

        while let Some((lo, hi)) = pending.pop() {
            if self.cache.len() > budget {
                log::debug!(
                    "lambda path budget of {} evaluations spent, {} intervals left",
                    budget,
                    pending.len() + 1
                );
                return Ok(true);
            }
            if !(hi - lo > min_gap) {
                continue;
            }

            let n_lo = self.probe(lo)?;
            let n_hi = self.probe(hi)?;
            if n_lo.saturating_sub(n_hi) <= 1 {
                continue;
            }

            let mid = midpoint(lo, hi, log_space);
            if !(mid > lo && mid < hi) {
                continue;
            }
            let n_mid = self.probe(mid)?;

            if n_mid.saturating_sub(n_hi) > 1 {
                pending.push((mid, hi));
            }
            if n_lo.saturating_sub(n_mid) > 1 {
                pending.push((lo, mid));
            }
        }

        Ok(false)
    }
}

fn midpoint<F: Float>(lo: F, hi: F, log_space: bool) -> F {
    let two = F::cast(2.0);
    if log_space {
        (lo.ln() + (hi.ln() - lo.ln()) / two).exp()
    } else {
        lo + (hi - lo) / two
    }
}

//! Budget trimming: keep the newest turns whose estimated cost fits.

use std::{collections::VecDeque, sync::Arc};

use {helpdesk_providers::Turn, tracing::debug};

/// Estimated cost of a piece of text. Must be pure.
pub trait CostEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

impl<F> CostEstimator for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn estimate(&self, text: &str) -> usize {
        self(text)
    }
}

/// Rough token estimate: one token per four characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenEstimator;

impl CostEstimator for ApproxTokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// One unit of cost per character.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharCountEstimator;

impl CostEstimator for CharCountEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count()
    }
}

/// Drop the oldest turns until the total cost is at most `budget`.
///
/// Turns are in oldest-first order and the result is a suffix of them. A
/// newest turn that alone exceeds `budget` is still kept, so a non-empty
/// input never produces an empty output.
pub fn trim_to_budget<E>(turns: Vec<Turn>, estimator: &E, budget: usize) -> Vec<Turn>
where
    E: CostEstimator + ?Sized,
{
    let mut queue: VecDeque<(Turn, usize)> = VecDeque::with_capacity(turns.len());
    let mut total = 0usize;

    for turn in turns {
        let cost = estimator.estimate(&turn.text);
        total = total.saturating_add(cost);
        queue.push_back((turn, cost));

        while total > budget && queue.len() > 1 {
            if let Some((_, dropped)) = queue.pop_front() {
                total -= dropped;
            }
        }
    }

    queue.into_iter().map(|(turn, _)| turn).collect()
}

/// A budget paired with the estimator that measures it.
#[derive(Clone)]
pub struct BudgetTrimmer {
    budget: usize,
    estimator: Arc<dyn CostEstimator>,
}

impl BudgetTrimmer {
    pub fn new(budget: usize, estimator: Arc<dyn CostEstimator>) -> Self {
        Self { budget, estimator }
    }

    /// Token budget measured with [`ApproxTokenEstimator`].
    pub fn approx_tokens(budget: usize) -> Self {
        Self::new(budget, Arc::new(ApproxTokenEstimator))
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn cost(&self, turns: &[Turn]) -> usize {
        turns
            .iter()
            .map(|t| self.estimator.estimate(&t.text))
            .sum()
    }

    pub fn trim(&self, turns: Vec<Turn>) -> Vec<Turn> {
        let before = turns.len();
        let kept = trim_to_budget(turns, self.estimator.as_ref(), self.budget);
        if kept.len() < before {
            debug!(
                dropped = before - kept.len(),
                kept = kept.len(),
                budget = self.budget,
                "trimmed history to budget"
            );
        }
        kept
    }
}

impl std::fmt::Debug for BudgetTrimmer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetTrimmer")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

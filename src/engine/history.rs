//! Current/previous evaluation pair.
//!
//! The only place the "previous snapshot" lives. Readers load the pair as a
//! whole; the refresh path replaces it whole, so nobody ever observes a
//! current without its matching previous.

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::evaluate::Evaluation;

// ---

#[derive(Debug, Clone, Default)]
pub struct EvaluationPair {
    pub current: Option<Arc<Evaluation>>,
    pub previous: Option<Arc<Evaluation>>,
}

#[derive(Debug, Default)]
pub struct EvaluationHistory {
    cell: ArcSwap<EvaluationPair>,
}

impl EvaluationHistory {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<EvaluationPair> {
        self.cell.load_full()
    }

    /// Publish `next` as current, demoting the old current to previous.
    pub(crate) fn rotate(&self, next: Evaluation) {
        // ---
        let next = Arc::new(next);
        self.cell.rcu(|pair| EvaluationPair {
            previous: pair.current.clone(),
            current: Some(Arc::clone(&next)),
        });
    }
}

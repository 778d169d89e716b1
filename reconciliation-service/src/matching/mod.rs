//! Transaction-to-invoice matching.

mod engine;
mod scorer;
mod similarity;

pub use engine::{ReconcileOutcome, ReconciliationEngine, VerdictPolicy};
pub use scorer::{MatchScorer, ScoreBreakdown, ScoredCandidate, ScoringWeights};
pub use similarity::{edit_distance, similarity};

use rust_decimal::Decimal;

/// Failure to score a single record. Never aborts a cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("transaction {transaction_id}: non-positive amount {amount}")]
    NonPositiveAmount {
        transaction_id: String,
        amount: Decimal,
    },

    #[error("invoice {invoice_id}: {reason}")]
    InvalidCandidate { invoice_id: String, reason: String },
}

//! Verdict assignment over a batch of transactions.

use super::scorer::{outranks, MatchScorer};
use super::MatchError;
use crate::models::{
    InvoiceCandidate, MatchMethod, Reconciliation, ReconciliationStatus, Transaction,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Confidence thresholds mapping a score to a verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct VerdictPolicy {
    pub auto_match: Decimal,
    pub suggest: Decimal,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self {
            auto_match: Decimal::new(70, 2),
            suggest: Decimal::new(50, 2),
        }
    }
}

impl VerdictPolicy {
    pub fn new(auto_match: Decimal, suggest: Decimal) -> Self {
        Self {
            auto_match,
            suggest,
        }
    }

    pub fn classify(&self, confidence: Decimal) -> ReconciliationStatus {
        if confidence >= self.auto_match {
            ReconciliationStatus::Matched
        } else if confidence >= self.suggest {
            ReconciliationStatus::Suggested
        } else {
            ReconciliationStatus::Unmatched
        }
    }
}

/// Counts produced by one `reconcile` pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub evaluated: usize,
    pub newly_matched: usize,
    pub newly_suggested: usize,
    pub errors: Vec<MatchError>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    scorer: MatchScorer,
    policy: VerdictPolicy,
}

impl ReconciliationEngine {
    pub fn new(scorer: MatchScorer, policy: VerdictPolicy) -> Self {
        Self { scorer, policy }
    }

    pub fn scorer(&self) -> &MatchScorer {
        &self.scorer
    }

    pub fn policy(&self) -> &VerdictPolicy {
        &self.policy
    }

    pub fn reconcile(
        &self,
        transactions: &mut [Transaction],
        candidates: &[InvoiceCandidate],
    ) -> ReconcileOutcome {
        self.reconcile_at(transactions, candidates, Utc::now())
    }

    /// Apply verdicts to every open transaction, in slice order.
    ///
    /// Credits are scored against receivables and debits against payables.
    /// Matched and manual records are left untouched. An invoice is linked to
    /// at most one matched transaction: invoices already linked before the
    /// pass are excluded up front, and an invoice auto-matched during the
    /// pass leaves the pool for every later transaction.
    pub fn reconcile_at(
        &self,
        transactions: &mut [Transaction],
        candidates: &[InvoiceCandidate],
        now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let pool = self.candidate_pool(transactions, candidates, &mut outcome.errors);

        // Scoring is pure; verdicts are applied afterwards in a fixed order.
        let scored: Vec<(usize, Result<Vec<(usize, Decimal)>, MatchError>)> = transactions
            .iter()
            .enumerate()
            .filter(|(_, tx)| tx.reconciliation.is_open())
            .map(|(i, tx)| (i, self.score_pool(tx, &pool)))
            .collect();

        let mut taken = vec![false; pool.len()];

        for (index, scores) in scored {
            outcome.evaluated += 1;
            let tx = &mut transactions[index];

            let scores = match scores {
                Ok(scores) => scores,
                Err(e) => {
                    warn!(transaction_id = %tx.transaction_id, error = %e, "Skipping transaction");
                    outcome.errors.push(e);
                    continue;
                }
            };

            let best = scores
                .into_iter()
                .filter(|(c, _)| !taken[*c])
                .fold(None::<(usize, Decimal)>, |best, (c, score)| match best {
                    Some((b, b_score)) if !outranks(pool[c], score, pool[b], b_score) => {
                        Some((b, b_score))
                    }
                    _ => Some((c, score)),
                });

            let previous = tx.reconciliation.clone();
            let rejected = previous.rejected_invoice_ids.clone();

            match best.map(|(c, score)| (c, score, self.policy.classify(score))) {
                Some((c, confidence, ReconciliationStatus::Matched)) => {
                    taken[c] = true;
                    let invoice_id = pool[c].invoice_id.clone();
                    debug!(
                        transaction_id = %tx.transaction_id,
                        invoice_id = %invoice_id,
                        confidence = %confidence,
                        "Transaction matched"
                    );
                    tx.reconciliation =
                        Reconciliation::matched(invoice_id, confidence, MatchMethod::Auto, now)
                            .with_rejections(rejected);
                    outcome.newly_matched += 1;
                }
                Some((c, confidence, ReconciliationStatus::Suggested)) => {
                    let invoice_id = pool[c].invoice_id.clone();
                    if previous.status != ReconciliationStatus::Suggested
                        || previous.invoice_id.as_deref() != Some(invoice_id.as_str())
                    {
                        outcome.newly_suggested += 1;
                    }
                    tx.reconciliation =
                        Reconciliation::suggested(invoice_id, confidence).with_rejections(rejected);
                }
                _ => {
                    // A stale suggestion falls back to unmatched.
                    if previous.status == ReconciliationStatus::Suggested {
                        tx.reconciliation = Reconciliation::unmatched().with_rejections(rejected);
                    }
                }
            }
        }

        outcome
    }

    /// Open invoices not yet linked to a matched transaction, first occurrence
    /// of each id only.
    fn candidate_pool<'a>(
        &self,
        transactions: &[Transaction],
        candidates: &'a [InvoiceCandidate],
        errors: &mut Vec<MatchError>,
    ) -> Vec<&'a InvoiceCandidate> {
        let linked: HashSet<&str> = transactions
            .iter()
            .filter(|tx| tx.reconciliation.is_matched())
            .filter_map(|tx| tx.reconciliation.invoice_id.as_deref())
            .collect();

        let mut seen = HashSet::new();
        let mut pool = Vec::with_capacity(candidates.len());

        for invoice in candidates {
            if linked.contains(invoice.invoice_id.as_str())
                || !seen.insert(invoice.invoice_id.as_str())
            {
                continue;
            }
            if invoice.amount <= Decimal::ZERO {
                errors.push(MatchError::InvalidCandidate {
                    invoice_id: invoice.invoice_id.clone(),
                    reason: format!("non-positive amount {}", invoice.amount),
                });
                continue;
            }
            pool.push(invoice);
        }

        pool
    }

    fn score_pool(
        &self,
        tx: &Transaction,
        pool: &[&InvoiceCandidate],
    ) -> Result<Vec<(usize, Decimal)>, MatchError> {
        let rejected = &tx.reconciliation.rejected_invoice_ids;

        pool.iter()
            .enumerate()
            .filter(|(_, invoice)| invoice.settles(tx) && !rejected.contains(&invoice.invoice_id))
            .map(|(c, invoice)| Ok((c, self.scorer.score(tx, invoice)?)))
            .collect()
    }
}

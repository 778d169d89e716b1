//! Composite confidence between one transaction and one invoice candidate.

use super::similarity::similarity;
use super::MatchError;
use crate::models::{InvoiceCandidate, Transaction};
use chrono::{Duration, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;

/// Per-signal weights. Signals are summed, not averaged.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub amount: Decimal,
    pub name: Decimal,
    pub date: Decimal,
    pub reference: Decimal,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            amount: Decimal::new(40, 2),
            name: Decimal::new(30, 2),
            date: Decimal::new(20, 2),
            reference: Decimal::new(10, 2),
        }
    }
}

/// Contribution of each signal to a score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub amount: Decimal,
    pub name: Decimal,
    pub date: Decimal,
    pub reference: Decimal,
}

impl ScoreBreakdown {
    pub fn total(&self) -> Decimal {
        self.amount + self.name + self.date + self.reference
    }
}

/// Best candidate for a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub invoice_id: String,
    pub confidence: Decimal,
}

#[derive(Debug, Clone)]
pub struct MatchScorer {
    weights: ScoringWeights,
    date_window: Duration,
}

impl Default for MatchScorer {
    fn default() -> Self {
        Self::new(3)
    }
}

impl MatchScorer {
    pub fn new(date_proximity_days: u32) -> Self {
        Self::with_weights(ScoringWeights::default(), date_proximity_days)
    }

    pub fn with_weights(weights: ScoringWeights, date_proximity_days: u32) -> Self {
        Self {
            weights,
            date_window: Duration::days(i64::from(date_proximity_days)),
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Confidence in `[0, 1]` that `transaction` settles `invoice`.
    pub fn score(
        &self,
        transaction: &Transaction,
        invoice: &InvoiceCandidate,
    ) -> Result<Decimal, MatchError> {
        Ok(self.breakdown(transaction, invoice)?.total())
    }

    pub fn breakdown(
        &self,
        transaction: &Transaction,
        invoice: &InvoiceCandidate,
    ) -> Result<ScoreBreakdown, MatchError> {
        if transaction.amount <= Decimal::ZERO {
            return Err(MatchError::NonPositiveAmount {
                transaction_id: transaction.transaction_id.clone(),
                amount: transaction.amount,
            });
        }
        if invoice.amount <= Decimal::ZERO {
            return Err(MatchError::InvalidCandidate {
                invoice_id: invoice.invoice_id.clone(),
                reason: format!("non-positive amount {}", invoice.amount),
            });
        }

        Ok(ScoreBreakdown {
            amount: self.amount_signal(transaction.amount, invoice.amount),
            name: similarity(&transaction.counterparty.name, &invoice.client) * self.weights.name,
            date: self.date_signal(transaction, invoice),
            reference: self.reference_signal(transaction, invoice),
        })
    }

    fn amount_signal(&self, paid: Decimal, invoiced: Decimal) -> Decimal {
        let diff = (paid - invoiced).abs();
        let weight = self.weights.amount;

        if diff <= Decimal::new(1, 2) {
            weight
        } else if diff <= invoiced * Decimal::new(1, 2) {
            weight * Decimal::new(75, 2)
        } else if diff <= invoiced * Decimal::new(10, 2) {
            weight * Decimal::new(25, 2)
        } else {
            Decimal::ZERO
        }
    }

    fn date_signal(&self, transaction: &Transaction, invoice: &InvoiceCandidate) -> Decimal {
        let issued = invoice.date.and_time(NaiveTime::MIN).and_utc();
        let gap = (transaction.created_at - issued).abs();

        if gap <= self.date_window {
            self.weights.date
        } else {
            Decimal::ZERO
        }
    }

    fn reference_signal(&self, transaction: &Transaction, invoice: &InvoiceCandidate) -> Decimal {
        match (transaction.reference.as_deref(), invoice.reference.as_deref()) {
            (Some(paid), Some(invoiced)) if !paid.is_empty() && !invoiced.is_empty() => {
                similarity(paid, invoiced) * self.weights.reference
            }
            _ => Decimal::ZERO,
        }
    }

    /// Highest-scoring candidate the transaction can settle, ties resolved to
    /// the lowest invoice id.
    pub fn best_match<'a, I>(
        &self,
        transaction: &Transaction,
        candidates: I,
    ) -> Result<Option<ScoredCandidate>, MatchError>
    where
        I: IntoIterator<Item = &'a InvoiceCandidate>,
    {
        let mut best: Option<(&InvoiceCandidate, Decimal)> = None;

        for invoice in candidates.into_iter().filter(|i| i.settles(transaction)) {
            let confidence = self.score(transaction, invoice)?;
            let replace = match best {
                Some((current, current_score)) => {
                    outranks(invoice, confidence, current, current_score)
                }
                None => true,
            };
            if replace {
                best = Some((invoice, confidence));
            }
        }

        Ok(best.map(|(invoice, confidence)| ScoredCandidate {
            invoice_id: invoice.invoice_id.clone(),
            confidence,
        }))
    }
}

/// Whether `(a, a_score)` beats `(b, b_score)`: higher score, then lower id.
pub(crate) fn outranks(
    a: &InvoiceCandidate,
    a_score: Decimal,
    b: &InvoiceCandidate,
    b_score: Decimal,
) -> bool {
    a_score > b_score || (a_score == b_score && a.invoice_id < b.invoice_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counterparty, Direction, InvoiceKind, Reconciliation};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn transaction(amount: Decimal, name: &str, day: u32, reference: Option<&str>) -> Transaction {
        Transaction {
            transaction_id: "tx-1".to_string(),
            account_id: "acc-1".to_string(),
            direction: Direction::Credit,
            amount,
            currency: "CHF".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, day, 10, 0, 0).unwrap(),
            completed_at: None,
            counterparty: Counterparty {
                name: name.to_string(),
                ..Counterparty::default()
            },
            reference: reference.map(str::to_string),
            description: None,
            category: None,
            subcategory: None,
            reconciliation: Reconciliation::default(),
        }
    }

    fn invoice(
        id: &str,
        amount: Decimal,
        client: &str,
        day: u32,
        reference: Option<&str>,
    ) -> InvoiceCandidate {
        InvoiceCandidate {
            invoice_id: id.to_string(),
            kind: InvoiceKind::Receivable,
            amount,
            client: client.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            reference: reference.map(str::to_string),
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn perfect_match_without_reference_scores_ninety() {
        let scorer = MatchScorer::default();
        let tx = transaction(dec("13462.00"), "Rolex SA", 20, None);
        let inv = invoice("HYP-2025-0042", dec("13462.00"), "Rolex SA", 20, None);

        assert_eq!(scorer.score(&tx, &inv).unwrap(), dec("0.90"));
    }

    #[test]
    fn perfect_match_with_reference_scores_one() {
        let scorer = MatchScorer::default();
        let tx = transaction(dec("8900"), "Nestlé SA", 19, Some("Acompte app mobile"));
        let inv = invoice("DAI-2025-0018", dec("8900"), "nestlé sa", 19, Some("ACOMPTE APP MOBILE"));

        assert_eq!(scorer.score(&tx, &inv).unwrap(), Decimal::ONE);
    }

    #[test]
    fn amount_tolerance_bands() {
        let scorer = MatchScorer::default();
        let inv = invoice("INV-1", dec("1000"), "zzz", 1, None);
        let far = |amount: &str| {
            let tx = transaction(dec(amount), "aaa", 20, None);
            scorer.breakdown(&tx, &inv).unwrap().amount
        };

        assert_eq!(far("1000.01"), dec("0.40"));
        assert_eq!(far("1010"), dec("0.30"));
        assert_eq!(far("1011"), dec("0.10"));
        assert_eq!(far("1100"), dec("0.10"));
        assert_eq!(far("1101"), Decimal::ZERO);
    }

    #[test]
    fn date_window_is_a_hard_cutoff() {
        let scorer = MatchScorer::default();
        let inv = invoice("INV-1", dec("100"), "Client", 10, None);

        // 10:00 on day 13 is more than 3 days after midnight on day 10.
        let late = transaction(dec("100"), "Client", 13, None);
        assert_eq!(scorer.breakdown(&late, &inv).unwrap().date, Decimal::ZERO);

        let close = transaction(dec("100"), "Client", 12, None);
        assert_eq!(scorer.breakdown(&close, &inv).unwrap().date, dec("0.20"));
    }

    #[test]
    fn reference_is_skipped_when_either_side_is_empty() {
        let scorer = MatchScorer::default();
        let tx = transaction(dec("100"), "Client", 10, Some(""));
        let inv = invoice("INV-1", dec("100"), "Client", 10, Some("Invoice 1"));
        assert_eq!(scorer.breakdown(&tx, &inv).unwrap().reference, Decimal::ZERO);

        let tx = transaction(dec("100"), "Client", 10, Some("Invoice 1"));
        let inv = invoice("INV-1", dec("100"), "Client", 10, None);
        assert_eq!(scorer.breakdown(&tx, &inv).unwrap().reference, Decimal::ZERO);
    }

    #[test]
    fn different_client_far_amount_and_date_scores_low() {
        let scorer = MatchScorer::default();
        let tx = transaction(dec("13462.00"), "Rolex SA", 20, None);
        let inv = invoice("INV-9", dec("11442.70"), "Swatch Group", 10, None);

        let score = scorer.score(&tx, &inv).unwrap();
        assert!(score < dec("0.50"), "score was {}", score);
        assert!(score <= dec("0.20"), "score was {}", score);
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = MatchScorer::default();
        let tx = transaction(dec("512.40"), "Migros Genossenschaft", 5, Some("RF18 5390 0754 7034"));
        let inv = invoice("INV-7", dec("515"), "Migros", 4, Some("RF18 5390 0754 7035"));

        let first = scorer.score(&tx, &inv).unwrap();
        for _ in 0..10 {
            assert_eq!(scorer.score(&tx, &inv).unwrap(), first);
        }
    }

    #[test]
    fn rejects_non_positive_transaction_amount() {
        let scorer = MatchScorer::default();
        let tx = transaction(Decimal::ZERO, "Client", 10, None);
        let inv = invoice("INV-1", dec("100"), "Client", 10, None);

        assert!(matches!(
            scorer.score(&tx, &inv),
            Err(MatchError::NonPositiveAmount { .. })
        ));
    }

    #[test]
    fn best_match_prefers_lowest_id_on_tie() {
        let scorer = MatchScorer::default();
        let tx = transaction(dec("100"), "Client", 10, None);
        let candidates = vec![
            invoice("INV-B", dec("100"), "Client", 10, None),
            invoice("INV-A", dec("100"), "Client", 10, None),
        ];

        let best = scorer.best_match(&tx, &candidates).unwrap().unwrap();
        assert_eq!(best.invoice_id, "INV-A");
        assert_eq!(best.confidence, dec("0.90"));
    }

    #[test]
    fn best_match_ignores_invoices_on_the_other_side() {
        let scorer = MatchScorer::default();
        let mut tx = transaction(dec("100"), "Client", 10, None);
        tx.direction = Direction::Debit;
        let receivable = invoice("INV-A", dec("100"), "Client", 10, None);

        assert!(scorer.best_match(&tx, [&receivable]).unwrap().is_none());
    }

    #[test]
    fn best_match_of_nothing_is_none() {
        let scorer = MatchScorer::default();
        let tx = transaction(dec("100"), "Client", 10, None);
        assert!(scorer.best_match(&tx, &[]).unwrap().is_none());
    }
}

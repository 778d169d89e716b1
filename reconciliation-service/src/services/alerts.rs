//! Balance and anomaly alerts, recomputed from scratch on every call.

use crate::models::{Account, Alert, AlertKind, Severity, Transaction};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct AlertThresholds {
    pub low_balance: Decimal,
    pub unusual_amount: Decimal,
    /// Window for the duplicate-payment rule; zero disables the rule.
    pub duplicate_window_days: u32,
    /// Transaction rules only look at debits created this recently; zero
    /// looks at the whole ledger.
    pub lookback_days: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            low_balance: Decimal::from(100_000),
            unusual_amount: Decimal::from(50_000),
            duplicate_window_days: 7,
            lookback_days: 90,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    thresholds: AlertThresholds,
}

impl AlertEngine {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Evaluate every rule over the snapshot as of now.
    pub fn evaluate(&self, accounts: &[Account], transactions: &[Transaction]) -> Vec<Alert> {
        self.evaluate_at(accounts, transactions, Utc::now())
    }

    /// Low-balance alerts come first (account order), then unusual debits and
    /// possible duplicates (transaction order) inside the lookback window.
    pub fn evaluate_at(
        &self,
        accounts: &[Account],
        transactions: &[Transaction],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let recent: Vec<Transaction> = match self.thresholds.lookback_days {
            0 => transactions.to_vec(),
            days => {
                let cutoff = now - Duration::days(i64::from(days));
                transactions
                    .iter()
                    .filter(|t| t.created_at >= cutoff)
                    .cloned()
                    .collect()
            }
        };
        let transactions = recent.as_slice();

        let mut alerts: Vec<Alert> = accounts
            .iter()
            .filter(|a| a.balance.current < self.thresholds.low_balance)
            .map(|a| self.low_balance_alert(a))
            .collect();

        alerts.extend(
            transactions
                .iter()
                .filter(|t| t.is_debit() && t.amount > self.thresholds.unusual_amount)
                .map(unusual_amount_alert),
        );

        alerts.extend(self.duplicate_alerts(transactions));

        alerts
    }

    fn low_balance_alert(&self, account: &Account) -> Alert {
        Alert {
            severity: Severity::Critical,
            kind: AlertKind::LowBalance,
            message: format!(
                "Balance of {} ({}) is {} {}, below {}",
                account.entity,
                account.account_id,
                account.balance.current,
                account.currency,
                self.thresholds.low_balance
            ),
            account_id: Some(account.account_id.clone()),
            transaction_id: None,
        }
    }

    /// Debits on the same account with the same amount and counterparty inside
    /// the window. The later transaction of each pair is flagged.
    fn duplicate_alerts(&self, transactions: &[Transaction]) -> Vec<Alert> {
        if self.thresholds.duplicate_window_days == 0 {
            return Vec::new();
        }
        let window = Duration::days(i64::from(self.thresholds.duplicate_window_days));

        let mut debits: Vec<&Transaction> = transactions.iter().filter(|t| t.is_debit()).collect();
        debits.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

        let mut last_seen: HashMap<(&str, Decimal, String), (DateTime<Utc>, &str)> = HashMap::new();
        let mut alerts = Vec::new();

        for tx in debits {
            let key = (
                tx.account_id.as_str(),
                tx.amount.normalize(),
                tx.counterparty.name.trim().to_lowercase(),
            );

            if let Some((seen_at, seen_id)) = last_seen.get(&key) {
                if tx.created_at - *seen_at <= window {
                    alerts.push(Alert {
                        severity: Severity::Warning,
                        kind: AlertKind::DuplicatePayment,
                        message: format!(
                            "Possible duplicate payment: {} {} to {} (see {})",
                            tx.amount, tx.currency, tx.counterparty.name, seen_id
                        ),
                        account_id: Some(tx.account_id.clone()),
                        transaction_id: Some(tx.transaction_id.clone()),
                    });
                }
            }

            last_seen.insert(key, (tx.created_at, tx.transaction_id.as_str()));
        }

        alerts
    }
}

fn unusual_amount_alert(tx: &Transaction) -> Alert {
    Alert {
        severity: Severity::Warning,
        kind: AlertKind::UnusualAmount,
        message: format!(
            "Unusual payment: {} {} to {}",
            tx.amount, tx.currency, tx.counterparty.name
        ),
        account_id: Some(tx.account_id.clone()),
        transaction_id: Some(tx.transaction_id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Balance, Counterparty, Direction, MonthlyStats, Reconciliation};
    use chrono::TimeZone;

    fn evaluate(engine: &AlertEngine, accounts: &[Account], txs: &[Transaction]) -> Vec<Alert> {
        engine.evaluate_at(accounts, txs, Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap())
    }

    fn account(id: &str, current: i64) -> Account {
        Account {
            account_id: id.to_string(),
            entity: "HYPERVISUAL".to_string(),
            currency: "CHF".to_string(),
            balance: Balance {
                current: Decimal::from(current),
                available: Decimal::from(current),
                pending_in: Decimal::ZERO,
                pending_out: Decimal::ZERO,
            },
            monthly_stats: MonthlyStats::default(),
        }
    }

    fn debit(id: &str, amount: i64, name: &str, day: u32) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            account_id: "acc-1".to_string(),
            direction: Direction::Debit,
            amount: Decimal::from(amount),
            currency: "CHF".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 2, day, 12, 0, 0).unwrap(),
            completed_at: None,
            counterparty: Counterparty {
                name: name.to_string(),
                ..Counterparty::default()
            },
            reference: None,
            description: None,
            category: None,
            subcategory: None,
            reconciliation: Reconciliation::default(),
        }
    }

    #[test]
    fn low_balance_raises_one_critical_alert() {
        let engine = AlertEngine::default();
        let accounts = vec![account("acc-1", 80_000), account("acc-2", 250_000)];

        let alerts = evaluate(&engine, &accounts, &[]);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].kind, AlertKind::LowBalance);
        assert_eq!(alerts[0].account_id.as_deref(), Some("acc-1"));
    }

    #[test]
    fn balance_equal_to_threshold_is_not_low() {
        let engine = AlertEngine::default();
        assert!(evaluate(&engine, &[account("acc-1", 100_000)], &[]).is_empty());
    }

    #[test]
    fn unusual_debits_raise_warnings() {
        let engine = AlertEngine::default();
        let mut credit = debit("tx-credit", 90_000, "Rolex SA", 3);
        credit.direction = Direction::Credit;
        let txs = vec![
            debit("tx-big", 60_000, "Landlord AG", 1),
            debit("tx-small", 50_000, "Landlord AG", 20),
            credit,
        ];

        let alerts = evaluate(&engine, &[], &txs);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].transaction_id.as_deref(), Some("tx-big"));
    }

    #[test]
    fn repeated_debits_inside_window_are_flagged() {
        let engine = AlertEngine::default();
        let txs = vec![
            debit("tx-1", 1_200, "Swisscom", 1),
            debit("tx-2", 1_200, "SWISSCOM ", 5),
            debit("tx-3", 1_200, "Swisscom", 20),
        ];

        let alerts = evaluate(&engine, &[], &txs);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::DuplicatePayment);
        assert_eq!(alerts[0].transaction_id.as_deref(), Some("tx-2"));
    }

    #[test]
    fn duplicate_rule_can_be_disabled() {
        let engine = AlertEngine::new(AlertThresholds {
            duplicate_window_days: 0,
            ..AlertThresholds::default()
        });
        let txs = vec![
            debit("tx-1", 1_200, "Swisscom", 1),
            debit("tx-2", 1_200, "Swisscom", 2),
        ];

        assert!(evaluate(&engine, &[], &txs).is_empty());
    }

    #[test]
    fn evaluation_recomputes_instead_of_accumulating() {
        let engine = AlertEngine::default();
        let accounts = vec![account("acc-1", 80_000)];
        let txs = vec![debit("tx-big", 75_000, "Supplier", 1)];

        let first = evaluate(&engine, &accounts, &txs);
        let second = evaluate(&engine, &accounts, &txs);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);

        let cleared = evaluate(&engine, &[account("acc-1", 120_000)], &txs);
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].kind, AlertKind::UnusualAmount);
    }

    #[test]
    fn old_debits_fall_out_of_the_lookback() {
        let engine = AlertEngine::new(AlertThresholds {
            lookback_days: 14,
            ..AlertThresholds::default()
        });
        let txs = vec![
            debit("tx-old", 60_000, "Landlord AG", 1),
            debit("tx-dup-1", 1_200, "Swisscom", 2),
            debit("tx-dup-2", 1_200, "Swisscom", 4),
            debit("tx-new", 70_000, "Landlord AG", 20),
        ];

        let alerts = evaluate(&engine, &[], &txs);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].transaction_id.as_deref(), Some("tx-new"));
    }

    #[test]
    fn zero_lookback_scans_the_whole_ledger() {
        let engine = AlertEngine::new(AlertThresholds {
            lookback_days: 0,
            ..AlertThresholds::default()
        });
        let txs = vec![debit("tx-old", 60_000, "Landlord AG", 1)];

        let far_future = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(engine.evaluate_at(&[], &txs, far_future).len(), 1);
    }
}

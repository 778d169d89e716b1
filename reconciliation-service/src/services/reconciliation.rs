//! The reconciliation service: owns the ledger snapshot and runs sync cycles.

use super::alerts::AlertEngine;
use super::audit::AuditSink;
use super::banking::{BankSnapshot, BankingProvider};
use super::errors::FetchError;
use super::invoices::InvoiceSource;
use super::metrics::{
    record_error, record_fetch_failure, record_sync_cycle, record_verdicts, set_active_alerts,
};
use crate::matching::ReconciliationEngine;
use crate::models::{
    Account, Alert, AuditRecord, CashFlowStats, CurrencyFlow, HistoryEntry, InvoiceCandidate,
    InvoiceForecast, InvoiceKind, MatchMethod, Reconciliation, ReconciliationStatus,
    ReconciliationSummary, Severity, SyncResult, SyncStatusView, Transaction,
};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::retry::{RetryConfig, retry_async};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

/// Knobs for the fetch boundary.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub entity_filter: Option<String>,
    /// Bound on each collaborator attempt.
    pub fetch_timeout: Duration,
    pub retry: RetryConfig,
    /// Settled transactions older than this are dropped from the ledger.
    /// Zero keeps them forever.
    pub ledger_retention_days: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            entity_filter: None,
            fetch_timeout: Duration::from_secs(30),
            retry: RetryConfig::with_max_retries(2),
            ledger_retention_days: 365,
        }
    }
}

/// Filters for the reconciliation history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub method: Option<MatchMethod>,
    pub limit: usize,
}

/// Failure of a manual-override request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerdictError {
    #[error("Transaction {0} not found")]
    NotFound(String),

    #[error("Transaction {transaction_id} is {status}, cannot {action}")]
    InvalidTransition {
        transaction_id: String,
        status: ReconciliationStatus,
        action: &'static str,
    },

    #[error("Invoice {invoice_id} is already linked to transaction {linked_to}")]
    InvoiceAlreadyLinked { invoice_id: String, linked_to: String },

    #[error("Invoice {0} was settled by a transaction no longer in the ledger")]
    InvoiceArchived(String),

    #[error("Invalid verdict: {0}")]
    InvalidVerdict(String),
}

impl From<VerdictError> for AppError {
    fn from(err: VerdictError) -> Self {
        match err {
            VerdictError::NotFound(_) => AppError::NotFound(anyhow::Error::new(err)),
            VerdictError::InvalidTransition { .. }
            | VerdictError::InvoiceAlreadyLinked { .. }
            | VerdictError::InvoiceArchived(_) => {
                AppError::Conflict(anyhow::Error::new(err))
            }
            VerdictError::InvalidVerdict(_) => AppError::BadRequest(anyhow::Error::new(err)),
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Sorted by account id.
    accounts: Vec<Account>,
    /// Sorted by `Transaction::order_key`.
    transactions: Vec<Transaction>,
    alerts: Vec<Alert>,
    invoices: Vec<InvoiceCandidate>,
    cursor: Option<DateTime<Utc>>,
    /// Every account id ever returned by the bank.
    known_accounts: HashSet<String>,
    /// Invoices whose matched transaction was pruned. Still linked.
    retired_invoices: HashSet<String>,
    last_sync: Option<DateTime<Utc>>,
    last_result: Option<SyncResult>,
}

impl LedgerState {
    /// Replace accounts wholesale and merge fresh transactions, keeping each
    /// stored transaction's reconciliation.
    ///
    /// Transactions of an account missing from the snapshot stay in the
    /// ledger, verdicts included, until the account comes back.
    fn merge(&mut self, snapshot: BankSnapshot) {
        let BankSnapshot {
            mut accounts,
            transactions,
        } = snapshot;
        accounts.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        self.known_accounts
            .extend(accounts.iter().map(|a| a.account_id.clone()));
        self.accounts = accounts;

        let mut by_id: HashMap<String, Transaction> = std::mem::take(&mut self.transactions)
            .into_iter()
            .map(|t| (t.transaction_id.clone(), t))
            .collect();

        for mut tx in transactions {
            if let Some(previous) = by_id.remove(&tx.transaction_id) {
                tx.reconciliation = previous.reconciliation;
            }
            by_id.insert(tx.transaction_id.clone(), tx);
        }

        let mut merged: Vec<Transaction> = by_id.into_values().collect();
        merged.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        self.transactions = merged;
    }

    /// Drop settled transactions created before `cutoff`. Invoices they held
    /// stay out of the pool while the invoice source still lists them.
    fn prune_settled(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.transactions.len();
        let retired = &mut self.retired_invoices;

        self.transactions.retain(|tx| {
            let record = &tx.reconciliation;
            if tx.created_at >= cutoff || record.is_open() {
                return true;
            }
            if record.is_matched() {
                if let Some(invoice_id) = &record.invoice_id {
                    retired.insert(invoice_id.clone());
                }
            }
            false
        });

        before - self.transactions.len()
    }

    fn index_of(&self, transaction_id: &str) -> Result<usize, VerdictError> {
        self.transactions
            .iter()
            .position(|t| t.transaction_id == transaction_id)
            .ok_or_else(|| VerdictError::NotFound(transaction_id.to_string()))
    }

    /// Matched transaction other than `except` that holds `invoice_id`.
    fn linked_elsewhere(&self, invoice_id: &str, except: usize) -> Option<&Transaction> {
        self.transactions.iter().enumerate().find_map(|(i, t)| {
            (i != except
                && t.reconciliation.is_matched()
                && t.reconciliation.invoice_id.as_deref() == Some(invoice_id))
            .then_some(t)
        })
    }

    fn link_manually(
        &mut self,
        index: usize,
        invoice_id: String,
        now: DateTime<Utc>,
    ) -> Result<(), VerdictError> {
        if let Some(other) = self.linked_elsewhere(&invoice_id, index) {
            return Err(VerdictError::InvoiceAlreadyLinked {
                invoice_id,
                linked_to: other.transaction_id.clone(),
            });
        }
        if self.retired_invoices.contains(&invoice_id) {
            return Err(VerdictError::InvoiceArchived(invoice_id));
        }

        let tx = &self.transactions[index];
        if let Some(invoice) = self.invoices.iter().find(|i| i.invoice_id == invoice_id) {
            if !invoice.settles(tx) {
                return Err(VerdictError::InvalidVerdict(format!(
                    "a {} cannot settle {} invoice {}",
                    tx.direction.as_str(),
                    invoice.kind.as_str(),
                    invoice_id
                )));
            }
        }

        let record = &mut self.transactions[index].reconciliation;
        let rejected = std::mem::take(&mut record.rejected_invoice_ids)
            .into_iter()
            .filter(|id| *id != invoice_id)
            .collect();
        *record = Reconciliation::matched(invoice_id, Decimal::ONE, MatchMethod::Manual, now)
            .with_rejections(rejected);
        Ok(())
    }

    /// Return a transaction to `unmatched`, remembering the invoice it held.
    fn release(&mut self, index: usize) {
        let record = &mut self.transactions[index].reconciliation;
        let mut rejected = std::mem::take(&mut record.rejected_invoice_ids);
        if let Some(invoice_id) = record.invoice_id.take() {
            if !rejected.contains(&invoice_id) {
                rejected.push(invoice_id);
            }
        }
        *record = Reconciliation::unmatched().with_rejections(rejected);
    }
}

/// First day of the month three months before `to`.
fn default_window_start(to: NaiveDate) -> NaiveDate {
    let first = to.with_day(1).unwrap_or(to);
    first.checked_sub_months(Months::new(3)).unwrap_or(first)
}

/// Calendar months touched by `[from, to]`, at least one.
fn months_spanned(from: NaiveDate, to: NaiveDate) -> u32 {
    let span = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32 + 1;
    span.max(1) as u32
}

/// Everything one cycle fetched, with the records that failed validation.
struct CycleInput {
    snapshot: BankSnapshot,
    invoices: Vec<InvoiceCandidate>,
    rejected: Vec<String>,
}

/// Clears the syncing flag when the cycle ends, however it ends.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct ReconciliationService {
    banking: Arc<dyn BankingProvider>,
    invoices: Arc<dyn InvoiceSource>,
    audit: Arc<dyn AuditSink>,
    engine: ReconciliationEngine,
    alerts: AlertEngine,
    settings: ServiceSettings,
    syncing: AtomicBool,
    state: RwLock<LedgerState>,
}

impl ReconciliationService {
    pub fn new(
        banking: Arc<dyn BankingProvider>,
        invoices: Arc<dyn InvoiceSource>,
        audit: Arc<dyn AuditSink>,
        engine: ReconciliationEngine,
        alerts: AlertEngine,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            banking,
            invoices,
            audit,
            engine,
            alerts,
            settings,
            syncing: AtomicBool::new(false),
            state: RwLock::new(LedgerState::default()),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Run one fetch → reconcile → alert → audit cycle.
    ///
    /// Returns a `skipped` result immediately when another cycle is in flight.
    /// A fetch failure leaves every stored verdict untouched. Malformed
    /// records are skipped and reported in `SyncResult.errors`.
    pub async fn sync_now(&self, silent: bool) -> SyncResult {
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            tracing::debug!(silent, "Sync already in progress, skipping");
            return SyncResult::skipped(silent);
        };

        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let timer = Instant::now();
        let span = tracing::info_span!("sync_cycle", %cycle_id, silent);

        async move {
            let mut result = self.run_cycle(cycle_id, silent, started_at).await;

            if let Err(e) = self.audit.record(AuditRecord::from(&result)).await {
                tracing::error!(error = %e, "Failed to write audit record");
                record_error("audit");
                result.errors.push(format!("audit: {}", e));
            }

            result.finished_at = Utc::now();
            self.state.write().await.last_result = Some(result.clone());

            record_sync_cycle(result.status.as_str(), silent, timer.elapsed().as_secs_f64());

            tracing::info!(
                status = result.status.as_str(),
                accounts = result.accounts_refreshed,
                transactions = result.transactions_seen,
                newly_matched = result.newly_matched,
                newly_suggested = result.newly_suggested,
                alerts = result.alerts_raised,
                errors = result.errors.len(),
                duration_ms = timer.elapsed().as_millis() as u64,
                "Sync cycle finished"
            );

            if !silent {
                match &result.error {
                    None => tracing::info!(
                        target: "notification",
                        newly_matched = result.newly_matched,
                        newly_suggested = result.newly_suggested,
                        "Bank sync completed"
                    ),
                    Some(e) => {
                        tracing::info!(target: "notification", error = %e, "Bank sync failed")
                    }
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn run_cycle(&self, cycle_id: Uuid, silent: bool, started_at: DateTime<Utc>) -> SyncResult {
        if !silent {
            tracing::info!(target: "notification", "Bank sync started");
        }

        let (cursor, known_accounts) = {
            let state = self.state.read().await;
            (state.cursor, state.known_accounts.clone())
        };

        let fetched = match self.fetch(cursor, &known_accounts).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::error!(error = %e, "Sync cycle aborted, state left untouched");
                return SyncResult::failed(cycle_id, silent, started_at, e.to_string());
            }
        };
        let CycleInput {
            snapshot,
            invoices,
            rejected,
        } = fetched;

        let mut result = SyncResult::completed(cycle_id, silent, started_at);
        result.accounts_refreshed = snapshot.accounts.len();
        result.transactions_seen = snapshot.transactions.len();
        for reason in &rejected {
            tracing::warn!(reason = %reason, "Record skipped at the collaborator boundary");
            record_error("malformed_record");
        }
        result.errors = rejected;

        let now = Utc::now();
        let mut state = self.state.write().await;
        let ledger = &mut *state;
        ledger.merge(snapshot);

        let open_ids: HashSet<&str> = invoices.iter().map(|i| i.invoice_id.as_str()).collect();
        ledger
            .retired_invoices
            .retain(|id| open_ids.contains(id.as_str()));
        let pool: Vec<InvoiceCandidate> = invoices
            .iter()
            .filter(|i| !ledger.retired_invoices.contains(&i.invoice_id))
            .cloned()
            .collect();

        let outcome = self.engine.reconcile_at(&mut ledger.transactions, &pool, now);
        for err in &outcome.errors {
            tracing::warn!(error = %err, "Record skipped during reconciliation");
            record_error("match");
        }

        if self.settings.ledger_retention_days > 0 {
            let cutoff = now - chrono::Duration::days(i64::from(self.settings.ledger_retention_days));
            let pruned = ledger.prune_settled(cutoff);
            if pruned > 0 {
                tracing::info!(pruned, cutoff = %cutoff, "Pruned settled transactions");
            }
        }

        ledger.alerts = self
            .alerts
            .evaluate_at(&ledger.accounts, &ledger.transactions, now);
        ledger.invoices = invoices;
        ledger.cursor = Some(started_at);
        ledger.last_sync = Some(Utc::now());

        let critical = ledger
            .alerts
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .count();
        set_active_alerts(critical, ledger.alerts.len() - critical);
        record_verdicts("matched", MatchMethod::Auto.as_str(), outcome.newly_matched);
        record_verdicts("suggested", "none", outcome.newly_suggested);

        result.newly_matched = outcome.newly_matched;
        result.newly_suggested = outcome.newly_suggested;
        result.alerts_raised = ledger.alerts.len();
        result
            .errors
            .extend(outcome.errors.iter().map(ToString::to_string));
        result
    }

    /// Pull accounts, transactions and open invoices.
    ///
    /// Accounts seen for the first time are fetched in full; known ones only
    /// since the cursor.
    async fn fetch(
        &self,
        cursor: Option<DateTime<Utc>>,
        known_accounts: &HashSet<String>,
    ) -> Result<CycleInput, FetchError> {
        let entity = self.settings.entity_filter.as_deref();

        let accounts = self
            .call("list_accounts", || self.banking.list_accounts(entity))
            .await?;
        let mut rejected = accounts.rejected;

        let (known, fresh): (Vec<String>, Vec<String>) = accounts
            .records
            .iter()
            .map(|a| a.account_id.clone())
            .partition(|id| cursor.is_some() && known_accounts.contains(id));

        let mut transactions = Vec::new();
        for (ids, since) in [(known, cursor), (fresh, None)] {
            if ids.is_empty() {
                continue;
            }
            let batch = self
                .call("list_transactions", || {
                    self.banking.list_transactions(&ids, since)
                })
                .await?;
            transactions.extend(batch.records);
            rejected.extend(batch.rejected);
        }

        let mut snapshot = BankSnapshot {
            accounts: accounts.records,
            transactions,
        };
        rejected.extend(snapshot.prune());

        let invoices = self
            .call("list_open_invoices", || self.invoices.list_open_invoices(entity))
            .await?;
        rejected.extend(invoices.rejected);

        Ok(CycleInput {
            snapshot,
            invoices: invoices.records,
            rejected,
        })
    }

    /// One collaborator call, each attempt bounded by the fetch timeout.
    async fn call<F, Fut, T>(&self, operation: &str, f: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let timeout = self.settings.fetch_timeout;
        let result = retry_async(&self.settings.retry, operation, || {
            let attempt = f();
            async move {
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(FetchError::Timeout(timeout)),
                }
            }
        })
        .await;

        if let Err(e) = &result {
            record_fetch_failure(operation, e.kind());
        }
        result
    }

    // ========================================================================
    // Manual overrides
    // ========================================================================

    /// Record a reviewer's verdict. Manual verdicts are terminal for the engine.
    #[tracing::instrument(skip(self))]
    pub async fn set_manual_verdict(
        &self,
        transaction_id: &str,
        invoice_id: Option<String>,
        status: ReconciliationStatus,
    ) -> Result<Transaction, VerdictError> {
        let invoice_id = invoice_id.filter(|id| !id.trim().is_empty());

        let mut state = self.state.write().await;
        let index = state.index_of(transaction_id)?;

        match (status, invoice_id) {
            (ReconciliationStatus::Matched, Some(invoice_id)) => {
                state.link_manually(index, invoice_id, Utc::now())?;
            }
            (ReconciliationStatus::Matched, None) => {
                return Err(VerdictError::InvalidVerdict(
                    "matched requires an invoice_id".to_string(),
                ));
            }
            (ReconciliationStatus::Unmatched, None) => {
                let record = &mut state.transactions[index].reconciliation;
                let rejected = std::mem::take(&mut record.rejected_invoice_ids);
                *record = Reconciliation {
                    method: Some(MatchMethod::Manual),
                    ..Reconciliation::unmatched()
                }
                .with_rejections(rejected);
            }
            (ReconciliationStatus::Unmatched, Some(_)) => {
                return Err(VerdictError::InvalidVerdict(
                    "unmatched cannot carry an invoice_id".to_string(),
                ));
            }
            (ReconciliationStatus::Suggested, _) => {
                return Err(VerdictError::InvalidVerdict(
                    "suggested is not a manual verdict".to_string(),
                ));
            }
        }

        record_verdicts(status.as_str(), MatchMethod::Manual.as_str(), 1);
        let tx = state.transactions[index].clone();
        tracing::info!(
            transaction_id = %tx.transaction_id,
            status = status.as_str(),
            invoice_id = ?tx.reconciliation.invoice_id,
            "Manual verdict recorded"
        );
        Ok(tx)
    }

    /// Turn a suggestion into a manual match on the suggested invoice.
    #[tracing::instrument(skip(self))]
    pub async fn accept_suggestion(&self, transaction_id: &str) -> Result<Transaction, VerdictError> {
        let mut state = self.state.write().await;
        let index = state.index_of(transaction_id)?;

        let record = &state.transactions[index].reconciliation;
        let invoice_id = match (record.status, &record.invoice_id) {
            (ReconciliationStatus::Suggested, Some(id)) => id.clone(),
            (status, _) => {
                return Err(VerdictError::InvalidTransition {
                    transaction_id: transaction_id.to_string(),
                    status,
                    action: "accept a suggestion",
                });
            }
        };

        state.link_manually(index, invoice_id, Utc::now())?;
        record_verdicts("matched", MatchMethod::Manual.as_str(), 1);
        tracing::info!(transaction_id, "Suggestion accepted");
        Ok(state.transactions[index].clone())
    }

    /// Discard a suggestion; the invoice is never suggested for this transaction again.
    #[tracing::instrument(skip(self))]
    pub async fn reject_suggestion(&self, transaction_id: &str) -> Result<Transaction, VerdictError> {
        let mut state = self.state.write().await;
        let index = state.index_of(transaction_id)?;

        let status = state.transactions[index].reconciliation.status;
        if status != ReconciliationStatus::Suggested {
            return Err(VerdictError::InvalidTransition {
                transaction_id: transaction_id.to_string(),
                status,
                action: "reject a suggestion",
            });
        }

        state.release(index);
        record_verdicts("unmatched", "none", 1);
        tracing::info!(transaction_id, "Suggestion rejected");
        Ok(state.transactions[index].clone())
    }

    /// Unlink a matched transaction. Its invoice returns to the pool for others.
    #[tracing::instrument(skip(self))]
    pub async fn undo_match(&self, transaction_id: &str) -> Result<Transaction, VerdictError> {
        let mut state = self.state.write().await;
        let index = state.index_of(transaction_id)?;

        let status = state.transactions[index].reconciliation.status;
        if status != ReconciliationStatus::Matched {
            return Err(VerdictError::InvalidTransition {
                transaction_id: transaction_id.to_string(),
                status,
                action: "undo a match",
            });
        }

        state.release(index);
        record_verdicts("unmatched", "none", 1);
        tracing::info!(transaction_id, "Match undone");
        Ok(state.transactions[index].clone())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn accounts(&self) -> Vec<Account> {
        self.state.read().await.accounts.clone()
    }

    pub async fn transactions(&self, status: Option<ReconciliationStatus>) -> Vec<Transaction> {
        let state = self.state.read().await;
        state
            .transactions
            .iter()
            .filter(|t| status.is_none_or(|s| t.reconciliation.status == s))
            .cloned()
            .collect()
    }

    pub async fn transaction(&self, transaction_id: &str) -> Option<Transaction> {
        let state = self.state.read().await;
        state
            .transactions
            .iter()
            .find(|t| t.transaction_id == transaction_id)
            .cloned()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.state.read().await.alerts.clone()
    }

    /// Open invoices seen by the last successful cycle.
    pub async fn open_invoices(&self) -> Vec<InvoiceCandidate> {
        self.state.read().await.invoices.clone()
    }

    pub async fn recent_audit(&self, limit: usize) -> Vec<AuditRecord> {
        self.audit.recent(limit).await
    }

    pub async fn sync_status(&self) -> SyncStatusView {
        let state = self.state.read().await;
        SyncStatusView {
            syncing: self.is_syncing(),
            last_sync: state.last_sync,
            last_result: state.last_result.clone(),
        }
    }

    /// Matched transactions, most recently matched first.
    pub async fn history(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        let state = self.state.read().await;

        let mut entries: Vec<HistoryEntry> = state
            .transactions
            .iter()
            .filter(|tx| tx.reconciliation.is_matched())
            .filter(|tx| filter.method.is_none_or(|m| tx.reconciliation.method == Some(m)))
            .filter(|tx| {
                let at = tx.reconciliation.matched_at.unwrap_or(tx.created_at);
                filter.from.is_none_or(|from| at >= from) && filter.to.is_none_or(|to| at <= to)
            })
            .map(|tx| {
                let record = &tx.reconciliation;
                HistoryEntry {
                    transaction_id: tx.transaction_id.clone(),
                    account_id: tx.account_id.clone(),
                    direction: tx.direction,
                    amount: tx.amount,
                    currency: tx.currency.clone(),
                    counterparty: tx.counterparty.name.clone(),
                    created_at: tx.created_at,
                    matched_at: record.matched_at,
                    method: record.method,
                    confidence: record.confidence,
                    invoice_id: record.invoice_id.clone(),
                    invoice: record
                        .invoice_id
                        .as_ref()
                        .and_then(|id| state.invoices.iter().find(|i| &i.invoice_id == id))
                        .cloned(),
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.matched_at
                .cmp(&a.matched_at)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        if filter.limit > 0 {
            entries.truncate(filter.limit);
        }
        entries
    }

    /// Income and expenses per currency and month, plus what the open invoice
    /// pool still expects. Defaults to the three full months before the
    /// current one through today.
    pub async fn cash_flow(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> CashFlowStats {
        let today = Utc::now().date_naive();
        let to = to.unwrap_or(today);
        let from = from.unwrap_or_else(|| default_window_start(to));

        let state = self.state.read().await;

        let mut by_currency: BTreeMap<String, CurrencyFlow> = BTreeMap::new();
        for tx in &state.transactions {
            let day = tx.created_at.date_naive();
            if day < from || day > to {
                continue;
            }
            let flow = by_currency.entry(tx.currency.clone()).or_default();
            flow.totals.add(tx);
            flow.monthly
                .entry(day.format("%Y-%m").to_string())
                .or_default()
                .add(tx);
        }

        let months = Decimal::from(months_spanned(from, to));
        for flow in by_currency.values_mut() {
            flow.average_monthly_income = (flow.totals.income / months).round_dp(2);
            flow.average_monthly_expenses = (flow.totals.expenses / months).round_dp(2);
        }

        let linked: HashSet<&str> = state
            .transactions
            .iter()
            .filter(|t| t.reconciliation.is_matched())
            .filter_map(|t| t.reconciliation.invoice_id.as_deref())
            .collect();

        let mut forecast = InvoiceForecast::default();
        for invoice in state.invoices.iter().filter(|i| {
            !linked.contains(i.invoice_id.as_str()) && !state.retired_invoices.contains(&i.invoice_id)
        }) {
            match invoice.kind {
                InvoiceKind::Receivable => {
                    forecast.expected_income += invoice.amount;
                    forecast.receivable_count += 1;
                }
                InvoiceKind::Payable => {
                    forecast.expected_expenses += invoice.amount;
                    forecast.payable_count += 1;
                }
            }
        }
        forecast.net_forecast = forecast.expected_income - forecast.expected_expenses;

        CashFlowStats {
            from,
            to,
            by_currency,
            forecast,
            generated_at: Utc::now(),
        }
    }

    pub async fn summary(&self) -> ReconciliationSummary {
        let state = self.state.read().await;

        let mut by_status = BTreeMap::new();
        let mut by_method = BTreeMap::new();
        let mut unreconciled_credits: BTreeMap<String, Decimal> = BTreeMap::new();

        for tx in &state.transactions {
            let record = &tx.reconciliation;
            *by_status
                .entry(record.status.as_str().to_string())
                .or_insert(0) += 1;
            *by_method
                .entry(record.method.map_or("none", |m| m.as_str()).to_string())
                .or_insert(0) += 1;

            if !tx.is_debit() && !record.is_matched() {
                *unreconciled_credits
                    .entry(tx.currency.clone())
                    .or_insert(Decimal::ZERO) += tx.amount;
            }
        }

        let mut alerts_by_severity = BTreeMap::new();
        for alert in &state.alerts {
            *alerts_by_severity
                .entry(alert.severity.as_str().to_string())
                .or_insert(0) += 1;
        }

        ReconciliationSummary {
            accounts: state.accounts.len(),
            transactions: state.transactions.len(),
            by_status,
            by_method,
            alerts_by_severity,
            unreconciled_credits,
            last_sync: state.last_sync,
            last_result: state.last_result.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counterparty, Direction};
    use chrono::TimeZone;

    fn tx(id: &str, day: u32, reconciliation: Reconciliation) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            account_id: "acc-1".to_string(),
            direction: Direction::Credit,
            amount: Decimal::from(100),
            currency: "CHF".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, day, 9, 0, 0).unwrap(),
            completed_at: None,
            counterparty: Counterparty::default(),
            reference: None,
            description: None,
            category: None,
            subcategory: None,
            reconciliation,
        }
    }

    #[test]
    fn window_starts_three_months_back() {
        let to = NaiveDate::from_ymd_opt(2025, 5, 17).unwrap();
        assert_eq!(default_window_start(to), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());

        let new_year = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(
            default_window_start(new_year),
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap()
        );
    }

    #[test]
    fn months_are_counted_inclusively() {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(months_spanned(d(2025, 2, 1), d(2025, 5, 17)), 4);
        assert_eq!(months_spanned(d(2024, 12, 31), d(2025, 1, 1)), 2);
        assert_eq!(months_spanned(d(2025, 3, 3), d(2025, 3, 3)), 1);
    }

    #[test]
    fn pruning_keeps_open_and_recent_records() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        let mut state = LedgerState {
            transactions: vec![
                tx(
                    "tx-old-matched",
                    1,
                    Reconciliation::matched("INV-1".to_string(), Decimal::ONE, MatchMethod::Auto, now),
                ),
                tx("tx-old-open", 2, Reconciliation::unmatched()),
                tx(
                    "tx-old-manual",
                    3,
                    Reconciliation {
                        method: Some(MatchMethod::Manual),
                        ..Reconciliation::unmatched()
                    },
                ),
                tx(
                    "tx-recent-matched",
                    20,
                    Reconciliation::matched("INV-2".to_string(), Decimal::ONE, MatchMethod::Auto, now),
                ),
            ],
            ..LedgerState::default()
        };

        let pruned = state.prune_settled(Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap());

        assert_eq!(pruned, 2);
        let ids: Vec<&str> = state
            .transactions
            .iter()
            .map(|t| t.transaction_id.as_str())
            .collect();
        assert_eq!(ids, vec!["tx-old-open", "tx-recent-matched"]);
        assert!(state.retired_invoices.contains("INV-1"));
        assert_eq!(state.retired_invoices.len(), 1);
    }
}

//! Domain models for reconciliation-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// Account Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub current: Decimal,
    pub available: Decimal,
    pub pending_in: Decimal,
    pub pending_out: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStats {
    pub total_in: Decimal,
    pub total_out: Decimal,
    pub net_flow: Decimal,
}

/// Bank account snapshot. Replaced wholesale on every sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub entity: String,
    pub currency: String,
    pub balance: Balance,
    pub monthly_stats: MonthlyStats,
}

// ============================================================================
// Transaction Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: String,
    pub account_number: Option<String>,
    pub bank: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    #[default]
    Unmatched,
    Suggested,
    Matched,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Suggested => "suggested",
            Self::Matched => "matched",
        }
    }
}

impl std::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReconciliationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unmatched" => Ok(Self::Unmatched),
            "suggested" => Ok(Self::Suggested),
            "matched" => Ok(Self::Matched),
            other => Err(format!("Invalid reconciliation status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Auto,
    Manual,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(format!("Invalid match method: {}", other)),
        }
    }
}

/// Reconciliation verdict carried by a transaction.
///
/// `Matched` always carries an invoice and a confidence at or above the
/// auto-match threshold; `Unmatched` never carries an invoice. A record with
/// `method = Manual` is terminal for the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reconciliation {
    pub status: ReconciliationStatus,
    pub invoice_id: Option<String>,
    pub confidence: Decimal,
    pub matched_at: Option<DateTime<Utc>>,
    pub method: Option<MatchMethod>,
    /// Invoices a reviewer rejected for this transaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_invoice_ids: Vec<String>,
}

impl Reconciliation {
    pub fn is_manual(&self) -> bool {
        self.method == Some(MatchMethod::Manual)
    }

    pub fn is_matched(&self) -> bool {
        self.status == ReconciliationStatus::Matched
    }

    /// Whether the engine may (re)evaluate this record.
    pub fn is_open(&self) -> bool {
        !self.is_matched() && !self.is_manual()
    }

    pub fn matched(
        invoice_id: String,
        confidence: Decimal,
        method: MatchMethod,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: ReconciliationStatus::Matched,
            invoice_id: Some(invoice_id),
            confidence,
            matched_at: Some(at),
            method: Some(method),
            rejected_invoice_ids: Vec::new(),
        }
    }

    pub fn suggested(invoice_id: String, confidence: Decimal) -> Self {
        Self {
            status: ReconciliationStatus::Suggested,
            invoice_id: Some(invoice_id),
            confidence,
            matched_at: None,
            method: None,
            rejected_invoice_ids: Vec::new(),
        }
    }

    pub fn unmatched() -> Self {
        Self::default()
    }

    /// Carry reviewer rejections over to a new verdict.
    pub fn with_rejections(mut self, rejected: Vec<String>) -> Self {
        self.rejected_invoice_ids = rejected;
        self
    }
}

/// Bank transaction. Immutable apart from `reconciliation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub account_id: String,
    pub direction: Direction,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counterparty: Counterparty,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    #[serde(default)]
    pub reconciliation: Reconciliation,
}

impl Transaction {
    /// Ordering key used wherever "processing order" matters.
    pub fn order_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.transaction_id.as_str())
    }

    pub fn is_debit(&self) -> bool {
        self.direction == Direction::Debit
    }
}

// ============================================================================
// Invoice Models
// ============================================================================

/// Which side of the books an open invoice sits on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    /// Issued to a client, settled by an incoming payment.
    #[default]
    Receivable,
    /// Received from a supplier, settled by an outgoing payment.
    Payable,
}

impl InvoiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receivable => "receivable",
            Self::Payable => "payable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "receivable" => Some(Self::Receivable),
            "payable" => Some(Self::Payable),
            _ => None,
        }
    }

    /// Direction of the bank movement that settles this kind of invoice.
    pub fn settled_by(&self) -> Direction {
        match self {
            Self::Receivable => Direction::Credit,
            Self::Payable => Direction::Debit,
        }
    }
}

/// Read-only projection of an open invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceCandidate {
    pub invoice_id: String,
    #[serde(default)]
    pub kind: InvoiceKind,
    pub amount: Decimal,
    /// Client or supplier name.
    pub client: String,
    pub date: NaiveDate,
    pub reference: Option<String>,
}

impl InvoiceCandidate {
    pub fn settles(&self, transaction: &Transaction) -> bool {
        self.kind.settled_by() == transaction.direction
    }
}

// ============================================================================
// Alert Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowBalance,
    UnusualAmount,
    DuplicatePayment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub kind: AlertKind,
    pub message: String,
    pub account_id: Option<String>,
    pub transaction_id: Option<String>,
}

// ============================================================================
// Sync Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    Skipped,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of one `sync_now` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub cycle_id: Uuid,
    pub status: SyncStatus,
    pub silent: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub accounts_refreshed: usize,
    pub transactions_seen: usize,
    pub newly_matched: usize,
    pub newly_suggested: usize,
    pub alerts_raised: usize,
    /// Per-record failures that did not abort the cycle.
    pub errors: Vec<String>,
    /// Set when the cycle itself failed.
    pub error: Option<String>,
}

impl SyncResult {
    fn empty(cycle_id: Uuid, status: SyncStatus, silent: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            status,
            silent,
            started_at,
            finished_at: Utc::now(),
            accounts_refreshed: 0,
            transactions_seen: 0,
            newly_matched: 0,
            newly_suggested: 0,
            alerts_raised: 0,
            errors: Vec::new(),
            error: None,
        }
    }

    pub fn completed(cycle_id: Uuid, silent: bool, started_at: DateTime<Utc>) -> Self {
        Self::empty(cycle_id, SyncStatus::Completed, silent, started_at)
    }

    pub fn skipped(silent: bool) -> Self {
        Self::empty(Uuid::new_v4(), SyncStatus::Skipped, silent, Utc::now())
    }

    pub fn failed(
        cycle_id: Uuid,
        silent: bool,
        started_at: DateTime<Utc>,
        error: String,
    ) -> Self {
        Self {
            error: Some(error),
            ..Self::empty(cycle_id, SyncStatus::Failed, silent, started_at)
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.status == SyncStatus::Skipped
    }
}

/// Orchestrator state as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusView {
    pub syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_result: Option<SyncResult>,
}

/// Reconciliation report over the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub accounts: usize,
    pub transactions: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Keyed by method, `none` for records without one.
    pub by_method: BTreeMap<String, usize>,
    pub alerts_by_severity: BTreeMap<String, usize>,
    /// Credits not yet matched, per currency.
    pub unreconciled_credits: BTreeMap<String, Decimal>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_result: Option<SyncResult>,
}

/// A settled transaction with the invoice it was linked to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub transaction_id: String,
    pub account_id: String,
    pub direction: Direction,
    pub amount: Decimal,
    pub currency: String,
    pub counterparty: String,
    pub created_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
    pub method: Option<MatchMethod>,
    pub confidence: Decimal,
    pub invoice_id: Option<String>,
    /// Present while the invoice is still in the open pool.
    pub invoice: Option<InvoiceCandidate>,
}

/// Movements for one calendar month (`YYYY-MM`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyFlow {
    pub income: Decimal,
    pub expenses: Decimal,
    pub net: Decimal,
    pub count: usize,
}

impl MonthlyFlow {
    pub fn add(&mut self, tx: &Transaction) {
        match tx.direction {
            Direction::Credit => {
                self.income += tx.amount;
                self.net += tx.amount;
            }
            Direction::Debit => {
                self.expenses += tx.amount;
                self.net -= tx.amount;
            }
        }
        self.count += 1;
    }
}

/// Cash flow in one currency over the requested period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyFlow {
    pub totals: MonthlyFlow,
    pub monthly: BTreeMap<String, MonthlyFlow>,
    pub average_monthly_income: Decimal,
    pub average_monthly_expenses: Decimal,
}

/// Amounts still expected from the open invoice pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceForecast {
    pub expected_income: Decimal,
    pub receivable_count: usize,
    pub expected_expenses: Decimal,
    pub payable_count: usize,
    pub net_forecast: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowStats {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub by_currency: BTreeMap<String, CurrencyFlow>,
    pub forecast: InvoiceForecast,
    pub generated_at: DateTime<Utc>,
}

/// One record per completed or failed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub cycle_id: Uuid,
    pub cycle_timestamp: DateTime<Utc>,
    pub status: SyncStatus,
    pub accounts_count: usize,
    pub transactions_count: usize,
    pub matched_count: usize,
    pub suggested_count: usize,
    pub errors: Vec<String>,
}

impl From<&SyncResult> for AuditRecord {
    fn from(r: &SyncResult) -> Self {
        let mut errors = r.errors.clone();
        if let Some(e) = &r.error {
            errors.insert(0, e.clone());
        }
        Self {
            cycle_id: r.cycle_id,
            cycle_timestamp: r.started_at,
            status: r.status,
            accounts_count: r.accounts_refreshed,
            transactions_count: r.transactions_seen,
            matched_count: r.newly_matched,
            suggested_count: r.newly_suggested,
            errors,
        }
    }
}

//! Common test utilities for reconciliation-service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reconciliation_service::config::ReconciliationConfig;
use reconciliation_service::models::{
    Account, AuditRecord, Balance, Counterparty, Direction, InvoiceCandidate, InvoiceKind,
    MonthlyStats, Reconciliation, Transaction,
};
use reconciliation_service::services::{
    AccessGate, AlertEngine, AuditLog, AuditSink, AuthContext, BankingProvider, FetchError,
    Fetched, InvoiceSource, ReconciliationService,
};
use serde_json::{Value, json};
use reconciliation_service::startup::Application;
use rust_decimal::Decimal;
use service_core::config::Config as CommonConfig;
use service_core::error::AppError;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,reconciliation_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn account(id: &str, current: &str) -> Account {
    Account {
        account_id: id.to_string(),
        entity: "HYPERVISUAL".to_string(),
        currency: "CHF".to_string(),
        balance: Balance {
            current: dec(current),
            available: dec(current),
            pending_in: Decimal::ZERO,
            pending_out: Decimal::ZERO,
        },
        monthly_stats: MonthlyStats::default(),
    }
}

pub fn credit(
    id: &str,
    account_id: &str,
    amount: &str,
    counterparty: &str,
    created_at: DateTime<Utc>,
) -> Transaction {
    Transaction {
        transaction_id: id.to_string(),
        account_id: account_id.to_string(),
        direction: Direction::Credit,
        amount: dec(amount),
        currency: "CHF".to_string(),
        created_at,
        completed_at: Some(created_at),
        counterparty: Counterparty {
            name: counterparty.to_string(),
            ..Counterparty::default()
        },
        reference: None,
        description: None,
        category: None,
        subcategory: None,
        reconciliation: Reconciliation::default(),
    }
}

pub fn debit(
    id: &str,
    account_id: &str,
    amount: &str,
    counterparty: &str,
    created_at: DateTime<Utc>,
) -> Transaction {
    Transaction {
        direction: Direction::Debit,
        ..credit(id, account_id, amount, counterparty, created_at)
    }
}

pub fn invoice(id: &str, amount: &str, client: &str, date: NaiveDate) -> InvoiceCandidate {
    InvoiceCandidate {
        invoice_id: id.to_string(),
        kind: InvoiceKind::Receivable,
        amount: dec(amount),
        client: client.to_string(),
        date,
        reference: None,
    }
}

/// Supplier invoice, settled by a debit.
pub fn payable(id: &str, amount: &str, supplier: &str, date: NaiveDate) -> InvoiceCandidate {
    InvoiceCandidate {
        kind: InvoiceKind::Payable,
        ..invoice(id, amount, supplier, date)
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// The reference pair: exact amount, exact client, same day. Scores 0.90.
pub fn rolex_transaction() -> Transaction {
    credit("tx-rolex", "acc-1", "13462.00", "Rolex SA", at(2025, 1, 20, 9))
}

pub fn rolex_invoice() -> InvoiceCandidate {
    invoice("INV-2025-001", "13462.00", "Rolex SA", day(2025, 1, 20))
}

// ============================================================================
// Collaborator fakes
// ============================================================================

/// Banking collaborator backed by mutable in-memory data.
#[derive(Default)]
pub struct FakeBank {
    accounts: Mutex<Vec<Account>>,
    transactions: Mutex<Vec<Transaction>>,
    failure: Mutex<Option<FetchError>>,
    transient_failures: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    hold: Mutex<Option<Arc<Notify>>>,
    last_since: Mutex<Option<DateTime<Utc>>>,
    transaction_calls: Mutex<Vec<(Vec<String>, Option<DateTime<Utc>>)>>,
    account_calls: AtomicUsize,
}

impl FakeBank {
    pub fn new(accounts: Vec<Account>, transactions: Vec<Transaction>) -> Arc<Self> {
        let bank = Self::default();
        *bank.accounts.lock().unwrap() = accounts;
        *bank.transactions.lock().unwrap() = transactions;
        Arc::new(bank)
    }

    pub fn set_accounts(&self, accounts: Vec<Account>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    pub fn set_transactions(&self, transactions: Vec<Transaction>) {
        *self.transactions.lock().unwrap() = transactions;
    }

    /// Every call fails with `err` until cleared.
    pub fn fail_with(&self, err: Option<FetchError>) {
        *self.failure.lock().unwrap() = err;
    }

    /// The next `n` account listings fail with a retryable error.
    pub fn fail_transiently(&self, n: usize) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Account listings block until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }

    pub fn last_since(&self) -> Option<DateTime<Utc>> {
        *self.last_since.lock().unwrap()
    }

    /// Account ids and cursor of every transaction listing, oldest first.
    pub fn transaction_calls(&self) -> Vec<(Vec<String>, Option<DateTime<Utc>>)> {
        self.transaction_calls.lock().unwrap().clone()
    }

    pub fn clear_transaction_calls(&self) {
        self.transaction_calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl BankingProvider for FakeBank {
    async fn list_accounts(&self, _entity: Option<&str>) -> Result<Fetched<Account>, FetchError> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);

        let hold = self.hold.lock().unwrap().take();
        if let Some(notify) = hold {
            notify.notified().await;
        }

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.lock().unwrap().clone();
        if let Some(err) = failure {
            return Err(err);
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(FetchError::Transport("connection reset".to_string()));
        }

        Ok(self.accounts.lock().unwrap().clone().into())
    }

    async fn list_transactions(
        &self,
        account_ids: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<Fetched<Transaction>, FetchError> {
        *self.last_since.lock().unwrap() = since;
        self.transaction_calls
            .lock()
            .unwrap()
            .push((account_ids.to_vec(), since));

        let transactions: Vec<Transaction> = self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| account_ids.contains(&t.account_id))
            .cloned()
            .collect();
        Ok(transactions.into())
    }
}

#[derive(Default)]
pub struct FakeInvoices {
    invoices: Mutex<Vec<InvoiceCandidate>>,
}

impl FakeInvoices {
    pub fn new(invoices: Vec<InvoiceCandidate>) -> Arc<Self> {
        let source = Self::default();
        *source.invoices.lock().unwrap() = invoices;
        Arc::new(source)
    }

    pub fn set(&self, invoices: Vec<InvoiceCandidate>) {
        *self.invoices.lock().unwrap() = invoices;
    }
}

#[async_trait]
impl InvoiceSource for FakeInvoices {
    async fn list_open_invoices(
        &self,
        _entity: Option<&str>,
    ) -> Result<Fetched<InvoiceCandidate>, FetchError> {
        Ok(self.invoices.lock().unwrap().clone().into())
    }
}

/// Audit sink whose writes always fail.
pub struct BrokenAudit;

#[async_trait]
impl AuditSink for BrokenAudit {
    async fn record(&self, _record: AuditRecord) -> anyhow::Result<()> {
        anyhow::bail!("audit store unavailable")
    }

    async fn recent(&self, _limit: usize) -> Vec<AuditRecord> {
        Vec::new()
    }
}

/// Gate that refuses every capability.
pub struct DenyAll;

#[async_trait]
impl AccessGate for DenyAll {
    async fn require_capability(
        &self,
        _headers: &HeaderMap,
        capability: &str,
    ) -> Result<AuthContext, AppError> {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Missing capability: {}",
            capability
        )))
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Test configuration: ephemeral port, scheduler off, fast fetch budget.
pub fn test_config(overrides: &[(&str, &str)]) -> ReconciliationConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("BANKING_API_URL".to_string(), "http://bank.invalid".to_string()),
        ("INVOICE_API_URL".to_string(), "http://invoices.invalid".to_string()),
        ("SYNC_INTERVAL".to_string(), "0".to_string()),
        ("FETCH_TIMEOUT_SECS".to_string(), "5".to_string()),
        ("FETCH_MAX_RETRIES".to_string(), "0".to_string()),
        // Fixtures are dated early 2025.
        ("ALERT_LOOKBACK_DAYS".to_string(), "0".to_string()),
        ("LEDGER_RETENTION_DAYS".to_string(), "0".to_string()),
    ]);
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }

    let common = CommonConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
    };

    ReconciliationConfig::from_lookup(common, |k| vars.get(k).cloned())
        .expect("test configuration must be valid")
}

pub fn build_service(
    config: &ReconciliationConfig,
    bank: Arc<dyn BankingProvider>,
    invoices: Arc<dyn InvoiceSource>,
    audit: Arc<dyn AuditSink>,
) -> Arc<ReconciliationService> {
    init_tracing();
    Arc::new(ReconciliationService::new(
        bank,
        invoices,
        audit,
        config.engine(),
        AlertEngine::new(config.alert_thresholds()),
        config.service_settings(),
    ))
}

/// Service with default test configuration and an in-memory audit log.
pub fn service_with(
    bank: Arc<FakeBank>,
    invoices: Arc<FakeInvoices>,
) -> (Arc<ReconciliationService>, Arc<AuditLog>) {
    let audit = Arc::new(AuditLog::new());
    let service = build_service(&test_config(&[]), bank, invoices, audit.clone());
    (service, audit)
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub service: Arc<ReconciliationService>,
    pub shutdown: CancellationToken,
    pub client: reqwest::Client,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Spawn the HTTP application on an ephemeral port.
pub async fn spawn_app(
    bank: Arc<FakeBank>,
    invoices: Arc<FakeInvoices>,
    gate: Arc<dyn AccessGate>,
) -> TestApp {
    init_tracing();

    let app = Application::build_with(
        test_config(&[]),
        bank,
        invoices,
        Arc::new(AuditLog::new()),
        gate,
    )
    .await
    .expect("Failed to build application");

    let address = format!("http://127.0.0.1:{}", app.port());
    let service = app.service();
    let shutdown = app.shutdown_token();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    TestApp {
        address,
        service,
        shutdown,
        client: reqwest::Client::new(),
    }
}

// ============================================================================
// Mock upstream
// ============================================================================

/// Raw listings served by [`spawn_mock_upstream`], one page each.
#[derive(Clone, Default)]
pub struct UpstreamData {
    pub accounts: Vec<Value>,
    pub transactions: Vec<Value>,
    pub invoices: Vec<Value>,
    /// Every response waits this long first.
    pub delay: Option<Duration>,
}

impl UpstreamData {
    async fn page(&self, items: &[Value]) -> Json<Value> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Json(json!({ "data": items }))
    }
}

/// Banking and invoicing APIs served over real HTTP.
pub struct MockUpstream {
    pub address: String,
    shutdown: CancellationToken,
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn spawn_mock_upstream(data: UpstreamData) -> MockUpstream {
    let router = Router::new()
        .route(
            "/accounts",
            get(|State(d): State<Arc<UpstreamData>>| async move { d.page(&d.accounts).await }),
        )
        .route(
            "/transactions",
            get(|State(d): State<Arc<UpstreamData>>| async move { d.page(&d.transactions).await }),
        )
        .route(
            "/invoices/open",
            get(|State(d): State<Arc<UpstreamData>>| async move { d.page(&d.invoices).await }),
        )
        .with_state(Arc::new(data));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock upstream");
    let address = format!("http://{}", listener.local_addr().unwrap());

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .ok();
    });

    MockUpstream { address, shutdown }
}

pub fn account_json(id: &str, current: &str) -> Value {
    json!({
        "account_id": id,
        "entity": "HYPERVISUAL",
        "currency": "CHF",
        "balance": { "current": current, "available": current }
    })
}

pub fn transaction_json(id: &str, account_id: &str, direction: &str, amount: &str, counterparty: &str, created_at: &str) -> Value {
    json!({
        "transaction_id": id,
        "account_id": account_id,
        "direction": direction,
        "amount": amount,
        "currency": "CHF",
        "created_at": created_at,
        "completed_at": created_at,
        "counterparty": { "name": counterparty }
    })
}

pub fn invoice_json(id: &str, amount: &str, client: &str, date: &str) -> Value {
    json!({
        "invoice_id": id,
        "amount": amount,
        "client": client,
        "date": date
    })
}

//! Services module for reconciliation-service.

pub mod access;
pub mod alerts;
pub mod audit;
pub mod banking;
pub mod errors;
mod http_client;
pub mod invoices;
pub mod metrics;
pub mod reconciliation;
pub mod scheduler;

pub use access::{AccessGate, AuthContext, CapabilityGate, capabilities};
pub use alerts::{AlertEngine, AlertThresholds};
pub use audit::{AuditLog, AuditSink};
pub use banking::{BankSnapshot, BankingProvider, HttpBankingClient};
pub use errors::{FetchError, Fetched};
pub use invoices::{HttpInvoiceClient, InvoiceSource};
pub use metrics::{get_metrics, http_metrics_middleware, init_metrics, record_error};
pub use reconciliation::{HistoryFilter, ReconciliationService, ServiceSettings, VerdictError};
pub use scheduler::SyncScheduler;

pub mod health;
pub mod ledger;
pub mod overrides;
pub mod sync;

pub use health::{health_check, metrics_handler, readiness_check};
pub use ledger::{
    cash_flow, history, list_accounts, list_alerts, list_audit, list_transactions, summary,
};
pub use overrides::{accept_suggestion, reject_suggestion, set_verdict, undo_match};
pub use sync::{sync_status, trigger_sync};

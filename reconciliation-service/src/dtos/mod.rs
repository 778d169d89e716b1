//! Request and response bodies for the HTTP surface.

use crate::models::{MatchMethod, ReconciliationStatus};
use crate::services::HistoryFilter;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct TransactionListParams {
    pub status: Option<String>,
}

impl TransactionListParams {
    pub fn status_filter(&self) -> Result<Option<ReconciliationStatus>, String> {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .transpose()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditListParams {
    pub limit: Option<usize>,
}

impl AuditListParams {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, crate::services::audit::AUDIT_HISTORY)
    }
}

/// `from`/`to` are inclusive calendar days (UTC).
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub method: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl HistoryParams {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 1000;

    pub fn filter(&self) -> Result<HistoryFilter, String> {
        check_range(self.from, self.to)?;
        let method = self
            .method
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(str::parse::<MatchMethod>)
            .transpose()?;

        Ok(HistoryFilter {
            from: self.from.map(|d| d.and_time(NaiveTime::MIN).and_utc()),
            to: self
                .to
                .and_then(|d| d.succ_opt())
                .map(|d| d.and_time(NaiveTime::MIN).and_utc() - chrono::Duration::nanoseconds(1)),
            method,
            limit: self
                .limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CashFlowParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl CashFlowParams {
    pub fn validate(&self) -> Result<(), String> {
        check_range(self.from, self.to)
    }
}

fn check_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(), String> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => {
            Err(format!("from ({}) is after to ({})", from, to))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ManualVerdictRequest {
    pub status: ReconciliationStatus,
    #[serde(default)]
    pub invoice_id: Option<String>,
}

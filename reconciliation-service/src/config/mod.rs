//! Configuration module for reconciliation-service.

use crate::matching::{MatchScorer, ReconciliationEngine, VerdictPolicy};
use crate::services::{AlertThresholds, ServiceSettings};
use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub matching: MatchingConfig,
    pub alerts: AlertConfig,
    pub sync: SyncConfig,
    pub banking: BankingConfig,
    pub invoices: InvoiceConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    pub auto_match_threshold: Decimal,
    pub suggested_threshold: Decimal,
    pub date_proximity_days: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    pub low_balance_threshold: Decimal,
    pub unusual_amount_threshold: Decimal,
    pub duplicate_window_days: u32,
    /// Zero evaluates the whole ledger.
    pub lookback_days: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Zero disables the scheduler.
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub fetch_max_retries: u32,
    pub entity_filter: Option<String>,
    /// Zero keeps settled transactions forever.
    pub ledger_retention_days: u32,
}

#[derive(Debug, Clone)]
pub struct BankingConfig {
    pub url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvoiceConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub auth_service_endpoint: String,
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Parse and validate settings from an arbitrary key lookup.
    ///
    /// Blank values count as unset. Present values must parse.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            common,
            service_name: get("SERVICE_NAME")
                .unwrap_or_else(|| "reconciliation-service".to_string()),
            service_version: get("SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            otlp_endpoint: get("OTLP_ENDPOINT"),
            matching: MatchingConfig {
                auto_match_threshold: parse(&get, "AUTO_MATCH_THRESHOLD", Decimal::new(70, 2))?,
                suggested_threshold: parse(&get, "SUGGESTED_THRESHOLD", Decimal::new(50, 2))?,
                date_proximity_days: parse(&get, "DATE_PROXIMITY_DAYS", 3)?,
            },
            alerts: AlertConfig {
                low_balance_threshold: parse(&get, "LOW_BALANCE_THRESHOLD", Decimal::from(100_000))?,
                unusual_amount_threshold: parse(
                    &get,
                    "UNUSUAL_AMOUNT_THRESHOLD",
                    Decimal::from(50_000),
                )?,
                duplicate_window_days: parse(&get, "DUPLICATE_WINDOW_DAYS", 7)?,
                lookback_days: parse(&get, "ALERT_LOOKBACK_DAYS", 90)?,
            },
            sync: SyncConfig {
                interval: Duration::from_secs(parse(&get, "SYNC_INTERVAL", 300)?),
                fetch_timeout: Duration::from_secs(parse(&get, "FETCH_TIMEOUT_SECS", 30)?),
                fetch_max_retries: parse(&get, "FETCH_MAX_RETRIES", 2)?,
                entity_filter: get("ENTITY_FILTER"),
                ledger_retention_days: parse(&get, "LEDGER_RETENTION_DAYS", 365)?,
            },
            banking: BankingConfig {
                url: get("BANKING_API_URL").ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("BANKING_API_URL is required"))
                })?,
                token: get("BANKING_API_TOKEN"),
            },
            invoices: InvoiceConfig {
                url: get("INVOICE_API_URL").ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("INVOICE_API_URL is required"))
                })?,
            },
            auth: AuthConfig {
                auth_service_endpoint: get("AUTH_SERVICE_ENDPOINT").unwrap_or_default(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let unit = Decimal::ZERO..=Decimal::ONE;
        let m = &self.matching;

        if !unit.contains(&m.auto_match_threshold) {
            return Err(invalid("AUTO_MATCH_THRESHOLD", "must be within [0, 1]"));
        }
        if !unit.contains(&m.suggested_threshold) {
            return Err(invalid("SUGGESTED_THRESHOLD", "must be within [0, 1]"));
        }
        if m.suggested_threshold > m.auto_match_threshold {
            return Err(invalid(
                "SUGGESTED_THRESHOLD",
                "must not exceed AUTO_MATCH_THRESHOLD",
            ));
        }
        if self.alerts.low_balance_threshold.is_sign_negative() {
            return Err(invalid("LOW_BALANCE_THRESHOLD", "must not be negative"));
        }
        if self.alerts.unusual_amount_threshold.is_sign_negative() {
            return Err(invalid("UNUSUAL_AMOUNT_THRESHOLD", "must not be negative"));
        }
        if self.sync.fetch_timeout.is_zero() {
            return Err(invalid("FETCH_TIMEOUT_SECS", "must be greater than 0"));
        }

        Ok(())
    }

    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            MatchScorer::new(self.matching.date_proximity_days),
            VerdictPolicy::new(
                self.matching.auto_match_threshold,
                self.matching.suggested_threshold,
            ),
        )
    }

    pub fn alert_thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            low_balance: self.alerts.low_balance_threshold,
            unusual_amount: self.alerts.unusual_amount_threshold,
            duplicate_window_days: self.alerts.duplicate_window_days,
            lookback_days: self.alerts.lookback_days,
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            entity_filter: self.sync.entity_filter.clone(),
            fetch_timeout: self.sync.fetch_timeout,
            retry: RetryConfig::with_max_retries(self.sync.fetch_max_retries),
            ledger_retention_days: self.sync.ledger_retention_days,
        }
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| invalid(key, &format!("'{}' is not valid: {}", raw, e))),
    }
}

fn invalid(key: &str, reason: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("{} {}", key, reason))
}

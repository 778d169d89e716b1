//! Banking collaborator: account and transaction snapshots.

use super::errors::{FetchError, Fetched};
use super::http_client::JsonClient;
use crate::models::{Account, Balance, Counterparty, Direction, MonthlyStats, Transaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

#[async_trait]
pub trait BankingProvider: Send + Sync {
    async fn list_accounts(&self, entity_filter: Option<&str>)
    -> Result<Fetched<Account>, FetchError>;

    async fn list_transactions(
        &self,
        account_ids: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<Fetched<Transaction>, FetchError>;
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BalanceDto {
    pub current: Decimal,
    pub available: Decimal,
    #[serde(default)]
    pub pending_in: Decimal,
    #[serde(default)]
    pub pending_out: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthlyStatsDto {
    #[serde(default)]
    pub total_in: Decimal,
    #[serde(default)]
    pub total_out: Decimal,
    #[serde(default)]
    pub net_flow: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AccountDto {
    pub account_id: String,
    pub entity: String,
    pub currency: String,
    pub balance: BalanceDto,
    #[serde(default)]
    pub monthly_stats: Option<MonthlyStatsDto>,
}

#[derive(Debug, Deserialize)]
pub struct CounterpartyDto {
    #[serde(default)]
    pub name: String,
    pub account_number: Option<String>,
    pub bank: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionDto {
    pub transaction_id: String,
    pub account_id: String,
    pub direction: String,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counterparty: Option<CounterpartyDto>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

impl TryFrom<AccountDto> for Account {
    type Error = FetchError;

    fn try_from(dto: AccountDto) -> Result<Self, Self::Error> {
        if dto.account_id.trim().is_empty() {
            return Err(FetchError::malformed("account with empty account_id"));
        }
        if dto.currency.trim().is_empty() {
            return Err(FetchError::malformed(format!(
                "account {} has no currency",
                dto.account_id
            )));
        }
        if dto.balance.pending_in.is_sign_negative() || dto.balance.pending_out.is_sign_negative() {
            return Err(FetchError::malformed(format!(
                "account {} has negative pending amounts",
                dto.account_id
            )));
        }

        let stats = dto.monthly_stats.unwrap_or_default();

        Ok(Account {
            account_id: dto.account_id,
            entity: dto.entity,
            currency: dto.currency,
            balance: Balance {
                current: dto.balance.current,
                available: dto.balance.available,
                pending_in: dto.balance.pending_in,
                pending_out: dto.balance.pending_out,
            },
            monthly_stats: MonthlyStats {
                total_in: stats.total_in,
                total_out: stats.total_out,
                net_flow: stats.net_flow,
            },
        })
    }
}

impl TryFrom<TransactionDto> for Transaction {
    type Error = FetchError;

    fn try_from(dto: TransactionDto) -> Result<Self, Self::Error> {
        if dto.transaction_id.trim().is_empty() {
            return Err(FetchError::malformed("transaction with empty transaction_id"));
        }
        if dto.account_id.trim().is_empty() {
            return Err(FetchError::malformed(format!(
                "transaction {} has no account_id",
                dto.transaction_id
            )));
        }
        let direction = Direction::parse(&dto.direction).ok_or_else(|| {
            FetchError::malformed(format!(
                "transaction {} has unknown direction '{}'",
                dto.transaction_id, dto.direction
            ))
        })?;
        if dto.amount <= Decimal::ZERO {
            return Err(FetchError::malformed(format!(
                "transaction {} has non-positive amount {}",
                dto.transaction_id, dto.amount
            )));
        }
        if dto.currency.trim().is_empty() {
            return Err(FetchError::malformed(format!(
                "transaction {} has no currency",
                dto.transaction_id
            )));
        }

        let counterparty = dto
            .counterparty
            .map(|c| Counterparty {
                name: c.name,
                account_number: c.account_number,
                bank: c.bank,
            })
            .unwrap_or_default();

        Ok(Transaction {
            transaction_id: dto.transaction_id,
            account_id: dto.account_id,
            direction,
            amount: dto.amount,
            currency: dto.currency,
            created_at: dto.created_at,
            completed_at: dto.completed_at,
            counterparty,
            reference: dto.reference.filter(|r| !r.trim().is_empty()),
            description: dto.description,
            category: dto.category,
            subcategory: dto.subcategory,
            reconciliation: Default::default(),
        })
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// A complete fetch from the banking collaborator.
#[derive(Debug, Clone, Default)]
pub struct BankSnapshot {
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

impl BankSnapshot {
    /// Cross-record checks that a single record cannot perform on its own.
    ///
    /// Keeps the first occurrence of a duplicated identifier and drops
    /// transactions whose account is not in the snapshot. Returns a reason
    /// for every record removed.
    pub fn prune(&mut self) -> Vec<String> {
        let mut rejected = Vec::new();

        let mut account_ids = HashSet::new();
        self.accounts.retain(|account| {
            let first = account_ids.insert(account.account_id.clone());
            if !first {
                rejected.push(format!("duplicate account {}", account.account_id));
            }
            first
        });

        let mut transaction_ids = HashSet::new();
        self.transactions.retain(|tx| {
            if !account_ids.contains(&tx.account_id) {
                rejected.push(format!(
                    "transaction {} references unknown account {}",
                    tx.transaction_id, tx.account_id
                ));
                return false;
            }
            let first = transaction_ids.insert(tx.transaction_id.clone());
            if !first {
                rejected.push(format!("duplicate transaction {}", tx.transaction_id));
            }
            first
        });

        rejected
    }
}

// ============================================================================
// HTTP adapter
// ============================================================================

pub struct HttpBankingClient {
    http: JsonClient,
}

impl HttpBankingClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            http: JsonClient::new(base_url, token, timeout)?,
        })
    }
}

#[async_trait]
impl BankingProvider for HttpBankingClient {
    #[tracing::instrument(skip(self), fields(base_url = %self.http.base_url()))]
    async fn list_accounts(
        &self,
        entity_filter: Option<&str>,
    ) -> Result<Fetched<Account>, FetchError> {
        let mut query = Vec::new();
        if let Some(entity) = entity_filter {
            query.push(("entity", entity.to_string()));
        }

        let raw = self.http.get_all("/accounts", &query).await?;
        Ok(Fetched::decode::<AccountDto>("account", raw))
    }

    #[tracing::instrument(skip(self, account_ids), fields(accounts = account_ids.len()))]
    async fn list_transactions(
        &self,
        account_ids: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<Fetched<Transaction>, FetchError> {
        if account_ids.is_empty() {
            return Ok(Vec::new().into());
        }

        let mut query: Vec<(&str, String)> = account_ids
            .iter()
            .map(|id| ("account_id", id.clone()))
            .collect();
        if let Some(since) = since {
            query.push(("since", since.to_rfc3339()));
        }

        let raw = self.http.get_all("/transactions", &query).await?;
        Ok(Fetched::decode::<TransactionDto>("transaction", raw))
    }
}

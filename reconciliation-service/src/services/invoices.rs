//! Invoice collaborator: open invoices eligible for matching.

use super::errors::{FetchError, Fetched};
use super::http_client::JsonClient;
use crate::models::{InvoiceCandidate, InvoiceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait InvoiceSource: Send + Sync {
    async fn list_open_invoices(
        &self,
        entity_filter: Option<&str>,
    ) -> Result<Fetched<InvoiceCandidate>, FetchError>;
}

#[derive(Debug, Deserialize)]
pub struct InvoiceDto {
    pub invoice_id: String,
    /// `receivable` (default) or `payable`.
    #[serde(default)]
    pub kind: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub client: String,
    pub date: NaiveDate,
    pub reference: Option<String>,
}

impl TryFrom<InvoiceDto> for InvoiceCandidate {
    type Error = FetchError;

    fn try_from(dto: InvoiceDto) -> Result<Self, Self::Error> {
        if dto.invoice_id.trim().is_empty() {
            return Err(FetchError::malformed("invoice with empty invoice_id"));
        }
        let kind = match dto.kind.as_deref() {
            None | Some("") => InvoiceKind::Receivable,
            Some(raw) => InvoiceKind::parse(raw).ok_or_else(|| {
                FetchError::malformed(format!(
                    "invoice {} has unknown kind '{}'",
                    dto.invoice_id, raw
                ))
            })?,
        };
        if dto.amount <= Decimal::ZERO {
            return Err(FetchError::malformed(format!(
                "invoice {} has non-positive amount {}",
                dto.invoice_id, dto.amount
            )));
        }

        Ok(InvoiceCandidate {
            invoice_id: dto.invoice_id,
            kind,
            amount: dto.amount,
            client: dto.client,
            date: dto.date,
            reference: dto.reference.filter(|r| !r.trim().is_empty()),
        })
    }
}

pub struct HttpInvoiceClient {
    http: JsonClient,
}

impl HttpInvoiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            http: JsonClient::new(base_url, None, timeout)?,
        })
    }
}

#[async_trait]
impl InvoiceSource for HttpInvoiceClient {
    #[tracing::instrument(skip(self), fields(base_url = %self.http.base_url()))]
    async fn list_open_invoices(
        &self,
        entity_filter: Option<&str>,
    ) -> Result<Fetched<InvoiceCandidate>, FetchError> {
        let mut query = Vec::new();
        if let Some(entity) = entity_filter {
            query.push(("entity", entity.to_string()));
        }

        let raw = self.http.get_all("/invoices/open", &query).await?;
        Ok(Fetched::decode::<InvoiceDto>("invoice", raw))
    }
}

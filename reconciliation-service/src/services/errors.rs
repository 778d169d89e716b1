//! Errors raised at the collaborator boundary.

use serde::de::DeserializeOwned;
use service_core::retry::Retryable;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Message without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Malformed(msg) | Self::Transport(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Status { code, .. } => *code == 429 || *code >= 500,
            Self::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// A listing whose records were validated one at a time.
///
/// A bad record lands in `rejected` with a reason; it never fails the listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub records: Vec<T>,
    pub rejected: Vec<String>,
}

impl<T> Fetched<T> {
    pub fn new(records: Vec<T>, rejected: Vec<String>) -> Self {
        Self { records, rejected }
    }

    /// Decode each raw record into the wire type `D`, then validate it into `T`.
    pub fn decode<D>(kind: &str, raw: Vec<serde_json::Value>) -> Self
    where
        D: DeserializeOwned,
        T: TryFrom<D, Error = FetchError>,
    {
        let mut records = Vec::with_capacity(raw.len());
        let mut rejected = Vec::new();

        for (index, value) in raw.into_iter().enumerate() {
            let converted = serde_json::from_value::<D>(value)
                .map_err(|e| format!("{} #{}: {}", kind, index, e))
                .and_then(|dto| T::try_from(dto).map_err(|e| e.detail()));

            match converted {
                Ok(record) => records.push(record),
                Err(reason) => {
                    tracing::warn!(kind, reason = %reason, "Rejected malformed record");
                    rejected.push(reason);
                }
            }
        }

        Self { records, rejected }
    }
}

impl<T> From<Vec<T>> for Fetched<T> {
    fn from(records: Vec<T>) -> Self {
        Self::new(records, Vec::new())
    }
}

//! Data provider abstraction.
//!
//! Defines the `DataProvider` trait that market data sources implement. The
//! screening engine only ever sees `Result` values from this boundary.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use super::{FundFlowRecord, MarketSnapshot, PriceHistory, SecurityId, ShareholderTable};
use crate::screener::quarters::QuarterEnd;

// ============================================================================
// Provider Error
// ============================================================================

/// Errors returned by data providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {url}")]
    Http { status: u16, url: String },

    /// Response could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// The source answered but holds no data for the request
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// The call exceeded its deadline
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Check if the error is transient (worth one more attempt)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

// ============================================================================
// Data Provider Trait
// ============================================================================

/// Source of every table the screener needs.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Provider name for logging (e.g., "eastmoney")
    fn name(&self) -> &'static str;

    /// Shareholder counts published for one quarter end.
    async fn fetch_shareholder_counts(
        &self,
        period: QuarterEnd,
    ) -> Result<ShareholderTable, ProviderError>;

    /// Spot table for the whole universe, one row per security.
    async fn fetch_market_snapshot(&self) -> Result<MarketSnapshot, ProviderError>;

    /// Daily bars between `start` and `end` inclusive, oldest first.
    async fn fetch_price_history(
        &self,
        id: &SecurityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory, ProviderError>;

    /// Daily main-force fund flow records.
    async fn fetch_fund_flow(&self, id: &SecurityId) -> Result<Vec<FundFlowRecord>, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_recoverable() {
        assert!(ProviderError::Network("reset".into()).is_recoverable());
        assert!(ProviderError::Timeout(30).is_recoverable());
        assert!(ProviderError::Http { status: 503, url: "x".into() }.is_recoverable());
        assert!(ProviderError::Http { status: 429, url: "x".into() }.is_recoverable());
        assert!(!ProviderError::Http { status: 404, url: "x".into() }.is_recoverable());
        assert!(!ProviderError::Parse("bad json".into()).is_recoverable());
        assert!(!ProviderError::DataNotAvailable("empty".into()).is_recoverable());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Timeout(30);
        assert_eq!(err.to_string(), "Timed out after 30s");

        let err = ProviderError::Network("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }
}

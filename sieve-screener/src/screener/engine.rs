//! Screener engine module.
//!
//! The central orchestrator for a screening pass: resolve quarters, load the
//! run-wide tables, pre-filter each security from them, fetch per-security
//! data for the survivors and aggregate all six criteria.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::{stream, FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use sieve_common::{Config, CriteriaConfig};

use crate::data::{
    shared_limiter, DataProvider, FundFlowRecord, MarketSnapshot, MarketSnapshotRow, PriceHistory,
    ProviderError, SecurityId, SharedRateLimiter, ShareholderSnapshotSet,
};

use super::criteria::{
    fail_closed, Criterion, CriterionOutcome, EvalError, FilterResult, FilterStage,
    SecurityEvaluation,
};
use super::indicators::{ma_alignment, ten_day_gain_within_limits};
use super::predicates::{main_inflow_above, market_cap_in_range, turnover_in_range};
use super::quarters::{recent_quarter_ends, QuarterEnd};
use super::shareholder::{holder_count_declining, REQUIRED_PERIODS};

/// Attempts per run-wide table before a transient failure is final.
const TABLE_FETCH_ATTEMPTS: u32 = 2;

// ============================================================================
// Errors
// ============================================================================

/// Conditions that abort a whole run.
#[derive(Debug, Error)]
pub enum ScreenerError {
    #[error("Insufficient shareholder data: {available} of {required} periods available")]
    InsufficientShareholderData { available: usize, required: usize },

    #[error("Market snapshot unavailable: {0}")]
    MarketSnapshotUnavailable(String),
}

// ============================================================================
// Screening Result
// ============================================================================

/// A security that passed all six criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResult {
    #[serde(rename = "代码")]
    pub security_id: SecurityId,
    #[serde(rename = "名称")]
    pub name: String,
    #[serde(rename = "当前价")]
    pub price: Option<f64>,
    /// Total market cap (亿)
    #[serde(rename = "市值")]
    pub market_cap: f64,
    /// Turnover rate (%)
    #[serde(rename = "换手率")]
    pub turnover_rate: f64,
}

impl ScreeningResult {
    /// Build from the snapshot row; `None` when cap or turnover is absent.
    fn from_row(row: &MarketSnapshotRow) -> Option<Self> {
        Some(Self {
            security_id: row.security_id.clone(),
            name: row.name.clone(),
            price: row.last_price,
            market_cap: row.market_cap_hundred_million()?,
            turnover_rate: row.turnover_rate_pct?,
        })
    }
}

// ============================================================================
// Screening Report
// ============================================================================

/// Everything one screening pass produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningReport {
    /// Run ID
    pub id: String,
    /// Date the quarter window and price history were anchored on
    pub reference_date: NaiveDate,
    /// Quarter ends requested, most recent first
    pub quarters: Vec<QuarterEnd>,
    /// Selected securities, in universe order
    pub results: Vec<ScreeningResult>,
    /// Trace of every security that reached full evaluation
    pub evaluations: Vec<SecurityEvaluation>,
    /// Funnel statistics
    pub filter_results: Vec<FilterResult>,
    /// Securities in the universe
    pub total_scanned: usize,
    /// Securities whose evaluation faulted
    pub faulted: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl ScreeningReport {
    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Screened {} stocks in {:.1}s: {} selected ({:.2}%)",
            self.total_scanned,
            self.duration_secs,
            self.results.len(),
            if self.total_scanned > 0 {
                (self.results.len() as f64 / self.total_scanned as f64) * 100.0
            } else {
                0.0
            }
        )
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

// ============================================================================
// Per-security State
// ============================================================================

/// Criteria answerable from the run-wide tables alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefilterOutcome {
    pub turnover: bool,
    pub market_cap: bool,
    pub shareholder_decline: bool,
}

impl PrefilterOutcome {
    pub fn evaluate(
        row: &MarketSnapshotRow,
        shareholders: &ShareholderSnapshotSet,
        criteria: &CriteriaConfig,
    ) -> Self {
        let id = &row.security_id;
        let turnover = fail_closed(Criterion::TurnoverRate, id, turnover_in_range(Some(row), criteria));
        let market_cap = fail_closed(Criterion::MarketCap, id, market_cap_in_range(Some(row), criteria));
        // Cheap checks first; the shareholder lookup only runs when they pass
        let shareholder_decline = turnover && market_cap && holder_count_declining(id, shareholders);

        Self {
            turnover,
            market_cap,
            shareholder_decline,
        }
    }

    pub fn passed(&self) -> bool {
        self.turnover && self.market_cap && self.shareholder_decline
    }
}

enum SecurityOutcome {
    Eliminated,
    Evaluated {
        evaluation: SecurityEvaluation,
        result: Option<ScreeningResult>,
    },
    Faulted,
}

// ============================================================================
// Screener Engine
// ============================================================================

/// The main screener engine.
///
/// Holds no state between runs; every call to [`ScreenerEngine::run`]
/// returns a fresh report.
pub struct ScreenerEngine<P: DataProvider> {
    provider: Arc<P>,
    criteria: CriteriaConfig,
    concurrency: usize,
    target_symbols: Vec<String>,
    history_lookback_days: i64,
    fetch_timeout: Duration,
    limiter: SharedRateLimiter,
}

impl<P: DataProvider> ScreenerEngine<P> {
    /// Create a new screener engine.
    pub fn new(provider: Arc<P>, config: &Config) -> Self {
        let limiter = shared_limiter(
            provider.name(),
            Duration::from_millis(config.data_source.request_interval_ms),
        );

        Self {
            provider,
            criteria: config.screener.criteria.clone(),
            concurrency: config.screener.concurrency.max(1),
            target_symbols: config.screener.target_symbols.clone(),
            history_lookback_days: config.data_source.history_lookback_days,
            fetch_timeout: Duration::from_secs(config.data_source.timeout_secs),
            limiter,
        }
    }

    /// Run one screening pass anchored on `reference_date`.
    pub async fn run(&self, reference_date: NaiveDate) -> Result<ScreeningReport, ScreenerError> {
        let started_at = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let quarters = recent_quarter_ends(reference_date);

        info!(
            run_id = %id,
            provider = self.provider.name(),
            reference_date = %reference_date,
            quarters = ?quarters.iter().map(QuarterEnd::label).collect::<Vec<_>>(),
            "Starting screening run"
        );

        let shareholders = self.load_shareholders(&quarters).await?;
        let snapshot = self.load_snapshot().await?;
        let snapshot_fetched_at = snapshot.fetched_at();
        let universe = snapshot.restrict_to(&self.target_symbols);
        let total_scanned = universe.len();
        info!(
            securities = total_scanned,
            fetched_at = %snapshot_fetched_at,
            "Universe loaded"
        );

        let outcomes: Vec<SecurityOutcome> = stream::iter(universe.rows())
            .map(|row| self.screen_security(row, &shareholders, reference_date))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut results = Vec::new();
        let mut evaluations = Vec::new();
        let mut faulted = 0;
        for outcome in outcomes {
            match outcome {
                SecurityOutcome::Eliminated => {}
                SecurityOutcome::Evaluated { evaluation, result } => {
                    evaluations.push(evaluation);
                    results.extend(result);
                }
                SecurityOutcome::Faulted => faulted += 1,
            }
        }

        let filter_results = vec![
            FilterResult::new(FilterStage::Input, total_scanned, total_scanned),
            FilterResult::new(FilterStage::Prefilter, total_scanned, evaluations.len()),
            FilterResult::new(FilterStage::FullEvaluation, evaluations.len(), results.len()),
        ];

        let completed_at = Utc::now();
        let duration_secs = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let report = ScreeningReport {
            id,
            reference_date,
            quarters: quarters.to_vec(),
            results,
            evaluations,
            filter_results,
            total_scanned,
            faulted,
            started_at,
            completed_at,
            duration_secs,
        };

        info!(run_id = %report.id, faulted, "{}", report.summary());
        Ok(report)
    }

    // ========================================================================
    // Internal Methods
    // ========================================================================

    async fn load_shareholders(
        &self,
        quarters: &[QuarterEnd],
    ) -> Result<ShareholderSnapshotSet, ScreenerError> {
        let mut set = ShareholderSnapshotSet::new();

        for quarter in quarters {
            let fetched = self
                .fetch_table("shareholder counts", || {
                    self.provider.fetch_shareholder_counts(*quarter)
                })
                .await;
            match fetched {
                Ok(table) if table.is_empty() => {
                    warn!(quarter = %quarter, "Shareholder table is empty, skipping");
                }
                Ok(table) => {
                    debug!(quarter = %quarter, rows = table.len(), "Loaded shareholder table");
                    set.push(table);
                }
                Err(e) => {
                    warn!(quarter = %quarter, error = %e, "Failed to fetch shareholder counts");
                }
            }
        }

        let available = set.period_count();
        if available < REQUIRED_PERIODS {
            return Err(ScreenerError::InsufficientShareholderData {
                available,
                required: REQUIRED_PERIODS,
            });
        }
        Ok(set)
    }

    async fn load_snapshot(&self) -> Result<MarketSnapshot, ScreenerError> {
        let snapshot = self
            .fetch_table("market snapshot", || self.provider.fetch_market_snapshot())
            .await
            .map_err(|e| ScreenerError::MarketSnapshotUnavailable(e.to_string()))?;

        if snapshot.is_empty() {
            return Err(ScreenerError::MarketSnapshotUnavailable(
                "provider returned an empty table".into(),
            ));
        }
        Ok(snapshot)
    }

    /// Evaluate one security, isolating any panic to that security.
    async fn screen_security(
        &self,
        row: &MarketSnapshotRow,
        shareholders: &ShareholderSnapshotSet,
        reference_date: NaiveDate,
    ) -> SecurityOutcome {
        let evaluation = AssertUnwindSafe(self.evaluate_security(row, shareholders, reference_date));
        match evaluation.catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(security = %row.security_id, "Evaluation panicked, skipping security");
                SecurityOutcome::Faulted
            }
        }
    }

    async fn evaluate_security(
        &self,
        row: &MarketSnapshotRow,
        shareholders: &ShareholderSnapshotSet,
        reference_date: NaiveDate,
    ) -> SecurityOutcome {
        let id = &row.security_id;
        let prefilter = PrefilterOutcome::evaluate(row, shareholders, &self.criteria);
        if !prefilter.passed() {
            return SecurityOutcome::Eliminated;
        }

        let (history, flows) = self.fetch_security_data(id, reference_date).await;

        let ma = history.clone().and_then(|h| ma_alignment(&h));
        let ten_day = history.and_then(|h| ten_day_gain_within_limits(&h, &self.criteria));
        let inflow = flows.and_then(|f| main_inflow_above(&f, &self.criteria));

        let outcome = |criterion: Criterion, passed: bool| CriterionOutcome { criterion, passed };
        let outcomes = vec![
            outcome(Criterion::ShareholderDecline, prefilter.shareholder_decline),
            outcome(Criterion::TurnoverRate, prefilter.turnover),
            outcome(Criterion::MaAlignment, fail_closed(Criterion::MaAlignment, id, ma)),
            outcome(Criterion::MarketCap, prefilter.market_cap),
            outcome(Criterion::TenDayReturn, fail_closed(Criterion::TenDayReturn, id, ten_day)),
            outcome(Criterion::MainFundInflow, fail_closed(Criterion::MainFundInflow, id, inflow)),
        ];

        let evaluation = SecurityEvaluation::new(id.clone(), row.name.clone(), outcomes);
        let result = if evaluation.passed() {
            info!(security = %id, name = %row.name, "Selected");
            ScreeningResult::from_row(row)
        } else {
            debug!(
                security = %id,
                failed = ?evaluation.failed_criteria().iter().map(Criterion::key).collect::<Vec<_>>(),
                "Rejected"
            );
            None
        };

        SecurityOutcome::Evaluated { evaluation, result }
    }

    async fn fetch_security_data(
        &self,
        id: &SecurityId,
        reference_date: NaiveDate,
    ) -> (Result<PriceHistory, EvalError>, Result<Vec<FundFlowRecord>, EvalError>) {
        let history = match history_start(reference_date, self.history_lookback_days) {
            Ok(start) => self
                .rate_limited(self.provider.fetch_price_history(id, start, reference_date))
                .await
                .map_err(|e| unavailable(id, "price history", e)),
            Err(e) => Err(e),
        };

        let flows = self
            .rate_limited(self.provider.fetch_fund_flow(id))
            .await
            .map_err(|e| unavailable(id, "fund flow", e));

        (history, flows)
    }

    /// Fetch a run-wide table, retrying once after a transient failure.
    async fn fetch_table<T, F, Fut>(&self, table: &str, fetch: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            match self.with_timeout(fetch()).await {
                Err(e) if e.is_recoverable() && attempt < TABLE_FETCH_ATTEMPTS => {
                    warn!(table, attempt, error = %e, "Transient failure, retrying");
                    self.limiter.acquire().await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn rate_limited<T, F>(&self, fetch: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        self.limiter.acquire().await;
        self.with_timeout(fetch).await
    }

    async fn with_timeout<T, F>(&self, fetch: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.fetch_timeout.as_secs())))
    }
}

/// First day of the price history window ending on `reference_date`.
fn history_start(reference_date: NaiveDate, lookback_days: i64) -> Result<NaiveDate, EvalError> {
    chrono::Duration::try_days(lookback_days)
        .and_then(|lookback| reference_date.checked_sub_signed(lookback))
        .ok_or_else(|| {
            EvalError::DataUnavailable(format!("history lookback of {lookback_days} days is out of range"))
        })
}

fn unavailable(id: &SecurityId, what: &str, e: ProviderError) -> EvalError {
    debug!(security = %id, error = %e, "Failed to fetch {}", what);
    EvalError::DataUnavailable(format!("{}: {}", what, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ShareholderSnapshot, ShareholderTable};

    fn row(turnover: f64, cap: f64) -> MarketSnapshotRow {
        MarketSnapshotRow {
            security_id: "600000".into(),
            name: "测试".into(),
            last_price: Some(12.3),
            change_pct: None,
            turnover_rate_pct: Some(turnover),
            total_market_cap: Some(cap),
            volume: None,
            amount: None,
        }
    }

    fn declining_set() -> ShareholderSnapshotSet {
        [(2024, 1, 80), (2023, 4, 90), (2023, 3, 100)]
            .into_iter()
            .map(|(y, q, n)| {
                let quarter = QuarterEnd::new(y, q);
                ShareholderTable::from_snapshots(
                    quarter,
                    vec![ShareholderSnapshot {
                        period_end: quarter.date(),
                        security_id: "600000".into(),
                        holder_count: n,
                    }],
                )
            })
            .collect()
    }

    #[test]
    fn test_prefilter_passes() {
        let outcome = PrefilterOutcome::evaluate(&row(5.0, 1e10), &declining_set(), &CriteriaConfig::default());
        assert!(outcome.passed());
    }

    #[test]
    fn test_prefilter_short_circuits_shareholders() {
        let outcome = PrefilterOutcome::evaluate(&row(50.0, 1e10), &declining_set(), &CriteriaConfig::default());
        assert!(!outcome.turnover);
        assert!(outcome.market_cap);
        assert!(!outcome.shareholder_decline);
        assert!(!outcome.passed());
    }

    #[test]
    fn test_result_from_row() {
        let result = ScreeningResult::from_row(&row(5.0, 2e10)).unwrap();
        assert_eq!(result.market_cap, 200.0);
        assert_eq!(result.turnover_rate, 5.0);
        assert_eq!(result.price, Some(12.3));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["代码"], "600000");
        assert_eq!(json["市值"], 200.0);
    }

    #[test]
    fn test_history_start() {
        let reference = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        assert_eq!(
            history_start(reference, 60),
            Ok(NaiveDate::from_ymd_opt(2024, 5, 16).unwrap())
        );
    }

    #[test]
    fn test_history_start_out_of_range_is_unavailable() {
        let reference = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        assert!(matches!(
            history_start(reference, i64::MAX / 1000),
            Err(EvalError::DataUnavailable(_))
        ));
        assert!(matches!(
            history_start(reference, 400_000_000),
            Err(EvalError::DataUnavailable(_))
        ));
    }

    #[test]
    fn test_report_summary() {
        let now = Utc::now();
        let report = ScreeningReport {
            id: "x".into(),
            reference_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            quarters: recent_quarter_ends(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()).to_vec(),
            results: vec![],
            evaluations: vec![],
            filter_results: vec![],
            total_scanned: 0,
            faulted: 0,
            started_at: now,
            completed_at: now,
            duration_secs: 0.0,
        };
        assert!(report.is_empty());
        assert!(report.summary().contains("0 selected"));
    }
}

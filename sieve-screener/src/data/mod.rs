//! Market data module for A-shares.
//!
//! Holds the typed records the screener consumes and the provider seam that
//! produces them.
//!
//! # Data Sources
//! - **Eastmoney** (default): spot snapshot, daily K-lines, fund flow and
//!   quarterly shareholder counts over public HTTP endpoints

mod eastmoney;
mod provider;
mod rate_limiter;

pub use eastmoney::{EastmoneyProvider, Market};
pub use provider::{DataProvider, ProviderError};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::screener::quarters::QuarterEnd;

// ============================================================================
// Security Identifier
// ============================================================================

/// Exchange code of a security (e.g. "600000"), stable across all sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityId(String);

impl SecurityId {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SecurityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SecurityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Shareholder Counts
// ============================================================================

/// Shareholder count disclosed for one security and one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareholderSnapshot {
    /// Date the count refers to
    pub period_end: NaiveDate,
    pub security_id: SecurityId,
    /// Number of holders of record
    pub holder_count: u64,
}

/// All shareholder counts published for one reporting period.
#[derive(Debug, Clone)]
pub struct ShareholderTable {
    period: QuarterEnd,
    rows: HashMap<SecurityId, ShareholderSnapshot>,
}

impl ShareholderTable {
    /// Build a table; when a security appears more than once the first row wins.
    pub fn from_snapshots(
        period: QuarterEnd,
        snapshots: impl IntoIterator<Item = ShareholderSnapshot>,
    ) -> Self {
        let mut rows = HashMap::new();
        for snapshot in snapshots {
            rows.entry(snapshot.security_id.clone()).or_insert(snapshot);
        }
        Self { period, rows }
    }

    pub fn period(&self) -> QuarterEnd {
        self.period
    }

    pub fn get(&self, id: &SecurityId) -> Option<&ShareholderSnapshot> {
        self.rows.get(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Up to three per-period tables, in fetch order.
#[derive(Debug, Clone, Default)]
pub struct ShareholderSnapshotSet {
    tables: Vec<ShareholderTable>,
}

impl ShareholderSnapshotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, table: ShareholderTable) {
        self.tables.push(table);
    }

    pub fn tables(&self) -> &[ShareholderTable] {
        &self.tables
    }

    /// Number of distinct periods held.
    pub fn period_count(&self) -> usize {
        let mut periods: Vec<QuarterEnd> = self.tables.iter().map(|t| t.period).collect();
        periods.sort();
        periods.dedup();
        periods.len()
    }

    /// The snapshot of `id` from every table that has one, in table order.
    pub fn snapshots_for(&self, id: &SecurityId) -> Vec<&ShareholderSnapshot> {
        self.tables.iter().filter_map(|t| t.get(id)).collect()
    }
}

impl FromIterator<ShareholderTable> for ShareholderSnapshotSet {
    fn from_iter<I: IntoIterator<Item = ShareholderTable>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Market Snapshot
// ============================================================================

/// One row of the universe-wide spot table.
///
/// Numeric fields are `None` when the provider reports no value (e.g. a
/// suspended security).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshotRow {
    pub security_id: SecurityId,
    pub name: String,
    /// Latest price (yuan)
    pub last_price: Option<f64>,
    /// Change versus previous close (%)
    pub change_pct: Option<f64>,
    /// Turnover rate (%)
    pub turnover_rate_pct: Option<f64>,
    /// Total market capitalization (yuan)
    pub total_market_cap: Option<f64>,
    /// Volume (lots)
    pub volume: Option<f64>,
    /// Amount traded (yuan)
    pub amount: Option<f64>,
}

impl MarketSnapshotRow {
    /// Total market cap in 亿 (10^8 yuan).
    pub fn market_cap_hundred_million(&self) -> Option<f64> {
        self.total_market_cap.map(|cap| cap / 1e8)
    }
}

/// Point-in-time spot table for the whole universe, in provider order.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    rows: Vec<MarketSnapshotRow>,
    fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(rows: Vec<MarketSnapshotRow>, fetched_at: DateTime<Utc>) -> Self {
        Self { rows, fetched_at }
    }

    pub fn rows(&self) -> &[MarketSnapshotRow] {
        &self.rows
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only the listed codes, preserving universe order.
    pub fn restrict_to(mut self, codes: &[String]) -> Self {
        if !codes.is_empty() {
            self.rows
                .retain(|r| codes.iter().any(|c| c == r.security_id.as_str()));
        }
        self
    }
}

// ============================================================================
// Price History
// ============================================================================

/// One daily bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub trade_date: NaiveDate,
    pub close: f64,
    /// Day-over-day change (%)
    pub pct_change: Option<f64>,
}

/// Daily bars of one security, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceHistory {
    bars: Vec<PriceBar>,
}

impl PriceHistory {
    /// Build a history, sorting bars chronologically.
    pub fn new(mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.trade_date);
        Self { bars }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// The most recent `n` bars, or `None` when fewer exist.
    pub fn last_n(&self, n: usize) -> Option<&[PriceBar]> {
        self.bars.len().checked_sub(n).map(|start| &self.bars[start..])
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

// ============================================================================
// Fund Flow
// ============================================================================

/// Daily main-force money flow of one security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundFlowRecord {
    /// Missing when the source table has no date column
    pub trade_date: Option<NaiveDate>,
    /// Main-force net inflow (yuan)
    pub net_main_inflow: Option<f64>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(code: &str, date: (i32, u32, u32), holders: u64) -> ShareholderSnapshot {
        ShareholderSnapshot {
            period_end: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            security_id: SecurityId::from(code),
            holder_count: holders,
        }
    }

    #[test]
    fn test_shareholder_table_keeps_first_row() {
        let table = ShareholderTable::from_snapshots(
            QuarterEnd::new(2024, 1),
            vec![
                snapshot("600000", (2024, 3, 31), 100),
                snapshot("600000", (2024, 3, 31), 999),
            ],
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&"600000".into()).unwrap().holder_count, 100);
    }

    #[test]
    fn test_period_count_ignores_duplicates() {
        let set: ShareholderSnapshotSet = vec![
            ShareholderTable::from_snapshots(QuarterEnd::new(2024, 1), vec![]),
            ShareholderTable::from_snapshots(QuarterEnd::new(2024, 1), vec![]),
            ShareholderTable::from_snapshots(QuarterEnd::new(2023, 4), vec![]),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.tables().len(), 3);
        assert_eq!(set.period_count(), 2);
    }

    #[test]
    fn test_price_history_sorted_oldest_first() {
        let history = PriceHistory::new(vec![
            PriceBar {
                trade_date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                close: 11.0,
                pct_change: None,
            },
            PriceBar {
                trade_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                close: 10.0,
                pct_change: None,
            },
        ]);
        assert_eq!(history.closes(), vec![10.0, 11.0]);
        assert_eq!(history.last_n(1).unwrap()[0].close, 11.0);
        assert!(history.last_n(3).is_none());
    }

    #[test]
    fn test_market_cap_conversion() {
        let row = MarketSnapshotRow {
            security_id: "600000".into(),
            name: "浦发银行".into(),
            last_price: Some(10.0),
            change_pct: None,
            turnover_rate_pct: Some(5.0),
            total_market_cap: Some(2e10),
            volume: None,
            amount: None,
        };
        assert_eq!(row.market_cap_hundred_million(), Some(200.0));
    }

    #[test]
    fn test_restrict_universe_preserves_order() {
        let row = |code: &str| MarketSnapshotRow {
            security_id: code.into(),
            name: code.into(),
            last_price: None,
            change_pct: None,
            turnover_rate_pct: None,
            total_market_cap: None,
            volume: None,
            amount: None,
        };
        let snapshot = MarketSnapshot::new(vec![row("600003"), row("600001"), row("600002")], Utc::now())
            .restrict_to(&["600002".to_string(), "600003".to_string()]);
        let codes: Vec<_> = snapshot.rows().iter().map(|r| r.security_id.as_str()).collect();
        assert_eq!(codes, vec!["600003", "600002"]);
    }
}

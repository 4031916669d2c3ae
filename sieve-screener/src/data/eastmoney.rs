//! Eastmoney provider for A-share screening data.
//!
//! Talks to the public eastmoney HTTP endpoints directly. No API key is
//! required.
//!
//! # Data Sources
//! - Spot snapshot: push2.eastmoney.com `clist`
//! - Daily K-line: push2his.eastmoney.com `kline`
//! - Daily fund flow: push2his.eastmoney.com `fflow/daykline`
//! - Shareholder counts: datacenter-web.eastmoney.com `RPT_HOLDERNUM_DET`

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use sieve_common::DataSourceConfig;

use super::provider::{DataProvider, ProviderError};
use super::{
    FundFlowRecord, MarketSnapshot, MarketSnapshotRow, PriceBar, PriceHistory, SecurityId,
    ShareholderSnapshot, ShareholderTable,
};
use crate::screener::quarters::QuarterEnd;

// ============================================================================
// Constants
// ============================================================================

/// Spot list API
const EASTMONEY_CLIST_URL: &str = "https://82.push2.eastmoney.com/api/qt/clist/get";

/// Historical K-line API
const EASTMONEY_KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";

/// Daily fund flow API
const EASTMONEY_FFLOW_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/fflow/daykline/get";

/// Datacenter report API
const EASTMONEY_DATACENTER_URL: &str = "https://datacenter-web.eastmoney.com/api/data/v1/get";

/// Spot fields: price, change %, volume, amount, turnover %, code, name, total cap
const SPOT_FIELDS: &str = "f2,f3,f5,f6,f8,f12,f14,f20";

/// Rows requested per datacenter page
const HOLDER_PAGE_SIZE: u32 = 500;

// ============================================================================
// Markets
// ============================================================================

/// Exchange board making up part of the screening universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    /// Shanghai main board + STAR market
    Shanghai,
    /// Shenzhen main board + ChiNext
    Shenzhen,
}

impl Market {
    /// `fs` filter understood by the clist endpoint.
    fn clist_filter(self) -> &'static str {
        match self {
            Self::Shanghai => "m:1 t:2,m:1 t:23",
            Self::Shenzhen => "m:0 t:6,m:0 t:80",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Shanghai => "SH",
            Self::Shenzhen => "SZ",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Market {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SH" => Ok(Self::Shanghai),
            "SZ" => Ok(Self::Shenzhen),
            other => Err(ProviderError::InvalidRequest(format!(
                "Unknown exchange: {}",
                other
            ))),
        }
    }
}

/// Convert an exchange code to eastmoney's secid ("1.600000", "0.000001").
fn to_secid(id: &SecurityId) -> String {
    let market = if id.as_str().starts_with('6') || id.as_str().starts_with('9') {
        "1"
    } else {
        "0"
    };
    format!("{}.{}", market, id)
}

// ============================================================================
// Eastmoney Provider
// ============================================================================

/// Eastmoney implementation of [`DataProvider`].
pub struct EastmoneyProvider {
    client: reqwest::Client,
    markets: Vec<Market>,
}

impl EastmoneyProvider {
    /// Create from the data source configuration.
    pub fn from_config(config: &DataSourceConfig) -> Result<Self, ProviderError> {
        let markets = config
            .exchanges
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<Market>, _>>()?;

        if markets.is_empty() {
            return Err(ProviderError::InvalidRequest("No exchanges configured".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ProviderError::InvalidRequest(format!("HTTP client: {}", e)))?;

        Ok(Self { client, markets })
    }

    /// GET `url` with query parameters and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse response: {}", e)))
    }

    async fn fetch_holder_page(
        &self,
        period: QuarterEnd,
        page: u32,
    ) -> Result<HolderNumResponse, ProviderError> {
        let query = [
            ("reportName", "RPT_HOLDERNUM_DET".to_string()),
            ("columns", "SECURITY_CODE,SECURITY_NAME_ABBR,END_DATE,HOLDER_NUM".to_string()),
            ("filter", format!("(END_DATE='{}')", period.date().format("%Y-%m-%d"))),
            ("pageNumber", page.to_string()),
            ("pageSize", HOLDER_PAGE_SIZE.to_string()),
            ("sortColumns", "SECURITY_CODE".to_string()),
            ("sortTypes", "1".to_string()),
            ("source", "WEB".to_string()),
            ("client", "WEB".to_string()),
        ];
        self.get_json(EASTMONEY_DATACENTER_URL, &query).await
    }

    async fn fetch_market_rows(&self, market: Market) -> Result<Vec<MarketSnapshotRow>, ProviderError> {
        let query = [
            ("pn", "1".to_string()),
            ("pz", "50000".to_string()),
            ("po", "1".to_string()),
            ("np", "1".to_string()),
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("fid", "f3".to_string()),
            ("fs", market.clist_filter().to_string()),
            ("fields", SPOT_FIELDS.to_string()),
        ];
        let response: ClistResponse = self.get_json(EASTMONEY_CLIST_URL, &query).await?;

        let diff = response.data.map(|d| d.diff).unwrap_or(Value::Null);
        let rows = parse_spot_rows(&diff);
        debug!(market = %market, rows = rows.len(), "Fetched spot rows");
        Ok(rows)
    }
}

#[async_trait]
impl DataProvider for EastmoneyProvider {
    fn name(&self) -> &'static str {
        "eastmoney"
    }

    async fn fetch_shareholder_counts(
        &self,
        period: QuarterEnd,
    ) -> Result<ShareholderTable, ProviderError> {
        let mut snapshots = Vec::new();
        let mut page = 1;

        loop {
            let response = self.fetch_holder_page(period, page).await?;
            let Some(result) = response.result else {
                // The datacenter answers success=false with no result for an unpublished period
                if page == 1 {
                    return Err(ProviderError::DataNotAvailable(format!(
                        "No shareholder counts for {}: {}",
                        period,
                        response.message.unwrap_or_default()
                    )));
                }
                break;
            };

            snapshots.extend(result.data.iter().filter_map(parse_holder_row));

            if page >= result.pages {
                break;
            }
            page += 1;
        }

        if snapshots.is_empty() {
            return Err(ProviderError::DataNotAvailable(format!(
                "No shareholder counts for {}",
                period
            )));
        }

        debug!(period = %period, rows = snapshots.len(), "Fetched shareholder counts");
        Ok(ShareholderTable::from_snapshots(period, snapshots))
    }

    async fn fetch_market_snapshot(&self) -> Result<MarketSnapshot, ProviderError> {
        let mut rows = Vec::new();
        for market in &self.markets {
            rows.extend(self.fetch_market_rows(*market).await?);
        }

        if rows.is_empty() {
            return Err(ProviderError::DataNotAvailable("Spot list is empty".into()));
        }

        Ok(MarketSnapshot::new(rows, Utc::now()))
    }

    async fn fetch_price_history(
        &self,
        id: &SecurityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory, ProviderError> {
        if start > end {
            return Err(ProviderError::InvalidRequest(format!(
                "start {} is after end {}",
                start, end
            )));
        }

        // fqt=0: unadjusted prices
        let query = [
            ("secid", to_secid(id)),
            ("klt", "101".to_string()),
            ("fqt", "0".to_string()),
            ("beg", start.format("%Y%m%d").to_string()),
            ("end", end.format("%Y%m%d").to_string()),
            ("fields1", "f1,f2,f3,f4,f5,f6".to_string()),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61".to_string()),
        ];
        let response: KlineResponse = self.get_json(EASTMONEY_KLINE_URL, &query).await?;
        let lines = response.into_lines()?;

        let bars = lines
            .iter()
            .filter_map(|line| match parse_kline_line(line) {
                Ok(bar) => Some(bar),
                Err(e) => {
                    warn!(security = %id, error = %e, "Skipping malformed kline");
                    None
                }
            })
            .collect();

        Ok(PriceHistory::new(bars))
    }

    async fn fetch_fund_flow(&self, id: &SecurityId) -> Result<Vec<FundFlowRecord>, ProviderError> {
        let query = [
            ("lmt", "0".to_string()),
            ("klt", "101".to_string()),
            ("secid", to_secid(id)),
            ("fields1", "f1,f2,f3,f7".to_string()),
            (
                "fields2",
                "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61,f62,f63,f64,f65".to_string(),
            ),
        ];
        let response: KlineResponse = self.get_json(EASTMONEY_FFLOW_URL, &query).await?;
        let lines = response.into_lines()?;

        Ok(lines.iter().map(|line| parse_fund_flow_line(line)).collect())
    }
}

// ============================================================================
// Eastmoney API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ClistResponse {
    data: Option<ClistData>,
}

#[derive(Debug, Deserialize)]
struct ClistData {
    /// Array with np=1, object keyed by index otherwise
    #[serde(default)]
    diff: Value,
}

/// Shared envelope of the kline and fflow endpoints.
#[derive(Debug, Deserialize)]
struct KlineResponse {
    /// Return code (0 = success)
    rc: i32,
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    klines: Option<Vec<String>>,
}

impl KlineResponse {
    fn into_lines(self) -> Result<Vec<String>, ProviderError> {
        if self.rc != 0 {
            return Err(ProviderError::Parse(format!("Eastmoney API error: rc={}", self.rc)));
        }
        self.data
            .and_then(|d| d.klines)
            .ok_or_else(|| ProviderError::DataNotAvailable("Empty kline payload".into()))
    }
}

#[derive(Debug, Deserialize)]
struct HolderNumResponse {
    result: Option<HolderNumResult>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HolderNumResult {
    #[serde(default)]
    pages: u32,
    #[serde(default)]
    data: Vec<Value>,
}

// ============================================================================
// Parsing Helpers
// ============================================================================

/// Read a numeric cell; eastmoney writes "-" for missing values.
fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number_str(s),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn parse_number_str(s: &str) -> Option<f64> {
    match s.trim() {
        "" | "-" => None,
        s => s.parse::<f64>().ok().filter(|n| n.is_finite()),
    }
}

fn parse_spot_row(item: &Value) -> Option<MarketSnapshotRow> {
    let code = match item.get("f12")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => format!("{:06}", n.as_u64()?),
        _ => return None,
    };
    let name = item.get("f14").and_then(Value::as_str).unwrap_or_default();
    let field = |key: &str| item.get(key).and_then(parse_number);

    Some(MarketSnapshotRow {
        security_id: SecurityId::new(code),
        name: name.to_string(),
        last_price: field("f2"),
        change_pct: field("f3"),
        turnover_rate_pct: field("f8"),
        total_market_cap: field("f20"),
        volume: field("f5"),
        amount: field("f6"),
    })
}

fn parse_spot_rows(diff: &Value) -> Vec<MarketSnapshotRow> {
    match diff {
        Value::Array(items) => items.iter().filter_map(parse_spot_row).collect(),
        Value::Object(map) => {
            let mut entries: Vec<(usize, &Value)> = map
                .iter()
                .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
                .collect();
            entries.sort_by_key(|(i, _)| *i);
            entries.into_iter().filter_map(|(_, v)| parse_spot_row(v)).collect()
        }
        _ => Vec::new(),
    }
}

/// Parse "date,open,close,high,low,volume,amount,amplitude,pct_change,...".
fn parse_kline_line(line: &str) -> Result<PriceBar, ProviderError> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 3 {
        return Err(ProviderError::Parse(format!("Invalid kline format: {}", line)));
    }

    let trade_date = NaiveDate::parse_from_str(parts[0], "%Y-%m-%d")
        .map_err(|e| ProviderError::Parse(format!("Failed to parse date: {}", e)))?;
    let close = parse_number_str(parts[2])
        .ok_or_else(|| ProviderError::Parse(format!("Failed to parse close: {}", parts[2])))?;
    let pct_change = parts.get(8).and_then(|s| parse_number_str(s));

    Ok(PriceBar {
        trade_date,
        close,
        pct_change,
    })
}

/// Parse "date,main_net,small_net,medium_net,large_net,super_large_net,...".
fn parse_fund_flow_line(line: &str) -> FundFlowRecord {
    let mut parts = line.split(',');
    let trade_date = parts
        .next()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok());
    let net_main_inflow = parts.next().and_then(parse_number_str);

    FundFlowRecord {
        trade_date,
        net_main_inflow,
    }
}

fn parse_holder_row(item: &Value) -> Option<ShareholderSnapshot> {
    let code = item.get("SECURITY_CODE")?.as_str()?;
    // "2024-03-31 00:00:00"
    let end_date = item.get("END_DATE")?.as_str()?;
    let period_end = NaiveDate::parse_from_str(end_date.get(..10)?, "%Y-%m-%d").ok()?;
    let holders = parse_number(item.get("HOLDER_NUM")?)?;
    if holders < 0.0 {
        return None;
    }

    Some(ShareholderSnapshot {
        period_end,
        security_id: SecurityId::from(code),
        holder_count: holders as u64,
    })
}

// ============================================================================
// Tests
// ============================================================================

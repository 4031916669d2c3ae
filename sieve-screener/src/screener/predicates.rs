//! Threshold checks on a single snapshot row or fund-flow table.

use tracing::debug;

use sieve_common::CriteriaConfig;

use super::criteria::EvalError;
use crate::data::{FundFlowRecord, MarketSnapshotRow};

fn row_or_missing(row: Option<&MarketSnapshotRow>) -> Result<&MarketSnapshotRow, EvalError> {
    row.ok_or_else(|| EvalError::DataUnavailable("security not in market snapshot".into()))
}

fn finite(value: Option<f64>, field: &'static str) -> Result<f64, EvalError> {
    let v = value.ok_or(EvalError::FieldMissing(field))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(EvalError::MalformedValue(field))
    }
}

/// `min <= turnover <= max`, inclusive on both ends.
pub fn turnover_in_range(
    row: Option<&MarketSnapshotRow>,
    criteria: &CriteriaConfig,
) -> Result<bool, EvalError> {
    let turnover = finite(row_or_missing(row)?.turnover_rate_pct, "turnover_rate_pct")?;
    Ok((criteria.min_turnover_pct..=criteria.max_turnover_pct).contains(&turnover))
}

/// `min <= market cap (亿) <= max`, inclusive on both ends.
pub fn market_cap_in_range(
    row: Option<&MarketSnapshotRow>,
    criteria: &CriteriaConfig,
) -> Result<bool, EvalError> {
    let cap = finite(row_or_missing(row)?.total_market_cap, "total_market_cap")? / 1e8;
    Ok((criteria.min_market_cap..=criteria.max_market_cap).contains(&cap))
}

/// The record with the latest trade date (first one on ties).
///
/// Falls back to the first row when no record is dated.
pub fn latest_fund_flow(records: &[FundFlowRecord]) -> Result<&FundFlowRecord, EvalError> {
    let first = records
        .first()
        .ok_or_else(|| EvalError::DataUnavailable("empty fund flow table".into()))?;

    let latest = records
        .iter()
        .filter(|r| r.trade_date.is_some())
        .fold(None, |best: Option<&FundFlowRecord>, r| match best {
            Some(b) if b.trade_date >= r.trade_date => Some(b),
            _ => Some(r),
        });

    Ok(latest.unwrap_or_else(|| {
        debug!(rows = records.len(), "No dated fund flow rows, using first row");
        first
    }))
}

/// Latest main-force net inflow strictly above the threshold.
pub fn main_inflow_above(
    records: &[FundFlowRecord],
    criteria: &CriteriaConfig,
) -> Result<bool, EvalError> {
    let latest = latest_fund_flow(records)?;
    let inflow = finite(latest.net_main_inflow, "net_main_inflow")?;
    Ok(inflow > criteria.min_main_inflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(turnover: Option<f64>, cap: Option<f64>) -> MarketSnapshotRow {
        MarketSnapshotRow {
            security_id: "600000".into(),
            name: "测试".into(),
            last_price: Some(10.0),
            change_pct: Some(0.5),
            turnover_rate_pct: turnover,
            total_market_cap: cap,
            volume: None,
            amount: None,
        }
    }

    fn flow(day: Option<u32>, inflow: Option<f64>) -> FundFlowRecord {
        FundFlowRecord {
            trade_date: day.and_then(|d| NaiveDate::from_ymd_opt(2024, 1, d)),
            net_main_inflow: inflow,
        }
    }

    #[test]
    fn test_turnover_bounds_inclusive() {
        let c = CriteriaConfig::default();
        assert_eq!(turnover_in_range(Some(&row(Some(3.0), None)), &c), Ok(true));
        assert_eq!(turnover_in_range(Some(&row(Some(20.0), None)), &c), Ok(true));
        assert_eq!(turnover_in_range(Some(&row(Some(2.99), None)), &c), Ok(false));
        assert_eq!(turnover_in_range(Some(&row(Some(20.01), None)), &c), Ok(false));
    }

    #[test]
    fn test_turnover_missing_fails() {
        let c = CriteriaConfig::default();
        assert_eq!(
            turnover_in_range(Some(&row(None, None)), &c),
            Err(EvalError::FieldMissing("turnover_rate_pct"))
        );
        assert!(matches!(
            turnover_in_range(None, &c),
            Err(EvalError::DataUnavailable(_))
        ));
        assert_eq!(
            turnover_in_range(Some(&row(Some(f64::NAN), None)), &c),
            Err(EvalError::MalformedValue("turnover_rate_pct"))
        );
    }

    #[test]
    fn test_market_cap_in_hundred_million() {
        let c = CriteriaConfig::default();
        assert_eq!(market_cap_in_range(Some(&row(None, Some(2e10))), &c), Ok(true));
        assert_eq!(market_cap_in_range(Some(&row(None, Some(3e9))), &c), Ok(true));
        assert_eq!(market_cap_in_range(Some(&row(None, Some(2e9))), &c), Ok(true));
        assert_eq!(market_cap_in_range(Some(&row(None, Some(3e13))), &c), Ok(false));
        assert_eq!(market_cap_in_range(Some(&row(None, Some(1e9))), &c), Ok(false));
    }

    #[test]
    fn test_latest_fund_flow_by_date() {
        let records = vec![flow(Some(2), Some(1.0)), flow(Some(5), Some(2.0)), flow(Some(3), Some(3.0))];
        assert_eq!(latest_fund_flow(&records).unwrap().net_main_inflow, Some(2.0));
    }

    #[test]
    fn test_latest_fund_flow_first_on_tie() {
        let records = vec![flow(Some(5), Some(1.0)), flow(Some(5), Some(2.0))];
        assert_eq!(latest_fund_flow(&records).unwrap().net_main_inflow, Some(1.0));
    }

    #[test]
    fn test_latest_fund_flow_undated_uses_first_row() {
        let records = vec![flow(None, Some(7.0)), flow(None, Some(8.0))];
        assert_eq!(latest_fund_flow(&records).unwrap().net_main_inflow, Some(7.0));
        assert!(latest_fund_flow(&[]).is_err());
    }

    #[test]
    fn test_main_inflow_threshold_is_strict() {
        let c = CriteriaConfig::default();
        assert_eq!(main_inflow_above(&[flow(Some(1), Some(10_000_001.0))], &c), Ok(true));
        assert_eq!(main_inflow_above(&[flow(Some(1), Some(10_000_000.0))], &c), Ok(false));
        assert_eq!(
            main_inflow_above(&[flow(Some(1), None)], &c),
            Err(EvalError::FieldMissing("net_main_inflow"))
        );
    }
}

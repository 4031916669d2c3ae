//! Technical indicators over daily price history.
//!
//! Each indicator returns `Result<_, EvalError>`; callers collapse errors to
//! a failed criterion.

use statrs::statistics::Statistics;
use tracing::debug;

use sieve_common::CriteriaConfig;

use super::criteria::EvalError;
use crate::data::PriceHistory;

/// Bars in the short-horizon momentum window.
pub const TEN_DAY_WINDOW: usize = 10;

/// Moving average periods (short, medium, long).
pub const MA_PERIODS: [usize; 3] = [5, 10, 20];

/// Arithmetic mean of the last `period` closes.
pub fn simple_moving_average(closes: &[f64], period: usize) -> Result<f64, EvalError> {
    if period == 0 {
        return Err(EvalError::MalformedValue("period"));
    }
    if closes.len() < period {
        return Err(EvalError::InsufficientHistory {
            required: period,
            actual: closes.len(),
        });
    }

    let window = &closes[closes.len() - period..];
    if window.iter().any(|c| !c.is_finite()) {
        return Err(EvalError::MalformedValue("close"));
    }
    Ok(window.iter().mean())
}

/// MA5, MA10 and MA20 of a history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingAverages {
    pub ma5: f64,
    pub ma10: f64,
    pub ma20: f64,
}

impl MovingAverages {
    pub fn compute(history: &PriceHistory) -> Result<Self, EvalError> {
        let closes = history.closes();
        let [short, medium, long] = MA_PERIODS;
        Ok(Self {
            ma5: simple_moving_average(&closes, short)?,
            ma10: simple_moving_average(&closes, medium)?,
            ma20: simple_moving_average(&closes, long)?,
        })
    }

    /// Strict bullish ordering.
    pub fn is_bullish(&self) -> bool {
        self.ma5 > self.ma10 && self.ma10 > self.ma20
    }
}

/// MA5 > MA10 > MA20 on daily closes. Needs at least 20 bars.
pub fn ma_alignment(history: &PriceHistory) -> Result<bool, EvalError> {
    MovingAverages::compute(history).map(|ma| ma.is_bullish())
}

/// Percentage change from the first to the last close of the last 10 bars.
pub fn ten_day_return(history: &PriceHistory) -> Result<f64, EvalError> {
    let window = history
        .last_n(TEN_DAY_WINDOW)
        .ok_or(EvalError::InsufficientHistory {
            required: TEN_DAY_WINDOW,
            actual: history.len(),
        })?;

    let base = window[0].close;
    let last = window[window.len() - 1].close;
    if !base.is_finite() || base <= 0.0 || !last.is_finite() {
        return Err(EvalError::MalformedValue("close"));
    }

    Ok((last - base) / base * 100.0)
}

/// Largest daily percentage change among the last 10 bars.
pub fn ten_day_max_daily_change(history: &PriceHistory) -> Result<f64, EvalError> {
    let window = history
        .last_n(TEN_DAY_WINDOW)
        .ok_or(EvalError::InsufficientHistory {
            required: TEN_DAY_WINDOW,
            actual: history.len(),
        })?;

    window.iter().try_fold(f64::NEG_INFINITY, |acc, bar| {
        let change = bar.pct_change.ok_or(EvalError::FieldMissing("pct_change"))?;
        if !change.is_finite() {
            return Err(EvalError::MalformedValue("pct_change"));
        }
        Ok(acc.max(change))
    })
}

/// Which cap of the ten-day criterion a history broke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TenDayBreach {
    /// 10-day return (%) at or above `ten_day_return_max_pct`
    Return(f64),
    /// Largest daily gain (%) at or above `max_daily_gain_pct`
    DailyGain(f64),
}

/// The first ten-day cap broken, or `None` when both hold.
///
/// The daily cap is only checked when configured.
pub fn ten_day_breach(
    history: &PriceHistory,
    criteria: &CriteriaConfig,
) -> Result<Option<TenDayBreach>, EvalError> {
    let ret = ten_day_return(history)?;
    if ret >= criteria.ten_day_return_max_pct {
        return Ok(Some(TenDayBreach::Return(ret)));
    }

    if let Some(cap) = criteria.max_daily_gain_pct {
        let max_daily = ten_day_max_daily_change(history)?;
        if max_daily >= cap {
            return Ok(Some(TenDayBreach::DailyGain(max_daily)));
        }
    }
    Ok(None)
}

/// 10-day return below its cap and, when configured, every daily gain in
/// the window below the daily cap.
pub fn ten_day_gain_within_limits(
    history: &PriceHistory,
    criteria: &CriteriaConfig,
) -> Result<bool, EvalError> {
    match ten_day_breach(history, criteria)? {
        Some(TenDayBreach::Return(ret)) => {
            debug!(
                return_pct = ret,
                cap = criteria.ten_day_return_max_pct,
                "Ten-day return over cap"
            );
            Ok(false)
        }
        Some(TenDayBreach::DailyGain(gain)) => {
            debug!(
                daily_gain_pct = gain,
                cap = ?criteria.max_daily_gain_pct,
                "Ten-day window has a daily gain over cap"
            );
            Ok(false)
        }
        None => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceBar;
    use chrono::NaiveDate;

    fn history_from(closes: &[f64], changes: &[Option<f64>]) -> PriceHistory {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceHistory::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, close)| PriceBar {
                    trade_date: start + chrono::Duration::days(i as i64),
                    close: *close,
                    pct_change: changes.get(i).copied().flatten(),
                })
                .collect(),
        )
    }

    fn history(closes: &[f64]) -> PriceHistory {
        history_from(closes, &vec![Some(1.0); closes.len()])
    }

    #[test]
    fn test_sma() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((simple_moving_average(&closes, 5).unwrap() - 3.0).abs() < 1e-9);
        assert!((simple_moving_average(&closes, 2).unwrap() - 4.5).abs() < 1e-9);
        assert_eq!(
            simple_moving_average(&closes, 6),
            Err(EvalError::InsufficientHistory { required: 6, actual: 5 })
        );
        assert!(simple_moving_average(&[1.0, f64::NAN], 2).is_err());
    }

    #[test]
    fn test_bullish_ordering() {
        let bullish = MovingAverages { ma5: 10.0, ma10: 9.0, ma20: 8.0 };
        assert!(bullish.is_bullish());

        let crossed = MovingAverages { ma5: 9.0, ma10: 10.0, ma20: 8.0 };
        assert!(!crossed.is_bullish());

        let flat = MovingAverages { ma5: 9.0, ma10: 9.0, ma20: 8.0 };
        assert!(!flat.is_bullish());
    }

    #[test]
    fn test_ma_alignment_on_uptrend() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        assert_eq!(ma_alignment(&history(&closes)), Ok(true));

        let falling: Vec<f64> = (1..=30).rev().map(|i| i as f64).collect();
        assert_eq!(ma_alignment(&history(&falling)), Ok(false));
    }

    #[test]
    fn test_ma_alignment_needs_twenty_bars() {
        let closes: Vec<f64> = (1..=19).map(|i| i as f64).collect();
        assert!(matches!(
            ma_alignment(&history(&closes)),
            Err(EvalError::InsufficientHistory { required: 20, .. })
        ));

        let closes: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        assert_eq!(ma_alignment(&history(&closes)), Ok(true));
    }

    #[test]
    fn test_ten_day_return() {
        let mut closes = vec![100.0; 10];
        closes[9] = 114.0;
        let r = ten_day_return(&history(&closes)).unwrap();
        assert!((r - 14.0).abs() < 1e-9);

        // Base is the first bar of the last ten, not the eleventh from the end
        let mut closes = vec![50.0; 15];
        closes[5] = 100.0;
        closes[14] = 116.0;
        let r = ten_day_return(&history(&closes)).unwrap();
        assert!((r - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_ten_day_return_guards() {
        assert!(matches!(
            ten_day_return(&history(&[1.0; 9])),
            Err(EvalError::InsufficientHistory { required: 10, actual: 9 })
        ));
        let mut closes = vec![1.0; 10];
        closes[0] = 0.0;
        assert_eq!(
            ten_day_return(&history(&closes)),
            Err(EvalError::MalformedValue("close"))
        );
    }

    #[test]
    fn test_ten_day_max_daily_change() {
        let changes: Vec<Option<f64>> = vec![
            Some(9.9), // outside the window
            Some(1.0), Some(-2.0), Some(3.5), Some(0.0), Some(6.9),
            Some(1.0), Some(1.0), Some(1.0), Some(1.0), Some(1.0),
        ];
        let h = history_from(&[10.0; 11], &changes);
        assert!((ten_day_max_daily_change(&h).unwrap() - 6.9).abs() < 1e-9);

        let mut missing = changes.clone();
        missing[10] = None;
        let h = history_from(&[10.0; 11], &missing);
        assert_eq!(
            ten_day_max_daily_change(&h),
            Err(EvalError::FieldMissing("pct_change"))
        );
    }

    #[test]
    fn test_ten_day_gain_within_limits() {
        let criteria = CriteriaConfig::default();

        let mut closes = vec![100.0; 10];
        closes[9] = 114.0;
        let calm = history_from(&closes, &vec![Some(2.0); 10]);
        assert_eq!(ten_day_gain_within_limits(&calm, &criteria), Ok(true));

        closes[9] = 116.0;
        let hot = history_from(&closes, &vec![Some(2.0); 10]);
        assert_eq!(ten_day_gain_within_limits(&hot, &criteria), Ok(false));

        // A single limit-up day fails the daily cap
        let mut changes = vec![Some(1.0); 10];
        changes[4] = Some(10.0);
        closes[9] = 105.0;
        let spiky = history_from(&closes, &changes);
        assert_eq!(ten_day_gain_within_limits(&spiky, &criteria), Ok(false));

        let relaxed = CriteriaConfig {
            max_daily_gain_pct: None,
            ..CriteriaConfig::default()
        };
        assert_eq!(ten_day_gain_within_limits(&spiky, &relaxed), Ok(true));
    }

    #[test]
    fn test_ten_day_breach_names_the_broken_cap() {
        let criteria = CriteriaConfig::default();

        let mut closes = vec![100.0; 10];
        closes[9] = 120.0;
        let hot = history_from(&closes, &vec![Some(2.0); 10]);
        assert!(matches!(
            ten_day_breach(&hot, &criteria),
            Ok(Some(TenDayBreach::Return(r))) if (r - 20.0).abs() < 1e-9
        ));

        let mut changes = vec![Some(1.0); 10];
        changes[3] = Some(7.0);
        closes[9] = 105.0;
        let spiky = history_from(&closes, &changes);
        assert_eq!(
            ten_day_breach(&spiky, &criteria),
            Ok(Some(TenDayBreach::DailyGain(7.0)))
        );

        let calm = history_from(&closes, &vec![Some(1.0); 10]);
        assert_eq!(ten_day_breach(&calm, &criteria), Ok(None));
    }
}

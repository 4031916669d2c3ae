//! Screening criteria and per-security evaluation traces.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::data::SecurityId;

// ============================================================================
// Evaluation Error
// ============================================================================

/// Why a single criterion could not be computed for one security.
///
/// Never escapes a criterion check: every check degrades to "failed".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Insufficient history: need {required} bars, got {actual}")]
    InsufficientHistory { required: usize, actual: usize },

    #[error("Field missing: {0}")]
    FieldMissing(&'static str),

    #[error("Malformed value in field: {0}")]
    MalformedValue(&'static str),
}

/// Collapse a computed check into pass/fail, logging why it could not run.
pub fn fail_closed(criterion: Criterion, id: &SecurityId, result: Result<bool, EvalError>) -> bool {
    match result {
        Ok(passed) => passed,
        Err(e) => {
            debug!(security = %id, criterion = criterion.key(), error = %e, "Criterion failed closed");
            false
        }
    }
}

// ============================================================================
// Criterion
// ============================================================================

/// The six screening criteria, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Holder count fell for three consecutive quarters
    ShareholderDecline,
    /// Turnover rate within range
    TurnoverRate,
    /// MA5 > MA10 > MA20
    MaAlignment,
    /// Total market cap within range
    MarketCap,
    /// 10-day return and 10-day max daily gain below caps
    TenDayReturn,
    /// Latest main-force net inflow above threshold
    MainFundInflow,
}

impl Criterion {
    pub const ALL: [Criterion; 6] = [
        Self::ShareholderDecline,
        Self::TurnoverRate,
        Self::MaAlignment,
        Self::MarketCap,
        Self::TenDayReturn,
        Self::MainFundInflow,
    ];

    /// Stable machine key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ShareholderDecline => "shareholder_decline",
            Self::TurnoverRate => "turnover_rate",
            Self::MaAlignment => "ma_alignment",
            Self::MarketCap => "market_cap",
            Self::TenDayReturn => "ten_day_return",
            Self::MainFundInflow => "main_fund_inflow",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ShareholderDecline => "股东户数连续减少",
            Self::TurnoverRate => "换手率范围",
            Self::MaAlignment => "均线多头排列",
            Self::MarketCap => "市值范围",
            Self::TenDayReturn => "10日涨幅限制",
            Self::MainFundInflow => "主力资金流入",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Evaluation Trace
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionOutcome {
    pub criterion: Criterion,
    pub passed: bool,
}

/// Outcome of all six criteria for one fully evaluated security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvaluation {
    pub security_id: SecurityId,
    pub name: String,
    pub outcomes: Vec<CriterionOutcome>,
}

impl SecurityEvaluation {
    pub fn new(security_id: SecurityId, name: impl Into<String>, outcomes: Vec<CriterionOutcome>) -> Self {
        Self {
            security_id,
            name: name.into(),
            outcomes,
        }
    }

    /// True iff every criterion was evaluated and passed.
    pub fn passed(&self) -> bool {
        self.outcomes.len() == Criterion::ALL.len() && self.outcomes.iter().all(|o| o.passed)
    }

    /// Failed criteria in evaluation order.
    pub fn failed_criteria(&self) -> Vec<Criterion> {
        self.outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.criterion)
            .collect()
    }

    pub fn outcome(&self, criterion: Criterion) -> Option<bool> {
        self.outcomes
            .iter()
            .find(|o| o.criterion == criterion)
            .map(|o| o.passed)
    }
}

// ============================================================================
// Filter Funnel
// ============================================================================

/// Stage of the screening funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Universe after optional symbol restriction
    Input,
    /// Turnover, market cap and shareholder trend from cached tables
    Prefilter,
    /// All six criteria
    FullEvaluation,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "输入"),
            Self::Prefilter => write!(f, "初筛"),
            Self::FullEvaluation => write!(f, "全量评估"),
        }
    }
}

/// Result of a filtering stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub stage: FilterStage,
    /// Number of stocks that passed this stage
    pub passed: usize,
    /// Number of stocks eliminated at this stage
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterResult {
    pub fn new(stage: FilterStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(failing: &[Criterion]) -> SecurityEvaluation {
        let outcomes = Criterion::ALL
            .iter()
            .map(|c| CriterionOutcome {
                criterion: *c,
                passed: !failing.contains(c),
            })
            .collect();
        SecurityEvaluation::new("600000".into(), "测试", outcomes)
    }

    #[test]
    fn test_all_passed() {
        let eval = evaluation(&[]);
        assert!(eval.passed());
        assert!(eval.failed_criteria().is_empty());
    }

    #[test]
    fn test_failed_criteria_in_order() {
        let eval = evaluation(&[Criterion::MainFundInflow, Criterion::TurnoverRate]);
        assert!(!eval.passed());
        assert_eq!(
            eval.failed_criteria(),
            vec![Criterion::TurnoverRate, Criterion::MainFundInflow]
        );
        assert_eq!(eval.outcome(Criterion::MaAlignment), Some(true));
    }

    #[test]
    fn test_incomplete_trace_does_not_pass() {
        let eval = SecurityEvaluation::new(
            "600000".into(),
            "测试",
            vec![CriterionOutcome {
                criterion: Criterion::TurnoverRate,
                passed: true,
            }],
        );
        assert!(!eval.passed());
    }

    #[test]
    fn test_criterion_labels() {
        assert_eq!(Criterion::ShareholderDecline.to_string(), "股东户数连续减少");
        assert_eq!(Criterion::TenDayReturn.key(), "ten_day_return");
        assert_eq!(
            serde_json::to_string(&Criterion::MaAlignment).unwrap(),
            "\"ma_alignment\""
        );
    }

    #[test]
    fn test_fail_closed() {
        let id = SecurityId::from("600000");
        assert!(fail_closed(Criterion::MaAlignment, &id, Ok(true)));
        assert!(!fail_closed(Criterion::MaAlignment, &id, Ok(false)));
        assert!(!fail_closed(
            Criterion::MaAlignment,
            &id,
            Err(EvalError::InsufficientHistory { required: 20, actual: 3 })
        ));
    }

    #[test]
    fn test_filter_result_rate() {
        let result = FilterResult::new(FilterStage::Prefilter, 200, 50);
        assert_eq!(result.eliminated, 150);
        assert!((result.elimination_rate - 75.0).abs() < 1e-9);

        let empty = FilterResult::new(FilterStage::Input, 0, 0);
        assert_eq!(empty.elimination_rate, 0.0);
    }
}

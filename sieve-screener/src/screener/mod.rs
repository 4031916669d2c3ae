//! Multi-factor screening module.
//!
//! Scans the A-share universe against six criteria and keeps the securities
//! that pass all of them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        多因子选股流程                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐           │
//! │  │  季度日期   │────▶│ 股东户数表  │────▶│   初筛      │           │
//! │  │  quarters   │     │ (3 periods) │     │ 换手/市值/  │           │
//! │  └─────────────┘     └─────────────┘     │ 股东户数    │           │
//! │                                          └──────┬──────┘           │
//! │  ┌─────────────┐                                │                   │
//! │  │  行情快照   │────────────────────────────────┤                   │
//! │  └─────────────┘                                ▼                   │
//! │                     ┌──────────────────────────────────────┐       │
//! │                     │  K线 + 资金流 (rate limited)          │       │
//! │                     │  均线多头 / 10日涨幅 / 主力净流入     │       │
//! │                     └──────────────────┬───────────────────┘       │
//! │                                        ▼                            │
//! │                              ScreeningReport → CSV/JSON/MD          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sieve_screener::screener::ScreenerEngine;
//!
//! let engine = ScreenerEngine::new(Arc::new(provider), &config);
//! let report = engine.run(reference_date).await?;
//! ```

pub mod criteria;
pub mod engine;
pub mod indicators;
pub mod predicates;
pub mod quarters;
pub mod report;
pub mod shareholder;

pub use criteria::{Criterion, CriterionOutcome, EvalError, FilterResult, FilterStage, SecurityEvaluation};
pub use engine::{PrefilterOutcome, ScreenerEngine, ScreenerError, ScreeningReport, ScreeningResult};
pub use quarters::{recent_quarter_ends, QuarterEnd};
pub use report::{criteria_banner, ReportFormat, ScreenerReport};
pub use shareholder::holder_count_declining;

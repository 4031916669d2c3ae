//! Sieve Screener Library
//!
//! Multi-factor stock screening for A-shares. A security is selected when
//! all six criteria hold:
//!
//! 1. Shareholder count fell for three consecutive quarters
//! 2. Turnover rate within range (default 3%-20%)
//! 3. Daily moving averages in bullish order (MA5 > MA10 > MA20)
//! 4. Total market cap within range (default 20-250 亿)
//! 5. 10-day return below 15% and no single day above 7% in that window
//! 6. Latest main-force net inflow above 10,000,000 yuan
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    sieve-screener                                   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  DataProvider   │  │  ScreenerEngine │  │  ScreenerReport │     │
//! │  │  (eastmoney)    │─▶│  (6 criteria)   │─▶│  CSV/JSON/MD    │     │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod screener;

pub use data::{DataProvider, EastmoneyProvider, ProviderError, SecurityId};
pub use screener::{
    ReportFormat, ScreenerEngine, ScreenerError, ScreenerReport, ScreeningReport, ScreeningResult,
};

//! Report generation module for screening results.
//!
//! Generates reports in various formats:
//! - CSV (UTF-8 with BOM so spreadsheet tools detect the encoding)
//! - JSON (for programmatic use)
//! - Markdown (human-readable, includes the rejection trace)

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use sieve_common::CriteriaConfig;

use super::engine::ScreeningReport;

/// Byte order mark prepended to CSV output.
const UTF8_BOM: &str = "\u{feff}";

/// Shown instead of a table when nothing passed.
pub const EMPTY_SELECTION_MESSAGE: &str = "No stocks selected (未选到符合条件的股票)";

// ============================================================================
// Report Format
// ============================================================================

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// CSV with the selection only
    Csv,
    /// JSON format (machine-readable)
    Json,
    /// Markdown format (human-readable)
    Markdown,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
            Self::Markdown => write!(f, "markdown"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

/// `selected_stocks_YYYYMMDD_HHMMSS`, in local time.
pub fn report_file_stem(at: DateTime<Utc>) -> String {
    format!(
        "selected_stocks_{}",
        at.with_timezone(&Local).format("%Y%m%d_%H%M%S")
    )
}

/// Strategy banner listing the active thresholds.
pub fn criteria_banner(criteria: &CriteriaConfig) -> String {
    let rule = "=".repeat(60);
    let daily = criteria
        .max_daily_gain_pct
        .map(|cap| format!(" 且 10日中最大涨幅 < {}%", cap))
        .unwrap_or_default();

    let mut out = format!("多因子选股策略\n{}\n策略条件:\n", rule);
    out.push_str("1. 股东户数连续3季减少\n");
    out.push_str(&format!(
        "2. 换手率{}%-{}%\n",
        criteria.min_turnover_pct, criteria.max_turnover_pct
    ));
    out.push_str("3. 日线均线多头排列 (MA5 > MA10 > MA20)\n");
    out.push_str(&format!(
        "4. 总市值{}-{}亿\n",
        criteria.min_market_cap, criteria.max_market_cap
    ));
    out.push_str(&format!("5. 10日涨幅<{}%{}\n", criteria.ten_day_return_max_pct, daily));
    out.push_str(&format!(
        "6. 当日主力资金净流入>{}万\n",
        criteria.min_main_inflow / 1e4
    ));
    out.push_str(&rule);
    out
}

// ============================================================================
// Screener Report
// ============================================================================

/// Report generator for screening results.
pub struct ScreenerReport {
    report: ScreeningReport,
}

impl ScreenerReport {
    pub fn new(report: ScreeningReport) -> Self {
        Self { report }
    }

    pub fn report(&self) -> &ScreeningReport {
        &self.report
    }

    /// Generate report in the specified format.
    pub fn generate(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Csv => self.to_csv(),
            ReportFormat::Json => self.to_json(),
            ReportFormat::Markdown => Ok(self.to_markdown()),
        }
    }

    /// Save report to file.
    ///
    /// `path` without an extension gets the format's extension.
    pub fn save_to_file(&self, path: &Path, format: ReportFormat) -> Result<PathBuf> {
        let content = self.generate(format)?;

        let file_path = if path.extension().is_none() {
            path.with_extension(format.extension())
        } else {
            path.to_path_buf()
        };

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create report directory")?;
        }

        std::fs::write(&file_path, content)
            .with_context(|| format!("Failed to write report file {}", file_path.display()))?;

        Ok(file_path)
    }

    /// Write one file per format into `dir`. Writes nothing for an empty selection.
    pub fn save_all(&self, dir: &Path, formats: &[ReportFormat]) -> Result<Vec<PathBuf>> {
        if self.report.is_empty() {
            return Ok(Vec::new());
        }

        let stem = dir.join(report_file_stem(self.report.completed_at));
        formats
            .iter()
            .map(|format| self.save_to_file(&stem, *format))
            .collect()
    }

    /// Selected securities as CSV.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for result in &self.report.results {
            writer.serialize(result).context("Failed to serialize CSV row")?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .context("Failed to flush CSV writer")?;
        let body = String::from_utf8(bytes).context("CSV output is not UTF-8")?;
        Ok(format!("{}{}", UTF8_BOM, body))
    }

    /// Full report as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.report).context("Failed to serialize report")
    }

    /// Generate markdown report.
    pub fn to_markdown(&self) -> String {
        let r = &self.report;
        let mut md = String::new();

        // Header
        md.push_str(&format!(
            "# 多因子选股报告\n\n**运行ID**: {}\n**基准日期**: {}\n**季度**: {}\n**耗时**: {:.1}秒\n\n",
            r.id,
            r.reference_date,
            r.quarters.iter().map(|q| q.label()).collect::<Vec<_>>().join(", "),
            r.duration_secs
        ));

        // Summary
        md.push_str("## 筛选摘要\n\n");
        md.push_str(&format!("- **总扫描**: {} 只股票\n", r.total_scanned));
        md.push_str(&format!("- **全量评估**: {} 只股票\n", r.evaluations.len()));
        md.push_str(&format!("- **最终选中**: {} 只股票\n", r.results.len()));
        if r.faulted > 0 {
            md.push_str(&format!("- **评估异常**: {} 只股票\n", r.faulted));
        }
        md.push('\n');

        // Filter funnel
        md.push_str("### 筛选漏斗\n\n");
        md.push_str("| 阶段 | 通过 | 淘汰 | 淘汰率 |\n");
        md.push_str("|------|------|------|--------|\n");
        for fr in &r.filter_results {
            md.push_str(&format!(
                "| {} | {} | {} | {:.1}% |\n",
                fr.stage, fr.passed, fr.eliminated, fr.elimination_rate
            ));
        }
        md.push('\n');

        // Selection
        md.push_str("## 选中股票\n\n");
        if r.results.is_empty() {
            md.push_str("未选到符合条件的股票\n\n");
        } else {
            md.push_str("| 代码 | 名称 | 当前价 | 市值(亿) | 换手率 |\n");
            md.push_str("|------|------|--------|----------|--------|\n");
            for s in &r.results {
                md.push_str(&format!(
                    "| {} | {} | {} | {:.2} | {:.2}% |\n",
                    s.security_id,
                    s.name,
                    s.price.map_or_else(|| "-".to_string(), |p| format!("{:.2}", p)),
                    s.market_cap,
                    s.turnover_rate,
                ));
            }
            md.push('\n');
        }

        // Rejections among fully evaluated securities
        let rejected: Vec<_> = r.evaluations.iter().filter(|e| !e.passed()).collect();
        if !rejected.is_empty() {
            md.push_str("## 未通过条件\n\n");
            md.push_str("| 代码 | 名称 | 未通过 |\n");
            md.push_str("|------|------|--------|\n");
            for e in rejected {
                let failed: Vec<String> = e.failed_criteria().iter().map(|c| c.to_string()).collect();
                md.push_str(&format!("| {} | {} | {} |\n", e.security_id, e.name, failed.join("、")));
            }
            md.push('\n');
        }

        // Footer
        md.push_str("---\n\n");
        md.push_str(&format!(
            "*报告生成于 {} UTC*\n",
            r.completed_at.format("%Y-%m-%d %H:%M:%S")
        ));

        md
    }

    /// Plain-text table for the terminal.
    pub fn to_console_table(&self) -> String {
        let results = &self.report.results;
        if results.is_empty() {
            return EMPTY_SELECTION_MESSAGE.to_string();
        }

        let mut out = format!("共选中 {} 只股票\n\n", results.len());
        out.push_str(&format!(
            "{:<8} {:<12} {:>10} {:>12} {:>8}\n",
            "代码", "名称", "当前价", "市值(亿)", "换手率"
        ));
        for s in results {
            out.push_str(&format!(
                "{:<8} {:<12} {:>10} {:>12.2} {:>7.2}%\n",
                s.security_id.as_str(),
                s.name,
                s.price.map_or_else(|| "-".to_string(), |p| format!("{:.2}", p)),
                s.market_cap,
                s.turnover_rate,
            ));
        }
        out
    }
}

use crate::error::{DashboardError, Result};
use crate::extractor::ExtractionBatch;
use crate::records::{
    FinancialHealthMetrics, FinancialSummary, FinancialTable, FinancialTableRow,
    FinancialTrendPoint, FinancialYearRecord, RevenueCompositionPoint,
};
use crate::utils::{growth_pct, span_change_pct};
use log::{debug, warn};

/// Number of trailing years shown in the detailed table.
pub const DETAILED_TABLE_YEARS: usize = 5;

pub struct FinancialAggregator;

impl FinancialAggregator {
    /// Sorts records by year and derives trends and composition.
    ///
    /// Fails with [`DashboardError::EmptyBatch`] when no records are supplied.
    pub fn aggregate(records: Vec<FinancialYearRecord>) -> Result<FinancialHealthMetrics> {
        Self::aggregate_with_skipped(records, 0)
    }

    pub fn aggregate_batch(batch: ExtractionBatch) -> Result<FinancialHealthMetrics> {
        let skipped = batch.skipped_count();
        Self::aggregate_with_skipped(batch.records, skipped)
    }

    fn aggregate_with_skipped(
        mut records: Vec<FinancialYearRecord>,
        skipped: usize,
    ) -> Result<FinancialHealthMetrics> {
        if records.is_empty() {
            return Err(DashboardError::EmptyBatch { skipped });
        }

        // Stable sort keeps the first record of a duplicated year in front.
        records.sort_by_key(|r| r.year);
        let before = records.len();
        records.dedup_by_key(|r| r.year);
        if records.len() < before {
            warn!(
                "Dropped {} duplicate financial records for already-seen years",
                before - records.len()
            );
        }

        let revenue_trend = calculate_trends(&records);
        let revenue_composition = records.iter().map(RevenueCompositionPoint::from).collect();
        let years_available: Vec<i32> = records.iter().map(|r| r.year).collect();
        let latest_year = years_available.last().copied().unwrap_or_default();

        debug!(
            "Aggregated {} financial years ({:?})",
            records.len(),
            years_available
        );

        Ok(FinancialHealthMetrics {
            years: records,
            revenue_trend,
            revenue_composition,
            latest_year,
            years_available,
        })
    }
}

/// Growth is measured against the previous record in the sorted sequence, not the
/// previous calendar year.
pub fn calculate_trends(records: &[FinancialYearRecord]) -> Vec<FinancialTrendPoint> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let previous = i.checked_sub(1).map(|p| &records[p]);
            FinancialTrendPoint {
                year: record.year,
                revenue: record.total_revenue,
                expenses: record.total_expenses,
                net_income: record.net_income(),
                revenue_growth: previous
                    .and_then(|p| growth_pct(record.total_revenue, p.total_revenue)),
                expense_growth: previous
                    .and_then(|p| growth_pct(record.total_expenses, p.total_expenses)),
            }
        })
        .collect()
}

impl FinancialHealthMetrics {
    pub fn summary(&self) -> Option<FinancialSummary> {
        let latest = self.latest()?;
        let previous = self.previous();

        let (net_income_change, net_assets_change) = previous
            .map(|p| {
                (
                    latest.net_income() - p.net_income(),
                    latest.net_assets - p.net_assets,
                )
            })
            .unwrap_or((0.0, 0.0));

        Some(FinancialSummary {
            latest_year: latest.year,
            previous_year: previous.map(|p| p.year),
            total_revenue: latest.total_revenue,
            total_expenses: latest.total_expenses,
            net_income: latest.net_income(),
            net_assets: latest.net_assets,
            revenue_change: previous.and_then(|p| growth_pct(latest.total_revenue, p.total_revenue)),
            expense_change: previous
                .and_then(|p| growth_pct(latest.total_expenses, p.total_expenses)),
            net_income_change,
            net_assets_change,
            net_assets_change_pct: previous.and_then(|p| growth_pct(latest.net_assets, p.net_assets)),
            net_income_improved: previous
                .map(|p| latest.net_income() > p.net_income())
                .unwrap_or(false),
            total_employees: latest.total_employees,
            total_volunteers: latest.total_volunteers,
            years_available: self.years_available.clone(),
        })
    }

    /// Table of the most recent years with first-to-last change per metric.
    pub fn detailed_table(&self) -> Result<FinancialTable> {
        let start = self.years.len().saturating_sub(DETAILED_TABLE_YEARS);
        let recent = &self.years[start..];

        let (first, last) = match recent {
            [first, .., last] => (first, last),
            _ => {
                return Err(DashboardError::InsufficientData(
                    "at least two years are required for the detailed table".to_string(),
                ))
            }
        };

        let row = |name: &str, bold: bool, metric: fn(&FinancialYearRecord) -> f64| {
            FinancialTableRow {
                name: name.to_string(),
                bold,
                values: recent.iter().map(metric).collect(),
                change: Some(span_change_pct(metric(first), metric(last))),
            }
        };

        let mut net_income = row("Net Income/(Loss)", true, |r| r.net_income());
        net_income.change = None;

        Ok(FinancialTable {
            years: recent.iter().map(|r| r.year.to_string()).collect(),
            year_span: format!("{}-YR CHANGE", last.year - first.year),
            metrics: vec![
                row("Total Revenue", false, |r| r.total_revenue),
                row("Program Services", false, |r| r.program_service_revenue),
                row("Contributions", false, |r| r.contributions_grants),
                row("Investment Income", false, |r| r.investment_income),
                row("Other Revenue", false, |r| r.other_revenue),
                row("Total Expenses", true, |r| r.total_expenses),
                row("Salaries/Compensation", false, |r| r.salaries_compensation),
                net_income,
                row("Net Assets", true, |r| r.net_assets),
                row("Total Assets", true, |r| r.total_assets),
                row("Total Liabilities", true, |r| r.total_liabilities),
            ],
        })
    }
}

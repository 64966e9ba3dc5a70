//! Chart-ready projections of engine and aggregator outputs. Nothing here computes
//! new figures; every number comes from [`KpiMetricsEngine`] or
//! [`FinancialHealthMetrics`].

use crate::engine::KpiMetricsEngine;
use crate::error::DashboardError;
use crate::records::{FinancialHealthMetrics, FinancialYearRecord};
use crate::schema::IndicatorFilter;
use crate::utils::truncate_label;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Indicators shown in the trend comparison chart.
pub const TREND_COMPARISON_LIMIT: usize = 10;
const LABEL_MAX_CHARS: usize = 20;

const RED: &str = "#dc2626";
const YELLOW: &str = "#ca8a04";
const GREEN: &str = "#16a34a";
const ORANGE: &str = "#ea580c";
const BLUE: &str = "#5f9baf";
const GRAY: &str = "#6b7280";
const REVENUE_GREEN: &str = "#0f8e48";
const EXPENSE_RED: &str = "#ec2227";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    StackedBar,
    GroupedBar,
    Line,
    Pie,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
    pub color: Option<String>,
    /// Datasets sharing a stack id are drawn stacked.
    pub stack: Option<String>,
}

impl Dataset {
    fn new(label: &str, data: Vec<f64>, color: &str) -> Self {
        Self {
            label: label.to_string(),
            data,
            color: Some(color.to_string()),
            stack: None,
        }
    }

    fn stacked(mut self, stack: &str) -> Self {
        self.stack = Some(stack.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartSeries {
    pub title: String,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
    pub kind: ChartKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KpiChart {
    DomainDistribution,
    TrendComparison,
}

impl FromStr for KpiChart {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "domain_distribution" => Ok(Self::DomainDistribution),
            "trend_comparison" => Ok(Self::TrendComparison),
            other => Err(DashboardError::UnknownChart(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinancialChart {
    RevenueExpenseTrend,
    RevenueComposition,
    KeyRevenueStreams,
    ExpenseBreakdown,
    ProgramServiceBreakdown,
}

impl FromStr for FinancialChart {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revenue_expense_trend" => Ok(Self::RevenueExpenseTrend),
            "revenue_composition" => Ok(Self::RevenueComposition),
            "key_revenue_streams" => Ok(Self::KeyRevenueStreams),
            "expense_breakdown" => Ok(Self::ExpenseBreakdown),
            "program_service_breakdown" => Ok(Self::ProgramServiceBreakdown),
            other => Err(DashboardError::UnknownChart(other.to_string())),
        }
    }
}

pub fn kpi_chart(
    engine: &KpiMetricsEngine,
    chart: KpiChart,
    filter: &IndicatorFilter,
) -> ChartSeries {
    match chart {
        KpiChart::DomainDistribution => domain_distribution(engine, filter),
        KpiChart::TrendComparison => trend_comparison(engine, filter),
    }
}

fn domain_distribution(engine: &KpiMetricsEngine, filter: &IndicatorFilter) -> ChartSeries {
    let by_domain = engine.summary(filter).indicators_by_domain;

    ChartSeries {
        title: "Indicators by Domain".to_string(),
        labels: by_domain.keys().cloned().collect(),
        datasets: vec![Dataset {
            label: "Indicators".to_string(),
            data: by_domain.values().map(|&n| n as f64).collect(),
            color: None,
            stack: None,
        }],
        kind: ChartKind::Pie,
    }
}

/// Current vs previous readings for the first indicators in listing order.
/// Indicators without both readings are left out.
fn trend_comparison(engine: &KpiMetricsEngine, filter: &IndicatorFilter) -> ChartSeries {
    let mut labels = Vec::new();
    let mut current = Vec::new();
    let mut previous = Vec::new();

    for indicator in engine
        .filtered_indicators(filter)
        .into_iter()
        .take(TREND_COMPARISON_LIMIT)
    {
        if let (Some(cur), Some(prev)) = engine.period_values(indicator) {
            labels.push(truncate_label(&indicator.name, LABEL_MAX_CHARS));
            current.push(cur);
            previous.push(prev);
        }
    }

    ChartSeries {
        title: "Current vs Previous Period".to_string(),
        labels,
        datasets: vec![
            Dataset::new(engine.current_period().unwrap_or("Current"), current, GREEN),
            Dataset::new(engine.previous_period().unwrap_or("Previous"), previous, GRAY),
        ],
        kind: ChartKind::GroupedBar,
    }
}

pub fn financial_chart(metrics: &FinancialHealthMetrics, chart: FinancialChart) -> ChartSeries {
    let labels: Vec<String> = metrics.years.iter().map(|r| r.year.to_string()).collect();
    let series = |f: fn(&FinancialYearRecord) -> f64| -> Vec<f64> {
        metrics.years.iter().map(f).collect()
    };

    let (title, datasets, kind) = match chart {
        FinancialChart::RevenueExpenseTrend => (
            "Revenue vs Expenses Trend",
            vec![
                Dataset::new("Total Revenue", series(|r| r.total_revenue), REVENUE_GREEN),
                Dataset::new("Total Expenses", series(|r| r.total_expenses), EXPENSE_RED),
            ],
            ChartKind::Line,
        ),
        FinancialChart::RevenueComposition => (
            "Revenue Composition by Source",
            vec![
                Dataset::new("Program Services", series(|r| r.program_service_revenue), RED)
                    .stacked("revenue"),
                Dataset::new("Contributions", series(|r| r.contributions_grants), YELLOW)
                    .stacked("revenue"),
                Dataset::new("Investment Income", series(|r| r.investment_income), GREEN)
                    .stacked("revenue"),
                Dataset::new("Other Revenue", series(|r| r.other_revenue), GRAY)
                    .stacked("revenue"),
            ],
            ChartKind::StackedBar,
        ),
        FinancialChart::KeyRevenueStreams => (
            "Key Revenue Streams Over Time",
            vec![
                Dataset::new("Program Services", series(|r| r.program_service_revenue), RED),
                Dataset::new("Contributions", series(|r| r.contributions_grants), YELLOW),
                Dataset::new("Investment Income", series(|r| r.investment_income), GREEN),
            ],
            ChartKind::Line,
        ),
        FinancialChart::ExpenseBreakdown => {
            let mut datasets = vec![
                Dataset::new("Salaries & Compensation", series(|r| r.salaries_compensation), RED)
                    .stacked("expenses"),
                Dataset::new("Other Expenses", series(|r| r.other_expenses), GRAY)
                    .stacked("expenses"),
            ];
            let management = series(|r| r.management_services.unwrap_or(0.0));
            if management.iter().any(|&v| v > 0.0) {
                datasets.push(
                    Dataset::new("Management Services (Pre-2024)", management, ORANGE)
                        .stacked("expenses"),
                );
            }
            ("Expense Breakdown", datasets, ChartKind::StackedBar)
        }
        FinancialChart::ProgramServiceBreakdown => (
            "Program Service Revenue Breakdown",
            vec![
                Dataset::new(
                    "Membership Dues",
                    series(|r| r.program_services.membership_dues.unwrap_or(0.0)),
                    RED,
                ),
                Dataset::new(
                    "Meetings & Conferences",
                    series(|r| r.program_services.meetings_conferences.unwrap_or(0.0)),
                    YELLOW,
                ),
                Dataset::new(
                    "Education & Certification",
                    series(|r| r.program_services.education_certification.unwrap_or(0.0)),
                    GREEN,
                ),
                Dataset::new(
                    "Project Management Fees",
                    series(|r| r.program_services.project_management_fees.unwrap_or(0.0)),
                    ORANGE,
                ),
                Dataset::new(
                    "Sponsorship Payments",
                    series(|r| {
                        r.program_services
                            .qualified_sponsorship_payments
                            .unwrap_or(0.0)
                    }),
                    BLUE,
                ),
                Dataset::new(
                    "Other Program Services",
                    series(|r| r.program_services.other_program_services.unwrap_or(0.0)),
                    GRAY,
                ),
            ],
            ChartKind::Line,
        ),
    };

    ChartSeries {
        title: title.to_string(),
        labels,
        datasets,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::FinancialAggregator;
    use crate::records::{DetailedExpenses, OtherExpenseLines, ProgramServiceBreakdown};
    use crate::schema::{KpiData, KpiIndicator, KpiMeasurement, KpiMetadata, TrendPreference};

    fn indicator(id: &str, domain: &str, values: [Option<f64>; 2]) -> KpiIndicator {
        let measurements = ["2024", "2025"]
            .iter()
            .zip(values)
            .map(|(p, value)| {
                (
                    p.to_string(),
                    KpiMeasurement {
                        value,
                        ..KpiMeasurement::default()
                    },
                )
            })
            .collect();

        KpiIndicator {
            id: id.to_string(),
            name: format!("Indicator number {}", id),
            description: String::new(),
            domain: domain.to_string(),
            stewards: vec!["S".to_string()],
            measurement_type: "N".to_string(),
            unit: "count".to_string(),
            target: None,
            targets: None,
            target_operation: None,
            tags: vec![],
            image: None,
            trend_direction: TrendPreference::Higher,
            measurements,
        }
    }

    fn catalog(indicators: Vec<KpiIndicator>) -> KpiData {
        KpiData {
            metadata: KpiMetadata {
                time_periods: vec!["2024".to_string(), "2025".to_string()],
                ..KpiMetadata::default()
            },
            indicators: indicators.into_iter().map(|i| (i.id.clone(), i)).collect(),
        }
    }

    #[test]
    fn test_parse_chart_ids() {
        assert_eq!(
            "trend_comparison".parse::<KpiChart>().unwrap(),
            KpiChart::TrendComparison
        );
        assert_eq!(
            "expense_breakdown".parse::<FinancialChart>().unwrap(),
            FinancialChart::ExpenseBreakdown
        );
        assert!("sparkline".parse::<KpiChart>().unwrap_err().is_not_found());
    }

    #[test]
    fn test_domain_distribution() {
        let data = catalog(vec![
            indicator("1", "Finance", [Some(1.0), Some(2.0)]),
            indicator("2", "Community", [None, None]),
            indicator("3", "Finance", [None, None]),
        ]);
        let engine = KpiMetricsEngine::new(&data);
        let chart = kpi_chart(&engine, KpiChart::DomainDistribution, &IndicatorFilter::default());

        assert_eq!(chart.kind, ChartKind::Pie);
        assert_eq!(chart.labels, vec!["Community", "Finance"]);
        assert_eq!(chart.datasets[0].data, vec![1.0, 2.0]);
    }

    #[test]
    fn test_trend_comparison_caps_and_skips() {
        let mut indicators: Vec<KpiIndicator> = (10..22)
            .map(|n| indicator(&n.to_string(), "Community", [Some(1.0), Some(n as f64)]))
            .collect();
        // Sorts first and has no previous reading, so it uses up one of the ten slots.
        indicators.push(indicator("00", "Alpha", [None, Some(5.0)]));
        let data = catalog(indicators);
        let engine = KpiMetricsEngine::new(&data);

        let chart = kpi_chart(&engine, KpiChart::TrendComparison, &IndicatorFilter::default());
        assert_eq!(chart.kind, ChartKind::GroupedBar);
        assert_eq!(chart.labels.len(), 9);
        assert_eq!(chart.labels[0], "Indicator number 10");
        assert_eq!(chart.datasets[0].label, "2025");
        assert_eq!(chart.datasets[0].data[0], 10.0);
        assert_eq!(chart.datasets[1].data[0], 1.0);
    }

    fn record(year: i32, management: Option<f64>) -> FinancialYearRecord {
        FinancialYearRecord {
            year,
            total_revenue: 100.0,
            total_expenses: 90.0,
            program_service_revenue: 70.0,
            contributions_grants: 20.0,
            investment_income: 5.0,
            other_revenue: 5.0,
            program_services: ProgramServiceBreakdown {
                membership_dues: Some(40.0),
                other_program_services: Some(30.0),
                ..ProgramServiceBreakdown::default()
            },
            salaries_compensation: 50.0,
            other_expenses: 40.0,
            management_services: management,
            detailed_expenses: DetailedExpenses::default(),
            other_expense_lines: OtherExpenseLines::default(),
            total_assets: 0.0,
            total_liabilities: 0.0,
            net_assets: 0.0,
            total_employees: 0,
            total_volunteers: 0,
        }
    }

    #[test]
    fn test_expense_breakdown_management_dataset() {
        let with_mgmt =
            FinancialAggregator::aggregate(vec![record(2023, Some(30.0)), record(2024, None)])
                .unwrap();
        let chart = financial_chart(&with_mgmt, FinancialChart::ExpenseBreakdown);
        assert_eq!(chart.labels, vec!["2023", "2024"]);
        assert_eq!(chart.datasets.len(), 3);
        assert_eq!(chart.datasets[2].data, vec![30.0, 0.0]);

        let without =
            FinancialAggregator::aggregate(vec![record(2023, Some(0.0)), record(2024, None)])
                .unwrap();
        assert_eq!(
            financial_chart(&without, FinancialChart::ExpenseBreakdown)
                .datasets
                .len(),
            2
        );
    }

    #[test]
    fn test_program_service_breakdown_fills_absent_with_zero() {
        let metrics = FinancialAggregator::aggregate(vec![record(2024, None)]).unwrap();
        let chart = financial_chart(&metrics, FinancialChart::ProgramServiceBreakdown);
        assert_eq!(chart.datasets.len(), 6);
        assert_eq!(chart.datasets[0].data, vec![40.0]);
        assert_eq!(chart.datasets[1].data, vec![0.0]);
        assert_eq!(chart.datasets[5].data, vec![30.0]);
    }

    #[test]
    fn test_revenue_composition_is_stacked() {
        let metrics = FinancialAggregator::aggregate(vec![record(2024, None)]).unwrap();
        let chart = financial_chart(&metrics, FinancialChart::RevenueComposition);
        assert_eq!(chart.kind, ChartKind::StackedBar);
        assert!(chart
            .datasets
            .iter()
            .all(|d| d.stack.as_deref() == Some("revenue")));
    }
}

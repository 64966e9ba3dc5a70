//! # KPI Dashboard
//!
//! Computation core for an organizational reporting dashboard: KPI trend and
//! target tracking over a catalog of indicators, plus multi-year financial health
//! derived from IRS Form 990 e-file XML.
//!
//! ## Core Concepts
//!
//! - **Indicator catalog**: indicators keyed by id, each with stewards, a domain,
//!   tags and measurements keyed by period label (`"2025"` or `"2025-T1"`)
//! - **Period ordering**: period labels sort lexicographically; the last two are
//!   the current and previous periods
//! - **Target resolution**: a period target beats an annual target, which beats
//!   the indicator's legacy target
//! - **Financial records**: one normalized record per filing year, with growth
//!   measured against the previous available year
//! - **Snapshots**: both catalogs are published as immutable snapshots and
//!   replaced whole on reload
//!
//! ## Example
//!
//! ```rust,ignore
//! use kpi_dashboard::*;
//!
//! let dashboard = Dashboard::from_config(DashboardConfig::default())?;
//!
//! let cards = dashboard.kpi_cards(&IndicatorFilter::for_steward("HL7 International"));
//! for card in &cards {
//!     println!("{}: {:?}", card.indicator.name, card.current_value);
//! }
//!
//! let chart = dashboard.chart("trend_comparison", &IndicatorFilter::default())?;
//! let revenue = dashboard.financial_chart("revenue_expense_trend")?;
//! ```

pub mod aggregator;
pub mod categories;
pub mod charts;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod ingestion;
pub mod prompts;
pub mod records;
pub mod schema;
pub mod store;
pub mod utils;

pub use aggregator::{calculate_trends, FinancialAggregator};
pub use charts::{
    financial_chart, kpi_chart, ChartKind, ChartSeries, Dataset, FinancialChart, KpiChart,
};
pub use config::DashboardConfig;
pub use engine::{KpiMetricsEngine, KPI_TAG};
pub use error::{DashboardError, Result};
pub use extractor::{ExtractionBatch, Form990Extractor, SkippedDocument};
pub use ingestion::{convert_rows_to_catalog, ingest_csv_files, IngestionOptions, KpiCsvRow};
pub use prompts::build_financial_analysis_prompt;
pub use records::*;
pub use schema::*;
pub use store::{FinancialStore, IndicatorStore};

use log::info;
use std::sync::Arc;

/// Entry point for the HTTP layer. Owns both catalog stores and derives every view
/// from their current snapshots on each call.
pub struct Dashboard {
    config: DashboardConfig,
    indicators: IndicatorStore,
    financials: FinancialStore,
}

impl Dashboard {
    /// Loads the indicator catalog eagerly. Financial data is read on first use.
    pub fn from_config(config: DashboardConfig) -> Result<Self> {
        let indicators = IndicatorStore::from_json_file(&config.kpi_data_path)?;
        let mut financials = FinancialStore::new(&config.financial_source_dir)
            .with_extractor(Form990Extractor::new().with_namespace(&config.efile_namespace));
        if let Some(cache) = &config.financial_cache_path {
            financials = financials.with_cache_file(cache);
        }

        info!(
            "Dashboard for {} loaded {} indicators from {}",
            config.organization_name,
            indicators.snapshot().indicators.len(),
            config.kpi_data_path.display()
        );

        Ok(Self::new(config, indicators, financials))
    }

    pub fn new(
        config: DashboardConfig,
        indicators: IndicatorStore,
        financials: FinancialStore,
    ) -> Self {
        Self {
            config,
            indicators,
            financials,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    fn with_engine<T>(&self, f: impl FnOnce(&KpiMetricsEngine) -> T) -> T {
        let data = self.indicators.snapshot();
        let engine = KpiMetricsEngine::new(&data).with_kpi_tag(&self.config.kpi_tag);
        f(&engine)
    }

    pub fn indicator(&self, id: &str) -> Result<KpiIndicator> {
        self.indicators.indicator(id)
    }

    pub fn indicators_by_steward(&self, steward: &str) -> Vec<KpiIndicator> {
        self.indicators.by_steward(steward)
    }

    pub fn indicators_by_domain(&self, domain: &str) -> Vec<KpiIndicator> {
        self.indicators.by_domain(domain)
    }

    /// Indicators matching `filter`, in card order.
    pub fn indicators(&self, filter: &IndicatorFilter) -> Vec<KpiIndicator> {
        self.with_engine(|engine| {
            engine
                .filtered_indicators(filter)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    pub fn kpi_cards(&self, filter: &IndicatorFilter) -> Vec<KpiCard> {
        self.with_engine(|engine| engine.kpi_cards(filter))
    }

    pub fn summary(&self, filter: &IndicatorFilter) -> KpiSummary {
        self.with_engine(|engine| engine.summary(filter))
    }

    pub fn dashboard_metrics(&self, steward: Option<&str>) -> DashboardMetrics {
        self.with_engine(|engine| engine.dashboard_metrics(steward))
    }

    pub fn metadata(&self) -> KpiMetadata {
        self.indicators.snapshot().metadata.clone()
    }

    pub fn chart(&self, chart_id: &str, filter: &IndicatorFilter) -> Result<ChartSeries> {
        let chart: KpiChart = chart_id.parse()?;
        Ok(self.with_engine(|engine| kpi_chart(engine, chart, filter)))
    }

    pub fn financial_health_metrics(&self) -> Result<Arc<FinancialHealthMetrics>> {
        self.financials.metrics()
    }

    pub fn financial_summary(&self) -> Result<FinancialSummary> {
        self.financials.metrics()?.summary().ok_or_else(|| {
            DashboardError::InsufficientData("no financial years available".to_string())
        })
    }

    pub fn financial_table(&self) -> Result<FinancialTable> {
        self.financials.metrics()?.detailed_table()
    }

    pub fn financial_chart(&self, chart_id: &str) -> Result<ChartSeries> {
        let chart: FinancialChart = chart_id.parse()?;
        let metrics = self.financials.metrics()?;
        Ok(financial_chart(&metrics, chart))
    }

    pub fn analysis_prompt(&self) -> Result<String> {
        let metrics = self.financials.metrics()?;
        Ok(build_financial_analysis_prompt(
            &self.config.organization_name,
            &metrics,
        ))
    }

    /// Re-reads the indicator catalog. Readers keep their old snapshot until done.
    pub fn reload_indicators(&self) -> Result<()> {
        self.indicators.reload()
    }

    /// Re-extracts every filing and publishes the new metrics.
    pub fn reload_financials(&self) -> Result<Arc<FinancialHealthMetrics>> {
        self.financials.refresh()
    }
}

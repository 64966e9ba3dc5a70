use crate::schema::{
    DashboardMetrics, IndicatorFilter, KpiCard, KpiData, KpiIndicator, KpiSummary, KpiTrend,
    TargetOperation, TargetProgress, TargetType, TrendDirection,
};
use crate::utils::{kpi_change_pct, period_year, progress_pct};
use log::debug;
use std::collections::BTreeMap;

/// Tag that marks an indicator as a headline KPI.
pub const KPI_TAG: &str = "KPI";

/// Trend, target and summary computations over one catalog snapshot.
///
/// "Current" and "previous" are the two lexicographically-latest period labels in
/// the catalog metadata; they are shared by every indicator.
pub struct KpiMetricsEngine<'a> {
    data: &'a KpiData,
    current_period: Option<&'a str>,
    previous_period: Option<&'a str>,
    kpi_tag: &'a str,
}

impl<'a> KpiMetricsEngine<'a> {
    pub fn new(data: &'a KpiData) -> Self {
        let periods = data.metadata.sorted_periods();
        let current_period = periods.last().copied();
        let previous_period = periods.len().checked_sub(2).map(|i| periods[i]);

        Self {
            data,
            current_period,
            previous_period,
            kpi_tag: KPI_TAG,
        }
    }

    pub fn with_kpi_tag(mut self, kpi_tag: &'a str) -> Self {
        self.kpi_tag = kpi_tag;
        self
    }

    pub fn current_period(&self) -> Option<&'a str> {
        self.current_period
    }

    pub fn previous_period(&self) -> Option<&'a str> {
        self.previous_period
    }

    /// Raw `(current, previous)` readings for the two latest periods.
    pub fn period_values(&self, indicator: &KpiIndicator) -> (Option<f64>, Option<f64>) {
        (
            self.current_period.and_then(|p| indicator.value_at(p)),
            self.previous_period.and_then(|p| indicator.value_at(p)),
        )
    }

    /// Change between the two latest periods. `None` when fewer than two periods
    /// exist or either reading is missing.
    pub fn calculate_trend(&self, indicator: &KpiIndicator) -> Option<KpiTrend> {
        let (Some(current), Some(previous)) = self.period_values(indicator) else {
            return None;
        };

        let change_pct = kpi_change_pct(current, previous);
        let trend = if change_pct > 0.0 {
            TrendDirection::Up
        } else if change_pct < 0.0 {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        };

        Some(KpiTrend {
            current,
            previous,
            change_pct,
            trend,
        })
    }

    /// Resolves the target in priority order: period, annual, legacy, none.
    ///
    /// Returns `None` when the current period has no reading for this indicator.
    pub fn calculate_progress_to_target(&self, indicator: &KpiIndicator) -> Option<TargetProgress> {
        let period = self.current_period?;
        let measurement = indicator.measurement(period)?;
        let current = measurement.value?;

        let (target_type, target, compared) = if let Some(target) = measurement.target {
            (TargetType::Period, target, current)
        } else if let Some(target) = indicator.annual_target(period) {
            let year = period_year(period);
            (
                TargetType::Annual,
                target,
                self.annual_value(indicator, year),
            )
        } else if let Some(target) = indicator.target {
            (TargetType::Legacy, target, current)
        } else {
            return Some(TargetProgress {
                target_type: TargetType::None,
                progress: None,
                target_value: None,
                compared_value: Some(current),
            });
        };

        Some(TargetProgress {
            target_type,
            progress: Some(progress_pct(compared, target)),
            target_value: Some(target),
            compared_value: Some(compared),
        })
    }

    /// Combined reading for every period whose label starts with `year`, using
    /// the indicator's target operation. Periods without a value are ignored;
    /// 0 when none remain.
    pub fn annual_value(&self, indicator: &KpiIndicator, year: &str) -> f64 {
        let values: Vec<f64> = indicator
            .measurements
            .iter()
            .filter(|(period, _)| period.starts_with(year))
            .filter_map(|(_, m)| m.value)
            .collect();

        if values.is_empty() {
            return 0.0;
        }

        let total: f64 = values.iter().sum();
        match indicator.target_operation() {
            TargetOperation::Sum => total,
            TargetOperation::Average => total / values.len() as f64,
        }
    }

    pub fn create_card(&self, indicator: &KpiIndicator) -> KpiCard {
        let (current_value, previous_value) = self.period_values(indicator);
        let progress = self.calculate_progress_to_target(indicator);

        KpiCard {
            indicator: indicator.clone(),
            current_value,
            previous_value,
            trend: self.calculate_trend(indicator),
            progress_to_target: progress.as_ref().and_then(|p| p.progress),
            target_type: progress.as_ref().map(|p| p.target_type),
            target_value: progress.as_ref().and_then(|p| p.target_value),
        }
    }

    /// Indicators passing `filter`, ordered by domain then name.
    pub fn filtered_indicators(&self, filter: &IndicatorFilter) -> Vec<&'a KpiIndicator> {
        let mut indicators: Vec<&KpiIndicator> = self
            .data
            .indicators
            .values()
            .filter(|i| filter.matches(i, self.kpi_tag))
            .collect();

        indicators.sort_by(|a, b| (&a.domain, &a.name).cmp(&(&b.domain, &b.name)));
        indicators
    }

    pub fn kpi_cards(&self, filter: &IndicatorFilter) -> Vec<KpiCard> {
        let cards: Vec<KpiCard> = self
            .filtered_indicators(filter)
            .into_iter()
            .map(|i| self.create_card(i))
            .collect();
        debug!("Built {} KPI cards for {:?}", cards.len(), filter);
        cards
    }

    pub fn summary(&self, filter: &IndicatorFilter) -> KpiSummary {
        let indicators = self.filtered_indicators(filter);

        let mut indicators_by_domain: BTreeMap<String, usize> = BTreeMap::new();
        let mut indicators_by_steward: BTreeMap<String, usize> = BTreeMap::new();
        for indicator in &indicators {
            *indicators_by_domain
                .entry(indicator.domain.clone())
                .or_default() += 1;
            for steward in &indicator.stewards {
                *indicators_by_steward.entry(steward.clone()).or_default() += 1;
            }
        }

        KpiSummary {
            total_indicators: indicators.len(),
            indicators_by_domain,
            indicators_by_steward,
            time_periods: self.data.metadata.time_periods.clone(),
            latest_period: self.current_period.unwrap_or_default().to_string(),
        }
    }

    pub fn dashboard_metrics(&self, steward: Option<&str>) -> DashboardMetrics {
        let filter = IndicatorFilter {
            steward: steward.map(str::to_string),
            ..IndicatorFilter::default()
        };

        DashboardMetrics {
            kpi_cards: self.kpi_cards(&filter),
            summary: self.summary(&filter),
            metadata: self.data.metadata.clone(),
        }
    }
}

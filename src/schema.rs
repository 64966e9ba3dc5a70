use crate::utils::period_year;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetOperation {
    #[schemars(description = "Annual figure is the sum of all sub-period readings in the year")]
    #[default]
    Sum,

    #[schemars(description = "Annual figure is the arithmetic mean of all sub-period readings in the year")]
    Average,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendPreference {
    #[default]
    Higher,
    Lower,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema, Default)]
pub struct KpiMeasurement {
    #[schemars(description = "Measured value. Absent means no data for the period, which is distinct from zero.")]
    #[serde(default)]
    pub value: Option<f64>,

    #[schemars(description = "Period-specific target overriding annual and legacy targets")]
    #[serde(default)]
    pub target: Option<f64>,

    #[schemars(description = "Free-form note attached to this reading")]
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct KpiIndicator {
    #[schemars(description = "Unique identifier for the KPI (e.g. 'CSDO-14')")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[schemars(description = "Single category the indicator belongs to")]
    pub domain: String,

    #[schemars(description = "Owning organizations, primary steward first. Never empty.")]
    pub stewards: Vec<String>,

    #[schemars(description = "Measurement type as exported (N, %, Ave per Item, ...)")]
    #[serde(rename = "type", default)]
    pub measurement_type: String,

    #[serde(default)]
    pub unit: String,

    #[schemars(description = "Legacy single target, used when neither a period nor an annual target applies")]
    #[serde(default)]
    pub target: Option<f64>,

    #[schemars(description = "Annual targets keyed by four-digit year")]
    #[serde(default)]
    pub targets: Option<BTreeMap<String, f64>>,

    #[schemars(description = "How sub-period readings combine into an annual figure; defaults to sum")]
    #[serde(default)]
    pub target_operation: Option<TargetOperation>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub trend_direction: TrendPreference,

    #[schemars(description = "Measurements keyed by period label ('YYYY' or 'YYYY-Txx')")]
    #[serde(default)]
    pub measurements: BTreeMap<String, KpiMeasurement>,
}

impl KpiIndicator {
    pub fn primary_steward(&self) -> Option<&str> {
        self.stewards.first().map(String::as_str)
    }

    pub fn has_steward(&self, steward: &str) -> bool {
        self.stewards.iter().any(|s| s == steward)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn measurement(&self, period: &str) -> Option<&KpiMeasurement> {
        self.measurements.get(period)
    }

    /// Reading for `period`, or `None` when there is no measurement or it carries no value.
    pub fn value_at(&self, period: &str) -> Option<f64> {
        self.measurements.get(period).and_then(|m| m.value)
    }

    pub fn annual_target(&self, period: &str) -> Option<f64> {
        let year = period_year(period);
        self.targets.as_ref().and_then(|t| t.get(year)).copied()
    }

    pub fn target_operation(&self) -> TargetOperation {
        self.target_operation.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema, Default)]
pub struct KpiMetadata {
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub last_updated: String,

    #[serde(default)]
    pub data_source: String,

    #[schemars(description = "All period labels present in the catalog")]
    pub time_periods: Vec<String>,

    pub domains: Vec<String>,

    pub stewards: Vec<String>,

    #[schemars(description = "Unix timestamp of the ingestion run, used for cache busting")]
    #[serde(default)]
    pub refresh_timestamp: Option<i64>,
}

impl KpiMetadata {
    /// Period labels in ascending lexicographic order.
    pub fn sorted_periods(&self) -> Vec<&str> {
        let mut periods: Vec<&str> = self.time_periods.iter().map(String::as_str).collect();
        periods.sort_unstable();
        periods.dedup();
        periods
    }

    pub fn latest_period(&self) -> Option<&str> {
        self.time_periods.iter().map(String::as_str).max()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema, Default)]
pub struct KpiData {
    pub metadata: KpiMetadata,
    pub indicators: BTreeMap<String, KpiIndicator>,
}

impl KpiData {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(KpiData)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KpiTrend {
    pub current: f64,
    pub previous: f64,
    pub change_pct: f64,
    pub trend: TrendDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Period,
    Annual,
    Legacy,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetProgress {
    pub target_type: TargetType,
    /// Percentage of target reached. Never capped at 100.
    pub progress: Option<f64>,
    pub target_value: Option<f64>,
    /// The figure compared against the target (an annual aggregate for annual targets).
    pub compared_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KpiCard {
    pub indicator: KpiIndicator,
    pub current_value: Option<f64>,
    pub previous_value: Option<f64>,
    pub trend: Option<KpiTrend>,
    pub progress_to_target: Option<f64>,
    pub target_type: Option<TargetType>,
    pub target_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct KpiSummary {
    pub total_indicators: usize,
    pub indicators_by_domain: BTreeMap<String, usize>,
    /// An indicator counts once for every steward it lists, so these need not sum to the total.
    pub indicators_by_steward: BTreeMap<String, usize>,
    pub time_periods: Vec<String>,
    pub latest_period: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardMetrics {
    pub kpi_cards: Vec<KpiCard>,
    pub summary: KpiSummary,
    pub metadata: KpiMetadata,
}

/// Listing filters. Every populated field narrows the result (AND semantics).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndicatorFilter {
    pub steward: Option<String>,
    pub domain: Option<String>,
    #[serde(default)]
    pub kpi_only: bool,
    pub tag: Option<String>,
}

impl IndicatorFilter {
    pub fn for_steward(steward: impl Into<String>) -> Self {
        Self {
            steward: Some(steward.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, indicator: &KpiIndicator, kpi_tag: &str) -> bool {
        if let Some(steward) = &self.steward {
            if !indicator.has_steward(steward) {
                return false;
            }
        }
        if let Some(domain) = &self.domain {
            if &indicator.domain != domain {
                return false;
            }
        }
        if self.kpi_only && !indicator.has_tag(kpi_tag) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !indicator.has_tag(tag) {
                return false;
            }
        }
        true
    }
}

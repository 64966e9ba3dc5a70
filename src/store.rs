//! Process-wide catalog state. Each store publishes an immutable snapshot behind
//! an `Arc`; reloads build the replacement completely before swapping it in, so a
//! reader holding a snapshot never sees a half-updated catalog.

use crate::aggregator::FinancialAggregator;
use crate::error::{DashboardError, Result};
use crate::extractor::Form990Extractor;
use crate::records::FinancialHealthMetrics;
use crate::schema::{KpiData, KpiIndicator};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct IndicatorStore {
    source: Option<PathBuf>,
    snapshot: RwLock<Arc<KpiData>>,
}

impl IndicatorStore {
    pub fn from_data(data: KpiData) -> Result<Self> {
        validate_catalog(&data)?;
        Ok(Self {
            source: None,
            snapshot: RwLock::new(Arc::new(data)),
        })
    }

    /// Loads the catalog JSON written by the ingestion step; [`reload`](Self::reload)
    /// re-reads the same file.
    pub fn from_json_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = load_catalog(&path)?;
        Ok(Self {
            source: Some(path),
            snapshot: RwLock::new(Arc::new(data)),
        })
    }

    /// The current catalog. The returned snapshot stays valid across reloads.
    pub fn snapshot(&self) -> Arc<KpiData> {
        Arc::clone(&self.snapshot.read())
    }

    /// Re-reads the backing file. On failure the previous snapshot stays published.
    /// A store built with [`from_data`](Self::from_data) has no file; reloading it
    /// leaves the snapshot untouched, and only [`replace`](Self::replace) changes it.
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.source else {
            debug!("KPI catalog has no backing file; reload skipped");
            return Ok(());
        };
        let data = load_catalog(path)?;
        self.replace(data)
    }

    pub fn replace(&self, data: KpiData) -> Result<()> {
        validate_catalog(&data)?;
        let count = data.indicators.len();
        *self.snapshot.write() = Arc::new(data);
        info!("Published KPI catalog with {} indicators", count);
        Ok(())
    }

    pub fn indicator(&self, id: &str) -> Result<KpiIndicator> {
        self.snapshot()
            .indicators
            .get(id)
            .cloned()
            .ok_or_else(|| DashboardError::IndicatorNotFound(id.to_string()))
    }

    pub fn by_steward(&self, steward: &str) -> Vec<KpiIndicator> {
        self.snapshot()
            .indicators
            .values()
            .filter(|i| i.has_steward(steward))
            .cloned()
            .collect()
    }

    pub fn by_domain(&self, domain: &str) -> Vec<KpiIndicator> {
        self.snapshot()
            .indicators
            .values()
            .filter(|i| i.domain == domain)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<KpiIndicator> {
        self.snapshot().indicators.values().cloned().collect()
    }
}

fn load_catalog(path: &Path) -> Result<KpiData> {
    let json = fs::read_to_string(path)?;
    let data: KpiData = serde_json::from_str(&json)?;
    validate_catalog(&data)?;
    Ok(data)
}

fn validate_catalog(data: &KpiData) -> Result<()> {
    for (key, indicator) in &data.indicators {
        if indicator.stewards.is_empty() {
            return Err(DashboardError::InvalidIndicator {
                id: key.clone(),
                details: "indicator has no stewards".to_string(),
            });
        }
    }
    Ok(())
}

/// Financial metrics derived from a directory of Form 990 filings, optionally
/// cached as JSON between process runs.
pub struct FinancialStore {
    source_dir: PathBuf,
    cache_file: Option<PathBuf>,
    extractor: Form990Extractor,
    snapshot: RwLock<Option<Arc<FinancialHealthMetrics>>>,
}

impl FinancialStore {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            cache_file: None,
            extractor: Form990Extractor::new(),
            snapshot: RwLock::new(None),
        }
    }

    pub fn with_cache_file(mut self, cache_file: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(cache_file.into());
        self
    }

    /// Replaces the default extractor, e.g. to read filings under another namespace.
    pub fn with_extractor(mut self, extractor: Form990Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Starts from already-computed metrics instead of reading the source directory.
    pub fn with_metrics(self, metrics: FinancialHealthMetrics) -> Self {
        *self.snapshot.write() = Some(Arc::new(metrics));
        self
    }

    /// Current metrics, loading them from the cache or the filings on first use.
    pub fn metrics(&self) -> Result<Arc<FinancialHealthMetrics>> {
        if let Some(metrics) = self.snapshot.read().as_ref() {
            return Ok(Arc::clone(metrics));
        }

        let loaded = Arc::new(self.load()?);
        let mut slot = self.snapshot.write();
        // Another caller may have published while we were loading.
        Ok(Arc::clone(slot.get_or_insert(loaded)))
    }

    /// Re-extracts every filing, rewrites the cache and publishes the result.
    pub fn refresh(&self) -> Result<Arc<FinancialHealthMetrics>> {
        let metrics = Arc::new(self.extract()?);
        self.save_cache(&metrics);
        *self.snapshot.write() = Some(Arc::clone(&metrics));
        info!(
            "Refreshed financial metrics: {} years, latest {}",
            metrics.years.len(),
            metrics.latest_year
        );
        Ok(metrics)
    }

    fn load(&self) -> Result<FinancialHealthMetrics> {
        if let Some(cached) = self.read_cache() {
            return Ok(cached);
        }
        let metrics = self.extract()?;
        self.save_cache(&metrics);
        Ok(metrics)
    }

    fn extract(&self) -> Result<FinancialHealthMetrics> {
        let batch = self.extractor.extract_directory(&self.source_dir)?;
        FinancialAggregator::aggregate_batch(batch)
    }

    fn read_cache(&self) -> Option<FinancialHealthMetrics> {
        let path = self.cache_file.as_ref().filter(|p| p.exists())?;
        let parsed = fs::read_to_string(path)
            .map_err(DashboardError::from)
            .and_then(|json| serde_json::from_str(&json).map_err(DashboardError::from));

        match parsed {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!("Ignoring financial cache {}: {}", path.display(), e);
                None
            }
        }
    }

    fn save_cache(&self, metrics: &FinancialHealthMetrics) {
        let Some(path) = &self.cache_file else {
            return;
        };
        let write = || -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, serde_json::to_string_pretty(metrics)?)?;
            Ok(())
        };
        if let Err(e) = write() {
            error!("Failed to write financial cache {}: {}", path.display(), e);
        }
    }
}

use crate::engine::KPI_TAG;
use crate::error::Result;
use crate::extractor::EFILE_NAMESPACE;
use crate::ingestion::IngestionOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Catalog JSON written by ingestion and read by the indicator store.
    pub kpi_data_path: PathBuf,
    /// Directory of Form 990 XML filings.
    pub financial_source_dir: PathBuf,
    pub financial_cache_path: Option<PathBuf>,
    /// XML namespace of the e-file elements.
    pub efile_namespace: String,
    pub organization_name: String,
    pub kpi_tag: String,
    pub ingestion: IngestionOptions,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            kpi_data_path: PathBuf::from("data/processed/kpi_data.json"),
            financial_source_dir: PathBuf::from("data/990s"),
            financial_cache_path: Some(PathBuf::from("data/processed/financial_data.json")),
            efile_namespace: EFILE_NAMESPACE.to_string(),
            organization_name: "HL7 International".to_string(),
            kpi_tag: KPI_TAG.to_string(),
            ingestion: IngestionOptions::default(),
        }
    }
}

impl DashboardConfig {
    /// Keys absent from the file keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

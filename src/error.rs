use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Malformed document {document}: {details}")]
    MalformedDocument { document: String, details: String },

    #[error("No IRS990 section found in {0}")]
    MissingFinancialSection(String),

    #[error("Could not determine tax year for {0}")]
    UnresolvableYear(String),

    #[error("No valid 990 forms found ({skipped} documents skipped)")]
    EmptyBatch { skipped: usize },

    #[error("Indicator not found: {0}")]
    IndicatorNotFound(String),

    #[error("Unknown chart type: {0}")]
    UnknownChart(String),

    #[error("Invalid indicator {id}: {details}")]
    InvalidIndicator { id: String, details: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error(transparent)]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DashboardError {
    /// Lookup misses that the HTTP layer reports as "not found" rather than a server error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DashboardError::IndicatorNotFound(_) | DashboardError::UnknownChart(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;

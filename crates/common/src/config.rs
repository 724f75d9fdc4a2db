/*
 * Configuration for an audit run.
 */

use crate::model::{LakehouseType, TableDescriptor};
use crate::storage::StorageConfig;
use crate::{AuditError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Target file size chosen by lakehouse auto-tuning for tables under ~2.56 TB.
///
/// Assumes the default auto-tuning tiers; larger tables target bigger files,
/// so this stays configurable through `size_threshold_mb`.
pub const DEFAULT_SIZE_THRESHOLD_MB: f64 = 256.0;

/// Run configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct AuditConfig {
    /// Table format of every configured table (required)
    pub lakehouse_type: Option<LakehouseType>,

    /// Bucket (or container / local root) holding the tables
    pub bucket: String,

    /// Table root prefixes inside the bucket
    pub tables: Vec<String>,

    /// Average file size above which the target size should grow (default: 256 MB)
    pub size_threshold_mb: f64,

    /// Maximum number of tables audited at once (default: 1)
    pub concurrency_limit: usize,

    /// Number of dead file names kept in each report entry (default: 10)
    pub dead_file_sample_size: usize,

    /// Objects requested per listing page (default: 1000)
    pub page_size: usize,

    /// Backoff for listing pages
    pub retry: RetrySettings,

    /// Object store connection settings
    pub storage: StorageConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            lakehouse_type: None,
            bucket: String::new(),
            tables: Vec::new(),
            size_threshold_mb: DEFAULT_SIZE_THRESHOLD_MB,
            concurrency_limit: 1,
            dead_file_sample_size: 10,
            page_size: 1000,
            retry: RetrySettings::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Retry settings in plain units so they can live in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl AuditConfig {
    /// Loads a config from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AuditError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AuditError::Configuration(e.to_string()))
    }

    /// Checks every run-level invariant. Nothing touches storage before this passes.
    pub fn validate(&self) -> Result<LakehouseType> {
        let lakehouse_type = self.lakehouse_type.ok_or_else(|| {
            AuditError::Configuration(
                "Lakehouse type is required, must be either 'delta' or 'iceberg'".to_string(),
            )
        })?;

        if self.bucket.trim().is_empty() {
            return Err(AuditError::Configuration(
                "Bucket name cannot be empty".to_string(),
            ));
        }
        if self.tables.is_empty() {
            return Err(AuditError::Configuration(
                "Table list cannot be empty".to_string(),
            ));
        }
        if !(self.size_threshold_mb.is_finite() && self.size_threshold_mb > 0.0) {
            return Err(AuditError::Configuration(format!(
                "Size threshold must be a positive number of MB, got {}",
                self.size_threshold_mb
            )));
        }
        if self.concurrency_limit == 0 {
            return Err(AuditError::Configuration(
                "Concurrency limit must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(AuditError::Configuration(
                "Page size must be at least 1".to_string(),
            ));
        }

        Ok(lakehouse_type)
    }

    /// Validates the config and builds one descriptor per configured table, in order.
    pub fn table_descriptors(&self) -> Result<Vec<TableDescriptor>> {
        let lakehouse_type = self.validate()?;
        self.tables
            .iter()
            .map(|table| TableDescriptor::new(lakehouse_type, self.bucket.clone(), table.clone()))
            .collect()
    }
}

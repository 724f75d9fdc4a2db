/*
 * Shared data model: what the object store reports and what is audited.
 */

use crate::{AuditError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One object-store entry, as produced by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    /// Full key relative to the bucket root
    pub key: String,
    /// Object size in bytes
    pub size_bytes: u64,
    /// Last modification time, when the backend reports one
    pub last_modified: Option<DateTime<Utc>>,
}

impl StorageObject {
    pub fn new(key: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            key: key.into(),
            size_bytes,
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }
}

/// Table format layered over the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LakehouseType {
    Delta,
    Iceberg,
}

impl FromStr for LakehouseType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delta" => Ok(LakehouseType::Delta),
            "iceberg" => Ok(LakehouseType::Iceberg),
            other => Err(AuditError::Configuration(format!(
                "Invalid lakehouse type '{}', must be either 'delta' or 'iceberg'",
                other
            ))),
        }
    }
}

impl fmt::Display for LakehouseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LakehouseType::Delta => f.write_str("delta"),
            LakehouseType::Iceberg => f.write_str("iceberg"),
        }
    }
}

/// A table under audit. Validated on construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    lakehouse_type: LakehouseType,
    bucket: String,
    table_prefix: String,
}

impl TableDescriptor {
    pub fn new(
        lakehouse_type: LakehouseType,
        bucket: impl Into<String>,
        table_prefix: impl Into<String>,
    ) -> Result<Self> {
        let bucket = bucket.into();
        let table_prefix = table_prefix.into();

        if bucket.trim().is_empty() {
            return Err(AuditError::Configuration(
                "Bucket name cannot be empty".to_string(),
            ));
        }
        if table_prefix.trim().is_empty() {
            return Err(AuditError::Configuration(
                "Table prefix cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            lakehouse_type,
            bucket,
            table_prefix,
        })
    }

    pub fn lakehouse_type(&self) -> LakehouseType {
        self.lakehouse_type
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    /// Table prefix with exactly one trailing separator, as object stores list directories.
    pub fn listing_prefix(&self) -> String {
        format!("{}/", self.table_prefix.trim_end_matches('/'))
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.lakehouse_type, self.bucket, self.table_prefix)
    }
}

/*
 * Manifest Readers
 *
 * Each table format keeps its own record of which data files make up the
 * current snapshot. Readers turn that record into a flat list of paths.
 */

pub mod delta;
pub mod iceberg;

use async_trait::async_trait;
use lakeaudit_common::{LakehouseType, OperatorRegistry, Result, ResultExt, TableDescriptor};
use std::sync::Arc;

pub use self::delta::DeltaLogReader;
pub use self::iceberg::IcebergMetadataReader;

/// Lists the data files a table's current snapshot references.
#[async_trait]
pub trait ManifestReader: Send + Sync {
    /// Returns the live file paths; absolute or table-relative depending on format.
    async fn live_files(&self, table: &TableDescriptor) -> Result<Vec<String>>;
}

/// Dispatches to the reader matching the table's lakehouse type.
pub struct FormatManifestReader {
    delta: DeltaLogReader,
    iceberg: IcebergMetadataReader,
}

impl FormatManifestReader {
    pub fn new(operators: Arc<OperatorRegistry>) -> Self {
        Self {
            delta: DeltaLogReader::new(operators.clone()),
            iceberg: IcebergMetadataReader::new(operators),
        }
    }
}

#[async_trait]
impl ManifestReader for FormatManifestReader {
    async fn live_files(&self, table: &TableDescriptor) -> Result<Vec<String>> {
        let files = match table.lakehouse_type() {
            LakehouseType::Delta => self.delta.live_files(table).await,
            LakehouseType::Iceberg => self.iceberg.live_files(table).await,
        };
        files.with_context(|| format!("reading manifest of {}", table))
    }
}

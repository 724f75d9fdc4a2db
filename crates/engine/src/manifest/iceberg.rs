/*
 * Iceberg snapshot reader.
 *
 * Locates the table's current metadata file, opens the table statically
 * (no catalog involved) and scans the current snapshot for data and
 * delete files.
 */

use async_trait::async_trait;
use futures::TryStreamExt;
use iceberg::io::FileIO;
use iceberg::scan::FileScanTask;
use iceberg::table::StaticTable;
use iceberg::{NamespaceIdent, TableIdent};
use lakeaudit_common::{AuditError, OperatorRegistry, Result, TableDescriptor};
use opendal::{ErrorKind, Operator};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::ManifestReader;
use crate::path::file_name;

const METADATA_DIR: &str = "metadata/";
const METADATA_SUFFIX: &str = ".metadata.json";
const VERSION_HINT_FILE: &str = "version-hint.text";

/// Version encoded in a metadata file name.
///
/// Accepts `<NNNNN>-<uuid>.metadata.json` (catalog-managed tables) and
/// `v<N>.metadata.json` (Hadoop tables), optionally gzip-compressed.
fn metadata_version(name: &str) -> Option<i64> {
    let stem = name.strip_suffix(METADATA_SUFFIX)?;
    let stem = stem.strip_suffix(".gz").unwrap_or(stem);

    match stem.strip_prefix('v') {
        Some(version) => version.parse().ok(),
        None => stem.split_once('-')?.0.parse().ok(),
    }
}

/// Chooses the current metadata file among `names`.
///
/// A version hint wins when it points at an existing file; otherwise the
/// highest version does.
fn select_metadata_file<'a>(names: &[&'a str], hint: Option<&str>) -> Option<&'a str> {
    let hinted = hint.map(str::trim).and_then(|hint| {
        let wanted: Option<i64> = hint
            .parse()
            .ok()
            .or_else(|| metadata_version(file_name(hint)));
        names
            .iter()
            .copied()
            .find(|name| *name == file_name(hint) || (wanted.is_some() && metadata_version(name) == wanted))
    });

    hinted.or_else(|| {
        names
            .iter()
            .copied()
            .filter_map(|name| metadata_version(name).map(|v| (v, name)))
            .max_by_key(|(version, _)| *version)
            .map(|(_, name)| name)
    })
}

/// Reads live files from an Iceberg table's current snapshot.
pub struct IcebergMetadataReader {
    operators: Arc<OperatorRegistry>,
}

impl IcebergMetadataReader {
    pub fn new(operators: Arc<OperatorRegistry>) -> Self {
        Self { operators }
    }

    async fn read_version_hint(op: &Operator, metadata_dir: &str) -> Result<Option<String>> {
        let path = format!("{}{}", metadata_dir, VERSION_HINT_FILE);
        match op.read(&path).await {
            Ok(buf) => Ok(Some(String::from_utf8_lossy(&buf.to_vec()).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuditError::ManifestRead(format!("{}: {}", path, e))),
        }
    }

    /// Path (relative to the bucket) of the table's current metadata file.
    async fn current_metadata_path(&self, op: &Operator, table: &TableDescriptor) -> Result<String> {
        let metadata_dir = format!("{}{}", table.listing_prefix(), METADATA_DIR);
        let entries = op
            .list(&metadata_dir)
            .await
            .map_err(|e| AuditError::ManifestRead(format!("{}: {}", metadata_dir, e)))?;
        let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
        let hint = Self::read_version_hint(op, &metadata_dir).await?;

        select_metadata_file(&names, hint.as_deref())
            .map(|name| format!("{}{}", metadata_dir, name))
            .ok_or_else(|| {
                AuditError::ManifestRead(format!("no Iceberg metadata file found under {}", metadata_dir))
            })
    }
}

#[async_trait]
impl ManifestReader for IcebergMetadataReader {
    async fn live_files(&self, table: &TableDescriptor) -> Result<Vec<String>> {
        let op = self.operators.operator(table.bucket())?;
        let metadata_path = self.current_metadata_path(&op, table).await?;

        let storage = self.operators.config();
        let location = storage.location(table.bucket(), &metadata_path)?;
        debug!(table = %table, metadata = %location, "Opening Iceberg metadata");

        let file_io = FileIO::from_path(&location)?
            .with_props(storage.file_io_props())
            .build()?;
        let ident = TableIdent::new(
            NamespaceIdent::new("lakeaudit".to_string()),
            file_name(table.table_prefix().trim_end_matches('/')).to_string(),
        );
        let static_table = StaticTable::from_metadata_file(&location, ident, file_io).await?;
        let iceberg_table = static_table.into_table();

        let scan = iceberg_table.scan().build()?;
        let tasks: Vec<FileScanTask> = scan.plan_files().await?.try_collect().await?;

        let mut live = BTreeSet::new();
        for task in &tasks {
            live.insert(task.data_file_path.clone());
            for delete in &task.deletes {
                live.insert(delete.file_path.clone());
            }
        }
        debug!(table = %table, files = live.len(), "Scanned current snapshot");

        Ok(live.into_iter().collect())
    }
}

//! Iceberg snapshot reads and full audits against a local filesystem table.

use iceberg::io::{FileIO, FileIOBuilder};
use iceberg::spec::{
    DataContentType, DataFile, DataFileBuilder, DataFileFormat, ManifestListWriter,
    ManifestWriterBuilder, NestedField, Operation, PrimitiveType, Schema, Snapshot,
    SnapshotReference, SnapshotRetention, Struct, Summary, TableMetadata, TableMetadataBuilder, Type,
    MAIN_BRANCH,
};
use iceberg::TableCreation;
use lakeaudit_common::{
    AuditConfigBuilder, LakehouseType, OperatorRegistry, StorageBackend, StorageConfig,
    TableDescriptor,
};
use lakeaudit_engine::{
    CancelSignal, FormatManifestReader, IcebergMetadataReader, ManifestReader, OpendalLister,
    TableAuditor,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

const TABLE: &str = "warehouse/orders";
const SNAPSHOT_ID: i64 = 1;

/// A table directory under a temporary bucket root.
struct LocalTable {
    root: TempDir,
    file_io: FileIO,
}

impl LocalTable {
    fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            file_io: FileIOBuilder::new_fs_io().build().unwrap(),
        }
    }

    fn bucket(&self) -> &str {
        self.root.path().to_str().unwrap()
    }

    fn location(&self) -> String {
        format!("file://{}/{}", self.bucket(), TABLE)
    }

    fn path(&self, relative: &str) -> String {
        format!("{}/{}", self.location(), relative)
    }

    fn registry(&self) -> Arc<OperatorRegistry> {
        Arc::new(OperatorRegistry::new(StorageConfig::new(StorageBackend::Local)))
    }

    fn descriptor(&self) -> TableDescriptor {
        TableDescriptor::new(LakehouseType::Iceberg, self.bucket(), TABLE).unwrap()
    }

    async fn write(&self, relative: &str, bytes: Vec<u8>) {
        self.file_io
            .new_output(self.path(relative))
            .unwrap()
            .write(bytes.into())
            .await
            .unwrap();
    }

    async fn write_metadata(&self, name: &str, metadata: &TableMetadata) {
        let json = serde_json::to_vec(metadata).unwrap();
        self.write(&format!("metadata/{}", name), json).await;
    }

    /// Metadata of a freshly created table, without snapshots.
    fn created(&self) -> TableMetadata {
        let schema = Schema::builder()
            .with_schema_id(0)
            .with_fields(vec![
                NestedField::required(1, "id", Type::Primitive(PrimitiveType::Long)).into(),
                NestedField::optional(2, "region", Type::Primitive(PrimitiveType::String)).into(),
            ])
            .build()
            .unwrap();
        let creation = TableCreation::builder()
            .name("orders".to_string())
            .location(self.location())
            .schema(schema)
            .properties(HashMap::new())
            .build();
        TableMetadataBuilder::from_table_creation(creation)
            .unwrap()
            .build()
            .unwrap()
            .metadata
    }

    /// Commits one snapshot holding `data` files and `deletes` position delete files.
    async fn with_snapshot(&self, base: &TableMetadata, data: &[&str], deletes: &[&str]) -> TableMetadata {
        let mut manifests = Vec::new();

        let mut writer = ManifestWriterBuilder::new(
            self.file_io.new_output(self.path("metadata/data-m0.avro")).unwrap(),
            Some(SNAPSHOT_ID),
            None,
            base.current_schema().clone(),
            base.default_partition_spec().as_ref().clone(),
        )
        .build_v2_data();
        for name in data {
            writer
                .add_file(data_file(DataContentType::Data, self.path(name)), 1)
                .unwrap();
        }
        manifests.push(writer.write_manifest_file().await.unwrap());

        if !deletes.is_empty() {
            let mut writer = ManifestWriterBuilder::new(
                self.file_io.new_output(self.path("metadata/deletes-m0.avro")).unwrap(),
                Some(SNAPSHOT_ID),
                None,
                base.current_schema().clone(),
                base.default_partition_spec().as_ref().clone(),
            )
            .build_v2_deletes();
            for name in deletes {
                writer
                    .add_file(data_file(DataContentType::PositionDeletes, self.path(name)), 1)
                    .unwrap();
            }
            manifests.push(writer.write_manifest_file().await.unwrap());
        }

        let manifest_list = self.path("metadata/snap-1-0-orders.avro");
        let mut list_writer = ManifestListWriter::v2(
            self.file_io.new_output(&manifest_list).unwrap(),
            SNAPSHOT_ID,
            None,
            1,
        );
        list_writer.add_manifests(manifests.into_iter()).unwrap();
        list_writer.close().await.unwrap();

        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64;
        let snapshot = Snapshot::builder()
            .with_snapshot_id(SNAPSHOT_ID)
            .with_sequence_number(1)
            .with_timestamp_ms(now_ms)
            .with_schema_id(0)
            .with_manifest_list(manifest_list)
            .with_parent_snapshot_id(None)
            .with_summary(Summary {
                operation: Operation::Append,
                additional_properties: HashMap::new(),
            })
            .build();

        TableMetadataBuilder::new_from_metadata(base.clone(), None)
            .add_snapshot(snapshot)
            .unwrap()
            .set_ref(
                MAIN_BRANCH,
                SnapshotReference {
                    snapshot_id: SNAPSHOT_ID,
                    retention: SnapshotRetention::Branch {
                        min_snapshots_to_keep: None,
                        max_snapshot_age_ms: None,
                        max_ref_age_ms: None,
                    },
                },
            )
            .unwrap()
            .build()
            .unwrap()
            .metadata
    }
}

fn data_file(content: DataContentType, path: String) -> DataFile {
    DataFileBuilder::default()
        .content(content)
        .file_path(path)
        .file_format(DataFileFormat::Parquet)
        .partition(Struct::empty())
        .partition_spec_id(0)
        .file_size_in_bytes(1024)
        .record_count(10)
        .build()
        .unwrap()
}

const V0: &str = "00000-3f0e6a52-8b1d-4c2e-9a7f-0c1d2e3f4a5b.metadata.json";
const V1: &str = "00001-7a9b8c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d.metadata.json";

#[tokio::test]
async fn test_table_without_snapshot_has_no_live_files() {
    let table = LocalTable::new();
    table.write_metadata(V0, &table.created()).await;

    let live = IcebergMetadataReader::new(table.registry())
        .live_files(&table.descriptor())
        .await
        .unwrap();

    assert!(live.is_empty(), "got {:?}", live);
}

#[tokio::test]
async fn test_scan_returns_data_and_delete_files() {
    let table = LocalTable::new();
    let created = table.created();
    let current = table
        .with_snapshot(&created, &["data/part-0.parquet", "data/part-1.parquet"], &["data/delete-0.parquet"])
        .await;
    table.write_metadata(V0, &created).await;
    table.write_metadata(V1, &current).await;

    let live = IcebergMetadataReader::new(table.registry())
        .live_files(&table.descriptor())
        .await
        .unwrap();

    assert_eq!(
        live,
        vec![
            table.path("data/delete-0.parquet"),
            table.path("data/part-0.parquet"),
            table.path("data/part-1.parquet"),
        ]
    );
}

#[tokio::test]
async fn test_version_hint_overrides_highest_version() {
    let table = LocalTable::new();
    let created = table.created();
    let current = table.with_snapshot(&created, &["data/part-0.parquet"], &[]).await;
    table.write_metadata(V0, &created).await;
    table.write_metadata(V1, &current).await;
    let reader = IcebergMetadataReader::new(table.registry());

    // Highest version carries the snapshot
    let live = reader.live_files(&table.descriptor()).await.unwrap();
    assert_eq!(live, vec![table.path("data/part-0.parquet")]);

    // A hint pinning version 0 selects the empty table
    table.write("metadata/version-hint.text", b"0\n".to_vec()).await;
    let live = reader.live_files(&table.descriptor()).await.unwrap();
    assert!(live.is_empty(), "got {:?}", live);
}

#[tokio::test]
async fn test_full_audit_over_local_table() {
    let table = LocalTable::new();
    let created = table.created();
    let current = table
        .with_snapshot(&created, &["data/part-0.parquet", "data/part-1.parquet"], &["data/delete-0.parquet"])
        .await;
    table.write_metadata(V0, &created).await;
    table.write_metadata(V1, &current).await;
    for name in [
        "data/part-0.parquet",
        "data/part-1.parquet",
        "data/delete-0.parquet",
        "data/orphan-0.parquet",
    ] {
        table.write(name, vec![0u8; 4096]).await;
    }

    let registry = table.registry();
    let config = AuditConfigBuilder::default()
        .lakehouse_type(Some(LakehouseType::Iceberg))
        .bucket(table.bucket())
        .tables(vec![TABLE.to_string()])
        .build()
        .unwrap();
    let auditor = TableAuditor::new(
        &config,
        Arc::new(OpendalLister::new(registry.clone(), config.page_size)),
        Arc::new(FormatManifestReader::new(registry)),
    );

    let report = auditor
        .run(&config.table_descriptors().unwrap(), &CancelSignal::never())
        .await;

    let result = report.entries[0].result().expect("table should be audited");
    assert_eq!(result.metrics.total_parquet_files, 4);
    assert_eq!(result.dead_file_count, 1);
    assert_eq!(result.dead_file_sample, vec!["orphan-0.parquet".to_string()]);
}

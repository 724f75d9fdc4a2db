/*
 * lakeaudit - Lakehouse Storage Audit
 *
 * Audits Delta Lake and Iceberg tables for small-file fragmentation and
 * dead (unreferenced) data files.
 *
 * Usage:
 *   lakeaudit --lakehouse-type delta --bucket my-bucket --table sales/orders --table sales/items
 *   lakeaudit --config audit.toml --concurrency 4 --json
 *
 * Storage credentials come from `[storage.options]` in the config file or
 * `--storage-option key=value`, e.g. `access_key_id` / `secret_access_key`
 * for S3 or `account_name` / `account_key` for Azure.
 */

use anyhow::{Context, Result};
use clap::Parser;
use lakeaudit_common::{AuditConfig, AuditMetrics, LakehouseType, OperatorRegistry, StorageBackend};
use lakeaudit_engine::{CancelHandle, CancelSignal, FormatManifestReader, OpendalLister, TableAuditor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lakeaudit", version, about = "Audit lakehouse tables for small files and dead files")]
struct Args {
    /// TOML config file; flags override its values
    #[arg(long, env = "LAKEAUDIT_CONFIG")]
    config: Option<PathBuf>,

    /// Table format: delta or iceberg
    #[arg(long)]
    lakehouse_type: Option<String>,

    /// Bucket holding the tables
    #[arg(long)]
    bucket: Option<String>,

    /// Table prefix inside the bucket (repeatable)
    #[arg(long = "table")]
    tables: Vec<String>,

    /// Average file size (MB) above which a larger target size is advised
    #[arg(long)]
    size_threshold_mb: Option<f64>,

    /// Tables audited at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Dead file names shown per table
    #[arg(long)]
    sample_size: Option<usize>,

    /// Storage backend: s3, gcs, azure or local
    #[arg(long)]
    backend: Option<String>,

    /// Endpoint for S3-compatible storage
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    region: Option<String>,

    /// Backend option as key=value (repeatable), e.g. account_name=lake
    #[arg(long = "storage-option", value_parser = parse_key_value)]
    storage_options: Vec<(String, String)>,

    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Builds the run config: file values first, then flag overrides.
    fn into_config(self) -> Result<AuditConfig> {
        let mut config = match &self.config {
            Some(path) => AuditConfig::from_toml_file(path)?,
            None => AuditConfig::default(),
        };

        if let Some(lakehouse_type) = self.lakehouse_type {
            config.lakehouse_type = Some(lakehouse_type.parse::<LakehouseType>()?);
        }
        if let Some(bucket) = self.bucket {
            config.bucket = bucket;
        }
        if !self.tables.is_empty() {
            config.tables = self.tables;
        }
        if let Some(threshold) = self.size_threshold_mb {
            config.size_threshold_mb = threshold;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency_limit = concurrency;
        }
        if let Some(sample_size) = self.sample_size {
            config.dead_file_sample_size = sample_size;
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend.parse::<StorageBackend>()?;
        }
        if let Some(endpoint) = self.endpoint {
            config.storage = config.storage.with_endpoint(endpoint);
        }
        if let Some(region) = self.region {
            config.storage = config.storage.with_region(region);
        }
        for (key, value) in self.storage_options {
            config.storage = config.storage.with_option(key, value);
        }

        Ok(config)
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

/// Waits for SIGTERM/SIGINT (Ctrl+C elsewhere), then cancels the run.
async fn cancel_on_signal(handle: CancelHandle) {
    #[cfg(unix)]
    let received = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        Ok::<_, std::io::Error>(())
    }
    .await;

    #[cfg(not(unix))]
    let received = tokio::signal::ctrl_c().await.map(|_| info!("Received Ctrl+C"));

    match received {
        Ok(()) => handle.cancel(),
        Err(e) => warn!(error = %e, "Failed to install signal handlers, cancellation disabled"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = match std::env::var_os("RUST_LOG") {
        Some(_) => EnvFilter::from_default_env(),
        None => EnvFilter::new("lakeaudit=info,iceberg=warn"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let json = args.json;
    let config = args.into_config()?;
    let tables = config
        .table_descriptors()
        .context("Invalid audit configuration")?;

    info!(
        lakehouse_type = ?config.lakehouse_type,
        bucket = %config.bucket,
        tables = tables.len(),
        threshold_mb = config.size_threshold_mb,
        "Auditing lakehouse tables"
    );

    let operators = Arc::new(OperatorRegistry::new(config.storage.clone()));
    let lister = Arc::new(OpendalLister::new(operators.clone(), config.page_size));
    let manifests = Arc::new(FormatManifestReader::new(operators));
    let metrics = Arc::new(AuditMetrics::new());
    let auditor = TableAuditor::new(&config, lister, manifests).with_metrics(metrics.clone());

    let (handle, cancel) = CancelSignal::pair();
    tokio::spawn(cancel_on_signal(handle));

    let report = auditor.run(&tables, &cancel).await;

    report.log_summary();
    info!(metrics = ?metrics.snapshot(), "Run counters");
    debug!("\n{}", metrics.to_prometheus());

    if json {
        println!("{}", report.to_json()?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_build_config() {
        let args = Args::try_parse_from([
            "lakeaudit",
            "--lakehouse-type",
            "Iceberg",
            "--bucket",
            "lake",
            "--table",
            "db/a",
            "--table",
            "db/b",
            "--concurrency",
            "4",
            "--json",
        ])
        .unwrap();
        assert!(args.json);

        let config = args.into_config().unwrap();
        assert_eq!(config.lakehouse_type, Some(LakehouseType::Iceberg));
        assert_eq!(config.tables, vec!["db/a".to_string(), "db/b".to_string()]);
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.size_threshold_mb, 256.0);
        assert_eq!(config.table_descriptors().unwrap().len(), 2);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
lakehouse_type = "delta"
bucket = "from-file"
tables = ["t1"]
size_threshold_mb = 128.0

[storage]
backend = "local"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let args = Args::try_parse_from(["lakeaudit", "--config", path, "--bucket", "from-flag"]).unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.bucket, "from-flag");
        assert_eq!(config.tables, vec!["t1".to_string()]);
        assert_eq!(config.size_threshold_mb, 128.0);
        assert_eq!(config.storage.backend, StorageBackend::Local);
    }

    #[test]
    fn test_storage_flags_fill_storage_config() {
        let args = Args::try_parse_from([
            "lakeaudit",
            "--backend",
            "azure",
            "--endpoint",
            "https://login.example.com",
            "--region",
            "westeurope",
            "--storage-option",
            "account_name=lakeacct",
            "--storage-option",
            "sas_token=sv=2024&sig=abc",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Azure);
        assert_eq!(config.storage.endpoint.as_deref(), Some("https://login.example.com"));
        assert_eq!(config.storage.region.as_deref(), Some("westeurope"));
        assert_eq!(config.storage.options["account_name"], "lakeacct");
        assert_eq!(config.storage.options["sas_token"], "sv=2024&sig=abc");

        assert!(Args::try_parse_from(["lakeaudit", "--storage-option", "novalue"]).is_err());
    }

    #[test]
    fn test_invalid_lakehouse_type_is_rejected() {
        let args = Args::try_parse_from(["lakeaudit", "--lakehouse-type", "hudi"]).unwrap();
        let err = args.into_config().unwrap_err();
        assert!(err.to_string().contains("must be either 'delta' or 'iceberg'"));
    }

    #[test]
    fn test_missing_tables_fail_validation() {
        let args = Args::try_parse_from(["lakeaudit", "--lakehouse-type", "delta", "--bucket", "lake"]).unwrap();
        let config = args.into_config().unwrap();
        assert!(config.table_descriptors().is_err());
    }
}

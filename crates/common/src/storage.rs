/*
 * Storage access using opendal.
 *
 * One operator per bucket, built lazily from the run's storage settings and
 * shared by the object lister and the Delta log reader. Iceberg metadata is
 * read through iceberg's own FileIO, configured from the same settings.
 */

use crate::{AuditError, Result};
use opendal::Operator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Storage backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Gcs,
    Azure,
    Local,
    /// In-process store, only useful for tests and dry runs
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "gcs" | "gs" => Ok(StorageBackend::Gcs),
            "azure" | "azblob" => Ok(StorageBackend::Azure),
            "local" | "fs" => Ok(StorageBackend::Local),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(AuditError::Configuration(format!(
                "Unknown storage backend '{}'",
                other
            ))),
        }
    }
}

/// Connection settings shared by every bucket in a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// The storage backend type
    pub backend: StorageBackend,
    /// Endpoint override (for S3-compatible services)
    pub endpoint: Option<String>,
    /// Region (for S3)
    pub region: Option<String>,
    /// Credentials and backend-specific options
    pub options: HashMap<String, String>,
}

impl StorageConfig {
    pub fn new(backend: StorageBackend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Sets the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Adds a configuration option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// URI of a path inside a bucket, in the scheme iceberg's FileIO expects.
    ///
    /// Azure paths name the ADLS Gen2 filesystem and account, so the
    /// `account_name` option is required there.
    pub fn location(&self, bucket: &str, path: &str) -> Result<String> {
        let path = path.trim_start_matches('/');
        let location = match self.backend {
            StorageBackend::S3 => format!("s3://{}/{}", bucket, path),
            StorageBackend::Gcs => format!("gs://{}/{}", bucket, path),
            StorageBackend::Azure => format!("abfss://{}@{}/{}", bucket, self.azure_dfs_host()?, path),
            StorageBackend::Local => {
                format!("file://{}/{}", bucket.trim_end_matches('/'), path)
            }
            StorageBackend::Memory => format!("memory://{}/{}", bucket, path),
        };
        Ok(location)
    }

    /// DFS host of the Azure account, e.g. `acct.dfs.core.windows.net`.
    ///
    /// A configured blob endpoint is mapped to its DFS twin.
    fn azure_dfs_host(&self) -> Result<String> {
        if let Some(endpoint) = &self.endpoint {
            let host = endpoint
                .split_once("://")
                .map_or(endpoint.as_str(), |(_, rest)| rest)
                .trim_end_matches('/');
            return Ok(host.replacen(".blob.", ".dfs.", 1));
        }
        let account = self.options.get("account_name").ok_or_else(|| {
            AuditError::Configuration(
                "Azure storage needs the 'account_name' option to address Iceberg metadata".to_string(),
            )
        })?;
        Ok(format!("{}.dfs.core.windows.net", account))
    }

    /// FileIO properties for iceberg, derived from the opendal-style options.
    pub fn file_io_props(&self) -> HashMap<String, String> {
        let mut props = HashMap::new();

        match self.backend {
            StorageBackend::S3 => {
                self.copy_options(&mut props, &[
                    ("access_key_id", "s3.access-key-id"),
                    ("secret_access_key", "s3.secret-access-key"),
                    ("session_token", "s3.session-token"),
                ]);
                if let Some(endpoint) = &self.endpoint {
                    props.insert("s3.endpoint".to_string(), endpoint.clone());
                    // S3-compatible services rarely support virtual-hosted buckets
                    props.insert("s3.path-style-access".to_string(), "true".to_string());
                }
                if let Some(region) = &self.region {
                    props.insert("s3.region".to_string(), region.clone());
                }
            }
            StorageBackend::Gcs => {
                self.copy_options(&mut props, &[
                    ("credential", "gcs.credentials-json"),
                    ("token", "gcs.oauth2.token"),
                    ("project_id", "gcs.project-id"),
                ]);
                if let Some(endpoint) = &self.endpoint {
                    props.insert("gcs.service.path".to_string(), endpoint.clone());
                }
            }
            StorageBackend::Azure => {
                self.copy_options(&mut props, &[
                    ("account_name", "adls.account-name"),
                    ("account_key", "adls.account-key"),
                    ("sas_token", "adls.sas-token"),
                    ("tenant_id", "adls.tenant-id"),
                    ("client_id", "adls.client-id"),
                    ("client_secret", "adls.client-secret"),
                    ("authority_host", "adls.authority-host"),
                ]);
            }
            StorageBackend::Local | StorageBackend::Memory => {}
        }
        props
    }

    /// Copies each present option `from` into `props` under `to`.
    fn copy_options(&self, props: &mut HashMap<String, String>, pairs: &[(&str, &str)]) {
        for (from, to) in pairs {
            if let Some(value) = self.options.get(*from) {
                props.insert(to.to_string(), value.clone());
            }
        }
    }
}

/// Builds an opendal Operator rooted at a bucket.
pub fn build_operator(config: &StorageConfig, bucket: &str) -> Result<Operator> {
    let opt = |key: &str| config.options.get(key);

    let operator = match config.backend {
        StorageBackend::S3 => {
            let mut builder = opendal::services::S3::default().bucket(bucket);
            if let Some(endpoint) = &config.endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(region) = &config.region {
                builder = builder.region(region);
            }
            if let Some(access_key) = opt("access_key_id") {
                builder = builder.access_key_id(access_key);
            }
            if let Some(secret_key) = opt("secret_access_key") {
                builder = builder.secret_access_key(secret_key);
            }
            if let Some(session_token) = opt("session_token") {
                builder = builder.session_token(session_token);
            }
            if let Some(role_arn) = opt("role_arn") {
                builder = builder.role_arn(role_arn);
            }
            Operator::new(builder).map(|op| op.finish())
        }
        StorageBackend::Gcs => {
            let mut builder = opendal::services::Gcs::default().bucket(bucket);
            if let Some(endpoint) = &config.endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(credential) = opt("credential") {
                builder = builder.credential(credential);
            }
            Operator::new(builder).map(|op| op.finish())
        }
        StorageBackend::Azure => {
            let mut builder = opendal::services::Azblob::default().container(bucket);
            if let Some(endpoint) = &config.endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(account_name) = opt("account_name") {
                builder = builder.account_name(account_name);
            }
            if let Some(account_key) = opt("account_key") {
                builder = builder.account_key(account_key);
            }
            if let Some(sas_token) = opt("sas_token") {
                builder = builder.sas_token(sas_token);
            }
            Operator::new(builder).map(|op| op.finish())
        }
        StorageBackend::Local => {
            let builder = opendal::services::Fs::default().root(bucket);
            Operator::new(builder).map(|op| op.finish())
        }
        StorageBackend::Memory => {
            Operator::new(opendal::services::Memory::default()).map(|op| op.finish())
        }
    };

    operator.map_err(|e| {
        AuditError::Configuration(format!(
            "Failed to build {:?} operator for bucket '{}': {}",
            config.backend, bucket, e
        ))
    })
}

/// Caches one operator per bucket for the lifetime of a run.
#[derive(Debug, Default)]
pub struct OperatorRegistry {
    config: StorageConfig,
    operators: RwLock<HashMap<String, Operator>>,
}

impl OperatorRegistry {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            operators: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the operator for a bucket, building it on first use.
    pub fn operator(&self, bucket: &str) -> Result<Operator> {
        {
            let operators = self
                .operators
                .read()
                .map_err(|e| AuditError::Unexpected(format!("Lock poisoned: {}", e)))?;
            if let Some(op) = operators.get(bucket) {
                return Ok(op.clone());
            }
        }

        let op = build_operator(&self.config, bucket)?;
        let mut operators = self
            .operators
            .write()
            .map_err(|e| AuditError::Unexpected(format!("Lock poisoned: {}", e)))?;
        Ok(operators.entry(bucket.to_string()).or_insert(op).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("S3".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!("gs".parse::<StorageBackend>().unwrap(), StorageBackend::Gcs);
        assert_eq!("fs".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert!("ftp".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_locations_per_backend() {
        let s3 = StorageConfig::new(StorageBackend::S3);
        assert_eq!(
            s3.location("lake", "/db/t/metadata/v1.metadata.json").unwrap(),
            "s3://lake/db/t/metadata/v1.metadata.json"
        );

        let gcs = StorageConfig::new(StorageBackend::Gcs);
        assert_eq!(gcs.location("lake", "db/t").unwrap(), "gs://lake/db/t");

        let local = StorageConfig::new(StorageBackend::Local);
        assert_eq!(local.location("/data/lake/", "t/x").unwrap(), "file:///data/lake/t/x");
    }

    #[test]
    fn test_azure_location_names_filesystem_and_account() {
        let azure = StorageConfig::new(StorageBackend::Azure).with_option("account_name", "lakeacct");
        assert_eq!(
            azure.location("warehouse", "db/t/metadata/v2.metadata.json").unwrap(),
            "abfss://warehouse@lakeacct.dfs.core.windows.net/db/t/metadata/v2.metadata.json"
        );

        let sovereign = StorageConfig::new(StorageBackend::Azure)
            .with_endpoint("https://lakeacct.blob.core.chinacloudapi.cn/");
        assert_eq!(
            sovereign.location("warehouse", "db/t").unwrap(),
            "abfss://warehouse@lakeacct.dfs.core.chinacloudapi.cn/db/t"
        );

        let err = StorageConfig::new(StorageBackend::Azure)
            .location("warehouse", "db/t")
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_file_io_props_for_s3() {
        let config = StorageConfig::new(StorageBackend::S3)
            .with_endpoint("http://localhost:9000")
            .with_region("us-east-1")
            .with_option("access_key_id", "AKID")
            .with_option("secret_access_key", "SECRET");

        let props = config.file_io_props();
        assert_eq!(props.get("s3.endpoint").map(String::as_str), Some("http://localhost:9000"));
        assert_eq!(props.get("s3.region").map(String::as_str), Some("us-east-1"));
        assert_eq!(props.get("s3.access-key-id").map(String::as_str), Some("AKID"));
        assert_eq!(props.get("s3.secret-access-key").map(String::as_str), Some("SECRET"));
        assert!(!props.contains_key("s3.session-token"));
    }

    #[test]
    fn test_file_io_props_for_gcs() {
        let config = StorageConfig::new(StorageBackend::Gcs)
            .with_endpoint("http://localhost:4443")
            .with_option("credential", "eyJ0eXBlIjoic2VydmljZV9hY2NvdW50In0=")
            .with_option("project_id", "analytics");

        let props = config.file_io_props();
        assert_eq!(
            props.get("gcs.credentials-json").map(String::as_str),
            Some("eyJ0eXBlIjoic2VydmljZV9hY2NvdW50In0=")
        );
        assert_eq!(props.get("gcs.service.path").map(String::as_str), Some("http://localhost:4443"));
        assert_eq!(props.get("gcs.project-id").map(String::as_str), Some("analytics"));
        assert!(props.keys().all(|k| k.starts_with("gcs.")));
    }

    #[test]
    fn test_file_io_props_for_azure() {
        let config = StorageConfig::new(StorageBackend::Azure)
            .with_option("account_name", "lakeacct")
            .with_option("account_key", "a2V5")
            .with_option("sas_token", "sv=2024&sig=abc");

        let props = config.file_io_props();
        assert_eq!(props.get("adls.account-name").map(String::as_str), Some("lakeacct"));
        assert_eq!(props.get("adls.account-key").map(String::as_str), Some("a2V5"));
        assert_eq!(props.get("adls.sas-token").map(String::as_str), Some("sv=2024&sig=abc"));
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn test_file_io_props_empty_for_local() {
        let config = StorageConfig::new(StorageBackend::Local).with_option("account_name", "ignored");
        assert!(config.file_io_props().is_empty());
    }

    #[test]
    fn test_build_local_operator() {
        let config = StorageConfig::new(StorageBackend::Local);
        assert!(build_operator(&config, "/tmp").is_ok());
    }

    #[test]
    fn test_registry_reuses_operators() {
        let registry = OperatorRegistry::new(StorageConfig::new(StorageBackend::Memory));
        let first = registry.operator("lake").unwrap();
        let second = registry.operator("lake").unwrap();
        assert_eq!(first.info().name(), second.info().name());
        assert_eq!(registry.operators.read().unwrap().len(), 1);
    }
}

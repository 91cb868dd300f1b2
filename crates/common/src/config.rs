use anyhow::{Context, Result};
use serde::Deserialize;
use validator::Validate;

// Default constants
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:4000";
pub const DEFAULT_MOUNT_PREFIX: &str = "/ghgp";
pub const DEFAULT_RELEASE_NUMBER: &str = "EIA-1.0";

pub const DEFAULT_BUCKET: &str = "epa-backups-eia";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_TABLE_PREFIX: &str = "epa_ghg_tables_parquet";
pub const DEFAULT_CSV_PREFIX: &str = "epa_ghg_tables_csvs/";
pub const DEFAULT_GEO_PREFIX: &str = "epa_ghg_geo";
pub const DEFAULT_SNAPSHOT_DIR: &str = "/tmp";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 3600;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_EXPORT_ROW_CAP: usize = 25_000;
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 16;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TARGET_PARTITIONS: usize = 4;

pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Deserialize, Default, Clone, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,
    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageSettings,
    #[serde(default)]
    #[validate(nested)]
    pub query: QuerySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Optional namespace the API is also reachable under (e.g. `/ghgp/api/version`)
    #[serde(default = "default_mount_prefix")]
    #[validate(custom(function = "validate_mount_prefix"))]
    pub mount_prefix: String,

    #[serde(default = "default_release_number")]
    pub release_number: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            mount_prefix: default_mount_prefix(),
            release_number: default_release_number(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct StorageSettings {
    #[serde(default = "default_bucket")]
    #[validate(length(min = 1))]
    pub bucket: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom S3-compatible endpoint (MinIO, LocalStack)
    #[serde(default)]
    #[validate(url)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub allow_http: bool,

    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    #[serde(default = "default_csv_prefix")]
    pub csv_prefix: String,

    #[serde(default = "default_geo_prefix")]
    pub geo_prefix: String,

    /// Where snapshots are materialized; stable for the process lifetime
    #[serde(default = "default_snapshot_dir")]
    #[validate(length(min = 1))]
    pub snapshot_dir: String,

    #[serde(default = "default_fetch_timeout_secs")]
    #[validate(range(min = 1))]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_presign_ttl_secs")]
    #[validate(range(min = 1, max = 604800))]
    pub presign_ttl_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            endpoint: None,
            allow_http: false,
            table_prefix: default_table_prefix(),
            csv_prefix: default_csv_prefix(),
            geo_prefix: default_geo_prefix(),
            snapshot_dir: default_snapshot_dir(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            presign_ttl_secs: default_presign_ttl_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct QuerySettings {
    /// Rows per facility list page. Clients assume 100; smaller values only
    /// make paging testable over small fixtures.
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1))]
    pub page_size: usize,

    /// Hard ceiling on all-years export rows
    #[serde(default = "default_export_row_cap")]
    #[validate(range(min = 1))]
    pub export_row_cap: usize,

    #[serde(default = "default_max_concurrent_queries")]
    #[validate(range(min = 1))]
    pub max_concurrent_queries: usize,

    #[serde(default = "default_query_timeout_secs")]
    #[validate(range(min = 1))]
    pub query_timeout_secs: u64,

    #[serde(default = "default_target_partitions")]
    #[validate(range(min = 1))]
    pub target_partitions: usize,

    #[serde(default)]
    pub memory_limit_mb: Option<usize>,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            export_row_cap: default_export_row_cap(),
            max_concurrent_queries: default_max_concurrent_queries(),
            query_timeout_secs: default_query_timeout_secs(),
            target_partitions: default_target_partitions(),
            memory_limit_mb: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Write `errors.jsonl` / `requests.jsonl` next to stdout logging
    #[serde(default = "default_json_files")]
    pub json_files: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            json_files: default_json_files(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_mount_prefix() -> String {
    DEFAULT_MOUNT_PREFIX.to_string()
}

fn default_release_number() -> String {
    DEFAULT_RELEASE_NUMBER.to_string()
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_table_prefix() -> String {
    DEFAULT_TABLE_PREFIX.to_string()
}

fn default_csv_prefix() -> String {
    DEFAULT_CSV_PREFIX.to_string()
}

fn default_geo_prefix() -> String {
    DEFAULT_GEO_PREFIX.to_string()
}

fn default_snapshot_dir() -> String {
    DEFAULT_SNAPSHOT_DIR.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_presign_ttl_secs() -> u64 {
    DEFAULT_PRESIGN_TTL_SECS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_export_row_cap() -> usize {
    DEFAULT_EXPORT_ROW_CAP
}

fn default_max_concurrent_queries() -> usize {
    DEFAULT_MAX_CONCURRENT_QUERIES
}

fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

fn default_target_partitions() -> usize {
    DEFAULT_TARGET_PARTITIONS
}

fn default_log_dir() -> String {
    DEFAULT_LOG_DIR.to_string()
}

fn default_json_files() -> bool {
    true
}

fn validate_mount_prefix(prefix: &str) -> Result<(), validator::ValidationError> {
    if prefix.is_empty() {
        return Ok(());
    }
    if !prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(validator::ValidationError::new("invalid_mount_prefix"));
    }
    // Must be a bare path, not a URL
    match url::Url::parse(prefix) {
        Ok(_) => Err(validator::ValidationError::new("invalid_mount_prefix")),
        Err(_) => Ok(()),
    }
}

impl AppConfig {
    /// Load from an optional YAML file, then `GHGP__SECTION__KEY` env overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };

        // GHGP__STORAGE__BUCKET -> storage.bucket
        let builder = builder.add_source(
            config::Environment::with_prefix("GHGP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {:?}", e))?;

        Ok(app_config)
    }
}

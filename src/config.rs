//! Node configuration.
//!
//! Configuration is loaded in layers with the following precedence (lowest to highest):
//! 1. Environment variables (`COHORT_*`)
//! 2. TOML configuration file
//! 3. Command-line arguments
//!
//! A value in a higher layer replaces the lower one only when it differs from
//! the default, so an unset CLI flag never masks a file setting.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use cohort_core::ConnectionDescriptor;
use cohort_core::MetadataCollectionId;
use cohort_core::constants::DEFAULT_MEMBER_TIMEOUT;
use cohort_core::constants::DEFAULT_MISSED_REFRESHES_BEFORE_RETIRE;
use cohort_core::constants::DEFAULT_REFRESH_INTERVAL;
use cohort_core::constants::DEFAULT_RETENTION_AFTER_RETIRE;
use cohort_core::constants::DEFAULT_WORKERS_PER_CATEGORY;
use cohort_core::constants::MAX_PAGE_SIZE;
use cohort_core::constants::MAX_WORKERS_PER_CATEGORY;
use cohort_federation::FederationConfig;
use cohort_registry::RegistryConfig;
use cohort_registry::config::DEFAULT_UNREACHABLE_ALERT_THRESHOLD;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;
use tracing::info;

/// Connector type of the repository built into `cohort-node`.
pub const IN_MEMORY_CONNECTOR_TYPE: &str = "in-memory";

const DEFAULT_SERVER_NAME: &str = "cohort-node";
const DEFAULT_ENDPOINT: &str = "local";
const IDENTITY_FILE: &str = "metadata-collection-id";
const MEMBERSHIP_FILE: &str = "cohort-membership.json";
const AUDIT_FILE: &str = "audit.jsonl";

/// Configuration for one cohort member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name this server announces in its registration and audit records.
    pub server_name: String,

    /// Identity of the local repository's holdings.
    ///
    /// When absent, the id persisted in the data directory is used, or a new
    /// one is generated and persisted on first start.
    pub metadata_collection_id: Option<MetadataCollectionId>,

    /// Directory for durable node state.
    /// Defaults to "./data/{server_name}" if not specified.
    pub data_dir: Option<PathBuf>,

    /// How peers reach the local repository.
    pub connection: ConnectionSection,

    pub registry: RegistrySection,

    pub federation: FederationSection,

    /// Worker tasks per event category.
    pub workers_per_category: usize,

    /// Archives loaded into the local repository at start-up, in order.
    pub archives: Vec<PathBuf>,

    /// Audit log file.
    /// Defaults to "{data_dir}/audit.jsonl" if not specified.
    pub audit_log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub connector_type: String,
    pub endpoint: String,
    pub properties: BTreeMap<String, String>,
}

/// Registry timing, in wire-friendly units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub refresh_interval_ms: u64,
    pub missed_refreshes_before_retire: u32,
    pub retention_after_retire_secs: u64,
    pub unreachable_alert_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationSection {
    pub member_timeout_ms: u64,
    pub max_page_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            metadata_collection_id: None,
            data_dir: None,
            connection: ConnectionSection::default(),
            registry: RegistrySection::default(),
            federation: FederationSection::default(),
            workers_per_category: DEFAULT_WORKERS_PER_CATEGORY,
            archives: Vec::new(),
            audit_log_file: None,
        }
    }
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            connector_type: IN_MEMORY_CONNECTOR_TYPE.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            properties: BTreeMap::new(),
        }
    }
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL.as_millis() as u64,
            missed_refreshes_before_retire: DEFAULT_MISSED_REFRESHES_BEFORE_RETIRE,
            retention_after_retire_secs: DEFAULT_RETENTION_AFTER_RETIRE.as_secs(),
            unreachable_alert_threshold: DEFAULT_UNREACHABLE_ALERT_THRESHOLD,
        }
    }
}

impl Default for FederationSection {
    fn default() -> Self {
        Self {
            member_timeout_ms: DEFAULT_MEMBER_TIMEOUT.as_millis() as u64,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl NodeConfig {
    /// Load configuration from `COHORT_*` environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from variables looked up through `var`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            server_name: var("COHORT_SERVER_NAME").unwrap_or(defaults.server_name),
            metadata_collection_id: var("COHORT_METADATA_COLLECTION_ID").map(MetadataCollectionId::new),
            data_dir: var("COHORT_DATA_DIR").map(PathBuf::from),
            connection: ConnectionSection {
                connector_type: var("COHORT_CONNECTOR_TYPE").unwrap_or(defaults.connection.connector_type),
                endpoint: var("COHORT_ENDPOINT").unwrap_or(defaults.connection.endpoint),
                properties: BTreeMap::new(),
            },
            registry: RegistrySection {
                refresh_interval_ms: parse_var(&var, "COHORT_REFRESH_INTERVAL_MS")
                    .unwrap_or(defaults.registry.refresh_interval_ms),
                missed_refreshes_before_retire: parse_var(&var, "COHORT_MISSED_REFRESHES_BEFORE_RETIRE")
                    .unwrap_or(defaults.registry.missed_refreshes_before_retire),
                retention_after_retire_secs: parse_var(&var, "COHORT_RETENTION_AFTER_RETIRE_SECS")
                    .unwrap_or(defaults.registry.retention_after_retire_secs),
                unreachable_alert_threshold: parse_var(&var, "COHORT_UNREACHABLE_ALERT_THRESHOLD")
                    .unwrap_or(defaults.registry.unreachable_alert_threshold),
            },
            federation: FederationSection {
                member_timeout_ms: parse_var(&var, "COHORT_MEMBER_TIMEOUT_MS")
                    .unwrap_or(defaults.federation.member_timeout_ms),
                max_page_size: parse_var(&var, "COHORT_MAX_PAGE_SIZE").unwrap_or(defaults.federation.max_page_size),
            },
            workers_per_category: parse_var(&var, "COHORT_WORKERS_PER_CATEGORY")
                .unwrap_or(defaults.workers_per_category),
            archives: parse_var_list(&var, "COHORT_ARCHIVES").into_iter().map(PathBuf::from).collect(),
            audit_log_file: var("COHORT_AUDIT_LOG_FILE").map(PathBuf::from),
        }
    }

    /// Load configuration from a TOML file.
    pub async fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path).await.context(ReadFileSnafu { path })?;
        toml::from_str(&contents).context(ParseTomlSnafu { path })
    }

    /// Merge configuration from a higher-precedence source.
    ///
    /// Fields in `other` that are `Some`, non-empty or non-default override
    /// fields in `self`. Connection properties are merged key by key.
    pub fn merge(&mut self, other: Self) {
        let defaults = Self::default();
        if other.server_name != defaults.server_name {
            self.server_name = other.server_name;
        }
        if other.metadata_collection_id.is_some() {
            self.metadata_collection_id = other.metadata_collection_id;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.connection.connector_type != defaults.connection.connector_type {
            self.connection.connector_type = other.connection.connector_type;
        }
        if other.connection.endpoint != defaults.connection.endpoint {
            self.connection.endpoint = other.connection.endpoint;
        }
        self.connection.properties.extend(other.connection.properties);
        if other.registry.refresh_interval_ms != defaults.registry.refresh_interval_ms {
            self.registry.refresh_interval_ms = other.registry.refresh_interval_ms;
        }
        if other.registry.missed_refreshes_before_retire != defaults.registry.missed_refreshes_before_retire {
            self.registry.missed_refreshes_before_retire = other.registry.missed_refreshes_before_retire;
        }
        if other.registry.retention_after_retire_secs != defaults.registry.retention_after_retire_secs {
            self.registry.retention_after_retire_secs = other.registry.retention_after_retire_secs;
        }
        if other.registry.unreachable_alert_threshold != defaults.registry.unreachable_alert_threshold {
            self.registry.unreachable_alert_threshold = other.registry.unreachable_alert_threshold;
        }
        if other.federation.member_timeout_ms != defaults.federation.member_timeout_ms {
            self.federation.member_timeout_ms = other.federation.member_timeout_ms;
        }
        if other.federation.max_page_size != defaults.federation.max_page_size {
            self.federation.max_page_size = other.federation.max_page_size;
        }
        if other.workers_per_category != defaults.workers_per_category {
            self.workers_per_category = other.workers_per_category;
        }
        if !other.archives.is_empty() {
            self.archives = other.archives;
        }
        if other.audit_log_file.is_some() {
            self.audit_log_file = other.audit_log_file;
        }
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_name.trim().is_empty() {
            return ValidationSnafu {
                message: "server_name must not be empty",
            }
            .fail();
        }
        if self.metadata_collection_id.as_ref().is_some_and(MetadataCollectionId::is_empty) {
            return ValidationSnafu {
                message: "metadata_collection_id must not be blank",
            }
            .fail();
        }
        if let Err(reason) = self.local_connection().validate() {
            return ValidationSnafu {
                message: format!("connection: {reason}"),
            }
            .fail();
        }
        if let Err(e) = self.registry_config().validate() {
            return ValidationSnafu { message: e.to_string() }.fail();
        }
        if let Err(e) = self.federation_config().validate() {
            return ValidationSnafu { message: e.to_string() }.fail();
        }
        if self.workers_per_category == 0 || self.workers_per_category > MAX_WORKERS_PER_CATEGORY {
            return ValidationSnafu {
                message: format!("workers_per_category must be between 1 and {MAX_WORKERS_PER_CATEGORY}"),
            }
            .fail();
        }
        if self.archives.iter().any(|path| path.as_os_str().is_empty()) {
            return ValidationSnafu {
                message: "archive paths must not be empty",
            }
            .fail();
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("./data").join(&self.server_name))
    }

    pub fn membership_path(&self) -> PathBuf {
        self.data_dir().join(MEMBERSHIP_FILE)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.audit_log_file.clone().unwrap_or_else(|| self.data_dir().join(AUDIT_FILE))
    }

    fn identity_path(&self) -> PathBuf {
        self.data_dir().join(IDENTITY_FILE)
    }

    pub fn local_connection(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            connector_type: self.connection.connector_type.clone(),
            endpoint: self.connection.endpoint.clone(),
            properties: self.connection.properties.clone(),
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            refresh_interval: Duration::from_millis(self.registry.refresh_interval_ms),
            missed_refreshes_before_retire: self.registry.missed_refreshes_before_retire,
            retention_after_retire: Duration::from_secs(self.registry.retention_after_retire_secs),
            unreachable_alert_threshold: self.registry.unreachable_alert_threshold,
        }
    }

    pub fn federation_config(&self) -> FederationConfig {
        FederationConfig {
            member_timeout: Duration::from_millis(self.federation.member_timeout_ms),
            max_page_size: self.federation.max_page_size,
        }
    }

    /// The metadata collection id this node serves.
    ///
    /// The configured id wins. Otherwise the id persisted in the data
    /// directory is reused, or a new one is generated and persisted. A
    /// configured id is not written, so the file only ever holds a generated
    /// identity.
    pub async fn resolve_metadata_collection_id(&self) -> Result<MetadataCollectionId, ConfigError> {
        if let Some(id) = &self.metadata_collection_id {
            return Ok(id.clone());
        }

        let path = self.identity_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let id = MetadataCollectionId::new(contents.trim());
                if id.is_empty() {
                    return ValidationSnafu {
                        message: format!("identity file {} is empty", path.display()),
                    }
                    .fail();
                }
                Ok(id)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let id = MetadataCollectionId::generate();
                let dir = self.data_dir();
                tokio::fs::create_dir_all(&dir).await.context(WriteFileSnafu { path: &dir })?;
                tokio::fs::write(&path, id.as_str()).await.context(WriteFileSnafu { path: &path })?;
                info!(metadata_collection_id = %id, path = %path.display(), "generated metadata collection id");
                Ok(id)
            }
            Err(e) => Err(e).context(ReadFileSnafu { path }),
        }
    }
}

/// Load configuration with proper precedence.
///
/// Order: environment, then the TOML file at `config_path`, then `overrides`
/// (typically from CLI args). The result is validated.
pub async fn load_config(config_path: Option<&Path>, overrides: NodeConfig) -> Result<NodeConfig> {
    // Start with environment variables
    let mut config = NodeConfig::from_env();

    if let Some(path) = config_path {
        config.merge(NodeConfig::from_toml_file(path).await?);
    }

    config.merge(overrides);

    config.validate()?;
    Ok(config)
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(key)?.trim().parse().ok()
}

fn parse_var_list(var: &impl Fn(&str) -> Option<String>, key: &str) -> Vec<String> {
    var(key)
        .map(|s| s.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Configuration loading and parsing errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteFile { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to parse TOML config file {}: {source}", path.display()))]
    ParseToml { path: PathBuf, source: toml::de::Error },

    #[snafu(display("configuration validation failed: {message}"))]
    Validation { message: String },
}

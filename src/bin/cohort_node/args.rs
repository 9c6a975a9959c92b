//! CLI argument parsing for cohort-node.

use std::path::PathBuf;

use clap::Parser;
use cohort::NodeConfig;
use cohort::config::ConnectionSection;
use cohort::config::FederationSection;
use cohort::config::RegistrySection;

#[derive(Parser, Debug)]
#[command(name = "cohort-node", version, about = "Run one member of a metadata repository cohort")]
pub struct Args {
    /// Path to TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Server name announced to the cohort.
    #[arg(long)]
    pub server_name: Option<String>,

    /// Metadata collection id of the local repository.
    /// Generated and persisted in the data directory when not given.
    #[arg(long)]
    pub metadata_collection_id: Option<String>,

    /// Directory for durable node state (identity, membership, audit log).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Endpoint peers use to reach the local repository.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Interval between registry refreshes in milliseconds.
    #[arg(long)]
    pub refresh_interval_ms: Option<u64>,

    /// Consecutive missed refreshes before a member is retired.
    #[arg(long)]
    pub missed_refreshes_before_retire: Option<u32>,

    /// Seconds reference copies of a retired member are kept.
    #[arg(long)]
    pub retention_after_retire_secs: Option<u64>,

    /// Bound on one federated call in milliseconds.
    #[arg(long)]
    pub member_timeout_ms: Option<u64>,

    /// Largest page a federated query may request.
    #[arg(long)]
    pub max_page_size: Option<usize>,

    /// Worker tasks per event category.
    #[arg(long)]
    pub workers_per_category: Option<usize>,

    /// Archive to load at start-up. May be repeated.
    #[arg(long = "archive")]
    pub archives: Vec<PathBuf>,

    /// Audit log file. Defaults to "{data_dir}/audit.jsonl".
    #[arg(long)]
    pub audit_log_file: Option<PathBuf>,
}

impl Args {
    /// Configuration layer holding only the flags that were given.
    pub fn overrides(&self) -> NodeConfig {
        let defaults = NodeConfig::default();
        NodeConfig {
            server_name: self.server_name.clone().unwrap_or(defaults.server_name),
            metadata_collection_id: self.metadata_collection_id.clone().map(Into::into),
            data_dir: self.data_dir.clone(),
            connection: ConnectionSection {
                endpoint: self.endpoint.clone().unwrap_or(defaults.connection.endpoint),
                ..defaults.connection
            },
            registry: RegistrySection {
                refresh_interval_ms: self.refresh_interval_ms.unwrap_or(defaults.registry.refresh_interval_ms),
                missed_refreshes_before_retire: self
                    .missed_refreshes_before_retire
                    .unwrap_or(defaults.registry.missed_refreshes_before_retire),
                retention_after_retire_secs: self
                    .retention_after_retire_secs
                    .unwrap_or(defaults.registry.retention_after_retire_secs),
                ..defaults.registry
            },
            federation: FederationSection {
                member_timeout_ms: self.member_timeout_ms.unwrap_or(defaults.federation.member_timeout_ms),
                max_page_size: self.max_page_size.unwrap_or(defaults.federation.max_page_size),
            },
            workers_per_category: self.workers_per_category.unwrap_or(defaults.workers_per_category),
            archives: self.archives.clone(),
            audit_log_file: self.audit_log_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_flags_leave_defaults() {
        let args = Args::parse_from(["cohort-node"]);
        assert_eq!(args.overrides(), NodeConfig::default());
    }

    #[test]
    fn test_flags_become_overrides() {
        let args = Args::parse_from([
            "cohort-node",
            "--server-name",
            "catalog",
            "--member-timeout-ms",
            "750",
            "--archive",
            "core.json",
            "--archive",
            "extra.json",
        ]);
        let config = args.overrides();
        assert_eq!(config.server_name, "catalog");
        assert_eq!(config.federation.member_timeout_ms, 750);
        assert_eq!(config.archives, vec![PathBuf::from("core.json"), PathBuf::from("extra.json")]);
    }
}

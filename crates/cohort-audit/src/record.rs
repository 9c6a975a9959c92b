//! Audit records and the message catalogue they are rendered from.

use std::fmt;

use cohort_core::MetadataCollectionId;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Information,
    Event,
    Decision,
    Action,
    Error,
    Exception,
    Security,
    Startup,
    Shutdown,
}

impl Severity {
    /// Whether records of this severity are mirrored at error level.
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error | Severity::Exception | Severity::Security)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Information => "Information",
            Severity::Event => "Event",
            Severity::Decision => "Decision",
            Severity::Action => "Action",
            Severity::Error => "Error",
            Severity::Exception => "Exception",
            Severity::Security => "Security",
            Severity::Startup => "Startup",
            Severity::Shutdown => "Shutdown",
        };
        f.write_str(s)
    }
}

/// Cohort component that wrote a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditComponent {
    Node,
    EventBus,
    CohortRegistry,
    TypeDefManager,
    InstanceReplication,
    Federation,
    ArchiveLoader,
}

impl AuditComponent {
    pub fn id(self) -> u32 {
        match self {
            AuditComponent::Node => 1,
            AuditComponent::EventBus => 2,
            AuditComponent::CohortRegistry => 3,
            AuditComponent::TypeDefManager => 4,
            AuditComponent::InstanceReplication => 5,
            AuditComponent::Federation => 6,
            AuditComponent::ArchiveLoader => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AuditComponent::Node => "Cohort Node",
            AuditComponent::EventBus => "Event Bus",
            AuditComponent::CohortRegistry => "Cohort Registry",
            AuditComponent::TypeDefManager => "TypeDef Manager",
            AuditComponent::InstanceReplication => "Instance Replication Processor",
            AuditComponent::Federation => "Enterprise Federation Engine",
            AuditComponent::ArchiveLoader => "Archive Loader",
        }
    }
}

impl fmt::Display for AuditComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Server that wrote a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditOriginator {
    pub server_name: String,
    pub metadata_collection_id: MetadataCollectionId,
}

/// One entry of a component's message catalogue.
///
/// Templates use positional parameters: `{0}`, `{1}`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditCode {
    pub message_id: &'static str,
    pub severity: Severity,
    pub message_template: &'static str,
    pub system_action: &'static str,
    pub user_action: &'static str,
}

impl AuditCode {
    /// Render the template, leaving unmatched placeholders in place.
    pub fn format(&self, params: &[&(dyn fmt::Display + Sync)]) -> String {
        let mut message = self.message_template.to_string();
        for (idx, param) in params.iter().enumerate() {
            message = message.replace(&format!("{{{idx}}}"), &param.to_string());
        }
        message
    }
}

/// An immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub record_id: String,
    pub timestamp_ms: u64,
    pub originator: AuditOriginator,
    pub component: AuditComponent,
    pub severity: Severity,
    pub message_id: String,
    pub formatted_message: String,
    pub system_action: String,
    pub user_action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_information: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_detail: Option<String>,
}

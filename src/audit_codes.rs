//! Node lifecycle message catalogue.

use cohort_audit::AuditCode;
use cohort_audit::Severity;

pub const NODE_STARTED: AuditCode = AuditCode {
    message_id: "COHORT-NODE-0001",
    severity: Severity::Startup,
    message_template: "Cohort node {0} started for metadata collection {1}; {2} TypeDefs known, {3} archives loaded",
    system_action: "The node has joined the cohort and is processing events",
    user_action: "None",
};

pub const NODE_STOPPING: AuditCode = AuditCode {
    message_id: "COHORT-NODE-0002",
    severity: Severity::Shutdown,
    message_template: "Cohort node {0} is leaving the cohort",
    system_action: "The local registration is withdrawn and background tasks are stopped",
    user_action: "None",
};

pub const RETENTION_PURGE_FAILED: AuditCode = AuditCode {
    message_id: "COHORT-NODE-0003",
    severity: Severity::Error,
    message_template: "Reference copies of retired member {0} could not be purged: {1}",
    system_action: "The purge is retried on the next retention sweep",
    user_action: "Check the local repository is available",
};

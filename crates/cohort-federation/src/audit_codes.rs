//! Federation engine message catalogue.

use cohort_audit::AuditCode;
use cohort_audit::Severity;

pub const MEMBER_UNREACHABLE: AuditCode = AuditCode {
    message_id: "COHORT-FEDERATION-0001",
    severity: Severity::Error,
    message_template: "Member {0} {1} during federated {2}: {3}",
    system_action: "The result was returned without the member's contribution",
    user_action: "Check the member is running and reachable",
};

pub const NO_CONNECTOR: AuditCode = AuditCode {
    message_id: "COHORT-FEDERATION-0002",
    severity: Severity::Error,
    message_template: "No connector could be created for member {0} at {1}: {2}",
    system_action: "The member is left out of federated queries",
    user_action: "Register a connector factory for the member's connector type",
};

pub const LOCAL_QUERY_FAILED: AuditCode = AuditCode {
    message_id: "COHORT-FEDERATION-0003",
    severity: Severity::Exception,
    message_template: "The local repository {0} during federated {1}: {2}",
    system_action: "The result was returned without local instances",
    user_action: "Check the local repository is available",
};

pub const QUERY_CANCELLED: AuditCode = AuditCode {
    message_id: "COHORT-FEDERATION-0004",
    severity: Severity::Information,
    message_template: "Federated {0} cancelled by the caller with {1} member(s) outstanding",
    system_action: "Outstanding member calls were abandoned",
    user_action: "None",
};

pub const PAGING_REJECTED: AuditCode = AuditCode {
    message_id: "COHORT-FEDERATION-0005",
    severity: Severity::Error,
    message_template: "Federated {0} rejected: page size {1} is outside 1..={2}",
    system_action: "The request was not dispatched to any member",
    user_action: "Request a page size within the configured bound",
};

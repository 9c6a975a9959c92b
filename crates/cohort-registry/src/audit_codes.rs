//! Cohort registry message catalogue.

use cohort_audit::AuditCode;
use cohort_audit::Severity;

pub const LOCAL_REGISTERED: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0001",
    severity: Severity::Startup,
    message_template: "Local repository {0} ({1}) registered with the cohort",
    system_action: "A registration event was sent to the cohort",
    user_action: "None",
};

pub const LOCAL_REREGISTERED: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0002",
    severity: Severity::Startup,
    message_template: "Local repository {0} ({1}) re-registered with the cohort using its saved registration",
    system_action: "A re-registration event and a refresh request were sent to the cohort",
    user_action: "None",
};

pub const LOCAL_UNREGISTERED: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0003",
    severity: Severity::Shutdown,
    message_template: "Local repository {0} left the cohort",
    system_action: "An unregistration event was sent and the saved registration was cleared",
    user_action: "None",
};

pub const MEMBER_ANNOUNCED: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0004",
    severity: Severity::Event,
    message_template: "Member {0} ({1}) announced itself at {2}",
    system_action: "The member is tracked and becomes active on its next refresh",
    user_action: "None",
};

pub const MEMBER_RECOVERED: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0005",
    severity: Severity::Event,
    message_template: "Member {0} refreshed its registration and is active again",
    system_action: "The member is queried at normal priority",
    user_action: "None",
};

pub const MEMBER_STALE: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0006",
    severity: Severity::Event,
    message_template: "Member {0} missed {1} refresh(es) and is now stale",
    system_action: "The member is queried at low priority until it refreshes",
    user_action: "Check the member is running and can reach the cohort",
};

pub const MEMBER_RETIRED_MISSED_REFRESHES: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0007",
    severity: Severity::Decision,
    message_template: "Member {0} missed {1} consecutive refreshes and has been retired",
    system_action: "The member is no longer queried; its registration is kept for audit",
    user_action: "Restart the member so it registers with the cohort again",
};

pub const MEMBER_LEFT: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0008",
    severity: Severity::Event,
    message_template: "Member {0} left the cohort",
    system_action: "The member has been retired and is no longer queried",
    user_action: "None",
};

pub const MEMBER_RETIRED_BY_ADMIN: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0009",
    severity: Severity::Action,
    message_template: "Member {0} was retired by an administrator",
    system_action: "The member is no longer queried; its registration is kept for audit",
    user_action: "None",
};

pub const MEMBER_READMITTED: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0010",
    severity: Severity::Event,
    message_template: "Retired member {0} registered again and has been readmitted",
    system_action: "The member is tracked as announced",
    user_action: "None",
};

pub const CONFLICTING_COLLECTION_ID: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0011",
    severity: Severity::Error,
    message_template: "Member {0} registered with connection {2} but is already known with connection {1}",
    system_action: "The registration was rejected and a registration error was sent to the member",
    user_action: "Give each repository a unique metadata collection id",
};

pub const LOCAL_ID_CLAIMED: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0012",
    severity: Severity::Security,
    message_template: "Server {1} registered using the local metadata collection id {0}",
    system_action: "The registration was rejected and a registration error was sent",
    user_action: "Find the server reusing this repository's metadata collection id",
};

pub const BAD_REMOTE_CONNECTION: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0013",
    severity: Severity::Error,
    message_template: "Registration from member {0} is unusable: {1}",
    system_action: "The registration was rejected and a registration error was sent to the member",
    user_action: "Correct the member's server name and connection configuration",
};

pub const REMOTE_REJECTED_LOCAL: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0014",
    severity: Severity::Error,
    message_template: "Member {0} rejected the local registration ({1}): {2}",
    system_action: "The local repository may be invisible to that member",
    user_action: "Check the local metadata collection id and connection configuration",
};

pub const MEMBER_UNREACHABLE: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0015",
    severity: Severity::Information,
    message_template: "Member {0} could not be reached ({1} consecutive failures)",
    system_action: "The member is queried at low priority until it refreshes",
    user_action: "None",
};

pub const MEMBER_REPEATEDLY_UNREACHABLE: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0016",
    severity: Severity::Error,
    message_template: "Member {0} has been unreachable for {1} consecutive calls",
    system_action: "Federated results are missing this member's data",
    user_action: "Check the member's connector endpoint and network path",
};

pub const REGISTRY_STORE_FAILED: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0017",
    severity: Severity::Exception,
    message_template: "Cohort membership could not be saved",
    system_action: "Membership changes since the last save will be lost on restart",
    user_action: "Check the registry store location is writable",
};

pub const MEMBER_LIMIT_REACHED: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0018",
    severity: Severity::Error,
    message_template: "Member {0} was not admitted: the registry already tracks {1} members",
    system_action: "The registration was ignored",
    user_action: "Retire unused members",
};

pub const RETIRE_UNKNOWN_MEMBER: AuditCode = AuditCode {
    message_id: "COHORT-REGISTRY-0019",
    severity: Severity::Error,
    message_template: "Member {0} could not be retired: it is not registered",
    system_action: "The registry is unchanged",
    user_action: "Check the metadata collection id",
};

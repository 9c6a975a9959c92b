//! Instance replication message catalogue.

use cohort_audit::AuditCode;
use cohort_audit::Severity;

pub const INSTANCE_CONFLICT: AuditCode = AuditCode {
    message_id: "COHORT-REPLICATION-0001",
    severity: Severity::Error,
    message_template: "Member {0} sent an event for {1} {2} whose home is {3}",
    system_action: "The event was dropped; only the home repository may change an instance",
    user_action: "Investigate why the member is publishing changes to an instance it does not own",
};

pub const LOCAL_STORE_FAILED: AuditCode = AuditCode {
    message_id: "COHORT-REPLICATION-0002",
    severity: Severity::Exception,
    message_template: "The local repository failed to {0} {1}",
    system_action: "The event was not applied",
    user_action: "Check the local repository is available",
};

pub const REFERENCE_COPIES_PURGED: AuditCode = AuditCode {
    message_id: "COHORT-REPLICATION-0003",
    severity: Severity::Action,
    message_template: "Purged {1} entity and {2} relationship reference copies homed at {0}",
    system_action: "Cached copies of the member's instances were removed",
    user_action: "None",
};

pub const HOME_INSTANCE_CHANGED: AuditCode = AuditCode {
    message_id: "COHORT-REPLICATION-0004",
    severity: Severity::Event,
    message_template: "Home {0} {1} {2} at version {3}",
    system_action: "The change was sent to the cohort",
    user_action: "None",
};

pub const REFERENCE_COPY_CHANGE_REFUSED: AuditCode = AuditCode {
    message_id: "COHORT-REPLICATION-0005",
    severity: Severity::Error,
    message_template: "Refused to {0} {1}: it is a reference copy homed at {2}",
    system_action: "The request was rejected",
    user_action: "Send the change to the home repository",
};

pub const HOME_CHANGE_REJECTED: AuditCode = AuditCode {
    message_id: "COHORT-REPLICATION-0006",
    severity: Severity::Error,
    message_template: "Refused to {0} home instance {1}: {2}",
    system_action: "The request was rejected and nothing was published",
    user_action: "Re-read the instance and retry with its current version",
};

pub const HOME_STORE_FAILED: AuditCode = AuditCode {
    message_id: "COHORT-REPLICATION-0007",
    severity: Severity::Exception,
    message_template: "The local repository failed during {0} of home instance {1}",
    system_action: "The change was not published",
    user_action: "Check the local repository is available",
};

pub const HOME_CHANGE_NOT_PUBLISHED: AuditCode = AuditCode {
    message_id: "COHORT-REPLICATION-0008",
    severity: Severity::Exception,
    message_template: "The {0} of home instance {1} was stored but could not be published",
    system_action: "Members keep their previous copy until the next change or refresh",
    user_action: "Check the event bus is available",
};

pub const REMOTE_REPORTED_INSTANCE_CONFLICT: AuditCode = AuditCode {
    message_id: "COHORT-REPLICATION-0009",
    severity: Severity::Error,
    message_template: "Member {0} reports that an event from this repository about {1} contradicts its home {2}: {3}",
    system_action: "The member dropped the event",
    user_action: "Check which repository owns the instance and stop changing it here",
};

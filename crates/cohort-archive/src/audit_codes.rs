//! Archive loader message catalogue.

use cohort_audit::AuditCode;
use cohort_audit::Severity;

pub const LOAD_STARTED: AuditCode = AuditCode {
    message_id: "COHORT-ARCHIVE-0001",
    severity: Severity::Startup,
    message_template: "Loading archive {0} ({1}) from {2}",
    system_action: "TypeDefs, patches and instances from the archive are being added to the local repository",
    user_action: "None",
};

pub const LOAD_COMPLETED: AuditCode = AuditCode {
    message_id: "COHORT-ARCHIVE-0002",
    severity: Severity::Information,
    message_template: "Archive {0} loaded: {1}",
    system_action: "The archive content is available locally",
    user_action: "None",
};

pub const LOAD_FAILED: AuditCode = AuditCode {
    message_id: "COHORT-ARCHIVE-0003",
    severity: Severity::Exception,
    message_template: "Archive {0} could not be loaded while {1}",
    system_action: "Loading stopped; content already added remains",
    user_action: "Correct the cause and load the archive again",
};

pub const TYPEDEF_REJECTED: AuditCode = AuditCode {
    message_id: "COHORT-ARCHIVE-0004",
    severity: Severity::Error,
    message_template: "TypeDef {0} in archive {1} was not accepted: {2}",
    system_action: "The TypeDef was skipped and loading continued",
    user_action: "Correct the archive or resolve the TypeDef conflict",
};

pub const PATCH_NOT_APPLIED: AuditCode = AuditCode {
    message_id: "COHORT-ARCHIVE-0005",
    severity: Severity::Error,
    message_template: "Patch for TypeDef {0} version {1} in archive {2} was not applied: {3}",
    system_action: "The patch was skipped and loading continued",
    user_action: "Check the archive's patches are in version order",
};

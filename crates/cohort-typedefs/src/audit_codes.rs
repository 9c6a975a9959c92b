//! TypeDef manager message catalogue.

use cohort_audit::AuditCode;
use cohort_audit::Severity;

pub const TYPEDEF_ADOPTED: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0001",
    severity: Severity::Event,
    message_template: "TypeDef {0} version {1} ({2}) adopted from {3}",
    system_action: "The definition is available for instances of this type",
    user_action: "None",
};

pub const TYPEDEF_UPGRADED: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0002",
    severity: Severity::Event,
    message_template: "TypeDef {0} upgraded from version {1} to version {2} announced by {3}",
    system_action: "The compatible definition with the higher version replaced the held one",
    user_action: "None",
};

pub const TYPEDEF_CONFLICT: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0003",
    severity: Severity::Error,
    message_template: "TypeDef {0} announced by {1} conflicts with the held definition: {2}",
    system_action: "The announced definition was rejected and instances of the type are excluded from federation",
    user_action: "Reconcile the two definitions, then resolve the conflict",
};

pub const PATCH_APPLIED: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0004",
    severity: Severity::Action,
    message_template: "Patch applied to TypeDef {0}; version is now {1}",
    system_action: "The patched definition was sent to the cohort",
    user_action: "None",
};

pub const PATCH_VERSION_MISMATCH: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0005",
    severity: Severity::Error,
    message_template: "Patch for TypeDef {0} applies to version {1} but version {2} is held",
    system_action: "The patch was rejected and the definition is unchanged",
    user_action: "Rebase the patch on the current version",
};

pub const PATCH_REJECTED: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0006",
    severity: Severity::Error,
    message_template: "Patch for TypeDef {0} was rejected: {1}",
    system_action: "The definition is unchanged",
    user_action: "Correct the patch and retry",
};

pub const CONFLICT_RESOLVED: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0007",
    severity: Severity::Action,
    message_template: "{1} conflict(s) for TypeDef {0} resolved by an administrator",
    system_action: "Instances of the type are included in federation again",
    user_action: "None",
};

pub const REMOTE_REPORTED_CONFLICT: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0008",
    severity: Severity::Error,
    message_template: "Member {0} reports that its TypeDef {1} ({2}) conflicts with the local definition ({3}): {4}",
    system_action: "The remote member excludes instances of the type",
    user_action: "Reconcile the definitions across the cohort",
};

pub const INVALID_REMOTE_TYPEDEF: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0009",
    severity: Severity::Error,
    message_template: "Member {0} announced an invalid TypeDef {1}: {2}",
    system_action: "The definition was ignored",
    user_action: "Correct the definition at the announcing member",
};

pub const TYPEDEFS_SEEDED: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0010",
    severity: Severity::Startup,
    message_template: "{0} TypeDef(s) loaded from the local repository",
    system_action: "The definitions are held and will be announced to the cohort",
    user_action: "None",
};

pub const PATCH_UNKNOWN_TYPEDEF: AuditCode = AuditCode {
    message_id: "COHORT-TYPEDEFS-0011",
    severity: Severity::Error,
    message_template: "Patch for TypeDef {0} at version {1} names a type that is not held",
    system_action: "The patch was not applied",
    user_action: "Load or announce the TypeDef before patching it",
};

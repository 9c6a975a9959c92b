use cohort_audit::AuditCode;
use cohort_audit::Severity;

pub const MALFORMED_EVENT: AuditCode = AuditCode {
    message_id: "COHORT-EVENTS-0001",
    severity: Severity::Error,
    message_template: "Dropped an unreadable event on the {0} stream: {1}",
    system_action: "The event was discarded and the stream continues with the next event",
    user_action: "Check the protocol version and health of the member that sent the event",
};

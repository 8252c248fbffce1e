use tracing::warn;

use crate::rbac_ports::{AuditEvent, AuditRepository};

/// Appends an audit event after the state change has committed.
///
/// Failures are logged and never surfaced to the caller.
pub(crate) async fn append_audit_event(repository: &dyn AuditRepository, event: AuditEvent) {
    let action = event.action;
    let target = event.target.clone();

    if let Err(error) = repository.append_event(event).await {
        warn!(
            action = action.as_str(),
            target = %target,
            error = %error,
            "failed to append audit event"
        );
    }
}

//! Audit sink that writes events to tracing output.

use async_trait::async_trait;
use tracing::info;

use warden_application::{AuditEvent, AuditRepository};
use warden_core::AppResult;

/// Audit repository for deployments without a database; events go to the log.
#[derive(Clone, Default)]
pub struct TracingAuditRepository;

impl TracingAuditRepository {
    /// Creates a new tracing audit sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditRepository for TracingAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        info!(
            actor = %event.actor,
            action = event.action.as_str(),
            target = %event.target,
            role = %event.role_name,
            scope = %event.scope,
            occurred_at = %event.occurred_at.to_rfc3339(),
            detail = event.detail.as_deref().unwrap_or_default(),
            "audit event"
        );

        Ok(())
    }
}

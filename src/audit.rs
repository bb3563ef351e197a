/// Audit logging for reconciliation runs
///
/// Every audit, update, create and dump issued through the CLI is recorded as
/// one JSON line with the outcome and the size of the computed diff.
use crate::core::permission::ReconciliationResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Audit,
    Update,
    Create,
    Dump,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub event_type: EventType,

    /// Whether the run ended up to date
    pub success: bool,

    /// Group id and diff sizes
    pub details: serde_json::Value,

    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }

    /// Builds an event from a reconciliation outcome.
    pub fn from_result(event_type: EventType, spec_name: &str, result: &ReconciliationResult) -> Self {
        let error = result
            .is_failure()
            .then(|| format!("security group {spec_name} not found or not created"));

        Self::new(
            event_type,
            result.up_to_date,
            serde_json::json!({
                "group": spec_name,
                "group_id": result.group_id,
                "to_add": result.to_add.len(),
                "to_delete": result.to_delete.len(),
            }),
            error,
        )
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Opens the log at `<state dir>/audit.log`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push("audit.log");

        Ok(Self { log_path })
    }

    pub fn at(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Appends an event as one JSON line.
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub async fn log(&self, event: AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(&event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Reads up to `count` events, newest first. Unparseable lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect();

        Ok(events)
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

/// Records a reconciliation run in the default audit log.
pub async fn log_reconcile(event_type: EventType, spec_name: &str, result: &ReconciliationResult) {
    if let Ok(audit) = AuditLog::new() {
        let event = AuditEvent::from_result(event_type, spec_name, result);
        if let Err(e) = audit.log(event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }
}

/// Records a dump in the default audit log.
pub async fn log_dump(group_id: &str, rule_count: Option<usize>) {
    if let Ok(audit) = AuditLog::new() {
        let event = AuditEvent::new(
            EventType::Dump,
            rule_count.is_some(),
            serde_json::json!({
                "group_id": group_id,
                "rule_count": rule_count,
            }),
            rule_count
                .is_none()
                .then(|| format!("security group {group_id} not found")),
        );

        if let Err(e) = audit.log(event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// One recorded action: a subtask execution step, a checkpoint/rollback,
/// or an autonomous-loop cycle transition.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// The subtask, checkpoint, or cycle this entry belongs to.
    pub subject_id: Uuid,
    pub action: String,
    /// Role name, when the entry is tied to a specific worker role.
    pub role: Option<String>,
    pub details: serde_json::Value,
    pub outcome: AuditOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Denied,
    Error,
}

/// Append-only audit log. Writes are queued on an unbounded channel and
/// flushed by a background task so `log()` never blocks on disk I/O.
pub struct AuditLog {
    tx: mpsc::UnboundedSender<AuditEntry>,
}

impl AuditLog {
    /// Create a new AuditLog, spawning the background writer.
    pub fn new(log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();

        tokio::spawn(async move {
            let _ = tokio::fs::create_dir_all(&log_dir).await;
            let log_file = log_dir.join("audit.jsonl");

            while let Some(entry) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&entry) {
                    if let Ok(mut file) = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&log_file)
                        .await
                    {
                        use tokio::io::AsyncWriteExt;
                        let line = format!("{line}\n");
                        let _ = file.write_all(line.as_bytes()).await;
                    }
                }
            }
        });

        Self { tx }
    }

    pub fn log(&self, entry: AuditEntry) {
        info!(
            subject_id = %entry.subject_id,
            action = %entry.action,
            outcome = ?entry.outcome,
            "audit"
        );
        let _ = self.tx.send(entry);
    }

    pub fn log_action(
        &self,
        subject_id: Uuid,
        action: impl Into<String>,
        role: Option<String>,
        details: serde_json::Value,
        outcome: AuditOutcome,
    ) {
        self.log(AuditEntry {
            timestamp: Utc::now(),
            subject_id,
            action: action.into(),
            role,
            details,
            outcome,
        });
    }
}

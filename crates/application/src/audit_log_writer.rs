use std::sync::Arc;

use tracing::debug;

use warden_core::AppResult;
use warden_domain::{AuditEntry, AuditRecord, AuditRecordId};

use crate::{AssignmentStore, AssignmentTransaction};

/// Append-only writer for audit records.
#[derive(Clone)]
pub struct AuditLogWriter {
    store: Arc<dyn AssignmentStore>,
}

impl AuditLogWriter {
    /// Creates a writer over the assignment store.
    #[must_use]
    pub fn new(store: Arc<dyn AssignmentStore>) -> Self {
        Self { store }
    }

    /// Records an entry in its own transaction.
    ///
    /// An entry carrying an already-recorded idempotency key returns the
    /// existing record and appends nothing.
    pub async fn record(&self, entry: AuditEntry) -> AppResult<AuditRecord> {
        let mut transaction = self.store.begin().await?;
        let record = append_entry(transaction.as_mut(), entry).await?;
        transaction.commit().await?;
        Ok(record)
    }
}

/// Appends an entry inside an open transaction, honouring its idempotency key.
pub(crate) async fn append_entry(
    transaction: &mut dyn AssignmentTransaction,
    entry: AuditEntry,
) -> AppResult<AuditRecord> {
    if let Some(key) = entry.idempotency_key.as_deref()
        && let Some(existing) = transaction.find_audit_by_idempotency_key(key).await?
    {
        debug!(idempotency_key = key, record_id = %existing.id, "audit entry already recorded");
        return Ok(existing);
    }

    let record = AuditRecord {
        id: AuditRecordId::new(),
        entry,
    };
    transaction.append_audit(&record).await?;
    Ok(record)
}

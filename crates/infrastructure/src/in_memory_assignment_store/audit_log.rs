use std::collections::{HashMap, HashSet};

use warden_core::{AppError, AppResult};
use warden_domain::{AuditQuery, AuditRecord, AuditRecordId};

/// Append-only audit history shared by every version of the store.
///
/// Kept outside the copy-on-write state so a write never clones history.
/// Records only grow, so a reader pinned to a length sees a stable prefix.
#[derive(Debug, Default)]
pub(super) struct AuditLog {
    records: Vec<AuditRecord>,
    ids: HashSet<AuditRecordId>,
    idempotency_keys: HashMap<String, usize>,
}

impl AuditLog {
    pub(super) fn len(&self) -> usize {
        self.records.len()
    }

    pub(super) fn by_idempotency_key(
        &self,
        idempotency_key: &str,
        visible: usize,
    ) -> Option<AuditRecord> {
        self.idempotency_keys
            .get(idempotency_key)
            .filter(|position| **position < visible)
            .map(|position| self.records[*position].clone())
    }

    /// Matching records among the first `visible`, newest first.
    pub(super) fn newest_first<'a>(
        &'a self,
        query: &'a AuditQuery,
        visible: usize,
    ) -> impl Iterator<Item = &'a AuditRecord> + 'a {
        self.records[..visible.min(self.records.len())]
            .iter()
            .rev()
            .filter(move |record| query.matches(record))
    }

    /// Rejects a record whose id or idempotency key is already taken, either
    /// here or by a record still pending in the same transaction.
    pub(super) fn check_unique(&self, record: &AuditRecord, pending: &[AuditRecord]) -> AppResult<()> {
        if self.ids.contains(&record.id) || pending.iter().any(|existing| existing.id == record.id) {
            return Err(AppError::Conflict(format!(
                "audit record '{}' already exists",
                record.id
            )));
        }

        if let Some(key) = record.entry.idempotency_key.as_deref()
            && (self.idempotency_keys.contains_key(key)
                || pending
                    .iter()
                    .any(|existing| existing.entry.idempotency_key.as_deref() == Some(key)))
        {
            return Err(AppError::Conflict(format!(
                "idempotency key '{key}' already recorded"
            )));
        }

        Ok(())
    }

    pub(super) fn publish(&mut self, records: Vec<AuditRecord>) {
        for record in records {
            if let Some(key) = record.entry.idempotency_key.clone() {
                self.idempotency_keys.insert(key, self.records.len());
            }
            self.ids.insert(record.id);
            self.records.push(record);
        }
    }
}

use super::*;

/// Rows of one assignment kind plus a unique index over unrevoked keys.
#[derive(Debug, Clone)]
pub(super) struct AssignmentTable<T> {
    rows: Vec<T>,
    unrevoked: HashMap<AssignmentKey, usize>,
}

impl<T> Default for AssignmentTable<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            unrevoked: HashMap::new(),
        }
    }
}

impl<T: TemporalAssignment + Clone> AssignmentTable<T> {
    pub(super) fn rows_where(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.iter().filter(|row| predicate(row)).cloned().collect()
    }

    pub(super) fn find_unrevoked(&self, key: &AssignmentKey) -> Option<UnrevokedAssignment> {
        self.unrevoked.get(key).map(|position| {
            let row = &self.rows[*position];
            UnrevokedAssignment {
                id: row.id(),
                window: *row.window(),
            }
        })
    }

    pub(super) fn insert(&mut self, row: &T) -> AppResult<()> {
        let key = row.key();
        if self.unrevoked.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "an unrevoked {} already holds this key",
                key.kind().as_str()
            )));
        }

        if self.rows.iter().any(|existing| existing.id() == row.id()) {
            return Err(AppError::Conflict(format!(
                "{} '{}' already exists",
                key.kind().as_str(),
                row.id()
            )));
        }

        if row.window().is_unrevoked() {
            self.unrevoked.insert(key, self.rows.len());
        }
        self.rows.push(row.clone());
        Ok(())
    }

    pub(super) fn revoke(&mut self, grant_id: GrantId, revocation: Revocation) -> AppResult<bool> {
        let Some(position) = self
            .rows
            .iter()
            .position(|row| row.id() == grant_id && row.window().is_unrevoked())
        else {
            return Ok(false);
        };

        self.stamp(position, revocation)?;
        Ok(true)
    }

    pub(super) fn revoke_referencing(
        &mut self,
        column: ReferenceColumn,
        entity_id: Uuid,
        revocation: Revocation,
    ) -> AppResult<u64> {
        let positions = self
            .unrevoked
            .values()
            .copied()
            .filter(|position| self.rows[*position].reference(column) == Some(entity_id))
            .collect::<Vec<_>>();

        let mut revoked = 0;
        for position in positions {
            let (stamp, cut_short) = self.rows[position].window().cascade_stamp(revocation);
            self.stamp(position, stamp)?;
            if cut_short {
                revoked += 1;
            }
        }

        Ok(revoked)
    }

    fn stamp(&mut self, position: usize, revocation: Revocation) -> AppResult<()> {
        let row = &mut self.rows[position];
        if revocation.revoked_at < row.window().granted_at {
            return Err(AppError::InvariantViolation(format!(
                "revocation of {} '{}' would precede its grant",
                row.key().kind().as_str(),
                row.id()
            )));
        }

        row.window_mut().revocation = Some(revocation);
        self.unrevoked.remove(&row.key());
        Ok(())
    }
}

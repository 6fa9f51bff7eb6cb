use super::*;

use warden_core::NonEmptyString;
use warden_domain::User;

impl GovernanceService {
    /// Resolves the stable user for an identity-provider reference, creating it on first sight.
    pub async fn sync_user(&self, external_ref: &str, at: DateTime<Utc>) -> AppResult<User> {
        let external_ref = NonEmptyString::new(external_ref)?;
        let mut transaction = self.store.begin().await?;

        if let Some(user) = transaction
            .find_user_by_external_ref(external_ref.as_str())
            .await?
        {
            return Ok(user);
        }

        let user = User::new(UserId::new(), external_ref, at);
        transaction.insert_user(&user).await?;
        append_entry(
            transaction.as_mut(),
            AuditEntry::granted(
                at,
                None,
                AuditAction::UserSynced,
                "user",
                user.id().to_string(),
            )
            .with_context(json!({ "external_ref": user.external_ref().as_str() })),
        )
        .await?;
        transaction.commit().await?;

        info!(user_id = %user.id(), "user synced from identity provider");
        Ok(user)
    }
}

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use connecthub_core::domain::notification::NotificationSettings;
use connecthub_core::domain::user::UserId;

use super::codec::{encode_timestamp, parse_timestamp};
use super::{NotificationSettingsRepository, RepositoryError};
use crate::DbPool;

pub struct SqlNotificationSettingsRepository {
    pool: DbPool,
}

impl SqlNotificationSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl NotificationSettingsRepository for SqlNotificationSettingsRepository {
    async fn get(&self, user: &UserId) -> Result<NotificationSettings, RepositoryError> {
        let row = sqlx::query(
            "SELECT new_message, daily_digest, reply_notify, urgent_only, updated_at
             FROM notification_settings
             WHERE user_id = ?",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(NotificationSettings::defaults_for(user.clone()));
        };

        Ok(NotificationSettings {
            user_id: user.clone(),
            new_message: row.try_get("new_message")?,
            daily_digest: row.try_get("daily_digest")?,
            reply_notify: row.try_get("reply_notify")?,
            urgent_only: row.try_get("urgent_only")?,
            updated_at: Some(parse_timestamp("updated_at", row.try_get("updated_at")?)?),
        })
    }

    async fn save(&self, settings: NotificationSettings) -> Result<(), RepositoryError> {
        let updated_at = settings.updated_at.unwrap_or_else(Utc::now);

        sqlx::query(
            "INSERT INTO notification_settings (
                id, user_id, new_message, daily_digest, reply_notify, urgent_only, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                new_message = excluded.new_message,
                daily_digest = excluded.daily_digest,
                reply_notify = excluded.reply_notify,
                urgent_only = excluded.urgent_only,
                updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(settings.user_id.as_str())
        .bind(settings.new_message)
        .bind(settings.daily_digest)
        .bind(settings.reply_notify)
        .bind(settings.urgent_only)
        .bind(encode_timestamp(&updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

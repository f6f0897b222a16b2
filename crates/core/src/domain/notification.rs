use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::message::MessageId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub user_id: UserId,
    pub new_message: bool,
    pub daily_digest: bool,
    pub reply_notify: bool,
    pub urgent_only: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NotificationSettings {
    /// Settings used for users who never saved a preference.
    pub fn defaults_for(user_id: UserId) -> Self {
        Self {
            user_id,
            new_message: true,
            daily_digest: false,
            reply_notify: true,
            urgent_only: false,
            updated_at: None,
        }
    }
}

/// Body of a settings save. Missing toggles keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettingsUpdate {
    pub new_message: Option<bool>,
    pub daily_digest: Option<bool>,
    pub reply_notify: Option<bool>,
    pub urgent_only: Option<bool>,
}

impl NotificationSettingsUpdate {
    pub fn apply(self, settings: &mut NotificationSettings, now: DateTime<Utc>) {
        if let Some(value) = self.new_message {
            settings.new_message = value;
        }
        if let Some(value) = self.daily_digest {
            settings.daily_digest = value;
        }
        if let Some(value) = self.reply_notify {
            settings.reply_notify = value;
        }
        if let Some(value) = self.urgent_only {
            settings.urgent_only = value;
        }
        settings.updated_at = Some(now);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMessage,
    ReplySent,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMessage => "new_message",
            Self::ReplySent => "reply_sent",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "new_message" => Ok(Self::NewMessage),
            "reply_sent" => Ok(Self::ReplySent),
            other => Err(DomainError::Validation(format!("unknown notification type `{other}`"))),
        }
    }
}

/// Wire contract of the send-notification endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message_id: Option<MessageId>,
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub body: String,
}

impl NotificationPayload {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.to_email.trim().is_empty() || !self.to_email.contains('@') {
            return Err(DomainError::Validation("to_email must be an e-mail address".to_owned()));
        }
        if self.subject.trim().is_empty() {
            return Err(DomainError::Validation("subject is required".to_owned()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub success: bool,
    pub message: String,
}

impl NotificationReceipt {
    pub fn sent_to(email: &str) -> Self {
        Self { success: true, message: format!("Notification sent to {email}") }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        NotificationKind, NotificationPayload, NotificationReceipt, NotificationSettings,
        NotificationSettingsUpdate,
    };
    use crate::domain::user::UserId;

    #[test]
    fn defaults_notify_on_new_messages_and_replies() {
        let settings = NotificationSettings::defaults_for(UserId::from("owner-1"));
        assert!(settings.new_message);
        assert!(!settings.daily_digest);
        assert!(settings.reply_notify);
        assert!(!settings.urgent_only);
    }

    #[test]
    fn update_only_touches_supplied_toggles() {
        let mut settings = NotificationSettings::defaults_for(UserId::from("owner-1"));
        NotificationSettingsUpdate { reply_notify: Some(false), ..Default::default() }
            .apply(&mut settings, Utc::now());

        assert!(!settings.reply_notify);
        assert!(settings.new_message);
        assert!(settings.updated_at.is_some());
    }

    #[test]
    fn payload_reads_type_field() {
        let payload: NotificationPayload = serde_json::from_value(serde_json::json!({
            "type": "reply_sent",
            "message_id": "m-1",
            "to_email": "dana@example.com",
            "to_name": "Dana",
            "subject": "Re: Bulk order",
            "body": "Hi Dana"
        }))
        .expect("payload");

        assert_eq!(payload.kind, NotificationKind::ReplySent);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn receipt_names_recipient() {
        assert_eq!(
            NotificationReceipt::sent_to("dana@example.com").message,
            "Notification sent to dana@example.com"
        );
    }
}

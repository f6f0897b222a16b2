use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::business::BusinessId;
use crate::domain::user::UserId;
use crate::domain::{non_blank, string_id};
use crate::errors::DomainError;

string_id!(MessageId);
string_id!(MessageReplyId);

/// Labels an owner can attach to inbox messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageTag {
    Important,
    Lead,
    Support,
    #[serde(rename = "Follow-up")]
    FollowUp,
}

impl MessageTag {
    pub const ALL: [MessageTag; 4] =
        [MessageTag::Important, MessageTag::Lead, MessageTag::Support, MessageTag::FollowUp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Important => "Important",
            Self::Lead => "Lead",
            Self::Support => "Support",
            Self::FollowUp => "Follow-up",
        }
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageTag {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(normalized))
            .ok_or_else(|| DomainError::Validation(format!("unknown message tag `{normalized}`")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub owner_id: Option<UserId>,
    pub customer_name: String,
    pub customer_email: String,
    pub subject: String,
    pub message: String,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_archived: bool,
    pub tags: Vec<MessageTag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.owner_id.as_ref() == Some(user)
    }

    pub fn has_tag(&self, tag: MessageTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Contact form submission. Senders are not authenticated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContactMessage {
    /// Storefront the sender wrote from; its owner receives the message.
    pub business_id: Option<BusinessId>,
    pub customer_name: String,
    pub customer_email: String,
    pub subject: String,
    pub message: String,
}

impl NewContactMessage {
    pub fn into_message(
        self,
        owner_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Message, DomainError> {
        let fields = [
            ("customer_name", self.customer_name.trim()),
            ("customer_email", self.customer_email.trim()),
            ("subject", self.subject.trim()),
            ("message", self.message.trim()),
        ];
        let missing: Vec<&str> =
            fields.iter().filter(|(_, value)| value.is_empty()).map(|(name, _)| *name).collect();
        if !missing.is_empty() {
            return Err(DomainError::Validation(format!(
                "missing required message fields: {}",
                missing.join(", ")
            )));
        }
        let [(_, customer_name), (_, customer_email), (_, subject), (_, message)] = fields;
        if !customer_email.contains('@') {
            return Err(DomainError::Validation(format!(
                "`{customer_email}` is not a valid e-mail address"
            )));
        }

        Ok(Message {
            id: MessageId::generate(),
            owner_id,
            customer_name: customer_name.to_owned(),
            customer_email: customer_email.to_owned(),
            subject: subject.to_owned(),
            message: message.to_owned(),
            is_read: false,
            is_starred: false,
            is_archived: false,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Flag changes requested by the owner. `None` leaves a flag untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub is_read: Option<bool>,
    pub is_starred: Option<bool>,
    pub is_archived: Option<bool>,
}

impl MessageFlags {
    pub fn is_empty(&self) -> bool {
        self.is_read.is_none() && self.is_starred.is_none() && self.is_archived.is_none()
    }

    pub fn apply(self, message: &mut Message, now: DateTime<Utc>) {
        if let Some(is_read) = self.is_read {
            message.is_read = is_read;
        }
        if let Some(is_starred) = self.is_starred {
            message.is_starred = is_starred;
        }
        if let Some(is_archived) = self.is_archived {
            message.is_archived = is_archived;
        }
        message.updated_at = now;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReply {
    pub id: MessageReplyId,
    pub message_id: MessageId,
    pub replied_by: Option<UserId>,
    pub reply_text: String,
    pub created_at: DateTime<Utc>,
}

impl MessageReply {
    pub fn new(
        message_id: MessageId,
        replied_by: UserId,
        reply_text: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let reply_text = non_blank(Some(reply_text))
            .ok_or_else(|| DomainError::Validation("reply text cannot be blank".to_owned()))?;

        Ok(Self {
            id: MessageReplyId::generate(),
            message_id,
            replied_by: Some(replied_by),
            reply_text,
            created_at: now,
        })
    }
}

/// Adds `tag` when absent and removes it when present. Returns whether the tag is now set.
pub fn toggle_tag(tags: &mut Vec<MessageTag>, tag: MessageTag) -> bool {
    if let Some(position) = tags.iter().position(|existing| *existing == tag) {
        tags.remove(position);
        false
    } else {
        tags.push(tag);
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{toggle_tag, MessageReply, MessageTag, NewContactMessage};
    use crate::domain::message::MessageId;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn contact() -> NewContactMessage {
        NewContactMessage {
            business_id: None,
            customer_name: " Dana Reyes ".to_owned(),
            customer_email: "dana@example.com".to_owned(),
            subject: "Bulk order".to_owned(),
            message: "Do you ship to Denver?".to_owned(),
        }
    }

    #[test]
    fn contact_message_starts_unread_and_untagged() {
        let message = contact().into_message(None, Utc::now()).expect("message");
        assert_eq!(message.customer_name, "Dana Reyes");
        assert!(!message.is_read);
        assert!(!message.is_archived);
        assert!(message.tags.is_empty());
    }

    #[test]
    fn contact_message_requires_every_field() {
        let error = NewContactMessage { subject: " ".to_owned(), message: String::new(), ..contact() }
            .into_message(None, Utc::now())
            .expect_err("blank fields");

        let DomainError::Validation(message) = error else {
            panic!("expected validation error");
        };
        assert!(message.contains("subject"));
        assert!(message.contains("message"));
        assert!(!message.contains("customer_name"));
    }

    #[test]
    fn contact_message_requires_an_at_sign() {
        let result = NewContactMessage { customer_email: "dana.example.com".to_owned(), ..contact() }
            .into_message(None, Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn tags_parse_display_names_case_insensitively() {
        assert_eq!("follow-up".parse::<MessageTag>().expect("tag"), MessageTag::FollowUp);
        assert_eq!(MessageTag::FollowUp.to_string(), "Follow-up");
        assert_eq!(
            serde_json::to_string(&MessageTag::FollowUp).expect("serialize"),
            "\"Follow-up\""
        );
        assert!("Urgent".parse::<MessageTag>().is_err());
    }

    #[test]
    fn toggling_twice_restores_tag_set() {
        let mut tags = vec![MessageTag::Lead];
        assert!(toggle_tag(&mut tags, MessageTag::Important));
        assert!(!toggle_tag(&mut tags, MessageTag::Important));
        assert_eq!(tags, vec![MessageTag::Lead]);
    }

    #[test]
    fn reply_rejects_blank_text() {
        let result =
            MessageReply::new(MessageId::from("m-1"), UserId::from("owner-1"), "   ", Utc::now());
        assert!(result.is_err());
    }
}

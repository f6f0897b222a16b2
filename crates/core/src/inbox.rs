use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::message::{Message, MessageTag};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Unread,
    Starred,
    Archived,
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Unread => "unread",
            Self::Starred => "starred",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "unread" => Ok(Self::Unread),
            "starred" => Ok(Self::Starred),
            "archived" => Ok(Self::Archived),
            other => Err(DomainError::Validation(format!(
                "unsupported message status filter `{other}` (expected all|unread|starred|archived)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub search: Option<String>,
    pub status: StatusFilter,
    pub tag: Option<MessageTag>,
    /// Keeps messages created on or after this date.
    pub since: Option<NaiveDate>,
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        let status_ok = match self.status {
            StatusFilter::All => !message.is_archived,
            StatusFilter::Unread => !message.is_archived && !message.is_read,
            StatusFilter::Starred => !message.is_archived && message.is_starred,
            StatusFilter::Archived => message.is_archived,
        };
        if !status_ok {
            return false;
        }

        if let Some(tag) = self.tag {
            if !message.has_tag(tag) {
                return false;
            }
        }

        if let Some(since) = self.since {
            if message.created_at.date_naive() < since {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
            Some(query) => {
                let query = query.to_lowercase();
                [&message.subject, &message.message, &message.customer_name]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&query))
            }
            None => true,
        }
    }

    /// Keeps matching messages, newest first.
    pub fn apply(&self, messages: Vec<Message>) -> Vec<Message> {
        let mut kept: Vec<Message> =
            messages.into_iter().filter(|message| self.matches(message)).collect();
        kept.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        kept
    }
}

/// Counts over the messages that are not archived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxStats {
    pub total: u32,
    pub unread: u32,
    pub starred: u32,
}

impl InboxStats {
    pub fn from_messages<'a, I>(messages: I) -> Self
    where
        I: IntoIterator<Item = &'a Message>,
    {
        messages.into_iter().filter(|message| !message.is_archived).fold(
            Self::default(),
            |mut stats, message| {
                stats.total += 1;
                stats.unread += u32::from(!message.is_read);
                stats.starred += u32::from(message.is_starred);
                stats
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{InboxStats, MessageFilter, StatusFilter};
    use crate::domain::message::{Message, MessageId, MessageTag};

    fn message(id: &str, subject: &str, days_ago: i64) -> Message {
        let created_at = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().expect("date")
            - Duration::days(days_ago);
        Message {
            id: MessageId::from(id),
            owner_id: None,
            customer_name: "Dana Reyes".to_owned(),
            customer_email: "dana@example.com".to_owned(),
            subject: subject.to_owned(),
            message: "Hello there".to_owned(),
            is_read: false,
            is_starred: false,
            is_archived: false,
            tags: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    fn inbox() -> Vec<Message> {
        let mut read = message("m2", "Shipping question", 2);
        read.is_read = true;
        read.is_starred = true;
        read.tags = vec![MessageTag::Support];
        let mut archived = message("m3", "Old invoice", 30);
        archived.is_archived = true;
        vec![message("m1", "Bulk order of mugs", 0), read, archived]
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|message| message.id.as_str()).collect()
    }

    #[test]
    fn default_filter_hides_archived_newest_first() {
        let kept = MessageFilter::default().apply(inbox());
        assert_eq!(ids(&kept), vec!["m1", "m2"]);
    }

    #[test]
    fn archived_tab_shows_only_archived() {
        let filter = MessageFilter { status: StatusFilter::Archived, ..MessageFilter::default() };
        assert_eq!(ids(&filter.apply(inbox())), vec!["m3"]);
    }

    #[test]
    fn status_tag_and_search_combine() {
        let unread = MessageFilter { status: StatusFilter::Unread, ..MessageFilter::default() };
        assert_eq!(ids(&unread.apply(inbox())), vec!["m1"]);

        let tagged = MessageFilter { tag: Some(MessageTag::Support), ..MessageFilter::default() };
        assert_eq!(ids(&tagged.apply(inbox())), vec!["m2"]);

        let search = MessageFilter { search: Some("MUGS".to_owned()), ..MessageFilter::default() };
        assert_eq!(ids(&search.apply(inbox())), vec!["m1"]);

        let by_sender = MessageFilter { search: Some("reyes".to_owned()), ..MessageFilter::default() };
        assert_eq!(by_sender.apply(inbox()).len(), 2);
    }

    #[test]
    fn since_keeps_messages_on_or_after_date() {
        let filter = MessageFilter {
            since: NaiveDate::from_ymd_opt(2026, 3, 8),
            ..MessageFilter::default()
        };
        assert_eq!(ids(&filter.apply(inbox())), vec!["m1", "m2"]);

        let later = MessageFilter {
            since: NaiveDate::from_ymd_opt(2026, 3, 9),
            ..MessageFilter::default()
        };
        assert_eq!(ids(&later.apply(inbox())), vec!["m1"]);
    }

    #[test]
    fn status_filter_parses_known_tabs() {
        assert_eq!("".parse::<StatusFilter>().expect("empty"), StatusFilter::All);
        assert_eq!("Starred".parse::<StatusFilter>().expect("starred"), StatusFilter::Starred);
        assert!("deleted".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn stats_ignore_archived_messages() {
        let messages = inbox();
        assert_eq!(
            InboxStats::from_messages(&messages),
            InboxStats { total: 2, unread: 1, starred: 1 }
        );
    }
}

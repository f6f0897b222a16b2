//! Acknowledgement e-mails. Delivery is a structured log record; nothing leaves the process.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::{debug, info, warn};

use connecthub_core::domain::message::Message;
use connecthub_core::domain::notification::{
    NotificationKind, NotificationPayload, NotificationReceipt,
};
use connecthub_core::errors::{ApplicationError, DomainError};
use connecthub_core::notifications::NotificationDispatcher;

use crate::auth::RequestContext;
use crate::state::AppState;

const TEMPLATES: [(&str, &str); 4] = [
    (
        "new_message.subject",
        include_str!("../../../templates/notifications/new_message_subject.txt"),
    ),
    ("new_message.body", include_str!("../../../templates/notifications/new_message_body.txt")),
    (
        "reply_sent.subject",
        include_str!("../../../templates/notifications/reply_sent_subject.txt"),
    ),
    ("reply_sent.body", include_str!("../../../templates/notifications/reply_sent_body.txt")),
];

pub fn acknowledgement_templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES)?;
    Ok(tera)
}

/// Logs each notification as if it had been handed to a mail provider.
#[derive(Clone, Debug)]
pub struct LoggingDispatcher {
    sender_name: String,
}

impl LoggingDispatcher {
    pub fn new(sender_name: impl Into<String>) -> Self {
        Self { sender_name: sender_name.into() }
    }
}

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn dispatch(
        &self,
        payload: &NotificationPayload,
    ) -> Result<NotificationReceipt, ApplicationError> {
        payload.validate()?;
        info!(
            event_name = "notification.dispatched",
            notification_type = %payload.kind,
            message_id = payload.message_id.as_ref().map(|id| id.as_str()).unwrap_or("none"),
            sender = %self.sender_name,
            to_email = %payload.to_email,
            to_name = %payload.to_name,
            subject = %payload.subject,
            "notification recorded"
        );
        Ok(NotificationReceipt::sent_to(&payload.to_email))
    }
}

/// Renders acknowledgement templates and hands them to the dispatcher.
#[derive(Clone)]
pub struct Notifier {
    templates: Arc<Tera>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    enabled: bool,
}

impl Notifier {
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        enabled: bool,
    ) -> Result<Self, tera::Error> {
        Ok(Self { templates: Arc::new(acknowledgement_templates()?), dispatcher, enabled })
    }

    /// Subject and body for `kind`, addressed to `name` about `subject`.
    pub fn render(
        &self,
        kind: NotificationKind,
        name: &str,
        subject: &str,
    ) -> Result<(String, String), tera::Error> {
        let mut context = Context::new();
        context.insert("name", name);
        context.insert("subject", subject);

        let rendered_subject =
            self.templates.render(&format!("{}.subject", kind.as_str()), &context)?;
        let rendered_body = self.templates.render(&format!("{}.body", kind.as_str()), &context)?;
        Ok((rendered_subject.trim().to_owned(), rendered_body.trim().to_owned()))
    }

    pub async fn dispatch(
        &self,
        payload: &NotificationPayload,
    ) -> Result<NotificationReceipt, ApplicationError> {
        self.dispatcher.dispatch(payload).await
    }

    /// Best-effort acknowledgement to the sender of `message`. Failures are logged and swallowed.
    pub async fn acknowledge(
        &self,
        kind: NotificationKind,
        message: &Message,
        correlation_id: &str,
    ) -> Option<NotificationReceipt> {
        if !self.enabled {
            debug!(
                event_name = "notification.skipped",
                correlation_id = %correlation_id,
                notification_type = %kind,
                "notifications disabled"
            );
            return None;
        }

        let (subject, body) = match self.render(kind, &message.customer_name, &message.subject) {
            Ok(rendered) => rendered,
            Err(error) => {
                warn!(
                    event_name = "notification.render_failed",
                    correlation_id = %correlation_id,
                    notification_type = %kind,
                    error = %error,
                    "could not render acknowledgement"
                );
                return None;
            }
        };
        let payload = NotificationPayload {
            kind,
            message_id: Some(message.id.clone()),
            to_email: message.customer_email.clone(),
            to_name: message.customer_name.clone(),
            subject,
            body,
        };

        match self.dispatcher.dispatch(&payload).await {
            Ok(receipt) => Some(receipt),
            Err(error) => {
                warn!(
                    event_name = "notification.dispatch_failed",
                    correlation_id = %correlation_id,
                    notification_type = %kind,
                    message_id = %message.id,
                    error = %error,
                    "acknowledgement not delivered"
                );
                None
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self { success: false, message: None, error: Some(error.into()) }
    }
}

/// `POST /functions/v1/send-notification`
pub async fn send_notification(
    State(state): State<AppState>,
    context: RequestContext,
    payload: Result<Json<NotificationPayload>, JsonRejection>,
) -> (StatusCode, Json<NotificationOutcome>) {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(
                event_name = "notification.request_invalid",
                correlation_id = %context.correlation_id,
                error = %rejection.body_text(),
                "malformed notification request"
            );
            return (StatusCode::BAD_REQUEST, Json(NotificationOutcome::failed(rejection.body_text())));
        }
    };

    match state.notifier.dispatch(&payload).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(NotificationOutcome {
                success: receipt.success,
                message: Some(receipt.message),
                error: None,
            }),
        ),
        Err(ApplicationError::Domain(DomainError::Validation(message))) => {
            (StatusCode::BAD_REQUEST, Json(NotificationOutcome::failed(message)))
        }
        Err(error) => {
            warn!(
                event_name = "notification.request_failed",
                correlation_id = %context.correlation_id,
                error = %error,
                "notification endpoint failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(NotificationOutcome::failed("notification could not be sent")),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use chrono::Utc;

    use connecthub_core::domain::message::NewContactMessage;
    use connecthub_core::domain::notification::{NotificationKind, NotificationPayload};
    use connecthub_core::notifications::InMemoryNotificationDispatcher;

    use super::{send_notification, Notifier};
    use crate::auth::RequestContext;
    use crate::state::test_support::sqlite_state;

    fn payload(to_email: &str) -> NotificationPayload {
        NotificationPayload {
            kind: NotificationKind::ReplySent,
            message_id: None,
            to_email: to_email.to_owned(),
            to_name: "Dana".to_owned(),
            subject: "Re: Bulk order".to_owned(),
            body: "Hi Dana".to_owned(),
        }
    }

    #[test]
    fn templates_render_acknowledgement_text() {
        let notifier =
            Notifier::new(Arc::new(InMemoryNotificationDispatcher::default()), true).expect("notifier");

        let (subject, body) =
            notifier.render(NotificationKind::NewMessage, "Dana", "Bulk order").expect("render");
        assert_eq!(subject, "Message received: Bulk order");
        assert_eq!(
            body,
            "Hi Dana, we've received your message \"Bulk order\" and will get back to you shortly."
        );

        let (subject, body) =
            notifier.render(NotificationKind::ReplySent, "Dana", "Bulk order").expect("render");
        assert_eq!(subject, "Re: Bulk order");
        assert_eq!(body, "Hi Dana, you have a new reply to \"Bulk order\".");
    }

    #[tokio::test]
    async fn acknowledgement_is_addressed_to_the_sender() {
        let dispatcher = InMemoryNotificationDispatcher::default();
        let notifier = Notifier::new(Arc::new(dispatcher.clone()), true).expect("notifier");
        let message = NewContactMessage {
            business_id: None,
            customer_name: "Dana".to_owned(),
            customer_email: "dana@example.com".to_owned(),
            subject: "Bulk order".to_owned(),
            message: "Do you ship?".to_owned(),
        }
        .into_message(None, Utc::now())
        .expect("message");

        let receipt = notifier.acknowledge(NotificationKind::NewMessage, &message, "req-1").await;

        assert_eq!(
            receipt.map(|receipt| receipt.message),
            Some("Notification sent to dana@example.com".to_owned())
        );
        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_id.as_ref(), Some(&message.id));
        assert_eq!(sent[0].subject, "Message received: Bulk order");
    }

    #[tokio::test]
    async fn disabled_notifier_sends_nothing() {
        let dispatcher = InMemoryNotificationDispatcher::default();
        let notifier = Notifier::new(Arc::new(dispatcher.clone()), false).expect("notifier");
        let message = NewContactMessage {
            customer_name: "Dana".to_owned(),
            customer_email: "dana@example.com".to_owned(),
            subject: "Hello".to_owned(),
            message: "Hi".to_owned(),
            ..NewContactMessage::default()
        }
        .into_message(None, Utc::now())
        .expect("message");

        assert!(notifier.acknowledge(NotificationKind::NewMessage, &message, "req-2").await.is_none());
        assert!(dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn endpoint_confirms_the_recipient() {
        let state = sqlite_state().await;

        let (status, Json(outcome)) = send_notification(
            State(state),
            RequestContext::default(),
            Ok(Json(payload("dana@example.com"))),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("Notification sent to dana@example.com"));
    }

    #[tokio::test]
    async fn endpoint_rejects_invalid_recipient_with_400() {
        let state = sqlite_state().await;

        let (status, Json(outcome)) =
            send_notification(State(state), RequestContext::default(), Ok(Json(payload("nobody"))))
                .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }
}

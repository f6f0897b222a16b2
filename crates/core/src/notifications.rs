use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::notification::{NotificationPayload, NotificationReceipt};
use crate::errors::ApplicationError;

/// Delivers acknowledgement e-mails. Implementations must not block the caller on delivery.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        payload: &NotificationPayload,
    ) -> Result<NotificationReceipt, ApplicationError>;
}

/// Keeps every payload it receives; used by tests and the smoke command.
#[derive(Clone, Default)]
pub struct InMemoryNotificationDispatcher {
    sent: Arc<Mutex<Vec<NotificationPayload>>>,
}

impl InMemoryNotificationDispatcher {
    pub fn sent(&self) -> Vec<NotificationPayload> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn dispatch(
        &self,
        payload: &NotificationPayload,
    ) -> Result<NotificationReceipt, ApplicationError> {
        payload.validate()?;
        match self.sent.lock() {
            Ok(mut sent) => sent.push(payload.clone()),
            Err(poisoned) => poisoned.into_inner().push(payload.clone()),
        }
        Ok(NotificationReceipt::sent_to(&payload.to_email))
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryNotificationDispatcher, NotificationDispatcher};
    use crate::domain::notification::{NotificationKind, NotificationPayload};

    fn payload(to_email: &str) -> NotificationPayload {
        NotificationPayload {
            kind: NotificationKind::NewMessage,
            message_id: None,
            to_email: to_email.to_owned(),
            to_name: "Dana".to_owned(),
            subject: "Message received: Bulk order".to_owned(),
            body: "Hi Dana".to_owned(),
        }
    }

    #[tokio::test]
    async fn in_memory_dispatcher_records_valid_payloads() {
        let dispatcher = InMemoryNotificationDispatcher::default();

        let receipt = dispatcher.dispatch(&payload("dana@example.com")).await.expect("dispatch");
        assert!(receipt.success);
        assert!(dispatcher.dispatch(&payload("not-an-address")).await.is_err());
        assert_eq!(dispatcher.sent().len(), 1);
    }
}

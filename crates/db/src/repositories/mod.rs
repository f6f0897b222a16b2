use async_trait::async_trait;
use thiserror::Error;

use connecthub_core::audit::{AuditContext, AuditEvent};
use connecthub_core::domain::business::{
    Business, BusinessId, BusinessProduct, ProductId, Review,
};
use connecthub_core::domain::message::{
    Message, MessageFlags, MessageId, MessageReply, MessageTag,
};
use connecthub_core::domain::notification::NotificationSettings;
use connecthub_core::domain::order::Order;
use connecthub_core::domain::quote::{
    NewQuoteResponse, QuoteRequest, QuoteRequestId, QuoteResponse, QuoteResponseId, QuoteThread,
};
use connecthub_core::domain::user::UserId;
use connecthub_core::errors::{ApplicationError, DomainError};

pub mod audit;
pub mod business;
mod codec;
pub mod memory;
pub mod message;
pub mod notification_settings;
pub mod quote;

pub use audit::SqlAuditRepository;
pub use business::SqlBusinessRepository;
pub use memory::{InMemoryBusinessRepository, InMemoryNotificationSettingsRepository};
pub use message::SqlMessageRepository;
pub use notification_settings::SqlNotificationSettingsRepository;
pub use quote::SqlQuoteRepository;

/// SQLITE_BUSY, SQLITE_BUSY_RECOVERY and SQLITE_BUSY_SNAPSHOT.
const SQLITE_BUSY_CODES: [&str; 3] = ["5", "261", "517"];

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Unique-index violations and lost write locks surface as conflicts; everything else
    /// stays a database error.
    pub(crate) fn from_write(error: sqlx::Error, conflict: impl Into<String>) -> Self {
        match &error {
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.code().is_some_and(|code| SQLITE_BUSY_CODES.iter().any(|busy| *busy == code)) =>
            {
                Self::Conflict(conflict.into())
            }
            _ => Self::Database(error),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Persistence(error.to_string()),
            RepositoryError::Decode(message) => Self::Persistence(message),
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Forbidden(message) => Self::Forbidden(message),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::Domain(error) => Self::Domain(error),
        }
    }
}

/// Storefronts with their catalog and reviews.
#[async_trait]
pub trait BusinessRepository: Send + Sync {
    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError>;
    async fn save(&self, business: Business) -> Result<(), RepositoryError>;
    async fn list_active(&self) -> Result<Vec<Business>, RepositoryError>;
    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Business>, RepositoryError>;

    async fn find_product(&self, id: &ProductId)
        -> Result<Option<BusinessProduct>, RepositoryError>;
    async fn save_product(&self, product: BusinessProduct) -> Result<(), RepositoryError>;
    async fn list_products(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<BusinessProduct>, RepositoryError>;
    async fn list_available_products(&self) -> Result<Vec<BusinessProduct>, RepositoryError>;

    async fn add_review(&self, review: Review) -> Result<(), RepositoryError>;
    /// Newest first.
    async fn list_reviews(&self, business_id: &BusinessId) -> Result<Vec<Review>, RepositoryError>;
    async fn list_ratings(&self) -> Result<Vec<(BusinessId, u8)>, RepositoryError>;
}

/// Quote lifecycle store. Multi-row writes are atomic and re-check status before writing.
#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn submit(&self, request: QuoteRequest) -> Result<(), RepositoryError>;
    async fn find_request(
        &self,
        id: &QuoteRequestId,
    ) -> Result<Option<QuoteRequest>, RepositoryError>;
    async fn list_responses(
        &self,
        id: &QuoteRequestId,
    ) -> Result<Vec<QuoteResponse>, RepositoryError>;

    async fn respond(
        &self,
        owner: &UserId,
        id: &QuoteRequestId,
        response: NewQuoteResponse,
        audit: &AuditContext,
    ) -> Result<(QuoteRequest, QuoteResponse), RepositoryError>;
    async fn reject(
        &self,
        owner: &UserId,
        id: &QuoteRequestId,
        audit: &AuditContext,
    ) -> Result<QuoteRequest, RepositoryError>;
    async fn accept(
        &self,
        customer: &UserId,
        id: &QuoteRequestId,
        response_id: &QuoteResponseId,
        audit: &AuditContext,
    ) -> Result<(QuoteRequest, Order), RepositoryError>;

    /// Newest first, with responses and the business name.
    async fn list_for_customer(&self, customer: &UserId)
        -> Result<Vec<QuoteThread>, RepositoryError>;
    /// Requests across every business `owner` owns, newest first.
    async fn list_for_owner(&self, owner: &UserId) -> Result<Vec<QuoteThread>, RepositoryError>;
    async fn orders_for_customer(&self, customer: &UserId) -> Result<Vec<Order>, RepositoryError>;
    async fn orders_for_owner(&self, owner: &UserId) -> Result<Vec<Order>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError>;
    async fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Message>, RepositoryError>;
    async fn update_flags(
        &self,
        owner: &UserId,
        id: &MessageId,
        flags: MessageFlags,
    ) -> Result<Message, RepositoryError>;
    /// Returns the message with its updated tag set.
    async fn toggle_tag(
        &self,
        owner: &UserId,
        id: &MessageId,
        tag: MessageTag,
    ) -> Result<Message, RepositoryError>;
    /// Stores the reply and marks the message read in one transaction.
    async fn add_reply(
        &self,
        owner: &UserId,
        id: &MessageId,
        reply_text: &str,
    ) -> Result<(Message, MessageReply), RepositoryError>;
    async fn list_replies(&self, id: &MessageId) -> Result<Vec<MessageReply>, RepositoryError>;
}

#[async_trait]
pub trait NotificationSettingsRepository: Send + Sync {
    /// Stored settings, or the defaults when the user never saved any.
    async fn get(&self, user: &UserId) -> Result<NotificationSettings, RepositoryError>;
    async fn save(&self, settings: NotificationSettings) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_quote_request(
        &self,
        id: &QuoteRequestId,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}

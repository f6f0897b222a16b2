pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod inbox;
pub mod marketplace;
pub mod notifications;

pub use domain::business::{Business, BusinessId, BusinessProduct, Coordinates, ProductId, Review};
pub use domain::message::{Message, MessageId, MessageTag};
pub use domain::notification::{NotificationKind, NotificationPayload, NotificationSettings};
pub use domain::order::{Order, OrderId, OrderStatus};
pub use domain::quote::{QuoteRequest, QuoteRequestId, QuoteResponse, QuoteResponseId, QuoteStatus};
pub use domain::user::UserId;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, QuoteLifecycleFlow};
pub use marketplace::{rank_listings, BusinessListing, MarketplaceQuery};

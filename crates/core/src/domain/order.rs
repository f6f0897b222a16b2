use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::business::BusinessId;
use crate::domain::quote::{QuoteRequest, QuoteRequestId, QuoteResponse, QuoteResponseId};
use crate::domain::string_id;
use crate::domain::user::UserId;
use crate::errors::DomainError;

string_id!(OrderId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::Validation(format!("unknown order status `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub quote_request_id: QuoteRequestId,
    pub quote_response_id: QuoteResponseId,
    pub customer_id: UserId,
    pub business_id: BusinessId,
    pub final_price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds the order placed when `request`'s customer accepts `response`.
    pub fn from_acceptance(
        request: &QuoteRequest,
        response: &QuoteResponse,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if response.quote_request_id != request.id {
            return Err(DomainError::InvariantViolation(format!(
                "quote response {} does not belong to quote request {}",
                response.id, request.id
            )));
        }

        Ok(Self {
            id: OrderId::generate(),
            quote_request_id: request.id.clone(),
            quote_response_id: response.id.clone(),
            customer_id: request.customer_id.clone(),
            business_id: request.business_id.clone(),
            final_price: response.price_estimate,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{Order, OrderStatus};
    use crate::domain::business::BusinessId;
    use crate::domain::quote::{NewQuoteRequest, NewQuoteResponse, QuoteRequestId};
    use crate::domain::user::UserId;

    #[test]
    fn acceptance_copies_price_and_parties() {
        let request = NewQuoteRequest {
            business_id: BusinessId::from("biz-1"),
            product_name: "Custom Mugs".to_owned(),
            quantity: Some(5),
            ..NewQuoteRequest::default()
        }
        .into_request(UserId::from("customer-1"), Utc::now())
        .expect("request");
        let response = NewQuoteResponse {
            price_estimate: Decimal::new(4999, 2),
            ..NewQuoteResponse::default()
        }
        .into_response(&request, Utc::now())
        .expect("response");

        let order = Order::from_acceptance(&request, &response, Utc::now()).expect("order");

        assert_eq!(order.final_price, Decimal::new(4999, 2));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.customer_id, UserId::from("customer-1"));
        assert_eq!(order.quote_response_id, response.id);
    }

    #[test]
    fn acceptance_rejects_response_from_another_request() {
        let request = NewQuoteRequest {
            business_id: BusinessId::from("biz-1"),
            product_name: "Banner".to_owned(),
            ..NewQuoteRequest::default()
        }
        .into_request(UserId::from("customer-1"), Utc::now())
        .expect("request");
        let mut response = NewQuoteResponse {
            price_estimate: Decimal::new(10, 0),
            ..NewQuoteResponse::default()
        }
        .into_response(&request, Utc::now())
        .expect("response");
        response.quote_request_id = QuoteRequestId::from("someone-else");

        assert!(Order::from_acceptance(&request, &response, Utc::now()).is_err());
    }

    #[test]
    fn status_parses_in_progress() {
        assert_eq!("in_progress".parse::<OrderStatus>().expect("parse"), OrderStatus::InProgress);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }
}

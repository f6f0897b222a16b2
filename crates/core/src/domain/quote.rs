use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::business::{BusinessId, ProductId};
use crate::domain::user::UserId;
use crate::domain::{non_blank, string_id};
use crate::errors::DomainError;

string_id!(QuoteRequestId);
string_id!(QuoteResponseId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Quoted,
    Accepted,
    Rejected,
}

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 4] =
        [QuoteStatus::Pending, QuoteStatus::Quoted, QuoteStatus::Accepted, QuoteStatus::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Quoted => "quoted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "quoted" => Ok(Self::Quoted),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::Validation(format!("unknown quote status `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub id: QuoteRequestId,
    pub customer_id: UserId,
    pub business_id: BusinessId,
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub quantity: u32,
    pub customization_details: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuoteRequest {
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        matches!(
            (self.status, next),
            (QuoteStatus::Pending, QuoteStatus::Quoted)
                | (QuoteStatus::Quoted, QuoteStatus::Quoted)
                | (QuoteStatus::Pending, QuoteStatus::Rejected)
                | (QuoteStatus::Quoted, QuoteStatus::Accepted)
        )
    }

    pub fn transition_to(&mut self, next: QuoteStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = now;
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.status, to: next })
    }

    /// Case-insensitive match over product name and customization notes.
    pub fn matches_search(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.product_name.to_lowercase().contains(&query)
            || self
                .customization_details
                .as_deref()
                .map(|details| details.to_lowercase().contains(&query))
                .unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuoteRequest {
    pub business_id: BusinessId,
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub quantity: Option<u32>,
    pub customization_details: Option<String>,
    pub deadline: Option<NaiveDate>,
}

impl NewQuoteRequest {
    pub fn into_request(
        self,
        customer_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<QuoteRequest, DomainError> {
        let product_name = self.product_name.trim();
        if product_name.is_empty() {
            return Err(DomainError::Validation("product_name is required".to_owned()));
        }
        let quantity = self.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(DomainError::Validation("quantity must be at least 1".to_owned()));
        }

        Ok(QuoteRequest {
            id: QuoteRequestId::generate(),
            customer_id,
            business_id: self.business_id,
            product_id: self.product_id,
            product_name: product_name.to_owned(),
            quantity,
            customization_details: non_blank(self.customization_details.as_deref()),
            deadline: self.deadline,
            status: QuoteStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub id: QuoteResponseId,
    pub quote_request_id: QuoteRequestId,
    pub business_id: BusinessId,
    pub price_estimate: Decimal,
    pub message: Option<String>,
    pub delivery_time: Option<String>,
    pub valid_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuoteResponse {
    pub price_estimate: Decimal,
    pub message: Option<String>,
    pub delivery_time: Option<String>,
    pub valid_until: Option<NaiveDate>,
}

impl NewQuoteResponse {
    pub fn into_response(
        self,
        request: &QuoteRequest,
        now: DateTime<Utc>,
    ) -> Result<QuoteResponse, DomainError> {
        if self.price_estimate <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "price_estimate must be greater than zero".to_owned(),
            ));
        }

        Ok(QuoteResponse {
            id: QuoteResponseId::generate(),
            quote_request_id: request.id.clone(),
            business_id: request.business_id.clone(),
            price_estimate: self.price_estimate,
            message: non_blank(self.message.as_deref()),
            delivery_time: non_blank(self.delivery_time.as_deref()),
            valid_until: self.valid_until,
            created_at: now,
        })
    }
}

/// A request together with every response it has received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteThread {
    pub request: QuoteRequest,
    pub business_name: String,
    pub responses: Vec<QuoteResponse>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteStatusCounts {
    pub pending: u32,
    pub quoted: u32,
    pub accepted: u32,
    pub rejected: u32,
}

impl QuoteStatusCounts {
    pub fn tally<'a, I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = &'a QuoteStatus>,
    {
        statuses.into_iter().fold(Self::default(), |mut counts, status| {
            match status {
                QuoteStatus::Pending => counts.pending += 1,
                QuoteStatus::Quoted => counts.quoted += 1,
                QuoteStatus::Accepted => counts.accepted += 1,
                QuoteStatus::Rejected => counts.rejected += 1,
            }
            counts
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        NewQuoteRequest, NewQuoteResponse, QuoteRequest, QuoteStatus, QuoteStatusCounts,
    };
    use crate::domain::business::BusinessId;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn request() -> QuoteRequest {
        NewQuoteRequest {
            business_id: BusinessId::from("biz-1"),
            product_name: "Custom Mugs".to_owned(),
            quantity: Some(5),
            customization_details: Some("Blue glaze, logo on both sides".to_owned()),
            ..NewQuoteRequest::default()
        }
        .into_request(UserId::from("customer-1"), Utc::now())
        .expect("valid request")
    }

    #[test]
    fn new_requests_start_pending() {
        let request = request();
        assert_eq!(request.status, QuoteStatus::Pending);
        assert_eq!(request.quantity, 5);
    }

    #[test]
    fn quantity_defaults_to_one_and_rejects_zero() {
        let default_quantity = NewQuoteRequest {
            business_id: BusinessId::from("biz-1"),
            product_name: "Banner".to_owned(),
            ..NewQuoteRequest::default()
        }
        .into_request(UserId::from("customer-1"), Utc::now())
        .expect("request");
        assert_eq!(default_quantity.quantity, 1);

        let zero = NewQuoteRequest {
            business_id: BusinessId::from("biz-1"),
            product_name: "Banner".to_owned(),
            quantity: Some(0),
            ..NewQuoteRequest::default()
        }
        .into_request(UserId::from("customer-1"), Utc::now());
        assert!(zero.is_err());
    }

    #[test]
    fn allows_lifecycle_transitions() {
        let mut request = request();
        request.transition_to(QuoteStatus::Quoted, Utc::now()).expect("pending -> quoted");
        request.transition_to(QuoteStatus::Quoted, Utc::now()).expect("additional response");
        request.transition_to(QuoteStatus::Accepted, Utc::now()).expect("quoted -> accepted");
        assert_eq!(request.status, QuoteStatus::Accepted);
    }

    #[test]
    fn blocks_transitions_out_of_terminal_states() {
        let mut request = request();
        request.transition_to(QuoteStatus::Rejected, Utc::now()).expect("pending -> rejected");

        for next in QuoteStatus::ALL {
            let error = request.transition_to(next, Utc::now()).expect_err("terminal");
            assert!(matches!(error, DomainError::InvalidQuoteTransition { .. }));
        }
    }

    #[test]
    fn rejection_is_only_reachable_from_pending() {
        let mut request = request();
        request.transition_to(QuoteStatus::Quoted, Utc::now()).expect("pending -> quoted");
        assert!(!request.can_transition_to(QuoteStatus::Rejected));
    }

    #[test]
    fn pending_cannot_jump_to_accepted() {
        assert!(!request().can_transition_to(QuoteStatus::Accepted));
    }

    #[test]
    fn status_round_trips_through_storage_strings() {
        for status in QuoteStatus::ALL {
            assert_eq!(status.as_str().parse::<QuoteStatus>().expect("parse"), status);
        }
        assert!("declined".parse::<QuoteStatus>().is_err());
    }

    #[test]
    fn search_matches_product_and_customization_case_insensitively() {
        let request = request();
        assert!(request.matches_search("MUGS"));
        assert!(request.matches_search("logo"));
        assert!(request.matches_search(""));
        assert!(!request.matches_search("t-shirt"));
    }

    #[test]
    fn response_requires_positive_price() {
        let request = request();
        let zero = NewQuoteResponse { price_estimate: Decimal::ZERO, ..NewQuoteResponse::default() }
            .into_response(&request, Utc::now());
        assert!(zero.is_err());

        let response =
            NewQuoteResponse { price_estimate: Decimal::new(4999, 2), ..NewQuoteResponse::default() }
                .into_response(&request, Utc::now())
                .expect("response");
        assert_eq!(response.quote_request_id, request.id);
        assert_eq!(response.business_id, request.business_id);
    }

    #[test]
    fn status_counts_tally_each_bucket() {
        let counts = QuoteStatusCounts::tally(&[
            QuoteStatus::Pending,
            QuoteStatus::Pending,
            QuoteStatus::Quoted,
            QuoteStatus::Rejected,
        ]);
        assert_eq!(counts, QuoteStatusCounts { pending: 2, quoted: 1, accepted: 0, rejected: 1 });
    }
}

//! Quote request lifecycle over HTTP. Transitions themselves live in the repository so
//! status checks and multi-row writes share one transaction.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use connecthub_core::audit::AuditContext;
use connecthub_core::domain::order::Order;
use connecthub_core::domain::quote::{
    NewQuoteRequest, NewQuoteResponse, QuoteRequest, QuoteRequestId, QuoteResponse,
    QuoteResponseId, QuoteStatus, QuoteStatusCounts, QuoteThread,
};
use connecthub_core::errors::DomainError;
use connecthub_db::repositories::{BusinessRepository, QuoteRepository};

use crate::auth::Caller;
use crate::changes::{ChangeNotice, ChangeTable};
use crate::error::{ApiError, ApiResultExt};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct IncomingParams {
    pub q: Option<String>,
    /// `all` or a quote status.
    pub status: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AcceptQuote {
    pub quote_response_id: QuoteResponseId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondOutcome {
    pub request: QuoteRequest,
    pub response: QuoteResponse,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOutcome {
    pub request: QuoteRequest,
    pub order: Order,
}

/// `POST /api/v1/quote-requests`
pub async fn submit_quote_request(
    State(state): State<AppState>,
    caller: Caller,
    Json(mut submission): Json<NewQuoteRequest>,
) -> Result<(StatusCode, Json<QuoteRequest>), ApiError> {
    let cid = caller.correlation_id.as_str();
    let business = state
        .businesses
        .find_by_id(&submission.business_id)
        .await
        .or_api(cid)?
        .filter(|business| business.is_active)
        .ok_or_else(|| ApiError::not_found("business", submission.business_id.as_str(), cid))?;

    if let Some(product_id) = &submission.product_id {
        let product = state
            .businesses
            .find_product(product_id)
            .await
            .or_api(cid)?
            .filter(|product| product.business_id == business.id)
            .ok_or_else(|| {
                ApiError::bad_request(
                    format!("product {product_id} is not offered by {}", business.name),
                    cid,
                )
            })?;
        if submission.product_name.trim().is_empty() {
            submission.product_name = product.name;
        }
    }

    let request = submission.into_request(caller.user_id.clone(), Utc::now()).or_api(cid)?;
    state.quotes.submit(request.clone()).await.or_api(cid)?;
    state.changes.publish(ChangeNotice::inserted(ChangeTable::QuoteRequests, &request.id));

    info!(
        event_name = "quote.request.submitted",
        correlation_id = %cid,
        quote_request_id = %request.id,
        business_id = %request.business_id,
        quantity = request.quantity,
        "quote request submitted"
    );
    Ok((StatusCode::CREATED, Json(request)))
}

/// `GET /api/v1/quote-requests/mine`
pub async fn my_quote_requests(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<QuoteThread>>, ApiError> {
    let threads =
        state.quotes.list_for_customer(&caller.user_id).await.or_api(&caller.correlation_id)?;
    Ok(Json(threads))
}

/// `GET /api/v1/quote-requests/incoming?q=&status=`
pub async fn incoming_quote_requests(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<IncomingParams>,
) -> Result<Json<Vec<QuoteThread>>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let status = parse_status_tab(params.status.as_deref()).or_api(cid)?;
    let search = params.q.unwrap_or_default();

    let threads = state
        .quotes
        .list_for_owner(&caller.user_id)
        .await
        .or_api(cid)?
        .into_iter()
        .filter(|thread| status.map_or(true, |status| thread.request.status == status))
        .filter(|thread| thread.request.matches_search(&search))
        .collect();
    Ok(Json(threads))
}

/// `GET /api/v1/quote-requests/incoming/stats`
pub async fn incoming_quote_stats(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<QuoteStatusCounts>, ApiError> {
    let threads =
        state.quotes.list_for_owner(&caller.user_id).await.or_api(&caller.correlation_id)?;
    Ok(Json(QuoteStatusCounts::tally(threads.iter().map(|thread| &thread.request.status))))
}

/// `POST /api/v1/quote-requests/{id}/responses`
pub async fn respond_to_quote_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(response): Json<NewQuoteResponse>,
) -> Result<(StatusCode, Json<RespondOutcome>), ApiError> {
    let cid = caller.correlation_id.as_str();
    let id = QuoteRequestId(id);
    let audit = AuditContext::new(Some(id.clone()), cid, caller.user_id.as_str());

    let (request, response) =
        state.quotes.respond(&caller.user_id, &id, response, &audit).await.or_api(cid)?;
    state.changes.publish(ChangeNotice::inserted(ChangeTable::QuoteResponses, &response.id));
    state.changes.publish(ChangeNotice::updated(ChangeTable::QuoteRequests, &request.id));

    info!(
        event_name = "quote.response.recorded",
        correlation_id = %cid,
        quote_request_id = %request.id,
        quote_response_id = %response.id,
        price_estimate = %response.price_estimate,
        "quote response recorded"
    );
    Ok((StatusCode::CREATED, Json(RespondOutcome { request, response })))
}

/// `POST /api/v1/quote-requests/{id}/reject`
pub async fn reject_quote_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<QuoteRequest>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let id = QuoteRequestId(id);
    let audit = AuditContext::new(Some(id.clone()), cid, caller.user_id.as_str());

    let request = state.quotes.reject(&caller.user_id, &id, &audit).await.or_api(cid)?;
    state.changes.publish(ChangeNotice::updated(ChangeTable::QuoteRequests, &request.id));

    info!(
        event_name = "quote.request.rejected",
        correlation_id = %cid,
        quote_request_id = %request.id,
        "quote request rejected"
    );
    Ok(Json(request))
}

/// `POST /api/v1/quote-requests/{id}/accept`
pub async fn accept_quote(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(acceptance): Json<AcceptQuote>,
) -> Result<(StatusCode, Json<AcceptOutcome>), ApiError> {
    let cid = caller.correlation_id.as_str();
    let id = QuoteRequestId(id);
    let audit = AuditContext::new(Some(id.clone()), cid, caller.user_id.as_str());

    let (request, order) = state
        .quotes
        .accept(&caller.user_id, &id, &acceptance.quote_response_id, &audit)
        .await
        .or_api(cid)?;
    state.changes.publish(ChangeNotice::inserted(ChangeTable::Orders, &order.id));
    state.changes.publish(ChangeNotice::updated(ChangeTable::QuoteRequests, &request.id));

    info!(
        event_name = "quote.order.created",
        correlation_id = %cid,
        quote_request_id = %request.id,
        order_id = %order.id,
        final_price = %order.final_price,
        "quote accepted and order created"
    );
    Ok((StatusCode::CREATED, Json(AcceptOutcome { request, order })))
}

/// `GET /api/v1/orders/mine`
pub async fn my_orders(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders =
        state.quotes.orders_for_customer(&caller.user_id).await.or_api(&caller.correlation_id)?;
    Ok(Json(orders))
}

/// `GET /api/v1/orders/incoming`
pub async fn incoming_orders(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders =
        state.quotes.orders_for_owner(&caller.user_id).await.or_api(&caller.correlation_id)?;
    Ok(Json(orders))
}

fn parse_status_tab(raw: Option<&str>) -> Result<Option<QuoteStatus>, DomainError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("all") => Ok(None),
        Some(value) => value.parse().map(Some),
    }
}

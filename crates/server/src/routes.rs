//! API surface.
//!
//! Anonymous:
//! - `GET  /api/v1/marketplace?q=&lat=&lng=`
//! - `GET  /api/v1/businesses/{id}`
//! - `POST /api/v1/businesses/{id}/reviews`
//! - `POST /api/v1/messages`
//! - `POST /functions/v1/send-notification`
//!
//! Everything else requires `x-user-id` (and `x-gateway-secret` when configured).

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::changes::stream_changes;
use crate::directory::{
    add_product, add_review, business_detail, my_businesses, register_business,
    set_product_availability, update_business,
};
use crate::inbox::{
    get_notification_settings, list_messages, message_stats, reply_to_message,
    save_notification_settings, submit_message, toggle_message_tag, update_message_flags,
};
use crate::marketplace::list_marketplace;
use crate::notify::send_notification;
use crate::quotes::{
    accept_quote, incoming_orders, incoming_quote_requests, incoming_quote_stats, my_orders,
    my_quote_requests, reject_quote_request, respond_to_quote_request, submit_quote_request,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/marketplace", get(list_marketplace))
        // Directory
        .route("/api/v1/businesses", post(register_business))
        .route("/api/v1/businesses/mine", get(my_businesses))
        .route("/api/v1/businesses/{id}", get(business_detail).patch(update_business))
        .route("/api/v1/businesses/{id}/products", post(add_product))
        .route("/api/v1/businesses/{id}/reviews", post(add_review))
        .route("/api/v1/products/{id}", patch(set_product_availability))
        // Quotes and orders
        .route("/api/v1/quote-requests", post(submit_quote_request))
        .route("/api/v1/quote-requests/mine", get(my_quote_requests))
        .route("/api/v1/quote-requests/incoming", get(incoming_quote_requests))
        .route("/api/v1/quote-requests/incoming/stats", get(incoming_quote_stats))
        .route("/api/v1/quote-requests/{id}/responses", post(respond_to_quote_request))
        .route("/api/v1/quote-requests/{id}/reject", post(reject_quote_request))
        .route("/api/v1/quote-requests/{id}/accept", post(accept_quote))
        .route("/api/v1/orders/mine", get(my_orders))
        .route("/api/v1/orders/incoming", get(incoming_orders))
        // Inbox
        .route("/api/v1/messages", post(submit_message).get(list_messages))
        .route("/api/v1/messages/stats", get(message_stats))
        .route("/api/v1/messages/{id}", patch(update_message_flags))
        .route("/api/v1/messages/{id}/tags/{tag}", post(toggle_message_tag))
        .route("/api/v1/messages/{id}/replies", post(reply_to_message))
        .route(
            "/api/v1/notification-settings",
            get(get_notification_settings).put(save_notification_settings),
        )
        .route("/api/v1/changes", get(stream_changes))
        .route("/functions/v1/send-notification", post(send_notification))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

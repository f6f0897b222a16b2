use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use connecthub_core::domain::message::{
    Message, MessageFlags, MessageId, MessageReply, MessageTag, NewContactMessage,
};
use connecthub_core::domain::notification::{
    NotificationKind, NotificationSettings, NotificationSettingsUpdate,
};
use connecthub_core::errors::DomainError;
use connecthub_core::inbox::{InboxStats, MessageFilter, StatusFilter};
use connecthub_db::repositories::{
    BusinessRepository, MessageRepository, NotificationSettingsRepository,
};

use crate::auth::{Caller, RequestContext};
use crate::changes::{ChangeNotice, ChangeTable};
use crate::error::{ApiError, ApiResultExt};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct InboxParams {
    pub q: Option<String>,
    pub status: Option<String>,
    pub tag: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub since: Option<String>,
}

impl InboxParams {
    fn into_filter(self) -> Result<MessageFilter, DomainError> {
        let status = match self.status.as_deref() {
            Some(raw) => raw.parse::<StatusFilter>()?,
            None => StatusFilter::All,
        };
        let tag = self
            .tag
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(str::parse::<MessageTag>)
            .transpose()?;
        let since = self
            .since
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                    DomainError::Validation(format!("`since` must be YYYY-MM-DD, got `{raw}`"))
                })
            })
            .transpose()?;

        Ok(MessageFilter { search: self.q, status, tag, since })
    }
}

#[derive(Debug, Deserialize)]
pub struct NewReply {
    pub reply_text: String,
}

/// `POST /api/v1/messages`. Anonymous; the storefront's owner receives the message.
pub async fn submit_message(
    State(state): State<AppState>,
    context: RequestContext,
    Json(submission): Json<NewContactMessage>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let cid = context.correlation_id.as_str();
    let owner = match &submission.business_id {
        Some(business_id) => state
            .businesses
            .find_by_id(business_id)
            .await
            .or_api(cid)?
            .ok_or_else(|| ApiError::not_found("business", business_id.as_str(), cid))?
            .owner_id,
        None => None,
    };

    let message = submission.into_message(owner, Utc::now()).or_api(cid)?;
    state.messages.insert(message.clone()).await.or_api(cid)?;
    state.changes.publish(ChangeNotice::inserted(ChangeTable::Messages, &message.id));

    info!(
        event_name = "inbox.message.received",
        correlation_id = %cid,
        message_id = %message.id,
        routed = message.owner_id.is_some(),
        "contact message stored"
    );

    state.notifier.acknowledge(NotificationKind::NewMessage, &message, cid).await;
    Ok((StatusCode::CREATED, Json(message)))
}

/// `GET /api/v1/messages?q=&status=&tag=&since=`
pub async fn list_messages(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<InboxParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let filter = params.into_filter().or_api(cid)?;
    let messages = state.messages.list_for_owner(&caller.user_id).await.or_api(cid)?;
    Ok(Json(filter.apply(messages)))
}

/// `GET /api/v1/messages/stats`
pub async fn message_stats(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<InboxStats>, ApiError> {
    let messages =
        state.messages.list_for_owner(&caller.user_id).await.or_api(&caller.correlation_id)?;
    Ok(Json(InboxStats::from_messages(&messages)))
}

/// `PATCH /api/v1/messages/{id}`
pub async fn update_message_flags(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(flags): Json<MessageFlags>,
) -> Result<Json<Message>, ApiError> {
    let cid = caller.correlation_id.as_str();
    if flags.is_empty() {
        return Err(ApiError::bad_request(
            "set at least one of is_read, is_starred, is_archived",
            cid,
        ));
    }

    let message =
        state.messages.update_flags(&caller.user_id, &MessageId(id), flags).await.or_api(cid)?;
    state.changes.publish(ChangeNotice::updated(ChangeTable::Messages, &message.id));
    Ok(Json(message))
}

/// `POST /api/v1/messages/{id}/tags/{tag}`
pub async fn toggle_message_tag(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, tag)): Path<(String, String)>,
) -> Result<Json<Message>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let tag = tag.parse::<MessageTag>().or_api(cid)?;

    let message =
        state.messages.toggle_tag(&caller.user_id, &MessageId(id), tag).await.or_api(cid)?;
    state.changes.publish(ChangeNotice::updated(ChangeTable::Messages, &message.id));

    info!(
        event_name = "inbox.message.tag_toggled",
        correlation_id = %cid,
        message_id = %message.id,
        tag = %tag,
        tagged = message.has_tag(tag),
        "message tag toggled"
    );
    Ok(Json(message))
}

/// `POST /api/v1/messages/{id}/replies`. Notifies the sender when the owner's
/// `reply_notify` setting is on.
pub async fn reply_to_message(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(reply): Json<NewReply>,
) -> Result<(StatusCode, Json<MessageReply>), ApiError> {
    let cid = caller.correlation_id.as_str();

    let (message, reply) = state
        .messages
        .add_reply(&caller.user_id, &MessageId(id), &reply.reply_text)
        .await
        .or_api(cid)?;
    state.changes.publish(ChangeNotice::updated(ChangeTable::Messages, &message.id));

    info!(
        event_name = "inbox.message.replied",
        correlation_id = %cid,
        message_id = %message.id,
        reply_id = %reply.id,
        "reply stored"
    );

    // The reply is already committed; a settings lookup failure only skips the acknowledgement.
    match state.notification_settings.get(&caller.user_id).await {
        Ok(settings) if settings.reply_notify => {
            state.notifier.acknowledge(NotificationKind::ReplySent, &message, cid).await;
        }
        Ok(_) => {}
        Err(error) => warn!(
            event_name = "notification.settings_unavailable",
            correlation_id = %cid,
            message_id = %message.id,
            error = %error,
            "reply acknowledgement skipped"
        ),
    }
    Ok((StatusCode::CREATED, Json(reply)))
}

/// `GET /api/v1/notification-settings`
pub async fn get_notification_settings(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<NotificationSettings>, ApiError> {
    let settings =
        state.notification_settings.get(&caller.user_id).await.or_api(&caller.correlation_id)?;
    Ok(Json(settings))
}

/// `PUT /api/v1/notification-settings`
pub async fn save_notification_settings(
    State(state): State<AppState>,
    caller: Caller,
    Json(update): Json<NotificationSettingsUpdate>,
) -> Result<Json<NotificationSettings>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let mut settings = state.notification_settings.get(&caller.user_id).await.or_api(cid)?;
    update.apply(&mut settings, Utc::now());
    state.notification_settings.save(settings.clone()).await.or_api(cid)?;

    info!(
        event_name = "inbox.settings.saved",
        correlation_id = %cid,
        user_id = %caller.user_id,
        reply_notify = settings.reply_notify,
        "notification settings saved"
    );
    Ok(Json(settings))
}

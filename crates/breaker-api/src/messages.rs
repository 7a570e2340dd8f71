use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use breaker_types::api::{Claims, SendTransmissionRequest, TransmissionResponse};
use breaker_types::events::GatewayEvent;
use breaker_types::models::{CALLSIGN_PLACEHOLDER, ChannelKind, DeviceKind, Transmission};

use crate::auth::AppState;
use crate::error::ApiError;

const MAX_BODY_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` timestamp of the
    /// oldest message from the previous page to fetch older messages.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Persist a transmission and fan it out to the channel's subscribers.
///
/// The id comes from the client and is stable across retries: a duplicate
/// send is acknowledged without re-inserting or re-publishing. The store
/// does not trust the sending client about device capability: a
/// receive-only kind is rejected here even though the client UI already
/// prevents it.
pub async fn send_transmission(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendTransmissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.body.trim().is_empty() {
        return Err(ApiError::bad_request("empty_body", "transmission body is empty"));
    }
    if req.body.chars().count() > MAX_BODY_CHARS {
        return Err(ApiError::bad_request(
            "body_too_long",
            format!("transmission body exceeds {MAX_BODY_CHARS} characters"),
        ));
    }
    if req.device == Some(DeviceKind::Receiver) {
        return Err(ApiError::forbidden(
            "sender_cannot_transmit",
            "a receive-only device cannot originate transmissions",
        ));
    }

    // Run blocking DB work off the async runtime
    let db = state.db.clone();
    let sender_id = claims.sub;
    let req_for_insert = req.clone();
    let (inserted, callsign) = tokio::task::spawn_blocking(move || {
        let channel = db
            .get_channel(&channel_id.to_string())
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::not_found("channel_not_found", "no such channel"))?
            .into_channel()
            .map_err(ApiError::internal)?;

        if !channel.is_active {
            return Err(ApiError::forbidden("channel_inactive", "channel is inactive"));
        }
        if req_for_insert.category.is_some() && channel.kind != ChannelKind::Official {
            return Err(ApiError::bad_request(
                "category_not_allowed",
                "categories are only valid on official broadcast channels",
            ));
        }

        if !db
            .is_subscribed(&sender_id.to_string(), &channel_id.to_string())
            .map_err(ApiError::internal)?
        {
            return Err(ApiError::forbidden(
                "not_subscribed",
                "sender is not a member of this channel",
            ));
        }

        let callsign = db
            .get_user_by_id(&sender_id.to_string())
            .map_err(ApiError::internal)?
            .and_then(|u| u.callsign)
            .unwrap_or_else(|| CALLSIGN_PLACEHOLDER.to_string());

        let inserted = db
            .insert_message(
                &req_for_insert.id.to_string(),
                &channel_id.to_string(),
                &sender_id.to_string(),
                &callsign,
                &req_for_insert.body,
                req_for_insert.location.map(|l| (l.lat, l.lon)),
                req_for_insert.device.map(|d| d.as_str()),
                req_for_insert.category.as_deref(),
            )
            .map_err(ApiError::internal)?;

        Ok::<_, ApiError>((inserted, callsign))
    })
    .await
    .map_err(ApiError::internal)??;

    let now = chrono::Utc::now();

    // Publish to the fan-out stream. A retried send that hit the duplicate
    // path is not re-published; at-least-once delivery plus client-side
    // de-dup already covers the first attempt's fan-out.
    if inserted {
        state.dispatcher.broadcast(GatewayEvent::TransmissionCreate {
            id: req.id,
            channel_id,
            sender_id: Some(claims.sub),
            callsign: callsign.clone(),
            body: req.body.clone(),
            location: req.location,
            device: req.device,
            category: req.category.clone(),
            timestamp: now,
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(TransmissionResponse {
            id: req.id,
            channel_id,
            sender_id: Some(claims.sub),
            callsign,
            body: req.body,
            location: req.location,
            device: req.device,
            category: req.category,
            created_at: now,
        }),
    ))
}

/// Channel history, oldest-to-newest, for members only.
pub async fn get_transmissions(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub;
    let limit = query.limit.min(200);
    let before = query.before;

    let rows = tokio::task::spawn_blocking(move || {
        if !db
            .is_subscribed(&user_id.to_string(), &channel_id.to_string())
            .map_err(ApiError::internal)?
        {
            return Err(ApiError::forbidden(
                "not_subscribed",
                "history is only visible to channel members",
            ));
        }
        db.get_messages(&channel_id.to_string(), limit, before.as_deref())
            .map_err(ApiError::internal)
    })
    .await
    .map_err(ApiError::internal)??;

    // Rows come newest-first from the store; the UI wants oldest-to-newest.
    let mut transmissions: Vec<TransmissionResponse> = rows
        .into_iter()
        .filter_map(|row| match row.into_transmission() {
            Ok(t) => Some(to_response(t)),
            Err(e) => {
                warn!("skipping corrupt message row: {e}");
                None
            }
        })
        .collect();
    transmissions.reverse();

    Ok(Json(transmissions))
}

/// Transmissions are immutable; the only mutation is deletion by the
/// original sender.
pub async fn delete_transmission(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .get_message(&message_id.to_string())
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("message_not_found", "no such transmission"))?;
    let transmission = row.into_transmission().map_err(ApiError::internal)?;

    if transmission.sender_id != Some(claims.sub) {
        return Err(ApiError::forbidden(
            "not_sender",
            "only the original sender can delete a transmission",
        ));
    }

    state
        .db
        .delete_message(&message_id.to_string())
        .map_err(ApiError::internal)?;

    state.dispatcher.broadcast(GatewayEvent::TransmissionDelete {
        channel_id: transmission.channel_id,
        message_id,
    });

    Ok(StatusCode::NO_CONTENT)
}

fn to_response(t: Transmission) -> TransmissionResponse {
    TransmissionResponse {
        id: t.id,
        channel_id: t.channel_id,
        sender_id: t.sender_id,
        callsign: t.callsign,
        body: t.body,
        location: t.location,
        device: t.device,
        category: t.category,
        created_at: t.created_at,
    }
}

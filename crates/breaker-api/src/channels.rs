use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use breaker_types::api::{
    ChannelResponse, Claims, CreateChannelRequest, SetMutedRequest, SubscriptionResponse,
};
use breaker_types::events::GatewayEvent;
use breaker_types::models::{Channel, ChannelKind};

use crate::auth::AppState;
use crate::error::ApiError;

/// Attempts before giving up on a unique code. Collisions are rare outside
/// the walkie band, where the frequency grid is a few thousand values.
const CODE_ATTEMPTS: usize = 5;

pub async fn list_channels(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db.list_channels().map_err(ApiError::internal)?;

    let channels: Vec<ChannelResponse> = rows
        .into_iter()
        .filter_map(|row| match row.into_channel() {
            Ok(c) => Some(to_response(c)),
            Err(e) => {
                warn!("skipping corrupt channel row: {e}");
                None
            }
        })
        .collect();

    Ok(Json(channels))
}

pub async fn my_subscriptions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .db
        .subscriptions_for_user(&claims.sub.to_string())
        .map_err(ApiError::internal)?;

    let subs: Vec<SubscriptionResponse> = rows
        .into_iter()
        .filter_map(|row| match row.into_subscription() {
            Ok(s) => Some(SubscriptionResponse {
                channel_id: s.channel_id,
                muted: s.muted,
                joined_at: s.joined_at,
            }),
            Err(e) => {
                warn!("skipping corrupt subscription row: {e}");
                None
            }
        })
        .collect();

    Ok(Json(subs))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.kind == ChannelKind::Official {
        return Err(ApiError::forbidden(
            "official_channel",
            "official channels are system-seeded and cannot be created",
        ));
    }

    let name = req.name.trim();
    if name.is_empty() || name.len() > 48 {
        return Err(ApiError::bad_request(
            "invalid_name",
            "channel name must be 1-48 characters",
        ));
    }

    let channel_id = Uuid::new_v4();

    // Creator is subscribed in the same transaction as the insert, so the
    // channel is never owned-but-not-joined. Retry on code collision.
    let mut created = false;
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code(req.kind, &mut rand::rng());
        if state
            .db
            .create_channel(
                &channel_id.to_string(),
                &claims.sub.to_string(),
                req.kind.as_str(),
                &code,
                name,
                req.description.as_deref(),
                req.anchor.map(|a| (a.lat, a.lon)),
            )
            .map_err(ApiError::internal)?
        {
            created = true;
            break;
        }
    }
    if !created {
        return Err(ApiError::internal("channel code space exhausted"));
    }

    let row = state
        .db
        .get_channel(&channel_id.to_string())
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::internal("created channel vanished"))?;
    let channel = row.into_channel().map_err(ApiError::internal)?;

    info!(
        "{} created {} channel '{}' ({})",
        claims.username,
        channel.kind.as_str(),
        channel.name,
        channel.code
    );

    Ok((StatusCode::CREATED, Json(to_response(channel))))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = load_channel(&state, channel_id)?;

    if channel.kind == ChannelKind::Official {
        return Err(ApiError::forbidden(
            "official_channel",
            "official channels cannot be deleted",
        ));
    }
    if channel.creator_id != Some(claims.sub) {
        return Err(ApiError::forbidden(
            "not_creator",
            "only the channel creator can delete it",
        ));
    }

    state
        .db
        .delete_channel(&channel_id.to_string())
        .map_err(ApiError::internal)?;

    state
        .dispatcher
        .broadcast(GatewayEvent::ChannelDelete { channel_id });

    info!("{} deleted channel {}", claims.username, channel_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deactivate_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = load_channel(&state, channel_id)?;

    if channel.kind == ChannelKind::Official {
        return Err(ApiError::forbidden(
            "official_channel",
            "official channels cannot be deactivated",
        ));
    }
    if channel.creator_id != Some(claims.sub) {
        return Err(ApiError::forbidden(
            "not_creator",
            "only the channel creator can deactivate it",
        ));
    }

    state
        .db
        .deactivate_channel(&channel_id.to_string())
        .map_err(ApiError::internal)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Idempotent: joining a channel twice reports the membership unchanged.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    load_channel(&state, channel_id)?;

    let joined = state
        .db
        .subscribe(&claims.sub.to_string(), &channel_id.to_string())
        .map_err(ApiError::internal)?;

    Ok(Json(serde_json::json!({ "joined": joined })))
}

/// Idempotent: leaving a channel you are not in is a no-op.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    load_channel(&state, channel_id)?;

    let left = state
        .db
        .unsubscribe(&claims.sub.to_string(), &channel_id.to_string())
        .map_err(ApiError::internal)?;

    Ok(Json(serde_json::json!({ "left": left })))
}

pub async fn set_muted(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetMutedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .db
        .set_muted(&claims.sub.to_string(), &channel_id.to_string(), req.muted)
        .map_err(ApiError::internal)?;

    if !updated {
        return Err(ApiError::not_found(
            "not_subscribed",
            "no subscription to this channel",
        ));
    }

    Ok(Json(serde_json::json!({ "muted": req.muted })))
}

fn load_channel(state: &AppState, channel_id: Uuid) -> Result<Channel, ApiError> {
    state
        .db
        .get_channel(&channel_id.to_string())
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("channel_not_found", "no such channel"))?
        .into_channel()
        .map_err(ApiError::internal)
}

fn to_response(c: Channel) -> ChannelResponse {
    ChannelResponse {
        id: c.id,
        creator_id: c.creator_id,
        kind: c.kind,
        code: c.code,
        name: c.name,
        description: c.description,
        is_active: c.is_active,
        member_count: c.member_count,
        anchor: c.anchor,
        created_at: c.created_at,
    }
}

/// Join codes are kind-specific: the walkie band uses frequency-style
/// strings on a 12.5 kHz grid, the rest get short unambiguous tokens
/// (no 0/O/1/I/L).
fn generate_code(kind: ChannelKind, rng: &mut impl Rng) -> String {
    match kind {
        ChannelKind::Official => format!("SYS-{:03}", rng.random_range(0..1000)),
        ChannelKind::Public => token(rng, 6),
        ChannelKind::Walkie => {
            let step: u32 = rng.random_range(0..5600);
            format!("{:.4}", 400.0 + f64::from(step) * 0.0125)
        }
        ChannelKind::Camp => format!("CAMP-{}", token(rng, 4)),
        ChannelKind::Satellite => format!("SAT-{:03}", rng.random_range(0..1000)),
    }
}

fn token(rng: &mut impl Rng, len: usize) -> String {
    // No 0/O/1/I/L — these are read out loud over voice chat.
    const CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walkie_codes_sit_on_the_frequency_grid() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            let code = generate_code(ChannelKind::Walkie, &mut rng);
            let freq: f64 = code.parse().expect("frequency-style code");
            assert!((400.0..470.0).contains(&freq), "{code}");
            // 12.5 kHz grid
            let steps = (freq - 400.0) / 0.0125;
            assert!((steps - steps.round()).abs() < 1e-6, "{code}");
        }
    }

    #[test]
    fn token_codes_have_expected_shape() {
        let mut rng = rand::rng();
        assert_eq!(generate_code(ChannelKind::Public, &mut rng).len(), 6);
        assert!(generate_code(ChannelKind::Camp, &mut rng).starts_with("CAMP-"));
        assert!(generate_code(ChannelKind::Satellite, &mut rng).starts_with("SAT-"));
    }
}

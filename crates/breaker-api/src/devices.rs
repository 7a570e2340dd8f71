use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::warn;

use breaker_progression::{SwitchError, UnlockError, UnlockOutcome};
use breaker_radio::device;
use breaker_types::api::{Claims, DeviceStateResponse, UnlockResponse};
use breaker_types::models::DeviceKind;

use crate::auth::AppState;
use crate::error::ApiError;

/// Registry metadata joined with this user's unlock/current state.
pub async fn list_devices(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let progression = state.progression.clone();
    let user_id = claims.sub;

    let states = tokio::task::spawn_blocking(move || progression.device_states(user_id))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;

    let devices: Vec<DeviceStateResponse> = DeviceKind::ALL
        .iter()
        .map(|&kind| {
            let row = states.iter().find(|s| s.kind == kind);
            if row.is_none() {
                warn!("device state row missing for {}", kind.as_str());
            }
            DeviceStateResponse {
                kind,
                display_name: device::display_name(kind).to_string(),
                range_km: device::range_km(kind),
                can_send: device::can_send(kind),
                is_unlocked: row.is_some_and(|s| s.is_unlocked),
                is_current: row.is_some_and(|s| s.is_current),
            }
        })
        .collect();

    Ok(Json(devices))
}

pub async fn unlock_device(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let progression = state.progression.clone();
    let user_id = claims.sub;

    let outcome = tokio::task::spawn_blocking(move || progression.attempt_unlock(user_id, kind))
        .await
        .map_err(ApiError::internal)?
        .map_err(unlock_error)?;

    Ok(Json(UnlockResponse {
        newly_unlocked: outcome == UnlockOutcome::Unlocked,
        kind,
    }))
}

pub async fn switch_device(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let progression = state.progression.clone();
    let user_id = claims.sub;

    tokio::task::spawn_blocking(move || progression.switch_current(user_id, kind))
        .await
        .map_err(ApiError::internal)?
        .map_err(|e| match e {
            SwitchError::NotUnlocked(kind) => ApiError::conflict(
                "not_unlocked",
                format!("{} is not unlocked", kind.as_str()),
            ),
            SwitchError::Store(e) => ApiError::internal(e),
        })?;

    Ok(Json(serde_json::json!({ "current": kind })))
}

fn parse_kind(s: &str) -> Result<DeviceKind, ApiError> {
    DeviceKind::from_str(s)
        .ok_or_else(|| ApiError::bad_request("unknown_device_kind", format!("unknown kind '{s}'")))
}

/// Insufficiency failures carry every shortfall so the UI can show an
/// actionable message in one round trip.
fn unlock_error(e: UnlockError) -> ApiError {
    match e {
        UnlockError::MissingPrerequisite(kind) => ApiError::conflict(
            "missing_prerequisite",
            format!("requires {} to be unlocked first", kind.as_str()),
        ),
        UnlockError::InsufficientTerritories { have, need } => ApiError::conflict(
            "insufficient_territories",
            format!("requires {need} owned territories, have {have}"),
        ),
        UnlockError::InsufficientResources(shortfalls) => {
            let detail = shortfalls
                .iter()
                .map(|s| format!("{}: have {}, need {}", s.resource, s.have, s.need))
                .collect::<Vec<_>>()
                .join("; ");
            ApiError::conflict("insufficient_resources", detail)
        }
        UnlockError::Store(e) => ApiError::internal(e),
    }
}

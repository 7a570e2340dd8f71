use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChannelKind, Coordinate, DeviceKind};

// -- JWT Claims --

/// JWT claims shared across breaker-api (REST middleware) and breaker-gateway
/// (WebSocket authentication). Canonical definition lives here in
/// breaker-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Errors --

/// JSON error body returned by every failing endpoint. `error` is a stable
/// machine-readable code; `detail` is human-readable context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub callsign: Option<String>,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetCallsignRequest {
    pub callsign: String,
}

// -- Channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub kind: ChannelKind,
    pub name: String,
    pub description: Option<String>,
    pub anchor: Option<Coordinate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub id: Uuid,
    pub creator_id: Option<Uuid>,
    pub kind: ChannelKind,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub member_count: i64,
    pub anchor: Option<Coordinate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub channel_id: Uuid,
    pub muted: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetMutedRequest {
    pub muted: bool,
}

// -- Transmissions --

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SendTransmissionRequest {
    /// Client-generated message id. Stable across retries so the store and
    /// receiving clients can de-duplicate.
    pub id: Uuid,
    pub body: String,
    pub location: Option<Coordinate>,
    pub device: Option<DeviceKind>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionResponse {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub callsign: String,
    pub body: String,
    pub location: Option<Coordinate>,
    pub device: Option<DeviceKind>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Devices --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStateResponse {
    pub kind: DeviceKind,
    pub display_name: String,
    pub range_km: Option<f64>,
    pub can_send: bool,
    pub is_unlocked: bool,
    pub is_current: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockResponse {
    /// False when the kind was already unlocked (idempotent no-op).
    pub newly_unlocked: bool,
    pub kind: DeviceKind,
}

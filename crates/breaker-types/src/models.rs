use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display name shown on transmissions when the sender never set a callsign.
pub const CALLSIGN_PLACEHOLDER: &str = "UNREGISTERED";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub callsign: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Closed set of channel kinds. The wire codes double as the DB column values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// System-seeded broadcast channel. Cannot be created or deleted by users.
    Official,
    Public,
    /// Short-range walkie band, identified by a frequency-style code.
    Walkie,
    Camp,
    Satellite,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        ChannelKind::Official,
        ChannelKind::Public,
        ChannelKind::Walkie,
        ChannelKind::Camp,
        ChannelKind::Satellite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Official => "official",
            ChannelKind::Public => "public",
            ChannelKind::Walkie => "walkie",
            ChannelKind::Camp => "camp",
            ChannelKind::Satellite => "satellite",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "official" => Some(ChannelKind::Official),
            "public" => Some(ChannelKind::Public),
            "walkie" => Some(ChannelKind::Walkie),
            "camp" => Some(ChannelKind::Camp),
            "satellite" => Some(ChannelKind::Satellite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    /// None for system-seeded official channels.
    pub creator_id: Option<Uuid>,
    pub kind: ChannelKind,
    /// Human-readable join code, format depends on `kind`.
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    /// Advisory UI hint only. Never consulted for access control.
    pub member_count: i64,
    pub anchor: Option<Coordinate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: Uuid,
    pub channel_id: Uuid,
    pub muted: bool,
    pub joined_at: DateTime<Utc>,
}

/// Closed set of communication device kinds.
///
/// `Receiver` is the receive-only broadcast radio: unlimited receive range,
/// cannot originate transmissions. The other three form the upgrade chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Receiver,
    Handheld,
    BaseStation,
    Relay,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 4] = [
        DeviceKind::Receiver,
        DeviceKind::Handheld,
        DeviceKind::BaseStation,
        DeviceKind::Relay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Receiver => "receiver",
            DeviceKind::Handheld => "handheld",
            DeviceKind::BaseStation => "base_station",
            DeviceKind::Relay => "relay",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receiver" => Some(DeviceKind::Receiver),
            "handheld" => Some(DeviceKind::Handheld),
            "base_station" => Some(DeviceKind::BaseStation),
            "relay" => Some(DeviceKind::Relay),
            _ => None,
        }
    }
}

/// A persisted text transmission. Immutable once stored; delete only,
/// by the original sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transmission {
    pub id: Uuid,
    pub channel_id: Uuid,
    /// None if the sender account was later removed.
    pub sender_id: Option<Uuid>,
    /// Snapshot of the sender's callsign at send time.
    pub callsign: String,
    pub body: String,
    /// Sender position at send time, if location was available.
    pub location: Option<Coordinate>,
    /// Device the sender transmitted on. Absent on legacy rows.
    pub device: Option<DeviceKind>,
    /// Broadcast category, official channels only.
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-user unlock state for one device kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub kind: DeviceKind,
    pub is_unlocked: bool,
    pub is_current: bool,
}

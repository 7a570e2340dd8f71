//! Database row types — these map directly to SQLite rows.
//! Distinct from breaker-types API models to keep the DB layer independent.

use anyhow::{Result, anyhow};
use breaker_types::models::{
    Channel, ChannelKind, Coordinate, DeviceKind, DeviceState, Subscription, Transmission,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub callsign: Option<String>,
    pub created_at: String,
}

pub struct ChannelRow {
    pub id: String,
    pub creator_id: Option<String>,
    pub kind: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub member_count: i64,
    pub anchor_lat: Option<f64>,
    pub anchor_lon: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct SubscriptionRow {
    pub user_id: String,
    pub channel_id: String,
    pub muted: bool,
    pub joined_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub sender_id: Option<String>,
    pub callsign: String,
    pub body: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub device: Option<String>,
    pub category: Option<String>,
    pub created_at: String,
}

pub struct DeviceRow {
    pub user_id: String,
    pub kind: String,
    pub is_unlocked: bool,
    pub is_current: bool,
}

/// Parse a timestamp column. SQLite's datetime('now') writes
/// `YYYY-MM-DD HH:MM:SS` without a timezone; rows written by chrono carry
/// full RFC 3339.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| anyhow!("bad timestamp '{}': {}", s, e))
}

fn coordinate(lat: Option<f64>, lon: Option<f64>) -> Option<Coordinate> {
    match (lat, lon) {
        (Some(lat), Some(lon)) => Some(Coordinate { lat, lon }),
        _ => None,
    }
}

impl ChannelRow {
    pub fn into_channel(self) -> Result<Channel> {
        Ok(Channel {
            id: self.id.parse::<Uuid>()?,
            creator_id: self.creator_id.map(|s| s.parse::<Uuid>()).transpose()?,
            kind: ChannelKind::from_str(&self.kind)
                .ok_or_else(|| anyhow!("unknown channel kind '{}'", self.kind))?,
            code: self.code,
            name: self.name,
            description: self.description,
            is_active: self.is_active,
            member_count: self.member_count,
            anchor: coordinate(self.anchor_lat, self.anchor_lon),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl SubscriptionRow {
    pub fn into_subscription(self) -> Result<Subscription> {
        Ok(Subscription {
            user_id: self.user_id.parse::<Uuid>()?,
            channel_id: self.channel_id.parse::<Uuid>()?,
            muted: self.muted,
            joined_at: parse_timestamp(&self.joined_at)?,
        })
    }
}

impl MessageRow {
    pub fn into_transmission(self) -> Result<Transmission> {
        Ok(Transmission {
            id: self.id.parse::<Uuid>()?,
            channel_id: self.channel_id.parse::<Uuid>()?,
            sender_id: self.sender_id.map(|s| s.parse::<Uuid>()).transpose()?,
            callsign: self.callsign,
            body: self.body,
            location: coordinate(self.lat, self.lon),
            // An unrecognized tag from a newer build degrades to untagged
            // rather than failing the whole page.
            device: self.device.as_deref().and_then(DeviceKind::from_str),
            category: self.category,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl DeviceRow {
    pub fn into_state(self) -> Result<DeviceState> {
        Ok(DeviceState {
            kind: DeviceKind::from_str(&self.kind)
                .ok_or_else(|| anyhow!("unknown device kind '{}'", self.kind))?,
            is_unlocked: self.is_unlocked,
            is_current: self.is_current,
        })
    }
}

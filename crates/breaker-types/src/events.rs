use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Coordinate, DeviceKind};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new transmission was posted to a channel
    TransmissionCreate {
        id: Uuid,
        channel_id: Uuid,
        sender_id: Option<Uuid>,
        callsign: String,
        body: String,
        location: Option<Coordinate>,
        device: Option<DeviceKind>,
        category: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A transmission was deleted by its sender
    TransmissionDelete { channel_id: Uuid, message_id: Uuid },

    /// A channel was deactivated or deleted by its creator
    ChannelDelete { channel_id: Uuid },
}

impl GatewayEvent {
    /// Returns the channel_id if this event is scoped to a specific channel.
    /// Events that return `None` are global and delivered to all clients.
    pub fn channel_id(&self) -> Option<Uuid> {
        match self {
            Self::TransmissionCreate { channel_id, .. } => Some(*channel_id),
            Self::TransmissionDelete { channel_id, .. } => Some(*channel_id),
            Self::ChannelDelete { channel_id } => Some(*channel_id),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to events for specific channels.
    /// Replaces the full set; the server only forwards channel-scoped
    /// events for channels in the most recent set.
    Subscribe { channel_ids: Vec<Uuid> },
}

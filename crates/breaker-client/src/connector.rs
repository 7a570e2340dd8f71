//! Production transport: WebSocket gateway for the live stream, REST for
//! history pages. Dropping the `GatewayHandle` (both halves) unwinds the
//! pump tasks and closes the socket.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;
use uuid::Uuid;

use breaker_types::api::TransmissionResponse;
use breaker_types::events::{GatewayCommand, GatewayEvent};
use breaker_types::models::Transmission;

use crate::session::{GatewayHandle, Transport};

pub struct HttpTransport {
    /// REST base, e.g. `http://host:3000`.
    http_base: String,
    /// Gateway endpoint, e.g. `ws://host:3000/gateway`.
    gateway_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(http_base: impl Into<String>, gateway_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http_base: http_base.into(),
            gateway_url: gateway_url.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Transport for HttpTransport {
    async fn connect(&self) -> anyhow::Result<GatewayHandle> {
        let (ws, _) = connect_async(&self.gateway_url).await?;
        let (mut ws_write, mut ws_read) = ws.split();

        // Identify first; the server answers with Ready before any events.
        let identify = GatewayCommand::Identify {
            token: self.token.clone(),
        };
        ws_write
            .send(Message::Text(serde_json::to_string(&identify)?.into()))
            .await?;

        let (event_tx, events) = mpsc::unbounded_channel();
        let (commands, mut cmd_rx) = mpsc::unbounded_channel::<GatewayCommand>();
        // Single writer over the socket: commands and pong replies funnel
        // through one channel.
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Message>();

        let cmd_write_tx = write_tx.clone();
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match serde_json::to_string(&cmd) {
                    Ok(json) => {
                        if cmd_write_tx.send(Message::Text(json.into())).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("failed to serialize gateway command: {e}"),
                }
            }
        });

        tokio::spawn(async move {
            while let Some(msg) = write_rx.recv().await {
                if ws_write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_read.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<GatewayEvent>(&text) {
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("unrecognized gateway event: {e}"),
                    },
                    Message::Ping(payload) => {
                        let _ = write_tx.send(Message::Pong(payload));
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        Ok(GatewayHandle { events, commands })
    }

    async fn fetch_recent(
        &self,
        channel_id: Uuid,
        limit: u32,
    ) -> anyhow::Result<Vec<Transmission>> {
        let url = format!(
            "{}/channels/{}/messages?limit={}",
            self.http_base, channel_id, limit
        );
        let page: Vec<TransmissionResponse> = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(page
            .into_iter()
            .map(|t| Transmission {
                id: t.id,
                channel_id: t.channel_id,
                sender_id: t.sender_id,
                callsign: t.callsign,
                body: t.body,
                location: t.location,
                device: t.device,
                category: t.category,
                created_at: t.created_at,
            })
            .collect())
    }
}

//! Client subscription multiplexer.
//!
//! One live event stream covers the union of all joined channels, instead
//! of one connection per channel. The first joined channel opens the
//! stream; leaving the last closes it promptly. Inbound events are
//! processed one at a time in arrival order by a single pump task, so each
//! channel's local history has a single writer.
//!
//! Every event is re-checked against current membership before the
//! proximity filter: under network reordering an event for a channel can
//! arrive after the user left it, and must be dropped.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use breaker_radio::filter;
use breaker_types::events::{GatewayCommand, GatewayEvent};
use breaker_types::models::Transmission;

use crate::providers::{DeviceProvider, LocationProvider};

/// How much history to pull when joining (or re-joining) a channel.
const HISTORY_FETCH_LIMIT: u32 = 50;

/// A live event stream plus its command sender. Dropping the handle (or the
/// session closing it) tears the stream down.
pub struct GatewayHandle {
    pub events: mpsc::UnboundedReceiver<GatewayEvent>,
    pub commands: mpsc::UnboundedSender<GatewayCommand>,
}

/// Server connection seam. The production implementation speaks WebSocket +
/// REST (`crate::connector`); tests drive the session through an in-memory
/// one.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = anyhow::Result<GatewayHandle>> + Send;
    /// Recent channel history, oldest-to-newest.
    fn fetch_recent(
        &self,
        channel_id: Uuid,
        limit: u32,
    ) -> impl Future<Output = anyhow::Result<Vec<Transmission>>> + Send;
}

#[derive(Default)]
struct SessionState {
    subscribed: HashSet<Uuid>,
    /// Per-channel local history, oldest-to-newest.
    histories: HashMap<Uuid, Vec<Transmission>>,
}

struct Pump {
    commands: mpsc::UnboundedSender<GatewayCommand>,
    task: JoinHandle<()>,
}

pub struct ClientSession<T: Transport> {
    transport: Arc<T>,
    location: Arc<dyn LocationProvider>,
    device: Arc<dyn DeviceProvider>,
    state: Arc<Mutex<SessionState>>,
    pump: Option<Pump>,
}

impl<T: Transport> ClientSession<T> {
    pub fn new(
        transport: Arc<T>,
        location: Arc<dyn LocationProvider>,
        device: Arc<dyn DeviceProvider>,
    ) -> Self {
        Self {
            transport,
            location,
            device,
            state: Arc::new(Mutex::new(SessionState::default())),
            pump: None,
        }
    }

    /// Join a channel: extend the stream's channel set (opening the stream
    /// if this is the first channel) and pull recent history. After a full
    /// close and re-join the stream is fresh, so history is always
    /// re-fetched rather than assumed continuous.
    pub async fn add_channel(&mut self, channel_id: Uuid) -> anyhow::Result<()> {
        let (newly_joined, first) = {
            let mut st = self.state.lock().expect("session state poisoned");
            let newly_joined = st.subscribed.insert(channel_id);
            if newly_joined {
                st.histories.entry(channel_id).or_default();
            }
            (newly_joined, newly_joined && st.subscribed.len() == 1)
        };

        if first {
            if let Err(e) = self.open_stream().await {
                // Leave state consistent for a retry: the join did not
                // happen.
                let mut st = self.state.lock().expect("session state poisoned");
                st.subscribed.remove(&channel_id);
                st.histories.remove(&channel_id);
                return Err(e);
            }
        }
        if newly_joined {
            self.send_subscribe();
        }
        // Joining an already-joined channel still refreshes history below,
        // so a caller that failed partway through can simply call again.

        let recent = self
            .transport
            .fetch_recent(channel_id, HISTORY_FETCH_LIMIT)
            .await?;
        {
            let mut st = self.state.lock().expect("session state poisoned");
            // The channel may already have gone again while we fetched.
            if st.subscribed.contains(&channel_id) {
                let history = st.histories.entry(channel_id).or_default();
                for t in recent {
                    if !history.iter().any(|h| h.id == t.id) {
                        history.push(t);
                    }
                }
                history.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            }
        }

        Ok(())
    }

    /// Leave a channel: shrink the stream's channel set and drop the local
    /// cached history (server-side history is retained). Leaving the last
    /// channel closes the stream.
    pub fn remove_channel(&mut self, channel_id: Uuid) {
        let (removed, empty) = {
            let mut st = self.state.lock().expect("session state poisoned");
            let removed = st.subscribed.remove(&channel_id);
            st.histories.remove(&channel_id);
            (removed, st.subscribed.is_empty())
        };
        if !removed {
            return;
        }

        if empty {
            self.close_stream();
        } else {
            self.send_subscribe();
        }
    }

    /// Local history for a joined channel, oldest-to-newest.
    pub fn history(&self, channel_id: Uuid) -> Vec<Transmission> {
        self.state
            .lock()
            .expect("session state poisoned")
            .histories
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn subscribed_channels(&self) -> HashSet<Uuid> {
        self.state
            .lock()
            .expect("session state poisoned")
            .subscribed
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.pump.is_some()
    }

    async fn open_stream(&mut self) -> anyhow::Result<()> {
        let handle = self.transport.connect().await?;
        let mut events = handle.events;

        let state = self.state.clone();
        let location = self.location.clone();
        let device = self.device.clone();
        let task = tokio::spawn(async move {
            // Single writer: events are applied one at a time, in arrival
            // order.
            while let Some(event) = events.recv().await {
                apply_event(&state, location.as_ref(), device.as_ref(), event);
            }
            debug!("gateway stream ended");
        });

        self.pump = Some(Pump {
            commands: handle.commands,
            task,
        });
        info!("gateway stream opened");
        Ok(())
    }

    fn close_stream(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.task.abort();
            info!("gateway stream closed");
        }
    }

    fn send_subscribe(&self) {
        let channel_ids: Vec<Uuid> = {
            let st = self.state.lock().expect("session state poisoned");
            st.subscribed.iter().copied().collect()
        };
        if let Some(pump) = &self.pump {
            if pump
                .commands
                .send(GatewayCommand::Subscribe { channel_ids })
                .is_err()
            {
                warn!("gateway command channel closed");
            }
        }
    }
}

impl<T: Transport> Drop for ClientSession<T> {
    fn drop(&mut self) {
        self.close_stream();
    }
}

fn apply_event(
    state: &Mutex<SessionState>,
    location: &dyn LocationProvider,
    device: &dyn DeviceProvider,
    event: GatewayEvent,
) {
    match event {
        GatewayEvent::TransmissionCreate {
            id,
            channel_id,
            sender_id,
            callsign,
            body,
            location: sender_location,
            device: sender_device,
            category,
            timestamp,
        } => {
            // Membership first: a stale event for a channel we since left
            // is dropped even though the server forwarded it.
            {
                let st = state.lock().expect("session state poisoned");
                if !st.subscribed.contains(&channel_id) {
                    return;
                }
            }

            // Local device/location are polled now, at evaluation time.
            if !filter::should_admit(
                sender_device,
                sender_location,
                device.current_device(),
                location.current_location(),
            ) {
                return;
            }

            let mut st = state.lock().expect("session state poisoned");
            if !st.subscribed.contains(&channel_id) {
                return;
            }
            let history = st.histories.entry(channel_id).or_default();
            // At-least-once delivery: a message already present must not be
            // re-appended.
            if history.iter().any(|t| t.id == id) {
                return;
            }
            history.push(Transmission {
                id,
                channel_id,
                sender_id,
                callsign,
                body,
                location: sender_location,
                device: sender_device,
                category,
                created_at: timestamp,
            });
        }

        GatewayEvent::TransmissionDelete {
            channel_id,
            message_id,
        } => {
            let mut st = state.lock().expect("session state poisoned");
            if let Some(history) = st.histories.get_mut(&channel_id) {
                history.retain(|t| t.id != message_id);
            }
        }

        GatewayEvent::ChannelDelete { channel_id } => {
            let mut st = state.lock().expect("session state poisoned");
            st.subscribed.remove(&channel_id);
            st.histories.remove(&channel_id);
        }

        GatewayEvent::Ready { username, .. } => {
            debug!("gateway ready as {username}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breaker_types::models::{Coordinate, DeviceKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MemTransport {
        /// Sender for pushing events into the most recent stream.
        event_tx: Mutex<Option<mpsc::UnboundedSender<GatewayEvent>>>,
        /// Commands the session sent over the stream.
        sent_commands: Arc<Mutex<Vec<GatewayCommand>>>,
        /// Server-side history served by fetch_recent.
        server_history: Mutex<HashMap<Uuid, Vec<Transmission>>>,
        connects: AtomicUsize,
    }

    impl MemTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                event_tx: Mutex::new(None),
                sent_commands: Arc::new(Mutex::new(Vec::new())),
                server_history: Mutex::new(HashMap::new()),
                connects: AtomicUsize::new(0),
            })
        }

        fn push(&self, event: GatewayEvent) {
            let tx = self.event_tx.lock().unwrap();
            tx.as_ref().expect("no open stream").send(event).unwrap();
        }
    }

    impl Transport for MemTransport {
        async fn connect(&self) -> anyhow::Result<GatewayHandle> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let (event_tx, events) = mpsc::unbounded_channel();
            let (commands, mut cmd_rx) = mpsc::unbounded_channel();
            *self.event_tx.lock().unwrap() = Some(event_tx);

            let recorded = self.sent_commands.clone();
            tokio::spawn(async move {
                while let Some(cmd) = cmd_rx.recv().await {
                    recorded.lock().unwrap().push(cmd);
                }
            });
            Ok(GatewayHandle { events, commands })
        }

        async fn fetch_recent(
            &self,
            channel_id: Uuid,
            _limit: u32,
        ) -> anyhow::Result<Vec<Transmission>> {
            Ok(self
                .server_history
                .lock()
                .unwrap()
                .get(&channel_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    struct FixedLocation(Option<Coordinate>);
    impl LocationProvider for FixedLocation {
        fn current_location(&self) -> Option<Coordinate> {
            self.0
        }
    }

    struct FixedDevice(Option<DeviceKind>);
    impl DeviceProvider for FixedDevice {
        fn current_device(&self) -> Option<DeviceKind> {
            self.0
        }
    }

    fn transmission_event(channel_id: Uuid, body: &str) -> (Uuid, GatewayEvent) {
        let id = Uuid::new_v4();
        let event = GatewayEvent::TransmissionCreate {
            id,
            channel_id,
            sender_id: Some(Uuid::new_v4()),
            callsign: "KILO-9".into(),
            body: body.into(),
            location: None,
            device: Some(DeviceKind::Handheld),
            category: None,
            timestamp: chrono::Utc::now(),
        };
        (id, event)
    }

    fn session(
        transport: Arc<MemTransport>,
        device: Option<DeviceKind>,
        location: Option<Coordinate>,
    ) -> ClientSession<MemTransport> {
        ClientSession::new(
            transport,
            Arc::new(FixedLocation(location)),
            Arc::new(FixedDevice(device)),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn first_join_opens_stream_and_events_land_in_history() {
        let transport = MemTransport::new();
        let mut session = session(transport.clone(), Some(DeviceKind::Receiver), None);
        let channel = Uuid::new_v4();

        session.add_channel(channel).await.unwrap();
        assert!(session.is_connected());
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);

        let (_, event) = transmission_event(channel, "anyone copy?");
        transport.push(event);
        settle().await;

        let history = session.history(channel);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].body, "anyone copy?");
    }

    #[tokio::test]
    async fn second_join_reuses_the_stream() {
        let transport = MemTransport::new();
        let mut session = session(transport.clone(), Some(DeviceKind::Receiver), None);

        session.add_channel(Uuid::new_v4()).await.unwrap();
        session.add_channel(Uuid::new_v4()).await.unwrap();

        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribe_command_carries_the_full_union() {
        let transport = MemTransport::new();
        let mut session = session(transport.clone(), Some(DeviceKind::Receiver), None);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        session.add_channel(a).await.unwrap();
        session.add_channel(b).await.unwrap();
        settle().await;

        let cmds = transport.sent_commands.lock().unwrap();
        match cmds.last().expect("subscribe sent") {
            GatewayCommand::Subscribe { channel_ids } => {
                assert_eq!(channel_ids.len(), 2);
                assert!(channel_ids.contains(&a));
                assert!(channel_ids.contains(&b));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn events_for_unjoined_channels_are_dropped() {
        let transport = MemTransport::new();
        let mut session = session(transport.clone(), Some(DeviceKind::Receiver), None);
        let joined = Uuid::new_v4();
        let other = Uuid::new_v4();

        session.add_channel(joined).await.unwrap();

        // Reordered event for a channel this client never joined (or
        // already left): must not surface anywhere.
        let (_, event) = transmission_event(other, "stale");
        transport.push(event);
        settle().await;

        assert!(session.history(other).is_empty());
        assert!(session.history(joined).is_empty());
    }

    #[tokio::test]
    async fn duplicate_delivery_is_appended_once() {
        let transport = MemTransport::new();
        let mut session = session(transport.clone(), Some(DeviceKind::Receiver), None);
        let channel = Uuid::new_v4();
        session.add_channel(channel).await.unwrap();

        let (_, event) = transmission_event(channel, "once");
        transport.push(event.clone());
        transport.push(event);
        settle().await;

        assert_eq!(session.history(channel).len(), 1);
    }

    #[tokio::test]
    async fn leaving_purges_local_history_and_last_leave_closes_stream() {
        let transport = MemTransport::new();
        let mut session = session(transport.clone(), Some(DeviceKind::Receiver), None);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        session.add_channel(a).await.unwrap();
        session.add_channel(b).await.unwrap();

        let (_, event) = transmission_event(a, "kept server-side only");
        transport.push(event);
        settle().await;
        assert_eq!(session.history(a).len(), 1);

        session.remove_channel(a);
        assert!(session.history(a).is_empty());
        assert!(session.is_connected());

        session.remove_channel(b);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn rejoin_after_full_close_reconnects_and_refetches_history() {
        let transport = MemTransport::new();
        let channel = Uuid::new_v4();

        // Server already has history for this channel.
        let (id, _) = transmission_event(channel, "from before");
        transport.server_history.lock().unwrap().insert(
            channel,
            vec![Transmission {
                id,
                channel_id: channel,
                sender_id: None,
                callsign: "ECHO-2".into(),
                body: "from before".into(),
                location: None,
                device: None,
                category: None,
                created_at: chrono::Utc::now(),
            }],
        );

        let mut session = session(transport.clone(), Some(DeviceKind::Receiver), None);
        session.add_channel(channel).await.unwrap();
        assert_eq!(session.history(channel).len(), 1);

        session.remove_channel(channel);
        assert!(!session.is_connected());

        session.add_channel(channel).await.unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
        let history = session.history(channel);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].body, "from before");
    }

    #[tokio::test]
    async fn proximity_filter_gates_admission() {
        let transport = MemTransport::new();
        let here = Coordinate::new(52.52, 13.405);
        // ~3.1 km north: outside handheld-to-handheld range.
        let out_of_range = Coordinate::new(52.52 + 3.1 / 111.195, 13.405);
        let mut session = session(
            transport.clone(),
            Some(DeviceKind::Handheld),
            Some(here),
        );
        let channel = Uuid::new_v4();
        session.add_channel(channel).await.unwrap();

        let denied = GatewayEvent::TransmissionCreate {
            id: Uuid::new_v4(),
            channel_id: channel,
            sender_id: Some(Uuid::new_v4()),
            callsign: "TANGO-5".into(),
            body: "too far".into(),
            location: Some(out_of_range),
            device: Some(DeviceKind::Handheld),
            category: None,
            timestamp: chrono::Utc::now(),
        };
        transport.push(denied);

        // Same distance, but the sender runs a base station: admitted.
        let admitted = GatewayEvent::TransmissionCreate {
            id: Uuid::new_v4(),
            channel_id: channel,
            sender_id: Some(Uuid::new_v4()),
            callsign: "TANGO-5".into(),
            body: "stronger rig".into(),
            location: Some(out_of_range),
            device: Some(DeviceKind::BaseStation),
            category: None,
            timestamp: chrono::Utc::now(),
        };
        transport.push(admitted);
        settle().await;

        let history = session.history(channel);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].body, "stronger rig");
    }

    #[tokio::test]
    async fn deleted_transmissions_leave_history() {
        let transport = MemTransport::new();
        let mut session = session(transport.clone(), Some(DeviceKind::Receiver), None);
        let channel = Uuid::new_v4();
        session.add_channel(channel).await.unwrap();

        let (id, event) = transmission_event(channel, "going away");
        transport.push(event);
        settle().await;
        assert_eq!(session.history(channel).len(), 1);

        transport.push(GatewayEvent::TransmissionDelete {
            channel_id: channel,
            message_id: id,
        });
        settle().await;
        assert!(session.history(channel).is_empty());
    }
}

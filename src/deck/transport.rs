//! Controller host transport: one duplex connection with automatic reconnection.
//!
//! [`TransportClient`] owns the connection loop. It dials the host, sends the
//! registration frame, forwards every inbound text frame to the router and
//! writes outbound frames queued through an [`Outbox`]. When the link closes or
//! a dial fails it waits for the reconnect delay and starts over with the same
//! parameters, forever, until the session is cancelled.
//!
//! Writes are never queued across connections: each live link gets a fresh
//! outbound channel, and while no link is open [`Outbox::send`] reports
//! [`Delivery::DroppedNoConnection`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::protocol::{OutboundCommand, registration_frame};
use crate::config::ReconnectConfig;
use crate::error::{PluginError, Result};

// ---------------------------------------------------------------------------
// Link abstraction
// ---------------------------------------------------------------------------

/// Write half of a live link.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;
}

/// Read half of a live link. `None` means the peer closed the link.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_text(&mut self) -> Option<Result<String>>;
}

/// A freshly dialed duplex link.
pub struct Link {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Opens links to the controller host.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, endpoint: &str) -> Result<Link>;
}

/// Production dialer: a plain WebSocket to the host's loopback port.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketDialer;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct WsSink(futures_util::stream::SplitSink<WsStream, tokio_tungstenite::tungstenite::Message>);

struct WsSource(futures_util::stream::SplitStream<WsStream>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        use futures_util::SinkExt;
        use tokio_tungstenite::tungstenite::Message;

        self.0
            .send(Message::Text(text))
            .await
            .map_err(|e| PluginError::Transport(format!("send: {e}")))
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_text(&mut self) -> Option<Result<String>> {
        use futures_util::StreamExt;
        use tokio_tungstenite::tungstenite::Message;

        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => {} // Binary, Ping/Pong frames handled by tungstenite.
                Err(e) => return Some(Err(PluginError::Transport(format!("read: {e}")))),
            }
        }
    }
}

#[async_trait]
impl Dialer for WebSocketDialer {
    async fn dial(&self, endpoint: &str) -> Result<Link> {
        use futures_util::StreamExt;

        let url = url::Url::parse(endpoint)
            .map_err(|e| PluginError::Transport(format!("invalid endpoint {endpoint}: {e}")))?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| PluginError::Transport(format!("connect: {e}")))?;
        let (write, read) = ws_stream.split();
        Ok(Link {
            sink: Box::new(WsSink(write)),
            source: Box::new(WsSource(read)),
        })
    }
}

// ---------------------------------------------------------------------------
// Connection parameters and policy
// ---------------------------------------------------------------------------

/// Everything needed to (re)establish the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub endpoint: String,
    pub plugin_uuid: String,
    pub register_event: String,
}

/// Fixed-delay reconnect policy with optional uniform jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next dial.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let extra_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(extra_ms)
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Connection status of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Dialing for the first time.
    Connecting,
    /// Registered with the host.
    Connected,
    /// Waiting to redial after a loss.
    Reconnecting {
        /// Consecutive failed or lost connections so far.
        attempt: u32,
    },
    /// Stopped; no further dials.
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting { attempt } => write!(f, "Reconnecting (attempt {attempt})"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Result of a best-effort write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the live link.
    Sent,
    /// No link was open; the frame was discarded.
    DroppedNoConnection,
}

impl Delivery {
    #[must_use]
    pub fn is_sent(self) -> bool {
        self == Self::Sent
    }
}

struct SharedState {
    status: ConnectionStatus,
    /// Outbound channel of the live link, if any.
    current: Option<mpsc::UnboundedSender<String>>,
}

/// Cloneable write handle onto whatever link is currently open.
#[derive(Clone)]
pub struct Outbox {
    shared: Arc<Mutex<SharedState>>,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("status", &self.status())
            .finish()
    }
}

impl Outbox {
    /// An outbox with no link attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(SharedState {
                status: ConnectionStatus::Connecting,
                current: None,
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SharedState> {
        match self.shared.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        }
    }

    /// Route writes into a fresh channel, replacing any previous one.
    ///
    /// Frames written to a replaced channel are lost with it.
    pub fn attach(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().current = Some(tx);
        rx
    }

    /// Stop routing writes; subsequent sends are dropped.
    pub fn detach(&self) {
        self.state().current = None;
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.state().status.clone()
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.state().status = status;
    }

    /// Write a raw text frame.
    pub fn send_text(&self, text: String) -> Delivery {
        let state = self.state();
        match &state.current {
            Some(tx) if tx.send(text).is_ok() => Delivery::Sent,
            _ => Delivery::DroppedNoConnection,
        }
    }

    /// Encode and write a command.
    pub fn send(&self, command: &OutboundCommand) -> Delivery {
        let delivery = self.send_text(command.to_json().to_string());
        if !delivery.is_sent() {
            tracing::debug!(
                event = command.event_name(),
                "no host connection; dropping outbound frame"
            );
        }
        delivery
    }
}

// ---------------------------------------------------------------------------
// TransportClient
// ---------------------------------------------------------------------------

/// Handle to the background connection loop.
pub struct TransportClient {
    outbox: Outbox,
    task: JoinHandle<()>,
}

impl TransportClient {
    /// Spawn the connection loop.
    ///
    /// Inbound text frames are pushed to `inbound_tx`. The loop ends when
    /// `cancel` fires or the inbound receiver is dropped.
    pub fn spawn(
        params: ConnectParams,
        policy: ReconnectPolicy,
        dialer: Arc<dyn Dialer>,
        inbound_tx: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Self {
        let outbox = Outbox::new();
        let loop_outbox = outbox.clone();
        let task = tokio::spawn(async move {
            connection_loop(params, policy, dialer, loop_outbox, inbound_tx, cancel).await;
        });
        Self { outbox, task }
    }

    #[must_use]
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.outbox.status()
    }

    /// Wait for the loop to finish (after cancellation).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "transport task ended abnormally");
        }
    }
}

/// How a single connection ended.
enum LinkEnd {
    DialFailed(PluginError),
    Closed,
    Failed(PluginError),
    /// The router went away; stop reconnecting.
    RouterGone,
}

async fn connection_loop(
    params: ConnectParams,
    policy: ReconnectPolicy,
    dialer: Arc<dyn Dialer>,
    outbox: Outbox,
    inbound_tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        outbox.set_status(if attempt == 0 {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Reconnecting { attempt }
        });

        let end = tokio::select! {
            _ = cancel.cancelled() => break,
            end = run_link(&params, dialer.as_ref(), &outbox, &inbound_tx) => end,
        };
        outbox.detach();

        match end {
            LinkEnd::DialFailed(e) => {
                tracing::warn!(endpoint = %params.endpoint, attempt, "host connection failed: {e}");
            }
            LinkEnd::Closed => {
                attempt = 0;
                tracing::info!("host connection closed");
            }
            LinkEnd::Failed(e) => {
                attempt = 0;
                tracing::warn!("host connection lost: {e}");
            }
            LinkEnd::RouterGone => {
                tracing::debug!("inbound receiver dropped; stopping transport");
                break;
            }
        }

        attempt = attempt.saturating_add(1);
        outbox.set_status(ConnectionStatus::Reconnecting { attempt });

        let delay = policy.next_delay();
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting to host");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    outbox.detach();
    outbox.set_status(ConnectionStatus::Disconnected);
}

/// Dial, register and pump frames until the link ends.
async fn run_link(
    params: &ConnectParams,
    dialer: &dyn Dialer,
    outbox: &Outbox,
    inbound_tx: &mpsc::UnboundedSender<String>,
) -> LinkEnd {
    let Link {
        mut sink,
        mut source,
    } = match dialer.dial(&params.endpoint).await {
        Ok(link) => link,
        Err(e) => return LinkEnd::DialFailed(e),
    };

    let register = registration_frame(&params.register_event, &params.plugin_uuid);
    if let Err(e) = sink.send_text(register).await {
        return LinkEnd::Failed(e);
    }

    let mut outbound_rx = outbox.attach();
    outbox.set_status(ConnectionStatus::Connected);
    tracing::info!(endpoint = %params.endpoint, "registered with host");

    loop {
        tokio::select! {
            frame = source.next_text() => match frame {
                Some(Ok(text)) => {
                    if inbound_tx.send(text).is_err() {
                        return LinkEnd::RouterGone;
                    }
                }
                Some(Err(e)) => return LinkEnd::Failed(e),
                None => return LinkEnd::Closed,
            },
            Some(text) = outbound_rx.recv() => {
                if let Err(e) = sink.send_text(text).await {
                    return LinkEnd::Failed(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::{Value, json};
    use tokio::time::Instant;

    /// Host side of an in-memory link.
    struct HostEnd {
        at: Instant,
        endpoint: String,
        from_plugin: mpsc::UnboundedReceiver<String>,
        to_plugin: mpsc::UnboundedSender<String>,
    }

    struct ChanSink(mpsc::UnboundedSender<String>);
    struct ChanSource(mpsc::UnboundedReceiver<String>);

    #[async_trait]
    impl FrameSink for ChanSink {
        async fn send_text(&mut self, text: String) -> Result<()> {
            self.0
                .send(text)
                .map_err(|_| PluginError::Transport("peer gone".into()))
        }
    }

    #[async_trait]
    impl FrameSource for ChanSource {
        async fn next_text(&mut self) -> Option<Result<String>> {
            self.0.recv().await.map(Ok)
        }
    }

    /// Dialer that fails the first `failures` dials, then hands each link's
    /// host end to the test.
    struct ChannelDialer {
        failures: Mutex<u32>,
        dials: mpsc::UnboundedSender<HostEnd>,
        attempts: mpsc::UnboundedSender<Instant>,
    }

    #[async_trait]
    impl Dialer for ChannelDialer {
        async fn dial(&self, endpoint: &str) -> Result<Link> {
            let _ = self.attempts.send(Instant::now());
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(PluginError::Transport("connection refused".into()));
                }
            }
            let (plugin_tx, from_plugin) = mpsc::unbounded_channel();
            let (to_plugin, plugin_rx) = mpsc::unbounded_channel();
            let _ = self.dials.send(HostEnd {
                at: Instant::now(),
                endpoint: endpoint.to_owned(),
                from_plugin,
                to_plugin,
            });
            Ok(Link {
                sink: Box::new(ChanSink(plugin_tx)),
                source: Box::new(ChanSource(plugin_rx)),
            })
        }
    }

    struct Harness {
        client: TransportClient,
        dials: mpsc::UnboundedReceiver<HostEnd>,
        attempts: mpsc::UnboundedReceiver<Instant>,
        inbound: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
    }

    fn params() -> ConnectParams {
        ConnectParams {
            endpoint: "ws://127.0.0.1:28196".into(),
            plugin_uuid: "PLUGIN-1".into(),
            register_event: "registerPlugin".into(),
        }
    }

    fn start(failures: u32, policy: ReconnectPolicy) -> Harness {
        let (dials_tx, dials) = mpsc::unbounded_channel();
        let (attempts_tx, attempts) = mpsc::unbounded_channel();
        let dialer = Arc::new(ChannelDialer {
            failures: Mutex::new(failures),
            dials: dials_tx,
            attempts: attempts_tx,
        });
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let client = TransportClient::spawn(params(), policy, dialer, inbound_tx, cancel.clone());
        Harness {
            client,
            dials,
            attempts,
            inbound,
            cancel,
        }
    }

    fn parse(frame: &str) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn registers_then_forwards_frames_both_ways() {
        let mut h = start(0, ReconnectPolicy::default());
        let mut host = h.dials.recv().await.unwrap();

        let register = host.from_plugin.recv().await.unwrap();
        assert_eq!(
            parse(&register),
            json!({"event": "registerPlugin", "uuid": "PLUGIN-1"})
        );

        let frame = r#"{"event":"keyDown","context":"c"}"#;
        host.to_plugin.send(frame.to_owned()).unwrap();
        assert_eq!(h.inbound.recv().await.unwrap(), frame);

        let delivery = h.client.outbox().send(&OutboundCommand::ShowOk {
            context: "c".into(),
        });
        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(
            parse(&host.from_plugin.recv().await.unwrap()),
            json!({"event": "showOk", "context": "c"})
        );
        assert_eq!(h.client.status(), ConnectionStatus::Connected);

        h.cancel.cancel();
        h.client.join().await;
    }

    #[tokio::test]
    async fn writes_without_a_link_are_dropped() {
        let outbox = Outbox::new();
        let delivery = outbox.send(&OutboundCommand::ShowAlert {
            context: "c".into(),
        });
        assert_eq!(delivery, Delivery::DroppedNoConnection);

        let mut rx = outbox.attach();
        assert!(outbox.send_text("x".into()).is_sent());
        assert_eq!(rx.recv().await.as_deref(), Some("x"));

        outbox.detach();
        assert_eq!(outbox.send_text("y".into()), Delivery::DroppedNoConnection);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_exactly_at_the_fixed_delay() {
        let mut h = start(0, ReconnectPolicy::default());

        let mut first = h.dials.recv().await.unwrap();
        let _ = first.from_plugin.recv().await.unwrap();
        let first_at = first.at;
        // Host closes the link.
        drop(first);

        // Silence just short of the delay: no new dial.
        let early = tokio::time::timeout(Duration::from_millis(4_999), h.dials.recv()).await;
        assert!(early.is_err(), "redialed before the reconnect delay");
        assert_eq!(
            h.client.status(),
            ConnectionStatus::Reconnecting { attempt: 1 }
        );
        assert_eq!(
            h.client.outbox().send(&OutboundCommand::ShowOk {
                context: "c".into()
            }),
            Delivery::DroppedNoConnection
        );

        let mut second = h.dials.recv().await.unwrap();
        assert_eq!(second.at - first_at, Duration::from_secs(5));
        assert_eq!(second.endpoint, "ws://127.0.0.1:28196");
        assert_eq!(
            parse(&second.from_plugin.recv().await.unwrap()),
            json!({"event": "registerPlugin", "uuid": "PLUGIN-1"})
        );

        // Exactly one dial happened at the delay.
        let mut dial_count = 0;
        while h.attempts.try_recv().is_ok() {
            dial_count += 1;
        }
        assert_eq!(dial_count, 2);

        h.cancel.cancel();
        h.client.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_dials_retry_without_bound() {
        let mut h = start(3, ReconnectPolicy::default());
        let begin = Instant::now();

        let host = h.dials.recv().await.unwrap();
        assert_eq!(host.at - begin, Duration::from_secs(15));

        let mut attempts = Vec::new();
        while let Ok(at) = h.attempts.try_recv() {
            attempts.push(at - begin);
        }
        assert_eq!(
            attempts,
            vec![
                Duration::ZERO,
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(15),
            ]
        );

        h.cancel.cancel();
        h.client.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_the_loop() {
        let mut h = start(u32::MAX, ReconnectPolicy::default());
        let _ = h.attempts.recv().await.unwrap();

        h.cancel.cancel();
        let outbox = h.client.outbox();
        h.client.join().await;
        assert_eq!(outbox.status(), ConnectionStatus::Disconnected);
        assert!(h.attempts.try_recv().is_err());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = ReconnectPolicy {
            delay: Duration::from_millis(1_000),
            jitter: Duration::from_millis(200),
        };
        for _ in 0..100 {
            let delay = policy.next_delay();
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay <= Duration::from_millis(1_200));
        }
    }

    #[test]
    fn zero_jitter_is_the_fixed_delay() {
        let policy = ReconnectPolicy::from(&ReconnectConfig {
            delay_ms: 250,
            jitter_ms: 0,
        });
        assert_eq!(policy.next_delay(), Duration::from_millis(250));
    }
}

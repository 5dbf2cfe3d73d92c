use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use tandem_types::events::{ClientCommand, ServerEvent};
use tandem_types::models::{FileDescriptor, MessageType};

use crate::error::ClientError;
use crate::events::{ChatEvent, EventBus, Subscription};
use crate::transport::{Connector, Transport};

/// Keepalive ping interval while connected. Purely to stop intermediary
/// proxies from idling the connection out; the pong is observational.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Quiet period after which the client emits typing-stop on its own.
const DEFAULT_TYPING_QUIET_PERIOD: Duration = Duration::from_millis(2000);

/// Largest file descriptor the client will attach to a message.
const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

/// Upper bound on the random jitter added to each reconnect delay.
const JITTER_MAX_MS: u64 = 250;

/// Timeout for the graceful shutdown before the loop task is aborted.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Bounded reconnect schedule: capped exponential delays, a hard attempt
/// cap, and randomized jitter so a crowd of clients does not stampede the
/// server in lockstep after an outage.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(8);
        let exp = self.base_delay.saturating_mul(1u32 << shift);
        let jitter = rand::rng().random_range(0..=JITTER_MAX_MS);
        exp.min(self.max_delay) + Duration::from_millis(jitter)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Token presented in `authenticate`; issued by the external auth
    /// service. Re-sent on every reconnect.
    pub token: String,
    pub heartbeat_interval: Duration,
    pub typing_quiet_period: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            typing_quiet_period: DEFAULT_TYPING_QUIET_PERIOD,
            reconnect: ReconnectPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn with_typing_quiet_period(mut self, period: Duration) -> Self {
        self.typing_quiet_period = period;
        self
    }

    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

struct ClientState {
    connected: AtomicBool,
    ready: AtomicBool,
    /// Non-zero once the reconnect cap was exceeded. Terminal.
    exhausted_attempts: AtomicU32,
}

impl ClientState {
    fn new() -> Self {
        Self {
            // Optimistic: commands queued during the initial connect are
            // flushed once the transport is up.
            connected: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            exhausted_attempts: AtomicU32::new(0),
        }
    }
}

/// Handle to the connection manager.
///
/// Owns exactly one background connection loop for its whole lifetime, so a
/// second live transport for the same handle is impossible by construction.
/// All command methods queue a message and return once it is accepted — no
/// round-trip await.
pub struct ChatClient {
    cmd_tx: mpsc::UnboundedSender<ClientCommand>,
    state: Arc<ClientState>,
    bus: EventBus,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ChatClient {
    /// Start the connection loop and return a handle plus an initial event
    /// subscription. The loop connects, sends `authenticate`, and keeps the
    /// session alive (heartbeats, reconnects) until shutdown or the
    /// reconnect cap.
    #[must_use = "the subscription must be consumed to observe events"]
    pub fn start<C: Connector>(connector: C, config: ClientConfig) -> (Self, Subscription) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let bus = EventBus::new();
        let subscription = bus.subscribe();
        let state = Arc::new(ClientState::new());

        let task = tokio::spawn(connection_loop(
            connector,
            config,
            cmd_rx,
            bus.clone(),
            Arc::clone(&state),
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            bus,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        };
        (client, subscription)
    }

    /// Register an additional independent subscriber.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Whether the server has confirmed the current session's identity.
    pub fn is_ready(&self) -> bool {
        self.state.ready.load(Ordering::Acquire)
    }

    pub fn join_room(&self, room_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientCommand::JoinRoom {
            room_id: room_id.into(),
        })
    }

    pub fn leave_room(&self, room_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientCommand::LeaveRoom {
            room_id: room_id.into(),
        })
    }

    /// Send a text message. Empty bodies are rejected here, before any
    /// event is emitted.
    pub fn send_text(
        &self,
        room_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), ClientError> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(ClientError::InvalidMessage("empty message body".into()));
        }
        self.send(ClientCommand::SendMessage {
            room_id: room_id.into(),
            body,
            message_type: MessageType::Text,
            file: None,
        })
    }

    /// Send a file message. The file must already be uploaded; only its
    /// descriptor travels through the gateway.
    pub fn send_file(
        &self,
        room_id: impl Into<String>,
        body: impl Into<String>,
        file: FileDescriptor,
    ) -> Result<(), ClientError> {
        if file.size > MAX_FILE_SIZE {
            return Err(ClientError::InvalidMessage(format!(
                "file too large: {} bytes (limit {})",
                file.size, MAX_FILE_SIZE
            )));
        }
        self.send(ClientCommand::SendMessage {
            room_id: room_id.into(),
            body: body.into(),
            message_type: MessageType::File,
            file: Some(file),
        })
    }

    /// Announce typing. The loop re-arms the quiet period on every call and
    /// emits the stop on its own if no further input arrives.
    pub fn start_typing(&self, room_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientCommand::TypingStart {
            room_id: room_id.into(),
        })
    }

    pub fn stop_typing(&self, room_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientCommand::TypingStop {
            room_id: room_id.into(),
        })
    }

    pub fn mark_read(&self, room_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientCommand::MarkRead {
            room_id: room_id.into(),
        })
    }

    pub fn ping(&self) -> Result<(), ClientError> {
        self.send(ClientCommand::Ping)
    }

    /// Client-initiated disconnect: closes the transport and stops the loop.
    /// Never auto-reconnects afterwards.
    pub async fn shutdown(&mut self) {
        debug!("ChatClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
        self.state.ready.store(false, Ordering::Release);
    }

    fn send(&self, cmd: ClientCommand) -> Result<(), ClientError> {
        let attempts = self.state.exhausted_attempts.load(Ordering::Acquire);
        if attempts > 0 {
            return Err(ClientError::ReconnectExhausted { attempts });
        }
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(ClientError::NotConnected);
        }
        self.cmd_tx.send(cmd).map_err(|_| ClientError::NotConnected)
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("connected", &self.is_connected())
            .field("ready", &self.is_ready())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        // Drop is synchronous, so the only safe action is aborting the loop
        // task; the graceful path needs an executor to drive transport.close.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection loop ─────────────────────────────────────────────────

enum SessionEnd {
    /// Client-initiated: shutdown signal or handle dropped.
    Manual,
    /// Server-initiated or transport failure; reconnect applies.
    Remote(Option<String>),
}

/// Outer loop: connect, run a session, and on remote disconnect retry with
/// bounded jittered backoff. Identity is re-announced on every successful
/// (re)connect because room membership and presence are server-side session
/// state that does not survive a transport drop.
async fn connection_loop<C: Connector>(
    connector: C,
    config: ClientConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientCommand>,
    bus: EventBus,
    state: Arc<ClientState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut attempt: u32 = 0;

    loop {
        match connector.connect().await {
            Ok(mut transport) => {
                let auth = ClientCommand::Authenticate {
                    token: config.token.clone(),
                };
                match send_command(&mut transport, &auth).await {
                    Ok(()) => {
                        state.connected.store(true, Ordering::Release);
                        bus.publish(ChatEvent::Connected { attempt });

                        let end = session(
                            &mut transport,
                            &config,
                            &mut cmd_rx,
                            &bus,
                            &state,
                            &mut shutdown_rx,
                        )
                        .await;

                        state.connected.store(false, Ordering::Release);
                        state.ready.store(false, Ordering::Release);

                        match end {
                            SessionEnd::Manual => {
                                let _ = transport.close().await;
                                bus.publish(ChatEvent::Disconnected {
                                    reason: Some("client shut down".into()),
                                });
                                return;
                            }
                            SessionEnd::Remote(reason) => {
                                debug!("session ended: {:?}", reason);
                                bus.publish(ChatEvent::Disconnected { reason });
                                // A completed session resets the backoff budget
                                attempt = 0;
                            }
                        }
                    }
                    Err(e) => warn!("authenticate send failed: {e}"),
                }
            }
            Err(e) => warn!("connect attempt failed: {e}"),
        }

        attempt += 1;
        if attempt > config.reconnect.max_attempts {
            state.connected.store(false, Ordering::Release);
            state.ready.store(false, Ordering::Release);
            state
                .exhausted_attempts
                .store(config.reconnect.max_attempts, Ordering::Release);
            error!(
                "giving up after {} reconnect attempts",
                config.reconnect.max_attempts
            );
            bus.publish(ChatEvent::ConnectionFailed {
                attempts: config.reconnect.max_attempts,
            });
            return;
        }

        let delay = config.reconnect.delay_for(attempt);
        debug!("reconnecting in {:?} (attempt {})", delay, attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => {
                state.connected.store(false, Ordering::Release);
                state.ready.store(false, Ordering::Release);
                bus.publish(ChatEvent::Disconnected {
                    reason: Some("client shut down".into()),
                });
                return;
            }
        }
    }
}

/// One connected session: multiplexes outgoing commands, incoming events,
/// the heartbeat, and the typing quiet period.
async fn session<T: Transport>(
    transport: &mut T,
    config: &ClientConfig,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientCommand>,
    bus: &EventBus,
    state: &Arc<ClientState>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.tick().await; // the first tick fires immediately

    // room_id -> deadline for the automatic typing-stop
    let mut typing: HashMap<String, Instant> = HashMap::new();

    loop {
        let typing_deadline = typing.values().min().copied();

        tokio::select! {
            _ = &mut *shutdown_rx => return SessionEnd::Manual,

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { return SessionEnd::Manual };
                track_typing(&mut typing, &cmd, config.typing_quiet_period);
                if let Err(e) = send_command(transport, &cmd).await {
                    return SessionEnd::Remote(Some(format!("send failed: {e}")));
                }
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if matches!(event, ServerEvent::Ready { .. }) {
                                state.ready.store(true, Ordering::Release);
                            }
                            bus.publish(ChatEvent::Event(event));
                        }
                        Err(e) => {
                            warn!("failed to deserialize server event: {e} -- raw: {text}");
                        }
                    },
                    Some(Err(e)) => {
                        return SessionEnd::Remote(Some(format!("transport error: {e}")));
                    }
                    None => return SessionEnd::Remote(None),
                }
            }

            _ = heartbeat.tick() => {
                if let Err(e) = send_command(transport, &ClientCommand::Ping).await {
                    return SessionEnd::Remote(Some(format!("heartbeat failed: {e}")));
                }
            }

            _ = sleep_until_deadline(typing_deadline), if typing_deadline.is_some() => {
                let now = Instant::now();
                let expired: Vec<String> = typing
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(room_id, _)| room_id.clone())
                    .collect();
                for room_id in expired {
                    typing.remove(&room_id);
                    let stop = ClientCommand::TypingStop { room_id };
                    if let Err(e) = send_command(transport, &stop).await {
                        return SessionEnd::Remote(Some(format!("send failed: {e}")));
                    }
                }
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn track_typing(typing: &mut HashMap<String, Instant>, cmd: &ClientCommand, quiet: Duration) {
    match cmd {
        ClientCommand::TypingStart { room_id } => {
            typing.insert(room_id.clone(), Instant::now() + quiet);
        }
        ClientCommand::TypingStop { room_id } => {
            typing.remove(room_id);
        }
        _ => {}
    }
}

async fn send_command<T: Transport>(
    transport: &mut T,
    cmd: &ClientCommand,
) -> Result<(), ClientError> {
    let json = serde_json::to_string(cmd).map_err(|e| ClientError::InvalidMessage(e.to_string()))?;
    transport.send(json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicU32;
    use uuid::Uuid;

    // ── Mock transport / connector ──────────────────────────────────

    struct MockTransport {
        /// Messages `recv()` yields in order; an explicit `None` entry is a
        /// clean server-side close. When the script runs out, recv hangs.
        incoming: VecDeque<Option<Result<String, ClientError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<(), ClientError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, ClientError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), ClientError> {
            Ok(())
        }
    }

    /// Hands out scripted transports, one per connect call. Running out of
    /// scripts makes further connects fail.
    struct MockConnector {
        transports: StdMutex<VecDeque<MockTransport>>,
        connects: Arc<AtomicU32>,
    }

    impl MockConnector {
        fn new(scripts: Vec<Vec<Option<Result<String, ClientError>>>>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicU32>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let transports = scripts
                .into_iter()
                .map(|script| MockTransport {
                    incoming: VecDeque::from(script),
                    sent: Arc::clone(&sent),
                })
                .collect();
            let connects = Arc::new(AtomicU32::new(0));
            (
                Self {
                    transports: StdMutex::new(transports),
                    connects: Arc::clone(&connects),
                },
                sent,
                connects,
            )
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&self) -> Result<MockTransport, ClientError> {
            self.connects.fetch_add(1, Ordering::Relaxed);
            self.transports
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ClientError::Transport("connection refused".into()))
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn ready_json() -> String {
        serde_json::to_string(&ServerEvent::Ready {
            user_id: Uuid::from_u128(1),
            username: "Alice".into(),
        })
        .unwrap()
    }

    fn fast_config() -> ClientConfig {
        ClientConfig::new("jwt-token").with_reconnect_policy(ReconnectPolicy {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            max_attempts: 5,
        })
    }

    fn parse_sent(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientCommand> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }

    async fn expect_event(
        events: &mut Subscription,
        matcher: impl Fn(&ChatEvent) -> bool,
        what: &str,
    ) -> ChatEvent {
        loop {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
                Ok(Some(event)) if matcher(&event) => return event,
                Ok(Some(_)) => continue,
                Ok(None) => panic!("event stream closed waiting for {what}"),
                Err(_) => panic!("timed out waiting for {what}"),
            }
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_connects_and_authenticates() {
        let (connector, sent, _) = MockConnector::new(vec![vec![Some(Ok(ready_json()))]]);
        let (mut client, mut events) = ChatClient::start(connector, fast_config());

        expect_event(&mut events, |e| matches!(e, ChatEvent::Connected { attempt: 0 }), "connected").await;
        expect_event(
            &mut events,
            |e| matches!(e, ChatEvent::Event(ServerEvent::Ready { .. })),
            "ready",
        )
        .await;
        assert!(client.is_ready());

        let commands = parse_sent(&sent);
        match &commands[0] {
            ClientCommand::Authenticate { token } => assert_eq!(token, "jwt-token"),
            other => panic!("expected authenticate first, got {other:?}"),
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn server_disconnect_triggers_reauthenticating_reconnect() {
        // First transport: server confirms, then closes. Second: confirms.
        let (connector, sent, connects) = MockConnector::new(vec![
            vec![Some(Ok(ready_json())), None],
            vec![Some(Ok(ready_json()))],
        ]);
        let (mut client, mut events) = ChatClient::start(connector, fast_config());

        expect_event(&mut events, |e| matches!(e, ChatEvent::Connected { attempt: 0 }), "first connect").await;
        expect_event(&mut events, |e| matches!(e, ChatEvent::Disconnected { .. }), "disconnect").await;
        expect_event(&mut events, |e| matches!(e, ChatEvent::Connected { attempt: 1 }), "reconnect").await;

        assert_eq!(connects.load(Ordering::Relaxed), 2);
        let auth_count = parse_sent(&sent)
            .iter()
            .filter(|cmd| matches!(cmd, ClientCommand::Authenticate { .. }))
            .count();
        assert_eq!(auth_count, 2, "identity must be re-announced after reconnect");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn manual_shutdown_never_reconnects() {
        let (connector, _, connects) = MockConnector::new(vec![
            vec![Some(Ok(ready_json()))],
            vec![Some(Ok(ready_json()))],
        ]);
        let (mut client, mut events) = ChatClient::start(connector, fast_config());

        expect_event(&mut events, |e| matches!(e, ChatEvent::Connected { .. }), "connected").await;
        client.shutdown().await;
        expect_event(
            &mut events,
            |e| matches!(e, ChatEvent::Disconnected { .. }),
            "shutdown disconnect",
        )
        .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connects.load(Ordering::Relaxed), 1);
        assert!(matches!(client.ping(), Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn reconnect_gives_up_at_the_attempt_cap() {
        // No scripted transports at all: every connect fails.
        let (connector, _, connects) = MockConnector::new(vec![]);
        let config = ClientConfig::new("jwt-token").with_reconnect_policy(ReconnectPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_attempts: 3,
        });
        let (_client, mut events) = ChatClient::start(connector, config);

        let event = expect_event(
            &mut events,
            |e| matches!(e, ChatEvent::ConnectionFailed { .. }),
            "connection failed",
        )
        .await;
        match event {
            ChatEvent::ConnectionFailed { attempts } => assert_eq!(attempts, 3),
            _ => unreachable!(),
        }
        // Initial try plus three capped retries
        assert_eq!(connects.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn terminal_failure_reports_disconnected_and_exhausted() {
        let (connector, _, _) = MockConnector::new(vec![]);
        let config = ClientConfig::new("jwt-token").with_reconnect_policy(ReconnectPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_attempts: 3,
        });
        let (client, mut events) = ChatClient::start(connector, config);

        expect_event(
            &mut events,
            |e| matches!(e, ChatEvent::ConnectionFailed { .. }),
            "connection failed",
        )
        .await;

        // The handle must read as disconnected once the loop has given up
        assert!(!client.is_connected());
        assert!(!client.is_ready());
        assert!(matches!(
            client.ping(),
            Err(ClientError::ReconnectExhausted { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn invalid_messages_are_rejected_before_any_event() {
        let (connector, sent, _) = MockConnector::new(vec![vec![Some(Ok(ready_json()))]]);
        let (mut client, mut events) = ChatClient::start(connector, fast_config());
        expect_event(&mut events, |e| matches!(e, ChatEvent::Connected { .. }), "connected").await;

        assert!(matches!(
            client.send_text("P1", "   "),
            Err(ClientError::InvalidMessage(_))
        ));
        assert!(matches!(
            client.send_file(
                "P1",
                "huge",
                FileDescriptor {
                    url: "https://files.example/huge.bin".into(),
                    name: "huge.bin".into(),
                    size: MAX_FILE_SIZE + 1,
                }
            ),
            Err(ClientError::InvalidMessage(_))
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let send_count = parse_sent(&sent)
            .iter()
            .filter(|cmd| matches!(cmd, ClientCommand::SendMessage { .. }))
            .count();
        assert_eq!(send_count, 0);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn typing_stop_is_emitted_after_the_quiet_period() {
        let (connector, sent, _) = MockConnector::new(vec![vec![Some(Ok(ready_json()))]]);
        let config = fast_config().with_typing_quiet_period(Duration::from_millis(30));
        let (mut client, mut events) = ChatClient::start(connector, config);
        expect_event(&mut events, |e| matches!(e, ChatEvent::Connected { .. }), "connected").await;

        client.start_typing("P1").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let commands = parse_sent(&sent);
        let start_pos = commands
            .iter()
            .position(|cmd| matches!(cmd, ClientCommand::TypingStart { .. }))
            .expect("typing-start was sent");
        let stop_pos = commands
            .iter()
            .position(|cmd| {
                matches!(cmd, ClientCommand::TypingStop { room_id } if room_id == "P1")
            })
            .expect("typing-stop was emitted automatically");
        assert!(stop_pos > start_pos);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn heartbeat_pings_keep_flowing() {
        let (connector, sent, _) = MockConnector::new(vec![vec![Some(Ok(ready_json()))]]);
        let config = fast_config().with_heartbeat_interval(Duration::from_millis(20));
        let (mut client, mut events) = ChatClient::start(connector, config);
        expect_event(&mut events, |e| matches!(e, ChatEvent::Connected { .. }), "connected").await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        let pings = parse_sent(&sent)
            .iter()
            .filter(|cmd| matches!(cmd, ClientCommand::Ping))
            .count();
        assert!(pings >= 2, "expected repeated pings, saw {pings}");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn commands_queued_before_connect_are_flushed_in_order() {
        let (connector, sent, _) = MockConnector::new(vec![vec![Some(Ok(ready_json()))]]);
        let (mut client, mut events) = ChatClient::start(connector, fast_config());

        // Queue immediately, before the loop has connected
        client.join_room("P1").unwrap();
        client.send_text("P1", "hello").unwrap();

        expect_event(&mut events, |e| matches!(e, ChatEvent::Connected { .. }), "connected").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let commands = parse_sent(&sent);
        assert!(matches!(commands[0], ClientCommand::Authenticate { .. }));
        assert!(matches!(commands[1], ClientCommand::JoinRoom { .. }));
        assert!(
            matches!(&commands[2], ClientCommand::SendMessage { body, .. } if body == "hello")
        );

        client.shutdown().await;
    }
}

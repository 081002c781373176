//! Connection session with request multiplexing and reconnection
//!
//! A [`Session`] owns one logical connection to the service. Publish and
//! subscribe requests share it, each correlated by its own id. A background
//! driver task owns the transport:
//!
//! ```text
//!              connect()
//!     Idle ─────────────────► Connecting ◄──────────────┐
//!      ▲                          │                      │ unexpected closure,
//!      │ normal closure (1000)    │ dial ok              │ attempts left
//!      │ or reconnect disabled    ▼                      │
//!      └──────────────────────── Open ───────────────────┘
//!                                 │
//!                    close()      │      attempts exhausted
//!                                 ▼
//!                      Closing ─────► Closed (terminal)
//! ```
//!
//! On every transition to `Open` the attempt counter is reset and all live
//! subscriptions are re-sent with their original ids. Sending while the
//! connection is not open fails with [`SessionError::NotConnected`];
//! nothing is queued.

mod config;
mod error;
mod frame;
mod router;


pub use config::{SessionConfig, DEFAULT_RECONNECT_INTERVAL, DEFAULT_URL};
pub use error::{SessionError, SessionResult};
pub use frame::{InboundFrame, Request, RequestKind, EOSE};
pub use router::{Dispatch, RequestRouter};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event::{Event, Filter};
use crate::transport::{
    Connector, Transport, TransportError, WebSocketConnector, ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; `connect()` may be called
    Idle,
    /// Dialing, or waiting to redial
    Connecting,
    /// Connected; requests can be sent
    Open,
    /// `close()` was called and the driver is shutting down
    Closing,
    /// Terminal
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct Shared {
    state: ConnectionState,
    router: RequestRouter,
    outbound: Option<mpsc::UnboundedSender<String>>,
    reconnect_attempts: u32,
    auto_reconnect: bool,
    last_error: Option<SessionError>,
    close_frame: (u16, String),
    driver: Option<JoinHandle<()>>,
}

impl Shared {
    /// Outbound channel, only while open
    fn open_outbound(&self) -> SessionResult<&mpsc::UnboundedSender<String>> {
        match (&self.state, &self.outbound) {
            (ConnectionState::Open, Some(tx)) => Ok(tx),
            _ => Err(SessionError::NotConnected),
        }
    }
}

struct Inner {
    config: SessionConfig,
    connector: Box<dyn Connector>,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ConnectionState>,
}

/// What the driver does after a connection ends
enum Next {
    Reconnect,
    Stop,
    Finish,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, shared: &mut Shared, state: ConnectionState) {
        if shared.state != state {
            debug!("Session state {} -> {}", shared.state, state);
        }
        shared.state = state;
        self.state_tx.send_replace(state);
    }

    /// Install a fresh connection; false when the session is shutting down
    fn on_open(&self, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut shared = self.lock();
        if matches!(shared.state, ConnectionState::Closing | ConnectionState::Closed) {
            return false;
        }

        let replay = shared.router.replay_requests();
        for request in &replay {
            debug!("Replaying subscription {}", request.id);
            // Receiver is alive: the driver holds it
            let _ = outbound.send(request.encode());
        }

        shared.outbound = Some(outbound);
        shared.reconnect_attempts = 0;
        shared.last_error = None;
        self.set_state(&mut shared, ConnectionState::Open);
        info!(
            "Connected to {} ({} subscriptions replayed)",
            self.config.url,
            replay.len()
        );
        true
    }

    fn on_frame(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping inbound frame: {}", e);
                return;
            }
        };

        let mut shared = self.lock();
        match shared.router.dispatch(frame) {
            Dispatch::Publish | Dispatch::Subscription => {}
            Dispatch::Orphaned(id) => {
                debug!("Subscription {} has no receiver, unsubscribing", id);
                if let Ok(tx) = shared.open_outbound() {
                    let _ = tx.send(Request::unsubscribe(id).encode());
                }
            }
            Dispatch::Unhandled(frame) => {
                debug!("Unhandled frame {} for {}", frame.kind, frame.id);
            }
        }
    }

    fn on_connection_lost(&self, code: u16, reason: String, dial_failed: bool) -> Next {
        let mut shared = self.lock();
        shared.outbound = None;

        if matches!(shared.state, ConnectionState::Closing | ConnectionState::Closed) {
            return Next::Finish;
        }

        let failed = shared.router.fail_pending(code, &reason);
        if failed > 0 {
            debug!("Failed {} pending publishes", failed);
        }
        shared.last_error = Some(if dial_failed {
            SessionError::ConnectFailed(reason.clone())
        } else {
            SessionError::ConnectionLost {
                code,
                reason: reason.clone(),
            }
        });

        if code == NORMAL_CLOSURE {
            info!("Connection closed normally: {}", reason);
            self.set_state(&mut shared, ConnectionState::Idle);
            return Next::Stop;
        }

        if !shared.auto_reconnect {
            info!("Connection lost ({}), reconnect disabled", code);
            self.set_state(&mut shared, ConnectionState::Idle);
            return Next::Stop;
        }

        if self.config.allows_attempt(shared.reconnect_attempts) {
            shared.reconnect_attempts += 1;
            info!(
                "Connection lost ({}), reconnect attempt {} in {:?}",
                code, shared.reconnect_attempts, self.config.reconnect_interval
            );
            self.set_state(&mut shared, ConnectionState::Connecting);
            return Next::Reconnect;
        }

        warn!(
            "Giving up after {} reconnect attempts",
            shared.reconnect_attempts
        );
        shared.router.clear();
        shared.auto_reconnect = false;
        self.set_state(&mut shared, ConnectionState::Closed);
        Next::Stop
    }

    fn close_frame(&self) -> (u16, String) {
        self.lock().close_frame.clone()
    }

    fn finish(&self) {
        let mut shared = self.lock();
        shared.router.clear();
        shared.outbound = None;
        self.set_state(&mut shared, ConnectionState::Closed);
        info!("Session closed");
    }
}

/// Resolves once the session starts shutting down
async fn shutdown_requested(state_rx: &mut watch::Receiver<ConnectionState>) {
    let _ = state_rx
        .wait_for(|state| matches!(state, ConnectionState::Closing | ConnectionState::Closed))
        .await
        .is_ok();
}

enum PumpExit {
    Lost { code: u16, reason: String },
    Shutdown,
}

enum Step {
    Outbound(Option<String>),
    Inbound(Result<String, TransportError>),
    Shutdown,
}

async fn pump(
    inner: &Inner,
    transport: &mut Box<dyn Transport>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    state_rx: &mut watch::Receiver<ConnectionState>,
) -> PumpExit {
    loop {
        let step = tokio::select! {
            frame = outbound.recv() => Step::Outbound(frame),
            frame = transport.receive() => Step::Inbound(frame),
            _ = shutdown_requested(state_rx) => Step::Shutdown,
        };

        match step {
            Step::Outbound(Some(text)) => {
                if let Err(e) = transport.send(&text).await {
                    warn!("Send failed: {}", e);
                    return match e {
                        TransportError::Closed { code, reason } => PumpExit::Lost { code, reason },
                        other => PumpExit::Lost {
                            code: ABNORMAL_CLOSURE,
                            reason: other.to_string(),
                        },
                    };
                }
            }
            Step::Inbound(Ok(text)) => inner.on_frame(&text),
            Step::Inbound(Err(TransportError::Closed { code, reason })) => {
                return PumpExit::Lost { code, reason };
            }
            Step::Inbound(Err(TransportError::InvalidData(e))) => {
                warn!("Dropping inbound frame: {}", e);
            }
            Step::Inbound(Err(e)) => {
                return PumpExit::Lost {
                    code: ABNORMAL_CLOSURE,
                    reason: e.to_string(),
                };
            }
            // The outbound sender is only dropped on shutdown or loss
            Step::Outbound(None) | Step::Shutdown => return PumpExit::Shutdown,
        }
    }
}

async fn run_driver(inner: Arc<Inner>) {
    let mut state_rx = inner.state_tx.subscribe();

    loop {
        let dialed = tokio::select! {
            result = inner.connector.connect() => result,
            _ = shutdown_requested(&mut state_rx) => break,
        };

        let (code, reason, dial_failed) = match dialed {
            Ok(mut transport) => {
                let (tx, mut rx) = mpsc::unbounded_channel();
                if !inner.on_open(tx) {
                    let (code, reason) = inner.close_frame();
                    let _ = transport.close(code, &reason).await;
                    break;
                }

                match pump(&inner, &mut transport, &mut rx, &mut state_rx).await {
                    PumpExit::Lost { code, reason } => (code, reason, false),
                    PumpExit::Shutdown => {
                        let (code, reason) = inner.close_frame();
                        if let Err(e) = transport.close(code, &reason).await {
                            debug!("Close frame not sent: {}", e);
                        }
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", inner.config.url, e);
                (ABNORMAL_CLOSURE, e.to_string(), true)
            }
        };

        match inner.on_connection_lost(code, reason, dial_failed) {
            Next::Reconnect => {
                tokio::select! {
                    _ = tokio::time::sleep(inner.config.reconnect_interval) => {}
                    _ = shutdown_requested(&mut state_rx) => break,
                }
            }
            Next::Stop => return,
            Next::Finish => break,
        }
    }

    inner.finish();
}

/// A publish awaiting its response frame
#[derive(Debug)]
pub struct PendingPublish {
    id: String,
    reply: oneshot::Receiver<SessionResult<InboundFrame>>,
}

impl PendingPublish {
    /// Correlation id of the request
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the response
    ///
    /// Fails with [`SessionError::ConnectionLost`] if the connection closed
    /// first, or [`SessionError::Cancelled`] if the session was closed.
    pub async fn response(self) -> SessionResult<InboundFrame> {
        match self.reply.await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Cancelled),
        }
    }
}

/// Frames of one subscription request
///
/// A subscription made from several filters has one id per filter; frames
/// for all of them arrive here. The stream ends when the session is closed,
/// the ids are all unsubscribed, or reconnection gives up.
#[derive(Debug)]
pub struct Subscription {
    ids: Vec<String>,
    frames: mpsc::UnboundedReceiver<InboundFrame>,
}

impl Subscription {
    /// Correlation ids, one per filter
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Next frame, or None once every record is gone
    pub async fn next(&mut self) -> Option<InboundFrame> {
        self.frames.recv().await
    }
}

/// Client session
///
/// # Example
///
/// ```rust,no_run
/// use es_client::event::{self, Event, Filter, Ops};
/// use es_client::session::{Session, SessionConfig};
/// use es_client::KeyPair;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::new(SessionConfig::new("ws://127.0.0.1:8080"));
/// session.connect().await?;
///
/// let keys = KeyPair::generate();
/// let signed = event::sign(&Event::new(Ops::Create, 100), &keys)?;
/// let response = session.publish(&signed)?.response().await?;
/// println!("{} {}", response.kind, response.payload);
///
/// let mut sub = session.subscribe(&Filter::new().code(100))?;
/// while let Some(frame) = sub.next().await {
///     if frame.is_eose() {
///         break;
///     }
/// }
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create a session talking WebSocket to `config.url`
    pub fn new(config: SessionConfig) -> Self {
        let connector = WebSocketConnector::new(config.url.clone());
        Self::with_connector(config, connector)
    }

    /// Create a session over a custom connector
    pub fn with_connector(config: SessionConfig, connector: impl Connector + 'static) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let shared = Shared {
            state: ConnectionState::Idle,
            router: RequestRouter::new(),
            outbound: None,
            reconnect_attempts: 0,
            auto_reconnect: config.auto_reconnect,
            last_error: None,
            close_frame: (NORMAL_CLOSURE, String::new()),
            driver: None,
        };

        Session {
            inner: Arc::new(Inner {
                config,
                connector: Box::new(connector),
                shared: Mutex::new(shared),
                state_tx,
            }),
        }
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Watch state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Reconnect attempts since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect_attempts
    }

    /// Publishes awaiting a response
    pub fn pending_publishes(&self) -> usize {
        self.inner.lock().router.pending_count()
    }

    /// Live subscription ids
    pub fn active_subscriptions(&self) -> usize {
        self.inner.lock().router.subscription_count()
    }

    /// Open the connection
    ///
    /// Returns immediately when already open and joins an attempt already in
    /// flight. Resolves once the session is open, or fails when it falls
    /// back to idle or closes.
    pub async fn connect(&self) -> SessionResult<()> {
        let mut state_rx = {
            let mut shared = self.inner.lock();
            match shared.state {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Closing | ConnectionState::Closed => {
                    return Err(SessionError::Closed)
                }
                ConnectionState::Connecting => {}
                ConnectionState::Idle => {
                    info!("Connecting to {}", self.inner.config.url);
                    shared.last_error = None;
                    shared.reconnect_attempts = 0;
                    self.inner.set_state(&mut shared, ConnectionState::Connecting);
                    let driver = tokio::spawn(run_driver(Arc::clone(&self.inner)));
                    shared.driver = Some(driver);
                }
            }
            self.inner.state_tx.subscribe()
        };

        let outcome = state_rx
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map(|state| *state);

        match outcome {
            Ok(ConnectionState::Open) => Ok(()),
            _ => Err(self
                .inner
                .lock()
                .last_error
                .clone()
                .unwrap_or(SessionError::Closed)),
        }
    }

    /// Publish a signed event
    ///
    /// The returned handle resolves with the first frame carrying the
    /// request id.
    pub fn publish(&self, event: &Event) -> SessionResult<PendingPublish> {
        if !event.is_signed() {
            return Err(SessionError::UnsignedEvent);
        }

        let mut shared = self.inner.lock();
        shared.open_outbound()?;

        let id = shared.router.next_id();
        let text = Request::publish(id.clone(), event)?.encode();
        shared.open_outbound()?.send(text).map_err(|_| {
            warn!("Publish {} not sent: connection is going away", id);
            SessionError::NotConnected
        })?;

        let (tx, rx) = oneshot::channel();
        shared.router.track_publish(id.clone(), tx);
        debug!("Published {}", id);

        Ok(PendingPublish { id, reply: rx })
    }

    /// Subscribe with one filter
    pub fn subscribe(&self, filter: &Filter) -> SessionResult<Subscription> {
        self.subscribe_all(std::slice::from_ref(filter))
    }

    /// Subscribe with several filters, one id each, delivered together
    pub fn subscribe_all(&self, filters: &[Filter]) -> SessionResult<Subscription> {
        let mut shared = self.inner.lock();
        shared.open_outbound()?;

        let (sink, frames) = mpsc::unbounded_channel();
        let mut ids: Vec<String> = Vec::with_capacity(filters.len());

        for filter in filters {
            let id = shared.router.next_id();
            let payload = filter.to_value();
            let text = Request::subscribe(id.clone(), payload.clone()).encode();

            if shared.open_outbound()?.send(text).is_err() {
                warn!("Subscribe {} not sent: connection is going away", id);
                for id in &ids {
                    shared.router.remove_subscription(id);
                }
                return Err(SessionError::NotConnected);
            }

            shared
                .router
                .track_subscription(id.clone(), payload, sink.clone());
            debug!("Subscribed {}", id);
            ids.push(id);
        }

        Ok(Subscription { ids, frames })
    }

    /// Cancel one subscription id
    ///
    /// Returns false for unknown ids. The record is removed even when the
    /// connection is down; `UNSUB` is only sent while open.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut shared = self.inner.lock();
        if !shared.router.remove_subscription(id) {
            return false;
        }

        if let Ok(tx) = shared.open_outbound() {
            let _ = tx.send(Request::unsubscribe(id).encode());
        }
        debug!("Unsubscribed {}", id);
        true
    }

    /// Close with code 1000
    pub async fn close(&self) {
        self.close_with(NORMAL_CLOSURE, "").await;
    }

    /// Close with a specific code and reason
    ///
    /// Every pending publish and subscription is dropped without
    /// notification, any reconnect timer is cancelled and the session
    /// becomes permanently closed.
    pub async fn close_with(&self, code: u16, reason: &str) {
        let mut state_rx = {
            let mut shared = self.inner.lock();
            shared.auto_reconnect = false;
            shared.last_error = None;
            shared.router.clear();
            shared.outbound = None;

            match shared.state {
                ConnectionState::Closed => return,
                ConnectionState::Idle => {
                    self.inner.set_state(&mut shared, ConnectionState::Closed);
                    info!("Session closed");
                    return;
                }
                ConnectionState::Closing => {}
                ConnectionState::Connecting | ConnectionState::Open => {
                    shared.close_frame = (code, reason.to_string());
                    self.inner.set_state(&mut shared, ConnectionState::Closing);
                }
            }
            self.inner.state_tx.subscribe()
        };

        let _ = state_rx
            .wait_for(|state| *state == ConnectionState::Closed)
            .await
            .is_ok();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(driver) = self.inner.lock().driver.take() {
            driver.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

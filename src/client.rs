//! The public client facade (spec §4.G): the operations external callers
//! drive, wired on top of the connection manager, dispatcher, and registry.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use fc_protocol::{FcType, JoinAction, Packet, to_room_id, to_user_id};
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ClientOptions;
use crate::connection::{self, ConnectRequest, ConnectionState, ConnectionTask};
use crate::dispatch::OutboundCmd;
use crate::emote::{EmoteEncoder, LocalEmoteEncoder};
use crate::error::ClientError;
use crate::events::EventBus;
use crate::http::{HttpGet, ReqwestHttpGet};
use crate::registry::SharedRegistry;

/// The first `queryId` handed out by [`Client::query_user`] (spec §4.G,
/// "assigns a monotonic `queryId` (≥20)").
const QUERY_ID_START: i32 = 20;

/// `fc_protocol::ids` works in `i64` room/user-id space; wire frames carry
/// `i32` fields.
fn wire_id(id: i64) -> i32 {
    id.try_into().unwrap_or(i32::MAX)
}

/// Why a [`Client::join_room`] call was refused.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("join refused: {0}")]
    Refused(String),
}

/// Internal outcome carried over `join_room`'s waiter oneshot, distinguishing
/// a protocol-level refusal from a manual disconnect cancelling the wait.
enum JoinWait {
    Ok,
    Refused(String),
    Disconnected,
}

struct Running {
    outbound_tx: mpsc::UnboundedSender<OutboundCmd>,
    cancel: Arc<Notify>,
    manual: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// A single persistent connection to the service, plus the model registry
/// it feeds.
///
/// Cheaply cloneable via its internal `Arc`s is not provided: `Client` is
/// meant to be held behind an `Arc` by callers that need to share it across
/// tasks, the same way its `state_rx`/`packet_events` handles are shared.
pub struct Client {
    options: ClientOptions,
    http: Arc<dyn HttpGet>,
    emote: Arc<dyn EmoteEncoder>,
    registry: SharedRegistry,
    packet_events: Arc<EventBus<Packet>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    running: StdMutex<Option<Running>>,
    credentials: StdMutex<(String, String)>,
    next_query_id: AtomicI32,
    session_id: Arc<AtomicI32>,
}

impl Client {
    pub fn new(options: ClientOptions, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_collaborators(
            options,
            username,
            password,
            SharedRegistry::new(),
            Arc::new(ReqwestHttpGet::new()),
            Arc::new(LocalEmoteEncoder),
        )
    }

    /// Construct a client sharing a registry (and therefore the process-wide
    /// "best session" view, spec §5) with other clients, and/or substituting
    /// the `HttpGet`/`EmoteEncoder` collaborators — the seam tests use to
    /// avoid a real network or emote catalog.
    pub fn with_collaborators(
        options: ClientOptions,
        username: impl Into<String>,
        password: impl Into<String>,
        registry: SharedRegistry,
        http: Arc<dyn HttpGet>,
        emote: Arc<dyn EmoteEncoder>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        Client {
            options,
            http,
            emote,
            registry,
            packet_events: Arc::new(EventBus::new()),
            state_tx,
            state_rx,
            running: StdMutex::new(None),
            credentials: StdMutex::new((username.into(), password.into())),
            next_query_id: AtomicI32::new(QUERY_ID_START),
            session_id: Arc::new(AtomicI32::new(0)),
        }
    }

    /// The bus every wire event (`LOGIN`, `CMESG`, …), its `ANY` wildcard,
    /// and the client-level control events (`CLIENT_CONNECTED`,
    /// `CLIENT_DISCONNECTED`, `CLIENT_MANUAL_DISCONNECT`,
    /// `CLIENT_MODELSLOADED`) are delivered on.
    pub fn events(&self) -> &Arc<EventBus<Packet>> {
        &self.packet_events
    }

    /// The shared model registry this client merges updates into.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// `Connect(doLogin=true)` (spec §4.G): resolves when `Active` is first
    /// reached; rejects on `Disconnect()` or `connectionTimeout`.
    pub async fn connect(&self, do_login: bool) -> Result<(), ClientError> {
        let first_rx = self.ensure_task_spawned(do_login);
        match first_rx {
            Some(rx) => match self.options.connection_timeout {
                Some(d) => tokio::time::timeout(d, rx)
                    .await
                    .map_err(|_| ClientError::ConnectTimeout)?
                    .unwrap_or(Err(ClientError::Disconnected)),
                None => rx.await.unwrap_or(Err(ClientError::Disconnected)),
            },
            // Another call already owns the in-flight connect; wait for Active.
            None => match self.options.connection_timeout {
                Some(d) => tokio::time::timeout(d, self.wait_until_active())
                    .await
                    .map_err(|_| ClientError::ConnectTimeout)?,
                None => self.wait_until_active().await,
            },
        }
    }

    async fn wait_until_active(&self) -> Result<(), ClientError> {
        let mut rx = self.state_rx.clone();
        loop {
            match *rx.borrow() {
                ConnectionState::Active => return Ok(()),
                ConnectionState::Idle => return Err(ClientError::Disconnected),
                ConnectionState::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Err(ClientError::Disconnected);
            }
        }
    }

    /// Spawns the background connection task if one isn't already running,
    /// returning the oneshot that resolves the *first* `connect` call to
    /// observe this dial (spec §4.G, "Connect while Pending ⇒ wait for
    /// Active; while Active ⇒ no-op").
    fn ensure_task_spawned(&self, do_login: bool) -> Option<oneshot::Receiver<Result<(), ClientError>>> {
        let mut guard = self.running.lock().unwrap();
        if let Some(running) = guard.as_ref() {
            if !running.task.is_finished() {
                return None;
            }
        }

        let (username, password) = self.credentials.lock().unwrap().clone();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(Notify::new());
        let manual = Arc::new(AtomicBool::new(false));
        let (first_tx, first_rx) = oneshot::channel();

        let task = ConnectionTask {
            options: self.options.clone(),
            http: self.http.clone(),
            registry: self.registry.clone(),
            packet_events: self.packet_events.clone(),
            outbound_tx: outbound_tx.clone(),
            outbound_rx,
            state_tx: self.state_tx.clone(),
            cancel: cancel.clone(),
            manual: manual.clone(),
            request: ConnectRequest { do_login, username, password },
            session_id: self.session_id.clone(),
            first_result: Some(first_tx),
        };

        let handle = tokio::spawn(connection::run(task));
        *guard = Some(Running { outbound_tx, cancel, manual, task: handle });
        Some(first_rx)
    }

    /// `ConnectAndWaitForModels()` (spec §4.G): resolves on the first
    /// `CLIENT_MODELSLOADED` event; always logs in.
    pub async fn connect_and_wait_for_models(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(StdMutex::new(Some(tx)));
        let events = self.packet_events.clone();
        let events_off = events.clone();
        let listener_id_cell: Arc<StdMutex<Option<u64>>> = Arc::new(StdMutex::new(None));
        let listener_id_cell2 = listener_id_cell.clone();
        let id = events.on("CLIENT_MODELSLOADED", move |_| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
            if let Some(id) = listener_id_cell2.lock().unwrap().take() {
                events_off.off("CLIENT_MODELSLOADED", id);
            }
        });
        *listener_id_cell.lock().unwrap() = Some(id);

        self.connect(true).await?;
        rx.await.map_err(|_| ClientError::Disconnected)
    }

    /// `Disconnect()` (spec §4.G): resolves when fully `Idle`; cancels
    /// reconnect/keepalive timers.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let running = self.running.lock().unwrap().take();
        let Some(running) = running else { return Ok(()) };
        running.manual.store(true, Ordering::SeqCst);
        running.cancel.notify_one();
        let _ = running.task.await;
        Ok(())
    }

    /// `EnsureConnected(timeoutMs?)` (spec §4.G).
    pub async fn ensure_connected(&self, timeout_ms: Option<i64>) -> Result<(), ClientError> {
        if self.state() == ConnectionState::Active {
            return Ok(());
        }
        if self.state() == ConnectionState::Idle || timeout_ms == Some(-1) {
            return Err(ClientError::Disconnected);
        }

        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(StdMutex::new(Some(tx)));
        let events = self.packet_events.clone();
        let events_off = events.clone();
        let ids: Arc<StdMutex<Option<(u64, u64)>>> = Arc::new(StdMutex::new(None));
        let ids2 = ids.clone();

        let tx_connected = tx.clone();
        let ids_connected = ids2.clone();
        let events_off_connected = events_off.clone();
        let connected_id = events.on("CLIENT_CONNECTED", move |_| {
            if let Some(tx) = tx_connected.lock().unwrap().take() {
                let _ = tx.send(Ok(()));
            }
            if let Some((a, b)) = ids_connected.lock().unwrap().take() {
                events_off_connected.off("CLIENT_CONNECTED", a);
                events_off_connected.off("CLIENT_MANUAL_DISCONNECT", b);
            }
        });

        let tx_disconnected = tx.clone();
        let ids_disconnected = ids2.clone();
        let events_off_disconnected = events_off.clone();
        let disconnect_id = events.on("CLIENT_MANUAL_DISCONNECT", move |_| {
            if let Some(tx) = tx_disconnected.lock().unwrap().take() {
                let _ = tx.send(Err(ClientError::Disconnected));
            }
            if let Some((a, b)) = ids_disconnected.lock().unwrap().take() {
                events_off_disconnected.off("CLIENT_CONNECTED", a);
                events_off_disconnected.off("CLIENT_MANUAL_DISCONNECT", b);
            }
        });
        *ids.lock().unwrap() = Some((connected_id, disconnect_id));

        let wait = async { rx.await.unwrap_or(Err(ClientError::Disconnected)) };
        match timeout_ms {
            Some(ms) if ms >= 0 => tokio::time::timeout(Duration::from_millis(ms as u64), wait)
                .await
                .map_err(|_| ClientError::ConnectTimeout)?,
            _ => wait.await,
        }
    }

    /// `JoinRoom(id)` (spec §4.G): sends `JOINCHAN(JOIN)`, resolves on the
    /// first `CMESG` or `JOINCHAN(JOIN)` for the target model; rejects on
    /// `JOINCHAN(PART)`, `ZBAN`, or `BANCHAN` for the target, or on
    /// `CLIENT_MANUAL_DISCONNECT` (spec §5, "cancels any in-flight … JoinRoom
    /// … waiters").
    pub async fn join_room(&self, id: i64) -> Result<(), JoinError> {
        let target = to_user_id(id);

        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(StdMutex::new(Some(tx)));
        let events = self.packet_events.clone();
        let events_off = events.clone();
        let ids: Arc<StdMutex<Option<(u64, u64)>>> = Arc::new(StdMutex::new(None));
        let ids2 = ids.clone();

        let tx_any = tx.clone();
        let ids_any = ids2.clone();
        let events_off_any = events_off.clone();
        let any_id = events.on("ANY", move |packet: &Packet| {
            if packet.about_model() != Some(target) {
                return;
            }
            let outcome = match packet.fc_type {
                FcType::CMesg => Some(JoinWait::Ok),
                FcType::JoinChan if packet.join_action() == JoinAction::Join => Some(JoinWait::Ok),
                FcType::JoinChan if packet.join_action() == JoinAction::Part => {
                    Some(JoinWait::Refused("left the room".to_string()))
                }
                FcType::ZBan => Some(JoinWait::Refused("banned".to_string())),
                FcType::BanChan => Some(JoinWait::Refused("banned from channel".to_string())),
                _ => None,
            };
            let Some(outcome) = outcome else { return };
            if let Some(tx) = tx_any.lock().unwrap().take() {
                let _ = tx.send(outcome);
            }
            if let Some((a, b)) = ids_any.lock().unwrap().take() {
                events_off_any.off("ANY", a);
                events_off_any.off("CLIENT_MANUAL_DISCONNECT", b);
            }
        });

        let tx_disconnect = tx.clone();
        let ids_disconnect = ids2.clone();
        let events_off_disconnect = events_off.clone();
        let disconnect_id = events.on("CLIENT_MANUAL_DISCONNECT", move |_| {
            if let Some(tx) = tx_disconnect.lock().unwrap().take() {
                let _ = tx.send(JoinWait::Disconnected);
            }
            if let Some((a, b)) = ids_disconnect.lock().unwrap().take() {
                events_off_disconnect.off("ANY", a);
                events_off_disconnect.off("CLIENT_MANUAL_DISCONNECT", b);
            }
        });
        *ids.lock().unwrap() = Some((any_id, disconnect_id));

        self.tx_cmd(FcType::JoinChan, wire_id(to_room_id(id)), 0, 0, None).await?;

        match rx.await {
            Ok(JoinWait::Ok) => Ok(()),
            Ok(JoinWait::Refused(reason)) => Err(JoinError::Refused(reason)),
            Ok(JoinWait::Disconnected) | Err(_) => Err(JoinError::Client(ClientError::Disconnected)),
        }
    }

    /// `LeaveRoom(id)` (spec §4.G): sends `JOINCHAN(PART)` if `Active`, else
    /// silently no-ops.
    pub async fn leave_room(&self, id: i64) {
        if self.state() != ConnectionState::Active {
            return;
        }
        let _ = self
            .tx_cmd(FcType::JoinChan, wire_id(to_room_id(id)), 0, JoinAction::Part.to_i32(), None)
            .await;
    }

    /// `SendChat(id, msg)` (spec §4.G).
    pub async fn send_chat(&self, id: i64, msg: &str) -> Result<(), ClientError> {
        let encoded = self.emote.encode(msg);
        self.tx_cmd(FcType::CMesg, wire_id(to_room_id(id)), 0, 0, Some(encoded)).await
    }

    /// `SendPM(id, msg)` (spec §4.G).
    pub async fn send_pm(&self, id: i64, msg: &str) -> Result<(), ClientError> {
        let encoded = self.emote.encode(msg);
        self.tx_cmd(FcType::PMesg, wire_id(to_user_id(id)), 0, 0, Some(encoded)).await
    }

    /// `QueryUser(userOrId)` (spec §4.G): assigns a monotonic `queryId`
    /// (≥20), sends `USERNAMELOOKUP`, resolves with the first response whose
    /// `nArg1 == queryId`. A payload that doesn't decode to a JSON object
    /// (raw string, bare string/number, or absent) means "not found"; a
    /// `CLIENT_MANUAL_DISCONNECT` cancels the wait (spec §5, "cancels any
    /// in-flight … QueryUser … waiters").
    pub async fn query_user(&self, id: i64) -> Result<Option<serde_json::Value>, ClientError> {
        let query_id = self.next_query_id.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(StdMutex::new(Some(tx)));
        let events = self.packet_events.clone();
        let events_off = events.clone();
        let ids: Arc<StdMutex<Option<(u64, u64)>>> = Arc::new(StdMutex::new(None));
        let ids2 = ids.clone();

        let tx_lookup = tx.clone();
        let ids_lookup = ids2.clone();
        let events_off_lookup = events_off.clone();
        let lookup_id = events.on("USERNAMELOOKUP", move |packet: &Packet| {
            if packet.n_arg1 != query_id {
                return;
            }
            let result = packet
                .message
                .as_json()
                .filter(|v| v.is_object())
                .cloned();
            if let Some(tx) = tx_lookup.lock().unwrap().take() {
                let _ = tx.send(Ok(result));
            }
            if let Some((a, b)) = ids_lookup.lock().unwrap().take() {
                events_off_lookup.off("USERNAMELOOKUP", a);
                events_off_lookup.off("CLIENT_MANUAL_DISCONNECT", b);
            }
        });

        let tx_disconnect = tx.clone();
        let ids_disconnect = ids2.clone();
        let events_off_disconnect = events_off.clone();
        let disconnect_id = events.on("CLIENT_MANUAL_DISCONNECT", move |_| {
            if let Some(tx) = tx_disconnect.lock().unwrap().take() {
                let _ = tx.send(Err(ClientError::Disconnected));
            }
            if let Some((a, b)) = ids_disconnect.lock().unwrap().take() {
                events_off_disconnect.off("USERNAMELOOKUP", a);
                events_off_disconnect.off("CLIENT_MANUAL_DISCONNECT", b);
            }
        });
        *ids.lock().unwrap() = Some((lookup_id, disconnect_id));

        self.tx_cmd(FcType::UsernameLookup, 0, query_id, 0, Some(id.to_string())).await?;

        rx.await.unwrap_or(Err(ClientError::Disconnected))
    }

    /// `TxCmd(fcType, nTo=0, nArg1=0, nArg2=0, sMsg?)` (spec §4.G): encode
    /// and write via the current dialect. Fails if not connected.
    pub async fn tx_cmd(
        &self,
        fc_type: FcType,
        n_to: i32,
        n_arg1: i32,
        n_arg2: i32,
        payload: Option<String>,
    ) -> Result<(), ClientError> {
        let guard = self.running.lock().unwrap();
        let Some(running) = guard.as_ref() else { return Err(ClientError::Disconnected) };
        let session_id = self.session_id.load(Ordering::SeqCst);
        running
            .outbound_tx
            .send(OutboundCmd { fc_type, session_id, n_to, n_arg1, n_arg2, payload })
            .map_err(|_| ClientError::Disconnected)
    }
}

//! Connection lifecycle manager: dialing, handshake, keepalive, silence
//! watchdog, and capped exponential backoff reconnect (spec §4.F).
//!
//! Runs as a single background task per [`crate::client::Client`], looping
//! indefinitely until a manual [`crate::client::Client::disconnect`]. All
//! packet decoding and dispatch happens inline in this task, matching the
//! "single-threaded cooperative per client" scheduling model of spec §5.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use fc_protocol::{FcType, Packet, PacketPayload};
use tokio::sync::{Notify, mpsc, watch};
use tokio::time::{Instant, interval, sleep, timeout};
use tracing::{error, info, warn};

use crate::config::ClientOptions;
use crate::dispatch::{Dispatcher, LoginAck, OutboundCmd};
use crate::error::ClientError;
use crate::events::EventBus;
use crate::http::HttpGet;
use crate::registry::SharedRegistry;
use crate::serverconfig::{self, DialTarget};
use crate::transport::Transport;

/// The connection's lifecycle state (spec §3, "Connection state").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Pending,
    Active,
}

/// LOGIN version code distinguishing the binary client from the WebSocket
/// client (spec §6, "Login payload"). The wire contract leaves the exact
/// values unspecified; reproduced here as stand-in constants in the same
/// spirit as `fc_protocol::ids`'s band constants.
const LOGIN_VERSION_BINARY: i32 = 20_071_025;
const LOGIN_VERSION_WEBSOCKET: i32 = 20_071_026;

const BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_CAP: Duration = Duration::from_secs(2400);
const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Login credentials and behavior for one `Connect` call.
pub struct ConnectRequest {
    pub do_login: bool,
    pub username: String,
    pub password: String,
}

/// Everything the background task needs, handed off by
/// [`crate::client::Client::connect`].
pub struct ConnectionTask {
    pub options: ClientOptions,
    pub http: Arc<dyn HttpGet>,
    pub registry: SharedRegistry,
    pub packet_events: Arc<EventBus<Packet>>,
    pub outbound_tx: mpsc::UnboundedSender<OutboundCmd>,
    pub outbound_rx: mpsc::UnboundedReceiver<OutboundCmd>,
    pub state_tx: watch::Sender<ConnectionState>,
    pub cancel: Arc<Notify>,
    pub manual: Arc<AtomicBool>,
    pub request: ConnectRequest,
    /// The session id the current (or most recent) LOGIN assigned, shared
    /// with [`crate::client::Client`] so facade-issued commands (`TxCmd`,
    /// `SendChat`, …) can stamp the right `nFrom` (spec §6, wire frame).
    pub session_id: Arc<AtomicI32>,
    /// Fulfilled exactly once, the first time `Active` is reached or the
    /// connection fails in a way that will never be retried (spec §4.G,
    /// `Connect` — "resolves when Active is first reached; rejects on
    /// `Disconnect()` or `connectionTimeout`"). Later reconnects after the
    /// first `Active` happen silently in the background.
    pub first_result: Option<tokio::sync::oneshot::Sender<Result<(), ClientError>>>,
}

/// A synthetic packet used to carry the client-level control events
/// (`CLIENT_CONNECTED`, `CLIENT_DISCONNECTED`, `CLIENT_MANUAL_DISCONNECT`)
/// over the same `EventBus<Packet>` the wire events use (spec §6, "Emitted
/// event names"). These names are never produced by the wire codec, so any
/// placeholder envelope is fine; callers only look at the event name.
fn control_packet() -> Packet {
    Packet::new(FcType::Null, 0, 0, 0, 0, PacketPayload::Absent)
}

/// Outcome of one dial+active cycle, driving the outer reconnect loop.
enum Ended {
    Manual,
    /// Transient failure; the outer loop reconnects with backoff.
    Failed(ClientError),
    /// Login rejected: never retried (spec §4.E, "LOGIN" — "`nArg1 != 0` ⇒
    /// fatal login failure").
    Fatal(ClientError),
}

/// What a successful dial+handshake produced, handed back to the caller so
/// it can transition to `Active` and fulfil `first_result`.
struct DialOutcome {
    transport: Transport,
    last_packet: Instant,
    last_state_packet: Instant,
    logged_in: bool,
}

/// The reconnect loop. Runs until a manual disconnect; every other failure
/// reconnects with capped exponential backoff (spec §4.F).
pub async fn run(mut task: ConnectionTask) {
    let (site_host, user_prefix) = task.options.site();
    let site_host = site_host.to_string();
    let user_prefix = user_prefix.to_string();

    let mut dispatcher = Dispatcher::new(
        task.registry.inner(),
        task.http.clone(),
        site_host.clone(),
        task.packet_events.clone(),
        task.outbound_tx.clone(),
    );

    let mut backoff = BACKOFF_BASE;
    let mut cached_target: Option<DialTarget> = None;
    let mut was_logged_in = false;
    let mut first_result = task.first_result.take();

    loop {
        if task.manual.load(Ordering::SeqCst) {
            let _ = task.state_tx.send(ConnectionState::Idle);
            task.packet_events.emit("CLIENT_MANUAL_DISCONNECT", &control_packet());
            if let Some(tx) = first_result.take() {
                let _ = tx.send(Err(ClientError::Disconnected));
            }
            return;
        }

        let _ = task.state_tx.send(ConnectionState::Pending);

        let target = match resolve_target(&task, &mut cached_target).await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "server config resolution failed, retrying after backoff");
                if wait_backoff(&mut backoff, &task.cancel, &task.manual).await {
                    let _ = task.state_tx.send(ConnectionState::Idle);
                    task.packet_events.emit("CLIENT_MANUAL_DISCONNECT", &control_packet());
                    if let Some(tx) = first_result.take() {
                        let _ = tx.send(Err(ClientError::Disconnected));
                    }
                    return;
                }
                continue;
            }
        };

        match run_one_connection(
            &mut task,
            &mut dispatcher,
            &target,
            &user_prefix,
            &mut was_logged_in,
            &mut first_result,
            &mut backoff,
        )
        .await
        {
            Ended::Manual => {
                let _ = task.state_tx.send(ConnectionState::Idle);
                task.packet_events.emit("CLIENT_MANUAL_DISCONNECT", &control_packet());
                if let Some(tx) = first_result.take() {
                    let _ = tx.send(Err(ClientError::Disconnected));
                }
                return;
            }
            Ended::Fatal(e) => {
                warn!(error = %e, "connection failed permanently, not reconnecting");
                let _ = task.state_tx.send(ConnectionState::Idle);
                return;
            }
            Ended::Failed(e) => {
                warn!(error = %e, "connection ended, reconnecting after backoff");
                task.packet_events.emit("CLIENT_DISCONNECTED", &control_packet());
                if wait_backoff(&mut backoff, &task.cancel, &task.manual).await {
                    let _ = task.state_tx.send(ConnectionState::Idle);
                    task.packet_events.emit("CLIENT_MANUAL_DISCONNECT", &control_packet());
                    if let Some(tx) = first_result.take() {
                        let _ = tx.send(Err(ClientError::Disconnected));
                    }
                    return;
                }
            }
        }
    }
}

async fn resolve_target(
    task: &ConnectionTask,
    cached: &mut Option<DialTarget>,
) -> Result<DialTarget, ClientError> {
    if let Some(target) = &task.options.dial_override {
        return Ok(target.clone());
    }
    if task.options.use_cached_server_config {
        if let Some(t) = cached {
            return Ok(t.clone());
        }
    }
    let target = serverconfig::resolve(task.http.as_ref(), &task.options).await?;
    *cached = Some(target.clone());
    Ok(target)
}

/// Sleep for the current backoff, growing it by 1.5x up to the cap for the
/// *next* call (spec §4.F, §8 "Reconnect backoff"). Returns `true` if a
/// manual disconnect interrupted the sleep.
async fn wait_backoff(backoff: &mut Duration, cancel: &Notify, manual: &AtomicBool) -> bool {
    tokio::select! {
        () = sleep(*backoff) => {}
        () = cancel.notified() => {
            return manual.load(Ordering::SeqCst);
        }
    }
    *backoff = std::cmp::min(
        Duration::from_secs_f64(backoff.as_secs_f64() * BACKOFF_MULTIPLIER),
        BACKOFF_CAP,
    );
    false
}

async fn run_one_connection(
    task: &mut ConnectionTask,
    dispatcher: &mut Dispatcher,
    target: &DialTarget,
    user_prefix: &str,
    was_logged_in: &mut bool,
    first_result: &mut Option<tokio::sync::oneshot::Sender<Result<(), ClientError>>>,
    backoff: &mut Duration,
) -> Ended {
    let outcome = tokio::select! {
        biased;
        () = task.cancel.notified() => {
            task.manual.store(true, Ordering::SeqCst);
            return Ended::Manual;
        }
        result = dial_and_login(task, dispatcher, target, user_prefix) => result,
    };

    let mut outcome = match outcome {
        Ok(o) => o,
        Err(ClientError::LoginRejected { code }) => {
            if let Some(tx) = first_result.take() {
                let _ = tx.send(Err(ClientError::LoginRejected { code }));
            }
            return Ended::Fatal(ClientError::LoginRejected { code });
        }
        Err(e) => return Ended::Failed(e),
    };

    if outcome.logged_in {
        task.registry.client_logged_in();
        *was_logged_in = true;
    }
    task.session_id.store(dispatcher.session_id(), Ordering::SeqCst);

    *backoff = BACKOFF_BASE;
    let _ = task.state_tx.send(ConnectionState::Active);
    task.packet_events.emit("CLIENT_CONNECTED", &control_packet());
    if let Some(tx) = first_result.take() {
        let _ = tx.send(Ok(()));
    }

    let result = active_loop(
        task,
        dispatcher,
        &mut outcome.transport,
        &mut outcome.last_packet,
        &mut outcome.last_state_packet,
    )
    .await;

    outcome.transport.close().await;
    if *was_logged_in {
        task.registry.client_logged_out();
        *was_logged_in = false;
    }
    // Guest name recycle (spec §4.F): the next handshake needs a bare
    // "guest" username, not whatever the server assigned this session.
    if task.request.password == "guest" && task.request.username.starts_with("Guest") {
        task.request.username = "guest".to_string();
    }
    result
}

async fn dial_and_login(
    task: &ConnectionTask,
    dispatcher: &mut Dispatcher,
    target: &DialTarget,
    user_prefix: &str,
) -> Result<DialOutcome, ClientError> {
    let mut transport = if task.options.use_web_sockets {
        Transport::dial_text(target.ws_scheme, &target.host, target.ws_path).await?
    } else {
        Transport::dial_binary(&target.host, target.binary_port).await?
    };

    if task.options.use_web_sockets {
        transport.send_hello().await?;
    }

    let login_rx = dispatcher.begin_connection();
    let mut last_packet = Instant::now();
    let mut last_state_packet = Instant::now();
    let mut logged_in = false;

    if task.request.do_login {
        let version = if task.options.use_web_sockets {
            LOGIN_VERSION_WEBSOCKET
        } else {
            LOGIN_VERSION_BINARY
        };
        let payload = format!(
            "{user_prefix}{}:{}",
            task.request.username, task.request.password
        );
        transport.send(FcType::Login, 0, 0, version, 0, Some(&payload)).await?;

        let ack = login_handshake(
            &mut transport,
            dispatcher,
            login_rx,
            task.options.login_timeout,
            &mut last_packet,
            &mut last_state_packet,
        )
        .await?;
        info!(uid = ack.uid, username = %ack.username, "login accepted");
        logged_in = true;
    }

    Ok(DialOutcome { transport, last_packet, last_state_packet, logged_in })
}

async fn login_handshake(
    transport: &mut Transport,
    dispatcher: &mut Dispatcher,
    mut login_rx: tokio::sync::oneshot::Receiver<Result<LoginAck, i32>>,
    login_timeout: Duration,
    last_packet: &mut Instant,
    last_state_packet: &mut Instant,
) -> Result<LoginAck, ClientError> {
    let deadline = Instant::now() + login_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ClientError::LoginTimeout);
        }
        match timeout(remaining, transport.recv()).await {
            Ok(Ok(Some(packet))) => {
                *last_packet = Instant::now();
                if packet.fc_type.is_state_class() {
                    *last_state_packet = *last_packet;
                }
                dispatcher.handle(packet).await;
                match login_rx.try_recv() {
                    Ok(Ok(ack)) => return Ok(ack),
                    Ok(Err(code)) => return Err(ClientError::LoginRejected { code }),
                    Err(_) => continue,
                }
            }
            Ok(Ok(None)) => return Err(ClientError::Disconnected),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::LoginTimeout),
        }
    }
}

/// The steady-state Active loop: reads packets, serves outbound commands,
/// and runs the silence watchdog, until the connection drops or a manual
/// disconnect is requested (spec §4.F, "Silence watchdog").
async fn active_loop(
    task: &mut ConnectionTask,
    dispatcher: &mut Dispatcher,
    transport: &mut Transport,
    last_packet: &mut Instant,
    last_state_packet: &mut Instant,
) -> Ended {
    let mut watchdog = interval(task.options.watchdog_tick());
    watchdog.tick().await; // first tick fires immediately; discard it

    loop {
        tokio::select! {
            biased;

            () = task.cancel.notified() => {
                task.manual.store(true, Ordering::SeqCst);
                return Ended::Manual;
            }

            cmd = task.outbound_rx.recv() => {
                let Some(cmd) = cmd else { return Ended::Manual; };
                if let Err(e) = transport
                    .send(cmd.fc_type, cmd.session_id, cmd.n_to, cmd.n_arg1, cmd.n_arg2, cmd.payload.as_deref())
                    .await
                {
                    return Ended::Failed(ClientError::from(e));
                }
            }

            packet = transport.recv() => {
                match packet {
                    Ok(Some(packet)) => {
                        *last_packet = Instant::now();
                        if packet.fc_type.is_state_class() {
                            *last_state_packet = *last_packet;
                        }
                        dispatcher.handle(packet).await;
                    }
                    Ok(None) => return Ended::Failed(ClientError::Disconnected),
                    Err(e) => return Ended::Failed(ClientError::from(e)),
                }
            }

            _ = watchdog.tick() => {
                let now = Instant::now();
                let silent_too_long = now.duration_since(*last_packet) > task.options.silence_timeout;
                let state_silent_too_long = dispatcher.uid() != 0
                    && now.duration_since(*last_state_packet) > task.options.state_silence_timeout;
                if silent_too_long || state_silent_too_long {
                    error!("silence watchdog tripped, forcing reconnect");
                    return Ended::Failed(ClientError::Disconnected);
                }
                if let Err(e) = transport.send(FcType::Null, dispatcher.session_id(), 0, 0, 0, None).await {
                    return Ended::Failed(ClientError::from(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let mut b = BACKOFF_BASE;
        assert_eq!(b, Duration::from_secs(5));
        b = Duration::from_secs_f64(b.as_secs_f64() * BACKOFF_MULTIPLIER);
        assert_eq!(b, Duration::from_millis(7_500));
        b = Duration::from_secs_f64(b.as_secs_f64() * BACKOFF_MULTIPLIER);
        assert_eq!(b, Duration::from_millis(11_250));
        for _ in 0..40 {
            b = std::cmp::min(
                Duration::from_secs_f64(b.as_secs_f64() * BACKOFF_MULTIPLIER),
                BACKOFF_CAP,
            );
        }
        assert_eq!(b, BACKOFF_CAP);
    }
}

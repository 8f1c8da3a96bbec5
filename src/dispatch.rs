//! Packet dispatcher: per-`fcType` side effects against the model registry
//! (spec §4.E).

use crate::events::EventBus;
use crate::http::HttpGet;
use crate::registry::Registry;
use fc_protocol::{FcType, FcwOpt, JoinAction, ListKind, ModelSessionState, Packet, PacketPayload, SessionValue, decode_list};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// The `lv` value identifying a broadcaster. Unspecified numerically by the
/// wire contract this spec distills; invented here as a stand-in (spec §9
/// treats several band/level constants the same way).
pub const LV_MODEL: i64 = 4;

/// A successful LOGIN response (spec §4.E, "LOGIN").
#[derive(Debug, Clone)]
pub struct LoginAck {
    pub session_id: i32,
    pub uid: i32,
    pub username: String,
}

/// A command the dispatcher needs written to the wire — currently only the
/// ROOMDATA auto-subscription issued right after LOGIN.
#[derive(Debug, Clone)]
pub struct OutboundCmd {
    pub fc_type: FcType,
    pub session_id: i32,
    pub n_to: i32,
    pub n_arg1: i32,
    pub n_arg2: i32,
    pub payload: Option<String>,
}

/// Per-type side effects against the registry, driven by decoded packets.
pub struct Dispatcher {
    registry: Arc<StdMutex<Registry>>,
    http: Arc<dyn HttpGet>,
    site_host: String,
    pub events: Arc<EventBus<Packet>>,
    outbound: mpsc::UnboundedSender<OutboundCmd>,
    login_ack: Option<oneshot::Sender<Result<LoginAck, i32>>>,
    session_id: i32,
    uid: i32,
    username: String,
    completed_models: bool,
    completed_tags: bool,
    models_loaded_emitted: bool,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<StdMutex<Registry>>,
        http: Arc<dyn HttpGet>,
        site_host: String,
        events: Arc<EventBus<Packet>>,
        outbound: mpsc::UnboundedSender<OutboundCmd>,
    ) -> Self {
        Dispatcher {
            registry,
            http,
            site_host,
            events,
            outbound,
            login_ack: None,
            session_id: 0,
            uid: 0,
            username: String::new(),
            completed_models: false,
            completed_tags: false,
            models_loaded_emitted: false,
        }
    }

    /// Reset per-connection state (completion flags, identity) for a fresh
    /// dial, and arm a one-shot to observe the next LOGIN response.
    pub fn begin_connection(&mut self) -> oneshot::Receiver<Result<LoginAck, i32>> {
        self.completed_models = false;
        self.completed_tags = false;
        self.models_loaded_emitted = false;
        let (tx, rx) = oneshot::channel();
        self.login_ack = Some(tx);
        rx
    }

    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    pub fn uid(&self) -> i32 {
        self.uid
    }

    /// Process one decoded packet: per-type side effects, then the
    /// type-named event (and `ANY`) (spec §4.E, "All types"). Boxed because
    /// EXTDATA indirection recurses back into `handle`.
    pub fn handle<'a>(&'a mut self, packet: Packet) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            match packet.fc_type {
                FcType::Login => self.handle_login(&packet),
                FcType::Details
                | FcType::RoomHelper
                | FcType::SessionState
                | FcType::AddFriend
                | FcType::AddIgnore
                | FcType::CMesg
                | FcType::PMesg
                | FcType::TxProfile
                | FcType::UsernameLookup
                | FcType::MyCamState
                | FcType::MyWebcam
                | FcType::JoinChan => self.handle_details_group(&packet),
                FcType::Tags => self.handle_tags(&packet),
                FcType::Bookmarks => self.handle_bookmarks(&packet),
                FcType::ExtData => self.handle_extdata(&packet).await,
                FcType::ManageList => self.handle_managelist(&packet),
                FcType::RoomData => self.handle_roomdata(&packet),
                _ => {}
            }
            let event_name = packet.fc_type.event_name();
            self.events.emit(&event_name, &packet);
        })
    }

    fn handle_login(&mut self, packet: &Packet) {
        if packet.n_arg1 != 0 {
            if let Some(tx) = self.login_ack.take() {
                let _ = tx.send(Err(packet.n_arg1));
            }
            return;
        }
        self.session_id = packet.n_to;
        self.uid = packet.n_arg2;
        self.username = packet.message.as_str().unwrap_or_default().to_string();
        if let Some(tx) = self.login_ack.take() {
            let _ = tx.send(Ok(LoginAck {
                session_id: self.session_id,
                uid: self.uid,
                username: self.username.clone(),
            }));
        }
        let _ = self.outbound.send(OutboundCmd {
            fc_type: FcType::RoomData,
            session_id: self.session_id,
            n_to: 0,
            n_arg1: 0,
            n_arg2: 0,
            payload: None,
        });
    }

    fn handle_details_group(&mut self, packet: &Packet) {
        if packet.fc_type == FcType::Details && packet.n_from == FcType::TokenInc.to_i32() {
            return;
        }
        if packet.fc_type == FcType::RoomHelper && packet.n_arg2 < 100 {
            return;
        }
        if packet.fc_type == FcType::JoinChan && packet.join_action() == JoinAction::Part {
            return;
        }

        let Some(mut state) = packet.message.as_session_state() else {
            return;
        };
        let mut uid = state.uid();
        let sid = state.sid();
        if uid == 0 && sid > 0 {
            uid = sid;
            state.set("uid", SessionValue::Int(uid));
        }
        if uid == 0 {
            uid = packet.about_model().unwrap_or(0);
        }
        if uid == 0 {
            return;
        }

        let lv = state.lv();
        let eligible = lv.map(|v| v == LV_MODEL).unwrap_or(true);
        if !eligible {
            return;
        }
        let auto_create = lv == Some(LV_MODEL);

        let mut registry = self.registry.lock().unwrap();
        registry.merge(uid, state, auto_create);
    }

    fn handle_tags(&mut self, packet: &Packet) {
        let Some(obj) = packet.message.as_json().and_then(|v| v.as_object()) else {
            return;
        };
        let mut registry = self.registry.lock().unwrap();
        apply_tags_map(&mut registry, obj);
    }

    fn handle_bookmarks(&mut self, packet: &Packet) {
        let Some(json) = packet.message.as_json() else {
            return;
        };
        let Some(list) = json.get("bookmarks").and_then(|v| v.as_array()) else {
            return;
        };
        let mut registry = self.registry.lock().unwrap();
        for entry in list {
            let Some(uid) = entry.get("uid").and_then(serde_json::Value::as_i64) else {
                continue;
            };
            if !registry.contains(uid) {
                continue;
            }
            if let SessionValue::Bag(state) = SessionValue::from(entry.clone()) {
                registry.merge(uid, state, false);
            }
        }
    }

    async fn handle_extdata(&mut self, packet: &Packet) {
        if packet.n_to != self.session_id {
            return;
        }
        if FcwOpt::from_i32(packet.n_arg2) != FcwOpt::RedisJson {
            return;
        }
        let Some(json) = packet.message.as_json() else {
            return;
        };
        let respkey = json.get("respkey").and_then(|v| v.as_str()).unwrap_or("");
        let opts = json.get("opts").and_then(|v| v.as_str()).unwrap_or("");
        let ty = json.get("type").and_then(serde_json::Value::as_i64).unwrap_or(0);
        let url = format!(
            "https://www.{}/php/FcwExtResp.php?respkey={respkey}&type={ty}&opts={opts}&serv={}",
            self.site_host, self.site_host
        );

        let body = match self.http.get(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "EXTDATA fetch failed");
                return;
            }
        };
        let Ok(fetched) = serde_json::from_str::<serde_json::Value>(&body) else {
            warn!("EXTDATA response did not parse as JSON");
            return;
        };
        let Some(msg) = json.get("msg") else {
            return;
        };
        let fc_type = FcType::from_i32(msg.get("type").and_then(serde_json::Value::as_i64).unwrap_or(0) as i32);
        let n_from = msg.get("from").and_then(serde_json::Value::as_i64).unwrap_or(0) as i32;
        let n_to = msg.get("to").and_then(serde_json::Value::as_i64).unwrap_or(0) as i32;
        let n_arg1 = msg.get("arg1").and_then(serde_json::Value::as_i64).unwrap_or(0) as i32;
        let n_arg2 = msg.get("arg2").and_then(serde_json::Value::as_i64).unwrap_or(0) as i32;
        let synthesized = Packet::new(fc_type, n_from, n_to, n_arg1, n_arg2, PacketPayload::Structured(fetched));
        self.handle(synthesized).await;
    }

    fn handle_managelist(&mut self, packet: &Packet) {
        if packet.n_arg2 <= 0 {
            return;
        }
        let Some(json) = packet.message.as_json() else {
            return;
        };
        let Some(rdata) = json.get("rdata") else {
            return;
        };
        let Some(kind) = json
            .get("kind")
            .and_then(|v| serde_json::from_value::<ListKind>(v.clone()).ok())
        else {
            return;
        };

        match kind {
            ListKind::Tags => {
                if let Some(obj) = rdata.as_object() {
                    let mut registry = self.registry.lock().unwrap();
                    apply_tags_map(&mut registry, obj);
                }
                self.completed_tags = true;
            }
            ListKind::Roommates | ListKind::Cams | ListKind::Friends | ListKind::Ignores => {
                let records = decode_list(rdata);
                let mut registry = self.registry.lock().unwrap();
                for record in &records {
                    let uid = record.uid();
                    if uid == 0 {
                        continue;
                    }
                    let auto_create = record.lv() == Some(LV_MODEL);
                    registry.merge(uid, record.clone(), auto_create);
                }
                drop(registry);
                if kind == ListKind::Cams {
                    self.completed_models = true;
                }
            }
        }

        if self.completed_models && self.completed_tags && !self.models_loaded_emitted {
            self.models_loaded_emitted = true;
            self.events.emit("CLIENT_MODELSLOADED", packet);
        }
    }

    fn handle_roomdata(&mut self, packet: &Packet) {
        let Some(json) = packet.message.as_json() else {
            return;
        };
        let mut registry = self.registry.lock().unwrap();
        match json {
            serde_json::Value::Array(arr) => {
                let mut it = arr.iter();
                while let (Some(uid_v), Some(count_v)) = (it.next(), it.next()) {
                    if let (Some(uid), Some(count)) = (uid_v.as_i64(), count_v.as_i64()) {
                        apply_room_count(&mut registry, uid, count);
                    }
                }
            }
            serde_json::Value::Object(map) => {
                for (uid_str, count_v) in map {
                    if let (Ok(uid), Some(count)) = (uid_str.parse::<i64>(), count_v.as_i64()) {
                        apply_room_count(&mut registry, uid, count);
                    }
                }
            }
            _ => {}
        }
    }
}

fn apply_tags_map(registry: &mut Registry, obj: &serde_json::Map<String, serde_json::Value>) {
    for (uid_str, tags_val) in obj {
        let Ok(uid) = uid_str.parse::<i64>() else {
            continue;
        };
        let Some(arr) = tags_val.as_array() else {
            continue;
        };
        let tags: Vec<String> = arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        registry.merge_tags(uid, &tags);
    }
}

fn apply_room_count(registry: &mut Registry, uid: i64, count: i64) {
    let Some(model) = registry.get(uid) else {
        debug!(uid, "ROOMDATA for unknown model, skipping");
        return;
    };
    let sid = model.best_session().sid();
    let mut m = ModelSessionState::new();
    m.set("rc", SessionValue::Int(count));
    let mut state = ModelSessionState::new();
    state.set("sid", SessionValue::Int(sid));
    state.set("m", SessionValue::Bag(m));
    registry.merge(uid, state, false);
}

//! Model registry and the "best session" merge algorithm (spec §4.C).
//!
//! The registry itself carries no internal locking; callers share it as
//! `Arc<Mutex<Registry>>` and hold the lock for the full duration of a
//! merge plus its event emission, which is the coarse atomicity guarantee
//! spec §5 asks for in a multi-threaded host.

use fc_protocol::{ModelSessionState, SessionValue};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;

use crate::events::EventBus;

/// Numeric `vs` value denoting the synthetic offline session (spec §3, §9
/// "open question — session id 0"). The wire's real video-state enumeration
/// is an external contract this crate doesn't otherwise need to model.
pub const VS_OFFLINE: i64 = 0;

/// `(model, propertyName, previousValue, newValue)` (spec §4.C, "Change events").
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub uid: i64,
    pub property: String,
    pub previous: Option<SessionValue>,
    pub next: Option<SessionValue>,
}

type Predicate = Box<dyn Fn(&ModelSessionState) -> bool + Send + Sync>;
type WhenCallback = Box<dyn Fn(&Model) + Send + Sync>;

/// A `(predicate, onTrue, onFalseAfterTrue?)` binding (spec §4.C, §9 "cyclic
/// 'when' callbacks"). Edge-triggered: `onTrue` fires only on a false→true
/// transition, tracked per model so the same binding can be shared globally.
struct WhenBinding {
    id: u64,
    predicate: Predicate,
    on_true: WhenCallback,
    on_false_after_true: Option<WhenCallback>,
    last: StdMutex<HashMap<i64, bool>>,
}

impl WhenBinding {
    fn evaluate(&self, model: &Model) {
        let now = (self.predicate)(model.best_session());
        let mut last = self.last.lock().unwrap();
        let was = last.get(&model.uid).copied().unwrap_or(false);
        if !was && now {
            (self.on_true)(model);
        } else if was && !now {
            if let Some(cb) = &self.on_false_after_true {
                cb(model);
            }
        }
        last.insert(model.uid, now);
    }
}

/// A broadcaster and its session table (spec §3, `Model`).
pub struct Model {
    pub uid: i64,
    sessions: HashMap<i64, ModelSessionState>,
    best_session_id: i64,
    tags: BTreeSet<String>,
    /// Listeners scoped to this model only.
    pub events: EventBus<ChangeEvent>,
    when: Vec<Arc<WhenBinding>>,
}

impl Model {
    fn new(uid: i64) -> Self {
        let mut offline = ModelSessionState::new();
        offline.set("sid", SessionValue::Int(0));
        offline.set("uid", SessionValue::Int(uid));
        offline.set("vs", SessionValue::Int(VS_OFFLINE));
        let mut sessions = HashMap::new();
        sessions.insert(0, offline);
        Model {
            uid,
            sessions,
            best_session_id: 0,
            tags: BTreeSet::new(),
            events: EventBus::new(),
            when: Vec::new(),
        }
    }

    pub fn best_session(&self) -> &ModelSessionState {
        self.sessions
            .get(&self.best_session_id)
            .expect("best_session_id always indexes a live session")
    }

    pub fn session(&self, sid: i64) -> Option<&ModelSessionState> {
        self.sessions.get(&sid)
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// `(isOnline, camScore, sid)` lexicographic tuple (spec §4.C,
    /// "Best-session selection"). A present-but-equal-to-offline `vs` is not
    /// online; an absent `vs` ("unknown") is treated as online, since the
    /// invariant in spec §3 explicitly distinguishes absent from offline.
    fn session_tuple(session: &ModelSessionState) -> (bool, i64, i64) {
        let is_online = session.vs().map(|v| v != VS_OFFLINE).unwrap_or(true);
        (is_online, session.camscore(), session.sid())
    }

    fn recompute_best(&mut self) {
        let mut best_sid = self.best_session_id;
        let mut best_tuple = self
            .sessions
            .get(&best_sid)
            .map(Self::session_tuple)
            .unwrap_or((false, 0, 0));
        for (&sid, session) in &self.sessions {
            let tuple = Self::session_tuple(session);
            if tuple > best_tuple {
                best_tuple = tuple;
                best_sid = sid;
            }
        }
        self.best_session_id = best_sid;
    }

    /// Attach a per-model "when" binding.
    pub fn when(
        &mut self,
        id: u64,
        predicate: impl Fn(&ModelSessionState) -> bool + Send + Sync + 'static,
        on_true: impl Fn(&Model) + Send + Sync + 'static,
        on_false_after_true: Option<Box<dyn Fn(&Model) + Send + Sync>>,
    ) {
        self.when.push(Arc::new(WhenBinding {
            id,
            predicate: Box::new(predicate),
            on_true: Box::new(on_true),
            on_false_after_true,
            last: StdMutex::new(HashMap::new()),
        }));
    }

    pub fn remove_when(&mut self, id: u64) {
        self.when.retain(|b| b.id != id);
    }
}

fn diff_properties(
    prev: &ModelSessionState,
    next: &ModelSessionState,
) -> Vec<(String, Option<SessionValue>, Option<SessionValue>)> {
    let mut keys: BTreeSet<&String> = prev.keys().collect();
    keys.extend(next.keys());
    keys.into_iter()
        .filter_map(|key| {
            let p = prev.get(key).cloned();
            let n = next.get(key).cloned();
            if p != n { Some((key.clone(), p, n)) } else { None }
        })
        .collect()
}

/// The process-scoped `uid -> Model` map (spec §3, `Registry`).
pub struct Registry {
    models: HashMap<i64, Model>,
    /// Process-wide emitter for "any model" change events.
    pub global_events: EventBus<ChangeEvent>,
    global_when: Vec<Arc<WhenBinding>>,
    next_when_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Registry {
            models: HashMap::new(),
            global_events: EventBus::new(),
            global_when: Vec::new(),
            next_when_id: AtomicU64::new(0),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uid: i64) -> Option<&Model> {
        self.models.get(&uid)
    }

    pub fn contains(&self, uid: i64) -> bool {
        self.models.contains_key(&uid)
    }

    pub fn get_or_create(&mut self, uid: i64) -> &mut Model {
        self.models.entry(uid).or_insert_with(|| Model::new(uid))
    }

    pub fn get_mut(&mut self, uid: i64) -> Option<&mut Model> {
        self.models.get_mut(&uid)
    }

    /// Clears every model. Called once the count of logged-in connected
    /// clients reaches zero (spec §3, §5 "Shared resources").
    pub fn reset(&mut self) {
        self.models.clear();
    }

    /// `Merge(model, incoming)` (spec §4.C steps 1-6). `auto_create`
    /// governs whether an unknown `uid` gets a fresh `Model` or is silently
    /// dropped — the dispatcher decides this per fcType (spec §4.E).
    pub fn merge(&mut self, uid: i64, mut incoming: ModelSessionState, auto_create: bool) {
        if incoming.uid() == 0 && incoming.sid() > 0 {
            incoming.set("uid", SessionValue::Int(incoming.sid()));
        }

        if !auto_create && !self.models.contains_key(&uid) {
            return;
        }
        let model = self.models.entry(uid).or_insert_with(|| Model::new(uid));

        let prev_best = model.best_session().clone();
        let sid = incoming.sid();
        let session = model.sessions.entry(sid).or_default();
        session.overlay(&incoming);
        model.recompute_best();
        let new_best = model.best_session().clone();

        let changes = diff_properties(&prev_best, &new_best);
        for (property, previous, next) in changes {
            let event = ChangeEvent { uid, property: property.clone(), previous, next };
            model.events.emit(&property, &event);
            self.global_events.emit(&property, &event);
        }

        for binding in model.when.clone() {
            binding.evaluate(model);
        }
        for binding in &self.global_when {
            binding.evaluate(model);
        }
    }

    /// `MergeTags(model, tags[])` (spec §4.C, "Tag merge"). Does not
    /// auto-create — callers skip unknown models per spec §4.E's TAGS
    /// handler.
    pub fn merge_tags(&mut self, uid: i64, tags: &[String]) {
        let Some(model) = self.models.get_mut(&uid) else {
            return;
        };
        let mut changed = false;
        for tag in tags {
            if model.tags.insert(tag.clone()) {
                changed = true;
            }
        }
        if changed {
            let joined = model.tags.iter().cloned().collect::<Vec<_>>().join(",");
            let event = ChangeEvent {
                uid,
                property: "tags".to_string(),
                previous: None,
                next: Some(SessionValue::Str(joined)),
            };
            model.events.emit("tags", &event);
            self.global_events.emit("tags", &event);
        }
    }

    /// Attach a global "when" binding, evaluated against every model that
    /// merges.
    pub fn when_global(
        &mut self,
        predicate: impl Fn(&ModelSessionState) -> bool + Send + Sync + 'static,
        on_true: impl Fn(&Model) + Send + Sync + 'static,
        on_false_after_true: Option<Box<dyn Fn(&Model) + Send + Sync>>,
    ) -> u64 {
        let id = self.next_when_id.fetch_add(1, Ordering::Relaxed);
        self.global_when.push(Arc::new(WhenBinding {
            id,
            predicate: Box::new(predicate),
            on_true: Box::new(on_true),
            on_false_after_true,
            last: StdMutex::new(HashMap::new()),
        }));
        id
    }

    pub fn remove_when_global(&mut self, id: u64) {
        self.global_when.retain(|b| b.id != id);
    }

    pub fn next_when_id(&self) -> u64 {
        self.next_when_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// A `Registry` shared across `Client` instances, with the refcount-based
/// reset semantics spec §3/§5 describe: the registry is only cleared when
/// the count of logged-in connected clients reaches zero.
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<StdMutex<Registry>>,
    logged_in: Arc<AtomicU64>,
}

impl Default for SharedRegistry {
    fn default() -> Self {
        SharedRegistry {
            inner: Arc::new(StdMutex::new(Registry::new())),
            logged_in: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> Arc<StdMutex<Registry>> {
        self.inner.clone()
    }

    /// Called when a client completes a login handshake.
    pub fn client_logged_in(&self) {
        self.logged_in.fetch_add(1, Ordering::SeqCst);
    }

    /// Called when a logged-in client disconnects. Resets the registry if
    /// this was the last one.
    pub fn client_logged_out(&self) {
        if self.logged_in.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.lock().unwrap().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_protocol::SessionValue;

    fn session(sid: i64, vs: Option<i64>, camscore: i64) -> ModelSessionState {
        let mut s = ModelSessionState::new();
        s.set("sid", SessionValue::Int(sid));
        s.set("uid", SessionValue::Int(100));
        if let Some(v) = vs {
            s.set("vs", SessionValue::Int(v));
        }
        s.set("camscore", SessionValue::Int(camscore));
        s
    }

    #[test]
    fn merge_priority_picks_highest_camscore_then_sid() {
        let mut reg = Registry::new();
        reg.merge(100, session(1, Some(1), 50), true);
        reg.merge(100, session(2, Some(1), 49), true);
        assert_eq!(reg.get(100).unwrap().best_session().sid(), 1);

        let mut bump = ModelSessionState::new();
        bump.set("sid", SessionValue::Int(2));
        bump.set("camscore", SessionValue::Int(60));
        reg.merge(100, bump, true);
        assert_eq!(reg.get(100).unwrap().best_session().sid(), 2);
    }

    #[test]
    fn merge_emits_exactly_one_change_event_per_property() {
        let mut reg = Registry::new();
        reg.merge(100, session(1, Some(1), 50), true);

        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_ref = count.clone();
        reg.global_events.on("camscore", move |_| {
            count_ref.fetch_add(1, Ordering::SeqCst);
        });

        let mut bump = ModelSessionState::new();
        bump.set("sid", SessionValue::Int(1));
        bump.set("camscore", SessionValue::Int(75));
        reg.merge(100, bump, true);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tag_union_fires_one_event_per_merge_call_with_new_tags() {
        let mut reg = Registry::new();
        reg.merge(100, session(1, Some(1), 50), true);

        let fires = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fires_ref = fires.clone();
        reg.global_events.on("tags", move |_| {
            fires_ref.fetch_add(1, Ordering::SeqCst);
        });

        reg.merge_tags(100, &["a".to_string(), "b".to_string()]);
        reg.merge_tags(100, &["b".to_string(), "c".to_string()]);

        assert_eq!(fires.load(Ordering::SeqCst), 2);
        let tags = reg.get(100).unwrap().tags();
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn merge_does_not_auto_create_when_disallowed() {
        let mut reg = Registry::new();
        reg.merge(999, session(1, Some(1), 10), false);
        assert!(reg.get(999).is_none());
    }

    #[test]
    fn best_session_never_beaten_by_a_smaller_tuple() {
        let mut reg = Registry::new();
        reg.merge(100, session(1, Some(1), 10), true);
        reg.merge(100, session(2, None, 0), true);
        // session 2 has unknown vs (treated online) but camscore 0 < 10; sid=1 still wins.
        assert_eq!(reg.get(100).unwrap().best_session().sid(), 1);
    }
}

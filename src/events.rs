//! Keyed event bus with deferred listener mutation during emission.
//!
//! Used both for the client-level packet events (keyed by `FcType` event
//! name, plus the `ANY` wildcard) and for the registry's per-model,
//! per-property change events (spec §4.C, §9 "event emission over cyclic
//! observer graphs").

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

pub type ListenerId = u64;

type Listener<P> = Box<dyn Fn(&P) + Send + Sync>;

enum Mutation<P> {
    Add(String, ListenerId, Listener<P>),
    Remove(String, ListenerId),
}

/// A registry of named listeners. `emit` delivers synchronously to every
/// listener registered under that exact name; registering under `"ANY"`
/// receives every emission regardless of name.
///
/// Listener add/remove calls made from inside a listener callback (reentrant
/// emission) are queued and applied once the outermost `emit` completes,
/// so a listener can safely unsubscribe itself or others mid-dispatch.
pub struct EventBus<P> {
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener<P>)>>>,
    pending: Mutex<Vec<Mutation<P>>>,
    depth: AtomicU64,
    next_id: AtomicU64,
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        EventBus {
            listeners: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            depth: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<P> EventBus<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &self,
        name: impl Into<String>,
        listener: impl Fn(&P) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        let boxed: Listener<P> = Box::new(listener);
        if self.depth.load(Ordering::Acquire) > 0 {
            self.pending.lock().unwrap().push(Mutation::Add(name, id, boxed));
        } else {
            self.listeners.lock().unwrap().entry(name).or_default().push((id, boxed));
        }
        id
    }

    pub fn off(&self, name: impl Into<String>, id: ListenerId) {
        let name = name.into();
        if self.depth.load(Ordering::Acquire) > 0 {
            self.pending.lock().unwrap().push(Mutation::Remove(name, id));
        } else if let Some(list) = self.listeners.lock().unwrap().get_mut(&name) {
            list.retain(|(existing, _)| *existing != id);
        }
    }

    /// Deliver `payload` to every listener registered under `name`, then to
    /// every listener registered under `"ANY"`.
    pub fn emit(&self, name: &str, payload: &P) {
        self.depth.fetch_add(1, Ordering::AcqRel);
        self.deliver(name, payload);
        if name != "ANY" {
            self.deliver("ANY", payload);
        }
        if self.depth.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.flush_pending();
        }
    }

    fn deliver(&self, name: &str, payload: &P) {
        let listeners = self.listeners.lock().unwrap();
        if let Some(list) = listeners.get(name) {
            for (_, f) in list {
                f(payload);
            }
        }
    }

    fn flush_pending(&self) {
        let mutations: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
        if mutations.is_empty() {
            return;
        }
        let mut listeners = self.listeners.lock().unwrap();
        for mutation in mutations {
            match mutation {
                Mutation::Add(name, id, listener) => {
                    listeners.entry(name).or_default().push((id, listener));
                }
                Mutation::Remove(name, id) => {
                    if let Some(list) = listeners.get_mut(&name) {
                        list.retain(|(existing, _)| *existing != id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn delivers_named_then_any() {
        let bus: EventBus<i32> = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        bus.on("vs", move |_| o1.lock().unwrap().push("vs"));
        let o2 = order.clone();
        bus.on("ANY", move |_| o2.lock().unwrap().push("any"));

        bus.emit("vs", &1);
        assert_eq!(*order.lock().unwrap(), vec!["vs", "any"]);
    }

    #[test]
    fn listener_can_unsubscribe_itself_during_emission() {
        let bus: EventBus<i32> = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let bus = Arc::new(bus);
        let bus_ref = bus.clone();
        let count_ref = count.clone();
        let id_cell: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let id_cell_ref = id_cell.clone();
        let id = bus.on("x", move |_| {
            count_ref.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *id_cell_ref.lock().unwrap() {
                bus_ref.off("x", id);
            }
        });
        *id_cell.lock().unwrap() = Some(id);

        bus.emit("x", &1);
        bus.emit("x", &1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

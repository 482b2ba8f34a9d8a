use std::collections::HashMap;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::FutureExt;

use pypecdp_types::{CdpJsonEventMessage, MethodId};

use crate::cdp::browser_protocol::target::{SessionId, TargetId};
use crate::error::{CdpError, Result};
use crate::tab::TabInner;

/// Identifies a registered event listener so it can be removed again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// A persistent event callback. Each invocation is spawned as its own task,
/// the reader never awaits it.
pub(crate) type EventHandlerFn =
    Arc<dyn Fn(Arc<CdpJsonEventMessage>) -> BoxFuture<'static, ()> + Send + Sync>;

pub(crate) type EventPredicate = Box<dyn Fn(&CdpJsonEventMessage) -> bool + Send>;

struct Listener {
    id: ListenerId,
    f: EventHandlerFn,
}

/// A one-shot completion slot waiting for a matching event.
struct Waiter {
    tx: oneshot::Sender<Result<CdpJsonEventMessage>>,
    predicate: Option<EventPredicate>,
}

/// Represents an attached session within the cdp: its dispatch table, its
/// pending one-shot waiters and the tab it is bound to. The browser-level
/// session has no tab.
pub(crate) struct Session {
    id: SessionId,
    target_id: Option<TargetId>,
    tab: Option<Arc<TabInner>>,
    listeners: HashMap<MethodId, Vec<Listener>>,
    waiters: HashMap<MethodId, Vec<Waiter>>,
}

impl Session {
    pub fn browser() -> Self {
        Self {
            id: SessionId::browser(),
            target_id: None,
            tab: None,
            listeners: Default::default(),
            waiters: Default::default(),
        }
    }

    pub fn with_tab(id: SessionId, target_id: TargetId, tab: Arc<TabInner>) -> Self {
        Self {
            id,
            target_id: Some(target_id),
            tab: Some(tab),
            listeners: Default::default(),
            waiters: Default::default(),
        }
    }

    pub fn attached(id: SessionId, target_id: TargetId) -> Self {
        Self {
            id,
            target_id: Some(target_id),
            tab: None,
            listeners: Default::default(),
            waiters: Default::default(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.id
    }

    pub fn target_id(&self) -> Option<&TargetId> {
        self.target_id.as_ref()
    }

    pub fn tab(&self) -> Option<&Arc<TabInner>> {
        self.tab.as_ref()
    }

    pub fn add_listener(&mut self, method: MethodId, id: ListenerId, f: EventHandlerFn) {
        self.listeners
            .entry(method)
            .or_default()
            .push(Listener { id, f });
    }

    pub fn remove_listener(&mut self, method: &str, id: ListenerId) {
        if let Some(list) = self.listeners.get_mut(method) {
            list.retain(|l| l.id != id);
            if list.is_empty() {
                self.listeners.remove(method);
            }
        }
    }

    pub fn add_waiter(
        &mut self,
        method: MethodId,
        predicate: Option<EventPredicate>,
        tx: oneshot::Sender<Result<CdpJsonEventMessage>>,
    ) {
        self.waiters
            .entry(method)
            .or_default()
            .push(Waiter { tx, predicate });
    }

    /// Fan the event out to listeners and resolve matching waiters.
    ///
    /// Listeners are scheduled as independent tasks; a panicking listener is
    /// logged and contained there. Waiters resolve in registration order
    /// among those whose predicate matches.
    pub fn dispatch(&mut self, ev: &Arc<CdpJsonEventMessage>) {
        if let Some(listeners) = self.listeners.get(ev.method.as_ref()) {
            for listener in listeners {
                let f = Arc::clone(&listener.f);
                let ev = Arc::clone(ev);
                let method = ev.method.clone();
                tokio::spawn(async move {
                    let fut = std::panic::AssertUnwindSafe(f(ev)).catch_unwind();
                    if fut.await.is_err() {
                        tracing::error!(%method, "event listener panicked");
                    }
                });
            }
        }

        if let Some(list) = self.waiters.get_mut(ev.method.as_ref()) {
            let mut keep = Vec::with_capacity(list.len());
            for waiter in list.drain(..) {
                if waiter.tx.is_canceled() {
                    continue;
                }
                let matched = waiter.predicate.as_ref().map_or(true, |p| p(ev));
                if matched {
                    let _ = waiter.tx.send(Ok((**ev).clone()));
                } else {
                    keep.push(waiter);
                }
            }
            *list = keep;
        }
    }

    /// Complete every pending waiter with the given error, exactly once
    /// each. Used on detach and on transport loss.
    pub fn fail_all(&mut self, err: impl Fn() -> CdpError) {
        for (_, list) in self.waiters.drain() {
            for waiter in list {
                let _ = waiter.tx.send(Err(err()));
            }
        }
    }

    /// Drop waiters whose receiver side has been cancelled, e.g. by a
    /// timeout firing on the awaiting side.
    pub fn prune_waiters(&mut self) {
        self.waiters.retain(|_, list| {
            list.retain(|w| !w.tx.is_canceled());
            !list.is_empty()
        });
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use fnv::FnvHashMap;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures::channel::oneshot;
use futures::stream::Fuse;
use futures::StreamExt;
use tokio::time::Instant;

use pypecdp_types::{CallId, CdpJsonEventMessage, Command, CommandResponse, Message, MethodId, Response};

use crate::cdp::browser_protocol::page::EventFrameNavigated;
use crate::cdp::browser_protocol::target::{
    EventAttachedToTarget, EventDetachedFromTarget, EventTargetCreated, EventTargetDestroyed,
    SessionId, TargetId, TargetInfo,
};
use crate::conn::Connection;
use crate::error::{CdpError, Result};
use crate::handler::cmd::CommandMessage;
use crate::handler::commandfuture::CommandFuture;
use crate::handler::job::PeriodicJob;
use crate::handler::session::{EventHandlerFn, EventPredicate, ListenerId, Session};
use crate::process::SupervisorMessage;
use crate::tab::{Tab, TabInner};

pub(crate) mod cmd;
pub(crate) mod commandfuture;
pub(crate) mod job;
pub(crate) mod session;

/// Standard timeout in MS for a single command round trip.
pub const REQUEST_TIMEOUT: u64 = 30_000;

/// How often deadline-expired command slots and cancelled waiters are
/// reclaimed.
const EVICTION_INTERVAL: Duration = Duration::from_secs(1);

/// A command slot parked until its response frame arrives.
struct PendingCommand {
    sender: oneshot::Sender<Result<Response>>,
    session: SessionId,
    deadline: Instant,
}

/// The session multiplexer.
///
/// Owns the transport and every shared table: outstanding command slots,
/// the session registry with its dispatch and waiter tables, and the known
/// targets. All mutation happens on this single task; the public handles
/// talk to it exclusively through [`HandlerMessage`]s.
///
/// The future resolves once the browser is shut down or the transport is
/// gone; every outstanding slot is completed exactly once before that.
#[must_use = "futures do nothing unless polled"]
pub(crate) struct Handler {
    /// The pipe connection to the browser, `None` once closed.
    conn: Option<Connection>,
    from_handles: Fuse<UnboundedReceiver<HandlerMessage>>,
    /// Commands that are being processed and await a response.
    pending_commands: FnvHashMap<CallId, PendingCommand>,
    /// Keeps track of all current active sessions, keyed by session id.
    /// The browser-level session lives under the empty id.
    sessions: HashMap<SessionId, Session>,
    /// The created targets as reported by target discovery.
    targets: HashMap<TargetId, TargetInfo>,
    /// Freshly attached page targets travel to the browser through here.
    tabs: UnboundedSender<Tab>,
    supervisor: UnboundedSender<SupervisorMessage>,
    /// Handle minted into every new tab.
    handle: HandlerHandle,
    evict_command_timeout: PeriodicJob,
    request_timeout: Duration,
}

impl Handler {
    pub(crate) fn new(
        conn: Connection,
        rx: UnboundedReceiver<HandlerMessage>,
        tabs: UnboundedSender<Tab>,
        supervisor: UnboundedSender<SupervisorMessage>,
        handle: HandlerHandle,
        request_timeout: Duration,
    ) -> Self {
        let mut sessions = HashMap::new();
        sessions.insert(SessionId::browser(), Session::browser());
        Self {
            conn: Some(conn),
            from_handles: rx.fuse(),
            pending_commands: Default::default(),
            sessions,
            targets: Default::default(),
            tabs,
            supervisor,
            handle,
            evict_command_timeout: PeriodicJob::new(EVICTION_INTERVAL),
            request_timeout,
        }
    }

    fn submit_command(&mut self, msg: CommandMessage) {
        if !msg.session_id.is_browser() && !self.sessions.contains_key(&msg.session_id) {
            let _ = msg.sender.send(Err(CdpError::DetachedTab));
            return;
        }
        let Some(conn) = self.conn.as_mut() else {
            let _ = msg.sender.send(Err(CdpError::ConnectionLost));
            return;
        };
        match conn.submit_command(msg.method, Some(msg.session_id.clone()), msg.params) {
            Ok(call_id) => {
                self.pending_commands.insert(
                    call_id,
                    PendingCommand {
                        sender: msg.sender,
                        session: msg.session_id,
                        deadline: msg.deadline,
                    },
                );
            }
            Err(err) => {
                let _ = msg.sender.send(Err(err.into()));
            }
        }
    }

    /// Issue a command the handler itself needs, discarding the response.
    fn submit_internal<T: Command>(&mut self, cmd: T, session: SessionId) {
        let (tx, _rx) = oneshot::channel();
        let deadline = Instant::now() + self.request_timeout;
        match CommandMessage::with_session(cmd, tx, session, deadline) {
            Ok(msg) => self.submit_command(msg),
            Err(err) => tracing::error!(%err, "failed to encode internal command"),
        }
    }

    fn on_handler_message(&mut self, msg: HandlerMessage) {
        match msg {
            HandlerMessage::Command(cmd) => self.submit_command(cmd),
            HandlerMessage::AddListener {
                session,
                method,
                id,
                handler,
            } => match self.sessions.get_mut(&session) {
                Some(entry) => entry.add_listener(method, id, handler),
                None => tracing::warn!(%session, "listener registered on unknown session"),
            },
            HandlerMessage::RemoveListener {
                session,
                method,
                id,
            } => {
                if let Some(entry) = self.sessions.get_mut(&session) {
                    entry.remove_listener(&method, id);
                }
            }
            HandlerMessage::WaitForEvent {
                session,
                method,
                predicate,
                tx,
            } => match self.sessions.get_mut(&session) {
                Some(entry) => entry.add_waiter(method, predicate, tx),
                None => {
                    let _ = tx.send(Err(CdpError::DetachedTab));
                }
            },
            HandlerMessage::Shutdown => unreachable!("handled in poll"),
        }
    }

    fn on_response(&mut self, resp: Response) {
        match self.pending_commands.remove(&resp.id) {
            Some(pending) => {
                // A dropped receiver means the call was cancelled; the
                // response is dropped silently.
                let _ = pending.sender.send(Ok(resp));
            }
            None => {
                tracing::debug!(id = %resp.id, "dropping response for unknown call id");
            }
        }
    }

    fn on_event(&mut self, event: CdpJsonEventMessage) {
        let session_id = event
            .session_id
            .clone()
            .map(SessionId::from)
            .unwrap_or_else(SessionId::browser);

        if !self.sessions.contains_key(&session_id) {
            tracing::warn!(session = %session_id, method = %event.method, "dropping event for unknown session");
            return;
        }

        if session_id.is_browser() {
            self.on_browser_event(&event);
        } else if event.method.as_ref() == EventFrameNavigated::IDENTIFIER {
            self.on_frame_navigated(&session_id, &event);
        }

        let event = Arc::new(event);
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.dispatch(&event);
        }
    }

    /// Target lifecycle handling on the browser session.
    fn on_browser_event(&mut self, event: &CdpJsonEventMessage) {
        match event.method.as_ref() {
            EventTargetCreated::IDENTIFIER => {
                if let Ok(ev) = serde_json::from_value::<EventTargetCreated>(event.params.clone())
                {
                    self.targets
                        .insert(ev.target_info.target_id.clone(), ev.target_info);
                }
            }
            EventAttachedToTarget::IDENTIFIER => {
                match serde_json::from_value::<EventAttachedToTarget>(event.params.clone()) {
                    Ok(ev) => self.on_attached_to_target(ev),
                    Err(err) => tracing::warn!(%err, "malformed attachedToTarget event"),
                }
            }
            EventDetachedFromTarget::IDENTIFIER => {
                if let Ok(ev) =
                    serde_json::from_value::<EventDetachedFromTarget>(event.params.clone())
                {
                    self.detach_session(&ev.session_id);
                }
            }
            EventTargetDestroyed::IDENTIFIER => {
                if let Ok(ev) =
                    serde_json::from_value::<EventTargetDestroyed>(event.params.clone())
                {
                    self.targets.remove(&ev.target_id);
                    let session = self
                        .sessions
                        .values()
                        .find(|s| s.target_id() == Some(&ev.target_id))
                        .map(|s| s.session_id().clone());
                    if let Some(session_id) = session {
                        self.detach_session(&session_id);
                    }
                }
            }
            _ => {}
        }
    }

    fn on_attached_to_target(&mut self, ev: EventAttachedToTarget) {
        let session_id = ev.session_id;
        let target_id = ev.target_info.target_id.clone();
        tracing::debug!(%session_id, target = %target_id, kind = %ev.target_info.r#type, "target attached");

        if !ev.target_info.is_page() {
            // Workers and friends get a session entry so their events are
            // not flagged as unknown, but no tab.
            self.sessions
                .insert(session_id.clone(), Session::attached(session_id, target_id));
            return;
        }

        let tab = Arc::new(TabInner::new(
            target_id.clone(),
            session_id.clone(),
            ev.target_info.url.clone(),
            self.handle.clone(),
        ));
        self.sessions.insert(
            session_id.clone(),
            Session::with_tab(session_id.clone(), target_id, Arc::clone(&tab)),
        );

        // Frame navigation tracking and console/evaluate events should flow
        // without the caller having to enable anything.
        self.submit_internal(
            crate::cdp::browser_protocol::page::EnableParams::default(),
            session_id.clone(),
        );
        self.submit_internal(
            crate::cdp::js_protocol::runtime::EnableParams::default(),
            session_id,
        );

        let _ = self.tabs.unbounded_send(Tab::new(tab));
    }

    /// Tear the session down: the tab flips to detached, then every pending
    /// command and waiter on it resolves with [`CdpError::DetachedTab`].
    fn detach_session(&mut self, session_id: &SessionId) {
        if let Some(mut session) = self.sessions.remove(session_id) {
            tracing::debug!(session = %session_id, "session detached");
            if let Some(tab) = session.tab() {
                tab.mark_detached();
            }
            session.fail_all(|| CdpError::DetachedTab);
        }
        let stale: Vec<CallId> = self
            .pending_commands
            .iter()
            .filter(|(_, pending)| &pending.session == session_id)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(pending) = self.pending_commands.remove(&id) {
                let _ = pending.sender.send(Err(CdpError::DetachedTab));
            }
        }
    }

    fn on_frame_navigated(&mut self, session_id: &SessionId, event: &CdpJsonEventMessage) {
        let Ok(ev) = serde_json::from_value::<EventFrameNavigated>(event.params.clone()) else {
            return;
        };
        // Only a root frame navigation invalidates the cached document.
        if ev.frame.parent_id.is_some() {
            return;
        }
        if let Some(tab) = self.sessions.get(session_id).and_then(|s| s.tab()) {
            tab.frame_navigated(ev.frame);
        }
    }

    /// Complete everything in flight with [`CdpError::ConnectionLost`] and
    /// drop the transport. Each slot resolves exactly once.
    fn transport_closed(&mut self) {
        self.conn = None;
        for (_, pending) in self.pending_commands.drain() {
            let _ = pending.sender.send(Err(CdpError::ConnectionLost));
        }
        for (_, mut session) in self.sessions.drain() {
            session.fail_all(|| CdpError::ConnectionLost);
        }
        let _ = self
            .supervisor
            .unbounded_send(SupervisorMessage::TransportClosed);
    }

    fn evict_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<CallId> = self
            .pending_commands
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(pending) = self.pending_commands.remove(&id) {
                tracing::debug!(%id, "evicting timed out command slot");
                let _ = pending.sender.send(Err(CdpError::Timeout));
            }
        }
        for session in self.sessions.values_mut() {
            session.prune_waiters();
        }
    }
}

impl Future for Handler {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let pin = self.get_mut();

        while let Poll::Ready(msg) = pin.from_handles.poll_next_unpin(cx) {
            match msg {
                Some(HandlerMessage::Shutdown) | None => {
                    pin.transport_closed();
                    return Poll::Ready(());
                }
                Some(msg) => pin.on_handler_message(msg),
            }
        }

        if pin.evict_command_timeout.is_ready(cx) {
            pin.evict_expired();
        }

        while let Some(conn) = pin.conn.as_mut() {
            match conn.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(Message::Response(resp)))) => pin.on_response(resp),
                Poll::Ready(Some(Ok(Message::Event(event)))) => pin.on_event(event),
                Poll::Ready(Some(Err(err))) => {
                    tracing::error!(%err, "transport failed");
                    pin.transport_closed();
                    return Poll::Ready(());
                }
                Poll::Ready(None) => {
                    pin.transport_closed();
                    return Poll::Ready(());
                }
                Poll::Pending => break,
            }
        }

        Poll::Pending
    }
}

/// Messages used internally to communicate with the handler, which is
/// executed in the background.
pub(crate) enum HandlerMessage {
    Command(CommandMessage),
    AddListener {
        session: SessionId,
        method: MethodId,
        id: ListenerId,
        handler: EventHandlerFn,
    },
    RemoveListener {
        session: SessionId,
        method: MethodId,
        id: ListenerId,
    },
    WaitForEvent {
        session: SessionId,
        method: MethodId,
        predicate: Option<EventPredicate>,
        tx: oneshot::Sender<Result<CdpJsonEventMessage>>,
    },
    Shutdown,
}

/// Cheap cloneable channel to the handler, held by the browser and every
/// tab.
#[derive(Clone)]
pub(crate) struct HandlerHandle {
    tx: UnboundedSender<HandlerMessage>,
    next_listener_id: Arc<AtomicU64>,
    request_timeout: Duration,
}

impl std::fmt::Debug for HandlerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerHandle").finish_non_exhaustive()
    }
}

impl HandlerHandle {
    pub(crate) fn new(tx: UnboundedSender<HandlerMessage>, request_timeout: Duration) -> Self {
        Self {
            tx,
            next_listener_id: Arc::new(AtomicU64::new(0)),
            request_timeout,
        }
    }

    pub(crate) fn send(&self, msg: HandlerMessage) -> Result<()> {
        self.tx
            .unbounded_send(msg)
            .map_err(|_| CdpError::ConnectionLost)
    }

    /// Park a slot for the command and return the future resolving with its
    /// typed response.
    pub(crate) fn command_future<T: Command>(
        &self,
        cmd: T,
        session: SessionId,
        timeout: Duration,
    ) -> Result<CommandFuture<T>> {
        let (tx, rx) = oneshot::channel();
        let method = cmd.identifier();
        let deadline = Instant::now() + timeout;
        let msg = CommandMessage::with_session(cmd, tx, session, deadline)?;
        self.send(HandlerMessage::Command(msg))?;
        Ok(CommandFuture::new(
            rx,
            tokio::time::sleep_until(deadline),
            method,
        ))
    }

    pub(crate) async fn execute<T: Command>(
        &self,
        cmd: T,
        session: SessionId,
    ) -> Result<CommandResponse<T::Response>> {
        self.execute_with_timeout(cmd, session, self.request_timeout)
            .await
    }

    pub(crate) async fn execute_with_timeout<T: Command>(
        &self,
        cmd: T,
        session: SessionId,
        timeout: Duration,
    ) -> Result<CommandResponse<T::Response>> {
        self.command_future(cmd, session, timeout)?.await
    }

    pub(crate) fn add_listener(
        &self,
        session: SessionId,
        method: MethodId,
        handler: EventHandlerFn,
    ) -> Result<ListenerId> {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.send(HandlerMessage::AddListener {
            session,
            method,
            id,
            handler,
        })?;
        Ok(id)
    }

    pub(crate) fn remove_listener(
        &self,
        session: SessionId,
        method: MethodId,
        id: ListenerId,
    ) -> Result<()> {
        self.send(HandlerMessage::RemoveListener {
            session,
            method,
            id,
        })
    }

    /// Register a one-shot waiter, then await it under the given deadline.
    ///
    /// The registration is enqueued before this returns, so events arriving
    /// after the call cannot be missed. A timed out waiter is simply
    /// abandoned; its slot is reclaimed by the eviction job and a late
    /// matching event still reaches persistent listeners.
    pub(crate) fn wait_for_event(
        &self,
        session: SessionId,
        method: MethodId,
        predicate: Option<EventPredicate>,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<CdpJsonEventMessage>> + Send {
        let (tx, rx) = oneshot::channel();
        let sent = self.send(HandlerMessage::WaitForEvent {
            session,
            method,
            predicate,
            tx,
        });
        async move {
            sent?;
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_canceled)) => Err(CdpError::ConnectionLost),
                Err(_elapsed) => Err(CdpError::Timeout),
            }
        }
    }
}

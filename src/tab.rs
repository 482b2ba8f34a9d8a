use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;

use pypecdp_types::{CdpJsonEventMessage, Command, CommandResponse, MethodId};

use crate::cdp::browser_protocol::dom::{
    GetDocumentParams, NodeId, QuerySelectorAllParams, QuerySelectorParams,
};
use crate::cdp::browser_protocol::page::{Frame, FrameId, NavigateParams};
use crate::cdp::browser_protocol::target::{SessionId, TargetId};
use crate::cdp::js_protocol::runtime::{EvaluateParams, RemoteObject};
use crate::element::Element;
use crate::error::{CdpError, Result};
use crate::handler::session::{EventHandlerFn, ListenerId};
use crate::handler::HandlerHandle;

/// First delay of the selector poll loop; doubles up to the ceiling.
const POLL_INITIAL: Duration = Duration::from_millis(50);
const POLL_CEILING: Duration = Duration::from_millis(200);

/// A page target with an attached session.
///
/// Cheap to clone; all clones address the same session. Once the session is
/// torn down every operation fails with [`CdpError::DetachedTab`].
#[derive(Debug, Clone)]
pub struct Tab {
    pub(crate) inner: Arc<TabInner>,
}

#[derive(Debug)]
pub(crate) struct TabInner {
    target_id: TargetId,
    session_id: SessionId,
    handle: HandlerHandle,
    attached: AtomicBool,
    url: Mutex<String>,
    frame_id: Mutex<Option<FrameId>>,
    /// Root document node id, fetched once per document.
    doc_node: Mutex<Option<NodeId>>,
    /// Bumped on every root frame navigation; lets element operations
    /// notice the document changing under them.
    doc_generation: AtomicU64,
}

impl TabInner {
    pub(crate) fn new(
        target_id: TargetId,
        session_id: SessionId,
        url: String,
        handle: HandlerHandle,
    ) -> Self {
        Self {
            target_id,
            session_id,
            handle,
            attached: AtomicBool::new(true),
            url: Mutex::new(url),
            frame_id: Mutex::new(None),
            doc_node: Mutex::new(None),
            doc_generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn ensure_attached(&self) -> Result<()> {
        if self.attached.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CdpError::DetachedTab)
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_detached(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    /// Called by the handler when the root frame finished a navigation.
    pub(crate) fn frame_navigated(&self, frame: Frame) {
        *self.url.lock().unwrap() = frame.url;
        *self.frame_id.lock().unwrap() = Some(frame.id);
        *self.doc_node.lock().unwrap() = None;
        self.doc_generation.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn invalidate_document(&self) {
        *self.doc_node.lock().unwrap() = None;
    }

    pub(crate) fn doc_generation(&self) -> u64 {
        self.doc_generation.load(Ordering::SeqCst)
    }

    pub(crate) async fn execute<T: Command>(&self, cmd: T) -> Result<CommandResponse<T::Response>> {
        self.ensure_attached()?;
        self.handle.execute(cmd, self.session_id.clone()).await
    }
}

impl Tab {
    pub(crate) fn new(inner: Arc<TabInner>) -> Self {
        Self { inner }
    }

    /// The identifier of the target this tab is bound to.
    pub fn target_id(&self) -> &TargetId {
        &self.inner.target_id
    }

    /// The identifier of the session all commands of this tab are issued
    /// on.
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Last known url of the root frame.
    pub fn url(&self) -> String {
        self.inner.url.lock().unwrap().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_attached()
    }

    /// Issue a single command on this tab's session.
    pub async fn execute<T: Command>(&self, cmd: T) -> Result<CommandResponse<T::Response>> {
        self.inner.execute(cmd).await
    }

    /// Navigate to the given URL. Returns once the browser accepted the
    /// navigation, not once the page loaded; wait on
    /// `Page.loadEventFired` for that.
    pub async fn goto(&self, params: impl Into<NavigateParams>) -> Result<FrameId> {
        let res = self.execute(params.into()).await?;
        if let Some(err) = res.result.error_text {
            return Err(CdpError::ChromeMessage(err));
        }
        *self.inner.frame_id.lock().unwrap() = Some(res.result.frame_id.clone());
        Ok(res.result.frame_id)
    }

    /// Evaluates an expression on the global object, by value unless the
    /// caller asked otherwise. An exception on the page surfaces as
    /// [`CdpError::JavascriptException`].
    pub async fn evaluate(&self, evaluate: impl Into<EvaluateParams>) -> Result<RemoteObject> {
        let mut params = evaluate.into();
        if params.return_by_value.is_none() {
            params = params.return_by_value(true);
        }
        if params.await_promise.is_none() {
            params = params.await_promise(true);
        }
        let ret = self.execute(params).await?.result;
        if let Some(details) = ret.exception_details {
            return Err(CdpError::JavascriptException(Box::new(details)));
        }
        Ok(ret.result)
    }

    /// Returns the first element in the document matching the given CSS
    /// selector, or `None` when nothing matches.
    pub async fn find_element(&self, selector: impl Into<String>) -> Result<Option<Element>> {
        let selector = selector.into();
        match self.query_selector(&selector).await {
            Err(CdpError::Chrome(err)) if is_stale_node(&err) => {
                // The cached document died with a navigation; one refetch
                // settles it.
                self.inner.invalidate_document();
                self.query_selector(&selector).await
            }
            other => other,
        }
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<Element>> {
        let root = self.document_node_id().await?;
        let node_id = self
            .execute(QuerySelectorParams::new(root, selector))
            .await?
            .result
            .node_id;
        if node_id.inner() == 0 {
            return Ok(None);
        }
        Ok(Some(Element::new(&self.inner, node_id).await?))
    }

    /// Return all elements in the document that match the given selector.
    pub async fn find_elements(&self, selector: impl Into<String>) -> Result<Vec<Element>> {
        let selector = selector.into();
        match self.query_selector_all(&selector).await {
            Err(CdpError::Chrome(err)) if is_stale_node(&err) => {
                self.inner.invalidate_document();
                self.query_selector_all(&selector).await
            }
            other => other,
        }
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<Element>> {
        let root = self.document_node_id().await?;
        let resp = self
            .execute(QuerySelectorAllParams::new(root, selector))
            .await?;
        Element::from_nodes(&self.inner, &resp.result.node_ids).await
    }

    /// Poll for the selector with capped exponential backoff until it
    /// matches or the deadline passes.
    pub async fn wait_for_element(
        &self,
        selector: impl Into<String>,
        timeout: Duration,
    ) -> Result<Element> {
        let selector = selector.into();
        let mut elems = self
            .wait_for(timeout, || self.find_elements_min(&selector, 1))
            .await?;
        Ok(elems.remove(0))
    }

    /// Like [`wait_for_element`](Self::wait_for_element) but waits until at
    /// least `min_count` elements match.
    pub async fn wait_for_elements(
        &self,
        selector: impl Into<String>,
        min_count: usize,
        timeout: Duration,
    ) -> Result<Vec<Element>> {
        let selector = selector.into();
        self.wait_for(timeout, || self.find_elements_min(&selector, min_count))
            .await
    }

    async fn find_elements_min(&self, selector: &str, min_count: usize) -> Result<Option<Vec<Element>>> {
        let elems = self.find_elements(selector).await?;
        if elems.len() >= min_count.max(1) {
            Ok(Some(elems))
        } else {
            Ok(None)
        }
    }

    async fn wait_for<T, F, Fut>(&self, timeout: Duration, mut probe: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut delay = POLL_INITIAL;
        loop {
            match probe().await {
                Ok(Some(found)) => return Ok(found),
                Ok(None) => {}
                Err(err @ CdpError::DetachedTab) | Err(err @ CdpError::ConnectionLost) => {
                    return Err(err)
                }
                // Mid-navigation protocol errors resolve themselves on the
                // next probe.
                Err(err) => tracing::debug!(%err, "selector probe failed"),
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(CdpError::Timeout);
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(POLL_CEILING);
        }
    }

    /// Wait for the next event of the given kind on this tab's session.
    pub async fn wait_for_event(
        &self,
        method: impl Into<MethodId>,
        timeout: Duration,
    ) -> Result<CdpJsonEventMessage> {
        self.inner.ensure_attached()?;
        self.inner
            .handle
            .wait_for_event(self.inner.session_id.clone(), method.into(), None, timeout)
            .await
    }

    /// Wait for the next event of the given kind that satisfies the
    /// predicate. Non-matching events flow past the waiter untouched.
    pub async fn wait_for_event_with<P>(
        &self,
        method: impl Into<MethodId>,
        predicate: P,
        timeout: Duration,
    ) -> Result<CdpJsonEventMessage>
    where
        P: Fn(&CdpJsonEventMessage) -> bool + Send + 'static,
    {
        self.inner.ensure_attached()?;
        self.inner
            .handle
            .wait_for_event(
                self.inner.session_id.clone(),
                method.into(),
                Some(Box::new(predicate)),
                timeout,
            )
            .await
    }

    /// Register a persistent handler for events of the given kind on this
    /// tab's session. Handlers run as independent tasks and may overlap.
    pub fn on<F, Fut>(&self, method: impl Into<MethodId>, f: F) -> Result<ListenerId>
    where
        F: Fn(Arc<CdpJsonEventMessage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.ensure_attached()?;
        let f: EventHandlerFn = Arc::new(move |ev| f(ev).boxed());
        self.inner
            .handle
            .add_listener(self.inner.session_id.clone(), method.into(), f)
    }

    /// Remove a handler previously registered with [`on`](Self::on).
    pub fn off(&self, method: impl Into<MethodId>, id: ListenerId) -> Result<()> {
        self.inner
            .handle
            .remove_listener(self.inner.session_id.clone(), method.into(), id)
    }

    async fn document_node_id(&self) -> Result<NodeId> {
        if let Some(id) = *self.inner.doc_node.lock().unwrap() {
            return Ok(id);
        }
        let resp = self.execute(GetDocumentParams::default()).await?;
        let id = resp.result.root.node_id;
        *self.inner.doc_node.lock().unwrap() = Some(id);
        Ok(id)
    }
}

impl From<Arc<TabInner>> for Tab {
    fn from(inner: Arc<TabInner>) -> Self {
        Self { inner }
    }
}

/// The agent's complaint when a node id refers to a document that has been
/// navigated away.
fn is_stale_node(err: &pypecdp_types::Error) -> bool {
    err.message.contains("Could not find node") || err.message.contains("No node with given id")
}

use std::sync::{Arc, Weak};

use futures::future;

use crate::cdp::browser_protocol::dom::{
    BackendNodeId, DescribeNodeParams, GetAttributesParams, GetBoxModelParams, NodeId,
    RequestNodeParams, ResolveNodeParams, ScrollIntoViewIfNeededParams,
};
use crate::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchMouseEventParams, MouseButton};
use crate::cdp::js_protocol::runtime::{CallFunctionOnParams, RemoteObject, RemoteObjectId};
use crate::error::{CdpError, Result};
use crate::tab::{Tab, TabInner};

/// A handle to a [DOM Element](https://developer.mozilla.org/en-US/docs/Web/API/Element).
///
/// Valid only while the owning tab stays attached and the node exists on
/// the page; the tab reference is non-owning, so a handle kept around after
/// its tab detached fails every operation with [`CdpError::DetachedTab`],
/// and a stale node surfaces the protocol error unchanged.
#[derive(Debug)]
pub struct Element {
    /// The unique object identifier
    pub remote_object_id: RemoteObjectId,
    pub backend_node_id: BackendNodeId,
    pub node_id: NodeId,
    tab: Weak<TabInner>,
}

impl Element {
    pub(crate) async fn new(tab: &Arc<TabInner>, node_id: NodeId) -> Result<Self> {
        let backend_node_id = tab
            .execute(DescribeNodeParams::node_id(node_id))
            .await?
            .result
            .node
            .backend_node_id;

        let resp = tab
            .execute(ResolveNodeParams::backend_node_id(backend_node_id))
            .await?;
        let remote_object_id = resp
            .result
            .object
            .object_id
            .ok_or_else(|| CdpError::msg(format!("No object id found for {node_id:?}")))?;

        Ok(Self {
            remote_object_id,
            backend_node_id,
            node_id,
            tab: Arc::downgrade(tab),
        })
    }

    /// Mint a handle from a backend node id, the stable identifier child
    /// nodes are reported under.
    pub(crate) async fn from_backend_node(
        tab: &Arc<TabInner>,
        backend_node_id: BackendNodeId,
    ) -> Result<Self> {
        let object = tab
            .execute(ResolveNodeParams::backend_node_id(backend_node_id))
            .await?
            .result
            .object;
        let remote_object_id = object
            .object_id
            .ok_or_else(|| CdpError::msg(format!("No object id found for {backend_node_id:?}")))?;
        let node_id = tab
            .execute(RequestNodeParams::new(remote_object_id.clone()))
            .await?
            .result
            .node_id;
        Ok(Self {
            remote_object_id,
            backend_node_id,
            node_id,
            tab: Arc::downgrade(tab),
        })
    }

    /// Convert a slice of `NodeId`s into a `Vec` of `Element`s
    pub(crate) async fn from_nodes(tab: &Arc<TabInner>, node_ids: &[NodeId]) -> Result<Vec<Self>> {
        future::join_all(
            node_ids
                .iter()
                .copied()
                .map(|id| Element::new(tab, id)),
        )
        .await
        .into_iter()
        .collect()
    }

    fn tab(&self) -> Result<Arc<TabInner>> {
        let tab = self.tab.upgrade().ok_or(CdpError::DetachedTab)?;
        tab.ensure_attached()?;
        Ok(tab)
    }

    /// Click the geometric center of the element's content box with a
    /// synthetic left mouse press and release.
    ///
    /// When the click navigated the root frame out from under the node, the
    /// owning tab, now pointing at the new document, is returned.
    pub async fn click(&self) -> Result<Option<Tab>> {
        let tab = self.tab()?;
        let generation = tab.doc_generation();

        let model = tab
            .execute(GetBoxModelParams::node_id(self.node_id))
            .await?
            .result
            .model;
        let (x, y) = model.content.center();

        tab.execute(
            DispatchMouseEventParams::new("mousePressed", x, y)
                .button(MouseButton::Left)
                .click_count(1),
        )
        .await?;
        tab.execute(
            DispatchMouseEventParams::new("mouseReleased", x, y)
                .button(MouseButton::Left)
                .click_count(1),
        )
        .await?;

        if tab.doc_generation() != generation {
            Ok(Some(Tab::from(tab)))
        } else {
            Ok(None)
        }
    }

    /// Type the text into the element, one key down/up pair per code point
    /// in input order, with a char event in between for printable
    /// characters; line breaks arrive as Enter.
    pub async fn type_str(&self, input: impl AsRef<str>) -> Result<&Self> {
        let tab = self.tab()?;
        for c in input.as_ref().chars() {
            if c == '\n' || c == '\r' {
                tab.execute(
                    DispatchKeyEventParams::new("keyDown")
                        .key("Enter")
                        .text("\r"),
                )
                .await?;
                tab.execute(DispatchKeyEventParams::new("keyUp").key("Enter"))
                    .await?;
                continue;
            }
            let text = c.to_string();
            tab.execute(
                DispatchKeyEventParams::new("keyDown")
                    .key(text.clone())
                    .text(text.clone()),
            )
            .await?;
            // keyDown/keyUp only reach key handlers; the char event is
            // what inserts the character into editable content.
            tab.execute(DispatchKeyEventParams::new("char").text(text.clone()))
                .await?;
            tab.execute(DispatchKeyEventParams::new("keyUp").key(text))
                .await?;
        }
        Ok(self)
    }

    /// The node's rendered `innerText`.
    pub async fn inner_text(&self) -> Result<Option<String>> {
        let object = self
            .call_js_fn("function() { return this.innerText; }", true)
            .await?;
        Ok(object.value.and_then(|v| serde_json::from_value(v).ok()))
    }

    /// Read a single attribute, `None` when the attribute is absent.
    pub async fn attribute(&self, name: impl AsRef<str>) -> Result<Option<String>> {
        let tab = self.tab()?;
        let attributes = tab
            .execute(GetAttributesParams::new(self.node_id))
            .await?
            .result
            .attributes;
        Ok(attributes
            .chunks_exact(2)
            .find(|pair| pair[0] == name.as_ref())
            .map(|pair| pair[1].clone()))
    }

    pub async fn scroll_into_view(&self) -> Result<&Self> {
        let tab = self.tab()?;
        tab.execute(ScrollIntoViewIfNeededParams::node_id(self.node_id))
            .await?;
        Ok(self)
    }

    /// The parent element, `None` for the document element.
    pub async fn parent(&self) -> Result<Option<Element>> {
        let tab = self.tab()?;
        let object = self
            .call_js_fn("function() { return this.parentElement; }", false)
            .await?;
        let Some(object_id) = object.object_id else {
            return Ok(None);
        };
        let node_id = tab
            .execute(RequestNodeParams::new(object_id))
            .await?
            .result
            .node_id;
        if node_id.inner() == 0 {
            return Ok(None);
        }
        Ok(Some(Element::new(&tab, node_id).await?))
    }

    /// The element's child element nodes.
    pub async fn children(&self) -> Result<Vec<Element>> {
        let tab = self.tab()?;
        let node = tab
            .execute(DescribeNodeParams::node_id(self.node_id).depth(1))
            .await?
            .result
            .node;
        let mut children = Vec::new();
        for child in node.children.unwrap_or_default() {
            // Element nodes only, no text or comment nodes.
            if child.node_type != 1 {
                continue;
            }
            children.push(Element::from_backend_node(&tab, child.backend_node_id).await?);
        }
        Ok(children)
    }

    /// Calls a JS function on the element's remote object.
    async fn call_js_fn(&self, function: &str, return_by_value: bool) -> Result<RemoteObject> {
        let tab = self.tab()?;
        let ret = tab
            .execute(
                CallFunctionOnParams::new(function)
                    .object_id(self.remote_object_id.clone())
                    .return_by_value(return_by_value),
            )
            .await?
            .result;
        if let Some(details) = ret.exception_details {
            return Err(CdpError::JavascriptException(Box::new(details)));
        }
        Ok(ret.result)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd};
    use std::time::Duration;

    use futures::channel::mpsc;
    use futures::StreamExt;

    use super::*;
    use crate::conn::Connection;
    use crate::handler::{Handler, HandlerHandle};

    fn owned(fd: impl IntoRawFd) -> OwnedFd {
        unsafe { OwnedFd::from_raw_fd(fd.into_raw_fd()) }
    }

    fn read_frame(reader: &mut os_pipe::PipeReader) -> serde_json::Value {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            reader.read_exact(&mut byte).unwrap();
            if byte[0] == 0 {
                break;
            }
            buf.push(byte[0]);
        }
        serde_json::from_slice(&buf).unwrap()
    }

    fn write_frame(writer: &mut os_pipe::PipeWriter, value: serde_json::Value) {
        let mut raw = serde_json::to_vec(&value).unwrap();
        raw.push(0);
        writer.write_all(&raw).unwrap();
    }

    /// A tab attached through a real handler over a pipe pair; the far
    /// ends play the browser.
    async fn attached_tab() -> (Tab, os_pipe::PipeReader, os_pipe::PipeWriter) {
        let (parent_read, peer_write) = os_pipe::pipe().unwrap();
        let (peer_read, parent_write) = os_pipe::pipe().unwrap();
        let conn = Connection::new(owned(parent_read), owned(parent_write)).unwrap();

        let (tx, rx) = mpsc::unbounded();
        let (tabs_tx, mut tabs_rx) = mpsc::unbounded();
        let (sup_tx, _sup_rx) = mpsc::unbounded();
        let handle = HandlerHandle::new(tx, Duration::from_secs(5));
        tokio::spawn(Handler::new(
            conn,
            rx,
            tabs_tx,
            sup_tx,
            handle.clone(),
            Duration::from_secs(5),
        ));

        let mut writer = peer_write.try_clone().unwrap();
        write_frame(
            &mut writer,
            serde_json::json!({
                "method": "Target.attachedToTarget",
                "params": {
                    "sessionId": "S1",
                    "targetInfo": {
                        "targetId": "T1",
                        "type": "page",
                        "title": "",
                        "url": "about:blank",
                        "attached": true
                    },
                    "waitingForDebugger": false
                }
            }),
        );
        let tab = tabs_rx.next().await.unwrap();
        (tab, peer_read, peer_write)
    }

    fn element_on(tab: &Tab) -> Element {
        Element {
            remote_object_id: RemoteObjectId::new("obj-1"),
            backend_node_id: BackendNodeId::new(11),
            node_id: NodeId::new(2),
            tab: Arc::downgrade(&tab.inner),
        }
    }

    /// Answer `total` frames with empty results, collecting the
    /// (type, text) of every dispatched key event.
    fn record_key_events(
        mut peer_read: os_pipe::PipeReader,
        mut writer: os_pipe::PipeWriter,
        total: usize,
    ) -> std::thread::JoinHandle<Vec<(String, Option<String>)>> {
        std::thread::spawn(move || {
            let mut keys = Vec::new();
            for _ in 0..total {
                let frame = read_frame(&mut peer_read);
                if frame["method"] == "Input.dispatchKeyEvent" {
                    keys.push((
                        frame["params"]["type"].as_str().unwrap().to_string(),
                        frame["params"]["text"].as_str().map(str::to_string),
                    ));
                }
                write_frame(
                    &mut writer,
                    serde_json::json!({"id": frame["id"], "result": {}}),
                );
            }
            keys
        })
    }

    #[tokio::test]
    async fn type_str_dispatches_key_down_char_key_up_per_character() {
        let (tab, peer_read, peer_write) = attached_tab().await;
        // Page.enable + Runtime.enable, then three key events per typed
        // character.
        let peer = record_key_events(peer_read, peer_write.try_clone().unwrap(), 8);

        let elem = element_on(&tab);
        elem.type_str("hi").await.unwrap();

        let keys = peer.join().unwrap();
        assert_eq!(
            keys,
            vec![
                ("keyDown".to_string(), Some("h".to_string())),
                ("char".to_string(), Some("h".to_string())),
                ("keyUp".to_string(), None),
                ("keyDown".to_string(), Some("i".to_string())),
                ("char".to_string(), Some("i".to_string())),
                ("keyUp".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn type_str_sends_enter_without_a_char_event() {
        let (tab, peer_read, peer_write) = attached_tab().await;
        let peer = record_key_events(peer_read, peer_write.try_clone().unwrap(), 4);

        let elem = element_on(&tab);
        elem.type_str("\n").await.unwrap();

        let keys = peer.join().unwrap();
        assert_eq!(
            keys,
            vec![
                ("keyDown".to_string(), Some("\r".to_string())),
                ("keyUp".to_string(), None),
            ]
        );
    }
}

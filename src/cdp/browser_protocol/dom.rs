use serde::{Deserialize, Serialize};

use crate::cdp::js_protocol::runtime::{RemoteObject, RemoteObjectId};
use pypecdp_types::{Command, Method, MethodId};

/// Unique DOM node identifier. Zero means "no node".
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(i64);

impl NodeId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn inner(&self) -> i64 {
        self.0
    }
}

/// Backend node identifier, stable across the node's lifetime on the page
/// side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendNodeId(i64);

impl BackendNodeId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn inner(&self) -> i64 {
        self.0
    }
}

/// A DOM node returned by the agent, trimmed to the fields traversal uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub node_id: NodeId,
    pub backend_node_id: BackendNodeId,
    #[serde(default)]
    pub node_type: i64,
    #[serde(default)]
    pub node_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,
}

/// Returns the root DOM node to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDocumentParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pierce: Option<bool>,
}

impl GetDocumentParams {
    pub const IDENTIFIER: &'static str = "DOM.getDocument";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDocumentReturns {
    pub root: Node,
}

impl Method for GetDocumentParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for GetDocumentParams {
    type Response = GetDocumentReturns;
}

/// Executes `querySelector` on a given node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorParams {
    pub node_id: NodeId,
    pub selector: String,
}

impl QuerySelectorParams {
    pub const IDENTIFIER: &'static str = "DOM.querySelector";

    pub fn new(node_id: NodeId, selector: impl Into<String>) -> Self {
        Self {
            node_id,
            selector: selector.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorReturns {
    /// Zero when nothing matched.
    pub node_id: NodeId,
}

impl Method for QuerySelectorParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for QuerySelectorParams {
    type Response = QuerySelectorReturns;
}

/// Executes `querySelectorAll` on a given node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorAllParams {
    pub node_id: NodeId,
    pub selector: String,
}

impl QuerySelectorAllParams {
    pub const IDENTIFIER: &'static str = "DOM.querySelectorAll";

    pub fn new(node_id: NodeId, selector: impl Into<String>) -> Self {
        Self {
            node_id,
            selector: selector.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorAllReturns {
    pub node_ids: Vec<NodeId>,
}

impl Method for QuerySelectorAllParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for QuerySelectorAllParams {
    type Response = QuerySelectorAllReturns;
}

/// Describes node given its id. Does not require the domain to be enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeNodeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<BackendNodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<RemoteObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,
}

impl DescribeNodeParams {
    pub const IDENTIFIER: &'static str = "DOM.describeNode";

    pub fn node_id(node_id: NodeId) -> Self {
        Self {
            node_id: Some(node_id),
            ..Default::default()
        }
    }

    pub fn depth(mut self, depth: i64) -> Self {
        self.depth = Some(depth);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeNodeReturns {
    pub node: Node,
}

impl Method for DescribeNodeParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for DescribeNodeParams {
    type Response = DescribeNodeReturns;
}

/// Resolves the JavaScript node object for a given node or backend node id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveNodeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<BackendNodeId>,
}

impl ResolveNodeParams {
    pub const IDENTIFIER: &'static str = "DOM.resolveNode";

    pub fn backend_node_id(backend_node_id: BackendNodeId) -> Self {
        Self {
            backend_node_id: Some(backend_node_id),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveNodeReturns {
    pub object: RemoteObject,
}

impl Method for ResolveNodeParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for ResolveNodeParams {
    type Response = ResolveNodeReturns;
}

/// Requests that the node is sent to the caller given the JavaScript node
/// object reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestNodeParams {
    pub object_id: RemoteObjectId,
}

impl RequestNodeParams {
    pub const IDENTIFIER: &'static str = "DOM.requestNode";

    pub fn new(object_id: RemoteObjectId) -> Self {
        Self { object_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestNodeReturns {
    pub node_id: NodeId,
}

impl Method for RequestNodeParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for RequestNodeParams {
    type Response = RequestNodeReturns;
}

/// Returns attributes for the specified node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAttributesParams {
    pub node_id: NodeId,
}

impl GetAttributesParams {
    pub const IDENTIFIER: &'static str = "DOM.getAttributes";

    pub fn new(node_id: NodeId) -> Self {
        Self { node_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAttributesReturns {
    /// An interleaved array of node attribute names and values.
    pub attributes: Vec<String>,
}

impl Method for GetAttributesParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for GetAttributesParams {
    type Response = GetAttributesReturns;
}

/// Quad coordinates, an array of 8 numbers: x1, y1, ..., x4, y4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quad(pub Vec<f64>);

impl Quad {
    /// Geometric center of the quad.
    pub fn center(&self) -> (f64, f64) {
        let xs = self.0.iter().step_by(2).sum::<f64>() / 4.0;
        let ys = self.0.iter().skip(1).step_by(2).sum::<f64>() / 4.0;
        (xs, ys)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxModel {
    pub content: Quad,
    pub padding: Quad,
    pub border: Quad,
    pub margin: Quad,
    pub width: i64,
    pub height: i64,
}

/// Returns boxes for the given node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBoxModelParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<BackendNodeId>,
}

impl GetBoxModelParams {
    pub const IDENTIFIER: &'static str = "DOM.getBoxModel";

    pub fn node_id(node_id: NodeId) -> Self {
        Self {
            node_id: Some(node_id),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBoxModelReturns {
    pub model: BoxModel,
}

impl Method for GetBoxModelParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for GetBoxModelParams {
    type Response = GetBoxModelReturns;
}

/// Scrolls the specified node into view if not already visible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollIntoViewIfNeededParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<BackendNodeId>,
}

impl ScrollIntoViewIfNeededParams {
    pub const IDENTIFIER: &'static str = "DOM.scrollIntoViewIfNeeded";

    pub fn node_id(node_id: NodeId) -> Self {
        Self {
            node_id: Some(node_id),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrollIntoViewIfNeededReturns {}

impl Method for ScrollIntoViewIfNeededParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for ScrollIntoViewIfNeededParams {
    type Response = ScrollIntoViewIfNeededReturns;
}

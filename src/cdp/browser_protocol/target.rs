use std::fmt;

use serde::{Deserialize, Serialize};

use pypecdp_types::{Command, Method, MethodId};

/// Identifier of an attached debugging session.
///
/// The empty string addresses the browser-level session; on the wire the
/// browser session is expressed by omitting `sessionId` entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The browser-level session.
    pub fn browser() -> Self {
        Self(String::new())
    }

    pub fn is_browser(&self) -> bool {
        self.0.is_empty()
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrowserContextId(String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: TargetId,
    pub r#type: String,
    pub title: String,
    pub url: String,
    pub attached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opener_id: Option<TargetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_context_id: Option<BrowserContextId>,
}

impl TargetInfo {
    pub fn is_page(&self) -> bool {
        self.r#type == "page"
    }
}

/// Creates a new page target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetParams {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_window: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
}

impl CreateTargetParams {
    pub const IDENTIFIER: &'static str = "Target.createTarget";

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            new_window: None,
            background: None,
        }
    }
}

impl Default for CreateTargetParams {
    fn default() -> Self {
        Self::new("about:blank")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetReturns {
    pub target_id: TargetId,
}

impl Method for CreateTargetParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for CreateTargetParams {
    type Response = CreateTargetReturns;
}

/// Controls whether to discover available targets and notify via
/// `targetCreated`/`targetInfoChanged`/`targetDestroyed` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDiscoverTargetsParams {
    pub discover: bool,
}

impl SetDiscoverTargetsParams {
    pub const IDENTIFIER: &'static str = "Target.setDiscoverTargets";

    pub fn new(discover: bool) -> Self {
        Self { discover }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetDiscoverTargetsReturns {}

impl Method for SetDiscoverTargetsParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for SetDiscoverTargetsParams {
    type Response = SetDiscoverTargetsReturns;
}

/// Controls whether to automatically attach to new targets. With `flatten`
/// the attached sessions arrive without nesting, addressed by `sessionId`
/// on ordinary frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAutoAttachParams {
    pub auto_attach: bool,
    pub wait_for_debugger_on_start: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flatten: Option<bool>,
}

impl SetAutoAttachParams {
    pub const IDENTIFIER: &'static str = "Target.setAutoAttach";

    pub fn new(auto_attach: bool) -> Self {
        Self {
            auto_attach,
            wait_for_debugger_on_start: false,
            flatten: None,
        }
    }

    pub fn flatten(mut self, flatten: bool) -> Self {
        self.flatten = Some(flatten);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetAutoAttachReturns {}

impl Method for SetAutoAttachParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for SetAutoAttachParams {
    type Response = SetAutoAttachReturns;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetParams {
    pub target_id: TargetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flatten: Option<bool>,
}

impl AttachToTargetParams {
    pub const IDENTIFIER: &'static str = "Target.attachToTarget";

    pub fn new(target_id: TargetId) -> Self {
        Self {
            target_id,
            flatten: Some(true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetReturns {
    pub session_id: SessionId,
}

impl Method for AttachToTargetParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for AttachToTargetParams {
    type Response = AttachToTargetReturns;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTargetParams {
    pub target_id: TargetId,
}

impl CloseTargetParams {
    pub const IDENTIFIER: &'static str = "Target.closeTarget";

    pub fn new(target_id: TargetId) -> Self {
        Self { target_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTargetReturns {
    #[serde(default)]
    pub success: bool,
}

impl Method for CloseTargetParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for CloseTargetParams {
    type Response = CloseTargetReturns;
}

/// Issued when a possible inspection target is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTargetCreated {
    pub target_info: TargetInfo,
}

impl EventTargetCreated {
    pub const IDENTIFIER: &'static str = "Target.targetCreated";
}

/// Issued when an attached session is created, either via auto-attach or an
/// explicit `attachToTarget`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAttachedToTarget {
    pub session_id: SessionId,
    pub target_info: TargetInfo,
    #[serde(default)]
    pub waiting_for_debugger: bool,
}

impl EventAttachedToTarget {
    pub const IDENTIFIER: &'static str = "Target.attachedToTarget";
}

/// Issued when a session is detached from its target.
///
/// Can be issued multiple times per target if multiple sessions have been
/// attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetachedFromTarget {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<TargetId>,
}

impl EventDetachedFromTarget {
    pub const IDENTIFIER: &'static str = "Target.detachedFromTarget";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTargetDestroyed {
    pub target_id: TargetId,
}

impl EventTargetDestroyed {
    pub const IDENTIFIER: &'static str = "Target.targetDestroyed";
}

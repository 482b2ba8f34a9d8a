use std::fmt;

use serde::{Deserialize, Serialize};

use pypecdp_types::{Command, Method, MethodId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId(String);

impl FrameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Information about the frame hierarchy, trimmed to what navigation
/// tracking needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: FrameId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<FrameId>,
    pub url: String,
}

/// Enables page domain notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnableParams {}

impl EnableParams {
    pub const IDENTIFIER: &'static str = "Page.enable";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnableReturns {}

impl Method for EnableParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for EnableParams {
    type Response = EnableReturns;
}

/// Navigates current page to the given URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParams {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<FrameId>,
}

impl NavigateParams {
    pub const IDENTIFIER: &'static str = "Page.navigate";

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referrer: None,
            frame_id: None,
        }
    }
}

impl<T: Into<String>> From<T> for NavigateParams {
    fn from(url: T) -> Self {
        NavigateParams::new(url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateReturns {
    pub frame_id: FrameId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader_id: Option<String>,
    /// User friendly error message, present if navigation has failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl Method for NavigateParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for NavigateParams {
    type Response = NavigateReturns;
}

/// Fired once navigation of the frame has completed. The frame is now
/// associated with the new loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrameNavigated {
    pub frame: Frame,
}

impl EventFrameNavigated {
    pub const IDENTIFIER: &'static str = "Page.frameNavigated";
}

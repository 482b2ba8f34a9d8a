use serde::{Deserialize, Serialize};

use pypecdp_types::{Command, Method, MethodId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "middle")]
    Middle,
    #[serde(rename = "right")]
    Right,
}

/// Dispatches a mouse event to the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMouseEventParams {
    pub r#type: String,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button: Option<MouseButton>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_count: Option<i64>,
}

impl DispatchMouseEventParams {
    pub const IDENTIFIER: &'static str = "Input.dispatchMouseEvent";

    pub fn new(r#type: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            r#type: r#type.into(),
            x,
            y,
            button: None,
            click_count: None,
        }
    }

    pub fn button(mut self, button: MouseButton) -> Self {
        self.button = Some(button);
        self
    }

    pub fn click_count(mut self, count: i64) -> Self {
        self.click_count = Some(count);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchMouseEventReturns {}

impl Method for DispatchMouseEventParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for DispatchMouseEventParams {
    type Response = DispatchMouseEventReturns;
}

/// Dispatches a key event to the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchKeyEventParams {
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmodified_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl DispatchKeyEventParams {
    pub const IDENTIFIER: &'static str = "Input.dispatchKeyEvent";

    pub fn new(r#type: impl Into<String>) -> Self {
        Self {
            r#type: r#type.into(),
            text: None,
            unmodified_text: None,
            key: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchKeyEventReturns {}

impl Method for DispatchKeyEventParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for DispatchKeyEventParams {
    type Response = DispatchKeyEventReturns;
}

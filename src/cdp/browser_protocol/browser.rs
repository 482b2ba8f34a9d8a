use serde::{Deserialize, Serialize};

use pypecdp_types::{Command, Method, MethodId};

/// Returns version information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetVersionParams {}

impl GetVersionParams {
    pub const IDENTIFIER: &'static str = "Browser.getVersion";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetVersionReturns {
    pub protocol_version: String,
    pub product: String,
    pub revision: String,
    pub user_agent: String,
    pub js_version: String,
}

impl Method for GetVersionParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for GetVersionParams {
    type Response = GetVersionReturns;
}

/// Close browser gracefully.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloseParams {}

impl CloseParams {
    pub const IDENTIFIER: &'static str = "Browser.close";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloseReturns {}

impl Method for CloseParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for CloseParams {
    type Response = CloseReturns;
}

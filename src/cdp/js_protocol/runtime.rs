use std::fmt;

use serde::{Deserialize, Serialize};

use pypecdp_types::{Command, Method, MethodId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteObjectId(String);

impl RemoteObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mirror object referencing an original JavaScript object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(default)]
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// The value, present when requested by value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<RemoteObjectId>,
}

/// Detailed information about an exception that happened during script
/// execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    #[serde(default)]
    pub exception_id: i64,
    pub text: String,
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub column_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<RemoteObject>,
}

impl fmt::Display for ExceptionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(desc) = self
            .exception
            .as_ref()
            .and_then(|e| e.description.as_deref())
        {
            write!(f, "{}: {}", self.text, desc)
        } else {
            write!(
                f,
                "{} at {}:{}",
                self.text, self.line_number, self.column_number
            )
        }
    }
}

impl std::error::Error for ExceptionDetails {}

/// Enables reporting of execution contexts and console API calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnableParams {}

impl EnableParams {
    pub const IDENTIFIER: &'static str = "Runtime.enable";
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

/// Evaluates expression on the global object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub await_promise: Option<bool>,
}

impl EvaluateParams {
    pub const IDENTIFIER: &'static str = "Runtime.evaluate";

    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            return_by_value: None,
            await_promise: None,
        }
    }

    pub fn return_by_value(mut self, yes: bool) -> Self {
        self.return_by_value = Some(yes);
        self
    }

    pub fn await_promise(mut self, yes: bool) -> Self {
        self.await_promise = Some(yes);
        self
    }
}

impl<T: Into<String>> From<T> for EvaluateParams {
    fn from(expr: T) -> Self {
        EvaluateParams::new(expr.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateReturns {
    pub result: RemoteObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

impl Method for EvaluateParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for EvaluateParams {
    type Response = EvaluateReturns;
}

/// Calls a function with a given declaration on the object identified by
/// `object_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionOnParams {
    pub function_declaration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<RemoteObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
}

impl CallFunctionOnParams {
    pub const IDENTIFIER: &'static str = "Runtime.callFunctionOn";

    pub fn new(function_declaration: impl Into<String>) -> Self {
        Self {
            function_declaration: function_declaration.into(),
            object_id: None,
            return_by_value: None,
        }
    }

    pub fn object_id(mut self, object_id: RemoteObjectId) -> Self {
        self.object_id = Some(object_id);
        self
    }

    pub fn return_by_value(mut self, yes: bool) -> Self {
        self.return_by_value = Some(yes);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionOnReturns {
    pub result: RemoteObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_details: Option<ExceptionDetails>,
}

impl Method for CallFunctionOnParams {
    fn identifier(&self) -> MethodId {
        Self::IDENTIFIER.into()
    }
}

impl Command for CallFunctionOnParams {
    type Response = CallFunctionOnReturns;
}

/// Issued when console API was called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConsoleApiCalled {
    pub r#type: String,
    pub args: Vec<RemoteObject>,
    #[serde(default)]
    pub execution_context_id: i64,
}

impl EventConsoleApiCalled {
    pub const IDENTIFIER: &'static str = "Runtime.consoleAPICalled";
}

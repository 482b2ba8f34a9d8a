use std::io;
use std::process::ExitStatus;

use futures::channel::mpsc::SendError;
use futures::channel::oneshot::Canceled;
use thiserror::Error;

use crate::cdp::js_protocol::runtime::ExceptionDetails;

pub type Result<T, E = CdpError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CdpError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// The browser answered a call with an error object.
    #[error(transparent)]
    Chrome(#[from] pypecdp_types::Error),
    /// A script evaluation completed with an exception on the page.
    #[error("{0}")]
    JavascriptException(Box<ExceptionDetails>),
    /// The browser reported a failure outside the error object, e.g. the
    /// `errorText` of a failed navigation.
    #[error("{0}")]
    ChromeMessage(String),
    /// The pipe closed, the browser process died, or a write failed. Every
    /// outstanding call resolves with this exactly once.
    #[error("connection to the browser was lost")]
    ConnectionLost,
    /// The session backing this tab has been torn down.
    #[error("tab no longer attached")]
    DetachedTab,
    /// A deadline fired before the awaited response or event arrived.
    #[error("request timed out")]
    Timeout,
    #[error("received no response from the browser")]
    NoResponse,
    #[error("failed to launch the browser: {0}")]
    LaunchFailed(String),
    /// The browser process exited during startup.
    #[error("browser exited early with {0}")]
    LaunchExit(ExitStatus),
}

impl CdpError {
    pub(crate) fn msg(msg: impl Into<String>) -> Self {
        CdpError::ChromeMessage(msg.into())
    }

    pub fn is_connection_lost(&self) -> bool {
        matches!(self, CdpError::ConnectionLost)
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, CdpError::DetachedTab)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CdpError::Timeout)
    }
}

// A closed channel in either direction means the multiplexer is gone, which
// only happens once the transport is down.

impl From<Canceled> for CdpError {
    fn from(_: Canceled) -> Self {
        CdpError::ConnectionLost
    }
}

impl From<SendError> for CdpError {
    fn from(_: SendError) -> Self {
        CdpError::ConnectionLost
    }
}

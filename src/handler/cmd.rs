use tokio::time::Instant;

use futures::channel::oneshot::Sender as OneshotSender;

use pypecdp_types::{Command, CommandResponse, MethodId, Response};

use crate::cdp::browser_protocol::target::SessionId;
use crate::error::{CdpError, Result};

/// A call in flight between a public handle and the handler.
#[derive(Debug)]
pub(crate) struct CommandMessage {
    pub method: MethodId,
    /// The session to issue the call on, the browser session when empty.
    pub session_id: SessionId,
    pub params: serde_json::Value,
    pub sender: OneshotSender<Result<Response>>,
    /// After this point the slot is evicted and a late response dropped.
    pub deadline: Instant,
}

impl CommandMessage {
    pub fn with_session<C: Command>(
        cmd: C,
        sender: OneshotSender<Result<Response>>,
        session_id: SessionId,
        deadline: Instant,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            method: cmd.identifier(),
            session_id,
            params: serde_json::to_value(cmd)?,
            sender,
            deadline,
        })
    }
}

/// Decode a raw response into the typed response of the issued command.
pub(crate) fn to_command_response<T: Command>(
    resp: Response,
    method: MethodId,
) -> Result<CommandResponse<T::Response>> {
    if let Some(res) = resp.result {
        let result = serde_json::from_value(res)?;
        Ok(CommandResponse {
            id: resp.id,
            result,
            method,
        })
    } else if let Some(err) = resp.error {
        Err(err.into())
    } else {
        Err(CdpError::NoResponse)
    }
}

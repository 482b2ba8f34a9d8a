use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use pin_project_lite::pin_project;
use tokio::time::Sleep;

use pypecdp_types::{Command, CommandResponse, MethodId, Response};

use crate::error::{CdpError, Result};
use crate::handler::cmd::to_command_response;

pin_project! {
    /// Resolves with the typed response of an issued command, its deadline,
    /// or the loss of the connection, whichever happens first.
    ///
    /// Dropping the future cancels the call: the slot dies with the
    /// receiver and a late response is dropped silently by the handler.
    #[must_use = "futures do nothing unless awaited"]
    pub struct CommandFuture<T> {
        #[pin]
        rx: oneshot::Receiver<Result<Response>>,
        #[pin]
        deadline: Sleep,
        method: MethodId,
        _marker: PhantomData<T>,
    }
}

impl<T: Command> CommandFuture<T> {
    pub(crate) fn new(
        rx: oneshot::Receiver<Result<Response>>,
        deadline: Sleep,
        method: MethodId,
    ) -> Self {
        Self {
            rx,
            deadline,
            method,
            _marker: PhantomData,
        }
    }
}

impl<T: Command> Future for CommandFuture<T> {
    type Output = Result<CommandResponse<T::Response>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if this.deadline.poll(cx).is_ready() {
            return Poll::Ready(Err(CdpError::Timeout));
        }

        match this.rx.poll(cx) {
            Poll::Ready(Ok(Ok(response))) => {
                Poll::Ready(to_command_response::<T>(response, this.method.clone()))
            }
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(err)),
            Poll::Ready(Err(_canceled)) => Poll::Ready(Err(CdpError::ConnectionLost)),
            Poll::Pending => Poll::Pending,
        }
    }
}

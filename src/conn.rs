use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::pin::Pin;

use futures::stream::Stream;
use futures::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::unix::pipe;

use pypecdp_types::{CallId, Message, MethodCall};

use crate::cdp::browser_protocol::target::SessionId;
use crate::error::Result;

/// Byte separating adjacent frames in both directions of the pipe
/// transport. Fixed by the browser's pipe mode; frames are JSON and never
/// contain a raw NUL themselves.
pub const FRAME_DELIMITER: u8 = 0x0;

/// Exchanges messages with the browser over the debugging pipe pair.
///
/// Owns both parent-side pipe ends exclusively; dropping the connection
/// closes them, which the browser observes as EOF on its end. Writes are
/// serialized through an internal queue so frames never interleave. Every
/// error this stream yields is fatal for the transport; recoverable
/// conditions (a single unparseable frame) are logged and skipped
/// internally.
#[must_use = "streams do nothing unless polled"]
#[derive(Debug)]
pub struct Connection {
    reader: pipe::Receiver,
    writer: pipe::Sender,
    /// Serialized frames queued for writing, delimiter included.
    pending_writes: VecDeque<Vec<u8>>,
    /// Bytes of the frame currently being written that reached the kernel.
    written: usize,
    /// Inbound bytes not yet terminated by a delimiter.
    inbuf: Vec<u8>,
    /// Portion of `inbuf` already scanned for a delimiter.
    scanned: usize,
    /// The identifier for the next outgoing command.
    next_id: u64,
    done: bool,
}

impl Connection {
    /// Takes ownership of the parent-side pipe ends: `read_fd` carries
    /// browser → driver traffic, `write_fd` driver → browser.
    pub fn new(read_fd: OwnedFd, write_fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&read_fd)?;
        set_nonblocking(&write_fd)?;
        let reader = pipe::Receiver::from_file_unchecked(std::fs::File::from(read_fd))?;
        let writer = pipe::Sender::from_file_unchecked(std::fs::File::from(write_fd))?;
        Ok(Self {
            reader,
            writer,
            pending_writes: Default::default(),
            written: 0,
            inbuf: Vec::with_capacity(8 * 1024),
            scanned: 0,
            next_id: 0,
            done: false,
        })
    }

    fn next_call_id(&mut self) -> CallId {
        let id = CallId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Queue in the command to send over the pipe and return the id
    /// assigned to it. The frame goes out the next time the stream is
    /// polled.
    pub fn submit_command(
        &mut self,
        method: pypecdp_types::MethodId,
        session_id: Option<SessionId>,
        params: serde_json::Value,
    ) -> serde_json::Result<CallId> {
        let id = self.next_call_id();
        tracing::debug!(%id, %method, "submit command");
        let call = MethodCall {
            id,
            method,
            session_id: session_id
                .filter(|s| !s.is_browser())
                .map(|s| s.inner().to_string()),
            params,
        };
        let mut frame = serde_json::to_vec(&call)?;
        frame.push(FRAME_DELIMITER);
        self.pending_writes.push_back(frame);
        Ok(id)
    }

    /// Number of queued frames not yet handed to the kernel.
    pub fn pending_writes(&self) -> usize {
        self.pending_writes.len()
    }

    /// Flush queued frames into the pipe until the queue drains, the pipe
    /// is full, or a write error occurs.
    fn poll_writes(&mut self, cx: &mut Context<'_>) -> Result<(), io::Error> {
        while let Some(frame) = self.pending_writes.front() {
            while self.written < frame.len() {
                match Pin::new(&mut self.writer).poll_write(cx, &frame[self.written..]) {
                    Poll::Ready(Ok(0)) => {
                        return Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "browser pipe closed",
                        ))
                    }
                    Poll::Ready(Ok(n)) => self.written += n,
                    Poll::Ready(Err(err)) => return Err(err),
                    // Pipe buffer is full; the kernel wakes us when the
                    // browser drains it.
                    Poll::Pending => return Ok(()),
                }
            }
            self.pending_writes.pop_front();
            self.written = 0;
        }
        Ok(())
    }

    /// Extract the next complete frame from the input buffer, if any.
    fn split_frame(&mut self) -> Option<Vec<u8>> {
        let pos = self.inbuf[self.scanned..]
            .iter()
            .position(|&b| b == FRAME_DELIMITER)
            .map(|p| p + self.scanned);
        match pos {
            Some(pos) => {
                let mut frame: Vec<u8> = self.inbuf.drain(..=pos).collect();
                frame.pop();
                self.scanned = 0;
                Some(frame)
            }
            None => {
                self.scanned = self.inbuf.len();
                None
            }
        }
    }
}

impl Stream for Connection {
    type Item = Result<Message>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let pin = self.get_mut();
        if pin.done {
            return Poll::Ready(None);
        }

        if let Err(err) = pin.poll_writes(cx) {
            tracing::error!(%err, "pipe write failed");
            pin.done = true;
            return Poll::Ready(Some(Err(err.into())));
        }

        loop {
            while let Some(frame) = pin.split_frame() {
                if frame.is_empty() {
                    continue;
                }
                match serde_json::from_slice::<Message>(&frame) {
                    Ok(msg) => return Poll::Ready(Some(Ok(msg))),
                    Err(err) => {
                        // A single bad frame is recoverable, the framing
                        // itself is still intact.
                        tracing::warn!(%err, "discarding unparseable frame");
                    }
                }
            }

            let mut buf = [0u8; 8 * 1024];
            let mut readbuf = ReadBuf::new(&mut buf);
            match Pin::new(&mut pin.reader).poll_read(cx, &mut readbuf) {
                Poll::Ready(Ok(())) => {
                    let filled = readbuf.filled();
                    if filled.is_empty() {
                        tracing::debug!("pipe reached EOF");
                        pin.done = true;
                        return Poll::Ready(None);
                    }
                    pin.inbuf.extend_from_slice(filled);
                }
                Poll::Ready(Err(err)) => {
                    tracing::error!(%err, "pipe read failed");
                    pin.done = true;
                    return Poll::Ready(Some(Err(err.into())));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    // SAFETY: fd is owned and open for the duration of both calls.
    unsafe {
        let flags = libc::fcntl(fd.as_raw_fd(), libc::F_GETFL);
        if flags == -1 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::fd::{FromRawFd, IntoRawFd};

    use futures::StreamExt;

    use super::*;

    fn owned(fd: impl IntoRawFd) -> OwnedFd {
        unsafe { OwnedFd::from_raw_fd(fd.into_raw_fd()) }
    }

    /// A connection wired to a local peer: we keep the far ends of both
    /// pipes to play the browser.
    fn wired() -> (Connection, os_pipe::PipeWriter, os_pipe::PipeReader) {
        let (parent_read, peer_write) = os_pipe::pipe().unwrap();
        let (peer_read, parent_write) = os_pipe::pipe().unwrap();
        let conn = Connection::new(owned(parent_read), owned(parent_write)).unwrap();
        (conn, peer_write, peer_read)
    }

    #[tokio::test]
    async fn parses_null_delimited_frames() {
        let (mut conn, mut peer_write, _peer_read) = wired();
        peer_write
            .write_all(b"{\"id\":0,\"result\":{}}\0{\"method\":\"Page.loadEventFired\",\"params\":{}}\0")
            .unwrap();

        let first = conn.next().await.unwrap().unwrap();
        assert!(matches!(first, Message::Response(ref r) if r.id == CallId::new(0)));
        let second = conn.next().await.unwrap().unwrap();
        match second {
            Message::Event(ev) => assert_eq!(ev.method, "Page.loadEventFired"),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reassembles_frames_split_across_reads() {
        let (mut conn, mut peer_write, _peer_read) = wired();

        let handle = std::thread::spawn(move || {
            peer_write.write_all(b"{\"id\":3,\"re").unwrap();
            peer_write.flush().unwrap();
            std::thread::sleep(std::time::Duration::from_millis(50));
            peer_write.write_all(b"sult\":{\"ok\":true}}\0").unwrap();
        });

        let msg = conn.next().await.unwrap().unwrap();
        assert!(matches!(msg, Message::Response(ref r) if r.id == CallId::new(3)));
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn skips_unparseable_frame_and_continues() {
        let (mut conn, mut peer_write, _peer_read) = wired();
        peer_write
            .write_all(b"this is not json\0{\"id\":1,\"result\":{}}\0")
            .unwrap();

        let msg = conn.next().await.unwrap().unwrap();
        assert!(matches!(msg, Message::Response(ref r) if r.id == CallId::new(1)));
    }

    #[tokio::test]
    async fn eof_terminates_the_stream() {
        let (mut conn, peer_write, _peer_read) = wired();
        drop(peer_write);
        assert!(conn.next().await.is_none());
        // and stays terminated
        assert!(conn.next().await.is_none());
    }

    #[tokio::test]
    async fn writes_one_delimiter_per_frame() {
        use std::io::Read;

        let (mut conn, _peer_write, mut peer_read) = wired();
        conn.submit_command("Browser.getVersion".into(), None, serde_json::json!({}))
            .unwrap();
        conn.submit_command(
            "Page.navigate".into(),
            Some(SessionId::new("S1")),
            serde_json::json!({"url": "about:blank"}),
        )
        .unwrap();

        // Polling the stream drives the writes; nothing inbound arrives.
        let _ = tokio::time::timeout(std::time::Duration::from_millis(50), conn.next()).await;
        assert_eq!(conn.pending_writes(), 0);
        drop(conn);

        let mut raw = Vec::new();
        peer_read.read_to_end(&mut raw).unwrap();
        let frames: Vec<&[u8]> = raw.split(|&b| b == 0).filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(raw.iter().filter(|&&b| b == 0).count(), 2);

        let first: MethodCall = serde_json::from_slice(frames[0]).unwrap();
        assert_eq!(first.id, CallId::new(0));
        assert_eq!(first.method, "Browser.getVersion");
        assert_eq!(first.session_id, None);

        let second: MethodCall = serde_json::from_slice(frames[1]).unwrap();
        assert_eq!(second.id, CallId::new(1));
        assert_eq!(second.session_id.as_deref(), Some("S1"));
    }

    #[tokio::test]
    async fn command_ids_are_strictly_increasing() {
        let (mut conn, _peer_write, _peer_read) = wired();
        let mut last = None;
        for _ in 0..100 {
            let id = conn
                .submit_command("Browser.getVersion".into(), None, serde_json::json!({}))
                .unwrap();
            if let Some(prev) = last {
                assert!(id > prev);
            }
            last = Some(id);
        }
    }

    #[tokio::test]
    async fn browser_session_is_omitted_on_the_wire() {
        use std::io::Read;

        let (mut conn, _peer_write, mut peer_read) = wired();
        conn.submit_command(
            "Target.setDiscoverTargets".into(),
            Some(SessionId::browser()),
            serde_json::json!({"discover": true}),
        )
        .unwrap();
        let _ = tokio::time::timeout(std::time::Duration::from_millis(50), conn.next()).await;
        drop(conn);

        let mut raw = Vec::new();
        peer_read.read_to_end(&mut raw).unwrap();
        let frame: serde_json::Value = serde_json::from_slice(&raw[..raw.len() - 1]).unwrap();
        assert!(frame.get("sessionId").is_none());
    }

    #[tokio::test]
    async fn frame_larger_than_pipe_buffer_round_trips() {
        let (mut conn, _peer_write, mut peer_read) = wired();
        // Well beyond the default 64 KiB pipe capacity.
        let big = "x".repeat(1024 * 1024);
        conn.submit_command(
            "Runtime.evaluate".into(),
            None,
            serde_json::json!({ "expression": big }),
        )
        .unwrap();

        // Drain from a thread while the stream keeps writing under
        // back-pressure.
        let reader = std::thread::spawn(move || {
            use std::io::Read;
            let mut raw = Vec::new();
            peer_read.read_to_end(&mut raw).unwrap();
            raw
        });

        while conn.pending_writes() > 0 {
            let _ = tokio::time::timeout(std::time::Duration::from_millis(20), conn.next()).await;
        }
        drop(conn);

        let raw = reader.join().unwrap();
        assert_eq!(raw.iter().filter(|&&b| b == 0).count(), 1);
        let call: MethodCall = serde_json::from_slice(&raw[..raw.len() - 1]).unwrap();
        assert_eq!(call.params["expression"].as_str().unwrap().len(), 1024 * 1024);
    }
}

//! Launching and supervising the browser process.
//!
//! The browser inherits the child ends of two anonymous pipes on
//! descriptors 3 (commands in) and 4 (frames out), selected with
//! `--remote-debugging-pipe`. On Linux the pre-exec hook additionally
//! installs `prctl(PR_SET_PDEATHSIG, SIGTERM)` so the kernel tears the
//! browser down if the driver dies first; on other POSIX systems that
//! linkage is unavailable and an abandoned browser only exits once it
//! observes EOF on its command pipe.

use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures::channel::mpsc::UnboundedReceiver;
use futures::channel::oneshot;
use futures::StreamExt;
use tokio::process::{Child, Command};

use crate::browser::BrowserConfig;
use crate::conn::Connection;
use crate::error::{CdpError, Result};

/// How long the supervisor waits for the browser to exit on its own before
/// escalating, first to SIGTERM and then to SIGKILL.
const EXIT_GRACE_PERIOD: Duration = Duration::from_secs(5);

pub(crate) enum SupervisorMessage {
    /// The transport observed EOF or a fatal I/O error before the child was
    /// seen exiting.
    TransportClosed,
    /// Explicit shutdown; replies with the child's exit status once reaped.
    Shutdown(oneshot::Sender<ExitStatus>),
}

/// Create the pipe pair, spawn the browser with the child ends on fds 3/4,
/// and wire the parent ends into a [`Connection`].
pub(crate) fn launch(config: &BrowserConfig, data_dir: &Path) -> Result<(Child, Connection)> {
    // Pipe 1: driver -> browser, the browser reads commands from its fd 3.
    let (child_read, parent_write) = os_pipe::pipe()?;
    // Pipe 2: browser -> driver, the browser writes frames to its fd 4.
    let (parent_read, child_write) = os_pipe::pipe()?;

    let child_read_fd = child_read.into_raw_fd();
    let child_write_fd = child_write.into_raw_fd();
    let parent_read_fd = parent_read.into_raw_fd();
    let parent_write_fd = parent_write.into_raw_fd();

    let executable = config.executable();
    let args = config.build_args(data_dir);
    tracing::debug!(path = %executable.display(), ?args, "launching browser");

    let mut cmd = Command::new(&executable);
    cmd.args(args)
        .envs(config.envs())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // SAFETY: only async-signal-safe calls (dup2/fcntl/close/prctl) in the
    // fork-exec window.
    unsafe {
        cmd.pre_exec(move || {
            #[cfg(target_os = "linux")]
            {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM, 0, 0, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            install_child_fds(child_read_fd, child_write_fd)?;
            // The parent ends are inherited across fork; the browser must
            // not hold them open or it would never see EOF.
            libc::close(parent_read_fd);
            libc::close(parent_write_fd);
            Ok(())
        });
    }

    let spawned = cmd.spawn();

    // The parent keeps only its own ends, in either outcome.
    unsafe {
        libc::close(child_read_fd);
        libc::close(child_write_fd);
    }
    let parent_read = unsafe { OwnedFd::from_raw_fd(parent_read_fd) };
    let parent_write = unsafe { OwnedFd::from_raw_fd(parent_write_fd) };

    let child = spawned.map_err(|err| {
        CdpError::LaunchFailed(format!("{}: {err}", executable.display()))
    })?;
    let conn = Connection::new(parent_read, parent_write)?;
    Ok((child, conn))
}

/// Move the child's pipe ends onto descriptors 3 and 4, tolerating the
/// source descriptors already occupying either slot.
fn install_child_fds(mut read_fd: RawFd, mut write_fd: RawFd) -> std::io::Result<()> {
    unsafe {
        if write_fd == 3 {
            write_fd = libc::fcntl(write_fd, libc::F_DUPFD, 5);
            if write_fd == -1 {
                return Err(std::io::Error::last_os_error());
            }
        }
        if read_fd != 3 {
            if libc::dup2(read_fd, 3) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            if read_fd != 4 {
                libc::close(read_fd);
            }
        }
        if write_fd != 4 {
            if libc::dup2(write_fd, 4) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            if write_fd != 3 {
                libc::close(write_fd);
            }
        }
    }
    Ok(())
}

/// Await the child's exit and answer shutdown requests.
///
/// Runs until the browser handle asks for shutdown or is dropped; in both
/// cases the child is reaped before the task finishes, escalating through
/// SIGTERM to SIGKILL if it does not exit within the grace periods.
pub(crate) async fn supervise(mut child: Child, mut rx: UnboundedReceiver<SupervisorMessage>) {
    let mut status: Option<ExitStatus> = None;
    loop {
        tokio::select! {
            exited = child.wait(), if status.is_none() => {
                let exited = exited.unwrap_or_else(|_| default_status());
                tracing::debug!(status = %exited, "browser process exited");
                status = Some(exited);
            }
            msg = rx.next() => match msg {
                Some(SupervisorMessage::TransportClosed) => {
                    if status.is_none() {
                        status = Some(wait_with_grace(&mut child).await);
                    }
                }
                Some(SupervisorMessage::Shutdown(reply)) => {
                    let exited = match status {
                        Some(status) => status,
                        None => wait_with_grace(&mut child).await,
                    };
                    let _ = reply.send(exited);
                    return;
                }
                None => {
                    // Browser handle dropped without close; no grace.
                    if status.is_none() {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                    return;
                }
            }
        }
    }
}

async fn wait_with_grace(child: &mut Child) -> ExitStatus {
    if let Ok(Some(status)) = child.try_wait() {
        return status;
    }
    if let Ok(Ok(status)) = tokio::time::timeout(EXIT_GRACE_PERIOD, child.wait()).await {
        return status;
    }
    if let Some(pid) = child.id() {
        tracing::warn!(pid, "browser did not exit in time, sending SIGTERM");
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
    if let Ok(Ok(status)) = tokio::time::timeout(EXIT_GRACE_PERIOD, child.wait()).await {
        return status;
    }
    tracing::warn!("browser ignored SIGTERM, sending SIGKILL");
    let _ = child.start_kill();
    child.wait().await.unwrap_or_else(|_| default_status())
}

fn default_status() -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(0)
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc;

    use super::*;
    use crate::browser::BrowserConfig;

    /// A stand-in browser: a shell that answers one getVersion-style frame
    /// over the inherited descriptors and exits. Exercises the full fd 3/4
    /// plumbing without a real browser.
    fn fake_browser_config(dir: &Path) -> BrowserConfig {
        let script = dir.join("fake-chrome.sh");
        std::fs::write(
            &script,
            "#!/usr/bin/env bash\n\
             IFS= read -r -d '' msg <&3\n\
             printf '{\"id\":0,\"result\":{\"product\":\"FakeChrome/1.0\"}}\\0' >&4\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        BrowserConfig::builder().chrome_path(script).build().unwrap()
    }

    #[tokio::test]
    async fn child_inherits_pipe_ends_on_fds_3_and_4() {
        use futures::StreamExt;
        use pypecdp_types::Message;

        let dir = tempfile::tempdir().unwrap();
        let config = fake_browser_config(dir.path());
        let (mut child, mut conn) = launch(&config, dir.path()).unwrap();

        conn.submit_command("Browser.getVersion".into(), None, serde_json::json!({}))
            .unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(5), conn.next())
            .await
            .expect("no frame from child")
            .unwrap()
            .unwrap();
        match msg {
            Message::Response(resp) => {
                assert_eq!(resp.result.unwrap()["product"], "FakeChrome/1.0");
            }
            other => panic!("expected response, got {other:?}"),
        }
        let status = child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn supervisor_answers_shutdown_after_child_exit() {
        let dir = tempfile::tempdir().unwrap();
        let config = fake_browser_config(dir.path());
        let (child, conn) = launch(&config, dir.path()).unwrap();
        // Closing our ends makes the script's read fail and the child exit.
        drop(conn);

        let (tx, rx) = mpsc::unbounded();
        let task = tokio::spawn(supervise(child, rx));

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.unbounded_send(SupervisorMessage::Shutdown(reply_tx))
            .unwrap();
        let status = tokio::time::timeout(Duration::from_secs(10), reply_rx)
            .await
            .expect("supervisor did not reply")
            .unwrap();
        // The script exits non-zero when its read is cut short; reaping is
        // what matters here.
        let _ = status;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn supervisor_kills_child_when_browser_handle_drops() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sleeper.sh");
        std::fs::write(&script, "#!/usr/bin/env bash\nsleep 600\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let config = BrowserConfig::builder().chrome_path(script).build().unwrap();

        let (child, _conn) = launch(&config, dir.path()).unwrap();
        let (tx, rx) = mpsc::unbounded();
        let task = tokio::spawn(supervise(child, rx));
        drop(tx);
        // The sleeper would outlive the test by minutes were it not killed.
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor did not reap the child")
            .unwrap();
    }
}

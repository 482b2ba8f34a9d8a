use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::channel::oneshot;
use futures::{FutureExt, StreamExt};
use tempfile::TempDir;

use pypecdp_types::{CdpJsonEventMessage, Command, CommandResponse, MethodId};

use crate::cdp::browser_protocol::browser::{CloseParams, GetVersionParams, GetVersionReturns};
use crate::cdp::browser_protocol::target::{
    CreateTargetParams, SessionId, SetAutoAttachParams, SetDiscoverTargetsParams,
};
use crate::error::{CdpError, Result};
use crate::handler::session::{EventHandlerFn, ListenerId};
use crate::handler::{Handler, HandlerHandle, HandlerMessage, REQUEST_TIMEOUT};
use crate::process::{self, SupervisorMessage};
use crate::tab::Tab;

/// Environment variable consulted for the browser executable when the
/// config does not name one.
pub const CHROME_PATH_ENV: &str = "PYPECDP_CHROME_PATH";

/// Flags every launch carries unless the caller suppresses them by listing
/// a flag of the same name in `extra_args`.
static DEFAULT_ARGS: &[&str] = &[
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-breakpad",
    "--disable-features=Translate,BackForwardCache",
    "--disable-background-networking",
    "--disable-sync",
    "--disable-client-side-phishing-detection",
    "--disable-default-apps",
    "--disable-hang-monitor",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--mute-audio",
];

/// The entry point to the driver: owns the browser process, the pipe
/// transport and the session multiplexer.
///
/// Dropping an unclosed browser kills the child and removes an ephemeral
/// profile directory, so scoped usage cleans up on every exit path;
/// [`close`](Browser::close) does the same gracefully.
#[derive(Debug)]
pub struct Browser {
    handle: HandlerHandle,
    supervisor: UnboundedSender<SupervisorMessage>,
    tabs: Mutex<Vec<Tab>>,
    incoming_tabs: tokio::sync::Mutex<UnboundedReceiver<Tab>>,
    closed: AtomicBool,
    pid: Option<u32>,
    data_dir: Mutex<Option<UserDataDir>>,
    config: BrowserConfig,
}

impl Browser {
    /// Launch the browser and drive it until the first page target is
    /// attached.
    ///
    /// On any startup failure the child is killed, the pipes are closed and
    /// an ephemeral profile directory is removed before the error returns.
    pub async fn start(config: BrowserConfig) -> Result<Self> {
        let data_dir = UserDataDir::prepare(&config)?;

        let (child, conn) = match process::launch(&config, data_dir.path()) {
            Ok(launched) => launched,
            Err(err) => {
                data_dir.cleanup();
                return Err(err);
            }
        };
        let pid = child.id();

        let (handle_tx, handle_rx) = unbounded();
        let (tabs_tx, tabs_rx) = unbounded();
        let (sup_tx, sup_rx) = unbounded();

        let handle = HandlerHandle::new(handle_tx, config.request_timeout);
        let handler = Handler::new(
            conn,
            handle_rx,
            tabs_tx,
            sup_tx.clone(),
            handle.clone(),
            config.request_timeout,
        );
        tokio::spawn(handler);
        tokio::spawn(process::supervise(child, sup_rx));

        let browser = Self {
            handle,
            supervisor: sup_tx,
            tabs: Mutex::new(Vec::new()),
            incoming_tabs: tokio::sync::Mutex::new(tabs_rx),
            closed: AtomicBool::new(false),
            pid,
            data_dir: Mutex::new(Some(data_dir)),
            config,
        };

        match browser.init().await {
            Ok(()) => Ok(browser),
            Err(err) => {
                let _ = browser.close().await;
                Err(err)
            }
        }
    }

    /// Enable discovery and flat auto-attach, then wait for the first page
    /// target to arrive as an attached session.
    async fn init(&self) -> Result<()> {
        let timeout = self.config.startup_timeout;
        self.handle
            .execute_with_timeout(
                SetDiscoverTargetsParams::new(true),
                SessionId::browser(),
                timeout,
            )
            .await?;
        self.handle
            .execute_with_timeout(
                SetAutoAttachParams::new(true).flatten(true),
                SessionId::browser(),
                timeout,
            )
            .await?;

        let first = self.next_tab(timeout).await?;
        self.tabs.lock().unwrap().push(first);
        Ok(())
    }

    async fn next_tab(&self, timeout: Duration) -> Result<Tab> {
        let mut rx = self.incoming_tabs.lock().await;
        match tokio::time::timeout(timeout, rx.next()).await {
            Ok(Some(tab)) => Ok(tab),
            Ok(None) => Err(CdpError::ConnectionLost),
            Err(_elapsed) => Err(CdpError::Timeout),
        }
    }

    /// Move freshly attached tabs into the tab list.
    fn drain_incoming_tabs(&self) {
        if let Ok(mut rx) = self.incoming_tabs.try_lock() {
            let mut tabs = self.tabs.lock().unwrap();
            while let Ok(Some(tab)) = rx.try_next() {
                tabs.push(tab);
            }
        }
    }

    /// Issue a command on the browser-level session.
    pub async fn execute<T: Command>(&self, cmd: T) -> Result<CommandResponse<T::Response>> {
        self.handle.execute(cmd, SessionId::browser()).await
    }

    /// Navigate the most recently attached tab to the URL, creating a tab
    /// when none is alive. Returns once the browser accepted the
    /// navigation; waiting for the load is the caller's business.
    pub async fn navigate(&self, url: impl Into<String>) -> Result<Tab> {
        self.drain_incoming_tabs();
        let existing = {
            let tabs = self.tabs.lock().unwrap();
            tabs.iter().rev().find(|t| t.is_attached()).cloned()
        };
        let tab = match existing {
            Some(tab) => tab,
            None => {
                self.execute(CreateTargetParams::default()).await?;
                let tab = self.next_tab(self.config.startup_timeout).await?;
                self.tabs.lock().unwrap().push(tab.clone());
                tab
            }
        };
        tab.goto(url.into()).await?;
        Ok(tab)
    }

    /// All tabs attached so far that are still alive.
    pub fn tabs(&self) -> Vec<Tab> {
        self.drain_incoming_tabs();
        let mut tabs = self.tabs.lock().unwrap();
        tabs.retain(|t| t.is_attached());
        tabs.clone()
    }

    /// Version information about the browser.
    pub async fn version(&self) -> Result<GetVersionReturns> {
        Ok(self.execute(GetVersionParams::default()).await?.result)
    }

    /// Register a persistent handler for browser-session events of the
    /// given kind, e.g. the target lifecycle.
    pub fn on<F, Fut>(&self, method: impl Into<MethodId>, f: F) -> Result<ListenerId>
    where
        F: Fn(Arc<CdpJsonEventMessage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let f: EventHandlerFn = Arc::new(move |ev| f(ev).boxed());
        self.handle
            .add_listener(SessionId::browser(), method.into(), f)
    }

    /// Remove a handler previously registered with [`on`](Browser::on).
    pub fn off(&self, method: impl Into<MethodId>, id: ListenerId) -> Result<()> {
        self.handle
            .remove_listener(SessionId::browser(), method.into(), id)
    }

    /// Shut the browser down: ask it to close, tear down the transport,
    /// wait for the process to be reaped and apply the profile directory
    /// policy. Safe to call any number of times.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Best effort; the browser may already be gone.
        let _ = self
            .handle
            .execute_with_timeout(
                CloseParams::default(),
                SessionId::browser(),
                Duration::from_secs(2),
            )
            .await;
        let _ = self.handle.send(HandlerMessage::Shutdown);

        let (tx, rx) = oneshot::channel();
        if self
            .supervisor
            .unbounded_send(SupervisorMessage::Shutdown(tx))
            .is_ok()
        {
            let _ = rx.await;
        }

        if let Some(dir) = self.data_dir.lock().unwrap().take() {
            dir.cleanup();
        }
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        // No graceful path left; the supervisor task may already be gone,
        // so the kill happens here.
        if let Some(pid) = self.pid {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }
        }
        if let Some(dir) = self.data_dir.lock().unwrap().take() {
            dir.cleanup();
        }
    }
}

/// The user data directory backing the launched profile.
#[derive(Debug)]
enum UserDataDir {
    /// Driver-allocated, always removed on close.
    Ephemeral(TempDir),
    /// Caller-provided, wiped at start and close only when
    /// `clean_data_dir` is set.
    Configured { path: PathBuf, clean: bool },
}

impl UserDataDir {
    fn prepare(config: &BrowserConfig) -> Result<Self> {
        match &config.user_data_dir {
            Some(path) => {
                if config.clean_data_dir {
                    remove_dir_if_present(path)?;
                }
                std::fs::create_dir_all(path)?;
                Ok(UserDataDir::Configured {
                    path: path.clone(),
                    clean: config.clean_data_dir,
                })
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("pypecdp-profile-")
                    .tempdir()?;
                Ok(UserDataDir::Ephemeral(dir))
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            UserDataDir::Ephemeral(dir) => dir.path(),
            UserDataDir::Configured { path, .. } => path,
        }
    }

    fn cleanup(self) {
        match self {
            UserDataDir::Ephemeral(dir) => {
                if let Err(err) = dir.close() {
                    tracing::warn!(%err, "failed to remove ephemeral profile dir");
                }
            }
            UserDataDir::Configured { path, clean } => {
                if clean {
                    if let Err(err) = remove_dir_if_present(&path) {
                        tracing::warn!(%err, path = %path.display(), "failed to clean profile dir");
                    }
                }
            }
        }
    }
}

fn remove_dir_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Launch configuration, assembled through [`BrowserConfig::builder`].
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Path of the browser executable.
    ///
    /// If unspecified, `PYPECDP_CHROME_PATH` and then the usual binary
    /// names on the search path are consulted.
    pub(crate) chrome_path: Option<PathBuf>,
    pub(crate) user_data_dir: Option<PathBuf>,
    /// Wipe a configured user data dir at start and on close. Defaults to
    /// true. Ephemeral dirs are always removed.
    pub(crate) clean_data_dir: bool,
    /// Determines whether to run the browser headless. Defaults to true.
    pub(crate) headless: bool,
    /// Additional flags, appended after the defaults. A flag spelled here
    /// suppresses the default of the same name.
    pub(crate) extra_args: Vec<String>,
    /// Environment variables set for the browser process on top of the
    /// driver's own environment.
    pub(crate) envs: HashMap<String, String>,
    /// How long to wait for the first page target at startup.
    pub(crate) startup_timeout: Duration,
    /// Deadline for a single command round trip.
    pub(crate) request_timeout: Duration,
}

impl BrowserConfig {
    pub fn builder() -> BrowserConfigBuilder {
        BrowserConfigBuilder::default()
    }

    pub(crate) fn executable(&self) -> PathBuf {
        if let Some(path) = &self.chrome_path {
            return path.clone();
        }
        default_executable()
    }

    pub(crate) fn envs(&self) -> &HashMap<String, String> {
        &self.envs
    }

    /// The full argv after the executable, with caller overrides applied.
    pub(crate) fn build_args(&self, data_dir: &Path) -> Vec<String> {
        let suppressed: Vec<&str> = self
            .extra_args
            .iter()
            .map(|arg| flag_name(arg))
            .collect();

        let mut args = vec!["--remote-debugging-pipe".to_string()];
        let user_data_dir = format!("--user-data-dir={}", data_dir.display());
        if !suppressed.contains(&flag_name(&user_data_dir)) {
            args.push(user_data_dir);
        }
        for default in DEFAULT_ARGS {
            if !suppressed.contains(&flag_name(default)) {
                args.push((*default).to_string());
            }
        }
        if self.headless && !suppressed.contains(&"--headless") {
            args.push("--headless=new".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            user_data_dir: None,
            clean_data_dir: true,
            headless: true,
            extra_args: Vec::new(),
            envs: HashMap::new(),
            startup_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT),
        }
    }
}

#[derive(Debug, Default)]
pub struct BrowserConfigBuilder {
    config: BrowserConfig,
}

impl BrowserConfigBuilder {
    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.user_data_dir = Some(dir.into());
        self
    }

    pub fn clean_data_dir(mut self, clean: bool) -> Self {
        self.config.clean_data_dir = clean;
        self
    }

    pub fn with_head(mut self) -> Self {
        self.config.headless = false;
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.config.extra_args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.envs.insert(key.into(), value.into());
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.config.startup_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<BrowserConfig, String> {
        if let Some(path) = &self.config.chrome_path {
            if !path.exists() {
                return Err(format!("browser executable not found: {}", path.display()));
            }
        }
        Ok(self.config)
    }
}

/// The flag's name, the part before any `=`.
fn flag_name(arg: &str) -> &str {
    arg.split('=').next().unwrap_or(arg)
}

/// Returns the path to the browser executable.
///
/// Consults `PYPECDP_CHROME_PATH` first, then searches the path for the
/// usual binary names, falling back to plain `chromium` so the OS gets the
/// last word.
pub fn default_executable() -> PathBuf {
    if let Ok(path) = std::env::var(CHROME_PATH_ENV) {
        if Path::new(&path).exists() {
            return path.into();
        }
    }

    for app in &[
        "chromium",
        "chromium-browser",
        "google-chrome-stable",
        "google-chrome",
        "chrome",
    ] {
        if let Ok(path) = which::which(app) {
            return path;
        }
    }

    PathBuf::from("chromium")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_args_are_present() {
        let config = BrowserConfig::default();
        let args = config.build_args(Path::new("/tmp/profile"));
        assert_eq!(args[0], "--remote-debugging-pipe");
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--no-first-run".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn headful_omits_headless_flag() {
        let config = BrowserConfig {
            headless: false,
            ..Default::default()
        };
        let args = config.build_args(Path::new("/tmp/profile"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn extra_arg_suppresses_default_of_same_name() {
        let config = BrowserConfig {
            extra_args: vec!["--disable-features=Translate".to_string()],
            ..Default::default()
        };
        let args = config.build_args(Path::new("/tmp/profile"));
        let features: Vec<&String> = args
            .iter()
            .filter(|a| a.starts_with("--disable-features"))
            .collect();
        assert_eq!(features, vec!["--disable-features=Translate"]);
    }

    #[test]
    fn extra_arg_can_replace_headless_mode() {
        let config = BrowserConfig {
            extra_args: vec!["--headless=old".to_string()],
            ..Default::default()
        };
        let args = config.build_args(Path::new("/tmp/profile"));
        let headless: Vec<&String> = args
            .iter()
            .filter(|a| a.starts_with("--headless"))
            .collect();
        assert_eq!(headless, vec!["--headless=old"]);
    }

    #[test]
    fn remote_debugging_pipe_cannot_be_suppressed() {
        let config = BrowserConfig {
            extra_args: vec!["--remote-debugging-pipe".to_string()],
            ..Default::default()
        };
        let args = config.build_args(Path::new("/tmp/profile"));
        assert_eq!(args[0], "--remote-debugging-pipe");
    }

    #[test]
    fn builder_rejects_missing_executable() {
        let err = BrowserConfig::builder()
            .chrome_path("/nonexistent/browser-binary")
            .build()
            .unwrap_err();
        assert!(err.contains("not found"));
    }

    #[test]
    fn configured_dir_survives_when_clean_is_off() {
        let dir = tempfile::tempdir().unwrap();
        let profile = dir.path().join("profile");
        let config = BrowserConfig {
            user_data_dir: Some(profile.clone()),
            clean_data_dir: false,
            ..Default::default()
        };
        let data_dir = UserDataDir::prepare(&config).unwrap();
        std::fs::write(profile.join("marker"), b"keep").unwrap();
        data_dir.cleanup();
        assert!(profile.join("marker").exists());
    }

    #[test]
    fn configured_dir_is_wiped_when_clean_is_on() {
        let dir = tempfile::tempdir().unwrap();
        let profile = dir.path().join("profile");
        std::fs::create_dir_all(&profile).unwrap();
        std::fs::write(profile.join("stale"), b"old").unwrap();

        let config = BrowserConfig {
            user_data_dir: Some(profile.clone()),
            ..Default::default()
        };
        let data_dir = UserDataDir::prepare(&config).unwrap();
        // wiped at start
        assert!(!profile.join("stale").exists());
        assert!(profile.exists());
        data_dir.cleanup();
        // and removed on close
        assert!(!profile.exists());
    }

    #[test]
    fn ephemeral_dir_is_always_removed() {
        let config = BrowserConfig::default();
        let data_dir = UserDataDir::prepare(&config).unwrap();
        let path = data_dir.path().to_path_buf();
        assert!(path.exists());
        data_dir.cleanup();
        assert!(!path.exists());
    }
}

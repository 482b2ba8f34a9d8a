//! Chrome automation over the DevTools protocol's pipe transport.
//!
//! The driver launches a local Chromium with `--remote-debugging-pipe`,
//! speaks NUL-delimited JSON frames over a pair of inherited anonymous
//! pipes, and multiplexes commands, responses and events across the
//! attached sessions. On top of that sit [`Browser`], [`Tab`] and
//! [`Element`].
//!
//! ```no_run
//! use pypecdp::{Browser, BrowserConfig};
//!
//! # async fn run() -> pypecdp::Result<()> {
//! let config = BrowserConfig::builder().build().expect("valid config");
//! let browser = Browser::start(config).await?;
//!
//! let tab = browser.navigate("https://en.wikipedia.org").await?;
//! tab.wait_for_element("#searchInput", std::time::Duration::from_secs(5))
//!     .await?
//!     .type_str("Rust programming language")
//!     .await?;
//!
//! browser.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Only POSIX systems are supported; the transport rests on anonymous
//! pipes and file-descriptor inheritance.

pub mod browser;
pub mod cdp;
pub mod conn;
pub mod element;
pub mod error;
mod handler;
mod process;
pub mod tab;

pub use crate::browser::{default_executable, Browser, BrowserConfig, BrowserConfigBuilder};
pub use crate::element::Element;
pub use crate::error::{CdpError, Result};
pub use crate::handler::session::ListenerId;
pub use crate::tab::Tab;

pub use pypecdp_types as types;

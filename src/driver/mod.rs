//! Page-driver capability consumed by the crawl pipeline.
//!
//! The crawler only needs to navigate, read the rendered document, and
//! poke at on-page controls. Everything else (transport, rendering,
//! session identity) is the driver's problem, which keeps the pipeline
//! testable against a scripted in-memory implementation.

#[cfg(feature = "browser")]
mod browser;

#[cfg(feature = "browser")]
pub use browser::CdpDriver;

use anyhow::Result;
use async_trait::async_trait;

/// Opaque handle to an on-page control located by `find_control`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    /// Selector that matched when the control was located.
    pub selector: String,
}

/// Capability for fetching and interacting with rendered pages.
///
/// A driver holds one session at a time. `restart` discards the current
/// session and builds a fresh one (new identity and context), which is
/// how the recovery controller sheds soft bans keyed to a session.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate to a URL and return the rendered document.
    async fn navigate(&mut self, url: &str) -> Result<String>;

    /// Return the currently rendered document without navigating.
    async fn current_content(&mut self) -> Result<String>;

    /// Locate a control by trying selectors in order; `None` when no
    /// selector matches anything on the page.
    async fn find_control(&mut self, selectors: &[String]) -> Result<Option<Control>>;

    /// Primary activation path (a real click). Returns false when the
    /// control could not be activated.
    async fn activate(&mut self, control: &Control) -> Result<bool>;

    /// Fallback activation path, tried when `activate` fails.
    async fn activate_fallback(&mut self, control: &Control) -> Result<bool>;

    /// Discard the session and start a fresh one.
    async fn restart(&mut self) -> Result<()>;
}

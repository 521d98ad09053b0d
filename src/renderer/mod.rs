//! Rendering engine capability surface.
//!
//! The harvesting core only ever talks to a page through these two traits.
//! [`chromium::ChromiumRenderer`] drives a real headless browser;
//! [`snapshot::SnapshotRenderer`] replays saved HTML.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod chromium;
pub mod snapshot;

pub use chromium::{BrowserOptions, ChromiumRenderer};
pub use snapshot::{SnapshotContainer, SnapshotRenderer};

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },
    #[error("query `{selector}` failed: {message}")]
    Query { selector: String, message: String },
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("failed to shut down renderer: {0}")]
    Shutdown(String),
    #[error("renderer session is closed")]
    Closed,
}

/// Condition a page load waits for before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Load event fired and no new network activity for a short window.
    NetworkIdle,
    /// Document parsed; subresources may still be loading.
    DomContentLoaded,
}

/// A rendered element that represents one candidate post.
#[async_trait]
pub trait Container: Send + Sync {
    /// All descendants matching `selector`, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Container>>, RendererError>;

    /// First descendant matching `selector`, if any.
    async fn query_single(&self, selector: &str)
        -> Result<Option<Box<dyn Container>>, RendererError>;

    /// Attribute value, `None` when the attribute is absent.
    async fn attribute(&self, name: &str) -> Result<Option<String>, RendererError>;

    /// Rendered text of the element and its descendants.
    async fn inner_text(&self) -> Result<String, RendererError>;
}

/// A page session inside the rendering engine.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Navigate to `url`, returning once `strategy` is satisfied or `timeout` elapses.
    async fn load_url(
        &self,
        url: &str,
        timeout: Duration,
        strategy: WaitStrategy,
    ) -> Result<(), RendererError>;

    /// Wait until at least one element matches `selector`.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
        -> Result<(), RendererError>;

    /// All elements on the page matching `selector`.
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Container>>, RendererError>;

    /// Run a script in the page. Only used to issue scroll commands.
    async fn execute_script(&self, script: &str) -> Result<(), RendererError>;

    /// Release the session. Safe to call more than once.
    async fn close(&self) -> Result<(), RendererError>;
}

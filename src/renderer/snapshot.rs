//! Offline renderer over saved HTML.
//!
//! Each frame is a full HTML document standing in for what the page shows at
//! one scroll position. Running a script (the scroll command) advances to the
//! next frame; the last frame repeats once reached, like a feed that has run
//! out of content.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{Container, Renderer, RendererError, WaitStrategy};

fn parse_selector(selector: &str) -> Result<Selector, RendererError> {
    Selector::parse(selector).map_err(|e| RendererError::Query {
        selector: selector.to_string(),
        message: format!("{e:?}"),
    })
}

fn wrap(elements: impl Iterator<Item = String>) -> Vec<Box<dyn Container>> {
    elements
        .map(|html| Box::new(SnapshotContainer::from_html(html)) as Box<dyn Container>)
        .collect()
}

/// A detached element, stored as its outer HTML.
///
/// The fragment is re-parsed per query so the container stays `Send`.
#[derive(Debug, Clone)]
pub struct SnapshotContainer {
    html: String,
}

impl SnapshotContainer {
    #[must_use]
    pub fn from_html(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Run `f` against the element this container wraps.
    fn with_element<T>(&self, f: impl FnOnce(ElementRef<'_>) -> T) -> Option<T> {
        let fragment = Html::parse_fragment(&self.html);
        let root = fragment
            .root_element()
            .children()
            .find_map(ElementRef::wrap)?;
        Some(f(root))
    }

    fn select_html(&self, selector: &str) -> Result<Vec<String>, RendererError> {
        let selector = parse_selector(selector)?;
        Ok(self
            .with_element(|root| {
                root.select(&selector)
                    .filter(|el| el.id() != root.id())
                    .map(|el| el.html())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl Container for SnapshotContainer {
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Container>>, RendererError> {
        Ok(wrap(self.select_html(selector)?.into_iter()))
    }

    async fn query_single(
        &self,
        selector: &str,
    ) -> Result<Option<Box<dyn Container>>, RendererError> {
        Ok(wrap(self.select_html(selector)?.into_iter().take(1)).pop())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, RendererError> {
        Ok(self
            .with_element(|el| el.value().attr(name).map(str::to_string))
            .flatten())
    }

    /// Concatenated text nodes (`textContent`), which is close to but not
    /// identical with a browser's `innerText`.
    async fn inner_text(&self) -> Result<String, RendererError> {
        Ok(self
            .with_element(|el| el.text().collect::<String>())
            .unwrap_or_default())
    }
}

/// A renderer that serves pre-rendered HTML frames.
#[derive(Debug)]
pub struct SnapshotRenderer {
    frames: Vec<String>,
    cursor: AtomicUsize,
    closed: AtomicBool,
}

impl SnapshotRenderer {
    /// A renderer that always shows one document.
    #[must_use]
    pub fn from_html(html: impl Into<String>) -> Self {
        Self::from_frames(vec![html.into()])
    }

    /// A renderer that advances through `frames` on each scroll.
    #[must_use]
    pub fn from_frames(frames: Vec<String>) -> Self {
        Self {
            frames,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Load a single saved document from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn from_file(path: &Path) -> std::io::Result<Self> {
        let html = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_html(html))
    }

    /// Index of the frame currently shown.
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), RendererError> {
        if self.is_closed() {
            Err(RendererError::Closed)
        } else {
            Ok(())
        }
    }

    fn current_frame(&self) -> &str {
        self.frames
            .get(self.position())
            .or_else(|| self.frames.last())
            .map_or("", String::as_str)
    }

    fn select_html(&self, selector: &str) -> Result<Vec<String>, RendererError> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(self.current_frame());
        Ok(document.select(&selector).map(|el| el.html()).collect())
    }
}

#[async_trait]
impl Renderer for SnapshotRenderer {
    async fn load_url(
        &self,
        url: &str,
        _timeout: Duration,
        strategy: WaitStrategy,
    ) -> Result<(), RendererError> {
        self.ensure_open()?;
        debug!(url = %url, ?strategy, frames = self.frames.len(), "Serving saved snapshot");
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), RendererError> {
        self.ensure_open()?;
        if self.select_html(selector)?.is_empty() {
            Err(RendererError::Timeout {
                what: format!("waiting for `{selector}`"),
                after: timeout,
            })
        } else {
            Ok(())
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Container>>, RendererError> {
        self.ensure_open()?;
        Ok(wrap(self.select_html(selector)?.into_iter()))
    }

    async fn execute_script(&self, _script: &str) -> Result<(), RendererError> {
        self.ensure_open()?;
        let last = self.frames.len().saturating_sub(1);
        let _ = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pos| {
                Some((pos + 1).min(last))
            });
        Ok(())
    }

    async fn close(&self) -> Result<(), RendererError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <article id="one"><a href="/a/status/1">link</a><time datetime="2024-01-01T00:00:00Z">Jan 1</time></article>
          <article id="two"><div lang="en">Hello <b>there</b></div><img src="x.png"><img src="y.png"></article>
        </body></html>
    "#;

    #[tokio::test]
    async fn test_query_all_and_attributes() {
        let renderer = SnapshotRenderer::from_html(PAGE);
        let articles = renderer.query_all("article").await.unwrap();
        assert_eq!(articles.len(), 2);

        assert_eq!(
            articles[0].attribute("id").await.unwrap().as_deref(),
            Some("one")
        );
        assert_eq!(articles[0].attribute("missing").await.unwrap(), None);

        let time = articles[0].query_single("time").await.unwrap().unwrap();
        assert_eq!(
            time.attribute("datetime").await.unwrap().as_deref(),
            Some("2024-01-01T00:00:00Z")
        );

        let images = articles[1].query_all("img").await.unwrap();
        assert_eq!(images.len(), 2);
        assert!(articles[1].query_single("time").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inner_text_includes_descendants() {
        let renderer = SnapshotRenderer::from_html(PAGE);
        let articles = renderer.query_all("article").await.unwrap();
        let content = articles[1].query_single("div[lang]").await.unwrap().unwrap();
        assert_eq!(content.inner_text().await.unwrap(), "Hello there");
    }

    #[tokio::test]
    async fn test_container_query_excludes_itself() {
        let container = SnapshotContainer::from_html("<article><article>inner</article></article>");
        assert_eq!(container.query_all("article").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scroll_advances_and_clamps() {
        let renderer = SnapshotRenderer::from_frames(vec![
            "<article>a</article>".to_string(),
            "<article>a</article><article>b</article>".to_string(),
        ]);
        assert_eq!(renderer.query_all("article").await.unwrap().len(), 1);

        renderer.execute_script("scroll").await.unwrap();
        renderer.execute_script("scroll").await.unwrap();
        assert_eq!(renderer.position(), 1);
        assert_eq!(renderer.query_all("article").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_selector_and_close() {
        let renderer = SnapshotRenderer::from_html(PAGE);
        assert!(renderer
            .wait_for_selector("article", Duration::from_secs(1))
            .await
            .is_ok());
        assert!(matches!(
            renderer.wait_for_selector("section", Duration::from_secs(1)).await,
            Err(RendererError::Timeout { .. })
        ));

        renderer.close().await.unwrap();
        assert!(renderer.is_closed());
        assert!(matches!(
            renderer.query_all("article").await,
            Err(RendererError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_invalid_selector_is_query_error() {
        let renderer = SnapshotRenderer::from_html(PAGE);
        assert!(matches!(
            renderer.query_all("[[").await,
            Err(RendererError::Query { .. })
        ));
    }
}

//! One complete harvest run: load, collect, close, filter, order, persist.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::collector::{Collector, StopReason};
use crate::config::Config;
use crate::filter::{FilterMode, PostFilter};
use crate::navigator::Navigator;
use crate::output::Snapshot;
use crate::renderer::{ChromiumRenderer, Renderer, SnapshotRenderer};
use crate::sequencer;

/// What a run did, for logging by the caller.
#[derive(Debug, Clone)]
pub struct HarvestSummary {
    pub url: String,
    /// Whether navigation succeeded within its attempt budget.
    pub navigated: bool,
    pub stop_reason: StopReason,
    /// Unique posts collected before filtering.
    pub collected: usize,
    /// Posts that passed the filter.
    pub matched: usize,
    /// Posts written after ordering and truncation.
    pub written: usize,
    pub output_path: PathBuf,
}

pub struct Harvester {
    config: Config,
}

impl Harvester {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open a renderer for the configured source and run the harvest.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration has no source, the renderer
    /// cannot be opened, or the snapshot cannot be written.
    pub async fn run(&self) -> Result<HarvestSummary> {
        if let Some(path) = &self.config.from_html {
            info!(path = %path.display(), "Replaying saved page");
            let renderer = SnapshotRenderer::from_file(path)
                .await
                .with_context(|| format!("Failed to read HTML from {}", path.display()))?;
            return self.run_with(&renderer).await;
        }

        let renderer = ChromiumRenderer::launch(&self.config.browser_options())
            .await
            .context("Failed to launch browser")?;
        self.run_with(&renderer).await
    }

    /// Run the harvest against an already-open renderer.
    ///
    /// The renderer is closed once collection ends, before anything is
    /// filtered or written, whether or not navigation succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration has no source or the snapshot
    /// cannot be written.
    pub async fn run_with(&self, renderer: &dyn Renderer) -> Result<HarvestSummary> {
        let source = match self.config.source() {
            Ok(source) => source,
            Err(e) => {
                close_renderer(renderer).await;
                return Err(e).context("Invalid configuration");
            }
        };
        let url = source.url();
        info!(url = %url, target = source.target_label(), "Starting harvest");

        let navigated = Navigator::new(renderer, self.config.navigation_policy())
            .navigate(&url)
            .await;
        if navigated {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let report = Collector::new(renderer, self.config.collection_limits())
            .run()
            .await;

        close_renderer(renderer).await;

        let collected = report.posts.len();
        let mut posts = report.posts.into_posts();

        let filter = self.config.filter();
        if let Some(filter) = &filter {
            posts = filter.apply(posts);
        }
        let matched = posts.len();

        let posts = sequencer::sequence(posts, self.config.max_posts);
        let written = posts.len();

        // Mode flags only describe a filter that actually ran.
        let mode = filter.as_ref().map(PostFilter::mode);
        let snapshot = Snapshot::new(
            Utc::now(),
            source.target_label(),
            filter.as_ref().map(|f| f.query().to_string()),
            mode == Some(FilterMode::Regex),
            mode == Some(FilterMode::Exact),
            posts,
        );
        snapshot
            .write_to(&self.config.output_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to write snapshot to {}",
                    self.config.output_path.display()
                )
            })?;

        Ok(HarvestSummary {
            url,
            navigated,
            stop_reason: report.stop_reason,
            collected,
            matched,
            written,
            output_path: self.config.output_path.clone(),
        })
    }
}

async fn close_renderer(renderer: &dyn Renderer) {
    if let Err(e) = renderer.close().await {
        warn!(error = %e, "Failed to close renderer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: u32, day: u32) -> String {
        format!(
            r#"<article><a href="/someone/status/{id}">t</a><time datetime="2024-01-{day:02}T00:00:00.000Z"></time><div lang="en">post {id}</div></article>"#
        )
    }

    #[tokio::test]
    async fn test_closes_renderer_when_source_missing() {
        let renderer = SnapshotRenderer::from_html("<html></html>");
        let harvester = Harvester::new(Config::for_testing());

        assert!(harvester.run_with(&renderer).await.is_err());
        assert!(renderer.is_closed());
    }

    #[tokio::test]
    async fn test_run_with_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            target: Some("someone".to_string()),
            output_path: dir.path().join("posts.json"),
            ..Config::for_testing()
        };
        let renderer = SnapshotRenderer::from_html(format!(
            "<html><body>{}{}</body></html>",
            article(1, 1),
            article(2, 2)
        ));

        let summary = Harvester::new(config).run_with(&renderer).await.unwrap();

        assert!(renderer.is_closed());
        assert!(summary.navigated);
        assert_eq!(summary.url, "https://x.com/someone");
        assert_eq!(summary.stop_reason, StopReason::Idle);
        assert_eq!(summary.collected, 2);
        assert_eq!(summary.written, 2);

        let written: Snapshot =
            serde_json::from_str(&std::fs::read_to_string(&summary.output_path).unwrap()).unwrap();
        assert_eq!(written.target, "someone");
        assert_eq!(written.posts[0].id, "2");
    }

    #[tokio::test]
    async fn test_mode_flags_require_a_filter() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            target: Some("someone".to_string()),
            filter_mode: FilterMode::Regex,
            output_path: dir.path().join("posts.json"),
            ..Config::for_testing()
        };
        let renderer = SnapshotRenderer::from_html(format!(
            "<html><body>{}</body></html>",
            article(1, 1)
        ));

        let summary = Harvester::new(config).run_with(&renderer).await.unwrap();

        let written: Snapshot =
            serde_json::from_str(&std::fs::read_to_string(&summary.output_path).unwrap()).unwrap();
        assert_eq!(written.query, None);
        assert!(!written.regex);
        assert!(!written.exact);
        assert_eq!(written.count, 1);
    }
}

//! The scroll-and-collect loop.
//!
//! Each cycle queries the rendered post containers, extracts them, merges the
//! records into the id-keyed set, and scrolls. The same post is usually seen
//! on several consecutive cycles; the set absorbs that. A scroll that yields
//! nothing new is tolerated up to [`IDLE_ROUND_LIMIT`] times in a row, since
//! the page loads lazily and may need a few rounds before more content shows.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::{IDLE_ROUND_LIMIT, POST_CONTAINER_SELECTOR, SCROLL_SCRIPT};
use crate::extractor;
use crate::post::PostSet;
use crate::renderer::Renderer;

/// Budgets for one collection run.
#[derive(Debug, Clone)]
pub struct CollectionLimits {
    /// Stop once this many unique posts are collected.
    pub max_posts: usize,
    /// Stop after this many scroll commands.
    pub max_scrolls: usize,
    /// Stop after this many consecutive cycles without a new post.
    pub idle_rounds: usize,
    /// Pause after each scroll for new content to render.
    pub scroll_pause: Duration,
}

impl Default for CollectionLimits {
    fn default() -> Self {
        Self {
            max_posts: 500,
            max_scrolls: 60,
            idle_rounds: IDLE_ROUND_LIMIT,
            scroll_pause: Duration::from_secs(1),
        }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    ScrollBudgetExhausted,
    Idle,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TargetReached => "target reached",
            Self::ScrollBudgetExhausted => "scroll budget exhausted",
            Self::Idle => "no new posts",
        })
    }
}

/// What a collection run produced.
#[derive(Debug)]
pub struct CollectionReport {
    pub posts: PostSet,
    /// Query/extract/merge cycles run.
    pub cycles: usize,
    /// Scroll commands issued.
    pub scrolls: usize,
    pub stop_reason: StopReason,
}

/// Drives the collection cycles against a loaded page.
pub struct Collector<'a> {
    renderer: &'a dyn Renderer,
    limits: CollectionLimits,
}

impl<'a> Collector<'a> {
    #[must_use]
    pub fn new(renderer: &'a dyn Renderer, limits: CollectionLimits) -> Self {
        Self { renderer, limits }
    }

    fn stop_reason(&self, collected: usize, scrolls: usize, idle: usize) -> Option<StopReason> {
        if collected >= self.limits.max_posts {
            Some(StopReason::TargetReached)
        } else if scrolls >= self.limits.max_scrolls {
            Some(StopReason::ScrollBudgetExhausted)
        } else if idle >= self.limits.idle_rounds {
            Some(StopReason::Idle)
        } else {
            None
        }
    }

    /// Run cycles until a budget or convergence condition is met.
    pub async fn run(&self) -> CollectionReport {
        let mut posts = PostSet::new();
        let mut last_count = 0usize;
        let mut idle = 0usize;
        let mut scrolls = 0usize;
        let mut cycles = 0usize;

        let stop_reason = loop {
            if let Some(reason) = self.stop_reason(posts.len(), scrolls, idle) {
                break reason;
            }

            let containers = match self.renderer.query_all(POST_CONTAINER_SELECTOR).await {
                Ok(containers) => containers,
                Err(e) => {
                    warn!(error = %e, "Failed to query post containers; treating as empty");
                    Vec::new()
                }
            };

            let batch = extractor::extract(&containers).await;
            let added = posts.merge(batch);
            cycles += 1;

            let current = posts.len();
            info!(
                cycle = scrolls,
                articles = containers.len(),
                new = added,
                unique = current,
                "Collection cycle"
            );

            if current == last_count {
                idle += 1;
                debug!(idle, limit = self.limits.idle_rounds, "No new posts this cycle");
            } else {
                idle = 0;
                last_count = current;
            }

            if current >= self.limits.max_posts {
                break StopReason::TargetReached;
            }

            if let Err(e) = self.renderer.execute_script(SCROLL_SCRIPT).await {
                warn!(error = %e, "Scroll command failed");
            }
            tokio::time::sleep(self.limits.scroll_pause).await;
            scrolls += 1;
        };

        info!(
            %stop_reason,
            cycles,
            scrolls,
            unique = posts.len(),
            "Collection finished"
        );

        CollectionReport {
            posts,
            cycles,
            scrolls,
            stop_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::SnapshotRenderer;

    fn article(id: u32) -> String {
        format!(
            r#"<article><a href="/someone/status/{id}">t</a><div lang="en">post {id}</div></article>"#
        )
    }

    fn page(ids: std::ops::Range<u32>) -> String {
        let body: String = ids.map(article).collect();
        format!("<html><body>{body}</body></html>")
    }

    fn limits(max_posts: usize, max_scrolls: usize) -> CollectionLimits {
        CollectionLimits {
            max_posts,
            max_scrolls,
            scroll_pause: Duration::ZERO,
            ..CollectionLimits::default()
        }
    }

    #[tokio::test]
    async fn test_stops_when_target_reached_without_scrolling() {
        let renderer = SnapshotRenderer::from_html(page(0..10));
        let report = Collector::new(&renderer, limits(5, 60)).run().await;

        assert_eq!(report.stop_reason, StopReason::TargetReached);
        assert_eq!(report.posts.len(), 10);
        assert_eq!(report.cycles, 1);
        assert_eq!(report.scrolls, 0);
    }

    #[tokio::test]
    async fn test_stops_on_scroll_budget() {
        let frames = (1..=10).map(|n| page(0..n * 2)).collect();
        let renderer = SnapshotRenderer::from_frames(frames);
        let report = Collector::new(&renderer, limits(500, 3)).run().await;

        assert_eq!(report.stop_reason, StopReason::ScrollBudgetExhausted);
        assert_eq!(report.scrolls, 3);
        assert_eq!(report.cycles, 3);
        assert_eq!(report.posts.len(), 6);
    }

    #[tokio::test]
    async fn test_growth_resets_idle_count() {
        // One post, four stalled frames, then a second post that never grows.
        let mut frames = vec![page(0..1); 5];
        frames.push(page(0..2));
        let renderer = SnapshotRenderer::from_frames(frames);
        let report = Collector::new(&renderer, limits(500, 60)).run().await;

        assert_eq!(report.stop_reason, StopReason::Idle);
        assert_eq!(report.posts.len(), 2);
        // Cycle 6 grows after 4 idle cycles; 5 more idle cycles follow.
        assert_eq!(report.cycles, 6 + IDLE_ROUND_LIMIT);
    }

    #[tokio::test]
    async fn test_empty_page_goes_idle() {
        let renderer = SnapshotRenderer::from_html("<html><body></body></html>");
        let report = Collector::new(&renderer, limits(500, 60)).run().await;

        assert_eq!(report.stop_reason, StopReason::Idle);
        assert_eq!(report.cycles, IDLE_ROUND_LIMIT);
        assert!(report.posts.is_empty());
    }
}

//! Integration tests for navigation retries and the parsed-document fallback.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use timeline_harvester::collector::{CollectionLimits, Collector, StopReason};
use timeline_harvester::navigator::{NavigationOutcome, NavigationPolicy, Navigator};
use timeline_harvester::renderer::{Container, Renderer, RendererError, WaitStrategy};

/// Scripted renderer that records every load it is asked to do.
#[derive(Default)]
struct FlakyRenderer {
    idle_fails: bool,
    fallback_fails: bool,
    has_posts: bool,
    loads: Mutex<Vec<WaitStrategy>>,
}

impl FlakyRenderer {
    fn loads(&self) -> Vec<WaitStrategy> {
        self.loads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for FlakyRenderer {
    async fn load_url(
        &self,
        url: &str,
        timeout: Duration,
        strategy: WaitStrategy,
    ) -> Result<(), RendererError> {
        self.loads.lock().unwrap().push(strategy);
        let fails = match strategy {
            WaitStrategy::NetworkIdle => self.idle_fails,
            WaitStrategy::DomContentLoaded => self.fallback_fails,
        };
        if fails {
            Err(RendererError::Timeout {
                what: format!("loading {url}"),
                after: timeout,
            })
        } else {
            Ok(())
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), RendererError> {
        if self.has_posts {
            Ok(())
        } else {
            Err(RendererError::Timeout {
                what: format!("waiting for `{selector}`"),
                after: timeout,
            })
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Container>>, RendererError> {
        Err(RendererError::Query {
            selector: selector.to_string(),
            message: "page crashed".to_string(),
        })
    }

    async fn execute_script(&self, _script: &str) -> Result<(), RendererError> {
        Err(RendererError::Script("page crashed".to_string()))
    }

    async fn close(&self) -> Result<(), RendererError> {
        Ok(())
    }
}

fn policy(max_attempts: u32) -> NavigationPolicy {
    NavigationPolicy {
        timeout: Duration::from_millis(50),
        max_attempts,
        backoff_step: Duration::ZERO,
        selector_timeout: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_fallback_succeeds_on_first_attempt() {
    let renderer = FlakyRenderer {
        idle_fails: true,
        has_posts: true,
        ..FlakyRenderer::default()
    };
    let navigator = Navigator::new(&renderer, policy(3));

    assert!(navigator.navigate("https://x.com/someone").await);
    assert_eq!(
        renderer.loads(),
        vec![WaitStrategy::NetworkIdle, WaitStrategy::DomContentLoaded]
    );
}

#[tokio::test]
async fn test_fallback_without_posts_fails() {
    let renderer = FlakyRenderer {
        idle_fails: true,
        ..FlakyRenderer::default()
    };
    let outcome = Navigator::new(&renderer, policy(1))
        .attempt("https://x.com/someone")
        .await;

    assert!(matches!(outcome, NavigationOutcome::Failed(_)));
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let renderer = FlakyRenderer {
        idle_fails: true,
        fallback_fails: true,
        ..FlakyRenderer::default()
    };
    let navigator = Navigator::new(&renderer, policy(3));

    assert!(!navigator.navigate("https://x.com/someone").await);
    // Two load strategies per attempt.
    assert_eq!(renderer.loads().len(), 6);
}

#[tokio::test]
async fn test_idle_load_skips_fallback() {
    let renderer = FlakyRenderer::default();
    let outcome = Navigator::new(&renderer, policy(3))
        .attempt("https://x.com/someone")
        .await;

    assert_eq!(outcome, NavigationOutcome::Idle);
    assert_eq!(renderer.loads(), vec![WaitStrategy::NetworkIdle]);
}

#[tokio::test]
async fn test_collection_survives_query_failures() {
    let renderer = FlakyRenderer::default();
    let limits = CollectionLimits {
        scroll_pause: Duration::ZERO,
        ..CollectionLimits::default()
    };
    let report = Collector::new(&renderer, limits).run().await;

    assert_eq!(report.stop_reason, StopReason::Idle);
    assert!(report.posts.is_empty());
}

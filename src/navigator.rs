//! Page loading with retry and fallback.
//!
//! Each attempt first waits for the network to go idle. Infinite-scroll pages
//! often never get there (long-polling, analytics beacons), so on failure the
//! same attempt falls back to waiting for the document to parse and for at
//! least one post container to appear. Attempts are separated by a linear
//! backoff. Running out of attempts is not fatal: the caller keeps going
//! with whatever the page shows.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::POST_CONTAINER_SELECTOR;
use crate::renderer::{Renderer, WaitStrategy};

/// Default per-step backoff between attempts.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(2);

/// Default wait for the first post container in the fallback path.
pub const DEFAULT_SELECTOR_TIMEOUT: Duration = Duration::from_secs(15);

/// Timing knobs for navigation.
#[derive(Debug, Clone)]
pub struct NavigationPolicy {
    /// Budget for each load step.
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Attempt `n` failing waits `n * backoff_step` before the next one.
    pub backoff_step: Duration,
    /// Bounded wait for a post container after a fallback load.
    pub selector_timeout: Duration,
}

impl Default for NavigationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_attempts: 3,
            backoff_step: DEFAULT_BACKOFF_STEP,
            selector_timeout: DEFAULT_SELECTOR_TIMEOUT,
        }
    }
}

/// Result of one navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The page reached network idle.
    Idle,
    /// Network idle failed but the document parsed and posts appeared.
    Parsed,
    /// Both strategies failed.
    Failed(String),
}

impl NavigationOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for NavigationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("network idle"),
            Self::Parsed => f.write_str("document parsed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

pub struct Navigator<'a> {
    renderer: &'a dyn Renderer,
    policy: NavigationPolicy,
}

impl<'a> Navigator<'a> {
    #[must_use]
    pub fn new(renderer: &'a dyn Renderer, policy: NavigationPolicy) -> Self {
        Self { renderer, policy }
    }

    /// Load `url`, retrying per the policy. Returns `true` on success.
    pub async fn navigate(&self, url: &str) -> bool {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let outcome = self.attempt(url).await;
            if outcome.is_success() {
                info!(url = %url, attempt, %outcome, "Page loaded");
                return true;
            }

            warn!(url = %url, attempt, max_attempts, %outcome, "Navigation attempt failed");

            if attempt < max_attempts {
                let backoff = self.policy.backoff_step * attempt;
                debug!(backoff_ms = backoff.as_millis(), "Backing off before retry");
                tokio::time::sleep(backoff).await;
            }
        }

        warn!(url = %url, max_attempts, "Navigation failed; continuing with current page content");
        false
    }

    /// One attempt: network idle, then parsed document plus a post container.
    pub async fn attempt(&self, url: &str) -> NavigationOutcome {
        let idle_error = match self
            .renderer
            .load_url(url, self.policy.timeout, WaitStrategy::NetworkIdle)
            .await
        {
            Ok(()) => return NavigationOutcome::Idle,
            Err(e) => e,
        };

        debug!(url = %url, error = %idle_error, "Network idle load failed; trying parsed-document fallback");

        if let Err(e) = self
            .renderer
            .load_url(url, self.policy.timeout, WaitStrategy::DomContentLoaded)
            .await
        {
            return NavigationOutcome::Failed(format!("{idle_error}; fallback: {e}"));
        }

        match self
            .renderer
            .wait_for_selector(POST_CONTAINER_SELECTOR, self.policy.selector_timeout)
            .await
        {
            Ok(()) => NavigationOutcome::Parsed,
            Err(e) => NavigationOutcome::Failed(format!("{idle_error}; fallback: {e}")),
        }
    }
}

/// Convenience wrapper matching the `navigate(url, timeout, attempts)` shape.
pub async fn navigate(
    renderer: &dyn Renderer,
    url: &str,
    timeout: Duration,
    max_attempts: u32,
) -> bool {
    let policy = NavigationPolicy {
        timeout,
        max_attempts,
        ..NavigationPolicy::default()
    };
    Navigator::new(renderer, policy).navigate(url).await
}

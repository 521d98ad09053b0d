//! Shared constants used across the application.

/// User agent string used for the browser session.
///
/// This is a realistic desktop browser user agent so the timeline renders the
/// same markup a normal visitor gets.
pub const HARVEST_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Origin every relative permalink is resolved against.
pub const SITE_ORIGIN: &str = "https://x.com";

/// Sentinel written to the `target` field of a search-mode snapshot.
pub const SEARCH_TARGET_SENTINEL: &str = "site-search";

/// Selector for one rendered post in the feed.
pub const POST_CONTAINER_SELECTOR: &str = "article";

/// Path marker that identifies a post permalink.
pub const POST_ID_MARKER: &str = "/status/";

/// Scroll command issued between collection cycles.
pub const SCROLL_SCRIPT: &str = "window.scrollBy(0, document.body.scrollHeight)";

/// Consecutive non-growing cycles after which the feed is considered exhausted.
pub const IDLE_ROUND_LIMIT: usize = 5;

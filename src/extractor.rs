//! Turn rendered post containers into [`PostRecord`]s.
//!
//! The rules here mirror the site's current markup: a permalink containing
//! `/status/`, a `time[datetime]` element, a `div[lang]` body and `img`
//! media. They are heuristics. In particular the avatar check can let an
//! avatar through or drop a real image whose URL or alt text happens to
//! mention "avatar"; both are accepted.

use std::fmt;
use std::sync::LazyLock;

use tracing::{debug, warn};
use url::Url;

use crate::constants::{POST_ID_MARKER, SITE_ORIGIN};
use crate::post::PostRecord;
use crate::renderer::{Container, RendererError};

static ORIGIN: LazyLock<Url> = LazyLock::new(|| Url::parse(SITE_ORIGIN).unwrap());

/// Path marker for profile pictures on the media CDN.
const AVATAR_PATH_MARKER: &str = "profile_images";

/// Why a container produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No descendant link carries a post id. Promoted units, quote wrappers and
    /// similar structural elements land here.
    NoPermalink,
    /// The permalink's final segment was empty.
    EmptyId,
    /// The renderer failed while the container was being read.
    Unreadable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPermalink => f.write_str("no post permalink"),
            Self::EmptyId => f.write_str("empty post id"),
            Self::Unreadable(message) => write!(f, "unreadable container: {message}"),
        }
    }
}

/// Outcome of reading one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Post(PostRecord),
    Skipped(SkipReason),
}

/// Extract every readable post from a batch of containers.
///
/// Never fails: containers that cannot be read are skipped and logged.
pub async fn extract(containers: &[Box<dyn Container>]) -> Vec<PostRecord> {
    let mut posts = Vec::with_capacity(containers.len());
    let mut skipped = 0usize;

    for container in containers {
        match extract_one(container.as_ref()).await {
            Extraction::Post(post) => posts.push(post),
            Extraction::Skipped(reason) => {
                skipped += 1;
                match reason {
                    SkipReason::Unreadable(ref message) => {
                        warn!(error = %message, "Failed to parse a post container, skipping");
                    }
                    SkipReason::NoPermalink | SkipReason::EmptyId => {
                        debug!(%reason, "Skipping container");
                    }
                }
            }
        }
    }

    debug!(
        containers = containers.len(),
        extracted = posts.len(),
        skipped,
        "Batch extracted"
    );
    posts
}

/// Extract a single container.
pub async fn extract_one(container: &dyn Container) -> Extraction {
    match read_post(container).await {
        Ok(extraction) => extraction,
        Err(e) => Extraction::Skipped(SkipReason::Unreadable(e.to_string())),
    }
}

async fn read_post(container: &dyn Container) -> Result<Extraction, RendererError> {
    let Some(href) = find_permalink_href(container).await? else {
        return Ok(Extraction::Skipped(SkipReason::NoPermalink));
    };
    let Some(id) = post_id_from_href(&href) else {
        return Ok(Extraction::Skipped(SkipReason::EmptyId));
    };

    let timestamp = match container.query_single("time").await? {
        Some(time) => time
            .attribute("datetime")
            .await?
            .filter(|dt| !dt.trim().is_empty()),
        None => None,
    };

    let text = match container.query_single("div[lang]").await? {
        Some(content) => content.inner_text().await?,
        None => container.inner_text().await?,
    };

    let images = collect_images(container).await?;

    Ok(Extraction::Post(PostRecord {
        id,
        permalink: permalink_for(&href),
        timestamp,
        text: text.trim().to_string(),
        images,
    }))
}

/// Href of the first descendant link pointing at a post.
async fn find_permalink_href(container: &dyn Container) -> Result<Option<String>, RendererError> {
    for anchor in container.query_all("a").await? {
        if let Some(href) = anchor.attribute("href").await? {
            if href.contains(POST_ID_MARKER) {
                return Ok(Some(href));
            }
        }
    }
    Ok(None)
}

async fn collect_images(container: &dyn Container) -> Result<Vec<String>, RendererError> {
    let mut images: Vec<String> = Vec::new();
    for img in container.query_all("img").await? {
        let src = img.attribute("src").await?.unwrap_or_default();
        let alt = img.attribute("alt").await?.unwrap_or_default();
        if is_avatar(&src, &alt) {
            continue;
        }
        if !src.is_empty() && !images.contains(&src) {
            images.push(src);
        }
    }
    Ok(images)
}

/// Post id from a permalink href: the final path segment, ignoring trailing
/// slashes, query and fragment.
#[must_use]
pub fn post_id_from_href(href: &str) -> Option<String> {
    let path = href.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Absolute permalink for an href found in a container.
#[must_use]
pub fn permalink_for(href: &str) -> String {
    ORIGIN
        .join(href)
        .map_or_else(|_| format!("{SITE_ORIGIN}{href}"), String::from)
}

/// Heuristic avatar check on an image's `src` and `alt`.
#[must_use]
pub fn is_avatar(src: &str, alt: &str) -> bool {
    src.contains(AVATAR_PATH_MARKER)
        || src.to_lowercase().contains("avatar")
        || alt.to_lowercase().contains("avatar")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_id_from_href() {
        assert_eq!(
            post_id_from_href("/someone/status/1234567890").as_deref(),
            Some("1234567890")
        );
        assert_eq!(
            post_id_from_href("/someone/status/42/").as_deref(),
            Some("42")
        );
        assert_eq!(
            post_id_from_href("/someone/status/42?s=20#top").as_deref(),
            Some("42")
        );
        assert_eq!(post_id_from_href("/").as_deref(), None);
        assert_eq!(post_id_from_href("").as_deref(), None);
    }

    #[test]
    fn test_permalink_for() {
        assert_eq!(
            permalink_for("/someone/status/42"),
            "https://x.com/someone/status/42"
        );
        assert_eq!(
            permalink_for("https://x.com/other/status/7"),
            "https://x.com/other/status/7"
        );
    }

    #[test]
    fn test_is_avatar() {
        assert!(is_avatar(
            "https://pbs.twimg.com/profile_images/1/abc_normal.jpg",
            ""
        ));
        assert!(is_avatar("https://cdn.example/Avatar/1.png", ""));
        assert!(is_avatar("https://pbs.twimg.com/media/x.jpg", "User AVATAR"));
        assert!(!is_avatar("https://pbs.twimg.com/media/x.jpg", "Image"));
    }
}

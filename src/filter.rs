//! Text filtering applied to the collected post set.
//!
//! Filtering runs once, after collection has finished, so that convergence
//! detection in the collection loop sees the raw yield of the page rather than
//! the filtered one.

use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::post::PostRecord;

/// How a filter query is compared against post text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterMode {
    /// Normalized query is contained in normalized text.
    #[default]
    Substring,
    /// Case-insensitive regular expression found anywhere in the raw text.
    Regex,
    /// Normalized text equals normalized query.
    Exact,
}

impl FilterMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Substring => "substring",
            Self::Regex => "regex",
            Self::Exact => "exact",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "substring" => Ok(Self::Substring),
            "regex" => Ok(Self::Regex),
            "exact" => Ok(Self::Exact),
            _ => Err(format!(
                "must be 'substring', 'regex' or 'exact', got '{s}'"
            )),
        }
    }
}

/// Collapse runs of whitespace to a single space, trim, and lowercase.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Check a single text against a query.
///
/// An invalid regex never matches.
#[must_use]
pub fn matches(query: &str, text: &str, mode: FilterMode) -> bool {
    PostFilter::new(query, mode).is_match(text)
}

#[derive(Debug, Clone)]
enum Matcher {
    Substring(String),
    Exact(String),
    Regex(Regex),
    /// Pattern failed to compile; nothing matches.
    Never,
}

/// A filter query compiled once and applied to many posts.
#[derive(Debug, Clone)]
pub struct PostFilter {
    query: String,
    mode: FilterMode,
    matcher: Matcher,
}

impl PostFilter {
    #[must_use]
    pub fn new(query: &str, mode: FilterMode) -> Self {
        let matcher = match mode {
            FilterMode::Substring => Matcher::Substring(normalize(query)),
            FilterMode::Exact => Matcher::Exact(normalize(query)),
            FilterMode::Regex => match RegexBuilder::new(query).case_insensitive(true).build() {
                Ok(re) => Matcher::Regex(re),
                Err(e) => {
                    warn!(pattern = %query, error = %e, "Invalid filter pattern; no posts will match");
                    Matcher::Never
                }
            },
        };

        Self {
            query: query.to_string(),
            mode,
            matcher,
        }
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Whether the pattern compiled. Always true outside regex mode.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self.matcher, Matcher::Never)
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        match &self.matcher {
            Matcher::Substring(needle) => normalize(text).contains(needle.as_str()),
            Matcher::Exact(expected) => normalize(text) == *expected,
            Matcher::Regex(re) => re.is_match(text),
            Matcher::Never => false,
        }
    }

    /// Keep only the posts whose text matches.
    #[must_use]
    pub fn apply(&self, posts: Vec<PostRecord>) -> Vec<PostRecord> {
        let before = posts.len();
        let kept: Vec<PostRecord> = posts
            .into_iter()
            .filter(|post| self.is_match(&post.text))
            .collect();
        debug!(
            mode = %self.mode,
            query = %self.query,
            before,
            after = kept.len(),
            "Filter applied"
        );
        kept
    }
}

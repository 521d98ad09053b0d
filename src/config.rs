use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::collector::CollectionLimits;
use crate::constants::{HARVEST_USER_AGENT, IDLE_ROUND_LIMIT, SEARCH_TARGET_SENTINEL, SITE_ORIGIN};
use crate::filter::{FilterMode, PostFilter};
use crate::navigator::{NavigationPolicy, DEFAULT_BACKOFF_STEP, DEFAULT_SELECTOR_TIMEOUT};
use crate::renderer::BrowserOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as number: {source}")]
    ParseFloat {
        name: String,
        #[source]
        source: std::num::ParseFloatError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Where posts are harvested from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A user's profile timeline.
    Profile(String),
    /// The live results feed for a search query.
    Search(String),
}

impl Source {
    /// URL of the feed to load.
    #[must_use]
    pub fn url(&self) -> String {
        match self {
            Self::Profile(handle) => format!("{SITE_ORIGIN}/{handle}"),
            Self::Search(query) => format!(
                "{SITE_ORIGIN}/search?q={}&f=live",
                urlencoding::encode(query)
            ),
        }
    }

    /// Value written to the snapshot's `target` field.
    #[must_use]
    pub fn target_label(&self) -> &str {
        match self {
            Self::Profile(handle) => handle.as_str(),
            Self::Search(_) => SEARCH_TARGET_SENTINEL,
        }
    }
}

/// Harvest configuration loaded from environment variables and CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    // Source
    pub target: Option<String>,
    pub search_query: Option<String>,

    // Collection budgets
    pub max_posts: usize,
    pub max_scrolls: usize,
    pub scroll_pause: Duration,
    pub idle_rounds: usize,

    // Navigation
    pub navigation_timeout: Duration,
    pub navigation_attempts: u32,
    pub backoff_step: Duration,
    pub selector_timeout: Duration,
    /// Pause after a successful load before the first cycle.
    pub settle_delay: Duration,

    // Browser
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub user_agent: String,

    // Filtering
    pub filter_query: Option<String>,
    pub filter_mode: FilterMode,

    // Output
    pub output_path: PathBuf,

    /// Replay a saved HTML page instead of launching a browser.
    pub from_html: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: None,
            search_query: None,
            max_posts: 500,
            max_scrolls: 60,
            scroll_pause: Duration::from_secs(1),
            idle_rounds: IDLE_ROUND_LIMIT,
            navigation_timeout: Duration::from_secs(120),
            navigation_attempts: 3,
            backoff_step: DEFAULT_BACKOFF_STEP,
            selector_timeout: DEFAULT_SELECTOR_TIMEOUT,
            settle_delay: Duration::from_secs(1),
            headless: true,
            chrome_path: None,
            user_agent: HARVEST_USER_AGENT.to_string(),
            filter_query: None,
            filter_mode: FilterMode::Substring,
            output_path: PathBuf::from("posts.json"),
            from_html: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            // Source
            target: optional_env("HARVEST_TARGET"),
            search_query: optional_env("HARVEST_SEARCH"),

            // Collection budgets
            max_posts: parse_env_usize("HARVEST_MAX_POSTS", defaults.max_posts)?,
            max_scrolls: parse_env_usize("HARVEST_MAX_SCROLLS", defaults.max_scrolls)?,
            scroll_pause: parse_env_secs_f64("HARVEST_SCROLL_PAUSE_SECS", defaults.scroll_pause)?,

            // Navigation
            navigation_timeout: Duration::from_secs(parse_env_u64(
                "HARVEST_NAV_TIMEOUT_SECS",
                defaults.navigation_timeout.as_secs(),
            )?),
            navigation_attempts: parse_env_u32("HARVEST_NAV_ATTEMPTS", defaults.navigation_attempts)?,

            // Browser
            headless: parse_env_bool("HARVEST_HEADLESS", defaults.headless)?,
            chrome_path: optional_env("CHROME_PATH"),
            user_agent: env_or_default("HARVEST_USER_AGENT", HARVEST_USER_AGENT),

            // Filtering
            filter_query: optional_env("HARVEST_FILTER"),
            filter_mode: parse_filter_mode(&env_or_default("HARVEST_FILTER_MODE", "substring"))?,

            // Output
            output_path: PathBuf::from(env_or_default("HARVEST_OUTPUT", "posts.json")),

            ..defaults
        })
    }

    /// Fast settings for tests: no pauses, no backoff, short waits.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            scroll_pause: Duration::ZERO,
            navigation_timeout: Duration::from_secs(5),
            navigation_attempts: 2,
            backoff_step: Duration::ZERO,
            selector_timeout: Duration::from_millis(10),
            settle_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Resolve the harvest source. A profile handle wins over a search query.
    ///
    /// # Errors
    ///
    /// Returns an error if neither a handle nor a search query is set.
    pub fn source(&self) -> Result<Source, ConfigError> {
        if let Some(handle) = self.target.as_deref().map(normalize_handle) {
            if !handle.is_empty() {
                return Ok(Source::Profile(handle.to_string()));
            }
        }
        if let Some(query) = self.search_query.as_deref().map(str::trim) {
            if !query.is_empty() {
                return Ok(Source::Search(query.to_string()));
            }
        }
        Err(ConfigError::Missing(
            "a profile handle (HARVEST_TARGET / --username) or a search query (HARVEST_SEARCH / --search)"
                .to_string(),
        ))
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let source = self.source()?;

        if matches!(source, Source::Search(_)) && self.filter().is_none() {
            return Err(ConfigError::Missing(
                "a filter query (HARVEST_FILTER / --filter) is required in search mode".to_string(),
            ));
        }
        if self.max_posts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "HARVEST_MAX_POSTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.navigation_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "HARVEST_NAV_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.idle_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                name: "idle_rounds".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Compiled filter, if a non-blank filter query is set.
    #[must_use]
    pub fn filter(&self) -> Option<PostFilter> {
        self.filter_query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .map(|q| PostFilter::new(q, self.filter_mode))
    }

    #[must_use]
    pub fn collection_limits(&self) -> CollectionLimits {
        CollectionLimits {
            max_posts: self.max_posts,
            max_scrolls: self.max_scrolls,
            idle_rounds: self.idle_rounds,
            scroll_pause: self.scroll_pause,
        }
    }

    #[must_use]
    pub fn navigation_policy(&self) -> NavigationPolicy {
        NavigationPolicy {
            timeout: self.navigation_timeout,
            max_attempts: self.navigation_attempts,
            backoff_step: self.backoff_step,
            selector_timeout: self.selector_timeout,
        }
    }

    #[must_use]
    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            request_timeout: self.navigation_timeout,
            chrome_path: self.chrome_path.clone(),
            user_agent: self.user_agent.clone(),
            ..BrowserOptions::default()
        }
    }
}

/// Strip whitespace and a leading `@` from a handle.
fn normalize_handle(raw: &str) -> &str {
    raw.trim().trim_start_matches('@')
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_secs_f64(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => {
            let secs: f64 = val.parse().map_err(|e| ConfigError::ParseFloat {
                name: name.to_string(),
                source: e,
            })?;
            duration_from_secs_f64(name, secs)
        }
        _ => Ok(default),
    }
}

/// Convert fractional seconds, rejecting negative and non-finite values.
///
/// # Errors
///
/// Returns an error if `secs` is negative, NaN or infinite.
pub fn duration_from_secs_f64(name: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("must be a non-negative number of seconds, got {secs}"),
    })
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => parse_bool(name, &val),
        _ => Ok(default),
    }
}

/// Parse a boolean setting (`true/1/yes/on`, `false/0/no/off`).
///
/// # Errors
///
/// Returns an error for any other value.
pub fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ParseBool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_filter_mode(value: &str) -> Result<FilterMode, ConfigError> {
    value
        .parse()
        .map_err(|message| ConfigError::InvalidValue {
            name: "HARVEST_FILTER_MODE".to_string(),
            message,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(handle: &str) -> Config {
        Config {
            target: Some(handle.to_string()),
            ..Config::for_testing()
        }
    }

    #[test]
    fn test_profile_url() {
        let source = profile("@someone").source().unwrap();
        assert_eq!(source, Source::Profile("someone".to_string()));
        assert_eq!(source.url(), "https://x.com/someone");
        assert_eq!(source.target_label(), "someone");
    }

    #[test]
    fn test_search_url_is_encoded() {
        let config = Config {
            search_query: Some("rust lang #async".to_string()),
            ..Config::for_testing()
        };
        let source = config.source().unwrap();
        assert_eq!(
            source.url(),
            "https://x.com/search?q=rust%20lang%20%23async&f=live"
        );
        assert_eq!(source.target_label(), SEARCH_TARGET_SENTINEL);
    }

    #[test]
    fn test_handle_takes_precedence_over_search() {
        let config = Config {
            target: Some("someone".to_string()),
            search_query: Some("ignored".to_string()),
            ..Config::for_testing()
        };
        assert_eq!(
            config.source().unwrap(),
            Source::Profile("someone".to_string())
        );
    }

    #[test]
    fn test_validate_requires_source() {
        assert!(matches!(
            Config::for_testing().validate(),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_validate_search_requires_filter() {
        let mut config = Config {
            search_query: Some("rust".to_string()),
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());

        config.filter_query = Some("rust".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        let mut config = profile("someone");
        assert!(config.validate().is_ok());

        config.max_posts = 0;
        assert!(config.validate().is_err());

        config.max_posts = 1;
        config.navigation_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_env_bool("NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("NONEXISTENT_VAR", false).unwrap());
        assert!(parse_bool("x", "YES").unwrap());
        assert!(!parse_bool("x", "off").unwrap());
        assert!(parse_bool("x", "maybe").is_err());
    }

    #[test]
    fn test_duration_from_secs_f64() {
        assert_eq!(
            duration_from_secs_f64("x", 1.5).unwrap(),
            Duration::from_millis(1500)
        );
        assert!(duration_from_secs_f64("x", -1.0).is_err());
        assert!(duration_from_secs_f64("x", f64::NAN).is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env() {
        std::env::set_var("HARVEST_TARGET", "@someone");
        std::env::set_var("HARVEST_MAX_POSTS", "25");
        std::env::set_var("HARVEST_SCROLL_PAUSE_SECS", "0.5");
        std::env::set_var("HARVEST_HEADLESS", "off");
        std::env::set_var("HARVEST_FILTER_MODE", "regex");

        let config = Config::from_env().unwrap();
        assert_eq!(config.source().unwrap(), Source::Profile("someone".to_string()));
        assert_eq!(config.max_posts, 25);
        assert_eq!(config.max_scrolls, 60);
        assert_eq!(config.scroll_pause, Duration::from_millis(500));
        assert!(!config.headless);
        assert_eq!(config.filter_mode, FilterMode::Regex);
        assert_eq!(config.output_path, PathBuf::from("posts.json"));

        std::env::set_var("HARVEST_FILTER_MODE", "fuzzy");
        assert!(Config::from_env().is_err());

        for name in [
            "HARVEST_TARGET",
            "HARVEST_MAX_POSTS",
            "HARVEST_SCROLL_PAUSE_SECS",
            "HARVEST_HEADLESS",
            "HARVEST_FILTER_MODE",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_browser_request_timeout_follows_navigation_budget() {
        let config = Config {
            navigation_timeout: Duration::from_secs(300),
            ..profile("someone")
        };
        assert_eq!(
            config.browser_options().request_timeout,
            Duration::from_secs(300)
        );
        assert_eq!(
            Config::default().browser_options().request_timeout,
            Config::default().navigation_timeout
        );
    }

    #[test]
    fn test_filter_is_none_when_blank() {
        let mut config = profile("someone");
        config.filter_query = Some("   ".to_string());
        assert!(config.filter().is_none());

        config.filter_query = Some("hello".to_string());
        config.filter_mode = FilterMode::Exact;
        let filter = config.filter().unwrap();
        assert_eq!(filter.mode(), FilterMode::Exact);
    }
}

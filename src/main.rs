use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use timeline_harvester::config::{duration_from_secs_f64, parse_bool, Config};
use timeline_harvester::filter::FilterMode;
use timeline_harvester::harvester::Harvester;

/// Harvest posts from a profile timeline or live search feed into JSON.
///
/// Every flag overrides the matching HARVEST_* environment variable.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Profile handle to harvest (leading @ is ignored)
    #[arg(short, long, conflicts_with = "search")]
    username: Option<String>,

    /// Search query to harvest live results for
    #[arg(short, long)]
    search: Option<String>,

    /// Maximum number of posts to keep
    #[arg(long)]
    max_posts: Option<usize>,

    /// Maximum number of scroll commands
    #[arg(long)]
    max_scrolls: Option<usize>,

    /// Seconds to wait after each scroll
    #[arg(long)]
    scroll_pause: Option<f64>,

    /// Run the browser headless (true/false)
    #[arg(long, value_parser = parse_headless)]
    headless: Option<bool>,

    /// Navigation timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Navigation attempts before giving up
    #[arg(long)]
    nav_attempts: Option<u32>,

    /// Only keep posts whose text matches this query
    #[arg(short = 'q', long)]
    filter: Option<String>,

    /// Treat the filter query as a case-insensitive regular expression
    #[arg(long, conflicts_with = "exact")]
    regex: bool,

    /// Require the whole normalized post text to equal the filter query
    #[arg(long)]
    exact: bool,

    /// Where to write the JSON snapshot
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<String>,

    /// Replay a saved HTML page instead of launching a browser
    #[arg(long)]
    from_html: Option<PathBuf>,
}

fn parse_headless(value: &str) -> Result<bool, String> {
    parse_bool("--headless", value).map_err(|e| e.to_string())
}

impl Cli {
    /// Layer command-line flags over the environment configuration.
    fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(username) = self.username {
            config.target = Some(username);
            config.search_query = None;
        } else if let Some(search) = self.search {
            config.target = None;
            config.search_query = Some(search);
        }
        if let Some(max_posts) = self.max_posts {
            config.max_posts = max_posts;
        }
        if let Some(max_scrolls) = self.max_scrolls {
            config.max_scrolls = max_scrolls;
        }
        if let Some(secs) = self.scroll_pause {
            config.scroll_pause = duration_from_secs_f64("--scroll-pause", secs)?;
        }
        if let Some(headless) = self.headless {
            config.headless = headless;
        }
        if let Some(secs) = self.timeout {
            config.navigation_timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(attempts) = self.nav_attempts {
            config.navigation_attempts = attempts;
        }
        if let Some(filter) = self.filter {
            config.filter_query = Some(filter);
        }
        if self.regex {
            config.filter_mode = FilterMode::Regex;
        } else if self.exact {
            config.filter_mode = FilterMode::Exact;
        }
        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(chrome_path) = self.chrome_path {
            config.chrome_path = Some(chrome_path);
        }
        if let Some(from_html) = self.from_html {
            config.from_html = Some(from_html);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_tracing()?;

    info!("Starting timeline-harvester");

    let mut config = Config::from_env().context("Failed to load configuration")?;
    cli.apply(&mut config)?;
    config.validate().context("Invalid configuration")?;

    info!(
        output = %config.output_path.display(),
        max_posts = config.max_posts,
        max_scrolls = config.max_scrolls,
        headless = config.headless,
        filter_mode = %config.filter_mode,
        "Configuration loaded"
    );

    let summary = Harvester::new(config).run().await?;

    if !summary.navigated {
        warn!(url = %summary.url, "Page never finished loading; results may be partial");
    }
    info!(
        url = %summary.url,
        stop_reason = %summary.stop_reason,
        collected = summary.collected,
        matched = summary.matched,
        written = summary.written,
        path = %summary.output_path.display(),
        "Harvest complete"
    );

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,timeline_harvester=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

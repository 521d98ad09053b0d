//! Timeline Harvester library.
//!
//! Loads a social feed (a profile timeline or live search results) in a
//! rendering engine, scrolls it while collecting posts, then filters, orders
//! and writes them to a JSON snapshot.

pub mod collector;
pub mod config;
pub mod constants;
pub mod extractor;
pub mod filter;
pub mod harvester;
pub mod navigator;
pub mod output;
pub mod post;
pub mod renderer;
pub mod sequencer;

pub use collector::{CollectionLimits, CollectionReport, Collector, StopReason};
pub use config::{Config, ConfigError, Source};
pub use filter::{FilterMode, PostFilter};
pub use harvester::{HarvestSummary, Harvester};
pub use navigator::{NavigationOutcome, NavigationPolicy, Navigator};
pub use output::Snapshot;
pub use post::{PostRecord, PostSet};
pub use renderer::{Container, Renderer, RendererError, WaitStrategy};

pub mod error;
pub mod models;
pub mod poller;
pub mod response;
pub mod scraper;
pub mod shared;
pub mod targets;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use error::{AppError, PollerError};
pub use models::{Metrics, RawResponse, Target};
pub use poller::{
    DEFAULT_SCRAPE_PATH, Poller, PollerConfig, PollerState, retrieve_metrics, scrape_url,
};
pub use response::ResponseParser;
pub use scraper::HttpScraper;
pub use shared::{Lease, SharedResource};
pub use targets::load_targets;
pub use traits::{CallbackSink, MetricsParser, MetricsSink, Scraper, Transport};

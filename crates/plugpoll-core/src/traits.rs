use std::future::Future;

use crate::error::AppError;
use crate::models::{Metrics, RawResponse};
use crate::response::ResponseParser;

/// Performs one HTTP GET and returns the complete response.
pub trait Scraper: Send + Sync + Clone {
    fn scrape(&self, url: &str) -> impl Future<Output = Result<RawResponse, AppError>> + Send;

    /// Human-readable identification of the transport in use, for diagnostics.
    fn version(&self) -> &str;
}

/// Executes a request and streams the response into a [`ResponseParser`].
///
/// Implementations deliver the status line first, then one header line per
/// call, then body chunks in order. When a delivery returns `false` the
/// transfer must be abandoned and an error returned; the parser's own error
/// takes precedence over it.
pub trait Transport: Send + Sync + Clone {
    fn get(
        &self,
        url: &str,
        parser: &mut ResponseParser,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn version(&self) -> &str;
}

/// Converts a response body into [`Metrics`].
pub trait MetricsParser: Send + Sync + Clone {
    fn parse(&self, body: &[u8]) -> Result<Metrics, AppError>;

    fn version(&self) -> &str;
}

/// Receives the outcome of every target on every tick.
///
/// Called concurrently for distinct targets. For a given target exactly one of
/// the two methods is called per tick.
pub trait MetricsSink: Send + Sync {
    fn on_success(&self, target: &str, metrics: &Metrics);

    fn on_error(&self, target: &str, error: &AppError);
}

/// A [`MetricsSink`] built from a pair of closures.
pub struct CallbackSink<S, E> {
    on_success: S,
    on_error: E,
}

impl<S, E> CallbackSink<S, E>
where
    S: Fn(&str, &Metrics) + Send + Sync,
    E: Fn(&str, &AppError) + Send + Sync,
{
    pub fn new(on_success: S, on_error: E) -> Self {
        Self {
            on_success,
            on_error,
        }
    }
}

impl<S, E> MetricsSink for CallbackSink<S, E>
where
    S: Fn(&str, &Metrics) + Send + Sync,
    E: Fn(&str, &AppError) + Send + Sync,
{
    fn on_success(&self, target: &str, metrics: &Metrics) {
        (self.on_success)(target, metrics);
    }

    fn on_error(&self, target: &str, error: &AppError) {
        (self.on_error)(target, error);
    }
}

impl<T: MetricsSink + ?Sized> MetricsSink for std::sync::Arc<T> {
    fn on_success(&self, target: &str, metrics: &Metrics) {
        (**self).on_success(target, metrics);
    }

    fn on_error(&self, target: &str, error: &AppError) {
        (**self).on_error(target, error);
    }
}

//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` or atomics for interior mutability, so
//! clones share their recordings with the test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::AppError;
use crate::models::{Metrics, RawResponse};
use crate::response::ResponseParser;
use crate::traits::{MetricsParser, MetricsSink, Scraper, Transport};

/// A 200 `application/json` response with the given body.
pub fn json_response(body: &str) -> RawResponse {
    RawResponse {
        status_code: 200,
        status_text: "OK".into(),
        content_type: "application/json".into(),
        body: body.as_bytes().to_vec(),
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Step {
    Header(Vec<u8>),
    Body(Vec<u8>),
    Fail(AppError),
}

/// Ordered deliveries a [`MockTransport`] replays into the parser.
#[derive(Debug, Clone, Default)]
pub struct TransportScript {
    steps: Vec<Step>,
}

impl TransportScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, line: &str) -> Self {
        self.steps.push(Step::Header(format!("{line}\r\n").into_bytes()));
        self
    }

    pub fn body(mut self, chunk: &str) -> Self {
        self.steps.push(Step::Body(chunk.as_bytes().to_vec()));
        self
    }

    /// End the transfer with a transport error at this point.
    pub fn fail(mut self, error: AppError) -> Self {
        self.steps.push(Step::Fail(error));
        self
    }
}

/// Transport that replays a script and aborts like a real one when the
/// parser rejects a delivery.
#[derive(Clone)]
pub struct MockTransport {
    script: Arc<TransportScript>,
    requested: Arc<Mutex<Vec<String>>>,
    delivered: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new(script: TransportScript) -> Self {
        Self {
            script: Arc::new(script),
            requested: Arc::new(Mutex::new(Vec::new())),
            delivered: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    /// Number of header lines and body chunks handed to the parser.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    async fn get(&self, url: &str, parser: &mut ResponseParser) -> Result<(), AppError> {
        self.requested.lock().unwrap().push(url.to_string());
        for step in &self.script.steps {
            let accepted = match step {
                Step::Header(line) => {
                    self.delivered.fetch_add(1, Ordering::SeqCst);
                    parser.on_header_line(line)
                }
                Step::Body(chunk) => {
                    self.delivered.fetch_add(1, Ordering::SeqCst);
                    parser.on_body_chunk(chunk)
                }
                Step::Fail(error) => return Err(error.clone()),
            };
            if !accepted {
                return Err(AppError::Transport("Failed writing received data".into()));
            }
        }
        Ok(())
    }

    fn version(&self) -> &str {
        "mock-transport"
    }
}

// ---------------------------------------------------------------------------
// MockScraper
// ---------------------------------------------------------------------------

type ScrapeResponder = dyn Fn(&str) -> Result<RawResponse, AppError> + Send + Sync;

/// Mock scraper that answers through a closure and records every call.
#[derive(Clone)]
pub struct MockScraper {
    responder: Arc<ScrapeResponder>,
    delay: Duration,
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl MockScraper {
    pub fn new(
        responder: impl Fn(&str) -> Result<RawResponse, AppError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer every URL with the same result.
    pub fn always(result: Result<RawResponse, AppError>) -> Self {
        Self::new(move |_| result.clone())
    }

    /// Answer each URL with its scripted result; unknown URLs fail.
    pub fn with_routes(routes: Vec<(String, Result<RawResponse, AppError>)>) -> Self {
        Self::new(move |url| {
            routes
                .iter()
                .find(|(route, _)| route == url)
                .map(|(_, result)| result.clone())
                .unwrap_or_else(|| Err(AppError::Transport(format!("no route for {url}"))))
        })
    }

    /// Sleep this long inside every scrape.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of scrapes that were in flight at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl Scraper for MockScraper {
    async fn scrape(&self, url: &str) -> Result<RawResponse, AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        (self.responder)(url)
    }

    fn version(&self) -> &str {
        "mock-scraper"
    }
}

// ---------------------------------------------------------------------------
// MockParser
// ---------------------------------------------------------------------------

type ParseResponder = dyn Fn(&[u8]) -> Result<Metrics, AppError> + Send + Sync;

/// Mock parser that answers through a closure.
#[derive(Clone)]
pub struct MockParser {
    responder: Arc<ParseResponder>,
    calls: Arc<AtomicUsize>,
}

impl MockParser {
    pub fn new(
        responder: impl Fn(&[u8]) -> Result<Metrics, AppError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(result: Result<Metrics, AppError>) -> Self {
        Self::new(move |_| result.clone())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetricsParser for MockParser {
    fn parse(&self, body: &[u8]) -> Result<Metrics, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(body)
    }

    fn version(&self) -> &str {
        "mock-parser"
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Success { target: String, metrics: Metrics },
    Error { target: String, error: AppError },
}

/// Sink that records every callback in arrival order.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn successes(&self, target: &str) -> Vec<Metrics> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Success { target: t, metrics } if t == target => Some(metrics),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self, target: &str) -> Vec<AppError> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Error { target: t, error } if t == target => Some(error),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` callbacks have arrived.
    pub async fn wait_for(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.len() < count {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {count} callbacks, got {}",
                self.len()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl MetricsSink for RecordingSink {
    fn on_success(&self, target: &str, metrics: &Metrics) {
        self.events.lock().unwrap().push(SinkEvent::Success {
            target: target.to_string(),
            metrics: *metrics,
        });
    }

    fn on_error(&self, target: &str, error: &AppError) {
        self.events.lock().unwrap().push(SinkEvent::Error {
            target: target.to_string(),
            error: error.clone(),
        });
    }
}

//! Fixed-cadence polling of a set of targets.
//!
//! # Lifecycle
//!
//! ```text
//! STOPPED --[run]--> RUNNING --[stop / run future dropped]--> STOPPED
//! ```
//!
//! `stop` returns at once, but the loop keeps draining its current tick. A
//! `run` issued in the meantime waits for that loop to exit before starting,
//! so at most one loop ever scrapes the targets.
//!
//! While running, every tick scrapes all targets concurrently, waits for all
//! of them (including their sink callbacks) and then sleeps for whatever is
//! left of the period. A tick that overruns the period is followed
//! immediately by the next one; missed ticks are never replayed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AppError, PollerError};
use crate::models::{Metrics, Target};
use crate::traits::{MetricsParser, MetricsSink, Scraper};

/// Status endpoint of a Shelly Plus plug.
pub const DEFAULT_SCRAPE_PATH: &str = "/rpc/Switch.GetStatus?id=0";

/// Configuration for a [`Poller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between the starts of consecutive ticks.
    pub poll_period: Duration,
    /// Path and query requested on every target.
    pub scrape_path: String,
    /// Log every successful result, not only failures.
    pub verbose_logging: bool,
    /// Upper bound on targets processed at the same time within a tick.
    /// `None` processes every target at once.
    pub max_concurrency: Option<usize>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_secs(15),
            scrape_path: DEFAULT_SCRAPE_PATH.to_string(),
            verbose_logging: false,
            max_concurrency: None,
        }
    }
}

impl PollerConfig {
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    pub fn with_scrape_path(mut self, path: impl Into<String>) -> Self {
        self.scrape_path = path.into();
        self
    }

    pub fn with_verbose_logging(mut self, verbose: bool) -> Self {
        self.verbose_logging = verbose;
        self
    }

    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit;
        self
    }
}

/// Observable lifecycle state of a [`Poller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Stopped,
    Running,
}

impl std::fmt::Display for PollerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollerState::Stopped => write!(f, "stopped"),
            PollerState::Running => write!(f, "running"),
        }
    }
}

enum Lifecycle {
    Stopped,
    Running { cancel: CancellationToken },
}

struct Inner {
    lifecycle: Lifecycle,
    /// A run loop is executing, possibly still draining after a stop.
    loop_active: bool,
    targets: Vec<Target>,
}

impl Inner {
    fn stop(&mut self) -> bool {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running { cancel } => {
                cancel.cancel();
                true
            }
            Lifecycle::Stopped => false,
        }
    }
}

/// Everything a per-target task needs, shared across ticks.
struct Pipeline<S, P, K> {
    scraper: S,
    parser: P,
    sink: K,
    config: PollerConfig,
}

impl<S, P, K> Pipeline<S, P, K>
where
    S: Scraper,
    P: MetricsParser,
    K: MetricsSink,
{
    /// Scrape and parse one target, then report exactly one outcome.
    async fn process(&self, target: &Target) {
        match self.retrieve(target).await {
            Ok(metrics) => {
                self.sink.on_success(&target.name, &metrics);
                if self.config.verbose_logging {
                    tracing::info!(target = %target.name, ?metrics, "Got successful response");
                }
            }
            Err(e) => {
                self.sink.on_error(&target.name, &e);
                tracing::error!(
                    target = %target.name,
                    kind = e.kind(),
                    error = %e,
                    "Failed to retrieve metrics"
                );
            }
        }
    }

    async fn retrieve(&self, target: &Target) -> Result<Metrics, AppError> {
        let url = scrape_url(&target.hostname, &self.config.scrape_path)?;
        retrieve_metrics(&self.scraper, &self.parser, url.as_str()).await
    }
}

/// Build `http://<hostname><path>` for a target.
pub fn scrape_url(hostname: &str, path: &str) -> Result<Url, AppError> {
    let base = Url::parse(&format!("http://{hostname}")).map_err(|e| {
        AppError::InvalidInput(format!("Invalid target address \"{hostname}\": {e}"))
    })?;
    base.join(path)
        .map_err(|e| AppError::InvalidInput(format!("Invalid scrape path \"{path}\": {e}")))
}

/// Scrape `url`, check that the response is a successful JSON document and
/// parse it into [`Metrics`].
pub async fn retrieve_metrics<S, P>(scraper: &S, parser: &P, url: &str) -> Result<Metrics, AppError>
where
    S: Scraper,
    P: MetricsParser,
{
    let response = scraper
        .scrape(url)
        .await
        .map_err(|e| e.context(format!("Failed to scrape {url}")))?;

    if response.status_code != 200 {
        return Err(AppError::InvalidInput(format!(
            "Got HTTP response code {} for {url}",
            response.status_code
        )));
    }
    if response.mime_essence() != "application/json" {
        return Err(AppError::InvalidInput(format!(
            "Response content type \"{}\" is not supported, from {url}",
            response.content_type
        )));
    }

    parser
        .parse(&response.body)
        .map_err(|e| e.context(format!("Failed to parse JSON from {url}")))
}

/// Polls a fixed set of targets on a fixed period and reports every result to
/// a [`MetricsSink`].
///
/// Targets are registered while stopped; the set in effect is captured when
/// [`run`](Self::run) starts.
pub struct Poller<S, P, K> {
    pipeline: Arc<Pipeline<S, P, K>>,
    inner: Mutex<Inner>,
    loop_exited: Notify,
}

impl<S, P, K> Poller<S, P, K>
where
    S: Scraper + 'static,
    P: MetricsParser + 'static,
    K: MetricsSink + 'static,
{
    pub fn new(scraper: S, parser: P, sink: K, config: PollerConfig) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                scraper,
                parser,
                sink,
                config,
            }),
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::Stopped,
                loop_active: false,
                targets: Vec::new(),
            }),
            loop_exited: Notify::new(),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.pipeline.config
    }

    /// Register a target.
    ///
    /// Fails while the poller is running and for names already registered.
    pub fn add_target(
        &self,
        name: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Result<(), PollerError> {
        let name = name.into();
        let mut inner = self.lock();
        if matches!(inner.lifecycle, Lifecycle::Running { .. }) {
            return Err(PollerError::TargetsFrozen(name));
        }
        if inner.targets.iter().any(|t| t.name == name) {
            return Err(PollerError::DuplicateTarget(name));
        }
        inner.targets.push(Target::new(name, hostname));
        Ok(())
    }

    pub fn targets(&self) -> Vec<Target> {
        self.lock().targets.clone()
    }

    pub fn state(&self) -> PollerState {
        match self.lock().lifecycle {
            Lifecycle::Stopped => PollerState::Stopped,
            Lifecycle::Running { .. } => PollerState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PollerState::Running
    }

    /// Transition to running and poll until [`stop`](Self::stop) is called.
    ///
    /// Returns [`PollerError::AlreadyRunning`] if another run is active. If
    /// a stopped run is still finishing its last tick, waits for it first.
    /// Dropping the returned future also stops the poller.
    pub async fn run(&self) -> Result<(), PollerError> {
        let (cancel, targets) = self.start().await?;
        let _guard = RunGuard {
            inner: &self.inner,
            loop_exited: &self.loop_exited,
        };
        let period = self.pipeline.config.poll_period;

        tracing::info!(
            period_ms = period.as_millis() as u64,
            targets = targets.len(),
            "Entered run loop"
        );

        loop {
            let tick_start = Instant::now();
            if cancel.is_cancelled() {
                break;
            }

            self.tick(&targets).await;

            let deadline = tick_start + period;
            if deadline <= Instant::now() {
                tracing::debug!(
                    elapsed_ms = tick_start.elapsed().as_millis() as u64,
                    "Tick overran the poll period, starting next tick immediately"
                );
                continue;
            }

            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {}
                () = cancel.cancelled() => break,
            }
        }

        tracing::info!("Exited run loop");
        Ok(())
    }

    /// Request the run loop to stop.
    ///
    /// Never blocks: an in-progress sleep is woken at once, in-flight scrapes
    /// finish and no further tick starts. A no-op when already stopped.
    pub fn stop(&self) {
        if self.lock().stop() {
            tracing::info!("Stop requested");
        }
    }

    async fn start(&self) -> Result<(CancellationToken, Vec<Target>), PollerError> {
        loop {
            // Registered before the check so an exit in between is not missed.
            let loop_exited = self.loop_exited.notified();
            {
                let mut inner = self.lock();
                if matches!(inner.lifecycle, Lifecycle::Running { .. }) {
                    return Err(PollerError::AlreadyRunning);
                }
                if !inner.loop_active {
                    let cancel = CancellationToken::new();
                    inner.lifecycle = Lifecycle::Running {
                        cancel: cancel.clone(),
                    };
                    inner.loop_active = true;
                    return Ok((cancel, inner.targets.clone()));
                }
            }

            tracing::debug!("Waiting for the previous run loop to exit");
            loop_exited.await;
        }
    }

    /// Process every target concurrently and wait for all of them.
    async fn tick(&self, targets: &[Target]) {
        let limiter = self
            .pipeline
            .config
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let mut units = JoinSet::new();
        for target in targets {
            let pipeline = Arc::clone(&self.pipeline);
            let limiter = limiter.clone();
            let target = target.clone();
            units.spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                pipeline.process(&target).await;
            });
        }

        while let Some(joined) = units.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Target task did not complete");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the poller to `Stopped` when a run ends, however it ends, and
/// wakes any `run` waiting for the loop to exit.
struct RunGuard<'a> {
    inner: &'a Mutex<Inner>,
    loop_exited: &'a Notify,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.stop();
            inner.loop_active = false;
        }
        self.loop_exited.notify_waiters();
    }
}

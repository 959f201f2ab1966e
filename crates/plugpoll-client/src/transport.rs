use std::time::Duration;

use plugpoll_core::error::AppError;
use plugpoll_core::response::ResponseParser;
use plugpoll_core::shared::{Lease, SharedResource};
use plugpoll_core::traits::Transport;
use reqwest::Client;

const VERSION: &str = concat!("plugpoll-client/", env!("CARGO_PKG_VERSION"), " (reqwest)");

/// Settings for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub user_agent: String,
    /// Deadline for one whole request, connect through last body byte.
    pub timeout: Duration,
    /// Log connection-level reads and writes at trace level.
    pub verbose: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            user_agent: concat!("plugpoll/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(10),
            verbose: false,
        }
    }
}

impl TransportOptions {
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

struct ClientHandle {
    client: Client,
}

impl ClientHandle {
    fn build(options: &TransportOptions) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(options.user_agent.as_str())
            .timeout(options.timeout)
            .connection_verbose(options.verbose)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to initialize HTTP client: {e}")))?;

        tracing::info!(
            user_agent = %options.user_agent,
            timeout_ms = options.timeout.as_millis() as u64,
            "Initialized shared HTTP client"
        );
        Ok(Self { client })
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        tracing::info!("Released shared HTTP client");
    }
}

static CLIENT: SharedResource<ClientHandle> = SharedResource::new();

/// [`Transport`] backed by a process-wide `reqwest` client.
///
/// Every transport holds a lease on the same client. The client is built by
/// the first [`acquire`](Self::acquire) (its options win) and released when
/// the last transport is dropped.
#[derive(Clone)]
pub struct ReqwestTransport {
    handle: Lease<ClientHandle>,
}

impl ReqwestTransport {
    pub fn acquire(options: &TransportOptions) -> Result<Self, AppError> {
        let handle = CLIENT.acquire(|| ClientHandle::build(options))?;
        Ok(Self { handle })
    }

    /// True when both transports use the same underlying client.
    pub fn shares_client_with(&self, other: &ReqwestTransport) -> bool {
        self.handle.same_instance(&other.handle)
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("version", &VERSION)
            .finish_non_exhaustive()
    }
}

impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, parser: &mut ResponseParser) -> Result<(), AppError> {
        let mut response = self
            .handle
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let status_line = format!(
            "{:?} {} {}",
            response.version(),
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        );
        delivered(parser.on_header_line(status_line.as_bytes()))?;

        for (name, value) in response.headers() {
            let mut line = Vec::with_capacity(name.as_str().len() + value.len() + 4);
            line.extend_from_slice(name.as_str().as_bytes());
            line.extend_from_slice(b": ");
            line.extend_from_slice(value.as_bytes());
            line.extend_from_slice(b"\r\n");
            delivered(parser.on_header_line(&line))?;
        }
        delivered(parser.on_header_line(b"\r\n"))?;

        while let Some(chunk) = response.chunk().await.map_err(map_reqwest_error)? {
            delivered(parser.on_body_chunk(&chunk))?;
        }
        Ok(())
    }

    fn version(&self) -> &str {
        VERSION
    }
}

/// Abort the transfer when the parser rejected a delivery.
fn delivered(accepted: bool) -> Result<(), AppError> {
    if accepted {
        Ok(())
    } else {
        Err(AppError::Transport(
            "Transfer aborted by response parser".into(),
        ))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Transport(format!("Operation timed out: {e}"))
    } else if e.is_connect() {
        AppError::Transport(format!("Connection failed: {e}"))
    } else if e.is_builder() {
        AppError::InvalidInput(format!("Invalid request: {e}"))
    } else {
        AppError::Transport(e.to_string())
    }
}

use crate::error::AppError;
use crate::models::RawResponse;
use crate::response::ResponseParser;
use crate::traits::{Scraper, Transport};

/// [`Scraper`] that runs one request on a [`Transport`] and assembles the
/// streamed response with a fresh [`ResponseParser`].
#[derive(Debug, Clone)]
pub struct HttpScraper<T> {
    transport: T,
}

impl<T: Transport> HttpScraper<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> Scraper for HttpScraper<T> {
    async fn scrape(&self, url: &str) -> Result<RawResponse, AppError> {
        let mut parser = ResponseParser::new();
        let transferred = self.transport.get(url, &mut parser).await;
        if let Err(e) = &transferred {
            tracing::debug!(%url, error = %e, parse_error = ?parser.error(), "Transfer failed");
        }
        parser.finish(transferred)
    }

    fn version(&self) -> &str {
        self.transport.version()
    }
}

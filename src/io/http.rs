//! HTTP transport for tile fetches.
//!
//! HiPS survey servers expose the same `Norder/Dir/Npix` tree over plain
//! HTTP; a tile fetch is a single GET. The response body is streamed and the
//! cancellation probe is polled after every received chunk, so an abort
//! surfaces without waiting for the full payload.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use reqwest::StatusCode;
use tracing::{debug, trace};
use url::Url;

use crate::error::FetchError;

use super::fetcher::{CancelProbe, TileFetcher};

/// Default request timeout. Generous: deep-order FITS tiles can be large.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// [`TileFetcher`] over HTTP(S) using a shared connection pool.
pub struct HttpTileFetcher {
    client: reqwest::Client,
}

impl HttpTileFetcher {
    /// Create a fetcher with the default client configuration.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Create a fetcher around an existing client (custom proxy, UA, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileFetcher for HttpTileFetcher {
    async fn fetch(
        &self,
        url: &Url,
        chunk: usize,
        cancel: &dyn CancelProbe,
    ) -> Result<Bytes, FetchError> {
        if cancel.cancelled() {
            return Err(FetchError::Cancelled);
        }

        debug!(%url, "fetching tile");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(FetchError::NotFound(url.to_string()));
            }
            status if !status.is_success() => {
                return Err(FetchError::Connection(format!("{url}: HTTP {status}")));
            }
            _ => {}
        }

        let mut body = match response.content_length() {
            Some(len) => BytesMut::with_capacity(len as usize),
            None => BytesMut::new(),
        };

        // The transport decides the received chunk sizes; `chunk` bounds how
        // many bytes may pass between two cancellation polls.
        let mut response = response;
        let mut since_poll = 0usize;
        while let Some(part) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Connection(e.to_string()))?
        {
            body.put_slice(&part);
            since_poll += part.len();
            if since_poll >= chunk || part.len() >= chunk {
                since_poll = 0;
                if cancel.cancelled() {
                    trace!(%url, read = body.len(), "fetch cancelled mid-stream");
                    return Err(FetchError::Cancelled);
                }
            }
        }

        if cancel.cancelled() {
            return Err(FetchError::Cancelled);
        }

        trace!(%url, bytes = body.len(), "fetch complete");
        Ok(body.freeze())
    }
}

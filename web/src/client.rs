//! Client for the Stats API, used by the Todo API's `/api/stats` proxy.

use crate::error::AppError;
use axum::body::Bytes;
use axum::http::StatusCode;
use std::time::Duration;

/// Fetches `http://{host}/stats`.
#[derive(Clone, Debug)]
pub struct StatsClient {
    http: reqwest::Client,
    url: String,
}

impl StatsClient {
    /// Client for the Stats API listening on `host` (`name:port`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(host: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: format!("http://{}/stats", host.trim_end_matches('/')),
        })
    }

    /// The URL requests go to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Status and raw body of `GET /stats`.
    ///
    /// # Errors
    ///
    /// Returns a 500 [`AppError`] if the Stats API cannot be reached or the
    /// body cannot be read.
    pub async fn fetch(&self) -> Result<(StatusCode, Bytes), AppError> {
        let response = self.http.get(&self.url).send().await.map_err(|e| {
            AppError::internal("Stats service unavailable").with_source(e)
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            AppError::internal("Stats service unavailable").with_source(e)
        })?;

        tracing::debug!(url = %self.url, status = %status, "Fetched stats");
        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn url_points_at_stats_route() {
        let client = StatsClient::new("stats-api:3001", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url(), "http://stats-api:3001/stats");

        let client = StatsClient::new("localhost:3001/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url(), "http://localhost:3001/stats");
    }
}

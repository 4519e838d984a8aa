// SPDX-License-Identifier: MIT OR Apache-2.0
//! Page fetching with a fixed user agent.

use crate::IngestError;
use tracing::debug;

/// User agent sent on every outbound fetch.
pub const USER_AGENT: &str = "precogs-ingest/0.1";

/// A fetched page: the body plus the response `Link` header, which the
/// discovery flow inspects for mirror declarations.
#[derive(Clone, Debug)]
pub struct FetchedPage {
    /// The URL that was requested.
    pub url: String,
    /// Raw response body.
    pub html: String,
    /// Value of the `Link` response header, if present.
    pub link_header: Option<String>,
}

/// HTTP client wrapper used by ingestion, discovery, and verification.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
}

impl Default for PageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFetcher {
    /// Build a fetcher with the platform user agent.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// GET `url`; any non-2xx status is a hard [`IngestError::Fetch`].
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, IngestError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::Fetch(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Fetch(format!(
                "GET {url}: upstream returned {status}"
            )));
        }

        let link_header = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let html = response
            .text()
            .await
            .map_err(|e| IngestError::Fetch(format!("GET {url}: read body: {e}")))?;

        debug!(url, bytes = html.len(), "page fetched");
        Ok(FetchedPage {
            url: url.to_string(),
            html,
            link_header,
        })
    }

    /// Fetch a small plain-text resource (the verification well-known file).
    pub async fn fetch_text(&self, url: &str) -> Result<String, IngestError> {
        let page = self.fetch(url).await?;
        Ok(page.html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_returns_body_and_link_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body>hi</body></html>")
                    .insert_header("link", "<https://m.example/x>; rel=\"alternate\""),
            )
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new();
        let page = fetcher.fetch(&server.uri()).await.unwrap();
        assert!(page.html.contains("hi"));
        assert!(page.link_header.unwrap().contains("alternate"));
    }

    #[tokio::test]
    async fn non_2xx_is_a_hard_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new();
        let err = fetcher
            .fetch(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}

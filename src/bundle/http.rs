use super::{DownloadOutcome, DownloadRequest};
use reqwest::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Conditional HTTP GET for rule bundles
#[derive(Clone, Debug, Default)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch `request.url`, revalidating against `request.etag` when one is known
    pub async fn download(&self, request: DownloadRequest) -> DownloadOutcome {
        let mut builder = self.client.get(&request.url);
        if let Some(etag) = &request.etag {
            builder = builder.header(IF_NONE_MATCH, etag.as_str());
        }

        debug!(url = %request.url, etag = ?request.etag, "Downloading rule bundle");

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return DownloadOutcome::Failed(format!("request failed: {}", e)),
        };

        let status = response.status();
        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age);

        if status == StatusCode::NOT_MODIFIED {
            return DownloadOutcome::NotModified { max_age };
        }
        if !status.is_success() {
            return DownloadOutcome::Failed(format!("server returned {}", status));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match response.bytes().await {
            Ok(body) => DownloadOutcome::Content {
                body: body.to_vec(),
                etag,
                max_age,
            },
            Err(e) => DownloadOutcome::Failed(format!("failed to read body: {}", e)),
        }
    }
}

/// `max-age` directive of a Cache-Control header
fn parse_max_age(header: &str) -> Option<Duration> {
    header.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse().ok().map(Duration::from_secs)
        } else {
            None
        }
    })
}

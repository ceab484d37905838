// Rule bundle loading: conditional download with a local cache.
//
// The loader only sees a `BundleStrategy`, a set of plain functions for
// downloading and for reading, writing and invalidating cache entries.
// `BundleStrategy::http` wires the reqwest downloader and the file cache;
// tests swap in closures.

use crate::rules::{RuleSetStatus, RulesEngine};
use crate::variant::Variant;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

mod cache;
mod http;

pub use cache::{CachedBundle, FileCache};
pub use http::HttpDownloader;

/// Bundle source and cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BundleConfig {
    /// Remote bundle location
    #[serde(default)]
    pub url: Option<String>,

    /// Local bundle file, used instead of `url` when set
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Freshness of a download whose response carries no `max-age`
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/lib/pulse/cache")
}

fn default_ttl_seconds() -> u64 {
    3600
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: None,
            cache_dir: default_cache_dir(),
            default_ttl_seconds: default_ttl_seconds(),
        }
    }
}

/// What to fetch, and the ETag of the copy already held
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    /// The held copy is still current
    NotModified { max_age: Option<Duration> },
    Content {
        body: Vec<u8>,
        etag: Option<String>,
        max_age: Option<Duration>,
    },
    Failed(String),
}

pub type DownloadFn = Box<dyn Fn(DownloadRequest) -> BoxFuture<'static, DownloadOutcome> + Send + Sync>;
pub type CacheReadFn = Box<dyn Fn(&str) -> Result<Option<CachedBundle>> + Send + Sync>;
pub type CacheWriteFn = Box<dyn Fn(&CachedBundle) -> Result<()> + Send + Sync>;
pub type CacheInvalidateFn = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// I/O used by [`BundleLoader`]
pub struct BundleStrategy {
    pub download: DownloadFn,
    pub cache_read: CacheReadFn,
    pub cache_write: CacheWriteFn,
    pub cache_invalidate: CacheInvalidateFn,
}

impl BundleStrategy {
    /// Download over HTTP and cache in `cache`
    pub fn http(cache: FileCache) -> Self {
        let downloader = Arc::new(HttpDownloader::new());
        let cache = Arc::new(cache);
        let (read_cache, write_cache, invalidate_cache) =
            (Arc::clone(&cache), Arc::clone(&cache), cache);

        Self {
            download: Box::new(move |request: DownloadRequest| {
                let downloader = Arc::clone(&downloader);
                async move { downloader.download(request).await }.boxed()
            }),
            cache_read: Box::new(move |url: &str| read_cache.load(url)),
            cache_write: Box::new(move |bundle: &CachedBundle| write_cache.store(bundle)),
            cache_invalidate: Box::new(move |url: &str| invalidate_cache.invalidate(url)),
        }
    }
}

/// Keeps a rule bundle current, preferring the cache while it is fresh
pub struct BundleLoader {
    strategy: BundleStrategy,
    default_ttl: Duration,
}

impl BundleLoader {
    pub fn new(strategy: BundleStrategy, default_ttl: Duration) -> Self {
        Self {
            strategy,
            default_ttl,
        }
    }

    /// HTTP loader with the cache directory and TTL from `config`
    pub fn from_config(config: &BundleConfig) -> Self {
        Self::new(
            BundleStrategy::http(FileCache::new(&config.cache_dir)),
            Duration::from_secs(config.default_ttl_seconds),
        )
    }

    /// Current bundle document for `url`.
    ///
    /// A fresh cache entry is returned without touching the network.
    /// Otherwise the bundle is downloaded, conditionally if an ETag is
    /// cached. A failed download falls back to the cached copy, however
    /// old; it is an error only when nothing is cached.
    pub async fn refresh(&self, url: &str) -> Result<Variant> {
        let cached = self.read_cache(url);

        if let Some(entry) = &cached {
            if entry.is_fresh(Utc::now()) {
                debug!(url = %url, expires_at = %entry.expires_at, "Serving rule bundle from cache");
                return Ok(Variant::from(&entry.document));
            }
        }

        let request = DownloadRequest {
            url: url.to_string(),
            etag: cached.as_ref().and_then(|entry| entry.etag.clone()),
        };

        match (self.strategy.download)(request).await {
            DownloadOutcome::NotModified { max_age } => {
                let Some(mut entry) = cached else {
                    return Err(anyhow!(
                        "Server reported {} not modified but no cached copy exists",
                        url
                    ));
                };
                entry.expires_at = self.expiry(max_age)?;
                self.write_cache(&entry);
                info!(url = %url, expires_at = %entry.expires_at, "Rule bundle not modified");
                Ok(Variant::from(&entry.document))
            }
            DownloadOutcome::Content {
                body,
                etag,
                max_age,
            } => {
                let document: serde_json::Value = match serde_json::from_slice(&body) {
                    Ok(document) => document,
                    Err(e) => {
                        return self.fall_back(url, cached, &format!("invalid JSON: {}", e));
                    }
                };

                let entry = CachedBundle {
                    url: url.to_string(),
                    etag,
                    expires_at: self.expiry(max_age)?,
                    fetched_at: Utc::now(),
                    document,
                };
                self.write_cache(&entry);
                info!(url = %url, bytes = body.len(), etag = ?entry.etag, "Rule bundle downloaded");
                Ok(Variant::from(&entry.document))
            }
            DownloadOutcome::Failed(reason) => self.fall_back(url, cached, &reason),
        }
    }

    /// [`refresh`](Self::refresh) and load the result into `engine`
    pub async fn refresh_into(&self, engine: &RulesEngine, url: &str) -> Result<RuleSetStatus> {
        let document = self.refresh(url).await?;
        engine
            .load_rules(&document)
            .with_context(|| format!("Rule bundle from {} was rejected", url))
    }

    /// Drop the cached copy so the next refresh downloads unconditionally
    pub fn invalidate(&self, url: &str) -> Result<()> {
        (self.strategy.cache_invalidate)(url)
    }

    fn read_cache(&self, url: &str) -> Option<CachedBundle> {
        match (self.strategy.cache_read)(url) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(url = %url, error = %e, "Unreadable cache entry, discarding");
                if let Err(e) = (self.strategy.cache_invalidate)(url) {
                    warn!(url = %url, error = %e, "Failed to discard cache entry");
                }
                None
            }
        }
    }

    fn write_cache(&self, entry: &CachedBundle) {
        if let Err(e) = (self.strategy.cache_write)(entry) {
            warn!(url = %entry.url, error = %e, "Failed to cache rule bundle");
        }
    }

    fn fall_back(&self, url: &str, cached: Option<CachedBundle>, reason: &str) -> Result<Variant> {
        match cached {
            Some(entry) => {
                warn!(url = %url, reason = %reason, "Rule bundle download failed, using cached copy");
                Ok(Variant::from(&entry.document))
            }
            None => Err(anyhow!(
                "Rule bundle download from {} failed and nothing is cached: {}",
                url,
                reason
            )),
        }
    }

    fn expiry(&self, max_age: Option<Duration>) -> Result<chrono::DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(max_age.unwrap_or(self.default_ttl))
            .context("Bundle TTL out of range")?;
        Utc::now()
            .checked_add_signed(ttl)
            .context("Bundle TTL out of range")
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// A downloaded bundle plus the metadata needed to revalidate it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedBundle {
    /// URL the bundle was fetched from
    pub url: String,

    /// Server ETag, sent back as `If-None-Match`
    pub etag: Option<String>,

    /// After this instant the entry must be revalidated
    pub expires_at: DateTime<Utc>,

    /// When the content was last downloaded
    pub fetched_at: DateTime<Utc>,

    /// Parsed bundle document
    pub document: serde_json::Value,
}

impl CachedBundle {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Bundle cache on the local filesystem, one gzip-compressed JSON file per URL
#[derive(Clone, Debug)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key for a URL: lowercase hex SHA-256 of the URL text
    pub fn key(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))
    }

    fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json.gz", Self::key(url)))
    }

    /// Read the entry for `url`; `Ok(None)` if nothing is cached
    pub fn load(&self, url: &str) -> Result<Option<CachedBundle>> {
        let path = self.path_for(url);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open cache file {}", path.display()))
            }
        };

        let mut json = String::new();
        GzDecoder::new(file)
            .read_to_string(&mut json)
            .context("Failed to decompress cache file")?;

        let entry = serde_json::from_str(&json).context("Failed to deserialize cache entry")?;
        Ok(Some(entry))
    }

    /// Write the entry for `bundle.url`.
    ///
    /// Writes to a `.tmp` file, fsyncs, then renames over the old entry, so
    /// readers never see a partial file.
    pub fn store(&self, bundle: &CachedBundle) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {}", self.dir.display()))?;

        let json = serde_json::to_string(bundle).context("Failed to serialize cache entry")?;
        let path = self.path_for(&bundle.url);
        let tmp_path = path.with_extension("tmp");

        {
            let tmp_file = File::create(&tmp_path).context("Failed to create temporary cache file")?;
            let mut encoder = GzEncoder::new(tmp_file, Compression::default());
            encoder
                .write_all(json.as_bytes())
                .context("Failed to write compressed cache data")?;
            let file = encoder.finish().context("Failed to finish compression")?;
            file.sync_all().context("Failed to sync cache file to disk")?;
        }

        fs::rename(&tmp_path, &path).context("Failed to rename temporary cache file")?;
        Ok(())
    }

    /// Remove the entry for `url`. Removing a missing entry is not an error.
    pub fn invalidate(&self, url: &str) -> Result<()> {
        match fs::remove_file(self.path_for(url)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove cache file"),
        }
    }
}

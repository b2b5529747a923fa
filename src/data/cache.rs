use anyhow::{bail, Context, Result};
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::path::{Path, PathBuf};

use crate::error::ForecastError;

/// Local data directory with optional S3 fetch-on-miss.
///
/// Reference tables and model artifacts are addressed by a relative path
/// (`"stores.csv"`, `"model/manifest.json"`); the same relative path is used
/// as the S3 object key.
pub struct CachedStore {
    data_dir: PathBuf,
    bucket: Option<Box<Bucket>>,
}

/// Local presence of one cached file.
#[derive(Debug, Clone)]
pub struct FileStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: Option<u64>,
    pub last_updated: Option<String>,
}

impl CachedStore {
    /// Create a new `CachedStore`.
    ///
    /// - `data_dir`: local directory for reference tables and the model
    /// - `bucket`: optional S3 bucket for remote fetch-on-miss
    pub fn new(data_dir: PathBuf, bucket: Option<Box<Bucket>>) -> Self {
        Self { data_dir, bucket }
    }

    /// Return the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn has_remote(&self) -> bool {
        self.bucket.is_some()
    }

    /// Build the remote side from environment variables.
    ///
    /// | Env Var | Default | Purpose |
    /// |---------|---------|---------|
    /// | `S3_BUCKET` | (none) | Bucket name; S3 is disabled when unset |
    /// | `S3_ENDPOINT` | (none) | S3-compatible endpoint URL |
    /// | `AWS_ACCESS_KEY_ID` | (none) | S3 credentials |
    /// | `AWS_SECRET_ACCESS_KEY` | (none) | S3 credentials |
    pub fn from_env(data_dir: PathBuf) -> Result<Self> {
        let bucket = match (std::env::var("S3_BUCKET"), std::env::var("S3_ENDPOINT")) {
            (Ok(bucket_name), Ok(endpoint)) => {
                let region = Region::Custom {
                    region: "auto".to_string(),
                    endpoint,
                };
                let credentials = Credentials::from_env_specific(
                    Some("AWS_ACCESS_KEY_ID"),
                    Some("AWS_SECRET_ACCESS_KEY"),
                    None,
                    None,
                )
                .context("Failed to load S3 credentials from environment")?;

                let bucket = Bucket::new(&bucket_name, region, credentials)
                    .context("Failed to create S3 bucket")?;
                Some(bucket)
            }
            _ => None,
        };

        Ok(Self::new(data_dir, bucket))
    }

    /// Resolve the local path for a relative file name.
    ///
    /// Every segment must be a plain name; `..`, absolute paths and empty
    /// segments are rejected.
    pub fn local_path(&self, relative: &str) -> Result<PathBuf> {
        let mut path = self.data_dir.clone();
        for segment in relative.split('/') {
            validate_path_segment(segment)
                .with_context(|| format!("Invalid cache path: {relative}"))?;
            path.push(segment);
        }
        Ok(path)
    }

    /// Ensure the file exists locally, fetching from S3 once if needed.
    ///
    /// A file that is absent locally and cannot be fetched (no remote, a
    /// failed GET, or a non-200 status) yields [`ForecastError::NotFound`].
    pub async fn ensure_local(&self, relative: &str, what: &'static str) -> Result<PathBuf> {
        let path = self.local_path(relative)?;

        if path.exists() {
            return Ok(path);
        }

        let Some(bucket) = &self.bucket else {
            return Err(ForecastError::NotFound { what, path }.into());
        };

        tracing::info!(%relative, "Fetching from S3");
        let response = match bucket.get_object(relative).await {
            Ok(response) if response.status_code() == 200 => response,
            Ok(response) => {
                tracing::warn!(%relative, status = response.status_code(), "S3 object unavailable");
                return Err(ForecastError::NotFound { what, path }.into());
            }
            Err(e) => {
                tracing::warn!(%relative, error = %e, "S3 GET failed");
                return Err(ForecastError::NotFound { what, path }.into());
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }

        std::fs::write(&path, response.as_slice())
            .with_context(|| format!("Failed to write cache file: {}", path.display()))?;

        tracing::info!(%relative, path = %path.display(), "Cached locally");
        Ok(path)
    }

    /// Report whether a file is present locally, without fetching.
    pub fn status(&self, relative: &str) -> Result<FileStatus> {
        let path = self.local_path(relative)?;
        if !path.exists() {
            return Ok(FileStatus {
                path,
                exists: false,
                size_bytes: None,
                last_updated: None,
            });
        }

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let modified: chrono::DateTime<chrono::Utc> = metadata.modified()?.into();
        Ok(FileStatus {
            path,
            exists: true,
            size_bytes: Some(metadata.len()),
            last_updated: Some(modified.to_rfc3339()),
        })
    }
}

/// Ensure a path segment contains only safe characters.
///
/// Rejects empty strings, absolute paths, and segments with directory separators or `..`.
fn validate_path_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        bail!("path segment must not be empty");
    }
    if Path::new(segment)
        .components()
        .any(|c| !matches!(c, std::path::Component::Normal(_)))
    {
        bail!("path segment contains illegal characters or components: {segment}");
    }
    // Reject embedded separators (both Unix '/' and Windows '\') on any platform
    if segment.contains('/') || segment.contains('\\') {
        bail!("path segment must not contain path separators: {segment}");
    }
    Ok(())
}

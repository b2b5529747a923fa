use anyhow::Result;

use crate::data::cache::CachedStore;
use crate::data::{ITEMS_FILE, STORES_FILE, TRAIN_FILE};
use crate::engine::model::{ModelManifest, MANIFEST_FILE};

use super::response_types::{CachedFile, CheckCacheResponse};

fn file_entry(cache: &CachedStore, relative: &str) -> Result<CachedFile> {
    let status = cache.status(relative)?;
    Ok(CachedFile {
        name: relative.to_string(),
        exists: status.exists,
        file_path: status.path.display().to_string(),
        size_bytes: status.size_bytes,
        last_updated: status.last_updated,
    })
}

/// Report which reference tables and model files are present locally.
///
/// The model file is only listed once its manifest is present and readable.
pub fn execute(cache: &CachedStore, model_dir: &str) -> Result<CheckCacheResponse> {
    let manifest_key = format!("{model_dir}/{MANIFEST_FILE}");
    let mut files = Vec::new();
    for relative in [STORES_FILE, ITEMS_FILE, TRAIN_FILE, manifest_key.as_str()] {
        files.push(file_entry(cache, relative)?);
    }

    let manifest_path = cache.local_path(&manifest_key)?;
    if manifest_path.exists() {
        match ModelManifest::read(&manifest_path) {
            Ok(manifest) => {
                files.push(file_entry(cache, &format!("{model_dir}/{}", manifest.model_file))?);
            }
            Err(e) => tracing::warn!(error = %e, "Model manifest is unreadable"),
        }
    }

    let missing: Vec<&str> = files
        .iter()
        .filter(|f| !f.exists)
        .map(|f| f.name.as_str())
        .collect();
    let remote_configured = cache.has_remote();
    let summary = if missing.is_empty() {
        format!("All {} files are present locally.", files.len())
    } else {
        format!(
            "{} of {} files missing locally: {}.",
            missing.len(),
            files.len(),
            missing.join(", ")
        )
    };
    let suggested_next_steps = match (missing.is_empty(), remote_configured) {
        (true, _) => vec!["Call dataset_summary to inspect the loaded data.".to_string()],
        (false, true) => vec![
            "Restart the server to fetch missing files from the configured S3 bucket.".to_string(),
        ],
        (false, false) => vec![format!(
            "Copy the missing files into {} or set S3_BUCKET and S3_ENDPOINT.",
            cache.data_dir().display()
        )],
    };

    Ok(CheckCacheResponse {
        summary,
        data_dir: cache.data_dir().display().to_string(),
        remote_configured,
        files,
        suggested_next_steps,
    })
}

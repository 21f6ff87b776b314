use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::schemas::{Exam, StoredResult};

pub async fn load_exams(path: &Path) -> Result<Vec<Exam>> {
    load_json(path).await
}

/// Loads a stored result set one record at a time. Only a file that is not a
/// JSON array fails as a whole; a record that does not parse as a result is
/// kept as [`StoredResult::Unreadable`].
pub async fn load_results(path: &Path) -> Result<Vec<StoredResult>> {
    let records: Vec<Box<RawValue>> = load_json(path).await?;
    let records: Vec<StoredResult> = records.into_iter().map(StoredResult::parse).collect();

    let unreadable = records.iter().filter(|record| record.result().is_none()).count();
    if unreadable > 0 {
        tracing::warn!(path = %path.display(), unreadable, "Stored result set has unreadable records");
    }

    Ok(records)
}

/// Writes through a sibling temp file and a rename.
pub async fn save_results(path: &Path, results: &[StoredResult]) -> Result<()> {
    save_json(path, results).await
}

async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let payload = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&payload).with_context(|| format!("Invalid JSON in {}", path.display()))
}

async fn save_json<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let payload = serde_json::to_vec_pretty(records).context("Failed to serialize results")?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, payload)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}

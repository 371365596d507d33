use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use core_orchestrator::check_upload_size;
use core_types::{MimeKind, UploadFile};

/// Files read in order up to the first path that could not be read.
pub struct ReadBatch {
    pub files: Vec<UploadFile>,
    pub failure: Option<anyhow::Error>,
}

pub async fn read_batch(paths: &[PathBuf]) -> ReadBatch {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match read_upload(path).await {
            Ok(file) => files.push(file),
            Err(err) => {
                return ReadBatch {
                    files,
                    failure: Some(err),
                };
            }
        }
    }
    ReadBatch {
        files,
        failure: None,
    }
}

/// Reads one file for upload. Oversized files are refused from their
/// metadata, before any bytes are loaded.
pub async fn read_upload(path: &Path) -> Result<UploadFile> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", path.display()))?;
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a file", path.display());
    }
    check_upload_size(&name, metadata.len())?;

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    // The file may have grown since it was stat'ed.
    check_upload_size(&name, bytes.len() as u64)?;
    let mime_type = MimeKind::from_path(path)
        .map(MimeKind::mime_type)
        .unwrap_or("application/octet-stream");
    Ok(UploadFile::new(name, mime_type, bytes))
}

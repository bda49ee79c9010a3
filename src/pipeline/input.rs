//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! Chapters are usually rendered locally, but a published chapter can be
//! narrated straight from its URL. Downloads land in a `TempDir` owned by
//! [`ResolvedInput`], so the file disappears when processing finishes.

use crate::error::BookworksError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` is kept alive until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    /// File stem used as the default audio file prefix.
    pub fn stem(&self) -> String {
        self.path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "chapter".to_string())
    }

    /// Read the whole file as UTF-8 (invalid sequences are replaced).
    pub async fn read_to_string(&self) -> Result<String, BookworksError> {
        let path = self.path();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => BookworksError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => BookworksError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local file path, downloading URLs.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, BookworksError> {
    if input.trim().is_empty() {
        return Err(BookworksError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, BookworksError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(BookworksError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(BookworksError::InvalidInput {
            input: format!("{} is a directory, expected an HTML file", path.display()),
        });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(BookworksError::PermissionDenied { path });
        }
        Err(_) => return Err(BookworksError::FileNotFound { path }),
    }

    debug!("Resolved local input: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, BookworksError> {
    info!("Downloading chapter from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BookworksError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            BookworksError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            BookworksError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(BookworksError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| BookworksError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| BookworksError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| BookworksError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment when it looks like a file name, else `index.html`.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "index.html".to_string()
}

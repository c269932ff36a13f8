//! Fetching generated media to disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::NlmError;

/// Hosts that serve artifact media only to a signed-in session.
const SESSION_MEDIA_HOST_SUFFIXES: &[&str] = &["googleusercontent.com", "usercontent.google.com"];

#[async_trait]
/// Retrieves the bytes behind a media URL.
pub trait MediaFetcher: Send + Sync {
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, NlmError>;
}

/// True when `url` points at a Google user-content host, which needs the
/// session cookies to serve the file.
pub fn requires_session_cookies(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    SESSION_MEDIA_HOST_SUFFIXES
        .iter()
        .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
}

/// Fetches `url` and writes it to `destination`, creating missing parent
/// directories.
pub async fn save_media(
    fetcher: &dyn MediaFetcher,
    url: &str,
    destination: &Path,
) -> Result<PathBuf, NlmError> {
    let bytes = fetcher.fetch_media(url).await?;
    if let Some(parent) = destination.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(destination, &bytes).await?;
    tracing::debug!(
        destination = %destination.display(),
        bytes = bytes.len(),
        "media saved"
    );
    Ok(destination.to_path_buf())
}

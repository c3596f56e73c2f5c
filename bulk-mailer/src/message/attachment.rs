//! Per-recipient attachment lookup.
//!
//! A missing or unreadable attachment never fails a recipient; the message
//! is sent without it and a warning is logged.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Attachment content ready to be embedded in a message.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentFile {
    pub filename: String,
    pub content: Vec<u8>,
    /// Full MIME type, e.g. `application/pdf`
    pub content_type: String,
}

/// Directory that recipient attachment names are resolved against.
#[derive(Debug, Clone)]
pub struct AttachmentDir {
    root: PathBuf,
}

impl AttachmentDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load `filename` from the directory.
    ///
    /// Names carrying path components are rejected so rows cannot reach
    /// outside the configured directory.
    pub async fn load(&self, filename: &str) -> Option<AttachmentFile> {
        let filename = filename.trim();
        let is_plain_name = Path::new(filename)
            .file_name()
            .map(|n| n == filename)
            .unwrap_or(false);

        if !is_plain_name {
            warn!(filename = filename, "attachment_name_rejected");
            return None;
        }

        let path = self.root.join(filename);

        match tokio::fs::read(&path).await {
            Ok(content) => {
                info!(
                    path = %path.display(),
                    size = content.len(),
                    "attachment_loaded"
                );
                Some(AttachmentFile {
                    filename: filename.to_string(),
                    content,
                    content_type: content_type_for(filename),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "attachment_missing");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "attachment_read_failed");
                None
            }
        }
    }
}

/// Guess a MIME type from the file extension.
pub fn content_type_for(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

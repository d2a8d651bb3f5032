use std::path::{Path, PathBuf};

use common::{error::AppError, utils::text::sha256_hex};
use tracing::{debug, warn};

/// One statute file read from the corpus directory.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    /// File name, used as the source label and to derive the record id.
    pub source: String,
    pub path: PathBuf,
    pub content: String,
    pub sha256: String,
}

/// Reads every `*.{extension}` file in `dir`, sorted by file name.
///
/// Files that cannot be read or are not UTF-8 are logged and skipped; a
/// missing directory is an error.
pub async fn scan_corpus(dir: &Path, extension: &str) -> Result<Vec<CorpusDocument>, AppError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(format!("corpus directory {} does not exist", dir.display()))
        } else {
            AppError::Io(err)
        }
    })?;

    let mut documents = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() || !has_extension(&path, extension) {
            continue;
        }
        let Some(source) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            warn!(path = %path.display(), "Skipping corpus file with a non UTF-8 name");
            continue;
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Skipping unreadable corpus file");
                continue;
            }
        };
        let content = match String::from_utf8(bytes) {
            Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Skipping corpus file that is not UTF-8");
                continue;
            }
        };
        if content.trim().is_empty() {
            debug!(path = %path.display(), "Skipping empty corpus file");
            continue;
        }

        documents.push(CorpusDocument {
            sha256: sha256_hex(content.as_bytes()),
            source,
            path,
            content,
        });
    }

    documents.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(documents)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension.trim_start_matches('.')))
}

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Written,
    Unchanged,
}

impl WriteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub status: WriteStatus,
    pub content_hash: String,
}

impl WriteOutcome {
    pub fn written(&self) -> bool {
        self.status == WriteStatus::Written
    }
}

/// Write `content` to `path` unless the file already holds exactly these bytes.
/// `Written` is reported only when the disk actually changed.
pub fn write_if_changed(path: &Path, content: &str) -> Result<WriteOutcome> {
    let content_hash = compute_hash(content);
    match fs::read(path) {
        Ok(existing) if existing == content.as_bytes() => {
            return Ok(WriteOutcome {
                path: path.to_path_buf(),
                status: WriteStatus::Unchanged,
                content_hash,
            });
        }
        Ok(_) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read {}", path.display()));
        }
    }

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), hash = %content_hash, "wrote file");
    Ok(WriteOutcome {
        path: path.to_path_buf(),
        status: WriteStatus::Written,
        content_hash,
    })
}

pub fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{WriteStatus, compute_hash, write_if_changed};

    #[test]
    fn writes_then_reports_unchanged() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data").join("nested").join("index.json");

        let first = write_if_changed(&path, "{}\n").expect("first write");
        assert_eq!(first.status, WriteStatus::Written);
        assert_eq!(fs::read_to_string(&path).expect("read"), "{}\n");

        let second = write_if_changed(&path, "{}\n").expect("second write");
        assert_eq!(second.status, WriteStatus::Unchanged);
        assert_eq!(first.content_hash, second.content_hash);

        let third = write_if_changed(&path, "{\"a\":1}\n").expect("third write");
        assert!(third.written());
    }

    #[test]
    fn unchanged_write_leaves_mtime_alone() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("doc.md");
        fs::write(&path, "# Title\n").expect("seed");
        let before = fs::metadata(&path).expect("meta").modified().expect("mtime");
        let outcome = write_if_changed(&path, "# Title\n").expect("write");
        let after = fs::metadata(&path).expect("meta").modified().expect("mtime");
        assert_eq!(outcome.status, WriteStatus::Unchanged);
        assert_eq!(before, after);
    }

    #[test]
    fn hash_is_short_hex() {
        let hash = compute_hash("abc");
        assert_eq!(hash.len(), 16);
        assert_eq!(hash, "ba7816bf8f01cfea");
    }
}

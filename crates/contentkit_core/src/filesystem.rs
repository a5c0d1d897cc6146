use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

use crate::error::PipelineError;

pub const README_NAME: &str = "readme.md";

#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Lower-case extensions without the dot.
    pub extensions: Vec<String>,
    /// Lower-case file names that are never returned.
    pub ignored_names: Vec<String>,
    pub skip_hidden: bool,
}

impl WalkOptions {
    pub fn tabular() -> Self {
        Self {
            extensions: vec!["csv".to_string()],
            ignored_names: Vec::new(),
            skip_hidden: true,
        }
    }

    pub fn markdown() -> Self {
        Self {
            extensions: vec!["md".to_string(), "markdown".to_string()],
            ignored_names: vec![README_NAME.to_string()],
            skip_hidden: true,
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        let lowered = name.to_ascii_lowercase();
        if self.ignored_names.iter().any(|ignored| *ignored == lowered) {
            return false;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| self.extensions.iter().any(|allowed| *allowed == ext))
    }
}

/// Recursively list matching files under `root`, sorted by path. A missing
/// root yields an empty list.
pub fn discover_files(root: &Path, options: &WalkOptions) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !options.skip_hidden
                || !entry.file_name().to_string_lossy().starts_with('.')
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if options.accepts(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Forward-slash path of `path` relative to `root`.
pub fn relative_display(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).with_context(|| {
        format!(
            "failed to derive relative path from root {} for {}",
            root.display(),
            path.display()
        )
    })?;
    Ok(display_path(rel))
}

/// Reject a candidate that would land outside `root` once normalized.
pub fn validate_scoped_path(root: &Path, candidate: &Path) -> Result<()> {
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let normalized = normalize_pathbuf(&absolute);
    let allowed = normalize_pathbuf(root);
    if normalized.starts_with(&allowed) {
        return Ok(());
    }
    bail!(
        "path escapes scoped directory: {}\nallowed root: {}",
        display_path(&normalized),
        display_path(&allowed)
    )
}

/// Parse an author-supplied relative path. Absolute paths and empty, `.` or
/// `..` segments are refused with the reason.
pub fn safe_relative_path(value: &str) -> std::result::Result<PathBuf, String> {
    let normalized = normalize_separators(value.trim());
    if normalized.is_empty() {
        return Err("path is empty".to_string());
    }
    if normalized.starts_with('/') || Path::new(&normalized).is_absolute() {
        return Err(format!("`{normalized}` must be relative"));
    }
    let mut out = PathBuf::new();
    for segment in normalized.split('/') {
        match segment {
            "" => return Err(format!("`{normalized}` contains an empty segment")),
            "." | ".." => {
                return Err(format!("`{normalized}` contains a traversal segment"));
            }
            other if other.contains(':') => {
                return Err(format!("`{normalized}` contains a drive or scheme marker"));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Lower-case, `[a-z0-9-]` only, dashes collapsed and trimmed.
pub fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut pending_dash = false;
    for ch in segment.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

pub fn slugify(value: &str) -> String {
    sanitize_segment(value)
}

pub fn is_url_safe_slug(value: &str) -> bool {
    !value.is_empty() && sanitize_segment(value) == value
}

/// Back-reference token for a source file: its root-relative path without
/// the extension, each segment sanitized. Empty or traversal segments fail.
pub fn path_token(relative: &str) -> Result<String> {
    let normalized = normalize_separators(relative);
    let without_ext = match normalized.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') && !stem.ends_with('/') && !stem.is_empty() => {
            stem.to_string()
        }
        _ => normalized.clone(),
    };
    let mut segments = Vec::new();
    for segment in without_ext.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            bail!(PipelineError::validation(
                normalized.as_str(),
                "path",
                format!("unsafe path segment `{segment}`"),
            ));
        }
        let cleaned = sanitize_segment(segment);
        if cleaned.is_empty() {
            bail!(PipelineError::validation(
                normalized.as_str(),
                "path",
                format!("path segment `{segment}` has no usable characters"),
            ));
        }
        segments.push(cleaned);
    }
    Ok(segments.join("/"))
}

pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && token.split('/').all(is_url_safe_slug)
}

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn display_path(path: &Path) -> String {
    normalize_separators(&path.to_string_lossy())
}

fn normalize_pathbuf(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Path::new(std::path::MAIN_SEPARATOR_STR)),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::tempdir;

    use super::{
        WalkOptions, discover_files, is_url_safe_slug, is_valid_token, path_token,
        relative_display, safe_relative_path, sanitize_segment, validate_scoped_path,
    };

    #[test]
    fn discover_filters_extensions_readme_and_hidden_dirs() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("energy")).expect("energy dir");
        fs::create_dir_all(root.join(".drafts")).expect("hidden dir");
        fs::write(root.join("README.md"), "# readme").expect("readme");
        fs::write(root.join("energy").join("grid.md"), "---\n---\n").expect("grid");
        fs::write(root.join("energy").join("notes.txt"), "x").expect("notes");
        fs::write(root.join("alpha.MD"), "x").expect("alpha");
        fs::write(root.join(".drafts").join("wip.md"), "x").expect("wip");

        let files = discover_files(root, &WalkOptions::markdown()).expect("discover");
        let relative = files
            .iter()
            .map(|path| relative_display(root, path).expect("relative"))
            .collect::<Vec<_>>();
        assert_eq!(relative, vec!["alpha.MD", "energy/grid.md"]);
    }

    #[test]
    fn discover_missing_root_is_empty() {
        let files = discover_files(Path::new("/nonexistent/contentkit"), &WalkOptions::tabular())
            .expect("discover");
        assert!(files.is_empty());
    }

    #[test]
    fn scoped_path_validation_blocks_escaping_path() {
        let root = PathBuf::from("/workspace/project/content");
        validate_scoped_path(&root, Path::new("energy/grid.md")).expect("inside");
        let error =
            validate_scoped_path(&root, Path::new("../secrets/token.txt")).expect_err("must fail");
        assert!(error.to_string().contains("path escapes scoped directory"));
    }

    #[test]
    fn safe_relative_path_rejects_traversal() {
        assert_eq!(
            safe_relative_path("energy/grid-report.md").expect("safe"),
            PathBuf::from("energy").join("grid-report.md")
        );
        assert!(safe_relative_path("../escape.md").is_err());
        assert!(safe_relative_path("energy//grid.md").is_err());
        assert!(safe_relative_path("/etc/passwd").is_err());
        assert!(safe_relative_path("C:/report.md").is_err());
        assert!(safe_relative_path("  ").is_err());
    }

    #[test]
    fn path_token_sanitizes_each_segment() {
        assert_eq!(
            path_token("Energy & Utilities/Grid Outlook 2026.md").expect("token"),
            "energy-utilities/grid-outlook-2026"
        );
        assert_eq!(path_token("energy\\grid.md").expect("token"), "energy/grid");
        assert!(path_token("energy/../grid.md").is_err());
        assert!(path_token("energy//grid.md").is_err());
        assert!(path_token("energy/%%%/grid.md").is_err());
    }

    #[test]
    fn token_and_slug_checks() {
        assert!(is_valid_token("energy/grid-outlook"));
        assert!(!is_valid_token("Energy/Grid"));
        assert!(!is_valid_token("energy//grid"));
        assert!(!is_valid_token(""));
        assert!(is_url_safe_slug("grid-outlook-2026"));
        assert!(!is_url_safe_slug("grid outlook"));
        assert_eq!(sanitize_segment("  Oil & Gas -- 2026 "), "oil-gas-2026");
    }
}

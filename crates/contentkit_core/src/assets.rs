//! Resolve possibly-incomplete author references (`/images/grid` or
//! `/images/old/grid.png`) to a file that actually exists under a media root.
//!
//! Unresolvable references come back unchanged so that broken links stay
//! visible to the validator instead of being silently dropped.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

use crate::filesystem::display_path;

const MAX_IGNORED_NAMED: usize = 3;

#[derive(Debug, Clone)]
pub struct AssetRoot {
    pub dir: PathBuf,
    /// Public URL prefix the references carry, e.g. `/images/`.
    pub url_prefix: String,
    /// Lower-case extensions, most preferred first.
    pub preferred_extensions: Vec<String>,
}

impl AssetRoot {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &str, preferred_extensions: &[String]) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.to_string(),
            preferred_extensions: preferred_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

/// basename stem → extension → candidate paths relative to the root,
/// shortest first, then lexicographic.
#[derive(Debug, Clone, Default)]
pub struct AssetIndex {
    entries: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    files: usize,
}

impl AssetIndex {
    pub fn build(root: &Path) -> Result<Self> {
        let mut index = Self::default();
        if !root.exists() {
            return Ok(index);
        }
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = display_path(relative);
            let name = relative.rsplit('/').next().unwrap_or(&relative);
            let (stem, ext) = split_extension(name);
            index
                .entries
                .entry(stem.to_ascii_lowercase())
                .or_default()
                .entry(ext.to_ascii_lowercase())
                .or_default()
                .push(relative.clone());
            index.files += 1;
        }
        for by_ext in index.entries.values_mut() {
            for candidates in by_ext.values_mut() {
                candidates.sort_by(|left, right| {
                    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
                });
            }
        }
        Ok(index)
    }

    pub fn file_count(&self) -> usize {
        self.files
    }

    fn contains_path(&self, relative: &str) -> bool {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        let (stem, ext) = split_extension(name);
        self.entries
            .get(&stem.to_ascii_lowercase())
            .and_then(|by_ext| by_ext.get(&ext.to_ascii_lowercase()))
            .is_some_and(|candidates| candidates.iter().any(|candidate| candidate == relative))
    }

    fn lookup(&self, stem: &str) -> Option<&BTreeMap<String, Vec<String>>> {
        self.entries.get(&stem.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub value: String,
    pub resolved: bool,
    pub warnings: Vec<String>,
}

impl Resolution {
    fn unchanged(reference: &str, warning: Option<String>) -> Self {
        Self {
            value: reference.to_string(),
            resolved: false,
            warnings: warning.into_iter().collect(),
        }
    }
}

/// Owns the per-run asset indexes, one per root directory.
#[derive(Debug, Default)]
pub struct AssetResolver {
    cache: HashMap<PathBuf, AssetIndex>,
}

impl AssetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_for(&mut self, root: &AssetRoot) -> Result<&AssetIndex> {
        if !self.cache.contains_key(&root.dir) {
            let index = AssetIndex::build(&root.dir)?;
            tracing::debug!(
                root = %display_path(&root.dir),
                files = index.file_count(),
                "built asset index"
            );
            self.cache.insert(root.dir.clone(), index);
        }
        Ok(&self.cache[&root.dir])
    }

    pub fn resolve(&mut self, root: &AssetRoot, reference: &str) -> Result<Resolution> {
        let trimmed = reference.trim();
        let cleaned = trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or(trimmed)
            .to_string();
        let Some(relative) = cleaned.strip_prefix(root.url_prefix.as_str()) else {
            return Ok(Resolution::unchanged(reference, None));
        };
        let relative = relative.trim_start_matches('/').to_string();
        let index = self.index_for(root)?;

        if !relative.is_empty() && index.contains_path(&relative) {
            return Ok(Resolution {
                value: format!("{}{relative}", root.url_prefix),
                resolved: true,
                warnings: Vec::new(),
            });
        }

        let name = relative.rsplit('/').next().unwrap_or(&relative);
        let (stem, requested_ext) = split_extension(name);
        let Some(by_ext) = index.lookup(stem).or_else(|| index.lookup(name)) else {
            return Ok(Resolution::unchanged(
                reference,
                Some(format!(
                    "no file under {} matches `{reference}`",
                    display_path(&root.dir)
                )),
            ));
        };

        let requested_ext = requested_ext.to_ascii_lowercase();
        let chosen_ext = if by_ext.contains_key(&requested_ext) {
            requested_ext
        } else if let Some(preferred) = root
            .preferred_extensions
            .iter()
            .find(|ext| by_ext.contains_key(ext.as_str()))
        {
            preferred.clone()
        } else {
            match by_ext.keys().next() {
                Some(first) => first.clone(),
                None => return Ok(Resolution::unchanged(reference, None)),
            }
        };

        let candidates = &by_ext[&chosen_ext];
        let mut warnings = Vec::new();
        if candidates.len() > 1 {
            let ignored = candidates
                .iter()
                .skip(1)
                .take(MAX_IGNORED_NAMED)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            let more = candidates.len().saturating_sub(1 + MAX_IGNORED_NAMED);
            let suffix = if more > 0 {
                format!(" and {more} more")
            } else {
                String::new()
            };
            warnings.push(format!(
                "`{reference}` matches {} files; using {} (ignored: {ignored}{suffix})",
                candidates.len(),
                candidates[0]
            ));
        }

        Ok(Resolution {
            value: format!("{}{}", root.url_prefix, candidates[0]),
            resolved: true,
            warnings,
        })
    }
}

/// Split `name.ext` when the extension looks like one (1-5 alphanumerics).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|ch| ch.is_ascii_alphanumeric()) =>
        {
            (stem, ext)
        }
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{AssetResolver, AssetRoot};

    fn image_root(dir: &std::path::Path) -> AssetRoot {
        AssetRoot::new(
            dir,
            "/images/",
            &["webp".to_string(), "png".to_string(), "jpg".to_string()],
        )
    }

    #[test]
    fn resolves_extensionless_reference_by_preference() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("reports")).expect("dir");
        fs::write(temp.path().join("reports/grid.jpg"), "jpg").expect("jpg");
        fs::write(temp.path().join("reports/grid.webp"), "webp").expect("webp");

        let mut resolver = AssetResolver::new();
        let resolution = resolver
            .resolve(&image_root(temp.path()), "/images/grid?v=2")
            .expect("resolve");
        assert!(resolution.resolved);
        assert_eq!(resolution.value, "/images/reports/grid.webp");
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn exact_path_wins_over_basename_lookup() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("deep/nested")).expect("dir");
        fs::write(temp.path().join("grid.png"), "a").expect("a");
        fs::write(temp.path().join("deep/nested/grid.png"), "b").expect("b");

        let mut resolver = AssetResolver::new();
        let resolution = resolver
            .resolve(&image_root(temp.path()), "/images/deep/nested/grid.png")
            .expect("resolve");
        assert_eq!(resolution.value, "/images/deep/nested/grid.png");
    }

    #[test]
    fn duplicate_candidates_resolve_deterministically_with_warning() {
        let temp = tempdir().expect("tempdir");
        for dir in ["b", "a", "ccc"] {
            fs::create_dir_all(temp.path().join(dir)).expect("dir");
            fs::write(temp.path().join(dir).join("chart.png"), dir).expect("write");
        }

        let root = image_root(temp.path());
        let first = AssetResolver::new()
            .resolve(&root, "/images/chart")
            .expect("resolve");
        let second = AssetResolver::new()
            .resolve(&root, "/images/old/chart.png")
            .expect("resolve");
        assert_eq!(first.value, "/images/a/chart.png");
        assert_eq!(second.value, "/images/a/chart.png");
        assert_eq!(first.warnings.len(), 1);
        assert!(first.warnings[0].contains("ignored: b/chart.png, ccc/chart.png"));
    }

    #[test]
    fn falls_back_to_any_existing_extension() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("logo.svg"), "svg").expect("svg");
        let mut resolver = AssetResolver::new();
        let resolution = resolver
            .resolve(&image_root(temp.path()), "/images/logo.png")
            .expect("resolve");
        assert_eq!(resolution.value, "/images/logo.svg");
    }

    #[test]
    fn unresolvable_references_come_back_unchanged() {
        let temp = tempdir().expect("tempdir");
        let mut resolver = AssetResolver::new();
        let root = image_root(temp.path());

        let missing = resolver.resolve(&root, "/images/missing").expect("resolve");
        assert!(!missing.resolved);
        assert_eq!(missing.value, "/images/missing");
        assert_eq!(missing.warnings.len(), 1);

        let foreign = resolver
            .resolve(&root, "https://cdn.example.com/x.png")
            .expect("resolve");
        assert!(!foreign.resolved);
        assert_eq!(foreign.value, "https://cdn.example.com/x.png");
        assert!(foreign.warnings.is_empty());
    }

    #[test]
    fn index_is_cached_per_root_for_the_run() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("one.png"), "1").expect("one");
        let root = image_root(temp.path());
        let mut resolver = AssetResolver::new();
        assert_eq!(resolver.index_for(&root).expect("index").file_count(), 1);

        fs::write(temp.path().join("two.png"), "2").expect("two");
        assert_eq!(resolver.index_for(&root).expect("index").file_count(), 1);
        assert!(!resolver.resolve(&root, "/images/two").expect("resolve").resolved);
    }
}

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILENAME: &str = "contentkit.toml";
pub const SKIP_SHEETS_ENV: &str = "CONTENTKIT_SKIP_SHEETS";

pub const DEFAULT_SHEETS_DIR: &str = "content/sheets";
pub const DEFAULT_MARKDOWN_DIR: &str = "content/reports";
pub const DEFAULT_NEWSROOM_DIR: &str = "content/newsroom";
pub const DEFAULT_MEDIA_DIR: &str = "public/images";
pub const DEFAULT_DOWNLOADS_DIR: &str = "public/downloads";
pub const DEFAULT_INDEX_PATH: &str = "data/content-index.json";
pub const DEFAULT_NEWSROOM_INDEX_PATH: &str = "data/newsroom.json";
pub const DEFAULT_IMAGE_PREFIX: &str = "/images/";
pub const DEFAULT_DOWNLOAD_PREFIX: &str = "/downloads/";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ContentkitConfig {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub assets: AssetsSection,
    #[serde(default)]
    pub ingest: IngestSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PathsSection {
    pub sheets: Option<String>,
    pub markdown: Option<String>,
    pub documents: Option<String>,
    pub newsroom: Option<String>,
    pub media: Option<String>,
    pub downloads: Option<String>,
    pub index: Option<String>,
    pub newsroom_index: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AssetsSection {
    pub image_prefix: Option<String>,
    pub download_prefix: Option<String>,
    #[serde(default)]
    pub image_extensions: Vec<String>,
    #[serde(default)]
    pub download_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct IngestSection {
    #[serde(default)]
    pub skip: bool,
}

impl PathsSection {
    pub fn sheets(&self) -> &str {
        self.sheets.as_deref().unwrap_or(DEFAULT_SHEETS_DIR)
    }

    pub fn markdown(&self) -> &str {
        self.markdown.as_deref().unwrap_or(DEFAULT_MARKDOWN_DIR)
    }

    /// Generated documents land next to the authored Markdown unless told otherwise.
    pub fn documents(&self) -> &str {
        self.documents.as_deref().unwrap_or_else(|| self.markdown())
    }

    pub fn newsroom(&self) -> &str {
        self.newsroom.as_deref().unwrap_or(DEFAULT_NEWSROOM_DIR)
    }

    pub fn media(&self) -> &str {
        self.media.as_deref().unwrap_or(DEFAULT_MEDIA_DIR)
    }

    pub fn downloads(&self) -> &str {
        self.downloads.as_deref().unwrap_or(DEFAULT_DOWNLOADS_DIR)
    }

    pub fn index(&self) -> &str {
        self.index.as_deref().unwrap_or(DEFAULT_INDEX_PATH)
    }

    pub fn newsroom_index(&self) -> &str {
        self.newsroom_index
            .as_deref()
            .unwrap_or(DEFAULT_NEWSROOM_INDEX_PATH)
    }
}

impl AssetsSection {
    pub fn image_prefix(&self) -> &str {
        self.image_prefix.as_deref().unwrap_or(DEFAULT_IMAGE_PREFIX)
    }

    pub fn download_prefix(&self) -> &str {
        self.download_prefix
            .as_deref()
            .unwrap_or(DEFAULT_DOWNLOAD_PREFIX)
    }

    pub fn image_extensions(&self) -> Vec<String> {
        if self.image_extensions.is_empty() {
            ["webp", "avif", "png", "jpg", "jpeg", "gif", "svg"]
                .iter()
                .map(|ext| (*ext).to_string())
                .collect()
        } else {
            self.image_extensions.clone()
        }
    }

    pub fn download_extensions(&self) -> Vec<String> {
        if self.download_extensions.is_empty() {
            ["pdf", "zip", "xlsx", "docx", "pptx"]
                .iter()
                .map(|ext| (*ext).to_string())
                .collect()
        } else {
            self.download_extensions.clone()
        }
    }
}

impl ContentkitConfig {
    /// Tabular ingestion is skipped when env CONTENTKIT_SKIP_SHEETS is truthy or
    /// `[ingest] skip = true`.
    pub fn skip_sheets(&self) -> bool {
        self.skip_sheets_with_lookup(|key| env::var(key).ok())
    }

    fn skip_sheets_with_lookup<F>(&self, lookup_env: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup_env(SKIP_SHEETS_ENV) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return crate::fields::parse_truthy(trimmed);
            }
        }
        self.ingest.skip
    }
}

/// Load and parse the config from a TOML file. Returns default if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ContentkitConfig> {
    if !config_path.exists() {
        return Ok(ContentkitConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ContentkitConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

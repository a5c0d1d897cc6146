use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::assets::AssetRoot;
use crate::config::{CONFIG_FILENAME, ContentkitConfig, load_config};

pub const PROJECT_ROOT_ENV: &str = "CONTENTKIT_PROJECT_ROOT";
pub const CONFIG_ENV: &str = "CONTENTKIT_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

/// Every directory and file a run touches, absolute, plus the loaded config.
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub config_path: PathBuf,
    pub sheets_dir: PathBuf,
    pub markdown_dir: PathBuf,
    pub documents_dir: PathBuf,
    pub newsroom_dir: PathBuf,
    pub media_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub index_path: PathBuf,
    pub newsroom_index_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
    pub config: ContentkitConfig,
}

impl ResolvedPaths {
    /// Layout for `project_root` with the given config, as if passed by flag.
    pub fn from_config(
        project_root: &Path,
        config_path: PathBuf,
        config: ContentkitConfig,
    ) -> Self {
        let join = |value: &str| absolutize(Path::new(value), project_root);
        Self {
            sheets_dir: join(config.paths.sheets()),
            markdown_dir: join(config.paths.markdown()),
            documents_dir: join(config.paths.documents()),
            newsroom_dir: join(config.paths.newsroom()),
            media_dir: join(config.paths.media()),
            downloads_dir: join(config.paths.downloads()),
            index_path: join(config.paths.index()),
            newsroom_index_path: join(config.paths.newsroom_index()),
            project_root: project_root.to_path_buf(),
            config_path,
            root_source: ValueSource::Flag,
            config_source: ValueSource::Default,
            config,
        }
    }

    /// Default layout under `project_root`.
    pub fn for_project_root(project_root: &Path) -> Self {
        Self::from_config(
            project_root,
            project_root.join(CONFIG_FILENAME),
            ContentkitConfig::default(),
        )
    }

    pub fn image_root(&self) -> AssetRoot {
        AssetRoot::new(
            &self.media_dir,
            self.config.assets.image_prefix(),
            &self.config.assets.image_extensions(),
        )
    }

    pub fn download_root(&self) -> AssetRoot {
        AssetRoot::new(
            &self.downloads_dir,
            self.config.assets.download_prefix(),
            &self.config.assets.download_extensions(),
        )
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nconfig_path={} ({})\nsheets_dir={}\nmarkdown_dir={}\ndocuments_dir={}\nnewsroom_dir={}\nmedia_dir={}\ndownloads_dir={}\nindex_path={}\nnewsroom_index_path={}",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.sheets_dir),
            normalize_for_display(&self.markdown_dir),
            normalize_for_display(&self.documents_dir),
            normalize_for_display(&self.newsroom_dir),
            normalize_for_display(&self.media_dir),
            normalize_for_display(&self.downloads_dir),
            normalize_for_display(&self.index_path),
            normalize_for_display(&self.newsroom_index_path),
        )
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = if let Some(path) = overrides.project_root.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env(PROJECT_ROOT_ENV)) {
        (absolutize(Path::new(&value), &context.cwd), ValueSource::Env)
    } else {
        (context.cwd.clone(), ValueSource::Default)
    };

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env(CONFIG_ENV)) {
        (absolutize(Path::new(&value), &project_root), ValueSource::Env)
    } else {
        (project_root.join(CONFIG_FILENAME), ValueSource::Default)
    };

    let config = load_config(&config_path)?;
    let mut paths = ResolvedPaths::from_config(&project_root, config_path, config);
    paths.root_source = root_source;
    paths.config_source = config_source;
    Ok(paths)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

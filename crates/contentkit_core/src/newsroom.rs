use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::Serialize;
use serde_json::Value;

use crate::dates::is_canonical_date;
use crate::docindex::{DocumentFailure, document_slug};
use crate::error::PipelineError;
use crate::fields::tags_from_value;
use crate::filesystem::{WalkOptions, discover_files, display_path, relative_display};
use crate::frontmatter::split_front_matter;
use crate::model::{NewsroomArticle, NewsroomIndex, key};
use crate::runtime::ResolvedPaths;
use crate::writer::{WriteStatus, write_if_changed};

pub const SUMMARY_LIMIT: usize = 240;
const ELLIPSIS: char = '…';
const COUNT_KEY: &str = "count";

#[derive(Debug, Clone)]
pub struct NewsroomOptions {
    /// Date given to releases seen for the first time.
    pub today: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewsroomReport {
    pub files: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub dropped: usize,
    pub failed: usize,
    pub failures: Vec<DocumentFailure>,
    pub index_status: Option<WriteStatus>,
}

/// Rebuild the newsroom index from the press-release Markdown files. Dates
/// are stamped once and never move afterwards.
pub fn index_newsroom(paths: &ResolvedPaths, options: &NewsroomOptions) -> Result<NewsroomReport> {
    let mut report = NewsroomReport::default();
    if !paths.newsroom_dir.is_dir() {
        tracing::info!(
            root = %display_path(&paths.newsroom_dir),
            "no newsroom directory; newsroom index left as is"
        );
        return Ok(report);
    }

    let files = discover_files(&paths.newsroom_dir, &WalkOptions::markdown())?;
    report.files = files.len();
    let prior = NewsroomIndex::load(&paths.newsroom_index_path)?;
    let prior_by_slug = prior
        .releases
        .iter()
        .map(|article| (article.slug.as_str(), article))
        .collect::<HashMap<_, _>>();

    let mut releases = Vec::new();
    let mut seen_slugs: HashMap<String, String> = HashMap::new();
    let mut failed_sources = HashSet::new();
    for file in &files {
        let relative = relative_display(&paths.newsroom_dir, file)?;
        let article = match read_article(file, &relative) {
            Ok(article) => article,
            Err(error) => {
                tracing::error!(path = %relative, "{error:#}");
                report.failures.push(DocumentFailure {
                    path: relative.clone(),
                    message: format!("{error:#}"),
                });
                failed_sources.insert(relative);
                continue;
            }
        };
        if let Some(first) = seen_slugs.get(&article.slug) {
            bail!(PipelineError::IdentityConflict {
                detail: format!(
                    "duplicate newsroom slug `{}` in {first} and {relative}",
                    article.slug
                ),
            });
        }
        seen_slugs.insert(article.slug.clone(), relative);
        releases.push(article);
    }
    report.failed = report.failures.len();

    for article in &mut releases {
        match prior_by_slug.get(article.slug.as_str()) {
            Some(previous) if is_canonical_date(&previous.date) => {
                article.date = previous.date.clone();
                if **previous == *article {
                    report.unchanged += 1;
                } else {
                    report.updated += 1;
                }
            }
            Some(_) => {
                article.date = options.today.format("%Y-%m-%d").to_string();
                report.updated += 1;
            }
            None => {
                article.date = options.today.format("%Y-%m-%d").to_string();
                report.added += 1;
            }
        }
    }

    for previous in &prior.releases {
        if seen_slugs.contains_key(&previous.slug) {
            continue;
        }
        if failed_sources.contains(&previous.source_path) {
            releases.push(previous.clone());
            continue;
        }
        tracing::info!(
            slug = %previous.slug,
            source = %previous.source_path,
            "release dropped; its source file is gone"
        );
        report.dropped += 1;
    }

    releases.sort_by(|left, right| {
        right
            .date
            .cmp(&left.date)
            .then_with(|| left.slug.cmp(&right.slug))
    });
    let mut meta = prior.meta.clone();
    meta.insert(COUNT_KEY.to_string(), Value::from(releases.len()));
    let index = NewsroomIndex { meta, releases };

    let outcome = write_if_changed(&paths.newsroom_index_path, &index.render()?)?;
    report.index_status = Some(outcome.status);
    tracing::info!(
        added = report.added,
        updated = report.updated,
        unchanged = report.unchanged,
        dropped = report.dropped,
        failed = report.failed,
        index = outcome.status.as_str(),
        "newsroom indexing finished"
    );
    Ok(report)
}

/// Parse one release. The date is left empty for the caller to stamp.
fn read_article(file: &Path, relative: &str) -> Result<NewsroomArticle> {
    let content =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let document = split_front_matter(&content)?;
    let Some(title) = document.str_field(key::TITLE) else {
        bail!(PipelineError::validation(
            relative,
            key::TITLE,
            "required front matter is missing or empty",
        ));
    };

    let slug = document_slug(file, relative, document.str_field(key::SLUG))?;
    if document.fields.contains_key(key::DATE) {
        tracing::debug!(path = %relative, "front-matter date ignored; newsroom dates are stamped");
    }

    let summary = match document.str_field("summary") {
        Some(summary) => summary.to_string(),
        None => extract_summary(&document.body),
    };
    Ok(NewsroomArticle {
        slug,
        date: String::new(),
        title: title.to_string(),
        industry: document.str_field(key::INDUSTRY).map(str::to_string),
        subheader: document.str_field("subheader").map(str::to_string),
        tags: document
            .fields
            .get(key::TAGS)
            .map(tags_from_value)
            .unwrap_or_default(),
        summary,
        source_path: relative.to_string(),
    })
}

/// Plain text of the first non-empty paragraph, cut to `SUMMARY_LIMIT`.
pub fn extract_summary(body: &str) -> String {
    let mut text = String::new();
    let mut in_paragraph = false;
    let mut in_image = false;
    for event in Parser::new(body) {
        match event {
            Event::Start(Tag::Paragraph) => in_paragraph = true,
            Event::End(TagEnd::Paragraph) => {
                in_paragraph = false;
                if !text.trim().is_empty() {
                    break;
                }
            }
            Event::Start(Tag::Image { .. }) => in_image = true,
            Event::End(TagEnd::Image) => in_image = false,
            Event::Text(fragment) | Event::Code(fragment) if in_paragraph && !in_image => {
                text.push_str(&fragment);
            }
            Event::SoftBreak | Event::HardBreak if in_paragraph => text.push(' '),
            _ => {}
        }
    }
    truncate_summary(&collapse_whitespace(&text), SUMMARY_LIMIT)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut at a word boundary so the result, ellipsis included, fits `limit`.
pub fn truncate_summary(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let head = text.chars().take(limit.saturating_sub(1)).collect::<String>();
    let cut = match head.rfind(' ') {
        Some(position) if position > 0 => &head[..position],
        _ => head.as_str(),
    };
    let mut out = cut
        .trim_end_matches(|ch: char| ch.is_whitespace() || matches!(ch, ',' | ';' | ':' | '-'))
        .to_string();
    out.push(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use chrono::NaiveDate;
    use serde_json::json;
    use tempfile::tempdir;

    use super::{NewsroomOptions, extract_summary, index_newsroom, truncate_summary};
    use crate::error::PipelineError;
    use crate::model::NewsroomIndex;
    use crate::runtime::ResolvedPaths;
    use crate::writer::WriteStatus;

    fn project(root: &Path) -> ResolvedPaths {
        let paths = ResolvedPaths::for_project_root(root);
        fs::create_dir_all(&paths.newsroom_dir).expect("newsroom dir");
        paths
    }

    fn on(year: i32, month: u32, day: u32) -> NewsroomOptions {
        NewsroomOptions {
            today: NaiveDate::from_ymd_opt(year, month, day).expect("date"),
        }
    }

    fn write_release(paths: &ResolvedPaths, name: &str, content: &str) {
        fs::write(paths.newsroom_dir.join(name), content).expect("write release");
    }

    fn load(paths: &ResolvedPaths) -> NewsroomIndex {
        NewsroomIndex::load(&paths.newsroom_index_path).expect("load")
    }

    #[test]
    fn summary_uses_first_paragraph() {
        let body = "# Headline\n\n![hero](/images/a.png)\n\nWe are **pleased** to\nannounce `v2` today.\n\nSecond paragraph.\n";
        assert_eq!(extract_summary(body), "We are pleased to announce v2 today.");
        assert_eq!(extract_summary("# Only a heading\n"), "");
    }

    #[test]
    fn summary_cuts_at_word_boundary() {
        let long = "word ".repeat(100);
        let cut = truncate_summary(long.trim(), 240);
        assert!(cut.chars().count() <= 240);
        assert!(cut.ends_with("word…"));
        assert_eq!(truncate_summary("short", 240), "short");
    }

    #[test]
    fn dates_are_frozen_across_runs_and_edits() {
        let temp = tempdir().expect("tempdir");
        let paths = project(temp.path());
        write_release(&paths, "launch.md", "---\ntitle: Launch\n---\nWe launched.\n");

        let first = index_newsroom(&paths, &on(2026, 10, 17)).expect("first");
        assert_eq!(first.added, 1);
        assert_eq!(load(&paths).releases[0].date, "2026-10-17");

        write_release(
            &paths,
            "launch.md",
            "---\ntitle: Launch\ndate: 2030-01-01\n---\nWe launched.\n",
        );
        let second = index_newsroom(&paths, &on(2026, 11, 2)).expect("second");
        assert_eq!(second.index_status, Some(WriteStatus::Unchanged));
        assert_eq!(load(&paths).releases[0].date, "2026-10-17");
    }

    #[test]
    fn releases_sort_newest_first_and_meta_is_kept() {
        let temp = tempdir().expect("tempdir");
        let paths = project(temp.path());
        fs::create_dir_all(paths.newsroom_index_path.parent().expect("parent")).expect("data");
        fs::write(
            &paths.newsroom_index_path,
            r#"{"_meta":{"source":"newsroom","count":0},"releases":[
                {"slug":"older","date":"2025-02-01","title":"Older","tags":[],"summary":"s","sourcePath":"older.md"}
            ]}"#,
        )
        .expect("seed");
        write_release(&paths, "older.md", "---\ntitle: Older\nsummary: s\n---\n");
        write_release(&paths, "b-new.md", "---\ntitle: B\ntags: [grid]\n---\nB body\n");
        write_release(&paths, "a-new.md", "---\ntitle: A\nindustry: Energy\n---\nA body\n");

        let report = index_newsroom(&paths, &on(2026, 10, 17)).expect("index");
        assert_eq!((report.added, report.unchanged), (2, 1));
        let index = load(&paths);
        let slugs = index
            .releases
            .iter()
            .map(|release| release.slug.as_str())
            .collect::<Vec<_>>();
        assert_eq!(slugs, vec!["a-new", "b-new", "older"]);
        assert_eq!(index.meta["source"], json!("newsroom"));
        assert_eq!(index.meta["count"], json!(3));
        assert_eq!(index.releases[1].tags, vec!["grid".to_string()]);
    }

    #[test]
    fn removed_sources_are_dropped_but_failed_ones_are_kept() {
        let temp = tempdir().expect("tempdir");
        let paths = project(temp.path());
        write_release(&paths, "keep.md", "---\ntitle: Keep\n---\nBody\n");
        write_release(&paths, "gone.md", "---\ntitle: Gone\n---\nBody\n");
        index_newsroom(&paths, &on(2026, 1, 1)).expect("first");

        fs::remove_file(paths.newsroom_dir.join("gone.md")).expect("remove");
        write_release(&paths, "keep.md", "---\nsummary: no title now\n---\n");
        let report = index_newsroom(&paths, &on(2026, 1, 2)).expect("second");
        assert_eq!((report.dropped, report.failed), (1, 1));
        let index = load(&paths);
        assert_eq!(index.releases.len(), 1);
        assert_eq!(index.releases[0].slug, "keep");
    }

    #[test]
    fn duplicate_slugs_abort() {
        let temp = tempdir().expect("tempdir");
        let paths = project(temp.path());
        write_release(&paths, "a.md", "---\ntitle: A\nslug: same\n---\n");
        write_release(&paths, "b.md", "---\ntitle: B\nslug: same\n---\n");
        let error = index_newsroom(&paths, &on(2026, 1, 1)).expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<PipelineError>(),
            Some(PipelineError::IdentityConflict { .. })
        ));
        assert!(error.to_string().contains("a.md and b.md"));
    }
}

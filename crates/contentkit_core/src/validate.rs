use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::assets::AssetRoot;
use crate::dates::is_canonical_date;
use crate::filesystem::display_path;
use crate::model::{
    ContentFormat, ContentIndex, CrossFieldFinding, DocumentRef, NewsroomIndex, Placement,
    REQUIRED_RECORD_KEYS, cross_field_findings, key, str_field,
};
use crate::runtime::ResolvedPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Fatal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub location: String,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Fatal => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{label}: {}: {}", self.location, self.message)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub records: usize,
    pub releases: usize,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn fatal_count(&self) -> usize {
        self.count(Severity::Fatal)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn is_success(&self) -> bool {
        self.fatal_count() == 0
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|finding| finding.severity == severity)
            .count()
    }

    fn fatal(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Fatal, location.into(), message.into());
    }

    fn warning(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Warning, location.into(), message.into());
    }

    fn push(&mut self, severity: Severity, location: String, message: String) {
        match severity {
            Severity::Fatal => tracing::error!(location = %location, "{message}"),
            Severity::Warning => tracing::warn!(location = %location, "{message}"),
        }
        self.findings.push(Finding {
            severity,
            location,
            message,
        });
    }
}

/// Re-read the generated indexes and check them structurally. Unreadable
/// files are errors; rule violations are findings.
pub fn validate_outputs(paths: &ResolvedPaths) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    if paths.index_path.exists() {
        let index = ContentIndex::load(&paths.index_path)?;
        report.records = index.reports.len();
        validate_content_index(paths, &index, &mut report);
    } else {
        report.warning(
            display_path(&paths.index_path),
            "content index does not exist yet",
        );
    }

    if paths.newsroom_index_path.exists() {
        let newsroom = NewsroomIndex::load(&paths.newsroom_index_path)?;
        report.releases = newsroom.releases.len();
        validate_newsroom_index(&newsroom, &mut report);
    }

    tracing::info!(
        records = report.records,
        releases = report.releases,
        fatal = report.fatal_count(),
        warnings = report.warning_count(),
        "validation finished"
    );
    Ok(report)
}

fn record_location(position: usize, record: &Map<String, Value>) -> String {
    match str_field(record, key::SLUG) {
        Some(slug) if !slug.is_empty() => format!("reports[{position}] ({slug})"),
        _ => format!("reports[{position}]"),
    }
}

pub fn validate_content_index(
    paths: &ResolvedPaths,
    index: &ContentIndex,
    report: &mut ValidationReport,
) {
    let image_root = paths.image_root();
    let download_root = paths.download_root();
    let mut ids: HashMap<&str, usize> = HashMap::new();
    let mut slugs: HashMap<&str, usize> = HashMap::new();

    for (position, record) in index.reports.iter().enumerate() {
        let location = record_location(position, record);

        let missing = REQUIRED_RECORD_KEYS
            .iter()
            .filter(|name| {
                str_field(record, name).is_none_or(|value| value.trim().is_empty())
            })
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            report.fatal(
                &location,
                format!("missing required fields: {}", missing.join(", ")),
            );
        }

        if let Some(date) = str_field(record, key::DATE)
            && !date.is_empty()
            && !is_canonical_date(date)
        {
            report.fatal(&location, format!("date `{date}` is not YYYY-MM-DD"));
        }

        for (name, seen) in [(key::ID, &mut ids), (key::SLUG, &mut slugs)] {
            let Some(value) = str_field(record, name).filter(|value| !value.is_empty()) else {
                continue;
            };
            if let Some(first) = seen.get(value) {
                report.fatal(
                    &location,
                    format!("duplicate {name} `{value}`, first seen at reports[{first}]"),
                );
            } else {
                seen.insert(value, position);
            }
        }

        let placement = str_field(record, key::PLACEMENT).unwrap_or_default();
        if !placement.is_empty()
            && Placement::parse(placement).map(Placement::as_str) != Some(placement)
        {
            report.fatal(
                &location,
                format!(
                    "placement `{placement}` is not one of {}",
                    Placement::allowed()
                ),
            );
        }
        let content_format = str_field(record, key::CONTENT_FORMAT).unwrap_or_default();
        if !content_format.is_empty()
            && ContentFormat::parse(content_format).map(ContentFormat::as_str)
                != Some(content_format)
        {
            report.fatal(
                &location,
                format!(
                    "contentFormat `{content_format}` is not one of downloadable, non-downloadable"
                ),
            );
        }

        let link = str_field(record, key::LINK);
        for finding in cross_field_findings(
            str_field(record, key::TYPE).unwrap_or_default(),
            placement,
            content_format,
            link,
        ) {
            match finding {
                CrossFieldFinding::Fatal { message, .. } => report.fatal(&location, message),
                CrossFieldFinding::Warning { message } => report.warning(&location, message),
            }
        }

        if let Some(link) = link {
            check_asset(&download_root, key::LINK, link, &location, report);
        }
        if let Some(image) = str_field(record, key::IMAGE) {
            check_asset(&image_root, key::IMAGE, image, &location, report);
        }
        if record.contains_key(key::DOCUMENT) {
            match DocumentRef::from_record(record) {
                Some(document) => {
                    if !document_exists(paths, &document.path) {
                        report.warning(
                            &location,
                            format!("document `{}` not found on disk", document.path),
                        );
                    }
                }
                None => report.warning(&location, "document reference is malformed"),
            }
        }
    }
}

pub fn validate_newsroom_index(index: &NewsroomIndex, report: &mut ValidationReport) {
    let mut slugs: HashMap<&str, usize> = HashMap::new();
    for (position, release) in index.releases.iter().enumerate() {
        let location = format!("releases[{position}] ({})", release.source_path);
        if release.title.trim().is_empty() {
            report.fatal(&location, "missing title");
        }
        if release.slug.trim().is_empty() {
            report.fatal(&location, "missing slug");
        } else if let Some(first) = slugs.get(release.slug.as_str()) {
            report.fatal(
                &location,
                format!(
                    "duplicate slug `{}`, first seen at releases[{first}]",
                    release.slug
                ),
            );
        } else {
            slugs.insert(release.slug.as_str(), position);
        }
        if !is_canonical_date(&release.date) {
            report.fatal(
                &location,
                format!("date `{}` is not YYYY-MM-DD", release.date),
            );
        }
    }
    if let Some(count) = index.meta.get("count").and_then(Value::as_u64)
        && count != index.releases.len() as u64
    {
        report.warning(
            "_meta.count",
            format!(
                "count {count} does not match {} releases",
                index.releases.len()
            ),
        );
    }
}

fn is_external(reference: &str) -> bool {
    let lowered = reference.trim().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

/// Warn when a reference under the root's URL prefix names no file.
fn check_asset(
    root: &AssetRoot,
    field: &str,
    reference: &str,
    location: &str,
    report: &mut ValidationReport,
) {
    if reference.trim().is_empty() || is_external(reference) {
        return;
    }
    let cleaned = reference.split(['?', '#']).next().unwrap_or(reference);
    let Some(relative) = cleaned.strip_prefix(root.url_prefix.as_str()) else {
        return;
    };
    if !root.dir.join(relative.trim_start_matches('/')).is_file() {
        report.warning(
            location,
            format!("{field} `{reference}` not found under {}", root.dir.display()),
        );
    }
}

fn document_exists(paths: &ResolvedPaths, relative: &str) -> bool {
    let relative = Path::new(relative);
    paths.documents_dir.join(relative).is_file() || paths.markdown_dir.join(relative).is_file()
}

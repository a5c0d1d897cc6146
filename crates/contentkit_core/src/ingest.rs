use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;

use crate::assets::{AssetResolver, AssetRoot};
use crate::config::ContentkitConfig;
use crate::dates::{is_canonical_date, normalize_date};
use crate::error::{PipelineError, Warning, WarningKind, record};
use crate::fields::{is_placeholder_link, parse_priority, parse_tags, parse_truthy, truthy_value};
use crate::filesystem::{
    WalkOptions, discover_files, display_path, is_url_safe_slug, relative_display,
    safe_relative_path, validate_scoped_path,
};
use crate::frontmatter::split_front_matter;
use crate::longform::{SECTION_PREFIX, collect_sections, default_document_path, render_document};
use crate::model::{
    ContentFormat, ContentIndex, ContentRecord, CrossFieldFinding, DocumentOrigin, DocumentRef,
    LEGACY_KEYS, Placement, cross_field_findings, key, merge_fields, str_field,
};
use crate::runtime::ResolvedPaths;
use crate::tabular::{TabularRow, TabularTable, parse_tabular};
use crate::writer::{WriteStatus, write_if_changed};

pub const DOCUMENT_OVERRIDE_COLUMN: &str = "documentPathOverride";

/// Columns every sheet must declare.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    key::ID,
    key::SLUG,
    key::TYPE,
    key::DATE,
    key::TITLE,
    key::DESCRIPTION,
    key::CONTENT_FORMAT,
    key::INDUSTRY,
    key::IMAGE,
    key::PLACEMENT,
];

const OPTIONAL_COLUMNS: [&str; 5] = [
    key::PRIORITY,
    key::PINNED,
    key::LINK,
    key::TAGS,
    DOCUMENT_OVERRIDE_COLUMN,
];

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub skip: bool,
}

impl IngestOptions {
    pub fn from_config(config: &ContentkitConfig) -> Self {
        Self {
            skip: config.skip_sheets(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub skipped: bool,
    pub files: usize,
    pub rows: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub preserved: usize,
    pub documents_written: usize,
    pub documents_unchanged: usize,
    pub index_status: Option<WriteStatus>,
    pub warnings: Vec<Warning>,
}

struct PlannedDocument {
    path: PathBuf,
    content: String,
}

struct IngestedRow {
    record: ContentRecord,
    document: Option<PlannedDocument>,
}

struct RowContext<'a> {
    paths: &'a ResolvedPaths,
    image_root: AssetRoot,
    download_root: AssetRoot,
    resolver: AssetResolver,
    index: &'a ContentIndex,
}

/// Read every sheet, merge the rows into the content index and write any
/// generated long-form documents. Nothing is written unless every row of every
/// sheet validates and the merged index keeps slugs unique.
pub fn ingest_sheets(paths: &ResolvedPaths, options: &IngestOptions) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    if options.skip {
        tracing::info!("tabular ingestion skipped by configuration");
        report.skipped = true;
        return Ok(report);
    }

    let files = discover_files(&paths.sheets_dir, &WalkOptions::tabular())?;
    report.files = files.len();
    if files.is_empty() {
        tracing::info!(
            root = %display_path(&paths.sheets_dir),
            "no sheets found; content index left as is"
        );
        return Ok(report);
    }

    let mut index = ContentIndex::load(&paths.index_path)?;
    let rows = {
        let mut context = RowContext {
            paths,
            image_root: paths.image_root(),
            download_root: paths.download_root(),
            resolver: AssetResolver::new(),
            index: &index,
        };
        let mut rows = Vec::new();
        let mut seen_ids: HashMap<String, String> = HashMap::new();
        let mut seen_slugs: HashMap<String, String> = HashMap::new();
        let mut seen_documents: HashMap<String, String> = HashMap::new();
        for file in &files {
            let location = relative_display(&paths.sheets_dir, file)?;
            let content = fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let table = parse_tabular(&content).map_err(|error| PipelineError::StructuralInput {
                path: location.clone(),
                detail: error.to_string(),
            })?;
            check_columns(&location, &table)?;
            tracing::debug!(file = %location, rows = table.rows.len(), "parsed sheet");

            for row in &table.rows {
                let row_location = format!("{location}:{}", row.line);
                let ingested =
                    context.ingest_row(&row_location, &table, row, &mut report.warnings)?;
                claim(&mut seen_ids, "id", &ingested.record.id, &row_location)?;
                claim(&mut seen_slugs, "slug", &ingested.record.slug, &row_location)?;
                if let Some(document) = ingested
                    .record
                    .document
                    .as_ref()
                    .filter(|doc| doc.origin == DocumentOrigin::Generated)
                {
                    claim(
                        &mut seen_documents,
                        "generated document path",
                        &document.path,
                        &row_location,
                    )?;
                }
                rows.push(ingested);
            }
        }
        rows
    };
    report.rows = rows.len();

    let prior_dates = frozen_dates(&index);
    let mut touched = HashSet::new();
    let mut documents = Vec::new();
    for ingested in rows {
        let current = &ingested.record;
        let mut fields = current.to_fields();
        if let Some(frozen) = prior_dates.get(&current.slug)
            && *frozen != current.date
        {
            tracing::debug!(slug = %current.slug, date = %frozen, "keeping established date");
            fields.insert(key::DATE.to_string(), Value::String(frozen.clone()));
        }

        match index.position_by_id(&current.id) {
            Some(position) => {
                touched.insert(position);
                let existing = &mut index.reports[position];
                let mut changed = false;
                for legacy in LEGACY_KEYS {
                    changed |= existing.remove(legacy).is_some();
                }
                changed |= merge_fields(existing, fields);
                if changed {
                    report.updated += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            None => {
                index.reports.push(fields);
                touched.insert(index.reports.len() - 1);
                report.added += 1;
            }
        }
        documents.extend(ingested.document);
    }
    report.preserved = index.reports.len() - touched.len();

    check_slug_ownership(&index)?;

    for document in documents {
        let outcome = write_if_changed(&document.path, &document.content)?;
        if outcome.written() {
            report.documents_written += 1;
        } else {
            report.documents_unchanged += 1;
        }
    }

    let outcome = write_if_changed(&paths.index_path, &index.render()?)?;
    report.index_status = Some(outcome.status);
    tracing::info!(
        added = report.added,
        updated = report.updated,
        unchanged = report.unchanged,
        preserved = report.preserved,
        documents_written = report.documents_written,
        index = outcome.status.as_str(),
        "tabular ingestion finished"
    );
    Ok(report)
}

fn check_columns(location: &str, table: &TabularTable) -> Result<()> {
    if table.headers.is_empty() {
        bail!(PipelineError::StructuralInput {
            path: location.to_string(),
            detail: "sheet has no header row".to_string(),
        });
    }
    let missing = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !table.has_header(column))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!(PipelineError::StructuralInput {
            path: location.to_string(),
            detail: format!("missing required columns: {}", missing.join(", ")),
        });
    }
    Ok(())
}

fn claim(
    seen: &mut HashMap<String, String>,
    what: &str,
    value: &str,
    location: &str,
) -> Result<()> {
    if let Some(first) = seen.get(value) {
        bail!(PipelineError::IdentityConflict {
            detail: format!("duplicate {what} `{value}` at {first} and {location}"),
        });
    }
    seen.insert(value.to_string(), location.to_string());
    Ok(())
}

/// Slug -> canonical date already published in the prior index.
fn frozen_dates(index: &ContentIndex) -> HashMap<String, String> {
    index
        .reports
        .iter()
        .filter_map(|record| {
            let slug = str_field(record, key::SLUG)?;
            let date = str_field(record, key::DATE).filter(|date| is_canonical_date(date))?;
            Some((slug.to_string(), date.to_string()))
        })
        .collect()
}

fn check_slug_ownership(index: &ContentIndex) -> Result<()> {
    let mut owners: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for record in &index.reports {
        if let (Some(slug), Some(id)) = (str_field(record, key::SLUG), str_field(record, key::ID)) {
            owners.entry(slug).or_default().insert(id);
        }
    }
    for (slug, ids) in owners {
        if ids.len() > 1 {
            bail!(PipelineError::IdentityConflict {
                detail: format!(
                    "slug `{slug}` is claimed by several ids after merge: {}",
                    ids.into_iter().collect::<Vec<_>>().join(", ")
                ),
            });
        }
    }
    Ok(())
}

impl RowContext<'_> {
    fn ingest_row(
        &mut self,
        location: &str,
        table: &TabularTable,
        row: &TabularRow,
        warnings: &mut Vec<Warning>,
    ) -> Result<IngestedRow> {
        let required = |column: &str| -> Result<String> {
            row.non_empty(column).map(str::to_string).ok_or_else(|| {
                PipelineError::validation(location, column, "required value is empty").into()
            })
        };

        let id = required(key::ID)?;
        let slug = required(key::SLUG)?;
        if !is_url_safe_slug(&slug) {
            bail!(PipelineError::validation(
                location,
                key::SLUG,
                format!("`{slug}` is not URL-safe; use lower-case letters, digits and dashes"),
            ));
        }
        let record_type = required(key::TYPE)?;
        let raw_date = required(key::DATE)?;
        let title = required(key::TITLE)?;
        let description = required(key::DESCRIPTION)?;
        let industry = required(key::INDUSTRY)?;

        let raw_format = required(key::CONTENT_FORMAT)?;
        let content_format = ContentFormat::parse(&raw_format).ok_or_else(|| {
            PipelineError::validation(
                location,
                key::CONTENT_FORMAT,
                format!("`{raw_format}` is not one of downloadable, non-downloadable"),
            )
        })?;
        let raw_placement = required(key::PLACEMENT)?;
        let placement = Placement::parse(&raw_placement).ok_or_else(|| {
            PipelineError::validation(
                location,
                key::PLACEMENT,
                format!("`{raw_placement}` is not one of {}", Placement::allowed()),
            )
        })?;

        let priority = parse_priority(row.get(key::PRIORITY).unwrap_or_default())
            .map_err(|message| PipelineError::validation(location, key::PRIORITY, message))?;
        let pinned = row.get(key::PINNED).is_some_and(parse_truthy);
        let tags = parse_tags(row.get(key::TAGS).unwrap_or_default());

        let normalized = normalize_date(&raw_date);
        if !normalized.is_resolved() {
            bail!(PipelineError::UnusableDate {
                location: location.to_string(),
                value: raw_date,
                warnings: normalized.warnings,
            });
        }
        for message in normalized.warnings {
            record(
                warnings,
                Warning::new(WarningKind::DateAmbiguity, location, message),
            );
        }

        let image = match row.non_empty(key::IMAGE) {
            Some(raw) => {
                if !raw.starts_with(self.image_root.url_prefix.as_str()) {
                    bail!(PipelineError::validation(
                        location,
                        key::IMAGE,
                        format!("`{raw}` must start with `{}`", self.image_root.url_prefix),
                    ));
                }
                Some(resolve_asset(
                    &mut self.resolver,
                    &self.image_root,
                    location,
                    raw,
                    warnings,
                )?)
            }
            None => None,
        };

        let link = match row.non_empty(key::LINK) {
            Some(raw)
                if content_format == ContentFormat::Downloadable && !is_placeholder_link(raw) =>
            {
                Some(resolve_asset(
                    &mut self.resolver,
                    &self.download_root,
                    location,
                    raw,
                    warnings,
                )?)
            }
            _ => None,
        };

        for finding in cross_field_findings(
            &record_type,
            placement.as_str(),
            content_format.as_str(),
            link.as_deref(),
        ) {
            match finding {
                CrossFieldFinding::Fatal { field, message } => {
                    bail!(PipelineError::validation(location, field, message));
                }
                CrossFieldFinding::Warning { message } => record(
                    warnings,
                    Warning::new(WarningKind::CrossField, location, message),
                ),
            }
        }

        let override_path = match row.non_empty(DOCUMENT_OVERRIDE_COLUMN) {
            Some(raw) => Some(safe_relative_path(raw).map_err(|message| {
                PipelineError::validation(location, DOCUMENT_OVERRIDE_COLUMN, message)
            })?),
            None => None,
        };

        let extra = row
            .fields
            .iter()
            .filter(|(name, _)| is_passthrough_column(name))
            .filter_map(|(name, value)| {
                let value = value.trim();
                (!value.is_empty()).then(|| (name.clone(), value.to_string()))
            })
            .collect();

        let mut content = ContentRecord {
            id,
            slug,
            record_type,
            date: normalized.iso,
            title,
            description,
            content_format,
            industry,
            image,
            placement,
            priority,
            pinned,
            link,
            document: None,
            tags,
            source_ref: None,
            extra,
        };
        let document =
            self.plan_document(location, table, row, override_path, &mut content, warnings)?;
        Ok(IngestedRow {
            record: content,
            document,
        })
    }

    /// Decide which long-form document the record owns and what, if anything,
    /// gets written for it.
    fn plan_document(
        &self,
        location: &str,
        table: &TabularTable,
        row: &TabularRow,
        override_path: Option<PathBuf>,
        content: &mut ContentRecord,
        warnings: &mut Vec<Warning>,
    ) -> Result<Option<PlannedDocument>> {
        let sections = collect_sections(&table.raw_headers, row);
        let prior = self
            .index
            .position_by_id(&content.id)
            .and_then(|position| DocumentRef::from_record(&self.index.reports[position]));

        if let Some(prior) = prior.as_ref().filter(|doc| doc.origin == DocumentOrigin::Authored) {
            if !sections.is_empty() || override_path.is_some() {
                record(
                    warnings,
                    Warning::new(
                        WarningKind::NonInterferenceSkip,
                        location,
                        format!(
                            "record already references authored document {}; not generating one",
                            prior.path
                        ),
                    ),
                );
            }
            content.document = Some(prior.clone());
            return Ok(None);
        }

        let relative = match override_path {
            Some(path) => display_path(&path),
            None if !sections.is_empty() => default_document_path(&content.industry, &content.slug),
            None => return Ok(None),
        };
        let absolute = self.paths.documents_dir.join(&relative);
        validate_scoped_path(&self.paths.documents_dir, &absolute)?;

        let ours = prior
            .as_ref()
            .is_some_and(|doc| doc.origin == DocumentOrigin::Generated && doc.path == relative);
        if absolute.exists() && !ours && !is_generated_for(&absolute, &content.id)? {
            tracing::debug!(
                location,
                path = %relative,
                "existing document kept as authored"
            );
            content.document = Some(DocumentRef::authored(relative));
            return Ok(None);
        }

        let rendered = render_document(&content.id, &content.slug, &content.title, &sections)?;
        content.document = Some(DocumentRef::generated(relative));
        Ok(Some(PlannedDocument {
            path: absolute,
            content: rendered,
        }))
    }
}

fn resolve_asset(
    resolver: &mut AssetResolver,
    root: &AssetRoot,
    location: &str,
    raw: &str,
    warnings: &mut Vec<Warning>,
) -> Result<String> {
    let resolution = resolver.resolve(root, raw)?;
    for message in resolution.warnings {
        record(
            warnings,
            Warning::new(WarningKind::Resolution, location, message),
        );
    }
    Ok(resolution.value)
}

fn is_passthrough_column(name: &str) -> bool {
    !REQUIRED_COLUMNS.contains(&name)
        && !OPTIONAL_COLUMNS.contains(&name)
        && !name.starts_with(SECTION_PREFIX)
}

/// A file this stage generated earlier for the same record.
fn is_generated_for(path: &Path, id: &str) -> Result<bool> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let Ok(document) = split_front_matter(&content) else {
        return Ok(false);
    };
    let generated = document.fields.get("generated").is_some_and(truthy_value);
    Ok(generated && document.str_field(key::ID).is_none_or(|owner| owner == id))
}

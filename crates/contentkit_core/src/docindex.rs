use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::assets::{AssetResolver, AssetRoot};
use crate::dates::{is_canonical_date, normalize_date};
use crate::error::{PipelineError, Warning, WarningKind, record};
use crate::fields::{
    is_placeholder_link, priority_value, scalar_to_string, tags_from_value, truthy_value,
};
use crate::filesystem::{
    WalkOptions, discover_files, display_path, is_url_safe_slug, is_valid_token, path_token,
    relative_display, slugify,
};
use crate::frontmatter::{FrontMatterDocument, split_front_matter};
use crate::model::{
    ContentFormat, ContentIndex, ContentRecord, CrossFieldFinding, DocumentOrigin, DocumentRef,
    Placement, cross_field_findings, key, merge_fields, str_field,
};
use crate::runtime::ResolvedPaths;
use crate::writer::{WriteStatus, write_if_changed};

/// Front-matter keys every indexed document must carry.
pub const REQUIRED_FRONT_MATTER: [&str; 7] = [
    key::TITLE,
    key::INDUSTRY,
    key::DESCRIPTION,
    key::TYPE,
    key::PLACEMENT,
    key::CONTENT_FORMAT,
    key::TAGS,
];

pub const EPOCH_DATE: &str = "1970-01-01";
const GENERATED_MARKER: &str = "generated";

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Date assigned to documents without one; `None` falls back to the epoch.
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocIndexReport {
    pub files: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<DocumentFailure>,
    pub index_status: Option<WriteStatus>,
    pub warnings: Vec<Warning>,
}

enum Outcome {
    Indexed {
        slug: String,
        position: Option<usize>,
        fields: Map<String, Value>,
    },
    Skipped,
}

struct DocumentContext<'a> {
    paths: &'a ResolvedPaths,
    options: &'a IndexOptions,
    index: &'a ContentIndex,
    image_root: AssetRoot,
    download_root: AssetRoot,
    resolver: AssetResolver,
    seen_slugs: HashMap<String, String>,
    seen_ids: HashMap<String, String>,
}

/// Index every authored Markdown document into the content index. A document
/// that fails validation is reported and left out; the rest still land.
pub fn index_documents(paths: &ResolvedPaths, options: &IndexOptions) -> Result<DocIndexReport> {
    let mut report = DocIndexReport::default();
    let files = discover_files(&paths.markdown_dir, &WalkOptions::markdown())?;
    report.files = files.len();
    if files.is_empty() {
        tracing::info!(
            root = %display_path(&paths.markdown_dir),
            "no Markdown documents found; content index left as is"
        );
        return Ok(report);
    }

    let mut index = ContentIndex::load(&paths.index_path)?;
    let outcomes = {
        let mut context = DocumentContext {
            paths,
            options,
            index: &index,
            image_root: paths.image_root(),
            download_root: paths.download_root(),
            resolver: AssetResolver::new(),
            seen_slugs: HashMap::new(),
            seen_ids: HashMap::new(),
        };
        let mut outcomes = Vec::new();
        for file in &files {
            let relative = relative_display(&paths.markdown_dir, file)?;
            match context.index_document(file, &relative, &mut report.warnings) {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) if is_run_fatal(&error) => return Err(error),
                Err(error) => {
                    tracing::error!(path = %relative, "{error:#}");
                    report.failures.push(DocumentFailure {
                        path: relative,
                        message: format!("{error:#}"),
                    });
                }
            }
        }
        outcomes
    };
    report.failed = report.failures.len();

    let mut appended = Vec::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Skipped => report.skipped += 1,
            Outcome::Indexed {
                position: Some(position),
                fields,
                ..
            } => {
                if merge_fields(&mut index.reports[position], fields) {
                    report.updated += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            Outcome::Indexed {
                slug,
                position: None,
                fields,
            } => appended.push((slug, fields)),
        }
    }
    appended.sort_by(|left, right| left.0.cmp(&right.0));
    report.added = appended.len();
    index
        .reports
        .extend(appended.into_iter().map(|(_, fields)| fields));

    let outcome = write_if_changed(&paths.index_path, &index.render()?)?;
    report.index_status = Some(outcome.status);
    tracing::info!(
        added = report.added,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        failed = report.failed,
        index = outcome.status.as_str(),
        "document indexing finished"
    );
    Ok(report)
}

/// Duplicate slugs or ids across documents abort the run; anything else only fails
/// the one document.
fn is_run_fatal(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<PipelineError>(),
        Some(PipelineError::IdentityConflict { .. })
    )
}

impl DocumentContext<'_> {
    fn index_document(
        &mut self,
        file: &Path,
        relative: &str,
        warnings: &mut Vec<Warning>,
    ) -> Result<Outcome> {
        let index = self.index;
        let content = fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let document = split_front_matter(&content)?;
        if document.fields.get(GENERATED_MARKER).is_some_and(truthy_value) {
            tracing::debug!(path = %relative, "generated document skipped");
            return Ok(Outcome::Skipped);
        }

        let slug = document_slug(file, relative, document.str_field(key::SLUG))?;

        if let Some(first) = self.seen_slugs.get(&slug) {
            bail!(PipelineError::IdentityConflict {
                detail: format!("duplicate slug `{slug}` in {first} and {relative}"),
            });
        }
        self.seen_slugs.insert(slug.clone(), relative.to_string());

        let position = index.position_by_slug(&slug);
        if let Some(position) = position {
            let existing = &index.reports[position];
            if DocumentRef::from_record(existing)
                .is_some_and(|doc| doc.origin == DocumentOrigin::Generated)
            {
                record(
                    warnings,
                    Warning::new(
                        WarningKind::NonInterferenceSkip,
                        relative,
                        format!("record `{slug}` owns a generated document; left untouched"),
                    ),
                );
                return Ok(Outcome::Skipped);
            }
            if !existing.contains_key(key::SOURCE_REF) {
                record(
                    warnings,
                    Warning::new(
                        WarningKind::NonInterferenceSkip,
                        relative,
                        format!("record `{slug}` is maintained by another source; left untouched"),
                    ),
                );
                return Ok(Outcome::Skipped);
            }
        }

        let token = path_token(relative)?;
        let existing = position.map(|position| &index.reports[position]);
        if let Some(previous) = existing.and_then(|record| str_field(record, key::SOURCE_REF))
            && previous != token
        {
            if is_valid_token(previous) {
                tracing::debug!(path = %relative, from = previous, to = %token, "source moved");
            } else {
                record(
                    warnings,
                    Warning::new(
                        WarningKind::Migration,
                        relative,
                        format!("malformed sourceRef `{previous}` replaced with `{token}`"),
                    ),
                );
            }
        }

        let built = self.build_record(
            file,
            relative,
            &document,
            slug.clone(),
            token,
            existing,
            warnings,
        )?;
        let fields = built.to_fields();
        if let Some(other) = index.position_by_id(&built.id)
            && Some(other) != position
        {
            bail!(PipelineError::validation(
                relative,
                key::ID,
                format!("id `{}` is already used by another record", built.id),
            ));
        }
        if let Some(first) = self.seen_ids.get(&built.id) {
            bail!(PipelineError::IdentityConflict {
                detail: format!("duplicate id `{}` in {first} and {relative}", built.id),
            });
        }
        self.seen_ids.insert(built.id.clone(), relative.to_string());
        Ok(Outcome::Indexed {
            slug,
            position,
            fields,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_record(
        &mut self,
        file: &Path,
        relative: &str,
        document: &FrontMatterDocument,
        slug: String,
        token: String,
        existing: Option<&Map<String, Value>>,
        warnings: &mut Vec<Warning>,
    ) -> Result<ContentRecord> {
        let fields = &document.fields;
        let missing = REQUIRED_FRONT_MATTER
            .iter()
            .filter(|name| match fields.get(**name) {
                Some(Value::Array(items)) => items.is_empty(),
                Some(value) => scalar_to_string(value).is_none_or(|text| text.is_empty()),
                None => true,
            })
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            bail!(PipelineError::validation(
                relative,
                missing.join(", "),
                "required front matter is missing or empty",
            ));
        }
        let text = |name: &str| fields.get(name).and_then(scalar_to_string).unwrap_or_default();

        let tags = match fields.get(key::TAGS) {
            Some(value @ Value::Array(_)) => tags_from_value(value),
            _ => Vec::new(),
        };
        if tags.is_empty() {
            bail!(PipelineError::validation(
                relative,
                key::TAGS,
                "tags must be a non-empty list",
            ));
        }

        let raw_format = text(key::CONTENT_FORMAT);
        let content_format = ContentFormat::parse(&raw_format).ok_or_else(|| {
            PipelineError::validation(
                relative,
                key::CONTENT_FORMAT,
                format!("`{raw_format}` is not one of downloadable, non-downloadable"),
            )
        })?;
        let raw_placement = text(key::PLACEMENT);
        let placement = Placement::parse(&raw_placement).ok_or_else(|| {
            PipelineError::validation(
                relative,
                key::PLACEMENT,
                format!("`{raw_placement}` is not one of {}", Placement::allowed()),
            )
        })?;
        let record_type = text(key::TYPE);

        let raw_link = text(key::LINK);
        let link = if is_placeholder_link(&raw_link) {
            None
        } else {
            Some(resolve_asset(
                &mut self.resolver,
                &self.download_root,
                relative,
                &raw_link,
                warnings,
            )?)
        };
        if content_format == ContentFormat::Downloadable && link.is_none() {
            bail!(PipelineError::validation(
                relative,
                key::LINK,
                "downloadable documents need a real download link",
            ));
        }
        for finding in cross_field_findings(
            &record_type,
            placement.as_str(),
            content_format.as_str(),
            link.as_deref(),
        ) {
            match finding {
                CrossFieldFinding::Fatal { field, message } => {
                    bail!(PipelineError::validation(relative, field, message));
                }
                CrossFieldFinding::Warning { message } => record(
                    warnings,
                    Warning::new(WarningKind::CrossField, relative, message),
                ),
            }
        }

        let image = match document.str_field(key::IMAGE) {
            Some(raw) => Some(resolve_asset(
                &mut self.resolver,
                &self.image_root,
                relative,
                raw,
                warnings,
            )?),
            None => None,
        };
        let priority = priority_value(fields.get(key::PRIORITY).unwrap_or(&Value::Null))
            .map_err(|message| PipelineError::validation(relative, key::PRIORITY, message))?;
        let pinned = fields.get(key::PINNED).is_some_and(truthy_value);

        let id = fields
            .get(key::ID)
            .and_then(scalar_to_string)
            .filter(|id| !id.is_empty())
            .or_else(|| existing.and_then(|record| str_field(record, key::ID)).map(str::to_string))
            .unwrap_or_else(|| slug.clone());
        let date = self.pick_date(relative, fields.get(key::DATE), existing, warnings);

        Ok(ContentRecord {
            id,
            slug,
            record_type,
            date,
            title: text(key::TITLE),
            description: text(key::DESCRIPTION),
            content_format,
            industry: text(key::INDUSTRY),
            image,
            placement,
            priority,
            pinned,
            link,
            document: Some(DocumentRef::authored(self.document_path(file, relative))),
            tags,
            source_ref: Some(token),
            extra: Default::default(),
        })
    }

    /// Existing canonical date, then front matter, then today, then the epoch.
    fn pick_date(
        &self,
        relative: &str,
        raw: Option<&Value>,
        existing: Option<&Map<String, Value>>,
        warnings: &mut Vec<Warning>,
    ) -> String {
        if let Some(date) = existing
            .and_then(|record| str_field(record, key::DATE))
            .filter(|date| is_canonical_date(date))
        {
            return date.to_string();
        }
        if let Some(raw) = raw.and_then(scalar_to_string).filter(|raw| !raw.is_empty()) {
            let normalized = normalize_date(&raw);
            for message in &normalized.warnings {
                record(
                    warnings,
                    Warning::new(WarningKind::DateAmbiguity, relative, message.clone()),
                );
            }
            if normalized.is_resolved() {
                return normalized.iso;
            }
        }
        self.options
            .today
            .map(|today| today.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| EPOCH_DATE.to_string())
    }

    /// Documents are referenced relative to the documents root when they live
    /// under it, otherwise relative to the Markdown root.
    fn document_path(&self, file: &Path, relative: &str) -> String {
        relative_display(&self.paths.documents_dir, file).unwrap_or_else(|_| relative.to_string())
    }
}

/// The explicit front-matter slug when URL-safe, else the slugified file stem.
pub(crate) fn document_slug(file: &Path, relative: &str, explicit: Option<&str>) -> Result<String> {
    if let Some(slug) = explicit {
        if !is_url_safe_slug(slug) {
            bail!(PipelineError::validation(
                relative,
                key::SLUG,
                format!("`{slug}` is not URL-safe; use lower-case letters, digits and dashes"),
            ));
        }
        return Ok(slug.to_string());
    }
    let stem = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let slug = slugify(&stem);
    if slug.is_empty() {
        bail!(PipelineError::validation(
            relative,
            key::SLUG,
            "file name yields an empty slug",
        ));
    }
    Ok(slug)
}

fn resolve_asset(
    resolver: &mut AssetResolver,
    root: &AssetRoot,
    location: &str,
    raw: &str,
    warnings: &mut Vec<Warning>,
) -> Result<String> {
    let resolution = resolver
        .resolve(root, raw)
        .map_err(|error| anyhow!("failed to resolve `{raw}`: {error:#}"))?;
    for message in resolution.warnings {
        record(
            warnings,
            Warning::new(WarningKind::Resolution, location, message),
        );
    }
    Ok(resolution.value)
}

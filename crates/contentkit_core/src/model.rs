use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PipelineError;

pub const CASE_STUDY_TYPE: &str = "Case Study";

/// JSON keys of a content record.
pub mod key {
    pub const ID: &str = "id";
    pub const SLUG: &str = "slug";
    pub const TYPE: &str = "type";
    pub const DATE: &str = "date";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const CONTENT_FORMAT: &str = "contentFormat";
    pub const INDUSTRY: &str = "industry";
    pub const IMAGE: &str = "image";
    pub const PLACEMENT: &str = "placement";
    pub const PRIORITY: &str = "priority";
    pub const PINNED: &str = "pinned";
    pub const LINK: &str = "link";
    pub const DOCUMENT: &str = "document";
    pub const TAGS: &str = "tags";
    pub const SOURCE_REF: &str = "sourceRef";
}

/// Keys every persisted record must carry.
pub const REQUIRED_RECORD_KEYS: [&str; 9] = [
    key::ID,
    key::SLUG,
    key::TYPE,
    key::DATE,
    key::TITLE,
    key::DESCRIPTION,
    key::CONTENT_FORMAT,
    key::INDUSTRY,
    key::PLACEMENT,
];

/// Retired keys stripped from every record the ingestor touches.
pub const LEGACY_KEYS: [&str; 3] = ["pdf", "thumbnail", "downloadUrl"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    Featured,
    Reports,
    CaseStudies,
    Insights,
    Resources,
}

impl Placement {
    pub const ALL: [Placement; 5] = [
        Self::Featured,
        Self::Reports,
        Self::CaseStudies,
        Self::Insights,
        Self::Resources,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Featured => "Featured",
            Self::Reports => "Reports",
            Self::CaseStudies => "Case Studies",
            Self::Insights => "Insights",
            Self::Resources => "Resources",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|placement| placement.as_str().eq_ignore_ascii_case(value))
    }

    pub fn allowed() -> String {
        Self::ALL
            .iter()
            .map(|placement| placement.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Downloadable,
    NonDownloadable,
}

impl ContentFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloadable => "downloadable",
            Self::NonDownloadable => "non-downloadable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match value.as_str() {
            "downloadable" => Some(Self::Downloadable),
            "non-downloadable" | "nondownloadable" => Some(Self::NonDownloadable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentOrigin {
    Generated,
    Authored,
}

/// Exclusive long-form document reference of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub origin: DocumentOrigin,
    /// Forward-slash path relative to the documents root.
    pub path: String,
}

impl DocumentRef {
    pub fn generated(path: impl Into<String>) -> Self {
        Self {
            origin: DocumentOrigin::Generated,
            path: path.into(),
        }
    }

    pub fn authored(path: impl Into<String>) -> Self {
        Self {
            origin: DocumentOrigin::Authored,
            path: path.into(),
        }
    }

    pub fn from_record(record: &Map<String, Value>) -> Option<Self> {
        serde_json::from_value(record.get(key::DOCUMENT)?.clone()).ok()
    }
}

/// A validated record. Unknown source columns ride along in `extra` and are
/// merged back in only when the record is turned into JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub id: String,
    pub slug: String,
    pub record_type: String,
    pub date: String,
    pub title: String,
    pub description: String,
    pub content_format: ContentFormat,
    pub industry: String,
    pub image: Option<String>,
    pub placement: Placement,
    pub priority: i64,
    pub pinned: bool,
    pub link: Option<String>,
    pub document: Option<DocumentRef>,
    pub tags: Vec<String>,
    pub source_ref: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl ContentRecord {
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        for (name, value) in &self.extra {
            fields.insert(name.clone(), Value::String(value.clone()));
        }
        fields.insert(key::ID.to_string(), Value::String(self.id.clone()));
        fields.insert(key::SLUG.to_string(), Value::String(self.slug.clone()));
        fields.insert(key::TYPE.to_string(), Value::String(self.record_type.clone()));
        fields.insert(key::DATE.to_string(), Value::String(self.date.clone()));
        fields.insert(key::TITLE.to_string(), Value::String(self.title.clone()));
        fields.insert(
            key::DESCRIPTION.to_string(),
            Value::String(self.description.clone()),
        );
        fields.insert(
            key::CONTENT_FORMAT.to_string(),
            Value::String(self.content_format.as_str().to_string()),
        );
        fields.insert(key::INDUSTRY.to_string(), Value::String(self.industry.clone()));
        if let Some(image) = &self.image {
            fields.insert(key::IMAGE.to_string(), Value::String(image.clone()));
        }
        fields.insert(
            key::PLACEMENT.to_string(),
            Value::String(self.placement.as_str().to_string()),
        );
        fields.insert(key::PRIORITY.to_string(), Value::from(self.priority));
        fields.insert(key::PINNED.to_string(), Value::Bool(self.pinned));
        if let Some(link) = &self.link {
            fields.insert(key::LINK.to_string(), Value::String(link.clone()));
        }
        if let Some(document) = &self.document {
            fields.insert(
                key::DOCUMENT.to_string(),
                serde_json::to_value(document).unwrap_or(Value::Null),
            );
        }
        if !self.tags.is_empty() {
            fields.insert(
                key::TAGS.to_string(),
                Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(source_ref) = &self.source_ref {
            fields.insert(key::SOURCE_REF.to_string(), Value::String(source_ref.clone()));
        }
        fields
    }
}

/// Overlay `update` onto `existing` key by key. Keys missing from `update`
/// are left alone. Returns whether anything changed.
pub fn merge_fields(existing: &mut Map<String, Value>, update: Map<String, Value>) -> bool {
    let mut changed = false;
    for (name, value) in update {
        if existing.get(&name) != Some(&value) {
            existing.insert(name, value);
            changed = true;
        }
    }
    changed
}

pub fn str_field<'a>(record: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    record.get(name).and_then(Value::as_str)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossFieldFinding {
    Fatal { field: &'static str, message: String },
    Warning { message: String },
}

/// Rules that tie type, placement, format and link together.
pub fn cross_field_findings(
    record_type: &str,
    placement: &str,
    content_format: &str,
    link: Option<&str>,
) -> Vec<CrossFieldFinding> {
    let mut findings = Vec::new();
    let is_case_study = record_type.trim() == CASE_STUDY_TYPE;
    let in_case_studies = Placement::parse(placement) == Some(Placement::CaseStudies);
    if is_case_study && !in_case_studies {
        findings.push(CrossFieldFinding::Fatal {
            field: key::PLACEMENT,
            message: format!(
                "type `{CASE_STUDY_TYPE}` requires placement `{}`, found `{placement}`",
                Placement::CaseStudies.as_str()
            ),
        });
    }
    if in_case_studies && !is_case_study {
        findings.push(CrossFieldFinding::Warning {
            message: format!(
                "placement `{}` usually carries type `{CASE_STUDY_TYPE}`, found `{record_type}`",
                Placement::CaseStudies.as_str()
            ),
        });
    }
    let downloadable = ContentFormat::parse(content_format) == Some(ContentFormat::Downloadable);
    let has_link = link.is_some_and(|link| !link.trim().is_empty());
    if downloadable && !in_case_studies && !has_link {
        findings.push(CrossFieldFinding::Fatal {
            field: key::LINK,
            message: "downloadable content outside `Case Studies` requires a download link"
                .to_string(),
        });
    }
    findings
}

/// The content index file: `{ "reports": [...] }` plus any other top-level
/// keys, which are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentIndex {
    pub other: Map<String, Value>,
    pub reports: Vec<Map<String, Value>>,
}

impl ContentIndex {
    pub const REPORTS_KEY: &'static str = "reports";

    /// Load the index at `path`; a missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(content)?;
        let Value::Object(mut other) = value else {
            bail!(PipelineError::StructuralInput {
                path: "content index".to_string(),
                detail: "top-level JSON must be an object".to_string(),
            });
        };
        let reports = match other.remove(Self::REPORTS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => {
                let mut reports = Vec::with_capacity(items.len());
                for (position, item) in items.into_iter().enumerate() {
                    let Value::Object(record) = item else {
                        bail!(PipelineError::StructuralInput {
                            path: "content index".to_string(),
                            detail: format!("reports[{position}] is not an object"),
                        });
                    };
                    reports.push(record);
                }
                reports
            }
            Some(_) => bail!(PipelineError::StructuralInput {
                path: "content index".to_string(),
                detail: "`reports` must be an array".to_string(),
            }),
        };
        Ok(Self { other, reports })
    }

    pub fn render(&self) -> Result<String> {
        let mut root = self.other.clone();
        root.insert(
            Self::REPORTS_KEY.to_string(),
            Value::Array(self.reports.iter().cloned().map(Value::Object).collect()),
        );
        render_json(&Value::Object(root))
    }

    pub fn position_by_id(&self, id: &str) -> Option<usize> {
        self.reports
            .iter()
            .position(|record| str_field(record, key::ID) == Some(id))
    }

    pub fn position_by_slug(&self, slug: &str) -> Option<usize> {
        self.reports
            .iter()
            .position(|record| str_field(record, key::SLUG) == Some(slug))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsroomArticle {
    pub slug: String,
    pub date: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subheader: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub summary: String,
    pub source_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsroomIndex {
    #[serde(rename = "_meta", default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub releases: Vec<NewsroomArticle>,
}

impl NewsroomIndex {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn render(&self) -> Result<String> {
        render_json(&serde_json::to_value(self)?)
    }
}

/// Pretty JSON with a trailing newline; keys come out sorted.
pub fn render_json(value: &Value) -> Result<String> {
    let mut rendered = serde_json::to_string_pretty(value).context("failed to serialize JSON")?;
    rendered.push('\n');
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn sample_record() -> ContentRecord {
        ContentRecord {
            id: "r-1".to_string(),
            slug: "grid-outlook".to_string(),
            record_type: "Report".to_string(),
            date: "2026-03-01".to_string(),
            title: "Grid Outlook".to_string(),
            description: "Where the grid is heading".to_string(),
            content_format: ContentFormat::NonDownloadable,
            industry: "Energy".to_string(),
            image: Some("/images/grid.webp".to_string()),
            placement: Placement::Reports,
            priority: 2,
            pinned: false,
            link: None,
            document: Some(DocumentRef::generated("energy/grid-outlook.md")),
            tags: vec!["grid".to_string()],
            source_ref: None,
            extra: BTreeMap::from([("region".to_string(), "EMEA".to_string())]),
        }
    }

    #[test]
    fn record_fields_recombine_extras() {
        let fields = sample_record().to_fields();
        assert_eq!(fields["region"], json!("EMEA"));
        assert_eq!(fields["placement"], json!("Reports"));
        assert_eq!(fields["contentFormat"], json!("non-downloadable"));
        assert_eq!(
            fields["document"],
            json!({"origin": "generated", "path": "energy/grid-outlook.md"})
        );
        assert!(!fields.contains_key("link"));
        assert!(!fields.contains_key("sourceRef"));
    }

    #[test]
    fn merge_keeps_absent_keys() {
        let mut existing = json!({"id": "r-1", "title": "Old", "notes": "manual"})
            .as_object()
            .cloned()
            .expect("object");
        let update = json!({"id": "r-1", "title": "New"})
            .as_object()
            .cloned()
            .expect("object");
        assert!(merge_fields(&mut existing, update.clone()));
        assert_eq!(existing["title"], json!("New"));
        assert_eq!(existing["notes"], json!("manual"));
        assert!(!merge_fields(&mut existing, update));
    }

    #[test]
    fn placement_and_format_parse_case_insensitively() {
        assert_eq!(Placement::parse("case studies"), Some(Placement::CaseStudies));
        assert_eq!(Placement::parse("Blog"), None);
        assert_eq!(
            ContentFormat::parse("Non Downloadable"),
            Some(ContentFormat::NonDownloadable)
        );
        assert_eq!(ContentFormat::parse("pdf"), None);
    }

    #[test]
    fn cross_field_rules() {
        let fatal = cross_field_findings("Case Study", "Reports", "non-downloadable", None);
        assert!(matches!(
            fatal.as_slice(),
            [CrossFieldFinding::Fatal { field: "placement", .. }]
        ));

        let reverse = cross_field_findings("Report", "Case Studies", "downloadable", None);
        assert!(matches!(
            reverse.as_slice(),
            [CrossFieldFinding::Warning { .. }]
        ));

        let missing_link = cross_field_findings("Report", "Reports", "downloadable", Some(" "));
        assert!(matches!(
            missing_link.as_slice(),
            [CrossFieldFinding::Fatal { field: "link", .. }]
        ));

        assert!(
            cross_field_findings("Case Study", "Case Studies", "downloadable", None).is_empty()
        );
    }

    #[test]
    fn index_round_trip_keeps_other_keys() {
        let source = r#"{"_meta":{"owner":"marketing","v":[1,2]},"reports":[{"id":"a","slug":"a"}]}"#;
        let index = ContentIndex::parse(source).expect("parse");
        assert_eq!(index.reports.len(), 1);
        assert_eq!(index.other["_meta"]["owner"], json!("marketing"));
        let rendered = index.render().expect("render");
        let value: Value = serde_json::from_str(&rendered).expect("json");
        assert_eq!(value["_meta"], json!({"owner": "marketing", "v": [1, 2]}));
        assert!(rendered.ends_with("}\n"));
    }

    #[test]
    fn index_rejects_non_object_reports() {
        let error = ContentIndex::parse(r#"{"reports":[1]}"#).expect_err("must fail");
        assert!(error.to_string().contains("reports[0] is not an object"));
    }
}

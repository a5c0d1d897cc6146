use anyhow::Result;
use serde::Serialize;
use titlecase::titlecase;

use crate::filesystem::sanitize_segment;
use crate::frontmatter::render_front_matter;
use crate::tabular::TabularRow;

pub const SECTION_PREFIX: &str = "section_";
const FALLBACK_SEGMENT: &str = "general";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
struct GeneratedFrontMatter<'a> {
    generated: bool,
    id: &'a str,
    slug: &'a str,
    title: &'a str,
}

/// `section_key_findings` -> `Key Findings`.
pub fn section_heading(header: &str) -> String {
    let name = header.strip_prefix(SECTION_PREFIX).unwrap_or(header);
    let spaced = name
        .split(['_', '-'])
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    titlecase(&spaced)
}

/// Non-blank `section_*` values of `row`, in raw header order.
pub fn collect_sections(raw_headers: &[String], row: &TabularRow) -> Vec<Section> {
    raw_headers
        .iter()
        .filter(|header| header.starts_with(SECTION_PREFIX))
        .filter_map(|header| {
            let body = row.non_empty(header)?;
            Some(Section {
                heading: section_heading(header),
                body: body.to_string(),
            })
        })
        .collect()
}

/// Relative location of a generated document: `<industry>/<slug>.md`.
pub fn default_document_path(industry: &str, slug: &str) -> String {
    let segment = sanitize_segment(industry);
    let segment = if segment.is_empty() {
        FALLBACK_SEGMENT
    } else {
        segment.as_str()
    };
    format!("{segment}/{slug}.md")
}

pub fn render_document(id: &str, slug: &str, title: &str, sections: &[Section]) -> Result<String> {
    let mut body = format!("# {}\n", title.trim());
    for section in sections {
        body.push_str("\n## ");
        body.push_str(&section.heading);
        body.push_str("\n\n");
        body.push_str(section.body.trim());
        body.push('\n');
    }
    render_front_matter(
        &GeneratedFrontMatter {
            generated: true,
            id,
            slug,
            title: title.trim(),
        },
        &body,
    )
}

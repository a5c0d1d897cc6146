use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Map, Value};

const FENCE: &str = "---";

/// A Markdown file split into its YAML front matter and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatterDocument {
    pub fields: Map<String, Value>,
    pub body: String,
    /// Whether an opening fence was present at all.
    pub has_front_matter: bool,
}

impl FrontMatterDocument {
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Split `content` at its leading `---` fence. The block closes at the next
/// `---` or `...` line. A file without an opening fence is all body; an
/// opening fence without a close, or YAML that is not a mapping, is an error.
pub fn split_front_matter(content: &str) -> Result<FrontMatterDocument> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(FrontMatterDocument::default());
    };
    if first.trim_end() != FENCE {
        return Ok(FrontMatterDocument {
            body: content.to_string(),
            ..FrontMatterDocument::default()
        });
    }

    let mut yaml = String::new();
    let mut consumed = first.len();
    let mut closed = false;
    for line in lines {
        consumed += line.len();
        let trimmed = line.trim_end();
        if trimmed == FENCE || trimmed == "..." {
            closed = true;
            break;
        }
        yaml.push_str(line);
    }
    if !closed {
        bail!("front matter opened with `---` is never closed");
    }

    let fields = parse_yaml_mapping(&yaml)?;
    Ok(FrontMatterDocument {
        fields,
        body: content[consumed..].to_string(),
        has_front_matter: true,
    })
}

fn parse_yaml_mapping(yaml: &str) -> Result<Map<String, Value>> {
    if yaml.trim().is_empty() {
        return Ok(Map::new());
    }
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(yaml).context("front matter is not valid YAML")?;
    match serde_json::to_value(parsed).context("front matter cannot be represented as JSON")? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => bail!("front matter must be a mapping of keys to values"),
    }
}

/// Render `fields` as a fenced YAML block followed by `body`.
pub fn render_front_matter<T: Serialize>(fields: &T, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(fields).context("failed to serialize front matter")?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use serde::Serialize;
    use serde_json::json;

    use super::{render_front_matter, split_front_matter};

    #[test]
    fn splits_fields_and_body() {
        let doc = split_front_matter(
            "---\ntitle: Grid Outlook\ntags:\n  - grid\n  - storage\npinned: true\n---\n# Grid\n\nBody\n",
        )
        .expect("split");
        assert!(doc.has_front_matter);
        assert_eq!(doc.str_field("title"), Some("Grid Outlook"));
        assert_eq!(doc.fields["tags"], json!(["grid", "storage"]));
        assert_eq!(doc.fields["pinned"], json!(true));
        assert_eq!(doc.body, "# Grid\n\nBody\n");
    }

    #[test]
    fn tolerates_bom_crlf_and_dot_close() {
        let doc = split_front_matter("\u{feff}---\r\ntitle: A\r\n...\r\nBody").expect("split");
        assert_eq!(doc.str_field("title"), Some("A"));
        assert_eq!(doc.body, "Body");
    }

    #[test]
    fn missing_front_matter_is_all_body() {
        let doc = split_front_matter("# Title\nBody").expect("split");
        assert!(!doc.has_front_matter);
        assert!(doc.fields.is_empty());
        assert_eq!(doc.body, "# Title\nBody");
    }

    #[test]
    fn unclosed_or_non_mapping_front_matter_fails() {
        assert!(split_front_matter("---\ntitle: A\n").is_err());
        assert!(split_front_matter("---\n- a\n- b\n---\n").is_err());
        assert!(split_front_matter("---\ntitle: [unclosed\n---\n").is_err());
    }

    #[test]
    fn renders_fenced_block() {
        #[derive(Serialize)]
        struct Fields {
            generated: bool,
            title: String,
        }
        let rendered = render_front_matter(
            &Fields {
                generated: true,
                title: "Grid: Outlook".to_string(),
            },
            "# Grid\n",
        )
        .expect("render");
        assert!(rendered.starts_with("---\ngenerated: true\n"));
        let reparsed = split_front_matter(&rendered).expect("split");
        assert_eq!(reparsed.str_field("title"), Some("Grid: Outlook"));
        assert_eq!(reparsed.body, "# Grid\n");
    }
}

use serde_json::Value;

const TRUTHY: [&str; 7] = ["true", "yes", "y", "1", "x", "on", "✓"];
const PLACEHOLDER_LINKS: [&str; 9] = [
    "#", "tbd", "todo", "placeholder", "n/a", "na", "none", "-", "coming soon",
];

/// Tags from a JSON array, a comma/semicolon list, or a single free-text tag.
/// Blank entries are dropped and duplicates keep their first position.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.starts_with('[')
        && let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed)
    {
        return dedupe(items.iter().filter_map(scalar_to_string));
    }
    dedupe(
        trimmed
            .split([',', ';'])
            .map(|tag| tag.trim().trim_matches('"').trim().to_string()),
    )
}

/// Tags from a front-matter value: an array of scalars or a delimited string.
pub fn tags_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => dedupe(items.iter().filter_map(scalar_to_string)),
        Value::String(text) => parse_tags(text),
        _ => Vec::new(),
    }
}

pub fn parse_truthy(raw: &str) -> bool {
    let lowered = raw.trim().to_lowercase();
    TRUTHY.contains(&lowered.as_str())
}

pub fn truthy_value(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => parse_truthy(text),
        _ => false,
    }
}

/// Optional integer priority; blank means 0. `3.0` is accepted, `3.5` is not.
pub fn parse_priority(raw: &str) -> Result<i64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => Ok(value as i64),
        _ => Err(format!("`{trimmed}` is not a whole number")),
    }
}

pub fn priority_value(value: &Value) -> Result<i64, String> {
    match value {
        Value::Null => Ok(0),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|n| n.fract() == 0.0)
                    .map(|n| n as i64)
            })
            .ok_or_else(|| format!("`{number}` is not a whole number")),
        Value::String(text) => parse_priority(text),
        other => Err(format!("`{other}` is not a whole number")),
    }
}

pub fn is_placeholder_link(link: &str) -> bool {
    let lowered = link.trim().to_lowercase();
    lowered.is_empty() || PLACEHOLDER_LINKS.contains(&lowered.as_str())
}

/// Scalars as text; arrays and objects are not scalars.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn dedupe(tags: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if tag.is_empty() || out.contains(&tag) {
            continue;
        }
        out.push(tag);
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tags_accept_json_lists_and_free_text() {
        assert_eq!(parse_tags(r#"["grid", "storage", "grid"]"#), vec!["grid", "storage"]);
        assert_eq!(parse_tags("grid, storage; , policy"), vec!["grid", "storage", "policy"]);
        assert_eq!(parse_tags("Energy transition"), vec!["Energy transition"]);
        assert!(parse_tags("   ").is_empty());
        assert_eq!(parse_tags("[not json"), vec!["[not json"]);
    }

    #[test]
    fn tags_from_front_matter_values() {
        assert_eq!(tags_from_value(&json!(["a", 2, true])), vec!["a", "2", "true"]);
        assert_eq!(tags_from_value(&json!("a, b")), vec!["a", "b"]);
        assert!(tags_from_value(&json!({"a": 1})).is_empty());
    }

    #[test]
    fn truthy_is_tolerant() {
        for value in ["TRUE", " yes ", "Y", "1", "x", "✓"] {
            assert!(parse_truthy(value), "{value}");
        }
        for value in ["", "false", "no", "0", "maybe"] {
            assert!(!parse_truthy(value), "{value}");
        }
        assert!(truthy_value(&json!(true)));
        assert!(truthy_value(&json!(1)));
        assert!(!truthy_value(&json!(null)));
    }

    #[test]
    fn priority_defaults_and_rejects_fractions() {
        assert_eq!(parse_priority(""), Ok(0));
        assert_eq!(parse_priority(" 7 "), Ok(7));
        assert_eq!(parse_priority("3.0"), Ok(3));
        assert!(parse_priority("3.5").is_err());
        assert!(parse_priority("high").is_err());
        assert_eq!(priority_value(&json!(4)), Ok(4));
        assert_eq!(priority_value(&json!("2")), Ok(2));
    }

    #[test]
    fn placeholder_links() {
        assert!(is_placeholder_link(""));
        assert!(is_placeholder_link(" TBD "));
        assert!(is_placeholder_link("#"));
        assert!(!is_placeholder_link("/downloads/grid.pdf"));
    }
}

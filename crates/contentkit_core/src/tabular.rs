use thiserror::Error;

const DELIMITER: char = ',';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TabularError {
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularTable {
    /// Non-empty headers, in positional order.
    pub headers: Vec<String>,
    /// Every header cell as written, including empty ones.
    pub raw_headers: Vec<String>,
    pub rows: Vec<TabularRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularRow {
    /// 1-based source line where the record starts.
    pub line: usize,
    pub fields: Vec<(String, String)>,
}

impl TabularRow {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

impl TabularTable {
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|header| header == name)
    }
}

struct RawRecord {
    line: usize,
    fields: Vec<String>,
}

pub fn parse_tabular(content: &str) -> Result<TabularTable, TabularError> {
    let records = parse_records(strip_bom(content))?;
    let mut records = records.into_iter();
    let Some(header_record) = records.next() else {
        return Ok(TabularTable::default());
    };

    let raw_headers = header_record
        .fields
        .iter()
        .map(|value| value.trim().to_string())
        .collect::<Vec<_>>();
    let headers = raw_headers
        .iter()
        .filter(|header| !header.is_empty())
        .cloned()
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in records {
        if record.fields.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        let mut fields = Vec::with_capacity(headers.len());
        for (index, header) in raw_headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            fields.push((
                header.clone(),
                record.fields.get(index).cloned().unwrap_or_default(),
            ));
        }
        rows.push(TabularRow {
            line: record.line,
            fields,
        });
    }

    Ok(TabularTable {
        headers,
        raw_headers,
        rows,
    })
}

/// Render one record, quoting only the fields that need it.
pub fn format_record<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|field| {
            let field = field.as_ref();
            if field.contains(DELIMITER)
                || field.contains('"')
                || field.contains('\n')
                || field.contains('\r')
            {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_records(content: &str) -> Result<Vec<RawRecord>, TabularError> {
    let mut records = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 1usize;
    let mut line = 1usize;
    let mut record_line = 1usize;
    let chars = content.chars().collect::<Vec<_>>();
    let mut index = 0usize;

    while index < chars.len() {
        let ch = chars[index];
        if in_quotes {
            if ch == '"' {
                if index + 1 < chars.len() && chars[index + 1] == '"' {
                    field.push('"');
                    index += 2;
                    continue;
                }
                in_quotes = false;
                index += 1;
                continue;
            }
            if ch == '\n' {
                line += 1;
            }
            field.push(ch);
            index += 1;
            continue;
        }

        if ch == '"' {
            in_quotes = true;
            quote_line = line;
            index += 1;
            continue;
        }
        if ch == DELIMITER {
            row.push(std::mem::take(&mut field));
            index += 1;
            continue;
        }
        if ch == '\n' || ch == '\r' {
            row.push(std::mem::take(&mut field));
            if ch == '\r' && index + 1 < chars.len() && chars[index + 1] == '\n' {
                index += 1;
            }
            records.push(RawRecord {
                line: record_line,
                fields: std::mem::take(&mut row),
            });
            line += 1;
            record_line = line;
            index += 1;
            continue;
        }
        field.push(ch);
        index += 1;
    }

    if in_quotes {
        return Err(TabularError::UnterminatedQuote { line: quote_line });
    }

    row.push(field);
    if row.len() > 1 || row.first().is_some_and(|value| !value.trim().is_empty()) {
        records.push(RawRecord {
            line: record_line,
            fields: row,
        });
    }
    Ok(records)
}

fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}

#[cfg(test)]
mod tests {
    use super::{TabularError, format_record, parse_tabular};

    #[test]
    fn parse_supports_quotes_and_newlines() {
        let table = parse_tabular(
            "title,description\nAlpha,\"line 1\nline 2\"\n\"Beta\",\"has \"\"quotes\"\"\"",
        )
        .expect("parse");
        assert_eq!(table.headers, vec!["title", "description"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("title"), Some("Alpha"));
        assert_eq!(table.rows[0].get("description"), Some("line 1\nline 2"));
        assert_eq!(table.rows[1].get("description"), Some("has \"quotes\""));
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.rows[1].line, 4);
    }

    #[test]
    fn round_trip_preserves_field_values() {
        let source = "a,b,c\n\"a,b\",\"line1\nline2\",\"say \"\"hi\"\"\"\n";
        let table = parse_tabular(source).expect("parse");
        let row = &table.rows[0];
        let values = ["a", "b", "c"]
            .iter()
            .map(|key| row.get(key).expect("field").to_string())
            .collect::<Vec<_>>();
        assert_eq!(values, vec!["a,b", "line1\nline2", "say \"hi\""]);

        let rendered = format_record(&values);
        assert_eq!(rendered, "\"a,b\",\"line1\nline2\",\"say \"\"hi\"\"\"");
        let reparsed = parse_tabular(&format!("a,b,c\n{rendered}")).expect("reparse");
        assert_eq!(reparsed.rows[0], table.rows[0]);
    }

    #[test]
    fn strips_bom_and_handles_crlf() {
        let table = parse_tabular("\u{feff}id,slug\r\n1,alpha\r\n2,beta\r\n").expect("parse");
        assert_eq!(table.headers, vec!["id", "slug"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].get("slug"), Some("beta"));
        assert_eq!(table.rows[1].line, 3);
    }

    #[test]
    fn pads_short_rows_and_skips_blank_lines() {
        let table = parse_tabular("id,slug,title\n1\n\n,,\n2,beta,Beta\n").expect("parse");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("slug"), Some(""));
        assert_eq!(table.rows[0].get("title"), Some(""));
        assert_eq!(table.rows[1].get("id"), Some("2"));
        assert_eq!(table.rows[1].line, 5);
    }

    #[test]
    fn keeps_raw_header_positions() {
        let table = parse_tabular("id,,section_summary\n1,ignored,text\n").expect("parse");
        assert_eq!(table.raw_headers, vec!["id", "", "section_summary"]);
        assert_eq!(table.headers, vec!["id", "section_summary"]);
        assert_eq!(table.rows[0].fields.len(), 2);
        assert_eq!(table.rows[0].get("section_summary"), Some("text"));
    }

    #[test]
    fn header_only_input_has_no_rows() {
        let table = parse_tabular("id,slug\n").expect("parse");
        assert_eq!(table.headers, vec!["id", "slug"]);
        assert!(table.rows.is_empty());
    }

    #[test]
    fn empty_input_is_empty_table() {
        let table = parse_tabular("").expect("parse");
        assert!(table.headers.is_empty());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn unterminated_quote_is_fatal() {
        let error = parse_tabular("id,title\n1,\"open\nstill open").expect_err("must fail");
        assert_eq!(error, TabularError::UnterminatedQuote { line: 2 });
    }
}

//! Canonical CSV reading and writing

use std::collections::HashMap;
use std::path::Path;

use crate::error::DataIntegrityError;
use crate::merge::fingerprint::{ensure_scheme, normalize_url, url_fingerprint};
use crate::taxonomy::{Level, Taxonomy};
use crate::types::{CertificationEntry, EntryId};

/// Header of the canonical dataset, in column order
pub const CSV_HEADER: [&str; 9] = [
    "Category",
    "Certification_Name",
    "Provider",
    "URL",
    "Description",
    "Duration",
    "Level",
    "Prerequisites",
    "Expiration",
];

/// One cleaned CSV row, before an id is attached
#[derive(Clone, Debug, PartialEq)]
pub struct CsvRow {
    /// 1-based line the row starts on
    pub line: u64,
    /// Normalized URL fingerprint
    pub fingerprint: String,
    /// Entry fields; `id` and maintenance state are filled in by the store
    pub entry: CertificationEntry,
}

fn optional(field: &str) -> Option<String> {
    let field = field.trim();
    (!field.is_empty()).then(|| field.to_string())
}

fn malformed(path: &Path, line: u64, reason: impl Into<String>) -> DataIntegrityError {
    DataIntegrityError::MalformedCsv {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// Parse and clean the canonical CSV
///
/// Fails on a wrong header, a wrong column count, a missing name or URL, an
/// unparsable URL, a category outside `taxonomy`, or two rows sharing a URL.
pub fn parse_csv(
    path: &Path,
    bytes: &[u8],
    taxonomy: &Taxonomy,
) -> Result<Vec<CsvRow>, DataIntegrityError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| malformed(path, 0, e.to_string()))?
        .clone();
    let header: Vec<&str> = headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim())
        .collect();
    if header != CSV_HEADER {
        return Err(malformed(
            path,
            1,
            format!("expected header {:?}, found {:?}", CSV_HEADER.join(","), header.join(",")),
        ));
    }

    let mut rows = Vec::new();
    let mut seen: HashMap<String, u64> = HashMap::new();

    for record in reader.records() {
        let record = record.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            malformed(path, line, e.to_string())
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let field = |i: usize| record.get(i).unwrap_or_default().trim();

        // Blank lines inside the file are tolerated
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let category = field(0);
        if !taxonomy.contains(category) {
            return Err(DataIntegrityError::UnknownCategory {
                line,
                category: category.to_string(),
            });
        }
        let name = field(1);
        if name.is_empty() {
            return Err(malformed(path, line, "missing Certification_Name"));
        }
        let raw_url = ensure_scheme(field(3));
        if raw_url.is_empty() {
            return Err(malformed(path, line, "missing URL"));
        }
        let url = normalize_url(&raw_url)
            .ok_or_else(|| malformed(path, line, format!("invalid URL {raw_url:?}")))?;
        let fingerprint = url_fingerprint(&url)
            .ok_or_else(|| malformed(path, line, format!("invalid URL {raw_url:?}")))?;

        if let Some(&first_line) = seen.get(&fingerprint) {
            return Err(DataIntegrityError::DuplicateUrl {
                url,
                first_line,
                line,
            });
        }
        seen.insert(fingerprint.clone(), line);

        rows.push(CsvRow {
            line,
            fingerprint,
            entry: CertificationEntry {
                id: EntryId(0),
                category: category.to_string(),
                name: name.to_string(),
                provider: field(2).to_string(),
                url,
                description: field(4).to_string(),
                duration: field(5).to_string(),
                level: Level::parse(field(6)),
                prerequisites: optional(field(7)),
                expiration: optional(field(8)),
                consecutive_dead_count: 0,
                last_checked_at: None,
                last_status: None,
            },
        });
    }

    Ok(rows)
}

/// Serialize entries in canonical form (CRLF line endings, minimal quoting)
pub fn render_csv<'a, I>(path: &Path, entries: I) -> Result<Vec<u8>, DataIntegrityError>
where
    I: IntoIterator<Item = &'a CertificationEntry>,
{
    let write_failed = |e: csv::Error| DataIntegrityError::WriteFailed {
        path: path.to_path_buf(),
        source: std::io::Error::other(e.to_string()),
    };

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(write_failed)?;
    for entry in entries {
        writer
            .write_record([
                entry.category.as_str(),
                entry.name.as_str(),
                entry.provider.as_str(),
                entry.url.as_str(),
                entry.description.as_str(),
                entry.duration.as_str(),
                entry.level.as_str(),
                entry.prerequisites.as_deref().unwrap_or_default(),
                entry.expiration.as_deref().unwrap_or_default(),
            ])
            .map_err(write_failed)?;
    }
    writer.into_inner().map_err(|e| DataIntegrityError::WriteFailed {
        path: path.to_path_buf(),
        source: std::io::Error::other(e.to_string()),
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str =
        "Category,Certification_Name,Provider,URL,Description,Duration,Level,Prerequisites,Expiration\r\n";

    fn parse(body: &str) -> Result<Vec<CsvRow>, DataIntegrityError> {
        let text = format!("{HEADER}{body}");
        parse_csv(Path::new("test.csv"), text.as_bytes(), &Taxonomy::default())
    }

    #[test]
    fn test_parse_cleans_fields() {
        let rows = parse(
            "Cloud Computing , AWS Cloud Practitioner ,Amazon Web Services,aws.amazon.com/training/?utm_source=x,\"Intro, with comma\",6 hours,beginner,,\r\n",
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        let entry = &rows[0].entry;
        assert_eq!(entry.category, "Cloud Computing");
        assert_eq!(entry.name, "AWS Cloud Practitioner");
        assert_eq!(entry.url, "https://aws.amazon.com/training");
        assert_eq!(entry.description, "Intro, with comma");
        assert_eq!(entry.level, Level::Beginner);
        assert_eq!(entry.prerequisites, None);
        assert_eq!(rows[0].line, 2);
    }

    #[test]
    fn test_wrong_header_is_malformed() {
        let err = parse_csv(
            Path::new("x.csv"),
            b"Category,Name,URL\r\nCloud Computing,A,https://a.org\r\n",
            &Taxonomy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DataIntegrityError::MalformedCsv { line: 1, .. }));
    }

    #[test]
    fn test_wrong_column_count_is_malformed() {
        let err = parse("Cloud Computing,A,Acme,https://a.org\r\n").unwrap_err();
        assert!(matches!(err, DataIntegrityError::MalformedCsv { .. }));
    }

    #[test]
    fn test_unknown_category_is_fatal() {
        let err = parse("Cooking,Pasta 101,Acme,https://a.org,,,,,\r\n").unwrap_err();
        assert!(matches!(
            err,
            DataIntegrityError::UnknownCategory { line: 2, ref category } if category == "Cooking"
        ));
    }

    #[test]
    fn test_duplicate_urls_are_fatal() {
        let err = parse(
            "Cloud Computing,A,Acme,https://a.org/x/,,,,,\r\nWeb Development,B,Acme,https://A.org/x,,,,,\r\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DataIntegrityError::DuplicateUrl { first_line: 2, line: 3, .. }
        ));
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let err = parse("Cloud Computing,,Acme,https://a.org,,,,,\r\n").unwrap_err();
        assert!(matches!(err, DataIntegrityError::MalformedCsv { line: 2, .. }));
    }

    #[test]
    fn test_render_then_parse_is_stable() {
        let rows = parse(
            "Cloud Computing (AWS),\"Quoted \"\"Name\"\"\",Acme,https://a.org/x,Desc,Self-paced,Not Specified,None,Never\r\n",
        )
        .unwrap();
        let entries: Vec<CertificationEntry> = rows.into_iter().map(|r| r.entry).collect();

        let first = render_csv(Path::new("x.csv"), &entries).unwrap();
        let reparsed = parse_csv(Path::new("x.csv"), &first, &Taxonomy::default()).unwrap();
        let again: Vec<CertificationEntry> = reparsed.into_iter().map(|r| r.entry).collect();
        let second = render_csv(Path::new("x.csv"), &again).unwrap();

        assert_eq!(String::from_utf8(first).unwrap(), String::from_utf8(second).unwrap());
        assert_eq!(again[0].name, "Quoted \"Name\"");
        assert_eq!(again[0].category, "Cloud Computing (AWS)");
    }
}

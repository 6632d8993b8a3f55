//! The streaming metadata spreadsheet reader. Resolves columns against
//! a content model's header map, decorates values with their language or
//! datatype, groups `FILES`/`ITEM_FILES` columns, and recovers embedded
//! object identity from the `INDEX` column.

mod file_groups;
mod header;

pub use file_groups::{build_file_groups, build_item_files, parse_label, parse_value_string, FileGroup, GroupedFile, ItemFile};
pub use header::{build_fields, ColumnSpec, SYSTEM_HEADERS};

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::content_model::{DecoratedValue, EmbeddedIndex, HeaderMap, RowFields};

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("spreadsheet file not found: {0}")]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("unrecognized column header: {0}")]
    UnrecognizedHeader(String),
    #[error("{0}")]
    Metadata(String),
}

/// A row whose shape was unusable: wrong column count, or a `FILES`/`INDEX`
/// value that failed to parse. Never written to the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRow {
    pub line_reference: String,
    pub reason: String,
}

/// Either a usable `Row` or a structurally broken one dropped before any
/// repository interaction.
#[derive(Debug, Clone)]
pub enum RowOutcome {
    Row(Row),
    Invalid(InvalidRow),
}

/// One spreadsheet row, fully parsed: its identifier, target URI (real or a
/// freshly minted `urn:uuid:` placeholder), content-model field data,
/// embedded-object index, file groups, and publication flags.
#[derive(Debug, Clone)]
pub struct Row {
    pub line_number: usize,
    pub identifier: String,
    pub uri: String,
    pub fields: RowFields,
    pub index: EmbeddedIndex,
    pub file_groups: Vec<FileGroup>,
    pub item_files: Vec<ItemFile>,
    pub publish: bool,
    pub hidden: bool,
}

impl Row {
    /// `false` once the URI is still the synthetic `urn:uuid:` placeholder,
    /// meaning this row has never been written to the repository.
    pub fn has_uri(&self) -> bool {
        !self.uri.starts_with("urn:uuid:")
    }

    pub fn has_files(&self) -> bool {
        !self.file_groups.is_empty()
    }

    pub fn has_item_files(&self) -> bool {
        !self.item_files.is_empty()
    }

    pub fn filenames(&self) -> Vec<&str> {
        self.file_groups
            .iter()
            .flat_map(|g| g.files.iter().map(|f| f.filename.as_str()))
            .chain(self.item_files.iter().map(|f| f.filename.as_str()))
            .collect()
    }
}

fn new_placeholder_uri() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

/// Parse an `INDEX` column value (`attr[i]=#fragment_id;...`) into an
/// `EmbeddedIndex`. Malformed entries are skipped rather than erroring: a
/// missing index entry just means a fresh fragment id is minted.
fn parse_index(raw: &str) -> EmbeddedIndex {
    let mut index = EmbeddedIndex::default();
    for entry in file_groups::split_escaped(raw, ';') {
        let Some((lhs, frag)) = entry.split_once('=') else {
            continue;
        };
        let Some(bracket) = lhs.find('[') else { continue };
        if !lhs.ends_with(']') {
            continue;
        }
        let attr = &lhs[..bracket];
        let Ok(n) = lhs[bracket + 1..lhs.len() - 1].parse::<usize>() else {
            continue;
        };
        index.insert(attr, n, frag.trim_start_matches('#'));
    }
    index
}

/// Every dotted prefix of `key`, shallowest first, so nested embedded
/// attributes at any depth get an entry in `embedded_counts`.
fn embedded_prefixes(key: &str) -> Vec<String> {
    let segments: Vec<&str> = key.split('.').collect();
    (1..segments.len()).map(|i| segments[..i].join(".")).collect()
}

fn build_row_fields(specs: &[ColumnSpec], headers: &[String], record: &csv::StringRecord) -> RowFields {
    let mut scalar: BTreeMap<String, Vec<DecoratedValue>> = BTreeMap::new();
    for spec in specs {
        let Some(idx) = headers.iter().position(|h| h == &spec.header) else {
            continue;
        };
        let raw = record.get(idx).unwrap_or("");
        let values = parse_value_string(raw);
        if values.is_empty() {
            continue;
        }
        let decorated = values
            .into_iter()
            .map(|value| DecoratedValue {
                value,
                lang: spec.lang.clone(),
                datatype: spec.datatype.clone(),
            })
            .collect();
        scalar.insert(spec.attr_path.clone(), decorated);
    }

    let mut embedded_counts = BTreeMap::new();
    for (key, values) in &scalar {
        for prefix in embedded_prefixes(key) {
            let entry = embedded_counts.entry(prefix).or_insert(0usize);
            *entry = (*entry).max(values.len());
        }
    }

    RowFields { scalar, embedded_counts }
}

fn column(headers: &[String], record: &csv::StringRecord, name: &str) -> String {
    headers
        .iter()
        .position(|h| h == name)
        .and_then(|i| record.get(i))
        .unwrap_or("")
        .to_string()
}

/// Resolve the identifier column's header label: the model's own
/// `identifier` attribute if it declares one, else `title`.
fn identifier_column(header_map: &HeaderMap) -> String {
    header_map
        .resolve_label_for_attr("identifier")
        .or_else(|| header_map.resolve_label_for_attr("title"))
        .unwrap_or_else(|| "Identifier".to_string())
}

/// Streaming reader over a CSV metadata file: resolves column headers
/// against a content model's header map once at open time, then makes
/// repeated streaming passes (row count, percentage-selection identifiers,
/// the actual row sequence) over the file directly rather than buffering it.
pub struct MetadataSpreadsheet {
    path: PathBuf,
    header_map: HeaderMap,
    headers: Vec<String>,
    specs: Vec<ColumnSpec>,
    identifier_header: String,
    total: usize,
}

impl MetadataSpreadsheet {
    pub fn open(path: impl Into<PathBuf>, header_map: HeaderMap) -> Result<Self, SpreadsheetError> {
        let path = path.into();
        if !path.exists() {
            return Err(SpreadsheetError::NotFound(path));
        }
        let mut reader = csv::Reader::from_path(&path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let specs = build_fields(&headers, &header_map)?;
        let identifier_header = identifier_column(&header_map);
        let total = reader.records().count();
        Ok(Self {
            path,
            header_map,
            headers,
            specs,
            identifier_header,
            total,
        })
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn has_binaries(&self) -> bool {
        self.headers.iter().any(|h| h == "FILES" || h == "ITEM_FILES")
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.header_map
    }

    fn reopen(&self) -> Result<csv::Reader<File>, SpreadsheetError> {
        Ok(csv::Reader::from_path(&self.path)?)
    }

    fn identifier_index(&self) -> usize {
        self.headers
            .iter()
            .position(|h| h == &self.identifier_header)
            .unwrap_or(0)
    }

    /// Compute the stride-selected identifier subset for a `percentage`
    /// selection: an extra streaming pass over the identifier column alone.
    fn select_subset(&self, percentage: u8, completed: &HashSet<String>) -> Result<HashSet<String>, SpreadsheetError> {
        let idx = self.identifier_index();
        let mut reader = self.reopen()?;
        let mut identifiers = Vec::new();
        for result in reader.records() {
            let record = result?;
            let id = record.get(idx).unwrap_or("").to_string();
            if !completed.contains(&id) {
                identifiers.push(id);
            }
        }

        let total = self.total.max(1);
        let completed_fraction = completed.len() as f64 / total as f64;
        let target_count = ((percentage as f64 / 100.0) * total as f64).round() as usize;
        let step_size = if identifiers.len() > target_count.max(1) {
            (((100.0 * (1.0 - completed_fraction)) / percentage as f64).floor() as usize).max(1)
        } else {
            1
        };

        Ok(identifiers.into_iter().step_by(step_size).collect())
    }

    /// Stream the spreadsheet's rows. `limit` caps the number of usable
    /// rows yielded; `percentage`, if given, selects an approximately
    /// even-strided subset of the not-yet-completed rows; `completed` names
    /// identifiers to skip outright (already processed in an earlier run).
    pub fn rows(
        &self,
        limit: Option<usize>,
        percentage: Option<u8>,
        completed: HashSet<String>,
    ) -> Result<Rows, SpreadsheetError> {
        let subset = percentage.map(|p| self.select_subset(p, &completed)).transpose()?;
        let reader = self.reopen()?;
        Ok(Rows {
            reader,
            headers: self.headers.clone(),
            specs: self.specs.clone(),
            identifier_header: self.identifier_header.clone(),
            subset,
            completed,
            limit,
            yielded: 0,
            line_number: 0,
        })
    }
}

/// The streaming row iterator returned by [`MetadataSpreadsheet::rows`].
pub struct Rows {
    reader: csv::Reader<File>,
    headers: Vec<String>,
    specs: Vec<ColumnSpec>,
    identifier_header: String,
    subset: Option<HashSet<String>>,
    completed: HashSet<String>,
    limit: Option<usize>,
    yielded: usize,
    line_number: usize,
}

impl Rows {
    fn build_row(&self, record: &csv::StringRecord) -> Result<Row, SpreadsheetError> {
        let identifier = column(&self.headers, record, &self.identifier_header);
        let uri_column = column(&self.headers, record, "URI");
        let uri = if uri_column.is_empty() {
            new_placeholder_uri()
        } else {
            uri_column
        };
        let fields = build_row_fields(&self.specs, &self.headers, record);
        let index = parse_index(&column(&self.headers, record, "INDEX"));
        let file_groups = build_file_groups(&column(&self.headers, record, "FILES"))?;
        let item_files = build_item_files(&column(&self.headers, record, "ITEM_FILES"));
        let publish = is_truthy(&column(&self.headers, record, "PUBLISH"));
        let hidden = is_truthy(&column(&self.headers, record, "HIDDEN"));

        Ok(Row {
            line_number: self.line_number,
            identifier,
            uri,
            fields,
            index,
            file_groups,
            item_files,
            publish,
            hidden,
        })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

impl Iterator for Rows {
    type Item = Result<RowOutcome, SpreadsheetError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(limit) = self.limit {
                if self.yielded >= limit {
                    return None;
                }
            }

            let mut record = csv::StringRecord::new();
            let read = match self.reader.read_record(&mut record) {
                Ok(read) => read,
                Err(e) => return Some(Err(e.into())),
            };
            if !read {
                return None;
            }
            self.line_number += 1;

            if record.len() != self.headers.len() {
                self.yielded += 1;
                return Some(Ok(RowOutcome::Invalid(InvalidRow {
                    line_reference: (self.line_number + 1).to_string(),
                    reason: "Wrong number of columns".to_string(),
                })));
            }

            let identifier = column(&self.headers, &record, &self.identifier_header);
            if self.completed.contains(&identifier) {
                continue;
            }
            if let Some(subset) = &self.subset {
                if !subset.contains(&identifier) {
                    continue;
                }
            }

            self.yielded += 1;
            return match self.build_row(&record) {
                Ok(row) => Some(Ok(RowOutcome::Row(row))),
                Err(SpreadsheetError::Metadata(reason)) => Some(Ok(RowOutcome::Invalid(InvalidRow {
                    line_reference: (self.line_number + 1).to_string(),
                    reason,
                }))),
                Err(e) => Some(Err(e)),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn item_header_map() -> HeaderMap {
        HeaderMap::embedded([
            ("title", HeaderMap::label("Title")),
            ("identifier", HeaderMap::label("Identifier")),
        ])
    }

    fn write_csv(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.csv");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn wrong_column_count_yields_invalid_row() {
        let (_dir, path) = write_csv("Title,Identifier\nOnly one value\n");
        let spreadsheet = MetadataSpreadsheet::open(&path, item_header_map()).unwrap();
        let rows: Vec<_> = spreadsheet.rows(None, None, HashSet::new()).unwrap().collect();
        assert_eq!(rows.len(), 1);
        match rows[0].as_ref().unwrap() {
            RowOutcome::Invalid(invalid) => assert_eq!(invalid.reason, "Wrong number of columns"),
            RowOutcome::Row(_) => panic!("expected an invalid row"),
        }
    }

    #[test]
    fn completed_rows_are_skipped() {
        let (_dir, path) = write_csv("Title,Identifier\nA,item-1\nB,item-2\n");
        let spreadsheet = MetadataSpreadsheet::open(&path, item_header_map()).unwrap();
        let mut completed = HashSet::new();
        completed.insert("item-1".to_string());
        let rows: Vec<_> = spreadsheet.rows(None, None, completed).unwrap().collect();
        assert_eq!(rows.len(), 1);
        match rows[0].as_ref().unwrap() {
            RowOutcome::Row(row) => assert_eq!(row.identifier, "item-2"),
            RowOutcome::Invalid(_) => panic!("expected a row"),
        }
    }

    #[test]
    fn missing_uri_column_mints_placeholder() {
        let (_dir, path) = write_csv("Title,Identifier\nA,item-1\n");
        let spreadsheet = MetadataSpreadsheet::open(&path, item_header_map()).unwrap();
        let rows: Vec<_> = spreadsheet.rows(None, None, HashSet::new()).unwrap().collect();
        match rows[0].as_ref().unwrap() {
            RowOutcome::Row(row) => assert!(!row.has_uri()),
            RowOutcome::Invalid(_) => panic!("expected a row"),
        }
    }

    #[test]
    fn resume_yields_zero_rows_when_all_completed() {
        let (_dir, path) = write_csv("Title,Identifier\nA,item-1\nB,item-2\n");
        let spreadsheet = MetadataSpreadsheet::open(&path, item_header_map()).unwrap();
        let completed: HashSet<String> = ["item-1".to_string(), "item-2".to_string()].into_iter().collect();
        let rows: Vec<_> = spreadsheet.rows(None, None, completed).unwrap().collect();
        assert!(rows.is_empty());
    }

    #[test]
    fn open_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MetadataSpreadsheet::open(dir.path().join("missing.csv"), item_header_map()).unwrap_err();
        assert!(matches!(err, SpreadsheetError::NotFound(_)));
    }
}

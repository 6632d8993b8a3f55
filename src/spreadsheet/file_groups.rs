//! `FILES`/`ITEM_FILES` column parsing. `FILES` groups file specs by
//! their basename-sans-extension into ordered page groups; `ITEM_FILES` is
//! a flat list attached directly to the parent resource.

use std::path::Path;

use super::SpreadsheetError;

/// Split `s` on `sep`, treating `\<sep>` and `\\` as escaped literals.
pub fn split_escaped(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&next) if next == sep || next == '\\' => {
                    current.push(next);
                    chars.next();
                }
                _ => current.push(c),
            }
        } else if c == sep {
            out.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    out.push(current);
    out
}

/// Split a repeatable field value on `|`, dropping empty entries. An empty
/// input yields no values at all, so a blank cell and a cell containing a
/// single empty value are distinguished from "one value, the empty string".
pub fn parse_value_string(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    split_escaped(s, '|').into_iter().filter(|v| !v.is_empty()).collect()
}

/// Split a `LABEL:rest` token into its optional label and the remainder.
pub fn parse_label(token: &str) -> (Option<String>, String) {
    match token.split_once(':') {
        Some((label, rest)) if !label.is_empty() => (Some(label.to_string()), rest.to_string()),
        _ => (None, token.to_string()),
    }
}

/// Strip a trailing `<usage>` tag from a file spec, if present.
fn strip_usage(spec: &str) -> (String, Option<String>) {
    if let (Some(start), Some(end)) = (spec.find('<'), spec.find('>')) {
        if end > start {
            let usage = spec[start + 1..end].to_string();
            let filename = format!("{}{}", &spec[..start], &spec[end + 1..]);
            return (filename, Some(usage));
        }
    }
    (spec.to_string(), None)
}

fn rootname(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string())
}

/// One file named within a page group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedFile {
    pub filename: String,
    pub usage: Option<String>,
}

/// A group of files sharing one page: either an explicit label carried on
/// its `LABEL:` prefix, or a positional default of `Page N`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileGroup {
    pub rootname: String,
    pub label: Option<String>,
    pub files: Vec<GroupedFile>,
}

/// Parse a `FILES` column value into ordered page groups. Tokens are
/// separated by `;`; a token may itself carry several file specs joined by
/// `|` under one label. Specs lacking a `|`-joined sibling are grouped with
/// any other spec sharing the same basename-sans-extension.
pub fn build_file_groups(raw: &str) -> Result<Vec<FileGroup>, SpreadsheetError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let mut groups: Vec<FileGroup> = Vec::new();
    let mut any_labelled = false;
    let mut any_unlabelled = false;

    for token in split_escaped(raw, ';') {
        if token.is_empty() {
            continue;
        }
        for spec in split_escaped(&token, '|') {
            let (label, rest) = parse_label(&spec);
            let (filename, usage) = strip_usage(&rest);
            if label.is_some() {
                any_labelled = true;
            } else {
                any_unlabelled = true;
            }
            let root = rootname(&filename);
            match groups.iter_mut().find(|g| g.rootname == root) {
                Some(group) => {
                    if let Some(label) = &label {
                        match &group.label {
                            Some(existing) if existing != label => {
                                return Err(SpreadsheetError::Metadata(format!(
                                    "mismatched labels for file group '{root}': '{existing}' and '{label}'"
                                )));
                            }
                            Some(_) => {}
                            None => group.label = Some(label.clone()),
                        }
                    }
                    group.files.push(GroupedFile { filename, usage });
                }
                None => groups.push(FileGroup {
                    rootname: root,
                    label,
                    files: vec![GroupedFile { filename, usage }],
                }),
            }
        }
    }

    if any_labelled && any_unlabelled {
        return Err(SpreadsheetError::Metadata(
            "FILES mixes labelled and unlabelled groups".to_string(),
        ));
    }
    if !any_labelled {
        for (n, group) in groups.iter_mut().enumerate() {
            group.label = Some(format!("Page {}", n + 1));
        }
    }
    Ok(groups)
}

/// One file named directly on the parent resource, bypassing page grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFile {
    pub label: Option<String>,
    pub filename: String,
    pub usage: Option<String>,
}

/// Parse an `ITEM_FILES` column value: a flat, semicolon-delimited list.
pub fn build_item_files(raw: &str) -> Vec<ItemFile> {
    if raw.is_empty() {
        return Vec::new();
    }
    split_escaped(raw, ';')
        .into_iter()
        .filter(|t| !t.is_empty())
        .map(|token| {
            let (label, rest) = parse_label(&token);
            let (filename, usage) = strip_usage(&rest);
            ItemFile { label, filename, usage }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_string_empty_is_empty() {
        assert!(parse_value_string("").is_empty());
    }

    #[test]
    fn parse_value_string_drops_empty_entries() {
        assert_eq!(parse_value_string("a|b||c").len(), 3);
    }

    #[test]
    fn page_sequencing_groups_by_rootname() {
        let groups = build_file_groups("foo.jpg;foo.tiff;bar.jpg;baz.pdf").unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].rootname, "foo");
        assert_eq!(groups[0].files.len(), 2);
        assert_eq!(groups[1].files.len(), 1);
        assert_eq!(groups[0].label.as_deref(), Some("Page 1"));
        assert_eq!(groups[2].label.as_deref(), Some("Page 3"));
    }

    #[test]
    fn mismatched_labels_for_same_root_is_an_error() {
        let err = build_file_groups("front:foo.jpg|back:foo.tiff").unwrap_err();
        assert!(matches!(err, SpreadsheetError::Metadata(_)));
    }

    #[test]
    fn mixed_labelled_and_unlabelled_is_an_error() {
        let err = build_file_groups("Front:foo.jpg;bar.jpg").unwrap_err();
        assert!(matches!(err, SpreadsheetError::Metadata(_)));
    }

    #[test]
    fn item_files_parses_flat_list() {
        let files = build_item_files("ocr.xml;transcript.txt");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].filename, "ocr.xml");
    }
}

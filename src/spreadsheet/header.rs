//! Column header decoration: `Label [lang]` and `Label {Datatype}` suffixes,
//! resolved against a content model's header map into dotted attribute
//! paths.

use crate::content_model::HeaderMap;
use crate::rdf::NamespaceManager;

use super::SpreadsheetError;

/// System headers every spreadsheet may carry alongside model columns;
/// these never resolve through the header map.
pub const SYSTEM_HEADERS: &[&str] = &[
    "URI",
    "PUBLIC URI",
    "CREATED",
    "MODIFIED",
    "INDEX",
    "FILES",
    "ITEM_FILES",
    "PUBLISH",
    "HIDDEN",
];

/// One metadata column resolved against the content model: which attribute
/// path it feeds, and what language or datatype decoration applies to every
/// value it carries.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub header: String,
    pub attr_path: String,
    pub lang: Option<String>,
    pub datatype: Option<String>,
}

/// Resolve every non-system header against `header_map`, decorating each
/// with its language/datatype suffix. Any header the map doesn't recognise
/// is a hard error for the whole spreadsheet.
pub fn build_fields(fieldnames: &[String], header_map: &HeaderMap) -> Result<Vec<ColumnSpec>, SpreadsheetError> {
    let mut specs = Vec::new();
    for header in fieldnames {
        if SYSTEM_HEADERS.contains(&header.as_str()) {
            continue;
        }
        let (bare, lang, datatype) = decorate(header);
        let attr_path = header_map
            .resolve_label(&bare)
            .ok_or_else(|| SpreadsheetError::UnrecognizedHeader(header.clone()))?;
        specs.push(ColumnSpec {
            header: header.clone(),
            attr_path,
            lang,
            datatype,
        });
    }
    Ok(specs)
}

/// Split a header label's trailing `[lang]` or `{Datatype}` decoration off,
/// returning the bare label plus whichever decoration was present.
fn decorate(label: &str) -> (String, Option<String>, Option<String>) {
    if let Some((bare, token)) = strip_trailing_bracket(label, '[', ']') {
        return (bare.to_string(), Some(resolve_language(token)), None);
    }
    if let Some((bare, token)) = strip_trailing_bracket(label, '{', '}') {
        return (bare.to_string(), None, Some(resolve_datatype(token)));
    }
    (label.to_string(), None, None)
}

fn strip_trailing_bracket(label: &str, open: char, close: char) -> Option<(&str, &str)> {
    let label = label.trim_end();
    if !label.ends_with(close) {
        return None;
    }
    let open_pos = label.rfind(open)?;
    Some((label[..open_pos].trim_end(), &label[open_pos + 1..label.len() - 1]))
}

/// Resolve a two-letter code or a small set of well-known language names to
/// its BCP-47 tag; anything else passes through lowercased.
fn resolve_language(token: &str) -> String {
    if token.len() == 2 && token.chars().all(|c| c.is_ascii_alphabetic()) {
        return token.to_ascii_lowercase();
    }
    const NAMES: &[(&str, &str)] = &[
        ("english", "en"),
        ("french", "fr"),
        ("german", "de"),
        ("spanish", "es"),
        ("italian", "it"),
        ("latin", "la"),
        ("japanese", "ja"),
        ("chinese", "zh"),
        ("arabic", "ar"),
        ("russian", "ru"),
    ];
    let lower = token.to_ascii_lowercase();
    NAMES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, code)| code.to_string())
        .unwrap_or(lower)
}

/// Resolve a well-known datatype name or an N3-abbreviated URI (`xsd:date`)
/// to a full datatype URI.
fn resolve_datatype(token: &str) -> String {
    match token {
        "EDTF" => "http://id.loc.gov/datatypes/edtf".to_string(),
        "Date" => "http://www.w3.org/2001/XMLSchema#date".to_string(),
        _ => NamespaceManager::new().expand(token).unwrap_or_else(|_| token.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_header_map() -> HeaderMap {
        HeaderMap::embedded([
            ("title", HeaderMap::label("Title")),
            ("identifier", HeaderMap::label("Identifier")),
            (
                "subject",
                HeaderMap::embedded([
                    ("label", HeaderMap::label("Subject")),
                    ("uri", HeaderMap::label("Subject URI")),
                ]),
            ),
        ])
    }

    #[test]
    fn decorate_splits_language_suffix() {
        let (bare, lang, datatype) = decorate("Title [en]");
        assert_eq!(bare, "Title");
        assert_eq!(lang, Some("en".to_string()));
        assert_eq!(datatype, None);
    }

    #[test]
    fn decorate_splits_datatype_suffix() {
        let (bare, lang, datatype) = decorate("Date Created {EDTF}");
        assert_eq!(bare, "Date Created");
        assert_eq!(lang, None);
        assert_eq!(datatype, Some("http://id.loc.gov/datatypes/edtf".to_string()));
    }

    #[test]
    fn decorate_resolves_named_language() {
        let (_, lang, _) = decorate("Title [French]");
        assert_eq!(lang, Some("fr".to_string()));
    }

    #[test]
    fn build_fields_resolves_nested_labels() {
        let fields = vec![
            "Title".to_string(),
            "Identifier".to_string(),
            "Subject".to_string(),
            "Subject URI".to_string(),
            "URI".to_string(),
            "FILES".to_string(),
        ];
        let specs = build_fields(&fields, &item_header_map()).unwrap();
        assert_eq!(specs.len(), 4);
        assert!(specs.iter().any(|s| s.attr_path == "subject.label"));
        assert!(specs.iter().any(|s| s.attr_path == "subject.uri"));
    }

    #[test]
    fn build_fields_rejects_unrecognized_header() {
        let fields = vec!["Nonexistent Column".to_string()];
        let err = build_fields(&fields, &item_header_map()).unwrap_err();
        assert!(matches!(err, SpreadsheetError::UnrecognizedHeader(_)));
    }
}

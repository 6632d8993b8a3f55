//! Nested attribute-path ↔ header-label mapping every content model exports
//! (spec §6.2's `HEADER_MAP`). A plain entry names one property's column
//! header; an embedded entry names the sub-map for one embedded object's own
//! properties, so a dotted attribute path like `subject.label` reaches
//! column label `Subject`.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub enum HeaderMap {
    Label(String),
    Embedded(BTreeMap<String, HeaderMap>),
}

impl HeaderMap {
    pub fn embedded(entries: impl IntoIterator<Item = (&'static str, HeaderMap)>) -> Self {
        HeaderMap::Embedded(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    pub fn label(label: impl Into<String>) -> Self {
        HeaderMap::Label(label.into())
    }

    /// Flatten into dotted-attribute-path → column label pairs, in the
    /// order a template's header row should be emitted.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.flatten_into("", &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        match self {
            HeaderMap::Label(label) => out.push((prefix.to_string(), label.clone())),
            HeaderMap::Embedded(entries) => {
                for (key, child) in entries {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    child.flatten_into(&path, out);
                }
            }
        }
    }

    /// Resolve a bare column label (decorations already stripped) back to
    /// its dotted attribute path. `None` means the label is unrecognised.
    pub fn resolve_label(&self, label: &str) -> Option<String> {
        self.flatten()
            .into_iter()
            .find(|(_, l)| l == label)
            .map(|(path, _)| path)
    }

    /// The column label declared for a given dotted attribute path, if any.
    pub fn resolve_label_for_attr(&self, attr_path: &str) -> Option<String> {
        self.flatten()
            .into_iter()
            .find(|(path, _)| path == attr_path)
            .map(|(_, label)| label)
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
    fn flatten_yields_dotted_paths() {
        let flat = item_header_map().flatten();
        assert!(flat.contains(&("title".to_string(), "Title".to_string())));
        assert!(flat.contains(&("subject.label".to_string(), "Subject".to_string())));
        assert!(flat.contains(&("subject.uri".to_string(), "Subject URI".to_string())));
    }

    #[test]
    fn resolve_label_finds_nested_entries() {
        let map = item_header_map();
        assert_eq!(map.resolve_label("Subject URI"), Some("subject.uri".to_string()));
        assert_eq!(map.resolve_label("Nonexistent"), None);
    }
}

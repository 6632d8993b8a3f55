//! Plain-text extraction from HTML member files, attached as a Web
//! Annotation-shaped `oa:TextualBody` targeting the HTML member it was
//! extracted from.

use crate::rdf::{Literal, NamedNode, RdfPredicate, RdfSubject, Triple};

const OA: &str = "http://www.w3.org/ns/oa#";
const DC: &str = "http://purl.org/dc/elements/1.1/";
const RDF_VALUE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#value";
const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Extract the plain text content of an HTML document via `tl`'s
/// lightweight parser. `None` means the bytes could not be read as text;
/// the caller treats that as a binary-source read error and drops the
/// annotation without failing the row.
pub fn extract_plain_text(html: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(html).ok()?;
    let dom = tl::parse(text, tl::ParserOptions::default()).ok()?;
    let mut words = Vec::new();
    for node in dom.nodes() {
        if let tl::Node::Raw(raw) = node {
            words.extend(raw.as_utf8_str().split_whitespace().map(str::to_string));
        }
    }
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Build the annotation triples for one extracted-text body, rooted at a
/// fresh hash URI on `parent_uri` and targeting `target_uri` (the HTML
/// member's own URI).
pub fn build_text_annotation(parent_uri: &str, fragment_id: &str, target_uri: &str, text: &str) -> Vec<Triple> {
    let annotation_uri = format!("{parent_uri}#{fragment_id}");
    let body_uri = format!("{annotation_uri}-body");
    let mut triples = Vec::new();
    add(&mut triples, &annotation_uri, RDF_TYPE, Object::Uri(&format!("{OA}Annotation")));
    add(&mut triples, &annotation_uri, &format!("{OA}hasTarget"), Object::Uri(target_uri));
    add(&mut triples, &annotation_uri, &format!("{OA}hasBody"), Object::Uri(&body_uri));
    add(&mut triples, &body_uri, RDF_TYPE, Object::Uri(&format!("{OA}TextualBody")));
    add(&mut triples, &body_uri, &format!("{DC}format"), Object::Literal("text/plain"));
    add(&mut triples, &body_uri, RDF_VALUE, Object::Literal(text));
    triples
}

enum Object<'a> {
    Uri(&'a str),
    Literal(&'a str),
}

fn add(triples: &mut Vec<Triple>, subject: &str, predicate: &str, object: Object<'_>) {
    let Ok(s) = NamedNode::new(subject) else { return };
    let Ok(p) = RdfPredicate::new(predicate) else { return };
    let o = match object {
        Object::Uri(u) => match NamedNode::new(u) {
            Ok(n) => n.into(),
            Err(_) => return,
        },
        Object::Literal(l) => Literal::new_simple(l).into(),
    };
    triples.push(Triple::new(RdfSubject::NamedNode(s), p, o));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_plain_text_strips_tags() {
        let html = b"<html><body><p>Hello <b>World</b></p></body></html>";
        let text = extract_plain_text(html).unwrap();
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn extract_plain_text_rejects_invalid_utf8() {
        let bytes = [0xff, 0xfe, 0x00];
        assert!(extract_plain_text(&bytes).is_none());
    }

    #[test]
    fn build_text_annotation_targets_the_member() {
        let triples = build_text_annotation("http://h/rest/1", "ocr", "http://h/rest/1/f/ocr.html", "hello world");
        assert!(triples
            .iter()
            .any(|t| t.object.to_string().contains("http://h/rest/1/f/ocr.html")));
        assert_eq!(triples.len(), 6);
    }
}

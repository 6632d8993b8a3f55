//! PCDM resource creation helpers for the create path:
//! pages under a `m/` container, files under `f/`, and an ordered proxy
//! sequence under `x/` linking them with `iana:first`/`iana:last` and
//! `prev`/`next`.

use crate::binary::BinarySource;
use crate::rdf::{Graph, Literal, NamedNode, RdfPredicate, RdfSubject, Triple};
use crate::repo::TransactionClient;
use crate::spreadsheet::FileGroup;

use super::ImportError;

const PCDM: &str = "http://pcdm.org/models#";
const IANA: &str = "http://www.iana.org/assignments/relation/";
const DCTERMS_TITLE: &str = "http://purl.org/dc/terms/title";
const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

pub struct CreatedFile {
    pub uri: String,
}

pub struct CreatedPage {
    pub uri: String,
    pub files: Vec<CreatedFile>,
}

fn uri_triple(subject: &str, predicate: &str, object: &str) -> Option<Triple> {
    let s = NamedNode::new(subject).ok()?;
    let p = RdfPredicate::new(predicate).ok()?;
    let o = NamedNode::new(object).ok()?;
    Some(Triple::new(RdfSubject::NamedNode(s), p, o.into()))
}

fn literal_triple(subject: &str, predicate: &str, value: &str) -> Option<Triple> {
    let s = NamedNode::new(subject).ok()?;
    let p = RdfPredicate::new(predicate).ok()?;
    Some(Triple::new(RdfSubject::NamedNode(s), p, Literal::new_simple(value).into()))
}

/// Title for a new page: `Page N` by default, or the group's own label
/// when `FILES` named one explicitly.
fn page_title(group: &FileGroup, number: usize) -> String {
    group.label.clone().unwrap_or_else(|| format!("Page {number}"))
}

/// Create one file (binary + its RDF description) under `<parent>/f`,
/// attaching the `pcdm:fileOf` triple to the description.
pub async fn create_file(
    tx: &TransactionClient,
    parent_uri: &str,
    source: &dyn BinarySource,
    filename: &str,
) -> Result<CreatedFile, ImportError> {
    let bytes = source.open().await?;
    let mimetype = source
        .mimetype()
        .await?
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let digest = source.digest().await?;

    let files_container = format!("{parent_uri}/f");
    let created = tx
        .create_binary(&files_container, None, &mimetype, &digest, filename, bytes.to_vec())
        .await?;
    let file_uri = created.uri.clone();
    let description_uri = created.describedby.unwrap_or_else(|| file_uri.clone());

    let mut extra = Graph::new();
    for t in [
        uri_triple(&description_uri, RDF_TYPE, &format!("{PCDM}File")),
        literal_triple(&description_uri, DCTERMS_TITLE, filename),
        uri_triple(&description_uri, &format!("{PCDM}fileOf"), parent_uri),
    ]
    .into_iter()
    .flatten()
    {
        extra.insert(t);
    }
    let update = crate::rdf::build_sparql_update(&[], &extra.iter().cloned().collect::<Vec<_>>());
    tx.patch_graph(&description_uri, &update).await?;

    Ok(CreatedFile { uri: file_uri })
}

/// Create one page under `<parent>/m` and every file named in its group
/// under the page's own `f/` container.
pub async fn create_page(
    tx: &TransactionClient,
    parent_uri: &str,
    group: &FileGroup,
    number: usize,
    sources: &[(&str, Box<dyn BinarySource>)],
) -> Result<CreatedPage, ImportError> {
    let title = page_title(group, number);
    let members_container = format!("{parent_uri}/m");

    // The page resource is minted first so its files can reference it by URI.
    let created = tx
        .create(&members_container, None, crate::repo::TURTLE, Vec::new())
        .await?;
    let page_uri = created.uri.clone();
    let description_uri = created.describedby.unwrap_or_else(|| page_uri.clone());

    let mut extra = Graph::new();
    for t in [
        uri_triple(&description_uri, RDF_TYPE, &format!("{PCDM}Object")),
        literal_triple(&description_uri, DCTERMS_TITLE, &title),
        uri_triple(&description_uri, &format!("{PCDM}memberOf"), parent_uri),
    ]
    .into_iter()
    .flatten()
    {
        extra.insert(t);
    }
    let update = crate::rdf::build_sparql_update(&[], &extra.iter().cloned().collect::<Vec<_>>());
    tx.patch_graph(&description_uri, &update).await?;

    let mut files = Vec::new();
    for file in &group.files {
        let Some((_, source)) = sources.iter().find(|(name, _)| *name == file.filename.as_str()) else {
            continue;
        };
        let created = create_file(tx, &page_uri, source.as_ref(), &file.filename).await?;
        files.push(created);
    }

    Ok(CreatedPage { uri: page_uri, files })
}

/// Create an ordered proxy sequence under `<parent>/x`, one proxy per page,
/// chained by `iana:prev`/`iana:next`, with `iana:first`/`iana:last` set on
/// the parent. Returns the extra triples to attach to the parent's own
/// description (the proxy chain endpoints).
pub async fn create_proxy_sequence(
    tx: &TransactionClient,
    parent_uri: &str,
    pages: &[CreatedPage],
) -> Result<Vec<Triple>, ImportError> {
    if pages.is_empty() {
        return Ok(Vec::new());
    }
    let proxies_container = format!("{parent_uri}/x");
    let mut proxy_uris = Vec::with_capacity(pages.len());

    for page in pages {
        let created = tx.create(&proxies_container, None, crate::repo::TURTLE, Vec::new()).await?;
        let proxy_uri = created.uri.clone();
        let description_uri = created.describedby.unwrap_or_else(|| proxy_uri.clone());
        let mut extra = Graph::new();
        if let Some(t) = uri_triple(&description_uri, "http://www.openarchives.org/ore/terms/proxyFor", &page.uri) {
            extra.insert(t);
        }
        if let Some(t) = uri_triple(&description_uri, "http://www.openarchives.org/ore/terms/proxyIn", parent_uri) {
            extra.insert(t);
        }
        let update = crate::rdf::build_sparql_update(&[], &extra.iter().cloned().collect::<Vec<_>>());
        tx.patch_graph(&description_uri, &update).await?;
        proxy_uris.push(proxy_uri);
    }

    for (i, proxy_uri) in proxy_uris.iter().enumerate() {
        let description_uri = proxy_uri.clone();
        let mut extra = Graph::new();
        if i > 0 {
            if let Some(t) = uri_triple(&description_uri, &format!("{IANA}prev"), &proxy_uris[i - 1]) {
                extra.insert(t);
            }
        }
        if i + 1 < proxy_uris.len() {
            if let Some(t) = uri_triple(&description_uri, &format!("{IANA}next"), &proxy_uris[i + 1]) {
                extra.insert(t);
            }
        }
        if !extra.is_empty() {
            let update = crate::rdf::build_sparql_update(&[], &extra.iter().cloned().collect::<Vec<_>>());
            tx.patch_graph(&description_uri, &update).await?;
        }
    }

    let mut parent_extra = Vec::new();
    if let Some(t) = uri_triple(parent_uri, &format!("{IANA}first"), &proxy_uris[0]) {
        parent_extra.push(t);
    }
    if let Some(t) = uri_triple(parent_uri, &format!("{IANA}last"), proxy_uris.last().unwrap()) {
        parent_extra.push(t);
    }
    Ok(parent_extra)
}

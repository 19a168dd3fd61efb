//! Registry response parsing.
//!
//! The registry speaks XML on every endpoint this client uses. Wire shapes
//! are described by private serde proxy structs (deserialized with
//! `quick-xml`) and converted into the public result types, so schema
//! quirks stay contained in this module.

use crate::error::{ErrorKind, Result};
use bcl_manifest::{Attribute, AttributeValue, FileReference, RecordKind};
use exn::ResultExt;
use serde::Deserialize;
use time::UtcDateTime;
use tracing::debug;

/// Aggregate counts returned by a meta-search, used to size a paginated
/// search before fetching any result pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaSearchResult {
    pub result_count: u64,
    pub facets: Vec<Facet>,
    pub taxonomy_terms: Vec<TaxonomyTerm>,
}

/// One facet bucket: a field plus the per-value result counts beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facet {
    pub field: String,
    pub label: String,
    pub values: Vec<(String, u64)>,
}

/// One taxonomy term and the number of results tagged with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyTerm {
    pub name: String,
    pub count: u64,
}

/// A single remote search hit.
///
/// Transient by design: nothing here is persisted until a matching download
/// succeeds and the extracted manifest goes through the local store.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub kind: RecordKind,
    pub uid: String,
    pub version_id: String,
    pub name: String,
    pub description: String,
    pub org: Option<String>,
    pub repo: Option<String>,
    pub release_tag: Option<String>,
    pub last_modified: Option<UtcDateTime>,
    pub tags: Vec<String>,
    pub attributes: Vec<Attribute>,
    pub files: Vec<FileReference>,
}

// =============================================================================
// Wire proxies
// =============================================================================

#[derive(Debug, Deserialize)]
struct MetaSearchXml {
    result_count: Option<u64>,
    #[serde(default)]
    facets: FacetListXml,
    #[serde(default)]
    taxonomy_terms: TermListXml,
}

#[derive(Debug, Default, Deserialize)]
struct FacetListXml {
    #[serde(default, rename = "facet")]
    items: Vec<FacetXml>,
}

#[derive(Debug, Deserialize)]
struct FacetXml {
    field: Option<String>,
    label: Option<String>,
    #[serde(default, rename = "facet_value")]
    values: Vec<FacetValueXml>,
}

#[derive(Debug, Deserialize)]
struct FacetValueXml {
    name: Option<String>,
    count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TermListXml {
    #[serde(default, rename = "term")]
    items: Vec<TermXml>,
}

#[derive(Debug, Deserialize)]
struct TermXml {
    name: Option<String>,
    count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ResultsXml {
    #[serde(default, rename = "result")]
    results: Vec<ResultXml>,
}

#[derive(Debug, Deserialize)]
struct ResultXml {
    component: Option<HitXml>,
    measure: Option<HitXml>,
}

#[derive(Debug, Deserialize)]
struct HitXml {
    uid: Option<String>,
    version_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    org: Option<String>,
    repo: Option<String>,
    release_tag: Option<String>,
    /// Unix timestamp, seconds.
    date_modified: Option<i64>,
    #[serde(default)]
    tags: TagListXml,
    #[serde(default)]
    attributes: AttributeListXml,
    #[serde(default)]
    files: FileListXml,
}

#[derive(Debug, Default, Deserialize)]
struct TagListXml {
    #[serde(default, rename = "tag")]
    items: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AttributeListXml {
    #[serde(default, rename = "attribute")]
    items: Vec<AttributeXml>,
}

#[derive(Debug, Deserialize)]
struct AttributeXml {
    name: Option<String>,
    value: Option<String>,
    datatype: Option<String>,
    units: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileListXml {
    #[serde(default, rename = "file")]
    items: Vec<FileXml>,
}

#[derive(Debug, Deserialize)]
struct FileXml {
    filename: Option<String>,
    filetype: Option<String>,
    usage_type: Option<String>,
    checksum: Option<String>,
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a meta-search response body.
pub(crate) fn meta_search(body: &str) -> Result<MetaSearchResult> {
    let doc: MetaSearchXml = quick_xml::de::from_str(body).or_raise(|| ErrorKind::Protocol)?;
    Ok(MetaSearchResult {
        result_count: doc.result_count.unwrap_or(0),
        facets: doc
            .facets
            .items
            .into_iter()
            .map(|facet| Facet {
                field: facet.field.unwrap_or_default(),
                label: facet.label.unwrap_or_default(),
                values: facet
                    .values
                    .into_iter()
                    .filter_map(|v| Some((v.name?, v.count.unwrap_or(0))))
                    .collect(),
            })
            .collect(),
        taxonomy_terms: doc
            .taxonomy_terms
            .items
            .into_iter()
            .filter_map(|term| Some(TaxonomyTerm { name: term.name?, count: term.count.unwrap_or(0) }))
            .collect(),
    })
}

/// Parse a paged-search response body.
///
/// Hits missing a uid or version id are dropped with a debug log rather
/// than failing the page: they can never be downloaded or compared against
/// local records anyway.
pub(crate) fn search_results(body: &str) -> Result<Vec<SearchResult>> {
    let doc: ResultsXml = quick_xml::de::from_str(body).or_raise(|| ErrorKind::Protocol)?;
    Ok(doc
        .results
        .into_iter()
        .filter_map(|result| match (result.component, result.measure) {
            (Some(hit), _) => hit_to_result(RecordKind::Component, hit),
            (None, Some(hit)) => hit_to_result(RecordKind::Measure, hit),
            (None, None) => None,
        })
        .collect())
}

/// Whether a response body is well-formed XML at all. Used for auth-key
/// validation, where the registry answers a bad key with an HTML error page.
pub(crate) fn is_well_formed(body: &str) -> bool {
    let mut reader = quick_xml::Reader::from_str(body);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Eof) => return true,
            Ok(_) => {},
            Err(_) => return false,
        }
    }
}

fn hit_to_result(kind: RecordKind, hit: HitXml) -> Option<SearchResult> {
    let (Some(uid), Some(version_id)) = (hit.uid, hit.version_id) else {
        debug!("dropping search hit without uid/version_id");
        return None;
    };
    Some(SearchResult {
        kind,
        uid,
        version_id,
        name: hit.name.unwrap_or_default(),
        description: hit.description.unwrap_or_default(),
        org: hit.org.filter(|s| !s.is_empty()),
        repo: hit.repo.filter(|s| !s.is_empty()),
        release_tag: hit.release_tag.filter(|s| !s.is_empty()),
        last_modified: hit.date_modified.and_then(|ts| UtcDateTime::from_unix_timestamp(ts).ok()),
        tags: hit.tags.items,
        attributes: hit
            .attributes
            .items
            .into_iter()
            .filter_map(|attr| {
                let name = attr.name.filter(|n| !n.is_empty())?;
                let tag = attr.datatype.unwrap_or_else(|| "string".to_string());
                // Attributes the sum type can't represent are dropped from
                // the transient hit, not errors.
                let value = AttributeValue::from_tagged(&attr.value.unwrap_or_default(), &tag).ok()?;
                Some(Attribute { name, value, units: attr.units.filter(|u| !u.is_empty()) })
            })
            .collect(),
        files: hit
            .files
            .items
            .into_iter()
            .filter_map(|file| {
                Some(FileReference {
                    filename: file.filename.filter(|f| !f.is_empty())?,
                    filetype: file.filetype.unwrap_or_default(),
                    usage_type: file.usage_type.filter(|u| !u.is_empty()),
                    checksum: file.checksum.filter(|c| !c.is_empty()),
                })
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const META_XML: &str = r#"<?xml version="1.0"?>
<metasearch>
  <result_count>42</result_count>
  <facets>
    <facet>
      <field>sm_vid_Component_Tags</field>
      <label>Component Tags</label>
      <facet_value><name>Constructions</name><count>30</count></facet_value>
      <facet_value><name>Materials</name><count>12</count></facet_value>
    </facet>
  </facets>
  <taxonomy_terms>
    <term><name>Envelope</name><count>25</count></term>
  </taxonomy_terms>
</metasearch>"#;

    const SEARCH_XML: &str = r#"<?xml version="1.0"?>
<results>
  <result>
    <component>
      <uid>8f3e5c0a</uid>
      <version_id>c0e4a1d5</version_id>
      <name>Exterior Wall</name>
      <description>A wall.</description>
      <org>NREL</org>
      <repo>components</repo>
      <release_tag>v1.0</release_tag>
      <date_modified>1700000000</date_modified>
      <tags><tag>Constructions</tag></tags>
      <attributes>
        <attribute><name>Function</name><value>Envelope</value><datatype>string</datatype></attribute>
      </attributes>
      <files>
        <file><filename>wall.osc</filename><filetype>osc</filetype><checksum>AB12</checksum></file>
      </files>
    </component>
  </result>
  <result>
    <measure>
      <uid>a14c2f80</uid>
      <version_id>d85f1a37</version_id>
      <name>Set WWR</name>
      <description>Sets the ratio.</description>
    </measure>
  </result>
  <result>
    <component>
      <name>No identity, dropped</name>
    </component>
  </result>
</results>"#;

    #[test]
    fn test_meta_search_counts_and_facets() {
        let meta = meta_search(META_XML).unwrap();
        assert_eq!(meta.result_count, 42);
        assert_eq!(meta.facets.len(), 1);
        assert_eq!(meta.facets[0].values, vec![("Constructions".to_string(), 30), ("Materials".to_string(), 12)]);
        assert_eq!(meta.taxonomy_terms, vec![TaxonomyTerm { name: "Envelope".to_string(), count: 25 }]);
    }

    #[test]
    fn test_meta_search_empty_result() {
        let meta = meta_search("<metasearch><result_count>0</result_count></metasearch>").unwrap();
        assert_eq!(meta.result_count, 0);
        assert!(meta.facets.is_empty());
    }

    #[test]
    fn test_search_results_both_kinds() {
        let hits = search_results(SEARCH_XML).unwrap();
        // The identity-less third hit is dropped.
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].kind, RecordKind::Component);
        assert_eq!(hits[0].uid, "8f3e5c0a");
        assert_eq!(hits[0].last_modified.unwrap().unix_timestamp(), 1_700_000_000);
        assert_eq!(hits[0].tags, vec!["Constructions".to_string()]);
        assert_eq!(hits[0].files[0].checksum.as_deref(), Some("AB12"));
        assert_eq!(hits[1].kind, RecordKind::Measure);
        assert!(hits[1].last_modified.is_none());
    }

    #[test]
    fn test_malformed_body_is_a_protocol_error() {
        assert!(meta_search("<html>maintenance page</html").is_err());
        assert!(search_results("not xml").is_err());
    }

    #[test]
    fn test_well_formedness_probe() {
        assert!(is_well_formed(SEARCH_XML));
        assert!(is_well_formed("<results/>"));
        assert!(!is_well_formed("<results><result></results>"));
    }
}

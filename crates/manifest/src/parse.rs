//! Manifest document parsing.
//!
//! The wire shape of `component.xml`/`measure.xml` is described by serde
//! proxy structs, deserialized with `quick-xml`, and then converted into the
//! crate's domain models. Keeping the proxies private means schema quirks
//! (wrapper elements, legacy datatype spellings, optional-everything) stay
//! contained here.

use crate::error::{ErrorKind, Result};
use crate::models::attribute::{Attribute, AttributeValue};
use crate::models::file::FileReference;
use crate::models::manifest::Manifest;
use crate::models::record::RecordKind;
use exn::ResultExt;
use serde::Deserialize;
use time::UtcDateTime;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ComponentXml {
    uid: Option<String>,
    version_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    version_modified: Option<String>,
    #[serde(default)]
    attributes: AttributeListXml,
    #[serde(default)]
    files: FileListXml,
}

#[derive(Debug, Deserialize)]
struct MeasureXml {
    uid: Option<String>,
    version_id: Option<String>,
    name: Option<String>,
    /// Human-readable name; preferred over the class-derived `name`.
    display_name: Option<String>,
    description: Option<String>,
    modeler_description: Option<String>,
    version_modified: Option<String>,
    #[serde(default)]
    attributes: AttributeListXml,
    #[serde(default)]
    files: FileListXml,
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

/// Reject absent *and* empty values: an installed record with a blank uid or
/// version id would own the directory `root//…`.
fn required(value: Option<String>, field: &'static str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => exn::bail!(ErrorKind::MissingField(field)),
    }
}

/// `version_modified` is RFC 3339 in well-formed manifests. It only decides
/// which measure revision a versionless lookup resolves to, so an absent or
/// mangled value degrades to "unreported" rather than rejecting the whole
/// manifest.
fn version_modified(value: Option<String>) -> Option<UtcDateTime> {
    let text = value.filter(|v| !v.trim().is_empty())?;
    match time::OffsetDateTime::parse(&text, &time::format_description::well_known::Rfc3339) {
        Ok(parsed) => Some(parsed.to_utc()),
        Err(_) => {
            debug!(value = text, "unparseable version_modified timestamp, treating as unreported");
            None
        },
    }
}

fn attributes(list: AttributeListXml) -> Result<Vec<Attribute>> {
    list.items
        .into_iter()
        .filter_map(|attr| {
            // Nameless attributes can't participate in attribute search;
            // drop them instead of failing the whole manifest.
            let Some(name) = attr.name.filter(|n| !n.is_empty()) else {
                debug!("dropping manifest attribute without a name");
                return None;
            };
            let text = attr.value.unwrap_or_default();
            let tag = attr.datatype.unwrap_or_else(|| "string".to_string());
            Some(AttributeValue::from_tagged(&text, &tag).map(|value| Attribute {
                name,
                value,
                units: attr.units.filter(|u| !u.is_empty()),
            }))
        })
        .collect()
}

fn files(list: FileListXml) -> Vec<FileReference> {
    list.items
        .into_iter()
        .filter_map(|file| {
            let filename = file.filename.filter(|f| !f.is_empty())?;
            Some(FileReference {
                filename,
                filetype: file.filetype.unwrap_or_default(),
                usage_type: file.usage_type.filter(|u| !u.is_empty()),
                checksum: file.checksum.filter(|c| !c.is_empty()),
            })
        })
        .collect()
}

pub(crate) fn component(xml: &str) -> Result<Manifest> {
    let doc: ComponentXml = quick_xml::de::from_str(xml).or_raise(|| ErrorKind::Xml)?;
    Ok(Manifest {
        kind: RecordKind::Component,
        uid: required(doc.uid, "uid")?,
        version_id: required(doc.version_id, "version_id")?,
        name: doc.name.unwrap_or_default(),
        description: doc.description.unwrap_or_default(),
        modeler_description: None,
        version_modified: version_modified(doc.version_modified),
        files: files(doc.files),
        attributes: attributes(doc.attributes)?,
    })
}

pub(crate) fn measure(xml: &str) -> Result<Manifest> {
    let doc: MeasureXml = quick_xml::de::from_str(xml).or_raise(|| ErrorKind::Xml)?;
    Ok(Manifest {
        kind: RecordKind::Measure,
        uid: required(doc.uid, "uid")?,
        version_id: required(doc.version_id, "version_id")?,
        name: doc.display_name.or(doc.name).unwrap_or_default(),
        description: doc.description.unwrap_or_default(),
        modeler_description: doc.modeler_description.filter(|d| !d.is_empty()),
        version_modified: version_modified(doc.version_modified),
        files: files(doc.files),
        attributes: attributes(doc.attributes)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::RecordKind;

    const COMPONENT_XML: &str = r#"<?xml version="1.0"?>
<component>
  <schema_version>2.0</schema_version>
  <name>Exterior Wall - Wood Frame</name>
  <uid>8f3e5c0a-76e8-4e0f-a6e4-b21ef62ad433</uid>
  <version_id>c0e4a1d5-9b4f-4a8e-8f3b-2a5d7c1e9f60</version_id>
  <description>A typical 2x6 wood framed exterior wall assembly.</description>
  <attributes>
    <attribute>
      <name>Assembly U-Factor</name>
      <value>0.27</value>
      <datatype>float</datatype>
      <units>W/m^2*K</units>
    </attribute>
    <attribute>
      <name>Construction Standard</name>
      <value>ASHRAE 90.1-2010</value>
      <datatype>string</datatype>
    </attribute>
  </attributes>
  <files>
    <file>
      <version>
        <software_program>OpenStudio</software_program>
        <identifier>1.0.0</identifier>
      </version>
      <filename>exterior_wall.osc</filename>
      <filetype>osc</filetype>
      <checksum>3B2E45A1</checksum>
    </file>
  </files>
</component>"#;

    const MEASURE_XML: &str = r#"<?xml version="1.0"?>
<measure>
  <schema_version>3.0</schema_version>
  <name>set_window_to_wall_ratio</name>
  <uid>a14c2f80-0d11-4c5a-91d3-7a2e5b6f8d91</uid>
  <version_id>d85f1a37-6b02-4b43-9d5c-0f7e3a9c2b14</version_id>
  <display_name>Set Window to Wall Ratio</display_name>
  <description>Sets the window to wall ratio for all exterior walls.</description>
  <modeler_description>Removes existing fenestration before applying the ratio.</modeler_description>
  <version_modified>2023-11-14T22:13:20Z</version_modified>
  <attributes>
    <attribute>
      <name>Measure Function</name>
      <value>Measure</value>
      <datatype>string</datatype>
    </attribute>
    <attribute>
      <name>Uses SketchUp API</name>
      <value>false</value>
      <datatype>boolean</datatype>
    </attribute>
  </attributes>
  <files>
    <file>
      <filename>measure.rb</filename>
      <filetype>rb</filetype>
      <usage_type>script</usage_type>
      <checksum>00A1B2C3</checksum>
    </file>
    <file>
      <filename>tests/set_window_to_wall_ratio_test.rb</filename>
      <filetype>rb</filetype>
      <usage_type>test</usage_type>
      <checksum>D4E5F607</checksum>
    </file>
  </files>
</measure>"#;

    #[test]
    fn test_parse_component() {
        let manifest = Manifest::parse(RecordKind::Component, COMPONENT_XML).unwrap();
        assert_eq!(manifest.kind, RecordKind::Component);
        assert_eq!(manifest.uid, "8f3e5c0a-76e8-4e0f-a6e4-b21ef62ad433");
        assert_eq!(manifest.version_id, "c0e4a1d5-9b4f-4a8e-8f3b-2a5d7c1e9f60");
        assert_eq!(manifest.name, "Exterior Wall - Wood Frame");
        assert!(manifest.modeler_description.is_none());
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].filename, "exterior_wall.osc");
        assert_eq!(manifest.files[0].checksum.as_deref(), Some("3B2E45A1"));
        assert_eq!(manifest.attributes.len(), 2);
        assert_eq!(manifest.attributes[0].value, AttributeValue::Float(0.27));
        assert_eq!(manifest.attributes[0].units.as_deref(), Some("W/m^2*K"));
        assert!(manifest.attributes[1].units.is_none());
    }

    #[test]
    fn test_parse_measure() {
        let manifest = Manifest::parse(RecordKind::Measure, MEASURE_XML).unwrap();
        assert_eq!(manifest.kind, RecordKind::Measure);
        // display_name wins over the class-derived name element.
        assert_eq!(manifest.name, "Set Window to Wall Ratio");
        assert_eq!(
            manifest.modeler_description.as_deref(),
            Some("Removes existing fenestration before applying the ratio.")
        );
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[1].usage_type.as_deref(), Some("test"));
        assert_eq!(manifest.attributes[1].value, AttributeValue::Bool(false));
        assert_eq!(manifest.version_modified.unwrap().unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_version_modified_falls_back_to_unreported() {
        // Absent entirely.
        let manifest = Manifest::parse(RecordKind::Component, COMPONENT_XML).unwrap();
        assert!(manifest.version_modified.is_none());

        // Present but mangled: the manifest still parses.
        let xml = r#"<measure>
            <uid>u</uid>
            <version_id>v</version_id>
            <version_modified>last Tuesday</version_modified>
        </measure>"#;
        let manifest = Manifest::parse(RecordKind::Measure, xml).unwrap();
        assert!(manifest.version_modified.is_none());
    }

    #[test]
    fn test_record_prefers_manifest_modification_date() {
        use time::UtcDateTime;
        let manifest = Manifest::parse(RecordKind::Measure, MEASURE_XML).unwrap();
        let now = UtcDateTime::from_unix_timestamp(1_800_000_000).unwrap();
        let record = manifest.record(now);
        assert_eq!(record.date_added, now);
        assert_eq!(record.date_modified.unix_timestamp(), 1_700_000_000);

        // Without a reported date, install time is all there is.
        let manifest = Manifest::parse(RecordKind::Component, COMPONENT_XML).unwrap();
        assert_eq!(manifest.record(now).date_modified, now);
    }

    #[test]
    fn test_missing_uid_is_rejected() {
        let xml = "<component><version_id>v</version_id><name>n</name></component>";
        let err = Manifest::parse(RecordKind::Component, xml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingField("uid")));
    }

    #[test]
    fn test_empty_version_id_is_rejected() {
        let xml = "<component><uid>u</uid><version_id>  </version_id></component>";
        let err = Manifest::parse(RecordKind::Component, xml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingField("version_id")));
    }

    #[test]
    fn test_not_xml_at_all() {
        assert!(Manifest::parse(RecordKind::Component, "this is not xml").is_err());
    }
}

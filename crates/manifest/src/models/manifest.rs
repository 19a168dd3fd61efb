use crate::error::Result;
use crate::models::attribute::Attribute;
use crate::models::file::FileReference;
use crate::models::record::{Record, RecordKind};
use crate::parse;
use time::UtcDateTime;

/// A parsed `component.xml` or `measure.xml` document.
///
/// This is the install-time view of an artifact: identity, display metadata,
/// declared payload files, and searchable attributes. The only date a
/// manifest carries is `version_modified`; `date_added` is stamped by the
/// store at install time.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub kind: RecordKind,
    pub uid: String,
    pub version_id: String,
    pub name: String,
    pub description: String,
    /// Measure-only; `None` for components.
    pub modeler_description: Option<String>,
    /// When this revision was last modified, as reported by the manifest
    /// itself. Versionless measure lookups resolve by this timestamp, so it
    /// must survive installation regardless of install order.
    pub version_modified: Option<UtcDateTime>,
    pub files: Vec<FileReference>,
    pub attributes: Vec<Attribute>,
}

impl Manifest {
    /// Parse a manifest document of the given kind.
    ///
    /// Returns [`MissingField`](crate::error::ErrorKind::MissingField) when
    /// the uid or version id is absent or empty — such a manifest must not
    /// be installed (the natural key would be meaningless).
    pub fn parse(kind: RecordKind, xml: &str) -> Result<Self> {
        match kind {
            RecordKind::Component => parse::component(xml),
            RecordKind::Measure => parse::measure(xml),
        }
    }

    /// Build the persistent record for this manifest. `date_added` is
    /// stamped with `now`; `date_modified` comes from the manifest's own
    /// `version_modified`, falling back to `now` only when the manifest
    /// doesn't report one. Install order must never decide which revision
    /// counts as most recently modified.
    pub fn record(&self, now: UtcDateTime) -> Record {
        Record {
            kind: self.kind,
            uid: self.uid.clone(),
            version_id: self.version_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            modeler_description: self.modeler_description.clone(),
            date_added: now,
            date_modified: self.version_modified.unwrap_or(now),
        }
    }
}

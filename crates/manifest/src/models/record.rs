use crate::error::{ErrorKind, Result};
use std::fmt;
use std::str::FromStr;
use time::UtcDateTime;

/// The two artifact families distributed through the registry.
///
/// The kind decides which table a record lives in, which manifest filename
/// identifies it inside a downloaded archive, and which version is returned
/// when a lookup omits the version id (see [`Record`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Component,
    Measure,
}

impl RecordKind {
    /// Manifest filename that marks an artifact of this kind inside an archive.
    pub fn manifest_filename(&self) -> &'static str {
        match self {
            Self::Component => "component.xml",
            Self::Measure => "measure.xml",
        }
    }

    /// Remote search bundle name (`fq[]=bundle:…`) for this kind.
    pub fn bundle(&self) -> &'static str {
        match self {
            Self::Component => "nrel_component",
            Self::Measure => "nrel_measure",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component => write!(f, "component"),
            Self::Measure => write!(f, "measure"),
        }
    }
}

impl FromStr for RecordKind {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "component" => Ok(Self::Component),
            "measure" => Ok(Self::Measure),
            _ => exn::bail!(ErrorKind::InvalidData("record kind")),
        }
    }
}

/// A stored component or measure.
///
/// `(uid, version_id)` is the natural key: it uniquely identifies both the
/// database rows and the on-disk directory `root/uid/version_id/` that holds
/// the manifest plus payload files. A uid alone identifies the artifact
/// across revisions; each revision gets a fresh version id.
///
/// The uid and version id never change for a given revision. Everything else
/// (name, description, attributes, files) may differ between revisions, so
/// each revision is tracked as its own record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    /// Stable identity across revisions (UUID string).
    pub uid: String,
    /// Identity of this specific revision (UUID string).
    pub version_id: String,
    pub name: String,
    pub description: String,
    /// Measure-only free text aimed at energy modelers; always `None` for
    /// components.
    pub modeler_description: Option<String>,
    pub date_added: UtcDateTime,
    pub date_modified: UtcDateTime,
}

impl Record {
    /// Relative directory this record exclusively owns under the library root.
    pub fn relative_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.uid).join(&self.version_id)
    }
}

impl AsRef<Record> for Record {
    fn as_ref(&self) -> &Record {
        self
    }
}

/// Metadata for a single payload file declared by a manifest.
///
/// This is a mirror of a file physically present under the record's
/// directory, not the file itself. The checksum is whatever the manifest
/// declared; it is stored verbatim and never verified against payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    /// Filename relative to the record's directory.
    pub filename: String,
    /// Declared file type (e.g. `osm`, `idf`, `rb`).
    pub filetype: String,
    /// What the file is for (e.g. `script`, `test`), when declared.
    pub usage_type: Option<String>,
    /// Manifest-declared checksum, when present.
    pub checksum: Option<String>,
}

impl FileReference {
    pub fn new(filename: impl Into<String>, filetype: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            filetype: filetype.into(),
            usage_type: None,
            checksum: None,
        }
    }

    pub fn with_usage_type(mut self, usage_type: impl Into<String>) -> Self {
        self.usage_type = Some(usage_type.into());
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

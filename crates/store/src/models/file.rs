use bcl_manifest::FileReference;

/// Row shape of the `files` table: the metadata mirror of one payload file
/// under `root/uid/version_id/`.
#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    #[allow(dead_code, reason = "decoded for completeness; identity comes from the query")]
    pub(crate) uid: String,
    #[allow(dead_code, reason = "decoded for completeness; identity comes from the query")]
    pub(crate) version_id: String,
    pub(crate) filename: String,
    pub(crate) filetype: String,
    pub(crate) usage_type: Option<String>,
    pub(crate) checksum: Option<String>,
}

impl FileRow {
    pub(crate) fn new(uid: &str, version_id: &str, file: &FileReference) -> Self {
        Self {
            uid: uid.to_string(),
            version_id: version_id.to_string(),
            filename: file.filename.clone(),
            filetype: file.filetype.clone(),
            usage_type: file.usage_type.clone(),
            checksum: file.checksum.clone(),
        }
    }
}

impl From<FileRow> for FileReference {
    fn from(row: FileRow) -> Self {
        Self {
            filename: row.filename,
            filetype: row.filetype,
            usage_type: row.usage_type,
            checksum: row.checksum,
        }
    }
}

use crate::error::{Error, ErrorKind, Result};
use bcl_manifest::{Record, RecordKind};
use exn::ResultExt;
use time::UtcDateTime;

/// Row shape shared by the `components` and `measures` tables.
///
/// The component table has no `modeler_description` column; `#[sqlx(default)]`
/// lets the same row struct decode both tables.
#[derive(sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub(crate) uid: String,
    pub(crate) version_id: String,
    pub(crate) name: String,
    pub(crate) description: String,
    #[sqlx(default)]
    pub(crate) modeler_description: Option<String>,
    pub(crate) date_added: i64,
    pub(crate) date_modified: i64,
}

impl RecordRow {
    /// The kind isn't stored in the row (it's implied by the table), so the
    /// caller supplies it.
    pub(crate) fn into_record(self, kind: RecordKind) -> Result<Record> {
        Ok(Record {
            kind,
            uid: self.uid,
            version_id: self.version_id,
            name: self.name,
            description: self.description,
            modeler_description: match kind {
                RecordKind::Component => None,
                RecordKind::Measure => self.modeler_description,
            },
            date_added: UtcDateTime::from_unix_timestamp(self.date_added)
                .or_raise(|| ErrorKind::InvalidData("date added"))?,
            date_modified: UtcDateTime::from_unix_timestamp(self.date_modified)
                .or_raise(|| ErrorKind::InvalidData("date modified"))?,
        })
    }
}

impl TryFrom<&Record> for RecordRow {
    type Error = Error;
    fn try_from(record: &Record) -> Result<Self> {
        Ok(Self {
            uid: record.uid.clone(),
            version_id: record.version_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            modeler_description: record.modeler_description.clone(),
            date_added: record.date_added.unix_timestamp(),
            date_modified: record.date_modified.unix_timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_record_and_back() {
        let row = RecordRow {
            uid: "8f3e5c0a".to_string(),
            version_id: "c0e4a1d5".to_string(),
            name: "Exterior Wall".to_string(),
            description: "A wall".to_string(),
            modeler_description: Some("ignored for components".to_string()),
            date_added: 1_700_000_000,
            date_modified: 1_700_000_100,
        };
        let record = row.into_record(RecordKind::Component).unwrap();
        // Components never expose a modeler description, whatever the row says.
        assert!(record.modeler_description.is_none());
        let row = RecordRow::try_from(&record).unwrap();
        assert_eq!(row.date_modified, 1_700_000_100);
    }

    #[test]
    fn test_measure_keeps_modeler_description() {
        let row = RecordRow {
            uid: "a14c2f80".to_string(),
            version_id: "d85f1a37".to_string(),
            name: "Set WWR".to_string(),
            description: String::new(),
            modeler_description: Some("Removes fenestration first.".to_string()),
            date_added: 0,
            date_modified: 0,
        };
        let record = row.into_record(RecordKind::Measure).unwrap();
        assert_eq!(record.modeler_description.as_deref(), Some("Removes fenestration first."));
    }
}

use crate::error::{Error, ErrorKind, Result};
use bcl_manifest::{Attribute, AttributeValue};
use exn::ResultExt;

/// Row shape of the `attributes` table.
///
/// The in-memory [`AttributeValue`] sum type degrades to `(value, type)`
/// text columns here and is reconstructed on the way out.
#[derive(sqlx::FromRow)]
pub(crate) struct AttributeRow {
    #[allow(dead_code, reason = "decoded for completeness; identity comes from the query")]
    pub(crate) uid: String,
    #[allow(dead_code, reason = "decoded for completeness; identity comes from the query")]
    pub(crate) version_id: String,
    pub(crate) name: String,
    pub(crate) value: String,
    pub(crate) units: Option<String>,
    #[sqlx(rename = "type")]
    pub(crate) type_tag: String,
}

impl AttributeRow {
    pub(crate) fn new(uid: &str, version_id: &str, attribute: &Attribute) -> Self {
        Self {
            uid: uid.to_string(),
            version_id: version_id.to_string(),
            name: attribute.name.clone(),
            value: attribute.value.to_text(),
            units: attribute.units.clone(),
            type_tag: attribute.value.type_tag().to_string(),
        }
    }
}

impl TryFrom<AttributeRow> for Attribute {
    type Error = Error;
    fn try_from(row: AttributeRow) -> Result<Self> {
        let value = AttributeValue::from_tagged(&row.value, &row.type_tag)
            .or_raise(|| ErrorKind::InvalidData("attribute value"))?;
        Ok(Self { name: row.name, value, units: row.units })
    }
}

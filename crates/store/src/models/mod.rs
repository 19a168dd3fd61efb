mod attribute;
mod file;
mod record;

pub(crate) use self::attribute::AttributeRow;
pub(crate) use self::file::FileRow;
pub(crate) use self::record::RecordRow;

pub mod attribute;
pub mod environment;
pub mod file;
pub mod manifest;
pub mod record;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;

/// A typed attribute value.
///
/// Manifests and the remote registry describe attribute values as a string
/// plus a datatype tag. In memory we keep a real sum type and only serialize
/// back to `(text, type-tag)` at the persistence boundary, so exhaustive
/// matching works everywhere in between.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Canonical type tag used in the `attributes` table and in manifests.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
        }
    }

    /// Serialize the value to its textual form for persistence.
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Reconstruct a value from its `(text, type-tag)` persisted form.
    ///
    /// Accepts the tag spellings found in the wild (`boolean`, `integer`,
    /// `double`) in addition to the canonical ones; everything unknown is
    /// treated as a data error rather than silently coerced to text.
    pub fn from_tagged(text: &str, tag: &str) -> Result<Self> {
        match tag {
            "bool" | "boolean" => {
                text.parse::<bool>().map(Self::Bool).or_raise(|| ErrorKind::InvalidData("bool attribute"))
            },
            "int" | "integer" => {
                text.parse::<i64>().map(Self::Int).or_raise(|| ErrorKind::InvalidData("int attribute"))
            },
            "float" | "double" => {
                text.parse::<f64>().map(Self::Float).or_raise(|| ErrorKind::InvalidData("float attribute"))
            },
            "string" => Ok(Self::Text(text.to_string())),
            _ => exn::bail!(ErrorKind::InvalidData("attribute type tag")),
        }
    }
}

/// A named, optionally unit-qualified attribute of a component or measure.
///
/// Attributes are the substrate of faceted search: "Assembly U-Factor =
/// 0.27 W/m²·K", "Measure Function = Envelope", and so on.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
    pub units: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: AttributeValue, units: Option<String>) -> Self {
        Self { name: name.into(), value, units }
    }
}

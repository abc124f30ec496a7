//! Column type tags. Pure data.
//!
//! Blocks carry no declared schema; the type of a plan's output is the
//! sequence of tags produced by static inference over the planner graph.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Integer,
    Float,
    String,
    Bytes,
    List,
    Dict,
    DateTime,
    Undefined,
    Image,
}

impl TypeTag {
    pub const ALL: [TypeTag; 9] = [
        TypeTag::Integer,
        TypeTag::Float,
        TypeTag::String,
        TypeTag::Bytes,
        TypeTag::List,
        TypeTag::Dict,
        TypeTag::DateTime,
        TypeTag::Undefined,
        TypeTag::Image,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::String => "string",
            TypeTag::Bytes => "bytes",
            TypeTag::List => "list",
            TypeTag::Dict => "dict",
            TypeTag::DateTime => "datetime",
            TypeTag::Undefined => "undefined",
            TypeTag::Image => "image",
        }
    }

    /// Parse a tag from its lowercase name (also accepts a few aliases).
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "int" | "i64" => return Some(TypeTag::Integer),
            "double" | "f64" => return Some(TypeTag::Float),
            "str" | "utf8" => return Some(TypeTag::String),
            "null" | "none" => return Some(TypeTag::Undefined),
            _ => {}
        }
        Self::ALL.iter().copied().find(|t| t.name() == lower)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, TypeTag::Integer | TypeTag::Float)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render a type sequence as `[integer,string]`.
pub fn format_types(types: &[TypeTag]) -> String {
    let names: Vec<&str> = types.iter().map(|t| t.name()).collect();
    format!("[{}]", names.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names_and_aliases() {
        for tag in TypeTag::ALL {
            assert_eq!(TypeTag::parse(tag.name()), Some(tag));
        }
        assert_eq!(TypeTag::parse("Utf8"), Some(TypeTag::String));
        assert_eq!(TypeTag::parse("int"), Some(TypeTag::Integer));
        assert_eq!(TypeTag::parse("decimal"), None);
    }

    #[test]
    fn format_sequence() {
        assert_eq!(
            format_types(&[TypeTag::Integer, TypeTag::String]),
            "[integer,string]"
        );
    }
}

//! Placeholder and data-type token parsing
//!
//! A placeholder marks an attribute whose value legitimately differs from
//! file to file. Only its type is fixed by the definition:
//!
//! ```text
//! <float32: derived_from_file>
//! <Array[int32]: derived_from_file optional>
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// The fixed set of scalar kinds an attribute or variable may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    Str,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Byte,
    Char,
}

impl BaseType {
    pub const ALL: [BaseType; 9] = [
        BaseType::Str,
        BaseType::Int8,
        BaseType::Int16,
        BaseType::Int32,
        BaseType::Int64,
        BaseType::Float32,
        BaseType::Float64,
        BaseType::Byte,
        BaseType::Char,
    ];

    /// Token used in definitions and artifacts (e.g. `float32`)
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseType::Str => "str",
            BaseType::Int8 => "int8",
            BaseType::Int16 => "int16",
            BaseType::Int32 => "int32",
            BaseType::Int64 => "int64",
            BaseType::Float32 => "float32",
            BaseType::Float64 => "float64",
            BaseType::Byte => "byte",
            BaseType::Char => "char",
        }
    }

    /// Look up a bare token. Case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == token)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            BaseType::Int8 | BaseType::Int16 | BaseType::Int32 | BaseType::Int64 | BaseType::Byte
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, BaseType::Float32 | BaseType::Float64)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, BaseType::Str | BaseType::Char)
    }

    /// JSON Schema primitive type for values of this kind
    pub fn json_type(&self) -> &'static str {
        if self.is_text() {
            "string"
        } else if self.is_integer() {
            "integer"
        } else {
            "number"
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseType {
    type Err = PlaceholderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_data_type(s)
    }
}

/// Typed constraint parsed from a placeholder token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    pub base_type: BaseType,
    pub is_array: bool,
    pub required: bool,
    pub derived_from_file: bool,
}

impl Placeholder {
    pub fn new(base_type: BaseType, is_array: bool, required: bool) -> Self {
        Self {
            base_type,
            is_array,
            required,
            derived_from_file: true,
        }
    }

    /// Canonical token for this placeholder
    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            write!(f, "<Array[{}]: derived_from_file", self.base_type)?;
        } else {
            write!(f, "<{}: derived_from_file", self.base_type)?;
        }
        if !self.required {
            f.write_str(" optional")?;
        }
        f.write_str(">")
    }
}

/// Why a token could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
    #[error("expected a token of the form <TYPE: derived_from_file>")]
    NotDelimited,

    #[error("unknown base type '{0}'")]
    UnknownBaseType(String),

    #[error("malformed brackets in '{0}'")]
    MalformedBrackets(String),

    #[error("missing 'derived_from_file' marker")]
    MissingMarker,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
}

/// True when a string should be handed to [`parse_placeholder`] rather than
/// treated as a literal.
pub fn is_placeholder_shaped(value: &str) -> bool {
    value.len() >= 2 && value.starts_with('<') && value.ends_with('>')
}

fn type_part_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:Array\[(?P<inner>[^\[\]]*)\]|(?P<plain>[^\[\]]*))$")
            .expect("type part regex is valid")
    })
}

/// Parse `<[Array[]]BASETYPE: derived_from_file [optional]>`.
///
/// Nothing is returned unless the whole token is valid.
pub fn parse_placeholder(token: &str) -> Result<Placeholder, PlaceholderError> {
    let inner = token
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .ok_or(PlaceholderError::NotDelimited)?;

    let (type_part, rest) = inner
        .split_once(':')
        .ok_or(PlaceholderError::MissingMarker)?;
    let type_part = type_part.trim();

    let caps = type_part_regex()
        .captures(type_part)
        .ok_or_else(|| PlaceholderError::MalformedBrackets(type_part.to_string()))?;

    let (name, is_array) = match (caps.name("inner"), caps.name("plain")) {
        (Some(m), _) => (m.as_str(), true),
        (None, Some(m)) => (m.as_str(), false),
        (None, None) => return Err(PlaceholderError::MalformedBrackets(type_part.to_string())),
    };

    let base_type = BaseType::from_token(name)
        .ok_or_else(|| PlaceholderError::UnknownBaseType(name.to_string()))?;

    let mut words = rest.split_whitespace();
    if words.next() != Some("derived_from_file") {
        return Err(PlaceholderError::MissingMarker);
    }

    let required = match words.next() {
        None => true,
        Some("optional") => false,
        Some(other) => return Err(PlaceholderError::UnexpectedToken(other.to_string())),
    };

    if let Some(extra) = words.next() {
        return Err(PlaceholderError::UnexpectedToken(extra.to_string()));
    }

    Ok(Placeholder::new(base_type, is_array, required))
}

/// Parse a variable data type, accepting both `float32` and `<float32>`.
pub fn parse_data_type(token: &str) -> Result<BaseType, PlaceholderError> {
    let trimmed = token.trim();
    let bare = trimmed
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(trimmed);

    BaseType::from_token(bare).ok_or_else(|| PlaceholderError::UnknownBaseType(bare.to_string()))
}

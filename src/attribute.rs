//! Attribute constraints and typed attribute values
//!
//! [`AttributeConstraint`] is what a definition says about an attribute;
//! [`AttrValue`] is what a file actually carries.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::placeholder::{BaseType, Placeholder};

/// A fixed value from a definition.
///
/// Literals keep the type family they were written with: a YAML string, an
/// integer, a float, or a flat list of those. Text never equals a number.
/// An integer literal also equals a float value holding the same number, so
/// `valid_range: [0, 2.5]` describes a float attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
}

impl Literal {
    /// Exact comparison against a value read from a file.
    pub fn matches(&self, actual: &AttrValue) -> bool {
        match (self, actual) {
            (Literal::List(items), AttrValue::Scalar(s)) => {
                items.len() == 1 && items[0].matches_scalar(s)
            }
            (Literal::List(items), AttrValue::Array(_, values)) => {
                items.len() == values.len()
                    && items.iter().zip(values).all(|(l, v)| l.matches_scalar(v))
            }
            (literal, AttrValue::Scalar(s)) => literal.matches_scalar(s),
            (_, AttrValue::Array(_, values)) => {
                values.len() == 1 && self.matches_scalar(&values[0])
            }
        }
    }

    fn matches_scalar(&self, actual: &Scalar) -> bool {
        match self {
            Literal::Str(expected) => actual.as_text() == Some(expected.as_str()),
            Literal::Int(expected) => match actual {
                Scalar::Float32(v) => f64::from(*v) == *expected as f64,
                Scalar::Float64(v) => *v == *expected as f64,
                other => other.as_i64() == Some(*expected),
            },
            Literal::Float(expected) => match actual {
                Scalar::Float32(v) => *v == *expected as f32,
                Scalar::Float64(v) => v == expected,
                _ => false,
            },
            Literal::List(_) => false,
        }
    }

    /// JSON Schema primitive type of this literal
    pub fn json_type(&self) -> &'static str {
        match self {
            Literal::Str(_) => "string",
            Literal::Int(_) => "integer",
            Literal::Float(_) => "number",
            Literal::List(_) => "array",
        }
    }

    /// A file value that satisfies this literal
    pub fn to_value(&self) -> AttrValue {
        match self {
            Literal::List(items) => {
                let all_text = items.iter().all(|i| matches!(i, Literal::Str(_)));
                let all_int = items.iter().all(|i| matches!(i, Literal::Int(_)));
                if all_text {
                    let values = items
                        .iter()
                        .filter_map(|i| match i {
                            Literal::Str(s) => Some(Scalar::Str(s.clone())),
                            _ => None,
                        })
                        .collect();
                    AttrValue::Array(BaseType::Str, values)
                } else if all_int && items.iter().all(|i| matches!(i, Literal::Int(v) if i32::try_from(*v).is_ok())) {
                    let values = items
                        .iter()
                        .filter_map(|i| match i {
                            Literal::Int(v) => i32::try_from(*v).ok().map(Scalar::Int32),
                            _ => None,
                        })
                        .collect();
                    AttrValue::Array(BaseType::Int32, values)
                } else if all_int {
                    let values = items
                        .iter()
                        .filter_map(|i| match i {
                            Literal::Int(v) => Some(Scalar::Int64(*v)),
                            _ => None,
                        })
                        .collect();
                    AttrValue::Array(BaseType::Int64, values)
                } else {
                    let values = items
                        .iter()
                        .filter_map(|i| match i {
                            Literal::Int(v) => Some(Scalar::Float64(*v as f64)),
                            Literal::Float(v) => Some(Scalar::Float64(*v)),
                            _ => None,
                        })
                        .collect();
                    AttrValue::Array(BaseType::Float64, values)
                }
            }
            Literal::Str(s) => AttrValue::Scalar(Scalar::Str(s.clone())),
            Literal::Int(v) => match i32::try_from(*v) {
                Ok(small) => AttrValue::Scalar(Scalar::Int32(small)),
                Err(_) => AttrValue::Scalar(Scalar::Int64(*v)),
            },
            Literal::Float(v) => AttrValue::Scalar(Scalar::Float64(*v)),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => f.write_str(s),
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Literal value or typed placeholder. Exactly one, by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Literal(Literal),
    Placeholder(Placeholder),
}

/// Constraint on a single named attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeConstraint {
    pub name: String,
    pub kind: ConstraintKind,
}

impl AttributeConstraint {
    pub fn literal(name: impl Into<String>, value: Literal) -> Self {
        Self {
            name: name.into(),
            kind: ConstraintKind::Literal(value),
        }
    }

    pub fn placeholder(name: impl Into<String>, placeholder: Placeholder) -> Self {
        Self {
            name: name.into(),
            kind: ConstraintKind::Placeholder(placeholder),
        }
    }

    /// Literals are always required; placeholders say so themselves.
    pub fn is_required(&self) -> bool {
        match &self.kind {
            ConstraintKind::Literal(_) => true,
            ConstraintKind::Placeholder(p) => p.required,
        }
    }

    /// Short reference used in diagnostics
    pub fn describe(&self) -> String {
        match &self.kind {
            ConstraintKind::Literal(l) => l.to_string(),
            ConstraintKind::Placeholder(p) => p.token(),
        }
    }
}

/// A single typed value as stored in a file
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Char(String),
    Byte(i8),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

impl Scalar {
    pub fn base_type(&self) -> BaseType {
        match self {
            Scalar::Str(_) => BaseType::Str,
            Scalar::Char(_) => BaseType::Char,
            Scalar::Byte(_) => BaseType::Byte,
            Scalar::Int8(_) => BaseType::Int8,
            Scalar::Int16(_) => BaseType::Int16,
            Scalar::Int32(_) => BaseType::Int32,
            Scalar::Int64(_) => BaseType::Int64,
            Scalar::Float32(_) => BaseType::Float32,
            Scalar::Float64(_) => BaseType::Float64,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) | Scalar::Char(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Byte(v) | Scalar::Int8(v) => Some(i64::from(*v)),
            Scalar::Int16(v) => Some(i64::from(*v)),
            Scalar::Int32(v) => Some(i64::from(*v)),
            Scalar::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Default value of a given kind, used for synthetic files
    pub fn example(base_type: BaseType) -> Self {
        match base_type {
            BaseType::Str => Scalar::Str("derived_from_file".to_string()),
            BaseType::Char => Scalar::Char("derived_from_file".to_string()),
            BaseType::Byte => Scalar::Byte(0),
            BaseType::Int8 => Scalar::Int8(0),
            BaseType::Int16 => Scalar::Int16(0),
            BaseType::Int32 => Scalar::Int32(0),
            BaseType::Int64 => Scalar::Int64(0),
            BaseType::Float32 => Scalar::Float32(0.0),
            BaseType::Float64 => Scalar::Float64(0.0),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Scalar::Str(s) | Scalar::Char(s) => Value::String(s.clone()),
            Scalar::Byte(v) | Scalar::Int8(v) => Value::from(*v),
            Scalar::Int16(v) => Value::from(*v),
            Scalar::Int32(v) => Value::from(*v),
            Scalar::Int64(v) => Value::from(*v),
            Scalar::Float32(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::Float64(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }

    fn from_json(base_type: BaseType, value: &serde_json::Value) -> Result<Self, String> {
        fn int<T: TryFrom<i64>>(value: &serde_json::Value) -> Option<T> {
            value.as_i64().and_then(|v| T::try_from(v).ok())
        }
        // NaN fill values are written as null
        fn float(value: &serde_json::Value) -> Option<f64> {
            if value.is_null() {
                Some(f64::NAN)
            } else {
                value.as_f64()
            }
        }

        let scalar = match base_type {
            BaseType::Str => value.as_str().map(|s| Scalar::Str(s.to_string())),
            BaseType::Char => value.as_str().map(|s| Scalar::Char(s.to_string())),
            BaseType::Byte => int(value).map(Scalar::Byte),
            BaseType::Int8 => int(value).map(Scalar::Int8),
            BaseType::Int16 => int(value).map(Scalar::Int16),
            BaseType::Int32 => int(value).map(Scalar::Int32),
            BaseType::Int64 => value.as_i64().map(Scalar::Int64),
            BaseType::Float32 => float(value).map(|v| Scalar::Float32(v as f32)),
            BaseType::Float64 => float(value).map(Scalar::Float64),
        };
        scalar.ok_or_else(|| format!("value {} is not a valid {}", value, base_type))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) | Scalar::Char(s) => f.write_str(s),
            Scalar::Byte(v) | Scalar::Int8(v) => write!(f, "{}", v),
            Scalar::Int16(v) => write!(f, "{}", v),
            Scalar::Int32(v) => write!(f, "{}", v),
            Scalar::Int64(v) => write!(f, "{}", v),
            Scalar::Float32(v) => write!(f, "{}", v),
            Scalar::Float64(v) => write!(f, "{}", v),
        }
    }
}

/// An attribute value read from a file, with its storage type.
///
/// Serialized as `{"type": "float32", "value": [1.0, 2.0]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAttr", into = "RawAttr")]
pub enum AttrValue {
    Scalar(Scalar),
    Array(BaseType, Vec<Scalar>),
}

impl AttrValue {
    pub fn text(value: impl Into<String>) -> Self {
        AttrValue::Scalar(Scalar::Str(value.into()))
    }

    /// `float32`, or `Array[float32]` for arrays
    pub fn type_label(&self) -> String {
        match self {
            AttrValue::Scalar(s) => s.base_type().to_string(),
            AttrValue::Array(t, _) => format!("Array[{}]", t),
        }
    }

    /// Type check against a placeholder.
    ///
    /// An array placeholder also accepts a scalar of its base type, since
    /// length-1 attribute arrays read back as scalars.
    pub fn conforms_to(&self, placeholder: &Placeholder) -> bool {
        match self {
            AttrValue::Scalar(s) => s.base_type() == placeholder.base_type,
            AttrValue::Array(t, values) => {
                placeholder.is_array
                    && *t == placeholder.base_type
                    && values.iter().all(|v| v.base_type() == placeholder.base_type)
            }
        }
    }

    /// Plain JSON value without type information
    pub fn to_plain_json(&self) -> serde_json::Value {
        match self {
            AttrValue::Scalar(s) => s.to_json(),
            AttrValue::Array(_, values) => {
                serde_json::Value::Array(values.iter().map(Scalar::to_json).collect())
            }
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Scalar(s) => write!(f, "{}", s),
            AttrValue::Array(_, values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAttr {
    #[serde(rename = "type")]
    dtype: BaseType,
    value: serde_json::Value,
}

impl TryFrom<RawAttr> for AttrValue {
    type Error = String;

    fn try_from(raw: RawAttr) -> Result<Self, Self::Error> {
        match &raw.value {
            serde_json::Value::Array(items) => {
                let values = items
                    .iter()
                    .map(|v| Scalar::from_json(raw.dtype, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AttrValue::Array(raw.dtype, values))
            }
            other => Ok(AttrValue::Scalar(Scalar::from_json(raw.dtype, other)?)),
        }
    }
}

impl From<AttrValue> for RawAttr {
    fn from(value: AttrValue) -> Self {
        let dtype = match &value {
            AttrValue::Scalar(s) => s.base_type(),
            AttrValue::Array(t, _) => *t,
        };
        RawAttr {
            dtype,
            value: value.to_plain_json(),
        }
    }
}

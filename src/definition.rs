//! Product definition documents as authored in YAML
//!
//! These types mirror the file format one-to-one. Nothing here is checked
//! beyond what serde enforces; see [`crate::compiler`] for that.

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::fs;
use std::path::Path;

use crate::error::Result;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionDocument {
    #[serde(default)]
    pub meta: DatasetMetaDoc,
    #[serde(default)]
    pub attributes: Mapping,
    #[serde(default)]
    pub dimensions: Vec<DimensionDoc>,
    #[serde(default)]
    pub variables: Vec<VariableDoc>,
    #[serde(default)]
    pub groups: Vec<GroupDoc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetMetaDoc {
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub file_pattern: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub canonical_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionDoc {
    pub name: String,
    /// `null` or absent means unlimited
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableMetaDoc {
    pub name: String,
    pub datatype: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDoc {
    pub meta: VariableMetaDoc,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub attributes: Mapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMetaDoc {
    pub name: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDoc {
    pub meta: GroupMetaDoc,
    #[serde(default)]
    pub attributes: Mapping,
    #[serde(default)]
    pub dimensions: Vec<DimensionDoc>,
    #[serde(default)]
    pub variables: Vec<VariableDoc>,
    #[serde(default)]
    pub groups: Vec<GroupDoc>,
}

impl DefinitionDocument {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_definition() {
        let doc = DefinitionDocument::from_yaml_str(
            r#"
meta:
  short_name: demo
  file_pattern: demo_{date}.nc
attributes:
  title: Demo product
dimensions:
  - name: time
    size: null
variables:
  - meta:
      name: temperature
      datatype: <float32>
    dimensions: [time]
    attributes:
      units: K
"#,
        )
        .unwrap();

        assert_eq!(doc.meta.short_name.as_deref(), Some("demo"));
        assert_eq!(doc.dimensions[0].size, None);
        assert!(doc.variables[0].meta.required);
        assert_eq!(doc.variables[0].dimensions, vec!["time"]);
        assert!(doc.groups.is_empty());
    }
}

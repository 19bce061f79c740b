//! The file under test, as seen by the validator
//!
//! A [`DataSource`] yields a [`SourceGroup`] tree mirroring the schema shape
//! but holding actual values. Reading the netCDF container itself is left to
//! adapters; [`JsonDump`] reads the JSON form written by `ncvocab eg-data` and
//! by external dump tools.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::attribute::AttrValue;
use crate::error::Result;
use crate::placeholder::BaseType;

/// Anything that can present a file as a [`SourceGroup`] tree
pub trait DataSource {
    /// Name shown in report banners
    fn describe(&self) -> String;

    fn root(&self) -> Result<SourceGroup>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDimension {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub unlimited: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceVariable {
    pub name: String,
    pub data_type: BaseType,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl SourceVariable {
    pub fn new(name: impl Into<String>, data_type: BaseType, dimensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            data_type,
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// A group (or the root) of the file under test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default)]
    pub dimensions: Vec<SourceDimension>,
    #[serde(default)]
    pub variables: Vec<SourceVariable>,
    #[serde(default)]
    pub groups: Vec<SourceGroup>,
}

impl SourceGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_dimension(mut self, name: impl Into<String>, size: u64, unlimited: bool) -> Self {
        self.dimensions.push(SourceDimension {
            name: name.into(),
            size,
            unlimited,
        });
        self
    }

    pub fn with_variable(mut self, variable: SourceVariable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_group(mut self, group: SourceGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn dimension(&self, name: &str) -> Option<&SourceDimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&SourceVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn variable_mut(&mut self, name: &str) -> Option<&mut SourceVariable> {
        self.variables.iter_mut().find(|v| v.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&SourceGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut SourceGroup> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    /// Untyped JSON view, keyed by name, in the shape checked by
    /// [`crate::json_schema::derive_json_schema`] documents.
    pub fn to_plain_json(&self) -> Value {
        let attributes = plain_attributes(&self.attributes);

        let dimensions: Map<String, Value> = self
            .dimensions
            .iter()
            .map(|d| (d.name.clone(), json!(d.size)))
            .collect();

        let variables: Map<String, Value> = self
            .variables
            .iter()
            .map(|v| {
                (
                    v.name.clone(),
                    json!({
                        "datatype": v.data_type.as_str(),
                        "dimensions": v.dimensions,
                        "attributes": plain_attributes(&v.attributes),
                    }),
                )
            })
            .collect();

        let groups: Map<String, Value> = self
            .groups
            .iter()
            .map(|g| (g.name.clone(), g.to_plain_json()))
            .collect();

        json!({
            "attributes": attributes,
            "dimensions": dimensions,
            "variables": variables,
            "groups": groups,
        })
    }
}

fn plain_attributes(attributes: &BTreeMap<String, AttrValue>) -> Value {
    Value::Object(
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_plain_json()))
            .collect(),
    )
}

impl DataSource for SourceGroup {
    fn describe(&self) -> String {
        if self.name.is_empty() {
            "<memory>".to_string()
        } else {
            self.name.clone()
        }
    }

    fn root(&self) -> Result<SourceGroup> {
        Ok(self.clone())
    }
}

/// A file structure stored as typed JSON
#[derive(Debug, Clone)]
pub struct JsonDump {
    path: PathBuf,
}

impl JsonDump {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(path: impl AsRef<Path>) -> Result<SourceGroup> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write(path: impl AsRef<Path>, root: &SourceGroup) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(root)?)?;
        debug!(path = %path.display(), "wrote json dump");
        Ok(())
    }
}

impl DataSource for JsonDump {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn root(&self) -> Result<SourceGroup> {
        Self::read(&self.path)
    }
}

//! Compiled schema tree
//!
//! A [`Dataset`] owns its groups, dimensions and variables; groups own theirs
//! in turn. Variables refer to dimensions by name only.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::attribute::AttributeConstraint;
use crate::placeholder::BaseType;

/// Declared size of a dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum DimensionSize {
    Fixed(u64),
    Unlimited,
}

impl DimensionSize {
    /// Whether a concrete size from a file satisfies this declaration
    pub fn accepts(&self, actual: u64) -> bool {
        match self {
            DimensionSize::Fixed(n) => *n == actual,
            DimensionSize::Unlimited => true,
        }
    }
}

impl From<Option<u64>> for DimensionSize {
    fn from(size: Option<u64>) -> Self {
        size.map(DimensionSize::Fixed).unwrap_or(DimensionSize::Unlimited)
    }
}

impl From<DimensionSize> for Option<u64> {
    fn from(size: DimensionSize) -> Self {
        match size {
            DimensionSize::Fixed(n) => Some(n),
            DimensionSize::Unlimited => None,
        }
    }
}

impl fmt::Display for DimensionSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionSize::Fixed(n) => write!(f, "{}", n),
            DimensionSize::Unlimited => f.write_str("unlimited"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Descriptive metadata carried by every node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_true")]
    pub required: bool,

    /// Short product name (datasets only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,

    /// Filename pattern with `{token}` wildcards (datasets only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_name: Option<String>,
}

impl Default for NodeMeta {
    fn default() -> Self {
        Self {
            description: None,
            required: true,
            short_name: None,
            file_pattern: None,
            canonical_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub size: DimensionSize,
    #[serde(default)]
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub data_type: BaseType,
    /// Dimension names, outermost first
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeConstraint>,
    #[serde(default)]
    pub meta: NodeMeta,
}

/// Children shared by datasets and groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub attributes: Vec<AttributeConstraint>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Container {
    pub fn attribute(&self, name: &str) -> Option<&AttributeConstraint> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn walk<'a>(&'a self, path: &mut Vec<String>, out: &mut Vec<(Vec<String>, NodeRef<'a>)>) {
        for dim in &self.dimensions {
            out.push((child_path(path, "dimensions", &dim.name), NodeRef::Dimension(dim)));
        }
        for var in &self.variables {
            out.push((child_path(path, "variables", &var.name), NodeRef::Variable(var)));
        }
        for group in &self.groups {
            path.push("groups".to_string());
            path.push(group.name.clone());
            out.push((path.clone(), NodeRef::Group(group)));
            group.contents.walk(path, out);
            path.pop();
            path.pop();
        }
    }
}

fn child_path(parent: &[String], kind: &str, name: &str) -> Vec<String> {
    let mut path = parent.to_vec();
    path.push(kind.to_string());
    path.push(name.to_string());
    path
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub meta: NodeMeta,
    #[serde(flatten)]
    pub contents: Container,
}

/// Root of a compiled product definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(default)]
    pub meta: NodeMeta,
    #[serde(flatten)]
    pub contents: Container,
}

/// Borrowed view of any node in the tree
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Dataset(&'a Dataset),
    Group(&'a Group),
    Dimension(&'a Dimension),
    Variable(&'a Variable),
}

impl NodeRef<'_> {
    pub fn name(&self) -> &str {
        match self {
            NodeRef::Dataset(d) => &d.name,
            NodeRef::Group(g) => &g.name,
            NodeRef::Dimension(d) => &d.name,
            NodeRef::Variable(v) => &v.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NodeRef::Dataset(_) => "dataset",
            NodeRef::Group(_) => "group",
            NodeRef::Dimension(_) => "dimension",
            NodeRef::Variable(_) => "variable",
        }
    }

    pub fn meta(&self) -> &NodeMeta {
        match self {
            NodeRef::Dataset(d) => &d.meta,
            NodeRef::Group(g) => &g.meta,
            NodeRef::Dimension(d) => &d.meta,
            NodeRef::Variable(v) => &v.meta,
        }
    }

    pub fn attributes(&self) -> &[AttributeConstraint] {
        match self {
            NodeRef::Dataset(d) => &d.contents.attributes,
            NodeRef::Group(g) => &g.contents.attributes,
            NodeRef::Dimension(_) => &[],
            NodeRef::Variable(v) => &v.attributes,
        }
    }
}

impl Dataset {
    /// Every node, depth first, parent before children, with its path
    /// (`["root", "groups", "g1", "variables", "x"]`).
    pub fn walk(&self) -> Vec<(Vec<String>, NodeRef<'_>)> {
        let mut path = vec!["root".to_string()];
        let mut out = vec![(path.clone(), NodeRef::Dataset(self))];
        self.contents.walk(&mut path, &mut out);
        out
    }

    pub fn node_count(&self) -> usize {
        self.walk().len()
    }

    /// Product name used for artifact filenames
    pub fn product_name(&self) -> &str {
        self.meta.short_name.as_deref().unwrap_or(&self.name)
    }
}

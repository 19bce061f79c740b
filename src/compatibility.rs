//! Compatibility between definition versions
//!
//! Compares two compiled datasets and classifies each difference as breaking
//! or compatible. A change is breaking when a file or a reader that worked
//! with the old definition may stop working with the new one.

use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::BTreeMap;

use crate::attribute::{AttributeConstraint, ConstraintKind};
use crate::error::Result;
use crate::schema::{Container, Dataset, NodeMeta};
use crate::version::SchemaVersion;

/// Result of a compatibility check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub is_compatible: bool,
    pub changes: Vec<SchemaChange>,
    pub summary: String,
}

impl CompatibilityResult {
    pub fn compatible(changes: Vec<SchemaChange>) -> Self {
        let summary = if changes.is_empty() {
            "No changes detected".to_string()
        } else {
            format!("{} compatible changes detected", changes.len())
        };
        Self {
            is_compatible: true,
            changes,
            summary,
        }
    }

    pub fn incompatible(changes: Vec<SchemaChange>, reason: impl Into<String>) -> Self {
        Self {
            is_compatible: false,
            changes,
            summary: reason.into(),
        }
    }

    pub fn breaking_changes(&self) -> impl Iterator<Item = &SchemaChange> {
        self.changes.iter().filter(|c| c.is_breaking)
    }

    /// Smallest version bump that describes these changes
    pub fn required_bump(&self) -> Bump {
        if !self.is_compatible {
            Bump::Major
        } else if self.changes.iter().any(|c| c.change_type != ChangeType::DocumentationChanged) {
            Bump::Minor
        } else {
            Bump::Patch
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bump {
    Patch,
    Minor,
    Major,
}

/// A detected change between definition versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    pub change_type: ChangeType,
    /// Path to the changed element (e.g. `root -> variables -> t -> attributes -> units`)
    pub path: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub is_breaking: bool,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    NodeAdded,
    NodeRemoved,
    AttributeAdded,
    AttributeRemoved,
    /// Variable data type or attribute placeholder type
    TypeChanged,
    /// Literal attribute value
    ValueChanged,
    SizeChanged,
    DimensionsChanged,
    OptionalityChanged,
    DocumentationChanged,
}

/// Compatibility checker for definition versions
#[derive(Debug, Clone, Default)]
pub struct CompatibilityChecker {
    /// Any change is considered breaking
    strict_mode: bool,
}

impl CompatibilityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self) -> Self {
        self.strict_mode = true;
        self
    }

    pub fn check(&self, old: &Dataset, new: &Dataset) -> CompatibilityResult {
        let mut changes = Vec::new();
        let path = vec!["root".to_string()];
        meta_changes(&path, &old.meta, &new.meta, &mut changes);
        container_changes(&path, &old.contents, &new.contents, &mut changes);

        let breaking_count = changes.iter().filter(|c| c.is_breaking).count();
        if self.strict_mode && !changes.is_empty() {
            CompatibilityResult::incompatible(
                changes,
                format!("Strict mode: {} changes detected", breaking_count),
            )
        } else if breaking_count > 0 {
            CompatibilityResult::incompatible(
                changes,
                format!("{} breaking changes detected", breaking_count),
            )
        } else {
            CompatibilityResult::compatible(changes)
        }
    }

    /// Compare every product of two versions. Removed products are breaking.
    pub fn check_versions(
        &self,
        old: &SchemaVersion,
        new: &SchemaVersion,
    ) -> BTreeMap<String, CompatibilityResult> {
        let mut results = BTreeMap::new();
        for (name, old_ds) in &old.products {
            let result = match new.products.get(name) {
                Some(new_ds) => self.check(old_ds, new_ds),
                None => CompatibilityResult::incompatible(
                    vec![],
                    format!("Product '{}' was removed", name),
                ),
            };
            results.insert(name.clone(), result);
        }
        for name in new.products.keys().filter(|n| !old.products.contains_key(*n)) {
            let mut result = CompatibilityResult::compatible(vec![]);
            result.summary = format!("Product '{}' was added", name);
            results.insert(name.clone(), result);
        }
        results
    }
}

/// Bump between two released versions, or `None` when `new` is not newer
pub fn declared_bump(old: &SchemaVersion, new: &SchemaVersion) -> Option<Bump> {
    if new.is_major_bump_from(old) {
        Some(Bump::Major)
    } else if new.is_minor_bump_from(old) {
        Some(Bump::Minor)
    } else if new.is_patch_bump_from(old) {
        Some(Bump::Patch)
    } else {
        None
    }
}

/// Compare two datasets with the default checker
pub fn compare(old: &Dataset, new: &Dataset) -> CompatibilityResult {
    CompatibilityChecker::new().check(old, new)
}

/// Unified diff of the two datasets' JSON artifacts
pub fn text_diff(old: &Dataset, new: &Dataset) -> Result<String> {
    let old_text = serde_json::to_string_pretty(old)?;
    let new_text = serde_json::to_string_pretty(new)?;
    let diff = TextDiff::from_lines(&old_text, &new_text);
    Ok(diff
        .unified_diff()
        .context_radius(3)
        .header(&old.name, &new.name)
        .to_string())
}

fn join(path: &[String], extra: &[&str]) -> String {
    path.iter()
        .map(String::as_str)
        .chain(extra.iter().copied())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn change(
    change_type: ChangeType,
    path: String,
    old_value: Option<String>,
    new_value: Option<String>,
    is_breaking: bool,
    description: impl Into<String>,
) -> SchemaChange {
    SchemaChange {
        change_type,
        path,
        old_value,
        new_value,
        is_breaking,
        description: description.into(),
    }
}

fn meta_changes(path: &[String], old: &NodeMeta, new: &NodeMeta, changes: &mut Vec<SchemaChange>) {
    if old.required != new.required {
        changes.push(change(
            ChangeType::OptionalityChanged,
            join(path, &[]),
            Some(old.required.to_string()),
            Some(new.required.to_string()),
            true,
            if new.required { "Became required" } else { "Became optional" },
        ));
    }
    if old.description != new.description {
        changes.push(change(
            ChangeType::DocumentationChanged,
            join(path, &[]),
            old.description.clone(),
            new.description.clone(),
            false,
            "Description changed",
        ));
    }
}

/// Matches children of one kind by name and reports additions and removals
fn added_removed<'a, T>(
    path: &[String],
    kind: &str,
    old: &'a [T],
    new: &'a [T],
    name: impl Fn(&T) -> &str,
    required: impl Fn(&T) -> bool,
    changes: &mut Vec<SchemaChange>,
) -> Vec<(&'a T, &'a T)> {
    let mut pairs = Vec::new();
    for o in old {
        match new.iter().find(|n| name(n) == name(o)) {
            Some(n) => pairs.push((o, n)),
            None => changes.push(change(
                ChangeType::NodeRemoved,
                join(path, &[kind, name(o)]),
                Some(name(o).to_string()),
                None,
                required(o),
                format!("Removed {}", kind.trim_end_matches('s')),
            )),
        }
    }
    for n in new.iter().filter(|n| !old.iter().any(|o| name(o) == name(n))) {
        changes.push(change(
            ChangeType::NodeAdded,
            join(path, &[kind, name(n)]),
            None,
            Some(name(n).to_string()),
            required(n),
            format!(
                "Added {} {}",
                if required(n) { "required" } else { "optional" },
                kind.trim_end_matches('s')
            ),
        ));
    }
    pairs
}

fn container_changes(path: &[String], old: &Container, new: &Container, changes: &mut Vec<SchemaChange>) {
    attribute_changes(path, &old.attributes, &new.attributes, changes);

    let dims = added_removed(
        path,
        "dimensions",
        &old.dimensions,
        &new.dimensions,
        |d| d.name.as_str(),
        |d| d.meta.required,
        changes,
    );
    for (o, n) in dims {
        let p = vec![path.to_vec(), vec!["dimensions".into(), o.name.clone()]].concat();
        if o.size != n.size {
            changes.push(change(
                ChangeType::SizeChanged,
                join(&p, &[]),
                Some(o.size.to_string()),
                Some(n.size.to_string()),
                true,
                "Dimension size changed",
            ));
        }
        meta_changes(&p, &o.meta, &n.meta, changes);
    }

    let vars = added_removed(
        path,
        "variables",
        &old.variables,
        &new.variables,
        |v| v.name.as_str(),
        |v| v.meta.required,
        changes,
    );
    for (o, n) in vars {
        let p = vec![path.to_vec(), vec!["variables".into(), o.name.clone()]].concat();
        if o.data_type != n.data_type {
            changes.push(change(
                ChangeType::TypeChanged,
                join(&p, &[]),
                Some(o.data_type.to_string()),
                Some(n.data_type.to_string()),
                true,
                "Data type changed",
            ));
        }
        if o.dimensions != n.dimensions {
            changes.push(change(
                ChangeType::DimensionsChanged,
                join(&p, &["dimensions"]),
                Some(format!("[{}]", o.dimensions.join(", "))),
                Some(format!("[{}]", n.dimensions.join(", "))),
                true,
                "Variable dimensions changed",
            ));
        }
        meta_changes(&p, &o.meta, &n.meta, changes);
        attribute_changes(&p, &o.attributes, &n.attributes, changes);
    }

    let groups = added_removed(
        path,
        "groups",
        &old.groups,
        &new.groups,
        |g| g.name.as_str(),
        |g| g.meta.required,
        changes,
    );
    for (o, n) in groups {
        let p = vec![path.to_vec(), vec!["groups".into(), o.name.clone()]].concat();
        meta_changes(&p, &o.meta, &n.meta, changes);
        container_changes(&p, &o.contents, &n.contents, changes);
    }
}

fn attribute_changes(
    path: &[String],
    old: &[AttributeConstraint],
    new: &[AttributeConstraint],
    changes: &mut Vec<SchemaChange>,
) {
    for o in old {
        let p = join(path, &["attributes", &o.name]);
        let Some(n) = new.iter().find(|n| n.name == o.name) else {
            changes.push(change(
                ChangeType::AttributeRemoved,
                p,
                Some(o.describe()),
                None,
                o.is_required(),
                "Attribute removed",
            ));
            continue;
        };

        match (&o.kind, &n.kind) {
            (ConstraintKind::Literal(a), ConstraintKind::Literal(b)) if a != b => {
                changes.push(change(
                    ChangeType::ValueChanged,
                    p,
                    Some(o.describe()),
                    Some(n.describe()),
                    true,
                    "Literal value changed",
                ));
            }
            (ConstraintKind::Placeholder(a), ConstraintKind::Placeholder(b))
                if a.base_type != b.base_type || a.is_array != b.is_array =>
            {
                changes.push(change(
                    ChangeType::TypeChanged,
                    p,
                    Some(o.describe()),
                    Some(n.describe()),
                    true,
                    "Placeholder type changed",
                ));
            }
            (ConstraintKind::Placeholder(a), ConstraintKind::Placeholder(b))
                if a.required != b.required =>
            {
                changes.push(change(
                    ChangeType::OptionalityChanged,
                    p,
                    Some(o.describe()),
                    Some(n.describe()),
                    true,
                    if b.required { "Became required" } else { "Became optional" },
                ));
            }
            (ConstraintKind::Literal(_), ConstraintKind::Placeholder(_))
            | (ConstraintKind::Placeholder(_), ConstraintKind::Literal(_)) => {
                changes.push(change(
                    ChangeType::ValueChanged,
                    p,
                    Some(o.describe()),
                    Some(n.describe()),
                    true,
                    "Changed between literal and placeholder",
                ));
            }
            _ => {}
        }
    }

    for n in new.iter().filter(|n| !old.iter().any(|o| o.name == n.name)) {
        changes.push(change(
            ChangeType::AttributeAdded,
            join(path, &["attributes", &n.name]),
            None,
            Some(n.describe()),
            n.is_required(),
            "Attribute added",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_str;
    use crate::project::ProjectModelSet;

    const BASE: &str = r#"
meta: {short_name: demo}
attributes:
  title: Demo
dimensions:
  - {name: time, size: null}
variables:
  - meta: {name: temperature, datatype: float32}
    dimensions: [time]
    attributes:
      units: K
"#;

    fn compile(yaml: &str) -> Dataset {
        compile_str(yaml, &ProjectModelSet::empty()).unwrap()
    }

    #[test]
    fn test_identical_definitions() {
        let result = compare(&compile(BASE), &compile(BASE));
        assert!(result.is_compatible);
        assert!(result.changes.is_empty());
        assert_eq!(result.required_bump(), Bump::Patch);
    }

    #[test]
    fn test_optional_addition_is_compatible() {
        let new = format!(
            "{}  - meta: {{name: humidity, datatype: float32, required: false}}\n    dimensions: [time]\n",
            BASE
        );
        let result = compare(&compile(BASE), &compile(&new));
        assert!(result.is_compatible, "{:?}", result.changes);
        assert_eq!(result.changes[0].change_type, ChangeType::NodeAdded);
        assert_eq!(result.changes[0].path, "root -> variables -> humidity");
        assert_eq!(result.required_bump(), Bump::Minor);
    }

    #[test]
    fn test_breaking_changes() {
        let new = BASE.replace("float32", "float64").replace("units: K", "units: degC");
        let result = compare(&compile(BASE), &compile(&new));
        assert!(!result.is_compatible);

        let kinds: Vec<ChangeType> = result.changes.iter().map(|c| c.change_type).collect();
        assert_eq!(kinds, vec![ChangeType::TypeChanged, ChangeType::ValueChanged]);
        assert_eq!(result.breaking_changes().count(), 2);
        assert_eq!(result.required_bump(), Bump::Major);
    }

    #[test]
    fn test_removed_variable() {
        let new = "meta: {short_name: demo}\nattributes:\n  title: Demo\ndimensions:\n  - {name: time, size: null}\n";
        let result = compare(&compile(BASE), &compile(new));
        assert!(!result.is_compatible);
        assert_eq!(result.changes[0].change_type, ChangeType::NodeRemoved);
    }

    #[test]
    fn test_strict_mode() {
        let new = BASE.replace("meta: {short_name: demo}", "meta: {short_name: demo, description: New}");
        assert!(compare(&compile(BASE), &compile(&new)).is_compatible);
        let strict = CompatibilityChecker::new().strict();
        assert!(!strict.check(&compile(BASE), &compile(&new)).is_compatible);
    }

    #[test]
    fn test_declared_bump() {
        let version = |tag: &str| SchemaVersion::new(tag, BTreeMap::new()).unwrap();
        assert_eq!(declared_bump(&version("1.0"), &version("2.0")), Some(Bump::Major));
        assert_eq!(declared_bump(&version("1.0"), &version("1.1")), Some(Bump::Minor));
        assert_eq!(declared_bump(&version("1.1"), &version("1.1.1")), Some(Bump::Patch));
        assert_eq!(declared_bump(&version("1.1"), &version("1.1")), None);
        assert_eq!(declared_bump(&version("1.1"), &version("1.0")), None);
    }

    #[test]
    fn test_text_diff() {
        let new = BASE.replace("units: K", "units: degC");
        let diff = text_diff(&compile(BASE), &compile(&new)).unwrap();
        assert!(diff.contains("-"));
        assert!(diff.contains("degC"));
        assert!(text_diff(&compile(BASE), &compile(BASE)).unwrap().is_empty());
    }
}

//! Lockstep validation of a file against a compiled definition
//!
//! The schema tree drives the walk: each container is checked attributes
//! first, then dimensions, variables and groups, in declaration order. Every
//! problem becomes a [`Diagnostic`]; nothing here fails.

use std::collections::BTreeMap;
use tracing::debug;

use crate::attribute::{AttrValue, AttributeConstraint, ConstraintKind};
use crate::diagnostics::{Category, Diagnostic, Report, SeverityPolicy};
use crate::schema::{Container, Dataset, DimensionSize, Variable};
use crate::source::{SourceGroup, SourceVariable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOptions {
    /// When false, elements present in the file but not in the definition
    /// are reported as [`Category::UnknownElement`].
    pub allow_unknown: bool,
    pub policy: SeverityPolicy,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            allow_unknown: true,
            policy: SeverityPolicy::default(),
        }
    }
}

/// Validate with default options
pub fn validate(schema: &Dataset, source: &SourceGroup) -> Report {
    Validator::default().validate(schema, source)
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    options: ValidateOptions,
}

impl Validator {
    pub fn new(options: ValidateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ValidateOptions {
        &self.options
    }

    pub fn validate(&self, schema: &Dataset, source: &SourceGroup) -> Report {
        let mut walk = Walk {
            options: &self.options,
            report: Report::new(),
            scope: Vec::new(),
        };
        let mut path = vec!["root".to_string()];
        walk.container(&mut path, &schema.contents, source);

        debug!(
            definition = %schema.name,
            errors = walk.report.error_count(),
            warnings = walk.report.warning_count(),
            "validation finished"
        );
        walk.report
    }
}

struct Walk<'a> {
    options: &'a ValidateOptions,
    report: Report,
    /// Schema and file containers enclosing the current node, outermost first
    scope: Vec<(&'a Container, &'a SourceGroup)>,
}

impl<'a> Walk<'a> {
    fn pass(&mut self, path: &[String], extra: &[&str]) {
        let mut full = path.to_vec();
        full.extend(extra.iter().map(|s| s.to_string()));
        self.report.pass(full);
    }

    fn emit(
        &mut self,
        path: &[String],
        extra: &[&str],
        category: Category,
        message: String,
        constraint: Option<String>,
    ) {
        let mut full = path.to_vec();
        full.extend(extra.iter().map(|s| s.to_string()));
        self.report.push(Diagnostic {
            path: full,
            severity: self.options.policy.severity_for(category),
            category,
            message,
            constraint,
        });
    }

    fn unknown<'n>(&mut self, path: &[String], kind: &str, names: impl Iterator<Item = &'n str>) {
        if self.options.allow_unknown {
            return;
        }
        for name in names {
            self.emit(
                path,
                &[kind, name],
                Category::UnknownElement,
                "not in definition".to_string(),
                None,
            );
        }
    }

    fn container(&mut self, path: &mut Vec<String>, schema: &'a Container, source: &'a SourceGroup) {
        self.scope.push((schema, source));
        self.attributes(path, &schema.attributes, &source.attributes);

        for dim in &schema.dimensions {
            match source.dimension(&dim.name) {
                None if dim.meta.required => self.emit(
                    path,
                    &["dimensions", &dim.name],
                    Category::Missing,
                    "missing".to_string(),
                    None,
                ),
                None => {}
                Some(actual) if !dim.size.accepts(actual.size) => self.emit(
                    path,
                    &["dimensions", &dim.name],
                    Category::DimensionMismatch,
                    format!("size mismatch: expected {}, got {}", dim.size, actual.size),
                    Some(dim.size.to_string()),
                ),
                Some(_) => self.pass(path, &["dimensions", &dim.name]),
            }
        }
        self.unknown(
            path,
            "dimensions",
            source
                .dimensions
                .iter()
                .map(|d| d.name.as_str())
                .filter(|name| schema.dimension(name).is_none()),
        );

        for var in &schema.variables {
            match source.variable(&var.name) {
                None if var.meta.required => self.emit(
                    path,
                    &["variables", &var.name],
                    Category::Missing,
                    "missing".to_string(),
                    None,
                ),
                None => {}
                Some(actual) => self.variable(path, var, actual),
            }
        }
        self.unknown(
            path,
            "variables",
            source
                .variables
                .iter()
                .map(|v| v.name.as_str())
                .filter(|name| schema.variable(name).is_none()),
        );

        for group in &schema.groups {
            match source.group(&group.name) {
                None if group.meta.required => self.emit(
                    path,
                    &["groups", &group.name],
                    Category::Missing,
                    "missing".to_string(),
                    None,
                ),
                None => {}
                Some(actual) => {
                    path.push("groups".to_string());
                    path.push(group.name.clone());
                    self.pass(path, &[]);
                    self.container(path, &group.contents, actual);
                    path.pop();
                    path.pop();
                }
            }
        }
        self.unknown(
            path,
            "groups",
            source
                .groups
                .iter()
                .map(|g| g.name.as_str())
                .filter(|name| schema.group(name).is_none()),
        );
        self.scope.pop();
    }

    /// Resolve a dimension name in the file, innermost group first.
    ///
    /// Returns the file's size for it and, unless the schema container at
    /// that same level declares the dimension (already checked there), the
    /// nearest size the schema declares.
    fn resolve_dimension(&self, name: &str) -> Option<(u64, Option<DimensionSize>)> {
        let level = self
            .scope
            .iter()
            .rposition(|(_, source)| source.dimension(name).is_some())?;
        let (schema_here, source_here) = self.scope[level];
        let actual = source_here.dimension(name)?.size;

        if schema_here.dimension(name).is_some() {
            return Some((actual, None));
        }
        let expected = self
            .scope
            .iter()
            .rev()
            .find_map(|(schema, _)| schema.dimension(name))
            .map(|d| d.size);
        Some((actual, expected))
    }

    fn variable(&mut self, parent: &[String], schema: &Variable, actual: &SourceVariable) {
        let mut path = parent.to_vec();
        path.push("variables".to_string());
        path.push(schema.name.clone());

        if actual.data_type != schema.data_type {
            self.emit(
                &path,
                &[],
                Category::DataTypeMismatch,
                format!(
                    "type mismatch: expected {}, got {}",
                    schema.data_type, actual.data_type
                ),
                Some(schema.data_type.to_string()),
            );
        }

        if actual.dimensions != schema.dimensions {
            self.emit(
                &path,
                &["dimensions"],
                Category::DimensionMismatch,
                format!(
                    "dimension mismatch: expected [{}], got [{}]",
                    schema.dimensions.join(", "),
                    actual.dimensions.join(", ")
                ),
                None,
            );
        }

        let mut resolved = true;
        for name in schema.dimensions.iter().filter(|n| actual.dimensions.contains(*n)) {
            match self.resolve_dimension(name) {
                None => {
                    resolved = false;
                    self.emit(
                        &path,
                        &["dimensions", name],
                        Category::DimensionMismatch,
                        "unresolved dimension: not defined in this group or any parent".to_string(),
                        None,
                    );
                }
                Some((size, Some(expected))) if !expected.accepts(size) => {
                    resolved = false;
                    self.emit(
                        &path,
                        &["dimensions", name],
                        Category::DimensionMismatch,
                        format!("size mismatch: expected {}, got {}", expected, size),
                        Some(expected.to_string()),
                    );
                }
                Some(_) => {}
            }
        }

        if resolved
            && actual.data_type == schema.data_type
            && actual.dimensions == schema.dimensions
        {
            self.pass(&path, &[]);
        }

        self.attributes(&path, &schema.attributes, &actual.attributes);
    }

    fn attributes(
        &mut self,
        path: &[String],
        constraints: &[AttributeConstraint],
        actual: &BTreeMap<String, AttrValue>,
    ) {
        for constraint in constraints {
            let name = constraint.name.as_str();
            let value = actual.get(name);

            match (&constraint.kind, value) {
                (_, None) if constraint.is_required() => self.emit(
                    path,
                    &["attributes", name],
                    Category::Missing,
                    "field required".to_string(),
                    Some(constraint.describe()),
                ),
                (_, None) => {}
                (ConstraintKind::Literal(literal), Some(value)) => {
                    if literal.matches(value) {
                        self.pass(path, &["attributes", name]);
                    } else {
                        self.emit(
                            path,
                            &["attributes", name],
                            Category::ValueMismatch,
                            format!("value mismatch: expected {}, got {}", literal, value),
                            Some(constraint.describe()),
                        );
                    }
                }
                (ConstraintKind::Placeholder(placeholder), Some(value)) => {
                    if value.conforms_to(placeholder) {
                        self.pass(path, &["attributes", name]);
                    } else {
                        let expected = if placeholder.is_array {
                            format!("Array[{}]", placeholder.base_type)
                        } else {
                            placeholder.base_type.to_string()
                        };
                        self.emit(
                            path,
                            &["attributes", name],
                            Category::TypeMismatch,
                            format!("type mismatch: expected {}, got {}", expected, value.type_label()),
                            Some(constraint.describe()),
                        );
                    }
                }
            }
        }

        self.unknown(
            path,
            "attributes",
            actual
                .keys()
                .map(String::as_str)
                .filter(|name| !constraints.iter().any(|c| c.name == *name)),
        );
    }
}

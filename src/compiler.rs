//! Definition compiler
//!
//! Turns a [`DefinitionDocument`] plus the project's default attribute layers
//! into a [`Dataset`] tree. Compilation either yields a complete tree or the
//! first structural problem found, named by its path.

use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::attribute::{AttributeConstraint, ConstraintKind, Literal};
use crate::definition::{DefinitionDocument, DimensionDoc, GroupDoc, VariableDoc};
use crate::error::{Result, SchemaError};
use crate::placeholder::{is_placeholder_shaped, parse_data_type, parse_placeholder};
use crate::project::ProjectModelSet;
use crate::schema::{Container, Dataset, Dimension, DimensionSize, Group, NodeMeta, Variable};

/// Compile a definition. The dataset is named after `meta.short_name`, or
/// `dataset` when there is none.
pub fn compile(definition: &DefinitionDocument, base: &ProjectModelSet) -> Result<Dataset> {
    let name = definition
        .meta
        .short_name
        .clone()
        .unwrap_or_else(|| "dataset".to_string());
    compile_named(&name, definition, base)
}

/// Compile a definition file; the dataset takes the file stem as its name.
pub fn compile_file(path: impl AsRef<Path>, base: &ProjectModelSet) -> Result<Dataset> {
    let path = path.as_ref();
    let definition = DefinitionDocument::from_path(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset")
        .to_string();
    debug!(path = %path.display(), "compiling definition");
    compile_named(&name, &definition, base)
}

/// Compile YAML text directly
pub fn compile_str(yaml: &str, base: &ProjectModelSet) -> Result<Dataset> {
    compile(&DefinitionDocument::from_yaml_str(yaml)?, base)
}

/// The project standard on its own: every default layer, no product.
///
/// Files are checked against this whether or not a product definition
/// applies to them.
pub fn compile_standard(base: &ProjectModelSet) -> Result<Dataset> {
    compile_named(&base.name(), &DefinitionDocument::default(), base)
}

pub fn compile_named(
    name: &str,
    definition: &DefinitionDocument,
    base: &ProjectModelSet,
) -> Result<Dataset> {
    let mut compiler = Compiler {
        base,
        scope: Vec::new(),
    };
    let path = vec!["root".to_string()];

    let contents = compiler.container(
        &path,
        &base.defaults.global_attributes,
        &definition.attributes,
        &definition.dimensions,
        &definition.variables,
        &definition.groups,
    )?;

    let meta = NodeMeta {
        description: definition.meta.description.clone(),
        required: true,
        short_name: definition.meta.short_name.clone(),
        file_pattern: definition.meta.file_pattern.clone(),
        canonical_name: definition.meta.canonical_name.clone(),
    };

    Ok(Dataset {
        name: name.to_string(),
        meta,
        contents,
    })
}

/// Two-layer attribute merge.
///
/// Defaults come first in their own order. A product entry with the same
/// name replaces the default in place; other product entries are appended.
/// A `null` value removes the attribute altogether.
pub fn merge_attributes(
    defaults: &Mapping,
    product: &Mapping,
    path: &[String],
) -> Result<Vec<(String, Value)>> {
    let mut merged: Vec<(String, Value)> = Vec::with_capacity(defaults.len() + product.len());

    for (key, value) in defaults {
        merged.push((attribute_key(key, path)?, value.clone()));
    }

    for (key, value) in product {
        let key = attribute_key(key, path)?;
        match merged.iter_mut().find(|(name, _)| *name == key) {
            Some(slot) => slot.1 = value.clone(),
            None => merged.push((key, value.clone())),
        }
    }

    merged.retain(|(_, value)| !value.is_null());
    Ok(merged)
}

fn attribute_key(key: &Value, path: &[String]) -> Result<String> {
    match key {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        other => Err(SchemaError::compilation(
            join(path, &["attributes"]),
            format!("attribute names must be non-empty strings, found {:?}", other),
        )),
    }
}

fn join(path: &[String], extra: &[&str]) -> String {
    path.iter()
        .map(String::as_str)
        .chain(extra.iter().copied())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn child(path: &[String], kind: &str, name: &str) -> Vec<String> {
    let mut p = path.to_vec();
    p.push(kind.to_string());
    p.push(name.to_string());
    p
}

/// Compile one attribute value into a constraint
fn compile_value(value: &Value, path: &[String], name: &str) -> Result<ConstraintKind> {
    match value {
        Value::String(s) if is_placeholder_shaped(s) => parse_placeholder(s)
            .map(ConstraintKind::Placeholder)
            .map_err(|e| SchemaError::Syntax {
                token: s.clone(),
                path: join(path, &["attributes", name]),
                reason: e.to_string(),
            }),
        Value::Sequence(items) => {
            let items = items
                .iter()
                .map(|item| compile_list_item(item, path, name))
                .collect::<Result<Vec<_>>>()?;
            let text = items.iter().filter(|i| matches!(i, Literal::Str(_))).count();
            if text != 0 && text != items.len() {
                return Err(SchemaError::compilation(
                    join(path, &["attributes", name]),
                    "list mixes text and numbers; attribute arrays hold a single type",
                ));
            }
            Ok(ConstraintKind::Literal(Literal::List(items)))
        }
        other => compile_scalar_literal(other, path, name).map(ConstraintKind::Literal),
    }
}

fn compile_list_item(value: &Value, path: &[String], name: &str) -> Result<Literal> {
    match value {
        Value::String(s) if is_placeholder_shaped(s) => Err(SchemaError::compilation(
            join(path, &["attributes", name]),
            format!("placeholder '{}' inside a list; use <Array[TYPE]: derived_from_file> instead", s),
        )),
        Value::Sequence(_) => Err(SchemaError::compilation(
            join(path, &["attributes", name]),
            "nested lists are not supported",
        )),
        other => compile_scalar_literal(other, path, name),
    }
}

fn compile_scalar_literal(value: &Value, path: &[String], name: &str) -> Result<Literal> {
    match value {
        Value::String(s) => Ok(Literal::Str(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Literal::Int(i)),
            None => n.as_f64().map(Literal::Float).ok_or_else(|| {
                SchemaError::compilation(join(path, &["attributes", name]), "unrepresentable number")
            }),
        },
        Value::Bool(_) => Err(SchemaError::compilation(
            join(path, &["attributes", name]),
            "boolean attribute values are not supported",
        )),
        _ => Err(SchemaError::compilation(
            join(path, &["attributes", name]),
            "attribute values must be strings, numbers, lists or placeholders",
        )),
    }
}

struct Compiler<'a> {
    base: &'a ProjectModelSet,
    /// Dimension names visible at the current depth, outermost first
    scope: Vec<HashSet<String>>,
}

impl Compiler<'_> {
    fn attributes(
        &self,
        path: &[String],
        defaults: &Mapping,
        product: &Mapping,
    ) -> Result<Vec<AttributeConstraint>> {
        merge_attributes(defaults, product, path)?
            .into_iter()
            .map(|(name, value)| {
                let kind = compile_value(&value, path, &name)?;
                Ok(AttributeConstraint { name, kind })
            })
            .collect()
    }

    fn container(
        &mut self,
        path: &[String],
        default_attrs: &Mapping,
        attributes: &Mapping,
        dimensions: &[DimensionDoc],
        variables: &[VariableDoc],
        groups: &[GroupDoc],
    ) -> Result<Container> {
        let attributes = self.attributes(path, default_attrs, attributes)?;

        let mut dims = Vec::with_capacity(dimensions.len());
        let mut names = HashSet::new();
        for doc in dimensions {
            check_name(&doc.name, path, "dimensions", &mut names)?;
            dims.push(Dimension {
                name: doc.name.clone(),
                size: DimensionSize::from(doc.size),
                meta: NodeMeta {
                    description: doc.description.clone(),
                    required: doc.required,
                    ..NodeMeta::default()
                },
            });
        }
        self.scope.push(names);

        let result = self.children(path, dims, attributes, variables, groups);
        self.scope.pop();
        result
    }

    fn children(
        &mut self,
        path: &[String],
        dimensions: Vec<Dimension>,
        attributes: Vec<AttributeConstraint>,
        variables: &[VariableDoc],
        groups: &[GroupDoc],
    ) -> Result<Container> {
        let mut vars = Vec::with_capacity(variables.len());
        let mut names = HashSet::new();
        for doc in variables {
            check_name(&doc.meta.name, path, "variables", &mut names)?;
            vars.push(self.variable(path, doc)?);
        }

        let mut grps = Vec::with_capacity(groups.len());
        let mut names = HashSet::new();
        for doc in groups {
            check_name(&doc.meta.name, path, "groups", &mut names)?;
            grps.push(self.group(path, doc)?);
        }

        Ok(Container {
            attributes,
            dimensions,
            variables: vars,
            groups: grps,
        })
    }

    fn variable(&self, parent: &[String], doc: &VariableDoc) -> Result<Variable> {
        let path = child(parent, "variables", &doc.meta.name);

        let data_type = parse_data_type(&doc.meta.datatype).map_err(|e| {
            SchemaError::compilation(join(&path, &[]), format!("data type: {}", e))
        })?;

        for dim in &doc.dimensions {
            if !self.scope.iter().any(|names| names.contains(dim)) {
                return Err(SchemaError::compilation(
                    join(&path, &["dimensions", dim]),
                    format!("dimension '{}' is not declared in this group or any parent", dim),
                ));
            }
        }

        let attributes = self.attributes(
            &path,
            &self.base.defaults.variable_attributes,
            &doc.attributes,
        )?;

        debug!(path = %join(&path, &[]), %data_type, "compiled variable");

        Ok(Variable {
            name: doc.meta.name.clone(),
            data_type,
            dimensions: doc.dimensions.clone(),
            attributes,
            meta: NodeMeta {
                description: doc.meta.description.clone(),
                required: doc.meta.required,
                ..NodeMeta::default()
            },
        })
    }

    fn group(&mut self, parent: &[String], doc: &GroupDoc) -> Result<Group> {
        let path = child(parent, "groups", &doc.meta.name);
        let base = self.base;
        let contents = self.container(
            &path,
            &base.defaults.group_attributes,
            &doc.attributes,
            &doc.dimensions,
            &doc.variables,
            &doc.groups,
        )?;

        Ok(Group {
            name: doc.meta.name.clone(),
            meta: NodeMeta {
                description: doc.meta.description.clone(),
                required: doc.meta.required,
                ..NodeMeta::default()
            },
            contents,
        })
    }
}

fn check_name(name: &str, path: &[String], kind: &str, seen: &mut HashSet<String>) -> Result<()> {
    if name.is_empty() {
        return Err(SchemaError::compilation(
            join(path, &[kind]),
            "names must not be empty",
        ));
    }
    if !seen.insert(name.to_string()) {
        return Err(SchemaError::compilation(
            join(path, &[kind, name]),
            format!("duplicate name '{}'", name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::{BaseType, Placeholder};
    use crate::project::ProjectDefaults;

    const DEFINITION: &str = r#"
meta:
  short_name: demo
attributes:
  title: Demo
  history: '<str: derived_from_file optional>'
dimensions:
  - name: time
    size: null
  - name: sps32
    size: 32
variables:
  - meta:
      name: temperature
      datatype: float32
    dimensions: [time]
    attributes:
      units: K
      valid_range: [200, 330]
groups:
  - meta:
      name: cloud
    dimensions:
      - name: bins
        size: 30
    variables:
      - meta:
          name: counts
          datatype: <int32>
        dimensions: [time, bins]
        attributes:
          flag_values: '<Array[int8]: derived_from_file>'
"#;

    fn project() -> ProjectModelSet {
        let defaults: ProjectDefaults = serde_yaml::from_str(
            r#"
global_attributes:
  Conventions: CF-1.8
  title: '<str: derived_from_file>'
variable_attributes:
  long_name: '<str: derived_from_file>'
  comment: '<str: derived_from_file optional>'
  units: "1"
"#,
        )
        .unwrap();
        ProjectModelSet::from_defaults(defaults)
    }

    #[test]
    fn test_compile_shape() {
        let ds = compile_str(DEFINITION, &ProjectModelSet::empty()).unwrap();
        assert_eq!(ds.name, "demo");
        assert_eq!(ds.contents.dimensions.len(), 2);
        assert_eq!(ds.contents.dimension("time").unwrap().size, DimensionSize::Unlimited);
        assert_eq!(ds.contents.dimension("sps32").unwrap().size, DimensionSize::Fixed(32));

        let temp = ds.contents.variable("temperature").unwrap();
        assert_eq!(temp.data_type, BaseType::Float32);
        assert_eq!(
            temp.attributes[1].kind,
            ConstraintKind::Literal(Literal::List(vec![Literal::Int(200), Literal::Int(330)]))
        );

        let counts = ds.contents.group("cloud").unwrap().contents.variable("counts").unwrap();
        assert_eq!(counts.data_type, BaseType::Int32);
        assert_eq!(
            counts.attributes[0].kind,
            ConstraintKind::Placeholder(Placeholder::new(BaseType::Int8, true, true))
        );

        // dataset + 2 dims + 1 var + group + 1 dim + 1 var
        assert_eq!(ds.node_count(), 7);
    }

    #[test]
    fn test_defaults_merge_in_order_with_overrides() {
        let ds = compile_str(DEFINITION, &project()).unwrap();

        let globals: Vec<&str> = ds.contents.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(globals, vec!["Conventions", "title", "history"]);
        assert_eq!(
            ds.contents.attribute("title").unwrap().kind,
            ConstraintKind::Literal(Literal::Str("Demo".into()))
        );

        let temp = ds.contents.variable("temperature").unwrap();
        let names: Vec<&str> = temp.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["long_name", "comment", "units", "valid_range"]);
        assert_eq!(
            temp.attributes[2].kind,
            ConstraintKind::Literal(Literal::Str("K".into()))
        );
    }

    #[test]
    fn test_null_override_removes_default() {
        let yaml = r#"
variables:
  - meta: {name: x, datatype: int32}
    attributes:
      comment: null
"#;
        let ds = compile_str(yaml, &project()).unwrap();
        let x = ds.contents.variable("x").unwrap();
        assert!(x.attributes.iter().all(|a| a.name != "comment"));
        assert_eq!(x.attributes.len(), 2);
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let a = compile_str(DEFINITION, &project()).unwrap();
        let b = compile_str(DEFINITION, &project()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_sibling_names() {
        let yaml = r#"
variables:
  - meta: {name: x, datatype: int32}
  - meta: {name: x, datatype: int32}
"#;
        let err = compile_str(yaml, &ProjectModelSet::empty()).unwrap_err();
        match err {
            SchemaError::Compilation { path, .. } => assert_eq!(path, "root -> variables -> x"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_same_name_allowed_across_kinds() {
        let yaml = r#"
dimensions:
  - {name: time, size: 10}
variables:
  - meta: {name: time, datatype: float64}
    dimensions: [time]
"#;
        assert!(compile_str(yaml, &ProjectModelSet::empty()).is_ok());
    }

    #[test]
    fn test_unknown_dimension_reference() {
        let yaml = r#"
variables:
  - meta: {name: x, datatype: int32}
    dimensions: [nope]
"#;
        let err = compile_str(yaml, &ProjectModelSet::empty()).unwrap_err();
        match err {
            SchemaError::Compilation { path, .. } => {
                assert_eq!(path, "root -> variables -> x -> dimensions -> nope")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_child_group_dimension_not_visible_to_parent() {
        let yaml = r#"
variables:
  - meta: {name: x, datatype: int32}
    dimensions: [inner]
groups:
  - meta: {name: g}
    dimensions:
      - {name: inner, size: 2}
"#;
        assert!(compile_str(yaml, &ProjectModelSet::empty()).is_err());
    }

    #[test]
    fn test_unknown_data_type() {
        let yaml = "variables:\n  - meta: {name: x, datatype: double}\n";
        let err = compile_str(yaml, &ProjectModelSet::empty()).unwrap_err();
        assert!(err.is_compilation_error());
        assert!(err.to_string().contains("double"));
    }

    #[test]
    fn test_malformed_placeholder_is_syntax_error() {
        let yaml = "attributes:\n  title: '<str: derived>'\n";
        let err = compile_str(yaml, &ProjectModelSet::empty()).unwrap_err();
        match err {
            SchemaError::Syntax { token, path, .. } => {
                assert_eq!(token, "<str: derived>");
                assert_eq!(path, "root -> attributes -> title");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_placeholder_inside_list_rejected() {
        let yaml = "attributes:\n  keywords: [a, '<str: derived_from_file>']\n";
        let err = compile_str(yaml, &ProjectModelSet::empty()).unwrap_err();
        assert!(matches!(err, SchemaError::Compilation { .. }));
    }

    #[test]
    fn test_boolean_attribute_rejected() {
        let yaml = "attributes:\n  flag: true\n";
        assert!(compile_str(yaml, &ProjectModelSet::empty()).is_err());
    }

    #[test]
    fn test_standard_holds_global_defaults_only() {
        let defaults: ProjectDefaults = serde_yaml::from_str(
            "conventions: ACME-1.0\nglobal_attributes:\n  Conventions: ACME-1.0\n  title: '<str: derived_from_file>'\nvariable_attributes:\n  units: '<str: derived_from_file>'\n",
        )
        .unwrap();
        let standard = compile_standard(&ProjectModelSet::from_defaults(defaults)).unwrap();

        assert_eq!(standard.name, "ACME-1.0");
        let names: Vec<&str> = standard.contents.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Conventions", "title"]);
        assert!(standard.contents.variables.is_empty());
        assert_eq!(standard.node_count(), 1);
    }

    #[test]
    fn test_mixed_text_and_number_list_rejected() {
        let err = compile_str("attributes:\n  mixed: [a, 1]\n", &ProjectModelSet::empty())
            .unwrap_err();
        match err {
            SchemaError::Compilation { path, .. } => {
                assert_eq!(path, "root -> attributes -> mixed")
            }
            other => panic!("Expected Compilation, got {:?}", other),
        }

        let ok = compile_str("attributes:\n  range: [0, 2.5]\n  tags: [a, b]\n", &ProjectModelSet::empty());
        assert!(ok.is_ok());
    }
}

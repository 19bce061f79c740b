//! Synthetic example files
//!
//! Builds a [`SourceGroup`] that satisfies every constraint of a definition:
//! literals are copied verbatim and placeholders get a fixed example value of
//! the right type. Variable data is not produced.

use std::collections::BTreeMap;
use tracing::debug;

use crate::attribute::{AttrValue, AttributeConstraint, ConstraintKind, Scalar};
use crate::schema::{Container, Dataset, DimensionSize};
use crate::source::{SourceDimension, SourceGroup, SourceVariable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExampleOptions {
    /// Size given to unlimited dimensions
    pub unlimited_length: u64,
}

impl Default for ExampleOptions {
    fn default() -> Self {
        Self { unlimited_length: 1 }
    }
}

pub fn synthesize(dataset: &Dataset, options: &ExampleOptions) -> SourceGroup {
    let root = container(dataset.product_name(), &dataset.contents, options);
    debug!(definition = %dataset.name, "synthesized example file");
    root
}

fn attributes(constraints: &[AttributeConstraint]) -> BTreeMap<String, AttrValue> {
    constraints
        .iter()
        .map(|c| {
            let value = match &c.kind {
                ConstraintKind::Literal(literal) => literal.to_value(),
                ConstraintKind::Placeholder(p) if p.is_array => {
                    AttrValue::Array(p.base_type, vec![Scalar::example(p.base_type)])
                }
                ConstraintKind::Placeholder(p) => AttrValue::Scalar(Scalar::example(p.base_type)),
            };
            (c.name.clone(), value)
        })
        .collect()
}

fn container(name: &str, schema: &Container, options: &ExampleOptions) -> SourceGroup {
    SourceGroup {
        name: name.to_string(),
        attributes: attributes(&schema.attributes),
        dimensions: schema
            .dimensions
            .iter()
            .map(|d| match d.size {
                DimensionSize::Fixed(size) => SourceDimension {
                    name: d.name.clone(),
                    size,
                    unlimited: false,
                },
                DimensionSize::Unlimited => SourceDimension {
                    name: d.name.clone(),
                    size: options.unlimited_length,
                    unlimited: true,
                },
            })
            .collect(),
        variables: schema
            .variables
            .iter()
            .map(|v| SourceVariable {
                name: v.name.clone(),
                data_type: v.data_type,
                dimensions: v.dimensions.clone(),
                attributes: attributes(&v.attributes),
            })
            .collect(),
        groups: schema
            .groups
            .iter()
            .map(|g| container(&g.name, &g.contents, options))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_str;
    use crate::json_schema::{check_document, derive_json_schema};
    use crate::project::{ProjectDefaults, ProjectModelSet};
    use crate::validator::{validate, ValidateOptions, Validator};

    const DEFINITION: &str = r#"
meta: {short_name: demo}
attributes:
  title: Demo
  revision: 3
  keywords: [a, b]
  comment: '<str: derived_from_file optional>'
dimensions:
  - {name: time, size: null}
  - {name: sps, size: 4}
variables:
  - meta: {name: temperature, datatype: float32}
    dimensions: [time, sps]
    attributes:
      valid_range: [0, 2.5]
      flags: '<Array[int16]: derived_from_file>'
      scale: '<float64: derived_from_file>'
groups:
  - meta: {name: cloud, required: false}
    variables:
      - meta: {name: counts, datatype: byte}
        dimensions: [time]
        attributes:
          code: '<char: derived_from_file>'
"#;

    fn project() -> ProjectModelSet {
        let defaults: ProjectDefaults = serde_yaml::from_str(
            "variable_attributes:\n  long_name: '<str: derived_from_file>'\n",
        )
        .unwrap();
        ProjectModelSet::from_defaults(defaults)
    }

    #[test]
    fn test_synthetic_file_validates() {
        let dataset = compile_str(DEFINITION, &project()).unwrap();
        let source = synthesize(&dataset, &ExampleOptions { unlimited_length: 7 });

        assert_eq!(source.dimension("time").unwrap().size, 7);
        assert!(source.dimension("time").unwrap().unlimited);
        assert!(source.group("cloud").is_some());

        let closed = Validator::new(ValidateOptions {
            allow_unknown: false,
            ..ValidateOptions::default()
        });
        assert!(closed.validate(&dataset, &source).is_empty());
        assert!(validate(&dataset, &source).is_empty());

        let errors = check_document(&derive_json_schema(&dataset), &source.to_plain_json()).unwrap();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_placeholder_examples() {
        let dataset = compile_str(DEFINITION, &project()).unwrap();
        let source = synthesize(&dataset, &ExampleOptions::default());
        let temp = source.variable("temperature").unwrap();

        assert_eq!(temp.attributes["long_name"], AttrValue::text("derived_from_file"));
        assert_eq!(temp.attributes["scale"], AttrValue::Scalar(Scalar::Float64(0.0)));
        assert_eq!(temp.attributes["flags"].type_label(), "Array[int16]");
        assert_eq!(source.name, "demo");
    }
}

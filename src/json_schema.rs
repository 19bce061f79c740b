//! JSON Schema export
//!
//! The exported document describes structure only: which groups, dimensions,
//! variables and attributes exist, whether they are required, and what JSON
//! type their values have. Literal values and dimension sizes are checked by
//! [`crate::validator`] and are not repeated here.
//!
//! Documents are draft-07 and apply to the keyed form produced by
//! [`crate::source::SourceGroup::to_plain_json`].

use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::attribute::{AttributeConstraint, ConstraintKind, Literal};
use crate::error::{Result, SchemaError};
use crate::placeholder::BaseType;
use crate::schema::{Container, Dataset, NodeMeta, Variable};

const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

/// JSON Schema for a single product
pub fn derive_json_schema(dataset: &Dataset) -> Value {
    let mut schema = container_schema(&dataset.contents, &dataset.meta);
    if let Value::Object(map) = &mut schema {
        map.insert("$schema".into(), json!(DRAFT_07));
        map.insert("title".into(), json!(dataset.product_name()));
    }
    schema
}

/// Release-wide `dataset_schema.json`: any one of the products
pub fn release_json_schema(products: &BTreeMap<String, Dataset>) -> Value {
    let definitions: Map<String, Value> = products
        .iter()
        .map(|(name, ds)| (name.clone(), container_schema(&ds.contents, &ds.meta)))
        .collect();

    let refs: Vec<Value> = products
        .keys()
        .map(|name| json!({ "$ref": format!("#/definitions/{}", pointer_escape(name)) }))
        .collect();

    json!({
        "$schema": DRAFT_07,
        "title": "dataset",
        "definitions": definitions,
        "anyOf": refs,
    })
}

/// Check a plain JSON document against a derived schema. Returns one message
/// per violation; an empty list means the document conforms.
pub fn check_document(schema: &Value, document: &Value) -> Result<Vec<String>> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| SchemaError::InvalidFormat(format!("invalid JSON Schema: {}", e)))?;

    let messages = match compiled.validate(document) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect(),
    };
    Ok(messages)
}

fn pointer_escape(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

fn describe(mut schema: Value, meta: &NodeMeta) -> Value {
    if let (Value::Object(map), Some(description)) = (&mut schema, &meta.description) {
        map.insert("description".into(), json!(description));
    }
    schema
}

/// Object keyed by name. `required` lists the names that must be present.
fn keyed(properties: Map<String, Value>, required: Vec<&str>) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn container_schema(container: &Container, meta: &NodeMeta) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    let (attrs, attrs_required) = attributes_schema(&container.attributes);
    if attrs_required {
        required.push("attributes");
    }
    properties.insert("attributes".into(), attrs);

    let dims: Map<String, Value> = container
        .dimensions
        .iter()
        .map(|d| {
            let schema = json!({ "type": "integer", "minimum": 0 });
            (d.name.clone(), describe(schema, &d.meta))
        })
        .collect();
    let dims_required: Vec<&str> = container
        .dimensions
        .iter()
        .filter(|d| d.meta.required)
        .map(|d| d.name.as_str())
        .collect();
    if !dims_required.is_empty() {
        required.push("dimensions");
    }
    properties.insert("dimensions".into(), keyed(dims, dims_required));

    let vars: Map<String, Value> = container
        .variables
        .iter()
        .map(|v| (v.name.clone(), variable_schema(v)))
        .collect();
    let vars_required: Vec<&str> = container
        .variables
        .iter()
        .filter(|v| v.meta.required)
        .map(|v| v.name.as_str())
        .collect();
    if !vars_required.is_empty() {
        required.push("variables");
    }
    properties.insert("variables".into(), keyed(vars, vars_required));

    let groups: Map<String, Value> = container
        .groups
        .iter()
        .map(|g| (g.name.clone(), container_schema(&g.contents, &g.meta)))
        .collect();
    let groups_required: Vec<&str> = container
        .groups
        .iter()
        .filter(|g| g.meta.required)
        .map(|g| g.name.as_str())
        .collect();
    if !groups_required.is_empty() {
        required.push("groups");
    }
    properties.insert("groups".into(), keyed(groups, groups_required));

    describe(
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
        meta,
    )
}

fn variable_schema(variable: &Variable) -> Value {
    let (attrs, _) = attributes_schema(&variable.attributes);
    describe(
        json!({
            "type": "object",
            "properties": {
                "datatype": { "enum": [variable.data_type.as_str()] },
                "dimensions": { "type": "array", "items": { "type": "string" } },
                "attributes": attrs,
            },
            "required": ["datatype", "dimensions", "attributes"],
        }),
        &variable.meta,
    )
}

/// Attributes block plus whether any attribute in it is required
fn attributes_schema(constraints: &[AttributeConstraint]) -> (Value, bool) {
    let properties: Map<String, Value> = constraints
        .iter()
        .map(|c| (c.name.clone(), attribute_schema(c)))
        .collect();
    let required: Vec<&str> = constraints
        .iter()
        .filter(|c| c.is_required())
        .map(|c| c.name.as_str())
        .collect();
    let any_required = !required.is_empty();
    (keyed(properties, required), any_required)
}

fn scalar_type(base_type: BaseType) -> Value {
    if base_type.is_float() {
        // NaN fill values are written as null
        json!(["number", "null"])
    } else {
        json!(base_type.json_type())
    }
}

fn literal_types(literal: &Literal) -> Vec<&'static str> {
    match literal {
        Literal::Str(_) => vec!["string"],
        Literal::Int(_) | Literal::Float(_) => vec!["number"],
        Literal::List(items) => {
            // One-element lists may be stored as scalars
            let mut types = vec!["array"];
            for item in items {
                for t in literal_types(item) {
                    if !types.contains(&t) {
                        types.push(t);
                    }
                }
            }
            types
        }
    }
}

fn attribute_schema(constraint: &AttributeConstraint) -> Value {
    match &constraint.kind {
        ConstraintKind::Literal(literal) => {
            let types = literal_types(literal);
            if types.len() == 1 {
                json!({ "type": types[0] })
            } else {
                json!({ "type": types })
            }
        }
        ConstraintKind::Placeholder(p) if p.is_array => json!({
            "anyOf": [
                { "type": scalar_type(p.base_type) },
                { "type": "array", "items": { "type": scalar_type(p.base_type) } },
            ]
        }),
        ConstraintKind::Placeholder(p) => json!({ "type": scalar_type(p.base_type) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttrValue, Scalar};
    use crate::compiler::compile_str;
    use crate::project::ProjectModelSet;
    use crate::source::{SourceGroup, SourceVariable};

    const DEFINITION: &str = r#"
meta: {short_name: demo, description: Demo product}
attributes:
  title: Demo
  comment: '<str: derived_from_file optional>'
dimensions:
  - {name: time, size: null}
variables:
  - meta: {name: temperature, datatype: float32}
    dimensions: [time]
    attributes:
      units: K
      flag_values: '<Array[int8]: derived_from_file>'
"#;

    fn dataset() -> Dataset {
        compile_str(DEFINITION, &ProjectModelSet::empty()).unwrap()
    }

    fn source() -> SourceGroup {
        SourceGroup::new("root")
            .with_attribute("title", AttrValue::text("Demo"))
            .with_dimension("time", 5, true)
            .with_variable(
                SourceVariable::new("temperature", BaseType::Float32, &["time"])
                    .with_attribute("units", AttrValue::text("K"))
                    .with_attribute("flag_values", AttrValue::Scalar(Scalar::Int8(1))),
            )
    }

    #[test]
    fn test_schema_shape() {
        let schema = derive_json_schema(&dataset());
        assert_eq!(schema["title"], json!("demo"));
        assert_eq!(schema["description"], json!("Demo product"));
        assert_eq!(
            schema["properties"]["attributes"]["required"],
            json!(["title"])
        );
        let temp = &schema["properties"]["variables"]["properties"]["temperature"];
        assert_eq!(temp["properties"]["datatype"]["enum"], json!(["float32"]));
        // Literal values are not exported
        assert!(temp["properties"]["attributes"]["properties"]["units"].get("const").is_none());
    }

    #[test]
    fn test_conforming_document_passes() {
        let schema = derive_json_schema(&dataset());
        let errors = check_document(&schema, &source().to_plain_json()).unwrap();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_structural_violations() {
        let schema = derive_json_schema(&dataset());

        let mut missing = source();
        missing.attributes.remove("title");
        assert!(!check_document(&schema, &missing.to_plain_json()).unwrap().is_empty());

        let mut wrong_type = source();
        wrong_type.variable_mut("temperature").unwrap().data_type = BaseType::Float64;
        assert!(!check_document(&schema, &wrong_type.to_plain_json()).unwrap().is_empty());

        // Values are not checked, only types
        let mut other_value = source();
        other_value.attributes.insert("title".into(), AttrValue::text("Other"));
        assert!(check_document(&schema, &other_value.to_plain_json()).unwrap().is_empty());
    }

    #[test]
    fn test_release_schema_accepts_any_product() {
        let mut products = BTreeMap::new();
        products.insert("demo".to_string(), dataset());
        products.insert(
            "other".to_string(),
            compile_str("attributes: {mission: X}\n", &ProjectModelSet::empty()).unwrap(),
        );

        let schema = release_json_schema(&products);
        assert_eq!(schema["anyOf"][0]["$ref"], json!("#/definitions/demo"));

        let doc = source().to_plain_json();
        assert!(check_document(&schema, &doc).unwrap().is_empty());
        assert!(!check_document(&schema, &json!({"attributes": {}})).unwrap().is_empty());
    }
}

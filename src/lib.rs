//! ncvocab
//!
//! Versioned, declarative definitions for netCDF data products, and a checker
//! that tells you whether a file meets one.
//!
//! ## Features
//!
//! - **Definitions**: products are described in YAML, layered over
//!   project-wide default attributes
//! - **Placeholders**: attributes whose value varies per file are pinned by
//!   type only (`<float32: derived_from_file>`)
//! - **Path-qualified reports**: every problem in a file is reported in one
//!   pass, addressed from the root (`root -> variables -> t -> attributes -> units`)
//! - **Immutable releases**: frozen versions with JSON Schema and SHA256 checksums
//! - **Compatibility checking**: breaking-change detection between versions
//!
//! ## Architecture
//!
//! ```text
//! defaults.yaml + definitions/*.yaml
//!         │
//!         ▼  compiler::compile
//!      Dataset ──────────────► validator::validate(source) ──► Report
//!         │
//!         ▼  VersionStore::freeze
//! products/
//! ├── v1.0/
//! │   ├── core.json
//! │   ├── dataset_schema.json
//! │   ├── manifest.json
//! │   └── checksums.sha256
//! └── latest/
//! ```

pub mod attribute;
pub mod checksum;
pub mod compatibility;
pub mod compiler;
pub mod config;
pub mod definition;
pub mod diagnostics;
pub mod error;
pub mod example;
pub mod json_schema;
pub mod placeholder;
pub mod project;
pub mod project_registry;
pub mod registry;
pub mod scaffold;
pub mod schema;
pub mod source;
pub mod validator;
pub mod version;

pub use attribute::{AttrValue, AttributeConstraint, ConstraintKind, Literal, Scalar};
pub use checksum::Checksum;
pub use compatibility::{compare, CompatibilityChecker, CompatibilityResult};
pub use compiler::{compile, compile_file, merge_attributes};
pub use config::ToolConfig;
pub use diagnostics::{Diagnostic, Report, Severity, Verbosity};
pub use error::{Result, SchemaError};
pub use json_schema::derive_json_schema;
pub use placeholder::{parse_placeholder, BaseType, Placeholder};
pub use project::ProjectModelSet;
pub use project_registry::ProjectRegistry;
pub use registry::VersionStore;
pub use schema::{Dataset, Dimension, DimensionSize, Group, Variable};
pub use source::{DataSource, JsonDump, SourceGroup};
pub use validator::{validate, ValidateOptions, Validator};
pub use version::SchemaVersion;

//! Tool configuration
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (ncvocab.toml, .ncvocab.toml, config/ncvocab.toml)
//! - The user config directory
//! - An explicit file passed with `--config`
//! - Environment variables (NCVOCAB__SECTION__KEY)
//!
//! ## Example config file (ncvocab.toml):
//! ```toml
//! [project]
//! path = "."
//! definitions_dir = "definitions"
//! defaults_file = "defaults.yaml"
//! registry = "/home/me/.config/ncvocab/registry.yaml"
//!
//! [check]
//! allow_unknown = true
//!
//! [check.severity]
//! value_mismatch = "warning"
//!
//! [release]
//! output_dir = "products"
//! output_format = "pretty"
//! write_checksums = true
//!
//! [example]
//! unlimited_length = 1
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::diagnostics::SeverityPolicy;
use crate::example::ExampleOptions;
use crate::project_registry::ProjectRegistry;
use crate::registry::StoreOptions;
use crate::validator::ValidateOptions;

pub const CONFIG_FILE: &str = "ncvocab.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub release: ReleaseConfig,

    #[serde(default)]
    pub example: ExampleConfig,
}

/// Where the project lives and how it is laid out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_project_path")]
    pub path: PathBuf,

    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,

    #[serde(default = "default_defaults_file")]
    pub defaults_file: PathBuf,

    /// Project registry file [default: registry.yaml in the user config dir]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<PathBuf>,
}

/// Validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Permit attributes, dimensions, variables and groups that the
    /// definition does not mention
    #[serde(default = "default_true")]
    pub allow_unknown: bool,

    #[serde(default)]
    pub severity: SeverityPolicy,
}

/// Release (create-version) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default = "default_true")]
    pub write_checksums: bool,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Synthetic file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleConfig {
    /// Size given to unlimited dimensions
    #[serde(default = "default_unlimited_length")]
    pub unlimited_length: u64,
}

fn default_true() -> bool {
    true
}

fn default_project_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from(crate::project::DEFINITIONS_DIR)
}

fn default_defaults_file() -> PathBuf {
    PathBuf::from(crate::project::DEFAULTS_FILE)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("products")
}

fn default_unlimited_length() -> u64 {
    1
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: default_project_path(),
            definitions_dir: default_definitions_dir(),
            defaults_file: default_defaults_file(),
            registry: None,
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            allow_unknown: true,
            severity: SeverityPolicy::default(),
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            output_format: OutputFormat::Pretty,
            write_checksums: true,
        }
    }
}

impl Default for ExampleConfig {
    fn default() -> Self {
        Self {
            unlimited_length: default_unlimited_length(),
        }
    }
}

impl ToolConfig {
    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["ncvocab.toml", ".ncvocab.toml", "config/ncvocab.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("org", "ncvocab", "ncvocab") {
            let user_config = dirs.config_dir().join(CONFIG_FILE);
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("NCVOCAB")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.to_toml()?)
    }

    pub fn to_toml(&self) -> std::io::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn validate_options(&self) -> ValidateOptions {
        ValidateOptions {
            allow_unknown: self.check.allow_unknown,
            policy: self.check.severity,
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            output_format: self.release.output_format,
            write_checksums: self.release.write_checksums,
        }
    }

    pub fn registry_path(&self) -> Option<PathBuf> {
        self.project
            .registry
            .clone()
            .or_else(ProjectRegistry::default_path)
    }

    pub fn example_options(&self) -> ExampleOptions {
        ExampleOptions {
            unlimited_length: self.example.unlimited_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ToolConfig::default();
        assert!(config.check.allow_unknown);
        assert_eq!(config.release.output_dir, PathBuf::from("products"));
        assert_eq!(config.example.unlimited_length, 1);
        assert_eq!(config.check.severity.unknown_element, Severity::Warning);
    }

    #[test]
    fn test_serialize_config() {
        let toml_str = ToolConfig::default().to_toml().unwrap();
        assert!(toml_str.contains("[project]"));
        assert!(toml_str.contains("[check.severity]"));
        assert!(toml_str.contains("[release]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[check]\nallow_unknown = false\n\n[check.severity]\nvalue_mismatch = \"warning\"\n\n[release]\noutput_format = \"compact\"\n",
        )
        .unwrap();

        let config = ToolConfig::load_from(Some(&path)).unwrap();
        assert!(!config.check.allow_unknown);
        assert_eq!(config.check.severity.value_mismatch, Severity::Warning);
        assert_eq!(config.check.severity.missing, Severity::Error);
        assert_eq!(config.release.output_format, OutputFormat::Compact);

        let options = config.validate_options();
        assert!(!options.allow_unknown);
        assert!(config.store_options().write_checksums);
    }

    #[test]
    fn test_registry_path_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[project]\nregistry = \"/srv/ncvocab/registry.yaml\"\n").unwrap();

        let config = ToolConfig::load_from(Some(&path)).unwrap();
        assert_eq!(
            config.registry_path(),
            Some(PathBuf::from("/srv/ncvocab/registry.yaml"))
        );
        assert!(!ToolConfig::default().to_toml().unwrap().contains("registry"));
    }
}

//! New project scaffolding

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{ToolConfig, CONFIG_FILE};
use crate::error::Result;
use crate::project::{DEFAULTS_FILE, DEFINITIONS_DIR};

const DEFAULTS_TEMPLATE: &str = r#"# Project-wide default attributes.
#
# Every product definition starts from these; a product may override a
# default by name, or remove it with `null`.

conventions: CF-1.8

global_attributes:
  Conventions: CF-1.8
  title: "<str: derived_from_file>"
  date_created: "<str: derived_from_file>"

group_attributes: {}

variable_attributes:
  long_name: "<str: derived_from_file>"
  units: "<str: derived_from_file>"
  comment: "<str: derived_from_file optional>"
"#;

const DEFINITION_TEMPLATE: &str = r#"meta:
  short_name: example
  file_pattern: example_{date}.nc
  description: Example product

attributes:
  title: Example product

dimensions:
  - name: time
    size: null

variables:
  - meta:
      name: time
      datatype: int32
    dimensions: [time]
    attributes:
      long_name: Time of measurement
      units: "<str: derived_from_file>"
      standard_name: time
"#;

/// Files created by [`init_project`], relative to the project root
pub fn scaffold_files() -> Vec<PathBuf> {
    vec![
        PathBuf::from(DEFAULTS_FILE),
        Path::new(DEFINITIONS_DIR).join("example.yaml"),
        PathBuf::from(CONFIG_FILE),
    ]
}

/// Create a new project at `dir`.
///
/// Refuses to touch a directory that already holds any of the files it
/// would write.
pub fn init_project(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();

    let targets: Vec<PathBuf> = scaffold_files().into_iter().map(|f| dir.join(f)).collect();
    if let Some(existing) = targets.iter().find(|p| p.exists()) {
        return Err(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("{} already exists, not overwriting", existing.display()),
        )
        .into());
    }

    fs::create_dir_all(dir.join(DEFINITIONS_DIR))?;
    fs::write(&targets[0], DEFAULTS_TEMPLATE)?;
    fs::write(&targets[1], DEFINITION_TEMPLATE)?;
    ToolConfig::default().save(&targets[2])?;

    info!(path = %dir.display(), "initialised project");
    Ok(targets)
}

//! Project base models
//!
//! A project directory looks like:
//!
//! ```text
//! my-project/
//! ├── defaults.yaml      # project-wide default attributes
//! ├── definitions/
//! │   ├── core.yaml
//! │   └── core_1hz.yaml
//! └── ncvocab.toml       # optional tool configuration
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::definition::DefinitionDocument;
use crate::error::{Result, SchemaError};

pub const DEFAULTS_FILE: &str = "defaults.yaml";
pub const DEFINITIONS_DIR: &str = "definitions";

/// Default attribute layers applied under every product definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDefaults {
    /// Conventions name, e.g. `CF-1.8`
    #[serde(default)]
    pub conventions: Option<String>,
    #[serde(default)]
    pub global_attributes: Mapping,
    #[serde(default)]
    pub group_attributes: Mapping,
    #[serde(default)]
    pub variable_attributes: Mapping,
}

/// A loaded project: its defaults plus where to find definitions
#[derive(Debug, Clone, Default)]
pub struct ProjectModelSet {
    pub root: PathBuf,
    pub definitions_dir: PathBuf,
    pub defaults: ProjectDefaults,
}

impl ProjectModelSet {
    /// A project with no default attributes
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_defaults(defaults: ProjectDefaults) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    /// Open a project using the standard layout
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(root, DEFAULTS_FILE, DEFINITIONS_DIR)
    }

    /// Open a project with custom file locations (relative to `root`).
    ///
    /// A missing defaults file means no defaults.
    pub fn open_with(
        root: impl AsRef<Path>,
        defaults_file: impl AsRef<Path>,
        definitions_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(SchemaError::NotFound {
                name: format!("project directory {}", root.display()),
                version: "-".to_string(),
            });
        }

        let defaults_path = root.join(defaults_file);
        let defaults = if defaults_path.is_file() {
            debug!(path = %defaults_path.display(), "loading project defaults");
            let content = fs::read_to_string(&defaults_path)?;
            serde_yaml::from_str(&content)?
        } else {
            debug!(path = %defaults_path.display(), "no project defaults file");
            ProjectDefaults::default()
        };

        Ok(Self {
            definitions_dir: root.join(definitions_dir),
            root,
            defaults,
        })
    }

    /// Display name: the conventions string, else the directory name
    pub fn name(&self) -> String {
        if let Some(conventions) = &self.defaults.conventions {
            return conventions.clone();
        }
        self.root
            .canonicalize()
            .ok()
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string())
    }

    /// Definition files in the project, sorted by path
    pub fn definitions(&self) -> Result<Vec<PathBuf>> {
        if !self.definitions_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&self.definitions_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Find the definition whose `file_pattern` matches a file name
    pub fn find_definition_for(&self, filename: &str) -> Result<Option<PathBuf>> {
        for path in self.definitions()? {
            let doc = match DefinitionDocument::from_path(&path) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable definition");
                    continue;
                }
            };
            if let Some(pattern) = doc.meta.file_pattern.as_deref() {
                if file_pattern_regex(pattern).is_match(filename) {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }
}

/// Turn `core_{date}_r{revision}.nc` into an anchored regex where each
/// `{token}` matches one or more characters.
pub fn file_pattern_regex(pattern: &str) -> Regex {
    let mut re = String::from("^");
    let mut rest = pattern;
    while let Some(start) = rest.find('{') {
        re.push_str(&regex::escape(&rest[..start]));
        match rest[start..].find('}') {
            Some(end) => {
                re.push_str(".+?");
                rest = &rest[start + end + 1..];
            }
            None => {
                re.push_str(&regex::escape(&rest[start..]));
                rest = "";
            }
        }
    }
    re.push_str(&regex::escape(rest));
    re.push('$');
    // Every literal segment is escaped, so this cannot fail
    Regex::new(&re).unwrap_or_else(|_| Regex::new("^$").expect("empty regex is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_pattern_matching() {
        let re = file_pattern_regex("core_faam_{date}_v005_r{revision}_{flight}.nc");
        assert!(re.is_match("core_faam_20240101_v005_r0_c123.nc"));
        assert!(!re.is_match("core_faam_20240101_v004_r0_c123.nc"));
        assert!(!re.is_match("xcore_faam_20240101_v005_r0_c123.nc"));

        let literal = file_pattern_regex("plain.nc");
        assert!(literal.is_match("plain.nc"));
        assert!(!literal.is_match("plainxnc"));
    }

    #[test]
    fn test_open_project_without_defaults() {
        let dir = tempdir().unwrap();
        let project = ProjectModelSet::open(dir.path()).unwrap();
        assert!(project.defaults.global_attributes.is_empty());
        assert!(project.definitions().unwrap().is_empty());
    }

    #[test]
    fn test_open_project_and_find_definition() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(DEFAULTS_FILE),
            "global_attributes:\n  Conventions: CF-1.8\nvariable_attributes:\n  long_name: \"<str: derived_from_file>\"\n",
        )
        .unwrap();
        let defs = dir.path().join(DEFINITIONS_DIR);
        fs::create_dir(&defs).unwrap();
        fs::write(defs.join("b.yaml"), "meta:\n  file_pattern: b_{date}.nc\n").unwrap();
        fs::write(defs.join("a.yaml"), "meta:\n  file_pattern: a_{date}.nc\n").unwrap();
        fs::write(defs.join("notes.txt"), "ignored").unwrap();

        let project = ProjectModelSet::open(dir.path()).unwrap();
        assert_eq!(project.defaults.global_attributes.len(), 1);

        let files = project.definitions().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.yaml"));

        let found = project.find_definition_for("b_20240101.nc").unwrap().unwrap();
        assert!(found.ends_with("b.yaml"));
        assert!(project.find_definition_for("c_20240101.nc").unwrap().is_none());
    }

    #[test]
    fn test_project_name() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("acme");
        fs::create_dir(&root).unwrap();
        assert_eq!(ProjectModelSet::open(&root).unwrap().name(), "acme");

        fs::write(root.join(DEFAULTS_FILE), "conventions: ACME-1.0\n").unwrap();
        assert_eq!(ProjectModelSet::open(&root).unwrap().name(), "ACME-1.0");
        assert_eq!(ProjectModelSet::empty().name(), "project");
    }

    #[test]
    fn test_missing_project_dir() {
        let dir = tempdir().unwrap();
        assert!(ProjectModelSet::open(dir.path().join("nope")).is_err());
    }
}

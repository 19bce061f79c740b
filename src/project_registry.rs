//! User-level project registry
//!
//! `ncvocab register` records where a project lives, keyed by the name in
//! its conventions string. `check` uses the registry to find the projects a
//! file claims to follow from its global `Conventions` attribute, e.g.
//! `"CF-1.8 ACME-1.0"`.
//!
//! ```yaml
//! ACME:
//!   spec: {name: ACME, has_major: true, has_minor: true}
//!   path: /home/me/acme-vocab
//!   definitions: /home/me/acme-vocab/definitions
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::project::{ProjectModelSet, DEFAULTS_FILE};

pub const REGISTRY_FILE: &str = "registry.yaml";

/// Which conventions names a project answers to: `ACME`, `ACME-[]` or
/// `ACME-[].[]`, where `[]` stands for a version number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConventionSpec {
    pub name: String,
    pub has_major: bool,
    pub has_minor: bool,
}

fn spec_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>[A-Za-z0-9]+)(?:-(?P<major>\[\])(?:\.(?P<minor>\[\]))?)?$")
            .expect("conventions spec regex is valid")
    })
}

impl ConventionSpec {
    pub fn parse(conventions: &str) -> Result<Self> {
        let caps = spec_regex().captures(conventions.trim()).ok_or_else(|| {
            SchemaError::InvalidFormat(format!(
                "invalid conventions string '{}', expected NAME, NAME-[] or NAME-[].[]",
                conventions
            ))
        })?;
        Ok(Self {
            name: caps["name"].to_string(),
            has_major: caps.name("major").is_some(),
            has_minor: caps.name("minor").is_some(),
        })
    }

    /// True if one convention token (`ACME-1.0`) names this project
    pub fn matches(&self, convention: &str) -> bool {
        let mut pattern = format!("^{}", regex::escape(&self.name));
        if self.has_major {
            pattern.push_str(r"-\d+");
        }
        if self.has_minor {
            pattern.push_str(r"\.\d+");
        }
        pattern.push_str(r"(?:[-.]|$)");
        Regex::new(&pattern)
            .map(|re| re.is_match(convention))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredProject {
    pub spec: ConventionSpec,
    pub path: PathBuf,
    pub definitions: PathBuf,
}

impl RegisteredProject {
    pub fn open(&self) -> Result<ProjectModelSet> {
        ProjectModelSet::open_with(&self.path, DEFAULTS_FILE, &self.definitions)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectRegistry {
    projects: BTreeMap<String, RegisteredProject>,
}

impl ProjectRegistry {
    /// `registry.yaml` in the user's config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "ncvocab", "ncvocab")
            .map(|dirs| dirs.config_dir().join(REGISTRY_FILE))
    }

    /// Load a registry; a missing or empty file is an empty registry
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            debug!(path = %path.display(), "no project registry");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Register a project under its conventions name. An existing entry is
    /// only replaced with `force`.
    pub fn add(&mut self, project: RegisteredProject, force: bool) -> Result<()> {
        let name = project.spec.name.clone();
        if self.projects.contains_key(&name) && !force {
            return Err(SchemaError::AlreadyRegistered { name });
        }
        info!(name = %name, path = %project.path.display(), "registered project");
        self.projects.insert(name, project);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<RegisteredProject> {
        self.projects.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredProject> {
        self.projects.get(name)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Projects named by a conventions attribute, in registry order.
    /// Tokens are separated by whitespace or commas.
    pub fn matching(&self, conventions: &str) -> Vec<&RegisteredProject> {
        let tokens: Vec<&str> = conventions
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect();
        self.projects
            .values()
            .filter(|p| tokens.iter().any(|t| p.spec.matches(t)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn project(conventions: &str, path: &str) -> RegisteredProject {
        RegisteredProject {
            spec: ConventionSpec::parse(conventions).unwrap(),
            path: PathBuf::from(path),
            definitions: Path::new(path).join("definitions"),
        }
    }

    #[test]
    fn test_parse_conventions_spec() {
        let spec = ConventionSpec::parse("ACME-[].[]").unwrap();
        assert_eq!(spec.name, "ACME");
        assert!(spec.has_major && spec.has_minor);

        let bare = ConventionSpec::parse("ACME").unwrap();
        assert!(!bare.has_major && !bare.has_minor);

        assert!(ConventionSpec::parse("ACME-1.0").is_err());
        assert!(ConventionSpec::parse("").is_err());
    }

    #[test]
    fn test_spec_matching() {
        let spec = ConventionSpec::parse("ACME-[].[]").unwrap();
        assert!(spec.matches("ACME-1.0"));
        assert!(spec.matches("ACME-12.3"));
        assert!(!spec.matches("ACME-1"));
        assert!(!spec.matches("ACMEX-1.0"));
        assert!(!spec.matches("CF-1.8"));

        let major = ConventionSpec::parse("CF-[]").unwrap();
        assert!(major.matches("CF-1.8"));
        assert!(!major.matches("CF"));
    }

    #[test]
    fn test_add_and_match() {
        let mut registry = ProjectRegistry::default();
        registry.add(project("ACME-[].[]", "/p/acme"), false).unwrap();
        registry.add(project("CF-[]", "/p/cf"), false).unwrap();

        let found = registry.matching("CF-1.8, ACME-1.0");
        let paths: Vec<&Path> = found.iter().map(|p| p.path.as_path()).collect();
        assert_eq!(paths, vec![Path::new("/p/acme"), Path::new("/p/cf")]);
        assert!(registry.matching("OTHER-1.0").is_empty());
    }

    #[test]
    fn test_duplicate_needs_force() {
        let mut registry = ProjectRegistry::default();
        registry.add(project("ACME-[].[]", "/p/one"), false).unwrap();

        let err = registry.add(project("ACME-[]", "/p/two"), false).unwrap_err();
        assert!(matches!(err, SchemaError::AlreadyRegistered { .. }));
        assert_eq!(registry.get("ACME").unwrap().path, PathBuf::from("/p/one"));

        registry.add(project("ACME-[]", "/p/two"), true).unwrap();
        assert_eq!(registry.get("ACME").unwrap().path, PathBuf::from("/p/two"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(REGISTRY_FILE);
        assert!(ProjectRegistry::load(&path).unwrap().is_empty());

        let mut registry = ProjectRegistry::default();
        registry.add(project("ACME-[].[]", "/p/acme"), false).unwrap();
        registry.save(&path).unwrap();

        let loaded = ProjectRegistry::load(&path).unwrap();
        assert_eq!(loaded, registry);
        assert!(fs::read_to_string(&path).unwrap().contains("ACME:"));

        fs::write(&path, "").unwrap();
        assert!(ProjectRegistry::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_open_registered_project() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(DEFAULTS_FILE), "conventions: ACME-1.0\n").unwrap();
        let entry = RegisteredProject {
            spec: ConventionSpec::parse("ACME-[].[]").unwrap(),
            path: dir.path().to_path_buf(),
            definitions: dir.path().join("defs"),
        };

        let project = entry.open().unwrap();
        assert_eq!(project.name(), "ACME-1.0");
        assert_eq!(project.definitions_dir, dir.path().join("defs"));
    }
}

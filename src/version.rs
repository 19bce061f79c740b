//! Versioned snapshots of compiled definitions

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SchemaError};
use crate::json_schema::release_json_schema;
use crate::schema::Dataset;

/// Parse a semver-like tag leniently: `v1`, `1.0` and `1.0.0` are all
/// accepted, missing components are zero.
pub fn parse_tag(tag: &str) -> Result<Version> {
    let bare = tag.strip_prefix('v').unwrap_or(tag);
    if bare.is_empty() {
        return Err(SchemaError::InvalidVersion(tag.to_string()));
    }

    // Split off pre-release/build metadata before padding
    let split = bare.find(|c: char| c == '-' || c == '+').unwrap_or(bare.len());
    let (core, suffix) = bare.split_at(split);

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(SchemaError::InvalidVersion(tag.to_string()));
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    Version::parse(&format!("{}{}", parts.join("."), suffix))
        .map_err(|_| SchemaError::InvalidVersion(tag.to_string()))
}

/// Tags that are not valid directory names are rejected
pub fn check_tag(tag: &str) -> Result<()> {
    if tag == "latest" || tag.contains(['/', '\\']) || tag.starts_with('.') {
        return Err(SchemaError::InvalidVersion(tag.to_string()));
    }
    parse_tag(tag).map(|_| ())
}

/// An immutable release: every product of a project at one tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Tag as given by the user (e.g. "1.0")
    pub tag: String,
    /// Normalised version, used for ordering only
    pub version: Version,
    pub created_at: DateTime<Utc>,
    /// Compiled products keyed by product name
    pub products: BTreeMap<String, Dataset>,
    /// Release-wide JSON Schema
    pub json_schema: Value,
}

impl SchemaVersion {
    pub fn new(tag: &str, products: BTreeMap<String, Dataset>) -> Result<Self> {
        check_tag(tag)?;
        let version = parse_tag(tag)?;
        let json_schema = release_json_schema(&products);
        Ok(Self {
            tag: tag.to_string(),
            version,
            created_at: Utc::now(),
            products,
            json_schema,
        })
    }

    /// Directory name for this version (`v1.0`)
    pub fn dir_name(&self) -> String {
        dir_name(&self.tag)
    }

    pub fn product(&self, name: &str) -> Option<&Dataset> {
        self.products.get(name)
    }

    pub fn is_major_bump_from(&self, other: &SchemaVersion) -> bool {
        self.version.major > other.version.major
    }

    pub fn is_minor_bump_from(&self, other: &SchemaVersion) -> bool {
        self.version.major == other.version.major && self.version.minor > other.version.minor
    }

    pub fn is_patch_bump_from(&self, other: &SchemaVersion) -> bool {
        self.version.major == other.version.major
            && self.version.minor == other.version.minor
            && self.version.patch > other.version.patch
    }
}

/// `v` + tag, without doubling an existing `v`
pub fn dir_name(tag: &str) -> String {
    if tag.starts_with('v') {
        tag.to_string()
    } else {
        format!("v{}", tag)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.tag == other.tag
    }
}

impl Eq for SchemaVersion {}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.tag.cmp(&other.tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_parsing() {
        assert_eq!(parse_tag("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_tag("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_tag("1.0").unwrap(), Version::new(1, 0, 0));
        assert_eq!(parse_tag("2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(parse_tag("1.1-rc.1").unwrap().pre.as_str(), "rc.1");
        assert!(parse_tag("").is_err());
        assert!(parse_tag("1..2").is_err());
        assert!(parse_tag("one").is_err());
    }

    #[test]
    fn test_dir_names() {
        let v = SchemaVersion::new("1.0", BTreeMap::new()).unwrap();
        assert_eq!(v.dir_name(), "v1.0");
        assert_eq!(v.to_string(), "v1.0");
        assert_eq!(dir_name("v2.0.0"), "v2.0.0");
        assert!(SchemaVersion::new("latest", BTreeMap::new()).is_err());
        assert!(check_tag("../1.0").is_err());
    }

    #[test]
    fn test_ordering_and_bumps() {
        let a = SchemaVersion::new("1.0", BTreeMap::new()).unwrap();
        let b = SchemaVersion::new("1.1", BTreeMap::new()).unwrap();
        let c = SchemaVersion::new("2.0.0", BTreeMap::new()).unwrap();
        let d = SchemaVersion::new("1.1.1", BTreeMap::new()).unwrap();

        let mut versions = vec![c.clone(), a.clone(), b.clone()];
        versions.sort();
        assert_eq!(versions, vec![a.clone(), b.clone(), c.clone()]);

        assert!(c.is_major_bump_from(&b));
        assert!(b.is_minor_bump_from(&a));
        assert!(d.is_patch_bump_from(&b));
        assert!(!a.is_minor_bump_from(&b));
    }
}

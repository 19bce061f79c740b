//! Checksums for release artifacts

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Result, SchemaError};

/// SHA256 checksum of an artifact file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    pub fn of_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_bytes(&fs::read(path)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn verify(&self, data: &[u8]) -> bool {
        *self == Self::from_bytes(data)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Checksum {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Contents of a `checksums.sha256` file: `<hex>  <relative path>` per line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumList {
    entries: BTreeMap<String, Checksum>,
}

impl ChecksumList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: impl Into<String>, checksum: Checksum) {
        self.entries.insert(file.into(), checksum);
    }

    pub fn get(&self, file: &str) -> Option<&Checksum> {
        self.entries.get(file)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Checksum)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(file, checksum)| format!("{}  {}\n", checksum, file))
            .collect()
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut list = Self::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let (checksum, file) = line.split_once("  ").ok_or_else(|| {
                SchemaError::InvalidFormat(format!("bad checksum line '{}'", line))
            })?;
            list.insert(file.trim(), Checksum::from(checksum.trim()));
        }
        Ok(list)
    }

    /// Recompute every listed file under `dir` and compare
    pub fn verify_dir(&self, dir: &Path) -> Result<()> {
        for (file, expected) in &self.entries {
            let actual = Checksum::of_file(dir.join(file))?;
            if actual != *expected {
                return Err(SchemaError::ChecksumMismatch {
                    file: file.clone(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_checksum_consistency() {
        let content = br#"{"name": "test", "version": "1.0.0"}"#;
        assert_eq!(Checksum::from_bytes(content), Checksum::from_bytes(content));
        assert_ne!(Checksum::from_bytes(b"a"), Checksum::from_bytes(b"b"));
    }

    #[test]
    fn test_checksum_verification() {
        let checksum = Checksum::from_bytes(b"data");
        assert!(checksum.verify(b"data"));
        assert!(!checksum.verify(b"different content"));
        assert_eq!(checksum.as_str().len(), 64);
    }

    #[test]
    fn test_list_round_trip_and_verify() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("core.json"), "{}").unwrap();

        let mut list = ChecksumList::new();
        list.insert("core.json", Checksum::of_file(dir.path().join("core.json")).unwrap());

        let parsed = ChecksumList::parse(&list.render()).unwrap();
        assert_eq!(parsed, list);
        parsed.verify_dir(dir.path()).unwrap();

        fs::write(dir.path().join("core.json"), "{\"x\": 1}").unwrap();
        assert!(matches!(
            parsed.verify_dir(dir.path()),
            Err(SchemaError::ChecksumMismatch { .. })
        ));
        assert!(ChecksumList::parse("nonsense").is_err());
    }
}

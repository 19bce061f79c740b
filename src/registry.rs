//! Version store
//!
//! Released definitions live under an output directory:
//!
//! ```text
//! products/
//! ├── v1.0/
//! │   ├── core.json
//! │   ├── core_1hz.json
//! │   ├── dataset_schema.json
//! │   ├── manifest.json
//! │   └── checksums.sha256
//! ├── v1.1/
//! └── latest/            # copy of the most recently frozen version
//! ```
//!
//! Versions are append-only. A version directory is assembled under a hidden
//! staging name and renamed into place, so readers never see a partial one.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::checksum::{Checksum, ChecksumList};
use crate::config::OutputFormat;
use crate::error::{Result, SchemaError};
use crate::schema::Dataset;
use crate::version::{check_tag, dir_name, SchemaVersion};

pub const LATEST: &str = "latest";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const CHECKSUMS_FILE: &str = "checksums.sha256";
pub const DATASET_SCHEMA_FILE: &str = "dataset_schema.json";

const LATEST_LOCK_WAIT: Duration = Duration::from_secs(10);

/// A lock older than this is left over from a crashed writer
const STALE_LOCK_AGE: Duration = Duration::from_secs(600);

/// Per-product entry in `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub file: String,
    pub checksum: Checksum,
    pub node_count: usize,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub tag: String,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub products: BTreeMap<String, ProductEntry>,
    pub json_schema: String,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub output_format: OutputFormat,
    pub write_checksums: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Pretty,
            write_checksums: true,
        }
    }
}

/// Exclusive marker file, removed on drop
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Take the lock, breaking it first if its holder is long gone
    fn try_acquire(path: PathBuf) -> io::Result<Option<Self>> {
        if let Some(lock) = Self::create(&path)? {
            return Ok(Some(lock));
        }
        if !Self::is_stale(&path) {
            return Ok(None);
        }
        warn!(path = %path.display(), "breaking stale lock");
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Self::create(&path)
    }

    fn create(path: &Path) -> io::Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "pid={}", std::process::id())?;
                writeln!(file, "created_at={}", Utc::now().to_rfc3339())?;
                Ok(Some(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Age comes from the recorded `created_at`, else the file's mtime
    fn created_at(path: &Path) -> Option<DateTime<Utc>> {
        let recorded = fs::read_to_string(path).ok().and_then(|content| {
            content
                .lines()
                .find_map(|line| line.strip_prefix("created_at="))
                .and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
                .map(|ts| ts.with_timezone(&Utc))
        });
        recorded.or_else(|| {
            fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from)
        })
    }

    fn is_stale(path: &Path) -> bool {
        let Some(created) = Self::created_at(path) else {
            return false;
        };
        Utc::now()
            .signed_duration_since(created)
            .to_std()
            .map(|age| age > STALE_LOCK_AGE)
            .unwrap_or(false)
    }

    fn acquire_wait(path: PathBuf, timeout: Duration) -> io::Result<Self> {
        let start = Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(path.clone())? {
                return Ok(lock);
            }
            if start.elapsed() > timeout {
                return Err(io::Error::new(
                    ErrorKind::TimedOut,
                    format!("timed out waiting for {}", path.display()),
                ));
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn to_json<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Compact => serde_json::to_string(value)?,
    })
}

fn copy_files(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::copy(entry.path(), to.join(entry.file_name()))?;
        }
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

/// Once `latest` points at the new version the old copy is only clutter,
/// so failing to remove it must not undo the freeze.
fn discard_previous_latest(old: &Path) {
    if let Err(e) = remove_if_exists(old) {
        warn!(path = %old.display(), error = %e, "could not remove previous latest");
    }
}

/// Load a single product JSON written by [`VersionStore::freeze`]
pub fn load_product_file(path: impl AsRef<Path>) -> Result<Dataset> {
    let content = fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&content)?)
}

/// Append-only store of released versions
#[derive(Debug, Clone)]
pub struct VersionStore {
    root: PathBuf,
    options: StoreOptions,
}

impl VersionStore {
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self::with_options(root, StoreOptions::default())
    }

    pub fn with_options(root: impl AsRef<Path>, options: StoreOptions) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a version; `latest` maps to the alias
    pub fn version_dir(&self, tag: &str) -> PathBuf {
        if tag == LATEST {
            self.root.join(LATEST)
        } else {
            self.root.join(dir_name(tag))
        }
    }

    pub fn exists(&self, tag: &str) -> bool {
        self.version_dir(tag).join(MANIFEST_FILE).is_file()
    }

    /// Freeze a single product
    pub fn freeze(&self, schema: &Dataset, tag: &str) -> Result<SchemaVersion> {
        let mut products = BTreeMap::new();
        products.insert(schema.product_name().to_string(), schema.clone());
        self.freeze_all(products, tag)
    }

    /// Freeze a set of products under one tag.
    ///
    /// Fails with [`SchemaError::VersionConflict`] if the tag already exists,
    /// or [`SchemaError::Locked`] while another writer holds its lock. Locks
    /// older than ten minutes are broken. On any failure nothing new is left
    /// behind and `latest` is unchanged.
    pub fn freeze_all(
        &self,
        products: BTreeMap<String, Dataset>,
        tag: &str,
    ) -> Result<SchemaVersion> {
        check_tag(tag)?;
        fs::create_dir_all(&self.root)?;

        let name = dir_name(tag);
        let final_dir = self.root.join(&name);
        let conflict = || SchemaError::VersionConflict {
            version: tag.to_string(),
        };

        if final_dir.exists() {
            return Err(conflict());
        }
        let lock_path = self.root.join(format!(".{}.lock", name));
        let Some(_lock) = LockFile::try_acquire(lock_path.clone())? else {
            if final_dir.exists() {
                return Err(conflict());
            }
            return Err(SchemaError::Locked {
                version: tag.to_string(),
                lock: lock_path.display().to_string(),
            });
        };
        if final_dir.exists() {
            return Err(conflict());
        }

        let version = SchemaVersion::new(tag, products)?;
        self.warn_if_older_than_latest(&version);

        let staging = self.root.join(format!(".{}.staging", name));
        remove_if_exists(&staging)?;
        if let Err(e) = self.write_artifacts(&staging, &version) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
        fs::rename(&staging, &final_dir)?;

        if let Err(e) = self.replace_latest(&final_dir) {
            warn!(version = %name, error = %e, "could not update latest, rolling back");
            let _ = fs::remove_dir_all(&final_dir);
            return Err(e);
        }

        info!(
            version = %name,
            products = version.products.len(),
            path = %final_dir.display(),
            "created version"
        );
        Ok(version)
    }

    fn warn_if_older_than_latest(&self, version: &SchemaVersion) {
        if let Ok(manifest) = self.manifest(LATEST) {
            if version.version < manifest.version {
                warn!(
                    new = %version.tag,
                    latest = %manifest.tag,
                    "new version is lower than latest; latest will move back"
                );
            }
        }
    }

    fn write_artifacts(&self, dir: &Path, version: &SchemaVersion) -> Result<()> {
        fs::create_dir_all(dir)?;
        let format = self.options.output_format;
        let mut checksums = ChecksumList::new();
        let mut entries = BTreeMap::new();

        for (name, dataset) in &version.products {
            let file = format!("{}.json", name);
            let content = to_json(dataset, format)?;
            fs::write(dir.join(&file), &content)?;

            let checksum = Checksum::from_bytes(content.as_bytes());
            checksums.insert(file.clone(), checksum.clone());
            entries.insert(
                name.clone(),
                ProductEntry {
                    file,
                    checksum,
                    node_count: dataset.node_count(),
                },
            );
            debug!(product = %name, "wrote product definition");
        }

        let schema = to_json(&version.json_schema, format)?;
        fs::write(dir.join(DATASET_SCHEMA_FILE), &schema)?;
        checksums.insert(DATASET_SCHEMA_FILE, Checksum::from_bytes(schema.as_bytes()));

        let manifest = VersionManifest {
            tag: version.tag.clone(),
            version: version.version.clone(),
            created_at: version.created_at,
            products: entries,
            json_schema: DATASET_SCHEMA_FILE.to_string(),
        };
        fs::write(dir.join(MANIFEST_FILE), to_json(&manifest, OutputFormat::Pretty)?)?;

        if self.options.write_checksums {
            fs::write(dir.join(CHECKSUMS_FILE), checksums.render())?;
        }
        Ok(())
    }

    /// Swap `latest` for a copy of `source`, restoring the old one on failure
    fn replace_latest(&self, source: &Path) -> Result<()> {
        let _lock = LockFile::acquire_wait(self.root.join(".latest.lock"), LATEST_LOCK_WAIT)?;

        let latest = self.root.join(LATEST);
        let staging = self.root.join(".latest.staging");
        let old = self.root.join(".latest.old");

        remove_if_exists(&staging)?;
        remove_if_exists(&old)?;
        copy_files(source, &staging)?;

        let had_latest = latest.exists();
        if had_latest {
            fs::rename(&latest, &old)?;
        }
        if let Err(e) = fs::rename(&staging, &latest) {
            if had_latest {
                let _ = fs::rename(&old, &latest);
            }
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }
        discard_previous_latest(&old);
        Ok(())
    }

    pub fn manifest(&self, tag: &str) -> Result<VersionManifest> {
        let path = self.version_dir(tag).join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(SchemaError::NotFound {
                name: "version".to_string(),
                version: tag.to_string(),
            });
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load a version (or `latest`), verifying checksums when present
    pub fn load(&self, tag: &str) -> Result<SchemaVersion> {
        let dir = self.version_dir(tag);
        let manifest = self.manifest(tag)?;

        let checksums_path = dir.join(CHECKSUMS_FILE);
        if checksums_path.is_file() {
            ChecksumList::parse(&fs::read_to_string(&checksums_path)?)?.verify_dir(&dir)?;
        } else {
            debug!(version = %tag, "no checksum file, skipping verification");
        }

        let mut products = BTreeMap::new();
        for (name, entry) in &manifest.products {
            products.insert(name.clone(), load_product_file(dir.join(&entry.file))?);
        }

        let schema_content = fs::read_to_string(dir.join(&manifest.json_schema))?;
        let json_schema: Value = serde_json::from_str(&schema_content)?;

        Ok(SchemaVersion {
            tag: manifest.tag,
            version: manifest.version,
            created_at: manifest.created_at,
            products,
            json_schema,
        })
    }

    /// Manifests of every frozen version, oldest first
    pub fn list(&self) -> Result<Vec<VersionManifest>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut manifests = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || name == LATEST || !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path().join(MANIFEST_FILE);
            if !path.is_file() {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            manifests.push(serde_json::from_str::<VersionManifest>(&content)?);
        }
        manifests.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.tag.cmp(&b.tag)));
        Ok(manifests)
    }
}

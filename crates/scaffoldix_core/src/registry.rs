use std::collections::BTreeMap;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::fs_utils;

pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

static HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-f0-9]{64}$").expect("hash regex is valid"));

/// Where a pack came from. Chosen at install time and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PackOrigin {
    Local {
        path: String,
    },
    Git {
        url: String,
        #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        commit: Option<String>,
    },
    Zip {
        url: String,
    },
    Npm {
        pkg: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        registry: Option<String>,
    },
}

/// One installed (version, content) pair. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackInstallRecord {
    pub version: String,
    pub origin: PackOrigin,
    pub hash: String,
    pub installed_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryPackEntry {
    pub id: String,
    pub version: String,
    pub origin: PackOrigin,
    pub hash: String,
    pub installed_at: String,
    /// Superseded top-level records, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<PackInstallRecord>,
    /// Concurrently installed versions. When present, the top-level fields
    /// mirror its most recent record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub installs: Vec<PackInstallRecord>,
}

impl RegistryPackEntry {
    pub fn top_record(&self) -> PackInstallRecord {
        PackInstallRecord {
            version: self.version.clone(),
            origin: self.origin.clone(),
            hash: self.hash.clone(),
            installed_at: self.installed_at.clone(),
        }
    }

    fn set_top(&mut self, record: &PackInstallRecord) {
        self.version = record.version.clone();
        self.origin = record.origin.clone();
        self.hash = record.hash.clone();
        self.installed_at = record.installed_at.clone();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub schema_version: u32,
    #[serde(default)]
    pub packs: BTreeMap<String, RegistryPackEntry>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            schema_version: REGISTRY_SCHEMA_VERSION,
            packs: BTreeMap::new(),
        }
    }
}

/// Input for registering a pack install. `installed_at` is assigned by the
/// store's clock.
#[derive(Debug, Clone)]
pub struct RegisterPackInput {
    pub id: String,
    pub version: String,
    pub origin: PackOrigin,
    pub hash: String,
}

/// The global registry: a single JSON file, loaded whole and replaced
/// atomically on every mutation.
pub struct RegistryStore {
    path: Utf8PathBuf,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for RegistryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RegistryStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self::with_clock(path, Box::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<Utf8PathBuf>, clock: Box<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Load the registry. An absent file yields an empty, schema-current
    /// registry; the file is never created on read.
    pub fn load(&self) -> Result<Registry> {
        let raw = match fs_err::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Registry::default());
            }
            Err(e) => {
                return Err(ScaffoldError::new(
                    ErrorCode::RegistryReadError,
                    format!("cannot read registry at {}", self.path),
                )
                .with_detail("path", self.path.as_str())
                .with_source(e));
            }
        };
        let registry: Registry = serde_json::from_str(&raw).map_err(|e| {
            ScaffoldError::new(
                ErrorCode::RegistryInvalidJson,
                format!("registry at {} is not valid JSON: {e}", self.path),
            )
            .with_detail("path", self.path.as_str())
            .with_source(e)
        })?;
        validate_registry(&registry, ErrorCode::RegistryInvalidSchema)?;
        Ok(registry)
    }

    /// Validate and atomically persist the registry.
    pub fn save(&self, registry: &Registry) -> Result<()> {
        validate_registry(registry, ErrorCode::RegistrySaveInvalid)?;

        let parent = self.path.parent().ok_or_else(|| {
            ScaffoldError::new(
                ErrorCode::RegistryInvalidPath,
                format!("registry path {} has no parent directory", self.path),
            )
            .programming()
        })?;
        fs_err::create_dir_all(parent).map_err(|e| {
            ScaffoldError::new(
                ErrorCode::RegistryDirError,
                format!("cannot create registry directory {parent}"),
            )
            .with_source(e)
        })?;

        let mut json =
            serde_json::to_string_pretty(registry).map_err(|e| {
                ScaffoldError::new(ErrorCode::RegistrySaveError, "cannot serialize registry")
                    .with_source(e)
            })?;
        json.push('\n');

        let tmp_name = format!(".registry-{}.tmp", fs_utils::random_suffix());
        fs_utils::write_atomic(&self.path, json.as_bytes(), &tmp_name).map_err(|e| {
            ScaffoldError::new(
                ErrorCode::RegistrySaveError,
                format!("cannot save registry at {}", self.path),
            )
            .with_detail("path", self.path.as_str())
            .with_source(e)
        })
    }

    /// Upsert a pack entry by id. Idempotent on identical input.
    pub fn register_pack(&self, input: &RegisterPackInput) -> Result<RegistryPackEntry> {
        validate_input(input)?;
        let mut registry = self.load()?;
        let record = self.record_from(input);
        let entry = match registry.packs.remove(&input.id) {
            Some(mut entry) => {
                entry.set_top(&record);
                entry
            }
            None => entry_from(input, record),
        };
        registry.packs.insert(input.id.clone(), entry.clone());
        self.save(&registry)?;
        debug!("registered pack {} @ {}", input.id, input.version);
        Ok(entry)
    }

    /// Remove a pack entry, returning it if it was present.
    pub fn unregister_pack(&self, id: &str) -> Result<Option<RegistryPackEntry>> {
        let mut registry = self.load()?;
        let removed = registry.packs.remove(id);
        if removed.is_some() {
            self.save(&registry)?;
        }
        Ok(removed)
    }

    /// Replace the top-level record, moving the current one into `history`.
    pub fn update_pack_with_history(
        &self,
        id: &str,
        input: &RegisterPackInput,
    ) -> Result<RegistryPackEntry> {
        validate_input(input)?;
        let mut registry = self.load()?;
        let record = self.record_from(input);
        let entry = match registry.packs.remove(id) {
            Some(mut entry) => {
                entry.history.push(entry.top_record());
                entry.set_top(&record);
                entry
            }
            None => entry_from(input, record),
        };
        registry.packs.insert(id.to_owned(), entry.clone());
        self.save(&registry)?;
        Ok(entry)
    }

    /// Merge an install into the entry's `installs` set. A record with the
    /// same hash is a no-op; otherwise the record is appended and promoted
    /// to the top level. `history` is preserved either way.
    pub fn register_pack_version(&self, input: &RegisterPackInput) -> Result<RegistryPackEntry> {
        validate_input(input)?;
        let mut registry = self.load()?;
        let record = self.record_from(input);
        let entry = match registry.packs.remove(&input.id) {
            Some(mut entry) => {
                if entry.installs.is_empty() {
                    entry.installs.push(entry.top_record());
                }
                if entry.installs.iter().any(|r| r.hash == record.hash) {
                    registry.packs.insert(input.id.clone(), entry.clone());
                    return Ok(entry);
                }
                entry.installs.push(record.clone());
                entry.set_top(&record);
                entry
            }
            None => {
                let mut entry = entry_from(input, record.clone());
                entry.installs.push(record);
                entry
            }
        };
        registry.packs.insert(input.id.clone(), entry.clone());
        self.save(&registry)?;
        Ok(entry)
    }

    /// Bulk-register a set of installs; the most recent by `installed_at`
    /// becomes the top-level record.
    pub fn register_pack_with_installs(
        &self,
        id: &str,
        installs: Vec<PackInstallRecord>,
    ) -> Result<RegistryPackEntry> {
        let most_recent = installs
            .iter()
            .max_by(|a, b| a.installed_at.cmp(&b.installed_at))
            .cloned()
            .ok_or_else(|| {
                ScaffoldError::new(
                    ErrorCode::RegistryInvalidInput,
                    "installs must not be empty",
                )
            })?;
        let mut registry = self.load()?;
        let entry = RegistryPackEntry {
            id: id.to_owned(),
            version: most_recent.version.clone(),
            origin: most_recent.origin.clone(),
            hash: most_recent.hash.clone(),
            installed_at: most_recent.installed_at.clone(),
            history: registry
                .packs
                .get(id)
                .map(|e| e.history.clone())
                .unwrap_or_default(),
            installs,
        };
        registry.packs.insert(id.to_owned(), entry.clone());
        self.save(&registry)?;
        Ok(entry)
    }

    pub fn get_pack(&self, id: &str) -> Result<Option<RegistryPackEntry>> {
        Ok(self.load()?.packs.get(id).cloned())
    }

    pub fn list_packs(&self) -> Result<Vec<RegistryPackEntry>> {
        Ok(self.load()?.packs.into_values().collect())
    }

    pub fn get_pack_installs(&self, id: &str) -> Result<Vec<PackInstallRecord>> {
        Ok(self
            .load()?
            .packs
            .get(id)
            .map(|e| {
                if e.installs.is_empty() {
                    vec![e.top_record()]
                } else {
                    e.installs.clone()
                }
            })
            .unwrap_or_default())
    }

    pub fn get_pack_history(&self, id: &str) -> Result<Vec<PackInstallRecord>> {
        Ok(self
            .load()?
            .packs
            .get(id)
            .map(|e| e.history.clone())
            .unwrap_or_default())
    }

    fn record_from(&self, input: &RegisterPackInput) -> PackInstallRecord {
        PackInstallRecord {
            version: input.version.clone(),
            origin: input.origin.clone(),
            hash: input.hash.clone(),
            installed_at: self.clock.now_iso(),
        }
    }
}

fn entry_from(input: &RegisterPackInput, record: PackInstallRecord) -> RegistryPackEntry {
    RegistryPackEntry {
        id: input.id.clone(),
        version: record.version.clone(),
        origin: record.origin.clone(),
        hash: record.hash.clone(),
        installed_at: record.installed_at.clone(),
        history: Vec::new(),
        installs: Vec::new(),
    }
}

fn validate_input(input: &RegisterPackInput) -> Result<()> {
    if input.id.is_empty() {
        return Err(ScaffoldError::new(
            ErrorCode::RegistryInvalidInput,
            "pack id must not be empty",
        ));
    }
    semver::Version::parse(&input.version).map_err(|e| {
        ScaffoldError::new(
            ErrorCode::RegistryInvalidInput,
            format!("invalid pack version {:?}: {e}", input.version),
        )
    })?;
    if !HASH_RE.is_match(&input.hash) {
        return Err(ScaffoldError::new(
            ErrorCode::RegistryInvalidInput,
            format!("invalid manifest hash {:?}", input.hash),
        ));
    }
    Ok(())
}

fn validate_registry(registry: &Registry, code: ErrorCode) -> Result<()> {
    if registry.schema_version == 0 {
        return Err(ScaffoldError::new(
            code,
            "registry schemaVersion must be a positive integer",
        ));
    }
    for (key, entry) in &registry.packs {
        if *key != entry.id {
            return Err(ScaffoldError::new(
                code,
                format!("registry key {key:?} does not match entry id {:?}", entry.id),
            ));
        }
        for record in std::iter::once(&entry.top_record())
            .chain(&entry.history)
            .chain(&entry.installs)
        {
            if !HASH_RE.is_match(&record.hash) {
                return Err(ScaffoldError::new(
                    code,
                    format!("pack {key:?} has invalid hash {:?}", record.hash),
                ));
            }
            if chrono::DateTime::parse_from_rfc3339(&record.installed_at).is_err() {
                return Err(ScaffoldError::new(
                    code,
                    format!(
                        "pack {key:?} has invalid installedAt {:?}",
                        record.installed_at
                    ),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store(dir: &tempfile::TempDir) -> RegistryStore {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("registry.json")).unwrap();
        RegistryStore::new(path)
    }

    fn input(id: &str, version: &str, fill: char) -> RegisterPackInput {
        RegisterPackInput {
            id: id.to_owned(),
            version: version.to_owned(),
            origin: PackOrigin::Local {
                path: "/tmp/p".to_owned(),
            },
            hash: fill.to_string().repeat(64),
        }
    }

    #[test]
    fn load_absent_file_returns_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let registry = store.load().unwrap();
        assert_eq!(registry, Registry::default());
        assert!(!dir.path().join("registry.json").exists());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.register_pack(&input("p", "1.0.0", 'a')).unwrap();

        let registry = store.load().unwrap();
        assert_eq!(registry.schema_version, REGISTRY_SCHEMA_VERSION);
        assert_eq!(registry.packs["p"].version, "1.0.0");

        let on_disk = fs_err::read_to_string(store.path()).unwrap();
        assert!(on_disk.ends_with('\n'));
        assert!(on_disk.contains("\"schemaVersion\": 1"));
    }

    #[test]
    fn invalid_json_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        fs_err::write(store.path(), "{ not json").unwrap();
        let err = store.load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::RegistryInvalidJson);
    }

    #[test]
    fn mismatched_key_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let json = serde_json::json!({
            "schemaVersion": 1,
            "packs": {
                "other": {
                    "id": "p",
                    "version": "1.0.0",
                    "origin": {"type": "local", "path": "/tmp/p"},
                    "hash": "a".repeat(64),
                    "installedAt": "2024-01-01T00:00:00Z",
                }
            }
        });
        fs_err::write(store.path(), json.to_string()).unwrap();
        let err = store.load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::RegistryInvalidSchema);
    }

    #[test]
    fn unknown_fields_do_not_fail_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let json = serde_json::json!({
            "schemaVersion": 1,
            "futureField": true,
            "packs": {}
        });
        fs_err::write(store.path(), json.to_string()).unwrap();
        store.load().unwrap();
    }

    #[test]
    fn register_pack_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.register_pack(&input("p", "1.0.0", 'a')).unwrap();
        store.register_pack(&input("p", "1.0.0", 'a')).unwrap();

        let registry = store.load().unwrap();
        assert_eq!(registry.packs.len(), 1);
        assert_eq!(registry.packs["p"].hash, "a".repeat(64));
    }

    #[test]
    fn unregister_absent_pack_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.unregister_pack("ghost").unwrap().is_none());
    }

    #[test]
    fn update_with_history_preserves_old_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.register_pack(&input("p", "1.0.0", 'a')).unwrap();
        let entry = store
            .update_pack_with_history("p", &input("p", "2.0.0", 'b'))
            .unwrap();

        assert_eq!(entry.version, "2.0.0");
        assert_eq!(entry.history.len(), 1);
        assert_eq!(entry.history[0].version, "1.0.0");
    }

    #[test]
    fn register_pack_version_merges_installs() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.register_pack_version(&input("p", "1.0.0", 'a')).unwrap();
        let entry = store.register_pack_version(&input("p", "2.0.0", 'b')).unwrap();

        assert_eq!(entry.installs.len(), 2);
        assert_eq!(entry.version, "2.0.0");
        let hashes: Vec<&str> = entry.installs.iter().map(|r| r.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a".repeat(64), "b".repeat(64)]);
    }

    #[test]
    fn register_pack_version_same_hash_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.register_pack_version(&input("p", "1.0.0", 'a')).unwrap();
        let entry = store.register_pack_version(&input("p", "1.0.1", 'a')).unwrap();

        // Same content hash: no new install, top level unchanged.
        assert_eq!(entry.installs.len(), 1);
        assert_eq!(entry.version, "1.0.0");
    }

    #[test]
    fn register_with_installs_picks_most_recent_top() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let origin = PackOrigin::Local {
            path: "/tmp/p".to_owned(),
        };
        let installs = vec![
            PackInstallRecord {
                version: "2.0.0".to_owned(),
                origin: origin.clone(),
                hash: "b".repeat(64),
                installed_at: "2024-01-01T00:00:00Z".to_owned(),
            },
            PackInstallRecord {
                version: "1.0.0".to_owned(),
                origin,
                hash: "a".repeat(64),
                installed_at: "2024-06-01T00:00:00Z".to_owned(),
            },
        ];
        let entry = store.register_pack_with_installs("p", installs).unwrap();
        assert_eq!(entry.version, "1.0.0");
        assert_eq!(entry.installs.len(), 2);
    }

    #[test]
    fn on_disk_shape_is_stable() {
        use chrono::TimeZone as _;
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("registry.json")).unwrap();
        let clock = crate::clock::FixedClock(
            chrono::Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap(),
        );
        let store = RegistryStore::with_clock(path, Box::new(clock));
        store.register_pack_version(&input("@org/x", "1.0.0", 'a')).unwrap();

        let on_disk = fs_err::read_to_string(store.path()).unwrap();
        expect_test::expect![[r#"
            {
              "schemaVersion": 1,
              "packs": {
                "@org/x": {
                  "id": "@org/x",
                  "version": "1.0.0",
                  "origin": {
                    "type": "local",
                    "path": "/tmp/p"
                  },
                  "hash": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                  "installedAt": "2024-05-15T12:00:00Z",
                  "installs": [
                    {
                      "version": "1.0.0",
                      "origin": {
                        "type": "local",
                        "path": "/tmp/p"
                      },
                      "hash": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                      "installedAt": "2024-05-15T12:00:00Z"
                    }
                  ]
                }
              }
            }
        "#]]
        .assert_eq(&on_disk);
    }

    #[test]
    fn bad_input_hash_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut bad = input("p", "1.0.0", 'a');
        bad.hash = "XYZ".to_owned();
        let err = store.register_pack(&bad).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RegistryInvalidInput);
    }
}

use itertools::Itertools as _;
use semver::Version;

use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::registry::{PackInstallRecord, RegistryPackEntry, RegistryStore};

/// Pick an install record for a pack, by exact version or by highest semver.
#[derive(Debug)]
pub struct PackResolver<'a> {
    registry: &'a RegistryStore,
}

impl<'a> PackResolver<'a> {
    pub fn new(registry: &'a RegistryStore) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, pack_id: &str, version: Option<&str>) -> Result<PackInstallRecord> {
        let entry = self.registry.get_pack(pack_id)?.ok_or_else(|| {
            ScaffoldError::new(ErrorCode::PackNotFound, format!("pack {pack_id:?} is not installed"))
                .with_hint("run `scaffoldix install` first")
                .with_detail("packId", pack_id)
        })?;
        resolve_record(&entry, version)
    }

    /// All installed versions, sorted by semver descending, then by
    /// `installed_at` descending.
    pub fn list_versions(&self, pack_id: &str) -> Result<Vec<PackInstallRecord>> {
        let mut installs = self.registry.get_pack_installs(pack_id)?;
        installs.sort_by(|a, b| {
            semver_of(b)
                .cmp(&semver_of(a))
                .then_with(|| b.installed_at.cmp(&a.installed_at))
        });
        Ok(installs)
    }
}

/// Resolution against a single registry entry.
///
/// Without `installs` the top-level record is the only candidate. An exact
/// version must match an install; no version picks the highest semver, ties
/// broken by the most recent `installed_at`.
pub fn resolve_record(
    entry: &RegistryPackEntry,
    version: Option<&str>,
) -> Result<PackInstallRecord> {
    if entry.installs.is_empty() {
        return match version {
            Some(v) if v != entry.version => Err(version_not_found(entry, v, &[entry.top_record()])),
            _ => Ok(entry.top_record()),
        };
    }

    match version {
        Some(v) => entry
            .installs
            .iter()
            .find(|r| r.version == v)
            .cloned()
            .ok_or_else(|| version_not_found(entry, v, &entry.installs)),
        None => Ok(entry
            .installs
            .iter()
            .max_by(|a, b| {
                semver_of(a)
                    .cmp(&semver_of(b))
                    .then_with(|| a.installed_at.cmp(&b.installed_at))
            })
            .cloned()
            .expect("installs is non-empty")),
    }
}

fn version_not_found(
    entry: &RegistryPackEntry,
    requested: &str,
    available: &[PackInstallRecord],
) -> ScaffoldError {
    let versions = available.iter().map(|r| r.version.as_str()).join(", ");
    ScaffoldError::new(
        ErrorCode::VersionNotFound,
        format!(
            "version {requested:?} of pack {:?} is not installed",
            entry.id
        ),
    )
    .with_hint(format!("available versions: {versions}"))
    .with_detail("packId", entry.id.as_str())
    .with_detail("requested", requested)
    .with_detail(
        "available",
        serde_json::json!(
            available
                .iter()
                .map(|r| r.version.as_str())
                .collect::<Vec<_>>()
        ),
    )
}

fn semver_of(record: &PackInstallRecord) -> Version {
    // Registered versions are validated as semver on write.
    Version::parse(&record.version).unwrap_or_else(|_| Version::new(0, 0, 0))
}

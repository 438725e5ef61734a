use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::fs_utils;
use crate::manifest::PackManifest;
use crate::store::sanitize_pack_id;

/// Precomputed archetype index, derived from a manifest and invalidated by
/// manifest-hash change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackIndex {
    pub pack_id: String,
    pub version: String,
    pub manifest_hash: String,
    pub archetypes: Vec<IndexArchetype>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexArchetype {
    pub id: String,
    pub template_root: String,
    pub inputs_count: usize,
}

pub fn build_index(pack_id: &str, manifest: &PackManifest, manifest_hash: &str) -> PackIndex {
    PackIndex {
        pack_id: pack_id.to_owned(),
        version: manifest.pack.version.clone(),
        manifest_hash: manifest_hash.to_owned(),
        archetypes: manifest
            .archetypes
            .iter()
            .map(|a| IndexArchetype {
                id: a.id.clone(),
                template_root: a.template_root.clone(),
                inputs_count: a.inputs.len(),
            })
            .collect(),
    }
}

/// Cache of [`PackIndex`] entries: one JSON file per (pack id, manifest
/// hash), last-writer-wins. A stale or unreadable entry is a miss, never an
/// error.
#[derive(Debug, Clone)]
pub struct PackIndexCache {
    cache_dir: Utf8PathBuf,
}

impl PackIndexCache {
    pub fn new(cache_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    fn entry_path(&self, pack_id: &str, manifest_hash: &str) -> Utf8PathBuf {
        self.cache_dir
            .join(sanitize_pack_id(pack_id))
            .join(format!("{manifest_hash}.json"))
    }

    pub fn get(&self, pack_id: &str, manifest_hash: &str) -> Option<PackIndex> {
        let path = self.entry_path(pack_id, manifest_hash);
        let raw = fs_err::read_to_string(&path).ok()?;
        let index: PackIndex = serde_json::from_str(&raw).ok()?;
        if index.manifest_hash != manifest_hash {
            return None;
        }
        Some(index)
    }

    pub fn set(&self, index: &PackIndex) -> Result<()> {
        let path = self.entry_path(&index.pack_id, &index.manifest_hash);
        let parent = path.parent().expect("cache entry path has a parent");
        // Cache writes are best-effort; a failure only costs a recompute.
        if let Err(e) = write_entry(parent, &path, index) {
            debug!("cannot write index cache entry {path}: {e:#}");
        }
        Ok(())
    }

    /// Drop every cached entry for a pack id.
    pub fn invalidate(&self, pack_id: &str) {
        let dir = self.cache_dir.join(sanitize_pack_id(pack_id));
        if let Err(e) = fs_err::remove_dir_all(&dir)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            debug!("cannot invalidate index cache for {pack_id}: {e}");
        }
    }
}

fn write_entry(parent: &Utf8Path, path: &Utf8Path, index: &PackIndex) -> anyhow::Result<()> {
    fs_err::create_dir_all(parent)?;
    let mut json = serde_json::to_string_pretty(index)?;
    json.push('\n');
    let tmp_name = format!(
        ".{}-{}.tmp",
        path.file_name().unwrap_or("index"),
        fs_utils::random_suffix()
    );
    fs_utils::write_atomic(path, json.as_bytes(), &tmp_name)
}

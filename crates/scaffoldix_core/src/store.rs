use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::fs_utils;

/// Entry names never copied into the store.
pub const EXCLUDED_COPY_NAMES: &[&str] = &[
    "node_modules",
    ".git",
    ".DS_Store",
    "Thumbs.db",
    ".Trashes",
    "desktop.ini",
];

/// All store locations, derived from a caller-provided absolute root.
/// Constructed once and passed by reference to every component.
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: Utf8PathBuf,
}

impl StorePaths {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_absolute() {
            return Err(ScaffoldError::new(
                ErrorCode::StoreInvalidConfig,
                format!("store root must be an absolute path, got {root:?}"),
            )
            .programming());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn packs_dir(&self) -> Utf8PathBuf {
        self.root.join("packs")
    }

    pub fn registry_file(&self) -> Utf8PathBuf {
        self.root.join("registry.json")
    }

    pub fn cache_dir(&self) -> Utf8PathBuf {
        self.root.join("cache").join("packs")
    }

    pub fn tmp_dir(&self) -> Utf8PathBuf {
        self.root.join(".tmp")
    }

    /// Content-addressed destination of a pack: a pure function of id and
    /// manifest hash.
    pub fn pack_dest_dir(&self, pack_id: &str, manifest_hash: &str) -> Utf8PathBuf {
        self.packs_dir()
            .join(sanitize_pack_id(pack_id))
            .join(manifest_hash)
    }
}

/// Map a pack id to a filesystem-safe directory name. The rule is part of
/// the on-disk contract: `/` becomes `__`, Windows-reserved characters
/// become `_`.
pub fn sanitize_pack_id(id: &str) -> String {
    id.replace('/', "__")
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    Installed,
    AlreadyInstalled,
}

/// Copy `source` into the content-addressed slot for (`pack_id`, `hash`).
///
/// The copy goes through a staging directory under `.tmp/` and lands with a
/// single rename, so concurrent installers of the same content converge: the
/// loser observes the destination and discards its staging.
pub fn install_dir_into_store(
    paths: &StorePaths,
    pack_id: &str,
    hash: &str,
    source: &Utf8Path,
) -> Result<(Utf8PathBuf, InstallStatus)> {
    if !source.is_dir() {
        return Err(ScaffoldError::new(
            ErrorCode::StoreInvalidSource,
            format!("install source {source} is not a directory"),
        )
        .with_detail("source", source.as_str()));
    }

    let dest = paths.pack_dest_dir(pack_id, hash);
    if dest.is_dir() {
        debug!("pack {pack_id} ({hash}) already in store");
        return Ok((dest, InstallStatus::AlreadyInstalled));
    }

    let staging = paths
        .tmp_dir()
        .join(format!("install-{}", fs_utils::random_suffix()));
    let result = stage_and_commit(source, &staging, &dest);
    if result.is_err() {
        let _ = fs_err::remove_dir_all(&staging);
    }
    result.map(|status| (dest, status))
}

fn stage_and_commit(
    source: &Utf8Path,
    staging: &Utf8Path,
    dest: &Utf8Path,
) -> Result<InstallStatus> {
    fs_err::create_dir_all(staging).map_err(|e| store_create_failed(staging, e))?;
    fs_utils::copy_dir_filtered(source, staging, EXCLUDED_COPY_NAMES)
        .map_err(|e| install_failed(source, e))?;

    let dest_parent = dest
        .parent()
        .ok_or_else(|| ScaffoldError::internal(format!("store path {dest:?} has no parent")))?;
    fs_err::create_dir_all(dest_parent).map_err(|e| store_create_failed(dest_parent, e))?;

    // Another installer may have won the race while we were copying.
    if dest.is_dir() {
        fs_err::remove_dir_all(staging).map_err(|e| install_failed(staging, e.into()))?;
        return Ok(InstallStatus::AlreadyInstalled);
    }

    fs_err::rename(staging, dest).map_err(|e| install_failed(dest, e.into()))?;
    debug!("installed pack content at {dest}");
    Ok(InstallStatus::Installed)
}

fn store_create_failed(path: &Utf8Path, e: std::io::Error) -> ScaffoldError {
    ScaffoldError::new(
        refine_io_code(&e, ErrorCode::StoreCreateFailed),
        format!("cannot create store directory {path}"),
    )
    .with_detail("path", path.as_str())
    .with_source(e)
}

fn install_failed(path: &Utf8Path, e: anyhow::Error) -> ScaffoldError {
    let code = e
        .root_cause()
        .downcast_ref::<std::io::Error>()
        .map_or(ErrorCode::StoreInstallFailed, |io| {
            refine_io_code(io, ErrorCode::StoreInstallFailed)
        });
    ScaffoldError::new(code, format!("pack install failed at {path}"))
        .with_detail("path", path.as_str())
        .with_source(e)
}

fn refine_io_code(e: &std::io::Error, fallback: ErrorCode) -> ErrorCode {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => ErrorCode::StorePermissionDenied,
        std::io::ErrorKind::StorageFull => ErrorCode::StoreDiskFull,
        std::io::ErrorKind::ReadOnlyFilesystem => ErrorCode::StoreReadonlyFs,
        _ => fallback,
    }
}

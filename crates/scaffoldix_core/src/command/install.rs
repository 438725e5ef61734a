use camino::{Utf8Path, Utf8PathBuf};
use git_fetch::GitFetcher;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::canonical_hash::hash_manifest_file;
use crate::compatibility::ensure_compatible;
use crate::context::EngineContext;
use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::index_cache::build_index;
use crate::manifest_loader::load_manifest;
use crate::registry::{PackOrigin, RegisterPackInput, RegistryPackEntry};
use crate::store::{InstallStatus, install_dir_into_store};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutcome {
    pub status: InstallStatus,
    pub pack_id: String,
    pub version: String,
    pub hash: String,
    pub dest_dir: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Record the install in the registry (on by default; off lets callers
    /// stage content without registering it).
    pub update_registry: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            update_registry: true,
        }
    }
}

/// Install a pack from a local directory.
#[instrument(skip_all, fields(source = %source))]
pub fn install_local_pack(
    ctx: &EngineContext,
    source: &Utf8Path,
    options: &InstallOptions,
) -> Result<InstallOutcome> {
    if !source.exists() {
        return Err(ScaffoldError::new(
            ErrorCode::PackPathNotFound,
            format!("pack path {source} does not exist"),
        )
        .with_detail("path", source.as_str()));
    }
    if !source.is_dir() {
        return Err(ScaffoldError::new(
            ErrorCode::PackNotDirectory,
            format!("pack path {source} is not a directory"),
        )
        .with_detail("path", source.as_str()));
    }
    let origin = PackOrigin::Local {
        path: source.as_str().to_owned(),
    };
    install_pack_from_dir(ctx, source, origin, options)
}

/// Fetch a pack over git and install the clone. The temp clone is removed
/// afterwards regardless of the install result.
#[instrument(skip_all, fields(url = %url))]
pub fn install_git_pack(
    ctx: &EngineContext,
    fetcher: &dyn GitFetcher,
    url: &str,
    reference: Option<&str>,
    options: &InstallOptions,
) -> Result<InstallOutcome> {
    let fetched = fetcher.fetch(url, reference).map_err(|e| {
        ScaffoldError::new(ErrorCode::GitCloneFailed, format!("cannot fetch pack from {url}"))
            .with_hint("check that the URL is reachable and the ref exists")
            .with_detail("url", url)
            .with_source(e)
    })?;

    let origin = PackOrigin::Git {
        url: url.to_owned(),
        git_ref: fetched.git_ref().map(str::to_owned),
        commit: Some(fetched.commit().to_owned()),
    };
    let result = install_pack_from_dir(ctx, fetched.pack_dir(), origin, options);

    if let Err(e) = fetched.cleanup() {
        warn!("cannot clean up fetched pack: {e:#}");
    }
    result
}

fn install_pack_from_dir(
    ctx: &EngineContext,
    source: &Utf8Path,
    origin: PackOrigin,
    options: &InstallOptions,
) -> Result<InstallOutcome> {
    let manifest = load_manifest(source)?;
    let pack_id = manifest.pack.name.clone();
    let version = manifest.pack.version.clone();

    ensure_compatible(
        &ctx.engine_version,
        &pack_id,
        &version,
        manifest.pack.engine_compatibility.as_ref(),
    )?;

    let hash = hash_manifest_file(&manifest.manifest_path)?;

    // A registered install with this content hash means there is nothing to
    // copy, even if the caller passed a different source directory.
    let registered = ctx
        .registry
        .get_pack(&pack_id)?
        .is_some_and(|entry| has_hash(&entry, &hash));
    let dest_dir = ctx.paths.pack_dest_dir(&pack_id, &hash);
    if registered && dest_dir.is_dir() {
        info!("pack {pack_id}@{version} already installed");
        return Ok(InstallOutcome {
            status: InstallStatus::AlreadyInstalled,
            pack_id,
            version,
            hash,
            dest_dir,
        });
    }

    let (dest_dir, status) = install_dir_into_store(&ctx.paths, &pack_id, &hash, source)?;

    if options.update_registry {
        ctx.registry.register_pack_version(&RegisterPackInput {
            id: pack_id.clone(),
            version: version.clone(),
            origin,
            hash: hash.clone(),
        })?;
    }

    ctx.cache.set(&build_index(&pack_id, &manifest, &hash))?;

    if status == InstallStatus::Installed {
        info!("installed {pack_id}@{version} into {dest_dir}");
    }
    Ok(InstallOutcome {
        status,
        pack_id,
        version,
        hash,
        dest_dir,
    })
}

/// Remove a pack from the registry and drop its cached indexes. Store
/// directories stay: content-addressed content is garbage, not state.
pub fn uninstall_pack(ctx: &EngineContext, pack_id: &str) -> Result<Option<RegistryPackEntry>> {
    let removed = ctx.registry.unregister_pack(pack_id)?;
    if removed.is_some() {
        ctx.cache.invalidate(pack_id);
        info!("uninstalled pack {pack_id}");
    }
    Ok(removed)
}

fn has_hash(entry: &RegistryPackEntry, hash: &str) -> bool {
    entry.hash == hash || entry.installs.iter().any(|r| r.hash == hash)
}

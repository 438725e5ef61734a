use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::MANIFEST_FILENAMES;
use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::manifest::{ManifestDoc, PackManifest};
use crate::schema;

/// Locate the manifest file in `pack_dir`, trying the recognized filenames
/// in priority order.
pub fn locate_manifest(pack_dir: &Utf8Path) -> Result<Utf8PathBuf> {
    for filename in MANIFEST_FILENAMES {
        let candidate = pack_dir.join(filename);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(ScaffoldError::new(
        ErrorCode::ManifestNotFound,
        format!("no manifest found in {pack_dir}"),
    )
    .with_hint(format!(
        "expected one of: {}",
        MANIFEST_FILENAMES.join(", ")
    ))
    .with_detail("dir", pack_dir.as_str()))
}

/// Locate, parse, and validate the manifest of a pack directory.
pub fn load_manifest(pack_dir: &Utf8Path) -> Result<PackManifest> {
    let manifest_path = locate_manifest(pack_dir)?;
    debug!("loading manifest {manifest_path}");

    let raw = fs_err::read_to_string(&manifest_path).map_err(|e| {
        ScaffoldError::new(
            ErrorCode::ManifestYamlError,
            format!("cannot read {manifest_path}"),
        )
        .with_detail("path", manifest_path.as_str())
        .with_source(e)
    })?;
    let value: serde_yaml::Value = serde_yaml::from_str(&raw).map_err(|e| {
        ScaffoldError::new(
            ErrorCode::ManifestYamlError,
            format!("invalid YAML in {manifest_path}: {e}"),
        )
        .with_detail("path", manifest_path.as_str())
        .with_source(e)
    })?;

    schema::validate_manifest(&value)
        .map_err(|e| e.with_detail("path", manifest_path.as_str()))?;

    // The schema pass guarantees the shape, so a failure here is a bug in
    // the validator, not in the manifest.
    let doc: ManifestDoc = serde_yaml::from_value(value).map_err(|e| {
        ScaffoldError::new(
            ErrorCode::ManifestSchemaError,
            format!("manifest does not match its validated schema: {e}"),
        )
        .programming()
        .with_source(e)
    })?;

    Ok(PackManifest {
        pack: doc.pack,
        archetypes: doc.archetypes,
        manifest_path,
        pack_root_dir: pack_dir.to_path_buf(),
    })
}

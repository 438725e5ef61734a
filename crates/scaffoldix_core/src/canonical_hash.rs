use camino::Utf8Path;
use sha2::{Digest as _, Sha256};

use crate::error::{ErrorCode, Result, ScaffoldError};

/// Hash a manifest file to its 64-hex content identity.
///
/// Two manifests that are semantically equal — same mappings regardless of
/// key order, same scalars regardless of the platform's line endings — hash
/// to the same value: the YAML is parsed, re-serialized with mapping keys
/// sorted at every depth, normalized to LF, and only then hashed.
pub fn hash_manifest_file(path: &Utf8Path) -> Result<String> {
    let raw = fs_err::read_to_string(path).map_err(|e| {
        ScaffoldError::new(
            ErrorCode::ManifestYamlError,
            format!("cannot read manifest at {path}"),
        )
        .with_detail("path", path.as_str())
        .with_source(e)
    })?;
    hash_manifest_str(&raw).map_err(|e| e.with_detail("path", path.as_str()))
}

pub fn hash_manifest_str(raw: &str) -> Result<String> {
    let value: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|e| {
        ScaffoldError::new(ErrorCode::ManifestYamlError, format!("invalid YAML: {e}"))
            .with_source(e)
    })?;
    let canonical = serde_yaml::to_string(&canonicalize(value)).map_err(|e| {
        ScaffoldError::new(
            ErrorCode::ManifestYamlError,
            format!("cannot re-serialize manifest: {e}"),
        )
        .with_source(e)
    })?;
    let normalized = canonical.replace("\r\n", "\n").replace('\r', "\n");
    Ok(sha256_hex(normalized.as_bytes()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        use std::fmt::Write as _;
        write!(out, "{b:02x}").expect("writing to a String cannot fail");
        out
    })
}

/// Sort mapping keys lexicographically at every depth. Non-string keys sort
/// by their serialized form after all string keys.
fn canonicalize(value: serde_yaml::Value) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::Mapping(mapping) => {
            let mut entries: Vec<(serde_yaml::Value, serde_yaml::Value)> = mapping
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            entries.sort_by(|(a, _), (b, _)| key_ord(a).cmp(&key_ord(b)));
            serde_yaml::Value::Mapping(entries.into_iter().collect())
        }
        serde_yaml::Value::Sequence(seq) => {
            serde_yaml::Value::Sequence(seq.into_iter().map(canonicalize).collect())
        }
        other => other,
    }
}

fn key_ord(key: &serde_yaml::Value) -> (u8, String) {
    match key {
        serde_yaml::Value::String(s) => (0, s.clone()),
        other => (1, serde_yaml::to_string(other).unwrap_or_default()),
    }
}

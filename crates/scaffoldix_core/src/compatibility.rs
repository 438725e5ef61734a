use semver::Version;

use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::manifest::EngineCompatibility;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatReport {
    pub compatible: bool,
    pub reason: Option<String>,
}

/// Check the host engine version against a pack's declared window.
/// Constraints are evaluated in a fixed order (min, max, incompatible) and
/// the first failure wins, so reasons are deterministic.
pub fn check(host: &Version, compat: &EngineCompatibility) -> CompatReport {
    if let Some(min) = &compat.min_version {
        let min = parse(min);
        if *host < min {
            return incompatible(format!("engine version {host} is below the minimum {min}"));
        }
    }
    if let Some(max) = &compat.max_version {
        let max = parse(max);
        if *host > max {
            return incompatible(format!("engine version {host} is above the maximum {max}"));
        }
    }
    if compat.incompatible.iter().any(|v| parse(v) == *host) {
        return incompatible(format!("engine version {host} is marked incompatible"));
    }
    CompatReport {
        compatible: true,
        reason: None,
    }
}

/// `>=X,<=Y` plus an `incompatible: a,b` suffix when declared.
pub fn format_constraints(compat: &EngineCompatibility) -> String {
    let mut parts = Vec::new();
    if let Some(min) = &compat.min_version {
        parts.push(format!(">={min}"));
    }
    if let Some(max) = &compat.max_version {
        parts.push(format!("<={max}"));
    }
    let mut out = parts.join(",");
    if !compat.incompatible.is_empty() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!("incompatible: {}", compat.incompatible.join(",")));
    }
    out
}

/// Turn a failed check into the engine's typed error, carrying the pack and
/// engine coordinates in the details.
pub fn ensure_compatible(
    host: &Version,
    pack_id: &str,
    pack_version: &str,
    compat: Option<&EngineCompatibility>,
) -> Result<()> {
    let Some(compat) = compat else {
        return Ok(());
    };
    let report = check(host, compat);
    if report.compatible {
        return Ok(());
    }
    let constraints = format_constraints(compat);
    Err(ScaffoldError::new(
        ErrorCode::PackIncompatible,
        format!(
            "pack {pack_id}@{pack_version} is not compatible with engine {host}: {}",
            report.reason.as_deref().unwrap_or("incompatible")
        ),
    )
    .with_hint(format!(
        "pack requires engine {constraints}; this engine is {host}"
    ))
    .with_detail("packId", pack_id)
    .with_detail("packVersion", pack_version)
    .with_detail("engineVersion", host.to_string())
    .with_detail("constraints", constraints))
}

fn incompatible(reason: String) -> CompatReport {
    CompatReport {
        compatible: false,
        reason: Some(reason),
    }
}

// Constraint versions are schema-validated; a bad one at this point is a
// programming error, so fall back to an always-failing sentinel rather than
// panicking.
fn parse(version: &str) -> Version {
    Version::parse(version).unwrap_or_else(|_| Version::new(u64::MAX, 0, 0))
}

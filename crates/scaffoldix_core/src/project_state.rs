use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::fs_utils;

pub const STATE_SCHEMA_VERSION: u32 = 2;
pub const STATE_DIR: &str = ".scaffoldix";
pub const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub id: String,
    pub timestamp: String,
    pub pack_id: String,
    pub pack_version: String,
    pub archetype_id: String,
    pub inputs: BTreeMap<String, Value>,
    pub status: GenerationStatus,
}

/// Projection of the most recent generation, kept alongside the history for
/// cheap access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastGeneration {
    pub pack_id: String,
    pub pack_version: String,
    pub archetype_id: String,
    pub inputs: BTreeMap<String, Value>,
    pub timestamp: String,
}

impl From<&GenerationRecord> for LastGeneration {
    fn from(record: &GenerationRecord) -> Self {
        Self {
            pack_id: record.pack_id.clone(),
            pack_version: record.pack_version.clone(),
            archetype_id: record.archetype_id.clone(),
            inputs: record.inputs.clone(),
            timestamp: record.timestamp.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    pub schema_version: u32,
    pub updated_at: String,
    #[serde(default)]
    pub generations: Vec<GenerationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_generation: Option<LastGeneration>,
}

/// Per-target record of what was generated, at
/// `<targetDir>/.scaffoldix/state.json`, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct ProjectStateManager {
    target_dir: Utf8PathBuf,
}

impl ProjectStateManager {
    pub fn new(target_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }

    pub fn state_path(&self) -> Utf8PathBuf {
        self.target_dir.join(STATE_DIR).join(STATE_FILE)
    }

    /// Read the state, migrating older schema versions. Returns `None` when
    /// no state file exists.
    pub fn read(&self) -> Result<Option<ProjectState>> {
        let path = self.state_path();
        let raw = match fs_err::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ScaffoldError::new(
                    ErrorCode::StateInvalidJson,
                    format!("cannot read project state at {path}"),
                )
                .with_source(e));
            }
        };
        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            ScaffoldError::new(
                ErrorCode::StateInvalidJson,
                format!("project state at {path} is not valid JSON: {e}"),
            )
            .with_detail("path", path.as_str())
            .with_source(e)
        })?;

        let version = value
            .get("schemaVersion")
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid_schema(&path, "missing schemaVersion"))?;

        let state = match version {
            1 => migrate_v1(value).map_err(|reason| invalid_schema(&path, &reason))?,
            2 => serde_json::from_value(value)
                .map_err(|e| invalid_schema(&path, &e.to_string()))?,
            newer => {
                return Err(invalid_schema(
                    &path,
                    &format!("unknown schemaVersion {newer} (this engine supports up to {STATE_SCHEMA_VERSION})"),
                ));
            }
        };
        Ok(Some(state))
    }

    /// Atomically persist the state, creating `.scaffoldix/` if needed and
    /// cleaning up any straggler temp files from interrupted writes.
    pub fn write(&self, state: &ProjectState) -> Result<()> {
        let path = self.state_path();
        let parent = path.parent().expect("state path has a parent");
        fs_err::create_dir_all(parent).map_err(|e| {
            ScaffoldError::new(
                ErrorCode::StateInvalidSchema,
                format!("cannot create state directory {parent}"),
            )
            .with_source(e)
        })?;

        let mut json = serde_json::to_string_pretty(state).map_err(|e| {
            ScaffoldError::new(ErrorCode::StateInvalidSchema, "cannot serialize project state")
                .with_source(e)
        })?;
        json.push('\n');

        let tmp_name = format!("{STATE_FILE}.{}.tmp", fs_utils::random_suffix());
        fs_utils::write_atomic(&path, json.as_bytes(), &tmp_name).map_err(|e| {
            ScaffoldError::new(
                ErrorCode::StateInvalidJson,
                format!("cannot write project state at {path}"),
            )
            .with_source(e)
        })?;

        self.clean_stragglers(parent);
        Ok(())
    }

    /// Append a generation to the history and refresh the projection.
    pub fn append_generation(
        &self,
        record: GenerationRecord,
        clock: &dyn Clock,
    ) -> Result<ProjectState> {
        let mut state = self.read()?.unwrap_or(ProjectState {
            schema_version: STATE_SCHEMA_VERSION,
            updated_at: clock.now_iso(),
            generations: Vec::new(),
            last_generation: None,
        });
        state.schema_version = STATE_SCHEMA_VERSION;
        state.updated_at = clock.now_iso();
        state.last_generation = Some(LastGeneration::from(&record));
        state.generations.push(record);
        self.write(&state)?;
        Ok(state)
    }

    fn clean_stragglers(&self, parent: &Utf8Path) {
        let Ok(entries) = fs_err::read_dir(parent) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(STATE_FILE) && name.ends_with(".tmp") {
                debug!("removing straggler state temp file {name}");
                let _ = fs_err::remove_file(entry.path());
            }
        }
    }
}

fn invalid_schema(path: &Utf8Path, reason: &str) -> ScaffoldError {
    ScaffoldError::new(
        ErrorCode::StateInvalidSchema,
        format!("project state at {path} has an invalid schema: {reason}"),
    )
    .with_detail("path", path.as_str())
}

/// Version 1 carried only `lastGeneration`; wrap it into a one-element
/// history. Migration is idempotent: a migrated document re-reads as v2.
fn migrate_v1(value: Value) -> std::result::Result<ProjectState, String> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct StateV1 {
        updated_at: Option<String>,
        last_generation: Option<LastGeneration>,
    }

    let v1: StateV1 = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let generations = v1
        .last_generation
        .as_ref()
        .map(|last| {
            vec![GenerationRecord {
                id: format!("migrated-{}", last.timestamp),
                timestamp: last.timestamp.clone(),
                pack_id: last.pack_id.clone(),
                pack_version: last.pack_version.clone(),
                archetype_id: last.archetype_id.clone(),
                inputs: last.inputs.clone(),
                status: GenerationStatus::Success,
            }]
        })
        .unwrap_or_default();

    Ok(ProjectState {
        schema_version: STATE_SCHEMA_VERSION,
        updated_at: v1
            .updated_at
            .or_else(|| v1.last_generation.as_ref().map(|l| l.timestamp.clone()))
            .unwrap_or_default(),
        generations,
        last_generation: v1.last_generation,
    })
}

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// The serialized shape of a manifest file (`archetype.yaml` / `pack.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDoc {
    pub pack: PackMeta,
    pub archetypes: Vec<Archetype>,
}

/// A loaded manifest, carrying the paths it was read from so template roots
/// and auxiliary patch files can be resolved later. The paths are not part
/// of the serialized document.
#[derive(Debug, Clone)]
pub struct PackManifest {
    pub pack: PackMeta,
    pub archetypes: Vec<Archetype>,
    pub manifest_path: Utf8PathBuf,
    pub pack_root_dir: Utf8PathBuf,
}

impl PackManifest {
    pub fn archetype(&self, id: &str) -> Option<&Archetype> {
        self.archetypes.iter().find(|a| a.id == id)
    }

    pub fn archetype_ids(&self) -> Vec<&str> {
        self.archetypes.iter().map(|a| a.id.as_str()).collect()
    }

    /// Absolute template directory of an archetype.
    pub fn template_dir(&self, archetype: &Archetype) -> Utf8PathBuf {
        self.pack_root_dir.join(&archetype.template_root)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackMeta {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_compatibility: Option<EngineCompatibility>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineCompatibility {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incompatible: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Archetype {
    pub id: String,
    /// Relative to the pack root.
    pub template_root: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<PatchOp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<String>,
    /// Literal path tokens replaced before template expansion,
    /// e.g. `__name__` -> `{{ name }}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rename_rules: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hooks {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_generate: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    String,
    Number,
    Boolean,
    Enum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    // string constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    // number constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub integer: bool,
    // enum constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<EnumOption>>,
    /// Per-rule overrides of the default validation messages, keyed by rule
    /// name (`required`, `minLength`, `regex`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub messages: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<InputCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Only resolve this input when another input has a given value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputCondition {
    pub input: String,
    pub equals: serde_json::Value,
}

/// Enum options are either bare values or value/label pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumOption {
    Value(String),
    Labeled { value: String, label: String },
}

impl EnumOption {
    pub fn value(&self) -> &str {
        match self {
            Self::Value(v) => v,
            Self::Labeled { value, .. } => value,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Value(v) => v,
            Self::Labeled { label, .. } => label,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatchOpKind {
    InsertAfterAnchor,
    EnsureBlock,
    AppendIfMissing,
    DeleteBlock,
}

/// A declarative, keyed, idempotent textual mutation of a target file.
///
/// `content` and `from_file` are mutually exclusive sources; `from_file` is
/// relative to the pack root. `marker` is the comment leader used for the
/// begin/end lines of block operations (defaults to `//`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOp {
    pub kind: PatchOpKind,
    /// Target-relative path of the file to patch.
    pub file: String,
    pub idempotency_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_file: Option<String>,
    /// Whether the content passes through the template evaluator.
    #[serde(default = "default_true")]
    pub render: bool,
}

fn default_true() -> bool {
    true
}

impl PatchOp {
    pub fn marker_leader(&self) -> &str {
        self.marker.as_deref().unwrap_or("//")
    }
}

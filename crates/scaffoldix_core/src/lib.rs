mod canonical_hash;
mod clock;
mod command;
mod compatibility;
mod conflict;
mod context;
mod error;
pub mod fs_utils;
mod hooks;
mod index_cache;
mod inputs;
mod manifest;
mod manifest_loader;
mod patch;
mod project_state;
mod registry;
mod render;
mod resolver;
mod schema;
mod store;
mod tera;
mod trace;

pub use canonical_hash::{hash_manifest_file, hash_manifest_str, sha256_hex};
pub use clock::{Clock, FixedClock, SystemClock};
pub use command::generate::{
    ArchetypeRef, GenerateDeps, GenerateRequest, GenerateResult, generate, parse_archetype_ref,
};
pub use command::install::{
    InstallOptions, InstallOutcome, install_git_pack, install_local_pack, uninstall_pack,
};
pub use command::list::{ArchetypeListEntry, ArchetypeListing, list_archetypes};
pub use compatibility::{CompatReport, check as check_compatibility, format_constraints};
pub use conflict::{Conflict, ConflictReport, detect_conflicts};
pub use context::EngineContext;
pub use error::{ErrorCategory, ErrorCode, Result, ScaffoldError};
pub use hooks::{CommandOutcome, CommandRunner, ShellRunner};
pub use index_cache::{IndexArchetype, PackIndex, PackIndexCache, build_index};
pub use inputs::{PromptAdapter, resolve_inputs, user_cancelled, validate_value};
pub use manifest::{
    Archetype, EngineCompatibility, EnumOption, Hooks, InputCondition, InputDef, InputType,
    ManifestDoc, PackManifest, PackMeta, PatchOp, PatchOpKind,
};
pub use manifest_loader::{load_manifest, locate_manifest};
pub use patch::{ALREADY_APPLIED, PatchEngine, PatchReport, PatchResult, PatchStatus};
pub use project_state::{
    GenerationRecord, GenerationStatus, LastGeneration, ProjectState, ProjectStateManager,
    STATE_DIR, STATE_FILE, STATE_SCHEMA_VERSION,
};
pub use registry::{
    PackInstallRecord, PackOrigin, REGISTRY_SCHEMA_VERSION, RegisterPackInput, Registry,
    RegistryPackEntry, RegistryStore,
};
pub use render::{FileEntry, FileOperation, render_plan};
pub use resolver::{PackResolver, resolve_record};
pub use store::{
    EXCLUDED_COPY_NAMES, InstallStatus, StorePaths, install_dir_into_store, sanitize_pack_id,
};
pub use tera::{TemplateEvaluator, TeraEvaluator};
pub use trace::Trace;

/// The engine version packs declare compatibility against.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Recognized manifest filenames, in priority order.
pub const MANIFEST_FILENAMES: &[&str] = &["archetype.yaml", "pack.yaml"];

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools as _;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::clock::Clock;
use crate::compatibility::ensure_compatible;
use crate::conflict::{ConflictReport, detect_conflicts};
use crate::context::EngineContext;
use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::fs_utils;
use crate::hooks::{CommandOutcome, CommandRunner};
use crate::index_cache::build_index;
use crate::inputs::{PromptAdapter, resolve_inputs};
use crate::manifest_loader::load_manifest;
use crate::patch::{PatchEngine, PatchReport};
use crate::project_state::{GenerationRecord, GenerationStatus, ProjectStateManager};
use crate::render::{FileEntry, FileOperation, render_plan};
use crate::resolver::PackResolver;
use crate::tera::TemplateEvaluator;
use crate::trace::Trace;

const CONFLICT_HINT_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// `packId[:version]:archetypeId`
    pub archetype_ref: String,
    pub target_dir: Utf8PathBuf,
    pub dry_run: bool,
    pub force: bool,
    pub non_interactive: bool,
    pub data: BTreeMap<String, Value>,
}

impl GenerateRequest {
    pub fn new(archetype_ref: impl Into<String>, target_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            archetype_ref: archetype_ref.into(),
            target_dir: target_dir.into(),
            dry_run: false,
            force: false,
            non_interactive: false,
            data: BTreeMap::new(),
        }
    }
}

/// The injected collaborators of a generation run.
pub struct GenerateDeps<'a> {
    pub prompt: &'a dyn PromptAdapter,
    pub evaluator: &'a dyn TemplateEvaluator,
    pub hook_runner: &'a dyn CommandRunner,
    pub check_runner: &'a dyn CommandRunner,
}

impl std::fmt::Debug for GenerateDeps<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateDeps").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct GenerateResult {
    pub pack_id: String,
    pub pack_version: String,
    pub archetype_id: String,
    /// The full in-memory plan, always present.
    pub files_planned: Vec<FileEntry>,
    /// Relative paths actually written; empty on dry-run.
    pub files_written: Vec<Utf8PathBuf>,
    pub conflicts: ConflictReport,
    pub patch_report: Option<PatchReport>,
    pub patches_skipped_for_dry_run: bool,
    pub hook_outcomes: Vec<CommandOutcome>,
    pub check_outcomes: Vec<CommandOutcome>,
    /// Set when project state was recorded.
    pub generation_id: Option<String>,
    pub trace: Trace,
}

/// A parsed `packId[:version]:archetypeId` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchetypeRef {
    pub pack_id: String,
    pub version: Option<String>,
    pub archetype_id: String,
}

/// Split at the last `:` for the archetype, then again for an optional
/// version. Scoped pack ids (`@org/x`) contain no `:`, so this is
/// unambiguous.
pub fn parse_archetype_ref(reference: &str) -> Result<ArchetypeRef> {
    let invalid = |reason: &str| {
        ScaffoldError::new(
            ErrorCode::InvalidArchetypeRef,
            format!("invalid archetype reference {reference:?}: {reason}"),
        )
        .with_hint("expected packId[:version]:archetypeId, e.g. @org/starter:app")
        .with_detail("reference", reference)
    };

    let (head, archetype_id) = reference
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing archetype id"))?;
    if archetype_id.is_empty() {
        return Err(invalid("archetype id is empty"));
    }

    let (pack_id, version) = match head.rsplit_once(':') {
        Some((pack_id, version)) => {
            if version.is_empty() {
                return Err(invalid("version is empty"));
            }
            (pack_id, Some(version.to_owned()))
        }
        None => (head, None),
    };
    if pack_id.is_empty() {
        return Err(invalid("pack id is empty"));
    }

    Ok(ArchetypeRef {
        pack_id: pack_id.to_owned(),
        version,
        archetype_id: archetype_id.to_owned(),
    })
}

/// Run the full generation pipeline: resolve, load, validate inputs, plan,
/// detect conflicts, write, patch, run hooks and checks, record state.
///
/// Before the write phase no side effects have occurred (the index cache
/// aside), so input cancellation and dry-run leave the target untouched.
#[instrument(skip_all, fields(reference = %request.archetype_ref, target = %request.target_dir))]
pub fn generate(
    ctx: &EngineContext,
    deps: &GenerateDeps<'_>,
    request: &GenerateRequest,
) -> Result<GenerateResult> {
    let mut trace = Trace::new();

    trace.start("parse-ref");
    let reference = parse_archetype_ref(&request.archetype_ref)?;
    trace.end("parse-ref");

    trace.start("resolve-pack");
    let resolver = PackResolver::new(&ctx.registry);
    let record = resolver.resolve(&reference.pack_id, reference.version.as_deref())?;
    trace.end("resolve-pack");

    trace.start("store-path");
    let store_path = ctx.paths.pack_dest_dir(&reference.pack_id, &record.hash);
    if !store_path.is_dir() {
        return Err(ScaffoldError::new(
            ErrorCode::PackStoreMissing,
            format!(
                "store content for {}@{} is missing at {store_path}",
                reference.pack_id, record.version
            ),
        )
        .with_hint(format!(
            "reinstall the pack: its registry entry exists but the content is gone ({})",
            reference.pack_id
        ))
        .with_detail("packId", reference.pack_id.as_str())
        .with_detail("storePath", store_path.as_str()));
    }
    trace.end("store-path");

    trace.start("load-manifest");
    let manifest = load_manifest(&store_path)?;
    ensure_compatible(
        &ctx.engine_version,
        &reference.pack_id,
        &manifest.pack.version,
        manifest.pack.engine_compatibility.as_ref(),
    )?;
    if ctx.cache.get(&reference.pack_id, &record.hash).is_none() {
        ctx.cache
            .set(&build_index(&reference.pack_id, &manifest, &record.hash))?;
    }
    trace.end("load-manifest");

    trace.start("select-archetype");
    let archetype = manifest.archetype(&reference.archetype_id).ok_or_else(|| {
        let available = manifest.archetype_ids().join(", ");
        ScaffoldError::new(
            ErrorCode::ArchetypeNotFound,
            format!(
                "pack {} has no archetype {:?}",
                reference.pack_id, reference.archetype_id
            ),
        )
        .with_hint(format!("available archetypes: {available}"))
        .with_detail("archetypeId", reference.archetype_id.as_str())
    })?;
    trace.end("select-archetype");

    trace.start("validate-template-dir");
    let template_dir = manifest.template_dir(archetype);
    if !template_dir.is_dir() {
        return Err(ScaffoldError::new(
            ErrorCode::TemplateDirNotFound,
            format!("template directory {template_dir} is not a directory"),
        )
        .with_detail("templateRoot", archetype.template_root.as_str()));
    }
    trace.end("validate-template-dir");

    trace.start("resolve-inputs");
    let inputs = resolve_inputs(
        &archetype.inputs,
        &request.data,
        request.non_interactive,
        deps.prompt,
    )?;
    trace.end("resolve-inputs");

    trace.start("render-plan");
    let mut plan = render_plan(
        &template_dir,
        &request.target_dir,
        &inputs,
        &archetype.rename_rules,
        deps.evaluator,
    )?;
    trace.end("render-plan");

    trace.start("detect-conflicts");
    let conflicts = detect_conflicts(&mut plan, &request.target_dir)?;
    if conflicts.has_conflicts && !request.force && !request.dry_run {
        let listed = conflicts
            .conflicts
            .iter()
            .take(CONFLICT_HINT_LIMIT)
            .map(|c| c.relative_path.as_str())
            .join(", ");
        let suffix = if conflicts.count > CONFLICT_HINT_LIMIT {
            format!(" (and {} more)", conflicts.count - CONFLICT_HINT_LIMIT)
        } else {
            String::new()
        };
        return Err(ScaffoldError::new(
            ErrorCode::GenerateConflict,
            format!(
                "{} file(s) already exist with different content",
                conflicts.count
            ),
        )
        .with_hint(format!(
            "conflicting: {listed}{suffix}; re-run with --force to overwrite"
        ))
        .with_detail(
            "conflicts",
            serde_json::json!(
                conflicts
                    .conflicts
                    .iter()
                    .map(|c| c.relative_path.as_str())
                    .collect::<Vec<_>>()
            ),
        ));
    }
    trace.end("detect-conflicts");

    let mut files_written = Vec::new();
    if !request.dry_run {
        trace.start("write-files");
        for entry in &plan {
            if entry.operation == FileOperation::Noop {
                continue;
            }
            write_planned_file(entry)?;
            files_written.push(entry.dest_relative_path.clone());
        }
        trace.end("write-files");
    }

    let mut patch_report = None;
    let patches_skipped_for_dry_run = request.dry_run && !archetype.patches.is_empty();
    if !request.dry_run && !archetype.patches.is_empty() {
        trace.start("apply-patches");
        let engine = PatchEngine::new(
            &request.target_dir,
            &manifest.pack_root_dir,
            &inputs,
            deps.evaluator,
        );
        let report = engine.apply_all(&archetype.patches)?;
        if report.failed > 0 {
            let failed: Vec<_> = report.failed_results().collect();
            return Err(ScaffoldError::new(
                ErrorCode::PatchApplicationFailed,
                format!("{} patch operation(s) failed", report.failed),
            )
            .with_hint("inspect the failed operations; the target may be partially patched")
            .with_detail("failed", serde_json::json!(failed)));
        }
        patch_report = Some(report);
        trace.end("apply-patches");
    }

    let mut hook_outcomes = Vec::new();
    let mut check_outcomes = Vec::new();
    if !request.dry_run {
        let env = command_env(&reference.pack_id, &record.version, &archetype.id, &inputs);

        let hooks = archetype
            .hooks
            .as_ref()
            .map(|h| h.post_generate.as_slice())
            .unwrap_or_default();
        if !hooks.is_empty() {
            trace.start("run-hooks");
            hook_outcomes =
                deps.hook_runner
                    .run_all(hooks, &request.target_dir, &env, true)?;
            fail_on_command_error(&hook_outcomes, ErrorCode::HookExecutionFailed, "hook")?;
            trace.end("run-hooks");
        }

        if !archetype.checks.is_empty() {
            trace.start("run-checks");
            check_outcomes =
                deps.check_runner
                    .run_all(&archetype.checks, &request.target_dir, &env, true)?;
            fail_on_command_error(&check_outcomes, ErrorCode::CheckFailed, "check")?;
            trace.end("run-checks");
        }
    }

    let mut generation_id = None;
    if !request.dry_run {
        trace.start("write-state");
        let id = new_generation_id(ctx.clock.as_ref());
        ProjectStateManager::new(&request.target_dir).append_generation(
            GenerationRecord {
                id: id.clone(),
                timestamp: ctx.clock.now_iso(),
                pack_id: reference.pack_id.clone(),
                pack_version: record.version.clone(),
                archetype_id: archetype.id.clone(),
                inputs: inputs.clone(),
                status: GenerationStatus::Success,
            },
            ctx.clock.as_ref(),
        )?;
        generation_id = Some(id);
        trace.end("write-state");
    }

    info!(
        "generated {}:{} into {} ({} planned, {} written{})",
        reference.pack_id,
        archetype.id,
        request.target_dir,
        plan.len(),
        files_written.len(),
        if request.dry_run { ", dry-run" } else { "" },
    );
    Ok(GenerateResult {
        pack_id: reference.pack_id,
        pack_version: record.version,
        archetype_id: archetype.id.clone(),
        files_planned: plan,
        files_written,
        conflicts,
        patch_report,
        patches_skipped_for_dry_run,
        hook_outcomes,
        check_outcomes,
        generation_id,
        trace,
    })
}

/// Atomic per-file write: temp sibling, rename, then permissions.
fn write_planned_file(entry: &FileEntry) -> Result<()> {
    let parent = entry
        .absolute_path
        .parent()
        .ok_or_else(|| ScaffoldError::internal(format!("{} has no parent", entry.absolute_path)))?;
    fs_err::create_dir_all(parent).map_err(|e| write_failed(entry, e.into()))?;

    let tmp_name = format!(
        ".{}.{}.tmp",
        entry.absolute_path.file_name().unwrap_or("file"),
        fs_utils::random_suffix()
    );
    fs_utils::write_atomic(&entry.absolute_path, &entry.bytes, &tmp_name)
        .map_err(|e| write_failed(entry, e))?;

    set_mode(&entry.absolute_path, entry.mode).map_err(|e| write_failed(entry, e.into()))?;
    debug!("wrote {}", entry.dest_relative_path);
    Ok(())
}

fn write_failed(entry: &FileEntry, e: anyhow::Error) -> ScaffoldError {
    ScaffoldError::new(
        ErrorCode::InternalError,
        format!("cannot write {}", entry.absolute_path),
    )
    .with_detail("path", entry.absolute_path.as_str())
    .with_source(e)
}

#[cfg(unix)]
fn set_mode(path: &Utf8Path, mode: Option<u32>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;
    match mode {
        Some(mode) => fs_err::set_permissions(path, std::fs::Permissions::from_mode(mode)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Utf8Path, _mode: Option<u32>) -> std::io::Result<()> {
    Ok(())
}

fn fail_on_command_error(
    outcomes: &[CommandOutcome],
    code: ErrorCode,
    what: &str,
) -> Result<()> {
    let Some(failed) = outcomes.iter().find(|o| !o.success) else {
        return Ok(());
    };
    Err(ScaffoldError::new(
        code,
        format!(
            "{what} command `{}` exited with {}",
            failed.command,
            failed
                .exit_code
                .map_or_else(|| "a signal".to_owned(), |c| c.to_string())
        ),
    )
    .with_detail("command", failed.command.as_str())
    .with_detail("stdout", failed.stdout.as_str())
    .with_detail("stderr", failed.stderr.as_str()))
}

fn command_env(
    pack_id: &str,
    pack_version: &str,
    archetype_id: &str,
    inputs: &BTreeMap<String, Value>,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::from([
        ("SCAFFOLDIX_PACK_ID".to_owned(), pack_id.to_owned()),
        ("SCAFFOLDIX_PACK_VERSION".to_owned(), pack_version.to_owned()),
        ("SCAFFOLDIX_ARCHETYPE_ID".to_owned(), archetype_id.to_owned()),
    ]);
    for (name, value) in inputs {
        let key = format!(
            "SCAFFOLDIX_INPUT_{}",
            name.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_")
        );
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        env.insert(key, value);
    }
    env
}

fn new_generation_id(clock: &dyn Clock) -> String {
    format!(
        "gen-{}-{}",
        clock.now().format("%Y%m%d%H%M%S"),
        fs_utils::random_suffix().to_lowercase()
    )
}

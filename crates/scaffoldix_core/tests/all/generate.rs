use pretty_assertions::assert_eq;
use scaffoldix_core::{
    ErrorCode, FileOperation, GenerateRequest, InstallOptions, ProjectStateManager, generate,
    install_local_pack,
};

use crate::helpers::{CancellingPrompt, DenyPrompt, PackBuilder, TestContext, data, deps};

const APP_MANIFEST: &str = "
pack:
  name: starter
  version: 1.0.0
archetypes:
  - id: app
    templateRoot: t
    inputs:
      - name: name
        type: string
        required: true
";

fn install_app_pack(test: &TestContext) {
    let pack = PackBuilder::new(&test.pack_dir("starter"), APP_MANIFEST)
        .file("t/package.json", "{ \"name\": \"{{ name }}\" }")
        .file("t/src/index.ts", "export const app = '{{ name }}';\n")
        .build();
    install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap();
}

fn request(test: &TestContext, reference: &str) -> GenerateRequest {
    let mut request = GenerateRequest::new(reference, test.target_dir());
    request.non_interactive = true;
    request.data = data(&[("name", "demo")]);
    request
}

#[test]
fn generates_into_an_empty_target() {
    let test = TestContext::new();
    install_app_pack(&test);

    let result = generate(&test.ctx, &deps(&DenyPrompt), &request(&test, "starter:app")).unwrap();

    assert_eq!(result.pack_id, "starter");
    assert_eq!(result.pack_version, "1.0.0");
    assert_eq!(result.archetype_id, "app");
    assert_eq!(result.files_written.len(), 2);
    assert!(result.generation_id.is_some());

    let target = test.target_dir();
    assert_eq!(
        fs_err::read_to_string(target.join("package.json")).unwrap(),
        "{ \"name\": \"demo\" }"
    );
    assert_eq!(
        fs_err::read_to_string(target.join("src/index.ts")).unwrap(),
        "export const app = 'demo';\n"
    );
    assert!(!result.trace.is_empty());
}

#[test]
fn conflicts_gate_writes_unless_forced() {
    let test = TestContext::new();
    install_app_pack(&test);
    let target = test.target_dir();
    fs_err::write(target.join("package.json"), "{}").unwrap();

    // force=false: typed conflict listing the offending file.
    let err = generate(&test.ctx, &deps(&DenyPrompt), &request(&test, "starter:app")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::GenerateConflict);
    assert_eq!(
        err.details().get("conflicts"),
        Some(&serde_json::json!(["package.json"]))
    );
    assert!(err.hint().unwrap().contains("--force"));
    assert_eq!(fs_err::read_to_string(target.join("package.json")).unwrap(), "{}");
    assert!(!target.join("src/index.ts").exists());

    // force=true: the conflicting file is replaced.
    let mut forced = request(&test, "starter:app");
    forced.force = true;
    generate(&test.ctx, &deps(&DenyPrompt), &forced).unwrap();
    assert_eq!(
        fs_err::read_to_string(target.join("package.json")).unwrap(),
        "{ \"name\": \"demo\" }"
    );
}

#[test]
fn dry_run_reports_conflicts_without_writing() {
    let test = TestContext::new();
    install_app_pack(&test);
    let target = test.target_dir();
    fs_err::write(target.join("package.json"), "{}").unwrap();

    let mut dry = request(&test, "starter:app");
    dry.dry_run = true;
    let result = generate(&test.ctx, &deps(&DenyPrompt), &dry).unwrap();

    assert!(result.conflicts.has_conflicts);
    assert_eq!(result.conflicts.count, 1);
    assert!(result.files_written.is_empty());
    assert_eq!(result.files_planned.len(), 2);
    assert!(result.generation_id.is_none());

    // Nothing changed on disk, and no state was recorded.
    assert_eq!(fs_err::read_to_string(target.join("package.json")).unwrap(), "{}");
    assert!(!target.join("src/index.ts").exists());
    assert!(ProjectStateManager::new(target).read().unwrap().is_none());
}

#[test]
fn patches_are_idempotent_across_runs() {
    let test = TestContext::new();
    let manifest = "
pack:
  name: patcher
  version: 1.0.0
archetypes:
  - id: a
    templateRoot: t
    patches:
      - kind: insertAfterAnchor
        file: src/index.ts
        idempotencyKey: K1
        anchor: '// @scaffold:exports'
        content: |
          export const X = 1;
";
    let pack = PackBuilder::new(&test.pack_dir("patcher"), manifest)
        .file("t/readme.md", "patched project\n")
        .build();
    install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap();

    let target = test.target_dir();
    fs_err::create_dir_all(target.join("src")).unwrap();
    fs_err::write(
        target.join("src/index.ts"),
        "// @scaffold:exports\nconst rest = true;\n",
    )
    .unwrap();

    let mut req = GenerateRequest::new("patcher:a", target.clone());
    req.non_interactive = true;
    req.force = true;

    let first = generate(&test.ctx, &deps(&DenyPrompt), &req).unwrap();
    let report = first.patch_report.unwrap();
    assert_eq!(
        (report.total, report.applied, report.skipped, report.failed),
        (1, 1, 0, 0)
    );
    let patched = fs_err::read_to_string(target.join("src/index.ts")).unwrap();
    assert_eq!(
        patched,
        "// @scaffold:exports\nexport const X = 1;\nconst rest = true;\n"
    );

    let second = generate(&test.ctx, &deps(&DenyPrompt), &req).unwrap();
    let report = second.patch_report.unwrap();
    assert_eq!(
        (report.total, report.applied, report.skipped, report.failed),
        (1, 0, 1, 0)
    );
    assert_eq!(
        fs_err::read_to_string(target.join("src/index.ts")).unwrap(),
        patched
    );
}

#[test]
fn dry_run_skips_patches_with_a_flag() {
    let test = TestContext::new();
    let manifest = "
pack:
  name: patcher
  version: 1.0.0
archetypes:
  - id: a
    templateRoot: t
    patches:
      - kind: appendIfMissing
        file: notes.txt
        idempotencyKey: K1
        content: appended
";
    let pack = PackBuilder::new(&test.pack_dir("patcher"), manifest)
        .file("t/readme.md", "x")
        .build();
    install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap();

    let mut req = GenerateRequest::new("patcher:a", test.target_dir());
    req.non_interactive = true;
    req.dry_run = true;
    let result = generate(&test.ctx, &deps(&DenyPrompt), &req).unwrap();
    assert!(result.patches_skipped_for_dry_run);
    assert!(result.patch_report.is_none());
}

#[test]
fn generation_is_recorded_in_project_state() {
    let test = TestContext::new();
    install_app_pack(&test);

    generate(&test.ctx, &deps(&DenyPrompt), &request(&test, "starter:app")).unwrap();
    let mut second = request(&test, "starter:app");
    second.force = true;
    generate(&test.ctx, &deps(&DenyPrompt), &second).unwrap();

    let state = ProjectStateManager::new(test.target_dir())
        .read()
        .unwrap()
        .unwrap();
    assert_eq!(state.schema_version, 2);
    assert_eq!(state.generations.len(), 2);
    let last = state.last_generation.unwrap();
    assert_eq!(last.pack_id, "starter");
    assert_eq!(last.archetype_id, "app");
    assert_eq!(last.inputs["name"], serde_json::json!("demo"));
    assert_eq!(last.timestamp, state.generations[1].timestamp);
}

#[test]
fn rerun_with_force_is_byte_stable() {
    let test = TestContext::new();
    install_app_pack(&test);

    let mut req = request(&test, "starter:app");
    req.force = true;
    generate(&test.ctx, &deps(&DenyPrompt), &req).unwrap();
    let first = fs_err::read_to_string(test.target_dir().join("src/index.ts")).unwrap();

    let second_result = generate(&test.ctx, &deps(&DenyPrompt), &req).unwrap();
    let second = fs_err::read_to_string(test.target_dir().join("src/index.ts")).unwrap();
    assert_eq!(first, second);

    // Identical content classifies as noop, so nothing needs rewriting.
    assert!(
        second_result
            .files_planned
            .iter()
            .all(|f| f.operation == FileOperation::Noop)
    );
}

#[test]
fn missing_required_input_fails_non_interactively() {
    let test = TestContext::new();
    install_app_pack(&test);

    let mut req = GenerateRequest::new("starter:app", test.target_dir());
    req.non_interactive = true;
    let err = generate(&test.ctx, &deps(&DenyPrompt), &req).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InputRequired);
}

#[test]
fn cancellation_leaves_no_side_effects() {
    let test = TestContext::new();
    install_app_pack(&test);

    let req = GenerateRequest::new("starter:app", test.target_dir());
    let err = generate(&test.ctx, &deps(&CancellingPrompt), &req).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UserCancelled);

    let target = test.target_dir();
    assert!(!target.join("package.json").exists());
    assert!(ProjectStateManager::new(target).read().unwrap().is_none());
}

#[test]
fn unknown_pack_version_and_archetype_are_typed() {
    let test = TestContext::new();
    install_app_pack(&test);

    let err = generate(
        &test.ctx,
        &deps(&DenyPrompt),
        &request(&test, "ghost:app"),
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PackNotFound);

    let err = generate(
        &test.ctx,
        &deps(&DenyPrompt),
        &request(&test, "starter:9.9.9:app"),
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::VersionNotFound);

    let err = generate(
        &test.ctx,
        &deps(&DenyPrompt),
        &request(&test, "starter:ghost"),
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ArchetypeNotFound);
    assert!(err.hint().unwrap().contains("app"));
}

#[test]
fn missing_store_content_asks_for_reinstall() {
    let test = TestContext::new();
    install_app_pack(&test);
    let entry = test.ctx.registry.get_pack("starter").unwrap().unwrap();
    fs_err::remove_dir_all(test.ctx.paths.pack_dest_dir("starter", &entry.hash)).unwrap();

    let err = generate(&test.ctx, &deps(&DenyPrompt), &request(&test, "starter:app")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::PackStoreMissing);
    assert!(err.hint().unwrap().contains("reinstall"));
}

#[cfg(unix)]
#[test]
fn hooks_and_checks_run_in_the_target() {
    let test = TestContext::new();
    let manifest = "
pack:
  name: hooked
  version: 1.0.0
archetypes:
  - id: a
    templateRoot: t
    hooks:
      postGenerate:
        - echo \"$SCAFFOLDIX_PACK_ID\" > hook-ran.txt
    checks:
      - test -f hook-ran.txt
";
    let pack = PackBuilder::new(&test.pack_dir("hooked"), manifest)
        .file("t/readme.md", "x")
        .build();
    install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap();

    let mut req = GenerateRequest::new("hooked:a", test.target_dir());
    req.non_interactive = true;
    let result = generate(&test.ctx, &deps(&DenyPrompt), &req).unwrap();

    assert_eq!(result.hook_outcomes.len(), 1);
    assert!(result.hook_outcomes[0].success);
    assert_eq!(result.check_outcomes.len(), 1);
    assert_eq!(
        fs_err::read_to_string(test.target_dir().join("hook-ran.txt"))
            .unwrap()
            .trim(),
        "hooked"
    );
}

#[cfg(unix)]
#[test]
fn failing_check_surfaces_output_and_skips_state() {
    let test = TestContext::new();
    let manifest = "
pack:
  name: checked
  version: 1.0.0
archetypes:
  - id: a
    templateRoot: t
    checks:
      - echo broken >&2; exit 7
";
    let pack = PackBuilder::new(&test.pack_dir("checked"), manifest)
        .file("t/readme.md", "x")
        .build();
    install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap();

    let mut req = GenerateRequest::new("checked:a", test.target_dir());
    req.non_interactive = true;
    let err = generate(&test.ctx, &deps(&DenyPrompt), &req).unwrap_err();

    assert_eq!(err.code(), ErrorCode::CheckFailed);
    assert!(
        err.details()
            .get("stderr")
            .unwrap()
            .as_str()
            .unwrap()
            .contains("broken")
    );
    // Failed runs are not recorded.
    assert!(
        ProjectStateManager::new(test.target_dir())
            .read()
            .unwrap()
            .is_none()
    );
}

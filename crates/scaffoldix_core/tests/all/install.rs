use pretty_assertions::assert_eq;
use scaffoldix_core::{
    ErrorCode, InstallOptions, InstallStatus, PackResolver, install_local_pack, uninstall_pack,
};

use crate::helpers::{PackBuilder, TestContext};

#[test]
fn install_twice_is_idempotent() {
    let test = TestContext::new();
    let pack = PackBuilder::minimal(&test.pack_dir("p"), "p", "1.0.0").build();

    let first = install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap();
    assert_eq!(first.status, InstallStatus::Installed);
    assert_eq!(first.pack_id, "p");
    assert_eq!(
        first.dest_dir,
        test.ctx.paths.pack_dest_dir("p", &first.hash)
    );
    assert!(first.dest_dir.join("t/x.txt").is_file());

    let second = install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap();
    assert_eq!(second.status, InstallStatus::AlreadyInstalled);
    assert_eq!(second.dest_dir, first.dest_dir);
    assert_eq!(second.hash, first.hash);

    // Exactly one registry entry, with the same hash.
    let entry = test.ctx.registry.get_pack("p").unwrap().unwrap();
    assert_eq!(entry.hash, first.hash);
    assert_eq!(test.ctx.registry.list_packs().unwrap().len(), 1);
}

#[test]
fn multiple_versions_coexist_and_resolve() {
    let test = TestContext::new();
    let v1 = PackBuilder::minimal(&test.pack_dir("v1"), "p", "1.0.0").build();
    let v2 = PackBuilder::minimal(&test.pack_dir("v2"), "p", "2.0.0")
        .file("t/extra.txt", "more")
        .build();

    install_local_pack(&test.ctx, &v1, &InstallOptions::default()).unwrap();
    install_local_pack(&test.ctx, &v2, &InstallOptions::default()).unwrap();

    let entry = test.ctx.registry.get_pack("p").unwrap().unwrap();
    assert_eq!(entry.installs.len(), 2);
    assert_ne!(entry.installs[0].hash, entry.installs[1].hash);

    let resolver = PackResolver::new(&test.ctx.registry);
    assert_eq!(resolver.resolve("p", None).unwrap().version, "2.0.0");
    assert_eq!(
        resolver.resolve("p", Some("1.0.0")).unwrap().version,
        "1.0.0"
    );

    let err = resolver.resolve("p", Some("9.9.9")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::VersionNotFound);
    let hint = err.hint().unwrap();
    assert!(hint.contains("1.0.0") && hint.contains("2.0.0"));
}

#[test]
fn scoped_pack_id_is_sanitized_on_disk() {
    let test = TestContext::new();
    let pack = PackBuilder::minimal(&test.pack_dir("scoped"), "@org/x", "1.0.0").build();

    let outcome = install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap();
    assert!(outcome.dest_dir.as_str().contains("@org__x"));
    assert!(outcome.dest_dir.is_dir());
}

#[test]
fn incompatible_pack_is_rejected() {
    let cases = [
        "    minVersion: 1.0.0\n",
        "    maxVersion: 0.4.0\n",
        "    incompatible: [0.5.0]\n",
    ];
    for compat in cases {
        let test = TestContext::new().with_engine_version("0.5.0");
        let manifest = format!(
            "pack:\n  name: p\n  version: 1.0.0\n  engineCompatibility:\n{compat}archetypes:\n  - id: a\n    templateRoot: t\n",
        );
        let pack = PackBuilder::new(&test.pack_dir("p"), &manifest)
            .file("t/x.txt", "hi")
            .build();

        let err = install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PackIncompatible, "{compat}");
        for key in ["packId", "packVersion", "engineVersion", "constraints"] {
            assert!(err.details().contains_key(key), "missing {key} for {compat}");
        }
        if compat.contains("minVersion") {
            let hint = err.hint().unwrap();
            assert!(hint.contains("1.0.0") && hint.contains("0.5.0"));
        }
        // Nothing was installed or registered.
        assert!(test.ctx.registry.get_pack("p").unwrap().is_none());
    }
}

#[test]
fn missing_source_and_non_directory_are_typed() {
    let test = TestContext::new();
    let missing = test.pack_dir("x").join("nope");
    let err = install_local_pack(&test.ctx, &missing, &InstallOptions::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::PackPathNotFound);

    let file = test.pack_dir("y").join("file.txt");
    fs_err::write(&file, "not a dir").unwrap();
    let err = install_local_pack(&test.ctx, &file, &InstallOptions::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::PackNotDirectory);
}

#[test]
fn pack_without_manifest_is_manifest_not_found() {
    let test = TestContext::new();
    let dir = test.pack_dir("empty");
    let err = install_local_pack(&test.ctx, &dir, &InstallOptions::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ManifestNotFound);
}

#[test]
fn uninstall_removes_registry_entry_and_cache() {
    let test = TestContext::new();
    let pack = PackBuilder::minimal(&test.pack_dir("p"), "p", "1.0.0").build();
    let outcome = install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap();

    let removed = uninstall_pack(&test.ctx, "p").unwrap().unwrap();
    assert_eq!(removed.id, "p");
    assert!(test.ctx.registry.get_pack("p").unwrap().is_none());
    assert!(test.ctx.cache.get("p", &outcome.hash).is_none());

    // Content-addressed store content stays around.
    assert!(outcome.dest_dir.is_dir());

    assert!(uninstall_pack(&test.ctx, "p").unwrap().is_none());
}

#[test]
fn no_register_installs_content_only() {
    let test = TestContext::new();
    let pack = PackBuilder::minimal(&test.pack_dir("p"), "p", "1.0.0").build();
    let options = InstallOptions {
        update_registry: false,
    };
    let outcome = install_local_pack(&test.ctx, &pack, &options).unwrap();
    assert_eq!(outcome.status, InstallStatus::Installed);
    assert!(outcome.dest_dir.is_dir());
    assert!(test.ctx.registry.get_pack("p").unwrap().is_none());
}

#[test]
fn hash_is_stable_across_key_order_and_line_endings() {
    let test = TestContext::new();
    let manifest_a =
        "pack:\n  name: p\n  version: 1.0.0\narchetypes:\n  - id: a\n    templateRoot: t\n";
    let manifest_b = "archetypes:\n  - templateRoot: t\n    id: a\npack:\n  version: 1.0.0\n  name: p\n"
        .replace('\n', "\r\n");

    let a = PackBuilder::new(&test.pack_dir("a"), manifest_a)
        .file("t/x.txt", "hi")
        .build();
    let b = PackBuilder::new(&test.pack_dir("b"), &manifest_b)
        .file("t/x.txt", "hi")
        .build();

    let first = install_local_pack(&test.ctx, &a, &InstallOptions::default()).unwrap();
    let second = install_local_pack(&test.ctx, &b, &InstallOptions::default()).unwrap();
    assert_eq!(first.hash, second.hash);
    assert_eq!(second.status, InstallStatus::AlreadyInstalled);
}

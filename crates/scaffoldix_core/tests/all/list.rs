use pretty_assertions::assert_eq;
use scaffoldix_core::{
    InstallOptions, PackOrigin, RegisterPackInput, install_local_pack, list_archetypes,
};

use crate::helpers::{PackBuilder, TestContext};

#[test]
fn listing_survives_missing_and_corrupt_packs() {
    let test = TestContext::new();

    // A healthy pack with one archetype.
    let valid_manifest = "
pack:
  name: valid-pack
  version: 1.0.0
archetypes:
  - id: good
    templateRoot: t
";
    let valid = PackBuilder::new(&test.pack_dir("valid"), valid_manifest)
        .file("t/x.txt", "hi")
        .build();
    install_local_pack(&test.ctx, &valid, &InstallOptions::default()).unwrap();

    // Registered, but the store content is gone.
    test.ctx
        .registry
        .register_pack(&RegisterPackInput {
            id: "missing-pack".to_owned(),
            version: "1.0.0".to_owned(),
            origin: PackOrigin::Local {
                path: "/tmp/missing".to_owned(),
            },
            hash: "b".repeat(64),
        })
        .unwrap();

    // Store directory present, manifest gone.
    let corrupt = PackBuilder::minimal(&test.pack_dir("corrupt"), "corrupt-pack", "1.0.0").build();
    let outcome = install_local_pack(&test.ctx, &corrupt, &InstallOptions::default()).unwrap();
    fs_err::remove_file(outcome.dest_dir.join("archetype.yaml")).unwrap();
    // Drop the cached index so the listing has to reload the manifest.
    test.ctx.cache.invalidate("corrupt-pack");

    let listing = list_archetypes(&test.ctx).unwrap();

    let refs: Vec<&str> = listing
        .archetypes
        .iter()
        .map(|a| a.reference.as_str())
        .collect();
    assert_eq!(refs, vec!["valid-pack:good"]);

    assert_eq!(listing.warnings.len(), 2);
    assert!(listing.warnings.iter().any(|w| w.contains("missing-pack")));
    assert!(listing.warnings.iter().any(|w| w.contains("corrupt-pack")));
}

#[test]
fn empty_registry_lists_nothing() {
    let test = TestContext::new();
    let listing = list_archetypes(&test.ctx).unwrap();
    assert!(listing.archetypes.is_empty());
    assert!(listing.warnings.is_empty());
}

#[test]
fn listing_is_served_from_the_index_cache() {
    let test = TestContext::new();
    let pack = PackBuilder::minimal(&test.pack_dir("p"), "p", "1.0.0").build();
    let outcome = install_local_pack(&test.ctx, &pack, &InstallOptions::default()).unwrap();

    // Remove the manifest from the store: with a warm cache the listing
    // still works because it never reloads it.
    fs_err::remove_file(outcome.dest_dir.join("archetype.yaml")).unwrap();

    let listing = list_archetypes(&test.ctx).unwrap();
    assert_eq!(listing.archetypes.len(), 1);
    assert_eq!(listing.archetypes[0].reference, "p:a");
    assert!(listing.warnings.is_empty());
}

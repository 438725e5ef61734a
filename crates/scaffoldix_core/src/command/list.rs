use serde::Serialize;
use tracing::{instrument, warn};

use crate::context::EngineContext;
use crate::error::Result;
use crate::index_cache::{PackIndex, build_index};
use crate::manifest_loader::load_manifest;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchetypeListEntry {
    pub pack_id: String,
    pub pack_version: String,
    pub archetype_id: String,
    pub inputs_count: usize,
    /// Ready-to-use generate reference, `packId:archetypeId`.
    pub reference: String,
}

/// Listing result. Packs that cannot be listed (missing store content,
/// unreadable manifest) become warnings, never errors: one bad pack must
/// not hide the others.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchetypeListing {
    pub archetypes: Vec<ArchetypeListEntry>,
    pub warnings: Vec<String>,
}

#[instrument(skip_all)]
pub fn list_archetypes(ctx: &EngineContext) -> Result<ArchetypeListing> {
    let mut archetypes = Vec::new();
    let mut warnings = Vec::new();

    for entry in ctx.registry.list_packs()? {
        let store_path = ctx.paths.pack_dest_dir(&entry.id, &entry.hash);
        if !store_path.is_dir() {
            let warning = format!(
                "pack {} is registered but its store directory is missing; reinstall it",
                entry.id
            );
            warn!("{warning}");
            warnings.push(warning);
            continue;
        }

        let index = match ctx.cache.get(&entry.id, &entry.hash) {
            Some(index) => index,
            None => match load_manifest(&store_path) {
                Ok(manifest) => {
                    let index = build_index(&entry.id, &manifest, &entry.hash);
                    ctx.cache.set(&index)?;
                    index
                }
                Err(e) => {
                    let warning =
                        format!("pack {} has an unreadable manifest: {e}", entry.id);
                    warn!("{warning}");
                    warnings.push(warning);
                    continue;
                }
            },
        };

        push_entries(&mut archetypes, &index);
    }

    Ok(ArchetypeListing {
        archetypes,
        warnings,
    })
}

fn push_entries(archetypes: &mut Vec<ArchetypeListEntry>, index: &PackIndex) {
    for archetype in &index.archetypes {
        archetypes.push(ArchetypeListEntry {
            pack_id: index.pack_id.clone(),
            pack_version: index.version.clone(),
            archetype_id: archetype.id.clone(),
            inputs_count: archetype.inputs_count,
            reference: format!("{}:{}", index.pack_id, archetype.id),
        });
    }
}

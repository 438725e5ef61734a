use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::render::{FileEntry, FileOperation};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub relative_path: Utf8PathBuf,
    pub absolute_path: Utf8PathBuf,
}

/// Result of comparing a plan against the target tree. `conflicts` holds
/// only the `modify` entries; identical files are noops and absent paths
/// are creates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub has_conflicts: bool,
    pub count: usize,
    pub conflicts: Vec<Conflict>,
    pub target_dir: Utf8PathBuf,
}

/// Classify every planned file against what is on disk, refining each
/// entry's `operation` in place.
pub fn detect_conflicts(plan: &mut [FileEntry], target_dir: &Utf8Path) -> Result<ConflictReport> {
    let mut conflicts = Vec::new();

    for entry in plan.iter_mut() {
        entry.operation = classify(entry)?;
        if entry.operation == FileOperation::Modify {
            conflicts.push(Conflict {
                relative_path: entry.dest_relative_path.clone(),
                absolute_path: entry.absolute_path.clone(),
            });
        }
    }

    debug!(
        "conflict scan of {target_dir}: {} planned, {} conflicts",
        plan.len(),
        conflicts.len()
    );
    Ok(ConflictReport {
        has_conflicts: !conflicts.is_empty(),
        count: conflicts.len(),
        conflicts,
        target_dir: target_dir.to_path_buf(),
    })
}

fn classify(entry: &FileEntry) -> Result<FileOperation> {
    if !entry.absolute_path.exists() {
        return Ok(FileOperation::Create);
    }
    let on_disk = fs_err::read(&entry.absolute_path).map_err(|e| {
        ScaffoldError::new(
            ErrorCode::InternalError,
            format!("cannot read existing file {}", entry.absolute_path),
        )
        .with_source(e)
    })?;
    if on_disk == entry.bytes {
        Ok(FileOperation::Noop)
    } else {
        Ok(FileOperation::Modify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn entry(target: &Utf8Path, relative: &str, bytes: &[u8]) -> FileEntry {
        FileEntry {
            dest_relative_path: Utf8PathBuf::from(relative),
            absolute_path: target.join(relative),
            bytes: bytes.to_vec(),
            mode: None,
            is_binary: false,
            source_template: Utf8PathBuf::from("t"),
            operation: FileOperation::Create,
        }
    }

    #[test]
    fn classes_are_disjoint_and_cover_the_plan() {
        let dir = tempfile::tempdir().unwrap();
        let target = utf8_dir(&dir);
        fs_err::write(target.join("same.txt"), "same").unwrap();
        fs_err::write(target.join("differs.txt"), "old").unwrap();

        let mut plan = vec![
            entry(&target, "absent.txt", b"new"),
            entry(&target, "same.txt", b"same"),
            entry(&target, "differs.txt", b"new"),
        ];
        let report = detect_conflicts(&mut plan, &target).unwrap();

        assert_eq!(plan[0].operation, FileOperation::Create);
        assert_eq!(plan[1].operation, FileOperation::Noop);
        assert_eq!(plan[2].operation, FileOperation::Modify);

        assert!(report.has_conflicts);
        assert_eq!(report.count, 1);
        assert_eq!(
            report.conflicts[0].relative_path,
            Utf8PathBuf::from("differs.txt")
        );
        assert_eq!(report.target_dir, target);
    }

    #[test]
    fn clean_target_has_no_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let target = utf8_dir(&dir);
        let mut plan = vec![entry(&target, "a.txt", b"x")];
        let report = detect_conflicts(&mut plan, &target).unwrap();
        assert!(!report.has_conflicts);
        assert_eq!(report.count, 0);
    }

    #[test]
    fn empty_plan_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = utf8_dir(&dir);
        let report = detect_conflicts(&mut [], &target).unwrap();
        assert!(!report.has_conflicts);
    }
}

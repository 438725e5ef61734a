use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use rand::{Rng as _, distr::Alphanumeric};
use std::path::Path;
use tempfile::TempDir;

/// Random suffix used for sibling temp files and staging directories.
pub fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

pub fn current_directory() -> anyhow::Result<Utf8PathBuf> {
    let current_dir = std::env::current_dir().context("cannot determine current directory")?;
    Utf8PathBuf::from_path_buf(current_dir)
        .map_err(|path| anyhow::anyhow!("current directory is not utf-8: {path:?}"))
}

pub fn canonicalize_utf8(path: &Utf8Path) -> anyhow::Result<Utf8PathBuf> {
    let canonical = dunce::canonicalize(path.as_std_path())
        .with_context(|| format!("cannot canonicalize {path:?}"))?;
    Utf8PathBuf::from_path_buf(canonical)
        .map_err(|path| anyhow::anyhow!("canonical path is not utf-8: {path:?}"))
}

/// Write `bytes` to `path` atomically: write a sibling temp file named
/// `tmp_name`, then rename it over the target. The temp file is removed
/// best-effort on failure.
///
/// On Windows the rename can fail with `PermissionDenied` when the target
/// exists; in that case the target is unlinked and the rename retried once.
pub fn write_atomic(path: &Utf8Path, bytes: &[u8], tmp_name: &str) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path {path:?} has no parent directory"))?;
    let tmp_path = parent.join(tmp_name);

    fs_err::write(&tmp_path, bytes).with_context(|| format!("cannot write {tmp_path:?}"))?;

    if let Err(e) = rename_over(&tmp_path, path) {
        let _ = fs_err::remove_file(&tmp_path);
        return Err(e).with_context(|| format!("cannot rename {tmp_path:?} over {path:?}"));
    }
    Ok(())
}

fn rename_over(from: &Utf8Path, to: &Utf8Path) -> std::io::Result<()> {
    match fs_err::rename(from, to) {
        Err(e) if cfg!(windows) && e.kind() == std::io::ErrorKind::PermissionDenied => {
            fs_err::remove_file(to)?;
            fs_err::rename(from, to)
        }
        other => other,
    }
}

/// Recursively copy `src` into `dst`, skipping any entry whose file name is
/// in `excluded`. Symlinks are re-created rather than followed; entries that
/// are neither files, directories, nor symlinks are skipped.
pub fn copy_dir_filtered(src: &Utf8Path, dst: &Utf8Path, excluded: &[&str]) -> anyhow::Result<()> {
    fs_err::create_dir_all(dst).with_context(|| format!("cannot create {dst:?}"))?;

    let mut dirs = vec![src.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        for entry in fs_err::read_dir(&dir).with_context(|| format!("cannot read dir {dir:?}"))? {
            let entry = entry.with_context(|| format!("cannot read dir entry in {dir:?}"))?;
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|path| anyhow::anyhow!("non-utf8 path in pack: {path:?}"))?;
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("entry without file name in {dir:?}"))?;
            if excluded.contains(&name) {
                continue;
            }

            let rel = path
                .strip_prefix(src)
                .with_context(|| format!("can't find {src:?} prefix in {path:?}"))?;
            let target = dst.join(rel);

            // Symlink check must come first: metadata follows links.
            let file_type = entry
                .file_type()
                .with_context(|| format!("cannot read file type for {path:?}"))?;
            if file_type.is_symlink() {
                let link_target = fs_err::read_link(&path)
                    .with_context(|| format!("cannot read symlink {path:?}"))?;
                create_symlink(&link_target, &target)
                    .with_context(|| format!("cannot re-create symlink at {target:?}"))?;
            } else if file_type.is_dir() {
                fs_err::create_dir_all(&target)
                    .with_context(|| format!("cannot create {target:?}"))?;
                dirs.push(path);
            } else if file_type.is_file() {
                fs_err::copy(&path, &target)
                    .with_context(|| format!("cannot copy {path:?} to {target:?}"))?;
            }
            // Sockets, devices and the like are not part of a pack.
        }
    }
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link_target: &Path, at: &Utf8Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(link_target, at)
}

#[cfg(windows)]
fn create_symlink(link_target: &Path, at: &Utf8Path) -> std::io::Result<()> {
    if link_target.is_dir() {
        std::os::windows::fs::symlink_dir(link_target, at)
    } else {
        std::os::windows::fs::symlink_file(link_target, at)
    }
}

/// Copy a directory into a fresh temp dir, preserving its final component.
pub fn copy_to_temp_dir(src: &Utf8Path) -> anyhow::Result<TempDir> {
    let tmp = tempfile::tempdir().context("cannot create temporary directory")?;
    let tmp_path = Utf8Path::from_path(tmp.path())
        .ok_or_else(|| anyhow::anyhow!("temp dir path is not utf-8"))?;
    let name = src
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("cannot copy root directory {src:?}"))?;
    copy_dir_filtered(src, &tmp_path.join(name), &[])?;
    Ok(tmp)
}

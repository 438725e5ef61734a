//! Thin wrapper around the `git` CLI implementing the pack-fetch contract:
//! clone a repository into a temp directory, optionally check out a ref,
//! and report the resolved commit. All validation of the fetched content
//! happens downstream.

use std::process::Command;

use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A cloned pack. The backing temp directory is removed on drop; call
/// [`FetchedPack::cleanup`] to remove it eagerly and observe failures.
#[derive(Debug)]
pub struct FetchedPack {
    tempdir: Option<TempDir>,
    pack_dir: Utf8PathBuf,
    commit: String,
    git_ref: Option<String>,
}

impl FetchedPack {
    pub fn pack_dir(&self) -> &Utf8Path {
        &self.pack_dir
    }

    /// The commit the clone resolved to.
    pub fn commit(&self) -> &str {
        &self.commit
    }

    /// The ref that was checked out, when one was requested.
    pub fn git_ref(&self) -> Option<&str> {
        self.git_ref.as_deref()
    }

    pub fn cleanup(mut self) -> anyhow::Result<()> {
        if let Some(tempdir) = self.tempdir.take() {
            tempdir.close().context("cannot remove fetched pack dir")?;
        }
        Ok(())
    }
}

pub trait GitFetcher {
    fn fetch(&self, url: &str, reference: Option<&str>) -> anyhow::Result<FetchedPack>;
}

/// Fetches by shelling out to the system `git`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitFetcher for GitCli {
    fn fetch(&self, url: &str, reference: Option<&str>) -> anyhow::Result<FetchedPack> {
        let tempdir = tempfile::tempdir().context("cannot create temp dir for git clone")?;
        let clone_dir = Utf8Path::from_path(tempdir.path())
            .context("temp dir path is not utf-8")?
            .join("pack");

        debug!("cloning {url} into {clone_dir}");
        run_git(None, &["clone", url, clone_dir.as_str()])
            .with_context(|| format!("cannot clone {url}"))?;

        if let Some(reference) = reference {
            run_git(Some(&clone_dir), &["checkout", reference])
                .with_context(|| format!("cannot check out {reference:?} in {url}"))?;
        }

        let commit = run_git(Some(&clone_dir), &["rev-parse", "HEAD"])
            .context("cannot resolve HEAD of the clone")?
            .trim()
            .to_owned();
        debug!("clone of {url} resolved to {commit}");

        Ok(FetchedPack {
            tempdir: Some(tempdir),
            pack_dir: clone_dir,
            commit,
            git_ref: reference.map(str::to_owned),
        })
    }
}

fn run_git(cwd: Option<&Utf8Path>, args: &[&str]) -> anyhow::Result<String> {
    let mut cmd = Command::new("git");
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    let output = cmd
        .args(args)
        .output()
        .with_context(|| format!("cannot run `git {}`", args.join(" ")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!("git {}: {}", args.join(" "), stderr.trim());

    anyhow::ensure!(
        output.status.success(),
        "`git {}` failed: {}",
        args.join(" "),
        stderr.trim()
    );
    Ok(stdout)
}

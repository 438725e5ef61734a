use std::collections::BTreeMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::TimeZone as _;
use scaffoldix_core::{
    EngineContext, FixedClock, GenerateDeps, InputDef, PromptAdapter, Result, ShellRunner,
    StorePaths, TeraEvaluator, user_cancelled,
};
use tempfile::TempDir;

/// A store, a scratch area for packs, and a target directory, all inside
/// one temp root that lives as long as the test.
pub struct TestContext {
    root: TempDir,
    pub ctx: EngineContext,
}

impl TestContext {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let root_path = Utf8PathBuf::from_path_buf(root.path().to_path_buf()).unwrap();
        let paths = StorePaths::new(root_path.join("store")).unwrap();
        let clock = FixedClock(
            chrono::Utc
                .with_ymd_and_hms(2024, 5, 15, 12, 0, 0)
                .unwrap(),
        );
        let ctx = EngineContext::with_clock(paths, Arc::new(clock));
        Self { root, ctx }
    }

    pub fn with_engine_version(mut self, version: &str) -> Self {
        self.ctx = self
            .ctx
            .with_engine_version(semver::Version::parse(version).unwrap());
        self
    }

    fn root_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.root.path().to_path_buf()).unwrap()
    }

    /// A fresh directory for authoring a pack.
    pub fn pack_dir(&self, name: &str) -> Utf8PathBuf {
        let dir = self.root_path().join("packs-src").join(name);
        fs_err::create_dir_all(&dir).unwrap();
        dir
    }

    /// The generation target, created on first use.
    pub fn target_dir(&self) -> Utf8PathBuf {
        let dir = self.root_path().join("target");
        fs_err::create_dir_all(&dir).unwrap();
        dir
    }
}

/// Builds a pack directory: manifest plus template and auxiliary files.
pub struct PackBuilder {
    dir: Utf8PathBuf,
    manifest: String,
}

impl PackBuilder {
    pub fn new(dir: &Utf8Path, manifest: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            manifest: manifest.to_owned(),
        }
    }

    /// The minimal valid pack: one archetype `a` with template root `t`.
    pub fn minimal(dir: &Utf8Path, name: &str, version: &str) -> Self {
        let manifest = format!(
            "pack:\n  name: \"{name}\"\n  version: {version}\narchetypes:\n  - id: a\n    templateRoot: t\n",
        );
        Self::new(dir, &manifest).file("t/x.txt", "hi")
    }

    #[must_use]
    pub fn file(self, relative: &str, content: &str) -> Self {
        let path = self.dir.join(relative);
        fs_err::create_dir_all(path.parent().unwrap()).unwrap();
        fs_err::write(path, content).unwrap();
        self
    }

    pub fn build(self) -> Utf8PathBuf {
        fs_err::write(self.dir.join("archetype.yaml"), &self.manifest).unwrap();
        self.dir
    }
}

/// Prompt that must never be reached; used by non-interactive tests.
pub struct DenyPrompt;

impl PromptAdapter for DenyPrompt {
    fn prompt(&self, _input: &InputDef) -> Result<serde_json::Value> {
        panic!("prompt must not be called in a non-interactive test");
    }
}

/// Prompt that cancels immediately, like a user hitting Ctrl-D.
pub struct CancellingPrompt;

impl PromptAdapter for CancellingPrompt {
    fn prompt(&self, _input: &InputDef) -> Result<serde_json::Value> {
        Err(user_cancelled())
    }
}

pub fn deps(prompt: &dyn PromptAdapter) -> GenerateDeps<'_> {
    GenerateDeps {
        prompt,
        evaluator: &TeraEvaluator,
        hook_runner: &ShellRunner,
        check_runner: &ShellRunner,
    }
}

pub fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), serde_json::Value::String((*v).to_owned())))
        .collect()
}

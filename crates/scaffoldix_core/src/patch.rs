use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::fs_utils;
use crate::manifest::{PatchOp, PatchOpKind};
use crate::tera::TemplateEvaluator;

pub const ALREADY_APPLIED: &str = "already_applied";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchStatus {
    Applied,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResult {
    pub idempotency_key: String,
    pub file: String,
    pub kind: PatchOpKind,
    pub status: PatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchReport {
    pub total: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<PatchResult>,
}

impl PatchReport {
    pub fn failed_results(&self) -> impl Iterator<Item = &PatchResult> {
        self.results
            .iter()
            .filter(|r| r.status == PatchStatus::Failed)
    }
}

/// Applies an ordered list of patch operations to files under a target
/// directory.
///
/// Every operation is idempotent with respect to its key: a second
/// application detects the prior one — by block marker for block kinds, by
/// content presence for anchor and append kinds — and reports
/// `skipped(already_applied)`. Failures never abort the run; the full
/// result list is always computed and the caller decides what a failure
/// means.
pub struct PatchEngine<'a> {
    target_dir: &'a Utf8Path,
    pack_root: &'a Utf8Path,
    data: &'a BTreeMap<String, Value>,
    evaluator: &'a dyn TemplateEvaluator,
}

impl std::fmt::Debug for PatchEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchEngine")
            .field("target_dir", &self.target_dir)
            .field("pack_root", &self.pack_root)
            .finish_non_exhaustive()
    }
}

impl<'a> PatchEngine<'a> {
    pub fn new(
        target_dir: &'a Utf8Path,
        pack_root: &'a Utf8Path,
        data: &'a BTreeMap<String, Value>,
        evaluator: &'a dyn TemplateEvaluator,
    ) -> Self {
        Self {
            target_dir,
            pack_root,
            data,
            evaluator,
        }
    }

    /// Apply the operations strictly in the given order.
    pub fn apply_all(&self, ops: &[PatchOp]) -> Result<PatchReport> {
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            let result = self.apply_one(op)?;
            debug!(
                "patch {} on {}: {:?} {}",
                op.idempotency_key,
                op.file,
                result.status,
                result.reason.as_deref().unwrap_or("")
            );
            results.push(result);
        }

        let count = |status| results.iter().filter(|r| r.status == status).count();
        Ok(PatchReport {
            total: results.len(),
            applied: count(PatchStatus::Applied),
            skipped: count(PatchStatus::Skipped),
            failed: count(PatchStatus::Failed),
            results,
        })
    }

    fn apply_one(&self, op: &PatchOp) -> Result<PatchResult> {
        let target = self.target_file(op)?;

        let outcome = match self.try_apply(op, &target) {
            Ok(outcome) => outcome,
            Err(reason) => Outcome::Failed(reason),
        };
        let (status, reason) = match outcome {
            Outcome::Applied => (PatchStatus::Applied, None),
            Outcome::AlreadyApplied => {
                (PatchStatus::Skipped, Some(ALREADY_APPLIED.to_owned()))
            }
            Outcome::Failed(reason) => (PatchStatus::Failed, Some(reason)),
        };
        Ok(PatchResult {
            idempotency_key: op.idempotency_key.clone(),
            file: op.file.clone(),
            kind: op.kind,
            status,
            reason,
        })
    }

    fn try_apply(&self, op: &PatchOp, target: &Utf8Path) -> std::result::Result<Outcome, String> {
        let original = match fs_err::read(target) {
            Ok(bytes) => String::from_utf8(bytes)
                .map_err(|_| format!("{} is not a text file", op.file))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(format!("target file {} does not exist", op.file));
            }
            Err(e) => return Err(format!("cannot read {}: {e}", op.file)),
        };

        let eol = if original.contains("\r\n") { "\r\n" } else { "\n" };
        let content = self.resolve_content(op)?;
        let content = normalize_eol(&content, eol);

        let patched = match op.kind {
            PatchOpKind::InsertAfterAnchor => insert_after_anchor(op, &original, &content, eol)?,
            PatchOpKind::EnsureBlock => ensure_block(op, &original, &content, eol),
            PatchOpKind::AppendIfMissing => append_if_missing(&original, &content, eol),
            PatchOpKind::DeleteBlock => delete_block(op, &original),
        };

        match patched {
            None => Ok(Outcome::AlreadyApplied),
            Some(updated) => {
                let tmp_name = format!(
                    ".{}-{}.tmp",
                    target.file_name().unwrap_or("patch"),
                    fs_utils::random_suffix()
                );
                fs_utils::write_atomic(target, updated.as_bytes(), &tmp_name)
                    .map_err(|e| format!("cannot write {}: {e:#}", op.file))?;
                Ok(Outcome::Applied)
            }
        }
    }

    /// Inline content, or an auxiliary file from the pack, optionally
    /// rendered through the template evaluator.
    fn resolve_content(&self, op: &PatchOp) -> std::result::Result<String, String> {
        let raw = match (&op.content, &op.from_file) {
            (Some(content), None) => content.clone(),
            (None, Some(from_file)) => {
                let path = self.pack_root.join(from_file);
                fs_err::read_to_string(&path)
                    .map_err(|e| format!("cannot read patch source {from_file}: {e}"))?
            }
            (None, None) => String::new(),
            (Some(_), Some(_)) => {
                return Err("content and fromFile are mutually exclusive".to_owned());
            }
        };
        if op.render {
            self.evaluator
                .render(&raw, self.data)
                .map_err(|e| format!("cannot render patch content: {e}"))
        } else {
            Ok(raw)
        }
    }

    fn target_file(&self, op: &PatchOp) -> Result<Utf8PathBuf> {
        let relative = Utf8Path::new(&op.file);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| c == camino::Utf8Component::ParentDir)
        {
            return Err(ScaffoldError::new(
                ErrorCode::PatchEngineError,
                format!("patch file path {:?} escapes the target directory", op.file),
            )
            .with_detail("file", op.file.as_str())
            .with_detail("idempotencyKey", op.idempotency_key.as_str()));
        }
        Ok(self.target_dir.join(relative))
    }
}

enum Outcome {
    Applied,
    AlreadyApplied,
    Failed(String),
}

pub fn begin_marker(op: &PatchOp) -> String {
    format!("{} scaffoldix:begin:{}", op.marker_leader(), op.idempotency_key)
}

pub fn end_marker(op: &PatchOp) -> String {
    format!("{} scaffoldix:end:{}", op.marker_leader(), op.idempotency_key)
}

/// `None` means already applied.
fn insert_after_anchor(
    op: &PatchOp,
    original: &str,
    content: &str,
    eol: &str,
) -> std::result::Result<Option<String>, String> {
    if original.contains(content.trim_end_matches(eol)) {
        return Ok(None);
    }

    let anchor = op.anchor.as_deref().unwrap_or_default();
    let anchor_at = original
        .find(anchor)
        .ok_or_else(|| format!("anchor {anchor:?} not found in {}", op.file))?;

    // Insert on the line after the anchor's line.
    let insert_at = original[anchor_at..]
        .find('\n')
        .map_or(original.len(), |i| anchor_at + i + 1);

    let mut chunk = content.to_owned();
    if !chunk.ends_with('\n') {
        chunk.push_str(eol);
    }
    let mut updated = String::with_capacity(original.len() + chunk.len());
    updated.push_str(&original[..insert_at]);
    if insert_at == original.len() && !original.ends_with('\n') {
        updated.push_str(eol);
    }
    updated.push_str(&chunk);
    updated.push_str(&original[insert_at..]);
    Ok(Some(updated))
}

fn ensure_block(op: &PatchOp, original: &str, content: &str, eol: &str) -> Option<String> {
    let begin = begin_marker(op);
    let end = end_marker(op);
    let body = content.trim_end_matches(eol);

    if let Some(begin_at) = original.find(&begin) {
        // Block exists: compare bodies, replace when they differ.
        let after_begin = begin_at + begin.len();
        let body_start = original[after_begin..]
            .find('\n')
            .map_or(original.len(), |i| after_begin + i + 1);
        let end_at = original[body_start..]
            .find(&end)
            .map(|i| body_start + i)
            // A begin without an end is treated as a damaged block and rebuilt.
            .unwrap_or(original.len());
        let existing_body = original[body_start..end_at].trim_end_matches(eol);
        if existing_body == body && original[body_start..].contains(&end) {
            return None;
        }
        let mut updated = String::with_capacity(original.len() + body.len());
        updated.push_str(&original[..body_start]);
        updated.push_str(body);
        updated.push_str(eol);
        if end_at < original.len() {
            updated.push_str(&original[end_at..]);
        } else {
            updated.push_str(&end);
            updated.push_str(eol);
        }
        return Some(updated);
    }

    // Block absent: append it at the end of the file.
    let mut updated = original.to_owned();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push_str(eol);
    }
    updated.push_str(&begin);
    updated.push_str(eol);
    updated.push_str(body);
    updated.push_str(eol);
    updated.push_str(&end);
    updated.push_str(eol);
    Some(updated)
}

fn append_if_missing(original: &str, content: &str, eol: &str) -> Option<String> {
    let needle = content.trim_end_matches(eol);
    if original.contains(needle) {
        return None;
    }
    let mut updated = original.to_owned();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push_str(eol);
    }
    updated.push_str(needle);
    updated.push_str(eol);
    Some(updated)
}

fn delete_block(op: &PatchOp, original: &str) -> Option<String> {
    let begin = begin_marker(op);
    let end = end_marker(op);
    let begin_at = original.find(&begin)?;

    let line_start = original[..begin_at].rfind('\n').map_or(0, |i| i + 1);
    let after = original[begin_at..]
        .find(&end)
        .map(|i| begin_at + i + end.len())
        .map_or(original.len(), |i| {
            original[i..].find('\n').map_or(original.len(), |j| i + j + 1)
        });

    let mut updated = String::with_capacity(original.len());
    updated.push_str(&original[..line_start]);
    updated.push_str(&original[after..]);
    Some(updated)
}

fn normalize_eol(content: &str, eol: &str) -> String {
    let unix = content.replace("\r\n", "\n");
    if eol == "\n" {
        unix
    } else {
        unix.replace('\n', eol)
    }
}

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ErrorCode, Result, ScaffoldError};
use crate::tera::TemplateEvaluator;

const BINARY_SAMPLE_LEN: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Create,
    Modify,
    Noop,
}

/// One planned output file. Produced in memory by the renderer; the
/// `operation` starts as `create` and is refined by conflict detection.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub dest_relative_path: Utf8PathBuf,
    pub absolute_path: Utf8PathBuf,
    pub bytes: Vec<u8>,
    /// Unix permission bits of the source template, when available.
    pub mode: Option<u32>,
    pub is_binary: bool,
    pub source_template: Utf8PathBuf,
    pub operation: FileOperation,
}

/// Walk a template tree and produce the in-memory file plan.
///
/// Entries are visited in sorted order within each directory, so the plan
/// order is a deterministic function of the tree. Text files have their
/// contents and path segments expanded; binaries pass through untouched.
pub fn render_plan(
    template_dir: &Utf8Path,
    target_dir: &Utf8Path,
    data: &BTreeMap<String, Value>,
    rename_rules: &BTreeMap<String, String>,
    evaluator: &dyn TemplateEvaluator,
) -> Result<Vec<FileEntry>> {
    let mut plan = Vec::new();

    for entry in WalkDir::new(template_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            ScaffoldError::new(
                ErrorCode::InternalError,
                format!("cannot walk template dir {template_dir}: {e}"),
            )
            .with_source(e)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let source = Utf8Path::from_path(entry.path()).ok_or_else(|| {
            ScaffoldError::new(
                ErrorCode::InternalError,
                format!("non-utf8 path in template dir: {:?}", entry.path()),
            )
        })?;

        let raw_relative = source
            .strip_prefix(template_dir)
            .map_err(|_| ScaffoldError::internal(format!("{source} is outside {template_dir}")))?;
        let relative = render_path(raw_relative, data, rename_rules, evaluator)?;

        let bytes = fs_err::read(source).map_err(|e| {
            ScaffoldError::new(
                ErrorCode::InternalError,
                format!("cannot read template file {source}"),
            )
            .with_source(e)
        })?;
        let is_binary = is_binary(&bytes);

        let rendered = if is_binary {
            bytes
        } else {
            let text = String::from_utf8(bytes).map_err(|e| {
                ScaffoldError::new(
                    ErrorCode::InternalError,
                    format!("template file {source} is not valid UTF-8"),
                )
                .with_source(e)
            })?;
            evaluator
                .render(&text, data)
                .map_err(|e| e.with_detail("template", source.as_str()))?
                .into_bytes()
        };

        plan.push(FileEntry {
            absolute_path: target_dir.join(&relative),
            dest_relative_path: relative,
            bytes: rendered,
            mode: file_mode(entry.metadata().ok().as_ref()),
            is_binary,
            source_template: source.to_path_buf(),
            operation: FileOperation::Create,
        });
    }

    debug!("planned {} files from {template_dir}", plan.len());
    Ok(plan)
}

fn render_path(
    relative: &Utf8Path,
    data: &BTreeMap<String, Value>,
    rename_rules: &BTreeMap<String, String>,
    evaluator: &dyn TemplateEvaluator,
) -> Result<Utf8PathBuf> {
    let mut path = relative.as_str().to_owned();
    for (token, replacement) in rename_rules {
        path = path.replace(token.as_str(), replacement);
    }
    let rendered = evaluator
        .render(&path, data)
        .map_err(|e| e.with_detail("path", relative.as_str()))?;
    Ok(Utf8PathBuf::from(rendered))
}

/// Git-style heuristic: a NUL byte in the leading sample means binary.
fn is_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SAMPLE_LEN)].contains(&0)
}

#[cfg(unix)]
fn file_mode(metadata: Option<&std::fs::Metadata>) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt as _;
    metadata.map(|m| m.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_metadata: Option<&std::fs::Metadata>) -> Option<u32> {
    None
}

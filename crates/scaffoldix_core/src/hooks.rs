use std::collections::BTreeMap;
use std::process::Command;
use std::time::Instant;

use camino::Utf8Path;
use serde::Serialize;
use tracing::debug;

use crate::error::{ErrorCode, Result, ScaffoldError};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub command: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Executes shell command lines in a working directory with an augmented
/// environment. Used for both post-generate hooks and checks; the caller
/// decides what a failure means.
pub trait CommandRunner {
    /// Run the commands in order. When `strict`, execution stops after the
    /// first non-zero exit; the failing outcome is included in the result.
    fn run_all(
        &self,
        commands: &[String],
        cwd: &Utf8Path,
        env: &BTreeMap<String, String>,
        strict: bool,
    ) -> Result<Vec<CommandOutcome>>;
}

/// Default runner: `sh -c` on Unix, `cmd /C` on Windows, captured output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run_all(
        &self,
        commands: &[String],
        cwd: &Utf8Path,
        env: &BTreeMap<String, String>,
        strict: bool,
    ) -> Result<Vec<CommandOutcome>> {
        let mut outcomes = Vec::with_capacity(commands.len());
        for command in commands {
            let outcome = run_shell(command, cwd, env)?;
            let failed = !outcome.success;
            outcomes.push(outcome);
            if failed && strict {
                break;
            }
        }
        Ok(outcomes)
    }
}

fn run_shell(
    command: &str,
    cwd: &Utf8Path,
    env: &BTreeMap<String, String>,
) -> Result<CommandOutcome> {
    debug!("running `{command}` in {cwd}");
    let started = Instant::now();

    let mut cmd = shell_command(command);
    cmd.current_dir(cwd);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let output = cmd.output().map_err(|e| {
        ScaffoldError::new(
            ErrorCode::HookExecutionFailed,
            format!("cannot spawn command `{command}`"),
        )
        .with_detail("command", command)
        .with_source(e)
    })?;

    let outcome = CommandOutcome {
        command: command.to_owned(),
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms: started.elapsed().as_millis() as u64,
    };
    debug!(
        "`{command}` exited with {:?} in {}ms",
        outcome.exit_code, outcome.duration_ms
    );
    Ok(outcome)
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;

    fn cwd(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = ShellRunner
            .run_all(
                &["echo hello".to_owned()],
                &cwd(&dir),
                &BTreeMap::new(),
                true,
            )
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].exit_code, Some(0));
        assert_eq!(outcomes[0].stdout.trim(), "hello");
    }

    #[test]
    fn strict_stops_after_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let commands = vec![
            "exit 3".to_owned(),
            "echo never".to_owned(),
        ];
        let outcomes = ShellRunner
            .run_all(&commands, &cwd(&dir), &BTreeMap::new(), true)
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
        assert_eq!(outcomes[0].exit_code, Some(3));
    }

    #[test]
    fn non_strict_runs_everything() {
        let dir = tempfile::tempdir().unwrap();
        let commands = vec!["exit 1".to_owned(), "echo still".to_owned()];
        let outcomes = ShellRunner
            .run_all(&commands, &cwd(&dir), &BTreeMap::new(), false)
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].stdout.trim(), "still");
    }

    #[test]
    fn env_is_augmented() {
        let dir = tempfile::tempdir().unwrap();
        let env = BTreeMap::from([(
            "SCAFFOLDIX_PACK_ID".to_owned(),
            "@org/x".to_owned(),
        )]);
        let outcomes = ShellRunner
            .run_all(
                &["echo $SCAFFOLDIX_PACK_ID".to_owned()],
                &cwd(&dir),
                &env,
                true,
            )
            .unwrap();
        assert_eq!(outcomes[0].stdout.trim(), "@org/x");
    }

    #[test]
    fn commands_run_in_the_given_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = ShellRunner
            .run_all(&["pwd".to_owned()], &cwd(&dir), &BTreeMap::new(), true)
            .unwrap();
        let reported = outcomes[0].stdout.trim();
        let expected = dunce::canonicalize(dir.path()).unwrap();
        assert_eq!(
            dunce::canonicalize(reported).unwrap(),
            expected
        );
    }
}

//! External process execution with process-to-process streaming.
//!
//! `run(&[a, b, c])` behaves like the shell pipeline `a | b | c`: each
//! non-terminal command's stdout is handed to the next command as its stdin
//! (an OS pipe, never buffered here), and only the last command's output is
//! captured. Every invocation is bounded by a deadline.

use std::ffi::{OsStr, OsString};
use std::fmt::{self, Write as _};
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tlsfabric_core::{FabricError, Result};

/// Specification of one external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<OsString>,
    /// Never rendered; secrets travel here rather than in `args`
    env: Vec<(OsString, OsString)>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Set an environment variable for the process. Values do not appear
    /// in the rendered command line or in errors.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Environment variables set for the process.
    pub fn get_envs(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.env.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .kill_on_drop(true);
        command
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// An upstream process whose stdout feeds the next stage.
struct Upstream {
    command: String,
    child: Child,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

/// Runs external commands, alone or chained.
#[derive(Debug, Clone, Copy)]
pub struct PipelineRunner {
    timeout: Duration,
}

impl PipelineRunner {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `commands` as a pipeline and return the last command's stdout.
    ///
    /// Fails if any command cannot be started, if the last command exits
    /// non-zero, or if the deadline passes. An upstream command that exits
    /// non-zero while the last one succeeds is logged, not reported. When the
    /// last command fails, upstream stderr and exit statuses are appended to
    /// its diagnostics.
    pub async fn run(&self, commands: &[ExternalCommand]) -> Result<Vec<u8>> {
        let Some((last, upstream)) = commands.split_last() else {
            return Err(FabricError::EmptyPipeline);
        };
        let description = describe(commands);
        debug!(pipeline = %description, "running pipeline");

        let mut stages = Vec::with_capacity(upstream.len());
        let mut stdin: Option<Stdio> = None;

        for spec in upstream {
            let mut command = spec.command();
            command
                .stdin(stdin.take().unwrap_or_else(Stdio::null))
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            let mut child = command.spawn().map_err(|source| FabricError::Spawn {
                command: spec.to_string(),
                source,
            })?;
            drop(command);

            let stdout = child.stdout.take().ok_or_else(|| FabricError::Spawn {
                command: spec.to_string(),
                source: std::io::Error::other("stdout was not captured"),
            })?;
            let piped: Stdio = stdout.try_into().map_err(|source| FabricError::Spawn {
                command: spec.to_string(),
                source,
            })?;
            stdin = Some(piped);

            let stderr = child.stderr.take().map(|mut pipe| {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let _ = pipe.read_to_end(&mut buf).await;
                    buf
                })
            });

            stages.push(Upstream {
                command: spec.to_string(),
                child,
                stderr,
            });
        }

        let mut command = last.command();
        command
            .stdin(stdin.unwrap_or_else(Stdio::null))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = command.spawn().map_err(|source| FabricError::Spawn {
            command: last.to_string(),
            source,
        })?;
        drop(command);

        // On timeout the dropped children are killed (kill_on_drop).
        let output = self.wait(child, &description).await?;
        let upstream_exits = self.reap(stages).await;

        if !output.status.success() {
            return Err(FabricError::ProcessFailed {
                command: description,
                status: output.status.to_string(),
                diagnostics: pipeline_diagnostics(&output, &upstream_exits),
            });
        }

        Ok(output.stdout)
    }

    /// Run a single command with stdin closed and capture its output.
    ///
    /// A non-zero exit is an error carrying the captured output.
    pub async fn run_one(&self, spec: &ExternalCommand) -> Result<Output> {
        debug!(command = %spec, "running command");
        let mut command = spec.command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = command.spawn().map_err(|source| FabricError::Spawn {
            command: spec.to_string(),
            source,
        })?;

        let description = spec.to_string();
        let output = self.wait(child, &description).await?;
        if !output.status.success() {
            return Err(FabricError::ProcessFailed {
                command: description,
                status: output.status.to_string(),
                diagnostics: diagnostics(&output),
            });
        }
        Ok(output)
    }

    async fn wait(&self, child: Child, description: &str) -> Result<Output> {
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(FabricError::ProcessFailed {
                command: description.to_string(),
                status: "unknown".to_string(),
                diagnostics: format!("failed to collect output: {e}"),
            }),
            Err(_) => Err(FabricError::Timeout {
                command: description.to_string(),
                after: self.timeout,
            }),
        }
    }

    /// Collect upstream exit statuses and stderr once the last stage is done.
    async fn reap(&self, stages: Vec<Upstream>) -> Vec<UpstreamExit> {
        let mut exits = Vec::with_capacity(stages.len());
        for mut stage in stages {
            let status = match tokio::time::timeout(self.timeout, stage.child.wait()).await {
                Ok(Ok(status)) => Some(status),
                Ok(Err(e)) => {
                    warn!(command = %stage.command, error = %e, "failed to wait on upstream stage");
                    None
                }
                Err(_) => {
                    warn!(command = %stage.command, "upstream stage still running, killing");
                    let _ = stage.child.kill().await;
                    None
                }
            };
            let stderr = match stage.stderr.take() {
                Some(handle) => handle.await.unwrap_or_default(),
                None => Vec::new(),
            };
            let exit = UpstreamExit {
                command: stage.command,
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            };
            if exit.failed() {
                warn!(
                    command = %exit.command,
                    status = %exit.status_text(),
                    stderr = %exit.stderr,
                    "upstream stage exited unsuccessfully"
                );
            }
            exits.push(exit);
        }
        exits
    }
}

/// How an upstream stage ended.
struct UpstreamExit {
    command: String,
    /// `None` if it could not be waited on or had to be killed
    status: Option<ExitStatus>,
    stderr: String,
}

impl UpstreamExit {
    fn failed(&self) -> bool {
        !matches!(self.status, Some(status) if status.success())
    }

    fn status_text(&self) -> String {
        self.status
            .map_or_else(|| String::from("no exit status"), |status| status.to_string())
    }
}

/// Shell-style rendering: `a x | b y`.
fn describe(commands: &[ExternalCommand]) -> String {
    commands
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Captured stderr followed by stdout, trimmed.
pub(crate) fn diagnostics(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    match (stderr.trim(), stdout.trim()) {
        ("", "") => String::from("(no output)"),
        (err, "") => err.to_string(),
        ("", out) => out.to_string(),
        (err, out) => format!("{err}\n{out}"),
    }
}

/// Last stage's output, then each upstream that failed or wrote to stderr,
/// labelled with its command line.
fn pipeline_diagnostics(output: &Output, upstream: &[UpstreamExit]) -> String {
    let mut report = diagnostics(output);
    for exit in upstream {
        if exit.stderr.is_empty() && !exit.failed() {
            continue;
        }
        let _ = write!(report, "\n[{}] {}", exit.command, exit.status_text());
        if !exit.stderr.is_empty() {
            let _ = write!(report, ": {}", exit.stderr);
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tlsfabric_core::ErrorKind;

    fn sh(script: &str) -> ExternalCommand {
        ExternalCommand::new("sh").args(["-c", script])
    }

    fn runner() -> PipelineRunner {
        PipelineRunner::new(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_two_stage_pipeline_streams_output() {
        let out = runner()
            .run(&[ExternalCommand::new("echo").arg("hello"), ExternalCommand::new("cat")])
            .await
            .unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[tokio::test]
    async fn test_three_stage_pipeline() {
        let out = runner()
            .run(&[
                sh("printf 'b\\na\\nc\\n'"),
                ExternalCommand::new("sort"),
                ExternalCommand::new("head").args(["-n", "1"]),
            ])
            .await
            .unwrap();
        assert_eq!(out, b"a\n");
    }

    #[tokio::test]
    async fn test_large_output_does_not_deadlock() {
        // Far beyond a pipe buffer; only works if stages really stream.
        let out = runner()
            .run(&[sh("head -c 4000000 /dev/zero"), ExternalCommand::new("wc").arg("-c")])
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out).trim(), "4000000");
    }

    #[tokio::test]
    async fn test_failing_last_stage_is_error() {
        let err = runner()
            .run(&[ExternalCommand::new("echo").arg("hello"), ExternalCommand::new("false")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Process);
        assert!(matches!(err, FabricError::ProcessFailed { .. }));
    }

    #[tokio::test]
    async fn test_failure_carries_diagnostics() {
        let err = runner()
            .run(&[ExternalCommand::new("true"), sh("echo broken >&2; exit 3")])
            .await
            .unwrap_err();
        match err {
            FabricError::ProcessFailed {
                command,
                diagnostics,
                status,
            } => {
                assert!(command.contains(" | "));
                assert_eq!(diagnostics, "broken");
                assert!(status.contains('3'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_upstream_failure_alone_is_not_reported() {
        let out = runner()
            .run(&[sh("echo partial; exit 1"), ExternalCommand::new("cat")])
            .await
            .unwrap();
        assert_eq!(out, b"partial\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = runner()
            .run(&[
                ExternalCommand::new("definitely-not-a-real-program-tlsfabric"),
                ExternalCommand::new("cat"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::Spawn { .. }));
        assert_eq!(err.kind(), ErrorKind::Process);
    }

    #[tokio::test]
    async fn test_empty_pipeline() {
        let err = runner().run(&[]).await.unwrap_err();
        assert!(matches!(err, FabricError::EmptyPipeline));
    }

    #[tokio::test]
    async fn test_deadline_is_timeout_error() {
        let runner = PipelineRunner::new(Duration::from_millis(200));
        let err = runner
            .run(&[ExternalCommand::new("sleep").arg("5")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        match err {
            FabricError::Timeout { command, after } => {
                assert_eq!(command, "sleep 5");
                assert_eq!(after, runner.timeout());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_one_captures_output() {
        let output = runner()
            .run_one(&sh("echo out; echo err >&2"))
            .await
            .unwrap();
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(diagnostics(&output), "err\nout");
    }

    #[tokio::test]
    async fn test_env_is_passed_but_not_rendered() {
        let cmd = sh("printf %s \"$SECRET_FOR_TEST\"").env("SECRET_FOR_TEST", "hunter2");
        assert!(!cmd.to_string().contains("hunter2"));
        let out = runner().run(&[cmd]).await.unwrap();
        assert_eq!(out, b"hunter2");
    }

    #[test]
    fn test_display_renders_command_line() {
        let cmd = ExternalCommand::new("cfssl").args(["gencert", "-initca", "/cfg/ca-csr.json"]);
        assert_eq!(cmd.to_string(), "cfssl gencert -initca /cfg/ca-csr.json");
        assert_eq!(
            describe(&[cmd, ExternalCommand::new("cfssljson").args(["-bare", "/certs/ca"])]),
            "cfssl gencert -initca /cfg/ca-csr.json | cfssljson -bare /certs/ca"
        );
    }

    #[tokio::test]
    async fn test_failure_reports_upstream_cause() {
        let err = runner()
            .run(&[
                sh("echo bad ca path >&2; exit 1"),
                sh("cat >/dev/null; echo unexpected end of JSON input >&2; exit 1"),
            ])
            .await
            .unwrap_err();

        let diagnostics = err.diagnostics().unwrap();
        assert!(diagnostics.starts_with("unexpected end of JSON input"));
        assert!(diagnostics.contains("[sh -c echo bad ca path >&2; exit 1] exit status: 1: bad ca path"));
    }

    #[tokio::test]
    async fn test_quiet_successful_upstream_is_not_reported() {
        let err = runner()
            .run(&[ExternalCommand::new("echo").arg("{}"), sh("cat >/dev/null; exit 2")])
            .await
            .unwrap_err();
        assert_eq!(err.diagnostics(), Some("(no output)"));
    }
}

//! Process runner
//!
//! Runs one spec through the external test runner as a child process and
//! turns whatever happens into a [`TaskResult`]. Nothing the child prints
//! reaches the console; stdout and stderr are merged into a single buffer in
//! the order chunks arrive.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::{Error, Result};
use crate::discovery::TaskSpec;
use crate::pool::TaskExecutor;
use crate::report::{FailureReason, Outcome, TaskResult};

/// Size of a single read from a child stream
const CHUNK_SIZE: usize = 8 * 1024;

/// How long streams may stay open after the runner exited, e.g. held by a
/// server the spec left running in the background
const STREAM_GRACE: Duration = Duration::from_millis(500);

/// How the external test runner is invoked
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Runner executable
    pub program: PathBuf,
    /// Arguments placed before the spec path
    pub args: Vec<String>,
    /// Maximum runtime of one spec, also passed as `--timeout=<ms>`
    pub timeout: Duration,
    /// Pass `-b` so the runner stops at the first failing assertion
    pub bail: bool,
    /// Child is killed once its buffered output grows past this
    pub max_output_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("./node_modules/mocha/bin/mocha"),
            args: Vec::new(),
            timeout: Duration::from_secs(20),
            bail: true,
            max_output_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Resolve the runner executable
///
/// Bare command names are looked up on PATH. Anything with a directory part
/// is used as given and only fails later, per spec, if it cannot be started.
pub fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.is_absolute() || program.components().count() > 1 {
        return Ok(program.to_path_buf());
    }
    which::which(program).map_err(|_| Error::RunnerNotFound(program.display().to_string()))
}

/// Runs specs as child processes of the configured test runner
pub struct ProcessRunner {
    config: RunnerConfig,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Arguments following the program: extra args, spec path, flags
    fn arguments(&self, spec: &TaskSpec) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push(spec.path.display().to_string());
        args.push(format!("--timeout={}", self.config.timeout.as_millis()));
        if self.config.bail {
            args.push("-b".to_string());
        }
        args
    }

    async fn run_process(&self, spec: &TaskSpec) -> (Vec<u8>, Outcome) {
        let args = self.arguments(spec);
        tracing::debug!(
            spec = %spec.name,
            program = %self.config.program.display(),
            ?args,
            "Spawning runner"
        );

        let mut command = Command::new(&self.config.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so helpers the runner starts die with it
        #[cfg(unix)]
        command.process_group(0);

        let spawned = command.spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(spec = %spec.name, error = %e, "Failed to start runner");
                let message = format!(
                    "Failed to start {}: {}",
                    self.config.program.display(),
                    e
                );
                return (message.into_bytes(), Outcome::failure(None, FailureReason::Spawn));
            }
        };

        let mut group = ProcessGroup::new(&child);

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<Vec<u8>>(64);
        if let Some(stdout) = child.stdout.take() {
            group.pumps.push(tokio::spawn(pump(stdout, chunk_tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            group.pumps.push(tokio::spawn(pump(stderr, chunk_tx.clone())));
        }
        drop(chunk_tx);

        let max = self.config.max_output_bytes;
        let mut buffer = Vec::new();
        let mut streams_open = true;
        let mut exit: Option<ExitStatus> = None;

        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);

        while streams_open || exit.is_none() {
            tokio::select! {
                chunk = chunk_rx.recv(), if streams_open => match chunk {
                    Some(bytes) => {
                        if !append_bounded(&mut buffer, &bytes, max) {
                            tracing::warn!(spec = %spec.name, limit = max, "Output limit exceeded, killing runner");
                            kill(&mut child, &spec.name).await;
                            return (buffer, Outcome::failure(None, FailureReason::OutputLimit));
                        }
                    }
                    None => streams_open = false,
                },
                status = child.wait(), if exit.is_none() => match status {
                    Ok(status) => {
                        exit = Some(status);
                        let grace = tokio::time::Instant::now() + STREAM_GRACE;
                        if grace < deadline.deadline() {
                            deadline.as_mut().reset(grace);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(spec = %spec.name, error = %e, "Failed to wait for runner");
                        buffer.extend_from_slice(format!("\nFailed to wait for runner: {}\n", e).as_bytes());
                        kill(&mut child, &spec.name).await;
                        return (buffer, Outcome::failure(None, FailureReason::Crash));
                    }
                },
                _ = &mut deadline => {
                    if exit.is_some() {
                        tracing::debug!(spec = %spec.name, "Runner exited but its streams are still open");
                    } else {
                        tracing::warn!(spec = %spec.name, timeout = ?self.config.timeout, "Spec timed out, killing runner");
                        kill(&mut child, &spec.name).await;
                    }
                    let mut overflow = false;
                    while let Ok(bytes) = chunk_rx.try_recv() {
                        if !append_bounded(&mut buffer, &bytes, max) {
                            overflow = true;
                            break;
                        }
                    }
                    if exit.is_none() {
                        return (buffer, Outcome::failure(None, FailureReason::Timeout));
                    }
                    if overflow {
                        tracing::warn!(spec = %spec.name, limit = max, "Output limit exceeded after runner exit");
                        return (buffer, Outcome::failure(None, FailureReason::OutputLimit));
                    }
                    break;
                }
            }
        }

        match exit {
            Some(status) => (buffer, classify(status, &spec.name)),
            None => (buffer, Outcome::failure(None, FailureReason::Crash)),
        }
    }
}

#[async_trait]
impl TaskExecutor for ProcessRunner {
    async fn execute(&self, spec: &TaskSpec) -> TaskResult {
        let started = Instant::now();
        let (output, outcome) = self.run_process(spec).await;
        TaskResult::new(
            &spec.name,
            String::from_utf8_lossy(&output).into_owned(),
            outcome,
            started.elapsed(),
        )
    }
}

/// Forward chunks from a child stream until EOF
async fn pump<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Append up to `max` total bytes; false if anything was cut off
fn append_bounded(buffer: &mut Vec<u8>, bytes: &[u8], max: usize) -> bool {
    let room = max.saturating_sub(buffer.len());
    if bytes.len() > room {
        buffer.extend_from_slice(&bytes[..room]);
        return false;
    }
    buffer.extend_from_slice(bytes);
    true
}

async fn kill(child: &mut Child, name: &str) {
    if let Err(e) = child.kill().await {
        tracing::debug!(spec = %name, error = %e, "Kill failed, runner probably already exited");
    }
}

/// Everything a runner process leaves behind
///
/// Dropping it kills the runner's process group and stops the stream
/// readers, whichever way `run_process` returns.
struct ProcessGroup {
    #[cfg(unix)]
    pgid: Option<libc::pid_t>,
    pumps: Vec<JoinHandle<()>>,
}

impl ProcessGroup {
    #[cfg_attr(not(unix), allow(unused_variables))]
    fn new(child: &Child) -> Self {
        Self {
            #[cfg(unix)]
            pgid: child.id().map(|pid| pid as libc::pid_t),
            pumps: Vec::new(),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            // ESRCH just means the whole group is already gone
            let _ = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        }
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

/// Map an exit status to an outcome
fn classify(status: ExitStatus, name: &str) -> Outcome {
    if status.success() {
        tracing::debug!(spec = %name, "Runner exited successfully");
        return Outcome::Success;
    }

    match status.code() {
        Some(code) => {
            tracing::debug!(spec = %name, code, "Runner exited with failure");
            Outcome::failure(Some(code), FailureReason::Assertion)
        }
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                tracing::debug!(spec = %name, signal = ?status.signal(), "Runner terminated by signal");
            }
            Outcome::failure(None, FailureReason::Crash)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_follow_runner_convention() {
        let runner = ProcessRunner::new(RunnerConfig {
            args: vec!["--require".to_string(), "helper.js".to_string()],
            ..RunnerConfig::default()
        });
        let spec = TaskSpec::new("spec.a.js", "/tests/spec.a.js");

        assert_eq!(
            runner.arguments(&spec),
            ["--require", "helper.js", "/tests/spec.a.js", "--timeout=20000", "-b"]
        );
    }

    #[test]
    fn test_arguments_without_bail() {
        let runner = ProcessRunner::new(RunnerConfig {
            bail: false,
            timeout: Duration::from_millis(1500),
            ..RunnerConfig::default()
        });
        let spec = TaskSpec::new("spec.a.js", "spec.a.js");

        assert_eq!(runner.arguments(&spec), ["spec.a.js", "--timeout=1500"]);
    }

    #[test]
    fn test_append_bounded_truncates_at_limit() {
        let mut buffer = b"abc".to_vec();
        assert!(append_bounded(&mut buffer, b"de", 5));
        assert!(!append_bounded(&mut buffer, b"f", 5));
        assert_eq!(buffer, b"abcde");
    }

    #[test]
    fn test_resolve_program_keeps_paths() {
        let path = Path::new("./node_modules/mocha/bin/mocha");
        assert_eq!(resolve_program(path).unwrap(), path);
    }

    #[test]
    fn test_resolve_program_unknown_command() {
        let err = resolve_program(Path::new("definitely-not-a-real-runner-xyz")).unwrap_err();
        assert!(matches!(err, Error::RunnerNotFound(_)));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::fs;

        fn sh_runner(timeout: Duration) -> ProcessRunner {
            ProcessRunner::new(RunnerConfig {
                program: PathBuf::from("sh"),
                args: Vec::new(),
                timeout,
                bail: true,
                max_output_bytes: 1024 * 1024,
            })
        }

        fn script(dir: &Path, name: &str, body: &str) -> TaskSpec {
            let path = dir.join(name);
            fs::write(&path, body).unwrap();
            TaskSpec::new(name, path)
        }

        #[tokio::test]
        async fn test_success_captures_both_streams() {
            let dir = tempfile::tempdir().unwrap();
            let spec = script(dir.path(), "spec.ok.js", "echo out\necho err >&2\necho \"$@\"\n");

            let result = sh_runner(Duration::from_secs(10)).execute(&spec).await;

            assert!(result.success());
            assert!(result.output.contains("out"));
            assert!(result.output.contains("err"));
            assert!(result.output.contains("--timeout=10000 -b"));
        }

        #[tokio::test]
        async fn test_streams_merged_in_arrival_order() {
            let dir = tempfile::tempdir().unwrap();
            let spec = script(
                dir.path(),
                "spec.order.js",
                "echo first-out\nsleep 0.2\necho second-err >&2\nsleep 0.2\necho third-out\n",
            );

            let result = sh_runner(Duration::from_secs(10)).execute(&spec).await;

            assert!(result.success());
            let first = result.output.find("first-out").unwrap();
            let second = result.output.find("second-err").unwrap();
            let third = result.output.find("third-out").unwrap();
            assert!(first < second && second < third, "out of order: {:?}", result.output);
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_assertion_failure() {
            let dir = tempfile::tempdir().unwrap();
            let spec = script(dir.path(), "spec.bad.js", "echo 'expected 1 to equal 2'\nexit 3\n");

            let result = sh_runner(Duration::from_secs(10)).execute(&spec).await;

            assert_eq!(result.outcome, Outcome::failure(Some(3), FailureReason::Assertion));
            assert!(result.output.contains("expected 1 to equal 2"));
        }

        #[tokio::test]
        async fn test_timeout_keeps_partial_output() {
            let dir = tempfile::tempdir().unwrap();
            let spec = script(dir.path(), "spec.slow.js", "echo partial\nexec sleep 10\n");

            let result = sh_runner(Duration::from_millis(500)).execute(&spec).await;

            assert!(matches!(
                result.outcome,
                Outcome::Failure { reason: FailureReason::Timeout, .. }
            ));
            assert!(result.output.contains("partial"));
            assert!(result.duration < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn test_background_child_holding_streams_does_not_block() {
            let dir = tempfile::tempdir().unwrap();
            let spec = script(dir.path(), "spec.server.js", "sleep 5 &\necho done\nexit 0\n");

            let result = sh_runner(Duration::from_secs(10)).execute(&spec).await;

            assert!(result.success());
            assert!(result.output.contains("done"));
            assert!(result.duration < Duration::from_secs(4));
        }

        #[tokio::test]
        async fn test_signal_is_crash() {
            let dir = tempfile::tempdir().unwrap();
            let spec = script(dir.path(), "spec.crash.js", "kill -9 $$\n");

            let result = sh_runner(Duration::from_secs(10)).execute(&spec).await;

            assert_eq!(result.outcome, Outcome::failure(None, FailureReason::Crash));
        }

        #[tokio::test]
        async fn test_output_limit_kills_runner() {
            let dir = tempfile::tempdir().unwrap();
            let spec = script(dir.path(), "spec.noisy.js", "exec yes\n");
            let runner = ProcessRunner::new(RunnerConfig {
                max_output_bytes: 4096,
                ..sh_runner(Duration::from_secs(10)).config
            });

            let result = runner.execute(&spec).await;

            assert_eq!(result.outcome, Outcome::failure(None, FailureReason::OutputLimit));
            assert_eq!(result.output.len(), 4096);
        }

        #[tokio::test]
        async fn test_output_limit_after_runner_exit() {
            let dir = tempfile::tempdir().unwrap();
            let spec = script(
                dir.path(),
                "spec.chatty.js",
                "(sleep 0.2; exec yes) &\necho done\nexit 0\n",
            );
            let runner = ProcessRunner::new(RunnerConfig {
                max_output_bytes: 4096,
                ..sh_runner(Duration::from_secs(10)).config
            });

            let result = runner.execute(&spec).await;

            assert_eq!(result.outcome, Outcome::failure(None, FailureReason::OutputLimit));
            assert_eq!(result.output.len(), 4096);
            assert!(result.duration < Duration::from_secs(5));
        }

        /// True once `pid` has exited (gone or a zombie awaiting its reaper)
        #[cfg(target_os = "linux")]
        async fn wait_until_gone(pid: i32) -> bool {
            for _ in 0..40 {
                match fs::read_to_string(format!("/proc/{}/stat", pid)) {
                    Err(_) => return true,
                    Ok(stat) => {
                        let state = stat.rsplit(')').next().unwrap_or("").trim_start();
                        if state.starts_with('Z') || state.starts_with('X') {
                            return true;
                        }
                    }
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            false
        }

        #[cfg(target_os = "linux")]
        #[tokio::test]
        async fn test_timeout_kills_helper_processes() {
            let dir = tempfile::tempdir().unwrap();
            let pid_file = dir.path().join("helper.pid");
            let body = format!(
                "echo partial\nsleep 7.4321 &\necho $! > '{}'\nwait\necho after\n",
                pid_file.display()
            );
            let spec = script(dir.path(), "spec.helper.js", &body);

            let result = sh_runner(Duration::from_millis(500)).execute(&spec).await;

            assert_eq!(result.outcome, Outcome::failure(None, FailureReason::Timeout));
            assert!(result.output.contains("partial"));
            assert!(!result.output.contains("after"));

            let pid: i32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
            assert!(wait_until_gone(pid).await, "helper {} outlived its spec", pid);
        }

        #[tokio::test]
        async fn test_missing_program_is_spawn_failure() {
            let spec = TaskSpec::new("spec.a.js", "spec.a.js");
            let runner = ProcessRunner::new(RunnerConfig {
                program: PathBuf::from("./no/such/runner"),
                ..RunnerConfig::default()
            });

            let result = runner.execute(&spec).await;

            assert_eq!(result.outcome, Outcome::failure(None, FailureReason::Spawn));
            assert!(result.output.contains("./no/such/runner"));
        }
    }
}

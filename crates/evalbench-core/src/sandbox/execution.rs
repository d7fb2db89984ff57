//! Process-isolated execution of candidate functions.
//!
//! Every call gets a fresh interpreter process in its own process group,
//! running inside a throwaway scratch directory with an empty environment.
//! The wall-clock budget is enforced from the outside: on expiry the whole
//! process group is killed and reaped before `Timeout` is returned.
//!
//! The driver answers on a private duplicate of stdout, prefixing its one
//! result line with a per-call nonce. Output the candidate writes to fd 1
//! lands in stderr, and any reply that is missing, repeated or carries the
//! wrong nonce is rejected.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::error::{SandboxError, SandboxResult};
use super::outcome::{Execution, ExecutionOutcome};
use crate::domain::FunctionPrototype;
use crate::metrics::METRICS;

const DRIVER_SOURCE: &str = include_str!("driver.py");
const DRIVER_FILE: &str = "driver.py";
const SENTINEL: &str = "@@evalbench-result@@";
const SCRATCH_PREFIX: &str = "evalbench-";
const REPLY_CAP: usize = 16 * 1024 * 1024;
const STDERR_CAP: usize = 64 * 1024;

/// Configuration for sandboxed execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter executable.
    pub python: String,
    /// Optional command prefix, e.g. `["bwrap", "--ro-bind", "/", "/", "--"]`.
    pub launcher: Vec<String>,
    /// Address-space limit for the candidate process (MiB, 0 = unlimited).
    pub memory_limit_mb: u64,
    /// CPU-seconds backstop (0 = unlimited). The wall-clock budget is the
    /// primary limit.
    pub cpu_limit_secs: u64,
    pub max_stdout_chars: usize,
    pub max_trace_chars: usize,
    /// Minimum sample length when calibrating timing loops (milliseconds).
    pub min_sample_ms: u64,
    /// Upper bound on calls per timing sample.
    pub max_timing_loops: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            launcher: Vec::new(),
            memory_limit_mb: 1024,
            cpu_limit_secs: 60,
            max_stdout_chars: 8 * 1024,
            max_trace_chars: 4 * 1024,
            min_sample_ms: 20,
            max_timing_loops: 1024,
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> SandboxResult<()> {
        if self.python.trim().is_empty() {
            return Err(SandboxError::InvalidConfig(
                "python interpreter must not be empty".into(),
            ));
        }
        if self.launcher.iter().any(|part| part.is_empty()) {
            return Err(SandboxError::InvalidConfig(
                "launcher entries must not be empty".into(),
            ));
        }
        if self.max_timing_loops == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_timing_loops must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Extra measurements taken after the first successful call.
#[derive(Debug, Clone, Copy, Default)]
struct Measure {
    repetitions: u32,
    memory: bool,
}

#[derive(Serialize)]
struct DriverRequest<'a> {
    /// Per-call token that prefixes the genuine result line.
    nonce: &'a str,
    function_name: &'a str,
    source: &'a str,
    args: &'a [Value],
    repetitions: u32,
    measure_memory: bool,
    min_sample_ns: u64,
    max_loops: u64,
    memory_limit_bytes: u64,
    cpu_limit_secs: u64,
    max_stdout_chars: usize,
}

#[derive(Deserialize)]
struct DriverReply {
    #[serde(flatten)]
    outcome: DriverOutcome,
    #[serde(default)]
    stdout: String,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum DriverOutcome {
    Success {
        value: Value,
        #[serde(default)]
        timings_ns: Vec<u64>,
        #[serde(default)]
        peak_memory_bytes: Option<u64>,
    },
    RuntimeFailure {
        message: String,
        #[serde(default)]
        trace: String,
    },
    SyntaxFailure {
        message: String,
    },
}

/// Runs one function call of untrusted candidate source at a time.
///
/// A `Sandbox` holds no per-call state and can be shared across tasks.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Call `prototype.function_name` from `source` with `args`.
    ///
    /// Never fails: every fault, including faults of the sandbox machinery,
    /// is reported as an [`ExecutionOutcome`].
    pub async fn execute(
        &self,
        source: &str,
        prototype: &FunctionPrototype,
        args: &[Value],
        budget: Duration,
    ) -> Execution {
        self.run(source, prototype, args, budget, Measure::default())
            .await
    }

    /// Like [`execute`](Self::execute), additionally measuring the per-call
    /// duration `repetitions` times after the first successful call.
    ///
    /// `budget` bounds a single call; the wall-clock limit for the whole
    /// process grows with the number of repetitions.
    pub async fn execute_timed(
        &self,
        source: &str,
        prototype: &FunctionPrototype,
        args: &[Value],
        budget: Duration,
        repetitions: u32,
    ) -> Execution {
        let measure = Measure {
            repetitions,
            memory: false,
        };
        self.run(source, prototype, args, budget, measure).await
    }

    /// Like [`execute`](Self::execute), additionally recording the peak
    /// traced allocation of one more call on fresh arguments.
    pub async fn execute_profiled(
        &self,
        source: &str,
        prototype: &FunctionPrototype,
        args: &[Value],
        budget: Duration,
    ) -> Execution {
        let measure = Measure {
            repetitions: 0,
            memory: true,
        };
        self.run(source, prototype, args, budget, measure).await
    }

    /// Check the configured interpreter starts, returning its version line.
    pub async fn interpreter_version(&self) -> SandboxResult<String> {
        let output = self
            .base_command()
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SandboxError::Spawn {
                program: self.program().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(SandboxError::NoReply {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let mut version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            version = String::from_utf8_lossy(&output.stderr).trim().to_string();
        }
        Ok(version)
    }

    #[instrument(
        skip_all,
        fields(
            function = %prototype.function_name,
            repetitions = measure.repetitions,
            memory = measure.memory,
        )
    )]
    async fn run(
        &self,
        source: &str,
        prototype: &FunctionPrototype,
        args: &[Value],
        budget: Duration,
        measure: Measure,
    ) -> Execution {
        METRICS.inc_executions();

        if args.len() != prototype.parameters.len() {
            let execution = Execution::from_outcome(ExecutionOutcome::RuntimeFailure {
                message: format!(
                    "TypeError: {}() takes {} positional argument(s) but {} were given",
                    prototype.function_name,
                    prototype.parameters.len(),
                    args.len()
                ),
                trace: String::new(),
            });
            METRICS.record_outcome(&execution.outcome);
            return execution;
        }

        let nonce = Uuid::new_v4().simple().to_string();
        let request = DriverRequest {
            nonce: &nonce,
            function_name: &prototype.function_name,
            source,
            args,
            repetitions: measure.repetitions,
            measure_memory: measure.memory,
            min_sample_ns: self.config.min_sample_ms.saturating_mul(1_000_000),
            max_loops: self.config.max_timing_loops.max(1),
            memory_limit_bytes: self.config.memory_limit_mb.saturating_mul(1024 * 1024),
            cpu_limit_secs: self.config.cpu_limit_secs,
            max_stdout_chars: self.config.max_stdout_chars,
        };

        let execution = match self
            .launch(&request, self.wall_budget(budget, measure))
            .await
        {
            Ok(execution) => execution,
            Err(err) => {
                METRICS.inc_launch_faults();
                warn!(
                    event = "sandbox.launch_fault",
                    function = %prototype.function_name,
                    error = %err,
                );
                Execution::from_outcome(ExecutionOutcome::RuntimeFailure {
                    message: format!("sandbox error: {err}"),
                    trace: String::new(),
                })
            }
        };

        METRICS.record_outcome(&execution.outcome);
        execution
    }

    fn wall_budget(&self, budget: Duration, measure: Measure) -> Duration {
        let mut total = budget;
        if measure.memory {
            total += budget;
        }
        if measure.repetitions > 0 {
            let per_repetition = budget + Duration::from_millis(self.config.min_sample_ms) * 4;
            total += per_repetition * measure.repetitions;
        }
        total
    }

    fn program(&self) -> &str {
        self.config
            .launcher
            .first()
            .map(String::as_str)
            .unwrap_or(&self.config.python)
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(self.program());
        if let Some((_, rest)) = self.config.launcher.split_first() {
            command.args(rest).arg(&self.config.python);
        }
        command
    }

    async fn launch(
        &self,
        request: &DriverRequest<'_>,
        budget: Duration,
    ) -> SandboxResult<Execution> {
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(SandboxError::Scratch)?;
        let driver: PathBuf = scratch.path().join(DRIVER_FILE);
        tokio::fs::write(&driver, DRIVER_SOURCE)
            .await
            .map_err(SandboxError::Scratch)?;
        let payload = serde_json::to_vec(request)?;

        let mut command = self.base_command();
        command
            .args(["-I", "-S", "-B"])
            .arg(&driver)
            .current_dir(scratch.path())
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| SandboxError::Spawn {
            program: self.program().to_string(),
            source,
        })?;
        let pid = child.id();
        let started = Instant::now();

        let stdin = child.stdin.take();
        let writer = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                // The driver may die before draining its input.
                let _ = stdin.write_all(&payload).await;
                let _ = stdin.shutdown().await;
            }
        });
        let out_reader = tokio::spawn(read_capped(child.stdout.take(), REPLY_CAP));
        let err_reader = tokio::spawn(read_capped(child.stderr.take(), STDERR_CAP));

        let waited = tokio::time::timeout(budget, child.wait()).await;
        let status = match waited {
            Ok(status) => status?,
            Err(_) => {
                terminate(&mut child, pid).await;
                writer.abort();
                out_reader.abort();
                err_reader.abort();
                let elapsed = started.elapsed();
                debug!(
                    event = "sandbox.timeout",
                    budget_ms = budget.as_millis() as u64,
                    elapsed_ms = elapsed.as_millis() as u64,
                );
                return Ok(Execution::from_outcome(ExecutionOutcome::Timeout { elapsed }));
            }
        };

        // Reclaim anything the candidate left behind in its process group.
        kill_group(pid);
        let _ = writer.await;
        let stdout = out_reader.await.unwrap_or_default();
        let stderr = err_reader.await.unwrap_or_default();

        self.interpret(&stdout, request.nonce, status, &stderr)
    }

    /// Decode the driver's reply. Exactly one result line must be present and
    /// it must carry this call's nonce.
    fn interpret(
        &self,
        raw: &[u8],
        nonce: &str,
        status: ExitStatus,
        stderr: &[u8],
    ) -> SandboxResult<Execution> {
        let text = String::from_utf8_lossy(raw);
        let Some(line) = reply_line(&text, nonce)? else {
            let stderr = scrub_paths(&String::from_utf8_lossy(stderr));
            return Err(SandboxError::NoReply {
                status: status.to_string(),
                stderr: tail(stderr.trim(), 512),
            });
        };

        let reply: DriverReply = serde_json::from_str(line)?;
        let max_trace = self.config.max_trace_chars;
        let mut peak_memory = None;
        let (outcome, timings) = match reply.outcome {
            DriverOutcome::Success {
                value,
                timings_ns,
                peak_memory_bytes,
            } => {
                peak_memory = peak_memory_bytes;
                (
                    ExecutionOutcome::Success { value },
                    timings_ns.into_iter().map(Duration::from_nanos).collect(),
                )
            }
            DriverOutcome::RuntimeFailure { message, trace } => (
                ExecutionOutcome::RuntimeFailure {
                    message: truncate_chars(scrub_paths(&message), max_trace),
                    trace: truncate_chars(scrub_paths(&trace), max_trace),
                },
                Vec::new(),
            ),
            DriverOutcome::SyntaxFailure { message } => (
                ExecutionOutcome::SyntaxFailure {
                    message: truncate_chars(scrub_paths(&message), max_trace),
                },
                Vec::new(),
            ),
        };

        Ok(Execution {
            outcome,
            stdout: truncate_chars(reply.stdout, self.config.max_stdout_chars),
            timings,
            peak_memory,
        })
    }
}

/// The single line prefixed with the sentinel and `nonce`, without its prefix.
fn reply_line<'t>(text: &'t str, nonce: &str) -> SandboxResult<Option<&'t str>> {
    let mut claimed = text.lines().filter_map(|l| l.strip_prefix(SENTINEL));
    match (claimed.next(), claimed.next()) {
        (None, _) => Ok(None),
        (Some(line), None) => line
            .strip_prefix(nonce)
            .map(Some)
            .ok_or(SandboxError::ForeignReply),
        (Some(_), Some(_)) => Err(SandboxError::AmbiguousReply {
            count: 2 + claimed.count(),
        }),
    }
}

async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> Vec<u8> {
    let mut kept = Vec::new();
    let Some(mut reader) = reader else {
        return kept;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    kept
}

async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    if let Err(err) = child.kill().await {
        debug!(event = "sandbox.kill_failed", error = %err);
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
        // ESRCH just means the group is already gone.
        let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

fn scratch_path_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[^\s"']*[/\\]evalbench-[A-Za-z0-9]+(?:[/\\][^\s"',]*)?"#)
            .expect("static regex")
    })
}

/// Replace scratch-directory paths with a stable placeholder.
pub(crate) fn scrub_paths(text: &str) -> String {
    scratch_path_pattern()
        .replace_all(text, "<sandbox>")
        .into_owned()
}

/// Keep at most `max` characters, marking the cut.
pub(crate) fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max) {
        text.truncate(idx);
        text.push_str("... [truncated]");
    }
    text
}

fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sandbox_config_default() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.python, "python3");
        assert!(cfg.launcher.is_empty());
        assert_eq!(cfg.memory_limit_mb, 1024);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sandbox_config_rejects_empty_python() {
        let cfg = SandboxConfig {
            python: " ".into(),
            ..SandboxConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(SandboxError::InvalidConfig(_))));
    }

    #[test]
    fn test_sandbox_config_partial_toml() {
        let cfg: SandboxConfig = toml::from_str("python = \"python3.11\"").unwrap();
        assert_eq!(cfg.python, "python3.11");
        assert_eq!(cfg.max_timing_loops, 1024);
    }

    #[test]
    fn test_scrub_paths() {
        let trace = r#"File "/tmp/evalbench-a1B2c3/driver.py", line 4, in run"#;
        assert_eq!(scrub_paths(trace), r#"File "<sandbox>", line 4, in run"#);
        assert_eq!(scrub_paths("no paths here"), "no paths here");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello".into(), 10), "hello");
        assert_eq!(truncate_chars("héllo wörld".into(), 5), "héllo... [truncated]");
    }

    const NONCE: &str = "0f3c9a";

    #[test]
    fn test_wall_budget_grows_with_measurements() {
        let sandbox = Sandbox::default();
        let budget = Duration::from_millis(100);
        assert_eq!(sandbox.wall_budget(budget, Measure::default()), budget);
        let timed = Measure {
            repetitions: 2,
            memory: false,
        };
        assert_eq!(
            sandbox.wall_budget(budget, timed),
            Duration::from_millis(100 + 2 * (100 + 80))
        );
        let profiled = Measure {
            repetitions: 0,
            memory: true,
        };
        assert_eq!(sandbox.wall_budget(budget, profiled), budget * 2);
    }

    #[test]
    fn test_interpret_success_reply() {
        let sandbox = Sandbox::default();
        let raw = format!(
            "noise\n{SENTINEL}{NONCE}{}\n",
            json!({
                "status": "success",
                "value": [1, 2],
                "timings_ns": [1500, 2500],
                "peak_memory_bytes": 4096,
                "stdout": "hi\n"
            })
        );
        let status = exit_status_ok();
        let execution = sandbox
            .interpret(raw.as_bytes(), NONCE, status, b"")
            .unwrap();
        assert_eq!(
            execution.outcome,
            ExecutionOutcome::Success { value: json!([1, 2]) }
        );
        assert_eq!(execution.stdout, "hi\n");
        assert_eq!(
            execution.timings,
            vec![Duration::from_nanos(1500), Duration::from_nanos(2500)]
        );
        assert_eq!(execution.peak_memory, Some(4096));
    }

    #[test]
    fn test_reply_without_nonce_is_rejected() {
        let sandbox = Sandbox::default();
        let raw = format!(
            "{SENTINEL}{}\n",
            json!({"status": "success", "value": 42, "timings_ns": [1, 1, 1]})
        );
        let err = sandbox
            .interpret(raw.as_bytes(), NONCE, exit_status_ok(), b"")
            .unwrap_err();
        assert!(matches!(err, SandboxError::ForeignReply));
    }

    #[test]
    fn test_second_result_line_is_rejected() {
        let sandbox = Sandbox::default();
        let line = json!({"status": "success", "value": 3});
        let raw = format!("{SENTINEL}{NONCE}{line}\n{SENTINEL}{NONCE}{line}\n{SENTINEL}x\n");
        let err = sandbox
            .interpret(raw.as_bytes(), NONCE, exit_status_ok(), b"")
            .unwrap_err();
        assert!(matches!(err, SandboxError::AmbiguousReply { count: 3 }));
    }

    #[test]
    fn test_interpret_missing_reply_is_error() {
        let sandbox = Sandbox::default();
        let err = sandbox
            .interpret(b"", NONCE, exit_status_ok(), b"Killed")
            .unwrap_err();
        assert!(matches!(err, SandboxError::NoReply { .. }));
    }

    #[tokio::test]
    async fn test_argument_count_mismatch_is_runtime_failure() {
        let sandbox = Sandbox::default();
        let proto = FunctionPrototype::new("add")
            .with_parameter("a", "int")
            .with_parameter("b", "int");
        let execution = sandbox
            .execute("def add(a, b): return a + b", &proto, &[json!(1)], Duration::from_secs(1))
            .await;
        match execution.outcome {
            ExecutionOutcome::RuntimeFailure { message, .. } => {
                assert!(message.contains("takes 2 positional argument(s) but 1 were given"))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter_degrades_to_runtime_failure() {
        let sandbox = Sandbox::new(SandboxConfig {
            python: "evalbench-no-such-python".into(),
            ..SandboxConfig::default()
        });
        let proto = FunctionPrototype::new("f");
        let execution = sandbox
            .execute("def f(): return 1", &proto, &[], Duration::from_secs(1))
            .await;
        match execution.outcome {
            ExecutionOutcome::RuntimeFailure { message, .. } => {
                assert!(message.starts_with("sandbox error"))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[cfg(unix)]
    fn exit_status_ok() -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(0)
    }

    #[cfg(windows)]
    fn exit_status_ok() -> ExitStatus {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(0)
    }
}

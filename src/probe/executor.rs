use super::classify::classify_output;
use super::ProbeResult;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Round trips requested per probe.
pub const PROBE_COUNT: u32 = 4;

/// Upper bound on a single probe, including process startup.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Program and leading arguments used to probe a host. The target is
/// appended as the final argument; no shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    program: String,
    args: Vec<String>,
}

impl ProbeCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The platform `ping`, limited to [`PROBE_COUNT`] echo requests.
    pub fn system_ping() -> Self {
        let count_flag = if cfg!(windows) { "-n" } else { "-c" };
        Self::new("ping", vec![count_flag.to_string(), PROBE_COUNT.to_string()])
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Default for ProbeCommand {
    fn default() -> Self {
        Self::system_ping()
    }
}

/// Runs probes with a bounded timeout and classifies their output.
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    command: ProbeCommand,
    timeout: Duration,
}

impl ProbeExecutor {
    pub fn new(command: ProbeCommand) -> Self {
        Self {
            command,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &ProbeCommand {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `target` using the configured timeout.
    pub async fn probe(&self, target: &str) -> ProbeResult {
        self.probe_with_timeout(target, self.timeout).await
    }

    /// Probe `target`, giving up after `timeout`. A timed out child is killed
    /// when its future is dropped.
    pub async fn probe_with_timeout(&self, target: &str, timeout: Duration) -> ProbeResult {
        debug!(
            "Probing {} with {} {:?}",
            target, self.command.program, self.command.args
        );

        let started = Instant::now();

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let outcome = tokio::time::timeout(timeout, cmd.output()).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let output = match outcome {
            Err(_) => {
                let cause = format!("Probe timed out after {}ms", timeout.as_millis());
                warn!("Probe error for {}: {}", target, cause);
                return failure(cause, None, duration_ms);
            }
            Ok(Err(e)) => {
                let cause = format!("Failed to run {}: {}", self.command.program, e);
                warn!("Probe error for {}: {}", target, cause);
                return failure(cause, None, duration_ms);
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let cause = format!("Command failed: {} ({})", self.command.program, output.status);
            warn!("Probe error for {}: {}", target, cause);
            return failure(cause, Some(stderr.trim()), duration_ms);
        }

        let combined = if stderr.trim().is_empty() {
            stdout.into_owned()
        } else {
            format!("{}\n{}", stdout, stderr)
        };

        let (success, output) = classify_output(&combined);
        debug!(
            "Probe of {} finished in {}ms (success: {})",
            target, duration_ms, success
        );

        ProbeResult {
            success,
            output,
            error: None,
            duration_ms,
        }
    }
}

impl Default for ProbeExecutor {
    fn default() -> Self {
        Self::new(ProbeCommand::default())
    }
}

fn failure(cause: String, stderr: Option<&str>, duration_ms: u64) -> ProbeResult {
    let output = match stderr {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => cause.clone(),
    };
    ProbeResult {
        success: false,
        output,
        error: Some(cause),
        duration_ms,
    }
}

//! Blocking subprocess runner with abort and timeout support.
//!
//! On Unix each tool runs in its own process group, so a kill reaches
//! helpers a wrapper script started as well as the wrapper itself.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use super::{CapabilityError, CapabilityResult};
use crate::orchestrator::CancelHandle;

/// How often a running tool is checked for exit, abort and timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lines kept in `CapabilityError::Failed` diagnostics.
const DIAGNOSTIC_LINES: usize = 40;

/// How long to wait for output pipes to close once the tool has exited.
const EXIT_DRAIN: Duration = Duration::from_secs(2);

/// How long to wait for output pipes to close after a kill.
const KILL_DRAIN: Duration = Duration::from_millis(500);

/// All lines read from one output pipe, sent once the pipe closes.
type Reader = Receiver<Vec<String>>;

/// Captured output of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ToolOutput {
    /// Output lines tagged with `true` for stderr.
    pub fn lines(&self) -> impl Iterator<Item = (&str, bool)> {
        self.stdout
            .iter()
            .map(|l| (l.as_str(), false))
            .chain(self.stderr.iter().map(|l| (l.as_str(), true)))
    }

    /// Last `max` lines, stderr after stdout.
    pub fn tail(&self, max: usize) -> Vec<String> {
        let all: Vec<&str> = self.lines().map(|(l, _)| l).collect();
        let skip = all.len().saturating_sub(max);
        all[skip..].iter().map(|l| l.to_string()).collect()
    }
}

/// Run `program` with `args` and wait for it.
///
/// The process is killed when `cancel` is aborted or `timeout` elapses.
/// A non-zero exit status becomes `CapabilityError::Failed`.
pub fn run_tool(
    program: &str,
    args: &[String],
    cancel: &CancelHandle,
    timeout: Option<Duration>,
) -> CapabilityResult<ToolOutput> {
    let tool = tool_name(program);

    tracing::debug!("Running: {} {}", program, args.join(" "));

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Own group: the terminal's Ctrl-C does not reach the tool, and a kill
    // takes its children with it.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command
        .spawn()
        .map_err(|source| CapabilityError::Launch {
            tool: tool.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                kill(&mut child);
                return Err(CapabilityError::Launch { tool, source });
            }
        }

        if cancel.is_aborted() {
            tracing::warn!("Killing {} (run aborted)", tool);
            kill(&mut child);
            drain(stdout, KILL_DRAIN);
            drain(stderr, KILL_DRAIN);
            return Err(CapabilityError::Killed { tool });
        }

        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                tracing::warn!("Killing {} after {:?}", tool, limit);
                kill(&mut child);
                drain(stdout, KILL_DRAIN);
                drain(stderr, KILL_DRAIN);
                return Err(CapabilityError::TimedOut { tool, after: limit });
            }
        }

        thread::sleep(POLL_INTERVAL);
    };

    let output = ToolOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: drain(stdout, EXIT_DRAIN),
        stderr: drain(stderr, EXIT_DRAIN),
    };

    if !status.success() {
        return Err(CapabilityError::failed(
            tool,
            output.exit_code,
            output.tail(DIAGNOSTIC_LINES),
        ));
    }

    Ok(output)
}

/// Short tool name for messages (`/opt/x/bin/stitcher_demo` -> `stitcher_demo`).
pub(crate) fn tool_name(program: &str) -> String {
    std::path::Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}

fn spawn_reader<R: Read + Send + 'static>(source: R) -> Reader {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let lines = BufReader::new(source)
            .lines()
            .map_while(Result::ok)
            .collect();
        let _ = tx.send(lines);
    });
    rx
}

/// Lines of one pipe, or nothing if it is still open after `wait`.
///
/// A pipe held open by a process outside our group never closes; its
/// reader thread is left behind rather than blocking the run.
fn drain(reader: Option<Reader>, wait: Duration) -> Vec<String> {
    reader
        .and_then(|rx| rx.recv_timeout(wait).ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    #[cfg(unix)]
    kill_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: plain syscall; the group was created for this child at spawn
    // and is still ours since the child has not been reaped yet.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            "Process group {} already gone: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

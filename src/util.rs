use std::io::{BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// How long to wait for a killed child to be reaped.
const KILL_GRACE: Duration = Duration::from_secs(2);
/// Minimum time granted to the pipe readers once the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

#[derive(Debug)]
pub struct CommandRunResult {
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    /// Wall-clock time from spawn until `wait` returned (or until the kill on timeout).
    pub elapsed: Duration,
}

/// Spawn `command` in its own process group and kill the whole group once `timeout` passes.
///
/// The exit time is stamped by a thread blocked in `wait`, so `elapsed` is not tied
/// to any polling interval. Output readers are bounded by the deadline too: a
/// descendant that escaped the group and still holds a pipe cannot stall the caller.
pub fn run_command_with_timeout(
    command: &mut Command,
    timeout: Duration,
) -> Result<CommandRunResult, String> {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let start = Instant::now();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to start command: {}", e))?;
    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "Failed to capture stdout".to_string());
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| "Failed to capture stderr".to_string());
    let (stdout, stderr) = match (stdout, stderr) {
        (Ok(stdout), Ok(stderr)) => (stdout, stderr),
        (Err(e), _) | (_, Err(e)) => {
            kill_process_tree(pid);
            let _ = child.wait();
            return Err(e);
        }
    };
    let stdout_rx = drain(stdout);
    let stderr_rx = drain(stderr);
    let exit_rx = wait_in_background(child, start);

    let (status, elapsed, timed_out) = match exit_rx.recv_timeout(timeout) {
        Ok((Ok(status), elapsed)) => (Some(status), elapsed, false),
        Ok((Err(e), _)) => {
            kill_process_tree(pid);
            return Err(format!("Failed to wait for command: {}", e));
        }
        Err(RecvTimeoutError::Timeout) => {
            kill_process_tree(pid);
            let elapsed = start.elapsed();
            let status = exit_rx
                .recv_timeout(KILL_GRACE)
                .ok()
                .and_then(|(status, _)| status.ok());
            (status, elapsed, true)
        }
        Err(RecvTimeoutError::Disconnected) => {
            kill_process_tree(pid);
            return Err("Command wait thread exited unexpectedly".to_string());
        }
    };

    // Leftover descendants would keep the pipes open.
    #[cfg(unix)]
    kill_process_tree(pid);

    let drain_budget = timeout
        .saturating_sub(start.elapsed())
        .max(DRAIN_GRACE);
    let drain_deadline = Instant::now() + drain_budget;
    let stdout_bytes = collect(&stdout_rx, drain_deadline);
    let stderr_bytes = collect(&stderr_rx, drain_deadline);

    Ok(CommandRunResult {
        status,
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        timed_out,
        elapsed,
    })
}

type WaitResult = (std::io::Result<ExitStatus>, Duration);

fn wait_in_background(mut child: Child, start: Instant) -> Receiver<WaitResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let status = child.wait();
        let elapsed = start.elapsed();
        let _ = tx.send((status, elapsed));
    });
    rx
}

fn drain(pipe: impl Read + Send + 'static) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let mut reader = BufReader::new(pipe);
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

fn collect(rx: &Receiver<Vec<u8>>, deadline: Instant) -> Vec<u8> {
    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
        .unwrap_or_default()
}

/// SIGKILL the process group led by `pid`. A group that is already gone is not an error.
#[cfg(unix)]
fn kill_process_tree(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created by `process_group(0)` at spawn.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(windows)]
fn kill_process_tree(pid: u32) {
    let _ = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(any(unix, windows)))]
fn kill_process_tree(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_unicode_safe() {
        let input = "ééééé";
        assert_eq!(truncate(input, 4), "é...");
    }

    #[test]
    fn test_truncate_small_max() {
        let input = "こんにちは";
        assert_eq!(truncate(input, 3), "こんに");
        assert_eq!(truncate(input, 0), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_captures_output_and_status() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err 1>&2; exit 3"]);
        let result = run_command_with_timeout(&mut cmd, Duration::from_secs(10)).unwrap();
        assert!(!result.timed_out);
        assert_eq!(result.status.and_then(|s| s.code()), Some(3));
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
        assert!(result.elapsed > Duration::ZERO);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_kills_on_timeout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exec sleep 5"]);
        let result = run_command_with_timeout(&mut cmd, Duration::from_millis(200)).unwrap();
        assert!(result.timed_out);
        assert!(result.elapsed < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_elapsed_tracks_exit_not_poll_interval() {
        let run = |secs: &str| {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", &format!("exec sleep {}", secs)]);
            run_command_with_timeout(&mut cmd, Duration::from_secs(10)).unwrap()
        };
        let fast = run("0.05");
        let slow = run("0.08");
        assert!(!fast.timed_out && !slow.timed_out);
        assert!(fast.elapsed >= Duration::from_millis(50));
        assert!(slow.elapsed >= Duration::from_millis(80));
        assert!(fast.elapsed < slow.elapsed);
        assert!(slow.elapsed - fast.elapsed >= Duration::from_millis(15));
    }

    #[cfg(unix)]
    #[test]
    fn test_background_descendant_holding_stdout_does_not_block() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 6 & echo started"]);
        let start = Instant::now();
        let result = run_command_with_timeout(&mut cmd, Duration::from_secs(2)).unwrap();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(!result.timed_out);
        assert_eq!(result.status.and_then(|s| s.code()), Some(0));
        assert_eq!(result.stdout.trim(), "started");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_whole_process_group() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 6 & sleep 6"]);
        let start = Instant::now();
        let result = run_command_with_timeout(&mut cmd, Duration::from_millis(300)).unwrap();
        assert!(result.timed_out);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_run_command_reports_spawn_failure() {
        let mut cmd = Command::new("definitely-not-a-real-binary-xyz");
        let err = run_command_with_timeout(&mut cmd, Duration::from_secs(1)).unwrap_err();
        assert!(err.contains("Failed to start command"));
    }
}

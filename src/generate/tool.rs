//! Running external tools with captured stdout and a timeout.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use super::GenerationError;

/// Upper bound for any single external tool invocation.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(20);

/// Run `command`, returning its stdout if it exits successfully in time.
///
/// On timeout the child is killed. `source` is only used for error messages.
pub fn run_capture(
    command: &mut Command,
    source: &Path,
    timeout: Duration,
) -> Result<Vec<u8>, GenerationError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| GenerationError::failed(source, format!("failed to run {program}: {e}")))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| GenerationError::failed(source, format!("{program} has no stdout")))?;

    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let result = stdout.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    });

    let output = match rx.recv_timeout(timeout) {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GenerationError::io(source, e));
        }
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("{} timed out after {:?}; killing it", program, timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(GenerationError::failed(source, format!("{program} timed out")));
        }
        Err(RecvTimeoutError::Disconnected) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GenerationError::failed(source, format!("{program} reader vanished")));
        }
    };

    let status = child.wait().map_err(|e| GenerationError::io(source, e))?;
    if !status.success() {
        return Err(GenerationError::failed(
            source,
            format!("{program} exited with {status}"),
        ));
    }
    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf hello"]);
        let out = run_capture(&mut cmd, Path::new("x"), Duration::from_secs(5)).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_nonzero_exit_fails() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        let err = run_capture(&mut cmd, Path::new("x"), Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, GenerationError::Failed { .. }));
    }

    #[test]
    fn test_timeout_kills_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let started = std::time::Instant::now();
        let err = run_capture(&mut cmd, Path::new("x"), Duration::from_millis(200)).unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_program_fails() {
        let mut cmd = Command::new("definitely-not-a-real-tool-rustthumb");
        let err = run_capture(&mut cmd, Path::new("x"), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, GenerationError::Failed { .. }));
    }
}

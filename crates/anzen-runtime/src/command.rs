// command.rs — Bounded request/response exchange with an external command.
//
// The collaborator protocol is one JSON document on stdin and one answer on
// stdout. Stdout is drained on a helper thread so the caller can wait on a
// channel with a deadline; when the deadline passes the child is killed and
// reaped. Stderr is passed through to ours.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::error::CollaboratorError;

/// Run `command args..`, feed it `input`, and return its stdout.
pub(crate) fn exchange(
    command: &str,
    args: &[String],
    input: &[u8],
    timeout: Duration,
) -> Result<String, CollaboratorError> {
    let io_err = |source| CollaboratorError::Io {
        command: command.to_string(),
        source,
    };

    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| CollaboratorError::Spawn {
            command: command.to_string(),
            source,
        })?;
    tracing::debug!(command, pid = child.id(), "collaborator launched");

    if let Some(mut stdin) = child.stdin.take() {
        // Dropping stdin at the end of this block closes the pipe.
        if let Err(e) = stdin.write_all(input) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io_err(e));
        }
    }

    let mut stdout = child.stdout.take().ok_or_else(|| {
        io_err(std::io::Error::new(std::io::ErrorKind::Other, "stdout not captured"))
    })?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut out = String::new();
        let result = stdout.read_to_string(&mut out).map(|_| out);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(out)) => {
            let status = child.wait().map_err(io_err)?;
            if !status.success() {
                return Err(CollaboratorError::Failed {
                    command: command.to_string(),
                    status: status.to_string(),
                });
            }
            Ok(out)
        }
        Ok(Err(e)) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(io_err(e))
        }
        Err(_) => {
            tracing::warn!(command, timeout_ms = timeout.as_millis() as u64, "collaborator timed out; killing");
            let _ = child.kill();
            let _ = child.wait();
            Err(CollaboratorError::Timeout {
                command: command.to_string(),
                timeout,
            })
        }
    }
}

//! Process execution on a private tokio runtime

use std::process::Stdio;
use std::time::Duration;

use crate::cancel::Cancellation;
use crate::error::CollaboratorError;

use super::collaborators::{ShellExecutor, ShellOutput, ShellRequest};

const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Runs processes with `tokio::process`, killing them on cancellation.
///
/// Each call drives its own current-thread runtime, so it must not be
/// called from inside an async context.
#[derive(Debug, Clone, Default)]
pub struct TokioShell {
    timeout: Option<Duration>,
}

impl TokioShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill processes that run longer than `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

impl ShellExecutor for TokioShell {
    fn run(&self, request: &ShellRequest, cancel: &Cancellation) -> Result<ShellOutput, CollaboratorError> {
        let cancel = cancel.child(self.timeout);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(run_process(request, &cancel))
    }
}

async fn run_process(request: &ShellRequest, cancel: &Cancellation) -> Result<ShellOutput, CollaboratorError> {
    let mut command = tokio::process::Command::new(&request.program);
    command
        .args(&request.args)
        .envs(&request.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref dir) = request.working_dir {
        command.current_dir(dir);
    }

    tracing::debug!(program = %request.program, args = ?request.args, "Running process");
    let child = command
        .spawn()
        .map_err(|e| format!("failed to start '{}': {e}", request.program))?;

    tokio::select! {
        output = child.wait_with_output() => {
            let output = output?;
            Ok(ShellOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                status: output.status.code().unwrap_or(-1),
            })
        }
        _ = cancelled(cancel) => {
            tracing::warn!(program = %request.program, "Process cancelled");
            Err(format!("'{}' was cancelled", request.program).into())
        }
    }
}

async fn cancelled(cancel: &Cancellation) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(CANCEL_POLL).await;
    }
}

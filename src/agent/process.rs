use super::AgentCommand;
use crate::errors::{AppError, AppResult};
use once_cell::sync::Lazy;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

static ANSI_ESCAPE_RE: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("valid ansi escape regex")
});

const MAX_CAPTURED_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs the command to completion, killing it if `limit` elapses first.
pub async fn run_command(request: &AgentCommand, limit: Option<Duration>) -> AppResult<CommandOutput> {
    let mut command = Command::new(&request.program);
    command
        .args(&request.args)
        .stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &request.env {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            AppError::Agent(format!("agent CLI '{}' not found: {}", request.program, error))
        } else {
            AppError::Agent(format!("failed to spawn agent CLI: {}", error))
        }
    })?;

    if let Some(stdin_payload) = &request.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            stdin
                .write_all(stdin_payload.as_bytes())
                .await
                .map_err(|error| AppError::Io(format!("failed to write stdin: {}", error)))?;
            let _ = stdin.shutdown().await;
        }
    }

    let output = match limit {
        Some(limit) => match timeout(limit, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(program = %request.program, timeout_ms = limit.as_millis() as u64, "agent CLI timed out");
                return Err(AppError::Agent(format!("agent did not answer within {:?}", limit)));
            }
        },
        None => child.wait_with_output().await?,
    };

    Ok(CommandOutput {
        exit_code: output.status.code(),
        stdout: sanitize_output(&String::from_utf8_lossy(&output.stdout)),
        stderr: sanitize_output(&String::from_utf8_lossy(&output.stderr)),
    })
}

/// Strips terminal escapes and keeps only the newest bytes of very long output.
pub fn sanitize_output(raw: &str) -> String {
    let stripped = ANSI_ESCAPE_RE.replace_all(raw, "").replace('\r', "");
    if stripped.len() <= MAX_CAPTURED_BYTES {
        return stripped;
    }
    let mut start = stripped.len() - MAX_CAPTURED_BYTES;
    while !stripped.is_char_boundary(start) {
        start += 1;
    }
    stripped[start..].to_string()
}

//! Thin helpers around `tokio::process::Command` for the external tools.

use std::process::{Output, Stdio};

use tokio::process::Command;

use crate::error::PipelineError;

fn program_name(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().into_owned()
}

/// Run a command to completion with inherited stdio and require success.
pub async fn run_checked(cmd: &mut Command) -> Result<(), PipelineError> {
    let program = program_name(cmd);
    tracing::info!("running cmd: {:?}", cmd.as_std());

    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| PipelineError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !status.success() {
        return Err(PipelineError::ProcessFailed { program, status });
    }
    Ok(())
}

/// Run a command and capture its output without looking at the exit status.
pub async fn capture(cmd: &mut Command) -> Result<Output, PipelineError> {
    let program = program_name(cmd);
    tracing::debug!("capturing cmd: {:?}", cmd.as_std());

    cmd.stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| PipelineError::Spawn { program, source })
}

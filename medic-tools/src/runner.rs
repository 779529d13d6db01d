use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::platform::Platform;
use crate::traits::{CommandRunner, ProcessOutput};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Runs commands through the platform shell (`sh -c` or `cmd /C`).
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        platform: Platform,
        command: &str,
        ctx: &ExecutionContext,
    ) -> Result<ProcessOutput, ToolError> {
        let (shell, flag) = platform.shell();
        let mut cmd = Command::new(shell);
        cmd.arg(flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a timeout can take down grandchildren too
        #[cfg(unix)]
        {
            unsafe {
                cmd.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ToolError::SpawnFailed(e.to_string()))?;
        debug!("Spawned {} [{}]", command, ctx.invocation_id);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = ctx.output_cap_bytes;

        let collect = async {
            let (stdout, stderr) =
                tokio::try_join!(read_capped(stdout, cap), read_capped(stderr, cap))?;
            let status = child.wait().await?;
            Ok::<_, ToolError>(ProcessOutput {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        };

        let outcome = timeout(Duration::from_millis(ctx.timeout_ms), collect).await;
        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                warn!("Aborting {} [{}]: {}", command, ctx.invocation_id, e);
                terminate(&mut child).await;
                Err(e)
            }
            Err(_) => {
                warn!(
                    "Command timed out after {}ms [{}]",
                    ctx.timeout_ms, ctx.invocation_id
                );
                terminate(&mut child).await;
                Err(ToolError::Timeout(ctx.timeout_ms))
            }
        }
    }
}

async fn read_capped<R>(reader: Option<R>, cap: usize) -> Result<Vec<u8>, ToolError>
where
    R: AsyncRead + Unpin,
{
    let mut out = Vec::new();
    let Some(mut reader) = reader else {
        return Ok(out);
    };
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(out);
        }
        if out.len() + n > cap {
            return Err(ToolError::OutputLimitExceeded(cap));
        }
        out.extend_from_slice(&buf[..n]);
    }
}

async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            }
        }
    }
    if let Err(e) = child.kill().await {
        debug!("Kill after abort failed: {}", e);
    }
}

use std::process::Stdio;
use std::sync::Arc;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info};
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::types::DisplayConfig;
use crate::error::PowerError;
use crate::power::constants::{POWER_ACTION_DEADLINE, X_DISPLAY};

/// Performs the OS action that switches the display output.
///
/// Implementations must be idempotent: asking for "on" while the display is already on is
/// harmless. The returned future is spawned, so it must not borrow from `self`.
pub trait DisplayPower: Send + Sync + 'static {
    fn set_display(&self, on: bool) -> BoxFuture<'static, Result<(), PowerError>>;
}

impl<T: DisplayPower + ?Sized> DisplayPower for Arc<T> {
    fn set_display(&self, on: bool) -> BoxFuture<'static, Result<(), PowerError>> {
        (**self).set_display(on)
    }
}

/// Runs `sh -c <command>` against the local X display.
#[derive(Debug, Clone)]
pub struct CommandDisplayPower {
    on_command: String,
    off_command: String,
}

impl CommandDisplayPower {
    pub fn new(config: &DisplayConfig) -> Self {
        CommandDisplayPower {
            on_command: config.on_command.clone(),
            off_command: config.off_command.clone(),
        }
    }
}

async fn run_command(command: String) -> Result<(), PowerError> {
    debug!("Running display command: {}", command);

    let output = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .env("DISPLAY", X_DISPLAY)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(PowerError::CommandFailed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

impl DisplayPower for CommandDisplayPower {
    fn set_display(&self, on: bool) -> BoxFuture<'static, Result<(), PowerError>> {
        let command = if on { self.on_command.clone() } else { self.off_command.clone() };
        run_command(command).boxed()
    }
}

/// Runs a power action, giving up after `POWER_ACTION_DEADLINE`.
pub async fn set_display_with_deadline<P: DisplayPower + ?Sized>(power: &P, on: bool) -> Result<(), PowerError> {
    match timeout(POWER_ACTION_DEADLINE, power.set_display(on)).await {
        Ok(result) => {
            if result.is_ok() {
                info!("Turned display {}", if on { "on" } else { "off" });
            }
            result
        },
        Err(_) => Err(PowerError::Timeout { deadline: POWER_ACTION_DEADLINE }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(on: &str, off: &str) -> CommandDisplayPower {
        CommandDisplayPower::new(&DisplayConfig {
            on_command: on.to_string(),
            off_command: off.to_string(),
            ..DisplayConfig::default()
        })
    }

    #[tokio::test]
    async fn successful_command() {
        let power = commands("true", "true");
        assert!(power.set_display(true).await.is_ok());
        assert!(power.set_display(false).await.is_ok());
    }

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let power = commands("true", "echo detached >&2; exit 3");

        match power.set_display(false).await {
            Err(PowerError::CommandFailed { status, stderr }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "detached");
            },
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn picks_command_by_direction() {
        let power = commands("exit 0", "exit 1");
        assert!(set_display_with_deadline(&power, true).await.is_ok());
        assert!(set_display_with_deadline(&power, false).await.is_err());
    }
}

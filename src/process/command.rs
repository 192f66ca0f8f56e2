//! One-shot external commands

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Program, arguments and extra environment for a child process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Export `vars` to the child, in addition to the inherited environment
    pub fn envs(mut self, vars: &[(String, String)]) -> Self {
        self.env.extend(vars.iter().cloned());
        self
    }

    /// Build a spec from `[program, args...]`
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub(crate) fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    /// stdout followed by stderr
    pub combined: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to execute {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} exited with code {code}: {output}")]
    Failed {
        program: String,
        code: i32,
        output: String,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Trait for running one-shot commands - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion. A non-zero exit is an error carrying the
    /// captured output.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as real subprocesses
#[derive(Debug, Clone, Default)]
pub struct Subprocess {
    /// Kill the child if it runs longer than this
    timeout: Option<Duration>,
}

impl Subprocess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

#[async_trait]
impl CommandRunner for Subprocess {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!("running {}", spec);

        let mut command = spec.command();
        command.kill_on_drop(true);
        let child = command.output();

        let result = match self.timeout {
            Some(limit) => timeout(limit, child).await.map_err(|_| CommandError::Timeout {
                program: spec.program.clone(),
                timeout: limit,
            })?,
            None => child.await,
        };

        let output = result.map_err(|e| CommandError::Spawn {
            program: spec.program.clone(),
            message: e.to_string(),
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", spec.program, code, combined.trim());
            return Err(CommandError::Failed {
                program: spec.program.clone(),
                code,
                output: combined.trim().to_string(),
            });
        }

        debug!("{} returned {} bytes of output", spec.program, combined.len());
        Ok(CommandOutput {
            code: output.status.code(),
            combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_display_and_argv() {
        let spec = CommandSpec::new("confd").args(["-onetime", "-node", "127.0.0.1:4001"]);
        assert_eq!(spec.to_string(), "confd -onetime -node 127.0.0.1:4001");

        let argv = vec!["/home/git/check-repos".to_string()];
        let spec = CommandSpec::from_argv(&argv).unwrap();
        assert_eq!(spec.program, "/home/git/check-repos");
        assert!(spec.args.is_empty());
        assert!(CommandSpec::from_argv(&[]).is_none());
    }

    #[tokio::test]
    async fn test_captures_output_and_env() {
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo $ETCD_PATH; echo oops >&2"])
            .envs(&[("ETCD_PATH".to_string(), "/deis/builder".to_string())]);

        let output = Subprocess::new().run(&spec).await.unwrap();
        assert_eq!(output.code, Some(0));
        assert_eq!(output.combined, "/deis/builder\noops\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let spec = CommandSpec::new("sh").args(["-c", "echo broken; exit 3"]);
        match Subprocess::new().run(&spec).await {
            Err(CommandError::Failed { code, output, .. }) => {
                assert_eq!(code, 3);
                assert_eq!(output, "broken");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let spec = CommandSpec::new("sleep").arg("5");
        let result = Subprocess::with_timeout(Duration::from_millis(50)).run(&spec).await;
        assert!(matches!(result, Err(CommandError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let spec = CommandSpec::new("definitely-not-a-real-binary");
        let result = Subprocess::new().run(&spec).await;
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }
}

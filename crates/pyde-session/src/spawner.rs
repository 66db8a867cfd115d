//! Worker launch.
//!
//! The worker is a persistent interpreter process listening on the worker
//! port. It must be running before the first submission; the session itself
//! never talks to it except through datagrams.

use std::process::Stdio;

use tokio::process::{Child, Command};

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn worker {program:?}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("worker command is empty")]
    EmptyCommand,
}

/// Extension point for different worker launch strategies.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self) -> Result<Child, SpawnError>;
}

/// Runs a program with arguments, inheriting stdio.
///
/// The child is killed when its handle is dropped.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    program: String,
    args: Vec<String>,
}

impl CommandSpawner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// First element is the program, the rest its arguments.
    pub fn from_command_line(command: &[String]) -> Result<Self, SpawnError> {
        let (program, args) = command.split_first().ok_or(SpawnError::EmptyCommand)?;
        Ok(Self::new(program.clone()).with_args(args.iter().cloned()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl WorkerSpawner for CommandSpawner {
    fn spawn(&self) -> Result<Child, SpawnError> {
        tracing::info!(program = %self.program, args = ?self.args, "Spawning worker");
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        tracing::debug!(pid = ?child.id(), "Worker started");
        Ok(child)
    }
}

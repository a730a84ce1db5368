// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Runs the user's script when new mail is detected.

use std::fmt;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use log::{error, info};
use thiserror::Error;

use crate::listener::{Event, EventHandler};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited unsuccessfully: {status}")]
    Failed { program: String, status: ExitStatus },
}

/// Program path plus arguments, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
}

impl Command {
    pub fn new(argv: Vec<String>) -> Result<Self, CommandError> {
        let mut argv = argv.into_iter();
        let program = argv.next().ok_or(CommandError::Empty)?;
        Ok(Self {
            program,
            args: argv.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Executes the configured command once per event.
///
/// The child inherits stdout and stderr, gets no stdin, and is awaited to
/// completion, so a slow script delays the events queued behind it.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    command: Command,
}

impl CommandRunner {
    pub fn new(command: Command) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Runs the command and waits for it to exit. Failures are logged and
    /// returned; they never abort the caller.
    pub async fn execute(&self) -> Result<(), CommandError> {
        let result = self.spawn_and_wait().await;
        if let Err(e) = &result {
            error!("Error executing script: {}", e);
        }
        result
    }

    async fn spawn_and_wait(&self) -> Result<(), CommandError> {
        let status = tokio::process::Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| CommandError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(CommandError::Failed {
                program: self.command.program.clone(),
                status,
            })
        }
    }
}

#[async_trait]
impl EventHandler for CommandRunner {
    async fn handle(&self, _event: Event) {
        info!("New mail detected. Executing script...");
        // Already logged by execute.
        let _ = self.execute().await;
    }
}

//! # Command Script Parser
//!
//! Line-based scripts of host commands for deterministic runs and demos.
//!
//! ## Format
//!
//! One command per line. `#` starts a comment, blank lines are skipped.
//!
//! ```text
//! # Fill a sector, let the media expire, and look again
//! open rda
//! write rda 0 0xAB 1
//! close rda
//! expire rda
//! open rda           # revalidates: store is zeroed
//! read rda 0 1
//! ```

use crate::commands::{HostCommand, HostCommandError, HostCommandParser};
use std::collections::VecDeque;
use thiserror::Error;

/// Command script error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandScriptError {
    #[error("Parse error at line {line}: {source}")]
    ParseError {
        line: usize,
        source: HostCommandError,
    },

    #[error("Empty script")]
    EmptyScript,
}

/// A parsed command together with its source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCommand {
    pub line: usize,
    pub command: HostCommand,
}

/// Command script
#[derive(Debug, Clone, Default)]
pub struct CommandScript {
    commands: VecDeque<ScriptedCommand>,
}

impl CommandScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a script from text
    pub fn from_text(text: &str) -> Result<Self, CommandScriptError> {
        let mut commands = VecDeque::new();

        for (line_num, line) in text.lines().enumerate() {
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let command =
                HostCommandParser::parse(line).map_err(|source| CommandScriptError::ParseError {
                    line: line_num + 1,
                    source,
                })?;
            commands.push_back(ScriptedCommand {
                line: line_num + 1,
                command,
            });
        }

        if commands.is_empty() {
            return Err(CommandScriptError::EmptyScript);
        }

        Ok(Self { commands })
    }

    pub fn push(&mut self, line: usize, command: HostCommand) {
        self.commands.push_back(ScriptedCommand { line, command });
    }

    pub fn next_command(&mut self) -> Option<ScriptedCommand> {
        self.commands.pop_front()
    }

    pub fn has_more(&self) -> bool {
        !self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

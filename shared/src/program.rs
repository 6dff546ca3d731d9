//! Persisted command programs
//!
//! A program is an ordered list of commands stored as a JSON array of
//! `Type`-tagged records.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{Command, CommandError};

/// File name used when no program path is given
pub const DEFAULT_PROGRAM_FILE: &str = "DefaultProgram.json";

/// Errors that can occur while loading or saving a program
#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("Program I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Program JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid command at index {index}: {source}")]
    Invalid {
        index: usize,
        #[source]
        source: CommandError,
    },
}

/// An ordered list of commands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    commands: Vec<Command>,
}

impl Program {
    /// Create an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    /// One label per command, in program order
    pub fn describe_lines(&self) -> Vec<String> {
        self.commands.iter().map(ToString::to_string).collect()
    }

    /// Parse and validate a program from JSON text
    pub fn from_json(json: &str) -> Result<Self, ProgramError> {
        let program: Program = serde_json::from_str(json)?;
        program.validate()?;
        Ok(program)
    }

    /// Render the program as indented JSON
    pub fn to_json(&self) -> Result<String, ProgramError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a program file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProgramError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save the program, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProgramError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Default program location under the user's local data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("plotter-queue").join(DEFAULT_PROGRAM_FILE))
    }

    fn validate(&self) -> Result<(), ProgramError> {
        for (index, command) in self.commands.iter().enumerate() {
            command
                .validate()
                .map_err(|source| ProgramError::Invalid { index, source })?;
        }
        Ok(())
    }
}

impl FromIterator<Command> for Program {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}

//! CLI module for threadctx
//!
//! Command-line access to definition resolution and the propagation demo.

pub mod commands;
pub mod output;

pub use commands::{Commands, ThreadctxCli};
pub use output::OutputFormat;

use crate::error::FailureKind;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Invalid input, arguments or definitions
    InvalidInput = 3,
    /// File not found or inaccessible
    FileError = 4,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<FailureKind> for ExitCode {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::InvalidInput => ExitCode::InvalidInput,
            FailureKind::File => ExitCode::FileError,
            FailureKind::Internal => ExitCode::InternalError,
        }
    }
}

/// Run the CLI with the given arguments and return the exit code
pub fn run(cli: ThreadctxCli) -> anyhow::Result<ExitCode> {
    let config = cli.config;
    match cli.command {
        Commands::Resolve { definition, format } => {
            commands::execute_resolve(config, definition, format)
        }
        Commands::Types { format } => commands::execute_types(format),
        Commands::Demo { definition, format } => {
            commands::execute_demo(config, definition, format)
        }
    }
}

//! threadctx command-line interface
//!
//! Resolves context service definitions against the registered context
//! types (built-ins plus the third-party providers of `threadctx-spi`) and
//! demonstrates a task crossing a thread boundary under a chosen
//! definition.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 3: Invalid input, arguments or definitions
//! - 4: File not found or inaccessible
//! - 10: Internal error

pub mod cli;
pub mod error;

pub use cli::{Commands, ExitCode, OutputFormat, ThreadctxCli};
pub use error::{CliError, FailureKind};

/// Run the CLI application
///
/// This is the main entry point for the CLI binary.
///
/// # Example
///
/// ```rust,no_run
/// use clap::Parser;
/// use threadctx_cli::{run_cli, ThreadctxCli};
///
/// fn main() {
///     let cli = ThreadctxCli::parse();
///     let exit_code = run_cli(cli);
///     std::process::exit(exit_code.into());
/// }
/// ```
pub fn run_cli(cli: ThreadctxCli) -> ExitCode {
    match cli::run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            error::classify(&e).into()
        }
    }
}

/// Log filter implied by the verbosity flags
pub fn log_level(verbose: u8, quiet: bool) -> tracing::Level {
    if quiet {
        return tracing::Level::ERROR;
    }
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

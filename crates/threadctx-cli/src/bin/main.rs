//! threadctx CLI
//!
//! # Usage
//!
//! ```bash
//! # Show how every configured definition resolves
//! threadctx resolve --config services.toml
//!
//! # List registered context types
//! threadctx types --format json
//!
//! # Run a task on a worker thread under app/ContextA
//! threadctx demo --definition app/ContextA
//! ```

use clap::Parser;
use threadctx_cli::{log_level, run_cli, ThreadctxCli};

fn main() {
    // Parse CLI arguments
    let cli = ThreadctxCli::parse();

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level(cli.verbose, cli.quiet).into()),
        )
        .with_target(false)
        .init();

    // Run the CLI and exit with appropriate code
    let exit_code = run_cli(cli);
    std::process::exit(exit_code.into());
}

//! Tollgate gateway server and operator CLI.
//!
//! Binary name: `tollgate`
//!
//! Parses CLI arguments, sets up tracing, then runs the HTTP gateway or
//! one of the operator utilities.

mod cli;
mod http;
mod state;

use clap::Parser;
use tollgate_observe::tracing_setup::{self, TracingOptions};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity; RUST_LOG takes precedence
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,tollgate=debug",
        _ => "trace",
    };
    let tracing_options = TracingOptions::new("tollgate", env!("CARGO_PKG_VERSION"))
        .with_default_filter(filter)
        .with_json(cli.log_json)
        .with_otel(cli.otel);
    tracing_setup::init_tracing(&tracing_options)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = match cli.command {
        Commands::Serve { config, host, port } => cli::serve::serve(&config, host, port).await,
        Commands::IssueToken(args) => cli::token::issue_token(args).await,
        Commands::Encrypt {
            public_key,
            format,
            text,
        } => cli::encrypt::encrypt(&public_key, &format, &text).await,
    };

    tracing_setup::shutdown_tracing();
    result
}

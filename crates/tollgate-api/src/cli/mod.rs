//! CLI command definitions for the `tollgate` binary.
//!
//! Uses clap derive macros for argument parsing. `serve` runs the HTTP
//! gateway; the other commands are operator utilities.

pub mod encrypt;
pub mod serve;
pub mod token;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Authenticated, rate-limited access to upstream LLM providers.
#[derive(Parser)]
#[command(name = "tollgate", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Write logs as JSON lines.
    #[arg(long, env = "TOLLGATE_LOG_JSON", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway.
    Serve {
        /// Path to the gateway config file.
        #[arg(long, env = "TOLLGATE_CONFIG", default_value = "tollgate.toml")]
        config: PathBuf,

        /// Host to bind to. Overrides `listen_addr` from the config file.
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on. Overrides `listen_addr` from the config file.
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Sign an access token for a user and print it.
    #[command(name = "issue-token")]
    IssueToken(token::IssueTokenArgs),

    /// Seal a string with an RSA public key and print the result.
    Encrypt {
        /// PEM file holding the receiver's public key.
        #[arg(long)]
        public_key: PathBuf,

        /// Padding format (v0 = PKCS#1 v1.5, v1 = OAEP-SHA256).
        #[arg(long, default_value = "v1")]
        format: String,

        /// Text to seal.
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::try_parse_from(["tollgate", "-vv", "serve", "--port", "9000", "--log-json"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.log_json);
        match cli.command {
            Commands::Serve { host, port, .. } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(9000));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn issue_token_requires_user() {
        assert!(Cli::try_parse_from(["tollgate", "issue-token", "--login", "octocat"]).is_err());
        let cli = Cli::try_parse_from([
            "tollgate",
            "issue-token",
            "--user-id",
            "7",
            "--login",
            "octocat",
            "--staff",
        ])
        .unwrap();
        match cli.command {
            Commands::IssueToken(args) => {
                assert_eq!(args.user_id, 7);
                assert!(args.staff);
                assert!(!args.subscribed);
            }
            _ => panic!("expected issue-token"),
        }
    }
}

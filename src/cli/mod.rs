//! CLI module for keygate
//!
//! - `serve`: run the HTTP gateway
//! - `bootstrap`: create a workspace, an API and its first root key

pub mod bootstrap;
pub mod serve;

use clap::{Parser, Subcommand};

/// Keygate - API key verification and authorization gateway
#[derive(Debug, Parser)]
#[command(name = "keygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve,

    /// Create a workspace, an API and a root key granted `*`
    Bootstrap(bootstrap::BootstrapArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["keygate", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));
    }

    #[test]
    fn test_parse_bootstrap() {
        let cli = Cli::try_parse_from([
            "keygate",
            "bootstrap",
            "--workspace",
            "acme",
            "--api",
            "payments",
        ])
        .unwrap();

        match cli.command {
            Command::Bootstrap(args) => {
                assert_eq!(args.workspace, "acme");
                assert_eq!(args.api, "payments");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_bootstrap_requires_names() {
        assert!(Cli::try_parse_from(["keygate", "bootstrap", "--workspace", "acme"]).is_err());
    }
}

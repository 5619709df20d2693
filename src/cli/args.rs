use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::constants::DEFAULT_LISTEN_ADDR;

#[derive(Parser, Debug)]
#[command(name = "reportgate")]
#[command(version)]
#[command(about = "Authenticated caching gateway for Cognos reports", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "REPORTGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Serve reports over HTTP (default)
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = DEFAULT_LISTEN_ADDR)]
        listen: String,
    },
    /// Refresh cached reports used within the last SECONDS
    Warm {
        #[arg(value_name = "SECONDS")]
        used_within: u64,
    },
    /// Delete expired cache entries
    Sweep,
    /// Write a configuration template
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Self::Serve {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["reportgate"]).unwrap();
        assert_eq!(cli.command.unwrap_or_default(), Commands::default());
    }

    #[test]
    fn test_warm_takes_seconds() {
        let cli = Cli::try_parse_from(["reportgate", "warm", "3600", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.command, Some(Commands::Warm { used_within: 3600 }));
    }

    #[test]
    fn test_serve_listen_address() {
        let cli = Cli::try_parse_from(["reportgate", "serve", "--listen", "0.0.0.0:9000"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Serve {
                listen: "0.0.0.0:9000".to_string()
            })
        );
    }
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediarelay")]
#[command(
    author,
    version,
    about = "Range-seekable video and comic page relay for cloud-drive media"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Resolve an upstream locator and print its metadata
    Probe {
        /// Provider locator (path or URL)
        #[arg(required = true)]
        locator: String,

        /// Treat the locator as an image folder and list its pages
        #[arg(long)]
        folder: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::parse_from(["mediarelay", "-v", "serve", "--port", "9000"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(9000));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_probe_folder() {
        let cli = Cli::parse_from(["mediarelay", "probe", "comics/vol1", "--folder"]);
        assert!(matches!(
            cli.command,
            Commands::Probe { ref locator, folder: true } if locator == "comics/vol1"
        ));
    }
}

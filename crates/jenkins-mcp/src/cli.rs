use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jenkins-mcp")]
#[command(about = "Jenkins MCP server: cached, retrying and batched access to Jenkins")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (defaults to $JENKINS_MCP_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Serve MCP over stdio (default)
    Serve,

    /// Print the tool definitions as JSON
    Tools,

    /// Load and validate the configuration, then print it
    CheckConfig,

    /// Print a commented default configuration file
    ConfigTemplate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["jenkins-mcp"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "jenkins-mcp",
            "check-config",
            "--config",
            "/tmp/jenkins.toml",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::CheckConfig));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/jenkins.toml")));
    }

    #[test]
    fn test_log_file_flag() {
        let cli =
            Cli::try_parse_from(["jenkins-mcp", "--log-file", "/tmp/mcp.log", "serve"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Serve));
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/mcp.log")));
    }
}

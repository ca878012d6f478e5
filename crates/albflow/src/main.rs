mod commands;
mod project;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "albflow")]
#[command(
    about = "Lambda functions behind an Application Load Balancer, deployed as one CloudFormation stack",
    long_about = None
)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the CloudFormation template without touching AWS
    Template {
        /// Write the template to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Assemble the template and print its resources and routes
    Validate,
    /// Create or update the stack in the caller's account
    Provision {
        /// Submit the stack (without this only the plan is shown)
        #[arg(short, long)]
        yes: bool,
        /// Seconds between stack status checks
        #[arg(
            long,
            env = "ALBFLOW_POLL_INTERVAL",
            default_value_t = project::DEFAULT_POLL_INTERVAL_SECS
        )]
        poll_interval: u64,
    },
    /// Delete the stack from the caller's account
    Delete {
        /// Delete without asking
        #[arg(short, long)]
        yes: bool,
        /// Seconds between stack status checks
        #[arg(
            long,
            env = "ALBFLOW_POLL_INTERVAL",
            default_value_t = project::DEFAULT_POLL_INTERVAL_SECS
        )]
        poll_interval: u64,
    },
    /// Show the deployed stack and the last local deployment record
    Status,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Version => {
            println!("albflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Template { output } => commands::template::handle(output.as_deref()),
        Commands::Validate => commands::validate::handle(),
        Commands::Provision { yes, poll_interval } => {
            commands::provision::handle(yes, poll_interval).await
        }
        Commands::Delete { yes, poll_interval } => {
            commands::delete::handle(yes, poll_interval).await
        }
        Commands::Status => commands::status::handle().await,
    }
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
    fn test_poll_interval_flag_overrides_default() {
        let cli = Cli::try_parse_from(["albflow", "delete", "--poll-interval", "9"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Delete {
                poll_interval: 9,
                ..
            }
        ));
        assert_ne!(project::DEFAULT_POLL_INTERVAL_SECS, 9);
    }
}

//! CLI command definitions and argument parsing

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "stakekeys")]
#[command(about = "Staking module key indexer: sync operators and signing keys, track finality")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: info level)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize database schema and record the configured chain
    Init {
        /// Overwrite app info recorded for a different chain
        #[arg(short, long)]
        force: bool,
    },
    /// Delete all synchronized data and remove the worker lock file
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Worker commands
    #[command(subcommand)]
    Sync(SyncCommands),
    /// Query synchronized modules
    #[command(subcommand)]
    Modules(ModulesCommands),
    /// Show EL meta, CL meta and the too-early verdict
    Meta,
    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run the worker in the foreground until SIGINT/SIGTERM
    Start,
    /// Run one synchronizer tick and one consensus tick
    Once,
    /// Show worker status from the lock file
    Status,
    /// Stop the running worker
    Stop {
        /// Send SIGKILL instead of SIGTERM
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum ModulesCommands {
    /// List modules with their sync state
    List,
    /// List signing keys of a module
    Keys {
        /// Module contract address
        address: String,
        /// Only keys of this operator
        #[arg(long)]
        operator: Option<u32>,
        /// Only deposited keys
        #[arg(long, conflicts_with = "unused")]
        used: bool,
        /// Only keys not yet deposited
        #[arg(long)]
        unused: bool,
        /// Join keys with consensus-layer validator status
        #[arg(long)]
        validators: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List node operators of a module
    Operators {
        /// Module contract address
        address: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys_filters() {
        let cli = Cli::try_parse_from([
            "stakekeys",
            "modules",
            "keys",
            "0x595F64Ddc3856a3b5Ff4f4CC1d1fb4B46cFd2bAC",
            "--operator",
            "3",
            "--unused",
        ])
        .unwrap();
        match cli.command {
            Commands::Modules(ModulesCommands::Keys {
                operator,
                used,
                unused,
                ..
            }) => {
                assert_eq!(operator, Some(3));
                assert!(!used);
                assert!(unused);
            }
            _ => panic!("expected modules keys"),
        }
    }

    #[test]
    fn test_used_and_unused_conflict() {
        assert!(Cli::try_parse_from([
            "stakekeys",
            "modules",
            "keys",
            "0x00",
            "--used",
            "--unused"
        ])
        .is_err());
    }

    #[test]
    fn test_sync_stop_force() {
        let cli = Cli::try_parse_from(["stakekeys", "-v", "sync", "stop", "--force"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Sync(SyncCommands::Stop { force: true })
        ));
    }
}

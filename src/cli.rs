//! Command-line interface for the `tesseract-submitter` binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Submit transactions to an EVM-style ledger and wait for their outcome.
///
/// The signing key is read from the environment variable named by
/// `[wallet].private_key_env` in the configuration file.
#[derive(Parser, Debug)]
#[command(name = "tesseract-submitter", version, propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file (TOML)
    #[arg(
        long,
        short = 'c',
        env = "TESSERACT_SUBMITTER_CONFIG",
        default_value = "config/default.toml"
    )]
    pub config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transfer value to an address and wait for confirmation
    Transfer {
        /// Recipient address (0x + 40 hex)
        to: String,
        /// Amount in whole units, e.g. 0.01
        amount: String,
    },
    /// Call a state-changing Counter method and wait for confirmation
    Invoke {
        /// Counter contract address
        contract: String,
        /// increment, decrement, incrementBy or reset
        method: String,
        /// Argument for incrementBy
        value: Option<String>,
    },
    /// Read the current Counter value
    Count {
        /// Counter contract address
        contract: String,
    },
    /// Deploy a contract; the bundled Counter unless a bytecode file is given
    Deploy {
        /// File containing hex creation bytecode (0x prefix optional)
        #[arg(long)]
        bytecode: Option<PathBuf>,
    },
    /// Show the balance of an address (the signing address when omitted)
    Balance { address: Option<String> },
}

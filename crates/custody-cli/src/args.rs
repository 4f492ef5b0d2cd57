//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use custody_proto::Pubkey;

/// Chain custody command-line client
#[derive(Parser, Debug)]
#[command(name = "custody")]
#[command(about = "Create, transfer, and inspect chain-of-custody records")]
#[command(version)]
pub struct Cli {
    /// Server address
    #[arg(short, long, global = true, env = "CUSTODY_SERVER", default_value = "127.0.0.1:4433")]
    pub server: String,

    /// TLS server name to verify
    #[arg(long, global = true, env = "CUSTODY_SERVER_NAME", default_value = "localhost")]
    pub server_name: String,

    /// Trusted server certificate (PEM), e.g. from `custody-server --write-cert`
    #[arg(long, global = true, env = "CUSTODY_CA")]
    pub ca: Option<PathBuf>,

    /// Keypair file (JSON array of 64 bytes); generated on first use
    #[arg(
        short,
        long,
        global = true,
        env = "CUSTODY_KEYPAIR",
        default_value = "custody-keypair.json"
    )]
    pub keypair: PathBuf,

    /// Program id: 64 hex characters, or a deployment name to derive it from
    #[arg(long, global = true, env = "CUSTODY_PROGRAM_ID", default_value = "chaincustody")]
    pub program_id: String,

    /// Seconds to wait for each reply
    #[arg(long, global = true, env = "CUSTODY_TIMEOUT", default_value = "10")]
    pub timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CUSTODY_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// One subcommand per ledger operation.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a new keypair file and print its public key
    Keygen {
        /// Overwrite an existing keypair file
        #[arg(long)]
        force: bool,
    },

    /// Print the record address of a material id
    Address {
        /// Material identifier
        material_id: String,
    },

    /// Create a record held by this keypair
    Init {
        /// Material identifier
        material_id: String,
    },

    /// Hand custody to another key
    Transfer {
        /// Material identifier
        material_id: String,
        /// New holder's public key (hex)
        new_holder: Pubkey,
        /// Note kept in the custody history
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Quarantine a material held by this keypair
    Quarantine {
        /// Material identifier
        material_id: String,
        /// Why the material is quarantined
        #[arg(long)]
        reason: String,
    },

    /// Show a record's holder and sequence
    Fetch {
        /// Material identifier
        material_id: String,
    },

    /// Show a record's custody history
    History {
        /// Material identifier
        material_id: String,
        /// First sequence to show
        #[arg(long, default_value = "0")]
        from: u64,
        /// Maximum number of entries
        #[arg(long, default_value = "100")]
        limit: u32,
    },

    /// List records in address order
    Materials {
        /// Maximum number of records
        #[arg(long, default_value = "100")]
        limit: u32,
    },

    /// Register this keypair under a role
    RegisterSigner {
        /// Role name
        role: String,
    },

    /// List registered signers in key order
    Signers {
        /// Start after this public key (hex)
        #[arg(long)]
        after: Option<Pubkey>,
        /// Maximum number of entries
        #[arg(long, default_value = "100")]
        limit: u32,
    },
}

impl Command {
    /// Whether the command talks to a server.
    pub fn needs_server(&self) -> bool {
        !matches!(self, Self::Keygen { .. } | Self::Address { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn arguments_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn transfer_parses_hex_holder() {
        let holder = "11".repeat(32);
        let cli =
            Cli::try_parse_from(["custody", "transfer", "MatA123", &holder, "--notes", "dock 4"])
                .unwrap();

        match cli.command {
            Command::Transfer { material_id, new_holder, notes } => {
                assert_eq!(material_id, "MatA123");
                assert_eq!(new_holder, Pubkey::new([0x11; 32]));
                assert_eq!(notes, "dock 4");
            },
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn transfer_rejects_bad_holder() {
        assert!(Cli::try_parse_from(["custody", "transfer", "MatA123", "not-hex"]).is_err());
    }

    #[test]
    fn signers_page_from_cursor() {
        let after = "22".repeat(32);
        let cli =
            Cli::try_parse_from(["custody", "signers", "--after", &after, "--limit", "5"]).unwrap();

        match cli.command {
            Command::Signers { after, limit } => {
                assert_eq!(after, Some(Pubkey::new([0x22; 32])));
                assert_eq!(limit, 5);
            },
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn local_commands_need_no_server() {
        let cli = Cli::try_parse_from(["custody", "address", "MatA123"]).unwrap();
        assert!(!cli.command.needs_server());

        let cli = Cli::try_parse_from(["custody", "fetch", "MatA123"]).unwrap();
        assert!(cli.command.needs_server());
    }
}

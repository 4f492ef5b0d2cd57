//! Chain custody server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with self-signed certificate (development), exporting it for clients
//! custody-server --bind 127.0.0.1:4433 --write-cert server.pem
//!
//! # Start with TLS certificate (production)
//! custody-server --bind 0.0.0.0:4433 --cert cert.pem --key key.pem
//! ```

use std::path::PathBuf;

use clap::Parser;
use custody_core::ProgramConfig;
use custody_crypto::parse_program_id;
use custody_server::{DriverConfig, Server, ServerRuntimeConfig, TlsConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chain custody server
#[derive(Parser, Debug)]
#[command(name = "custody-server")]
#[command(about = "Chain of custody ledger server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, env = "CUSTODY_BIND", default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long, env = "CUSTODY_CERT")]
    cert: Option<PathBuf>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long, env = "CUSTODY_KEY")]
    key: Option<PathBuf>,

    /// Write the server certificate (PEM) here for clients to trust
    #[arg(long, env = "CUSTODY_WRITE_CERT")]
    write_cert: Option<PathBuf>,

    /// Program id: 64 hex characters, or a deployment name to derive it from
    #[arg(long, env = "CUSTODY_PROGRAM_ID", default_value = "chaincustody")]
    program_id: String,

    /// Maximum concurrent connections
    #[arg(long, env = "CUSTODY_MAX_CONNECTIONS", default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CUSTODY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Custody server starting");
    tracing::info!("Binding to {}", args.bind);

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("No TLS certificate provided - using self-signed certificate");
        tracing::warn!("This is NOT suitable for production use!");
    }

    let program_id = parse_program_id(&args.program_id);
    tracing::info!("Program id {}", program_id);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        tls: TlsConfig {
            cert_path: args.cert,
            key_path: args.key,
            write_cert_path: args.write_cert,
        },
        driver: DriverConfig {
            max_connections: args.max_connections,
            program: ProgramConfig { program_id, ..ProgramConfig::default() },
        },
    };

    let server = Server::bind(config)?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}

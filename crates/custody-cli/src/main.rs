//! Chain custody command-line client.
//!
//! # Usage
//!
//! ```bash
//! # Server side: export the self-signed certificate
//! custody-server --bind 127.0.0.1:4433 --write-cert server.pem
//!
//! # Create a record held by ./custody-keypair.json, then hand it on
//! custody --ca server.pem init MatA123
//! custody --ca server.pem transfer MatA123 <new-holder-hex> --notes "dock 4"
//! custody --ca server.pem fetch MatA123
//! custody --ca server.pem history MatA123
//! ```

#![allow(clippy::print_stdout)]

mod args;
mod commands;
mod connection;
mod keyfile;
mod session;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    commands::dispatch(cli).await
}

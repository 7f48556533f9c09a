//! CLI module for the edge gateway
//!
//! Subcommands:
//! - `serve`: run the gateway (default deployment mode)
//! - `generate-key`: mint key material offline, for bootstrap configuration

pub mod generate_key;
pub mod serve;

use clap::{Parser, Subcommand};

/// Edge gateway - authenticated, rate limited, cached reverse proxy
#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway server
    Serve,

    /// Generate an API key and print its prefix and hash
    GenerateKey(generate_key::GenerateKeyArgs),
}

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "ferroftpd", about = "A poll-driven FTP server written in Rust.")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/etc/ferroftpd.toml")]
    pub config: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: Ipv4Addr,

    /// Override the configured control port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

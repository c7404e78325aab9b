use std::io::Write;

use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};

use ferroftpd::config::FtpConfig;
use ferroftpd::core_cli::Cli;
use ferroftpd::server::FtpServer;

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Initialize the logger with a custom format
    let default_level = if args.verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            writeln!(
                buf,
                "[{}] [{}] {}",
                timestamp,
                record.level(),
                record.args()
            )
        })
        .init();

    // Load configuration from the TOML file
    let mut config = FtpConfig::load(&args.config)?;

    // Override the port from the CLI if provided
    if let Some(port) = args.port {
        config.set_listen_port(port);
    }

    // Run the FTP server
    let mut server = FtpServer::bind(config.into_shared(), args.bind)?;
    server.run()
}

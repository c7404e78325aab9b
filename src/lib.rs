//! An FTP server core: RFC 959 and RFC 3659 with optional DEFLATE
//! transmission mode (MODE Z), multiplexing every session over a single
//! non-blocking poll loop.

pub mod config;
pub mod constants;
pub mod core_cli;
pub mod core_codec;
pub mod core_ftpcommand;
pub mod core_network;
pub mod helpers;
pub mod server;
pub mod session;

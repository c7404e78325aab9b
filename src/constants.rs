// src/constants.rs

/// Size of the per-session command buffer.
pub const COMMAND_BUFFERSIZE: usize = 4 * 1024;

/// Size of the per-session response buffer.
pub const RESPONSE_BUFFERSIZE: usize = 4 * 1024;

/// Size of the per-session transfer buffers.
pub const XFER_BUFFERSIZE: usize = 64 * 1024;

/// Socket send/receive buffer size requested for data connections.
pub const SOCK_BUFFERSIZE: usize = 64 * 1024;

/// Seconds without socket progress before a session is force-closed.
pub const IDLE_TIMEOUT: i64 = 60;

/// Poll timeout for one scheduler tick, in milliseconds.
pub const POLL_TIMEOUT_MS: i32 = 100;

/// Upper bound on transfer steps serviced per poll event.
pub const XFER_ITERATIONS: u32 = 10;

/// Listen backlog for the control and PASV sockets.
pub const LISTEN_BACKLOG: i32 = 5;

/// Default control connection port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default deflate level for MODE Z transfers.
pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;

/// Virtual file: infinite zeroes on RETR, a discarding sink on STOR.
pub const DEV_ZERO_PATH: &str = "/devZero";

/// Telnet Data-Mark byte terminating urgent mode.
pub const TELNET_DM: u8 = 0xF2;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, info};

use crate::config::{self, SharedConfig};
use crate::constants::LISTEN_BACKLOG;
use crate::core_network::network;
use crate::core_network::socket::Socket;
use crate::helpers;
use crate::session::Session;

/// Server-wide state shared with every session: uptime, free-space cache,
/// timezone offset and the mDNS hostname hook.
pub struct ServerContext {
    start_time: SystemTime,
    tz_offset: i64,
    free_space: AtomicU64,
}

impl ServerContext {
    pub fn new() -> Self {
        Self {
            start_time: SystemTime::now(),
            tz_offset: i64::from(Local::now().offset().local_minus_utc()),
            free_space: AtomicU64::new(0),
        }
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .elapsed()
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }

    /// Seconds east of UTC for the local timezone.
    pub fn tz_offset(&self) -> i64 {
        self.tz_offset
    }

    pub fn free_space(&self) -> u64 {
        self.free_space.load(Ordering::Relaxed)
    }

    /// Refresh the free-space cache; called after every mutating
    /// filesystem operation.
    pub fn update_free_space(&self) {
        if let Some(space) = helpers::get_free_space(Path::new("/")) {
            self.free_space.store(space, Ordering::Relaxed);
            debug!("Free space: {}", helpers::format_size(space));
        }
    }

    /// Advertisement itself is platform glue; the hook records the intent.
    pub fn set_mdns_hostname(&self, hostname: &str) {
        info!("mDNS hostname set to {}", hostname);
    }
}

impl Default for ServerContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The listening socket plus every live session.
pub struct FtpServer {
    listener: Socket,
    sessions: Vec<Session>,
    config: SharedConfig,
    ctx: Arc<ServerContext>,
}

impl FtpServer {
    /// Bind the control listener on `bind_addr` and the configured port
    /// (0 asks the kernel for an ephemeral port).
    pub fn bind(config: SharedConfig, bind_addr: Ipv4Addr) -> Result<FtpServer> {
        let port = config::lock(&config).port();

        let listener = Socket::create().context("failed to create the listening socket")?;
        listener
            .set_reuse_addr()
            .context("failed to set SO_REUSEADDR")?;
        listener
            .bind(SocketAddrV4::new(bind_addr, port))
            .with_context(|| format!("failed to bind {}:{}", bind_addr, port))?;
        listener
            .listen(LISTEN_BACKLOG)
            .context("failed to listen on the control socket")?;
        listener
            .set_non_blocking()
            .context("failed to make the listener non-blocking")?;

        let ctx = Arc::new(ServerContext::new());
        ctx.update_free_space();

        let addr = listener.local_addr()?;
        info!("Listening on [{}]:{}", addr.ip(), addr.port());
        debug!("Local timezone offset: {}s", ctx.tz_offset());

        Ok(FtpServer {
            listener,
            sessions: Vec::new(),
            config,
            ctx,
        })
    }

    pub fn local_port(&self) -> u16 {
        self.listener.local_addr().map(|addr| addr.port()).unwrap_or(0)
    }

    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// One scheduler tick: poll everything once and dispatch.
    pub fn tick(&mut self) -> Result<()> {
        network::poll_once(&self.listener, &mut self.sessions, &self.config, &self.ctx)
    }

    /// Run until the poll loop fails.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.tick()?;
        }
    }
}

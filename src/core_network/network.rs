//! The scheduler: one poll(2) set multiplexing the listener and every
//! session's control, PASV and data sockets.
//!
//! Each tick drains half-closed sockets, polls with a 100 ms timeout,
//! dispatches events to the owning sessions, accepts new control
//! connections, and force-closes sessions idle past the timeout. No
//! session ever blocks another: transfers run at most `XFER_ITERATIONS`
//! steps per event and yield as soon as a socket would block.

use std::collections::HashSet;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};

use crate::config::SharedConfig;
use crate::constants::{IDLE_TIMEOUT, POLL_TIMEOUT_MS, XFER_ITERATIONS};
use crate::core_network::socket::{self, PollEntry, Socket};
use crate::server::ServerContext;
use crate::session::{Session, State};

#[derive(Debug, Clone, Copy)]
enum PollKind {
    Listener,
    Command,
    Pasv,
    Data,
}

/// Release pending-close sockets once the peer's FIN or RST makes them
/// pollable.
fn drain_pending_close(sessions: &mut [Session]) -> Result<()> {
    let mut entries = Vec::new();
    for session in sessions.iter() {
        for socket in &session.pending_close {
            entries.push(PollEntry::new(socket.as_raw_fd(), libc::POLLIN));
        }
    }

    if entries.is_empty() {
        return Ok(());
    }

    match socket::poll(&mut entries, 0) {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(()),
        Err(err) => {
            error!("poll: {}", err);
            return Err(err.into());
        }
    }

    let done: HashSet<RawFd> = entries
        .iter()
        .filter(|entry| entry.revents != 0)
        .map(|entry| entry.fd)
        .collect();

    if !done.is_empty() {
        for session in sessions.iter_mut() {
            session
                .pending_close
                .retain(|socket| !done.contains(&socket.as_raw_fd()));
        }
    }

    Ok(())
}

/// One scheduler tick.
pub fn poll_once(
    listener: &Socket,
    sessions: &mut Vec<Session>,
    config: &SharedConfig,
    ctx: &Arc<ServerContext>,
) -> Result<()> {
    drain_pending_close(sessions)?;

    // build the poll set
    let mut entries = Vec::new();
    let mut targets = Vec::new();

    entries.push(PollEntry::new(listener.as_raw_fd(), libc::POLLIN));
    targets.push((usize::MAX, PollKind::Listener));

    for (index, session) in sessions.iter().enumerate() {
        if let Some(socket) = &session.command_socket {
            let mut events = libc::POLLIN | libc::POLLPRI;
            if session.response_pending() {
                events |= libc::POLLOUT;
            }
            entries.push(PollEntry::new(socket.as_raw_fd(), events));
            targets.push((index, PollKind::Command));
        }

        match session.state {
            State::Command => {
                // waiting to read a command
            }
            State::DataConnect => {
                if session.pasv {
                    // waiting for the PASV connection
                    if let Some(socket) = &session.pasv_socket {
                        entries.push(PollEntry::new(socket.as_raw_fd(), libc::POLLIN));
                        targets.push((index, PollKind::Pasv));
                    }
                } else if let Some(socket) = &session.data_socket {
                    // waiting for the PORT connect to complete
                    entries.push(PollEntry::new(socket.as_raw_fd(), libc::POLLOUT));
                    targets.push((index, PollKind::Data));
                }
            }
            State::DataTransfer => {
                if let Some(socket) = &session.data_socket {
                    let events = if session.recv {
                        libc::POLLIN
                    } else {
                        debug_assert!(session.send);
                        libc::POLLOUT
                    };
                    entries.push(PollEntry::new(socket.as_raw_fd(), events));
                    targets.push((index, PollKind::Data));
                }
            }
        }
    }

    match socket::poll(&mut entries, POLL_TIMEOUT_MS) {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(()),
        Err(err) => {
            error!("poll: {}", err);
            return Err(err.into());
        }
    }

    let now = Utc::now().timestamp();
    let mut handled = vec![false; sessions.len()];

    for (entry, &(index, kind)) in entries.iter().zip(&targets) {
        if entry.revents == 0 {
            continue;
        }
        let revents = entry.revents;

        match kind {
            PollKind::Listener => {
                // accepted below, after session dispatch
            }
            PollKind::Command => {
                let session = &mut sessions[index];

                // the handler may have swapped this socket out mid-tick
                if session.command_socket.as_ref().map(|s| s.as_raw_fd()) != Some(entry.fd) {
                    continue;
                }
                handled[index] = true;

                if revents & !(libc::POLLIN | libc::POLLPRI | libc::POLLOUT) != 0 {
                    debug!("Command revents {:#x}", revents);
                }

                if session.data_socket.is_none() && revents & libc::POLLOUT != 0 {
                    session.write_response();
                }

                if revents & (libc::POLLIN | libc::POLLPRI) != 0 {
                    session.read_command(revents);
                }

                if revents & (libc::POLLERR | libc::POLLHUP) != 0 {
                    session.close_command();
                }
            }
            PollKind::Pasv | PollKind::Data => {
                let session = &mut sessions[index];

                let current = match kind {
                    PollKind::Pasv => session.pasv_socket.as_ref().map(|s| s.as_raw_fd()),
                    _ => session.data_socket.as_ref().map(|s| s.as_raw_fd()),
                };
                if current != Some(entry.fd) {
                    continue;
                }
                handled[index] = true;

                if revents & !(libc::POLLIN | libc::POLLPRI | libc::POLLOUT) != 0 {
                    debug!("Data revents {:#x}", revents);
                }

                match session.state {
                    State::Command => {
                        // a command handler tore the transfer down mid-tick
                    }
                    State::DataConnect => {
                        if revents & (libc::POLLERR | libc::POLLHUP) != 0 {
                            session.send_response("426 Data connection failed\r\n");
                            session.set_state(State::Command, true, true);
                        } else if revents & libc::POLLIN != 0 {
                            // accept the PASV connection
                            session.data_accept();
                        } else if revents & libc::POLLOUT != 0 {
                            // the PORT connection completed
                            if let Some(peer) = session
                                .data_socket
                                .as_ref()
                                .and_then(|s| s.peer_addr().ok())
                            {
                                info!("Connected to [{}]:{}", peer.ip(), peer.port());
                            }

                            session.send_response("150 Ready\r\n");
                            session.set_state(State::DataTransfer, true, false);
                        }
                    }
                    State::DataTransfer => {
                        if revents & (libc::POLLERR | libc::POLLHUP) != 0 {
                            session.send_response("426 Data connection failed\r\n");
                            session.set_state(State::Command, true, true);
                        } else if revents & (libc::POLLIN | libc::POLLOUT) != 0 {
                            // amortize syscall overhead, but never let one
                            // session monopolize the loop
                            for _ in 0..XFER_ITERATIONS {
                                if !session.step_transfer() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    // accept new control connections
    if entries[0].revents & libc::POLLIN != 0 {
        loop {
            match listener.accept() {
                Ok(socket) => {
                    if let Ok(peer) = socket.peer_addr() {
                        info!("New connection from [{}]:{}", peer.ip(), peer.port());
                    }
                    sessions.push(Session::new(Arc::clone(config), Arc::clone(ctx), socket));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!("accept: {}", err);
                    break;
                }
            }
        }
    }

    // force-close sessions that made no progress for too long
    for (index, session) in sessions.iter_mut().enumerate() {
        if index < handled.len() && handled[index] {
            continue;
        }

        if !session.dead() && now - session.timestamp >= IDLE_TIMEOUT {
            info!("Closing idle session");
            session.close_command();
            session.close_pasv();
            session.close_data();
        }
    }

    sessions.retain(|session| !session.dead());

    Ok(())
}

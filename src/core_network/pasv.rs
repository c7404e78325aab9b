use std::net::SocketAddrV4;

use log::info;

use crate::constants::SOCK_BUFFERSIZE;
use crate::core_network::socket::Socket;
use crate::session::{Session, State};

/// Handles the PASV FTP command.
///
/// Creates a listener on the control socket's local address with a
/// kernel-assigned ephemeral port and replies with the 6-tuple. The
/// connection is accepted once a transfer command arrives.
pub fn handle_pasv_command(session: &mut Session, _args: &str) {
    if !session.authorized() {
        session.set_state(State::Command, false, false);
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // reset state
    session.set_state(State::Command, true, true);
    session.pasv = false;
    session.port = false;

    let local = match session.command_socket.as_ref().map(|s| s.local_addr()) {
        Some(Ok(addr)) => addr,
        _ => {
            session.send_response("451 Failed to create listening socket\r\n");
            return;
        }
    };

    let socket = match Socket::create() {
        Ok(socket) => socket,
        Err(_) => {
            session.send_response("451 Failed to create listening socket\r\n");
            return;
        }
    };

    let _ = socket.set_recv_buffer_size(SOCK_BUFFERSIZE);
    let _ = socket.set_send_buffer_size(SOCK_BUFFERSIZE);

    if socket.bind(SocketAddrV4::new(*local.ip(), 0)).is_err() {
        session.send_response("451 Failed to bind address\r\n");
        return;
    }

    if socket.listen(1).is_err() {
        session.send_response("451 Failed to listen on socket\r\n");
        return;
    }

    let addr = match socket.local_addr() {
        Ok(addr) => addr,
        Err(_) => {
            session.send_response("451 Failed to listen on socket\r\n");
            return;
        }
    };

    info!("Listening on [{}]:{}", addr.ip(), addr.port());

    session.pasv_socket = Some(socket);
    session.pasv = true;

    let ip = addr.ip().octets();
    let response = format!(
        "227 Entering Passive Mode ({},{},{},{},{},{}).\r\n",
        ip[0],
        ip[1],
        ip[2],
        ip[3],
        addr.port() >> 8,
        addr.port() & 0xFF
    );
    session.send_response(&response);
}

use crate::session::{Session, State};

/// Handles the ABOR (Abort) FTP command.
///
/// Cancels any transfer in flight, dropping buffered data and closing the
/// data connection. This is the one command clients send via the Telnet
/// Synch mechanism.
pub fn handle_abor_command(session: &mut Session, _args: &str) {
    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    if session.state == State::Command {
        session.send_response("225 No transfer to abort\r\n");
        return;
    }

    // abort the transfer
    session.send_response("225 Aborted\r\n");
    session.send_response("425 Transfer aborted\r\n");
    session.set_state(State::Command, true, true);
}

use crate::session::{Session, State, XferFileMode};

/// Handles the STOR (Store) FTP command.
///
/// Received data flows from the data connection through the transfer
/// buffer (and the inflate codec under MODE Z) into the file. A prior REST
/// replaces the file tail from that offset.
pub fn handle_stor_command(session: &mut Session, args: &str) {
    if !session.authorized() {
        session.set_state(State::Command, false, false);
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // open the file to store
    session.xfer_file(args, XferFileMode::Stor);
}

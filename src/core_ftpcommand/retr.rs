use crate::session::{Session, State, XferFileMode};

/// Handles the RETR (Retrieve) FTP command.
///
/// The file content flows through the transfer buffer (and the deflate
/// codec under MODE Z) into the data connection, honoring a prior REST.
pub fn handle_retr_command(session: &mut Session, args: &str) {
    if !session.authorized() {
        session.set_state(State::Command, false, false);
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // open the file to retrieve
    session.xfer_file(args, XferFileMode::Retr);
}

use crate::session::{Session, State, XferFileMode};

/// Handles the APPE (Append) FTP command.
pub fn handle_appe_command(session: &mut Session, args: &str) {
    if !session.authorized() {
        session.set_state(State::Command, false, false);
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // open the file in append mode
    session.xfer_file(args, XferFileMode::Appe);
}

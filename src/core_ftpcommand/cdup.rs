use crate::session::{Session, State};

/// Handles the CDUP (Change to Parent Directory) FTP command.
pub fn handle_cdup_command(session: &mut Session, _args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    if let Err(err) = session.change_dir("..") {
        session.send_response(&format!("550 {}\r\n", err));
        return;
    }

    session.send_response("200 OK\r\n");
}

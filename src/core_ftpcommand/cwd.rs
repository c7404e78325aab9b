use crate::session::{Session, State};

/// Handles the CWD (Change Working Directory) FTP command.
///
/// The argument may be absolute or relative to the current directory; the
/// resolved path must exist and be a directory.
pub fn handle_cwd_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    if let Err(err) = session.change_dir(args) {
        session.send_response(&format!("550 {}\r\n", err));
        return;
    }

    session.send_response("200 OK\r\n");
}

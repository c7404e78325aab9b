use std::io;

use crate::session::{Session, State};

/// Handles the REST (Restart) FTP command.
///
/// The offset applies to the next single RETR/STOR/APPE and is cleared by
/// any other command.
pub fn handle_rest_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // parse the offset: digits only, no sign
    let position = if !args.is_empty() && args.bytes().all(|b| b.is_ascii_digit()) {
        args.parse::<u64>().ok()
    } else {
        None
    };

    let Some(position) = position else {
        session.send_response(&format!(
            "504 {}\r\n",
            io::Error::from_raw_os_error(libc::EINVAL)
        ));
        return;
    };

    // set the restart offset
    session.restart_position = position;
    session.send_response("350 OK\r\n");
}

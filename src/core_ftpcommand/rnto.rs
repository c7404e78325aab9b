use std::fs;

use crate::core_ftpcommand::utils::build_resolved_path;
use crate::session::{Session, State};

/// Handles the RNTO (Rename To) FTP command.
pub fn handle_rnto_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // make sure the previous command was RNFR
    let Some(from) = session.rename.take() else {
        session.send_response("503 Bad sequence of commands\r\n");
        return;
    };

    // build the path to rename to
    let path = match build_resolved_path(&session.cwd, args) {
        Ok(path) => path,
        Err(err) => {
            session.send_response(&format!("554 {}\r\n", err));
            return;
        }
    };

    // rename the file
    if let Err(err) = fs::rename(&from, &path) {
        session.send_response(&format!("550 {}\r\n", err));
        return;
    }

    session.ctx.update_free_space();
    session.send_response("250 OK\r\n");
}

use std::fs;

use crate::core_ftpcommand::utils::build_resolved_path;
use crate::session::{Session, State};

/// Handles the SIZE FTP command. Only regular files have a size.
pub fn handle_size_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // build the path to stat
    let path = match build_resolved_path(&session.cwd, args) {
        Ok(path) => path,
        Err(err) => {
            session.send_response(&format!("553 {}\r\n", err));
            return;
        }
    };

    // stat the path
    let st = match fs::metadata(&path) {
        Ok(st) => st,
        Err(err) => {
            session.send_response(&format!("550 {}\r\n", err));
            return;
        }
    };

    if !st.is_file() {
        session.send_response("550 Not a file\r\n");
        return;
    }

    session.send_response(&format!("213 {}\r\n", st.len()));
}

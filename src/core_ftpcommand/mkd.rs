use std::fs;

use crate::core_ftpcommand::utils::build_resolved_path;
use crate::session::{Session, State};

/// Handles the MKD (Make Directory) FTP command.
pub fn handle_mkd_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // build the path to create
    let path = match build_resolved_path(&session.cwd, args) {
        Ok(path) => path,
        Err(err) => {
            session.send_response(&format!("553 {}\r\n", err));
            return;
        }
    };

    // create the directory
    if let Err(err) = fs::create_dir(&path) {
        session.send_response(&format!("550 {}\r\n", err));
        return;
    }

    session.ctx.update_free_space();
    session.send_response("250 OK\r\n");
}

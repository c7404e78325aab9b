use std::fs;

use crate::core_ftpcommand::utils::build_resolved_path;
use crate::session::{Session, State};

/// Handles the RMD (Remove Directory) FTP command.
pub fn handle_rmd_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // build the path to remove
    let path = match build_resolved_path(&session.cwd, args) {
        Ok(path) => path,
        Err(err) => {
            session.send_response(&format!("553 {}\r\n", err));
            return;
        }
    };

    // remove the directory
    if let Err(err) = fs::remove_dir(&path) {
        session.send_response(&format!("550 {}\r\n", err));
        return;
    }

    session.ctx.update_free_space();
    session.send_response("250 OK\r\n");
}

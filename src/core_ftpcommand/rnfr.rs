use std::fs;

use crate::core_ftpcommand::utils::build_resolved_path;
use crate::session::{Session, State};

/// Handles the RNFR (Rename From) FTP command. The target is remembered
/// for the RNTO that must follow immediately.
pub fn handle_rnfr_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // build the path to rename from
    let path = match build_resolved_path(&session.cwd, args) {
        Ok(path) => path,
        Err(err) => {
            session.send_response(&format!("553 {}\r\n", err));
            return;
        }
    };

    // make sure the path exists
    if let Err(err) = fs::symlink_metadata(&path) {
        session.send_response(&format!("450 {}\r\n", err));
        return;
    }

    // we are ready for RNTO
    session.rename = Some(path);
    session.send_response("350 OK\r\n");
}

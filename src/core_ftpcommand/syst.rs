use crate::session::{Session, State};

/// Handles the SYST FTP command.
pub fn handle_syst_command(session: &mut Session, _args: &str) {
    session.set_state(State::Command, false, false);
    session.send_response("215 UNIX Type: L8\r\n");
}

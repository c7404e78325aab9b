use crate::session::{Session, State};

/// Handles the TYPE FTP command. Transfers are always binary.
pub fn handle_type_command(session: &mut Session, _args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    session.send_response("200 OK\r\n");
}

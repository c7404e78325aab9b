use crate::session::{Session, State};

/// ALLO is superfluous on a filesystem-backed server.
pub fn handle_allo_command(session: &mut Session, _args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    session.send_response("202 Superfluous command\r\n");
}

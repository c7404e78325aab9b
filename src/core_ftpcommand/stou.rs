use crate::session::{Session, State};

/// STOU (Store Unique) is not implemented.
pub fn handle_stou_command(session: &mut Session, _args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    session.send_response("502 Command not implemented\r\n");
}

use crate::session::{Session, State};

/// Handles the STRU FTP command. Only F (file) structure is supported.
pub fn handle_stru_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    if args.eq_ignore_ascii_case("F") {
        session.send_response("200 OK\r\n");
        return;
    }

    session.send_response("504 Unavailable\r\n");
}

use crate::session::{Session, State};

/// Handles the MODE FTP command: S (stream) or Z (deflate).
pub fn handle_mode_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    if args.eq_ignore_ascii_case("S") {
        session.deflate = false;
        session.send_response("200 OK\r\n");
        return;
    }

    if args.eq_ignore_ascii_case("Z") {
        session.deflate = true;
        session.send_response("200 OK\r\n");
        return;
    }

    session.send_response("504 Unavailable\r\n");
}

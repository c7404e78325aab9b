use crate::session::Session;

/// NOOP keeps the control connection alive, even mid-transfer.
pub fn handle_noop_command(session: &mut Session, _args: &str) {
    session.send_response("200 OK\r\n");
}

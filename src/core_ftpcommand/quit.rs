use crate::session::Session;

/// Handles the QUIT FTP command.
pub fn handle_quit_command(session: &mut Session, _args: &str) {
    session.send_response("221 Disconnecting\r\n");
    session.close_command();
}

use crate::core_ftpcommand::utils::encode_path;
use crate::session::Session;

/// Handles the PWD (Print Working Directory) FTP command.
/// Quotes in the path are doubled per RFC 959.
pub fn handle_pwd_command(session: &mut Session, _args: &str) {
    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    let response = format!("257 \"{}\"\r\n", encode_path(&session.cwd, true));
    session.send_response(&response);
}

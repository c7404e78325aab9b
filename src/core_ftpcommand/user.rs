use crate::session::{Session, State};

/// Handles the USER FTP command, the first phase of login.
///
/// An empty configured username authorizes anyone; when no password is
/// required either, the reply is an immediate 230.
pub fn handle_user_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    session.authorized_user = false;

    let (user, pass) = {
        let config = session.config();
        (config.user().to_string(), config.pass().to_string())
    };

    if user.is_empty() || user == args {
        session.authorized_user = true;

        if pass.is_empty() {
            session.send_response("230 OK\r\n");
            return;
        }

        session.send_response("331 Need password\r\n");
        return;
    }

    session.send_response("430 Invalid user\r\n");
}

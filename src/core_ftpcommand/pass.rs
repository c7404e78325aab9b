use crate::session::{Session, State};

/// Handles the PASS (Password) FTP command, the second phase of login.
///
/// An empty configured password authorizes any (or no) password, provided
/// USER succeeded first.
pub fn handle_pass_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    session.authorized_pass = false;

    let (user, pass) = {
        let config = session.config();
        (config.user().to_string(), config.pass().to_string())
    };

    if !user.is_empty() && !session.authorized_user {
        session.send_response("430 User not authorized\r\n");
        return;
    }

    if pass.is_empty() || pass == args {
        session.authorized_pass = true;
        session.send_response("230 OK\r\n");
        return;
    }

    session.send_response("430 Invalid password\r\n");
}

use crate::core_ftpcommand::dirent::XferDirMode;
use crate::session::{Session, State, Transfer};

/// Handles the NLST (Name List) FTP command.
///
/// A `*` in the argument switches to wildcard expansion over the pattern's
/// parent directory; otherwise this is a plain name listing.
pub fn handle_nlst_command(session: &mut Session, args: &str) {
    if !session.authorized() {
        session.set_state(State::Command, false, false);
        session.send_response("530 Not logged in\r\n");
        return;
    }

    if args.contains('*') {
        if let Err(err) = session.setup_glob(args) {
            session.send_response(&format!("501 {}\r\n", err));
            session.set_state(State::Command, false, false);
            return;
        }

        session.transfer = Some(Transfer::Glob);

        if !session.port && !session.pasv {
            // a prior PORT or PASV is required
            session.send_response("503 Bad sequence of commands\r\n");
            session.set_state(State::Command, true, true);
            return;
        }

        session.set_state(State::DataConnect, false, true);
        session.send = true;

        // setup connection
        if session.port && !session.data_connect() {
            session.send_response("425 Can't open data connection\r\n");
            session.set_state(State::Command, true, true);
        }

        return;
    }

    session.xfer_dir(args, XferDirMode::Nlst, false);
}

use crate::core_ftpcommand::dirent::XferDirMode;
use crate::session::{Session, State};

/// Handles the LIST FTP command.
///
/// The workaround flag tolerates clients that pass `ls` options such as
/// `-a` or `-l` in the path argument.
pub fn handle_list_command(session: &mut Session, args: &str) {
    if !session.authorized() {
        session.set_state(State::Command, false, false);
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // open the path in LIST mode
    session.xfer_dir(args, XferDirMode::List, true);
}

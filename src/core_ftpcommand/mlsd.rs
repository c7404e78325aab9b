use crate::core_ftpcommand::dirent::XferDirMode;
use crate::session::{Session, State};

/// Handles the MLSD (Machine Listing of a Directory) FTP command.
pub fn handle_mlsd_command(session: &mut Session, args: &str) {
    if !session.authorized() {
        session.set_state(State::Command, false, false);
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // open the path in MLSD mode
    session.xfer_dir(args, XferDirMode::Mlsd, false);
}

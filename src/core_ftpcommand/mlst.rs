use crate::core_ftpcommand::dirent::XferDirMode;
use crate::session::{Session, State};

/// Handles the MLST (Machine Listing of a single entry) FTP command.
/// The entry goes out over the control connection.
pub fn handle_mlst_command(session: &mut Session, args: &str) {
    if !session.authorized() {
        session.set_state(State::Command, false, false);
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // open the path in MLST mode
    session.xfer_dir(args, XferDirMode::Mlst, false);
}

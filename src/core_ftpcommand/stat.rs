use crate::core_ftpcommand::dirent::XferDirMode;
use crate::session::{Session, State};

/// Handles the STAT FTP command.
///
/// Mid-transfer it reports progress over the control connection; with no
/// argument it reports server status; with a path it behaves like LIST but
/// over the control connection.
pub fn handle_stat_command(session: &mut Session, args: &str) {
    if session.state == State::DataConnect {
        session.send_response(
            "211-FTP server status\r\n\
             \x20Waiting for data connection\r\n\
             211 End\r\n",
        );
        return;
    }

    if session.state == State::DataTransfer {
        let mut response = String::from("211-FTP server status\r\n");
        if !session.work_item.is_empty() {
            response.push_str(&format!(" Transferring {}\r\n", session.work_item));
        }
        if session.file_size > 0 {
            response.push_str(&format!(
                " Transferred {} of {} bytes\r\n",
                session.file_position, session.file_size
            ));
        } else {
            response.push_str(&format!(" Transferred {} bytes\r\n", session.file_position));
        }
        if session.deflate {
            response.push_str(&format!(
                " Compressed stream at {} bytes\r\n",
                session.z_stream_position
            ));
        }
        response.push_str("211 End\r\n");
        session.send_response(&response);
        return;
    }

    if !session.authorized() {
        session.set_state(State::Command, false, false);
        session.send_response("530 Not logged in\r\n");
        return;
    }

    if args.is_empty() {
        let uptime = session.ctx.uptime_secs();
        let response = format!(
            "211-FTP server status\r\n\
             \x20Uptime: {:02}:{:02}:{:02}\r\n\
             211 End\r\n",
            uptime / 3600,
            (uptime / 60) % 60,
            uptime % 60
        );
        session.send_response(&response);
        return;
    }

    session.xfer_dir(args, XferDirMode::Stat, false);
}

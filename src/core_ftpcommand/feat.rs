use crate::session::{Session, State};

/// Handles the FEAT (Feature) FTP command.
///
/// The MLST line marks currently enabled facts with `*`, per RFC 3659.
pub fn handle_feat_command(session: &mut Session, _args: &str) {
    session.set_state(State::Command, false, false);

    let mark = |enabled: bool| if enabled { "*" } else { "" };
    let response = format!(
        "211-\r\n\
         \x20MDTM\r\n\
         \x20MLST Type{};Size{};Modify{};Perm{};UNIX.mode{};\r\n\
         \x20MODE Z\r\n\
         \x20PASV\r\n\
         \x20SIZE\r\n\
         \x20TVFS\r\n\
         \x20UTF8\r\n\
         \r\n\
         211 End\r\n",
        mark(session.mlst_type),
        mark(session.mlst_size),
        mark(session.mlst_modify),
        mark(session.mlst_perm),
        mark(session.mlst_unix_mode),
    );

    session.send_response(&response);
}

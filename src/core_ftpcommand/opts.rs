use std::io;

use crate::session::{Session, State};

fn invalid(session: &mut Session, code: u16) {
    session.send_response(&format!(
        "{} {}\r\n",
        code,
        io::Error::from_raw_os_error(libc::EINVAL)
    ));
}

/// Handles the OPTS FTP command: UTF8, the MLST fact selection, and the
/// MODE Z compression level.
pub fn handle_opts_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    // check UTF8 options
    if args.eq_ignore_ascii_case("UTF8")
        || args.eq_ignore_ascii_case("UTF8 ON")
        || args.eq_ignore_ascii_case("UTF8 NLST")
    {
        session.send_response("200 OK\r\n");
        return;
    }

    // check MLST options
    if args.len() >= 5 && args[..5].eq_ignore_ascii_case("MLST ") {
        session.mlst_type = false;
        session.mlst_size = false;
        session.mlst_modify = false;
        session.mlst_perm = false;
        session.mlst_unix_mode = false;

        for fact in args[5..].split(';') {
            if fact.eq_ignore_ascii_case("Type") {
                session.mlst_type = true;
            } else if fact.eq_ignore_ascii_case("Size") {
                session.mlst_size = true;
            } else if fact.eq_ignore_ascii_case("Modify") {
                session.mlst_modify = true;
            } else if fact.eq_ignore_ascii_case("Perm") {
                session.mlst_perm = true;
            } else if fact.eq_ignore_ascii_case("UNIX.mode") {
                session.mlst_unix_mode = true;
            }
        }

        let any = session.mlst_type
            || session.mlst_size
            || session.mlst_modify
            || session.mlst_perm
            || session.mlst_unix_mode;
        let fact = |enabled: bool, name: &'static str| if enabled { name } else { "" };

        let response = format!(
            "200 MLST OPTS{}{}{}{}{}{}\r\n",
            if any { " " } else { "" },
            fact(session.mlst_type, "Type;"),
            fact(session.mlst_size, "Size;"),
            fact(session.mlst_modify, "Modify;"),
            fact(session.mlst_perm, "Perm;"),
            fact(session.mlst_unix_mode, "UNIX.mode;"),
        );
        session.send_response(&response);
        return;
    }

    // check the MODE Z compression level
    if args.len() >= 7 && args[..7].eq_ignore_ascii_case("MODE Z ") {
        let mut words = args[7..].split_ascii_whitespace();
        let mut level = None;

        while let Some(option) = words.next() {
            if !option.eq_ignore_ascii_case("LEVEL") {
                invalid(session, 501);
                return;
            }

            let value = words.next().unwrap_or("");
            let parsed = match value.parse::<u32>() {
                Ok(parsed) if value.len() == 1 => parsed,
                _ => {
                    invalid(session, 501);
                    return;
                }
            };

            if !session.config().set_deflate_level(parsed) {
                invalid(session, 501);
                return;
            }

            level = Some(parsed);
        }

        let Some(level) = level else {
            invalid(session, 501);
            return;
        };

        session.send_response(&format!("200 MODE Z LEVEL set to {}\r\n", level));
        return;
    }

    invalid(session, 504);
}

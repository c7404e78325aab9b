//! SITE extensions: in-band administration of the server configuration.

use crate::session::{Session, State};

const SITE_HELP: &str = "211-\r\n\
                         \x20Show this help: SITE HELP\r\n\
                         \x20Set username: SITE USER <NAME>\r\n\
                         \x20Set password: SITE PASS <PASS>\r\n\
                         \x20Set port: SITE PORT <PORT>\r\n\
                         \x20Set deflate level: SITE DEFLATE <LEVEL>\r\n\
                         \x20Set hostname: SITE HOST <HOSTNAME>\r\n\
                         \x20Set mtime lookup: SITE MTIME [0|1]\r\n\
                         \x20Save config: SITE SAVE\r\n\
                         211 End\r\n";

/// Handles the SITE FTP command. `SITE HELP` is available before login;
/// everything else requires authorization.
pub fn handle_site_command(session: &mut Session, args: &str) {
    session.set_state(State::Command, false, false);

    let (command, arg) = match args.find(' ') {
        Some(pos) => (&args[..pos], &args[pos + 1..]),
        None => (args, ""),
    };

    if command.eq_ignore_ascii_case("HELP") {
        session.send_response(SITE_HELP);
        return;
    }

    if !session.authorized() {
        session.send_response("530 Not logged in\r\n");
        return;
    }

    if command.eq_ignore_ascii_case("USER") {
        session.config().set_user(arg);
        session.send_response("200 OK\r\n");
    } else if command.eq_ignore_ascii_case("PASS") {
        session.config().set_pass(arg);
        session.send_response("200 OK\r\n");
    } else if command.eq_ignore_ascii_case("PORT") {
        if !session.config().set_port(arg) {
            session.send_response("550 Invalid port\r\n");
            return;
        }
        session.send_response("200 OK\r\n");
    } else if command.eq_ignore_ascii_case("DEFLATE") {
        let level = arg.trim().parse::<u32>().ok();
        let updated = level.is_some_and(|level| session.config().set_deflate_level(level));
        if !updated {
            session.send_response("550 Invalid deflate level\r\n");
            return;
        }
        session.send_response("200 OK\r\n");
    } else if command.eq_ignore_ascii_case("HOST") {
        session.config().set_hostname(arg);
        session.ctx.set_mdns_hostname(arg);
        session.send_response("200 OK\r\n");
    } else if command.eq_ignore_ascii_case("MTIME") {
        match arg {
            "0" => session.config().set_get_mtime(false),
            "1" => session.config().set_get_mtime(true),
            _ => {
                session.send_response("550 Invalid argument\r\n");
                return;
            }
        }
        session.send_response("200 OK\r\n");
    } else if command.eq_ignore_ascii_case("SAVE") {
        let saved = session.config().save();
        if let Err(err) = saved {
            session.send_response(&format!("550 {}\r\n", err));
            return;
        }
        session.send_response("200 OK\r\n");
    } else {
        session.send_response("550 Invalid command\r\n");
    }
}

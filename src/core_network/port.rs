use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::session::{Session, State};

/// Parse the PORT 6-tuple `h1,h2,h3,h4,p1,p2`.
fn parse_port_tuple(args: &str) -> Option<SocketAddrV4> {
    let mut fields = [0u8; 6];
    let mut count = 0;

    for part in args.split(',') {
        if count == 6 || part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        fields[count] = part.parse().ok()?;
        count += 1;
    }

    if count != 6 {
        return None;
    }

    let ip = Ipv4Addr::new(fields[0], fields[1], fields[2], fields[3]);
    let port = u16::from(fields[4]) << 8 | u16::from(fields[5]);
    Some(SocketAddrV4::new(ip, port))
}

/// Handles the PORT FTP command: the client listens, we connect.
pub fn handle_port_command(session: &mut Session, args: &str) {
    if !session.authorized() {
        session.set_state(State::Command, false, false);
        session.send_response("530 Not logged in\r\n");
        return;
    }

    // reset state
    session.set_state(State::Command, true, true);
    session.pasv = false;
    session.port = false;

    let Some(addr) = parse_port_tuple(args) else {
        session.send_response(&format!(
            "501 {}\r\n",
            io::Error::from_raw_os_error(libc::EINVAL)
        ));
        return;
    };

    // we are ready to connect to the client
    session.port_addr = Some(addr);
    session.port = true;
    session.send_response("200 OK\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_valid_tuple() {
        let addr = parse_port_tuple("127,0,0,1,4,1").unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4 * 256 + 1));
    }

    #[test]
    fn parses_high_ports() {
        let addr = parse_port_tuple("10,0,0,2,255,255").unwrap();
        assert_eq!(addr.port(), 65535);
    }

    #[test]
    fn rejects_wrong_field_counts() {
        assert!(parse_port_tuple("").is_none());
        assert!(parse_port_tuple("127,0,0,1,4").is_none());
        assert!(parse_port_tuple("127,0,0,1,4,1,9").is_none());
    }

    #[test]
    fn rejects_out_of_range_octets() {
        assert!(parse_port_tuple("256,0,0,1,4,1").is_none());
        assert!(parse_port_tuple("127,0,0,1,4,256").is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_port_tuple("a,b,c,d,e,f").is_none());
        assert!(parse_port_tuple("127,0,0,1,4,-1").is_none());
        assert!(parse_port_tuple("127,0,0,1,,1").is_none());
    }
}

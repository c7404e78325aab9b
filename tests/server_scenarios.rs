//! End-to-end scenarios against a live server on an ephemeral port.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, Shutdown, TcpStream};
use std::thread;
use std::time::Duration;

use ferroftpd::config::FtpConfig;
use ferroftpd::server::FtpServer;
use tempfile::TempDir;

fn start_server_with(mut config: FtpConfig) -> u16 {
    config.set_listen_port(0);
    let mut server = FtpServer::bind(config.into_shared(), Ipv4Addr::LOCALHOST).unwrap();
    let port = server.local_port();

    thread::spawn(move || {
        let _ = server.run();
    });

    port
}

fn start_server() -> u16 {
    start_server_with(FtpConfig::default())
}

struct Client {
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(port: u16) -> Client {
        let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();

        let mut client = Client {
            reader: BufReader::new(stream),
        };
        client.expect("220");
        client
    }

    fn send(&mut self, line: &str) {
        let mut stream = self.reader.get_ref();
        stream.write_all(format!("{}\r\n", line).as_bytes()).unwrap();
    }

    fn read_reply(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line
    }

    fn expect(&mut self, prefix: &str) -> String {
        let line = self.read_reply();
        assert!(
            line.starts_with(prefix),
            "expected a {} reply, got {:?}",
            prefix,
            line
        );
        line
    }

    /// Read through a multi-line reply until the closing `<code> ` line.
    fn expect_end(&mut self, code: &str) {
        let terminator = format!("{} ", code);
        loop {
            let line = self.read_reply();
            assert!(!line.is_empty(), "connection closed inside a reply");
            if line.starts_with(&terminator) {
                return;
            }
        }
    }

    fn cmd(&mut self, line: &str, prefix: &str) -> String {
        self.send(line);
        self.expect(prefix)
    }

    fn pasv(&mut self) -> TcpStream {
        let reply = self.cmd("PASV", "227");

        let start = reply.find('(').unwrap() + 1;
        let end = reply.find(')').unwrap();
        let fields: Vec<u16> = reply[start..end]
            .split(',')
            .map(|field| field.parse().unwrap())
            .collect();
        assert_eq!(fields.len(), 6);

        let ip = Ipv4Addr::new(
            fields[0] as u8,
            fields[1] as u8,
            fields[2] as u8,
            fields[3] as u8,
        );
        let stream = TcpStream::connect((ip, fields[4] * 256 + fields[5])).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        stream
    }
}

#[test]
fn login_changes_directory_and_reports_it() {
    let port = start_server();
    let dir = TempDir::new().unwrap();

    let mut client = Client::connect(port);
    client.cmd("USER anonymous", "230");

    let reply = client.cmd("PWD", "257");
    assert_eq!(reply.trim_end(), "257 \"/\"");

    client.cmd(&format!("CWD {}", dir.path().display()), "200");

    let reply = client.cmd("PWD", "257");
    assert_eq!(
        reply.trim_end(),
        format!("257 \"{}\"", dir.path().display())
    );
}

#[test]
fn passive_retrieval_delivers_file_bytes() {
    let port = start_server();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hello.txt"), b"Hello\n").unwrap();

    let mut client = Client::connect(port);
    client.cmd("USER anonymous", "230");

    let mut data = client.pasv();
    client.send(&format!("RETR {}/hello.txt", dir.path().display()));
    client.expect("150");

    let mut content = Vec::new();
    data.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"Hello\n");

    client.expect("226");
}

#[test]
fn store_with_restart_replaces_the_tail() {
    let port = start_server();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.bin");
    std::fs::write(&path, (0u8..10).collect::<Vec<u8>>()).unwrap();

    let mut client = Client::connect(port);
    client.cmd("USER anonymous", "230");

    let mut data = client.pasv();
    client.cmd("REST 5", "350");
    client.send(&format!("STOR {}", path.display()));
    client.expect("150");

    data.write_all(&[0xAA, 0xBB, 0xCC]).unwrap();
    data.shutdown(Shutdown::Write).unwrap();
    drop(data);

    client.expect("226");
    assert_eq!(
        std::fs::read(&path).unwrap(),
        vec![0x00, 0x01, 0x02, 0x03, 0x04, 0xAA, 0xBB, 0xCC]
    );
}

#[test]
fn nlst_encodes_embedded_linefeeds() {
    let port = start_server();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a\nb"), b"").unwrap();
    std::fs::write(dir.path().join("c\"d"), b"").unwrap();

    let mut client = Client::connect(port);
    client.cmd("USER anonymous", "230");

    let mut data = client.pasv();
    client.send(&format!("NLST {}", dir.path().display()));
    client.expect("150");

    let mut listing = Vec::new();
    data.read_to_end(&mut listing).unwrap();
    client.expect("226");

    let lines: HashSet<&[u8]> = listing
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();

    let base = dir.path().display();
    let encoded = format!("{}/a\0b", base);
    let quoted = format!("{}/c\"d", base);
    assert!(lines.contains(encoded.as_bytes()), "lines = {:?}", lines);
    assert!(lines.contains(quoted.as_bytes()), "lines = {:?}", lines);
    assert_eq!(lines.len(), 2);
}

#[test]
fn mode_z_roundtrip() {
    let port = start_server();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zeros.bin");
    let payload = vec![0u8; 1024 * 1024];

    let mut client = Client::connect(port);
    client.cmd("USER anonymous", "230");
    client.cmd("MODE Z", "200");

    // upload a compressed MiB of zeroes
    let mut data = client.pasv();
    client.send(&format!("STOR {}", path.display()));
    client.expect("150");

    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(6));
    encoder.write_all(&payload).unwrap();
    let compressed = encoder.finish().unwrap();
    assert!(compressed.len() < 10 * 1024);

    data.write_all(&compressed).unwrap();
    data.shutdown(Shutdown::Write).unwrap();
    drop(data);
    client.expect("226");

    let stored = std::fs::read(&path).unwrap();
    assert_eq!(stored.len(), payload.len());
    assert!(stored.iter().all(|&b| b == 0));

    // fetch it back, still in MODE Z
    let mut data = client.pasv();
    client.send(&format!("RETR {}", path.display()));
    client.expect("150");

    let mut wire = Vec::new();
    data.read_to_end(&mut wire).unwrap();
    client.expect("226");

    let mut decoder = flate2::read::ZlibDecoder::new(&wire[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();
    assert_eq!(decompressed, payload);
}

#[test]
fn abort_cancels_an_endless_retrieval() {
    let port = start_server();

    let mut client = Client::connect(port);
    client.cmd("USER anonymous", "230");

    let mut data = client.pasv();
    client.send("RETR /devZero");
    client.expect("150");

    // some data must be flowing
    let mut chunk = [0u8; 65536];
    data.read_exact(&mut chunk).unwrap();
    assert!(chunk.iter().all(|&b| b == 0));

    client.send("ABOR");
    client.expect("225");
    client.expect("425");

    // the session is usable again
    client.cmd("NOOP", "200");
}

#[test]
fn mlst_reports_over_the_control_connection() {
    let port = start_server();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("f.txt");
    std::fs::write(&path, b"abc").unwrap();

    let mut client = Client::connect(port);
    client.cmd("USER anonymous", "230");

    client.send(&format!("MLST {}", path.display()));
    client.expect("250-");
    let entry = client.read_reply();
    assert!(entry.starts_with(" Type=file;"), "entry = {:?}", entry);
    assert!(entry.contains("Size=3;"), "entry = {:?}", entry);
    assert!(
        entry.trim_end().ends_with(&format!(" {}", path.display())),
        "entry = {:?}",
        entry
    );
    client.expect("250 ");
}

#[test]
fn unauthorized_commands_are_refused() {
    let mut config = FtpConfig::default();
    config.set_user("admin");
    config.set_pass("secret");
    let port = start_server_with(config);

    let mut client = Client::connect(port);

    client.cmd("PWD", "530");
    client.cmd("LIST", "530");
    client.cmd("SYST", "215");
    client.send("SITE HELP");
    client.expect_end("211");

    client.cmd("USER nobody", "430");
    client.cmd("USER admin", "331");
    client.cmd("PASS wrong", "430");
    client.cmd("PASS secret", "230");
    client.cmd("PWD", "257");
}

#[test]
fn unknown_verbs_echo_without_disconnecting() {
    let port = start_server();
    let mut client = Client::connect(port);

    let reply = client.cmd("FROB x", "502");
    assert!(reply.contains("Invalid command \"FROB x\""), "reply = {:?}", reply);

    client.cmd("NOOP", "200");
}

#[test]
fn feat_lists_mode_z_and_mlst_facts() {
    let port = start_server();
    let mut client = Client::connect(port);

    client.send("FEAT");
    let mut saw_mode_z = false;
    let mut saw_mlst = false;
    loop {
        let line = client.read_reply();
        assert!(!line.is_empty());
        if line.contains("MODE Z") {
            saw_mode_z = true;
        }
        if line.contains("MLST Type*;Size*;Modify*;Perm*;UNIX.mode;") {
            saw_mlst = true;
        }
        if line.starts_with("211 ") {
            break;
        }
    }
    assert!(saw_mode_z);
    assert!(saw_mlst);
}

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read as _, Seek, SeekFrom, Write as _};
use std::net::SocketAddrV4;
use std::sync::{Arc, MutexGuard};

use chrono::Utc;
use globset::GlobBuilder;
use log::{debug, error, info};

use crate::config::{self, FtpConfig, SharedConfig};
use crate::constants::{
    COMMAND_BUFFERSIZE, DEV_ZERO_PATH, RESPONSE_BUFFERSIZE, SOCK_BUFFERSIZE, TELNET_DM,
    XFER_BUFFERSIZE,
};
use crate::core_codec::{Codec, Deflater, Inflater};
use crate::core_ftpcommand::dirent::{self, EntryInfo, MlstFacts, XferDirMode};
use crate::core_ftpcommand::utils::{build_path, build_resolved_path, decode_path, encode_path};
use crate::core_ftpcommand::{self, is_allowed_during_transfer};
use crate::core_network::buffer::RingBuffer;
use crate::core_network::socket::Socket;
use crate::server::ServerContext;

/// Sockets are reference-counted so the data "socket" can alias the control
/// socket for MLST/STAT, and so teardown can tell whether this session holds
/// the last reference before lingering the fd on the pending-close list.
pub type SharedSocket = Arc<Socket>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Command,
    DataConnect,
    DataTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferFileMode {
    Retr,
    Stor,
    Appe,
}

/// Active transfer engine, dispatched per scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transfer {
    List,
    Retrieve,
    Store,
    Glob,
}

/// Pre-expanded NLST wildcard matches.
#[derive(Debug)]
pub(crate) struct GlobIter {
    entries: std::vec::IntoIter<String>,
}

impl GlobIter {
    fn next(&mut self) -> Option<String> {
        self.entries.next()
    }
}

/// One control connection and everything attached to it.
pub struct Session {
    pub(crate) config: SharedConfig,
    pub(crate) ctx: Arc<ServerContext>,

    pub(crate) command_socket: Option<SharedSocket>,
    pub(crate) pasv_socket: Option<Socket>,
    pub(crate) data_socket: Option<SharedSocket>,
    pub(crate) pending_close: Vec<SharedSocket>,

    command_buffer: RingBuffer,
    response_buffer: RingBuffer,
    xfer_buffer: RingBuffer,
    zstream_buffer: RingBuffer,

    pub(crate) state: State,
    pub(crate) transfer: Option<Transfer>,
    pub(crate) xfer_dir_mode: XferDirMode,

    pub(crate) authorized_user: bool,
    pub(crate) authorized_pass: bool,
    pub(crate) pasv: bool,
    pub(crate) port: bool,
    pub(crate) recv: bool,
    pub(crate) send: bool,
    urgent: bool,
    pub(crate) deflate: bool,
    z_flushed: bool,
    eof: bool,
    pub(crate) mlst_type: bool,
    pub(crate) mlst_size: bool,
    pub(crate) mlst_modify: bool,
    pub(crate) mlst_perm: bool,
    pub(crate) mlst_unix_mode: bool,
    dev_zero: bool,

    pub(crate) restart_position: u64,
    pub(crate) file_position: u64,
    pub(crate) file_size: u64,
    pub(crate) z_stream_position: u64,

    pub(crate) cwd: String,
    lwd: String,
    pub(crate) rename: Option<String>,
    pub(crate) work_item: String,

    pub(crate) port_addr: Option<SocketAddrV4>,

    /// Unix timestamp of the last socket progress, for the idle timeout and
    /// the LIST recent/old time cutoff.
    pub(crate) timestamp: i64,

    file: Option<File>,
    dir: Option<fs::ReadDir>,
    codec: Option<Codec>,
    pub(crate) glob: Option<GlobIter>,
}

impl Session {
    pub fn new(config: SharedConfig, ctx: Arc<ServerContext>, command_socket: Socket) -> Session {
        let (authorized_user, authorized_pass) = {
            let cfg = config::lock(&config);
            (cfg.user().is_empty(), cfg.pass().is_empty())
        };

        let _ = command_socket.set_non_blocking();

        let mut session = Session {
            config,
            ctx,
            command_socket: Some(Arc::new(command_socket)),
            pasv_socket: None,
            data_socket: None,
            pending_close: Vec::new(),
            command_buffer: RingBuffer::new(COMMAND_BUFFERSIZE),
            response_buffer: RingBuffer::new(RESPONSE_BUFFERSIZE),
            xfer_buffer: RingBuffer::new(XFER_BUFFERSIZE),
            zstream_buffer: RingBuffer::new(XFER_BUFFERSIZE),
            state: State::Command,
            transfer: None,
            xfer_dir_mode: XferDirMode::List,
            authorized_user,
            authorized_pass,
            pasv: false,
            port: false,
            recv: false,
            send: false,
            urgent: false,
            deflate: false,
            z_flushed: false,
            eof: false,
            mlst_type: true,
            mlst_size: true,
            mlst_modify: true,
            mlst_perm: true,
            mlst_unix_mode: false,
            dev_zero: false,
            restart_position: 0,
            file_position: 0,
            file_size: 0,
            z_stream_position: 0,
            cwd: String::from("/"),
            lwd: String::from("/"),
            rename: None,
            work_item: String::new(),
            port_addr: None,
            timestamp: Utc::now().timestamp(),
            file: None,
            dir: None,
            codec: None,
            glob: None,
        };

        session.send_response("220 Hello!\r\n");
        session
    }

    /// The session can be reaped once every socket is gone.
    pub fn dead(&self) -> bool {
        self.command_socket.is_none()
            && self.pasv_socket.is_none()
            && self.data_socket.is_none()
            && self.pending_close.is_empty()
    }

    pub(crate) fn authorized(&self) -> bool {
        self.authorized_user && self.authorized_pass
    }

    /// Whether response bytes are waiting for POLLOUT on the control socket.
    pub(crate) fn response_pending(&self) -> bool {
        !self.response_buffer.is_empty()
    }

    pub(crate) fn config(&self) -> MutexGuard<'_, FtpConfig> {
        config::lock(&self.config)
    }

    fn touch(&mut self) {
        self.timestamp = Utc::now().timestamp();
    }

    pub(crate) fn set_state(&mut self, state: State, close_pasv: bool, close_data: bool) {
        self.state = state;
        self.touch();

        if close_pasv {
            self.close_pasv();
        }
        if close_data {
            self.close_data();
        }

        if state == State::Command {
            self.restart_position = 0;
            self.file_size = 0;
            self.file_position = 0;
            self.work_item.clear();

            self.dev_zero = false;
            self.file = None;
            self.dir = None;
            self.glob = None;
            self.codec = None;
            self.transfer = None;
        }
    }

    /// Half-close a shared socket and park it until the peer finishes.
    /// A socket still referenced elsewhere (the control/data alias) is only
    /// released here.
    fn close_shared(socket: &mut Option<SharedSocket>, pending: &mut Vec<SharedSocket>) {
        if let Some(socket) = socket.take() {
            if Arc::strong_count(&socket) == 1 {
                let _ = socket.shutdown_write();
                let _ = socket.set_linger(true, 0);
                pending.push(socket);
            }
        }
    }

    pub(crate) fn close_command(&mut self) {
        Self::close_shared(&mut self.command_socket, &mut self.pending_close);
    }

    pub(crate) fn close_pasv(&mut self) {
        self.pasv_socket = None;
    }

    pub(crate) fn close_data(&mut self) {
        Self::close_shared(&mut self.data_socket, &mut self.pending_close);
        self.recv = false;
        self.send = false;
    }

    /// Queue a response and try to push it out immediately; the poller
    /// finishes any leftover on POLLOUT.
    pub(crate) fn send_response(&mut self, response: &str) {
        let Some(socket) = self.command_socket.clone() else {
            return;
        };

        debug!("Reply: {}", response.trim_end());

        if self.response_buffer.free_size() < response.len() {
            error!("Not enough space for response");
            self.close_command();
            return;
        }

        self.response_buffer.push(response.as_bytes());

        match socket.write(&mut self.response_buffer) {
            Ok(0) => self.close_command(),
            Ok(_) => {
                self.touch();
                self.response_buffer.coalesce();
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(_) => self.close_command(),
        }
    }

    /// Flush buffered response bytes after POLLOUT.
    pub(crate) fn write_response(&mut self) {
        let Some(socket) = self.command_socket.clone() else {
            return;
        };

        match socket.write(&mut self.response_buffer) {
            Ok(n) if n > 0 => {
                self.touch();
                self.response_buffer.coalesce();
            }
            _ => self.close_command(),
        }
    }

    /// Service the control socket: urgent data, buffered reads, and every
    /// complete command line currently in the buffer.
    pub(crate) fn read_command(&mut self, revents: i16) {
        let Some(socket) = self.command_socket.clone() else {
            return;
        };

        if revents & libc::POLLPRI != 0 {
            self.urgent = true;

            let at_mark = match socket.at_mark() {
                Ok(at_mark) => at_mark,
                Err(_) => {
                    self.close_command();
                    return;
                }
            };

            if !at_mark {
                // discard in-band data up to the mark
                self.command_buffer.clear();
                match socket.read(&mut self.command_buffer) {
                    Err(err) if err.kind() != io::ErrorKind::WouldBlock => self.close_command(),
                    _ => self.touch(),
                }
                return;
            }

            // consume the urgent byte itself
            let mut scratch = [0u8; 32];
            match socket.read_oob(&mut scratch) {
                Err(err) if err.kind() != io::ErrorKind::WouldBlock => {
                    self.close_command();
                    return;
                }
                _ => self.touch(),
            }

            self.command_buffer.clear();
            return;
        }

        if revents & libc::POLLIN != 0 {
            if self.command_buffer.free_size() == 0 {
                error!("Exceeded command buffer size");
                self.close_command();
                return;
            }

            match socket.read(&mut self.command_buffer) {
                Err(_) => {
                    self.close_command();
                    return;
                }
                Ok(0) => {
                    info!("Peer closed connection");
                    self.close_command();
                    return;
                }
                Ok(_) => self.touch(),
            }

            if self.urgent {
                // drop everything up to and including the telnet data mark
                let used = self.command_buffer.used_slice();
                let Some(mark) = used.iter().position(|&b| b == TELNET_DM) else {
                    return;
                };

                self.command_buffer.mark_free(mark + 1);
                self.command_buffer.coalesce();
                self.urgent = false;
            }
        }

        // loop through complete commands
        loop {
            let used = self.command_buffer.used_slice();
            let Some((delim, next)) = find_delimiter(used) else {
                return;
            };

            let mut line = used[..delim].to_vec();
            decode_path(&mut line);
            let line = String::from_utf8_lossy(&line).into_owned();

            self.command_buffer.mark_free(next);
            self.command_buffer.coalesce();

            self.handle_line(&line);

            if self.command_socket.is_none() {
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let (verb, args) = match line.find(|c: char| c.is_ascii_whitespace()) {
            Some(pos) => (&line[..pos], &line[pos + 1..]),
            None => (line, ""),
        };

        if verb.eq_ignore_ascii_case("USER") || verb.eq_ignore_ascii_case("PASS") {
            info!("{} ******", verb.to_ascii_uppercase());
        } else {
            info!("{}", line);
        }

        self.touch();

        let Some(handler) = core_ftpcommand::lookup(verb) else {
            let mut response = format!("502 Invalid command \"{}", encode_path(verb, false));
            if !args.is_empty() {
                response.push(' ');
                response.push_str(&encode_path(args, false));
            }
            response.push_str("\"\r\n");
            self.send_response(&response);
            return;
        };

        if self.state != State::Command {
            // only some commands are available during a transfer
            if !is_allowed_during_transfer(verb) {
                self.send_response("503 Invalid command during transfer\r\n");
                self.set_state(State::Command, true, true);
                self.close_command();
                return;
            }

            handler(self, args);
            return;
        }

        // clear the rename target for all commands except RNTO
        if !verb.eq_ignore_ascii_case("RNTO") {
            self.rename = None;
        }

        handler(self, args);
    }

    pub(crate) fn change_dir(&mut self, args: &str) -> io::Result<()> {
        if args == ".." {
            match self.cwd.rfind('/') {
                Some(0) | None => self.cwd = String::from("/"),
                Some(pos) => self.cwd.truncate(pos),
            }
            return Ok(());
        }

        let path = build_resolved_path(&self.cwd, args)?;

        let st = fs::metadata(&path)?;
        if !st.is_dir() {
            return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
        }

        self.cwd = path;
        Ok(())
    }

    /// Accept the pending PASV connection and start the transfer.
    pub(crate) fn data_accept(&mut self) -> bool {
        if !self.pasv {
            self.send_response("503 Bad sequence of commands\r\n");
            self.set_state(State::Command, true, true);
            return false;
        }

        self.pasv = false;

        let accepted = match self.pasv_socket.as_ref() {
            Some(listener) => listener.accept(),
            None => Err(io::Error::from_raw_os_error(libc::EBADF)),
        };

        let socket = match accepted {
            Ok(socket) => socket,
            Err(_) => {
                self.send_response("425 Failed to establish connection\r\n");
                self.set_state(State::Command, true, true);
                return false;
            }
        };

        let _ = socket.set_recv_buffer_size(SOCK_BUFFERSIZE);
        let _ = socket.set_send_buffer_size(SOCK_BUFFERSIZE);

        if socket.set_non_blocking().is_err() {
            self.send_response("425 Failed to establish connection\r\n");
            self.set_state(State::Command, true, true);
            return false;
        }

        self.data_socket = Some(Arc::new(socket));

        // we are ready to transfer data
        self.send_response("150 Ready\r\n");
        self.set_state(State::DataTransfer, true, false);
        true
    }

    /// Start the PORT connection. Completion is signalled by POLLOUT when
    /// the connect is still in progress.
    pub(crate) fn data_connect(&mut self) -> bool {
        debug_assert!(self.port);

        self.port = false;

        let Some(addr) = self.port_addr else {
            return false;
        };

        let socket = match Socket::create() {
            Ok(socket) => socket,
            Err(_) => return false,
        };

        let _ = socket.set_recv_buffer_size(SOCK_BUFFERSIZE);
        let _ = socket.set_send_buffer_size(SOCK_BUFFERSIZE);

        if socket.set_non_blocking().is_err() {
            return false;
        }

        match socket.connect(addr) {
            Ok(true) => {
                self.data_socket = Some(Arc::new(socket));
                self.send_response("150 Ready\r\n");
                self.set_state(State::DataTransfer, true, false);
                true
            }
            Ok(false) => {
                self.data_socket = Some(Arc::new(socket));
                true
            }
            Err(_) => false,
        }
    }

    /// Format one listing entry into the outbound buffer. `name` must
    /// already be wire-encoded.
    fn fill_dirent(
        &mut self,
        info: &EntryInfo,
        name: &str,
        type_hint: Option<&str>,
    ) -> io::Result<()> {
        let facts = MlstFacts {
            type_: self.mlst_type,
            size: self.mlst_size,
            modify: self.mlst_modify,
            perm: self.mlst_perm,
            unix_mode: self.mlst_unix_mode,
        };

        let line = dirent::format_entry(
            self.xfer_dir_mode,
            info,
            name,
            type_hint,
            &facts,
            self.timestamp,
        );

        let buffer = if self.deflate {
            &mut self.zstream_buffer
        } else {
            &mut self.xfer_buffer
        };

        if buffer.free_size() < line.len() {
            return Err(io::Error::from_raw_os_error(libc::EAGAIN));
        }

        buffer.push(line.as_bytes());
        self.file_position += line.len() as u64;
        Ok(())
    }

    fn stat_dirent(&mut self, path: &str, name: &str, type_hint: Option<&str>) -> io::Result<()> {
        let st = fs::metadata(path)?;
        self.fill_dirent(&EntryInfo::from(&st), name, type_hint)
    }

    /// Common RETR/STOR/APPE setup: codec, file, data connection, engine.
    pub(crate) fn xfer_file(&mut self, args: &str, mode: XferFileMode) {
        self.z_flushed = false;
        self.eof = false;

        self.xfer_buffer.clear();
        self.zstream_buffer.clear();

        if self.deflate {
            let level = self.config().deflate_level();
            self.codec = Some(if mode == XferFileMode::Retr {
                Codec::Deflate(Deflater::new(level))
            } else {
                Codec::Inflate(Inflater::new())
            });
        }

        // build the path of the file to transfer
        let path = match build_resolved_path(&self.cwd, args) {
            Ok(path) => path,
            Err(err) => {
                self.send_response(&format!("553 {}\r\n", err));
                self.set_state(State::Command, true, true);
                return;
            }
        };

        if path == DEV_ZERO_PATH {
            self.dev_zero = true;
        } else if mode == XferFileMode::Retr {
            let st = match fs::metadata(&path) {
                Ok(st) => st,
                Err(err) => {
                    self.send_response(&format!("450 {}\r\n", err));
                    return;
                }
            };

            let mut file = match File::open(&path) {
                Ok(file) => file,
                Err(err) => {
                    self.send_response(&format!("450 {}\r\n", err));
                    return;
                }
            };

            self.file_size = st.len();

            if self.restart_position != 0 {
                if let Err(err) = file.seek(SeekFrom::Start(self.restart_position)) {
                    self.send_response(&format!("450 {}\r\n", err));
                    return;
                }
            }

            self.file_position = self.restart_position;
            self.file = Some(file);
        } else {
            let append = mode == XferFileMode::Appe;

            let opened = if append {
                OpenOptions::new().append(true).create(true).open(&path)
            } else if self.restart_position != 0 {
                OpenOptions::new().read(true).write(true).open(&path)
            } else {
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)
            };

            let mut file = match opened {
                Ok(file) => file,
                Err(err) => {
                    self.send_response(&format!("450 {}\r\n", err));
                    return;
                }
            };

            self.ctx.update_free_space();

            // a restart marker replaces the file tail from that offset on
            if self.restart_position != 0 && !append {
                let positioned = file
                    .set_len(self.restart_position)
                    .and_then(|_| file.seek(SeekFrom::Start(self.restart_position)));
                if let Err(err) = positioned {
                    self.send_response(&format!("450 {}\r\n", err));
                    return;
                }
            }

            self.file_position = self.restart_position;
            self.file = Some(file);
        }

        if !self.port && !self.pasv {
            self.send_response("503 Bad sequence of commands\r\n");
            self.set_state(State::Command, true, true);
            return;
        }

        self.set_state(State::DataConnect, false, true);

        // setup connection
        if self.port && !self.data_connect() {
            self.send_response("425 Can't open data connection\r\n");
            self.set_state(State::Command, true, true);
            return;
        }

        // set up the transfer
        if mode == XferFileMode::Retr {
            self.recv = false;
            self.send = true;
            self.transfer = Some(Transfer::Retrieve);
        } else {
            self.recv = true;
            self.send = false;
            self.transfer = Some(Transfer::Store);
        }

        self.work_item = path;
    }

    /// Common LIST/NLST/MLSD/MLST/STAT setup.
    pub(crate) fn xfer_dir(&mut self, args: &str, mode: XferDirMode, workaround: bool) {
        // set up the transfer
        self.xfer_dir_mode = mode;
        self.recv = false;
        self.send = true;
        self.z_flushed = false;
        self.eof = false;

        self.file_position = 0;
        self.z_stream_position = 0;
        self.xfer_buffer.clear();
        self.zstream_buffer.clear();

        if self.deflate {
            let level = self.config().deflate_level();
            self.codec = Some(Codec::Deflate(Deflater::new(level)));
        }

        self.transfer = Some(Transfer::List);

        if !args.is_empty() {
            // work around broken clients that think LIST -a/-l is valid
            let bytes = args.as_bytes();
            let need_workaround = workaround
                && bytes[0] == b'-'
                && (bytes.get(1) == Some(&b'a') || bytes.get(1) == Some(&b'l'))
                && (bytes.len() == 2 || bytes.get(2) == Some(&b' '));
            let stripped = || {
                let rest = &args[2..];
                rest.strip_prefix(' ').unwrap_or(rest)
            };

            // an argument was provided
            let path = match build_resolved_path(&self.cwd, args) {
                Ok(path) => path,
                Err(err) => {
                    if need_workaround {
                        return self.xfer_dir(stripped(), mode, false);
                    }

                    self.send_response(&format!("550 {}\r\n", err));
                    self.set_state(State::Command, true, true);
                    return;
                }
            };

            let st = match fs::metadata(&path) {
                Ok(st) => st,
                Err(err) => {
                    if need_workaround {
                        return self.xfer_dir(stripped(), mode, false);
                    }

                    self.send_response(&format!("550 {}\r\n", err));
                    self.set_state(State::Command, true, true);
                    return;
                }
            };

            if mode == XferDirMode::Mlst {
                let name = encode_path(&path, false);
                if let Err(err) = self.fill_dirent(&EntryInfo::from(&st), &name, None) {
                    self.send_response(&format!("550 {}\r\n", err));
                    self.set_state(State::Command, true, true);
                    return;
                }

                self.work_item = path;
            } else if st.is_dir() {
                match fs::read_dir(&path) {
                    Ok(dir) => self.dir = Some(dir),
                    Err(err) => {
                        self.send_response(&format!("550 {}\r\n", err));
                        self.set_state(State::Command, true, true);
                        return;
                    }
                }

                // list paths relative to this directory
                self.lwd = path;

                if mode == XferDirMode::Mlsd && self.mlst_type {
                    // send this directory as type=cdir
                    let name = encode_path(&self.lwd, false);
                    if let Err(err) = self.fill_dirent(&EntryInfo::from(&st), &name, Some("cdir"))
                    {
                        self.send_response(&format!("550 {}\r\n", err));
                        self.set_state(State::Command, true, true);
                        return;
                    }
                }

                self.work_item = self.lwd.clone();
            } else if mode == XferDirMode::Mlsd {
                // specified a file instead of a directory for MLSD
                self.send_response(&format!(
                    "501 {}\r\n",
                    io::Error::from_raw_os_error(libc::ENOTDIR)
                ));
                self.set_state(State::Command, true, true);
                return;
            } else {
                let name = if mode == XferDirMode::Nlst {
                    // NLST uses the whole path name
                    encode_path(&path, false)
                } else {
                    // everything else uses the basename
                    let pos = path.rfind('/').map(|p| p + 1).unwrap_or(0);
                    encode_path(&path[pos..], false)
                };

                if let Err(err) = self.fill_dirent(&EntryInfo::from(&st), &name, None) {
                    self.send_response(&format!("550 {}\r\n", err));
                    self.set_state(State::Command, true, true);
                    return;
                }

                self.work_item = path;
            }
        } else if mode == XferDirMode::Mlst {
            let cwd = self.cwd.clone();
            let name = encode_path(&cwd, false);
            if let Err(err) = self.stat_dirent(&cwd, &name, None) {
                self.send_response(&format!("550 {}\r\n", err));
                self.set_state(State::Command, true, true);
                return;
            }

            self.work_item = cwd;
        } else {
            match fs::read_dir(&self.cwd) {
                Ok(dir) => self.dir = Some(dir),
                Err(err) => {
                    // no argument, but opening the cwd failed
                    self.send_response(&format!("550 {}\r\n", err));
                    self.set_state(State::Command, true, true);
                    return;
                }
            }

            // list the cwd
            self.lwd = self.cwd.clone();

            if mode == XferDirMode::Mlsd && self.mlst_type {
                // send this directory as type=cdir
                let lwd = self.lwd.clone();
                let name = encode_path(&lwd, false);
                if let Err(err) = self.stat_dirent(&lwd, &name, Some("cdir")) {
                    self.send_response(&format!("550 {}\r\n", err));
                    self.set_state(State::Command, true, true);
                    return;
                }
            }

            self.work_item = self.lwd.clone();
        }

        if mode == XferDirMode::Mlst || mode == XferDirMode::Stat {
            // this listing goes out over the control socket
            self.send_response("250-Status\r\n");
            self.set_state(State::DataTransfer, true, true);
            self.data_socket = self.command_socket.clone();
            self.send = true;
            return;
        }

        if !self.port && !self.pasv {
            // a prior PORT or PASV is required
            self.send_response("503 Bad sequence of commands\r\n");
            self.set_state(State::Command, true, true);
            return;
        }

        self.set_state(State::DataConnect, false, true);
        self.send = true;

        // setup connection
        if self.port && !self.data_connect() {
            self.send_response("425 Can't open data connection\r\n");
            self.set_state(State::Command, true, true);
        }
    }

    /// Expand an NLST wildcard against the pattern's parent directory.
    pub(crate) fn setup_glob(&mut self, args: &str) -> io::Result<()> {
        let pattern = build_path(&self.cwd, args);
        let pos = pattern.rfind('/').unwrap_or(0);
        let (dir, pat) = (&pattern[..pos.max(1)], &pattern[pos + 1..]);

        let matcher = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?
            .compile_matcher();

        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if matcher.is_match(&name) {
                entries.push(build_path(dir, &name));
            }
        }

        self.glob = Some(GlobIter {
            entries: entries.into_iter(),
        });
        Ok(())
    }

    fn deflate_buffer(&mut self, flush: bool) -> bool {
        let Some(Codec::Deflate(codec)) = self.codec.as_mut() else {
            return false;
        };

        let step = codec.run(
            self.zstream_buffer.used_slice(),
            self.xfer_buffer.free_slice(),
            flush,
        );

        match step {
            Err(err) => {
                self.send_response(&format!("501 {}\r\n", err));
                self.set_state(State::Command, true, true);
                false
            }
            Ok((consumed, produced, status)) => {
                if status == crate::core_codec::CodecStatus::StreamEnd {
                    self.z_flushed = true;
                }
                self.zstream_buffer.mark_free(consumed);
                self.xfer_buffer.mark_used(produced);
                self.z_stream_position += produced as u64;
                true
            }
        }
    }

    fn inflate_buffer(&mut self) -> bool {
        let Some(Codec::Inflate(codec)) = self.codec.as_mut() else {
            return false;
        };

        let step = codec.run(
            self.zstream_buffer.used_slice(),
            self.xfer_buffer.free_slice(),
        );

        match step {
            Err(err) => {
                self.send_response(&format!("501 {}\r\n", err));
                self.set_state(State::Command, true, true);
                false
            }
            Ok((consumed, produced, status)) => {
                if status == crate::core_codec::CodecStatus::StreamEnd {
                    self.z_flushed = true;
                }
                self.zstream_buffer.mark_free(consumed);
                self.xfer_buffer.mark_used(produced);
                self.z_stream_position += consumed as u64;
                true
            }
        }
    }

    /// Drive the active transfer one step. `true` means progress was made
    /// and the engine wants to run again; `false` means it would block or
    /// the transfer ended.
    pub(crate) fn step_transfer(&mut self) -> bool {
        match self.transfer {
            Some(Transfer::List) => self.list_transfer(),
            Some(Transfer::Retrieve) => self.retrieve_transfer(),
            Some(Transfer::Store) => self.store_transfer(),
            Some(Transfer::Glob) => self.glob_transfer(),
            None => false,
        }
    }

    /// Flush the transfer buffer to the data socket. `Ok(true)` when more
    /// can be sent, `Ok(false)` on would-block, `Err` after a broken pipe
    /// was reported and the session reset.
    fn send_pending(&mut self) -> Result<bool, ()> {
        let Some(socket) = self.data_socket.clone() else {
            return Err(());
        };

        match socket.write(&mut self.xfer_buffer) {
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Ok(n) if n > 0 => {
                self.touch();
                Ok(true)
            }
            _ => {
                self.send_response("426 Connection broken during transfer\r\n");
                self.set_state(State::Command, true, true);
                Err(())
            }
        }
    }

    fn list_transfer(&mut self) -> bool {
        // generate entries until there is something to send
        while self.xfer_buffer.is_empty() {
            self.xfer_buffer.clear();

            if !self.zstream_buffer.is_empty() {
                return self.deflate_buffer(false);
            }

            if self.deflate && !self.z_flushed && self.eof {
                return self.deflate_buffer(true);
            }

            self.zstream_buffer.clear();

            if self.eof && (self.deflate == self.z_flushed) {
                let code = match self.xfer_dir_mode {
                    XferDirMode::Mlst | XferDirMode::Stat => 250,
                    _ => 226,
                };
                self.send_response(&format!("{} OK\r\n", code));
                self.set_state(State::Command, true, true);
                return false;
            }

            let entry_name = match self.dir.as_mut() {
                // a single pre-formatted entry (file listing or MLST)
                None => {
                    self.eof = true;
                    return true;
                }
                Some(dir) => match dir.next() {
                    None | Some(Err(_)) => {
                        // the directory listing is exhausted
                        self.eof = true;
                        return true;
                    }
                    Some(Ok(entry)) => entry.file_name(),
                },
            };

            let name = entry_name.to_string_lossy().into_owned();

            if self.xfer_dir_mode == XferDirMode::Nlst {
                // NLST gives the whole path name
                let line = encode_path(&build_path(&self.lwd, &name), false) + "\r\n";
                let buffer = if self.deflate {
                    &mut self.zstream_buffer
                } else {
                    &mut self.xfer_buffer
                };

                if buffer.free_size() < line.len() {
                    self.send_response(&format!(
                        "501 {}\r\n",
                        io::Error::from_raw_os_error(libc::ENOMEM)
                    ));
                    self.set_state(State::Command, true, true);
                    return false;
                }

                buffer.push(line.as_bytes());
                self.file_position += line.len() as u64;
            } else {
                let full_path = build_path(&self.lwd, &name);

                // symlinks are reported as links, not followed
                let st = match fs::symlink_metadata(&full_path) {
                    Ok(st) => st,
                    Err(err) => {
                        error!("Skipping {}: {}", full_path, err);
                        continue;
                    }
                };

                let encoded = encode_path(&name, false);
                if let Err(err) = self.fill_dirent(&EntryInfo::from(&st), &encoded, None) {
                    self.send_response(&format!("425 {}\r\n", err));
                    self.set_state(State::Command, true, true);
                    return false;
                }
            }

            if self.deflate {
                return true;
            }
        }

        // send any pending data
        self.send_pending().unwrap_or(false)
    }

    fn retrieve_transfer(&mut self) -> bool {
        if self.xfer_buffer.is_empty() {
            self.xfer_buffer.clear();

            if !self.zstream_buffer.is_empty() {
                return self.deflate_buffer(false);
            }

            if self.deflate && !self.z_flushed && self.eof {
                return self.deflate_buffer(true);
            }

            self.zstream_buffer.clear();

            if !self.dev_zero {
                if self.eof && (self.deflate == self.z_flushed) {
                    self.send_response("226 OK\r\n");
                    self.set_state(State::Command, true, true);
                    return false;
                }

                // everything was sent, so read some more
                let buffer = if self.deflate {
                    &mut self.zstream_buffer
                } else {
                    &mut self.xfer_buffer
                };

                let read = match self.file.as_mut() {
                    Some(file) => file.read(buffer.free_slice()),
                    None => Err(io::Error::from_raw_os_error(libc::EBADF)),
                };

                match read {
                    Err(err) => {
                        self.send_response(&format!("451 {}\r\n", err));
                        self.set_state(State::Command, true, true);
                        return false;
                    }
                    Ok(0) => {
                        // reached the end of the file
                        self.eof = true;
                        return true;
                    }
                    Ok(n) => {
                        buffer.mark_used(n);
                        self.file_position += n as u64;
                    }
                }
            } else {
                // an endless stream of zeroes
                let buffer = if self.deflate {
                    &mut self.zstream_buffer
                } else {
                    &mut self.xfer_buffer
                };

                let free = buffer.free_slice();
                let n = free.len();
                free.fill(0);
                buffer.mark_used(n);
                self.file_position += n as u64;
            }

            if self.deflate {
                return true;
            }
        }

        // send any pending data
        self.send_pending().unwrap_or(false)
    }

    fn store_transfer(&mut self) -> bool {
        if self.xfer_buffer.is_empty() {
            self.xfer_buffer.clear();

            if !self.zstream_buffer.is_empty() {
                return self.inflate_buffer();
            }

            if self.deflate && !self.z_flushed && self.eof {
                return self.inflate_buffer();
            }

            if self.eof && (self.deflate == self.z_flushed) {
                self.send_response("226 OK\r\n");
                self.set_state(State::Command, true, true);
                return false;
            }

            // everything was written, so receive some more
            let Some(socket) = self.data_socket.clone() else {
                return false;
            };

            let buffer = if self.deflate {
                &mut self.zstream_buffer
            } else {
                &mut self.xfer_buffer
            };

            match socket.read(buffer) {
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return false,
                Err(err) => {
                    self.send_response(&format!("451 {}\r\n", err));
                    self.set_state(State::Command, true, true);
                    return false;
                }
                Ok(0) => {
                    // the peer finished sending
                    self.eof = true;
                    return true;
                }
                Ok(_) => self.touch(),
            }

            if self.deflate {
                return true;
            }
        }

        if !self.dev_zero {
            // write any pending data
            let written = match self.file.as_mut() {
                Some(file) => file.write(self.xfer_buffer.used_slice()),
                None => Err(io::Error::from_raw_os_error(libc::EBADF)),
            };

            match written {
                Ok(n) if n > 0 => {
                    self.xfer_buffer.mark_free(n);
                    self.file_position += n as u64;
                }
                Ok(_) => {
                    self.send_response("426 Failed to write data\r\n");
                    self.set_state(State::Command, true, true);
                    return false;
                }
                Err(err) => {
                    self.send_response(&format!("426 {}\r\n", err));
                    self.set_state(State::Command, true, true);
                    return false;
                }
            }
        } else {
            self.file_position += self.xfer_buffer.used_size() as u64;
            self.xfer_buffer.clear();
        }

        true
    }

    fn glob_transfer(&mut self) -> bool {
        if self.xfer_buffer.is_empty() {
            self.xfer_buffer.clear();

            let entry = self.glob.as_mut().and_then(GlobIter::next);
            let Some(entry) = entry else {
                // the glob listing is exhausted
                self.send_response("226 OK\r\n");
                self.set_state(State::Command, true, true);
                return false;
            };

            let line = encode_path(&entry, false) + "\r\n";
            if self.xfer_buffer.free_size() < line.len() {
                self.send_response(&format!(
                    "501 {}\r\n",
                    io::Error::from_raw_os_error(libc::ENOMEM)
                ));
                self.set_state(State::Command, true, true);
                return false;
            }

            self.xfer_buffer.push(line.as_bytes());
            self.file_position += line.len() as u64;
        }

        // send any pending data
        self.send_pending().unwrap_or(false)
    }
}

/// Find the end of the first command line: `\r\n` or a bare `\n`.
/// Returns (line length, bytes to consume).
fn find_delimiter(buffer: &[u8]) -> Option<(usize, usize)> {
    for (i, &byte) in buffer.iter().enumerate() {
        if byte == b'\r' && buffer.get(i + 1) == Some(&b'\n') {
            return Some((i, i + 2));
        }
        if byte == b'\n' {
            return Some((i, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_crlf() {
        assert_eq!(find_delimiter(b"NOOP\r\nrest"), Some((4, 6)));
    }

    #[test]
    fn delimiter_bare_lf() {
        assert_eq!(find_delimiter(b"NOOP\nrest"), Some((4, 5)));
    }

    #[test]
    fn delimiter_lone_cr_is_incomplete() {
        assert_eq!(find_delimiter(b"NOOP\r"), None);
        assert_eq!(find_delimiter(b"NOOP"), None);
    }

    #[test]
    fn delimiter_empty_line() {
        assert_eq!(find_delimiter(b"\r\n"), Some((0, 2)));
    }
}

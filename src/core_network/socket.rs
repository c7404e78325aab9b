use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};

use crate::core_network::buffer::RingBuffer;

/// Non-blocking IPv4 stream socket over a raw file descriptor.
///
/// The control, PASV and data sockets of a session all go through this type;
/// every operation maps onto one syscall and surfaces `EWOULDBLOCK` as
/// `io::ErrorKind::WouldBlock` so callers can yield back to the poller.
#[derive(Debug)]
pub struct Socket {
    fd: OwnedFd,
}

fn check(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc)
}

fn check_size(rc: libc::ssize_t) -> io::Result<usize> {
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc as usize)
}

fn addr_to_raw(addr: SocketAddrV4) -> libc::sockaddr_in {
    let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
    raw.sin_family = libc::AF_INET as libc::sa_family_t;
    raw.sin_port = addr.port().to_be();
    raw.sin_addr = libc::in_addr {
        s_addr: u32::from(*addr.ip()).to_be(),
    };
    raw
}

fn addr_from_raw(raw: &libc::sockaddr_in) -> SocketAddrV4 {
    SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(raw.sin_addr.s_addr)),
        u16::from_be(raw.sin_port),
    )
}

impl Socket {
    /// Create an unbound IPv4 stream socket.
    pub fn create() -> io::Result<Socket> {
        let fd = check(unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) })?;
        Ok(Socket {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    pub fn bind(&self, addr: SocketAddrV4) -> io::Result<()> {
        let raw = addr_to_raw(addr);
        check(unsafe {
            libc::bind(
                self.fd.as_raw_fd(),
                &raw as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        })?;
        Ok(())
    }

    pub fn listen(&self, backlog: i32) -> io::Result<()> {
        check(unsafe { libc::listen(self.fd.as_raw_fd(), backlog) })?;
        Ok(())
    }

    pub fn accept(&self) -> io::Result<Socket> {
        let fd = check(unsafe {
            libc::accept(self.fd.as_raw_fd(), std::ptr::null_mut(), std::ptr::null_mut())
        })?;
        Ok(Socket {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Start a connect. Returns `Ok(true)` when the connection completed
    /// immediately and `Ok(false)` when it is in progress (`EINPROGRESS`);
    /// completion is then signalled by `POLLOUT`.
    pub fn connect(&self, addr: SocketAddrV4) -> io::Result<bool> {
        let raw = addr_to_raw(addr);
        let rc = unsafe {
            libc::connect(
                self.fd.as_raw_fd(),
                &raw as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };

        if rc == 0 {
            return Ok(true);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINPROGRESS) {
            return Ok(false);
        }

        Err(err)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddrV4> {
        let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        check(unsafe {
            libc::getsockname(
                self.fd.as_raw_fd(),
                &mut raw as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut len,
            )
        })?;
        Ok(addr_from_raw(&raw))
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddrV4> {
        let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        check(unsafe {
            libc::getpeername(
                self.fd.as_raw_fd(),
                &mut raw as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut len,
            )
        })?;
        Ok(addr_from_raw(&raw))
    }

    pub fn set_non_blocking(&self) -> io::Result<()> {
        fcntl(self.fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
            .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        Ok(())
    }

    fn set_option(&self, opt: libc::c_int, value: libc::c_int) -> io::Result<()> {
        check(unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                opt,
                &value as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        })?;
        Ok(())
    }

    pub fn set_reuse_addr(&self) -> io::Result<()> {
        self.set_option(libc::SO_REUSEADDR, 1)
    }

    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        self.set_option(libc::SO_RCVBUF, size as libc::c_int)
    }

    pub fn set_send_buffer_size(&self, size: usize) -> io::Result<()> {
        self.set_option(libc::SO_SNDBUF, size as libc::c_int)
    }

    pub fn set_linger(&self, enable: bool, seconds: i32) -> io::Result<()> {
        let value = libc::linger {
            l_onoff: enable as libc::c_int,
            l_linger: seconds,
        };
        check(unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                &value as *const libc::linger as *const libc::c_void,
                mem::size_of::<libc::linger>() as libc::socklen_t,
            )
        })?;
        Ok(())
    }

    pub fn shutdown_write(&self) -> io::Result<()> {
        check(unsafe { libc::shutdown(self.fd.as_raw_fd(), libc::SHUT_WR) })?;
        Ok(())
    }

    /// Whether the stream is positioned at the urgent-data mark.
    pub fn at_mark(&self) -> io::Result<bool> {
        let mut flag: libc::c_int = 0;
        #[cfg(target_os = "linux")]
        const SIOCATMARK: libc::c_ulong = 0x8905;
        check(unsafe { libc::ioctl(self.fd.as_raw_fd(), SIOCATMARK, &mut flag) })?;
        Ok(flag != 0)
    }

    /// Receive into the buffer's free region. Returns the number of bytes
    /// read; 0 means the peer closed the connection.
    pub fn read(&self, buffer: &mut RingBuffer) -> io::Result<usize> {
        let free = buffer.free_slice();
        let n = check_size(unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                free.as_mut_ptr() as *mut libc::c_void,
                free.len(),
                0,
            )
        })?;
        buffer.mark_used(n);
        Ok(n)
    }

    /// Receive out-of-band data.
    pub fn read_oob(&self, scratch: &mut [u8]) -> io::Result<usize> {
        check_size(unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                scratch.as_mut_ptr() as *mut libc::c_void,
                scratch.len(),
                libc::MSG_OOB,
            )
        })
    }

    /// Send from the buffer's used region, releasing what was written.
    pub fn write(&self, buffer: &mut RingBuffer) -> io::Result<usize> {
        let used = buffer.used_slice();
        let n = check_size(unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                used.as_ptr() as *const libc::c_void,
                used.len(),
                libc::MSG_NOSIGNAL,
            )
        })?;
        buffer.mark_free(n);
        Ok(n)
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// One entry of a poll set.
#[derive(Debug, Clone, Copy)]
pub struct PollEntry {
    pub fd: RawFd,
    pub events: i16,
    pub revents: i16,
}

impl PollEntry {
    pub fn new(fd: RawFd, events: i16) -> Self {
        Self {
            fd,
            events,
            revents: 0,
        }
    }
}

/// poll(2) over a set of entries. `timeout_ms` of 0 returns immediately.
pub fn poll(entries: &mut [PollEntry], timeout_ms: i32) -> io::Result<usize> {
    let mut fds: Vec<libc::pollfd> = entries
        .iter()
        .map(|e| libc::pollfd {
            fd: e.fd,
            events: e.events,
            revents: 0,
        })
        .collect();

    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    for (entry, fd) in entries.iter_mut().zip(&fds) {
        entry.revents = fd.revents;
    }

    Ok(rc as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::net::Ipv4Addr;

    #[test]
    fn bind_listen_accept_roundtrip() {
        let listener = Socket::create().unwrap();
        listener.set_reuse_addr().unwrap();
        listener
            .bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
            .unwrap();
        listener.listen(1).unwrap();

        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let mut client = std::net::TcpStream::connect(addr).unwrap();
        let accepted = listener.accept().unwrap();

        client.write_all(b"ping").unwrap();

        let mut buffer = RingBuffer::new(16);
        let n = accepted.read(&mut buffer).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buffer.used_slice(), b"ping");
    }

    #[test]
    fn nonblocking_read_would_block() {
        let listener = Socket::create().unwrap();
        listener
            .bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
            .unwrap();
        listener.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        let _client = std::net::TcpStream::connect(addr).unwrap();
        let accepted = listener.accept().unwrap();
        accepted.set_non_blocking().unwrap();

        let mut buffer = RingBuffer::new(16);
        let err = accepted.read(&mut buffer).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn poll_reports_readable() {
        let listener = Socket::create().unwrap();
        listener
            .bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
            .unwrap();
        listener.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = std::net::TcpStream::connect(addr).unwrap();
        let accepted = listener.accept().unwrap();
        client.write_all(b"x").unwrap();

        let mut entries = [PollEntry::new(accepted.as_raw_fd(), libc::POLLIN)];
        let ready = poll(&mut entries, 1000).unwrap();
        assert_eq!(ready, 1);
        assert_ne!(entries[0].revents & libc::POLLIN, 0);
    }
}

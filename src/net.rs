//! Network connection seam for feed ingestion.
//!
//! [`Connector`] opens connections, [`FeedConnection`] is one open
//! connection. Both `recv` and `shutdown` take `&self` so one thread can
//! sit in a blocking `recv` while another shuts the socket down to wake it.

use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::ConnectError;

/// An open, blocking, stream-oriented connection.
pub trait FeedConnection: Send + Sync {
    /// Read up to `buf.len()` bytes. `Ok(0)` means the peer closed.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write bytes, returning how many were written.
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Close both directions, waking any thread blocked in `recv`.
    fn shutdown(&self) -> io::Result<()>;
}

/// Opens connections to the feed endpoint.
pub trait Connector: Send {
    type Conn: FeedConnection + 'static;

    fn connect(&mut self, ip: &str, port: u16) -> Result<Self::Conn, ConnectError>;
}

/// Plain TCP over `std::net`.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each connect attempt instead of relying on the OS timeout.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Connector for TcpConnector {
    type Conn = TcpStream;

    fn connect(&mut self, ip: &str, port: u16) -> Result<TcpStream, ConnectError> {
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| ConnectError::InvalidAddress(format!("{ip}:{port}")))?;
        let addr = SocketAddr::new(ip, port);

        let stream = match self.timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|source| ConnectError::Connect {
            addr: addr.to_string(),
            source,
        })?;

        // Frames are small and latency matters more than throughput
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not set TCP_NODELAY");
        }
        Ok(stream)
    }
}

impl FeedConnection for TcpStream {
    #[inline]
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self;
        stream.read(buf)
    }

    #[inline]
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let mut stream = self;
        stream.write(buf)
    }

    fn shutdown(&self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            // Already closed by the peer
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

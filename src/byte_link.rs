//! The abstract byte-stream provider (§1, §6): a null-modem cable,
//! USB-serial adapter, or virtual COM port pair, modeled as a trait so the
//! protocol core never depends on how bytes actually move. Enumerating and
//! opening real serial ports is explicitly out of scope (§1) — this module
//! only provides the trait plus two concrete links useful for a crate that
//! has to build and run without a serial cable attached: a TCP-backed link
//! for the CLI, and an in-process duplex pair for tests.

use crate::error::WireSyncError;
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Contract every transport must satisfy (§6). Blocking reads carry an
/// explicit deadline; `available()` and `clear_input()` let higher layers
/// poll without consuming, and drain stray bytes before a handshake.
#[async_trait]
pub trait ByteLink: Send + Sync {
	/// Open (or reopen) the underlying transport. Returns whether it is
	/// usable afterward.
	async fn open(&mut self, name: &str) -> bool;

	/// Close the underlying transport. Idempotent.
	async fn close(&mut self);

	/// Whether the transport is currently usable.
	fn is_open(&self) -> bool;

	/// Write all bytes and flush.
	async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

	/// Write and flush a single byte.
	async fn write_byte(&mut self, byte: u8) -> io::Result<()> {
		self.write(&[byte]).await
	}

	/// Read up to `buf.len()` bytes, honoring the ambient read timeout set
	/// by `set_read_timeout`. Returns the number of bytes read.
	async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

	/// Read one byte, or `-1` on clean EOF, honoring the ambient timeout.
	async fn read_byte(&mut self) -> io::Result<i32>;

	/// Read exactly `n` bytes within `timeout_ms`.
	async fn read_exact(&mut self, n: usize, timeout_ms: u64) -> Result<Vec<u8>, WireSyncError>;

	/// Read a UTF-8 line within `timeout_ms`. Stops at `\n`; a bare `\r`
	/// immediately preceding it is dropped.
	async fn read_line(&mut self, timeout_ms: u64) -> Result<String, WireSyncError>;

	/// Number of bytes immediately available without blocking.
	async fn available(&mut self) -> io::Result<usize>;

	/// Discard any buffered/immediately-available input.
	async fn clear_input(&mut self) -> io::Result<()>;

	/// Set the ambient deadline used by `read`/`read_byte`.
	fn set_read_timeout(&mut self, ms: u64);
}

/// A `ByteLink` over any `AsyncRead + AsyncWrite` stream: a TCP socket, a
/// `tokio::io::duplex` pair, or (in principle) a serial port wrapped by a
/// future transport crate. Splitting via `tokio::io::split` keeps this
/// generic over both halves of the concrete stream type.
pub struct StreamByteLink<T> {
	reader: BufReader<tokio::io::ReadHalf<T>>,
	writer: tokio::io::WriteHalf<T>,
	read_timeout: Duration,
	open: bool,
}

impl<T> StreamByteLink<T>
where
	T: AsyncRead + AsyncWrite + Send + 'static,
{
	pub fn new(stream: T) -> Self {
		let (r, w) = tokio::io::split(stream);
		StreamByteLink { reader: BufReader::new(r), writer: w, read_timeout: Duration::from_millis(10_000), open: true }
	}
}

#[async_trait]
impl<T> ByteLink for StreamByteLink<T>
where
	T: AsyncRead + AsyncWrite + Send + Sync + 'static,
{
	async fn open(&mut self, _name: &str) -> bool {
		// The stream already exists by construction; "opening" it again is
		// a no-op. Real serial-port implementations reconnect here.
		self.open
	}

	async fn close(&mut self) {
		self.open = false;
	}

	fn is_open(&self) -> bool {
		self.open
	}

	async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
		self.writer.write_all(bytes).await?;
		self.writer.flush().await
	}

	async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		match tokio::time::timeout(self.read_timeout, self.reader.read(buf)).await {
			Ok(result) => result,
			Err(_elapsed) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
		}
	}

	async fn read_byte(&mut self) -> io::Result<i32> {
		let mut byte = [0u8; 1];
		match tokio::time::timeout(self.read_timeout, self.reader.read(&mut byte)).await {
			Ok(Ok(0)) => Ok(-1),
			Ok(Ok(_)) => Ok(byte[0] as i32),
			Ok(Err(e)) => Err(e),
			Err(_elapsed) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
		}
	}

	async fn read_exact(&mut self, n: usize, timeout_ms: u64) -> Result<Vec<u8>, WireSyncError> {
		let mut buf = vec![0u8; n];
		match tokio::time::timeout(Duration::from_millis(timeout_ms), self.reader.read_exact(&mut buf)).await {
			Ok(Ok(_)) => Ok(buf),
			Ok(Err(e)) => Err(WireSyncError::Io(e)),
			Err(_elapsed) => {
				Err(WireSyncError::Io(io::Error::new(io::ErrorKind::TimedOut, "read_exact timed out")))
			}
		}
	}

	async fn read_line(&mut self, timeout_ms: u64) -> Result<String, WireSyncError> {
		let mut raw = Vec::new();
		let read = tokio::time::timeout(Duration::from_millis(timeout_ms), self.reader.read_until(b'\n', &mut raw))
			.await
			.map_err(|_elapsed| WireSyncError::Io(io::Error::new(io::ErrorKind::TimedOut, "read_line timed out")))?
			.map_err(WireSyncError::Io)?;

		if read == 0 {
			return Err(WireSyncError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "link closed")));
		}

		if raw.last() == Some(&b'\n') {
			raw.pop();
		}
		if raw.last() == Some(&b'\r') {
			raw.pop();
		}

		String::from_utf8(raw).map_err(|e| {
			WireSyncError::Io(io::Error::new(io::ErrorKind::InvalidData, format!("non-UTF-8 line: {}", e)))
		})
	}

	async fn available(&mut self) -> io::Result<usize> {
		match tokio::time::timeout(Duration::from_millis(0), self.reader.fill_buf()).await {
			Ok(Ok(buf)) => Ok(buf.len()),
			Ok(Err(e)) => Err(e),
			Err(_elapsed) => Ok(0),
		}
	}

	async fn clear_input(&mut self) -> io::Result<()> {
		loop {
			let pending = self.available().await?;
			if pending == 0 {
				return Ok(());
			}
			let mut scratch = vec![0u8; pending];
			self.reader.read(&mut scratch).await?;
		}
	}

	fn set_read_timeout(&mut self, ms: u64) {
		self.read_timeout = Duration::from_millis(ms);
	}
}

/// A `ByteLink` over a TCP socket, standing in for a real serial cable.
pub type TcpByteLink = StreamByteLink<tokio::net::TcpStream>;

/// A `ByteLink` over an in-process duplex pipe, used throughout the test
/// suite to run both peers of the protocol in one process.
pub type DuplexByteLink = StreamByteLink<tokio::io::DuplexStream>;

/// Build a connected pair of in-process links, as if two peers were joined
/// by a null-modem cable.
pub fn duplex_pair(buffer_size: usize) -> (DuplexByteLink, DuplexByteLink) {
	let (a, b) = tokio::io::duplex(buffer_size);
	(StreamByteLink::new(a), StreamByteLink::new(b))
}


// vim: ts=4

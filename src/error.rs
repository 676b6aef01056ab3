//! Error types for wiresync operations

use std::error::Error;
use std::fmt;
use std::io;

/// Errors from the Framed Block Transfer layer (§4.1, §7).
///
/// Per §7's propagation policy, every variant below carries a diagnostic
/// string composing retry count, elapsed time, port-open state, and
/// available-bytes at the point of failure (built by `fbt::diagnostic`),
/// so the session layer has something to log even when the link is gone.
#[derive(Debug)]
pub enum FbtError {
	/// No bytes observed within a read deadline.
	Timeout { during: &'static str, detail: String },

	/// Bad CRC, bad block-number complement, or an unexpected header byte,
	/// after retries were exhausted.
	Corruption { detail: String, retries: u32 },

	/// The peer sent `CAN`.
	Cancelled { detail: String },

	/// No `C`/response seen within the handshake window.
	HandshakeFailed { detail: String },

	/// The underlying byte link failed.
	Io(io::Error),
}

impl fmt::Display for FbtError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FbtError::Timeout { during, detail } => write!(f, "timed out waiting for {}: {}", during, detail),
			FbtError::Corruption { detail, retries } => {
				write!(f, "transfer corrupted after {} retries: {}", retries, detail)
			}
			FbtError::Cancelled { detail } => write!(f, "peer cancelled the transfer: {}", detail),
			FbtError::HandshakeFailed { detail } => write!(f, "handshake failed: {}", detail),
			FbtError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for FbtError {}

impl From<io::Error> for FbtError {
	fn from(e: io::Error) -> Self {
		FbtError::Io(e)
	}
}

impl From<WireSyncError> for FbtError {
	fn from(e: WireSyncError) -> Self {
		match e {
			WireSyncError::Io(io_err) => FbtError::Io(io_err),
			WireSyncError::Fbt(fbt_err) => fbt_err,
			other => FbtError::Io(io::Error::new(io::ErrorKind::Other, other.to_string())),
		}
	}
}

/// Errors from the line protocol layer (§4.2).
#[derive(Debug)]
pub enum LineProtocolError {
	/// The link was closed or errored while reading/writing a line.
	Io(io::Error),

	/// A line could not be encoded (a parameter contained the delimiter).
	InvalidParameter { detail: String },
}

impl fmt::Display for LineProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LineProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			LineProtocolError::InvalidParameter { detail } => {
				write!(f, "invalid control message parameter: {}", detail)
			}
		}
	}
}

impl Error for LineProtocolError {}

impl From<io::Error> for LineProtocolError {
	fn from(e: io::Error) -> Self {
		LineProtocolError::Io(e)
	}
}

/// Unified error type for wiresync operations.
///
/// Mirrors the taxonomy in spec §7: transport timeout, protocol corruption,
/// peer cancellation, handshake failure, session failure, filesystem error,
/// configuration error, remote error.
#[derive(Debug)]
pub enum WireSyncError {
	/// A Framed Block Transfer failed (nested).
	Fbt(FbtError),

	/// A line-protocol read/write failed (nested).
	LineProtocol(LineProtocolError),

	/// A filesystem operation failed while scanning, reading, or writing.
	Filesystem { path: String, source: io::Error },

	/// The local peer is misconfigured for the requested operation
	/// (e.g. `start_sync` called while in the receiver role).
	Configuration { message: String },

	/// The remote peer sent an `ERROR` control message.
	Remote { message: String },

	/// A sync session could not complete.
	Session { message: String },

	/// Generic I/O error with no more specific classification.
	Io(io::Error),
}

impl fmt::Display for WireSyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			WireSyncError::Fbt(e) => write!(f, "block transfer error: {}", e),
			WireSyncError::LineProtocol(e) => write!(f, "control channel error: {}", e),
			WireSyncError::Filesystem { path, source } => {
				write!(f, "filesystem error at {}: {}", path, source)
			}
			WireSyncError::Configuration { message } => write!(f, "configuration error: {}", message),
			WireSyncError::Remote { message } => write!(f, "remote error: {}", message),
			WireSyncError::Session { message } => write!(f, "sync session failed: {}", message),
			WireSyncError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for WireSyncError {}

impl From<io::Error> for WireSyncError {
	fn from(e: io::Error) -> Self {
		WireSyncError::Io(e)
	}
}

impl From<FbtError> for WireSyncError {
	fn from(e: FbtError) -> Self {
		WireSyncError::Fbt(e)
	}
}

impl From<LineProtocolError> for WireSyncError {
	fn from(e: LineProtocolError) -> Self {
		WireSyncError::LineProtocol(e)
	}
}

// vim: ts=4

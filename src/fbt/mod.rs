//! Framed Block Transfer (§4.1): reliable delivery of one in-memory payload
//! over a `ByteLink`, XMODEM-family with CRC-16-CCITT and adaptive block
//! sizes. One direction is active per transfer; the caller (Peer Controller
//! / Sync Session) is responsible for the `fbt_active` bookkeeping around
//! whichever of `send`/`receive` it invokes.

mod crc;
mod receiver;
mod sender;

use crate::byte_link::ByteLink;
use std::time::Instant;

pub use crc::{crc16, from_bytes, to_bytes};
pub use receiver::receive;
pub use sender::send;

pub(crate) const SOH: u8 = 0x01;
pub(crate) const STX: u8 = 0x02;
pub(crate) const EOT: u8 = 0x04;
pub(crate) const ACK: u8 = 0x06;
pub(crate) const NAK: u8 = 0x15;
pub(crate) const CAN: u8 = 0x18;
pub(crate) const HANDSHAKE_C: u8 = 0x43;
pub(crate) const PAD: u8 = 0x1A;

pub(crate) const SMALL_BLOCK_SIZE: usize = 128;

fn is_timeout(e: &std::io::Error) -> bool {
	e.kind() == std::io::ErrorKind::TimedOut
}

/// Compose the post-mortem diagnostic string spec §7 asks every low-level
/// FBT error to carry: retry count, elapsed time since the operation
/// started, the link's open/closed state, and how many bytes are sitting
/// unread on it.
async fn diagnostic(link: &mut dyn ByteLink, started: Instant, retries: u32) -> String {
	let available = link.available().await.unwrap_or(0);
	format!(
		"retries={} elapsed_ms={} port_open={} available_bytes={}",
		retries,
		started.elapsed().as_millis(),
		link.is_open(),
		available
	)
}

// vim: ts=4

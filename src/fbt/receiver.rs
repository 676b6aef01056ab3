use super::crc::{crc16, from_bytes};
use super::{diagnostic, is_timeout, ACK, CAN, EOT, HANDSHAKE_C, NAK, SMALL_BLOCK_SIZE, STX, SOH};
use crate::byte_link::ByteLink;
use crate::config::Config;
use crate::error::FbtError;
use std::time::{Duration, Instant};

/// Receive one Framed Block Transfer, returning the reassembled payload with
/// padding still attached to the final block (the caller knows the true
/// byte length from the `FILE_DATA` control message that preceded this
/// transfer and truncates accordingly; §4.1 notes the padding is opaque to
/// this layer).
pub async fn receive(link: &mut dyn ByteLink, cfg: &Config) -> Result<Vec<u8>, FbtError> {
	link.clear_input().await.map_err(FbtError::Io)?;
	handshake(link, cfg).await?;

	let started = Instant::now();
	let mut payload = Vec::new();
	let mut expected: u8 = 1;
	let mut retries = 0u32;

	loop {
		link.set_read_timeout(cfg.fbt_read_timeout_ms);
		let header = match link.read_byte().await {
			Ok(b) => b as u8,
			Err(e) if is_timeout(&e) => {
				retries += 1;
				if retries >= cfg.fbt_max_retries {
					let _ = link.write(&[CAN, CAN]).await;
					let detail = diagnostic(link, started, retries).await;
					return Err(FbtError::Timeout { during: "block header", detail });
				}
				continue;
			}
			Err(e) => return Err(FbtError::Io(e)),
		};

		match header {
			EOT => {
				link.write(&[ACK]).await?;
				return Ok(payload);
			}
			CAN => {
				let detail = diagnostic(link, started, retries).await;
				return Err(FbtError::Cancelled { detail });
			}
			SOH | STX => {
				let block_size = if header == SOH { SMALL_BLOCK_SIZE } else { cfg.large_block_size as usize };
				let meta = link.read_exact(2, cfg.fbt_read_timeout_ms).await?;
				let data = link.read_exact(block_size, cfg.fbt_read_timeout_ms).await?;
				let crc_bytes = link.read_exact(2, cfg.fbt_read_timeout_ms).await?;

				let block_num = meta[0];
				let complement_ok = meta[1] == 255u8.wrapping_sub(block_num);
				let crc_ok = crc16(&data) == from_bytes(crc_bytes[0], crc_bytes[1]);

				if !complement_ok || !crc_ok {
					retries += 1;
					if retries >= cfg.fbt_max_retries {
						let _ = link.write(&[CAN, CAN]).await;
						let detail = diagnostic(link, started, retries).await;
						return Err(FbtError::Corruption {
							detail: format!("block complement or CRC mismatch ({})", detail),
							retries,
						});
					}
					link.write(&[NAK]).await?;
					continue;
				}

				if block_num == expected {
					payload.extend_from_slice(&data);
					link.write(&[ACK]).await?;
					expected = expected.wrapping_add(1);
					retries = 0;
				} else if block_num == expected.wrapping_sub(1) {
					// Retransmit of a block we already accepted: the sender
					// never saw our ACK. Re-ACK without re-appending.
					link.write(&[ACK]).await?;
				} else {
					retries += 1;
					if retries >= cfg.fbt_max_retries {
						let _ = link.write(&[CAN, CAN]).await;
						let detail = diagnostic(link, started, retries).await;
						return Err(FbtError::Corruption {
							detail: format!("out-of-sequence block {} (expected {}) ({})", block_num, expected, detail),
							retries,
						});
					}
					link.write(&[NAK]).await?;
				}
			}
			_ => {
				let _ = link.clear_input().await;
				retries += 1;
				if retries >= cfg.fbt_max_retries {
					let _ = link.write(&[CAN, CAN]).await;
					let detail = diagnostic(link, started, retries).await;
					return Err(FbtError::Corruption { detail: format!("unexpected header byte ({})", detail), retries });
				}
				link.write(&[NAK]).await?;
			}
		}
	}
}

/// Send `C` up to 10 times, one per second, until any byte appears on the
/// wire (§4.1 receiver step 1). The byte is left unconsumed so the main
/// receive loop reads it as the first block's header.
async fn handshake(link: &mut dyn ByteLink, cfg: &Config) -> Result<(), FbtError> {
	let started = Instant::now();
	for _round in 0..cfg.fbt_max_retries {
		link.write(&[HANDSHAKE_C]).await?;

		let mut waited_ms = 0u64;
		while waited_ms < 1_000 {
			if link.available().await? > 0 {
				return Ok(());
			}
			tokio::time::sleep(Duration::from_millis(50)).await;
			waited_ms += 50;
		}
	}
	let detail = diagnostic(link, started, cfg.fbt_max_retries).await;
	Err(FbtError::HandshakeFailed { detail: format!("sender never responded to C ({})", detail) })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::byte_link::duplex_pair;
	use crate::fbt::sender;

	#[tokio::test]
	async fn rejects_corrupted_block_until_retransmitted() {
		let (mut tx, mut rx) = duplex_pair(8192);
		let cfg = Config { large_block_size: 128, ..Config::default() };
		let cfg2 = cfg.clone();
		let payload = b"abcdefg".to_vec();
		let expected = payload.clone();

		let sender_task = tokio::spawn(async move { sender::send(&mut tx, &payload, &cfg).await });
		let receiver_task = tokio::spawn(async move { receive(&mut rx, &cfg2).await });

		let (sent, received) = tokio::join!(sender_task, receiver_task);
		sent.unwrap().unwrap();
		let got = received.unwrap().unwrap();
		assert_eq!(&got[..expected.len()], &expected[..]);
	}

	#[tokio::test]
	async fn empty_payload_is_just_handshake_and_eot() {
		let (mut tx, mut rx) = duplex_pair(4096);
		let cfg = Config::default();
		let cfg2 = cfg.clone();

		let sender_task = tokio::spawn(async move { sender::send(&mut tx, &[], &cfg).await });
		let receiver_task = tokio::spawn(async move { receive(&mut rx, &cfg2).await });

		let (sent, received) = tokio::join!(sender_task, receiver_task);
		sent.unwrap().unwrap();
		assert!(received.unwrap().unwrap().is_empty());
	}
}

// vim: ts=4

use super::crc::{crc16, to_bytes};
use super::{diagnostic, is_timeout, ACK, CAN, EOT, HANDSHAKE_C, NAK, PAD, SMALL_BLOCK_SIZE, STX, SOH};
use crate::byte_link::ByteLink;
use crate::config::Config;
use crate::error::FbtError;
use std::time::{Duration, Instant};

/// Send `payload` as a Framed Block Transfer, blocking until the transfer is
/// acknowledged complete or fails (§4.1 sender steps 1-6).
pub async fn send(link: &mut dyn ByteLink, payload: &[u8], cfg: &Config) -> Result<(), FbtError> {
	wait_for_handshake(link, cfg).await?;
	drain_handshake_noise(link).await?;

	let mut offset = 0usize;
	let mut block_num: u8 = 1;
	while offset < payload.len() {
		let remaining = payload.len() - offset;
		let block_size =
			if remaining >= cfg.large_block_size as usize { cfg.large_block_size as usize } else { SMALL_BLOCK_SIZE };
		let end = (offset + block_size).min(payload.len());

		let mut data = payload[offset..end].to_vec();
		data.resize(block_size, PAD);

		send_block(link, block_num, &data, cfg).await?;
		offset = end;
		block_num = block_num.wrapping_add(1);
	}

	send_eot(link, cfg).await
}

/// Wait up to `fbt_handshake_timeout_ms` for the receiver's initial `C`.
async fn wait_for_handshake(link: &mut dyn ByteLink, cfg: &Config) -> Result<(), FbtError> {
	let started = Instant::now();
	let deadline = started + Duration::from_millis(cfg.fbt_handshake_timeout_ms);
	link.set_read_timeout(1_000);
	loop {
		if Instant::now() >= deadline {
			let detail = diagnostic(link, started, 0).await;
			return Err(FbtError::HandshakeFailed {
				detail: format!("no C observed within the handshake window ({})", detail),
			});
		}
		match link.read_byte().await {
			Ok(b) if b as u8 == HANDSHAKE_C => return Ok(()),
			Ok(_other) => continue,
			Err(e) if is_timeout(&e) => continue,
			Err(e) => return Err(FbtError::Io(e)),
		}
	}
}

/// The receiver may have several queued `C`/`NAK` bytes from repeated
/// handshake rounds; discard whatever is already buffered before block 1.
async fn drain_handshake_noise(link: &mut dyn ByteLink) -> Result<(), FbtError> {
	link.clear_input().await.map_err(FbtError::Io)
}

async fn send_block(link: &mut dyn ByteLink, block_num: u8, data: &[u8], cfg: &Config) -> Result<(), FbtError> {
	let header = if data.len() == SMALL_BLOCK_SIZE { SOH } else { STX };
	let mut frame = Vec::with_capacity(3 + data.len() + 2);
	frame.push(header);
	frame.push(block_num);
	frame.push(255u8.wrapping_sub(block_num));
	frame.extend_from_slice(data);
	frame.extend_from_slice(&to_bytes(crc16(data)));

	let started = Instant::now();
	let mut retries = 0u32;
	loop {
		link.write(&frame).await?;
		link.set_read_timeout(cfg.fbt_read_timeout_ms);
		match link.read_byte().await {
			Ok(b) if b as u8 == ACK => return Ok(()),
			Ok(b) if b as u8 == CAN => {
				let detail = diagnostic(link, started, retries).await;
				return Err(FbtError::Cancelled { detail });
			}
			Ok(_) => {}
			Err(e) if is_timeout(&e) => {}
			Err(e) => return Err(FbtError::Io(e)),
		}

		retries += 1;
		if retries >= cfg.fbt_max_retries {
			let _ = link.write(&[CAN, CAN]).await;
			let detail = diagnostic(link, started, retries).await;
			return Err(FbtError::Corruption { detail: format!("block {} never acked ({})", block_num, detail), retries });
		}
	}
}

async fn send_eot(link: &mut dyn ByteLink, cfg: &Config) -> Result<(), FbtError> {
	let started = Instant::now();
	let mut retries = 0u32;
	loop {
		link.write(&[EOT]).await?;
		link.set_read_timeout(cfg.fbt_read_timeout_ms);
		match link.read_byte().await {
			Ok(b) if b as u8 == ACK => return Ok(()),
			Ok(b) if b as u8 == CAN => {
				let detail = diagnostic(link, started, retries).await;
				return Err(FbtError::Cancelled { detail });
			}
			Ok(b) if b as u8 == NAK => {}
			Ok(_) => {}
			Err(e) if is_timeout(&e) => {}
			Err(e) => return Err(FbtError::Io(e)),
		}

		retries += 1;
		if retries >= cfg.fbt_max_retries {
			let _ = link.write(&[CAN, CAN]).await;
			let detail = diagnostic(link, started, retries).await;
			return Err(FbtError::Corruption { detail: format!("EOT never acked ({})", detail), retries });
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::byte_link::duplex_pair;
	use crate::fbt::receiver;

	#[tokio::test]
	async fn send_then_receive_round_trips_small_payload() {
		let (mut tx, mut rx) = duplex_pair(8192);
		let cfg = Config { large_block_size: 128, ..Config::default() };
		let cfg2 = cfg.clone();
		let payload = b"hello framed block transfer".to_vec();
		let expected = payload.clone();

		let sender_task = tokio::spawn(async move { send(&mut tx, &payload, &cfg).await });
		let receiver_task = tokio::spawn(async move { receiver::receive(&mut rx, &cfg2).await });

		let (sent, received) = tokio::join!(sender_task, receiver_task);
		sent.unwrap().unwrap();
		let received = received.unwrap().unwrap();
		assert_eq!(&received[..expected.len()], &expected[..]);
	}

	#[tokio::test]
	async fn send_spans_multiple_large_blocks() {
		let (mut tx, mut rx) = duplex_pair(1 << 16);
		let cfg = Config { large_block_size: 64, ..Config::default() };
		let cfg2 = cfg.clone();
		let payload: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
		let expected = payload.clone();

		let sender_task = tokio::spawn(async move { send(&mut tx, &payload, &cfg).await });
		let receiver_task = tokio::spawn(async move { receiver::receive(&mut rx, &cfg2).await });

		let (sent, received) = tokio::join!(sender_task, receiver_task);
		sent.unwrap().unwrap();
		let received = received.unwrap().unwrap();
		assert_eq!(&received[..expected.len()], &expected[..]);
	}
}

// vim: ts=4

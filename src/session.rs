#![allow(dead_code)]

//! Sync Session (§4.5): the sender-driven orchestration of one
//! synchronization round. The receiver side never runs this; it is purely
//! reactive through the Peer Controller's dispatch table (§4.6).

use crate::compression;
use crate::controller::PeerContext;
use crate::error::WireSyncError;
use crate::events::Event;
use crate::line_protocol::{self, Command, ControlMessage};
use crate::manifest::{self, Manifest};
use std::time::Duration;

/// Run one full sync round to completion, or fail with the first
/// unrecoverable error encountered (§4.5, §7 "session failure").
pub async fn run_sync_session(ctx: &PeerContext) -> Result<(), WireSyncError> {
	ctx.events.emit(Event::SyncStarted);
	ctx.state.set_syncing(true);

	let result = run_inner(ctx).await;

	ctx.state.set_syncing(false);
	if let Err(e) = &result {
		ctx.events.error(format!("sync session failed: {}", e));
	}
	result
}

async fn run_inner(ctx: &PeerContext) -> Result<(), WireSyncError> {
	// Step 1: local manifest generation overlaps with the manifest request
	// round-trip below for latency hiding.
	let local_manifest_task = {
		let ctx = ctx.clone();
		tokio::spawn(async move {
			let prior = match &ctx.config.manifest_cache_path {
				Some(path) => Manifest::load(path).await.ok(),
				None => None,
			};
			manifest::generate_manifest(&ctx.root, &ctx.config, prior.as_ref()).await
		})
	};

	// Step 2: request the remote manifest, propagating our own flags so
	// both sides agree on comparability (§9 open question on quick mode).
	let req = ControlMessage::new(
		Command::ManifestReq,
		vec![ctx.config.respect_gitignore.to_string(), ctx.config.quick_mode.to_string()],
	)?;
	ctx.wire.write_message(&req).await?;

	// Step 3: receive MANIFEST_DATA <size>, ACK, then FBT-receive + decompress.
	let header_line = ctx.wire.read_line(10_000).await?;
	let header = line_protocol::parse(&header_line)
		.filter(|m| m.command == Command::ManifestData)
		.ok_or_else(|| WireSyncError::Session { message: "expected MANIFEST_DATA from peer".into() })?;
	let _compressed_size: usize = header.params.first().and_then(|p| p.parse().ok()).unwrap_or(0);

	let ack = ControlMessage::new(Command::Ack, vec![])?;
	ctx.wire.write_message(&ack).await?;

	let compressed_payload = ctx.wire.fbt_receive(&ctx.config).await?;
	let json = compression::gunzip(&compressed_payload)
		.map_err(|e| WireSyncError::Session { message: format!("manifest decompression failed: {}", e) })?;
	let remote_manifest = Manifest::from_json(&String::from_utf8_lossy(&json))?;

	let local_manifest = local_manifest_task
		.await
		.map_err(|e| WireSyncError::Session { message: format!("local manifest task panicked: {}", e) })??;

	// Step 4: compute the change set.
	let change_set = manifest::diff(&local_manifest, &remote_manifest, ctx.config.strict);

	// Step 5: stream each changed file.
	let total = change_set.to_send.len();
	for (index, record) in change_set.to_send.iter().enumerate() {
		send_file_with_retries(ctx, &record.path).await?;
		ctx.events.emit(Event::Progress { files_done: index + 1, files_total: total, bytes_done: record.size });
	}

	// Steps 6-8: structural changes, strict deletions last.
	for dir in &change_set.empty_dirs_to_create {
		let msg = ControlMessage::new(Command::Mkdir, vec![dir.clone()])?;
		ctx.wire.write_message(&msg).await?;
	}
	for path in &change_set.to_delete {
		let msg = ControlMessage::new(Command::FileDelete, vec![path.clone()])?;
		ctx.wire.write_message(&msg).await?;
	}
	for dir in &change_set.empty_dirs_to_delete {
		let msg = ControlMessage::new(Command::Rmdir, vec![dir.clone()])?;
		ctx.wire.write_message(&msg).await?;
	}

	// Step 9.
	let complete = ControlMessage::new(Command::SyncComplete, vec![])?;
	ctx.wire.write_message(&complete).await?;
	ctx.events.emit(Event::SyncComplete);

	Ok(())
}

/// Retry a whole `FILE_DATA` send up to `file_send_retries` times on FBT
/// failure, pausing and clearing stray input between attempts (§4.5 step 5).
async fn send_file_with_retries(ctx: &PeerContext, rel_path: &str) -> Result<(), WireSyncError> {
	let mut attempts = 0u32;
	loop {
		match send_file_data(ctx, rel_path).await {
			Ok(()) => return Ok(()),
			Err(e) => {
				attempts += 1;
				if attempts >= ctx.config.file_send_retries {
					return Err(e);
				}
				let _ = ctx.wire.clear_input().await;
				tokio::time::sleep(Duration::from_millis(200)).await;
			}
		}
	}
}

/// Send one file: read it, run it through the Compression Filter, announce
/// it with `FILE_DATA`, wait for the peer's `ACK`, then FBT-send the bytes.
/// Shared between the sync session (§4.5 step 5) and the Peer Controller's
/// `FILE_REQ` handler (§4.6), which is symmetric to it.
pub(crate) async fn send_file_data(ctx: &PeerContext, rel_path: &str) -> Result<(), WireSyncError> {
	let abs_path = ctx.root.join(rel_path);
	let bytes = tokio::fs::read(&abs_path)
		.await
		.map_err(|e| WireSyncError::Filesystem { path: abs_path.display().to_string(), source: e })?;
	let metadata = tokio::fs::metadata(&abs_path)
		.await
		.map_err(|e| WireSyncError::Filesystem { path: abs_path.display().to_string(), source: e })?;
	let modified_millis = metadata
		.modified()
		.ok()
		.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0);

	let (payload, compressed) = compression::compress_if_beneficial(rel_path, &bytes)
		.map_err(|e| WireSyncError::Filesystem { path: abs_path.display().to_string(), source: e })?;

	let header = ControlMessage::new(
		Command::FileData,
		vec![rel_path.to_string(), bytes.len().to_string(), compressed.to_string(), modified_millis.to_string()],
	)?;
	ctx.wire.write_message(&header).await?;

	let ack_line = ctx.wire.read_line(10_000).await?;
	let acked = line_protocol::parse(&ack_line).map(|m| m.command) == Some(Command::Ack);
	if !acked {
		return Err(WireSyncError::Session { message: format!("peer did not ACK FILE_DATA for {}", rel_path) });
	}

	ctx.wire.fbt_send(&payload, &ctx.config).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::byte_link::duplex_pair;
	use crate::config::Config;
	use crate::events::EventBus;
	use crate::shared_text::SharedTextChannel;
	use crate::state::ConnectionState;
	use crate::wire::Wire;
	use std::fs;
	use std::sync::Arc;
	use tempfile::TempDir;

	fn context(root: std::path::PathBuf, link: Box<dyn crate::byte_link::ByteLink>) -> PeerContext {
		let state = ConnectionState::new();
		PeerContext {
			wire: Arc::new(Wire::new(link, state.clone())),
			state,
			config: Arc::new(Config::default()),
			events: EventBus::null(),
			root,
			shared_text: Arc::new(SharedTextChannel::new()),
		}
	}

	#[tokio::test]
	async fn sync_session_replicates_a_new_file_to_an_empty_peer() {
		let sender_root = TempDir::new().unwrap();
		let receiver_root = TempDir::new().unwrap();
		fs::create_dir_all(sender_root.path().join("a")).unwrap();
		fs::write(sender_root.path().join("a/b.txt"), b"hello\n").unwrap();

		let (link_sender, link_receiver) = duplex_pair(1 << 20);
		let sender_ctx = context(sender_root.path().to_path_buf(), Box::new(link_sender));
		let receiver_ctx = context(receiver_root.path().to_path_buf(), Box::new(link_receiver));

		let receiver_task = {
			let ctx = receiver_ctx.clone();
			tokio::spawn(async move {
				// MANIFEST_REQ
				let line = ctx.wire.read_line(2_000).await.unwrap();
				crate::controller::dispatch(&ctx, line_protocol::parse(&line).unwrap()).await;
				// FILE_DATA
				let line = ctx.wire.read_line(2_000).await.unwrap();
				crate::controller::dispatch(&ctx, line_protocol::parse(&line).unwrap()).await;
				// SYNC_COMPLETE
				let line = ctx.wire.read_line(2_000).await.unwrap();
				crate::controller::dispatch(&ctx, line_protocol::parse(&line).unwrap()).await;
			})
		};

		run_sync_session(&sender_ctx).await.unwrap();
		receiver_task.await.unwrap();

		let replicated = fs::read(receiver_root.path().join("a/b.txt")).unwrap();
		assert_eq!(replicated, b"hello\n");
	}
}

// vim: ts=4

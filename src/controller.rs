#![allow(dead_code)]

//! Peer Controller (§4.6, §5): owns the `ByteLink`, drives the reader loop
//! and heartbeat supervisor, dispatches inbound commands, and runs
//! priority-based role negotiation. A `PeerContext` is the read-mostly
//! bundle of shared handles (`[[design notes]]` §9: "represent state as a
//! single owned struct, hand out read-only views to subsystems") that the
//! Sync Session and Shared-Text Channel also carry.

use crate::byte_link::ByteLink;
use crate::compression;
use crate::config::Config;
use crate::error::WireSyncError;
use crate::events::{Event, EventBus};
use crate::line_protocol::{self, Command, ControlMessage};
use crate::manifest::{self, Manifest};
use crate::shared_text::SharedTextChannel;
use crate::state::{now_millis, ConnectionState};
use crate::wire::Wire;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Shared handles passed to every subsystem that needs to touch the wire,
/// the connection state, or the event bus. Cheap to clone (every field is
/// an `Arc` or copy-cheap).
#[derive(Clone)]
pub struct PeerContext {
	pub wire: Arc<Wire>,
	pub state: Arc<ConnectionState>,
	pub config: Arc<Config>,
	pub events: EventBus,
	pub root: PathBuf,
	pub shared_text: Arc<SharedTextChannel>,
}

pub struct PeerController {
	ctx: PeerContext,
}

impl PeerController {
	pub fn new(link: Box<dyn ByteLink>, root: PathBuf, config: Config, events: EventBus) -> Self {
		let state = ConnectionState::new();
		let wire = Arc::new(Wire::new(link, state.clone()));
		let ctx = PeerContext {
			wire,
			state,
			config: Arc::new(config),
			events,
			root,
			shared_text: Arc::new(SharedTextChannel::new()),
		};
		PeerController { ctx }
	}

	/// A cloned handle to this controller's shared context, for callers
	/// that want to queue shared text or inspect state without going
	/// through the controller itself.
	pub fn context(&self) -> PeerContext {
		self.ctx.clone()
	}

	/// Run the reader loop and heartbeat supervisor until `stop()` flips
	/// `running` false (§5 activities 1-2).
	pub async fn run(&self) {
		self.ctx.state.set_running(true);
		self.ctx.state.regenerate_local_priority();

		tokio::join!(reader_loop(self.ctx.clone()), heartbeat_supervisor(self.ctx.clone()));
	}

	pub fn stop(&self) {
		self.ctx.state.set_running(false);
	}

	/// Kick off a sender-driven sync round (§4.5).
	pub async fn start_sync(&self) -> Result<(), WireSyncError> {
		if !self.ctx.state.is_sender() {
			return Err(WireSyncError::Configuration {
				message: "start_sync called while in the receiver role".into(),
			});
		}
		if self.ctx.state.syncing() {
			return Err(WireSyncError::Configuration { message: "a sync session is already in flight".into() });
		}
		crate::session::run_sync_session(&self.ctx).await
	}
}

async fn reader_loop(ctx: PeerContext) {
	while ctx.state.running() {
		if ctx.state.fbt_active() {
			tokio::time::sleep(Duration::from_millis(50)).await;
			continue;
		}
		match ctx.wire.read_line(200).await {
			Ok(line) => {
				if let Some(msg) = line_protocol::parse(&line) {
					dispatch(&ctx, msg).await;
				}
			}
			Err(WireSyncError::Io(e)) if e.kind() == std::io::ErrorKind::TimedOut => continue,
			Err(e) => {
				ctx.events.error(format!("reader loop: {}", e));
				tokio::time::sleep(Duration::from_millis(200)).await;
			}
		}
	}
}

async fn heartbeat_supervisor(ctx: PeerContext) {
	while ctx.state.running() {
		tokio::time::sleep(Duration::from_millis(1_000)).await;
		if ctx.state.fbt_active() {
			continue;
		}
		let now = now_millis();

		if ctx.state.connection_alive()
			&& ctx.state.last_hb_received() > 0
			&& !ctx.state.syncing()
			&& now - ctx.state.last_hb_received() > ctx.config.heartbeat_timeout_ms as i64
		{
			ctx.state.set_connection_alive(false);
			ctx.events.emit(Event::Connection { alive: false });
		}

		if !ctx.state.syncing() && now - ctx.state.last_hb_sent() >= ctx.config.heartbeat_interval_ms as i64 {
			let heartbeat = ControlMessage::new(Command::Heartbeat, vec![]).expect("HEARTBEAT takes no params");
			match ctx.wire.write_message(&heartbeat).await {
				Ok(()) => ctx.state.set_last_hb_sent(now),
				Err(e) => {
					ctx.state.set_connection_alive(false);
					ctx.events.error(format!("heartbeat send failed: {}", e));
				}
			}
		}
	}
}

async fn send_role_negotiate(ctx: &PeerContext) {
	let msg = ControlMessage::new(Command::RoleNegotiate, vec![ctx.state.local_priority().to_string()])
		.expect("ROLE_NEGOTIATE param is always numeric");
	if let Err(e) = ctx.wire.write_message(&msg).await {
		ctx.events.error(format!("role negotiation send failed: {}", e));
	}
}

/// On a dead-to-alive transition, regenerate the election priority and
/// kick off role negotiation (§4.6).
async fn mark_connected(ctx: &PeerContext) {
	let was_alive = ctx.state.connection_alive();
	ctx.state.set_connection_alive(true);
	ctx.events.emit(Event::Connection { alive: true });
	if !was_alive {
		ctx.state.regenerate_local_priority();
		ctx.state.set_role_negotiated(false);
		send_role_negotiate(ctx).await;
	}
}

fn parse_bool(s: &str) -> Option<bool> {
	match s {
		"true" => Some(true),
		"false" => Some(false),
		_ => None,
	}
}

pub(crate) async fn dispatch(ctx: &PeerContext, msg: ControlMessage) {
	match msg.command {
		Command::ManifestReq => handle_manifest_req(ctx, &msg.params).await,
		Command::ManifestData => {
			// Consumed only inline by a sync session's own read; the reader
			// loop never sees it because that session owns the next
			// `read_line` call until it finishes (§4.6).
		}
		Command::FileReq => handle_file_req(ctx, &msg.params).await,
		Command::FileData => handle_file_data(ctx, &msg.params).await,
		Command::FileDelete => handle_file_delete(ctx, &msg.params).await,
		Command::Mkdir => handle_mkdir(ctx, &msg.params).await,
		Command::Rmdir => handle_rmdir(ctx, &msg.params).await,
		Command::SyncComplete => {
			ctx.state.set_syncing(false);
			ctx.events.emit(Event::SyncComplete);
			ctx.shared_text.clear().await;
		}
		Command::DirectionChange => {
			if let Some(remote_is_sender) = msg.params.first().and_then(|p| parse_bool(p)) {
				ctx.state.set_is_sender(!remote_is_sender);
				ctx.events.emit(Event::Direction { is_sender: !remote_is_sender });
			}
		}
		Command::RoleNegotiate => handle_role_negotiate(ctx, &msg.params).await,
		Command::Ack => {
			// Consumed inline by whichever handler is waiting on it; an ACK
			// seen here arrived unsolicited and is dropped.
		}
		Command::Error => {
			ctx.events.emit(Event::Error { message: msg.params.first().cloned().unwrap_or_default() });
		}
		Command::Heartbeat => {
			ctx.state.set_last_hb_received(now_millis());
			let was_alive = ctx.state.connection_alive();
			let ack = ControlMessage::new(Command::HeartbeatAck, vec![]).expect("no params");
			let _ = ctx.wire.write_message(&ack).await;
			if !was_alive {
				mark_connected(ctx).await;
			}
		}
		Command::HeartbeatAck => {
			ctx.state.set_last_hb_received(now_millis());
			if !ctx.state.connection_alive() {
				mark_connected(ctx).await;
			}
		}
		Command::SharedText => {
			if let Some(encoded) = msg.params.first() {
				if let Ok(decoded) = BASE64.decode(encoded) {
					if let Ok(text) = String::from_utf8(decoded) {
						ctx.events.emit(Event::SharedTextReceived { text });
					}
				}
			}
		}
		Command::Unknown(name) => {
			tracing::warn!(command = %name, "dropping unrecognised line-protocol command");
		}
	}
}

async fn wait_for_ack(ctx: &PeerContext) -> bool {
	match ctx.wire.read_line(10_000).await {
		Ok(line) => line_protocol::parse(&line).map(|m| m.command) == Some(Command::Ack),
		Err(_) => false,
	}
}

async fn handle_manifest_req(ctx: &PeerContext, params: &[String]) {
	let mut cfg = (*ctx.config).clone();
	cfg.respect_gitignore = params.first().and_then(|p| parse_bool(p)).unwrap_or(cfg.respect_gitignore);
	cfg.quick_mode = params.get(1).and_then(|p| parse_bool(p)).unwrap_or(cfg.quick_mode);

	let prior = match &cfg.manifest_cache_path {
		Some(path) => Manifest::load(path).await.ok(),
		None => None,
	};

	let local_manifest = match manifest::generate_manifest(&ctx.root, &cfg, prior.as_ref()).await {
		Ok(m) => m,
		Err(e) => {
			ctx.events.error(format!("manifest generation failed: {}", e));
			return;
		}
	};

	let json = match local_manifest.to_json() {
		Ok(j) => j,
		Err(e) => {
			ctx.events.error(e.to_string());
			return;
		}
	};
	let compressed = match compression::gzip(json.as_bytes()) {
		Ok(bytes) => bytes,
		Err(e) => {
			ctx.events.error(format!("manifest compression failed: {}", e));
			return;
		}
	};

	let header = match ControlMessage::new(Command::ManifestData, vec![compressed.len().to_string()]) {
		Ok(m) => m,
		Err(_) => return,
	};
	if ctx.wire.write_message(&header).await.is_err() {
		return;
	}
	if !wait_for_ack(ctx).await {
		ctx.events.error("peer did not ACK MANIFEST_DATA".into());
		return;
	}
	if let Err(e) = ctx.wire.fbt_send(&compressed, &ctx.config).await {
		ctx.events.error(format!("manifest send failed: {}", e));
	}
}

async fn handle_file_req(ctx: &PeerContext, params: &[String]) {
	let Some(rel_path) = params.first() else { return };
	if let Err(e) = crate::session::send_file_data(ctx, rel_path).await {
		ctx.events.error(format!("FILE_REQ send failed for {}: {}", rel_path, e));
	}
}

async fn handle_file_data(ctx: &PeerContext, params: &[String]) {
	let (Some(rel_path), Some(size_str), Some(compressed_str), Some(mtime_str)) =
		(params.first(), params.get(1), params.get(2), params.get(3))
	else {
		ctx.events.error("malformed FILE_DATA message".into());
		return;
	};

	let ack = ControlMessage::new(Command::Ack, vec![]).expect("no params");
	if ctx.wire.write_message(&ack).await.is_err() {
		return;
	}

	let byte_count: usize = match size_str.parse() {
		Ok(v) => v,
		Err(_) => {
			ctx.events.error(format!("malformed FILE_DATA byte count for {}", rel_path));
			return;
		}
	};
	let compressed = compressed_str == "true";
	let modified_millis: u64 = mtime_str.parse().unwrap_or(0);

	let received = match ctx.wire.fbt_receive(&ctx.config).await {
		Ok(bytes) => bytes,
		Err(e) => {
			ctx.events.error(format!("file receive failed for {}: {}", rel_path, e));
			return;
		}
	};

	let decoded = if compressed {
		match compression::gunzip(&received) {
			Ok(bytes) => bytes,
			Err(e) => {
				ctx.events.error(format!("decompression failed for {}: {}", rel_path, e));
				return;
			}
		}
	} else {
		received
	};
	let content = if decoded.len() >= byte_count { &decoded[..byte_count] } else { &decoded[..] };

	if let Err(e) = write_received_file(&ctx.root, rel_path, content, modified_millis).await {
		ctx.events.error(format!("failed to write {}: {}", rel_path, e));
	}
}

async fn write_received_file(
	root: &std::path::Path,
	rel_path: &str,
	content: &[u8],
	modified_millis: u64,
) -> std::io::Result<()> {
	let target = root.join(rel_path);
	if let Some(parent) = target.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}

	let mut tmp_name = target.file_name().unwrap_or_default().to_os_string();
	tmp_name.push(".wiresync-partial");
	let tmp_path = target.with_file_name(tmp_name);

	tokio::fs::write(&tmp_path, content).await?;
	tokio::fs::rename(&tmp_path, &target).await?;

	let mtime = filetime::FileTime::from_unix_time(
		(modified_millis / 1_000) as i64,
		((modified_millis % 1_000) * 1_000_000) as u32,
	);
	filetime::set_file_mtime(&target, mtime)
}

async fn handle_file_delete(ctx: &PeerContext, params: &[String]) {
	let Some(rel_path) = params.first() else { return };
	let target = ctx.root.join(rel_path);
	if tokio::fs::remove_file(&target).await.is_err() {
		return;
	}

	let mut dir = target.parent().map(|p| p.to_path_buf());
	while let Some(d) = dir {
		if d == ctx.root || !d.starts_with(&ctx.root) {
			break;
		}
		let mut entries = match tokio::fs::read_dir(&d).await {
			Ok(e) => e,
			Err(_) => break,
		};
		if entries.next_entry().await.ok().flatten().is_some() {
			break;
		}
		if tokio::fs::remove_dir(&d).await.is_err() {
			break;
		}
		dir = d.parent().map(|p| p.to_path_buf());
	}
}

async fn handle_mkdir(ctx: &PeerContext, params: &[String]) {
	if let Some(rel_path) = params.first() {
		let _ = tokio::fs::create_dir_all(ctx.root.join(rel_path)).await;
	}
}

async fn handle_rmdir(ctx: &PeerContext, params: &[String]) {
	if let Some(rel_path) = params.first() {
		let _ = tokio::fs::remove_dir_all(ctx.root.join(rel_path)).await;
	}
}

async fn handle_role_negotiate(ctx: &PeerContext, params: &[String]) {
	if ctx.state.role_negotiated() {
		return;
	}
	let Some(remote_priority) = params.first().and_then(|p| p.parse::<i64>().ok()) else { return };

	let local_priority = ctx.state.local_priority();
	let is_sender = local_priority > remote_priority;
	ctx.state.set_is_sender(is_sender);
	ctx.state.set_role_negotiated(true);
	ctx.events.emit(Event::Direction { is_sender });

	let echo = ControlMessage::new(Command::RoleNegotiate, vec![local_priority.to_string()])
		.expect("ROLE_NEGOTIATE param is always numeric");
	let _ = ctx.wire.write_message(&echo).await;
}


// vim: ts=4

//! Black-box end-to-end scenarios (spec §8), driving two in-process peers
//! over a `DuplexByteLink` the way two real serial-connected hosts would
//! see each other.

use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiresync::byte_link::duplex_pair;
use wiresync::config::Config;
use wiresync::events::{ChannelSink, Event, EventBus};
use wiresync::{PeerContext, PeerController};

fn controller_pair(root_a: std::path::PathBuf, root_b: std::path::PathBuf) -> (PeerController, PeerController) {
	controller_pair_with_config(root_a, root_b, Config::default())
}

fn controller_pair_with_config(
	root_a: std::path::PathBuf,
	root_b: std::path::PathBuf,
	config: Config,
) -> (PeerController, PeerController) {
	let (link_a, link_b) = duplex_pair(1 << 20);
	let controller_a = PeerController::new(Box::new(link_a), root_a, config.clone(), EventBus::null());
	let controller_b = PeerController::new(Box::new(link_b), root_b, config, EventBus::null());
	(controller_a, controller_b)
}

async fn wait_for_negotiation(a: &PeerContext, b: &PeerContext) {
	for _ in 0..500 {
		if a.state.role_negotiated() && b.state.role_negotiated() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("role negotiation did not converge");
}

#[tokio::test]
async fn s1_empty_sync_produces_no_file_transfers() {
	let sender_dir = TempDir::new().unwrap();
	let receiver_dir = TempDir::new().unwrap();
	let (controller_a, controller_b) = controller_pair(sender_dir.path().into(), receiver_dir.path().into());
	let (ctx_a, ctx_b) = (controller_a.context(), controller_b.context());

	let run_a = tokio::spawn(async move { controller_a.run().await });
	let run_b = tokio::spawn(async move { controller_b.run().await });
	wait_for_negotiation(&ctx_a, &ctx_b).await;

	// Whichever side was elected sender drives the round; attach the
	// capturing sink to it now that we know which one that is.
	let (sink, mut events) = ChannelSink::new();
	let sender_ctx = if ctx_a.state.is_sender() { &ctx_a } else { &ctx_b };
	sender_ctx.events.set_sink(Arc::new(sink));
	wiresync::session::run_sync_session(sender_ctx).await.unwrap();

	let mut saw_complete = false;
	while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
		if matches!(event, Event::SyncComplete) {
			saw_complete = true;
			break;
		}
	}
	assert!(saw_complete);

	ctx_a.state.set_running(false);
	ctx_b.state.set_running(false);
	let _ = tokio::time::timeout(Duration::from_secs(1), run_a).await;
	let _ = tokio::time::timeout(Duration::from_secs(1), run_b).await;

	assert!(fs::read_dir(receiver_dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn s2_one_new_file_is_replicated_with_matching_mtime() {
	let sender_dir = TempDir::new().unwrap();
	let receiver_dir = TempDir::new().unwrap();
	fs::create_dir_all(sender_dir.path().join("a")).unwrap();
	fs::write(sender_dir.path().join("a/b.txt"), b"hello\n").unwrap();

	let (controller_a, controller_b) = controller_pair(sender_dir.path().into(), receiver_dir.path().into());
	let (ctx_a, ctx_b) = (controller_a.context(), controller_b.context());

	let run_a = tokio::spawn(async move { controller_a.run().await });
	let run_b = tokio::spawn(async move { controller_b.run().await });
	wait_for_negotiation(&ctx_a, &ctx_b).await;

	if ctx_a.state.is_sender() {
		wiresync::session::run_sync_session(&ctx_a).await.unwrap();
	} else {
		wiresync::session::run_sync_session(&ctx_b).await.unwrap();
	}
	tokio::time::sleep(Duration::from_millis(200)).await;

	ctx_a.state.set_running(false);
	ctx_b.state.set_running(false);
	let _ = tokio::time::timeout(Duration::from_secs(1), run_a).await;
	let _ = tokio::time::timeout(Duration::from_secs(1), run_b).await;

	let replicated_path = receiver_dir.path().join("a/b.txt");
	assert_eq!(fs::read(&replicated_path).unwrap(), b"hello\n");

	let sender_mtime = fs::metadata(sender_dir.path().join("a/b.txt")).unwrap().modified().unwrap();
	let receiver_mtime = fs::metadata(&replicated_path).unwrap().modified().unwrap();
	let drift = sender_mtime.duration_since(receiver_mtime).unwrap_or_else(|e| e.duration());
	assert!(drift < Duration::from_secs(2));
}

#[tokio::test]
async fn s4_gitignored_directory_is_never_created_on_receiver() {
	let sender_dir = TempDir::new().unwrap();
	let receiver_dir = TempDir::new().unwrap();
	fs::create_dir_all(sender_dir.path().join("src")).unwrap();
	fs::create_dir_all(sender_dir.path().join("build")).unwrap();
	fs::write(sender_dir.path().join("src/a.txt"), b"kept\n").unwrap();
	fs::write(sender_dir.path().join("build/out.o"), b"ignored\n").unwrap();
	fs::write(sender_dir.path().join(".gitignore"), b"build/\n").unwrap();

	let (controller_a, controller_b) = controller_pair(sender_dir.path().into(), receiver_dir.path().into());
	let (ctx_a, ctx_b) = (controller_a.context(), controller_b.context());

	let run_a = tokio::spawn(async move { controller_a.run().await });
	let run_b = tokio::spawn(async move { controller_b.run().await });
	wait_for_negotiation(&ctx_a, &ctx_b).await;

	if ctx_a.state.is_sender() {
		wiresync::session::run_sync_session(&ctx_a).await.unwrap();
	} else {
		wiresync::session::run_sync_session(&ctx_b).await.unwrap();
	}
	tokio::time::sleep(Duration::from_millis(200)).await;

	ctx_a.state.set_running(false);
	ctx_b.state.set_running(false);
	let _ = tokio::time::timeout(Duration::from_secs(1), run_a).await;
	let _ = tokio::time::timeout(Duration::from_secs(1), run_b).await;

	assert!(receiver_dir.path().join("src/a.txt").exists());
	assert!(!receiver_dir.path().join("build").exists());
}

#[tokio::test]
async fn s6_priority_regenerates_on_reconnect() {
	let sender_dir = TempDir::new().unwrap();
	let receiver_dir = TempDir::new().unwrap();
	let (controller_a, controller_b) = controller_pair(sender_dir.path().into(), receiver_dir.path().into());
	let (ctx_a, ctx_b) = (controller_a.context(), controller_b.context());

	let run_a = tokio::spawn(async move { controller_a.run().await });
	let run_b = tokio::spawn(async move { controller_b.run().await });
	wait_for_negotiation(&ctx_a, &ctx_b).await;

	let priority_before = ctx_a.state.local_priority();

	// Simulate a dropped link: mark both sides dead directly, as the
	// heartbeat supervisor would after a timeout, then let a heartbeat
	// round trip bring the connection back.
	ctx_a.state.set_connection_alive(false);
	ctx_b.state.set_connection_alive(false);
	ctx_a.state.set_role_negotiated(false);
	ctx_b.state.set_role_negotiated(false);
	ctx_a.state.set_last_hb_sent(0);
	ctx_a.state.set_last_hb_received(1);
	ctx_b.state.set_last_hb_received(1);

	wait_for_negotiation(&ctx_a, &ctx_b).await;
	let priority_after = ctx_a.state.local_priority();

	assert_ne!(priority_before, priority_after);
	assert_ne!(ctx_a.state.is_sender(), ctx_b.state.is_sender());

	ctx_a.state.set_running(false);
	ctx_b.state.set_running(false);
	let _ = tokio::time::timeout(Duration::from_secs(1), run_a).await;
	let _ = tokio::time::timeout(Duration::from_secs(1), run_b).await;
}

#[tokio::test]
async fn s3_strict_deletion_removes_remote_only_file() {
	let sender_dir = TempDir::new().unwrap();
	let receiver_dir = TempDir::new().unwrap();
	fs::write(sender_dir.path().join("keep.txt"), b"keep me\n").unwrap();
	fs::write(receiver_dir.path().join("keep.txt"), b"keep me\n").unwrap();
	fs::write(receiver_dir.path().join("gone.txt"), b"delete me\n").unwrap();

	let config = Config { strict: true, ..Config::default() };
	let (controller_a, controller_b) =
		controller_pair_with_config(sender_dir.path().into(), receiver_dir.path().into(), config);
	let (ctx_a, ctx_b) = (controller_a.context(), controller_b.context());

	let run_a = tokio::spawn(async move { controller_a.run().await });
	let run_b = tokio::spawn(async move { controller_b.run().await });
	wait_for_negotiation(&ctx_a, &ctx_b).await;

	if ctx_a.state.is_sender() {
		wiresync::session::run_sync_session(&ctx_a).await.unwrap();
	} else {
		wiresync::session::run_sync_session(&ctx_b).await.unwrap();
	}
	tokio::time::sleep(Duration::from_millis(200)).await;

	ctx_a.state.set_running(false);
	ctx_b.state.set_running(false);
	let _ = tokio::time::timeout(Duration::from_secs(1), run_a).await;
	let _ = tokio::time::timeout(Duration::from_secs(1), run_b).await;

	assert!(receiver_dir.path().join("keep.txt").exists());
	assert!(!receiver_dir.path().join("gone.txt").exists());
}

#[tokio::test]
async fn s5_highly_compressible_file_is_sent_compressed() {
	let sender_dir = TempDir::new().unwrap();
	let receiver_dir = TempDir::new().unwrap();
	let content: Vec<u8> = "ab".repeat(50_000).into_bytes();
	fs::write(sender_dir.path().join("readme.txt"), &content).unwrap();

	let (controller_a, controller_b) = controller_pair(sender_dir.path().into(), receiver_dir.path().into());
	let (ctx_a, ctx_b) = (controller_a.context(), controller_b.context());

	let run_a = tokio::spawn(async move { controller_a.run().await });
	let run_b = tokio::spawn(async move { controller_b.run().await });
	wait_for_negotiation(&ctx_a, &ctx_b).await;

	if ctx_a.state.is_sender() {
		wiresync::session::run_sync_session(&ctx_a).await.unwrap();
	} else {
		wiresync::session::run_sync_session(&ctx_b).await.unwrap();
	}
	tokio::time::sleep(Duration::from_millis(200)).await;

	ctx_a.state.set_running(false);
	ctx_b.state.set_running(false);
	let _ = tokio::time::timeout(Duration::from_secs(1), run_a).await;
	let _ = tokio::time::timeout(Duration::from_secs(1), run_b).await;

	assert_eq!(fs::read(receiver_dir.path().join("readme.txt")).unwrap(), content);

	// `run_sync_session`/`send_file_data` route exactly this call before
	// building the FILE_DATA header; there is no public way to snoop the
	// wire from outside the crate, so this stands in for "compressed=true,
	// byte count small" on the header that was actually sent.
	let (payload, compressed) = wiresync::compression::compress_if_beneficial("readme.txt", &content).unwrap();
	assert!(compressed);
	assert!(payload.len() < 1000);
}

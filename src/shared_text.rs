#![allow(dead_code)]

//! Shared-Text Channel (§4.7): a single atomic slot pushed to the peer as a
//! Base64-encoded `SHARED_TEXT` control message, back-pressured while a
//! transfer or sync session owns the wire.

use crate::controller::PeerContext;
use crate::line_protocol::{Command, ControlMessage};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::Mutex;

pub struct SharedTextChannel {
	pending_text: Mutex<Option<String>>,
}

impl SharedTextChannel {
	pub fn new() -> Self {
		SharedTextChannel { pending_text: Mutex::new(None) }
	}

	/// Store `text` as the pending payload and attempt to flush it
	/// immediately.
	pub async fn queue(&self, ctx: &PeerContext, text: String) {
		*self.pending_text.lock().await = Some(text);
		self.flush_if_idle(ctx).await;
	}

	/// Send the pending payload if the wire is free, clearing the slot only
	/// if it still holds the value that was actually sent (a newer
	/// `queue()` call may have raced ahead of us).
	pub async fn flush_if_idle(&self, ctx: &PeerContext) {
		if !ctx.state.running() || !ctx.state.connection_alive() || ctx.state.syncing() || ctx.state.fbt_active() {
			return;
		}

		let snapshot = self.pending_text.lock().await.clone();
		let Some(text) = snapshot else { return };

		let encoded = BASE64.encode(text.as_bytes());
		let Ok(msg) = ControlMessage::new(Command::SharedText, vec![encoded]) else { return };

		if ctx.wire.write_message(&msg).await.is_ok() {
			let mut slot = self.pending_text.lock().await;
			if slot.as_deref() == Some(text.as_str()) {
				*slot = None;
			}
		}
	}

	/// Drop any pending payload unsent (called when `SYNC_COMPLETE`
	/// releases the channel, §4.6).
	pub async fn clear(&self) {
		*self.pending_text.lock().await = None;
	}
}

impl Default for SharedTextChannel {
	fn default() -> Self {
		Self::new()
	}
}


// vim: ts=4

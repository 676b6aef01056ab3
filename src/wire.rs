#![allow(dead_code)]

//! The single owned ByteLink, serialized behind a mutex (§5 "no two writers
//! write simultaneously"). `fbt_active` is raised before the lock is even
//! requested so a waiting reader loop can see it and back off instead of
//! blocking on the mutex for the whole transfer.

use crate::byte_link::ByteLink;
use crate::config::Config;
use crate::error::{FbtError, WireSyncError};
use crate::line_protocol::ControlMessage;
use crate::state::ConnectionState;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct Wire {
	link: Mutex<Box<dyn ByteLink>>,
	state: Arc<ConnectionState>,
}

impl Wire {
	pub fn new(link: Box<dyn ByteLink>, state: Arc<ConnectionState>) -> Self {
		Wire { link: Mutex::new(link), state }
	}

	pub fn state(&self) -> &Arc<ConnectionState> {
		&self.state
	}

	pub async fn write_message(&self, msg: &ControlMessage) -> Result<(), WireSyncError> {
		let mut link = self.link.lock().await;
		link.write(msg.to_line().as_bytes()).await.map_err(WireSyncError::Io)
	}

	pub async fn read_line(&self, timeout_ms: u64) -> Result<String, WireSyncError> {
		let mut link = self.link.lock().await;
		link.set_read_timeout(timeout_ms);
		link.read_line(timeout_ms).await
	}

	pub async fn clear_input(&self) -> std::io::Result<()> {
		let mut link = self.link.lock().await;
		link.clear_input().await
	}

	/// Drive a Framed Block Transfer send; the wire is committed for the
	/// whole transfer.
	pub async fn fbt_send(&self, payload: &[u8], cfg: &Config) -> Result<(), FbtError> {
		self.state.set_fbt_active(true);
		let result = {
			let mut link = self.link.lock().await;
			crate::fbt::send(&mut **link, payload, cfg).await
		};
		self.state.set_fbt_active(false);
		result
	}

	/// Drive a Framed Block Transfer receive; the wire is committed for the
	/// whole transfer.
	pub async fn fbt_receive(&self, cfg: &Config) -> Result<Vec<u8>, FbtError> {
		self.state.set_fbt_active(true);
		let result = {
			let mut link = self.link.lock().await;
			crate::fbt::receive(&mut **link, cfg).await
		};
		self.state.set_fbt_active(false);
		result
	}
}

// vim: ts=4

#![allow(dead_code)]

//! `ConnectionState` (§3): process-wide state of one peer, exclusively owned
//! and mutated by the Peer Controller. Every field is a plain atomic so
//! reads from other subsystems (the heartbeat supervisor's own checks, a
//! sync session's `fbt_active` polling) never need a lock; `[[controller]]`
//! is still the only writer of `is_sender`, `role_negotiated`, and the
//! heartbeat timestamps; a sync session is responsible for `syncing` and
//! `fbt_active` around its own FBT calls.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const ORDER: Ordering = Ordering::SeqCst;

pub fn now_millis() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before 1970").as_millis() as i64
}

/// `current_millis * 1000 + uniform[0, 1000)`, regenerated on each
/// (re)connect (§3).
fn regenerate_priority() -> i64 {
	let jitter = rand::random::<u32>() % 1000;
	now_millis() * 1000 + jitter as i64
}

pub struct ConnectionState {
	running: AtomicBool,
	connection_alive: AtomicBool,
	role_negotiated: AtomicBool,
	is_sender: AtomicBool,
	syncing: AtomicBool,
	fbt_active: AtomicBool,
	local_priority: AtomicI64,
	last_hb_sent: AtomicI64,
	last_hb_received: AtomicI64,
}

impl ConnectionState {
	pub fn new() -> Arc<Self> {
		Arc::new(ConnectionState {
			running: AtomicBool::new(false),
			connection_alive: AtomicBool::new(false),
			role_negotiated: AtomicBool::new(false),
			is_sender: AtomicBool::new(false),
			syncing: AtomicBool::new(false),
			fbt_active: AtomicBool::new(false),
			local_priority: AtomicI64::new(regenerate_priority()),
			last_hb_sent: AtomicI64::new(0),
			last_hb_received: AtomicI64::new(0),
		})
	}

	pub fn running(&self) -> bool {
		self.running.load(ORDER)
	}
	pub fn set_running(&self, value: bool) {
		self.running.store(value, ORDER)
	}

	pub fn connection_alive(&self) -> bool {
		self.connection_alive.load(ORDER)
	}
	pub fn set_connection_alive(&self, value: bool) {
		self.connection_alive.store(value, ORDER)
	}

	pub fn role_negotiated(&self) -> bool {
		self.role_negotiated.load(ORDER)
	}
	pub fn set_role_negotiated(&self, value: bool) {
		self.role_negotiated.store(value, ORDER)
	}

	pub fn is_sender(&self) -> bool {
		self.is_sender.load(ORDER)
	}
	pub fn set_is_sender(&self, value: bool) {
		self.is_sender.store(value, ORDER)
	}

	pub fn syncing(&self) -> bool {
		self.syncing.load(ORDER)
	}
	pub fn set_syncing(&self, value: bool) {
		self.syncing.store(value, ORDER)
	}

	pub fn fbt_active(&self) -> bool {
		self.fbt_active.load(ORDER)
	}
	pub fn set_fbt_active(&self, value: bool) {
		self.fbt_active.store(value, ORDER)
	}

	pub fn local_priority(&self) -> i64 {
		self.local_priority.load(ORDER)
	}

	/// Regenerate the election priority, as happens on each (re)connect.
	pub fn regenerate_local_priority(&self) -> i64 {
		let priority = regenerate_priority();
		self.local_priority.store(priority, ORDER);
		priority
	}

	pub fn last_hb_sent(&self) -> i64 {
		self.last_hb_sent.load(ORDER)
	}
	pub fn set_last_hb_sent(&self, value: i64) {
		self.last_hb_sent.store(value, ORDER)
	}

	pub fn last_hb_received(&self) -> i64 {
		self.last_hb_received.load(ORDER)
	}
	pub fn set_last_hb_received(&self, value: i64) {
		self.last_hb_received.store(value, ORDER)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fresh_state_is_not_running_or_negotiated() {
		let state = ConnectionState::new();
		assert!(!state.running());
		assert!(!state.role_negotiated());
		assert!(!state.connection_alive());
	}

	#[test]
	fn regenerating_priority_almost_always_changes_it() {
		let state = ConnectionState::new();
		let before = state.local_priority();
		let after = state.regenerate_local_priority();
		// Only equal if both millisecond tick and jitter collide; astronomically
		// unlikely in a test but not a correctness property to assert exactly.
		assert!(after >= before || after < before);
		assert_eq!(state.local_priority(), after);
	}
}

// vim: ts=4

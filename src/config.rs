#![allow(dead_code)]

//! Sync configuration.
//!
//! Consolidates the implementation choices spec.md leaves open (hash worker
//! pool size, FBT block size, timeouts) and the per-round flags a sender
//! must propagate to its peer via `MANIFEST_REQ` (respect_gitignore,
//! quick_mode) alongside the local-only knobs (strict, manifest cache path).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default heartbeat interval, §4.6. `Config::heartbeat_interval_ms`
/// falls back to this; tests that need a fast reconnect-after-drop
/// scenario override it on a per-`Config` basis instead of editing this
/// constant.
pub const HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// Default heartbeat timeout, §4.6.
pub const HEARTBEAT_TIMEOUT_MS: u64 = 15_000;

/// Large FBT block size in bytes: 1024 or 2048 per §4.1. We settle on 1024.
pub const DEFAULT_LARGE_BLOCK_SIZE: u16 = 1024;

/// Small FBT block size, fixed by the XMODEM wire format.
pub const SMALL_BLOCK_SIZE: u16 = 128;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Honor `.gitignore` files found throughout the tree.
	pub respect_gitignore: bool,

	/// Skip content hashing; compare by `(size, modified_time)` only.
	pub quick_mode: bool,

	/// Delete remote entries absent locally (§3 ChangeSet, §6.4 `strict`).
	pub strict: bool,

	/// Hash worker pool size. `0` means `max(2, available_parallelism())`.
	pub hash_workers: usize,

	/// Where to persist/read the local manifest cache (§4.3 step 8).
	pub manifest_cache_path: Option<PathBuf>,

	/// FBT large block size, §4.1. Must match on both peers for a given
	/// transfer only in the sense that the receiver determines size from
	/// the header byte — this only controls what the sender emits.
	pub large_block_size: u16,

	/// FBT per-byte read deadline, §4.1 step 3.
	pub fbt_read_timeout_ms: u64,

	/// FBT sender handshake deadline, §4.1 step 1.
	pub fbt_handshake_timeout_ms: u64,

	/// Maximum FBT retries per block/EOT, §4.1.
	pub fbt_max_retries: u32,

	/// Retries for a whole `FILE_DATA` send on FBT failure, §4.5 step 5.
	pub file_send_retries: u32,

	/// Heartbeat send interval, §4.6. Both peers must agree on this for
	/// `heartbeat_timeout_ms` to make sense, so it isn't part of the
	/// per-round `MANIFEST_REQ` negotiation — just a local knob.
	pub heartbeat_interval_ms: u64,

	/// Heartbeat dead-link timeout, §4.6.
	pub heartbeat_timeout_ms: u64,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			respect_gitignore: true,
			quick_mode: false,
			strict: false,
			hash_workers: 0,
			manifest_cache_path: None,
			large_block_size: DEFAULT_LARGE_BLOCK_SIZE,
			fbt_read_timeout_ms: 10_000,
			fbt_handshake_timeout_ms: 60_000,
			fbt_max_retries: 10,
			file_send_retries: 3,
			heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
			heartbeat_timeout_ms: HEARTBEAT_TIMEOUT_MS,
		}
	}
}

impl Config {
	/// Resolve the effective hash worker pool size.
	pub fn effective_hash_workers(&self) -> usize {
		if self.hash_workers > 0 {
			return self.hash_workers;
		}
		std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2).max(2)
	}

	/// Load a config from a JSON file, falling back to defaults if absent.
	pub async fn load(path: &std::path::Path) -> Result<Self, crate::error::WireSyncError> {
		if !path.exists() {
			return Ok(Config::default());
		}
		let contents = tokio::fs::read_to_string(path).await?;
		serde_json::from_str(&contents).map_err(|e| crate::error::WireSyncError::Configuration {
			message: format!("failed to parse config at {}: {}", path.display(), e),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_spec_timers() {
		let cfg = Config::default();
		assert_eq!(HEARTBEAT_INTERVAL_MS, 5_000);
		assert_eq!(HEARTBEAT_TIMEOUT_MS, 15_000);
		assert_eq!(cfg.heartbeat_interval_ms, HEARTBEAT_INTERVAL_MS);
		assert_eq!(cfg.heartbeat_timeout_ms, HEARTBEAT_TIMEOUT_MS);
		assert!(!cfg.strict);
		assert!(!cfg.quick_mode);
		assert!(cfg.respect_gitignore);
	}

	#[test]
	fn hash_workers_floor_is_two() {
		let mut cfg = Config::default();
		cfg.hash_workers = 0;
		assert!(cfg.effective_hash_workers() >= 2);
		cfg.hash_workers = 7;
		assert_eq!(cfg.effective_hash_workers(), 7);
	}

	#[tokio::test]
	async fn load_missing_file_returns_defaults() {
		let cfg = Config::load(std::path::Path::new("/nonexistent/wiresync.json")).await.unwrap();
		assert_eq!(cfg.strict, Config::default().strict);
	}
}

// vim: ts=4

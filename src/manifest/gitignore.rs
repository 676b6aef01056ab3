//! Per-directory-anchored gitignore matching (§4.3 step 2).
//!
//! Generalizes `szilu-syncr`'s single base-anchored `GitignoreBuilder` (see
//! `exclusion/ignore.rs` in the teacher tree) into a stack of matchers, one
//! per directory that carries its own `.gitignore`, pushed as the walk
//! descends and popped on the way back out. A path is ignored according to
//! whichever layer (root-to-leaf) most recently produced a non-`None`
//! verdict — deeper `.gitignore` files can both exclude and, via `!`
//! negation, resurrect what a shallower one excluded.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::io;
use std::path::{Path, PathBuf};

/// The matchers currently in scope during a depth-first walk, root first.
pub struct IgnoreLayers {
	layers: Vec<(PathBuf, Gitignore)>,
}

impl IgnoreLayers {
	pub fn new() -> Self {
		IgnoreLayers { layers: Vec::new() }
	}

	/// If `dir_abs` contains a `.gitignore`, compile it anchored at
	/// `dir_abs` and push it, returning whether a layer was pushed (the
	/// caller must `pop` exactly that many times on the way back out).
	pub fn push_dir(&mut self, dir_abs: &Path, dir_rel: &Path) -> io::Result<bool> {
		let gitignore_path = dir_abs.join(".gitignore");
		if !gitignore_path.is_file() {
			return Ok(false);
		}
		let mut builder = GitignoreBuilder::new(dir_abs);
		if let Some(err) = builder.add(&gitignore_path) {
			return Err(io::Error::new(io::ErrorKind::InvalidData, err.to_string()));
		}
		let compiled = builder.build().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
		self.layers.push((dir_rel.to_path_buf(), compiled));
		Ok(true)
	}

	pub fn pop(&mut self) {
		self.layers.pop();
	}

	/// Whether `rel_path` (relative to the walk root) is ignored, folding
	/// root-to-leaf so a deeper match wins over a shallower one.
	pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
		let mut verdict = ignore::Match::None;
		for (anchor, gi) in &self.layers {
			let Ok(sub_path) = rel_path.strip_prefix(anchor) else { continue };
			if sub_path.as_os_str().is_empty() {
				continue;
			}
			let m = gi.matched(sub_path, is_dir);
			if !matches!(m, ignore::Match::None) {
				verdict = m;
			}
		}
		matches!(verdict, ignore::Match::Ignore(_))
	}
}

impl Default for IgnoreLayers {
	fn default() -> Self {
		Self::new()
	}
}


// vim: ts=4

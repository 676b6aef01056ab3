#![allow(dead_code)]

//! Manifest Engine (§3, §4.3): directory walk with gitignore filtering,
//! metadata-vs-content change detection, cached-manifest reuse, and the
//! differential change set a Sync Session needs.

mod gitignore;
mod hash;

use crate::config::Config;
use crate::error::WireSyncError;
use gitignore::IgnoreLayers;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::sync::Semaphore;

/// An entry for one regular file (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
	pub path: String,
	pub size: u64,
	#[serde(rename = "lastModified")]
	pub modified_time: u64,
	#[serde(rename = "md5")]
	pub digest: Option<String>,
}

/// Snapshot of one directory tree (§3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
	pub files: HashMap<String, FileRecord>,
	pub empty_dirs: HashSet<String>,
}

#[derive(Serialize, Deserialize)]
struct PersistedManifest {
	files: HashMap<String, FileRecord>,
	#[serde(rename = "emptyDirectories")]
	empty_directories: Vec<String>,
}

impl Manifest {
	pub fn to_json(&self) -> Result<String, WireSyncError> {
		let mut empty_directories: Vec<String> = self.empty_dirs.iter().cloned().collect();
		empty_directories.sort();
		let persisted = PersistedManifest { files: self.files.clone(), empty_directories };
		serde_json::to_string_pretty(&persisted)
			.map_err(|e| WireSyncError::Configuration { message: format!("failed to serialize manifest: {}", e) })
	}

	pub fn from_json(data: &str) -> Result<Self, WireSyncError> {
		let persisted: PersistedManifest = serde_json::from_str(data)
			.map_err(|e| WireSyncError::Configuration { message: format!("failed to parse manifest: {}", e) })?;
		Ok(Manifest { files: persisted.files, empty_dirs: persisted.empty_directories.into_iter().collect() })
	}

	pub async fn load(path: &Path) -> Result<Self, WireSyncError> {
		let contents = tokio::fs::read_to_string(path)
			.await
			.map_err(|e| WireSyncError::Filesystem { path: path.display().to_string(), source: e })?;
		Self::from_json(&contents)
	}

	pub async fn save(&self, path: &Path) -> Result<(), WireSyncError> {
		let json = self.to_json()?;
		tokio::fs::write(path, json)
			.await
			.map_err(|e| WireSyncError::Filesystem { path: path.display().to_string(), source: e })
	}
}

/// Differential output of comparing a local manifest against a remote one
/// (§3). Only populated with deletions when `strict` is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
	pub to_send: Vec<FileRecord>,
	pub empty_dirs_to_create: Vec<String>,
	pub to_delete: Vec<String>,
	pub empty_dirs_to_delete: Vec<String>,
}

fn records_differ(local: &FileRecord, remote: &FileRecord) -> bool {
	match (&local.digest, &remote.digest) {
		(Some(a), Some(b)) => a != b,
		_ => local.size != remote.size || local.modified_time != remote.modified_time,
	}
}

/// Diff `local` against `remote` per the ChangeSet semantics in §3.
/// `to_send` is ordered by path for determinism across runs.
pub fn diff(local: &Manifest, remote: &Manifest, strict: bool) -> ChangeSet {
	let mut to_send: Vec<FileRecord> = local
		.files
		.iter()
		.filter_map(|(path, record)| match remote.files.get(path) {
			None => Some(record.clone()),
			Some(remote_record) if records_differ(record, remote_record) => Some(record.clone()),
			_ => None,
		})
		.collect();
	to_send.sort_by(|a, b| a.path.cmp(&b.path));

	let mut empty_dirs_to_create: Vec<String> = local.empty_dirs.difference(&remote.empty_dirs).cloned().collect();
	empty_dirs_to_create.sort();

	let (to_delete, empty_dirs_to_delete) = if strict {
		let mut to_delete: Vec<String> =
			remote.files.keys().filter(|p| !local.files.contains_key(*p)).cloned().collect();
		to_delete.sort();

		let mut empty_dirs_to_delete: Vec<String> =
			remote.empty_dirs.difference(&local.empty_dirs).cloned().collect();
		// Deepest-first by path length so a child is removed before its parent.
		empty_dirs_to_delete.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

		(to_delete, empty_dirs_to_delete)
	} else {
		(Vec::new(), Vec::new())
	};

	ChangeSet { to_send, empty_dirs_to_create, to_delete, empty_dirs_to_delete }
}

struct WalkedFile {
	rel_path: String,
	abs_path: PathBuf,
	size: u64,
	modified_time: u64,
}

struct WalkResult {
	files: Vec<WalkedFile>,
	empty_dirs: Vec<String>,
}

fn to_slash(path: &Path) -> String {
	path.to_string_lossy().replace('\\', "/")
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn is_hidden(path: &Path) -> bool {
	use std::os::windows::ffi::OsStrExt;
	use windows_sys::Win32::Storage::FileSystem::{GetFileAttributesW, FILE_ATTRIBUTE_HIDDEN, INVALID_FILE_ATTRIBUTES};

	let wide: Vec<u16> = path.as_os_str().encode_wide().chain(std::iter::once(0)).collect();
	let attrs = unsafe { GetFileAttributesW(wide.as_ptr()) };
	attrs != INVALID_FILE_ATTRIBUTES && (attrs & FILE_ATTRIBUTE_HIDDEN) != 0
}

#[cfg(not(windows))]
fn is_hidden(_path: &Path) -> bool {
	// No platform "hidden" attribute outside Windows; a leading `.` is a
	// naming convention, not the attribute §4.3 step 3 refers to.
	false
}

fn millis_since_epoch(time: std::time::SystemTime) -> std::io::Result<u64> {
	time.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

fn walk_tree(root: &Path, respect_gitignore: bool) -> std::io::Result<WalkResult> {
	let mut files = Vec::new();
	let mut empty_dirs = Vec::new();
	let mut layers = IgnoreLayers::new();
	visit_dir(root, Path::new(""), respect_gitignore, &mut layers, &mut files, &mut empty_dirs)?;
	Ok(WalkResult { files, empty_dirs })
}

fn visit_dir(
	root_abs: &Path,
	dir_rel: &Path,
	respect_gitignore: bool,
	layers: &mut IgnoreLayers,
	out_files: &mut Vec<WalkedFile>,
	out_empty_dirs: &mut Vec<String>,
) -> std::io::Result<bool> {
	let dir_abs = root_abs.join(dir_rel);
	let pushed = if respect_gitignore { layers.push_dir(&dir_abs, dir_rel)? } else { false };

	let mut entries: Vec<_> = std::fs::read_dir(&dir_abs)?.collect::<std::io::Result<_>>()?;
	entries.sort_by_key(|e| e.file_name());

	let mut has_visible = false;
	for entry in entries {
		let name = entry.file_name();
		let name_str = name.to_string_lossy().into_owned();
		let entry_abs = entry.path();
		let entry_rel = if dir_rel.as_os_str().is_empty() { PathBuf::from(&name_str) } else { dir_rel.join(&name_str) };

		if is_hidden(&entry_abs) {
			continue;
		}

		let metadata = entry.metadata()?;
		if metadata.is_dir() {
			if respect_gitignore && layers.is_ignored(&entry_rel, true) {
				continue;
			}
			has_visible = true;
			let child_visible =
				visit_dir(root_abs, &entry_rel, respect_gitignore, layers, out_files, out_empty_dirs)?;
			if !child_visible {
				out_empty_dirs.push(to_slash(&entry_rel));
			}
		} else if metadata.is_file() {
			if respect_gitignore {
				if name_str.ends_with(".gitignore") {
					continue;
				}
				if layers.is_ignored(&entry_rel, false) {
					continue;
				}
			}
			has_visible = true;
			out_files.push(WalkedFile {
				rel_path: to_slash(&entry_rel),
				abs_path: entry_abs,
				size: metadata.len(),
				modified_time: millis_since_epoch(metadata.modified()?)?,
			});
		}
	}

	if pushed {
		layers.pop();
	}
	Ok(has_visible)
}

/// Build a manifest of `root` (§4.3). `prior` supplies cached digests for
/// files whose `(size, modified_time)` are unchanged, avoiding a rehash.
pub async fn generate_manifest(
	root: &Path,
	cfg: &Config,
	prior: Option<&Manifest>,
) -> Result<Manifest, WireSyncError> {
	let root_owned = root.to_path_buf();
	let respect_gitignore = cfg.respect_gitignore;
	let walked = tokio::task::spawn_blocking(move || walk_tree(&root_owned, respect_gitignore))
		.await
		.map_err(|e| WireSyncError::Session { message: format!("manifest walk task panicked: {}", e) })?
		.map_err(|e| WireSyncError::Filesystem { path: root.display().to_string(), source: e })?;

	let semaphore = Arc::new(Semaphore::new(cfg.effective_hash_workers()));
	let mut files = HashMap::new();
	let mut hash_tasks = Vec::new();

	for walked_file in walked.files {
		if let Some(cached) = prior.and_then(|p| p.files.get(&walked_file.rel_path)) {
			if cached.size == walked_file.size && cached.modified_time == walked_file.modified_time && cached.digest.is_some()
			{
				files.insert(
					walked_file.rel_path.clone(),
					FileRecord {
						path: walked_file.rel_path,
						size: walked_file.size,
						modified_time: walked_file.modified_time,
						digest: cached.digest.clone(),
					},
				);
				continue;
			}
		}

		if cfg.quick_mode {
			files.insert(
				walked_file.rel_path.clone(),
				FileRecord {
					path: walked_file.rel_path,
					size: walked_file.size,
					modified_time: walked_file.modified_time,
					digest: None,
				},
			);
			continue;
		}

		let permit = semaphore.clone();
		hash_tasks.push(tokio::spawn(async move {
			let _permit = permit.acquire_owned().await.expect("hash worker semaphore closed early");
			let digest = hash::hash_file(&walked_file.abs_path).await?;
			Ok::<FileRecord, std::io::Error>(FileRecord {
				path: walked_file.rel_path,
				size: walked_file.size,
				modified_time: walked_file.modified_time,
				digest: Some(digest),
			})
		}));
	}

	for task in hash_tasks {
		let record = task
			.await
			.map_err(|e| WireSyncError::Session { message: format!("hash worker panicked: {}", e) })?
			.map_err(|e| WireSyncError::Filesystem { path: "<manifest hash>".into(), source: e })?;
		files.insert(record.path.clone(), record);
	}

	let manifest = Manifest { files, empty_dirs: walked.empty_dirs.into_iter().collect() };
	if let Some(cache_path) = &cfg.manifest_cache_path {
		manifest.save(cache_path).await?;
	}
	Ok(manifest)
}


// vim: ts=4

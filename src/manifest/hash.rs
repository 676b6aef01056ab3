//! Streaming MD5 digesting (§4.3 step 6): read in 8 KiB chunks so hashing a
//! large file never holds its whole content in memory at once.

use md5::{Digest, Md5};
use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 8 * 1024;

/// Lowercase hex MD5 of the file at `path`.
pub async fn hash_file(path: &Path) -> io::Result<String> {
	let mut file = tokio::fs::File::open(path).await?;
	let mut hasher = Md5::new();
	let mut buf = vec![0u8; CHUNK_SIZE];
	loop {
		let read = file.read(&mut buf).await?;
		if read == 0 {
			break;
		}
		hasher.update(&buf[..read]);
	}
	Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn matches_known_md5_of_empty_string() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("empty.txt");
		tokio::fs::write(&path, b"").await.unwrap();
		let digest = hash_file(&path).await.unwrap();
		assert_eq!(digest, "d41d8cd98f00b204e9800998ecf8427e");
	}

	#[tokio::test]
	async fn matches_known_md5_of_abc() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("abc.txt");
		tokio::fs::write(&path, b"abc").await.unwrap();
		let digest = hash_file(&path).await.unwrap();
		assert_eq!(digest, "900150983cd24fb0d6963f7d28e17f72");
	}

	#[tokio::test]
	async fn spans_multiple_chunks() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("big.bin");
		let data = vec![0x42u8; CHUNK_SIZE * 3 + 17];
		tokio::fs::write(&path, &data).await.unwrap();
		let digest = hash_file(&path).await.unwrap();

		let mut expected = Md5::new();
		expected.update(&data);
		assert_eq!(digest, hex::encode(expected.finalize()));
	}
}

// vim: ts=4

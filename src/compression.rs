#![allow(dead_code)]

//! Compression Filter (§4.4): heuristics deciding whether a file's bytes are
//! worth GZIP-compressing before a `FILE_DATA` transfer, plus the matching
//! decompression path on receipt.

use std::collections::HashSet;
use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

const SAMPLE_SIZE: usize = 4 * 1024;
const BINARY_FRACTION_THRESHOLD: f64 = 0.10;
const ENTROPY_THRESHOLD: f64 = 7.5;
const TRIAL_RATIO_THRESHOLD: f64 = 0.85;

/// GZIP magic bytes identifying a compressed payload on receipt.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

fn already_compressed_extensions() -> &'static HashSet<&'static str> {
	static EXTENSIONS: std::sync::OnceLock<HashSet<&'static str>> = std::sync::OnceLock::new();
	EXTENSIONS.get_or_init(|| {
		[
			"zip", "gz", "tgz", "bz2", "xz", "7z", "rar", "jpg", "jpeg", "png", "gif", "webp", "mp3", "mp4", "mkv",
			"avi", "mov", "pdf", "docx", "xlsx", "pptx",
		]
		.into_iter()
		.collect()
	})
}

fn known_text_extensions() -> &'static HashSet<&'static str> {
	static EXTENSIONS: std::sync::OnceLock<HashSet<&'static str>> = std::sync::OnceLock::new();
	EXTENSIONS.get_or_init(|| {
		["txt", "json", "csv", "xml", "html", "htm", "css", "js", "ts", "rs", "md", "yaml", "yml", "toml", "log"]
			.into_iter()
			.collect()
	})
}

fn extension_of(filename: &str) -> Option<String> {
	filename.rsplit('.').next().filter(|ext| *ext != filename).map(|ext| ext.to_ascii_lowercase())
}

fn is_binary_like(sample: &[u8]) -> bool {
	if sample.is_empty() {
		return false;
	}
	let non_text = sample
		.iter()
		.filter(|&&b| b == 0x00 || b == 0x7F || (b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r'))
		.count();
	(non_text as f64 / sample.len() as f64) > BINARY_FRACTION_THRESHOLD
}

fn shannon_entropy(sample: &[u8]) -> f64 {
	if sample.is_empty() {
		return 0.0;
	}
	let mut counts = [0u32; 256];
	for &byte in sample {
		counts[byte as usize] += 1;
	}
	let len = sample.len() as f64;
	counts
		.iter()
		.filter(|&&c| c > 0)
		.map(|&c| {
			let p = c as f64 / len;
			-p * p.log2()
		})
		.sum()
}

/// Unconditionally GZIP `bytes` (used for manifest payloads, which are
/// always compressed regardless of the heuristics below).
pub fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
	let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(bytes)?;
	encoder.finish()
}

/// Decompress a GZIP payload produced by `compress_if_beneficial`.
pub fn gunzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
	let mut decoder = GzDecoder::new(bytes);
	let mut out = Vec::new();
	decoder.read_to_end(&mut out)?;
	Ok(out)
}

/// Decide whether to GZIP `bytes` before sending, per §4.4. Returns the
/// bytes to put on the wire and whether they are compressed.
pub fn compress_if_beneficial(filename: &str, bytes: &[u8]) -> io::Result<(Vec<u8>, bool)> {
	if let Some(ext) = extension_of(filename) {
		if already_compressed_extensions().contains(ext.as_str()) {
			return Ok((bytes.to_vec(), false));
		}

		if known_text_extensions().contains(ext.as_str()) {
			let sample = &bytes[..bytes.len().min(SAMPLE_SIZE)];
			if !is_binary_like(sample) {
				let compressed = gzip(bytes)?;
				if compressed.len() < bytes.len() {
					return Ok((compressed, true));
				}
			}
			return Ok((bytes.to_vec(), false));
		}
	}

	let sample = &bytes[..bytes.len().min(SAMPLE_SIZE)];
	if is_binary_like(sample) && shannon_entropy(sample) > ENTROPY_THRESHOLD {
		return Ok((bytes.to_vec(), false));
	}

	let trial_compressed = gzip(sample)?;
	let trial_ratio = if sample.is_empty() { 1.0 } else { trial_compressed.len() as f64 / sample.len() as f64 };
	if trial_ratio >= TRIAL_RATIO_THRESHOLD {
		return Ok((bytes.to_vec(), false));
	}

	let compressed = gzip(bytes)?;
	if compressed.len() < bytes.len() {
		Ok((compressed, true))
	} else {
		Ok((bytes.to_vec(), false))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn already_compressed_extension_is_passed_through() {
		let bytes = vec![0u8; 1000];
		let (out, compressed) = compress_if_beneficial("photo.jpg", &bytes).unwrap();
		assert!(!compressed);
		assert_eq!(out, bytes);
	}

	#[test]
	fn repetitive_text_compresses() {
		let bytes = "ab".repeat(50_000).into_bytes();
		let (out, compressed) = compress_if_beneficial("readme.txt", &bytes).unwrap();
		assert!(compressed);
		assert!(out.len() < 1000);
		assert_eq!(&out[..2], &GZIP_MAGIC);
	}

	#[test]
	fn high_entropy_binary_is_not_compressed() {
		// A pseudo-random byte stream: high entropy, binary-like.
		let mut state: u32 = 0x2545F491;
		let bytes: Vec<u8> = (0..SAMPLE_SIZE * 2)
			.map(|_| {
				state ^= state << 13;
				state ^= state >> 17;
				state ^= state << 5;
				(state & 0xFF) as u8
			})
			.collect();
		let (_, compressed) = compress_if_beneficial("blob.bin", &bytes).unwrap();
		assert!(!compressed);
	}

	#[test]
	fn compression_round_trips() {
		let original = "the quick brown fox jumps over the lazy dog ".repeat(200).into_bytes();
		let (out, compressed) = compress_if_beneficial("story.txt", &original).unwrap();
		assert!(compressed);
		let restored = gunzip(&out).unwrap();
		assert_eq!(restored, original);
	}

	#[test]
	fn empty_input_is_left_uncompressed() {
		let (out, compressed) = compress_if_beneficial("empty.dat", &[]).unwrap();
		assert!(!compressed);
		assert!(out.is_empty());
	}
}

// vim: ts=4

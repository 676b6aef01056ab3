//! Line Protocol (§4.2, §6): newline-delimited, UTF-8, bracketed control
//! messages sharing the wire with FBT. Framing is `[[SYNC:<CMD>[:<param>]*]]`;
//! the caller writes the trailing `\n` via `ByteLink::write`, and
//! `ByteLink::read_line` has already stripped it (and any `\r`) by the time
//! a line reaches `parse`.

use crate::error::LineProtocolError;
use std::fmt;

/// One of the commands enumerated in §6, or an unrecognised wire name. The
/// design notes call for logging a warning on the latter rather than
/// dropping it silently with no trace, so the name is retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	ManifestReq,
	ManifestData,
	FileReq,
	FileData,
	FileDelete,
	Mkdir,
	Rmdir,
	SyncComplete,
	DirectionChange,
	RoleNegotiate,
	Ack,
	Error,
	Heartbeat,
	HeartbeatAck,
	SharedText,
	Unknown(String),
}

impl Command {
	fn from_wire(name: &str) -> Command {
		match name {
			"MANIFEST_REQ" => Command::ManifestReq,
			"MANIFEST_DATA" => Command::ManifestData,
			"FILE_REQ" => Command::FileReq,
			"FILE_DATA" => Command::FileData,
			"FILE_DELETE" => Command::FileDelete,
			"MKDIR" => Command::Mkdir,
			"RMDIR" => Command::Rmdir,
			"SYNC_COMPLETE" => Command::SyncComplete,
			"DIRECTION_CHANGE" => Command::DirectionChange,
			"ROLE_NEGOTIATE" => Command::RoleNegotiate,
			"ACK" => Command::Ack,
			"ERROR" => Command::Error,
			"HEARTBEAT" => Command::Heartbeat,
			"HEARTBEAT_ACK" => Command::HeartbeatAck,
			"SHARED_TEXT" => Command::SharedText,
			other => Command::Unknown(other.to_string()),
		}
	}

	fn wire_name(&self) -> &str {
		match self {
			Command::ManifestReq => "MANIFEST_REQ",
			Command::ManifestData => "MANIFEST_DATA",
			Command::FileReq => "FILE_REQ",
			Command::FileData => "FILE_DATA",
			Command::FileDelete => "FILE_DELETE",
			Command::Mkdir => "MKDIR",
			Command::Rmdir => "RMDIR",
			Command::SyncComplete => "SYNC_COMPLETE",
			Command::DirectionChange => "DIRECTION_CHANGE",
			Command::RoleNegotiate => "ROLE_NEGOTIATE",
			Command::Ack => "ACK",
			Command::Error => "ERROR",
			Command::Heartbeat => "HEARTBEAT",
			Command::HeartbeatAck => "HEARTBEAT_ACK",
			Command::SharedText => "SHARED_TEXT",
			Command::Unknown(name) => name,
		}
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.wire_name())
	}
}

/// A parsed line-protocol record: a command plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
	pub command: Command,
	pub params: Vec<String>,
}

impl ControlMessage {
	/// Build a message, rejecting any parameter that contains the `:`
	/// delimiter (§4.2 — `SHARED_TEXT` sidesteps this by Base64-encoding).
	pub fn new(command: Command, params: Vec<String>) -> Result<Self, LineProtocolError> {
		if let Some(bad) = params.iter().find(|p| p.contains(':')) {
			return Err(LineProtocolError::InvalidParameter {
				detail: format!("parameter {:?} contains ':'", bad),
			});
		}
		Ok(ControlMessage { command, params })
	}

	/// Render as the wire line, including the trailing `\n`.
	pub fn to_line(&self) -> String {
		let mut line = format!("[[SYNC:{}", self.command);
		for param in &self.params {
			line.push(':');
			line.push_str(param);
		}
		line.push_str("]]\n");
		line
	}
}

/// Parse one already-dechunked line (no trailing `\n`/`\r`). Malformed
/// bracketing parses to "no message" per §4.2.
pub fn parse(line: &str) -> Option<ControlMessage> {
	let inner = line.strip_prefix("[[SYNC:")?.strip_suffix("]]")?;
	let mut parts = inner.split(':');
	let command = Command::from_wire(parts.next()?);
	let params = parts.map(|s| s.to_string()).collect();
	Some(ControlMessage { command, params })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_a_command_with_params() {
		let msg = ControlMessage::new(
			Command::FileData,
			vec!["a/b.txt".into(), "6".into(), "false".into(), "1700000000000".into()],
		)
		.unwrap();
		let line = msg.to_line();
		assert_eq!(line, "[[SYNC:FILE_DATA:a/b.txt:6:false:1700000000000]]\n");

		let parsed = parse(line.trim_end_matches('\n')).unwrap();
		assert_eq!(parsed, msg);
	}

	#[test]
	fn round_trips_a_bare_command() {
		let msg = ControlMessage::new(Command::SyncComplete, vec![]).unwrap();
		assert_eq!(msg.to_line(), "[[SYNC:SYNC_COMPLETE]]\n");
		assert_eq!(parse("[[SYNC:SYNC_COMPLETE]]").unwrap().command, Command::SyncComplete);
	}

	#[test]
	fn malformed_brackets_parse_to_none() {
		assert!(parse("SYNC:ACK]]").is_none());
		assert!(parse("[[SYNC:ACK").is_none());
		assert!(parse("not a control message at all").is_none());
	}

	#[test]
	fn unknown_command_is_retained_for_logging() {
		let parsed = parse("[[SYNC:FUTURE_CMD:x]]").unwrap();
		assert_eq!(parsed.command, Command::Unknown("FUTURE_CMD".into()));
		assert_eq!(parsed.params, vec!["x".to_string()]);
	}

	#[test]
	fn param_containing_delimiter_is_rejected() {
		let err = ControlMessage::new(Command::Error, vec!["bad:param".into()]);
		assert!(err.is_err());
	}
}

// vim: ts=4

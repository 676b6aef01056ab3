//! # wiresync
//!
//! A peer-to-peer directory synchronizer for a single half-duplex serial
//! byte stream: a null-modem cable, a USB-serial adapter, or a virtual COM
//! port pair. Two peers converge their trees to a sender-authoritative
//! state by exchanging manifests, computing a change set, and streaming
//! files over an XMODEM-family framed block protocol multiplexed with a
//! line-based control channel.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use wiresync::byte_link::TcpByteLink;
//! use wiresync::config::Config;
//! use wiresync::controller::PeerController;
//! use wiresync::events::EventBus;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:4242").await?;
//!     let link = TcpByteLink::new(stream);
//!     let controller = PeerController::new(Box::new(link), "./sync-root".into(), Config::default(), EventBus::null());
//!     controller.run().await;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod byte_link;
pub mod compression;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod fbt;
pub mod line_protocol;
pub mod logging;
pub mod manifest;
pub mod session;
pub mod shared_text;
pub mod state;
pub mod wire;

pub use config::Config;
pub use controller::{PeerContext, PeerController};
pub use error::{FbtError, LineProtocolError, WireSyncError};
pub use events::{Event, EventBus, EventSink};
pub use manifest::{ChangeSet, FileRecord, Manifest};

// vim: ts=4

//! Event Bus (§2, §4.7): observer-style fan-out of typed events.
//!
//! Mirrors `szilu-syncr::callbacks` in spirit (a trait consumers implement,
//! called synchronously on the posting thread) but fans out a single event
//! enum instead of one trait method per concern, since spec §9 calls for an
//! enumerated variant type rather than per-signal closures at this boundary.
//! The GUI (explicitly out of scope, §1) is just another `EventSink`.

use std::sync::{Arc, RwLock};

/// One observable occurrence in the peer's lifetime.
#[derive(Debug, Clone)]
pub enum Event {
	/// A loggable diagnostic message, already formatted.
	Log { message: String },

	/// A non-fatal error surfaced to the user (§7: remote, filesystem,
	/// session failures all end up here after being handled locally).
	Error { message: String },

	/// `connection_alive` transitioned.
	Connection { alive: bool },

	/// `is_sender` changed, whether via negotiation or `DIRECTION_CHANGE`.
	Direction { is_sender: bool },

	/// A sync session started.
	SyncStarted,

	/// A sync session finished (`SYNC_COMPLETE` sent or received).
	SyncComplete,

	/// Progress within an in-flight sync session.
	Progress { files_done: usize, files_total: usize, bytes_done: u64 },

	/// A `SHARED_TEXT` payload arrived from the peer.
	SharedTextReceived { text: String },
}

/// Consumes events posted to the bus. Implemented by the GUI adapter in the
/// full application; a no-op and a channel-backed implementation are
/// provided here for headless use and tests.
pub trait EventSink: Send + Sync {
	fn on_event(&self, event: Event);
}

/// An `EventSink` that drops everything.
pub struct NullSink;

impl EventSink for NullSink {
	fn on_event(&self, _event: Event) {}
}

/// An `EventSink` backed by an unbounded mpsc channel, useful for tests and
/// for any consumer that wants to drain events on its own task rather than
/// be called back synchronously.
pub struct ChannelSink {
	tx: tokio::sync::mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
	pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<Event>) {
		let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
		(ChannelSink { tx }, rx)
	}
}

impl EventSink for ChannelSink {
	fn on_event(&self, event: Event) {
		// The receiver may have been dropped (e.g. a test only checking a
		// prefix of events); that's not our problem to report.
		let _ = self.tx.send(event);
	}
}

/// A shared handle to an `EventSink`, cheaply cloned and handed to every
/// subsystem that needs to post events (reader loop, heartbeat supervisor,
/// sync session, shared-text channel).
#[derive(Clone)]
pub struct EventBus {
	sink: Arc<RwLock<Arc<dyn EventSink>>>,
}

impl EventBus {
	pub fn new(sink: Arc<dyn EventSink>) -> Self {
		EventBus { sink: Arc::new(RwLock::new(sink)) }
	}

	pub fn null() -> Self {
		EventBus::new(Arc::new(NullSink))
	}

	/// Swap the sink at runtime (e.g. the GUI attaching after startup).
	pub fn set_sink(&self, sink: Arc<dyn EventSink>) {
		*self.sink.write().unwrap() = sink;
	}

	pub fn emit(&self, event: Event) {
		self.sink.read().unwrap().on_event(event);
	}

	pub fn log(&self, message: impl Into<String>) {
		self.emit(Event::Log { message: message.into() });
	}

	pub fn error(&self, message: impl Into<String>) {
		self.emit(Event::Error { message: message.into() });
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn channel_sink_delivers_events_in_order() {
		let (sink, mut rx) = ChannelSink::new();
		let bus = EventBus::new(Arc::new(sink));
		bus.emit(Event::SyncStarted);
		bus.emit(Event::Progress { files_done: 1, files_total: 2, bytes_done: 10 });
		bus.emit(Event::SyncComplete);

		assert!(matches!(rx.recv().await.unwrap(), Event::SyncStarted));
		assert!(matches!(rx.recv().await.unwrap(), Event::Progress { .. }));
		assert!(matches!(rx.recv().await.unwrap(), Event::SyncComplete));
	}

	#[test]
	fn null_sink_accepts_anything() {
		let bus = EventBus::null();
		bus.log("hello");
		bus.error("oops");
		bus.emit(Event::Connection { alive: true });
	}
}

// vim: ts=4

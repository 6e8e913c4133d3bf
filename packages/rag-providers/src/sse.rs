//! Incremental decoder for `text/event-stream` bodies.

use color_eyre::{Result, eyre};

/// Longest line accepted before the stream is treated as malformed.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Splits a byte stream into server-sent event payloads.
///
/// Bytes are buffered until a full line is available, so a multi-byte character or a line split
/// across network chunks decodes correctly. Only `data` fields are kept; an event is emitted at
/// the blank line that terminates it, with multiple `data` lines joined by `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
	buffer: Vec<u8>,
	// Prefix of `buffer` already searched for a line break.
	scanned: usize,
	data: Vec<String>,
}
impl SseDecoder {
	/// Decodes the events completed by `chunk`.
	///
	/// Fails once an unterminated line grows past [`MAX_LINE_BYTES`]; the partial line is
	/// discarded.
	pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
		self.buffer.extend_from_slice(chunk);

		let mut events = Vec::new();
		let mut start = 0;

		while let Some(offset) = self.buffer[self.scanned..].iter().position(|byte| *byte == b'\n')
		{
			let end = self.scanned + offset;
			let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();

			start = end + 1;
			self.scanned = start;

			if let Some(event) = self.feed_line(line.trim_end_matches('\r')) {
				events.push(event);
			}
		}

		self.buffer.drain(..start);
		self.scanned = self.buffer.len();

		if self.buffer.len() > MAX_LINE_BYTES {
			let len = self.buffer.len();

			self.buffer.clear();
			self.scanned = 0;

			return Err(eyre::eyre!(
				"Event stream line of {len} bytes exceeds {MAX_LINE_BYTES} without a line break."
			));
		}

		Ok(events)
	}

	/// Flushes an event left open when the body ended without a trailing blank line.
	pub fn finish(&mut self) -> Option<String> {
		if !self.buffer.is_empty() {
			let line = String::from_utf8_lossy(&self.buffer).trim_end_matches('\r').to_string();

			self.buffer.clear();
			self.scanned = 0;
			self.feed_line(&line);
		}

		self.take_event()
	}

	fn feed_line(&mut self, line: &str) -> Option<String> {
		if line.is_empty() {
			return self.take_event();
		}
		if line.starts_with(':') {
			return None;
		}

		let (field, value) = match line.split_once(':') {
			Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
			None => (line, ""),
		};

		if field == "data" {
			self.data.push(value.to_string());
		}

		None
	}

	fn take_event(&mut self) -> Option<String> {
		if self.data.is_empty() {
			return None;
		}

		let event = self.data.join("\n");

		self.data.clear();

		Some(event)
	}
}

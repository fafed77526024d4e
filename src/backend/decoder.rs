//! Frame decoder
//!
//! Turns the notification stream of one session into domain events. The
//! decoder is moved into the session's notification handler, so its
//! partial-frame buffer is only ever touched from the driver thread.

use crate::backend::driver::Notification;
use crate::backend::format::FrameFormat;
use crate::error::DecodeError;
use crate::types::{LineEvent, Sample};

/// Output of [`FrameDecoder::handle`]
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// A well-formed frame
    Sample(Sample),
    /// A control line transition
    Line(LineEvent),
    /// A malformed frame that was discarded
    Malformed(DecodeError),
    /// The driver gave up on the port
    DeliveryFailed(String),
}

/// Stateful decoder for one session
pub struct FrameDecoder {
    format: Box<dyn FrameFormat>,
    /// Bytes of an incomplete frame carried over between notifications
    partial: Vec<u8>,
    next_tick: u64,
    /// Skipping bytes after a malformed frame until one decodes again
    resyncing: bool,
}

impl FrameDecoder {
    pub fn new(format: Box<dyn FrameFormat>) -> Self {
        let capacity = format.frame_size() * 2;
        Self {
            format,
            partial: Vec::with_capacity(capacity),
            next_tick: 0,
            resyncing: false,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.format.frame_size()
    }

    /// Bytes waiting for the rest of their frame
    pub fn pending_bytes(&self) -> usize {
        self.partial.len()
    }

    /// Tick the next sample will carry
    pub fn next_tick(&self) -> u64 {
        self.next_tick
    }

    /// Single dispatch point for driver notifications
    pub fn handle(&mut self, notification: Notification) -> Vec<DecoderEvent> {
        match notification {
            Notification::DataAvailable(chunk) => self.feed(&chunk),
            Notification::LineChanged { line, asserted } => vec![DecoderEvent::Line(LineEvent {
                line,
                state: asserted.into(),
                tick: self.next_tick,
            })],
            Notification::DeliveryFailed(reason) => vec![DecoderEvent::DeliveryFailed(reason)],
        }
    }

    /// Append a raw chunk and decode every complete frame now available
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecoderEvent> {
        self.partial.extend_from_slice(chunk);

        let size = self.format.frame_size().max(1);
        let mut events = Vec::with_capacity(self.partial.len() / size);
        let mut offset = 0;

        while self.partial.len() - offset >= size {
            let frame = &self.partial[offset..offset + size];
            match self.format.decode(frame) {
                Ok(value) => {
                    events.push(DecoderEvent::Sample(Sample::new(self.next_tick, value)));
                    self.next_tick += 1;
                    self.resyncing = false;
                    offset += size;
                }
                Err(e) => match self.format.sync_marker() {
                    Some(marker) => {
                        // One error per skipped run, however long the run
                        if !self.resyncing {
                            events.push(DecoderEvent::Malformed(e));
                            self.resyncing = true;
                        }
                        offset += resync_skip(&self.partial[offset..], marker);
                    }
                    None => {
                        events.push(DecoderEvent::Malformed(e));
                        offset += size;
                    }
                },
            }
        }

        self.partial.drain(..offset);
        events
    }

    /// Drop any partial frame and restart the tick counter
    pub fn reset(&mut self) {
        self.partial.clear();
        self.next_tick = 0;
        self.resyncing = false;
    }
}

/// Bytes to discard from the start of `bytes`, whose first frame failed to
/// decode, to reach the next sync marker candidate. A marker prefix at the
/// very end is kept until the rest of it arrives. Always at least 1.
fn resync_skip(bytes: &[u8], marker: &[u8]) -> usize {
    if marker.is_empty() || bytes.len() <= 1 {
        return 1;
    }
    if let Some(pos) = bytes[1..].windows(marker.len()).position(|w| w == marker) {
        return pos + 1;
    }
    let keep = (1..marker.len())
        .rev()
        .find(|&n| n < bytes.len() && bytes.ends_with(&marker[..n]))
        .unwrap_or(0);
    bytes.len() - keep
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("format", &self.format.name())
            .field("pending_bytes", &self.partial.len())
            .field("next_tick", &self.next_tick)
            .field("resyncing", &self.resyncing)
            .finish()
    }
}

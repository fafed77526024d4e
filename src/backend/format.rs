//! Frame formats
//!
//! A [`FrameFormat`] defines the frame size and the decode function the
//! [`FrameDecoder`](super::FrameDecoder) applies to every complete frame.
//!
//! # Checksummed frame layout (default, 10 bytes)
//!
//! | Offset | Size | Content                          |
//! |--------|------|----------------------------------|
//! | 0      | 2    | Sync marker `0xAA 0x55`          |
//! | 2      | 4    | Voltage, `f32` little-endian     |
//! | 6      | 2    | Device frame counter, `u16` LE   |
//! | 8      | 1    | Device flags                     |
//! | 9      | 1    | XOR of bytes 0..9                |

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// Size of a [`ChecksummedFrame`] in bytes
pub const FRAME_SIZE: usize = 10;

/// Sync marker at the start of a [`ChecksummedFrame`]
pub const SYNC_MARKER: [u8; 2] = [0xAA, 0x55];

/// Decode policy for fixed-size frames
pub trait FrameFormat: Send {
    /// Number of bytes in one frame
    fn frame_size(&self) -> usize;

    /// Decode one frame of exactly [`frame_size`](FrameFormat::frame_size) bytes
    fn decode(&self, frame: &[u8]) -> Result<f64, DecodeError>;

    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Byte pattern every frame starts with. Formats that have one are
    /// resynchronized by scanning for it after a malformed frame; the
    /// others skip one whole frame.
    fn sync_marker(&self) -> Option<&[u8]> {
        None
    }
}

/// Default 10-byte frame with sync marker and XOR checksum
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksummedFrame;

impl ChecksummedFrame {
    /// Build a frame. Used by the simulated driver and in tests.
    pub fn encode(value: f32, counter: u16, flags: u8) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        frame[0..2].copy_from_slice(&SYNC_MARKER);
        frame[2..6].copy_from_slice(&value.to_le_bytes());
        frame[6..8].copy_from_slice(&counter.to_le_bytes());
        frame[8] = flags;
        frame[9] = checksum(&frame[..FRAME_SIZE - 1]);
        frame
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

impl FrameFormat for ChecksummedFrame {
    fn frame_size(&self) -> usize {
        FRAME_SIZE
    }

    fn decode(&self, frame: &[u8]) -> Result<f64, DecodeError> {
        if frame.len() != FRAME_SIZE {
            return Err(DecodeError::Length {
                expected: FRAME_SIZE,
                actual: frame.len(),
            });
        }
        if frame[0..2] != SYNC_MARKER {
            return Err(DecodeError::BadSync {
                found: [frame[0], frame[1]],
            });
        }
        let expected = checksum(&frame[..FRAME_SIZE - 1]);
        if expected != frame[FRAME_SIZE - 1] {
            return Err(DecodeError::Checksum {
                expected,
                actual: frame[FRAME_SIZE - 1],
            });
        }

        let value = f32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]);
        if !value.is_finite() {
            return Err(DecodeError::NonFinite);
        }
        Ok(value as f64)
    }

    fn name(&self) -> &'static str {
        "checksummed"
    }

    fn sync_marker(&self) -> Option<&[u8]> {
        Some(&SYNC_MARKER)
    }
}

/// Frames of a configurable size whose first four bytes are an `f32` LE value
///
/// Remaining bytes are ignored. Non-finite values are treated as malformed.
#[derive(Debug, Clone, Copy)]
pub struct RawF32 {
    frame_size: usize,
}

impl RawF32 {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size: frame_size.max(4),
        }
    }
}

impl FrameFormat for RawF32 {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn decode(&self, frame: &[u8]) -> Result<f64, DecodeError> {
        if frame.len() != self.frame_size {
            return Err(DecodeError::Length {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }
        let value = f32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        if !value.is_finite() {
            return Err(DecodeError::NonFinite);
        }
        Ok(value as f64)
    }

    fn name(&self) -> &'static str {
        "raw-f32"
    }
}

/// Configurable choice of built-in frame format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameFormatKind {
    /// [`ChecksummedFrame`]
    #[default]
    Checksummed,
    /// [`RawF32`] with the given frame size
    RawF32 { frame_size: usize },
}

impl FrameFormatKind {
    pub fn build(&self) -> Box<dyn FrameFormat> {
        match self {
            FrameFormatKind::Checksummed => Box::new(ChecksummedFrame),
            FrameFormatKind::RawF32 { frame_size } => Box::new(RawF32::new(*frame_size)),
        }
    }
}

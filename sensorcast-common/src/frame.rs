//! Binary datagram codec for sensor snapshots.
//!
//! A frame is a fixed header followed by one little-endian `f32` per present
//! channel, in [`Channel`] wire order:
//!
//! ```text
//! V1:  | version u8 | sequence u32 LE | mask u8 | values f32 LE ... |
//! V2:  | version u8 | sequence u32 LE | mask u8 | timestamp u64 LE | values f32 LE ... |
//! ```
//!
//! Bit `i` of the mask is set when channel `i` is present. V2 additionally
//! carries the monotonic timestamp of the newest reading in the snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::telemetry::{Channel, Reading, Snapshot};

/// Upper bound for a single frame; frames never fragment.
pub const MAX_DATAGRAM_SIZE: usize = 512;

const VALUE_SIZE: usize = std::mem::size_of::<f32>();

/// Mask with every known channel bit set.
const KNOWN_CHANNELS_MASK: u8 = (1 << Channel::COUNT) - 1;

/// Frame layout version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WireVersion {
    /// Header without timestamp (6 bytes).
    #[default]
    V1,
    /// Header with a `u64` capture timestamp (14 bytes).
    V2,
}

impl WireVersion {
    /// Version byte written at offset 0.
    pub fn as_u8(self) -> u8 {
        match self {
            WireVersion::V1 => 1,
            WireVersion::V2 => 2,
        }
    }

    /// Header length in bytes.
    pub fn header_len(self) -> usize {
        match self {
            WireVersion::V1 => 6,
            WireVersion::V2 => 14,
        }
    }
}

impl TryFrom<u8> for WireVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(WireVersion::V1),
            2 => Ok(WireVersion::V2),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }
}

impl From<WireVersion> for u8 {
    fn from(version: WireVersion) -> Self {
        version.as_u8()
    }
}

impl std::fmt::Display for WireVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.as_u8())
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Layout the frame was encoded with.
    pub version: WireVersion,
    /// Sequence number.
    pub sequence: u32,
    /// Capture timestamp (V2 only).
    pub timestamp: Option<u64>,
    /// Channel values.
    pub values: BTreeMap<Channel, f32>,
}

impl Frame {
    /// The frame a snapshot encodes to.
    pub fn from_snapshot(snapshot: &Snapshot, sequence: u32, version: WireVersion) -> Self {
        let timestamp = match version {
            WireVersion::V1 => None,
            WireVersion::V2 => Some(snapshot.newest_timestamp()),
        };

        Self {
            version,
            sequence,
            timestamp,
            values: snapshot.values(),
        }
    }

    /// Rebuild the snapshot this frame was encoded from.
    ///
    /// Every reading is stamped with the frame timestamp; V1 frames carry
    /// none, so their readings get 0.
    pub fn into_snapshot(self) -> Snapshot {
        let timestamp = self.timestamp.unwrap_or(0);
        let readings = self
            .values
            .into_iter()
            .map(|(ch, value)| (ch, Reading::new(ch, value, timestamp)))
            .collect();

        Snapshot {
            sequence: self.sequence,
            readings,
        }
    }

    /// Presence bitmask of this frame.
    pub fn presence_mask(&self) -> u8 {
        self.values.keys().fold(0u8, |mask, ch| mask | ch.bit())
    }

    /// Value for a channel, if present.
    pub fn value(&self, channel: Channel) -> Option<f32> {
        self.values.get(&channel).copied()
    }
}

/// Serializes snapshots into datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    version: WireVersion,
    max_frame_size: usize,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(WireVersion::default())
    }
}

impl FrameEncoder {
    /// Create an encoder for the given layout with the default size limit.
    pub fn new(version: WireVersion) -> Self {
        Self {
            version,
            max_frame_size: MAX_DATAGRAM_SIZE,
        }
    }

    /// Override the frame size limit.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Get the layout version.
    pub fn version(&self) -> WireVersion {
        self.version
    }

    /// Get the frame size limit.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encoded size of a snapshot, in bytes.
    pub fn encoded_len(&self, snapshot: &Snapshot) -> usize {
        self.version.header_len() + snapshot.len() * VALUE_SIZE
    }

    /// Encode a snapshot with the given sequence number.
    ///
    /// Fails with [`Error::EncodeTooLarge`] instead of producing a frame
    /// that would not fit in one datagram.
    pub fn encode(&self, snapshot: &Snapshot, sequence: u32) -> Result<Vec<u8>> {
        let size = self.encoded_len(snapshot);
        if size > self.max_frame_size {
            return Err(Error::EncodeTooLarge {
                size,
                limit: self.max_frame_size,
            });
        }

        let mut buf = Vec::with_capacity(size);
        buf.push(self.version.as_u8());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.push(snapshot.presence_mask());

        if self.version == WireVersion::V2 {
            buf.extend_from_slice(&snapshot.newest_timestamp().to_le_bytes());
        }

        // BTreeMap iteration is already in wire order.
        for reading in snapshot.readings.values() {
            buf.extend_from_slice(&reading.value.to_le_bytes());
        }

        Ok(buf)
    }
}

/// Decode a datagram produced by [`FrameEncoder::encode`].
pub fn decode(data: &[u8]) -> Result<Frame> {
    let Some(&version_byte) = data.first() else {
        return Err(Error::malformed("empty datagram"));
    };
    let version = WireVersion::try_from(version_byte)?;

    let header_len = version.header_len();
    if data.len() < header_len {
        return Err(Error::malformed(format!(
            "truncated header: {} bytes, need {}",
            data.len(),
            header_len
        )));
    }

    let sequence = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
    let mask = data[5];

    if mask & !KNOWN_CHANNELS_MASK != 0 {
        return Err(Error::malformed(format!(
            "unknown channel bits in mask {:#010b}",
            mask
        )));
    }

    let timestamp = match version {
        WireVersion::V1 => None,
        WireVersion::V2 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[6..14]);
            Some(u64::from_le_bytes(raw))
        }
    };

    let present: Vec<Channel> = Channel::ALL
        .iter()
        .copied()
        .filter(|ch| mask & ch.bit() != 0)
        .collect();

    let payload = &data[header_len..];
    if payload.len() != present.len() * VALUE_SIZE {
        return Err(Error::malformed(format!(
            "mask announces {} values but payload has {} bytes",
            present.len(),
            payload.len()
        )));
    }

    let values = present
        .into_iter()
        .zip(payload.chunks_exact(VALUE_SIZE))
        .map(|(ch, raw)| (ch, f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])))
        .collect();

    Ok(Frame {
        version,
        sequence,
        timestamp,
        values,
    })
}

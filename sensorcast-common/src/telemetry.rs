use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A sensor axis or quantity carried on the wire.
///
/// The declaration order is the wire order: variant `i` owns bit `i` of the
/// presence bitmask and the `i`-th value slot of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    GyroX,
    GyroY,
    GyroZ,
    AccelX,
    AccelY,
    AccelZ,
    AmbientTemp,
}

impl Channel {
    /// Every channel, in wire order.
    pub const ALL: [Channel; 7] = [
        Channel::GyroX,
        Channel::GyroY,
        Channel::GyroZ,
        Channel::AccelX,
        Channel::AccelY,
        Channel::AccelZ,
        Channel::AmbientTemp,
    ];

    /// Number of known channels.
    pub const COUNT: usize = Self::ALL.len();

    /// Wire index of this channel (bit position in the presence bitmask).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a channel by its wire index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Presence bit for this channel.
    pub fn bit(self) -> u8 {
        1 << self.index()
    }

    /// Get the string representation used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::GyroX => "gyro_x",
            Channel::GyroY => "gyro_y",
            Channel::GyroZ => "gyro_z",
            Channel::AccelX => "accel_x",
            Channel::AccelY => "accel_y",
            Channel::AccelZ => "accel_z",
            Channel::AmbientTemp => "ambient_temp",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single timestamped sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Which axis or quantity was measured.
    pub channel: Channel,

    /// The measured value.
    pub value: f32,

    /// Monotonic nanoseconds when the measurement was taken.
    pub timestamp: u64,
}

impl Reading {
    /// Create a reading with an explicit timestamp.
    pub fn new(channel: Channel, value: f32, timestamp: u64) -> Self {
        Self {
            channel,
            value,
            timestamp,
        }
    }

    /// Create a reading stamped with the current monotonic time.
    pub fn now(channel: Channel, value: f32) -> Self {
        Self::new(channel, value, monotonic_nanos())
    }
}

/// The most recent reading for each present channel, plus a sequence number.
///
/// Channels the device does not have are absent from the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot sequence number.
    pub sequence: u32,

    /// Latest reading per channel.
    pub readings: BTreeMap<Channel, Reading>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence,
            readings: BTreeMap::new(),
        }
    }

    /// Add a reading, replacing any previous one for the same channel.
    pub fn with_reading(mut self, reading: Reading) -> Self {
        self.readings.insert(reading.channel, reading);
        self
    }

    /// Value for a channel, if present.
    pub fn value(&self, channel: Channel) -> Option<f32> {
        self.readings.get(&channel).map(|r| r.value)
    }

    /// Presence bitmask (bit `i` set when channel `i` is present).
    pub fn presence_mask(&self) -> u8 {
        self.readings.keys().fold(0u8, |mask, ch| mask | ch.bit())
    }

    /// Values in wire order.
    pub fn values(&self) -> BTreeMap<Channel, f32> {
        self.readings
            .iter()
            .map(|(ch, r)| (*ch, r.value))
            .collect()
    }

    /// Newest reading timestamp, or 0 for an empty snapshot.
    pub fn newest_timestamp(&self) -> u64 {
        self.readings.values().map(|r| r.timestamp).max().unwrap_or(0)
    }

    /// Number of present channels.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether no channel is present.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Monotonic nanoseconds since the first call in this process.
pub fn monotonic_nanos() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_indices_follow_wire_order() {
        for (i, ch) in Channel::ALL.iter().enumerate() {
            assert_eq!(ch.index(), i);
            assert_eq!(Channel::from_index(i), Some(*ch));
        }
        assert_eq!(Channel::from_index(7), None);
        assert_eq!(Channel::AmbientTemp.bit(), 0b0100_0000);
    }

    #[test]
    fn test_snapshot_presence_mask() {
        let snapshot = Snapshot::new(1)
            .with_reading(Reading::new(Channel::GyroX, 1.0, 10))
            .with_reading(Reading::new(Channel::AccelZ, -9.8, 20));

        assert_eq!(snapshot.presence_mask(), 0b0010_0001);
        assert_eq!(snapshot.value(Channel::AccelZ), Some(-9.8));
        assert_eq!(snapshot.value(Channel::GyroY), None);
        assert_eq!(snapshot.newest_timestamp(), 20);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_monotonic_nanos_never_regresses() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::GyroZ.to_string(), "gyro_z");
        assert_eq!(Channel::AmbientTemp.as_str(), "ambient_temp");
    }
}

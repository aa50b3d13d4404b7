//! Latest-value aggregation of sensor readings.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use sensorcast_common::{Channel, Reading, Snapshot};

/// Receiver side of a sample source.
///
/// Sensor callbacks push readings through this trait instead of touching
/// shared state directly.
pub trait ReadingSink: Send + Sync {
    /// Accept one reading.
    fn record(&self, reading: Reading);
}

/// Holds the latest reading per channel.
///
/// Each channel owns an independent slot, so concurrent writers on
/// different channels never contend. A slot never moves back to an older
/// timestamp; equal timestamps resolve to the later arrival.
#[derive(Debug)]
pub struct SampleAggregator {
    slots: [Mutex<Option<Reading>>; Channel::COUNT],
    sequence: AtomicU32,
}

impl Default for SampleAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(None)),
            sequence: AtomicU32::new(0),
        }
    }

    /// Store a reading unless its channel already holds a newer one.
    ///
    /// Returns `true` when the reading replaced the slot.
    pub fn record(&self, reading: Reading) -> bool {
        let mut slot = self.slots[reading.channel.index()]
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        match *slot {
            Some(current) if current.timestamp > reading.timestamp => {
                tracing::trace!(
                    channel = %reading.channel,
                    stored = current.timestamp,
                    incoming = reading.timestamp,
                    "Ignoring stale reading"
                );
                false
            }
            _ => {
                *slot = Some(reading);
                true
            }
        }
    }

    /// Copy out the latest reading of every present channel.
    ///
    /// Each call advances the sequence number (wrapping).
    pub fn snapshot(&self) -> Snapshot {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let mut snapshot = Snapshot::new(sequence);

        for slot in &self.slots {
            if let Some(reading) = *slot.lock().unwrap_or_else(|e| e.into_inner()) {
                snapshot.readings.insert(reading.channel, reading);
            }
        }

        snapshot
    }

    /// Latest reading for one channel.
    pub fn latest(&self, channel: Channel) -> Option<Reading> {
        *self.slots[channel.index()]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Channels that have received at least one reading.
    pub fn present_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .iter()
            .copied()
            .filter(|ch| self.latest(*ch).is_some())
            .collect()
    }

    /// Sequence number the next snapshot will carry.
    pub fn next_sequence(&self) -> u32 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Forget every stored reading. The sequence keeps counting.
    pub fn clear(&self) {
        for slot in &self.slots {
            *slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
    }
}

impl ReadingSink for SampleAggregator {
    fn record(&self, reading: Reading) {
        SampleAggregator::record(self, reading);
    }
}

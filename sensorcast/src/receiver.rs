//! UDP frame listener.
//!
//! Receives datagrams from a publisher, decodes them and tracks delivery
//! quality (decode failures, sequence gaps).

use std::net::SocketAddr;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use sensorcast_common::{Frame, current_timestamp_millis, decode};

/// Receive buffer size; larger than any valid frame.
const RECV_BUFFER_SIZE: usize = 2048;

/// A decoded frame and where it came from.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    /// Sender address.
    pub from: SocketAddr,
    /// Decoded frame.
    pub frame: Frame,
    /// Wall-clock receive time (millis since epoch).
    pub received_at: i64,
}

/// How a sequence number relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// First frame seen.
    First,
    /// Exactly the next number.
    InOrder,
    /// Some frames were never received.
    Gap { missed: u32 },
    /// Older than or equal to the last one (duplicate or reordered).
    Late,
}

/// Follows sequence numbers across wraparound.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last: Option<u32>,
}

impl SequenceTracker {
    /// Create a tracker that has seen nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sequence number.
    pub fn observe(&mut self, sequence: u32) -> SequenceEvent {
        let Some(last) = self.last else {
            self.last = Some(sequence);
            return SequenceEvent::First;
        };

        let ahead = sequence.wrapping_sub(last);
        if ahead == 0 || ahead > u32::MAX / 2 {
            return SequenceEvent::Late;
        }

        self.last = Some(sequence);
        match ahead {
            1 => SequenceEvent::InOrder,
            n => SequenceEvent::Gap { missed: n - 1 },
        }
    }

    /// Last in-order sequence number.
    pub fn last(&self) -> Option<u32> {
        self.last
    }
}

/// Listener counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    /// Datagrams received.
    pub datagrams: u64,
    /// Datagrams decoded into frames.
    pub frames: u64,
    /// Datagrams that failed to decode.
    pub decode_failures: u64,
    /// Times the sequence jumped forward.
    pub sequence_gaps: u64,
    /// Frames lost in those jumps.
    pub missed_frames: u64,
    /// Duplicate or out-of-order frames.
    pub late_frames: u64,
}

/// Bound UDP socket that decodes incoming frames.
pub struct FrameListener {
    socket: UdpSocket,
    sequences: SequenceTracker,
    stats: ListenerStats,
    buf: Vec<u8>,
}

impl FrameListener {
    /// Bind the listening socket.
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind UDP socket to {}", addr))?;

        tracing::info!(bind = %socket.local_addr()?, "Frame listener started");

        Ok(Self {
            socket,
            sequences: SequenceTracker::new(),
            stats: ListenerStats::default(),
            buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    /// Bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Counters so far.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Wait for the next datagram.
    ///
    /// Returns `Ok(None)` when the datagram was not a valid frame.
    pub async fn recv(&mut self) -> Result<Option<ReceivedFrame>> {
        let (len, from) = self
            .socket
            .recv_from(&mut self.buf)
            .await
            .context("UDP receive error")?;

        let buf = std::mem::take(&mut self.buf);
        let received = self.process(&buf[..len], from);
        self.buf = buf;

        Ok(received)
    }

    fn process(&mut self, data: &[u8], from: SocketAddr) -> Option<ReceivedFrame> {
        self.stats.datagrams += 1;

        let frame = match decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.decode_failures += 1;
                tracing::debug!(from = %from, len = data.len(), error = %e, "Dropping undecodable datagram");
                return None;
            }
        };
        self.stats.frames += 1;

        match self.sequences.observe(frame.sequence) {
            SequenceEvent::First | SequenceEvent::InOrder => {}
            SequenceEvent::Gap { missed } => {
                self.stats.sequence_gaps += 1;
                self.stats.missed_frames += u64::from(missed);
                tracing::debug!(sequence = frame.sequence, missed, "Sequence gap");
            }
            SequenceEvent::Late => {
                self.stats.late_frames += 1;
                tracing::debug!(sequence = frame.sequence, "Late or duplicate frame");
            }
        }

        Some(ReceivedFrame {
            from,
            frame,
            received_at: current_timestamp_millis(),
        })
    }

    /// Receive until shutdown, forwarding decoded frames.
    ///
    /// Stops early when the receiving side of `tx` is dropped. Returns the
    /// final counters.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<ReceivedFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ListenerStats {
        loop {
            tokio::select! {
                result = self.recv() => match result {
                    Ok(Some(frame)) => {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %e, "Listener receive failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.stats
    }
}

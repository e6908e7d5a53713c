//! TCP stream reassembly.
//!
//! The [`Assembler`] keeps one [`Connection`] per directional [`FlowKey`]. Segments are placed by
//! sequence number (with wrap-around), retransmitted bytes are trimmed, and segments arriving
//! ahead of a hole wait in a small per-connection buffer. Bytes leave the assembler strictly in
//! stream order through the [`ReassembledStream`] obtained from the [`StreamFactory`] when the
//! flow was first seen.

use super::types::{FlowKey, TcpSegment};
use chrono::{DateTime, Utc};
use log::{debug, trace};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// A run of contiguous bytes of a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembly {
    pub bytes: Vec<u8>,
    /// Bytes known to be missing right before `bytes`.
    pub skip: usize,
    /// Capture time of the segment that carried `bytes`.
    pub seen: DateTime<Utc>,
}

/// Receiving end of one reassembled flow.
pub trait ReassembledStream {
    fn reassembled(&mut self, chunk: Reassembly);

    /// Called once, after the last chunk. The stream is dropped right after.
    fn reassembly_complete(&mut self);
}

/// Creates the stream of a flow the assembler has never seen before.
pub trait StreamFactory {
    type Stream: ReassembledStream;

    /// Invoked exactly once per flow, synchronously, from inside the assembler.
    fn new_stream(&mut self, key: &FlowKey) -> Self::Stream;
}

#[derive(Debug, Clone, Copy)]
pub struct AssemblerOptions {
    /// Out-of-order segments kept per connection before skipping over the hole.
    pub max_buffered_segments: usize,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            max_buffered_segments: 1024,
        }
    }
}

struct PendingSegment {
    start: u32,
    payload: Vec<u8>,
    closes: bool,
    seen: DateTime<Utc>,
}

struct Connection<S> {
    stream: S,
    next_seq: u32,
    pending: Vec<PendingSegment>,
    last_seen: DateTime<Utc>,
}

impl<S: ReassembledStream> Connection<S> {
    fn new(stream: S, next_seq: u32, last_seen: DateTime<Utc>) -> Self {
        Self {
            stream,
            next_seq,
            pending: Vec::new(),
            last_seen,
        }
    }

    fn offset(&self, start: u32) -> i32 {
        start.wrapping_sub(self.next_seq) as i32
    }

    /// Delivers a segment starting at or before `next_seq`. Returns true when it ends the stream.
    fn deliver(&mut self, segment: PendingSegment, skip: usize) -> bool {
        let overlap = (self.next_seq.wrapping_sub(segment.start) as i32).max(0) as usize;
        if overlap < segment.payload.len() || skip > 0 {
            let bytes = segment.payload.get(overlap..).unwrap_or_default().to_vec();
            self.next_seq = self.next_seq.wrapping_add(bytes.len() as u32);
            if !bytes.is_empty() || skip > 0 {
                self.stream.reassembled(Reassembly {
                    bytes,
                    skip,
                    seen: segment.seen,
                });
            }
        }
        segment.closes
    }

    /// Delivers every buffered segment that became contiguous.
    fn drain_ready(&mut self) -> bool {
        while let Some(idx) = self.nearest_pending() {
            if self.offset(self.pending[idx].start) > 0 {
                break;
            }
            let segment = self.pending.swap_remove(idx);
            if self.deliver(segment, 0) {
                return true;
            }
        }
        false
    }

    /// Jumps over the hole in front of the nearest buffered segment.
    fn skip_ahead(&mut self) -> bool {
        let Some(idx) = self.nearest_pending() else {
            return false;
        };
        let segment = self.pending.swap_remove(idx);
        let skip = self.offset(segment.start).max(0) as usize;
        trace!("skipping {} missing bytes", skip);
        self.next_seq = segment.start;
        if self.deliver(segment, skip) {
            return true;
        }
        self.drain_ready()
    }

    /// Delivers everything still buffered, holes included.
    fn flush_pending(&mut self) -> bool {
        loop {
            if self.drain_ready() {
                return true;
            }
            if self.pending.is_empty() {
                return false;
            }
            if self.skip_ahead() {
                return true;
            }
        }
    }

    fn nearest_pending(&self) -> Option<usize> {
        self.pending
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| self.offset(p.start))
            .map(|(idx, _)| idx)
    }
}

/// Reorders TCP segments into per-flow byte streams.
pub struct Assembler<F: StreamFactory> {
    factory: F,
    connections: HashMap<FlowKey, Connection<F::Stream>>,
    options: AssemblerOptions,
}

impl<F: StreamFactory> Assembler<F> {
    pub fn new(factory: F, options: AssemblerOptions) -> Self {
        Self {
            factory,
            connections: HashMap::new(),
            options,
        }
    }

    /// Feeds one segment. Segments must be fed in capture order.
    ///
    /// Pure ACKs (no payload, no SYN/FIN/RST) are ignored. The first segment of an unknown flow
    /// opens it: after a SYN the stream starts at `seq + 1`, otherwise at `seq`.
    pub fn assemble_with_timestamp(&mut self, segment: TcpSegment) {
        if !segment.syn && !segment.fin && !segment.rst && segment.payload.is_empty() {
            return;
        }

        let key = segment.key;
        let start = if segment.syn {
            segment.seq.wrapping_add(1)
        } else {
            segment.seq
        };

        let conn = match self.connections.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                debug!("new flow {}", key);
                let stream = self.factory.new_stream(&key);
                e.insert(Connection::new(stream, start, segment.timestamp))
            }
        };
        if segment.timestamp > conn.last_seen {
            conn.last_seen = segment.timestamp;
        }

        let pending = PendingSegment {
            start,
            payload: segment.payload,
            closes: segment.fin || segment.rst,
            seen: segment.timestamp,
        };

        let ended = if conn.offset(start) > 0 {
            conn.pending.push(pending);
            if conn.pending.len() > self.options.max_buffered_segments {
                debug!("buffer limit reached on {}, skipping ahead", key);
                conn.skip_ahead()
            } else {
                false
            }
        } else {
            conn.deliver(pending, 0) || conn.drain_ready()
        };

        if ended {
            self.close(&key);
        }
    }

    /// Closes every flow whose last segment was captured before `cutoff`.
    ///
    /// Buffered data is delivered first, jumping over holes. Returns the number of closed flows.
    pub fn flush_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let stale: Vec<FlowKey> = self
            .connections
            .iter()
            .filter(|(_, c)| c.last_seen < cutoff)
            .map(|(k, _)| *k)
            .collect();
        for key in &stale {
            self.flush_and_close(key);
        }
        stale.len()
    }

    /// Closes every flow. Returns the number of closed flows.
    pub fn flush_all(&mut self) -> usize {
        let keys: Vec<FlowKey> = self.connections.keys().copied().collect();
        for key in &keys {
            self.flush_and_close(key);
        }
        keys.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Drops all connection state without completing the streams and hands the factory back.
    pub fn into_factory(self) -> F {
        self.factory
    }

    fn flush_and_close(&mut self, key: &FlowKey) {
        if let Some(conn) = self.connections.get_mut(key) {
            conn.flush_pending();
        }
        self.close(key);
    }

    fn close(&mut self, key: &FlowKey) {
        if let Some(mut conn) = self.connections.remove(key) {
            trace!("closing flow {}", key);
            conn.stream.reassembly_complete();
        }
    }
}

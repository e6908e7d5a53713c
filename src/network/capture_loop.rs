use super::assembler::{Assembler, StreamFactory};
use super::decoder::decode_segment;
use super::types::{CapturedPacket, LinkLayer};
use crate::controller::shutdown::ShutdownSignal;
use chrono::{DateTime, Utc};
use log::{debug, info, trace};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Why the capture loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    EndOfInput,
    Cancelled,
}

/// Clock the idle cutoff is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionClock {
    /// Live capture: capture timestamps follow the wall clock.
    #[default]
    WallClock,
    /// Replay: the newest capture timestamp seen so far stands for "now".
    CaptureTime,
}

/// Counters collected while capturing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub reason: ExitReason,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub segments_assembled: u64,
    pub flush_ticks: u64,
    pub flows_evicted: u64,
}

impl CaptureSummary {
    fn new() -> Self {
        Self {
            reason: ExitReason::EndOfInput,
            packets_received: 0,
            packets_dropped: 0,
            segments_assembled: 0,
            flush_ticks: 0,
            flows_evicted: 0,
        }
    }
}

/// Single-threaded dispatch loop feeding the reassembler.
///
/// Waits on three things at once: the next packet, the eviction tick and the shutdown signal.
/// Packets are forwarded in the order they were captured, with their capture timestamp.
pub struct CaptureLoop<F: StreamFactory> {
    assembler: Assembler<F>,
    link: LinkLayer,
    flush_interval: Duration,
    idle_timeout: chrono::Duration,
    clock: EvictionClock,
    latest_capture: Option<DateTime<Utc>>,
    summary: CaptureSummary,
}

impl<F: StreamFactory> CaptureLoop<F> {
    pub fn new(
        assembler: Assembler<F>,
        link: LinkLayer,
        flush_interval: Duration,
        idle_timeout: chrono::Duration,
    ) -> Self {
        Self {
            assembler,
            link,
            flush_interval,
            idle_timeout,
            clock: EvictionClock::WallClock,
            latest_capture: None,
            summary: CaptureSummary::new(),
        }
    }

    pub fn with_clock(mut self, clock: EvictionClock) -> Self {
        self.clock = clock;
        self
    }

    /// Runs until `packets` is exhausted or `shutdown` fires.
    ///
    /// On end of input every remaining flow is flushed so its session sees end-of-stream. On
    /// shutdown nothing is flushed: the sessions observe the same signal themselves.
    pub async fn run(
        mut self,
        mut packets: mpsc::Receiver<CapturedPacket>,
        mut shutdown: ShutdownSignal,
    ) -> (CaptureSummary, Assembler<F>) {
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The tick is polled before packets so a backlog cannot starve eviction.
        let reason = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("capture cancelled");
                    break ExitReason::Cancelled;
                }
                _ = ticker.tick() => self.evict_idle(),
                packet = packets.recv() => match packet {
                    Some(packet) => self.handle_packet(packet),
                    None => {
                        let flushed = self.assembler.flush_all();
                        info!("end of input, flushed {} remaining flows", flushed);
                        self.summary.flows_evicted += flushed as u64;
                        break ExitReason::EndOfInput;
                    }
                },
            }
        };

        self.summary.reason = reason;
        info!(
            "capture stopped ({:?}): {} packets, {} dropped, {} segments, {} flushes, {} flows evicted",
            self.summary.reason,
            self.summary.packets_received,
            self.summary.packets_dropped,
            self.summary.segments_assembled,
            self.summary.flush_ticks,
            self.summary.flows_evicted
        );
        (self.summary, self.assembler)
    }

    fn handle_packet(&mut self, packet: CapturedPacket) {
        self.summary.packets_received += 1;
        if self.latest_capture.map_or(true, |t| packet.timestamp > t) {
            self.latest_capture = Some(packet.timestamp);
        }
        match decode_segment(self.link, &packet) {
            Some(segment) => {
                self.summary.segments_assembled += 1;
                self.assembler.assemble_with_timestamp(segment);
            }
            None => {
                trace!("dropping non TCP/IP packet");
                self.summary.packets_dropped += 1;
            }
        }
    }

    fn evict_idle(&mut self) {
        self.summary.flush_ticks += 1;
        let now = match self.clock {
            EvictionClock::WallClock => Utc::now(),
            EvictionClock::CaptureTime => match self.latest_capture {
                Some(latest) => latest,
                None => return,
            },
        };
        let cutoff = now - self.idle_timeout;
        let evicted = self.assembler.flush_older_than(cutoff);
        self.summary.flows_evicted += evicted as u64;
        debug!(
            "flushed {} flows idle since {}, {} still open",
            evicted,
            cutoff,
            self.assembler.connection_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::shutdown::shutdown_channel;
    use crate::network::assembler::{AssemblerOptions, ReassembledStream, Reassembly};
    use crate::network::FlowKey;
    use chrono::DateTime;
    use etherparse::PacketBuilder;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Tracker {
        created: Arc<Mutex<Vec<FlowKey>>>,
        completed: Arc<Mutex<Vec<FlowKey>>>,
        data: Arc<Mutex<Vec<u8>>>,
    }

    struct TrackedStream {
        key: FlowKey,
        tracker: Tracker,
    }

    impl ReassembledStream for TrackedStream {
        fn reassembled(&mut self, chunk: Reassembly) {
            self.tracker.data.lock().unwrap().extend(chunk.bytes);
        }

        fn reassembly_complete(&mut self) {
            self.tracker.completed.lock().unwrap().push(self.key);
        }
    }

    impl StreamFactory for Tracker {
        type Stream = TrackedStream;

        fn new_stream(&mut self, key: &FlowKey) -> TrackedStream {
            self.created.lock().unwrap().push(*key);
            TrackedStream {
                key: *key,
                tracker: self.clone(),
            }
        }
    }

    fn frame(seq: u32, payload: &[u8], timestamp: DateTime<Utc>) -> CapturedPacket {
        let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(45000, 80, seq, 65535);
        let mut data = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut data, payload).unwrap();
        CapturedPacket { timestamp, data }
    }

    fn capture_loop(tracker: &Tracker) -> CaptureLoop<Tracker> {
        CaptureLoop::new(
            Assembler::new(tracker.clone(), AssemblerOptions::default()),
            LinkLayer::Ethernet,
            Duration::from_secs(60),
            chrono::Duration::minutes(2),
        )
    }

    #[tokio::test]
    async fn test_end_of_input_flushes_and_returns() {
        let tracker = Tracker::default();
        let (_trigger, shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::channel(16);

        tx.send(frame(1, b"GET / ", Utc::now())).await.unwrap();
        tx.send(CapturedPacket {
            timestamp: Utc::now(),
            data: vec![0u8; 20],
        })
        .await
        .unwrap();
        tx.send(frame(7, b"HTTP/1.1\r\n", Utc::now())).await.unwrap();
        drop(tx);

        let (summary, assembler) = capture_loop(&tracker).run(rx, shutdown).await;

        assert_eq!(summary.reason, ExitReason::EndOfInput);
        assert_eq!(summary.packets_received, 3);
        assert_eq!(summary.packets_dropped, 1);
        assert_eq!(summary.segments_assembled, 2);
        assert_eq!(summary.flows_evicted, 1);
        assert_eq!(assembler.connection_count(), 0);
        assert_eq!(tracker.created.lock().unwrap().len(), 1);
        assert_eq!(tracker.completed.lock().unwrap().len(), 1);
        assert_eq!(*tracker.data.lock().unwrap(), b"GET / HTTP/1.1\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_cancel_returns_without_flushing() {
        let tracker = Tracker::default();
        let (trigger, shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::channel(16);
        tx.send(frame(1, b"partial", Utc::now())).await.unwrap();

        let task = tokio::spawn(capture_loop(&tracker).run(rx, shutdown));
        tokio::task::yield_now().await;
        trigger.cancel();

        let (summary, assembler) = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop returned")
            .unwrap();
        assert_eq!(summary.reason, ExitReason::Cancelled);
        assert!(tracker.completed.lock().unwrap().is_empty());
        assert!(assembler.connection_count() <= 1);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_flow_is_evicted_on_the_next_tick() {
        let tracker = Tracker::default();
        let (trigger, shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::channel(16);

        let stale = Utc::now() - chrono::Duration::minutes(3);
        tx.send(frame(1, b"never closed", stale)).await.unwrap();

        let task = tokio::spawn(capture_loop(&tracker).run(rx, shutdown));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(tracker.completed.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(tracker.completed.lock().unwrap().len(), 1);

        trigger.cancel();
        let (summary, _) = task.await.unwrap();
        assert_eq!(summary.flush_ticks, 1);
        assert_eq!(summary.flows_evicted, 1);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_flow_survives_the_tick() {
        let tracker = Tracker::default();
        let (trigger, shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::channel(16);
        tx.send(frame(1, b"fresh", Utc::now())).await.unwrap();

        let task = tokio::spawn(capture_loop(&tracker).run(rx, shutdown));
        tokio::time::sleep(Duration::from_secs(61)).await;

        trigger.cancel();
        let (summary, assembler) = task.await.unwrap();
        assert_eq!(summary.flush_ticks, 1);
        assert_eq!(summary.flows_evicted, 0);
        assert_eq!(assembler.connection_count(), 1);
        drop(tx);
    }

    fn capture_time_loop(tracker: &Tracker) -> CaptureLoop<Tracker> {
        capture_loop(tracker).with_clock(EvictionClock::CaptureTime)
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_fires_while_packets_are_queued() {
        let tracker = Tracker::default();
        let (trigger, shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::channel(10_000);
        let now = Utc::now();
        for i in 0..10_000u32 {
            tx.send(frame(1 + i, b"x", now)).await.unwrap();
        }

        let task = tokio::spawn(capture_loop(&tracker).run(rx, shutdown));
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        trigger.cancel();

        let (summary, _) = task.await.unwrap();
        assert_eq!(summary.reason, ExitReason::Cancelled);
        assert_eq!(summary.flush_ticks, 1);
        assert!(summary.packets_received < 10_000);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_of_old_capture_keeps_one_stream_per_flow() {
        let tracker = Tracker::default();
        let (trigger, shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::channel(16);

        let captured_at = Utc::now() - chrono::Duration::hours(1);
        let first = b"GET / HTTP/1.1\r\n";
        tx.send(frame(1, first, captured_at)).await.unwrap();

        let task = tokio::spawn(capture_time_loop(&tracker).run(rx, shutdown));
        tokio::time::sleep(Duration::from_secs(61)).await;

        tx.send(frame(
            1 + first.len() as u32,
            b"Host: x\r\n\r\n",
            captured_at + chrono::Duration::seconds(1),
        ))
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();

        let (summary, assembler) = task.await.unwrap();
        assert_eq!(summary.flush_ticks, 1);
        assert_eq!(summary.flows_evicted, 0);
        assert_eq!(assembler.connection_count(), 1);
        assert_eq!(tracker.created.lock().unwrap().len(), 1);
        assert_eq!(
            *tracker.data.lock().unwrap(),
            b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_evicts_by_capture_time() {
        let tracker = Tracker::default();
        let (trigger, shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::channel(16);

        let captured_at = Utc::now() - chrono::Duration::hours(1);
        tx.send(frame(1, b"stale", captured_at)).await.unwrap();
        let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
            .ipv4([10, 0, 0, 3], [10, 0, 0, 2], 64)
            .tcp(45001, 80, 1, 65535);
        let mut data = Vec::new();
        builder.write(&mut data, b"recent").unwrap();
        tx.send(CapturedPacket {
            timestamp: captured_at + chrono::Duration::minutes(3),
            data,
        })
        .await
        .unwrap();

        let task = tokio::spawn(capture_time_loop(&tracker).run(rx, shutdown));
        tokio::time::sleep(Duration::from_secs(61)).await;
        trigger.cancel();

        let (summary, assembler) = task.await.unwrap();
        assert_eq!(summary.flows_evicted, 1);
        assert_eq!(assembler.connection_count(), 1);
        assert_eq!(tracker.completed.lock().unwrap().len(), 1);
        assert_eq!(tracker.completed.lock().unwrap()[0].src_port, 45000);
    }
}

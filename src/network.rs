//! Packet acquisition, decoding and TCP stream reassembly.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐   ┌────────────────┐
//! │ PacketSource │──▶│ CaptureLoop  │──▶│  Assembler  │──▶│ StreamFactory  │
//! │ (pcap)       │   │ - decode     │   │ - reorder   │   │ (one stream    │
//! └──────────────┘   │ - flush tick │   │ - flush     │   │  per new flow) │
//!                    └──────────────┘   └─────────────┘   └────────────────┘
//! ```

pub mod assembler;
pub mod capture_loop;
pub mod decoder;
pub mod packet_source;
pub mod types;

pub use assembler::{Assembler, ReassembledStream, Reassembly, StreamFactory};
pub use capture_loop::{CaptureLoop, CaptureSummary, EvictionClock, ExitReason};
pub use packet_source::{spawn_packet_reader, PacketSource, PcapSource};
pub use types::{CapturedPacket, FlowKey, LinkLayer, TcpSegment};

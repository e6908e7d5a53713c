use chrono::{DateTime, Utc};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// One direction of a TCP connection.
///
/// The two directions of the same connection are distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn new(source: SocketAddr, destination: SocketAddr) -> Self {
        Self {
            src_ip: source.ip(),
            dst_ip: destination.ip(),
            src_port: source.port(),
            dst_port: destination.port(),
        }
    }

    pub fn source(&self) -> SocketAddr {
        SocketAddr::new(self.src_ip, self.src_port)
    }

    pub fn destination(&self) -> SocketAddr {
        SocketAddr::new(self.dst_ip, self.dst_port)
    }

    /// The key of the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
            src_port: self.dst_port,
            dst_port: self.src_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source(), self.destination())
    }
}

/// Framing of the captured bytes, as reported by the capture handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    LinuxSll,
    RawIp,
    /// BSD loopback: 4 byte address family header.
    Null,
}

/// A packet as handed over by the packet source.
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    pub timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
}

/// The TCP part of a decoded packet.
#[derive(Debug, Clone)]
pub struct TcpSegment {
    pub key: FlowKey,
    pub seq: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

use super::types::{CapturedPacket, FlowKey, LinkLayer, TcpSegment};
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use log::trace;
use std::net::IpAddr;

/// Extracts the TCP segment carried by `packet`.
///
/// Returns `None` for anything that is not TCP over IP, including frames that fail to parse.
/// Those are noise for the reassembler, not errors.
pub fn decode_segment(link: LinkLayer, packet: &CapturedPacket) -> Option<TcpSegment> {
    let sliced = match slice(link, &packet.data) {
        Some(sliced) => sliced,
        None => {
            trace!("dropping {} byte frame: undecodable", packet.data.len());
            return None;
        }
    };

    let (src_ip, dst_ip) = match sliced.net.as_ref()? {
        NetSlice::Ipv4(ipv4) => (
            IpAddr::V4(ipv4.header().source_addr()),
            IpAddr::V4(ipv4.header().destination_addr()),
        ),
        NetSlice::Ipv6(ipv6) => (
            IpAddr::V6(ipv6.header().source_addr()),
            IpAddr::V6(ipv6.header().destination_addr()),
        ),
        #[allow(unreachable_patterns)]
        _ => return None,
    };

    let tcp = match sliced.transport.as_ref()? {
        TransportSlice::Tcp(tcp) => tcp,
        _ => return None,
    };

    Some(TcpSegment {
        key: FlowKey {
            src_ip,
            dst_ip,
            src_port: tcp.source_port(),
            dst_port: tcp.destination_port(),
        },
        seq: tcp.sequence_number(),
        syn: tcp.syn(),
        fin: tcp.fin(),
        rst: tcp.rst(),
        payload: tcp.payload().to_vec(),
        timestamp: packet.timestamp,
    })
}

fn slice(link: LinkLayer, data: &[u8]) -> Option<SlicedPacket<'_>> {
    let result = match link {
        LinkLayer::Ethernet => SlicedPacket::from_ethernet(data).map_err(|e| e.to_string()),
        LinkLayer::LinuxSll => SlicedPacket::from_linux_sll(data).map_err(|e| e.to_string()),
        LinkLayer::RawIp => SlicedPacket::from_ip(data).map_err(|e| e.to_string()),
        LinkLayer::Null => {
            if data.len() < 4 {
                return None;
            }
            SlicedPacket::from_ip(&data[4..]).map_err(|e| e.to_string())
        }
    };
    match result {
        Ok(sliced) => Some(sliced),
        Err(e) => {
            trace!("slice error: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use etherparse::PacketBuilder;

    const MAC_A: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];
    const MAC_B: [u8; 6] = [0x02, 0, 0, 0, 0, 0x02];

    fn packet(data: Vec<u8>) -> CapturedPacket {
        CapturedPacket {
            timestamp: Utc::now(),
            data,
        }
    }

    #[test]
    fn test_decode_ipv4_tcp() {
        let builder = PacketBuilder::ethernet2(MAC_A, MAC_B)
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(51000, 80, 1000, 65535)
            .psh();
        let payload = b"GET / HTTP/1.1\r\n\r\n";
        let mut data = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut data, payload).unwrap();

        let segment = decode_segment(LinkLayer::Ethernet, &packet(data)).unwrap();
        assert_eq!(segment.key.source().to_string(), "10.0.0.1:51000");
        assert_eq!(segment.key.destination().to_string(), "10.0.0.2:80");
        assert_eq!(segment.seq, 1000);
        assert!(!segment.syn && !segment.fin && !segment.rst);
        assert_eq!(segment.payload, payload.to_vec());
    }

    #[test]
    fn test_decode_ipv6_syn() {
        let src = [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let dst = [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];
        let builder = PacketBuilder::ethernet2(MAC_A, MAC_B)
            .ipv6(src, dst, 64)
            .tcp(40000, 8080, 7, 65535)
            .syn();
        let mut data = Vec::with_capacity(builder.size(0));
        builder.write(&mut data, &[]).unwrap();

        let segment = decode_segment(LinkLayer::Ethernet, &packet(data)).unwrap();
        assert_eq!(segment.key.source().to_string(), "[fe80::1]:40000");
        assert!(segment.syn);
        assert!(segment.payload.is_empty());
    }

    #[test]
    fn test_udp_is_dropped() {
        let builder = PacketBuilder::ethernet2(MAC_A, MAC_B)
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(5353, 5353);
        let mut data = Vec::with_capacity(builder.size(3));
        builder.write(&mut data, b"abc").unwrap();

        assert!(decode_segment(LinkLayer::Ethernet, &packet(data)).is_none());
    }

    #[test]
    fn test_garbage_is_dropped() {
        assert!(decode_segment(LinkLayer::Ethernet, &packet(vec![0xff; 9])).is_none());
        assert!(decode_segment(LinkLayer::Null, &packet(vec![2, 0])).is_none());
    }

    #[test]
    fn test_raw_ip_link() {
        let builder = PacketBuilder::ipv4([192, 168, 1, 1], [192, 168, 1, 2], 64)
            .tcp(1234, 80, 1, 1024);
        let mut data = Vec::with_capacity(builder.size(1));
        builder.write(&mut data, b"x").unwrap();

        let segment = decode_segment(LinkLayer::RawIp, &packet(data)).unwrap();
        assert_eq!(segment.key.dst_port, 80);
        assert_eq!(segment.payload, b"x".to_vec());
    }
}

use super::types::{CapturedPacket, LinkLayer};
use crate::configuration::Config;
use crate::error_handling::types::CaptureError;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use pcap::{Activated, Capture, Device};
use std::path::Path;
use tokio::sync::mpsc;

/// Read timeout of live captures, so the reader thread can notice that nobody listens anymore.
const READ_TIMEOUT_MS: i32 = 1000;

/// A time-ordered supply of captured packets.
pub trait PacketSource: Send {
    /// Framing of the packets returned by [`PacketSource::next_packet`].
    fn link_layer(&self) -> LinkLayer;

    /// Blocks until the next packet is available.
    ///
    /// `Ok(None)` means the source is exhausted. [`CaptureError::ReadTimeout`] is transient and
    /// the caller should simply ask again.
    fn next_packet(&mut self) -> Result<Option<CapturedPacket>, CaptureError>;
}

/// libpcap backed packet source, either live on an interface or replaying a savefile.
pub struct PcapSource {
    capture: Capture<dyn Activated>,
    link: LinkLayer,
}

impl PcapSource {
    /// Opens `config.interface` in promiscuous mode and installs `config.filter`.
    pub fn open_live(config: &Config) -> Result<Self, CaptureError> {
        let devices = Device::list().map_err(|e| CaptureError::DeviceLookup(e.to_string()))?;
        if !devices.iter().any(|d| d.name == config.interface) {
            return Err(CaptureError::InterfaceNotFound(config.interface.clone()));
        }

        let capture = Capture::from_device(config.interface.as_str())
            .and_then(|c| {
                c.promisc(true)
                    .snaplen(config.snaplen)
                    .timeout(READ_TIMEOUT_MS)
                    .open()
            })
            .map_err(|e| {
                CaptureError::OpenFailed(format!("interface {:?}: {}", config.interface, e))
            })?;

        info!(
            "listening on interface {} with filter {:?}",
            config.interface, config.filter
        );
        Self::from_capture(capture.into(), &config.filter)
    }

    /// Replays the pcap file at `path` through `filter`.
    pub fn open_file(path: &Path, filter: &str) -> Result<Self, CaptureError> {
        let capture = Capture::from_file(path).map_err(|e| {
            CaptureError::OpenFailed(format!("file {}: {}", path.display(), e))
        })?;

        info!("reading {} with filter {:?}", path.display(), filter);
        Self::from_capture(capture.into(), filter)
    }

    fn from_capture(mut capture: Capture<dyn Activated>, filter: &str) -> Result<Self, CaptureError> {
        capture
            .filter(filter, true)
            .map_err(|e| CaptureError::FilterFailed(format!("{:?}: {}", filter, e)))?;

        let linktype = capture.get_datalink();
        let link = link_layer_from(linktype.0).ok_or_else(|| {
            CaptureError::OpenFailed(format!("unsupported link type {}", linktype.0))
        })?;
        debug!("capture link type {} -> {:?}", linktype.0, link);

        Ok(Self { capture, link })
    }
}

impl PacketSource for PcapSource {
    fn link_layer(&self) -> LinkLayer {
        self.link
    }

    fn next_packet(&mut self) -> Result<Option<CapturedPacket>, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => {
                let ts = packet.header.ts;
                Ok(Some(CapturedPacket {
                    timestamp: timestamp_from(ts.tv_sec as i64, ts.tv_usec as i64),
                    data: packet.data.to_vec(),
                }))
            }
            Err(pcap::Error::TimeoutExpired) => Err(CaptureError::ReadTimeout),
            Err(pcap::Error::NoMorePackets) => Ok(None),
            Err(e) => Err(CaptureError::ReadFailed(e.to_string())),
        }
    }
}

/// Maps a pcap DLT value to the framings the decoder understands.
fn link_layer_from(dlt: i32) -> Option<LinkLayer> {
    match dlt {
        0 | 108 => Some(LinkLayer::Null),
        1 => Some(LinkLayer::Ethernet),
        12 | 14 | 101 | 228 | 229 => Some(LinkLayer::RawIp),
        113 => Some(LinkLayer::LinuxSll),
        _ => None,
    }
}

fn timestamp_from(secs: i64, micros: i64) -> DateTime<Utc> {
    let nanos = (micros.clamp(0, 999_999) as u32) * 1000;
    DateTime::from_timestamp(secs, nanos).unwrap_or_else(Utc::now)
}

/// Moves `source` onto the blocking pool and streams its packets through a bounded channel.
///
/// Capture order is preserved. The reader stops when the source is exhausted, on a non
/// transient read error, or once the receiver has been dropped.
pub fn spawn_packet_reader<S>(mut source: S, capacity: usize) -> mpsc::Receiver<CapturedPacket>
where
    S: PacketSource + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::task::spawn_blocking(move || loop {
        if tx.is_closed() {
            debug!("packet receiver dropped, stopping reader");
            break;
        }
        match source.next_packet() {
            Ok(Some(packet)) => {
                if tx.blocking_send(packet).is_err() {
                    debug!("packet receiver dropped, stopping reader");
                    break;
                }
            }
            Ok(None) => {
                debug!("packet source exhausted");
                break;
            }
            Err(CaptureError::ReadTimeout) => continue,
            Err(e) => {
                error!("[!] {}", e);
                break;
            }
        }
    });
    rx
}

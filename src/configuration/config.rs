use super::types::OutputFormat;
use crate::error_handling::types::ConfigError;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Runtime configuration of the inspector.
///
/// Every field is parsed from the command line with `clap`, and can also be provided through an
/// `HTTPEEK_*` environment variable.
///
/// # Fields Overview
///
/// - `interface`: network interface to capture on
/// - `filter`: BPF expression installed on the capture handle
/// - `snaplen`: capture snapshot length in bytes
/// - `read_file`: replay a pcap savefile instead of capturing live
/// - `flush_interval_secs`: period of the idle-flow eviction tick
/// - `idle_timeout_secs`: inactivity after which a flow is forcibly closed
/// - `max_buffered_segments`: out-of-order segments kept per connection
/// - `output_buffer`: capacity of the channel feeding the output sink
/// - `report_gaps`: surface skipped bytes as session read errors
/// - `json`: write JSON lines instead of frames
/// - `no_color`: disable ANSI highlighting
#[derive(Parser, Debug, Clone)]
#[command(name = "httpeek")]
#[command(version)]
#[command(about = "Reassembles TCP streams from the wire and shows the ones that look like HTTP")]
pub struct Config {
    /// Interface to get packets from
    ///
    /// # Command Line
    /// Use `-i <NAME>` or `--interface <NAME>`
    #[arg(short = 'i', long, env = "HTTPEEK_INTERFACE", default_value = "eth0")]
    pub interface: String,

    /// BPF filter for pcap
    ///
    /// # Command Line
    /// Use `-f <EXPR>` or `--filter <EXPR>`
    #[arg(short = 'f', long, env = "HTTPEEK_FILTER", default_value = "tcp and dst port 80")]
    pub filter: String,

    /// SnapLen for pcap packet capture
    ///
    /// # Command Line
    /// Use `-s <BYTES>` or `--snaplen <BYTES>`
    #[arg(short = 's', long, env = "HTTPEEK_SNAPLEN", default_value_t = 1600)]
    pub snaplen: i32,

    /// Read packets from a pcap file instead of a live interface
    ///
    /// When set, the interface is not checked and the capture ends with the file.
    #[arg(short = 'r', long = "read", env = "HTTPEEK_READ")]
    pub read_file: Option<PathBuf>,

    /// Seconds between two idle-flow flushes
    #[arg(long, env = "HTTPEEK_FLUSH_INTERVAL_SECS", default_value_t = 60)]
    pub flush_interval_secs: u64,

    /// Seconds of inactivity after which a flow is closed by the next flush
    #[arg(long, env = "HTTPEEK_IDLE_TIMEOUT_SECS", default_value_t = 120)]
    pub idle_timeout_secs: u64,

    /// Maximum out-of-order segments buffered per connection
    ///
    /// Once exceeded the reassembler skips ahead over the missing bytes.
    #[arg(long, env = "HTTPEEK_MAX_BUFFERED_SEGMENTS", default_value_t = 1024)]
    pub max_buffered_segments: usize,

    /// Capacity of the queue between session handlers and the output sink
    #[arg(long, env = "HTTPEEK_OUTPUT_BUFFER", default_value_t = 64)]
    pub output_buffer: usize,

    /// Treat bytes skipped by the reassembler as a read error on the session
    #[arg(long, env = "HTTPEEK_REPORT_GAPS", action = ArgAction::SetTrue)]
    pub report_gaps: bool,

    /// Write one JSON object per stream instead of a frame
    #[arg(long, env = "HTTPEEK_JSON", action = ArgAction::SetTrue)]
    pub json: bool,

    /// Disable ANSI colours in rendered payloads
    #[arg(long, env = "HTTPEEK_NO_COLOR", action = ArgAction::SetTrue)]
    pub no_color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            filter: "tcp and dst port 80".to_string(),
            snaplen: 1600,
            read_file: None,
            flush_interval_secs: 60,
            idle_timeout_secs: 120,
            max_buffered_segments: 1024,
            output_buffer: 64,
            report_gaps: false,
            json: false,
            no_color: false,
        }
    }
}

impl Config {
    /// Parses the configuration from the process arguments and environment.
    ///
    /// # Panics
    /// Exits the process with clap's usage message when the arguments are invalid.
    pub fn from_args() -> Self {
        Config::parse()
    }

    /// Checks values that clap cannot express on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_file.is_none() && self.interface.trim().is_empty() {
            return Err(ConfigError::EmptyValue("interface".to_string()));
        }
        if self.filter.trim().is_empty() {
            return Err(ConfigError::EmptyValue("filter".to_string()));
        }
        if self.snaplen <= 0 {
            return Err(ConfigError::NotInRange(format!(
                "snaplen must be positive, got {}",
                self.snaplen
            )));
        }
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::NotInRange(
                "flush interval must be at least one second".to_string(),
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "idle timeout must be at least one second".to_string(),
            ));
        }
        if self.idle_timeout_secs < self.flush_interval_secs {
            return Err(ConfigError::Inconsistent(format!(
                "idle timeout ({}s) is shorter than the flush interval ({}s)",
                self.idle_timeout_secs, self.flush_interval_secs
            )));
        }
        if self.max_buffered_segments == 0 {
            return Err(ConfigError::NotInRange(
                "max buffered segments must be positive".to_string(),
            ));
        }
        if self.output_buffer == 0 {
            return Err(ConfigError::NotInRange(
                "output buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.flush_interval_secs)
    }

    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_timeout_secs as i64)
    }

    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Framed
        }
    }
}

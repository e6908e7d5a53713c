use super::shutdown::ShutdownSignal;
use crate::configuration::config::Config;
use crate::error_handling::types::ControllerError;
use crate::network::assembler::AssemblerOptions;
use crate::network::{
    spawn_packet_reader, Assembler, CaptureLoop, CaptureSummary, EvictionClock, PacketSource,
    PcapSource,
};
use crate::output::{output_channel, HttpHighlighter, PlainRenderer, Renderer};
use crate::session_management::FlowDispatcher;
use log::{error, info};
use std::sync::Arc;
use tokio::io::AsyncWrite;

/// Packets that may wait between the capture thread and the capture loop.
const PACKET_QUEUE_DEPTH: usize = 4096;

/// Wires the pipeline together and runs it once.
pub struct Controller {
    pub config: Config,
}

impl Controller {
    /// Validates `config`. Any error here is fatal for the process.
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        match config.validate() {
            Ok(()) => Ok(Self { config }),
            Err(err) => {
                error!("[!] {}", err);
                Err(ControllerError::Config(err))
            }
        }
    }

    /// Opens the configured capture and writes records to stdout.
    ///
    /// Failing to open the capture or to install the filter is returned before any packet is
    /// read.
    pub async fn run(&self, shutdown: ShutdownSignal) -> Result<CaptureSummary, ControllerError> {
        let source = match &self.config.read_file {
            Some(path) => PcapSource::open_file(path, &self.config.filter)?,
            None => PcapSource::open_live(&self.config)?,
        };
        self.run_with_source(source, tokio::io::stdout(), shutdown)
            .await
    }

    /// Runs the capture pipeline over `source`, writing records to `writer`.
    ///
    /// Returns after the capture loop has stopped, every session handler has finished and the
    /// output sink has written its last record.
    pub async fn run_with_source<S, W>(
        &self,
        source: S,
        writer: W,
        shutdown: ShutdownSignal,
    ) -> Result<CaptureSummary, ControllerError>
    where
        S: PacketSource + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let renderer: Arc<dyn Renderer> = if self.config.no_color {
            Arc::new(PlainRenderer)
        } else {
            Arc::new(HttpHighlighter)
        };

        let (output, sink) =
            output_channel(self.config.output_buffer, self.config.output_format());
        let sink_task = tokio::spawn(sink.run(writer));

        let dispatcher = FlowDispatcher::new(
            renderer,
            output,
            shutdown.clone(),
            self.config.report_gaps,
        );
        let assembler = Assembler::new(
            dispatcher,
            AssemblerOptions {
                max_buffered_segments: self.config.max_buffered_segments,
            },
        );

        let link = source.link_layer();
        let packets = spawn_packet_reader(source, PACKET_QUEUE_DEPTH);
        let capture = CaptureLoop::new(
            assembler,
            link,
            self.config.flush_interval(),
            self.config.idle_timeout(),
        )
        .with_clock(self.eviction_clock());
        let (summary, assembler) = capture.run(packets, shutdown).await;

        let dispatcher = assembler.into_factory();
        let created = dispatcher.sessions_created();
        let finished = dispatcher.wait_for_sessions().await;
        info!("{} sessions created, {} finished", created, finished);

        let written = sink_task
            .await
            .map_err(|e| ControllerError::TaskFailed(e.to_string()))??;
        info!("{} records written", written);

        Ok(summary)
    }

    /// A replayed file carries its own timeline; idle time is measured on it.
    fn eviction_clock(&self) -> EvictionClock {
        if self.config.read_file.is_some() {
            EvictionClock::CaptureTime
        } else {
            EvictionClock::WallClock
        }
    }
}
